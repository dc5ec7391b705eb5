//! Client configuration.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Every setting can be overridden via a `VAULT_*` environment variable.

use std::time::Duration;

/// Default backend base URL.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080/api";
/// Default path the user is sent to when their session cannot be recovered.
pub const DEFAULT_LOGIN_PATH: &str = "/login";
/// Default storage key holding the serialized session.
pub const DEFAULT_SESSION_KEY: &str = "vault/session";
/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Backend paths of the authentication endpoints, relative to the base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEndpoints {
    /// `POST { email, password }` → session record.
    pub login: String,
    /// `POST { refreshtoken }` → `{ accesstoken, refreshtoken? }`.
    pub refresh: String,
    /// `POST` with the bearer header; best-effort invalidation.
    pub logout: String,
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            login: "/auth/login".to_owned(),
            refresh: "/auth/refresh".to_owned(),
            logout: "/auth/logout".to_owned(),
        }
    }
}

/// Configuration for [`VaultClient`](crate::VaultClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL, without a trailing slash.
    pub base_url: String,
    /// Login entry point handed to the redirect hook on unrecoverable auth failure.
    pub login_path: String,
    /// Storage key the session record lives under.
    pub session_key: String,
    /// Per-request timeout applied by the HTTP client.
    pub timeout: Duration,
    /// Authentication endpoint paths.
    pub endpoints: AuthEndpoints,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            login_path: DEFAULT_LOGIN_PATH.to_owned(),
            session_key: DEFAULT_SESSION_KEY.to_owned(),
            timeout: DEFAULT_TIMEOUT,
            endpoints: AuthEndpoints::default(),
        }
    }
}

impl ClientConfig {
    /// Build a default configuration pointed at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(&base_url.into()),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `VAULT_API_URL` — backend base URL (default: `http://127.0.0.1:8080/api`)
    /// - `VAULT_LOGIN_PATH` — login entry point (default: `/login`)
    /// - `VAULT_SESSION_KEY` — storage key for the session (default: `vault/session`)
    /// - `VAULT_TIMEOUT_SECS` — request timeout in seconds (default: `30`)
    /// - `VAULT_AUTH_LOGIN_ENDPOINT` — default `/auth/login`
    /// - `VAULT_AUTH_REFRESH_ENDPOINT` — default `/auth/refresh`
    /// - `VAULT_AUTH_LOGOUT_ENDPOINT` — default `/auth/logout`
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();
        let endpoints = AuthEndpoints::default();

        let timeout = var("VAULT_TIMEOUT_SECS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map_or(defaults.timeout, Duration::from_secs);

        Self {
            base_url: normalize_base_url(&var("VAULT_API_URL").unwrap_or(defaults.base_url)),
            login_path: var("VAULT_LOGIN_PATH").unwrap_or(defaults.login_path),
            session_key: var("VAULT_SESSION_KEY").unwrap_or(defaults.session_key),
            timeout,
            endpoints: AuthEndpoints {
                login: var("VAULT_AUTH_LOGIN_ENDPOINT").unwrap_or(endpoints.login),
                refresh: var("VAULT_AUTH_REFRESH_ENDPOINT").unwrap_or(endpoints.refresh),
                logout: var("VAULT_AUTH_LOGOUT_ENDPOINT").unwrap_or(endpoints.logout),
            },
        }
    }

    /// Join an API path onto the base URL.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }
}

fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_owned()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = ClientConfig::from_lookup(lookup(&[]));
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.login_path, "/login");
        assert_eq!(cfg.session_key, "vault/session");
        assert_eq!(cfg.timeout, DEFAULT_TIMEOUT);
        assert_eq!(cfg.endpoints, AuthEndpoints::default());
    }

    #[test]
    fn env_overrides_are_applied() {
        let cfg = ClientConfig::from_lookup(lookup(&[
            ("VAULT_API_URL", "https://vault.example.com/api/"),
            ("VAULT_LOGIN_PATH", "/signin"),
            ("VAULT_TIMEOUT_SECS", "5"),
            ("VAULT_AUTH_REFRESH_ENDPOINT", "/token/refresh"),
        ]));
        assert_eq!(cfg.base_url, "https://vault.example.com/api");
        assert_eq!(cfg.login_path, "/signin");
        assert_eq!(cfg.timeout, Duration::from_secs(5));
        assert_eq!(cfg.endpoints.refresh, "/token/refresh");
        assert_eq!(cfg.endpoints.login, "/auth/login");
    }

    #[test]
    fn empty_and_invalid_values_fall_back() {
        let cfg = ClientConfig::from_lookup(lookup(&[
            ("VAULT_API_URL", "  "),
            ("VAULT_TIMEOUT_SECS", "soon"),
        ]));
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.timeout, DEFAULT_TIMEOUT);

        let zero = ClientConfig::from_lookup(lookup(&[("VAULT_TIMEOUT_SECS", "0")]));
        assert_eq!(zero.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn url_joins_with_single_slash() {
        let cfg = ClientConfig::new("http://localhost:9000/api/");
        assert_eq!(cfg.url("/documents"), "http://localhost:9000/api/documents");
        assert_eq!(cfg.url("users/1"), "http://localhost:9000/api/users/1");
    }
}
