//! Authenticated API client.
//!
//! Every request reads the persisted session and carries its access token as
//! a bearer header. A `401` hands the request to the [`RefreshCoordinator`];
//! once a fresh token is available the request is sent again, exactly once.
//! Any other response, and a second `401`, goes back to the caller untouched.

use std::sync::Arc;

use reqwest::{Method, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};
use vault_storage::StorageBackend;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::redirect::{LoginRedirect, TracingRedirect};
use crate::refresh::{HttpRefresher, RefreshCoordinator, TokenRefresher};
use crate::session::{Session, SessionStore};
use crate::types::{LoginRequest, error_message};

/// A backend request that can be sent again after a token refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
}

impl ApiRequest {
    /// A request with `method` to `path` (relative to the base URL).
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// A `GET` request to `path`.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// A `POST` request to `path`; attach the body with [`json`](Self::json).
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// A `PUT` request to `path`.
    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// A `PATCH` request to `path`.
    #[must_use]
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// A `DELETE` request to `path`.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query-string pair.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Attach a JSON body.
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// The HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The path relative to the base URL.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// HTTP client for the Vault backend with persisted sessions and
/// single-flight token refresh.
///
/// Cloning is cheap; clones share the session store and the refresh state,
/// so concurrent requests from any clone take part in the same refresh.
#[derive(Debug, Clone)]
pub struct VaultClient {
    config: ClientConfig,
    http: reqwest::Client,
    store: SessionStore,
    refresh: RefreshCoordinator,
}

impl VaultClient {
    /// Create a client that logs forced sign-outs through `tracing`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if the base URL is not an HTTP(S) URL,
    /// or [`ClientError::Network`] if the HTTP client cannot be built.
    pub fn new(
        config: ClientConfig,
        storage: Arc<dyn StorageBackend>,
    ) -> Result<Self, ClientError> {
        Self::with_redirect(config, storage, Arc::new(TracingRedirect))
    }

    /// Create a client that calls `redirect` when the session cannot be recovered.
    ///
    /// # Errors
    ///
    /// Same as [`VaultClient::new`].
    pub fn with_redirect(
        config: ClientConfig,
        storage: Arc<dyn StorageBackend>,
        redirect: Arc<dyn LoginRedirect>,
    ) -> Result<Self, ClientError> {
        let http = build_http(&config)?;
        let refresher = HttpRefresher::new(http.clone(), config.url(&config.endpoints.refresh));
        Ok(Self::assemble(config, http, storage, redirect, Arc::new(refresher)))
    }

    /// Create a client with a custom [`TokenRefresher`].
    ///
    /// # Errors
    ///
    /// Same as [`VaultClient::new`].
    pub fn with_refresher(
        config: ClientConfig,
        storage: Arc<dyn StorageBackend>,
        redirect: Arc<dyn LoginRedirect>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Result<Self, ClientError> {
        let http = build_http(&config)?;
        Ok(Self::assemble(config, http, storage, redirect, refresher))
    }

    fn assemble(
        config: ClientConfig,
        http: reqwest::Client,
        storage: Arc<dyn StorageBackend>,
        redirect: Arc<dyn LoginRedirect>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        let store = SessionStore::new(storage, config.session_key.as_str());
        let refresh =
            RefreshCoordinator::new(store.clone(), refresher, redirect, config.login_path.clone());
        Self {
            config,
            http,
            store,
            refresh,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn session_store(&self) -> &SessionStore {
        &self.store
    }

    #[must_use]
    pub fn refresh_coordinator(&self) -> &RefreshCoordinator {
        &self.refresh
    }

    /// The persisted session, if any.
    pub async fn session(&self) -> Option<Session> {
        self.store.load().await
    }

    /// Authenticate with email and password and persist the returned session.
    ///
    /// The login call carries no bearer header and is never routed through
    /// the refresh protocol: a `401` here means bad credentials.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Api`] if the backend rejects the credentials,
    /// [`ClientError::IncompleteSession`] if the response lacks a token, or
    /// a network/storage error.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ClientError> {
        let resp = self
            .http
            .post(self.config.url(&self.config.endpoints.login))
            .json(&LoginRequest { email, password })
            .send()
            .await?;

        let session: Session = decode(resp).await?;
        self.store.save(&session).await?;
        info!(roles = session.roles().len(), "logged in");
        Ok(session)
    }

    /// End the session.
    ///
    /// Asks the backend to invalidate it (best effort) and clears the local
    /// record whatever the backend answers.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Storage`] only if the local record cannot be removed.
    pub async fn logout(&self) -> Result<(), ClientError> {
        if let Some(token) = self.store.access_token().await {
            let result = self
                .http
                .post(self.config.url(&self.config.endpoints.logout))
                .bearer_auth(token)
                .send()
                .await;
            match result {
                Ok(resp) if !resp.status().is_success() => {
                    warn!(status = resp.status().as_u16(), "server-side logout rejected");
                }
                Err(e) => warn!(error = %e, "server-side logout failed"),
                Ok(_) => {}
            }
        }

        self.store.clear().await?;
        info!("logged out");
        Ok(())
    }

    /// Send `request` with the current access token, recovering once from an
    /// expired token.
    ///
    /// The response is returned whatever its status; only a failed refresh
    /// turns into an error.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AuthExpired`] if the request needed a refresh
    /// and the refresh failed, or [`ClientError::Network`] on transport errors.
    pub async fn execute(&self, request: ApiRequest) -> Result<Response, ClientError> {
        let token = self.store.access_token().await;
        let resp = self.dispatch(&request, token.as_deref()).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }

        debug!(method = %request.method, path = %request.path, "received 401, recovering session");
        let fresh = self
            .refresh
            .recover(token.as_deref())
            .await
            .map_err(ClientError::AuthExpired)?;

        let resp = self.dispatch(&request, Some(&fresh)).await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            warn!(
                method = %request.method,
                path = %request.path,
                "request rejected again after refresh"
            );
        }
        Ok(resp)
    }

    /// Send `request` and decode a successful JSON response.
    ///
    /// # Errors
    ///
    /// Everything [`execute`](Self::execute) returns, plus
    /// [`ClientError::Api`] for non-2xx responses and [`ClientError::Json`]
    /// when the body does not decode into `T`.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<T, ClientError> {
        let resp = self.execute(request).await?;
        decode(resp).await
    }

    /// `GET path` and decode the JSON response.
    ///
    /// # Errors
    ///
    /// See [`send_json`](Self::send_json).
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.send_json(ApiRequest::get(path)).await
    }

    /// `POST path` with a JSON body and decode the JSON response.
    ///
    /// # Errors
    ///
    /// See [`send_json`](Self::send_json).
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        self.send_json(ApiRequest::post(path).json(body)).await
    }

    /// `PUT path` with a JSON body and decode the JSON response.
    ///
    /// # Errors
    ///
    /// See [`send_json`](Self::send_json).
    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        self.send_json(ApiRequest::put(path).json(body)).await
    }

    /// `DELETE path` and decode the JSON response (empty bodies decode as `null`).
    ///
    /// # Errors
    ///
    /// See [`send_json`](Self::send_json).
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.send_json(ApiRequest::delete(path)).await
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<Response, ClientError> {
        let mut builder = self
            .http
            .request(request.method.clone(), self.config.url(&request.path));
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        let token = token.filter(|t| !t.is_empty());
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!(
            method = %request.method,
            path = %request.path,
            authenticated = token.is_some(),
            "sending request"
        );
        Ok(builder.send().await?)
    }
}

fn build_http(config: &ClientConfig) -> Result<reqwest::Client, ClientError> {
    if !(config.base_url.starts_with("http://") || config.base_url.starts_with("https://")) {
        return Err(ClientError::Config(format!(
            "base URL must start with http:// or https://, got '{}'",
            config.base_url
        )));
    }

    reqwest::Client::builder()
        .timeout(config.timeout)
        .user_agent(concat!("vault-client/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(ClientError::Network)
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    let status = resp.status();
    let text = resp.text().await?;

    if !status.is_success() {
        return Err(ClientError::Api {
            status: status.as_u16(),
            message: error_message(&text, status.as_u16()),
        });
    }

    if text.trim().is_empty() {
        return Ok(serde_json::from_value(Value::Null)?);
    }
    Ok(serde_json::from_str(&text)?)
}
