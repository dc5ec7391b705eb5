//! Wire types for the authentication endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Serialize)]
pub(crate) struct RefreshRequest<'a> {
    #[serde(rename = "refreshtoken")]
    pub refresh_token: &'a str,
}

#[derive(Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(rename = "accesstoken")]
    pub access_token: Option<String>,
    #[serde(rename = "refreshtoken")]
    pub refresh_token: Option<String>,
}

/// Pull a human-readable message out of an error body.
///
/// The backend is not consistent: it sends `{"error": "..."}`,
/// `{"error": {"message": "..."}}`, or `{"message": "..."}`.
pub(crate) fn error_message(body: &str, status: u16) -> String {
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|json| {
        let error = json.get("error");
        error
            .and_then(Value::as_str)
            .or_else(|| error.and_then(|e| e.get("message")).and_then(Value::as_str))
            .or_else(|| json.get("message").and_then(Value::as_str))
            .map(str::to_owned)
    });

    from_json.unwrap_or_else(|| {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            format!("HTTP {status}")
        } else {
            trimmed.to_owned()
        }
    })
}
