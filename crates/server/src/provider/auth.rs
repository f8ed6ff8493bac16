//! Provider authentication.
//!
//! Handles username/password login to obtain a merchant session token.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::ProviderError;
use super::client::{ApiEnvelope, read_envelope};

/// Session lifetime assumed when the provider omits one.
const DEFAULT_SESSION_SECS: i64 = 24 * 60 * 60;

/// Session token obtained from provider login.
#[derive(Clone)]
pub struct ProviderSession {
    /// Token for merchant API requests.
    pub token: SecretString,
    /// When the token stops being accepted.
    pub expires_at: DateTime<Utc>,
    /// Merchant account id, if the provider reports one.
    pub merchant_id: Option<String>,
}

impl std::fmt::Debug for ProviderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSession")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("merchant_id", &self.merchant_id)
            .finish()
    }
}

impl ProviderSession {
    /// Check if the token has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        // Consider expired if less than 60 seconds remaining
        Utc::now() >= self.expires_at - chrono::Duration::seconds(60)
    }
}

/// Request body for provider login.
#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// Login payload inside the response envelope.
#[derive(Deserialize)]
struct LoginData {
    token: String,
    /// Token lifetime in seconds.
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    merchant_id: Option<serde_json::Value>,
}

/// Log in with username and password.
///
/// # Errors
///
/// Returns `ProviderError::AuthenticationFailed` if the credentials are rejected.
#[instrument(skip(client, password), fields(username = %username))]
pub async fn login(
    client: &reqwest::Client,
    endpoint: url::Url,
    username: &str,
    password: &SecretString,
) -> Result<ProviderSession, ProviderError> {
    let now = Utc::now();

    let response = client
        .post(endpoint)
        .json(&LoginRequest {
            username,
            password: password.expose_secret(),
        })
        .send()
        .await?;

    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(ProviderError::AuthenticationFailed(
            "Invalid credentials".to_string(),
        ));
    }

    let envelope: ApiEnvelope<LoginData> = read_envelope(response).await?;
    let data = envelope
        .into_data()
        .map_err(ProviderError::AuthenticationFailed)?;

    if data.token.trim().is_empty() {
        return Err(ProviderError::AuthenticationFailed(
            "Provider returned an empty token".to_string(),
        ));
    }

    Ok(ProviderSession {
        token: SecretString::from(data.token),
        expires_at: now
            + chrono::Duration::seconds(data.expires_in.unwrap_or(DEFAULT_SESSION_SECS)),
        merchant_id: data.merchant_id.and_then(|v| match v {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(expires_in: chrono::Duration) -> ProviderSession {
        ProviderSession {
            token: SecretString::from("test"),
            expires_at: Utc::now() + expires_in,
            merchant_id: None,
        }
    }

    #[test]
    fn test_session_is_expired() {
        assert!(session(chrono::Duration::hours(-1)).is_expired());
        assert!(!session(chrono::Duration::hours(1)).is_expired());
        // Within the 60s buffer counts as expired
        assert!(session(chrono::Duration::seconds(30)).is_expired());
    }

    #[test]
    fn test_login_data_accepts_numeric_merchant_id() {
        let data: LoginData = serde_json::from_str(
            r#"{"token": "abc", "expires_in": 3600, "merchant_id": 4411}"#,
        )
        .expect("valid login payload");
        assert_eq!(data.expires_in, Some(3600));
        assert_eq!(data.merchant_id, Some(serde_json::json!(4411)));
    }

    #[test]
    fn test_session_debug_redacts_token() {
        let debug_output = format!("{:?}", session(chrono::Duration::hours(1)));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
