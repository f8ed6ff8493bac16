//! Provider credential models.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};

use dispatch_sync_core::{AccountUsername, CredentialId, UserId};

/// A provider account token held by one staff member.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct ProviderCredential {
    /// Database ID.
    pub id: CredentialId,
    /// Staff member the account belongs to.
    pub owner_id: UserId,
    /// Provider name.
    pub provider: String,
    /// Provider account username.
    pub account_username: AccountUsername,
    /// Provider session token (HIGH PRIVILEGE - redacted in debug output).
    pub token: SecretString,
    /// When the token stops being accepted.
    pub expires_at: DateTime<Utc>,
    /// Whether this is the owner's default account for the provider.
    pub is_default: bool,
    /// Last time the token was used by a sweep or lookup.
    pub last_used_at: Option<DateTime<Utc>>,
    /// Merchant id reported at login.
    pub merchant_id: Option<String>,
    /// When the account was first connected.
    pub created_at: DateTime<Utc>,
}

impl ProviderCredential {
    /// Whether the token is present and not yet expired at `now`.
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.token.expose_secret().trim().is_empty() && self.expires_at > now
    }
}

impl std::fmt::Debug for ProviderCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCredential")
            .field("id", &self.id)
            .field("owner_id", &self.owner_id)
            .field("provider", &self.provider)
            .field("account_username", &self.account_username)
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("is_default", &self.is_default)
            .field("last_used_at", &self.last_used_at)
            .field("merchant_id", &self.merchant_id)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Parameters for inserting a credential after a successful login.
#[derive(Debug, Clone)]
pub struct NewCredential {
    /// Staff member the account belongs to.
    pub owner_id: UserId,
    /// Provider name.
    pub provider: String,
    /// Provider account username.
    pub account_username: AccountUsername,
    /// Provider session token.
    pub token: SecretString,
    /// When the token expires.
    pub expires_at: DateTime<Utc>,
    /// Whether the row starts as the default account.
    pub is_default: bool,
    /// Merchant id reported at login.
    pub merchant_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(token: &str, expires_in: chrono::Duration) -> ProviderCredential {
        let now = Utc::now();
        ProviderCredential {
            id: CredentialId::new(1),
            owner_id: UserId::new(1),
            provider: "default".to_string(),
            account_username: AccountUsername::new("ali"),
            token: SecretString::from(token),
            expires_at: now + expires_in,
            is_default: true,
            last_used_at: None,
            merchant_id: None,
            created_at: now,
        }
    }

    #[test]
    fn test_active_credential() {
        let cred = credential("tok_live", chrono::Duration::hours(1));
        assert!(cred.is_active_at(Utc::now()));
    }

    #[test]
    fn test_expired_or_blank_token_is_inactive() {
        let expired = credential("tok_live", chrono::Duration::hours(-1));
        assert!(!expired.is_active_at(Utc::now()));

        let blank = credential("  ", chrono::Duration::hours(1));
        assert!(!blank.is_active_at(Utc::now()));
    }

    #[test]
    fn test_debug_redacts_token() {
        let cred = credential("tok_super_private", chrono::Duration::hours(1));
        let debug_output = format!("{cred:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("tok_super_private"));
    }
}
