//! Provider account commands.
//!
//! # Usage
//!
//! ```bash
//! dsync accounts list --user 7
//! dsync accounts set-default ali --user 7
//! dsync accounts delete ali --user 7
//! PROVIDER_PASSWORD=... dsync accounts login ali --user 7
//! ```

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::Serialize;

use dispatch_sync_core::UserId;
use dispatch_sync_server::models::ProviderCredential;

use super::{CommandError, Context, print_json};

#[derive(Serialize)]
struct AccountLine {
    username: String,
    is_default: bool,
    expires_at: DateTime<Utc>,
    last_used_at: Option<DateTime<Utc>>,
}

impl From<&ProviderCredential> for AccountLine {
    fn from(credential: &ProviderCredential) -> Self {
        Self {
            username: credential.account_username.to_string(),
            is_default: credential.is_default,
            expires_at: credential.expires_at,
            last_used_at: credential.last_used_at,
        }
    }
}

/// List usable accounts.
///
/// # Errors
///
/// Returns `CommandError` if setup or the query fails.
pub async fn list(owner: UserId) -> Result<(), CommandError> {
    let ctx = Context::from_env().await?;
    let accounts = ctx.accounts.list_accounts(owner, Utc::now()).await?;
    let lines: Vec<AccountLine> = accounts.iter().map(AccountLine::from).collect();
    print_json(&lines)
}

/// Make an account the default.
///
/// # Errors
///
/// Returns `CommandError` if the account does not exist.
pub async fn set_default(owner: UserId, username: &str) -> Result<(), CommandError> {
    let ctx = Context::from_env().await?;
    ctx.accounts.set_default(owner, username).await?;
    tracing::info!("Default account set to {}", username.trim());
    Ok(())
}

/// Disconnect an account.
///
/// # Errors
///
/// Returns `CommandError` if the account does not exist or is the only
/// active default.
pub async fn delete(owner: UserId, username: &str) -> Result<(), CommandError> {
    let ctx = Context::from_env().await?;
    ctx.accounts.delete(owner, username, Utc::now()).await?;
    Ok(())
}

/// Log in and store the token.
///
/// # Errors
///
/// Returns `CommandError` if the provider rejects the login.
pub async fn login(
    owner: UserId,
    username: &str,
    password: &SecretString,
) -> Result<(), CommandError> {
    let ctx = Context::from_env().await?;
    let credential = ctx
        .accounts
        .activate_account(owner, username, password)
        .await?;
    print_json(&AccountLine::from(&credential))
}
