//! Provider account management for staff members.
//!
//! Each staff member may connect several provider accounts. Exactly one of
//! them is the default used by sweeps; usernames are unique per owner after
//! normalization.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use thiserror::Error;
use tracing::{info, instrument, warn};

use dispatch_sync_core::{AccountUsername, UserId};

use crate::db::{CredentialStore, RepositoryError};
use crate::models::{NewCredential, ProviderCredential};
use crate::provider::{DeliveryProvider, ProviderError, ProviderSession};

/// Errors from account operations.
#[derive(Debug, Error)]
pub enum AccountError {
    /// No matching account is connected.
    #[error("no provider account connected")]
    CredentialNotFound,

    /// The matching account's token has expired.
    #[error("provider account token expired")]
    CredentialExpired,

    /// The default account cannot be removed while no other account is usable.
    #[error("cannot remove the only active default account")]
    LastDefaultAccount,

    /// Username was blank.
    #[error("account username is required")]
    EmptyUsername,

    /// Database operation failed.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Provider call failed.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
}

impl AccountError {
    /// Whether the error means "no usable token" for the owner.
    #[must_use]
    pub const fn is_missing_credential(&self) -> bool {
        matches!(self, Self::CredentialNotFound | Self::CredentialExpired)
    }
}

/// Ordering key preferring the default row, then the most recently used,
/// then the most recently connected.
fn preference(credential: &ProviderCredential) -> (bool, Option<DateTime<Utc>>, DateTime<Utc>) {
    (
        credential.is_default,
        credential.last_used_at,
        credential.created_at,
    )
}

/// Credential resolution and account lifecycle.
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn CredentialStore>,
    provider: Arc<dyn DeliveryProvider>,
}

impl AccountService {
    /// Create an account service for one provider.
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, provider: Arc<dyn DeliveryProvider>) -> Self {
        Self { store, provider }
    }

    fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Every stored row of an owner, expired ones included.
    ///
    /// # Errors
    ///
    /// Returns `AccountError::Repository` if the query fails.
    pub async fn credentials_of(
        &self,
        owner: UserId,
    ) -> Result<Vec<ProviderCredential>, AccountError> {
        Ok(self
            .store
            .list_credentials(owner, self.provider_name())
            .await?)
    }

    /// Resolve the token an owner acts with.
    ///
    /// With a username, the matching account is returned. Without one, the
    /// default account is preferred, then the most recently used. Expired
    /// tokens are never returned.
    ///
    /// # Errors
    ///
    /// Returns `CredentialNotFound` when nothing matches and
    /// `CredentialExpired` when every match has expired.
    #[instrument(skip(self), fields(provider = %self.provider_name()))]
    pub async fn resolve(
        &self,
        owner: UserId,
        account: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ProviderCredential, AccountError> {
        let rows = self.credentials_of(owner).await?;
        let matching: Vec<ProviderCredential> = match account {
            Some(username) => rows
                .into_iter()
                .filter(|row| row.account_username.matches(username))
                .collect(),
            None => rows,
        };

        if matching.is_empty() {
            return Err(AccountError::CredentialNotFound);
        }

        matching
            .into_iter()
            .filter(|row| row.is_active_at(now))
            .max_by_key(preference)
            .ok_or(AccountError::CredentialExpired)
    }

    /// Usable accounts of an owner, one per normalized username.
    ///
    /// # Errors
    ///
    /// Returns `AccountError::Repository` if the query fails.
    pub async fn list_accounts(
        &self,
        owner: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<ProviderCredential>, AccountError> {
        let mut best: HashMap<AccountUsername, ProviderCredential> = HashMap::new();

        for row in self.credentials_of(owner).await? {
            if !row.is_active_at(now) {
                continue;
            }
            match best.get(&row.account_username) {
                Some(existing) if preference(existing) >= preference(&row) => {}
                _ => {
                    best.insert(row.account_username.clone(), row);
                }
            }
        }

        let mut accounts: Vec<ProviderCredential> = best.into_values().collect();
        accounts.sort_by(|a, b| {
            b.is_default
                .cmp(&a.is_default)
                .then_with(|| a.account_username.normalized().cmp(b.account_username.normalized()))
        });
        Ok(accounts)
    }

    /// Make an account the owner's default.
    ///
    /// # Errors
    ///
    /// Returns `CredentialNotFound` if the owner has no such account.
    #[instrument(skip(self))]
    pub async fn set_default(&self, owner: UserId, username: &str) -> Result<(), AccountError> {
        let target = self
            .credentials_of(owner)
            .await?
            .into_iter()
            .filter(|row| row.account_username.matches(username))
            .max_by_key(preference)
            .ok_or(AccountError::CredentialNotFound)?;

        self.store
            .set_default(owner, self.provider_name(), target.id)
            .await?;
        info!(account = %target.account_username, "Default provider account changed");
        Ok(())
    }

    /// Store the token from a successful login.
    ///
    /// An existing row with the same normalized username is updated in place
    /// and any duplicates of it are removed. A new row becomes the default
    /// only when the owner has no account yet.
    ///
    /// # Errors
    ///
    /// Returns `EmptyUsername` for a blank username, otherwise repository errors.
    #[instrument(skip(self, session), fields(provider = %self.provider_name()))]
    pub async fn upsert_from_login(
        &self,
        owner: UserId,
        username: &str,
        session: &ProviderSession,
    ) -> Result<ProviderCredential, AccountError> {
        let username = AccountUsername::new(username);
        if username.is_empty() {
            return Err(AccountError::EmptyUsername);
        }

        let rows = self.credentials_of(owner).await?;
        let owner_had_accounts = !rows.is_empty();
        let mut matching: Vec<ProviderCredential> = rows
            .into_iter()
            .filter(|row| row.account_username == username)
            .collect();
        matching.sort_by_key(|row| Reverse(preference(row)));

        let mut matching = matching.into_iter();
        let Some(keep) = matching.next() else {
            let inserted = self
                .store
                .insert_credential(&NewCredential {
                    owner_id: owner,
                    provider: self.provider_name().to_string(),
                    account_username: username,
                    token: session.token.clone(),
                    expires_at: session.expires_at,
                    is_default: !owner_had_accounts,
                    merchant_id: session.merchant_id.clone(),
                })
                .await?;
            info!(account = %inserted.account_username, "Provider account connected");
            return Ok(inserted);
        };

        let mut duplicate_was_default = false;
        for duplicate in matching {
            warn!(
                credential_id = %duplicate.id,
                account = %duplicate.account_username,
                "Removing duplicate provider account row"
            );
            duplicate_was_default |= duplicate.is_default;
            self.store.delete_credential(duplicate.id).await?;
        }

        self.store
            .update_token(
                keep.id,
                &session.token,
                session.expires_at,
                session.merchant_id.as_deref(),
            )
            .await?;

        let is_default = keep.is_default || duplicate_was_default;
        if is_default && !keep.is_default {
            self.store
                .set_default(owner, self.provider_name(), keep.id)
                .await?;
        }

        Ok(ProviderCredential {
            token: session.token.clone(),
            expires_at: session.expires_at,
            merchant_id: session.merchant_id.clone().or(keep.merchant_id.clone()),
            is_default,
            ..keep
        })
    }

    /// Disconnect an account.
    ///
    /// # Errors
    ///
    /// Returns `CredentialNotFound` if no such account exists, and
    /// `LastDefaultAccount` if it is the default and no other active account
    /// could take over.
    #[instrument(skip(self))]
    pub async fn delete(
        &self,
        owner: UserId,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AccountError> {
        let rows = self.credentials_of(owner).await?;
        let (targets, remaining): (Vec<ProviderCredential>, Vec<ProviderCredential>) = rows
            .into_iter()
            .partition(|row| row.account_username.matches(username));

        if targets.is_empty() {
            return Err(AccountError::CredentialNotFound);
        }

        let removing_default = targets.iter().any(|row| row.is_default);
        let successor = remaining
            .iter()
            .filter(|row| row.is_active_at(now))
            .max_by_key(|row| preference(row))
            .map(|row| row.id);

        if removing_default && successor.is_none() {
            return Err(AccountError::LastDefaultAccount);
        }

        for row in &targets {
            self.store.delete_credential(row.id).await?;
        }

        if removing_default && let Some(successor) = successor {
            self.store
                .set_default(owner, self.provider_name(), successor)
                .await?;
        }

        info!(account = %username.trim(), "Provider account disconnected");
        Ok(())
    }

    /// Log in to the provider and store the resulting token.
    ///
    /// # Errors
    ///
    /// Returns `AccountError::Provider` if the login is rejected.
    #[instrument(skip(self, password))]
    pub async fn activate_account(
        &self,
        owner: UserId,
        username: &str,
        password: &SecretString,
    ) -> Result<ProviderCredential, AccountError> {
        if username.trim().is_empty() {
            return Err(AccountError::EmptyUsername);
        }
        let session = self.provider.login(username.trim(), password).await?;
        self.upsert_from_login(owner, username, &session).await
    }

    /// Record a use of a credential. Failures are logged, not returned.
    pub async fn touch(&self, credential: &ProviderCredential, now: DateTime<Utc>) {
        if let Err(e) = self.store.touch(credential.id, now).await {
            warn!(credential_id = %credential.id, error = %e, "Failed to record credential use");
        }
    }
}
