//! Provider credential repository for database operations.
//!
//! Stores one row per (owner, provider, account username). Usernames are
//! compared in their normalized form; the unique index enforces it as well.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use tracing::instrument;

use dispatch_sync_core::{AccountUsername, CredentialId, UserId};

use super::{CredentialStore, RepositoryError};
use crate::models::{NewCredential, ProviderCredential};

// =============================================================================
// Row Types
// =============================================================================

/// Internal row type for `PostgreSQL` queries.
#[derive(Debug, sqlx::FromRow)]
struct CredentialRow {
    id: CredentialId,
    owner_id: UserId,
    provider: String,
    account_username: String,
    token: String,
    expires_at: DateTime<Utc>,
    is_default: bool,
    last_used_at: Option<DateTime<Utc>>,
    merchant_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<CredentialRow> for ProviderCredential {
    fn from(row: CredentialRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            provider: row.provider,
            account_username: AccountUsername::new(&row.account_username),
            token: SecretString::from(row.token),
            expires_at: row.expires_at,
            is_default: row.is_default,
            last_used_at: row.last_used_at,
            merchant_id: row.merchant_id,
            created_at: row.created_at,
        }
    }
}

const CREDENTIAL_COLUMNS: &str = r"
    id, owner_id, provider, account_username, token, expires_at,
    is_default, last_used_at, merchant_id, created_at
";

// =============================================================================
// Repository
// =============================================================================

/// Repository for provider credentials.
#[derive(Clone)]
pub struct CredentialRepository {
    pool: PgPool,
}

impl CredentialRepository {
    /// Create a new credential repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Map a unique-index violation to a conflict.
fn map_unique_violation(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict("account already connected".to_string());
    }
    RepositoryError::Database(e)
}

#[async_trait]
impl CredentialStore for CredentialRepository {
    #[instrument(skip(self))]
    async fn list_credentials(
        &self,
        owner: UserId,
        provider: &str,
    ) -> Result<Vec<ProviderCredential>, RepositoryError> {
        let rows = sqlx::query_as::<_, CredentialRow>(&format!(
            r"
            SELECT {CREDENTIAL_COLUMNS}
            FROM provider_credentials
            WHERE owner_id = $1 AND provider = $2
            ORDER BY id
            "
        ))
        .bind(owner)
        .bind(provider)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ProviderCredential::from).collect())
    }

    #[instrument(skip(self, credential), fields(owner = %credential.owner_id))]
    async fn insert_credential(
        &self,
        credential: &NewCredential,
    ) -> Result<ProviderCredential, RepositoryError> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            r"
            INSERT INTO provider_credentials (
                owner_id, provider, account_username, token, expires_at,
                is_default, merchant_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {CREDENTIAL_COLUMNS}
            "
        ))
        .bind(credential.owner_id)
        .bind(&credential.provider)
        .bind(credential.account_username.as_str())
        .bind(credential.token.expose_secret())
        .bind(credential.expires_at)
        .bind(credential.is_default)
        .bind(credential.merchant_id.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique_violation)?;

        Ok(row.into())
    }

    async fn update_token(
        &self,
        id: CredentialId,
        token: &SecretString,
        expires_at: DateTime<Utc>,
        merchant_id: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE provider_credentials
            SET token = $2,
                expires_at = $3,
                merchant_id = COALESCE($4, merchant_id),
                updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(token.expose_secret())
        .bind(expires_at)
        .bind(merchant_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn delete_credential(&self, id: CredentialId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM provider_credentials WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_default(
        &self,
        owner: UserId,
        provider: &str,
        id: CredentialId,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Clear first: the partial unique index allows one default at a time
        sqlx::query(
            r"
            UPDATE provider_credentials
            SET is_default = FALSE, updated_at = NOW()
            WHERE owner_id = $1 AND provider = $2 AND id <> $3 AND is_default
            ",
        )
        .bind(owner)
        .bind(provider)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            r"
            UPDATE provider_credentials
            SET is_default = TRUE, updated_at = NOW()
            WHERE owner_id = $1 AND provider = $2 AND id = $3
            ",
        )
        .bind(owner)
        .bind(provider)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        tx.commit().await?;
        Ok(())
    }

    async fn touch(&self, id: CredentialId, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE provider_credentials SET last_used_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
