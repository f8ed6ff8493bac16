//! Application state shared across handlers.

use std::sync::Arc;

use secrecy::SecretString;
use sqlx::PgPool;

use crate::provider::ReferenceData;
use crate::services::AccountService;
use crate::sync::SessionRegistry;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// session registry, account service and reference cache.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    api_token: SecretString,
    pool: PgPool,
    sessions: SessionRegistry,
    accounts: AccountService,
    reference: ReferenceData,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `api_token` - Bearer token callers must present
    /// * `pool` - `PostgreSQL` connection pool, used for readiness checks
    /// * `sessions` - One sync engine per signed-in actor
    /// * `accounts` - Provider account operations
    /// * `reference` - Cached cities and regions
    #[must_use]
    pub fn new(
        api_token: SecretString,
        pool: PgPool,
        sessions: SessionRegistry,
        accounts: AccountService,
        reference: ReferenceData,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                api_token,
                pool,
                sessions,
                accounts,
                reference,
            }),
        }
    }

    /// Bearer token protecting the API.
    #[must_use]
    pub fn api_token(&self) -> &SecretString {
        &self.inner.api_token
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Live sync sessions.
    #[must_use]
    pub fn sessions(&self) -> &SessionRegistry {
        &self.inner.sessions
    }

    /// Provider account operations.
    #[must_use]
    pub fn accounts(&self) -> &AccountService {
        &self.inner.accounts
    }

    /// Cached provider reference data.
    #[must_use]
    pub fn reference(&self) -> &ReferenceData {
        &self.inner.reference
    }
}
