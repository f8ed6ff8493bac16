//! Provider account handlers.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
};
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::middleware::CurrentActor;
use crate::models::ProviderCredential;
use crate::state::AppState;

/// Build the accounts router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/accounts", get(list_accounts))
        .route("/accounts/login", post(login))
        .route("/accounts/{username}/default", put(set_default))
        .route("/accounts/{username}", delete(remove))
}

/// A connected account, without its token.
#[derive(Debug, Serialize)]
pub struct AccountView {
    pub username: String,
    pub is_default: bool,
    pub expires_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub merchant_id: Option<String>,
}

impl From<&ProviderCredential> for AccountView {
    fn from(credential: &ProviderCredential) -> Self {
        Self {
            username: credential.account_username.to_string(),
            is_default: credential.is_default,
            expires_at: credential.expires_at,
            last_used_at: credential.last_used_at,
            merchant_id: credential.merchant_id.clone(),
        }
    }
}

/// Request for connecting an account.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: SecretString,
}

/// List the actor's usable accounts, default first.
///
/// # Errors
///
/// Returns an error if the accounts cannot be loaded.
pub async fn list_accounts(
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
) -> Result<Json<Vec<AccountView>>, AppError> {
    let accounts = state.accounts().list_accounts(actor.id, Utc::now()).await?;
    Ok(Json(accounts.iter().map(AccountView::from).collect()))
}

/// Log in to the provider and store the token.
///
/// # Errors
///
/// Returns 422 if the provider rejects the credentials.
pub async fn login(
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<(StatusCode, Json<AccountView>), AppError> {
    let credential = state
        .accounts()
        .activate_account(actor.id, &body.username, &body.password)
        .await?;
    Ok((StatusCode::CREATED, Json(AccountView::from(&credential))))
}

/// Make an account the default.
///
/// # Errors
///
/// Returns 409 if the actor has no such account.
pub async fn set_default(
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<StatusCode, AppError> {
    state.accounts().set_default(actor.id, &username).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Disconnect an account.
///
/// # Errors
///
/// Returns 409 when removing the only active default account.
pub async fn remove(
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<StatusCode, AppError> {
    state
        .accounts()
        .delete(actor.id, &username, Utc::now())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
