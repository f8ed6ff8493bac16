//! Reference data handlers.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use chrono::Utc;
use serde::Deserialize;

use crate::error::AppError;
use crate::middleware::CurrentActor;
use crate::models::ProviderCredential;
use crate::provider::{City, Region};
use crate::state::AppState;
use crate::sync::Actor;

/// Build the reference data router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reference/cities", get(cities))
        .route("/reference/cities/{id}/regions", get(regions))
}

/// Which of the actor's accounts to use. Defaults to the default account.
#[derive(Debug, Default, Deserialize)]
pub struct AccountQuery {
    pub account: Option<String>,
}

async fn credential(
    state: &AppState,
    actor: Actor,
    query: &AccountQuery,
) -> Result<ProviderCredential, AppError> {
    Ok(state
        .accounts()
        .resolve(actor.id, query.account.as_deref(), Utc::now())
        .await?)
}

/// Cities the provider delivers to.
///
/// # Errors
///
/// Returns 409 without a usable account and 502 if the provider fails.
pub async fn cities(
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    Query(query): Query<AccountQuery>,
) -> Result<Json<Vec<City>>, AppError> {
    let credential = credential(&state, actor, &query).await?;
    let cities = state
        .reference()
        .cities(&credential.id.to_string(), &credential.token)
        .await?;
    Ok(Json(Vec::clone(&cities)))
}

/// Regions of a city.
///
/// # Errors
///
/// Returns 409 without a usable account and 502 if the provider fails.
pub async fn regions(
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    Path(city_id): Path<String>,
    Query(query): Query<AccountQuery>,
) -> Result<Json<Vec<Region>>, AppError> {
    let credential = credential(&state, actor, &query).await?;
    let regions = state
        .reference()
        .regions(&credential.id.to_string(), &credential.token, &city_id)
        .await?;
    Ok(Json(Vec::clone(&regions)))
}
