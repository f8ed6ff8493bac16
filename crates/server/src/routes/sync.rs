//! Sync engine handlers.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::middleware::CurrentActor;
use crate::state::AppState;
use crate::sync::{SingleOrderSync, SweepReport, SyncError, SyncSnapshot};

/// Build the sync router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sync/session", post(start_session).delete(end_session))
        .route("/sync/fast", post(fast_sync))
        .route("/sync/correction", post(correction))
        .route("/sync/deletion-pass", post(deletion_pass))
        .route("/sync/orders/{tracking_key}", post(sync_order))
        .route("/sync/state", get(sync_state))
        .route("/sync/periodic", put(set_periodic))
}

/// Request for a fast sync.
#[derive(Debug, Default, Deserialize)]
pub struct FastSyncRequest {
    #[serde(default)]
    pub show_notifications: bool,
}

/// Request for toggling the periodic timer.
#[derive(Debug, Deserialize)]
pub struct PeriodicRequest {
    pub enabled: bool,
}

/// Outcome of a triggered pass.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The pass ran.
    Completed { report: SweepReport },
    /// The one-time correction already ran.
    AlreadyDone,
    /// Another pass was running; nothing was started.
    Ignored,
}

type OutcomeResponse = Result<(StatusCode, Json<SyncOutcome>), AppError>;

fn respond(result: Result<SweepReport, SyncError>) -> OutcomeResponse {
    match result {
        Ok(report) => Ok((StatusCode::OK, Json(SyncOutcome::Completed { report }))),
        Err(SyncError::ConcurrentSweepRejected) => {
            Ok((StatusCode::ACCEPTED, Json(SyncOutcome::Ignored)))
        }
        Err(e) => Err(e.into()),
    }
}

/// Start the actor's session. The login sync runs in the background.
pub async fn start_session(
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
) -> (StatusCode, Json<SyncSnapshot>) {
    let engine = state.sessions().login(actor).await;
    (StatusCode::ACCEPTED, Json(engine.snapshot()))
}

/// End the actor's session.
///
/// # Errors
///
/// Returns `AppError::NotFound` if there was no session.
pub async fn end_session(
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    if state.sessions().end(actor).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("sync session".to_string()))
    }
}

/// Run a fast sync and wait for its report.
///
/// # Errors
///
/// Returns an error if the sweep failed as a whole.
pub async fn fast_sync(
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    Json(body): Json<FastSyncRequest>,
) -> OutcomeResponse {
    let engine = state.sessions().engine(actor).await;
    respond(engine.fast_sync(body.show_notifications).await)
}

/// Run the one-time full-history correction.
///
/// # Errors
///
/// Returns an error if the sweep failed as a whole.
pub async fn correction(
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
) -> OutcomeResponse {
    let engine = state.sessions().engine(actor).await;
    match engine.comprehensive_correction().await {
        Ok(Some(report)) => respond(Ok(report)),
        Ok(None) => Ok((StatusCode::OK, Json(SyncOutcome::AlreadyDone))),
        Err(e) => respond(Err(e)),
    }
}

/// Run a deletion pass over the actor's own orders.
///
/// # Errors
///
/// Returns an error if the sweep failed as a whole.
pub async fn deletion_pass(
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
) -> OutcomeResponse {
    let engine = state.sessions().engine(actor).await;
    respond(engine.perform_deletion_pass().await)
}

/// Reconcile a single order right away.
///
/// # Errors
///
/// Returns 404 for an unknown key and 403 for another owner's order.
pub async fn sync_order(
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    Path(tracking_key): Path<String>,
) -> Result<Json<SingleOrderSync>, AppError> {
    let engine = state.sessions().engine(actor).await;
    Ok(Json(engine.sync_order_by_tracking_key(&tracking_key).await?))
}

/// Current state of the actor's engine.
pub async fn sync_state(
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
) -> Json<SyncSnapshot> {
    Json(state.sessions().engine(actor).await.snapshot())
}

/// Enable or disable the periodic timer.
pub async fn set_periodic(
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    Json(body): Json<PeriodicRequest>,
) -> Json<SyncSnapshot> {
    let engine = state.sessions().engine(actor).await;
    engine.set_periodic(body.enabled);
    Json(engine.snapshot())
}
