//! Sync passes run in-process.
//!
//! The countdown is skipped; everything else behaves as in a server session.

use std::time::Duration;

use serde::Serialize;

use dispatch_sync_server::sync::{Actor, SweepReport, SyncEngine, SyncError};

use super::{CommandError, Context, print_json};

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum PassOutput {
    Completed { report: SweepReport },
    AlreadyDone,
}

async fn engine(actor: Actor) -> Result<SyncEngine, CommandError> {
    let ctx = Context::from_env().await?;
    let mut settings = ctx.config.engine;
    settings.countdown = Duration::ZERO;
    Ok(SyncEngine::new(actor, ctx.deps, settings))
}

async fn finish<T: Serialize>(
    engine: &SyncEngine,
    result: Result<T, SyncError>,
) -> Result<(), Box<dyn std::error::Error>> {
    engine.flush_events().await;
    engine.shutdown();
    print_json(&result?)?;
    Ok(())
}

/// Fast sync followed by the deletion pass.
///
/// # Errors
///
/// Returns an error if setup fails or the sweep fails as a whole.
pub async fn fast(actor: Actor, notify: bool) -> Result<(), Box<dyn std::error::Error>> {
    let engine = engine(actor).await?;
    let result = engine
        .fast_sync(notify)
        .await
        .map(|report| PassOutput::Completed { report });
    finish(&engine, result).await
}

/// One-time full-history correction.
///
/// # Errors
///
/// Returns an error if setup fails or the sweep fails as a whole.
pub async fn correct(actor: Actor) -> Result<(), Box<dyn std::error::Error>> {
    let engine = engine(actor).await?;
    let result = engine.comprehensive_correction().await.map(|report| {
        report.map_or(PassOutput::AlreadyDone, |report| PassOutput::Completed {
            report,
        })
    });
    finish(&engine, result).await
}

/// Deletion pass over the actor's own orders.
///
/// # Errors
///
/// Returns an error if setup fails or the sweep fails as a whole.
pub async fn deletion_pass(actor: Actor) -> Result<(), Box<dyn std::error::Error>> {
    let engine = engine(actor).await?;
    let result = engine
        .perform_deletion_pass()
        .await
        .map(|report| PassOutput::Completed { report });
    finish(&engine, result).await
}

/// Reconcile one order by tracking key.
///
/// # Errors
///
/// Returns an error if the order is unknown or the provider call fails.
pub async fn order(actor: Actor, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let engine = engine(actor).await?;
    let result = engine.sync_order_by_tracking_key(key).await;
    finish(&engine, result).await
}
