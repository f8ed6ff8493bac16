//! One sync engine per signed-in actor.
//!
//! Each engine owns its own timer, status catalog, notifier and event loop,
//! so sessions never share mutable sync state.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use dispatch_sync_core::{StaffRole, UserId};

use super::SyncError;
use super::orchestrator::{EngineDeps, SyncEngine, SyncTrigger};
use crate::config::EngineSettings;

/// Identity a session acts as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: StaffRole,
}

impl Actor {
    #[must_use]
    pub const fn new(id: UserId, role: StaffRole) -> Self {
        Self { id, role }
    }

    /// Owner filter for sweeps: managers sweep every owner, staff only
    /// themselves.
    #[must_use]
    pub const fn sweep_scope(self) -> Option<UserId> {
        match self.role {
            StaffRole::Manager => None,
            StaffRole::Staff => Some(self.id),
        }
    }

    /// Whether this actor may reconcile or hand off an owner's orders.
    /// Deletion is stricter and checked by the deletion guard.
    #[must_use]
    pub fn may_sync(self, owner: UserId) -> bool {
        self.role == StaffRole::Manager || self.id == owner
    }
}

/// Registry of live sessions.
#[derive(Clone)]
pub struct SessionRegistry {
    deps: EngineDeps,
    settings: EngineSettings,
    periodic_enabled: bool,
    engines: Arc<RwLock<HashMap<Actor, SyncEngine>>>,
}

impl SessionRegistry {
    /// Create an empty registry. `periodic_enabled` is the initial timer
    /// state of new sessions.
    #[must_use]
    pub fn new(deps: EngineDeps, settings: EngineSettings, periodic_enabled: bool) -> Self {
        Self {
            deps,
            settings,
            periodic_enabled,
            engines: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The actor's engine, started on first use.
    pub async fn engine(&self, actor: Actor) -> SyncEngine {
        if let Some(engine) = self.engines.read().await.get(&actor) {
            return engine.clone();
        }

        let mut engines = self.engines.write().await;
        engines
            .entry(actor)
            .or_insert_with(|| {
                info!(actor = %actor.id, role = %actor.role, "Starting sync session");
                let engine = SyncEngine::new(actor, self.deps.clone(), self.settings.clone());
                engine.set_periodic(self.periodic_enabled);
                engine
            })
            .clone()
    }

    /// Start (or reuse) the actor's session and run the login sync in the
    /// background.
    pub async fn login(&self, actor: Actor) -> SyncEngine {
        let engine = self.engine(actor).await;
        let background = engine.clone();
        tokio::spawn(async move {
            match background.trigger(SyncTrigger::Login, true).await {
                Ok(_) => {}
                Err(SyncError::ConcurrentSweepRejected) => {
                    debug!("Login sync skipped, a sync is already running");
                }
                Err(e) => warn!(error = %e, "Login sync failed"),
            }
        });
        engine
    }

    /// End a session. Returns `false` if there was none.
    pub async fn end(&self, actor: Actor) -> bool {
        let Some(engine) = self.engines.write().await.remove(&actor) else {
            return false;
        };
        engine.shutdown();
        info!(actor = %actor.id, "Sync session ended");
        true
    }

    /// Actors with a live session.
    pub async fn active(&self) -> Vec<Actor> {
        self.engines.read().await.keys().copied().collect()
    }

    /// End every session.
    pub async fn shutdown_all(&self) {
        let engines: Vec<SyncEngine> = self
            .engines
            .write()
            .await
            .drain()
            .map(|(_, engine)| engine)
            .collect();
        for engine in &engines {
            engine.shutdown();
        }
        info!(sessions = engines.len(), "All sync sessions ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_by_role() {
        let manager = Actor::new(UserId::new(1), StaffRole::Manager);
        let staff = Actor::new(UserId::new(2), StaffRole::Staff);

        assert_eq!(manager.sweep_scope(), None);
        assert_eq!(staff.sweep_scope(), Some(UserId::new(2)));
        assert!(manager.may_sync(UserId::new(9)));
        assert!(staff.may_sync(UserId::new(2)));
        assert!(!staff.may_sync(UserId::new(9)));
    }
}
