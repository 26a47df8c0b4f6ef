//! Snapshot persistence for crash recovery and restarts

pub mod file;
pub mod ledger;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::game::GameState;

pub use file::FileStore;
pub use ledger::LedgerStore;

/// Format version written into every snapshot
pub const SNAPSHOT_VERSION: u32 = 1;

/// One persisted world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedGame {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub state: GameState,
}

impl SavedGame {
    pub fn new(state: GameState) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            state,
        }
    }
}

/// Persistence errors
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot (de)serialization failed: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
}

/// A place snapshots can be written to and read back from
pub trait SnapshotStore: Send + Sync {
    /// Short label for logs
    fn name(&self) -> &'static str;

    fn save<'a>(&'a self, saved: &'a SavedGame) -> BoxFuture<'a, Result<(), PersistenceError>>;

    /// Most recent snapshot; `None` when nothing has been saved yet
    fn load(&self) -> BoxFuture<'_, Result<Option<SavedGame>, PersistenceError>>;
}

/// Local snapshot plus an optional remote ledger.
///
/// Failures never propagate: the local store logs at `error`, the ledger
/// at `warn`.
#[derive(Clone)]
pub struct Persistence {
    primary: Arc<dyn SnapshotStore>,
    ledger: Option<Arc<dyn SnapshotStore>>,
}

impl Persistence {
    pub fn new(primary: Arc<dyn SnapshotStore>, ledger: Option<Arc<dyn SnapshotStore>>) -> Self {
        Self { primary, ledger }
    }

    pub fn from_config(config: &Config) -> Self {
        let primary: Arc<dyn SnapshotStore> = Arc::new(FileStore::new(config.snapshot_path.clone()));
        let ledger = config
            .ledger
            .as_ref()
            .map(|ledger| Arc::new(LedgerStore::new(ledger)) as Arc<dyn SnapshotStore>);
        Self::new(primary, ledger)
    }

    /// Write the final state to every configured store
    pub async fn save(&self, state: GameState) {
        let saved = SavedGame::new(state);

        match self.primary.save(&saved).await {
            Ok(()) => info!(store = self.primary.name(), "Game state saved"),
            Err(e) => error!(store = self.primary.name(), error = %e, "Failed to save game state"),
        }

        if let Some(ledger) = &self.ledger {
            match ledger.save(&saved).await {
                Ok(()) => info!(store = ledger.name(), "Game state recorded"),
                Err(e) => warn!(store = ledger.name(), error = %e, "Failed to record game state"),
            }
        }
    }

    /// Saved world to resume, local first, ledger as fallback
    pub async fn load(&self) -> Option<GameState> {
        match load_checked(self.primary.as_ref()).await {
            Ok(Some(saved)) => {
                info!(store = self.primary.name(), saved_at = %saved.saved_at, "Loaded saved game");
                return Some(saved.state);
            }
            Ok(None) => info!(store = self.primary.name(), "No saved game found"),
            Err(e) => error!(store = self.primary.name(), error = %e, "Failed to load saved game"),
        }

        let ledger = self.ledger.as_ref()?;
        match load_checked(ledger.as_ref()).await {
            Ok(Some(saved)) => {
                info!(store = ledger.name(), saved_at = %saved.saved_at, "Loaded saved game");
                Some(saved.state)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(store = ledger.name(), error = %e, "Failed to load saved game");
                None
            }
        }
    }
}

async fn load_checked(store: &dyn SnapshotStore) -> Result<Option<SavedGame>, PersistenceError> {
    match store.load().await? {
        Some(saved) if saved.version != SNAPSHOT_VERSION => {
            Err(PersistenceError::UnsupportedVersion(saved.version))
        }
        other => Ok(other),
    }
}
