//! Local JSON snapshot file

use std::path::PathBuf;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::fs;

use super::{PersistenceError, SavedGame, SnapshotStore};

/// Snapshot kept in a single file, replaced atomically on save
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl SnapshotStore for FileStore {
    fn name(&self) -> &'static str {
        "file"
    }

    fn save<'a>(&'a self, saved: &'a SavedGame) -> BoxFuture<'a, Result<(), PersistenceError>> {
        async move {
            let json = serde_json::to_vec_pretty(saved)?;
            let tmp = self.temp_path();
            fs::write(&tmp, json).await?;
            fs::rename(&tmp, &self.path).await?;
            Ok(())
        }
        .boxed()
    }

    fn load(&self) -> BoxFuture<'_, Result<Option<SavedGame>, PersistenceError>> {
        async move {
            let bytes = match fs::read(&self.path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            Ok(Some(serde_json::from_slice(&bytes)?))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GameState;

    fn temp_file(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("{}-{}.json", name, uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn missing_file_is_not_an_error() {
        let store = FileStore::new(temp_file("missing"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load_restores_state() {
        let path = temp_file("snapshot");
        let store = FileStore::new(path.clone());

        let mut state = GameState::new();
        state.next_tank_id = 17;
        state.capture_points[2].capture_progress = -35.0;
        let saved = SavedGame::new(state);

        tokio_test::assert_ok!(store.save(&saved).await);
        let loaded = tokio_test::assert_ok!(store.load().await).unwrap();
        assert_eq!(loaded.saved_at, saved.saved_at);
        assert_eq!(loaded.state.next_tank_id, 17);
        assert_eq!(loaded.state.capture_points[2].capture_progress, -35.0);
        assert_eq!(loaded.state.match_state, saved.state.match_state);
        assert!(!store.temp_path().exists());

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let path = temp_file("corrupt");
        std::fs::write(&path, b"{not json").unwrap();

        let store = FileStore::new(path.clone());
        assert!(matches!(store.load().await, Err(PersistenceError::Serde(_))));

        let _ = std::fs::remove_file(path);
    }
}
