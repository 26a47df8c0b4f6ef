//! Remote snapshot ledger over a PostgREST-style API

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::LedgerConfig;

use super::{PersistenceError, SavedGame, SnapshotStore};

/// One ledger row
#[derive(Debug, Serialize, Deserialize)]
struct LedgerRow {
    saved_at: chrono::DateTime<chrono::Utc>,
    snapshot: SavedGame,
}

/// Appends snapshots to a REST table and reads back the latest
#[derive(Clone)]
pub struct LedgerStore {
    client: Client,
    base_url: String,
    api_key: String,
    table: String,
}

impl LedgerStore {
    pub fn new(config: &LedgerConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            table: config.table.clone(),
        }
    }

    /// Get the REST API URL for the ledger table
    fn rest_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    async fn insert(&self, saved: &SavedGame) -> Result<(), PersistenceError> {
        let row = LedgerRow {
            saved_at: saved.saved_at,
            snapshot: saved.clone(),
        };

        let response = self
            .client
            .post(self.rest_url())
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=minimal")
            .json(&row)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PersistenceError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }

    async fn latest(&self) -> Result<Option<SavedGame>, PersistenceError> {
        let url = format!("{}?select=saved_at,snapshot&order=saved_at.desc&limit=1", self.rest_url());

        let response = self
            .client
            .get(&url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "application/vnd.pgrst.object+json")
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_ACCEPTABLE {
            // No rows found
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PersistenceError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let row: LedgerRow = response.json().await?;
        Ok(Some(row.snapshot))
    }
}

impl SnapshotStore for LedgerStore {
    fn name(&self) -> &'static str {
        "ledger"
    }

    fn save<'a>(&'a self, saved: &'a SavedGame) -> BoxFuture<'a, Result<(), PersistenceError>> {
        self.insert(saved).boxed()
    }

    fn load(&self) -> BoxFuture<'_, Result<Option<SavedGame>, PersistenceError>> {
        self.latest().boxed()
    }
}
