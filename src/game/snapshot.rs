//! Snapshot building

use crate::ws::protocol::{MatchStatistics, PointStatus, ServerMsg, TankSnapshot};

use super::model::Tank;
use super::state::GameState;

impl From<&Tank> for TankSnapshot {
    fn from(t: &Tank) -> Self {
        Self {
            id: t.id,
            owner: t.owner.clone(),
            faction: t.faction,
            position: t.position,
            location: t.location,
            rotation: t.rotation,
            visible: t.visible,
            health: t.health,
            healing_since: t.healing_since,
            friendly_kills: t.friendly_kills,
            enemy_kills: t.enemy_kills,
        }
    }
}

/// Builds world snapshots for network transmission
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    /// Full `gameUpdate` message
    pub fn build(state: &GameState, now: u64) -> ServerMsg {
        ServerMsg::GameUpdate {
            phase: state.match_state.phase,
            players: state.players.values().cloned().collect(),
            hqs: state.hqs.clone(),
            tanks: state.tanks.iter().map(TankSnapshot::from).collect(),
            capture_points: state.capture_points.clone(),
            server_timestamp: now,
        }
    }

    /// Scores, tank counts and per-point status for the countdown UI
    pub fn statistics(state: &GameState) -> MatchStatistics {
        MatchStatistics {
            scores: state.scores(),
            tank_counts: state.tank_counts(),
            capture_points: state
                .capture_points
                .iter()
                .map(|cp| PointStatus {
                    id: cp.id,
                    controlled_by: cp.controlled_by,
                    tanks: cp.tanks_by_faction,
                })
                .collect(),
        }
    }
}
