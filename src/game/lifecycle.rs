//! Intermission / match state machine

use tracing::info;

use crate::ws::protocol::ServerMsg;

use super::model::{Faction, FactionCounts, MatchPhase, STARTING_ARTILLERY_CHARGES};
use super::simulation::GameConfig;
use super::snapshot::SnapshotBuilder;
use super::state::GameState;
use super::Outbox;

/// Phase transitions and their side effects
pub struct MatchLifecycle;

impl MatchLifecycle {
    /// Reset the world and open an intermission starting at `now`
    pub fn enter_intermission(state: &mut GameState, config: &GameConfig, now: u64, out: &mut Outbox) {
        state.reset_world();
        state.match_state.phase = MatchPhase::Intermission;
        state.match_state.intermission_started_at = Some(now);
        state.match_state.match_started_at = None;

        info!(duration_ms = config.intermission_duration_ms, "Intermission started");
        out.all(ServerMsg::IntermissionStart {
            duration_ms: config.intermission_duration_ms,
            server_timestamp: now,
        });
        out.all(SnapshotBuilder::build(state, now));
    }

    /// Start a match at `now`; every player gets a fresh artillery charge
    pub fn enter_match(state: &mut GameState, config: &GameConfig, now: u64, out: &mut Outbox) {
        state.match_state.phase = MatchPhase::Match;
        state.match_state.match_started_at = Some(now);
        for player in state.players.values_mut() {
            player.artillery_charges_remaining = STARTING_ARTILLERY_CHARGES;
        }

        info!(duration_ms = config.match_duration_ms, "Match started");
        out.all(ServerMsg::MatchStart {
            duration_ms: config.match_duration_ms,
            server_timestamp: now,
        });
        out.all(SnapshotBuilder::build(state, now));
    }

    /// Score the match and publish the result. The caller re-enters
    /// intermission right after.
    pub fn end_match(state: &GameState, now: u64, out: &mut Outbox) -> Option<Faction> {
        let scores = state.scores();
        let winner = Self::winner(scores);

        info!(
            score_1 = scores.one,
            score_2 = scores.two,
            winner = winner.map(Faction::id),
            "Match ended"
        );
        out.all(ServerMsg::MatchEnd {
            winner,
            scores,
            server_timestamp: now,
        });
        winner
    }

    /// More controlled points wins; equal is a draw
    pub fn winner(scores: FactionCounts) -> Option<Faction> {
        match scores.one.cmp(&scores.two) {
            std::cmp::Ordering::Greater => Some(Faction::One),
            std::cmp::Ordering::Less => Some(Faction::Two),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// Wall-clock instant the current phase ends, if it has a start time
    pub fn phase_deadline(state: &GameState, config: &GameConfig) -> Option<u64> {
        let ms = &state.match_state;
        match ms.phase {
            MatchPhase::Intermission => ms
                .intermission_started_at
                .map(|start| start + config.intermission_duration_ms),
            MatchPhase::Match => ms.match_started_at.map(|start| start + config.match_duration_ms),
        }
    }

    /// Remaining time in the current phase, floored at zero
    pub fn remaining(state: &GameState, config: &GameConfig, now: u64) -> u64 {
        Self::phase_deadline(state, config)
            .map(|deadline| deadline.saturating_sub(now))
            .unwrap_or(0)
    }

    /// Read-only countdown for clients
    pub fn status_report(state: &GameState, config: &GameConfig, now: u64, out: &mut Outbox) {
        let remaining_time = Self::remaining(state, config, now);
        let msg = match state.match_state.phase {
            MatchPhase::Intermission => ServerMsg::IntermissionTimeUpdate {
                remaining_time,
                is_intermission: true,
                server_timestamp: now,
            },
            MatchPhase::Match => ServerMsg::MatchTimeUpdate {
                remaining_time,
                statistics: SnapshotBuilder::statistics(state),
                is_intermission: false,
                server_timestamp: now,
            },
        };
        out.all(msg);
    }
}
