//! The single authoritative game-state container

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::model::{
    CapturePoint, Faction, FactionCounts, Hq, MatchState, Player, Position, Tank, TankLocation,
    MAP_SIZE,
};

/// Radius of the ring of outer capture points around the map center
pub const CAPTURE_RING_RADIUS: f64 = 30.0;
/// Number of points on the outer ring
pub const RING_POINT_COUNT: u32 = 8;

/// Whole-world state, owned by exactly one simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub players: BTreeMap<String, Player>,
    pub hqs: Vec<Hq>,
    pub tanks: Vec<Tank>,
    pub capture_points: Vec<CapturePoint>,
    pub match_state: MatchState,
    pub next_tank_id: u32,
}

impl GameState {
    pub fn new() -> Self {
        let mut state = Self {
            players: BTreeMap::new(),
            hqs: Vec::new(),
            tanks: Vec::new(),
            capture_points: Vec::new(),
            match_state: MatchState::default(),
            next_tank_id: 1,
        };
        state.reset_world();
        state
    }

    /// Re-initialize HQs, tanks, players and capture points.
    /// Match timing is left to the lifecycle.
    pub fn reset_world(&mut self) {
        self.players.clear();
        self.tanks.clear();
        self.next_tank_id = 1;
        self.hqs = vec![
            Hq::new(Faction::One, Position::new(10.0, 90.0)),
            Hq::new(Faction::Two, Position::new(90.0, 10.0)),
        ];
        self.capture_points = generate_capture_points();
    }

    pub fn hq(&self, faction: Faction) -> Option<&Hq> {
        self.hqs.iter().find(|hq| hq.id == faction)
    }

    pub fn hq_mut(&mut self, faction: Faction) -> Option<&mut Hq> {
        self.hqs.iter_mut().find(|hq| hq.id == faction)
    }

    pub fn capture_point(&self, id: u32) -> Option<&CapturePoint> {
        self.capture_points.iter().find(|cp| cp.id == id)
    }

    pub fn capture_point_mut(&mut self, id: u32) -> Option<&mut CapturePoint> {
        self.capture_points.iter_mut().find(|cp| cp.id == id)
    }

    pub fn tank_index_by_owner(&self, wallet: &str) -> Option<usize> {
        self.tanks.iter().position(|t| t.owner == wallet)
    }

    pub fn tank_by_owner(&self, wallet: &str) -> Option<&Tank> {
        self.tanks.iter().find(|t| t.owner == wallet)
    }

    pub fn allocate_tank_id(&mut self) -> u32 {
        let id = self.next_tank_id;
        self.next_tank_id += 1;
        id
    }

    /// Wallets of every player on a faction
    pub fn wallets_of(&self, faction: Faction) -> Vec<String> {
        self.players
            .values()
            .filter(|p| p.faction == faction)
            .map(|p| p.wallet_address.clone())
            .collect()
    }

    /// Remove a tank from the counter of the place it is leaving.
    /// Moving tanks are not counted anywhere, so leaving transit is free.
    pub fn leave_location(&mut self, tank_idx: usize) {
        let (faction, location) = {
            let tank = &self.tanks[tank_idx];
            (tank.faction, tank.location)
        };
        match location {
            TankLocation::AtPoint(point_id) => {
                if let Some(point) = self.capture_point_mut(point_id) {
                    let count = point.tanks_by_faction.get_mut(faction);
                    *count = count.saturating_sub(1);
                }
            }
            TankLocation::AtBase => {
                if self.tanks[tank_idx].is_alive() {
                    if let Some(hq) = self.hq_mut(faction) {
                        hq.tank_count = hq.tank_count.saturating_sub(1);
                    }
                }
            }
            TankLocation::MovingToBase | TankLocation::MovingToPoint(_) => {}
        }
    }

    /// Recompute every derived counter from tank locations, overwriting drift.
    /// Returns the number of counters that had to be corrected.
    pub fn reconcile(&mut self) -> usize {
        let mut corrected = 0;

        for point in &mut self.capture_points {
            let mut census = FactionCounts::default();
            for tank in &self.tanks {
                if tank.location == TankLocation::AtPoint(point.id) {
                    *census.get_mut(tank.faction) += 1;
                }
            }
            if point.tanks_by_faction != census {
                debug!(
                    capture_point = point.id,
                    before_1 = point.tanks_by_faction.one,
                    before_2 = point.tanks_by_faction.two,
                    after_1 = census.one,
                    after_2 = census.two,
                    "Reconciled capture point tank counts"
                );
                point.tanks_by_faction = census;
                corrected += 1;
            }
        }

        for hq in &mut self.hqs {
            let stationed = self
                .tanks
                .iter()
                .filter(|t| t.faction == hq.id && t.is_stationed_at_base())
                .count() as u32;
            if hq.tank_count != stationed {
                debug!(
                    hq = hq.id.id(),
                    before = hq.tank_count,
                    after = stationed,
                    "Reconciled HQ tank count"
                );
                hq.tank_count = stationed;
                corrected += 1;
            }
        }

        corrected
    }

    /// Points controlled per faction
    pub fn scores(&self) -> FactionCounts {
        let mut scores = FactionCounts::default();
        for point in &self.capture_points {
            if let Some(faction) = point.controlled_by {
                *scores.get_mut(faction) += 1;
            }
        }
        scores
    }

    /// Tanks owned per faction, alive or awaiting respawn
    pub fn tank_counts(&self) -> FactionCounts {
        let mut counts = FactionCounts::default();
        for tank in &self.tanks {
            *counts.get_mut(tank.faction) += 1;
        }
        counts
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

/// Center point (id 1) followed by the eight ring points (ids 2..=9)
fn generate_capture_points() -> Vec<CapturePoint> {
    let center = MAP_SIZE / 2.0;
    let mut points = vec![CapturePoint::new(1, Position::new(center, center))];

    for i in 0..RING_POINT_COUNT {
        let angle = (i as f64 / RING_POINT_COUNT as f64) * std::f64::consts::TAU;
        points.push(CapturePoint::new(
            i + 2,
            Position::new(
                center + CAPTURE_RING_RADIUS * angle.cos(),
                center + CAPTURE_RING_RADIUS * angle.sin(),
            ),
        ));
    }

    points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tank_at(state: &mut GameState, owner: &str, faction: Faction, location: TankLocation) -> usize {
        let id = state.allocate_tank_id();
        let mut tank = Tank::new(id, owner.to_string(), faction, Position::new(50.0, 50.0));
        tank.location = location;
        state.tanks.push(tank);
        state.tanks.len() - 1
    }

    #[test]
    fn reset_builds_fixed_layout() {
        let state = GameState::new();
        assert_eq!(state.capture_points.len(), 9);
        assert_eq!(state.capture_points[0].position, Position::new(50.0, 50.0));
        for point in &state.capture_points[1..] {
            let d = point.position.distance_to(&Position::new(50.0, 50.0));
            assert!((d - CAPTURE_RING_RADIUS).abs() < 1e-9);
        }
        let ids: Vec<u32> = state.capture_points.iter().map(|cp| cp.id).collect();
        assert_eq!(ids, (1..=9).collect::<Vec<_>>());
        assert_eq!(state.hq(Faction::One).unwrap().position, Position::new(10.0, 90.0));
        assert_eq!(state.hq(Faction::Two).unwrap().position, Position::new(90.0, 10.0));
    }

    #[test]
    fn reset_clears_entities_and_tank_ids() {
        let mut state = GameState::new();
        tank_at(&mut state, "a", Faction::One, TankLocation::AtBase);
        state
            .players
            .insert("a".into(), Player::new("a".into(), Faction::One, 1));
        state.capture_points[3].capture_progress = 40.0;

        state.reset_world();

        assert!(state.tanks.is_empty());
        assert!(state.players.is_empty());
        assert_eq!(state.capture_points[3].capture_progress, 0.0);
        assert_eq!(state.allocate_tank_id(), 1);
    }

    #[test]
    fn reconcile_matches_census_after_drift() {
        let mut state = GameState::new();
        tank_at(&mut state, "a", Faction::One, TankLocation::AtPoint(3));
        tank_at(&mut state, "b", Faction::One, TankLocation::AtPoint(3));
        tank_at(&mut state, "c", Faction::Two, TankLocation::AtPoint(3));
        tank_at(&mut state, "d", Faction::Two, TankLocation::MovingToPoint(3));
        tank_at(&mut state, "e", Faction::Two, TankLocation::AtBase);

        state.capture_point_mut(3).unwrap().tanks_by_faction = FactionCounts { one: 7, two: 0 };
        state.capture_point_mut(5).unwrap().tanks_by_faction = FactionCounts { one: 1, two: 1 };

        let corrected = state.reconcile();
        assert!(corrected >= 2);

        assert_eq!(
            state.capture_point(3).unwrap().tanks_by_faction,
            FactionCounts { one: 2, two: 1 }
        );
        assert_eq!(state.capture_point(5).unwrap().tanks_by_faction.total(), 0);
        assert_eq!(state.hq(Faction::Two).unwrap().tank_count, 1);
        assert_eq!(state.hq(Faction::One).unwrap().tank_count, 0);
        assert_eq!(state.reconcile(), 0);
    }

    #[test]
    fn dead_tanks_are_not_stationed() {
        let mut state = GameState::new();
        let idx = tank_at(&mut state, "a", Faction::One, TankLocation::AtBase);
        state.tanks[idx].health = 0.0;
        state.reconcile();
        assert_eq!(state.hq(Faction::One).unwrap().tank_count, 0);
    }

    #[test]
    fn leave_location_never_underflows() {
        let mut state = GameState::new();
        let idx = tank_at(&mut state, "a", Faction::Two, TankLocation::AtPoint(2));
        state.leave_location(idx);
        assert_eq!(state.capture_point(2).unwrap().tanks_by_faction.two, 0);
    }

    #[test]
    fn scores_count_controlled_points() {
        let mut state = GameState::new();
        for point in state.capture_points.iter_mut().take(5) {
            point.controlled_by = Some(Faction::One);
        }
        for point in state.capture_points.iter_mut().skip(5).take(3) {
            point.controlled_by = Some(Faction::Two);
        }
        assert_eq!(state.scores(), FactionCounts { one: 5, two: 3 });
    }
}
