//! Fixed-rate world update

use rand::Rng;
use tracing::{debug, info};

use crate::ws::protocol::ServerMsg;

use super::capture::CaptureResolver;
use super::model::{MatchPhase, Position, TankLocation, MAX_HEALTH};
use super::physics::{MovementSystem, Step};
use super::snapshot::SnapshotBuilder;
use super::state::GameState;
use super::Outbox;

/// Time at base for a full heal
pub const HEAL_DURATION_MS: u64 = 3_000;

/// Advance the world by one tick of `dt` seconds.
///
/// Per tank: respawn, movement, healing. Then counters are reconciled,
/// every capture point is resolved and one snapshot is published.
pub fn run_world_tick<R: Rng + ?Sized>(
    state: &mut GameState,
    now: u64,
    dt: f64,
    rng: &mut R,
    out: &mut Outbox,
) {
    if state.match_state.phase == MatchPhase::Intermission {
        return;
    }

    for idx in 0..state.tanks.len() {
        respawn(state, idx, now, out);
        advance_movement(state, idx, now, dt);
        heal(state, idx, now, dt, out);
    }

    let corrected = state.reconcile();
    if corrected > 0 {
        debug!(corrected, "Counters drifted and were reconciled");
    }

    for point_idx in 0..state.capture_points.len() {
        CaptureResolver::resolve(state, point_idx, now, rng, out);
    }

    out.all(SnapshotBuilder::build(state, now));
}

fn respawn(state: &mut GameState, idx: usize, now: u64, out: &mut Outbox) {
    let tank = &state.tanks[idx];
    let Some(respawn_at) = tank.respawn_at else {
        return;
    };
    if now < respawn_at {
        return;
    }

    let faction = tank.faction;
    let Some(home) = state.hq(faction).map(|hq| hq.position) else {
        return;
    };

    let tank = &mut state.tanks[idx];
    tank.health = MAX_HEALTH;
    tank.visible = true;
    tank.position = home;
    tank.location = TankLocation::AtBase;
    tank.respawn_at = None;
    tank.healing_since = None;
    let (tank_id, owner) = (tank.id, tank.owner.clone());

    if let Some(hq) = state.hq_mut(faction) {
        hq.tank_count += 1;
    }

    info!(tank_id, owner = %owner, "Tank respawned");
    out.all(ServerMsg::TankSpawned {
        wallet_address: owner,
        tank_id,
        faction,
        position: home,
        respawn: true,
        server_timestamp: now,
    });
}

fn advance_movement(state: &mut GameState, idx: usize, now: u64, dt: f64) {
    let tank = &state.tanks[idx];
    if !tank.is_alive() {
        return;
    }

    let target = match tank.location {
        TankLocation::MovingToBase => state.hq(tank.faction).map(|hq| hq.position),
        TankLocation::MovingToPoint(id) => state.capture_point(id).map(|cp| cp.position),
        TankLocation::AtBase | TankLocation::AtPoint(_) => return,
    };
    let Some(target) = target else {
        return;
    };

    match MovementSystem::step_towards(tank.position, target, dt) {
        Step::Moved(position) => {
            state.tanks[idx].position = position;
        }
        Step::Arrived => arrive(state, idx, target, now),
    }
}

fn arrive(state: &mut GameState, idx: usize, target: Position, now: u64) {
    let tank = &mut state.tanks[idx];
    tank.position = target;
    let (tank_id, faction, location) = (tank.id, tank.faction, tank.location);

    match location {
        TankLocation::MovingToBase => {
            tank.location = TankLocation::AtBase;
            tank.healing_since = Some(now);
            if let Some(hq) = state.hq_mut(faction) {
                hq.tank_count += 1;
            }
            debug!(tank_id, "Tank arrived at base");
        }
        TankLocation::MovingToPoint(point_id) => {
            tank.location = TankLocation::AtPoint(point_id);
            tank.visible = false;
            if let Some(point) = state.capture_point_mut(point_id) {
                let count = point.tanks_by_faction.get_mut(faction);
                *count = (*count + 1).max(1);
            }
            debug!(tank_id, capture_point = point_id, "Tank arrived at capture point");
        }
        TankLocation::AtBase | TankLocation::AtPoint(_) => {}
    }
}

fn heal(state: &mut GameState, idx: usize, now: u64, dt: f64, out: &mut Outbox) {
    let tank = &mut state.tanks[idx];
    let Some(since) = tank.healing_since else {
        return;
    };

    if now.saturating_sub(since) >= HEAL_DURATION_MS {
        tank.health = MAX_HEALTH;
        tank.healing_since = None;
        info!(tank_id = tank.id, owner = %tank.owner, "Tank fully healed");
        out.all(ServerMsg::TankHealed {
            tank_id: tank.id,
            owner: tank.owner.clone(),
            server_timestamp: now,
        });
    } else {
        let rate = MAX_HEALTH / HEAL_DURATION_MS as f64;
        tank.health = (tank.health + rate * dt * 1_000.0).min(MAX_HEALTH);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::combat::{CombatSystem, RESPAWN_DELAY_MS};
    use crate::game::model::{Faction, Tank};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const DT: f64 = 0.1;

    fn live_state() -> GameState {
        let mut state = GameState::new();
        state.match_state.phase = MatchPhase::Match;
        state
    }

    fn add_tank(state: &mut GameState, owner: &str, faction: Faction, position: Position) -> usize {
        let id = state.allocate_tank_id();
        state.tanks.push(Tank::new(id, owner.into(), faction, position));
        state.tanks.len() - 1
    }

    fn tick(state: &mut GameState, now: u64, rng: &mut ChaCha8Rng) -> Outbox {
        let mut out = Outbox::new();
        run_world_tick(state, now, DT, rng, &mut out);
        out
    }

    #[test]
    fn intermission_tick_is_noop() {
        let mut state = GameState::new();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        add_tank(&mut state, "a", Faction::One, Position::new(10.0, 90.0));
        state.tanks[0].location = TankLocation::MovingToPoint(1);
        let before = state.clone();

        assert!(tick(&mut state, 100, &mut rng).is_empty());
        assert_eq!(state, before);
    }

    #[test]
    fn tick_publishes_one_snapshot() {
        let mut state = live_state();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let messages = tick(&mut state, 100, &mut rng).into_messages();
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0].msg, ServerMsg::GameUpdate { .. }));
    }

    #[test]
    fn tank_travels_and_docks_at_point() {
        let mut state = live_state();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let idx = add_tank(&mut state, "a", Faction::One, Position::new(50.0, 45.0));
        state.tanks[idx].location = TankLocation::MovingToPoint(1);

        tick(&mut state, 100, &mut rng);
        assert!((state.tanks[idx].position.y - 47.0).abs() < 1e-9);
        tick(&mut state, 200, &mut rng);
        assert!((state.tanks[idx].position.y - 49.0).abs() < 1e-9);
        tick(&mut state, 300, &mut rng);

        let tank = &state.tanks[idx];
        assert_eq!(tank.location, TankLocation::AtPoint(1));
        assert_eq!(tank.position, Position::new(50.0, 50.0));
        assert!(!tank.visible);
        assert_eq!(state.capture_point(1).unwrap().tanks_by_faction.one, 1);
        // the same tick's resolver pass already counted the arrival
        assert_eq!(state.capture_point(1).unwrap().capture_progress, 10.0);
    }

    #[test]
    fn capture_step_is_per_tick_not_per_second() {
        let mut state = live_state();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let point = state.capture_point(1).unwrap().position;
        let idx = add_tank(&mut state, "a", Faction::One, point);
        state.tanks[idx].location = TankLocation::AtPoint(1);

        let mut out = Outbox::new();
        run_world_tick(&mut state, 50, 0.05, &mut rng, &mut out);
        assert_eq!(state.capture_point(1).unwrap().capture_progress, 10.0);
    }

    #[test]
    fn arrival_at_base_starts_healing() {
        let mut state = live_state();
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let idx = add_tank(&mut state, "a", Faction::Two, Position::new(89.0, 10.0));
        state.tanks[idx].location = TankLocation::MovingToBase;
        state.tanks[idx].health = 40.0;

        tick(&mut state, 1_000, &mut rng);
        let tank = &state.tanks[idx];
        assert_eq!(tank.location, TankLocation::AtBase);
        assert_eq!(tank.healing_since, Some(1_000));
        assert_eq!(state.hq(Faction::Two).unwrap().tank_count, 1);

        // 100 hp per 3 s, accrued on the arrival tick and the next one
        tick(&mut state, 1_100, &mut rng);
        assert!((state.tanks[idx].health - (40.0 + 2.0 * 100.0 / 30.0)).abs() < 1e-9);

        let messages = tick(&mut state, 1_000 + HEAL_DURATION_MS, &mut rng).into_messages();
        assert_eq!(state.tanks[idx].health, 100.0);
        assert_eq!(state.tanks[idx].healing_since, None);
        assert!(messages.iter().any(|m| matches!(m.msg, ServerMsg::TankHealed { .. })));
    }

    #[test]
    fn destroyed_tank_respawns_at_hq() {
        let mut state = live_state();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let idx = add_tank(&mut state, "a", Faction::One, Position::new(50.0, 50.0));
        state.tanks[idx].location = TankLocation::AtPoint(1);
        CombatSystem::destroy(&mut state.tanks[idx], 0);

        tick(&mut state, RESPAWN_DELAY_MS - 1, &mut rng);
        assert!(!state.tanks[idx].is_alive());
        assert_eq!(state.hq(Faction::One).unwrap().tank_count, 0);

        let messages = tick(&mut state, RESPAWN_DELAY_MS, &mut rng).into_messages();
        let tank = &state.tanks[idx];
        assert_eq!(tank.health, 100.0);
        assert!(tank.visible);
        assert_eq!(tank.position, Position::new(10.0, 90.0));
        assert_eq!(tank.respawn_at, None);
        assert_eq!(state.hq(Faction::One).unwrap().tank_count, 1);
        assert!(messages
            .iter()
            .any(|m| matches!(m.msg, ServerMsg::TankSpawned { respawn: true, .. })));
    }

    #[test]
    fn dead_tanks_do_not_move() {
        let mut state = live_state();
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let idx = add_tank(&mut state, "a", Faction::One, Position::new(20.0, 20.0));
        state.tanks[idx].location = TankLocation::MovingToPoint(1);
        state.tanks[idx].health = 0.0;
        state.tanks[idx].respawn_at = Some(10_000);

        tick(&mut state, 100, &mut rng);
        assert_eq!(state.tanks[idx].position, Position::new(20.0, 20.0));
    }
}
