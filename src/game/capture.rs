//! Capture-point contest and battle resolution

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info, trace};

use crate::ws::protocol::{DeathCause, ServerMsg};

use super::combat::CombatSystem;
use super::model::{CapturePoint, Faction, Tank, TankLocation};
use super::state::GameState;
use super::Outbox;

/// Progress gained per tick at full share superiority
pub const CAPTURE_RATE: f64 = 10.0;
/// Progress magnitude meaning full control
pub const MAX_CAPTURE_PROGRESS: f64 = 100.0;
/// Time a controller must hold a point before its defense starts ramping
pub const DEFENSE_GRACE_MS: u64 = 9_000;
/// Defense boost gained per resolver pass once the grace period is over
pub const DEFENSE_BOOST_STEP: f64 = 0.01;
pub const MAX_DEFENSE_BOOST: f64 = 1.5;

/// Control change produced by a progress update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlChange {
    Captured(Faction),
    Neutralized,
}

/// Resolves progress, control, defense and battles at capture points
pub struct CaptureResolver;

impl CaptureResolver {
    /// One full resolver pass over the point at `point_idx`
    pub fn resolve<R: Rng + ?Sized>(
        state: &mut GameState,
        point_idx: usize,
        now: u64,
        rng: &mut R,
        out: &mut Outbox,
    ) {
        let point = &mut state.capture_points[point_idx];
        match Self::update_control(point, now) {
            Some(ControlChange::Captured(faction)) => {
                info!(capture_point = point.id, hq = faction.id(), "Capture point captured");
            }
            Some(ControlChange::Neutralized) => {
                info!(capture_point = point.id, "Capture point neutralized");
            }
            None => {}
        }

        Self::battle(state, point_idx, now, rng, out);
    }

    /// Advance capture progress from faction shares, then apply control
    /// transitions and the defense ramp.
    pub fn update_control(point: &mut CapturePoint, now: u64) -> Option<ControlChange> {
        let counts = point.tanks_by_faction;
        let total = counts.total();
        let (share_1, share_2) = if total > 0 {
            (
                counts.one as f64 / total as f64,
                counts.two as f64 / total as f64,
            )
        } else {
            (0.0, 0.0)
        };

        point.capture_progress = (point.capture_progress + (share_1 - share_2) * CAPTURE_RATE)
            .clamp(-MAX_CAPTURE_PROGRESS, MAX_CAPTURE_PROGRESS);

        // Hysteresis: control only moves at the exact boundaries
        let target = if point.capture_progress == MAX_CAPTURE_PROGRESS {
            Some(Some(Faction::One))
        } else if point.capture_progress == -MAX_CAPTURE_PROGRESS {
            Some(Some(Faction::Two))
        } else if point.capture_progress == 0.0 {
            Some(None)
        } else {
            None
        };

        let mut change = None;
        if let Some(controller) = target {
            if point.controlled_by != controller {
                point.controlled_by = controller;
                point.capture_time = controller.map(|_| now);
                point.defense_boost = 1.0;
                change = Some(match controller {
                    Some(faction) => ControlChange::Captured(faction),
                    None => ControlChange::Neutralized,
                });
            }
        }

        if let (Some(controller), Some(captured_at)) = (point.controlled_by, point.capture_time) {
            if now.saturating_sub(captured_at) >= DEFENSE_GRACE_MS
                && point.defense_boost < MAX_DEFENSE_BOOST
            {
                point.defense_boost = (point.defense_boost + DEFENSE_BOOST_STEP).min(MAX_DEFENSE_BOOST);
                debug!(
                    capture_point = point.id,
                    hq = controller.id(),
                    defense_boost = point.defense_boost,
                    "Defense boost ramped"
                );
            }
        }

        change
    }

    /// Tank-vs-tank combat when both factions hold ground at the point
    fn battle<R: Rng + ?Sized>(
        state: &mut GameState,
        point_idx: usize,
        now: u64,
        rng: &mut R,
        out: &mut Outbox,
    ) {
        let point = &state.capture_points[point_idx];
        let point_id = point.id;
        let counts = point.tanks_by_faction;
        if counts.one == 0 || counts.two == 0 {
            return;
        }

        let boost_for = |faction: Faction| {
            if point.controlled_by == Some(faction) {
                point.defense_boost
            } else {
                1.0
            }
        };
        let damage_1 = CombatSystem::battle_damage(counts.one, counts.two, boost_for(Faction::One));
        let damage_2 = CombatSystem::battle_damage(counts.two, counts.one, boost_for(Faction::Two));

        let mut side_1 = present_at(&state.tanks, point_id, Faction::One);
        let mut side_2 = present_at(&state.tanks, point_id, Faction::Two);

        hit_side(&mut state.tanks, &mut side_1, damage_1, &side_2, now, rng, out);
        hit_side(&mut state.tanks, &mut side_2, damage_2, &side_1, now, rng, out);

        let point = &mut state.capture_points[point_idx];
        point.tanks_by_faction.set(Faction::One, side_1.len() as u32);
        point.tanks_by_faction.set(Faction::Two, side_2.len() as u32);
    }
}

/// Indices of live tanks of `faction` docked at `point_id`
fn present_at(tanks: &[Tank], point_id: u32, faction: Faction) -> Vec<usize> {
    tanks
        .iter()
        .enumerate()
        .filter(|(_, t)| {
            t.faction == faction && t.location == TankLocation::AtPoint(point_id) && t.is_alive()
        })
        .map(|(idx, _)| idx)
        .collect()
}

/// Damage every tank of one side; destroyed tanks leave `side` and a random
/// opposing tank takes the credit.
fn hit_side<R: Rng + ?Sized>(
    tanks: &mut [Tank],
    side: &mut Vec<usize>,
    damage: f64,
    enemies: &[usize],
    now: u64,
    rng: &mut R,
    out: &mut Outbox,
) {
    side.retain(|&idx| {
        let (health, dead) = CombatSystem::apply_damage(tanks[idx].health, damage);
        tanks[idx].health = health;
        trace!(tank_id = tanks[idx].id, health, "Battle damage");

        if !dead {
            return true;
        }

        let victim_faction = tanks[idx].faction;
        CombatSystem::destroy(&mut tanks[idx], now);
        let killer = enemies
            .choose(&mut *rng)
            .map(|&killer_idx| CombatSystem::credit_kill(tanks, killer_idx, victim_faction));

        let victim = &tanks[idx];
        info!(
            tank_id = victim.id,
            owner = %victim.owner,
            killer = killer.as_ref().map(|k| k.tank_id),
            "Tank destroyed in battle"
        );
        out.all(ServerMsg::TankDestroyed {
            tank_id: victim.id,
            owner: victim.owner.clone(),
            killer_tank_id: killer.as_ref().map(|k| k.tank_id),
            killer_owner: killer.map(|k| k.owner),
            cause: DeathCause::Battle,
            server_timestamp: now,
        });
        false
    });
}
