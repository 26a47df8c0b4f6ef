//! Straight-line movement and spawn placement

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use rand::Rng;

use super::model::{Faction, Position};

/// Tank travel speed in map units per second
pub const MOVE_SPEED: f64 = 20.0;
/// Radius of the spawn disk around an HQ
pub const SPAWN_RADIUS: f64 = 10.0;

/// Outcome of one movement step
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    /// Target is within this tick's travel distance
    Arrived,
    /// Still travelling; new position after the step
    Moved(Position),
}

/// Movement system for tanks in transit
pub struct MovementSystem;

impl MovementSystem {
    /// Advance `from` towards `target` by `MOVE_SPEED * dt`
    pub fn step_towards(from: Position, target: Position, dt: f64) -> Step {
        let travel = MOVE_SPEED * dt;
        let dx = target.x - from.x;
        let dy = target.y - from.y;
        let distance = (dx * dx + dy * dy).sqrt();

        if distance <= travel {
            return Step::Arrived;
        }

        let ratio = travel / distance;
        Step::Moved(Position::new(from.x + dx * ratio, from.y + dy * ratio))
    }

    /// Centre of the quarter-turn spawn arc, facing away from the HQ's corner
    pub fn spawn_bias(faction: Faction) -> f64 {
        match faction {
            Faction::One => FRAC_PI_4,
            Faction::Two => 5.0 * FRAC_PI_4,
        }
    }

    /// Random spawn position near an HQ.
    ///
    /// The angle is uniform within ±π/4 of the faction bias; the radius uses
    /// `sqrt(u)` so positions are uniform over the sector's area.
    pub fn spawn_position<R: Rng + ?Sized>(rng: &mut R, hq: Position, faction: Faction) -> Position {
        let angle = Self::spawn_bias(faction) + (rng.gen::<f64>() - 0.5) * FRAC_PI_2;
        let radius = SPAWN_RADIUS * rng.gen::<f64>().sqrt();

        Position::new(hq.x + radius * angle.cos(), hq.y + radius * angle.sin()).clamped()
    }
}
