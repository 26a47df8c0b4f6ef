//! Combat system - damage, destruction, kill credit

use super::model::{Faction, Tank, TankLocation, MAX_HEALTH};

/// Delay before a destroyed tank respawns
pub const RESPAWN_DELAY_MS: u64 = 3_000;
/// Blast radius of an artillery strike
pub const ARTILLERY_STRIKE_RADIUS: f64 = 15.0;
/// Damage at the center of an artillery strike
pub const ARTILLERY_STRIKE_DAMAGE: f64 = 50.0;
/// Base damage per tick in a capture-point battle
pub const BATTLE_DAMAGE: f64 = 10.0;

/// Who gets credited for a kill
#[derive(Debug, Clone, PartialEq)]
pub struct Killer {
    pub tank_id: u32,
    pub owner: String,
}

/// Combat system for managing damage
pub struct CombatSystem;

impl CombatSystem {
    /// Apply damage to health, returns (new_health, is_dead)
    pub fn apply_damage(current_health: f64, damage: f64) -> (f64, bool) {
        let new_health = (current_health - damage).clamp(0.0, MAX_HEALTH);
        (new_health, new_health <= 0.0)
    }

    /// Artillery damage with linear falloff, zero at and beyond the radius
    pub fn artillery_damage(distance: f64) -> f64 {
        if distance >= ARTILLERY_STRIKE_RADIUS {
            return 0.0;
        }
        ARTILLERY_STRIKE_DAMAGE * (1.0 - distance / ARTILLERY_STRIKE_RADIUS)
    }

    /// Per-tick battle damage dealt to each tank of a side
    pub fn battle_damage(own: u32, opposing: u32, defense_boost: f64) -> f64 {
        if own == 0 {
            return 0.0;
        }
        BATTLE_DAMAGE * opposing as f64 / (own as f64 * defense_boost)
    }

    /// Take a tank off the field until its respawn timer elapses.
    ///
    /// Counters are the caller's business; the tank ends up `AtBase`
    /// but is not stationed until it respawns.
    pub fn destroy(tank: &mut Tank, now: u64) {
        tank.health = 0.0;
        tank.visible = false;
        tank.respawn_at = Some(now + RESPAWN_DELAY_MS);
        tank.healing_since = None;
        tank.location = TankLocation::AtBase;
    }

    /// Credit `tanks[killer_idx]` with killing a tank of `victim_faction`
    pub fn credit_kill(tanks: &mut [Tank], killer_idx: usize, victim_faction: Faction) -> Killer {
        let killer = &mut tanks[killer_idx];
        if killer.faction == victim_faction {
            killer.friendly_kills += 1;
        } else {
            killer.enemy_kills += 1;
        }
        Killer {
            tank_id: killer.id,
            owner: killer.owner.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::model::Position;

    #[test]
    fn damage_is_clamped() {
        assert_eq!(CombatSystem::apply_damage(20.0, 35.0), (0.0, true));
        assert_eq!(CombatSystem::apply_damage(100.0, -50.0), (100.0, false));
        assert_eq!(CombatSystem::apply_damage(70.0, 30.0), (40.0, false));
    }

    #[test]
    fn artillery_falloff_is_linear() {
        assert_eq!(CombatSystem::artillery_damage(0.0), 50.0);
        assert_eq!(CombatSystem::artillery_damage(15.0), 0.0);
        assert_eq!(CombatSystem::artillery_damage(40.0), 0.0);
        assert!((CombatSystem::artillery_damage(7.5) - 25.0).abs() < 1e-12);
    }

    #[test]
    fn battle_damage_scales_with_odds() {
        assert_eq!(CombatSystem::battle_damage(1, 3, 1.0), 30.0);
        assert!((CombatSystem::battle_damage(3, 1, 1.0) - 10.0 / 3.0).abs() < 1e-12);
        assert!((CombatSystem::battle_damage(2, 2, 1.5) - 10.0 / 1.5).abs() < 1e-12);
        assert_eq!(CombatSystem::battle_damage(0, 4, 1.0), 0.0);
    }

    #[test]
    fn destroy_schedules_respawn() {
        let mut tank = Tank::new(1, "w".into(), Faction::One, Position::new(5.0, 5.0));
        tank.location = TankLocation::AtPoint(3);
        tank.healing_since = Some(10);
        CombatSystem::destroy(&mut tank, 1_000);

        assert_eq!(tank.health, 0.0);
        assert!(!tank.visible);
        assert_eq!(tank.respawn_at, Some(1_000 + RESPAWN_DELAY_MS));
        assert_eq!(tank.location, TankLocation::AtBase);
        assert!(!tank.is_stationed_at_base());
    }

    #[test]
    fn kill_credit_depends_on_faction() {
        let mut tanks = vec![
            Tank::new(1, "a".into(), Faction::One, Position::default()),
            Tank::new(2, "b".into(), Faction::Two, Position::default()),
            Tank::new(3, "c".into(), Faction::One, Position::default()),
        ];
        let killer = CombatSystem::credit_kill(&mut tanks, 0, Faction::Two);
        CombatSystem::credit_kill(&mut tanks, 0, Faction::One);

        assert_eq!(killer, Killer { tank_id: 1, owner: "a".into() });
        assert_eq!(tanks[0].enemy_kills, 1);
        assert_eq!(tanks[0].friendly_kills, 1);
    }
}
