//! Player commands: validation and atomic application

use rand::Rng;
use tracing::{info, warn};

use crate::ws::protocol::{AffectedUnit, ClientMsg, DeathCause, ServerMsg};

use super::capture::CaptureResolver;
use super::combat::{CombatSystem, ARTILLERY_STRIKE_RADIUS};
use super::model::{Faction, MatchPhase, Player, Position, Tank, TankLocation, MAX_HEALTH};
use super::physics::MovementSystem;
use super::snapshot::SnapshotBuilder;
use super::state::GameState;
use super::Outbox;

/// A validated-shape player intent
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SpawnTank {
        wallet: String,
        faction: u8,
    },
    MoveTank {
        wallet: String,
        capture_point_id: u32,
        action_timestamp: u64,
    },
    ReturnTankToBase {
        wallet: String,
        action_timestamp: u64,
    },
    ScanObjective {
        wallet: String,
        capture_point_id: u32,
        action_timestamp: u64,
    },
    SetScans {
        wallet: String,
        scans: i64,
    },
    ArtilleryStrike {
        wallet: String,
        position: Position,
        action_timestamp: u64,
    },
}

impl Command {
    /// Wire name of the command, used in `error` events
    pub fn name(&self) -> &'static str {
        match self {
            Command::SpawnTank { .. } => "spawnTank",
            Command::MoveTank { .. } => "moveTank",
            Command::ReturnTankToBase { .. } => "returnTankToBase",
            Command::ScanObjective { .. } => "scanObjective",
            Command::SetScans { .. } => "setScans",
            Command::ArtilleryStrike { .. } => "artilleryStrike",
        }
    }

    pub fn wallet(&self) -> &str {
        match self {
            Command::SpawnTank { wallet, .. }
            | Command::MoveTank { wallet, .. }
            | Command::ReturnTankToBase { wallet, .. }
            | Command::ScanObjective { wallet, .. }
            | Command::SetScans { wallet, .. }
            | Command::ArtilleryStrike { wallet, .. } => wallet,
        }
    }

    /// Map a client message to a game command. Transport-level messages
    /// (ping) have no game meaning and yield `None`.
    pub fn from_client(msg: ClientMsg) -> Option<Self> {
        let command = match msg {
            ClientMsg::SpawnTank { wallet_address, faction } => Command::SpawnTank {
                wallet: wallet_address,
                faction,
            },
            ClientMsg::MoveTank {
                wallet_address,
                capture_point_id,
                action_timestamp,
            } => Command::MoveTank {
                wallet: wallet_address,
                capture_point_id,
                action_timestamp,
            },
            ClientMsg::ReturnTankToBase {
                wallet_address,
                action_timestamp,
            } => Command::ReturnTankToBase {
                wallet: wallet_address,
                action_timestamp,
            },
            ClientMsg::ScanObjective {
                wallet_address,
                capture_point_id,
                action_timestamp,
            } => Command::ScanObjective {
                wallet: wallet_address,
                capture_point_id,
                action_timestamp,
            },
            ClientMsg::SetScans { wallet_address, scans } => Command::SetScans {
                wallet: wallet_address,
                scans,
            },
            ClientMsg::ArtilleryStrike {
                wallet_address,
                position,
                action_timestamp,
            } => Command::ArtilleryStrike {
                wallet: wallet_address,
                position,
                action_timestamp,
            },
            ClientMsg::Ping { .. } => return None,
        };
        Some(command)
    }
}

/// Why a command was rejected. State is untouched whenever one is returned.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("commands are not accepted during intermission")]
    IntermissionActive,

    #[error("wallet already has a tank")]
    TankAlreadyExists,

    #[error("unknown faction {0}")]
    UnknownFaction(u8),

    #[error("wallet has no tank")]
    NoTank,

    #[error("tank is destroyed")]
    TankDestroyed,

    #[error("unknown capture point {0}")]
    UnknownCapturePoint(u32),

    #[error("unknown player")]
    UnknownPlayer,

    #[error("no scans remaining")]
    NoScansRemaining,

    #[error("no artillery charges remaining")]
    NoArtilleryCharges,
}

impl CommandError {
    /// Stable machine-readable code for the wire
    pub fn code(&self) -> &'static str {
        match self {
            CommandError::IntermissionActive => "intermission_active",
            CommandError::TankAlreadyExists => "tank_already_exists",
            CommandError::UnknownFaction(_) => "unknown_faction",
            CommandError::NoTank => "no_tank",
            CommandError::TankDestroyed => "tank_destroyed",
            CommandError::UnknownCapturePoint(_) => "unknown_capture_point",
            CommandError::UnknownPlayer => "unknown_player",
            CommandError::NoScansRemaining => "no_scans_remaining",
            CommandError::NoArtilleryCharges => "no_artillery_charges",
        }
    }
}

/// Validate and apply one command. Events land in `out`; on `Err` nothing
/// has been mutated.
pub fn apply<R: Rng + ?Sized>(
    state: &mut GameState,
    command: Command,
    now: u64,
    rng: &mut R,
    out: &mut Outbox,
) -> Result<(), CommandError> {
    if state.match_state.phase == MatchPhase::Intermission {
        return Err(CommandError::IntermissionActive);
    }

    match command {
        Command::SpawnTank { wallet, faction } => spawn_tank(state, wallet, faction, now, rng, out),
        Command::MoveTank {
            wallet,
            capture_point_id,
            action_timestamp,
        } => move_tank(state, &wallet, capture_point_id, action_timestamp, now, out),
        Command::ReturnTankToBase {
            wallet,
            action_timestamp,
        } => return_to_base(state, &wallet, action_timestamp, now, out),
        Command::ScanObjective {
            wallet,
            capture_point_id,
            action_timestamp,
        } => scan_objective(state, &wallet, capture_point_id, action_timestamp, now, out),
        Command::SetScans { wallet, scans } => {
            set_scans(state, &wallet, scans, now, out);
            Ok(())
        }
        Command::ArtilleryStrike {
            wallet,
            position,
            action_timestamp,
        } => artillery_strike(state, &wallet, position, action_timestamp, now, rng, out),
    }
}

fn spawn_tank<R: Rng + ?Sized>(
    state: &mut GameState,
    wallet: String,
    faction: u8,
    now: u64,
    rng: &mut R,
    out: &mut Outbox,
) -> Result<(), CommandError> {
    if state.tank_by_owner(&wallet).is_some() {
        return Err(CommandError::TankAlreadyExists);
    }
    let faction = Faction::try_from(faction).map_err(|e| CommandError::UnknownFaction(e.0))?;
    let hq_position = state
        .hq(faction)
        .map(|hq| hq.position)
        .ok_or(CommandError::UnknownFaction(faction.id()))?;

    let position = MovementSystem::spawn_position(rng, hq_position, faction);
    let tank_id = state.allocate_tank_id();
    state
        .tanks
        .push(Tank::new(tank_id, wallet.clone(), faction, position));
    if let Some(hq) = state.hq_mut(faction) {
        hq.tank_count += 1;
    }
    state
        .players
        .insert(wallet.clone(), Player::new(wallet.clone(), faction, tank_id));

    info!(
        wallet = %wallet,
        tank_id,
        hq = faction.id(),
        x = position.x,
        y = position.y,
        "Tank spawned"
    );

    out.all(SnapshotBuilder::build(state, now));
    out.all(ServerMsg::TankSpawned {
        wallet_address: wallet,
        tank_id,
        faction,
        position,
        respawn: false,
        server_timestamp: now,
    });
    Ok(())
}

/// Index of the caller's live tank
fn live_tank(state: &GameState, wallet: &str) -> Result<usize, CommandError> {
    let idx = state.tank_index_by_owner(wallet).ok_or(CommandError::NoTank)?;
    if !state.tanks[idx].is_alive() {
        return Err(CommandError::TankDestroyed);
    }
    Ok(idx)
}

fn move_tank(
    state: &mut GameState,
    wallet: &str,
    capture_point_id: u32,
    action_timestamp: u64,
    now: u64,
    out: &mut Outbox,
) -> Result<(), CommandError> {
    let idx = live_tank(state, wallet)?;
    let target = state
        .capture_point(capture_point_id)
        .map(|cp| cp.position)
        .ok_or(CommandError::UnknownCapturePoint(capture_point_id))?;

    state.leave_location(idx);
    let tank = &mut state.tanks[idx];
    tank.location = TankLocation::MovingToPoint(capture_point_id);
    tank.visible = true;
    tank.healing_since = None;
    tank.face(&target);
    let tank_id = tank.id;

    info!(wallet = %wallet, tank_id, capture_point = capture_point_id, "Tank moving to capture point");

    out.all(SnapshotBuilder::build(state, now));
    out.all(ServerMsg::TankMoved {
        wallet_address: wallet.to_string(),
        tank_id,
        capture_point_id,
        action_timestamp,
        server_timestamp: now,
    });
    Ok(())
}

fn return_to_base(
    state: &mut GameState,
    wallet: &str,
    action_timestamp: u64,
    now: u64,
    out: &mut Outbox,
) -> Result<(), CommandError> {
    let idx = live_tank(state, wallet)?;
    let faction = state.tanks[idx].faction;
    let home = state
        .hq(faction)
        .map(|hq| hq.position)
        .ok_or(CommandError::UnknownFaction(faction.id()))?;

    state.leave_location(idx);
    let tank = &mut state.tanks[idx];
    tank.location = TankLocation::MovingToBase;
    tank.visible = true;
    tank.face(&home);
    let tank_id = tank.id;

    info!(wallet = %wallet, tank_id, "Tank returning to base");

    out.all(SnapshotBuilder::build(state, now));
    out.all(ServerMsg::TankReturningToBase {
        wallet_address: wallet.to_string(),
        tank_id,
        action_timestamp,
        server_timestamp: now,
    });
    Ok(())
}

fn scan_objective(
    state: &mut GameState,
    wallet: &str,
    capture_point_id: u32,
    action_timestamp: u64,
    now: u64,
    out: &mut Outbox,
) -> Result<(), CommandError> {
    let player = state.players.get(wallet).ok_or(CommandError::UnknownPlayer)?;
    if player.scans_remaining == 0 {
        return Err(CommandError::NoScansRemaining);
    }
    let faction = player.faction;
    let enemy_tanks_count = state
        .capture_point(capture_point_id)
        .map(|cp| cp.tanks_by_faction.get(faction.opponent()))
        .ok_or(CommandError::UnknownCapturePoint(capture_point_id))?;

    let scans = match state.players.get_mut(wallet) {
        Some(player) => {
            player.scans_remaining -= 1;
            player.scans_remaining
        }
        None => return Err(CommandError::UnknownPlayer),
    };

    info!(
        wallet = %wallet,
        capture_point = capture_point_id,
        enemy_tanks_count,
        scans_remaining = scans,
        "Objective scanned"
    );

    out.to_wallets(
        state.wallets_of(faction),
        ServerMsg::ScanResult {
            performed_by: wallet.to_string(),
            capture_point_id,
            enemy_tanks_count,
            action_timestamp,
            server_timestamp: now,
        },
    );
    out.all(ServerMsg::ScansUpdated {
        wallet_address: wallet.to_string(),
        scans,
        action_timestamp: Some(action_timestamp),
        server_timestamp: now,
    });
    out.all(SnapshotBuilder::build(state, now));
    Ok(())
}

fn set_scans(state: &mut GameState, wallet: &str, scans: i64, now: u64, out: &mut Outbox) {
    let Some(player) = state.players.get_mut(wallet) else {
        warn!(wallet = %wallet, "Cannot set scans for unknown player");
        return;
    };

    player.scans_remaining = scans.clamp(0, u32::MAX as i64) as u32;
    let scans = player.scans_remaining;
    info!(wallet = %wallet, scans, "Scans set");

    out.all(ServerMsg::ScansUpdated {
        wallet_address: wallet.to_string(),
        scans,
        action_timestamp: None,
        server_timestamp: now,
    });
    out.all(SnapshotBuilder::build(state, now));
}

fn artillery_strike<R: Rng + ?Sized>(
    state: &mut GameState,
    wallet: &str,
    position: Position,
    action_timestamp: u64,
    now: u64,
    rng: &mut R,
    out: &mut Outbox,
) -> Result<(), CommandError> {
    let player = state.players.get_mut(wallet).ok_or(CommandError::UnknownPlayer)?;
    if player.artillery_charges_remaining == 0 {
        return Err(CommandError::NoArtilleryCharges);
    }
    player.artillery_charges_remaining -= 1;

    let striker = state.tank_index_by_owner(wallet);
    let mut affected_units = Vec::new();
    let mut affected_points: Vec<u32> = Vec::new();
    let mut destroyed = Vec::new();

    for idx in 0..state.tanks.len() {
        let tank = &state.tanks[idx];
        if !tank.is_alive() {
            continue;
        }
        let damage = CombatSystem::artillery_damage(tank.position.distance_to(&position));
        if damage <= 0.0 {
            continue;
        }

        let docked = tank.location.docked_point();
        let (health, dead) = CombatSystem::apply_damage(tank.health, damage);
        let damage_taken = tank.health - health;

        if dead {
            state.leave_location(idx);
        }
        let tank = &mut state.tanks[idx];
        tank.health = health;
        info!(tank_id = tank.id, damage_taken, health, "Artillery hit tank");

        affected_units.push(AffectedUnit {
            tank_id: Some(tank.id),
            owner: Some(tank.owner.clone()),
            faction: tank.faction,
            remaining_health: health,
            damage_taken,
            capture_point_id: docked,
        });
        if let Some(point_id) = docked {
            if !affected_points.contains(&point_id) {
                affected_points.push(point_id);
            }
        }

        if dead {
            let victim_faction = tank.faction;
            CombatSystem::destroy(tank, now);
            let killer = striker.map(|k| CombatSystem::credit_kill(&mut state.tanks, k, victim_faction));
            destroyed.push((idx, killer));
        }
    }

    // Docked units are counted, not tracked individually
    for point in &mut state.capture_points {
        let damage = CombatSystem::artillery_damage(point.position.distance_to(&position));
        if damage <= 0.0 {
            continue;
        }
        if !affected_points.contains(&point.id) {
            affected_points.push(point.id);
        }
        if MAX_HEALTH - damage > 0.0 {
            continue;
        }

        for faction in Faction::ALL {
            let killed = point.tanks_by_faction.get(faction);
            if killed == 0 {
                continue;
            }
            point.tanks_by_faction.set(faction, 0);
            for _ in 0..killed {
                affected_units.push(AffectedUnit {
                    tank_id: None,
                    owner: None,
                    faction,
                    remaining_health: 0.0,
                    damage_taken: MAX_HEALTH,
                    capture_point_id: Some(point.id),
                });
                if let Some(k) = striker {
                    CombatSystem::credit_kill(&mut state.tanks, k, faction);
                }
            }
        }
    }

    for (idx, killer) in destroyed {
        let victim = &state.tanks[idx];
        info!(tank_id = victim.id, owner = %victim.owner, "Tank destroyed by artillery");
        out.all(ServerMsg::TankDestroyed {
            tank_id: victim.id,
            owner: victim.owner.clone(),
            killer_tank_id: killer.as_ref().map(|k| k.tank_id),
            killer_owner: killer.map(|k| k.owner),
            cause: DeathCause::Artillery,
            server_timestamp: now,
        });
    }

    for point_id in &affected_points {
        if let Some(point_idx) = state.capture_points.iter().position(|cp| cp.id == *point_id) {
            CaptureResolver::resolve(state, point_idx, now, rng, out);
        }
    }

    info!(
        wallet = %wallet,
        x = position.x,
        y = position.y,
        units = affected_units.len(),
        points = affected_points.len(),
        "Artillery strike resolved"
    );

    out.all(ServerMsg::ArtilleryStrikeResult {
        wallet_address: wallet.to_string(),
        position,
        radius: ARTILLERY_STRIKE_RADIUS,
        affected_units,
        affected_capture_points: affected_points,
        action_timestamp,
        server_timestamp: now,
    });
    out.all(SnapshotBuilder::build(state, now));
    Ok(())
}
