//! Entity model: positions, factions, HQs, capture points, tanks and players

use serde::{Deserialize, Serialize};

/// Side length of the square map
pub const MAP_SIZE: f64 = 100.0;
/// Full health of a tank
pub const MAX_HEALTH: f64 = 100.0;
/// Scans granted on spawn
pub const STARTING_SCANS: u32 = 3;
/// Artillery charges granted on spawn and at match start
pub const STARTING_ARTILLERY_CHARGES: u32 = 1;

/// Map coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Clamp both axes into `[0, MAP_SIZE]`
    pub fn clamped(self) -> Self {
        Self {
            x: self.x.clamp(0.0, MAP_SIZE),
            y: self.y.clamp(0.0, MAP_SIZE),
        }
    }
}

/// Wire value is not a configured faction
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown faction {0}")]
pub struct UnknownFaction(pub u8);

/// One of the two warring sides; serialized as its HQ id (1 or 2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Faction {
    One,
    Two,
}

impl Faction {
    pub const ALL: [Faction; 2] = [Faction::One, Faction::Two];

    pub fn id(self) -> u8 {
        match self {
            Faction::One => 1,
            Faction::Two => 2,
        }
    }

    pub fn opponent(self) -> Faction {
        match self {
            Faction::One => Faction::Two,
            Faction::Two => Faction::One,
        }
    }
}

impl From<Faction> for u8 {
    fn from(faction: Faction) -> Self {
        faction.id()
    }
}

impl TryFrom<u8> for Faction {
    type Error = UnknownFaction;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Faction::One),
            2 => Ok(Faction::Two),
            other => Err(UnknownFaction(other)),
        }
    }
}

/// Per-faction unit counts, keyed `"1"` / `"2"` on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FactionCounts {
    #[serde(rename = "1")]
    pub one: u32,
    #[serde(rename = "2")]
    pub two: u32,
}

impl FactionCounts {
    pub fn get(&self, faction: Faction) -> u32 {
        match faction {
            Faction::One => self.one,
            Faction::Two => self.two,
        }
    }

    pub fn get_mut(&mut self, faction: Faction) -> &mut u32 {
        match faction {
            Faction::One => &mut self.one,
            Faction::Two => &mut self.two,
        }
    }

    pub fn set(&mut self, faction: Faction, value: u32) {
        *self.get_mut(faction) = value;
    }

    pub fn total(&self) -> u32 {
        self.one + self.two
    }
}

/// Faction base and spawn anchor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hq {
    pub id: Faction,
    pub position: Position,
    /// Live tanks currently stationed at base
    pub tank_count: u32,
}

impl Hq {
    pub fn new(id: Faction, position: Position) -> Self {
        Self {
            id,
            position,
            tank_count: 0,
        }
    }
}

/// Contested map objective
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturePoint {
    pub id: u32,
    pub position: Position,
    pub controlled_by: Option<Faction>,
    pub tanks_by_faction: FactionCounts,
    /// +100 is full faction 1 control, -100 full faction 2 control
    pub capture_progress: f64,
    pub defense_boost: f64,
    pub capture_time: Option<u64>,
}

impl CapturePoint {
    pub fn new(id: u32, position: Position) -> Self {
        Self {
            id,
            position,
            controlled_by: None,
            tanks_by_faction: FactionCounts::default(),
            capture_progress: 0.0,
            defense_boost: 1.0,
            capture_time: None,
        }
    }
}

/// Where a tank is. Exactly one holds at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "capturePointId", rename_all = "camelCase")]
pub enum TankLocation {
    AtBase,
    MovingToBase,
    MovingToPoint(u32),
    AtPoint(u32),
}

impl TankLocation {
    /// Capture point the tank is docked at, if any
    pub fn docked_point(&self) -> Option<u32> {
        match self {
            TankLocation::AtPoint(id) => Some(*id),
            _ => None,
        }
    }
}

/// A player's vehicle (authoritative)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tank {
    pub id: u32,
    pub owner: String,
    pub faction: Faction,
    pub position: Position,
    pub location: TankLocation,
    pub rotation: f64,
    pub visible: bool,
    pub health: f64,
    pub respawn_at: Option<u64>,
    pub healing_since: Option<u64>,
    pub friendly_kills: u32,
    pub enemy_kills: u32,
}

impl Tank {
    pub fn new(id: u32, owner: String, faction: Faction, position: Position) -> Self {
        Self {
            id,
            owner,
            faction,
            position,
            location: TankLocation::AtBase,
            rotation: 0.0,
            visible: true,
            health: MAX_HEALTH,
            respawn_at: None,
            healing_since: None,
            friendly_kills: 0,
            enemy_kills: 0,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }

    /// Alive and parked at its HQ
    pub fn is_stationed_at_base(&self) -> bool {
        self.is_alive() && self.location == TankLocation::AtBase
    }

    /// Point the tank towards a target
    pub fn face(&mut self, target: &Position) {
        let dx = target.x - self.position.x;
        let dy = target.y - self.position.y;
        self.rotation = dy.atan2(dx);
    }
}

/// Per-wallet resources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub wallet_address: String,
    pub faction: Faction,
    pub tank_id: u32,
    pub scans_remaining: u32,
    pub artillery_charges_remaining: u32,
}

impl Player {
    pub fn new(wallet_address: String, faction: Faction, tank_id: u32) -> Self {
        Self {
            wallet_address,
            faction,
            tank_id,
            scans_remaining: STARTING_SCANS,
            artillery_charges_remaining: STARTING_ARTILLERY_CHARGES,
        }
    }
}

/// Lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    /// World reset, commands rejected
    Intermission,
    /// Match in progress
    Match,
}

/// Phase and wall-clock start times
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchState {
    pub phase: MatchPhase,
    pub match_started_at: Option<u64>,
    pub intermission_started_at: Option<u64>,
}

impl Default for MatchState {
    fn default() -> Self {
        Self {
            phase: MatchPhase::Intermission,
            match_started_at: None,
            intermission_started_at: None,
        }
    }
}
