//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::model::{
    CapturePoint, Faction, FactionCounts, Hq, MatchPhase, Player, Position, TankLocation,
};

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMsg {
    /// Spawn a tank at a faction HQ
    SpawnTank {
        wallet_address: String,
        /// HQ id (1 or 2)
        faction: u8,
    },

    /// Send the tank to a capture point
    MoveTank {
        wallet_address: String,
        capture_point_id: u32,
        /// Client clock, echoed back for latency measurement
        action_timestamp: u64,
    },

    /// Send the tank home to heal
    ReturnTankToBase {
        wallet_address: String,
        action_timestamp: u64,
    },

    /// Reveal the enemy count at a capture point to the caller's faction
    ScanObjective {
        wallet_address: String,
        capture_point_id: u32,
        action_timestamp: u64,
    },

    /// Administrative override of a player's scans
    SetScans {
        wallet_address: String,
        scans: i64,
    },

    /// Area damage centred on a map position
    ArtilleryStrike {
        wallet_address: String,
        position: Position,
        action_timestamp: u64,
    },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMsg {
    /// Full world snapshot
    GameUpdate {
        phase: MatchPhase,
        players: Vec<Player>,
        hqs: Vec<Hq>,
        tanks: Vec<TankSnapshot>,
        capture_points: Vec<CapturePoint>,
        server_timestamp: u64,
    },

    /// Tank created or respawned at its HQ
    TankSpawned {
        wallet_address: String,
        tank_id: u32,
        faction: Faction,
        position: Position,
        respawn: bool,
        server_timestamp: u64,
    },

    TankMoved {
        wallet_address: String,
        tank_id: u32,
        capture_point_id: u32,
        action_timestamp: u64,
        server_timestamp: u64,
    },

    TankReturningToBase {
        wallet_address: String,
        tank_id: u32,
        action_timestamp: u64,
        server_timestamp: u64,
    },

    TankDestroyed {
        tank_id: u32,
        owner: String,
        killer_tank_id: Option<u32>,
        killer_owner: Option<String>,
        cause: DeathCause,
        server_timestamp: u64,
    },

    /// Healing at base completed
    TankHealed {
        tank_id: u32,
        owner: String,
        server_timestamp: u64,
    },

    /// Delivered only to the scanning player's faction
    ScanResult {
        performed_by: String,
        capture_point_id: u32,
        enemy_tanks_count: u32,
        action_timestamp: u64,
        server_timestamp: u64,
    },

    ScansUpdated {
        wallet_address: String,
        scans: u32,
        action_timestamp: Option<u64>,
        server_timestamp: u64,
    },

    ArtilleryStrikeResult {
        wallet_address: String,
        position: Position,
        radius: f64,
        affected_units: Vec<AffectedUnit>,
        affected_capture_points: Vec<u32>,
        action_timestamp: u64,
        server_timestamp: u64,
    },

    IntermissionStart {
        duration_ms: u64,
        server_timestamp: u64,
    },

    MatchStart {
        duration_ms: u64,
        server_timestamp: u64,
    },

    MatchEnd {
        /// `None` is a draw
        winner: Option<Faction>,
        scores: FactionCounts,
        server_timestamp: u64,
    },

    IntermissionTimeUpdate {
        remaining_time: u64,
        is_intermission: bool,
        server_timestamp: u64,
    },

    MatchTimeUpdate {
        remaining_time: u64,
        statistics: MatchStatistics,
        is_intermission: bool,
        server_timestamp: u64,
    },

    /// Rejected command, sent to the caller only
    Error {
        command: String,
        wallet_address: String,
        code: String,
        message: String,
        server_timestamp: u64,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// Tank state in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TankSnapshot {
    pub id: u32,
    pub owner: String,
    pub faction: Faction,
    pub position: Position,
    pub location: TankLocation,
    /// Rotation in radians
    pub rotation: f64,
    pub visible: bool,
    /// Health (0-100)
    pub health: f64,
    pub healing_since: Option<u64>,
    pub friendly_kills: u32,
    pub enemy_kills: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathCause {
    Battle,
    Artillery,
}

/// One unit hit by an artillery strike. Units docked at a capture point are
/// not tracked individually, so notional casualties carry no tank id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedUnit {
    pub tank_id: Option<u32>,
    pub owner: Option<String>,
    pub faction: Faction,
    pub remaining_health: f64,
    pub damage_taken: f64,
    pub capture_point_id: Option<u32>,
}

/// Aggregate numbers for the match countdown UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchStatistics {
    pub scores: FactionCounts,
    pub tank_counts: FactionCounts,
    pub capture_points: Vec<PointStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointStatus {
    pub id: u32,
    pub controlled_by: Option<Faction>,
    pub tanks: FactionCounts,
}

/// Which sockets an event is delivered to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    All,
    /// The socket that issued a command
    Connection(Uuid),
    Wallets(Vec<String>),
}

impl Audience {
    /// Whether the socket `connection_id`, registered under `wallet`,
    /// should receive the event
    pub fn includes(&self, connection_id: Uuid, wallet: Option<&str>) -> bool {
        match self {
            Audience::All => true,
            Audience::Connection(target) => *target == connection_id,
            Audience::Wallets(targets) => {
                wallet.is_some_and(|w| targets.iter().any(|t| t == w))
            }
        }
    }
}

/// An event together with its audience
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub audience: Audience,
    pub msg: ServerMsg,
}
