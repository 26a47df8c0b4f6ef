//! Game simulation modules

pub mod capture;
pub mod combat;
pub mod commands;
pub mod lifecycle;
pub mod r#match;
pub mod model;
pub mod physics;
pub mod schedule;
pub mod simulation;
pub mod snapshot;
pub mod state;
pub mod tick;

pub use commands::{Command, CommandError};
pub use r#match::{GameMatch, MatchHandle};
pub use simulation::{GameConfig, Simulation};
pub use state::GameState;

use uuid::Uuid;

use crate::ws::protocol::{Audience, Outbound, ServerMsg};

/// Command received from a socket
#[derive(Debug, Clone)]
pub struct PlayerInput {
    pub connection_id: Uuid,
    pub command: Command,
    pub received_at: u64,
}

/// Events produced by one operation, published only once it commits
#[derive(Debug, Default)]
pub struct Outbox {
    messages: Vec<Outbound>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&mut self, msg: ServerMsg) {
        self.push(Audience::All, msg);
    }

    pub fn to_wallets(&mut self, wallets: Vec<String>, msg: ServerMsg) {
        self.push(Audience::Wallets(wallets), msg);
    }

    pub fn push(&mut self, audience: Audience, msg: ServerMsg) {
        self.messages.push(Outbound { audience, msg });
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn into_messages(self) -> Vec<Outbound> {
        self.messages
    }
}
