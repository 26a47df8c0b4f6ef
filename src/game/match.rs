//! The match task: single owner of the simulation and its tick loop

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info};

use crate::util::time::Clock;
use crate::ws::protocol::Outbound;

use super::simulation::{GameConfig, Simulation};
use super::state::GameState;
use super::PlayerInput;

/// Capacity of the inbound command queue
const INPUT_QUEUE_SIZE: usize = 256;
/// Capacity of the outbound event fan-out
const EVENT_CHANNEL_SIZE: usize = 256;

/// Handle for talking to the running match
#[derive(Clone)]
pub struct MatchHandle {
    pub input_tx: mpsc::Sender<PlayerInput>,
    pub events_tx: broadcast::Sender<Outbound>,
}

impl MatchHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.events_tx.subscribe()
    }
}

/// The authoritative game match
pub struct GameMatch {
    sim: Simulation,
    clock: Arc<dyn Clock>,
    input_rx: mpsc::Receiver<PlayerInput>,
    events_tx: broadcast::Sender<Outbound>,
}

impl GameMatch {
    /// Create the match, resuming `restored` when a saved world exists
    pub fn new(
        config: GameConfig,
        clock: Arc<dyn Clock>,
        restored: Option<GameState>,
    ) -> (Self, MatchHandle) {
        let (input_tx, input_rx) = mpsc::channel(INPUT_QUEUE_SIZE);
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);

        let handle = MatchHandle {
            input_tx,
            events_tx: events_tx.clone(),
        };

        let sim = match restored {
            Some(state) => Simulation::from_saved(config, clock.clone(), state),
            None => Simulation::new(config, clock.clone()),
        };

        let game_match = Self {
            sim,
            clock,
            input_rx,
            events_tx,
        };

        (game_match, handle)
    }

    /// Run until `shutdown` fires or every input sender is gone, then hand
    /// back the final state for persistence.
    pub async fn run(mut self, mut shutdown: oneshot::Receiver<()>) -> GameState {
        info!("Match loop started");
        let messages = self.sim.start();
        self.publish(messages);

        loop {
            let sleep_for = self.sleep_duration();

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping match loop");
                    break;
                }
                input = self.input_rx.recv() => {
                    let Some(input) = input else {
                        info!("Input channel closed, stopping match loop");
                        break;
                    };
                    debug!(
                        connection_id = %input.connection_id,
                        command = input.command.name(),
                        queued_ms = self.clock.now_millis().saturating_sub(input.received_at),
                        "Processing command"
                    );
                    let messages = self.sim.handle_command(input.connection_id, input.command);
                    self.publish(messages);
                }
                _ = tokio::time::sleep(sleep_for) => {
                    let messages = self.sim.advance();
                    self.publish(messages);
                }
            }
        }

        self.sim.stop();
        self.sim.into_state()
    }

    fn sleep_duration(&self) -> Duration {
        let now = self.clock.now_millis();
        let wait = self
            .sim
            .next_deadline()
            .map(|deadline| deadline.saturating_sub(now))
            .unwrap_or(self.sim.config().tick_interval_ms);
        Duration::from_millis(wait)
    }

    fn publish(&self, messages: Vec<Outbound>) {
        for message in messages {
            // No receivers just means nobody is connected
            let _ = self.events_tx.send(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::model::MatchPhase;
    use crate::game::Command;
    use crate::util::time::{unix_millis, SystemClock};
    use crate::ws::protocol::{Audience, ServerMsg};
    use uuid::Uuid;

    fn fast_config() -> GameConfig {
        GameConfig {
            tick_interval_ms: 10,
            status_interval_ms: 50,
            match_duration_ms: 60_000,
            intermission_duration_ms: 30,
            seed: Some(1),
        }
    }

    async fn next_matching(
        rx: &mut broadcast::Receiver<Outbound>,
        pred: impl Fn(&ServerMsg) -> bool,
    ) -> Outbound {
        loop {
            match rx.recv().await {
                Ok(out) if pred(&out.msg) => return out,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    }

    #[tokio::test]
    async fn match_starts_accepts_commands_and_stops() {
        let (game, handle) = GameMatch::new(fast_config(), Arc::new(SystemClock), None);
        let mut events = handle.subscribe();
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(game.run(stop_rx));

        let wait = Duration::from_secs(5);
        tokio::time::timeout(wait, next_matching(&mut events, |m| matches!(m, ServerMsg::MatchStart { .. })))
            .await
            .expect("match should start");

        handle
            .input_tx
            .send(PlayerInput {
                connection_id: Uuid::new_v4(),
                command: Command::SpawnTank {
                    wallet: "a".into(),
                    faction: 1,
                },
                received_at: unix_millis(),
            })
            .await
            .unwrap();

        let spawned = tokio::time::timeout(
            wait,
            next_matching(&mut events, |m| matches!(m, ServerMsg::TankSpawned { .. })),
        )
        .await
        .expect("tank should spawn");
        assert!(matches!(spawned.msg, ServerMsg::TankSpawned { respawn: false, .. }));

        stop_tx.send(()).unwrap();
        let state = tokio::time::timeout(wait, task).await.unwrap().unwrap();
        assert_eq!(state.match_state.phase, MatchPhase::Match);
        assert_eq!(state.tanks.len(), 1);
    }

    #[tokio::test]
    async fn rejection_is_addressed_to_sending_connection() {
        let config = GameConfig {
            intermission_duration_ms: 60_000,
            ..fast_config()
        };
        let (game, handle) = GameMatch::new(config, Arc::new(SystemClock), None);
        let mut events = handle.subscribe();
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(game.run(stop_rx));

        let connection_id = Uuid::new_v4();
        handle
            .input_tx
            .send(PlayerInput {
                connection_id,
                command: Command::SpawnTank {
                    wallet: "someone-else".into(),
                    faction: 1,
                },
                received_at: unix_millis(),
            })
            .await
            .unwrap();

        let rejected = tokio::time::timeout(
            Duration::from_secs(5),
            next_matching(&mut events, |m| matches!(m, ServerMsg::Error { .. })),
        )
        .await
        .expect("rejection should be published");
        assert_eq!(rejected.audience, Audience::Connection(connection_id));
        assert!(rejected.audience.includes(connection_id, None));
        assert!(matches!(rejected.msg, ServerMsg::Error { ref code, .. } if code == "intermission_active"));

        stop_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn loop_ends_when_inputs_close() {
        let (game, handle) = GameMatch::new(fast_config(), Arc::new(SystemClock), None);
        let (_stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(game.run(stop_rx));
        drop(handle);

        let state = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(state.tanks.is_empty());
    }
}
