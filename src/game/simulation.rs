//! The synchronous simulation core: state, timers, randomness and the
//! fault boundary every mutation passes through

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::util::time::{tick_delta, Clock, STATUS_INTERVAL_MS, TICK_INTERVAL_MS};
use crate::ws::protocol::{Audience, Outbound, ServerMsg};

use super::commands::{self, Command};
use super::lifecycle::MatchLifecycle;
use super::model::MatchPhase;
use super::schedule::{Schedule, Timer};
use super::snapshot::SnapshotBuilder;
use super::state::GameState;
use super::tick::run_world_tick;
use super::Outbox;

/// Default match length (9 minutes)
pub const MATCH_DURATION_MS: u64 = 9 * 60 * 1_000;
/// Default intermission length (5 minutes)
pub const INTERMISSION_DURATION_MS: u64 = 5 * 60 * 1_000;

/// Timing and seeding of one simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameConfig {
    /// World tick period. Capture progress and the defense boost grow by a
    /// fixed step per tick, so any value other than 100 ms changes how fast
    /// points are taken and defended in wall-clock time.
    pub tick_interval_ms: u64,
    pub status_interval_ms: u64,
    pub match_duration_ms: u64,
    pub intermission_duration_ms: u64,
    /// `None` seeds from entropy
    pub seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: TICK_INTERVAL_MS,
            status_interval_ms: STATUS_INTERVAL_MS,
            match_duration_ms: MATCH_DURATION_MS,
            intermission_duration_ms: INTERMISSION_DURATION_MS,
            seed: None,
        }
    }
}

/// Owns the authoritative world. Every command and timer runs to completion
/// against a scratch copy; the copy replaces the live state only if the
/// operation finished without panicking.
pub struct Simulation {
    state: GameState,
    rng: ChaCha8Rng,
    clock: Arc<dyn Clock>,
    config: GameConfig,
    schedule: Schedule,
    restored: bool,
}

impl Simulation {
    /// Fresh world; `start` opens an intermission
    pub fn new(config: GameConfig, clock: Arc<dyn Clock>) -> Self {
        Self::build(config, clock, GameState::new(), false)
    }

    /// Continue from a persisted world; `start` resumes its phase
    pub fn from_saved(config: GameConfig, clock: Arc<dyn Clock>, state: GameState) -> Self {
        Self::build(config, clock, state, true)
    }

    fn build(config: GameConfig, clock: Arc<dyn Clock>, state: GameState, restored: bool) -> Self {
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            state,
            rng,
            clock,
            config,
            schedule: Schedule::new(),
            restored,
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn into_state(self) -> GameState {
        self.state
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    /// Arm the periodic timers and enter (or resume) the current phase
    pub fn start(&mut self) -> Vec<Outbound> {
        let now = self.now();
        self.schedule
            .every(Timer::WorldTick, self.config.tick_interval_ms, now);
        self.schedule
            .every(Timer::StatusReport, self.config.status_interval_ms, now);

        let resume_at = if self.restored {
            MatchLifecycle::phase_deadline(&self.state, &self.config)
        } else {
            None
        };

        let mut messages = match resume_at {
            Some(deadline) => {
                info!(
                    phase = ?self.state.match_state.phase,
                    remaining_ms = deadline.saturating_sub(now),
                    tanks = self.state.tanks.len(),
                    "Resuming saved game"
                );
                let reconciled = self.state.reconcile();
                if reconciled > 0 {
                    warn!(reconciled, "Saved game had drifted counters");
                }
                self.schedule.at(Timer::PhaseEnd, deadline);
                let mut out = Outbox::new();
                out.all(SnapshotBuilder::build(&self.state, now));
                out.into_messages()
            }
            None => {
                let config = self.config;
                let messages = self
                    .guarded("enter_intermission", |state, _, out| {
                        MatchLifecycle::enter_intermission(state, &config, now, out)
                    })
                    .map(|(_, out)| out.into_messages())
                    .unwrap_or_default();
                self.arm_phase_end(now);
                messages
            }
        };

        // An expired saved phase transitions right away
        messages.extend(self.advance());
        messages
    }

    /// Apply one player command. Rejections produce an `error` event for the
    /// caller only.
    pub fn handle_command(&mut self, caller: Uuid, command: Command) -> Vec<Outbound> {
        let now = self.now();
        let name = command.name();
        let wallet = command.wallet().to_string();

        let result = self.guarded(name, |state, rng, out| commands::apply(state, command, now, rng, out));

        match result {
            Some((Ok(()), out)) => out.into_messages(),
            Some((Err(e), _)) => {
                warn!(connection_id = %caller, wallet = %wallet, command = name, error = %e, "Command rejected");
                vec![Outbound {
                    audience: Audience::Connection(caller),
                    msg: ServerMsg::Error {
                        command: name.to_string(),
                        wallet_address: wallet,
                        code: e.code().to_string(),
                        message: e.to_string(),
                        server_timestamp: now,
                    },
                }]
            }
            None => Vec::new(),
        }
    }

    /// Fire every timer due at the current clock reading
    pub fn advance(&mut self) -> Vec<Outbound> {
        let now = self.now();
        let mut messages = Vec::new();

        while let Some(timer) = self.schedule.pop_due(now) {
            let config = self.config;
            let outcome = match timer {
                Timer::WorldTick => self.guarded("world_tick", |state, rng, out| {
                    run_world_tick(state, now, tick_delta(config.tick_interval_ms), rng, out)
                }),
                Timer::StatusReport => self.guarded("status_report", |state, _, out| {
                    MatchLifecycle::status_report(state, &config, now, out)
                }),
                Timer::PhaseEnd => {
                    let outcome = self.guarded("phase_end", |state, _, out| {
                        Self::end_phase(state, &config, now, out)
                    });
                    if outcome.is_some() {
                        self.arm_phase_end(now);
                    } else {
                        // retry on the next tick rather than spinning on a past deadline
                        self.schedule
                            .after(Timer::PhaseEnd, config.tick_interval_ms, now);
                    }
                    outcome
                }
            };
            if let Some((_, out)) = outcome {
                messages.extend(out.into_messages());
            }
        }

        messages
    }

    /// Earliest pending timer deadline
    pub fn next_deadline(&self) -> Option<u64> {
        self.schedule.next_deadline()
    }

    /// Cancel every timer; the state is left as the last committed one
    pub fn stop(&mut self) {
        self.schedule.clear();
        info!(phase = ?self.state.match_state.phase, "Simulation stopped");
    }

    fn end_phase(state: &mut GameState, config: &GameConfig, now: u64, out: &mut Outbox) {
        match state.match_state.phase {
            MatchPhase::Intermission => MatchLifecycle::enter_match(state, config, now, out),
            MatchPhase::Match => {
                MatchLifecycle::end_match(state, now, out);
                MatchLifecycle::enter_intermission(state, config, now, out);
            }
        }
    }

    fn arm_phase_end(&mut self, now: u64) {
        let deadline = MatchLifecycle::phase_deadline(&self.state, &self.config)
            .unwrap_or(now + self.config.intermission_duration_ms);
        self.schedule.at(Timer::PhaseEnd, deadline);
    }

    /// Run `op` against a scratch copy of the state and RNG, committing only
    /// if it returns. A panic discards the copy and its events.
    fn guarded<T>(
        &mut self,
        name: &'static str,
        op: impl FnOnce(&mut GameState, &mut ChaCha8Rng, &mut Outbox) -> T,
    ) -> Option<(T, Outbox)> {
        let mut scratch = self.state.clone();
        let mut rng = self.rng.clone();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut out = Outbox::new();
            let value = op(&mut scratch, &mut rng, &mut out);
            (value, out)
        }));

        match result {
            Ok(done) => {
                self.state = scratch;
                self.rng = rng;
                Some(done)
            }
            Err(payload) => {
                error!(
                    operation = name,
                    panic = %panic_message(payload.as_ref()),
                    "Operation panicked, state left unchanged"
                );
                None
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::model::{Faction, TankLocation};
    use crate::util::time::ManualClock;

    const START: u64 = 1_700_000_000_000;
    const CALLER: Uuid = Uuid::nil();

    fn config() -> GameConfig {
        GameConfig {
            tick_interval_ms: 100,
            status_interval_ms: 1_000,
            match_duration_ms: 10_000,
            intermission_duration_ms: 2_000,
            seed: Some(42),
        }
    }

    fn sim() -> (Simulation, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(START));
        (Simulation::new(config(), clock.clone()), clock)
    }

    fn types(messages: &[Outbound]) -> Vec<String> {
        messages
            .iter()
            .map(|m| serde_json::to_value(&m.msg).unwrap()["type"].as_str().unwrap().to_string())
            .collect()
    }

    fn spawn(wallet: &str, faction: u8) -> Command {
        Command::SpawnTank {
            wallet: wallet.into(),
            faction,
        }
    }

    #[test]
    fn fresh_start_opens_intermission() {
        let (mut sim, _) = sim();
        let messages = sim.start();
        assert_eq!(types(&messages), ["intermissionStart", "gameUpdate"]);
        assert_eq!(sim.state().match_state.intermission_started_at, Some(START));
        assert_eq!(sim.next_deadline(), Some(START + 100));
    }

    #[test]
    fn rejected_command_answers_caller_only() {
        let (mut sim, _) = sim();
        sim.start();

        let caller = Uuid::new_v4();
        let messages = sim.handle_command(caller, spawn("a", 1));
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].audience, Audience::Connection(caller));

        // a socket opened without a wallet still sees its own rejection
        assert!(messages[0].audience.includes(caller, None));
        // another socket under the same wallet does not
        assert!(!messages[0].audience.includes(Uuid::new_v4(), Some("a")));
        match &messages[0].msg {
            ServerMsg::Error { command, code, .. } => {
                assert_eq!(command, "spawnTank");
                assert_eq!(code, "intermission_active");
            }
            other => panic!("unexpected message {other:?}"),
        }
        assert!(sim.state().tanks.is_empty());
    }

    #[test]
    fn lifecycle_runs_full_cycle() {
        let (mut sim, clock) = sim();
        sim.start();

        clock.advance(2_000);
        let messages = types(&sim.advance());
        assert!(messages.contains(&"matchStart".to_string()));
        assert_eq!(sim.state().match_state.phase, MatchPhase::Match);

        sim.handle_command(CALLER, spawn("a", 1));
        sim.handle_command(CALLER, Command::MoveTank {
            wallet: "a".into(),
            capture_point_id: 1,
            action_timestamp: 0,
        });

        // let the tank drive to the center point and start capturing
        for _ in 0..40 {
            clock.advance(100);
            sim.advance();
        }
        let tank = sim.state().tank_by_owner("a").unwrap();
        assert_eq!(tank.location, TankLocation::AtPoint(1));
        assert!(sim.state().capture_point(1).unwrap().capture_progress > 0.0);

        clock.set(START + 2_000 + 10_000);
        let messages = types(&sim.advance());
        let end = messages.iter().position(|t| t == "matchEnd").unwrap();
        let intermission = messages.iter().position(|t| t == "intermissionStart").unwrap();
        assert!(end < intermission);
        assert_eq!(sim.state().match_state.phase, MatchPhase::Intermission);
        assert!(sim.state().tanks.is_empty());
    }

    #[test]
    fn late_wakeup_skips_missed_ticks() {
        let (mut sim, clock) = sim();
        sim.start();
        clock.advance(1_550);

        let messages = types(&sim.advance());
        assert_eq!(messages.iter().filter(|t| *t == "intermissionTimeUpdate").count(), 1);
        assert_eq!(sim.next_deadline(), Some(START + 1_600));
    }

    #[test]
    fn panicking_operation_leaves_state_untouched() {
        let (mut sim, clock) = sim();
        sim.start();
        clock.advance(2_000);
        sim.advance();
        sim.handle_command(CALLER, spawn("a", 2));
        let before = sim.state().clone();

        let result = sim.guarded("test", |state, _, out| {
            state.tanks.clear();
            out.all(SnapshotBuilder::build(state, 0));
            panic!("boom");
        });

        assert!(result.is_none());
        assert_eq!(sim.state(), &before);

        // the simulation keeps working afterwards
        let messages = sim.handle_command(CALLER, spawn("b", 1));
        assert_eq!(types(&messages), ["gameUpdate", "tankSpawned"]);
    }

    #[test]
    fn restored_match_resumes_with_remaining_time() {
        let clock = Arc::new(ManualClock::new(START));
        let mut saved = GameState::new();
        saved.match_state.phase = MatchPhase::Match;
        saved.match_state.match_started_at = Some(START - 4_000);
        saved.players.insert(
            "a".into(),
            crate::game::model::Player::new("a".into(), Faction::One, 1),
        );

        let mut sim = Simulation::from_saved(config(), clock.clone(), saved);
        let messages = types(&sim.start());
        assert_eq!(messages, ["gameUpdate"]);
        assert_eq!(sim.state().players.len(), 1);

        clock.advance(5_999);
        sim.advance();
        assert_eq!(sim.state().match_state.phase, MatchPhase::Match);
        clock.advance(1);
        sim.advance();
        assert_eq!(sim.state().match_state.phase, MatchPhase::Intermission);
    }

    #[test]
    fn expired_saved_phase_transitions_immediately() {
        let clock = Arc::new(ManualClock::new(START));
        let mut saved = GameState::new();
        saved.match_state.intermission_started_at = Some(START - 60_000);

        let mut sim = Simulation::from_saved(config(), clock, saved);
        let messages = types(&sim.start());
        assert!(messages.contains(&"matchStart".to_string()));
        assert_eq!(sim.state().match_state.match_started_at, Some(START));
    }

    #[test]
    fn same_seed_same_spawns() {
        let run = || {
            let (mut sim, clock) = sim();
            sim.start();
            clock.advance(2_000);
            sim.advance();
            sim.handle_command(CALLER, spawn("a", 1));
            sim.state().tanks[0].position
        };
        assert_eq!(run(), run());
    }
}
