//! Lifecycle bridge between the host main loop and a robot program
//!
//! [`LifecycleBridge::run`] drives one session through
//! `Idle → Running → Ending → JoinWait → {Joined | Detached} → Closed`:
//!
//! 1. bring up the host hardware;
//! 2. start the robot on a worker thread and block in the host main loop;
//! 3. when the loop returns, ask the robot to end through the shared slot;
//! 4. wait a bounded time for the worker, then join it or abandon it;
//! 5. shut the host down.
//!
//! Abandoning the worker (`Detached`) leaks its thread and engine. That is
//! the price of never blocking the controller on an uncooperative script.
//! Hosts without a main loop run the robot inline instead.

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod error;
pub mod session;
pub mod worker;

pub use error::{BridgeError, Result, SessionError};
pub use session::{SessionContext, SlotSnapshot, WorkerPhase};
pub use worker::WorkerRunner;

use crate::engine::{Delivery, EngineOptions};
use crate::host::Host;

/// Default time the controller waits for the worker after the host loop exits.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Name given to the worker thread.
pub const WORKER_THREAD_NAME: &str = "luabot-robot";

/// Bridge settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeConfig {
    /// How long to wait for the worker before detaching it
    pub join_timeout: Duration,
    /// Interpreter settings for the worker's engine
    pub engine: EngineOptions,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            engine: EngineOptions::default(),
        }
    }
}

/// Bridge state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    /// Nothing started
    Idle,
    /// Worker spawned, host main loop running
    Running,
    /// No host main loop; robot ran on the calling thread
    Inline,
    /// Host loop returned, end routine requested
    Ending,
    /// Waiting for the worker to finish
    JoinWait,
    /// Worker finished and was joined
    Joined,
    /// Worker did not finish in time and was abandoned
    Detached,
    /// Host shut down
    Closed,
}

/// How the session's worker ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Ran on the calling thread
    Inline,
    /// Finished within the join budget
    Joined,
    /// Abandoned after the join budget elapsed
    Detached,
}

/// Result of a completed session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOutcome {
    /// Session identifier
    pub session_id: Uuid,
    /// How the worker ended
    pub termination: Termination,
    /// States visited, in order
    pub transitions: Vec<BridgeState>,
    /// What happened to the end request, if a handle was live
    pub end_request: Option<Delivery>,
    /// Whether the robot's start routine was entered
    pub robot_started: bool,
    /// Engine closes observed at teardown
    pub engine_closes: usize,
    /// Time spent in the join wait
    pub join_wait: Duration,
}

impl SessionOutcome {
    /// Process exit code; every completed session is a success here.
    pub fn exit_code(&self) -> i32 {
        0
    }
}

/// Orchestrates one robot session against a host
pub struct LifecycleBridge {
    host: Arc<dyn Host>,
    config: BridgeConfig,
}

impl LifecycleBridge {
    /// Create a bridge for `host`.
    pub fn new(host: Arc<dyn Host>, config: BridgeConfig) -> Self {
        Self { host, config }
    }

    /// Run the robot program in `lua_file` for one session.
    pub fn run(&self, lua_file: impl AsRef<Path>) -> Result<SessionOutcome> {
        let lua_file = lua_file.as_ref();
        let mut transitions = vec![BridgeState::Idle];

        let code = self.host.hardware_init();
        if code != 0 {
            tracing::error!(code, "hardware initialization failed");
            return Err(BridgeError::HardwareInit(code));
        }

        let ctx = Arc::new(SessionContext::new());
        let runner = WorkerRunner::new(Arc::clone(&ctx), Arc::clone(&self.host), self.config.engine);

        if !self.host.has_main_loop() {
            transitions.push(BridgeState::Inline);
            tracing::debug!(session = %ctx.id(), "no host main loop; running robot inline");
            let result = runner.run(lua_file);
            self.close(&mut transitions);
            result?;
            return Ok(self.outcome(&ctx, Termination::Inline, transitions, None, Duration::ZERO));
        }

        let path = lua_file.to_path_buf();
        let worker = match thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                let _ = runner.run(&path);
            }) {
            Ok(worker) => worker,
            Err(err) => {
                tracing::error!(error = %err, "failed to spawn robot thread");
                self.close(&mut transitions);
                return Err(BridgeError::Spawn(err));
            }
        };

        transitions.push(BridgeState::Running);
        tracing::info!(session = %ctx.id(), "host main loop running");
        self.host.run_main_loop();

        transitions.push(BridgeState::Ending);
        let end_request = ctx.current_handle().map(|handle| handle.request_end());
        tracing::debug!(session = %ctx.id(), ?end_request, "requested end of competition");

        transitions.push(BridgeState::JoinWait);
        let waited = Instant::now();
        let finished = ctx.wait_finished(self.config.join_timeout);
        let join_wait = waited.elapsed();

        let termination = if finished {
            if worker.join().is_err() {
                tracing::warn!(session = %ctx.id(), "robot thread panicked outside the session boundary");
            }
            transitions.push(BridgeState::Joined);
            Termination::Joined
        } else {
            tracing::warn!(
                session = %ctx.id(),
                timeout_ms = u64::try_from(self.config.join_timeout.as_millis()).unwrap_or(u64::MAX),
                "robot program did not finish in time; detaching its thread"
            );
            drop(worker);
            transitions.push(BridgeState::Detached);
            Termination::Detached
        };

        self.close(&mut transitions);
        Ok(self.outcome(&ctx, termination, transitions, end_request, join_wait))
    }

    fn close(&self, transitions: &mut Vec<BridgeState>) {
        self.host.shutdown();
        transitions.push(BridgeState::Closed);
    }

    fn outcome(
        &self,
        ctx: &SessionContext,
        termination: Termination,
        transitions: Vec<BridgeState>,
        end_request: Option<Delivery>,
        join_wait: Duration,
    ) -> SessionOutcome {
        let snapshot = ctx.snapshot();
        tracing::info!(session = %ctx.id(), ?termination, "robot session closed");
        SessionOutcome {
            session_id: ctx.id(),
            termination,
            transitions,
            end_request,
            robot_started: snapshot.robot_started,
            engine_closes: snapshot.closes,
            join_wait,
        }
    }
}
