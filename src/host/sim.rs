//! In-process simulation host
//!
//! Stands in for the hardware runtime on a development machine. The main loop
//! is a blocking wait released by [`Host::request_exit`]; every lifecycle call
//! and diagnostic is recorded so sessions can be inspected afterwards.

use parking_lot::{Condvar, Mutex};

use super::{Diagnostic, Host};

#[derive(Debug, Default)]
struct SimState {
    exit_requested: bool,
    loop_runs: usize,
    init_calls: usize,
    shutdown_calls: usize,
    diagnostics: Vec<Diagnostic>,
}

/// Simulation host
#[derive(Debug)]
pub struct SimHost {
    has_main_loop: bool,
    init_code: i32,
    extensions: Vec<String>,
    state: Mutex<SimState>,
    exit: Condvar,
}

impl SimHost {
    /// Host with a blocking main loop.
    pub fn new() -> Self {
        Self {
            has_main_loop: true,
            init_code: 0,
            extensions: Vec::new(),
            state: Mutex::new(SimState::default()),
            exit: Condvar::new(),
        }
    }

    /// Host without a main loop; the bridge runs the robot inline.
    pub fn headless() -> Self {
        Self {
            has_main_loop: false,
            ..Self::new()
        }
    }

    /// Make `hardware_init` return `code`.
    pub fn with_init_code(mut self, code: i32) -> Self {
        self.init_code = code;
        self
    }

    /// Simulation extensions this host reports as loaded.
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Whether `request_exit` has been called
    pub fn exit_requested(&self) -> bool {
        self.state.lock().exit_requested
    }

    /// Diagnostics received so far
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.state.lock().diagnostics.clone()
    }

    /// Number of times the main loop was entered
    pub fn loop_runs(&self) -> usize {
        self.state.lock().loop_runs
    }

    /// Number of `hardware_init` calls
    pub fn init_calls(&self) -> usize {
        self.state.lock().init_calls
    }

    /// Number of `shutdown` calls
    pub fn shutdown_calls(&self) -> usize {
        self.state.lock().shutdown_calls
    }
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for SimHost {
    fn hardware_init(&self) -> i32 {
        self.state.lock().init_calls += 1;
        if self.init_code == 0 {
            tracing::info!(extensions = ?self.extensions, "simulation host initialized");
        } else {
            tracing::error!(code = self.init_code, "simulation host failed to initialize");
        }
        self.init_code
    }

    fn has_main_loop(&self) -> bool {
        self.has_main_loop
    }

    fn run_main_loop(&self) {
        let mut state = self.state.lock();
        state.loop_runs += 1;
        tracing::debug!("simulation main loop running");
        while !state.exit_requested {
            self.exit.wait(&mut state);
        }
        tracing::debug!("simulation main loop exited");
    }

    fn request_exit(&self) {
        self.state.lock().exit_requested = true;
        self.exit.notify_all();
    }

    fn shutdown(&self) {
        self.state.lock().shutdown_calls += 1;
        tracing::info!("simulation host shut down");
    }

    fn send_error(&self, diagnostic: &Diagnostic) {
        tracing::error!(
            kind = ?diagnostic.kind,
            code = diagnostic.code,
            "{}",
            diagnostic.message
        );
        self.state.lock().diagnostics.push(diagnostic.clone());
    }
}
