//! Host runtime contract
//!
//! The host owns the real-time control loop and the operator-facing error
//! channel. The lifecycle bridge only starts and stops it through the
//! [`Host`] trait; everything about loop cadence lives on the other side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod sim;

pub use sim::SimHost;

/// Source tag attached to every diagnostic this crate emits.
pub const DIAGNOSTIC_SOURCE: &str = "luabot";

/// Error code sent with script diagnostics.
pub const SCRIPT_ERROR_CODE: i32 = 1;

/// Control-loop runtime the bridge runs a robot program inside.
///
/// Implementations must be shareable across the controller and worker
/// threads: the worker calls [`Host::request_exit`] and
/// [`Host::send_error`] while the controller is blocked in
/// [`Host::run_main_loop`].
pub trait Host: Send + Sync {
    /// Bring up hardware. Returns 0 on success, any other value is an error
    /// code that aborts the session.
    fn hardware_init(&self) -> i32;

    /// Whether this host owns a main loop the controller should block on.
    fn has_main_loop(&self) -> bool;

    /// Block until the host is asked to exit.
    fn run_main_loop(&self);

    /// Ask the main loop to return. Safe to call from any thread, any number
    /// of times, including before the loop starts.
    fn request_exit(&self);

    /// Tear the host down. Called exactly once per session.
    fn shutdown(&self);

    /// Deliver a diagnostic to the operator console.
    fn send_error(&self, diagnostic: &Diagnostic);
}

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Reported as an error on the console
    Error,
}

/// Taxonomy of session failures surfaced through the diagnostic channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// The interpreter could not be created
    EngineInit,
    /// The script file could not be read, parsed or evaluated
    ModuleLoad,
    /// The script evaluated to something other than a table
    NotATable,
    /// The module table has no callable `new`
    MissingConstructor,
    /// Calling `new()` raised an error
    ConstructionFailed,
    /// The robot object has no `startCompetition`
    MissingStart,
    /// `startCompetition` raised an error
    StartFailed,
    /// The worker thread panicked
    WorkerPanicked,
}

impl DiagnosticKind {
    /// Stable human-readable label for this kind.
    pub fn label(self) -> &'static str {
        match self {
            DiagnosticKind::EngineInit => "engine construction failed",
            DiagnosticKind::ModuleLoad => "module load failed",
            DiagnosticKind::NotATable => "module did not return a table",
            DiagnosticKind::MissingConstructor => "module table missing 'new' function",
            DiagnosticKind::ConstructionFailed => "construction failed",
            DiagnosticKind::MissingStart => "robot missing startCompetition method",
            DiagnosticKind::StartFailed => "startCompetition failed",
            DiagnosticKind::WorkerPanicked => "robot thread panicked",
        }
    }
}

/// A structured error report bound for the host console
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity shown to the operator
    pub severity: Severity,
    /// Host error code
    pub code: i32,
    /// Component that raised the report
    pub source: String,
    /// Failure category
    pub kind: DiagnosticKind,
    /// Console message, already prefixed with the source tag
    pub message: String,
    /// When the report was produced
    pub reported_at: DateTime<Utc>,
}

impl Diagnostic {
    /// Build an error-severity report for `kind` with the given detail.
    pub fn error(kind: DiagnosticKind, detail: impl AsRef<str>) -> Self {
        Self {
            severity: Severity::Error,
            code: SCRIPT_ERROR_CODE,
            source: DIAGNOSTIC_SOURCE.to_string(),
            kind,
            message: format!("[{}]: {}", DIAGNOSTIC_SOURCE, detail.as_ref()),
            reported_at: Utc::now(),
        }
    }
}
