//! Error types for robot sessions
//!
//! Worker-side failures are [`SessionError`]s and never leave the worker
//! thread as errors: each is turned into exactly one [`Diagnostic`]. The
//! controller surfaces its own failures as [`BridgeError`].

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::host::{Diagnostic, DiagnosticKind};

/// Failure while bringing up or running a robot program
#[derive(Debug, Error)]
pub enum SessionError {
    /// Interpreter construction failed
    #[error("failed to create Lua engine: {0}")]
    EngineInit(String),

    /// Script file could not be read
    #[error("cannot open {}: {detail}", path.display())]
    ScriptNotFound {
        /// Script path
        path: PathBuf,
        /// OS error text
        detail: String,
    },

    /// Script failed to parse or raised while evaluating
    #[error("{0}")]
    ModuleLoad(String),

    /// Script evaluated to a non-table value
    #[error("Module did not return a table (got {0})")]
    NotATable(String),

    /// Module table has no callable `new`
    #[error("Module table missing 'new' function")]
    MissingConstructor,

    /// `new()` raised an error
    #[error("{0}")]
    ConstructionFailed(String),

    /// Robot object has no `startCompetition`
    #[error("Robot missing startCompetition method")]
    MissingStart,

    /// `startCompetition` raised an error
    #[error("{0}")]
    StartFailed(String),

    /// The worker panicked
    #[error("robot thread panicked: {0}")]
    Panicked(String),
}

impl SessionError {
    /// Taxonomy label for this failure.
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            SessionError::EngineInit(_) => DiagnosticKind::EngineInit,
            SessionError::ScriptNotFound { .. } | SessionError::ModuleLoad(_) => {
                DiagnosticKind::ModuleLoad
            }
            SessionError::NotATable(_) => DiagnosticKind::NotATable,
            SessionError::MissingConstructor => DiagnosticKind::MissingConstructor,
            SessionError::ConstructionFailed(_) => DiagnosticKind::ConstructionFailed,
            SessionError::MissingStart => DiagnosticKind::MissingStart,
            SessionError::StartFailed(_) => DiagnosticKind::StartFailed,
            SessionError::Panicked(_) => DiagnosticKind::WorkerPanicked,
        }
    }


    /// Host console report for this failure.
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(self.kind(), self.to_string())
    }
}

/// Result alias for worker-side operations
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Failure returned by the lifecycle bridge to its caller
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Host hardware initialization returned a non-zero code
    #[error("hardware initialization failed with code {0}")]
    HardwareInit(i32),

    /// The worker thread could not be spawned
    #[error("failed to spawn robot thread: {0}")]
    Spawn(#[from] io::Error),

    /// An inline session failed
    #[error("robot session failed: {0}")]
    Session(#[from] SessionError),
}

impl BridgeError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            BridgeError::HardwareInit(code) => *code,
            BridgeError::Spawn(_) | BridgeError::Session(_) => 1,
        }
    }
}

/// Result alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
