//! Worker-side session runner
//!
//! Runs one robot program start to finish on the worker thread. Whatever
//! happens inside the script, the runner closes the engine, clears the slot,
//! signals completion and asks the host loop to exit. Failures become a
//! single host diagnostic.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use super::error::{SessionError, SessionResult};
use super::session::SessionContext;
use crate::engine::{EngineOptions, LuaEngine};
use crate::host::Host;

/// Runs one session of a robot program
pub struct WorkerRunner {
    ctx: Arc<SessionContext>,
    host: Arc<dyn Host>,
    options: EngineOptions,
}

impl WorkerRunner {
    /// Create a runner publishing into `ctx` and reporting to `host`.
    pub fn new(ctx: Arc<SessionContext>, host: Arc<dyn Host>, options: EngineOptions) -> Self {
        Self { ctx, host, options }
    }

    /// Run the robot program in `lua_file`.
    ///
    /// Any failure has already been sent to the host when this returns; the
    /// result is only for inline callers that propagate it.
    pub fn run(&self, lua_file: &Path) -> SessionResult<()> {
        let _span = tracing::info_span!("session", id = %self.ctx.id()).entered();
        let _completion = Completion {
            ctx: &self.ctx,
            host: self.host.as_ref(),
        };

        tracing::info!(script = %lua_file.display(), "robot session starting");
        let result = self.run_session(lua_file);

        match &result {
            Ok(()) => tracing::info!("robot program returned"),
            Err(err) => {
                tracing::error!(kind = ?err.kind(), error = %err, "robot session failed");
                self.host.send_error(&err.to_diagnostic());
            }
        }
        result
    }

    fn run_session(&self, lua_file: &Path) -> SessionResult<()> {
        let engine = LuaEngine::open(&self.options)?;
        self.ctx.publish(engine.handle().clone());

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.drive(&engine, lua_file)))
            .unwrap_or_else(|payload| Err(SessionError::Panicked(panic_message(payload.as_ref()))));

        engine.close();
        self.ctx.record_close();
        result
    }

    fn drive(&self, engine: &LuaEngine, lua_file: &Path) -> SessionResult<()> {
        let module = engine.load_module(lua_file)?;
        let robot = engine.construct_robot(&module)?;
        self.ctx.mark_running();
        tracing::debug!(has_end = robot.has_end(), "entering startCompetition");
        engine.start(&robot)
    }
}

/// Clears the slot and releases the host loop when the runner exits, on
/// every path including unwinding.
struct Completion<'a> {
    ctx: &'a SessionContext,
    host: &'a dyn Host,
}

impl Drop for Completion<'_> {
    fn drop(&mut self) {
        self.ctx.finish();
        self.host.request_exit();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::session::WorkerPhase;
    use crate::host::{DiagnosticKind, SimHost};
    use std::io::Write;
    use std::thread;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn script(source: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(source.as_bytes()).unwrap();
        file
    }

    fn runner(host: &Arc<SimHost>) -> (Arc<SessionContext>, WorkerRunner) {
        let ctx = Arc::new(SessionContext::new());
        let host: Arc<dyn Host> = host.clone();
        let runner = WorkerRunner::new(Arc::clone(&ctx), host, EngineOptions::default());
        (ctx, runner)
    }

    #[test]
    fn test_successful_session_cleans_up() {
        let file = script("return { new = function() return { startCompetition = function(self) end } end }");
        let host = Arc::new(SimHost::new());
        let (ctx, runner) = runner(&host);

        runner.run(file.path()).unwrap();

        let snapshot = ctx.snapshot();
        assert_eq!(snapshot.phase, WorkerPhase::Finished);
        assert!(!snapshot.has_handle);
        assert!(snapshot.robot_started);
        assert_eq!(snapshot.closes, 1);
        assert!(host.exit_requested());
        assert!(host.diagnostics().is_empty());
    }

    #[test]
    fn test_start_failure_still_closes_engine() {
        let file = script(
            "return { new = function() return { startCompetition = function(self) error('brownout') end } end }",
        );
        let host = Arc::new(SimHost::new());
        let (ctx, runner) = runner(&host);

        let err = runner.run(file.path()).unwrap_err();
        assert!(matches!(err, SessionError::StartFailed(_)));

        assert_eq!(ctx.close_count(), 1);
        assert!(ctx.current_handle().is_none());
        let diagnostics = host.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::StartFailed);
        assert!(diagnostics[0].message.contains("brownout"));
    }

    #[test]
    fn test_handle_published_while_loading() {
        let dir = tempfile::tempdir().unwrap();
        let gate = dir.path().join("release");
        // The module body blocks until the gate file exists.
        let file = script(&format!(
            r#"
            while true do
                local gate = io.open({gate:?})
                if gate then gate:close() break end
                luabot.sleep(0.01)
            end
            return {{ new = function() return {{ startCompetition = function(self) end }} end }}
            "#,
            gate = gate.display().to_string(),
        ));
        let host = Arc::new(SimHost::new());
        let (ctx, runner) = runner(&host);
        let path = file.path().to_path_buf();
        let worker = thread::spawn(move || runner.run(&path));

        assert!(ctx.wait_for_phase(WorkerPhase::Loading, Duration::from_secs(5)));
        let snapshot = ctx.snapshot();
        assert_eq!(snapshot.phase, WorkerPhase::Loading);
        assert!(snapshot.has_handle);
        let handle = ctx.current_handle().unwrap();
        assert!(!handle.is_robot_bound());
        assert_eq!(handle.request_end(), crate::engine::Delivery::NotBound);

        std::fs::write(&gate, b"").unwrap();
        worker.join().unwrap().unwrap();
        assert!(ctx.is_finished());
    }

    #[test]
    fn test_finished_never_observed_with_handle() {
        let file = script(
            "return { new = function() return { startCompetition = function(self) luabot.sleep(0.05) end } end }",
        );
        let host = Arc::new(SimHost::new());
        let (ctx, runner) = runner(&host);
        let path = file.path().to_path_buf();
        let worker = thread::spawn(move || runner.run(&path));

        loop {
            let snapshot = ctx.snapshot();
            if snapshot.phase == WorkerPhase::Finished {
                assert!(!snapshot.has_handle);
                break;
            }
            thread::yield_now();
        }
        worker.join().unwrap().unwrap();
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(payload.as_ref()), "static str");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(5_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
