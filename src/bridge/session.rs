//! Shared engine slot for one robot session
//!
//! [`SessionContext`] is the only state the controller and the worker both
//! touch. The lock guards the handle and the worker phase and is never held
//! across a script call.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::EngineHandle;

/// Progress of the worker through a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerPhase {
    /// Engine not created yet
    Pending,
    /// Engine published, module being loaded and constructed
    Loading,
    /// Start routine running
    Running,
    /// Engine closed and slot cleared
    Finished,
}

#[derive(Debug)]
struct SlotState {
    handle: Option<EngineHandle>,
    phase: WorkerPhase,
    robot_started: bool,
    closes: usize,
}

/// Consistent view of the slot taken under its lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotSnapshot {
    /// Whether a handle is published
    pub has_handle: bool,
    /// Worker phase
    pub phase: WorkerPhase,
    /// Whether the start routine was ever entered
    pub robot_started: bool,
    /// Engine close count
    pub closes: usize,
}

/// Session-scoped handoff point between controller and worker
#[derive(Debug)]
pub struct SessionContext {
    id: Uuid,
    slot: Mutex<SlotState>,
    changed: Condvar,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    /// Fresh context with an empty slot.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            slot: Mutex::new(SlotState {
                handle: None,
                phase: WorkerPhase::Pending,
                robot_started: false,
                closes: 0,
            }),
            changed: Condvar::new(),
        }
    }

    /// Session identifier
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn publish(&self, handle: EngineHandle) {
        let mut slot = self.slot.lock();
        slot.handle = Some(handle);
        slot.phase = WorkerPhase::Loading;
        self.changed.notify_all();
    }

    pub(crate) fn mark_running(&self) {
        let mut slot = self.slot.lock();
        slot.phase = WorkerPhase::Running;
        slot.robot_started = true;
        self.changed.notify_all();
    }

    pub(crate) fn record_close(&self) {
        self.slot.lock().closes += 1;
    }

    /// Clear the slot and mark the worker finished in one step.
    pub(crate) fn finish(&self) {
        let mut slot = self.slot.lock();
        slot.handle = None;
        slot.phase = WorkerPhase::Finished;
        self.changed.notify_all();
    }

    /// Copy of the published handle, if any
    pub fn current_handle(&self) -> Option<EngineHandle> {
        self.slot.lock().handle.clone()
    }

    /// Current worker phase
    pub fn phase(&self) -> WorkerPhase {
        self.slot.lock().phase
    }

    /// Whether the worker has finished
    pub fn is_finished(&self) -> bool {
        self.phase() == WorkerPhase::Finished
    }

    /// Number of times the session's engine has been closed
    pub fn close_count(&self) -> usize {
        self.slot.lock().closes
    }

    /// Read every field under one lock acquisition.
    pub fn snapshot(&self) -> SlotSnapshot {
        let slot = self.slot.lock();
        SlotSnapshot {
            has_handle: slot.handle.is_some(),
            phase: slot.phase,
            robot_started: slot.robot_started,
            closes: slot.closes,
        }
    }

    /// Wait up to `timeout` for the worker to finish.
    pub fn wait_finished(&self, timeout: Duration) -> bool {
        self.wait_for_phase(WorkerPhase::Finished, timeout)
    }

    /// Wait up to `timeout` for the worker to reach at least `phase`.
    pub fn wait_for_phase(&self, phase: WorkerPhase, timeout: Duration) -> bool {
        let mut slot = self.slot.lock();
        self.changed
            .wait_while_for(&mut slot, |slot| slot.phase < phase, timeout);
        slot.phase >= phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_default_context_starts_empty() {
        let ctx = SessionContext::default();
        let snapshot = ctx.snapshot();
        assert_eq!(snapshot.phase, WorkerPhase::Pending);
        assert!(!snapshot.has_handle);
        assert_eq!(snapshot.closes, 0);
        assert_ne!(ctx.id(), SessionContext::default().id());
    }

    #[test]
    fn test_lifecycle_transitions() {
        let ctx = SessionContext::new();
        assert_eq!(ctx.phase(), WorkerPhase::Pending);
        assert!(ctx.current_handle().is_none());

        ctx.publish(EngineHandle::new());
        assert_eq!(ctx.phase(), WorkerPhase::Loading);
        assert!(ctx.current_handle().is_some());

        ctx.mark_running();
        ctx.record_close();
        ctx.finish();

        let snapshot = ctx.snapshot();
        assert!(!snapshot.has_handle);
        assert_eq!(snapshot.phase, WorkerPhase::Finished);
        assert!(snapshot.robot_started);
        assert_eq!(snapshot.closes, 1);
    }

    #[test]
    fn test_wait_finished_times_out() {
        let ctx = SessionContext::new();
        let started = Instant::now();
        assert!(!ctx.wait_finished(Duration::from_millis(30)));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_wait_finished_wakes_on_finish() {
        let ctx = Arc::new(SessionContext::new());
        let worker_ctx = Arc::clone(&ctx);
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            worker_ctx.finish();
        });
        assert!(ctx.wait_finished(Duration::from_secs(5)));
        worker.join().unwrap();
    }

    #[test]
    fn test_contexts_are_independent() {
        let first = SessionContext::new();
        let second = SessionContext::new();
        first.publish(EngineHandle::new());
        assert!(second.current_handle().is_none());
        assert_ne!(first.id(), second.id());
    }
}
