//! Cross-thread handle to a running engine
//!
//! The Lua state never leaves the worker thread. Other threads hold an
//! [`EngineHandle`], which only posts [`Invocation`]s into the engine's inbox;
//! the worker drains the inbox between VM instructions and while the robot
//! sleeps.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A method call queued for the robot object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// Run the end routine resolved at construction time
    End,
    /// Run a named method looked up on the robot object when delivered
    Method(String),
}

/// What happened to a posted invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// Queued for the worker
    Queued,
    /// No robot object exists yet; the call was dropped
    NotBound,
    /// The engine is closed; the call was dropped
    Closed,
}

#[derive(Debug, Default)]
struct InboxState {
    queue: VecDeque<Invocation>,
    robot_bound: bool,
    closed: bool,
}

/// Single-consumer invocation queue owned by one engine.
#[derive(Debug, Default)]
pub(crate) struct Inbox {
    state: Mutex<InboxState>,
    pending: AtomicBool,
    wake: Condvar,
}

impl Inbox {
    fn post(&self, invocation: Invocation) -> Delivery {
        let mut state = self.state.lock();
        if state.closed {
            return Delivery::Closed;
        }
        if !state.robot_bound {
            return Delivery::NotBound;
        }
        state.queue.push_back(invocation);
        self.pending.store(true, Ordering::Release);
        self.wake.notify_all();
        Delivery::Queued
    }

    pub(crate) fn bind_robot(&self) {
        self.state.lock().robot_bound = true;
    }

    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.queue.clear();
        self.pending.store(false, Ordering::Release);
        self.wake.notify_all();
    }

    /// Lock-free check used by the instruction hook.
    pub(crate) fn has_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    pub(crate) fn pop(&self) -> Option<Invocation> {
        let mut state = self.state.lock();
        let next = state.queue.pop_front();
        if state.queue.is_empty() {
            self.pending.store(false, Ordering::Release);
        }
        next
    }

    /// Block until something is queued or `deadline` passes. Returns true if
    /// the queue is non-empty on return.
    pub(crate) fn wait_until(&self, deadline: Instant) -> bool {
        let mut state = self.state.lock();
        if state.queue.is_empty() && !state.closed {
            self.wake.wait_until(&mut state, deadline);
        }
        !state.queue.is_empty()
    }

    fn robot_bound(&self) -> bool {
        self.state.lock().robot_bound
    }

    fn closed(&self) -> bool {
        self.state.lock().closed
    }
}

/// Shareable reference to one live engine
#[derive(Debug, Clone)]
pub struct EngineHandle {
    id: Uuid,
    inbox: Arc<Inbox>,
}

impl EngineHandle {
    pub(crate) fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            inbox: Arc::new(Inbox::default()),
        }
    }

    pub(crate) fn inbox(&self) -> &Arc<Inbox> {
        &self.inbox
    }

    /// Engine identifier
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue a call to `name` on the robot object. Never blocks on the
    /// script.
    pub fn invoke_method(&self, name: &str) -> Delivery {
        self.inbox.post(Invocation::Method(name.to_string()))
    }

    /// Queue the robot's end routine, if it has one.
    pub fn request_end(&self) -> Delivery {
        self.inbox.post(Invocation::End)
    }

    /// Whether the robot object has been constructed and retained
    pub fn is_robot_bound(&self) -> bool {
        self.inbox.robot_bound()
    }

    /// Whether the engine has been closed
    pub fn is_closed(&self) -> bool {
        self.inbox.closed()
    }
}
