//! Lua script engine
//!
//! [`LuaEngine`] owns one interpreter and lives on the worker thread for the
//! whole session. It loads the robot module, constructs and retains the robot
//! object, and runs its start routine. Calls coming from other threads arrive
//! through the engine's [`EngineHandle`] and are executed here, on the owning
//! thread, from an instruction-count hook and from `luabot.sleep`.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use mlua::{Function, HookTriggers, Lua, LuaOptions, MultiValue, StdLib, Table, Thread, Value, VmState};
use serde::{Deserialize, Serialize};

use crate::bridge::error::{SessionError, SessionResult};

pub mod api;
pub mod handle;
pub mod robot;

pub use handle::{Delivery, EngineHandle, Invocation};
pub use robot::{END_ROUTINE, ROBOT_REGISTRY_KEY, RobotObject, START_ROUTINE};

use handle::Inbox;
use robot::END_REGISTRY_KEY;

/// Default number of VM instructions between inbox checks.
pub const DEFAULT_HOOK_INTERVAL: u32 = 1_000;

/// Interpreter settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOptions {
    /// VM instructions between inbox checks; 0 disables the hook
    pub hook_interval: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            hook_interval: DEFAULT_HOOK_INTERVAL,
        }
    }
}

/// One live Lua interpreter
pub struct LuaEngine {
    lua: Lua,
    handle: EngineHandle,
}

impl LuaEngine {
    /// Create an interpreter with the safe standard library and the
    /// `luabot` API table.
    pub fn open(options: &EngineOptions) -> SessionResult<Self> {
        let lua = Lua::new_with(StdLib::ALL_SAFE, LuaOptions::default())
            .map_err(|err| SessionError::EngineInit(err.to_string()))?;
        let handle = EngineHandle::new();

        api::register(&lua, Arc::clone(handle.inbox()))
            .map_err(|err| SessionError::EngineInit(err.to_string()))?;

        if options.hook_interval > 0 {
            let triggers = HookTriggers::new().every_nth_instruction(options.hook_interval);
            let inbox = Arc::clone(handle.inbox());
            lua.set_hook(triggers, move |lua, _debug| drain_hook(lua, &inbox));
            hook_coroutines(&lua, Arc::clone(handle.inbox()), triggers)
                .map_err(|err| SessionError::EngineInit(err.to_string()))?;
        }

        tracing::debug!(engine = %handle.id(), "lua engine opened");
        Ok(Self { lua, handle })
    }

    /// Handle other threads use to reach this engine
    pub fn handle(&self) -> &EngineHandle {
        &self.handle
    }

    /// Load and evaluate `path`; the chunk must return a table.
    pub fn load_module(&self, path: &Path) -> SessionResult<Table> {
        let source = fs::read_to_string(path).map_err(|err| SessionError::ScriptNotFound {
            path: path.to_path_buf(),
            detail: err.to_string(),
        })?;

        let value: Value = self
            .lua
            .load(source.as_str())
            .set_name(format!("@{}", path.display()))
            .eval()
            .map_err(|err| SessionError::ModuleLoad(err.to_string()))?;

        match value {
            Value::Table(module) => Ok(module),
            other => Err(SessionError::NotATable(other.type_name().to_string())),
        }
    }

    /// Call `module.new()` and bind the resulting robot object.
    pub fn construct_robot(&self, module: &Table) -> SessionResult<RobotObject> {
        let constructor = match module.get::<Value>("new") {
            Ok(Value::Function(constructor)) => constructor,
            _ => return Err(SessionError::MissingConstructor),
        };
        let instance: Value = constructor
            .call(())
            .map_err(|err| SessionError::ConstructionFailed(err.to_string()))?;

        let robot = RobotObject::bind(&self.lua, instance)?;
        self.handle.inbox().bind_robot();
        tracing::debug!(
            engine = %self.handle.id(),
            has_end = robot.has_end(),
            "robot object bound"
        );
        Ok(robot)
    }

    /// Run the robot's start routine; blocks for the whole session.
    pub fn start(&self, robot: &RobotObject) -> SessionResult<()> {
        robot.start()
    }

    /// Version string of the embedded interpreter
    pub fn lua_version(&self) -> String {
        self.lua
            .globals()
            .get::<String>("_VERSION")
            .unwrap_or_else(|_| "Lua".to_string())
    }

    /// Release the interpreter. Pending invocations are discarded.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for LuaEngine {
    fn drop(&mut self) {
        self.handle.inbox().close();
        self.lua.remove_hook();
        tracing::debug!(engine = %self.handle.id(), "lua engine closed");
    }
}

fn drain_hook(lua: &Lua, inbox: &Inbox) -> mlua::Result<VmState> {
    if inbox.has_pending() {
        deliver_pending(lua, inbox);
    }
    Ok(VmState::Continue)
}

/// Hooks are per Lua thread, so coroutines created by the script get the
/// same inbox-draining hook as the main state.
fn hook_coroutines(lua: &Lua, inbox: Arc<Inbox>, triggers: HookTriggers) -> mlua::Result<()> {
    let coroutine: Table = lua.globals().get("coroutine")?;

    let create_inbox = Arc::clone(&inbox);
    coroutine.set(
        "create",
        lua.create_function(move |lua, body: Function| {
            hooked_thread(lua, &create_inbox, triggers, body)
        })?,
    )?;

    coroutine.set(
        "wrap",
        lua.create_function(move |lua, body: Function| {
            let thread = hooked_thread(lua, &inbox, triggers, body)?;
            lua.create_function(move |_, args: MultiValue| thread.resume::<MultiValue>(args))
        })?,
    )?;
    Ok(())
}

fn hooked_thread(
    lua: &Lua,
    inbox: &Arc<Inbox>,
    triggers: HookTriggers,
    body: Function,
) -> mlua::Result<Thread> {
    let thread = lua.create_thread(body)?;
    let inbox = Arc::clone(inbox);
    thread.set_hook(triggers, move |lua, _debug| drain_hook(lua, &inbox));
    Ok(thread)
}

/// Run every queued invocation on the owning thread. Failures are
/// best-effort and only logged.
pub(crate) fn deliver_pending(lua: &Lua, inbox: &Inbox) {
    while let Some(invocation) = inbox.pop() {
        if let Err(err) = invoke(lua, &invocation) {
            tracing::debug!(?invocation, error = %err, "robot invocation failed");
        }
    }
}

fn invoke(lua: &Lua, invocation: &Invocation) -> mlua::Result<()> {
    let instance: Value = lua.named_registry_value(ROBOT_REGISTRY_KEY)?;
    let method: Option<Function> = match invocation {
        Invocation::End => lua.named_registry_value(END_REGISTRY_KEY)?,
        Invocation::Method(name) => match &instance {
            Value::Table(table) => table.get(name.as_str())?,
            _ => None,
        },
    };
    if let Some(method) = method {
        method.call::<()>(instance)?;
    }
    Ok(())
}
