//! The `luabot` table exposed to robot scripts
//!
//! ```lua
//! luabot.version          -- crate version string
//! luabot.time()           -- seconds since the engine opened
//! luabot.log(msg)         -- log through the host's tracing output
//! luabot.sleep(seconds)   -- sleep, returning true early if a queued
//!                         -- call (such as endCompetition) was run
//! ```
//!
//! The global `print` is replaced so script output goes through the same
//! `luabot::script` tracing target as `luabot.log`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use mlua::{Function, Lua, MultiValue, Result as LuaResult};

use super::deliver_pending;
use super::handle::Inbox;

/// Install the `luabot` global.
pub(crate) fn register(lua: &Lua, inbox: Arc<Inbox>) -> LuaResult<()> {
    let table = lua.create_table()?;
    table.set("version", crate::VERSION)?;

    let opened = Instant::now();
    table.set(
        "time",
        lua.create_function(move |_, ()| Ok(opened.elapsed().as_secs_f64()))?,
    )?;

    table.set(
        "log",
        lua.create_function(|_, message: String| {
            tracing::info!(target: "luabot::script", "{message}");
            Ok(())
        })?,
    )?;

    table.set(
        "sleep",
        lua.create_function(move |lua, seconds: f64| sleep(lua, &inbox, seconds))?,
    )?;

    lua.globals().set("luabot", table)?;
    lua.globals().set(
        "print",
        lua.create_function(|lua, args: MultiValue| {
            let line = print_line(lua, args)?;
            tracing::info!(target: "luabot::script", "{line}");
            Ok(())
        })?,
    )?;
    Ok(())
}

/// `print` formatting: every argument through `tostring`, tab separated.
fn print_line(lua: &Lua, args: MultiValue) -> LuaResult<String> {
    let tostring: Function = lua.globals().get("tostring")?;
    let mut parts = Vec::with_capacity(args.len());
    for value in args {
        parts.push(tostring.call::<String>(value)?);
    }
    Ok(parts.join("\t"))
}

fn sleep(lua: &Lua, inbox: &Inbox, seconds: f64) -> LuaResult<bool> {
    let duration = Duration::try_from_secs_f64(seconds)
        .map_err(|err| mlua::Error::RuntimeError(format!("invalid sleep duration: {err}")))?;
    let deadline = Instant::now()
        .checked_add(duration)
        .ok_or_else(|| mlua::Error::RuntimeError("sleep duration too long".to_string()))?;

    loop {
        if inbox.has_pending() {
            deliver_pending(lua, inbox);
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        inbox.wait_until(deadline);
    }
}
