//! Robot object capability
//!
//! The script's robot object is duck-typed on the Lua side. It is resolved
//! once, right after construction, into a [`RobotObject`] holding the start
//! routine and the optional end routine.

use mlua::{Function, Lua, Table, Value};

use crate::bridge::error::{SessionError, SessionResult};

/// Registry name the robot instance is retained under.
pub const ROBOT_REGISTRY_KEY: &str = "robot_instance";

/// Registry name of the resolved end routine (nil when absent).
pub(crate) const END_REGISTRY_KEY: &str = "luabot.end_routine";

/// Required entry point.
pub const START_ROUTINE: &str = "startCompetition";

/// Optional entry point for graceful shutdown.
pub const END_ROUTINE: &str = "endCompetition";

/// Resolved robot entry points
#[derive(Debug, Clone)]
pub struct RobotObject {
    instance: Table,
    start: Function,
    end: Option<Function>,
}

impl RobotObject {
    /// Resolve entry points on a freshly constructed instance and retain it
    /// in the registry for the rest of the session.
    pub(crate) fn bind(lua: &Lua, instance: Value) -> SessionResult<Self> {
        // Keep the instance alive regardless of what the caller does with it.
        retain(lua, ROBOT_REGISTRY_KEY, instance.clone())?;

        let Value::Table(instance) = instance else {
            return Err(SessionError::MissingStart);
        };
        let start = match instance.get::<Value>(START_ROUTINE) {
            Ok(Value::Function(start)) => start,
            _ => return Err(SessionError::MissingStart),
        };
        let end = match instance.get::<Value>(END_ROUTINE) {
            Ok(Value::Function(end)) => Some(end),
            _ => None,
        };
        retain(lua, END_REGISTRY_KEY, end.clone())?;

        Ok(Self {
            instance,
            start,
            end,
        })
    }

    /// Whether the object exposes an end routine
    pub fn has_end(&self) -> bool {
        self.end.is_some()
    }

    /// Run `self:startCompetition()` to completion.
    pub(crate) fn start(&self) -> SessionResult<()> {
        self.start
            .call::<()>(self.instance.clone())
            .map_err(|err| SessionError::StartFailed(err.to_string()))
    }
}

fn retain(lua: &Lua, key: &str, value: impl mlua::IntoLua) -> SessionResult<()> {
    lua.set_named_registry_value(key, value)
        .map_err(|err| SessionError::ConstructionFailed(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn construct(lua: &Lua, source: &str) -> SessionResult<RobotObject> {
        let instance: Value = lua.load(source).eval().unwrap();
        RobotObject::bind(lua, instance)
    }

    #[test]
    fn test_bind_resolves_both_routines() {
        let lua = Lua::new();
        let robot = construct(
            &lua,
            "return { startCompetition = function(self) end, endCompetition = function(self) end }",
        )
        .unwrap();
        assert!(robot.has_end());
        assert!(robot.start().is_ok());
    }

    #[test]
    fn test_bind_without_end_routine() {
        let lua = Lua::new();
        let robot = construct(&lua, "return { startCompetition = function(self) end }").unwrap();
        assert!(!robot.has_end());
        let end: Option<Function> = lua.named_registry_value(END_REGISTRY_KEY).unwrap();
        assert!(end.is_none());
    }

    #[test]
    fn test_bind_rejects_missing_start() {
        let lua = Lua::new();
        let err = construct(&lua, "return { startCompetition = 42 }").unwrap_err();
        assert!(matches!(err, SessionError::MissingStart));

        let err = construct(&lua, "return 'not a robot'").unwrap_err();
        assert!(matches!(err, SessionError::MissingStart));
    }

    #[test]
    fn test_instance_is_retained_in_registry() {
        let lua = Lua::new();
        construct(&lua, "return { name = 'kit', startCompetition = function(self) end }").unwrap();
        let retained: Table = lua.named_registry_value(ROBOT_REGISTRY_KEY).unwrap();
        assert_eq!(retained.get::<String>("name").unwrap(), "kit");
    }

    #[test]
    fn test_start_passes_self_and_surfaces_errors() {
        let lua = Lua::new();
        let robot = construct(
            &lua,
            "return { startCompetition = function(self) error('motor stalled: ' .. self.port) end, port = 3 }",
        )
        .unwrap();
        let err = robot.start().unwrap_err();
        assert!(matches!(err, SessionError::StartFailed(ref msg) if msg.contains("motor stalled: 3")));
    }
}
