//! Module shape validation tests
//!
//! Every malformed robot module must end the session before the start
//! routine runs and produce exactly one diagnostic of the right kind.

use luabot::bridge::{BridgeConfig, Termination};
use luabot::host::{Diagnostic, DiagnosticKind};
use luabot::{LifecycleBridge, SessionOutcome, SimHost};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;

fn script(source: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create script");
    file.write_all(source.as_bytes()).expect("write script");
    file
}

fn run(path: &Path) -> (SessionOutcome, Vec<Diagnostic>) {
    let host = Arc::new(SimHost::new());
    let outcome = LifecycleBridge::new(host.clone(), BridgeConfig::default())
        .run(path)
        .expect("shape errors are reported, not returned");
    (outcome, host.diagnostics())
}

fn assert_rejected(outcome: &SessionOutcome, diagnostics: &[Diagnostic], kind: DiagnosticKind) {
    assert_eq!(outcome.termination, Termination::Joined);
    assert!(!outcome.robot_started);
    assert_eq!(outcome.end_request, None);
    assert_eq!(diagnostics.len(), 1, "diagnostics: {diagnostics:?}");
    assert_eq!(diagnostics[0].kind, kind);
}

#[test]
fn test_non_table_module() {
    let file = script("return 7");
    let (outcome, diagnostics) = run(file.path());

    assert_rejected(&outcome, &diagnostics, DiagnosticKind::NotATable);
    assert!(diagnostics[0].message.contains("Module did not return a table"));
    assert_eq!(DiagnosticKind::NotATable.label(), "module did not return a table");
    assert_eq!(outcome.engine_closes, 1);
}

#[test]
fn test_constructor_raises() {
    let file = script("return { new = function() error('gyro not calibrated') end }");
    let (outcome, diagnostics) = run(file.path());

    assert_rejected(&outcome, &diagnostics, DiagnosticKind::ConstructionFailed);
    assert_eq!(diagnostics[0].kind.label(), "construction failed");
    assert!(diagnostics[0].message.contains("gyro not calibrated"));
}

#[test]
fn test_constructor_not_callable() {
    let file = script("return { new = { } }");
    let (outcome, diagnostics) = run(file.path());

    assert_rejected(&outcome, &diagnostics, DiagnosticKind::MissingConstructor);
    assert!(diagnostics[0].message.contains("missing 'new' function"));
}

#[test]
fn test_robot_without_start_routine() {
    let file = script("return { new = function() return { endCompetition = function(self) end } end }");
    let (outcome, diagnostics) = run(file.path());

    assert_rejected(&outcome, &diagnostics, DiagnosticKind::MissingStart);
    assert!(diagnostics[0].message.contains("startCompetition"));
}

#[test]
fn test_syntax_error() {
    let file = script("return { new = function() ");
    let (outcome, diagnostics) = run(file.path());

    assert_rejected(&outcome, &diagnostics, DiagnosticKind::ModuleLoad);
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let (outcome, diagnostics) = run(&dir.path().join("absent.lua"));

    assert_rejected(&outcome, &diagnostics, DiagnosticKind::ModuleLoad);
    assert!(diagnostics[0].message.contains("absent.lua"));
}
