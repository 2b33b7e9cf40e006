//! Unit tests for Engine (logger slot and device claim)
//!
//! LOGGER and the device claim are process-global: every test here is
//! #[serial].

use crate::galaxy3d::log::{LogEntry, LogSeverity, Logger};
use crate::galaxy3d::Engine;
use serial_test::serial;
use std::sync::{Arc, Mutex};

// ============================================================================
// TEST HELPERS
// ============================================================================

/// Captures entries as "Severity: message"
struct TestLogger {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Logger for TestLogger {
    fn log(&self, entry: &LogEntry) {
        let location = match (entry.file, entry.line) {
            (Some(_), Some(_)) => " @",
            _ => "",
        };
        self.entries
            .lock()
            .unwrap()
            .push(format!("{:?}: {}{}", entry.severity, entry.message, location));
    }
}

fn capture() -> Arc<Mutex<Vec<String>>> {
    let entries = Arc::new(Mutex::new(Vec::new()));
    Engine::set_logger(TestLogger { entries: entries.clone() });
    entries
}

// ============================================================================
// LOGGING API
// ============================================================================

#[test]
#[serial]
fn test_set_logger_receives_entries() {
    let entries = capture();
    Engine::log(LogSeverity::Info, "galaxy3d::test", "hello".to_string());
    Engine::log_detailed(LogSeverity::Error, "galaxy3d::test", "boom".to_string(), "x.rs", 3);
    Engine::reset_logger();

    let entries = entries.lock().unwrap();
    assert_eq!(entries.as_slice(), ["Info: hello", "Error: boom @"]);
}

#[test]
#[serial]
fn test_macros_route_through_engine() {
    let entries = capture();
    crate::engine_trace!("galaxy3d::test", "t{}", 1);
    crate::engine_debug!("galaxy3d::test", "d{}", 2);
    crate::engine_info!("galaxy3d::test", "i{}", 3);
    crate::engine_warn!("galaxy3d::test", "w{}", 4);
    crate::engine_error!("galaxy3d::test", "e{}", 5);
    let _ = crate::engine_err!("galaxy3d::test", "r{}", 6);
    Engine::reset_logger();

    let entries = entries.lock().unwrap();
    assert_eq!(
        entries.as_slice(),
        ["Trace: t1", "Debug: d2", "Info: i3", "Warn: w4", "Error: e5 @", "Error: r6 @"]
    );
}

#[test]
#[serial]
fn test_reset_logger_detaches_custom_logger() {
    let entries = capture();
    Engine::reset_logger();
    Engine::log(LogSeverity::Debug, "galaxy3d::test", "not captured".to_string());
    assert!(entries.lock().unwrap().is_empty());
}

// ============================================================================
// DEVICE CLAIM
// ============================================================================

#[test]
#[serial]
fn test_device_claim_is_exclusive() {
    let claim = Engine::claim_device().unwrap();
    assert!(Engine::has_device());
    assert!(Engine::claim_device().is_err());
    drop(claim);
    assert!(!Engine::has_device());
    let again = Engine::claim_device();
    assert!(again.is_ok());
}
