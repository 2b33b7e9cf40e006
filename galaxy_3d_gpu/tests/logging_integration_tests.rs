//! Integration tests for the logging macros and the Engine logger
//!
//! These tests use the crate from the outside, the way a driver crate does.
//! No GPU required.
//!
//! Run with: cargo test --test logging_integration_tests

use galaxy_3d_gpu::galaxy3d::log::{LogEntry, LogSeverity, Logger};
use galaxy_3d_gpu::galaxy3d::{Engine, Error, Result};
use serial_test::serial;
use std::sync::{Arc, Mutex};

// ============================================================================
// TEST LOGGER IMPLEMENTATION
// ============================================================================

/// Captures (severity, source, message, has location) for verification
struct TestLogger {
    entries: Arc<Mutex<Vec<(LogSeverity, String, String, bool)>>>,
}

impl Logger for TestLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push((
            entry.severity,
            entry.source.clone(),
            entry.message.clone(),
            entry.file.is_some() && entry.line.is_some(),
        ));
    }
}

fn install_test_logger() -> Arc<Mutex<Vec<(LogSeverity, String, String, bool)>>> {
    let entries = Arc::new(Mutex::new(Vec::new()));
    Engine::set_logger(TestLogger { entries: entries.clone() });
    entries
}

fn failing_operation(size: u64) -> Result<u64> {
    if size == 0 {
        galaxy_3d_gpu::engine_bail!("galaxy3d::vulkan", "Cannot create a {}-byte buffer", size);
    }
    Ok(size)
}

// ============================================================================
// MACRO TESTS
// ============================================================================

#[test]
#[serial]
fn test_integration_macros_from_another_crate() {
    let entries = install_test_logger();

    galaxy_3d_gpu::engine_info!("galaxy3d::vulkan", "Vulkan device created on '{}'", "test adapter");
    galaxy_3d_gpu::engine_warn!("galaxy3d::vulkan", "Validation layer not installed");
    galaxy_3d_gpu::engine_error!("galaxy3d::vulkan", "Failed to create sampler: {}", -1);
    Engine::reset_logger();

    let entries = entries.lock().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].0, LogSeverity::Info);
    assert_eq!(entries[0].2, "Vulkan device created on 'test adapter'");
    assert!(!entries[0].3);
    assert_eq!(entries[1].0, LogSeverity::Warn);
    assert_eq!(entries[2].0, LogSeverity::Error);
    assert_eq!(entries[2].1, "galaxy3d::vulkan");
    // Errors carry their file and line
    assert!(entries[2].3);
}

#[test]
#[serial]
fn test_integration_bail_logs_and_returns_backend_error() {
    let entries = install_test_logger();

    let result = failing_operation(0);
    assert!(failing_operation(16).is_ok());
    Engine::reset_logger();

    match result {
        Err(Error::BackendError(message)) => assert_eq!(message, "Cannot create a 0-byte buffer"),
        other => panic!("expected BackendError, got {:?}", other),
    }
    let entries = entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, LogSeverity::Error);
    assert_eq!(entries[0].2, "Cannot create a 0-byte buffer");
}

// ============================================================================
// ENGINE TESTS
// ============================================================================

#[test]
#[serial]
fn test_integration_second_device_claim_is_logged() {
    let entries = install_test_logger();

    let claim = Engine::claim_device().unwrap();
    let second = Engine::claim_device();
    drop(claim);
    Engine::reset_logger();

    assert!(matches!(second, Err(Error::InitializationFailed(_))));
    assert!(!Engine::has_device());
    let entries = entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].1, "galaxy3d::Engine");
}
