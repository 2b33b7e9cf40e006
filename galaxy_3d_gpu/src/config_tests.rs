//! Unit tests for config.rs

use crate::config::{Config, DebugMessageFilter, DebugOutput, DebugSeverity, ValidationStats};
use crate::error::Error;

// ============================================================================
// DEFAULTS
// ============================================================================

#[test]
fn test_default_config_is_valid() {
    let config = Config::default();
    assert_eq!(config.frames_in_flight, 2);
    assert!(config.max_workers >= 1);
    assert!(config.validate().is_ok());
}

#[test]
fn test_default_debug_config() {
    let config = Config::default();
    assert_eq!(config.debug.severity, DebugSeverity::ErrorsAndWarnings);
    assert_eq!(config.debug.output, DebugOutput::Console);
    assert!(!config.debug.break_on_validation_error);
    assert_eq!(config.debug.enable_validation, cfg!(debug_assertions));
}

// ============================================================================
// VALIDATION
// ============================================================================

#[test]
fn test_zero_frames_in_flight_rejected() {
    let config = Config { frames_in_flight: 0, ..Config::default() };
    assert!(matches!(config.validate(), Err(Error::InitializationFailed(_))));
}

#[test]
fn test_zero_workers_rejected() {
    let config = Config { max_workers: 0, ..Config::default() };
    assert!(config.validate().is_err());
}

#[test]
fn test_zero_pool_rejected() {
    let config = Config { constant_pool_size: 0, ..Config::default() };
    assert!(config.validate().is_err());
}

#[test]
fn test_constant_pool_must_fit_dynamic_offsets() {
    let config = Config {
        constant_pool_size: 3 * 1024 * 1024 * 1024,
        frames_in_flight: 2,
        ..Config::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_tiny_dummy_buffer_rejected() {
    let config = Config { dummy_vertex_buffer_size: 8, ..Config::default() };
    assert!(config.validate().is_err());
}

// ============================================================================
// MESSAGE FILTER / STATS
// ============================================================================

#[test]
fn test_message_filter_substring_suppression() {
    let filter = DebugMessageFilter {
        suppressed: vec!["VUID-vkCmdDraw-None-02699".to_string(), "BestPractices".to_string()],
        ..DebugMessageFilter::default()
    };
    assert!(filter.is_suppressed("Validation Error: [ VUID-vkCmdDraw-None-02699 ] descriptor"));
    assert!(filter.is_suppressed("[BestPractices-vkAllocateMemory-small-allocation]"));
    assert!(!filter.is_suppressed("VUID-vkQueueSubmit-pCommandBuffers-00071"));
}

#[test]
fn test_empty_filter_suppresses_nothing() {
    assert!(!DebugMessageFilter::default().is_suppressed("anything"));
}

#[test]
fn test_validation_stats_total() {
    let stats = ValidationStats { errors: 1, warnings: 2, info: 3, verbose: 4 };
    assert_eq!(stats.total(), 10);
    assert_eq!(ValidationStats::default().total(), 0);
}
