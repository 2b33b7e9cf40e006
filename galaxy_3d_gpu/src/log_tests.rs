//! Unit tests for log.rs
//!
//! Tests LogSeverity, LogEntry formatting, DefaultLogger and FileLogger.

use crate::log::{format_entry, DefaultLogger, FileLogger, LogEntry, LogSeverity, Logger};
use std::time::SystemTime;

fn entry(severity: LogSeverity, file: Option<&'static str>, line: Option<u32>) -> LogEntry {
    LogEntry {
        severity,
        timestamp: SystemTime::now(),
        source: "galaxy3d::gpu::Device".to_string(),
        message: "frame slot recycled".to_string(),
        file,
        line,
    }
}

// ============================================================================
// LOG SEVERITY TESTS
// ============================================================================

#[test]
fn test_log_severity_ordering() {
    assert!(LogSeverity::Trace < LogSeverity::Debug);
    assert!(LogSeverity::Debug < LogSeverity::Info);
    assert!(LogSeverity::Info < LogSeverity::Warn);
    assert!(LogSeverity::Warn < LogSeverity::Error);
}

#[test]
fn test_log_severity_labels_are_fixed_width() {
    for severity in [
        LogSeverity::Trace,
        LogSeverity::Debug,
        LogSeverity::Info,
        LogSeverity::Warn,
        LogSeverity::Error,
    ] {
        assert_eq!(severity.label().len(), 5);
    }
}

// ============================================================================
// FORMATTING TESTS
// ============================================================================

#[test]
fn test_format_entry_plain_without_location() {
    let text = format_entry(&entry(LogSeverity::Info, None, None), false);
    assert!(text.contains("[INFO ]"));
    assert!(text.contains("[galaxy3d::gpu::Device]"));
    assert!(text.ends_with("frame slot recycled"));
}

#[test]
fn test_format_entry_plain_with_location() {
    let text = format_entry(&entry(LogSeverity::Error, Some("device.rs"), Some(42)), false);
    assert!(text.contains("[ERROR]"));
    assert!(text.ends_with("frame slot recycled (device.rs:42)"));
}

#[test]
fn test_format_entry_timestamp_prefix() {
    let text = format_entry(&entry(LogSeverity::Debug, None, None), false);
    // [YYYY-MM-DD HH:MM:SS.mmm]
    assert_eq!(text.as_bytes()[0], b'[');
    assert_eq!(text.as_bytes()[24], b']');
}

#[test]
fn test_format_entry_only_location_when_both_present() {
    let text = format_entry(&entry(LogSeverity::Warn, Some("device.rs"), None), false);
    assert!(!text.contains("device.rs"));
}

// ============================================================================
// LOGGER TESTS
// ============================================================================

#[test]
fn test_default_logger_min_severity() {
    assert_eq!(DefaultLogger::default().min_severity(), LogSeverity::Trace);
    let logger = DefaultLogger::new(LogSeverity::Warn);
    assert_eq!(logger.min_severity(), LogSeverity::Warn);
    // Filtered entries are dropped silently
    logger.log(&entry(LogSeverity::Debug, None, None));
    logger.log(&entry(LogSeverity::Error, Some("log_tests.rs"), Some(1)));
}

#[test]
fn test_file_logger_appends_plain_lines() {
    let path = std::env::temp_dir().join(format!("galaxy3d_log_test_{}.log", std::process::id()));
    let _ = std::fs::remove_file(&path);

    let logger = FileLogger::open(&path).unwrap();
    logger.log(&entry(LogSeverity::Info, None, None));
    logger.log(&entry(LogSeverity::Error, Some("device.rs"), Some(7)));
    drop(logger);

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("[INFO ]"));
    assert!(lines[1].contains("(device.rs:7)"));
    // no ANSI escape codes in file output
    assert!(!contents.contains('\u{1b}'));

    let _ = std::fs::remove_file(&path);
}
