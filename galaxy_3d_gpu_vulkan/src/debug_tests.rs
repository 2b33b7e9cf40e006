use super::*;
use galaxy_3d_gpu::galaxy3d::DebugMessageFilter;

const ERROR: vk::DebugUtilsMessageSeverityFlagsEXT = vk::DebugUtilsMessageSeverityFlagsEXT::ERROR;
const WARNING: vk::DebugUtilsMessageSeverityFlagsEXT = vk::DebugUtilsMessageSeverityFlagsEXT::WARNING;
const INFO: vk::DebugUtilsMessageSeverityFlagsEXT = vk::DebugUtilsMessageSeverityFlagsEXT::INFO;
const VALIDATION: vk::DebugUtilsMessageTypeFlagsEXT = vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION;
const PERFORMANCE: vk::DebugUtilsMessageTypeFlagsEXT = vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE;

// ============================================================================
// Filters
// ============================================================================

#[test]
fn test_severity_flags_widen_with_level() {
    assert_eq!(severity_flags(DebugSeverity::ErrorsOnly), ERROR);
    assert_eq!(severity_flags(DebugSeverity::ErrorsAndWarnings), ERROR | WARNING);
    assert!(severity_flags(DebugSeverity::All).contains(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE));
}

#[test]
fn test_severity_filter() {
    let config = DebugConfig { severity: DebugSeverity::ErrorsOnly, ..DebugConfig::default() };
    assert!(should_report(&config, ERROR, VALIDATION, "bad layout"));
    assert!(!should_report(&config, WARNING, VALIDATION, "bad layout"));

    let config = DebugConfig { severity: DebugSeverity::All, ..DebugConfig::default() };
    assert!(should_report(&config, INFO, VALIDATION, "loader info"));
}

#[test]
fn test_category_filter() {
    let config = DebugConfig {
        severity: DebugSeverity::All,
        message_filter: DebugMessageFilter { show_performance: false, ..DebugMessageFilter::default() },
        ..DebugConfig::default()
    };
    assert!(!should_report(&config, WARNING, PERFORMANCE, "redundant barrier"));
    assert!(should_report(&config, WARNING, VALIDATION, "redundant barrier"));
    assert!(should_report(&config, WARNING, vk::DebugUtilsMessageTypeFlagsEXT::GENERAL, "general"));
}

#[test]
fn test_suppressed_substrings_are_dropped() {
    let config = DebugConfig {
        message_filter: DebugMessageFilter {
            suppressed: vec!["VUID-vkCmdDraw-None-02859".to_string()],
            ..DebugMessageFilter::default()
        },
        ..DebugConfig::default()
    };
    assert!(!should_report(&config, ERROR, VALIDATION, "Validation Error: [ VUID-vkCmdDraw-None-02859 ] ..."));
    assert!(should_report(&config, ERROR, VALIDATION, "Validation Error: [ VUID-vkCmdDraw-None-02697 ] ..."));
}

// ============================================================================
// Statistics
// ============================================================================

#[test]
fn test_stats_tracker_counts_by_severity() {
    let tracker = ValidationStatsTracker::new();
    tracker.record(ERROR);
    tracker.record(WARNING);
    tracker.record(WARNING);
    tracker.record(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE);

    let stats = tracker.snapshot();
    assert_eq!(stats, ValidationStats { errors: 1, warnings: 2, info: 0, verbose: 1 });
    assert_eq!(stats.total(), 4);

    tracker.reset();
    assert_eq!(tracker.snapshot().total(), 0);
}
