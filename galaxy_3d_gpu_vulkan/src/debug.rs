/// Vulkan debug messenger: validation layer messages with colored output
///
/// Messages are filtered by severity, category and suppressed substrings,
/// counted, grouped by repetition and written to the console and/or a file.

use ash::vk;
use colored::*;
use galaxy_3d_gpu::galaxy3d::{DebugConfig, DebugOutput, DebugSeverity, ValidationStats};
use rustc_hash::FxHashMap;
use std::ffi::CStr;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::vulkan::lock;

/// Active debug configuration, shared with the callback
static DEBUG_CONFIG: Mutex<Option<DebugConfig>> = Mutex::new(None);

static VALIDATION_STATS: ValidationStatsTracker = ValidationStatsTracker::new();

/// Occurrence count per message text
static MESSAGE_TRACKER: Mutex<Option<FxHashMap<String, u32>>> = Mutex::new(None);

/// Per-severity counters, indexed by `severity_slot`
struct ValidationStatsTracker {
    counts: [AtomicU32; 4],
}

const SLOT_ERROR: usize = 0;
const SLOT_WARNING: usize = 1;
const SLOT_INFO: usize = 2;
const SLOT_VERBOSE: usize = 3;

fn severity_slot(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> usize {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        SLOT_ERROR
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        SLOT_WARNING
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        SLOT_INFO
    } else {
        SLOT_VERBOSE
    }
}

impl ValidationStatsTracker {
    const fn new() -> Self {
        Self { counts: [AtomicU32::new(0), AtomicU32::new(0), AtomicU32::new(0), AtomicU32::new(0)] }
    }

    fn record(&self, severity: vk::DebugUtilsMessageSeverityFlagsEXT) {
        self.counts[severity_slot(severity)].fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ValidationStats {
        let count = |slot: usize| self.counts[slot].load(Ordering::Relaxed);
        ValidationStats {
            errors: count(SLOT_ERROR),
            warnings: count(SLOT_WARNING),
            info: count(SLOT_INFO),
            verbose: count(SLOT_VERBOSE),
        }
    }

    fn reset(&self) {
        for counter in &self.counts {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Install the configuration the callback reads and reset the counters
pub(crate) fn init_debug_config(config: &DebugConfig) {
    VALIDATION_STATS.reset();
    *lock(&MESSAGE_TRACKER) = Some(FxHashMap::default());
    *lock(&DEBUG_CONFIG) = Some(config.clone());
}

/// Clear the configuration; later callbacks are ignored
pub(crate) fn cleanup_debug_config() {
    *lock(&DEBUG_CONFIG) = None;
    *lock(&MESSAGE_TRACKER) = None;
}

/// Messenger severity mask for a configured severity
pub(crate) fn severity_flags(severity: DebugSeverity) -> vk::DebugUtilsMessageSeverityFlagsEXT {
    match severity {
        DebugSeverity::ErrorsOnly => vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        DebugSeverity::ErrorsAndWarnings => {
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
        }
        DebugSeverity::All => {
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
        }
    }
}

/// Validation statistics since the device was created
pub fn get_validation_stats() -> ValidationStats {
    VALIDATION_STATS.snapshot()
}

/// Print a summary of the validation messages seen so far
pub fn print_validation_stats_report() {
    let stats = get_validation_stats();

    if stats.total() == 0 {
        println!("\n{}", "No validation messages".green().bold());
        return;
    }

    println!("\n{}", "--- Vulkan validation ---".bright_blue().bold());
    let rows = [
        ("errors", stats.errors, Color::Red),
        ("warnings", stats.warnings, Color::Yellow),
        ("info", stats.info, Color::Cyan),
        ("verbose", stats.verbose, Color::BrightBlack),
    ];
    for (label, count, color) in rows.into_iter().filter(|row| row.1 > 0) {
        println!("  {:<10}{}", label.color(color), count);
    }
    println!("  {:<10}{}", "total".bold(), stats.total());

    let repeated = lock(&MESSAGE_TRACKER)
        .as_ref()
        .map_or(0, |tracker| tracker.values().filter(|&&count| count > 1).count());
    if repeated > 0 {
        println!("  {} distinct message(s) repeated", repeated);
    }
    println!();
}

/// Whether a message passes the severity, category and substring filters
pub(crate) fn should_report(
    config: &DebugConfig,
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    message: &str,
) -> bool {
    if !severity_flags(config.severity).intersects(severity) {
        return false;
    }
    let category_shown = if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        config.message_filter.show_validation
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        config.message_filter.show_performance
    } else {
        config.message_filter.show_general
    };
    category_shown && !config.message_filter.is_suppressed(message)
}

fn type_label(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "Validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "Performance"
    } else {
        "General"
    }
}

fn cstr_or<'a>(ptr: *const std::os::raw::c_char, fallback: &'a str) -> std::borrow::Cow<'a, str> {
    if ptr.is_null() {
        std::borrow::Cow::Borrowed(fallback)
    } else {
        // SAFETY: the layer hands out NUL-terminated strings valid for the callback
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy()
    }
}

/// Debug messenger callback registered with the validation layer
pub(crate) unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    let callback_data = &*p_callback_data;
    let message_id_name = cstr_or(callback_data.p_message_id_name, "Unknown");
    let message = cstr_or(callback_data.p_message, "No message");

    let config = match lock(&DEBUG_CONFIG).as_ref() {
        Some(config) => config.clone(),
        None => return vk::FALSE,
    };

    if !should_report(&config, message_severity, message_type, &message) {
        return vk::FALSE;
    }

    let is_error = message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR);
    let (severity_str, severity_colored) = if is_error {
        ("ERROR", "ERROR".red().bold())
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        ("WARNING", "WARNING".yellow().bold())
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        ("INFO", "INFO".cyan())
    } else {
        ("VERBOSE", "VERBOSE".bright_black())
    };
    let type_str = type_label(message_type);

    let occurrence_count = if config.enable_validation_stats {
        VALIDATION_STATS.record(message_severity);
        let mut tracker = lock(&MESSAGE_TRACKER);
        let count = tracker.get_or_insert_with(FxHashMap::default).entry(message.to_string()).or_insert(0);
        *count += 1;
        *count
    } else {
        1
    };
    let repeat_indicator = if occurrence_count > 1 { format!(" [×{}]", occurrence_count) } else { String::new() };

    let console_output = format!(
        "{} {} [{}]{}\n  ├─ {}: {}\n  └─ {}\n",
        "[VULKAN".bright_blue().bold(),
        format!("{}]", severity_colored).bright_blue().bold(),
        type_str.bright_black(),
        repeat_indicator.yellow(),
        "Message ID".bright_black(),
        message_id_name.white(),
        message.white()
    );
    let file_output = format!(
        "[VULKAN {}] [{}]{}\n  ├─ Message ID: {}\n  └─ {}\n",
        severity_str, type_str, repeat_indicator, message_id_name, message
    );

    match &config.output {
        DebugOutput::Console => eprint!("{}", console_output),
        DebugOutput::File(path) => write_to_file(path, &file_output),
        DebugOutput::Both(path) => {
            eprint!("{}", console_output);
            write_to_file(path, &file_output);
        }
    }

    if is_error && config.panic_on_error {
        panic!(
            "\n⚠️  PANIC ON ERROR (Strict Mode)\nMessage ID: {}\nType: {}\nMessage: {}\n",
            message_id_name, type_str, message
        );
    }

    if is_error && config.break_on_validation_error {
        eprintln!(
            "\n{}\n  Context: {} [{}]\n  Message: {}\n",
            "⚠️  BREAK ON VALIDATION ERROR - Aborting execution".red().bold(),
            message_id_name.yellow(),
            type_str.cyan(),
            message.white()
        );
        std::process::abort();
    }

    vk::FALSE
}

fn write_to_file(path: &Path, message: &str) {
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let _ = writeln!(file, "{}", message);
    }
}

#[cfg(test)]
#[path = "debug_tests.rs"]
mod tests;
