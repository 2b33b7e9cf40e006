/// Device configuration and validation-layer debug settings

use std::path::PathBuf;

use crate::error::{Error, Result};

/// Validation message severity filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugSeverity {
    /// Only errors
    ErrorsOnly,
    /// Errors and warnings
    ErrorsAndWarnings,
    /// Everything, including info and verbose messages
    All,
}

/// Where validation messages are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugOutput {
    /// Colored console output
    Console,
    /// Plain text appended to a file
    File(PathBuf),
    /// Console and file
    Both(PathBuf),
}

/// Validation message filter
///
/// Message types can be hidden as a whole; `suppressed` drops any message
/// whose text contains one of the substrings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugMessageFilter {
    pub show_general: bool,
    pub show_validation: bool,
    pub show_performance: bool,
    pub suppressed: Vec<String>,
}

impl Default for DebugMessageFilter {
    fn default() -> Self {
        Self {
            show_general: true,
            show_validation: true,
            show_performance: true,
            suppressed: Vec::new(),
        }
    }
}

impl DebugMessageFilter {
    /// Whether `message` matches one of the suppressed substrings
    pub fn is_suppressed(&self, message: &str) -> bool {
        self.suppressed.iter().any(|needle| message.contains(needle.as_str()))
    }
}

/// Counters of validation messages seen since device creation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }
}

/// Validation-layer settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugConfig {
    /// Enable the validation layer (needs the backend's validation feature)
    pub enable_validation: bool,
    pub severity: DebugSeverity,
    pub output: DebugOutput,
    pub message_filter: DebugMessageFilter,
    /// Stop in the debugger on a validation error
    pub break_on_validation_error: bool,
    /// Panic on a validation error
    pub panic_on_error: bool,
    pub enable_validation_stats: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enable_validation: cfg!(debug_assertions),
            severity: DebugSeverity::ErrorsAndWarnings,
            output: DebugOutput::Console,
            message_filter: DebugMessageFilter::default(),
            break_on_validation_error: false,
            panic_on_error: false,
            enable_validation_stats: true,
        }
    }
}

/// Device configuration
///
/// Pool sizes are per in-flight frame. Exceeding a transient section at
/// runtime is fatal, so size them for the worst frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub app_name: String,
    /// Number of frames the CPU may run ahead of the GPU
    pub frames_in_flight: usize,
    /// Worker slots for parallel command recording (slot 0 is the main thread)
    pub max_workers: usize,
    /// CPU bump arena size per frame slot
    pub frame_allocator_size: usize,
    /// Constant (uniform) pool section size per frame slot
    pub constant_pool_size: u64,
    /// Geometry scratch pool section size per frame slot
    pub geometry_pool_size: u64,
    /// Size of the zero-filled buffer bound for missing vertex inputs
    pub dummy_vertex_buffer_size: u64,
    /// Use dedicated compute/transfer queue families when available
    pub prefer_dedicated_queues: bool,
    pub debug: DebugConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "Galaxy3D".to_string(),
            frames_in_flight: 2,
            max_workers: 8,
            frame_allocator_size: 4 * 1024 * 1024,
            constant_pool_size: 4 * 1024 * 1024,
            geometry_pool_size: 8 * 1024 * 1024,
            dummy_vertex_buffer_size: 64 * 1024,
            prefer_dedicated_queues: true,
            debug: DebugConfig::default(),
        }
    }
}

impl Config {
    /// Reject configurations the device cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.frames_in_flight == 0 {
            return Err(Error::InitializationFailed("frames_in_flight must be at least 1".to_string()));
        }
        if self.max_workers == 0 {
            return Err(Error::InitializationFailed("max_workers must be at least 1".to_string()));
        }
        if self.frame_allocator_size == 0 || self.constant_pool_size == 0 || self.geometry_pool_size == 0 {
            return Err(Error::InitializationFailed("transient pool sizes must be non-zero".to_string()));
        }
        // Constant arguments are addressed with 32-bit dynamic offsets
        if self.constant_pool_size.saturating_mul(self.frames_in_flight as u64) > u32::MAX as u64 {
            return Err(Error::InitializationFailed("constant pool exceeds 32-bit dynamic offsets".to_string()));
        }
        if self.dummy_vertex_buffer_size < 16 {
            return Err(Error::InitializationFailed("dummy vertex buffer must hold at least one vec4".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
