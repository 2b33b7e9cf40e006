/// Galaxy3D process-level state
///
/// Only two things are process-global in the GPU layer: the log sink and
/// the "one live Device" claim. Everything else hangs off an explicit
/// [`Device`](crate::gpu::Device) passed by reference.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{OnceLock, RwLock};
use std::time::SystemTime;

use crate::error::{Error, Result};
use crate::log::{DefaultLogger, LogEntry, LogSeverity, Logger};

// ===== INTERNAL STATE =====

/// Global logger (initialized with DefaultLogger)
static LOGGER: OnceLock<RwLock<Box<dyn Logger>>> = OnceLock::new();

/// Set while a Device is alive
static DEVICE_CLAIMED: AtomicBool = AtomicBool::new(false);

fn logger_lock() -> &'static RwLock<Box<dyn Logger>> {
    LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger::default())))
}

/// Proof that the caller holds the single-device claim
///
/// Released when dropped.
#[derive(Debug)]
pub struct DeviceClaim {
    _private: (),
}

impl Drop for DeviceClaim {
    fn drop(&mut self) {
        DEVICE_CLAIMED.store(false, Ordering::Release);
    }
}

// ===== PUBLIC API =====

/// Process-level entry points (logging, device claim)
pub struct Engine;

impl Engine {
    // ===== DEVICE CLAIM =====

    /// Claim the right to create a Device
    ///
    /// Fails while another Device is alive.
    pub fn claim_device() -> Result<DeviceClaim> {
        if DEVICE_CLAIMED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            crate::engine_error!("galaxy3d::Engine", "A Device already exists");
            return Err(Error::InitializationFailed("a Device already exists".to_string()));
        }
        Ok(DeviceClaim { _private: () })
    }

    /// Whether a Device is currently alive
    pub fn has_device() -> bool {
        DEVICE_CLAIMED.load(Ordering::Acquire)
    }

    // ===== LOGGING API =====

    /// Replace the active logger
    ///
    /// # Example
    ///
    /// ```no_run
    /// use galaxy_3d_gpu::galaxy3d::{Engine, log::{Logger, LogEntry}};
    ///
    /// struct Silent;
    /// impl Logger for Silent {
    ///     fn log(&self, _entry: &LogEntry) {}
    /// }
    ///
    /// Engine::set_logger(Silent);
    /// ```
    pub fn set_logger<L: Logger + 'static>(logger: L) {
        if let Ok(mut lock) = logger_lock().write() {
            *lock = Box::new(logger);
        }
    }

    /// Reset the logger to `DefaultLogger`
    pub fn reset_logger() {
        if let Ok(mut lock) = logger_lock().write() {
            *lock = Box::new(DefaultLogger::default());
        }
    }

    /// Log without file:line (used by `engine_trace!` .. `engine_warn!`)
    pub fn log(severity: LogSeverity, source: &str, message: String) {
        if let Ok(lock) = logger_lock().read() {
            lock.log(&LogEntry {
                severity,
                timestamp: SystemTime::now(),
                source: source.to_string(),
                message,
                file: None,
                line: None,
            });
        }
    }

    /// Log with file:line (used by `engine_error!`, `engine_err!`, `engine_fatal!`)
    pub fn log_detailed(
        severity: LogSeverity,
        source: &str,
        message: String,
        file: &'static str,
        line: u32,
    ) {
        if let Ok(lock) = logger_lock().read() {
            lock.log(&LogEntry {
                severity,
                timestamp: SystemTime::now(),
                source: source.to_string(),
                message,
                file: Some(file),
                line: Some(line),
            });
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
