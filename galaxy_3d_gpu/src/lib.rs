/*!
# Galaxy 3D GPU

Backend-agnostic GPU layer of the Galaxy 3D engine.

The crate exposes one `Device` built on top of a native [`Driver`](gpu::driver::Driver)
implementation (see `galaxy_3d_gpu_vulkan`). Everything a frame needs goes
through it:

- **Resources**: buffers, textures, views, samplers, shaders, query pools
- **Caches**: pipelines, argument set layouts, samplers, render passes,
  framebuffers and pipeline layouts, deduplicated by content
- **Transient memory**: per-frame constant and geometry pools, staging buffers
- **Contexts**: transfer, compute and graphics queues, barriers, copies, presentation
- **Command lists**: compute and graphics passes, recordable from worker threads
- **Frame protocol**: `end_frame` recycles a frame slot once the GPU is done with it

Native objects are never destroyed while the GPU may still read them:
dropping a resource queues its handle behind the current frame.
*/

mod config;
mod engine;
mod error;
pub mod debug_draw;
pub mod gpu;
pub mod log;
pub mod memory;

// Main galaxy3d namespace module
pub mod galaxy3d {
    // Error types
    pub use crate::error::{Error, Result};

    // Process-level state
    pub use crate::engine::{DeviceClaim, Engine};

    // Configuration
    pub use crate::config::{
        Config, DebugConfig, DebugMessageFilter, DebugOutput, DebugSeverity, ValidationStats,
    };

    // The device
    pub use crate::gpu::Device;

    // Logging sub-module (types only, macros are exported at the crate root)
    pub mod log {
        pub use crate::log::{format_entry, DefaultLogger, FileLogger, LogEntry, LogSeverity, Logger};
    }

    pub mod gpu {
        pub use crate::gpu::*;
    }

    pub mod memory {
        pub use crate::memory::*;
    }

    pub mod debug_draw {
        pub use crate::debug_draw::*;
    }
}

// Re-export math library at crate root
pub use glam;
