//! CPU-side bump allocation for per-frame scratch data

mod linear_allocator;

pub use linear_allocator::{
    ArenaBox, FrameAllocator, LinearAllocator, MAX_ALIGNMENT, MIN_ALIGNMENT,
};
