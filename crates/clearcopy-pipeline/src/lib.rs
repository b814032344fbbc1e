//! Off-screen clear, copy and host readback of a single frame.
//!
//! This crate provides:
//! - Run configuration and argument parsing
//! - Ordered command recording with layout checks
//! - Fence-guarded submission
//! - Host readback and pixel validation
//! - A session that owns and tears down everything a run creates

pub mod config;
pub mod error;
pub mod readback;
pub mod recorder;
pub mod session;
pub mod submit;

pub use config::PipelineConfig;
pub use error::{Channel, PipelineError, Result};
pub use readback::{ReadbackReport, Rgba8};
pub use recorder::{record_clear_and_copy, CommandRecorder, RecordedCommands, RecorderState, Step};
pub use session::{run, PipelineSession};
pub use submit::submit_and_wait;

/// Fixed parameters of the rendered frame.
pub mod constants {
    use ash::vk;

    /// Color format of both images.
    pub const FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

    /// Frame width in pixels.
    pub const WIDTH: u32 = 400;

    /// Frame height in pixels.
    pub const HEIGHT: u32 = 400;

    /// Extent of both images.
    pub const EXTENT: vk::Extent3D = vk::Extent3D {
        width: WIDTH,
        height: HEIGHT,
        depth: 1,
    };

    /// Opaque yellow.
    pub const CLEAR_COLOR: [f32; 4] = [1.0, 1.0, 0.0, 1.0];
}
