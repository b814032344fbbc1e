//! Pipeline error types.

use std::fmt;

use clearcopy_gpu::GpuError;
use thiserror::Error;

/// A color channel of an RGBA8 pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Red,
    Green,
    Blue,
    Alpha,
}

impl Channel {
    /// All channels in byte order.
    pub const ALL: [Self; 4] = [Self::Red, Self::Green, Self::Blue, Self::Alpha];
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Red => "red",
            Self::Green => "green",
            Self::Blue => "blue",
            Self::Alpha => "alpha",
        };
        f.write_str(name)
    }
}

/// Errors that end a pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Driver, memory-selection, submission, sync or layout failure.
    #[error(transparent)]
    Gpu(#[from] GpuError),

    /// The read-back pixel differs from the clear color.
    #[error("Pixel validation failed: {channel} is {actual:#04x}, expected {expected:#04x}")]
    Validation {
        channel: Channel,
        expected: u8,
        actual: u8,
    },

    /// Full-surface verification found pixels other than the clear color.
    #[error("{mismatched} of {total} pixels differ from the clear color")]
    SurfaceMismatch { mismatched: usize, total: usize },

    /// The readback surface could not be written out.
    #[error("Failed to save readback image: {0}")]
    Image(#[from] image::ImageError),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, PipelineError>;
