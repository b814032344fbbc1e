//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// The Vulkan loader could not be opened.
    #[error("Failed to load Vulkan: {0}")]
    Loading(String),

    /// No suitable GPU or queue family found.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// A driver object-creation call failed.
    #[error("Failed to create {what}: {result}")]
    ResourceCreation {
        what: &'static str,
        result: vk::Result,
    },

    /// No memory type satisfies both the type mask and the requested properties.
    #[error("No memory type in mask {type_bits:#034b} provides {required:?}")]
    NoSuitableMemoryType {
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    },

    /// Queue submission was rejected.
    #[error("Queue submission failed: {0}")]
    Submission(vk::Result),

    /// Fence wait failed or timed out.
    #[error("Fence wait failed: {0}")]
    Sync(vk::Result),

    /// An operation needed an image in a layout it is not currently in.
    #[error("{image} is in layout {actual:?}, operation requires {expected:?}")]
    LayoutMismatch {
        image: &'static str,
        expected: vk::ImageLayout,
        actual: vk::ImageLayout,
    },

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Any other Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),
}

impl GpuError {
    /// Map a failed creation call to [`GpuError::ResourceCreation`].
    pub fn creating(what: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::ResourceCreation { what, result }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creation_failure_names_the_object() {
        let err = GpuError::creating("framebuffer")(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        assert!(matches!(
            err,
            GpuError::ResourceCreation {
                what: "framebuffer",
                result: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
            }
        ));
        assert!(err.to_string().starts_with("Failed to create framebuffer"));
    }

    #[test]
    fn layout_mismatch_message() {
        let err = GpuError::LayoutMismatch {
            image: "readback",
            expected: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            actual: vk::ImageLayout::UNDEFINED,
        };
        let msg = err.to_string();
        assert!(msg.contains("readback"));
        assert!(msg.contains("TRANSFER_DST_OPTIMAL"));
    }
}
