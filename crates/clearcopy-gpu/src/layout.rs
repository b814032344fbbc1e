//! Image layout tracking.
//!
//! The tracked layout is the only record of which layout an image is in.
//! Barrier recording is the only way to move it, apart from the final-layout
//! transition a render pass performs when it ends.

use crate::error::{GpuError, Result};
use ash::vk;

/// Full color subresource range of a single-level, single-layer image.
pub const COLOR_RANGE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: vk::REMAINING_MIP_LEVELS,
    base_array_layer: 0,
    layer_count: vk::REMAINING_ARRAY_LAYERS,
};

/// An image handle together with its current layout and last access scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedImage {
    handle: vk::Image,
    name: &'static str,
    layout: vk::ImageLayout,
    access: vk::AccessFlags,
}

impl TrackedImage {
    /// Track a newly created image (initial layout `UNDEFINED`).
    pub const fn new(handle: vk::Image, name: &'static str) -> Self {
        Self {
            handle,
            name,
            layout: vk::ImageLayout::UNDEFINED,
            access: vk::AccessFlags::empty(),
        }
    }

    /// Get the raw image handle.
    pub const fn handle(&self) -> vk::Image {
        self.handle
    }

    /// Name used in diagnostics.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Current layout.
    pub const fn layout(&self) -> vk::ImageLayout {
        self.layout
    }

    /// Access scope of the last recorded write or transition.
    pub const fn access(&self) -> vk::AccessFlags {
        self.access
    }

    /// Fail unless the image is currently in `expected`.
    pub fn require(&self, expected: vk::ImageLayout) -> Result<()> {
        if self.layout == expected {
            Ok(())
        } else {
            Err(GpuError::LayoutMismatch {
                image: self.name,
                expected,
                actual: self.layout,
            })
        }
    }

    /// Build the barrier moving this image to `new_layout` and update the
    /// tracked state.
    ///
    /// The old layout and source access come from the tracked state. The
    /// returned barrier must be recorded for the tracked state to be true.
    pub fn transition(
        &mut self,
        new_layout: vk::ImageLayout,
        dst_access: vk::AccessFlags,
        queue_family: u32,
    ) -> vk::ImageMemoryBarrier<'static> {
        let barrier = vk::ImageMemoryBarrier::default()
            .src_access_mask(self.access)
            .dst_access_mask(dst_access)
            .old_layout(self.layout)
            .new_layout(new_layout)
            .src_queue_family_index(queue_family)
            .dst_queue_family_index(queue_family)
            .image(self.handle)
            .subresource_range(COLOR_RANGE);

        tracing::trace!(
            image = self.name,
            from = ?self.layout,
            to = ?new_layout,
            "Layout transition"
        );
        self.layout = new_layout;
        self.access = dst_access;
        barrier
    }

    /// Apply the transition a render pass performs on its attachment at the
    /// end of the pass. Reached only through `RenderPassSetup::finish`.
    pub(crate) fn finish_render_pass(&mut self, final_layout: vk::ImageLayout, access: vk::AccessFlags) {
        self.layout = final_layout;
        self.access = access;
    }
}
