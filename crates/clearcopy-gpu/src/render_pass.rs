//! Single-subpass render pass and its framebuffer.

use crate::error::{GpuError, Result};
use crate::layout::TrackedImage;
use crate::memory::GpuImage;
use crate::teardown::{PendingTeardown, TeardownStack};
use ash::vk;

/// Render pass with one color attachment, plus the framebuffer binding the
/// render target's view to it.
///
/// No subpass dependency is declared; ordering at the pass boundaries relies
/// on the implicit external dependencies. That is enough for one subpass
/// that is recorded once and followed by an explicit barrier, but a second
/// subpass or a load of prior contents would need explicit dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderPassSetup {
    render_pass: vk::RenderPass,
    framebuffer: vk::Framebuffer,
    attachment: vk::Image,
    extent: vk::Extent2D,
}

impl RenderPassSetup {
    /// Layout the attachment is left in when the pass ends.
    pub const FINAL_LAYOUT: vk::ImageLayout = vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL;

    /// Create the render pass and a framebuffer over `target`'s view.
    ///
    /// # Safety
    /// The device must be valid and must own `target`.
    pub unsafe fn new(
        device: &ash::Device,
        teardown: &mut TeardownStack,
        target: &GpuImage,
    ) -> Result<Self> {
        let extent = vk::Extent2D {
            width: target.extent.width,
            height: target.extent.height,
        };
        let attachments = [attachment_description(target.format)];
        let color_refs = [vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];
        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)];

        let pass_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses);

        let render_pass = unsafe { device.create_render_pass(&pass_info, None) }
            .map_err(GpuError::creating("render pass"))?;
        teardown.push(PendingTeardown::RenderPass(render_pass));

        let views = [target.view];
        let framebuffer_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&views)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { device.create_framebuffer(&framebuffer_info, None) }
            .map_err(GpuError::creating("framebuffer"))?;
        teardown.push(PendingTeardown::Framebuffer(framebuffer));

        Ok(Self {
            render_pass,
            framebuffer,
            attachment: target.tracked().handle(),
            extent,
        })
    }

    /// Wrap handles created elsewhere. `attachment` is the image behind the
    /// framebuffer's only view.
    pub const fn from_raw(
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        attachment: vk::Image,
        extent: vk::Extent2D,
    ) -> Self {
        Self {
            render_pass,
            framebuffer,
            attachment,
            extent,
        }
    }

    /// Get the render pass handle.
    pub const fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Get the framebuffer handle.
    pub const fn framebuffer(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    /// The image the framebuffer renders into.
    pub const fn attachment(&self) -> vk::Image {
        self.attachment
    }

    /// Fail unless `image` is this pass's attachment.
    pub fn require_attachment(&self, image: &TrackedImage) -> Result<()> {
        if image.handle() == self.attachment {
            Ok(())
        } else {
            Err(GpuError::InvalidState(format!(
                "{} is not the render pass attachment",
                image.name()
            )))
        }
    }

    /// Apply the end-of-pass transition to the attachment's tracked state.
    ///
    /// Any other image is rejected and left untouched.
    pub fn finish(&self, image: &mut TrackedImage) -> Result<()> {
        self.require_attachment(image)?;
        image.finish_render_pass(Self::FINAL_LAYOUT, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
        Ok(())
    }

    /// Framebuffer extent.
    pub const fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// The whole framebuffer area.
    pub const fn render_area(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        }
    }
}

/// The single color attachment: contents are undefined on load and kept on
/// store.
pub fn attachment_description(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::DONT_CARE)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(RenderPassSetup::FINAL_LAYOUT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn attachment_is_dont_care_then_store() {
        let desc = attachment_description(vk::Format::R8G8B8A8_UNORM);
        assert_eq!(desc.load_op, vk::AttachmentLoadOp::DONT_CARE);
        assert_eq!(desc.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(desc.final_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(desc.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn render_area_covers_framebuffer() {
        let area = setup().render_area();
        assert_eq!(area.offset.x, 0);
        assert_eq!(area.offset.y, 0);
        assert_eq!(area.extent.width, 400);
        assert_eq!(area.extent.height, 400);
    }

    fn setup() -> RenderPassSetup {
        RenderPassSetup::from_raw(
            vk::RenderPass::from_raw(1),
            vk::Framebuffer::from_raw(2),
            vk::Image::from_raw(3),
            vk::Extent2D {
                width: 400,
                height: 400,
            },
        )
    }

    #[test]
    fn finish_moves_attachment_to_final_layout() {
        let mut target = TrackedImage::new(vk::Image::from_raw(3), "render_target");
        setup().finish(&mut target).unwrap();
        assert_eq!(target.layout(), RenderPassSetup::FINAL_LAYOUT);
        assert_eq!(target.access(), vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
    }

    #[test]
    fn finish_leaves_other_images_alone() {
        let mut other = TrackedImage::new(vk::Image::from_raw(4), "readback");
        let err = setup().finish(&mut other).unwrap_err();
        assert!(matches!(err, GpuError::InvalidState(_)));
        assert_eq!(other.layout(), vk::ImageLayout::UNDEFINED);
        assert_eq!(other.access(), vk::AccessFlags::empty());
    }
}
