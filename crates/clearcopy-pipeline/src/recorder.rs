//! Recording of the clear, transition and copy command sequence.
//!
//! The recorder accepts the steps only in this order:
//!
//! 1. begin render pass
//! 2. clear color attachment 0
//! 3. end render pass
//! 4. barrier: render target to transfer source, readback to transfer destination
//! 5. copy render target into readback
//! 6. barrier: readback to host-readable
//! 7. end recording
//!
//! Each step checks the tracked layouts it depends on before anything is
//! encoded.

use ash::vk;
use clearcopy_gpu::{CommandEncoder, GpuError, RenderPassSetup, Result, TrackedImage};

/// Layout the readback image is left in for host reads.
pub const HOST_READ_LAYOUT: vk::ImageLayout = vk::ImageLayout::GENERAL;

/// One recording step, in the only order the recorder accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    BeginRenderPass,
    ClearAttachment,
    EndRenderPass,
    TransitionForCopy,
    CopyImage,
    TransitionForHostRead,
    End,
}

impl Step {
    /// The step that must follow this one.
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::BeginRenderPass => Some(Self::ClearAttachment),
            Self::ClearAttachment => Some(Self::EndRenderPass),
            Self::EndRenderPass => Some(Self::TransitionForCopy),
            Self::TransitionForCopy => Some(Self::CopyImage),
            Self::CopyImage => Some(Self::TransitionForHostRead),
            Self::TransitionForHostRead => Some(Self::End),
            Self::End => None,
        }
    }
}

/// Recorder lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Initial,
    Recording { next: Step },
    Ended,
}

/// A command buffer whose recording has ended.
///
/// Only [`CommandRecorder::end`] produces one, and submitting consumes it,
/// so a buffer is submitted at most once and never re-recorded.
#[derive(Debug)]
pub struct RecordedCommands {
    command_buffer: vk::CommandBuffer,
}

impl RecordedCommands {
    /// Get the command buffer handle.
    pub const fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }
}

/// Records the single clear-and-copy sequence through a [`CommandEncoder`].
pub struct CommandRecorder<E: CommandEncoder> {
    encoder: E,
    state: RecorderState,
    queue_family: u32,
    active_pass: Option<RenderPassSetup>,
}

impl<E: CommandEncoder> CommandRecorder<E> {
    /// Wrap an encoder. Barriers keep ownership on `queue_family`.
    pub const fn new(encoder: E, queue_family: u32) -> Self {
        Self {
            encoder,
            state: RecorderState::Initial,
            queue_family,
            active_pass: None,
        }
    }

    /// Current state.
    pub const fn state(&self) -> RecorderState {
        self.state
    }

    /// Get the underlying encoder.
    pub const fn encoder(&self) -> &E {
        &self.encoder
    }

    /// Start recording a one-time-submit command buffer.
    pub fn begin(&mut self) -> Result<()> {
        if self.state != RecorderState::Initial {
            return Err(GpuError::InvalidState(format!(
                "Cannot begin recording in state {:?}",
                self.state
            )));
        }
        self.encoder
            .begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        self.state = RecorderState::Recording {
            next: Step::BeginRenderPass,
        };
        Ok(())
    }

    /// Fail unless `step` is the next one to record.
    fn expect_step(&self, step: Step) -> Result<()> {
        match self.state {
            RecorderState::Recording { next } if next == step => Ok(()),
            state => Err(GpuError::InvalidState(format!(
                "Cannot record {step:?} in state {state:?}"
            ))),
        }
    }

    fn current_pass(&self) -> Result<RenderPassSetup> {
        self.active_pass
            .ok_or_else(|| GpuError::InvalidState("No active render pass".to_string()))
    }

    /// Move past `step` once it has been encoded.
    fn advance(&mut self, step: Step) {
        self.state = match step.next() {
            Some(next) => RecorderState::Recording { next },
            None => RecorderState::Ended,
        };
    }

    /// Begin the render pass over the whole framebuffer.
    pub fn begin_render_pass(&mut self, pass: &RenderPassSetup) -> Result<()> {
        self.expect_step(Step::BeginRenderPass)?;

        let render_area = pass.render_area();
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(pass.render_pass())
            .framebuffer(pass.framebuffer())
            .render_area(render_area);
        self.encoder.begin_render_pass(&begin_info);

        self.active_pass = Some(*pass);
        self.advance(Step::BeginRenderPass);
        Ok(())
    }

    /// Clear color attachment 0 over the whole render area.
    ///
    /// The attachment loads as don't-care, so this is what defines its
    /// contents.
    pub fn clear_color_attachment(&mut self, color: [f32; 4]) -> Result<()> {
        self.expect_step(Step::ClearAttachment)?;
        let rect = self.current_pass()?.render_area();

        let attachment = vk::ClearAttachment {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            color_attachment: 0,
            clear_value: vk::ClearValue {
                color: vk::ClearColorValue { float32: color },
            },
        };
        let clear_rect = vk::ClearRect {
            rect,
            base_array_layer: 0,
            layer_count: 1,
        };
        self.encoder.clear_attachments(&[attachment], &[clear_rect]);

        self.advance(Step::ClearAttachment);
        Ok(())
    }

    /// End the render pass. `target` must be the pass's attachment; it moves
    /// to the pass's final layout.
    pub fn end_render_pass(&mut self, target: &mut TrackedImage) -> Result<()> {
        self.expect_step(Step::EndRenderPass)?;
        let pass = self.current_pass()?;
        pass.require_attachment(target)?;

        self.encoder.end_render_pass();
        self.active_pass = None;
        pass.finish(target)?;

        self.advance(Step::EndRenderPass);
        Ok(())
    }

    /// One barrier moving the rendered image to transfer source and the
    /// readback image to transfer destination.
    pub fn transition_for_copy(
        &mut self,
        src: &mut TrackedImage,
        dst: &mut TrackedImage,
    ) -> Result<()> {
        self.expect_step(Step::TransitionForCopy)?;
        src.require(RenderPassSetup::FINAL_LAYOUT)?;
        dst.require(vk::ImageLayout::UNDEFINED)?;

        let barriers = [
            dst.transition(
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::AccessFlags::TRANSFER_WRITE,
                self.queue_family,
            ),
            src.transition(
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::AccessFlags::TRANSFER_READ,
                self.queue_family,
            ),
        ];
        self.encoder.image_barriers(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::PipelineStageFlags::TRANSFER,
            &barriers,
        );

        self.advance(Step::TransitionForCopy);
        Ok(())
    }

    /// Copy mip 0, layer 0 of `src` into `dst` without scaling.
    pub fn copy_image(
        &mut self,
        src: &TrackedImage,
        dst: &TrackedImage,
        extent: vk::Extent3D,
    ) -> Result<()> {
        self.expect_step(Step::CopyImage)?;
        src.require(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)?;
        dst.require(vk::ImageLayout::TRANSFER_DST_OPTIMAL)?;

        let layers = vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        };
        let region = vk::ImageCopy {
            src_subresource: layers,
            src_offset: vk::Offset3D::default(),
            dst_subresource: layers,
            dst_offset: vk::Offset3D::default(),
            extent,
        };
        self.encoder.copy_image(
            src.handle(),
            src.layout(),
            dst.handle(),
            dst.layout(),
            &[region],
        );

        self.advance(Step::CopyImage);
        Ok(())
    }

    /// Barrier making the copy result visible to host reads.
    pub fn transition_for_host_read(&mut self, dst: &mut TrackedImage) -> Result<()> {
        self.expect_step(Step::TransitionForHostRead)?;
        dst.require(vk::ImageLayout::TRANSFER_DST_OPTIMAL)?;

        let barrier = dst.transition(
            HOST_READ_LAYOUT,
            vk::AccessFlags::HOST_READ,
            self.queue_family,
        );
        self.encoder.image_barriers(
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::HOST,
            &[barrier],
        );

        self.advance(Step::TransitionForHostRead);
        Ok(())
    }

    /// End recording.
    pub fn end(mut self) -> Result<RecordedCommands> {
        self.expect_step(Step::End)?;
        self.encoder.end()?;
        self.advance(Step::End);

        tracing::debug!("Command buffer recorded");
        Ok(RecordedCommands {
            command_buffer: self.encoder.command_buffer(),
        })
    }
}

/// Record the whole sequence: clear the render target to `color`, copy it
/// into `readback` and leave `readback` ready for host reads.
pub fn record_clear_and_copy<E: CommandEncoder>(
    mut recorder: CommandRecorder<E>,
    pass: &RenderPassSetup,
    target: &mut TrackedImage,
    readback: &mut TrackedImage,
    color: [f32; 4],
) -> Result<RecordedCommands> {
    let extent = pass.extent();

    recorder.begin()?;
    recorder.begin_render_pass(pass)?;
    recorder.clear_color_attachment(color)?;
    recorder.end_render_pass(target)?;
    recorder.transition_for_copy(target, readback)?;
    recorder.copy_image(
        target,
        readback,
        vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        },
    )?;
    recorder.transition_for_host_read(readback)?;
    recorder.end()
}
