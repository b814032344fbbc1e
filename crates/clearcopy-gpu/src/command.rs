//! Command pool and command encoding.

use crate::error::{GpuError, Result};
use crate::teardown::{PendingTeardown, TeardownStack};
use ash::vk;

/// Command pool for allocating command buffers.
pub struct CommandPool {
    pool: vk::CommandPool,
    queue_family: u32,
}

impl CommandPool {
    /// Create a new command pool.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(
        device: &ash::Device,
        teardown: &mut TeardownStack,
        queue_family: u32,
    ) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);

        let pool = unsafe { device.create_command_pool(&create_info, None) }
            .map_err(GpuError::creating("command pool"))?;
        teardown.push(PendingTeardown::CommandPool(pool));

        Ok(Self { pool, queue_family })
    }

    /// Get the raw pool handle.
    pub const fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Get the queue family index.
    pub const fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Allocate a single primary command buffer.
    ///
    /// The buffer is freed together with the pool.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate_command_buffer(&self, device: &ash::Device) -> Result<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { device.allocate_command_buffers(&alloc_info) }
            .map_err(GpuError::creating("command buffer"))?;
        buffers
            .into_iter()
            .next()
            .ok_or_else(|| GpuError::InvalidState("Driver returned no command buffer".to_string()))
    }
}

/// Sink for the commands recorded into one command buffer.
///
/// [`AshEncoder`] forwards to the driver. Anything else can stand in for it
/// to observe what a recorder emits.
pub trait CommandEncoder {
    /// The command buffer being recorded.
    fn command_buffer(&self) -> vk::CommandBuffer;

    /// Start recording.
    fn begin(&mut self, flags: vk::CommandBufferUsageFlags) -> Result<()>;

    /// Begin a render pass with inline subpass contents.
    fn begin_render_pass(&mut self, info: &vk::RenderPassBeginInfo<'_>);

    /// Clear regions of attachments of the current subpass.
    fn clear_attachments(&mut self, attachments: &[vk::ClearAttachment], rects: &[vk::ClearRect]);

    /// End the current render pass.
    fn end_render_pass(&mut self);

    /// Record a pipeline barrier made only of image barriers.
    fn image_barriers(
        &mut self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barriers: &[vk::ImageMemoryBarrier<'_>],
    );

    /// Copy regions between two images.
    fn copy_image(
        &mut self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageCopy],
    );

    /// Finish recording.
    fn end(&mut self) -> Result<()>;
}

/// Encoder that records straight into a Vulkan command buffer.
pub struct AshEncoder<'a> {
    device: &'a ash::Device,
    cmd: vk::CommandBuffer,
}

impl<'a> AshEncoder<'a> {
    /// Wrap a command buffer.
    ///
    /// # Safety
    /// The command buffer must have been allocated from `device`, must be in
    /// the initial state, and must stay valid while the encoder is used.
    pub const unsafe fn new(device: &'a ash::Device, cmd: vk::CommandBuffer) -> Self {
        Self { device, cmd }
    }
}

impl CommandEncoder for AshEncoder<'_> {
    fn command_buffer(&self) -> vk::CommandBuffer {
        self.cmd
    }

    fn begin(&mut self, flags: vk::CommandBufferUsageFlags) -> Result<()> {
        let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
        unsafe { self.device.begin_command_buffer(self.cmd, &begin_info)? };
        Ok(())
    }

    fn begin_render_pass(&mut self, info: &vk::RenderPassBeginInfo<'_>) {
        unsafe {
            self.device
                .cmd_begin_render_pass(self.cmd, info, vk::SubpassContents::INLINE);
        }
    }

    fn clear_attachments(&mut self, attachments: &[vk::ClearAttachment], rects: &[vk::ClearRect]) {
        unsafe {
            self.device.cmd_clear_attachments(self.cmd, attachments, rects);
        }
    }

    fn end_render_pass(&mut self) {
        unsafe {
            self.device.cmd_end_render_pass(self.cmd);
        }
    }

    fn image_barriers(
        &mut self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barriers: &[vk::ImageMemoryBarrier<'_>],
    ) {
        unsafe {
            self.device.cmd_pipeline_barrier(
                self.cmd,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                barriers,
            );
        }
    }

    fn copy_image(
        &mut self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageCopy],
    ) {
        unsafe {
            self.device
                .cmd_copy_image(self.cmd, src, src_layout, dst, dst_layout, regions);
        }
    }

    fn end(&mut self) -> Result<()> {
        unsafe { self.device.end_command_buffer(self.cmd)? };
        Ok(())
    }
}
