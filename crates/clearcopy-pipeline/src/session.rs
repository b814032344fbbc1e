//! The owned pipeline session.
//!
//! A session owns the GPU context and every driver object created during the
//! run. Dropping it, whether the run succeeded or failed part-way, destroys
//! those objects in reverse creation order before the device and instance go
//! away.

use clearcopy_gpu::{
    AshEncoder, CommandPool, Fence, GpuContext, GpuContextBuilder, GpuImage, ImageDesc,
    RenderPassSetup, TeardownStack,
};
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::constants::{CLEAR_COLOR, EXTENT, FORMAT};
use crate::error::Result;
use crate::readback::{read_back, ReadbackReport, Rgba8};
use crate::recorder::{record_clear_and_copy, CommandRecorder};
use crate::submit::submit_and_wait;

/// Everything one run creates, reachable only through this value.
pub struct PipelineSession {
    // Flushed in Drop, before `context` destroys the device.
    teardown: TeardownStack,
    context: GpuContext,
    config: PipelineConfig,
}

impl PipelineSession {
    /// Create the GPU context for a run.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let context = GpuContextBuilder::new()
            .app_name(config.app_name.clone())
            .validation(config.validation)
            .build()?;

        Ok(Self {
            teardown: TeardownStack::new(),
            context,
            config,
        })
    }

    /// Get the GPU context.
    pub const fn context(&self) -> &GpuContext {
        &self.context
    }

    /// Get the run configuration.
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Number of driver objects awaiting teardown.
    pub fn pending_teardown(&self) -> usize {
        self.teardown.pending_count()
    }

    /// Clear the render target, copy it into the readback image, wait for the
    /// device and validate the result on the host.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn execute(&mut self) -> Result<ReadbackReport> {
        let device = self.context.device();
        info!(
            "Running on {} (queue family {})",
            self.context.report().summary(),
            self.context.queue_family()
        );

        let mut target = GpuImage::new(
            &self.context,
            &mut self.teardown,
            &ImageDesc::render_target(FORMAT, EXTENT),
        )?;
        let mut readback = GpuImage::new(
            &self.context,
            &mut self.teardown,
            &ImageDesc::readback(FORMAT, EXTENT),
        )?;
        info!(
            "Created {}x{} render target and readback images",
            EXTENT.width, EXTENT.height
        );

        let pass = unsafe { RenderPassSetup::new(device, &mut self.teardown, &target) }?;

        let pool =
            unsafe { CommandPool::new(device, &mut self.teardown, self.context.queue_family()) }?;
        let cmd = unsafe { pool.allocate_command_buffer(device) }?;

        let recorder =
            CommandRecorder::new(unsafe { AshEncoder::new(device, cmd) }, pool.queue_family());
        let recorded = record_clear_and_copy(
            recorder,
            &pass,
            target.tracked_mut(),
            readback.tracked_mut(),
            CLEAR_COLOR,
        )?;

        let mut fence = unsafe { Fence::new(device, &mut self.teardown) }?;
        let completion = unsafe {
            submit_and_wait(
                device,
                self.context.queue(),
                &mut fence,
                recorded,
                self.config.fence_timeout_ns,
            )
        }?;
        info!("GPU work complete");

        let report = unsafe {
            read_back(
                device,
                &readback,
                &completion,
                &self.config,
                Rgba8::from_unorm(CLEAR_COLOR),
            )
        }?;
        info!("Readback matches clear color {:#010x}", report.pixel.packed());

        Ok(report)
    }
}

impl Drop for PipelineSession {
    fn drop(&mut self) {
        if let Err(e) = self.context.wait_idle() {
            warn!("Device did not go idle before teardown: {e}");
        }
        unsafe { self.teardown.flush(self.context.device()) };
    }
}

/// Run one session from start to teardown.
pub fn run(config: PipelineConfig) -> Result<ReadbackReport> {
    let mut session = PipelineSession::new(config)?;
    session.execute()
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests require a GPU and will be skipped in CI without GPU support

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn clear_copy_readback_is_yellow() {
        let report = run(PipelineConfig::new().with_validation(true)).unwrap();
        assert_eq!(report.pixel.channels(), [0xFF, 0xFF, 0x00, 0xFF]);
        assert_eq!(report.pixel.packed(), 0xFF00_FFFF);
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn whole_surface_is_yellow() {
        let report = run(PipelineConfig::new().with_full_surface_check(true)).unwrap();
        assert_eq!(
            report.pixels_checked,
            Some((EXTENT.width * EXTENT.height) as usize)
        );
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn session_tracks_every_object_until_drop() {
        let mut session = PipelineSession::new(PipelineConfig::new()).unwrap();
        session.execute().unwrap();
        // Two images with memory and view, render pass, framebuffer, pool, fence.
        assert_eq!(session.pending_teardown(), 10);
    }
}
