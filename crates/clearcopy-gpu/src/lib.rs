//! Vulkan layer for the clearcopy render/readback check.
//!
//! This crate provides:
//! - Vulkan instance and device management
//! - Device diagnostics
//! - Memory-type selection and image resources with tracked layouts
//! - Render pass and framebuffer setup
//! - Command pool and command encoding
//! - Fence-based synchronization
//! - Ordered teardown of driver objects

pub mod capabilities;
pub mod command;
pub mod context;
pub mod error;
pub mod instance;
pub mod layout;
pub mod memory;
pub mod render_pass;
pub mod sync;
pub mod teardown;

pub use capabilities::{DeviceReport, GpuVendor};
pub use command::{AshEncoder, CommandEncoder, CommandPool};
pub use context::{GpuContext, GpuContextBuilder};
pub use error::{GpuError, Result};
pub use layout::TrackedImage;
pub use memory::{select_memory_type, GpuImage, ImageDesc};
pub use render_pass::RenderPassSetup;
pub use sync::{Completion, Fence, FenceState};
pub use teardown::{PendingTeardown, TeardownStack};
