//! GPU context management.

use crate::capabilities::DeviceReport;
use crate::error::{GpuError, Result};
use crate::instance::{create_instance, select_physical_device};
use ash::vk;

/// Instance, device and the single queue every later object is created through.
pub struct GpuContext {
    // Entry must be kept alive for the lifetime of the context
    #[allow(dead_code)]
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub(crate) report: DeviceReport,
    pub(crate) device: ash::Device,
    pub(crate) queue_family: u32,
    pub(crate) queue: vk::Queue,
}

impl GpuContext {
    /// Get the Vulkan device handle.
    pub const fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Memory-type and heap table of the physical device.
    pub const fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    /// Diagnostic snapshot taken when the device was selected.
    pub const fn report(&self) -> &DeviceReport {
        &self.report
    }

    /// Get the queue.
    pub const fn queue(&self) -> vk::Queue {
        self.queue
    }

    /// Get the queue family index.
    pub const fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Wait for device to be idle.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
        tracing::debug!("GPU context destroyed");
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "clearcopy".to_string(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    #[must_use]
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    #[must_use]
    pub const fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Build the GPU context.
    ///
    /// Objects created before a failing step are destroyed before the error
    /// is returned.
    pub fn build(self) -> Result<GpuContext> {
        let entry =
            unsafe { ash::Entry::load() }.map_err(|e| GpuError::Loading(e.to_string()))?;

        let instance = unsafe { create_instance(&entry, &self.app_name, self.enable_validation) }?;

        match unsafe { open_device(&instance) } {
            Ok(opened) => Ok(GpuContext {
                entry,
                instance,
                memory_properties: opened.memory_properties,
                report: opened.report,
                device: opened.device,
                queue_family: opened.queue_family,
                queue: opened.queue,
            }),
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                Err(e)
            }
        }
    }
}

/// Everything created on top of the instance.
struct OpenedDevice {
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    report: DeviceReport,
    device: ash::Device,
    queue_family: u32,
    queue: vk::Queue,
}

/// Pick a physical device and queue family, then create the logical device.
///
/// # Safety
/// The instance must be valid.
unsafe fn open_device(instance: &ash::Instance) -> Result<OpenedDevice> {
    let physical_device = unsafe { select_physical_device(instance) }?;
    let report = unsafe { DeviceReport::query(instance, physical_device) };
    report.log();

    let queue_family = report
        .clear_and_copy_family()
        .ok_or(GpuError::NoSuitableDevice)?;

    let memory_properties =
        unsafe { instance.get_physical_device_memory_properties(physical_device) };

    let queue_priority = 1.0_f32;
    let queue_create_info = vk::DeviceQueueCreateInfo::default()
        .queue_family_index(queue_family)
        .queue_priorities(std::slice::from_ref(&queue_priority));

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(std::slice::from_ref(&queue_create_info));

    let device = unsafe { instance.create_device(physical_device, &device_create_info, None) }
        .map_err(GpuError::creating("logical device"))?;

    let queue = unsafe { device.get_device_queue(queue_family, 0) };

    Ok(OpenedDevice {
        memory_properties,
        report,
        device,
        queue_family,
        queue,
    })
}
