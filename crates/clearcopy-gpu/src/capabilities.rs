//! Physical device diagnostics.

use ash::vk;
use std::ffi::CStr;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub const fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// One entry of the device's memory-type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryTypeInfo {
    pub index: u32,
    pub heap_index: u32,
    pub flags: vk::MemoryPropertyFlags,
}

/// One memory heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryHeapInfo {
    pub index: u32,
    pub size: u64,
    pub device_local: bool,
}

/// One queue family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyInfo {
    pub index: u32,
    pub flags: vk::QueueFlags,
    pub queue_count: u32,
}

impl QueueFamilyInfo {
    /// Whether this family can run both the clear and the copy.
    ///
    /// Render passes and attachment clears need a graphics queue, and
    /// graphics queues always support transfer.
    pub fn supports_clear_and_copy(&self) -> bool {
        self.flags.contains(vk::QueueFlags::GRAPHICS)
    }
}

/// Informational snapshot of a physical device.
#[derive(Debug, Clone)]
pub struct DeviceReport {
    pub vendor: GpuVendor,
    pub vendor_id: u32,
    pub device_id: u32,
    pub device_name: String,
    pub api_version: u32,
    pub driver_version: u32,
    pub memory_types: Vec<MemoryTypeInfo>,
    pub memory_heaps: Vec<MemoryHeapInfo>,
    pub queue_families: Vec<QueueFamilyInfo>,
}

impl DeviceReport {
    /// Query the report from a physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let memory = unsafe { instance.get_physical_device_memory_properties(physical_device) };
        let families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

        let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        Self {
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            vendor_id: properties.vendor_id,
            device_id: properties.device_id,
            device_name,
            api_version: properties.api_version,
            driver_version: properties.driver_version,
            memory_types: memory_types(&memory),
            memory_heaps: memory
                .memory_heaps
                .iter()
                .take(memory.memory_heap_count as usize)
                .zip(0u32..)
                .map(|(heap, index)| MemoryHeapInfo {
                    index,
                    size: heap.size,
                    device_local: heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL),
                })
                .collect(),
            queue_families: families
                .iter()
                .zip(0u32..)
                .map(|(family, index)| QueueFamilyInfo {
                    index,
                    flags: family.queue_flags,
                    queue_count: family.queue_count,
                })
                .collect(),
        }
    }

    /// First queue family able to clear and copy.
    pub fn clear_and_copy_family(&self) -> Option<u32> {
        self.queue_families
            .iter()
            .find(|family| family.supports_clear_and_copy())
            .map(|family| family.index)
    }

    /// Get a human-readable summary of the device.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}) - Vulkan {}.{}.{}",
            self.device_name,
            self.vendor,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
        )
    }

    /// Emit the report as log events.
    pub fn log(&self) {
        tracing::info!(
            api_version = self.api_version,
            driver_version = self.driver_version,
            vendor_id = self.vendor_id,
            device_id = self.device_id,
            "Device: {}",
            self.summary()
        );

        for ty in &self.memory_types {
            tracing::debug!(
                heap = ty.heap_index,
                device_local = yes_no(ty.flags, vk::MemoryPropertyFlags::DEVICE_LOCAL),
                host_visible = yes_no(ty.flags, vk::MemoryPropertyFlags::HOST_VISIBLE),
                host_coherent = yes_no(ty.flags, vk::MemoryPropertyFlags::HOST_COHERENT),
                host_cached = yes_no(ty.flags, vk::MemoryPropertyFlags::HOST_CACHED),
                lazily_allocated = yes_no(ty.flags, vk::MemoryPropertyFlags::LAZILY_ALLOCATED),
                "Memory type #{}",
                ty.index
            );
        }

        for heap in &self.memory_heaps {
            tracing::debug!(
                size = heap.size,
                device_local = if heap.device_local { "Y" } else { "N" },
                "Memory heap #{}",
                heap.index
            );
        }

        for family in &self.queue_families {
            tracing::debug!(
                graphics = yes_no_queue(family.flags, vk::QueueFlags::GRAPHICS),
                compute = yes_no_queue(family.flags, vk::QueueFlags::COMPUTE),
                transfer = yes_no_queue(family.flags, vk::QueueFlags::TRANSFER),
                queues = family.queue_count,
                "Queue family #{}",
                family.index
            );
        }
    }
}

/// Flatten the fixed-size memory-type array into its populated entries.
pub fn memory_types(memory: &vk::PhysicalDeviceMemoryProperties) -> Vec<MemoryTypeInfo> {
    memory
        .memory_types
        .iter()
        .take(memory.memory_type_count as usize)
        .zip(0u32..)
        .map(|(ty, index)| MemoryTypeInfo {
            index,
            heap_index: ty.heap_index,
            flags: ty.property_flags,
        })
        .collect()
}

fn yes_no(flags: vk::MemoryPropertyFlags, bit: vk::MemoryPropertyFlags) -> &'static str {
    if flags.contains(bit) {
        "Y"
    } else {
        "N"
    }
}

fn yes_no_queue(flags: vk::QueueFlags, bit: vk::QueueFlags) -> &'static str {
    if flags.contains(bit) {
        "Y"
    } else {
        "N"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_vendor_id(0x1234), GpuVendor::Other(0x1234));
    }

    #[test]
    fn family_without_graphics_is_skipped() {
        let report = DeviceReport {
            vendor: GpuVendor::Other(0),
            vendor_id: 0,
            device_id: 0,
            device_name: "test".to_string(),
            api_version: vk::API_VERSION_1_0,
            driver_version: 0,
            memory_types: vec![],
            memory_heaps: vec![],
            queue_families: vec![
                QueueFamilyInfo {
                    index: 0,
                    flags: vk::QueueFlags::TRANSFER,
                    queue_count: 2,
                },
                QueueFamilyInfo {
                    index: 1,
                    flags: vk::QueueFlags::COMPUTE,
                    queue_count: 1,
                },
                QueueFamilyInfo {
                    index: 2,
                    flags: vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER,
                    queue_count: 1,
                },
            ],
        };
        assert_eq!(report.clear_and_copy_family(), Some(2));
    }

    #[test]
    fn transfer_only_device_has_no_family() {
        let family = QueueFamilyInfo {
            index: 0,
            flags: vk::QueueFlags::TRANSFER | vk::QueueFlags::COMPUTE,
            queue_count: 4,
        };
        assert!(!family.supports_clear_and_copy());
        assert!(QueueFamilyInfo {
            flags: vk::QueueFlags::GRAPHICS,
            ..family
        }
        .supports_clear_and_copy());
    }

    #[test]
    fn memory_types_respect_count() {
        let mut memory = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 2,
            ..Default::default()
        };
        memory.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        memory.memory_types[1].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE;
        memory.memory_types[1].heap_index = 1;
        memory.memory_types[2].property_flags = vk::MemoryPropertyFlags::HOST_CACHED;

        let types = memory_types(&memory);
        assert_eq!(types.len(), 2);
        assert_eq!(types[1].index, 1);
        assert_eq!(types[1].heap_index, 1);
        assert_eq!(types[1].flags, vk::MemoryPropertyFlags::HOST_VISIBLE);
    }
}
