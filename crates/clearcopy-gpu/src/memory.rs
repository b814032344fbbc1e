//! GPU memory-type selection and image resources.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::layout::{TrackedImage, COLOR_RANGE};
use crate::teardown::{PendingTeardown, TeardownStack};
use ash::vk;

/// Pick the lowest-indexed memory type allowed by `type_bits` whose property
/// flags include all of `required`.
///
/// There is no fallback to a weaker property set.
pub fn select_memory_type(
    memory: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Result<u32> {
    memory
        .memory_types
        .iter()
        .take(memory.memory_type_count as usize)
        .zip(0u32..)
        .find(|&(ty, index)| {
            type_bits & (1u32 << index) != 0 && ty.property_flags.contains(required)
        })
        .map(|(_, index)| index)
        .ok_or(GpuError::NoSuitableMemoryType {
            type_bits,
            required,
        })
}

/// Allocation parameters for an image, sized exactly to its requirements.
///
/// Computed before any allocation call is made, so an unsatisfiable
/// property set fails without touching the driver allocator.
pub fn plan_allocation(
    memory: &vk::PhysicalDeviceMemoryProperties,
    requirements: &vk::MemoryRequirements,
    required: vk::MemoryPropertyFlags,
) -> Result<vk::MemoryAllocateInfo<'static>> {
    let memory_type_index =
        select_memory_type(memory, requirements.memory_type_bits, required)?;

    Ok(vk::MemoryAllocateInfo::default()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index))
}

/// Fixed description of one of the two images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDesc {
    pub name: &'static str,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
    pub memory_flags: vk::MemoryPropertyFlags,
}

impl ImageDesc {
    /// Optimal-tiling, device-local color attachment that is copied from.
    pub const fn render_target(format: vk::Format, extent: vk::Extent3D) -> Self {
        Self {
            name: "render_target",
            format,
            extent,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::from_raw(
                vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw()
                    | vk::ImageUsageFlags::TRANSFER_SRC.as_raw(),
            ),
            memory_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
        }
    }

    /// Linear-tiling, host-visible image that is copied into and mapped.
    pub const fn readback(format: vk::Format, extent: vk::Extent3D) -> Self {
        Self {
            name: "readback",
            format,
            extent,
            tiling: vk::ImageTiling::LINEAR,
            usage: vk::ImageUsageFlags::from_raw(
                vk::ImageUsageFlags::TRANSFER_DST.as_raw()
                    | vk::ImageUsageFlags::SAMPLED.as_raw(),
            ),
            memory_flags: vk::MemoryPropertyFlags::HOST_VISIBLE,
        }
    }

    /// Image creation parameters.
    pub fn create_info(&self) -> vk::ImageCreateInfo<'static> {
        vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(self.format)
            .extent(self.extent)
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(self.tiling)
            .usage(self.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
    }
}

/// An image with its dedicated memory and a 2-D view over it.
pub struct GpuImage {
    tracked: TrackedImage,
    pub view: vk::ImageView,
    pub memory: vk::DeviceMemory,
    pub memory_type_index: u32,
    pub memory_flags: vk::MemoryPropertyFlags,
    pub allocation_size: vk::DeviceSize,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
}

impl GpuImage {
    /// Create the image, allocate and bind its memory, and create its view.
    ///
    /// Every object is pushed onto `teardown` as soon as it exists.
    pub fn new(context: &GpuContext, teardown: &mut TeardownStack, desc: &ImageDesc) -> Result<Self> {
        let device = context.device();

        let image = unsafe { device.create_image(&desc.create_info(), None) }
            .map_err(GpuError::creating("image"))?;
        teardown.push(PendingTeardown::Image(image));

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let allocate_info =
            plan_allocation(context.memory_properties(), &requirements, desc.memory_flags)?;
        let memory_type_index = allocate_info.memory_type_index;
        let memory_flags = context.memory_properties().memory_types[memory_type_index as usize]
            .property_flags;
        tracing::info!(
            size = requirements.size,
            alignment = requirements.alignment,
            "Chosen memory type for {}: {}",
            desc.name,
            memory_type_index
        );

        let memory = unsafe { device.allocate_memory(&allocate_info, None) }
            .map_err(GpuError::creating("image memory"))?;
        teardown.push(PendingTeardown::Memory(memory));

        unsafe { device.bind_image_memory(image, memory, 0) }
            .map_err(GpuError::creating("image memory binding"))?;

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(desc.format)
            .subresource_range(COLOR_RANGE);

        let view = unsafe { device.create_image_view(&view_info, None) }
            .map_err(GpuError::creating("image view"))?;
        teardown.push(PendingTeardown::ImageView(view));

        Ok(Self {
            tracked: TrackedImage::new(image, desc.name),
            view,
            memory,
            memory_type_index,
            memory_flags,
            allocation_size: requirements.size,
            format: desc.format,
            extent: desc.extent,
        })
    }

    /// Handle and tracked layout.
    pub const fn tracked(&self) -> &TrackedImage {
        &self.tracked
    }

    /// Tracked layout, for recording barriers against this image.
    pub fn tracked_mut(&mut self) -> &mut TrackedImage {
        &mut self.tracked
    }

    /// Whether device writes become visible to the host without invalidation.
    pub fn is_host_coherent(&self) -> bool {
        self.memory_flags
            .contains(vk::MemoryPropertyFlags::HOST_COHERENT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_table(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut memory = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (ty, &f) in memory.memory_types.iter_mut().zip(flags) {
            ty.property_flags = f;
        }
        memory
    }

    fn typical_table() -> vk::PhysicalDeviceMemoryProperties {
        memory_table(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT
                | vk::MemoryPropertyFlags::HOST_CACHED,
            vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE,
        ])
    }

    #[test]
    fn picks_lowest_matching_index() {
        let memory = typical_table();
        assert_eq!(
            select_memory_type(&memory, 0b1111, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            0
        );
        assert_eq!(
            select_memory_type(&memory, 0b1111, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap(),
            1
        );
    }

    #[test]
    fn respects_type_mask() {
        let memory = typical_table();
        assert_eq!(
            select_memory_type(&memory, 0b1000, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            3
        );
        assert_eq!(
            select_memory_type(&memory, 0b0100, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap(),
            2
        );
    }

    #[test]
    fn no_weaker_fallback() {
        let memory = memory_table(&[
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);
        let required = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let err = select_memory_type(&memory, 0b11, required).unwrap_err();
        assert!(matches!(
            err,
            GpuError::NoSuitableMemoryType { type_bits: 0b11, required: r } if r == required
        ));
    }

    #[test]
    fn ignores_types_past_count() {
        let mut memory = memory_table(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        memory.memory_types[1].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE;
        assert!(select_memory_type(&memory, u32::MAX, vk::MemoryPropertyFlags::HOST_VISIBLE).is_err());
    }

    #[test]
    fn selection_invariants_hold_for_every_mask() {
        let memory = typical_table();
        let flag_sets = [
            vk::MemoryPropertyFlags::empty(),
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_CACHED,
            vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::LAZILY_ALLOCATED,
        ];

        for mask in 0u32..16 {
            for &required in &flag_sets {
                let expected = (0u32..4).find(|&i| {
                    mask & (1 << i) != 0
                        && memory.memory_types[i as usize].property_flags.contains(required)
                });
                match select_memory_type(&memory, mask, required) {
                    Ok(index) => {
                        assert_eq!(Some(index), expected);
                        assert_ne!(mask & (1 << index), 0);
                        assert!(memory.memory_types[index as usize]
                            .property_flags
                            .contains(required));
                    }
                    Err(GpuError::NoSuitableMemoryType { .. }) => assert_eq!(expected, None),
                    Err(other) => panic!("unexpected error {other}"),
                }
            }
        }
    }

    #[test]
    fn allocation_sized_to_requirements() {
        let memory = typical_table();
        let requirements = vk::MemoryRequirements {
            size: 640_000,
            alignment: 256,
            memory_type_bits: 0b0110,
        };
        let info =
            plan_allocation(&memory, &requirements, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap();
        assert_eq!(info.allocation_size, 640_000);
        assert_eq!(info.memory_type_index, 1);
    }

    #[test]
    fn unsatisfiable_plan_fails_before_allocation() {
        let memory = memory_table(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        let requirements = vk::MemoryRequirements {
            size: 1024,
            alignment: 16,
            memory_type_bits: 0b1,
        };
        let result = plan_allocation(
            &memory,
            &requirements,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::DEVICE_LOCAL,
        );
        assert!(matches!(result, Err(GpuError::NoSuitableMemoryType { .. })));
    }

    #[test]
    fn image_descriptions() {
        let extent = vk::Extent3D {
            width: 400,
            height: 400,
            depth: 1,
        };
        let target = ImageDesc::render_target(vk::Format::R8G8B8A8_UNORM, extent);
        assert_eq!(target.tiling, vk::ImageTiling::OPTIMAL);
        assert!(target.usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));
        assert!(target.usage.contains(vk::ImageUsageFlags::TRANSFER_SRC));
        assert_eq!(target.memory_flags, vk::MemoryPropertyFlags::DEVICE_LOCAL);

        let readback = ImageDesc::readback(vk::Format::R8G8B8A8_UNORM, extent);
        assert_eq!(readback.tiling, vk::ImageTiling::LINEAR);
        assert!(readback.usage.contains(vk::ImageUsageFlags::TRANSFER_DST));
        assert!(readback.usage.contains(vk::ImageUsageFlags::SAMPLED));
        assert_eq!(readback.memory_flags, vk::MemoryPropertyFlags::HOST_VISIBLE);

        let info = readback.create_info();
        assert_eq!(info.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(info.mip_levels, 1);
        assert_eq!(info.array_layers, 1);
        assert_eq!(info.samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(info.sharing_mode, vk::SharingMode::EXCLUSIVE);
        assert_eq!(info.extent, extent);
    }
}
