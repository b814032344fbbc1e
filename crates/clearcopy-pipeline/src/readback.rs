//! Host readback and validation of the copied pixels.

use std::path::{Path, PathBuf};

use ash::vk;
use bytemuck::{Pod, Zeroable};
use clearcopy_gpu::{Completion, GpuError, GpuImage};
use image::{ImageBuffer, Rgba};
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::{Channel, PipelineError, Result};
use crate::recorder::HOST_READ_LAYOUT;

/// One R8G8B8A8 pixel as laid out in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    /// Build from bytes in memory order (red first).
    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self {
            r: bytes[0],
            g: bytes[1],
            b: bytes[2],
            a: bytes[3],
        }
    }

    /// The value a UNORM attachment stores for a float clear color.
    pub fn from_unorm(color: [f32; 4]) -> Self {
        let [r, g, b, a] = color.map(unorm_to_u8);
        Self { r, g, b, a }
    }

    /// Channel bytes in memory order.
    pub const fn channels(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// The four bytes read as one little-endian word.
    pub const fn packed(self) -> u32 {
        u32::from_le_bytes(self.channels())
    }

    /// Compare against `expected`, reporting the first differing channel.
    pub fn validate(self, expected: Self) -> Result<()> {
        for ((channel, actual), expected) in Channel::ALL
            .into_iter()
            .zip(self.channels())
            .zip(expected.channels())
        {
            if actual != expected {
                return Err(PipelineError::Validation {
                    channel,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn unorm_to_u8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Outcome of a successful readback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadbackReport {
    /// First pixel of the readback image.
    pub pixel: Rgba8,
    /// Number of pixels checked when the whole surface was verified.
    pub pixels_checked: Option<usize>,
    /// Where the surface was written, if requested.
    pub saved_to: Option<PathBuf>,
}

/// Host mapping of an image's whole allocation, unmapped on drop.
pub struct MappedImage<'a> {
    device: &'a ash::Device,
    memory: vk::DeviceMemory,
    bytes: &'a [u8],
}

impl<'a> MappedImage<'a> {
    /// Map the readback image after the device finished writing it.
    ///
    /// Requires the image to have been transitioned for host reads. Memory
    /// without `HOST_COHERENT` is invalidated before it is read.
    ///
    /// # Safety
    /// The device must own the image, and the image's memory must not
    /// already be mapped.
    pub unsafe fn map(
        device: &'a ash::Device,
        image: &'a GpuImage,
        _completion: &Completion,
    ) -> Result<Self> {
        image.tracked().require(HOST_READ_LAYOUT)?;
        if !image.tracked().access().contains(vk::AccessFlags::HOST_READ) {
            return Err(GpuError::InvalidState(format!(
                "{} was not made visible to host reads",
                image.tracked().name()
            ))
            .into());
        }

        let size = usize::try_from(image.allocation_size).map_err(|_| {
            GpuError::InvalidState("Allocation does not fit in host memory".to_string())
        })?;

        let ptr = unsafe {
            device.map_memory(image.memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
        }
        .map_err(GpuError::from)?;

        let mapped = Self {
            device,
            memory: image.memory,
            bytes: unsafe { std::slice::from_raw_parts(ptr.cast::<u8>(), size) },
        };

        if !image.is_host_coherent() {
            let range = vk::MappedMemoryRange::default()
                .memory(image.memory)
                .offset(0)
                .size(vk::WHOLE_SIZE);
            unsafe { device.invalidate_mapped_memory_ranges(&[range]) }
                .map_err(GpuError::from)?;
        }

        Ok(mapped)
    }

    /// The mapped allocation.
    pub const fn bytes(&self) -> &[u8] {
        self.bytes
    }
}

impl Drop for MappedImage<'_> {
    fn drop(&mut self) {
        unsafe { self.device.unmap_memory(self.memory) };
    }
}

/// Pixel at the start of the mapped allocation.
pub fn first_pixel(bytes: &[u8]) -> Result<Rgba8> {
    match bytes {
        [r, g, b, a, ..] => Ok(Rgba8::from_bytes([*r, *g, *b, *a])),
        _ => Err(GpuError::InvalidState(format!(
            "Mapped allocation holds {} bytes, need 4",
            bytes.len()
        ))
        .into()),
    }
}

/// Copy a linear image's rows out of its allocation into a tightly packed
/// RGBA8 buffer.
pub fn extract_surface(
    bytes: &[u8],
    layout: &vk::SubresourceLayout,
    width: u32,
    height: u32,
) -> Result<Vec<u8>> {
    let row_len = width as usize * std::mem::size_of::<Rgba8>();
    let mut pixels = Vec::with_capacity(row_len * height as usize);

    for y in 0..u64::from(height) {
        let start = layout.offset + y * layout.row_pitch;
        let row = usize::try_from(start)
            .ok()
            .and_then(|start| bytes.get(start..start + row_len))
            .ok_or_else(|| {
                GpuError::InvalidState(format!("Row {y} lies outside the mapped allocation"))
            })?;
        pixels.extend_from_slice(row);
    }

    Ok(pixels)
}

/// Count pixels in a packed RGBA8 buffer that differ from `expected`.
pub fn count_mismatches(pixels: &[u8], expected: Rgba8) -> usize {
    bytemuck::cast_slice::<u8, Rgba8>(pixels)
        .iter()
        .filter(|&&pixel| pixel != expected)
        .count()
}

/// Save packed RGBA8 pixel data to an image file.
///
/// The format is determined by the extension.
pub fn save_surface(pixels: Vec<u8>, width: u32, height: u32, path: &Path) -> Result<()> {
    let image = ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, pixels).ok_or_else(|| {
        GpuError::InvalidState("Pixel data does not match the image extent".to_string())
    })?;
    image.save(path)?;

    info!("Readback surface saved: {}", path.display());
    Ok(())
}

/// Map the readback image, check its first pixel against `expected` and
/// optionally verify or save the whole surface.
///
/// # Safety
/// The device must own the image, and `completion` must come from the wait
/// on the submission that wrote it.
pub unsafe fn read_back(
    device: &ash::Device,
    image: &GpuImage,
    completion: &Completion,
    config: &PipelineConfig,
    expected: Rgba8,
) -> Result<ReadbackReport> {
    let mapped = unsafe { MappedImage::map(device, image, completion) }?;

    let pixel = first_pixel(mapped.bytes())?;
    info!(
        "r = {:#04x}, g = {:#04x}, b = {:#04x}, a = {:#04x}",
        pixel.r, pixel.g, pixel.b, pixel.a
    );
    pixel.validate(expected)?;

    let mut report = ReadbackReport {
        pixel,
        pixels_checked: None,
        saved_to: None,
    };

    if !config.verify_full_surface && config.output.is_none() {
        return Ok(report);
    }

    let subresource = vk::ImageSubresource {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level: 0,
        array_layer: 0,
    };
    let layout = unsafe { device.get_image_subresource_layout(image.tracked().handle(), subresource) };
    let (width, height) = (image.extent.width, image.extent.height);
    let pixels = extract_surface(mapped.bytes(), &layout, width, height)?;
    drop(mapped);

    if config.verify_full_surface {
        let total = pixels.len() / std::mem::size_of::<Rgba8>();
        let mismatched = count_mismatches(&pixels, expected);
        if mismatched > 0 {
            return Err(PipelineError::SurfaceMismatch { mismatched, total });
        }
        info!("All {total} pixels match");
        report.pixels_checked = Some(total);
    }

    if let Some(path) = &config.output {
        save_surface(pixels, width, height, path)?;
        report.saved_to = Some(path.clone());
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    const YELLOW: [f32; 4] = [1.0, 1.0, 0.0, 1.0];

    #[test]
    fn yellow_packs_little_endian() {
        let pixel = Rgba8::from_unorm(YELLOW);
        assert_eq!(pixel.channels(), [0xFF, 0xFF, 0x00, 0xFF]);
        assert_eq!(pixel.packed(), 0xFF00_FFFF);
    }

    #[test]
    fn unorm_rounds_and_clamps() {
        let pixel = Rgba8::from_unorm([0.5, -1.0, 2.0, 0.0]);
        assert_eq!(pixel.channels(), [128, 0, 255, 0]);
    }

    #[test]
    fn first_pixel_reads_base_bytes() {
        let bytes = [0xFF, 0xFF, 0x00, 0xFF, 0x12, 0x34];
        let pixel = first_pixel(&bytes).unwrap();
        assert_eq!(pixel.packed(), 0xFF00_FFFF);
        assert!(pixel.validate(Rgba8::from_unorm(YELLOW)).is_ok());
    }

    #[test]
    fn first_pixel_needs_four_bytes() {
        assert!(first_pixel(&[0xFF, 0xFF, 0x00]).is_err());
    }

    #[test]
    fn validation_reports_first_bad_channel() {
        let expected = Rgba8::from_unorm(YELLOW);
        let actual = Rgba8::from_bytes([0xFF, 0xFF, 0x10, 0x00]);
        let err = actual.validate(expected).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Validation {
                channel: Channel::Blue,
                expected: 0x00,
                actual: 0x10,
            }
        ));

        let actual = Rgba8::from_bytes([0xFF, 0xFF, 0x00, 0x80]);
        assert!(matches!(
            actual.validate(expected),
            Err(PipelineError::Validation {
                channel: Channel::Alpha,
                ..
            })
        ));
    }

    #[test]
    fn extract_honors_offset_and_pitch() {
        // 2x2 image, 4 bytes of padding per row, surface starting at 8.
        let layout = vk::SubresourceLayout {
            offset: 8,
            size: 24,
            row_pitch: 12,
            array_pitch: 0,
            depth_pitch: 0,
        };
        let mut bytes = vec![0xAAu8; 32];
        bytes[8..16].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        bytes[20..28].copy_from_slice(&[9, 10, 11, 12, 13, 14, 15, 16]);

        let pixels = extract_surface(&bytes, &layout, 2, 2).unwrap();
        assert_eq!(pixels, (1..=16).collect::<Vec<u8>>());
    }

    #[test]
    fn extract_rejects_short_allocation() {
        let layout = vk::SubresourceLayout {
            offset: 0,
            size: 16,
            row_pitch: 8,
            array_pitch: 0,
            depth_pitch: 0,
        };
        assert!(extract_surface(&[0u8; 12], &layout, 2, 2).is_err());
    }

    #[test]
    fn counts_mismatched_pixels() {
        let expected = Rgba8::from_unorm(YELLOW);
        let mut pixels = [0xFFu8, 0xFF, 0x00, 0xFF].repeat(5);
        pixels[6] = 0x01;
        pixels[19] = 0x00;
        assert_eq!(count_mismatches(&pixels, expected), 2);
    }

    #[test]
    fn save_rejects_wrong_size() {
        let result = save_surface(vec![0; 12], 2, 2, Path::new("unused.png"));
        assert!(matches!(result, Err(PipelineError::Gpu(_))));
    }
}
