// SPDX-License-Identifier: CEPL-1.0
//! Sampled 2D textures uploaded through a staging buffer.

use std::fmt;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::buffer::Buffer;
use crate::command::CommandPool;
use crate::device::Device;
use crate::driver::{
    DescriptorBinding, DescriptorResource, DescriptorWrite, ImageBarrier, ImageDesc,
    ImageViewDesc, SamplerDesc,
};
use crate::error::{Checked, Error, Result};
use crate::memory::{self, MemoryUsage};
use crate::scoped::Scoped;

/// Access masks and pipeline stages for one layout transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Barrier masks for the transitions a texture upload goes through.
/// Anything else is rejected.
/// Byte length of a tightly packed `width` x `height` RGBA8 image.
fn rgba8_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|texels| texels.checked_mul(4))
        .ok_or(Error::ImageTooLarge { width, height })
}

pub fn transition_masks(old: vk::ImageLayout, new: vk::ImageLayout) -> Result<LayoutTransition> {
    match (old, new) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => {
            Ok(LayoutTransition {
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::TRANSFER_WRITE,
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::TRANSFER,
            })
        }
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Ok(LayoutTransition {
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::SHADER_READ,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            })
        }
        _ => Err(Error::UnsupportedLayoutTransition { old, new }),
    }
}

/// A device-local image with a colour view and a sampler.
pub struct Image {
    device: Arc<Device>,
    handle: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    sampler: vk::Sampler,
    width: u32,
    height: u32,
    format: vk::Format,
}

impl Image {
    /// Texel format of uploaded textures.
    pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

    /// Creates the image, its memory, view and sampler. Contents and layout
    /// are undefined.
    pub fn new(
        device: &Arc<Device>,
        width: u32,
        height: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::ZeroSize { what: "image" });
        }
        let driver = device.driver();
        let desc = ImageDesc {
            width,
            height,
            format,
            tiling: vk::ImageTiling::OPTIMAL,
            usage,
        };
        // SAFETY: plain create call on a live device.
        let image = Scoped::new(
            driver,
            unsafe { driver.create_image(&desc) }.check("vkCreateImage")?,
        );
        // SAFETY: `image` is alive.
        let requirements = unsafe { driver.image_memory_requirements(image.get()) };
        let memory = memory::allocate(device, requirements, MemoryUsage::DeviceLocal)?;
        // SAFETY: fresh image, fresh allocation of the required size.
        unsafe { driver.bind_image_memory(image.get(), memory.get()) }
            .check("vkBindImageMemory")?;

        let view_desc = ImageViewDesc {
            image: image.get(),
            format,
        };
        // SAFETY: the image is bound to memory.
        let view = Scoped::new(
            driver,
            unsafe { driver.create_image_view(&view_desc) }.check("vkCreateImageView")?,
        );
        let sampler_desc = SamplerDesc {
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            address_mode: vk::SamplerAddressMode::REPEAT,
            max_anisotropy: device.max_sampler_anisotropy(),
        };
        // SAFETY: anisotropy is only requested when the feature was enabled.
        let sampler = Scoped::new(
            driver,
            unsafe { driver.create_sampler(&sampler_desc) }.check("vkCreateSampler")?,
        );

        Ok(Self {
            device: Arc::clone(device),
            sampler: sampler.release(),
            view: view.release(),
            memory: memory.release(),
            handle: image.release(),
            width,
            height,
            format,
        })
    }

    /// Uploads `width * height` RGBA8 texels and leaves the image ready for
    /// sampling in fragment shaders.
    pub fn create(
        device: &Arc<Device>,
        pool: &Arc<CommandPool>,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Arc<Self>> {
        if width == 0 || height == 0 {
            return Err(Error::ZeroSize { what: "image" });
        }
        let expected = rgba8_len(width, height)?;
        if pixels.len() < expected {
            return Err(Error::PixelDataTooShort {
                len: pixels.len(),
                expected,
                width,
                height,
            });
        }

        let staging = Buffer::new(
            device,
            expected as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryUsage::HostVisible,
        )?;
        staging.fill(&pixels[..expected])?;

        let image = Self::new(
            device,
            width,
            height,
            Self::TEXTURE_FORMAT,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        )?;
        image.transition_layout(
            pool,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;
        image.copy_from_buffer(pool, &staging)?;
        image.transition_layout(
            pool,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;
        info!("Uploaded {width}x{height} texture");
        Ok(Arc::new(image))
    }

    /// Records and waits for a one-shot layout transition of the whole image.
    pub fn transition_layout(
        &self,
        pool: &Arc<CommandPool>,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    ) -> Result<()> {
        let masks = transition_masks(old, new)?;
        let barrier = ImageBarrier {
            image: self.handle,
            old_layout: old,
            new_layout: new,
            src_access: masks.src_access,
            dst_access: masks.dst_access,
            src_stage: masks.src_stage,
            dst_stage: masks.dst_stage,
        };
        CommandPool::submit_once(pool, |commands| commands.pipeline_barrier(0, &barrier))
    }

    /// Copies tightly packed texels from `buffer`. The image must be in
    /// `TRANSFER_DST_OPTIMAL`.
    pub fn copy_from_buffer(&self, pool: &Arc<CommandPool>, buffer: &Buffer) -> Result<()> {
        CommandPool::submit_once(pool, |commands| {
            commands.copy_buffer_to_image(0, buffer, self)
        })
    }

    pub fn raw_image(&self) -> vk::Image {
        self.handle
    }

    pub fn raw_view(&self) -> vk::ImageView {
        self.view
    }

    pub fn raw_sampler(&self) -> vk::Sampler {
        self.sampler
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Layout slot for a combined image sampler read by the fragment stage.
    pub fn layout_binding(binding: u32) -> DescriptorBinding {
        DescriptorBinding {
            binding,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            count: 1,
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
        }
    }

    pub fn descriptor_write(&self, binding: u32) -> DescriptorWrite {
        DescriptorWrite {
            binding,
            resource: DescriptorResource::CombinedImageSampler {
                view: self.view,
                sampler: self.sampler,
                layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            },
        }
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("handle", &self.handle)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        debug!("Dropping image {:?}", self.handle);
        let driver = self.device.driver();
        // SAFETY: descriptor sets that sample this image retain an Arc.
        unsafe {
            driver.destroy_sampler(self.sampler);
            driver.destroy_image_view(self.view);
            driver.destroy_image(self.handle);
            driver.free_memory(self.memory);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUTS: [vk::ImageLayout; 8] = [
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::GENERAL,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::PREINITIALIZED,
        vk::ImageLayout::PRESENT_SRC_KHR,
    ];

    #[test]
    fn only_upload_transitions_are_supported() {
        let supported = [
            (
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            ),
            (
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ),
        ];
        for old in LAYOUTS {
            for new in LAYOUTS {
                let result = transition_masks(old, new);
                if supported.contains(&(old, new)) {
                    assert!(result.is_ok(), "{old:?} -> {new:?} should be supported");
                } else {
                    assert!(
                        matches!(
                            result,
                            Err(Error::UnsupportedLayoutTransition { old: o, new: n })
                                if o == old && n == new
                        ),
                        "{old:?} -> {new:?} should be rejected"
                    );
                }
            }
        }
    }

    #[test]
    fn upload_masks() {
        let first = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert_eq!(first.src_access, vk::AccessFlags::empty());
        assert_eq!(first.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(first.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(first.dst_stage, vk::PipelineStageFlags::TRANSFER);

        let second = transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(second.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(second.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(second.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn rgba8_len_rejects_overflow() {
        assert_eq!(rgba8_len(2, 3).unwrap(), 24);
        assert!(matches!(
            rgba8_len(u32::MAX, u32::MAX),
            Err(Error::ImageTooLarge {
                width: u32::MAX,
                height: u32::MAX
            })
        ));
    }
}
