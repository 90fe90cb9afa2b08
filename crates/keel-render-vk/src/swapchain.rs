// SPDX-License-Identifier: CEPL-1.0
use std::fmt;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::driver::{ImageViewDesc, SwapchainDesc};
use crate::error::{Checked, Error, Result};
use crate::scoped::Scoped;
use crate::sync::Semaphore;

/// Present-mode preference; `Fifo` is always available as the fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VsyncMode {
    #[default]
    Mailbox,
    Fifo,
}

pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
}

pub fn choose_present_mode(modes: &[vk::PresentModeKHR], vsync: VsyncMode) -> vk::PresentModeKHR {
    match vsync {
        VsyncMode::Mailbox if modes.contains(&vk::PresentModeKHR::MAILBOX) => {
            vk::PresentModeKHR::MAILBOX
        }
        _ => vk::PresentModeKHR::FIFO,
    }
}

pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, drawable: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: drawable
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: drawable
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        wanted.min(caps.max_image_count)
    } else {
        wanted
    }
}

/// The presentable images for the device's surface, with one view each.
pub struct SwapChain {
    device: Arc<Device>,
    handle: vk::SwapchainKHR,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
}

impl SwapChain {
    /// `drawable` is only used when the surface leaves the extent to the
    /// swapchain.
    pub fn new(device: &Arc<Device>, drawable: vk::Extent2D, vsync: VsyncMode) -> Result<Arc<Self>> {
        // SAFETY: physical device and surface both belong to `device`.
        let support = unsafe {
            device
                .instance()
                .driver()
                .surface_support(device.physical_device(), device.surface().raw_surface())
        }
        .check("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?;
        let format = choose_surface_format(&support.formats).ok_or(Error::SurfaceUnsupported)?;
        if support.present_modes.is_empty() {
            return Err(Error::SurfaceUnsupported);
        }
        if format.format != vk::Format::B8G8R8A8_SRGB {
            warn!("sRGB BGRA8 not offered, falling back to {:?}", format.format);
        }
        let present_mode = choose_present_mode(&support.present_modes, vsync);
        let extent = choose_extent(&support.capabilities, drawable);
        let families = device.queue_families();
        let desc = SwapchainDesc {
            surface: device.surface().raw_surface(),
            min_image_count: choose_image_count(&support.capabilities),
            format,
            extent,
            pre_transform: support.capabilities.current_transform,
            present_mode,
            queue_family_indices: if families.graphics == families.present {
                Vec::new()
            } else {
                families.unique()
            },
        };

        let driver = device.driver();
        // SAFETY: `desc` names this device's surface.
        let swapchain = Scoped::new(
            driver,
            unsafe { driver.create_swapchain(&desc) }.check("vkCreateSwapchainKHR")?,
        );
        // SAFETY: `swapchain` is alive.
        let images = unsafe { driver.swapchain_images(swapchain.get()) }
            .check("vkGetSwapchainImagesKHR")?;
        let mut views = Vec::with_capacity(images.len());
        for &image in &images {
            let view_desc = ImageViewDesc {
                image,
                format: format.format,
            };
            // SAFETY: `image` belongs to the live swapchain.
            let view = unsafe { driver.create_image_view(&view_desc) }.check("vkCreateImageView")?;
            views.push(Scoped::new(driver, view));
        }

        info!(
            "Swapchain: {}x{}, {:?}/{:?}, {:?}, {} images",
            extent.width,
            extent.height,
            format.format,
            format.color_space,
            present_mode,
            images.len()
        );
        let views = views.into_iter().map(Scoped::release).collect();
        Ok(Arc::new(Self {
            device: Arc::clone(device),
            handle: swapchain.release(),
            format,
            present_mode,
            extent,
            images,
            views,
        }))
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn raw_swapchain(&self) -> vk::SwapchainKHR {
        self.handle
    }

    pub fn format(&self) -> vk::Format {
        self.format.format
    }

    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.views
    }

    /// Blocks until an image is available; `signal` fires when it is ready.
    pub fn acquire_next_image(&self, signal: &Semaphore) -> Result<u32> {
        // SAFETY: swapchain and semaphore belong to this device.
        let (index, suboptimal) = unsafe {
            self.device
                .driver()
                .acquire_next_image(self.handle, u64::MAX, signal.raw_semaphore())
        }
        .check("vkAcquireNextImageKHR")?;
        if suboptimal {
            debug!("Swapchain is suboptimal for the surface");
        }
        Ok(index)
    }

    pub fn present(&self, image_index: u32, wait: &Semaphore) -> Result<()> {
        // SAFETY: `image_index` came from `acquire_next_image` on this swapchain.
        let suboptimal = unsafe {
            self.device.driver().queue_present(
                self.device.present_queue(),
                self.handle,
                image_index,
                wait.raw_semaphore(),
            )
        }
        .check("vkQueuePresentKHR")?;
        if suboptimal {
            debug!("Swapchain is suboptimal for the surface");
        }
        Ok(())
    }
}

impl fmt::Debug for SwapChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwapChain")
            .field("handle", &self.handle)
            .field("extent", &self.extent)
            .field("format", &self.format.format)
            .field("images", &self.images.len())
            .finish_non_exhaustive()
    }
}

impl Drop for SwapChain {
    fn drop(&mut self) {
        debug!("Dropping swapchain {:?}", self.handle);
        let driver = self.device.driver();
        // SAFETY: framebuffers and render passes hold `Arc<SwapChain>`, so no
        // view is referenced any more.
        unsafe {
            for &view in &self.views {
                driver.destroy_image_view(view);
            }
            driver.destroy_swapchain(self.handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min: u32, max: u32, current: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: current,
                height: current,
            },
            min_image_extent: vk::Extent2D {
                width: 64,
                height: 64,
            },
            max_image_extent: vk::Extent2D {
                width: 1024,
                height: 1024,
            },
            ..Default::default()
        }
    }

    #[test]
    fn prefers_srgb_bgra() {
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(choose_surface_format(&[unorm, srgb]), Some(srgb));
        assert_eq!(choose_surface_format(&[unorm]), Some(unorm));
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn mailbox_only_when_offered_and_wanted() {
        let both = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        let fifo = [vk::PresentModeKHR::FIFO];
        assert_eq!(
            choose_present_mode(&both, VsyncMode::Mailbox),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&fifo, VsyncMode::Mailbox),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(
            choose_present_mode(&both, VsyncMode::Fifo),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn extent_follows_surface_unless_undefined() {
        let drawable = vk::Extent2D {
            width: 2000,
            height: 10,
        };
        assert_eq!(choose_extent(&caps(2, 3, 500), drawable).width, 500);
        let free = choose_extent(&caps(2, 3, u32::MAX), drawable);
        assert_eq!((free.width, free.height), (1024, 64));
    }

    #[test]
    fn image_count_is_min_plus_one_capped() {
        assert_eq!(choose_image_count(&caps(2, 0, 0)), 3);
        assert_eq!(choose_image_count(&caps(2, 8, 0)), 3);
        assert_eq!(choose_image_count(&caps(3, 3, 0)), 3);
    }
}
