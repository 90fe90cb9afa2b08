// SPDX-License-Identifier: CEPL-1.0
use std::fmt;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::driver::FramebufferDesc;
use crate::error::{check_index, Checked, Result};
use crate::render_pass::RenderPass;
use crate::swapchain::SwapChain;

/// Binds one swapchain image view to a render pass.
pub struct Framebuffer {
    device: Arc<Device>,
    swapchain: Arc<SwapChain>,
    render_pass: Arc<RenderPass>,
    handle: vk::Framebuffer,
    image_index: usize,
}

impl Framebuffer {
    pub fn new(
        device: &Arc<Device>,
        swapchain: &Arc<SwapChain>,
        render_pass: &Arc<RenderPass>,
        image_index: usize,
    ) -> Result<Arc<Self>> {
        check_index("swapchain image", image_index, swapchain.image_count())?;
        let desc = FramebufferDesc {
            render_pass: render_pass.raw_render_pass(),
            attachment: swapchain.image_views()[image_index],
            extent: swapchain.extent(),
        };
        // SAFETY: view and render pass are kept alive by the Arcs stored below.
        let handle =
            unsafe { device.driver().create_framebuffer(&desc) }.check("vkCreateFramebuffer")?;
        Ok(Arc::new(Self {
            device: Arc::clone(device),
            swapchain: Arc::clone(swapchain),
            render_pass: Arc::clone(render_pass),
            handle,
            image_index,
        }))
    }

    /// One framebuffer per swapchain image, in image order.
    pub fn for_swapchain(
        device: &Arc<Device>,
        swapchain: &Arc<SwapChain>,
        render_pass: &Arc<RenderPass>,
    ) -> Result<Vec<Arc<Self>>> {
        (0..swapchain.image_count())
            .map(|i| Self::new(device, swapchain, render_pass, i))
            .collect()
    }

    pub fn raw_framebuffer(&self) -> vk::Framebuffer {
        self.handle
    }

    pub fn render_pass(&self) -> &Arc<RenderPass> {
        &self.render_pass
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    pub fn image_index(&self) -> usize {
        self.image_index
    }
}

impl fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Framebuffer")
            .field("handle", &self.handle)
            .field("image_index", &self.image_index)
            .finish_non_exhaustive()
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        debug!("Dropping framebuffer {:?}", self.handle);
        // SAFETY: command buffers that reference this framebuffer hold an Arc.
        unsafe { self.device.driver().destroy_framebuffer(self.handle) };
    }
}
