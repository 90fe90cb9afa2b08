// SPDX-License-Identifier: CEPL-1.0
use std::fmt;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::driver::RenderPassDesc;
use crate::error::{Checked, Result};
use crate::swapchain::SwapChain;

/// Single-subpass pass over one colour attachment in the swapchain format.
/// The attachment is cleared on load, stored, and left ready to present.
pub struct RenderPass {
    device: Arc<Device>,
    swapchain: Arc<SwapChain>,
    handle: vk::RenderPass,
    desc: RenderPassDesc,
}

impl RenderPass {
    pub fn new(device: &Arc<Device>, swapchain: &Arc<SwapChain>) -> Result<Arc<Self>> {
        let desc = RenderPassDesc {
            color_format: swapchain.format(),
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        };
        // SAFETY: no handle preconditions beyond a live device.
        let handle =
            unsafe { device.driver().create_render_pass(&desc) }.check("vkCreateRenderPass")?;
        Ok(Arc::new(Self {
            device: Arc::clone(device),
            swapchain: Arc::clone(swapchain),
            handle,
            desc,
        }))
    }

    pub fn raw_render_pass(&self) -> vk::RenderPass {
        self.handle
    }

    pub fn swapchain(&self) -> &Arc<SwapChain> {
        &self.swapchain
    }

    pub fn color_format(&self) -> vk::Format {
        self.desc.color_format
    }

    pub fn desc(&self) -> &RenderPassDesc {
        &self.desc
    }
}

impl fmt::Debug for RenderPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderPass")
            .field("handle", &self.handle)
            .field("format", &self.desc.color_format)
            .finish_non_exhaustive()
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        debug!("Dropping render pass {:?}", self.handle);
        // SAFETY: framebuffers and pipelines hold `Arc<RenderPass>`.
        unsafe { self.device.driver().destroy_render_pass(self.handle) };
    }
}
