// SPDX-License-Identifier: CEPL-1.0
//! Per-image frame resources and the single-frame-in-flight loop.

use std::fmt;
use std::sync::Arc;

use ash::vk;
use tracing::{info, trace};

use crate::buffer::{IndexBuffer, UniformBuffer, VertexBuffer};
use crate::command::{CommandBuffers, CommandPool};
use crate::descriptor::{DescriptorSetPool, DescriptorSets};
use crate::device::Device;
use crate::error::{check_index, Result};
use crate::framebuffer::Framebuffer;
use crate::image::Image;
use crate::pipeline::GraphicsPipeline;
use crate::render_pass::RenderPass;
use crate::swapchain::SwapChain;
use crate::sync::Semaphore;

/// Where [`FrameLoop::draw_frame`] is in the frame. Only observable as
/// anything but `Idle` when a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameState {
    #[default]
    Idle,
    AcquireImage,
    Submit,
    Present,
}

/// Acquire, submit, update, present, wait. One frame in flight.
pub struct FrameLoop {
    device: Arc<Device>,
    swapchain: Arc<SwapChain>,
    image_available: Semaphore,
    render_finished: Semaphore,
    state: FrameState,
    frames: u64,
}

impl FrameLoop {
    pub fn new(device: &Arc<Device>, swapchain: &Arc<SwapChain>) -> Result<Self> {
        Ok(Self {
            device: Arc::clone(device),
            swapchain: Arc::clone(swapchain),
            image_available: Semaphore::new(device)?,
            render_finished: Semaphore::new(device)?,
            state: FrameState::Idle,
            frames: 0,
        })
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames
    }

    /// Runs one frame and returns the swapchain image index it used.
    ///
    /// `commands` must hold one recorded buffer per swapchain image.
    /// `update` receives the image index after submission and before
    /// presentation; it is where that image's uniform buffer is written.
    ///
    /// After an error the acquired image is never presented and its
    /// semaphore may stay signaled, so the loop must not be reused.
    pub fn draw_frame<F>(&mut self, commands: &CommandBuffers, mut update: F) -> Result<u32>
    where
        F: FnMut(usize) -> Result<()>,
    {
        self.state = FrameState::AcquireImage;
        let index = self.swapchain.acquire_next_image(&self.image_available)?;

        self.state = FrameState::Submit;
        commands.submit(index as usize, &self.image_available, &self.render_finished)?;
        update(index as usize)?;

        self.state = FrameState::Present;
        self.swapchain.present(index, &self.render_finished)?;
        self.device.wait_present_queue()?;

        self.state = FrameState::Idle;
        self.frames += 1;
        trace!("Frame {} presented image {index}", self.frames);
        Ok(index)
    }
}

impl fmt::Debug for FrameLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameLoop")
            .field("state", &self.state)
            .field("frames", &self.frames)
            .finish_non_exhaustive()
    }
}

/// What [`FrameResources::record`] draws.
#[derive(Debug, Clone)]
pub struct DrawCommand {
    pub vertex_buffer: Arc<VertexBuffer>,
    pub index_buffer: Arc<IndexBuffer>,
    pub index_type: vk::IndexType,
    pub index_count: u32,
}

/// Everything that exists once per swapchain image: framebuffer, uniform
/// buffer, descriptor set and command buffer share the image's index.
pub struct FrameResources {
    render_pass: Arc<RenderPass>,
    pipeline: Arc<GraphicsPipeline>,
    framebuffers: Vec<Arc<Framebuffer>>,
    uniform_buffers: Vec<Arc<UniformBuffer>>,
    descriptor_sets: Arc<DescriptorSets>,
    commands: CommandBuffers,
}

impl FrameResources {
    /// Set `i` gets uniform buffer `i` at binding 0 and `texture` at
    /// binding 1.
    pub fn new(
        device: &Arc<Device>,
        swapchain: &Arc<SwapChain>,
        render_pass: &Arc<RenderPass>,
        pipeline: &Arc<GraphicsPipeline>,
        pool: &Arc<CommandPool>,
        uniform_size: vk::DeviceSize,
        texture: &Arc<Image>,
    ) -> Result<Self> {
        let count = swapchain.image_count();
        let framebuffers = Framebuffer::for_swapchain(device, swapchain, render_pass)?;
        let uniform_buffers = (0..count)
            .map(|_| UniformBuffer::new(device, uniform_size))
            .collect::<Result<Vec<_>>>()?;

        let descriptor_pool = DescriptorSetPool::for_frames(device, count as u32)?;
        let mut sets = DescriptorSets::new(&descriptor_pool, pipeline, count)?;
        for (i, uniform) in uniform_buffers.iter().enumerate() {
            sets.update(i, uniform, texture)?;
        }

        let commands = CommandBuffers::new(pool, count)?;
        info!("Frame resources created for {count} swapchain images");
        Ok(Self {
            render_pass: Arc::clone(render_pass),
            pipeline: Arc::clone(pipeline),
            framebuffers,
            uniform_buffers,
            descriptor_sets: Arc::new(sets),
            commands,
        })
    }

    /// Records every command buffer: render pass on its framebuffer, the
    /// pipeline, the draw's buffers, its descriptor set, one indexed draw.
    pub fn record(&mut self, draw: &DrawCommand, clear_color: [f32; 4]) -> Result<()> {
        for i in 0..self.commands.len() {
            let commands = &mut self.commands;
            commands.begin(i)?;
            commands.begin_render_pass(i, &self.render_pass, &self.framebuffers[i], clear_color)?;
            commands.bind_pipeline(i, &self.pipeline)?;
            commands.bind_vertex_buffer(i, &draw.vertex_buffer, 0)?;
            commands.bind_index_buffer(i, &draw.index_buffer, draw.index_type)?;
            commands.bind_descriptor_set(i, &self.descriptor_sets, i)?;
            commands.draw_indexed(i, draw.index_count, 1, 0, 0, 0)?;
            commands.end_render_pass(i)?;
            commands.end(i)?;
        }
        info!("Recorded {} command buffers", self.commands.len());
        Ok(())
    }

    pub fn image_count(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn framebuffers(&self) -> &[Arc<Framebuffer>] {
        &self.framebuffers
    }

    pub fn uniform_buffers(&self) -> &[Arc<UniformBuffer>] {
        &self.uniform_buffers
    }

    pub fn uniform_buffer(&self, index: usize) -> Result<&Arc<UniformBuffer>> {
        check_index("uniform buffer", index, self.uniform_buffers.len())?;
        Ok(&self.uniform_buffers[index])
    }

    pub fn descriptor_sets(&self) -> &Arc<DescriptorSets> {
        &self.descriptor_sets
    }

    pub fn commands(&self) -> &CommandBuffers {
        &self.commands
    }
}

impl fmt::Debug for FrameResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameResources")
            .field("images", &self.framebuffers.len())
            .finish_non_exhaustive()
    }
}
