// SPDX-License-Identifier: CEPL-1.0
//! Command pools and the command buffers recorded from them.
//!
//! Recording a command that references a wrapped object keeps an `Arc` to it
//! until the buffer is re-recorded or dropped, so nothing a pending command
//! buffer points at can be destroyed underneath it.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::buffer::{Buffer, IndexBuffer, VertexBuffer};
use crate::descriptor::DescriptorSets;
use crate::device::Device;
use crate::driver::{ImageBarrier, RenderPassBegin, SubmitDesc};
use crate::error::{check_index, Checked, Result};
use crate::framebuffer::Framebuffer;
use crate::image::Image;
use crate::pipeline::GraphicsPipeline;
use crate::render_pass::RenderPass;
use crate::sync::Semaphore;

/// A command pool on the graphics queue family.
pub struct CommandPool {
    device: Arc<Device>,
    handle: vk::CommandPool,
}

impl CommandPool {
    pub fn new(device: &Arc<Device>) -> Result<Arc<Self>> {
        let family = device.queue_families().graphics;
        // SAFETY: `family` is one of the families the device was created with.
        let handle = unsafe { device.driver().create_command_pool(family) }
            .check("vkCreateCommandPool")?;
        debug!("Command pool created on queue family {family}");
        Ok(Arc::new(Self {
            device: Arc::clone(device),
            handle,
        }))
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn raw_pool(&self) -> vk::CommandPool {
        self.handle
    }

    /// Records one command buffer with `record`, submits it to the graphics
    /// queue and waits for the queue to go idle.
    pub fn submit_once<F>(pool: &Arc<Self>, record: F) -> Result<()>
    where
        F: FnOnce(&mut CommandBuffers) -> Result<()>,
    {
        let mut commands = CommandBuffers::new(pool, 1)?;
        commands.begin_one_time(0)?;
        record(&mut commands)?;
        commands.end(0)?;
        commands.submit_and_wait(0)
    }
}

impl fmt::Debug for CommandPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandPool")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        debug!("Dropping command pool {:?}", self.handle);
        // SAFETY: every CommandBuffers allocated from this pool holds an Arc
        // to it, so none are left.
        unsafe { self.device.driver().destroy_command_pool(self.handle) };
    }
}

/// A batch of primary command buffers allocated together.
pub struct CommandBuffers {
    pool: Arc<CommandPool>,
    buffers: Vec<vk::CommandBuffer>,
    retained: Vec<Vec<Arc<dyn Any + Send + Sync>>>,
}

impl CommandBuffers {
    pub fn new(pool: &Arc<CommandPool>, count: usize) -> Result<Self> {
        // SAFETY: the pool is alive for as long as `pool` is borrowed.
        let buffers = unsafe {
            pool.device
                .driver()
                .allocate_command_buffers(pool.handle, count as u32)
        }
        .check("vkAllocateCommandBuffers")?;
        info!("Allocated {count} command buffers");
        Ok(Self {
            pool: Arc::clone(pool),
            buffers,
            retained: vec![Vec::new(); count],
        })
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn raw(&self, index: usize) -> Result<vk::CommandBuffer> {
        check_index("command buffer", index, self.buffers.len())?;
        Ok(self.buffers[index])
    }

    fn device(&self) -> &Device {
        &self.pool.device
    }

    fn retain<T: Any + Send + Sync>(&mut self, index: usize, object: &Arc<T>) {
        self.retained[index].push(Arc::clone(object) as Arc<dyn Any + Send + Sync>);
    }

    fn begin_with(&mut self, index: usize, one_time: bool) -> Result<()> {
        let cb = self.raw(index)?;
        self.retained[index].clear();
        // SAFETY: the buffer is not pending; callers wait for the queue
        // before re-recording.
        unsafe { self.device().driver().begin_command_buffer(cb, one_time) }
            .check("vkBeginCommandBuffer")
    }

    /// Starts recording buffer `index`, dropping whatever the previous
    /// recording retained.
    pub fn begin(&mut self, index: usize) -> Result<()> {
        self.begin_with(index, false)
    }

    pub fn begin_one_time(&mut self, index: usize) -> Result<()> {
        self.begin_with(index, true)
    }

    pub fn end(&mut self, index: usize) -> Result<()> {
        let cb = self.raw(index)?;
        // SAFETY: `cb` is in the recording state.
        unsafe { self.device().driver().end_command_buffer(cb) }.check("vkEndCommandBuffer")
    }

    /// Begins `render_pass` on `framebuffer`, clearing the colour attachment
    /// to `clear_color`.
    pub fn begin_render_pass(
        &mut self,
        index: usize,
        render_pass: &Arc<RenderPass>,
        framebuffer: &Arc<Framebuffer>,
        clear_color: [f32; 4],
    ) -> Result<()> {
        let cb = self.raw(index)?;
        let begin = RenderPassBegin {
            render_pass: render_pass.raw_render_pass(),
            framebuffer: framebuffer.raw_framebuffer(),
            extent: framebuffer.extent(),
            clear_color,
        };
        // SAFETY: both objects are retained below.
        unsafe { self.device().driver().cmd_begin_render_pass(cb, &begin) };
        self.retain(index, render_pass);
        self.retain(index, framebuffer);
        Ok(())
    }

    pub fn end_render_pass(&mut self, index: usize) -> Result<()> {
        let cb = self.raw(index)?;
        // SAFETY: paired with `begin_render_pass`.
        unsafe { self.device().driver().cmd_end_render_pass(cb) };
        Ok(())
    }

    pub fn bind_pipeline(&mut self, index: usize, pipeline: &Arc<GraphicsPipeline>) -> Result<()> {
        let cb = self.raw(index)?;
        // SAFETY: the pipeline is retained below.
        unsafe {
            self.device()
                .driver()
                .cmd_bind_pipeline(cb, pipeline.raw_pipeline())
        };
        self.retain(index, pipeline);
        Ok(())
    }

    pub fn bind_vertex_buffer(
        &mut self,
        index: usize,
        buffer: &Arc<VertexBuffer>,
        binding: u32,
    ) -> Result<()> {
        let cb = self.raw(index)?;
        // SAFETY: the buffer is retained below.
        unsafe {
            self.device()
                .driver()
                .cmd_bind_vertex_buffer(cb, binding, buffer.raw_buffer())
        };
        self.retain(index, buffer);
        Ok(())
    }

    pub fn bind_index_buffer(
        &mut self,
        index: usize,
        buffer: &Arc<IndexBuffer>,
        index_type: vk::IndexType,
    ) -> Result<()> {
        let cb = self.raw(index)?;
        // SAFETY: the buffer is retained below.
        unsafe {
            self.device()
                .driver()
                .cmd_bind_index_buffer(cb, buffer.raw_buffer(), index_type)
        };
        self.retain(index, buffer);
        Ok(())
    }

    /// Binds set `set_index` of `sets` at set 0 of the sets' pipeline layout.
    pub fn bind_descriptor_set(
        &mut self,
        index: usize,
        sets: &Arc<DescriptorSets>,
        set_index: usize,
    ) -> Result<()> {
        let cb = self.raw(index)?;
        let set = sets.raw_set(set_index)?;
        let layout = sets.pipeline().layout().raw_layout();
        // SAFETY: the sets (and through them the pipeline layout) are
        // retained below.
        unsafe {
            self.device()
                .driver()
                .cmd_bind_descriptor_set(cb, layout, set)
        };
        self.retain(index, sets);
        Ok(())
    }

    pub fn draw_indexed(
        &mut self,
        index: usize,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> Result<()> {
        let cb = self.raw(index)?;
        // SAFETY: recording only; bound state is retained by the bind calls.
        unsafe {
            self.device().driver().cmd_draw_indexed(
                cb,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        };
        Ok(())
    }

    /// Records a copy of `size` bytes from the start of `src` to the start
    /// of `dst`. Neither buffer is retained; one-shot submissions wait for
    /// completion before they return.
    pub fn copy_buffer(
        &mut self,
        index: usize,
        src: &Buffer,
        dst: &Buffer,
        size: vk::DeviceSize,
    ) -> Result<()> {
        let cb = self.raw(index)?;
        // SAFETY: both buffers outlive the one-shot submission.
        unsafe {
            self.device()
                .driver()
                .cmd_copy_buffer(cb, src.raw_buffer(), dst.raw_buffer(), size)
        };
        Ok(())
    }

    /// Copies tightly packed texels covering all of `image`, which must be in
    /// `TRANSFER_DST_OPTIMAL`.
    pub fn copy_buffer_to_image(&mut self, index: usize, src: &Buffer, image: &Image) -> Result<()> {
        let cb = self.raw(index)?;
        // SAFETY: both objects outlive the one-shot submission.
        unsafe {
            self.device().driver().cmd_copy_buffer_to_image(
                cb,
                src.raw_buffer(),
                image.raw_image(),
                image.extent(),
            )
        };
        Ok(())
    }

    pub fn pipeline_barrier(&mut self, index: usize, barrier: &ImageBarrier) -> Result<()> {
        let cb = self.raw(index)?;
        // SAFETY: recording only.
        unsafe { self.device().driver().cmd_pipeline_barrier(cb, barrier) };
        Ok(())
    }

    /// Submits buffer `index` to the graphics queue. Execution waits on
    /// `wait` at the colour attachment output stage and signals `signal`.
    pub fn submit(&self, index: usize, wait: &Semaphore, signal: &Semaphore) -> Result<()> {
        let desc = SubmitDesc {
            command_buffer: self.raw(index)?,
            wait: Some((
                wait.raw_semaphore(),
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            )),
            signal: Some(signal.raw_semaphore()),
        };
        let device = self.device();
        // SAFETY: the buffer has finished recording.
        unsafe { device.driver().queue_submit(device.graphics_queue(), &desc) }
            .check("vkQueueSubmit")
    }

    /// Submits buffer `index` without semaphores and waits for the graphics
    /// queue to drain.
    pub fn submit_and_wait(&self, index: usize) -> Result<()> {
        let desc = SubmitDesc {
            command_buffer: self.raw(index)?,
            wait: None,
            signal: None,
        };
        let device = self.device();
        // SAFETY: the buffer has finished recording.
        unsafe { device.driver().queue_submit(device.graphics_queue(), &desc) }
            .check("vkQueueSubmit")?;
        device.wait_graphics_queue()
    }
}

impl fmt::Debug for CommandBuffers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBuffers")
            .field("buffers", &self.buffers)
            .finish_non_exhaustive()
    }
}

impl Drop for CommandBuffers {
    fn drop(&mut self) {
        debug!("Freeing {} command buffers", self.buffers.len());
        // SAFETY: the owner waits for the device to go idle before dropping
        // buffers that may still be pending.
        unsafe {
            self.pool
                .device
                .driver()
                .free_command_buffers(self.pool.handle, &self.buffers)
        };
    }
}
