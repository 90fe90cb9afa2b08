// SPDX-License-Identifier: CEPL-1.0
//! Host-memory driver for tests and headless runs.
//!
//! Handles are minted from a counter and never dereferenced. Every create,
//! destroy and recorded command is appended to a shared log that tests
//! inspect through [`FakeLog`]. Device memory is backed by heap bytes, so
//! mapping, filling and `vkCmdCopyBuffer` round-trips behave like the real
//! thing. Individual calls can be told to fail with [`FakeConfig::fail_on`].

use std::collections::{HashMap, HashSet};
use std::ffi::c_void;
use std::sync::Arc;

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use parking_lot::Mutex;
use portable_atomic::{AtomicU64, Ordering};
use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, RawDisplayHandle,
    RawWindowHandle, WebDisplayHandle, WebWindowHandle, WindowHandle,
};

use super::{
    AdapterInfo, DescriptorBinding, DescriptorWrite, DeviceDesc, DeviceDriver, FramebufferDesc,
    GraphicsPipelineDesc, ImageBarrier, ImageDesc, ImageViewDesc, InstanceDriver,
    QueueFamilyInfo, RenderPassBegin, RenderPassDesc, SamplerDesc, SubmitDesc, SurfaceSupport,
    SwapchainDesc,
};
use crate::pipeline::FixedFunctionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Instance,
    Surface,
    Device,
    Swapchain,
    ImageView,
    RenderPass,
    Framebuffer,
    ShaderModule,
    DescriptorSetLayout,
    PipelineLayout,
    Pipeline,
    Buffer,
    Image,
    Memory,
    Sampler,
    CommandPool,
    CommandBuffer,
    Semaphore,
    DescriptorPool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Created(ObjectKind, u64),
    Destroyed(ObjectKind, u64),
}

/// A command as recorded into a fake command buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginRenderPass(RenderPassBegin),
    EndRenderPass,
    BindPipeline(vk::Pipeline),
    BindVertexBuffer {
        binding: u32,
        buffer: vk::Buffer,
    },
    BindIndexBuffer {
        buffer: vk::Buffer,
        index_type: vk::IndexType,
    },
    BindDescriptorSet {
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
    },
    CopyBuffer {
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    },
    CopyBufferToImage {
        src: vk::Buffer,
        dst: vk::Image,
        extent: vk::Extent2D,
    },
    PipelineBarrier(ImageBarrier),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub queue: vk::Queue,
    pub desc: SubmitDesc,
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone)]
pub struct FakeConfig {
    pub adapters: Vec<AdapterInfo>,
    pub surface: SurfaceSupport,
    /// Overrides the image count the swapchain would otherwise get.
    pub image_count: Option<u32>,
    /// Fixed index returned by every acquire; round-robin when `None`.
    pub acquire_index: Option<u32>,
    failures: Vec<(String, usize)>,
}

impl Default for FakeConfig {
    fn default() -> Self {
        Self {
            adapters: vec![Self::discrete_adapter()],
            surface: Self::default_surface(),
            image_count: None,
            acquire_index: None,
            failures: Vec::new(),
        }
    }
}

impl FakeConfig {
    pub fn with_adapters(mut self, adapters: Vec<AdapterInfo>) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn with_surface(mut self, surface: SurfaceSupport) -> Self {
        self.surface = surface;
        self
    }

    pub fn with_image_count(mut self, count: u32) -> Self {
        self.image_count = Some(count);
        self
    }

    pub fn with_acquire_index(mut self, index: u32) -> Self {
        self.acquire_index = Some(index);
        self
    }

    /// Makes the `nth` (zero-based) call to `call` fail with
    /// `ERROR_OUT_OF_DEVICE_MEMORY`. `call` is the API entry point name,
    /// e.g. `"vkCreateImageView"`.
    pub fn fail_on(mut self, call: &str, nth: usize) -> Self {
        self.failures.push((call.to_owned(), nth));
        self
    }

    /// A discrete GPU with one graphics+present family, host-visible and
    /// device-local memory types, and anisotropic filtering.
    pub fn discrete_adapter() -> AdapterInfo {
        let mut memory_properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 2,
            memory_heap_count: 2,
            ..Default::default()
        };
        memory_properties.memory_types[0] = vk::MemoryType {
            property_flags: vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT,
            heap_index: 0,
        };
        memory_properties.memory_types[1] = vk::MemoryType {
            property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            heap_index: 1,
        };
        memory_properties.memory_heaps[0] = vk::MemoryHeap {
            size: 256 << 20,
            flags: vk::MemoryHeapFlags::empty(),
        };
        memory_properties.memory_heaps[1] = vk::MemoryHeap {
            size: 1 << 30,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };
        AdapterInfo {
            physical_device: vk::PhysicalDevice::from_raw(0xa000),
            name: "Keel Fake GPU".to_owned(),
            device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
            queue_families: vec![QueueFamilyInfo {
                flags: vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER,
                queue_count: 1,
                present_support: true,
            }],
            swapchain_extension: true,
            surface_format_count: 2,
            present_mode_count: 2,
            memory_properties,
            sampler_anisotropy: true,
            max_sampler_anisotropy: 16.0,
        }
    }

    /// An 800x600 surface offering sRGB BGRA8 and both FIFO and mailbox.
    pub fn default_surface() -> SurfaceSupport {
        SurfaceSupport {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 3,
                current_extent: vk::Extent2D {
                    width: 800,
                    height: 600,
                },
                min_image_extent: vk::Extent2D {
                    width: 1,
                    height: 1,
                },
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                max_image_array_layers: 1,
                supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
                supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            },
            formats: vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        }
    }
}

#[derive(Default)]
struct State {
    events: Vec<Event>,
    calls: HashMap<&'static str, usize>,
    memory: HashMap<u64, Box<[u8]>>,
    mapped: HashSet<u64>,
    buffers: HashMap<u64, (vk::DeviceSize, Option<u64>)>,
    images: HashMap<u64, ImageDesc>,
    swapchains: HashMap<u64, Vec<vk::Image>>,
    acquired: u32,
    recordings: HashMap<u64, Vec<Command>>,
    submissions: Vec<Submission>,
    presents: Vec<u32>,
    descriptor_writes: Vec<(vk::DescriptorSet, DescriptorWrite)>,
    pipeline_states: Vec<FixedFunctionState>,
}

impl State {
    fn record(&mut self, cb: vk::CommandBuffer, command: Command) {
        self.recordings.entry(cb.as_raw()).or_default().push(command);
    }

    fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) {
        let memory_of = |buffer: vk::Buffer| {
            self.buffers
                .get(&buffer.as_raw())
                .and_then(|&(_, memory)| memory)
        };
        let (Some(src_mem), Some(dst_mem)) = (memory_of(src), memory_of(dst)) else {
            return;
        };
        let Some(bytes) = self.memory.get(&src_mem).map(|m| m.to_vec()) else {
            return;
        };
        if let Some(target) = self.memory.get_mut(&dst_mem) {
            let n = (size as usize).min(bytes.len()).min(target.len());
            target[..n].copy_from_slice(&bytes[..n]);
        }
    }
}

struct Shared {
    config: FakeConfig,
    next_handle: AtomicU64,
    state: Mutex<State>,
}

impl Shared {
    fn new(config: FakeConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            next_handle: AtomicU64::new(1),
            state: Mutex::new(State::default()),
        })
    }

    fn mint(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    /// Counts the call and applies any configured failure.
    fn call(&self, state: &mut State, name: &'static str) -> VkResult<()> {
        let count = state.calls.entry(name).or_insert(0);
        let nth = *count;
        *count += 1;
        let fails = self
            .config
            .failures
            .iter()
            .any(|(call, n)| call == name && *n == nth);
        if fails {
            Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)
        } else {
            Ok(())
        }
    }

    fn create<H: Handle>(&self, name: &'static str, kind: ObjectKind) -> VkResult<H> {
        let mut state = self.state.lock();
        self.call(&mut state, name)?;
        let raw = self.mint();
        state.events.push(Event::Created(kind, raw));
        Ok(H::from_raw(raw))
    }

    fn destroy<H: Handle>(&self, kind: ObjectKind, handle: H) {
        self.state
            .lock()
            .events
            .push(Event::Destroyed(kind, handle.as_raw()));
    }

    fn checked(&self, name: &'static str) -> VkResult<()> {
        let mut state = self.state.lock();
        self.call(&mut state, name)
    }
}

/// Read access to everything the fake driver observed.
#[derive(Clone)]
pub struct FakeLog {
    shared: Arc<Shared>,
}

impl FakeLog {
    pub fn events(&self) -> Vec<Event> {
        self.shared.state.lock().events.clone()
    }

    pub fn created(&self, kind: ObjectKind) -> usize {
        self.count(|e| matches!(e, Event::Created(k, _) if *k == kind))
    }

    pub fn destroyed(&self, kind: ObjectKind) -> usize {
        self.count(|e| matches!(e, Event::Destroyed(k, _) if *k == kind))
    }

    pub fn live(&self, kind: ObjectKind) -> usize {
        self.created(kind) - self.destroyed(kind)
    }

    /// Objects of any kind created but not yet destroyed.
    pub fn live_total(&self) -> usize {
        let events = self.shared.state.lock();
        let created = events
            .events
            .iter()
            .filter(|e| matches!(e, Event::Created(..)))
            .count();
        created - (events.events.len() - created)
    }

    /// Position of `event` in the log.
    pub fn position(&self, event: Event) -> Option<usize> {
        self.shared
            .state
            .lock()
            .events
            .iter()
            .position(|e| *e == event)
    }

    pub fn call_count(&self, call: &str) -> usize {
        self.shared
            .state
            .lock()
            .calls
            .get(call)
            .copied()
            .unwrap_or(0)
    }

    pub fn recorded(&self, cb: vk::CommandBuffer) -> Vec<Command> {
        self.shared
            .state
            .lock()
            .recordings
            .get(&cb.as_raw())
            .cloned()
            .unwrap_or_default()
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.shared.state.lock().submissions.clone()
    }

    /// Image indices passed to present, in order.
    pub fn presents(&self) -> Vec<u32> {
        self.shared.state.lock().presents.clone()
    }

    pub fn descriptor_writes(&self) -> Vec<(vk::DescriptorSet, DescriptorWrite)> {
        self.shared.state.lock().descriptor_writes.clone()
    }

    pub fn pipeline_states(&self) -> Vec<FixedFunctionState> {
        self.shared.state.lock().pipeline_states.clone()
    }

    pub fn memory_contents(&self, memory: vk::DeviceMemory) -> Option<Vec<u8>> {
        self.shared
            .state
            .lock()
            .memory
            .get(&memory.as_raw())
            .map(|m| m.to_vec())
    }

    fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.shared
            .state
            .lock()
            .events
            .iter()
            .filter(|e| pred(e))
            .count()
    }
}

pub struct FakeInstance {
    shared: Arc<Shared>,
    handle: vk::Instance,
    extensions: Vec<String>,
}

impl FakeInstance {
    pub fn new(config: FakeConfig) -> Self {
        let shared = Shared::new(config);
        let raw = shared.mint();
        shared
            .state
            .lock()
            .events
            .push(Event::Created(ObjectKind::Instance, raw));
        Self {
            shared,
            handle: vk::Instance::from_raw(raw),
            extensions: vec!["VK_KHR_surface".to_owned()],
        }
    }

    pub fn log(&self) -> FakeLog {
        FakeLog {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl InstanceDriver for FakeInstance {
    fn raw_instance(&self) -> vk::Instance {
        self.handle
    }

    fn extensions(&self) -> &[String] {
        &self.extensions
    }

    unsafe fn destroy_instance(&self) {
        self.shared.destroy(ObjectKind::Instance, self.handle);
    }

    unsafe fn create_surface(
        &self,
        _display: RawDisplayHandle,
        _window: RawWindowHandle,
    ) -> VkResult<vk::SurfaceKHR> {
        self.shared.create("vkCreateSurfaceKHR", ObjectKind::Surface)
    }

    unsafe fn destroy_surface(&self, surface: vk::SurfaceKHR) {
        self.shared.destroy(ObjectKind::Surface, surface);
    }

    unsafe fn enumerate_adapters(&self, _surface: vk::SurfaceKHR) -> VkResult<Vec<AdapterInfo>> {
        self.shared.checked("vkEnumeratePhysicalDevices")?;
        Ok(self.shared.config.adapters.clone())
    }

    unsafe fn surface_support(
        &self,
        _physical_device: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<SurfaceSupport> {
        self.shared
            .checked("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?;
        Ok(self.shared.config.surface.clone())
    }

    unsafe fn create_device(
        &self,
        _adapter: &AdapterInfo,
        _desc: &DeviceDesc,
    ) -> VkResult<Box<dyn DeviceDriver>> {
        let handle = self.shared.create("vkCreateDevice", ObjectKind::Device)?;
        Ok(Box::new(FakeDevice {
            shared: Arc::clone(&self.shared),
            handle,
        }))
    }
}

pub struct FakeDevice {
    shared: Arc<Shared>,
    handle: vk::Device,
}

impl DeviceDriver for FakeDevice {
    fn raw_device(&self) -> vk::Device {
        self.handle
    }

    unsafe fn destroy_device(&self) {
        self.shared.destroy(ObjectKind::Device, self.handle);
    }

    unsafe fn get_queue(&self, family: u32, _index: u32) -> vk::Queue {
        vk::Queue::from_raw(0xf000 + u64::from(family))
    }

    unsafe fn device_wait_idle(&self) -> VkResult<()> {
        self.shared.checked("vkDeviceWaitIdle")
    }

    unsafe fn queue_wait_idle(&self, _queue: vk::Queue) -> VkResult<()> {
        self.shared.checked("vkQueueWaitIdle")
    }

    unsafe fn queue_submit(&self, queue: vk::Queue, submit: &SubmitDesc) -> VkResult<()> {
        let mut state = self.shared.state.lock();
        self.shared.call(&mut state, "vkQueueSubmit")?;
        let commands = state
            .recordings
            .get(&submit.command_buffer.as_raw())
            .cloned()
            .unwrap_or_default();
        for command in &commands {
            if let Command::CopyBuffer { src, dst, size } = *command {
                state.copy_buffer(src, dst, size);
            }
        }
        state.submissions.push(Submission {
            queue,
            desc: *submit,
            commands,
        });
        Ok(())
    }

    unsafe fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR> {
        let swapchain: vk::SwapchainKHR = self
            .shared
            .create("vkCreateSwapchainKHR", ObjectKind::Swapchain)?;
        let count = self
            .shared
            .config
            .image_count
            .unwrap_or(desc.min_image_count);
        let images = (0..count)
            .map(|_| vk::Image::from_raw(self.shared.mint()))
            .collect();
        self.shared
            .state
            .lock()
            .swapchains
            .insert(swapchain.as_raw(), images);
        Ok(swapchain)
    }

    unsafe fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        let mut state = self.shared.state.lock();
        self.shared.call(&mut state, "vkGetSwapchainImagesKHR")?;
        state
            .swapchains
            .get(&swapchain.as_raw())
            .cloned()
            .ok_or(vk::Result::ERROR_SURFACE_LOST_KHR)
    }

    unsafe fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        self.shared
            .state
            .lock()
            .swapchains
            .remove(&swapchain.as_raw());
        self.shared.destroy(ObjectKind::Swapchain, swapchain);
    }

    unsafe fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout: u64,
        _signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        let mut state = self.shared.state.lock();
        self.shared.call(&mut state, "vkAcquireNextImageKHR")?;
        let count = state
            .swapchains
            .get(&swapchain.as_raw())
            .map(|images| images.len() as u32)
            .ok_or(vk::Result::ERROR_SURFACE_LOST_KHR)?;
        let index = match self.shared.config.acquire_index {
            Some(index) => index,
            None => state.acquired % count.max(1),
        };
        state.acquired = state.acquired.wrapping_add(1);
        Ok((index, false))
    }

    unsafe fn queue_present(
        &self,
        _queue: vk::Queue,
        _swapchain: vk::SwapchainKHR,
        image_index: u32,
        _wait: vk::Semaphore,
    ) -> VkResult<bool> {
        let mut state = self.shared.state.lock();
        self.shared.call(&mut state, "vkQueuePresentKHR")?;
        state.presents.push(image_index);
        Ok(false)
    }

    unsafe fn create_image_view(&self, _desc: &ImageViewDesc) -> VkResult<vk::ImageView> {
        self.shared.create("vkCreateImageView", ObjectKind::ImageView)
    }

    unsafe fn destroy_image_view(&self, view: vk::ImageView) {
        self.shared.destroy(ObjectKind::ImageView, view);
    }

    unsafe fn create_render_pass(&self, _desc: &RenderPassDesc) -> VkResult<vk::RenderPass> {
        self.shared.create("vkCreateRenderPass", ObjectKind::RenderPass)
    }

    unsafe fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.shared.destroy(ObjectKind::RenderPass, render_pass);
    }

    unsafe fn create_framebuffer(&self, _desc: &FramebufferDesc) -> VkResult<vk::Framebuffer> {
        self.shared
            .create("vkCreateFramebuffer", ObjectKind::Framebuffer)
    }

    unsafe fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.shared.destroy(ObjectKind::Framebuffer, framebuffer);
    }

    unsafe fn create_shader_module(&self, _code: &[u32]) -> VkResult<vk::ShaderModule> {
        self.shared
            .create("vkCreateShaderModule", ObjectKind::ShaderModule)
    }

    unsafe fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.shared.destroy(ObjectKind::ShaderModule, module);
    }

    unsafe fn create_descriptor_set_layout(
        &self,
        _bindings: &[DescriptorBinding],
    ) -> VkResult<vk::DescriptorSetLayout> {
        self.shared.create(
            "vkCreateDescriptorSetLayout",
            ObjectKind::DescriptorSetLayout,
        )
    }

    unsafe fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.shared.destroy(ObjectKind::DescriptorSetLayout, layout);
    }

    unsafe fn create_pipeline_layout(
        &self,
        _set_layouts: &[vk::DescriptorSetLayout],
    ) -> VkResult<vk::PipelineLayout> {
        self.shared
            .create("vkCreatePipelineLayout", ObjectKind::PipelineLayout)
    }

    unsafe fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.shared.destroy(ObjectKind::PipelineLayout, layout);
    }

    unsafe fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDesc<'_>,
    ) -> VkResult<vk::Pipeline> {
        let pipeline = self
            .shared
            .create("vkCreateGraphicsPipelines", ObjectKind::Pipeline)?;
        self.shared
            .state
            .lock()
            .pipeline_states
            .push(desc.state.clone());
        Ok(pipeline)
    }

    unsafe fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.shared.destroy(ObjectKind::Pipeline, pipeline);
    }

    unsafe fn create_buffer(
        &self,
        size: vk::DeviceSize,
        _usage: vk::BufferUsageFlags,
    ) -> VkResult<vk::Buffer> {
        let buffer: vk::Buffer = self.shared.create("vkCreateBuffer", ObjectKind::Buffer)?;
        self.shared
            .state
            .lock()
            .buffers
            .insert(buffer.as_raw(), (size, None));
        Ok(buffer)
    }

    unsafe fn destroy_buffer(&self, buffer: vk::Buffer) {
        self.shared.state.lock().buffers.remove(&buffer.as_raw());
        self.shared.destroy(ObjectKind::Buffer, buffer);
    }

    unsafe fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        let size = self
            .shared
            .state
            .lock()
            .buffers
            .get(&buffer.as_raw())
            .map_or(0, |&(size, _)| size);
        vk::MemoryRequirements {
            size,
            alignment: 16,
            memory_type_bits: 0b11,
        }
    }

    unsafe fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
    ) -> VkResult<()> {
        let mut state = self.shared.state.lock();
        self.shared.call(&mut state, "vkBindBufferMemory")?;
        if let Some(entry) = state.buffers.get_mut(&buffer.as_raw()) {
            entry.1 = Some(memory.as_raw());
        }
        Ok(())
    }

    unsafe fn create_image(&self, desc: &ImageDesc) -> VkResult<vk::Image> {
        let image: vk::Image = self.shared.create("vkCreateImage", ObjectKind::Image)?;
        self.shared
            .state
            .lock()
            .images
            .insert(image.as_raw(), *desc);
        Ok(image)
    }

    unsafe fn destroy_image(&self, image: vk::Image) {
        self.shared.state.lock().images.remove(&image.as_raw());
        self.shared.destroy(ObjectKind::Image, image);
    }

    unsafe fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        let size = self
            .shared
            .state
            .lock()
            .images
            .get(&image.as_raw())
            .map_or(0, |d| u64::from(d.width) * u64::from(d.height) * 4);
        vk::MemoryRequirements {
            size,
            alignment: 256,
            memory_type_bits: 0b11,
        }
    }

    unsafe fn bind_image_memory(
        &self,
        _image: vk::Image,
        _memory: vk::DeviceMemory,
    ) -> VkResult<()> {
        self.shared.checked("vkBindImageMemory")
    }

    unsafe fn allocate_memory(
        &self,
        size: vk::DeviceSize,
        _memory_type_index: u32,
    ) -> VkResult<vk::DeviceMemory> {
        let memory: vk::DeviceMemory = self.shared.create("vkAllocateMemory", ObjectKind::Memory)?;
        self.shared
            .state
            .lock()
            .memory
            .insert(memory.as_raw(), vec![0u8; size as usize].into_boxed_slice());
        Ok(memory)
    }

    unsafe fn free_memory(&self, memory: vk::DeviceMemory) {
        {
            let mut state = self.shared.state.lock();
            state.memory.remove(&memory.as_raw());
            state.mapped.remove(&memory.as_raw());
        }
        self.shared.destroy(ObjectKind::Memory, memory);
    }

    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        _size: vk::DeviceSize,
    ) -> VkResult<*mut c_void> {
        let mut state = self.shared.state.lock();
        self.shared.call(&mut state, "vkMapMemory")?;
        if !state.mapped.insert(memory.as_raw()) {
            return Err(vk::Result::ERROR_MEMORY_MAP_FAILED);
        }
        // The boxed slice never moves while the allocation is alive, so the
        // pointer stays valid after the lock is released.
        state
            .memory
            .get_mut(&memory.as_raw())
            .map(|bytes| bytes.as_mut_ptr().cast::<c_void>())
            .ok_or(vk::Result::ERROR_MEMORY_MAP_FAILED)
    }

    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory) {
        self.shared.state.lock().mapped.remove(&memory.as_raw());
    }

    unsafe fn create_sampler(&self, _desc: &SamplerDesc) -> VkResult<vk::Sampler> {
        self.shared.create("vkCreateSampler", ObjectKind::Sampler)
    }

    unsafe fn destroy_sampler(&self, sampler: vk::Sampler) {
        self.shared.destroy(ObjectKind::Sampler, sampler);
    }

    unsafe fn create_command_pool(&self, _queue_family: u32) -> VkResult<vk::CommandPool> {
        self.shared
            .create("vkCreateCommandPool", ObjectKind::CommandPool)
    }

    unsafe fn destroy_command_pool(&self, pool: vk::CommandPool) {
        self.shared.destroy(ObjectKind::CommandPool, pool);
    }

    unsafe fn allocate_command_buffers(
        &self,
        _pool: vk::CommandPool,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        let mut state = self.shared.state.lock();
        self.shared.call(&mut state, "vkAllocateCommandBuffers")?;
        let buffers = (0..count)
            .map(|_| {
                let raw = self.shared.mint();
                state
                    .events
                    .push(Event::Created(ObjectKind::CommandBuffer, raw));
                vk::CommandBuffer::from_raw(raw)
            })
            .collect();
        Ok(buffers)
    }

    unsafe fn free_command_buffers(&self, _pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        let mut state = self.shared.state.lock();
        for cb in buffers {
            state.recordings.remove(&cb.as_raw());
            state
                .events
                .push(Event::Destroyed(ObjectKind::CommandBuffer, cb.as_raw()));
        }
    }

    unsafe fn begin_command_buffer(&self, cb: vk::CommandBuffer, _one_time: bool) -> VkResult<()> {
        let mut state = self.shared.state.lock();
        self.shared.call(&mut state, "vkBeginCommandBuffer")?;
        state.recordings.insert(cb.as_raw(), Vec::new());
        Ok(())
    }

    unsafe fn end_command_buffer(&self, _cb: vk::CommandBuffer) -> VkResult<()> {
        self.shared.checked("vkEndCommandBuffer")
    }

    unsafe fn cmd_begin_render_pass(&self, cb: vk::CommandBuffer, begin: &RenderPassBegin) {
        self.shared
            .state
            .lock()
            .record(cb, Command::BeginRenderPass(*begin));
    }

    unsafe fn cmd_end_render_pass(&self, cb: vk::CommandBuffer) {
        self.shared.state.lock().record(cb, Command::EndRenderPass);
    }

    unsafe fn cmd_bind_pipeline(&self, cb: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.shared
            .state
            .lock()
            .record(cb, Command::BindPipeline(pipeline));
    }

    unsafe fn cmd_bind_vertex_buffer(&self, cb: vk::CommandBuffer, binding: u32, buffer: vk::Buffer) {
        self.shared
            .state
            .lock()
            .record(cb, Command::BindVertexBuffer { binding, buffer });
    }

    unsafe fn cmd_bind_index_buffer(
        &self,
        cb: vk::CommandBuffer,
        buffer: vk::Buffer,
        index_type: vk::IndexType,
    ) {
        self.shared
            .state
            .lock()
            .record(cb, Command::BindIndexBuffer { buffer, index_type });
    }

    unsafe fn cmd_bind_descriptor_set(
        &self,
        cb: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    ) {
        self.shared
            .state
            .lock()
            .record(cb, Command::BindDescriptorSet { layout, set });
    }

    unsafe fn cmd_draw_indexed(
        &self,
        cb: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        _first_index: u32,
        _vertex_offset: i32,
        _first_instance: u32,
    ) {
        self.shared.state.lock().record(
            cb,
            Command::DrawIndexed {
                index_count,
                instance_count,
            },
        );
    }

    unsafe fn cmd_copy_buffer(
        &self,
        cb: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    ) {
        self.shared
            .state
            .lock()
            .record(cb, Command::CopyBuffer { src, dst, size });
    }

    unsafe fn cmd_copy_buffer_to_image(
        &self,
        cb: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        extent: vk::Extent2D,
    ) {
        self.shared
            .state
            .lock()
            .record(cb, Command::CopyBufferToImage { src, dst, extent });
    }

    unsafe fn cmd_pipeline_barrier(&self, cb: vk::CommandBuffer, barrier: &ImageBarrier) {
        self.shared
            .state
            .lock()
            .record(cb, Command::PipelineBarrier(*barrier));
    }

    unsafe fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        self.shared.create("vkCreateSemaphore", ObjectKind::Semaphore)
    }

    unsafe fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.shared.destroy(ObjectKind::Semaphore, semaphore);
    }

    unsafe fn create_descriptor_pool(
        &self,
        _max_sets: u32,
        _sizes: &[vk::DescriptorPoolSize],
    ) -> VkResult<vk::DescriptorPool> {
        self.shared
            .create("vkCreateDescriptorPool", ObjectKind::DescriptorPool)
    }

    unsafe fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        self.shared.destroy(ObjectKind::DescriptorPool, pool);
    }

    unsafe fn allocate_descriptor_sets(
        &self,
        _pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
    ) -> VkResult<Vec<vk::DescriptorSet>> {
        self.shared.checked("vkAllocateDescriptorSets")?;
        Ok(layouts
            .iter()
            .map(|_| vk::DescriptorSet::from_raw(self.shared.mint()))
            .collect())
    }

    unsafe fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]) {
        self.shared
            .state
            .lock()
            .descriptor_writes
            .extend(writes.iter().map(|w| (set, *w)));
    }
}

/// A window that hands out placeholder web handles. The fake driver never
/// looks at them.
#[derive(Debug, Default, Clone, Copy)]
pub struct FakeWindow;

impl HasWindowHandle for FakeWindow {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        let raw = RawWindowHandle::Web(WebWindowHandle::new(1));
        // SAFETY: the handle is only ever passed to the fake driver, which
        // does not dereference it.
        Ok(unsafe { WindowHandle::borrow_raw(raw) })
    }
}

impl HasDisplayHandle for FakeWindow {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        let raw = RawDisplayHandle::Web(WebDisplayHandle::new());
        // SAFETY: as above.
        Ok(unsafe { DisplayHandle::borrow_raw(raw) })
    }
}
