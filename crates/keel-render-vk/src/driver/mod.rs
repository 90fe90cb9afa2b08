// SPDX-License-Identifier: CEPL-1.0
//! The call seam between the wrappers and the graphics API.
//!
//! Every wrapper in this crate issues its API calls through
//! [`InstanceDriver`] (instance-level functions) or [`DeviceDriver`]
//! (device-level functions). [`ash::AshInstance`] / [`ash::AshDevice`]
//! implement them on top of `ash`; `fake` (behind the `fake` feature)
//! implements them in host memory so the ownership graph and frame loop
//! run without a GPU.
//!
//! The traits take plain descriptor values instead of `vk::*CreateInfo`
//! structs, so implementations never chase borrowed pointers.
//!
//! # Safety
//!
//! Every `unsafe fn` here requires that handle arguments were created by
//! the same driver (or its parent instance) and are still alive, and that
//! the host synchronisation rules of the underlying call are respected.
//! The wrappers uphold this by holding `Arc`s to everything they use.

pub mod ash;
#[cfg(feature = "fake")]
pub mod fake;

use std::ffi::c_void;

use ::ash::prelude::VkResult;
use ::ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::pipeline::FixedFunctionState;

// ---------------------------------------------------------------------------
// Adapter discovery
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyInfo {
    pub flags: vk::QueueFlags,
    pub queue_count: u32,
    /// Result of the present-support query against the surface.
    pub present_support: bool,
}

/// Everything adapter selection needs to know about one physical device.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub physical_device: vk::PhysicalDevice,
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub queue_families: Vec<QueueFamilyInfo>,
    pub swapchain_extension: bool,
    pub surface_format_count: usize,
    pub present_mode_count: usize,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub sampler_anisotropy: bool,
    pub max_sampler_anisotropy: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDesc {
    /// Unique queue family indices, one queue is created from each.
    pub queue_families: Vec<u32>,
    pub sampler_anisotropy: bool,
}

#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

// ---------------------------------------------------------------------------
// Object descriptors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapchainDesc {
    pub surface: vk::SurfaceKHR,
    pub min_image_count: u32,
    pub format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub present_mode: vk::PresentModeKHR,
    /// Empty for exclusive sharing; the distinct families otherwise.
    pub queue_family_indices: Vec<u32>,
}

/// A 2D single-mip colour view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageViewDesc {
    pub image: vk::Image,
    pub format: vk::Format,
}

/// Single colour attachment, single subpass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderPassDesc {
    pub color_format: vk::Format,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferDesc {
    pub render_pass: vk::RenderPass,
    pub attachment: vk::ImageView,
    pub extent: vk::Extent2D,
}

/// One binding slot within a descriptor-set layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub count: u32,
    pub stage_flags: vk::ShaderStageFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDesc {
    pub width: u32,
    pub height: u32,
    pub format: vk::Format,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub address_mode: vk::SamplerAddressMode,
    /// `None` leaves anisotropic filtering disabled.
    pub max_anisotropy: Option<f32>,
}

pub struct GraphicsPipelineDesc<'a> {
    pub vertex_shader: vk::ShaderModule,
    pub fragment_shader: vk::ShaderModule,
    pub state: &'a FixedFunctionState,
    pub layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorResource {
    UniformBuffer {
        buffer: vk::Buffer,
        range: vk::DeviceSize,
    },
    CombinedImageSampler {
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
    },
}

/// A single-element descriptor write, minus the destination set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorWrite {
    pub binding: u32,
    pub resource: DescriptorResource,
}

impl DescriptorWrite {
    pub fn descriptor_type(&self) -> vk::DescriptorType {
        match self.resource {
            DescriptorResource::UniformBuffer { .. } => vk::DescriptorType::UNIFORM_BUFFER,
            DescriptorResource::CombinedImageSampler { .. } => {
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Command descriptors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderPassBegin {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
}

/// A whole-image colour layout transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrier {
    pub image: vk::Image,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitDesc {
    pub command_buffer: vk::CommandBuffer,
    pub wait: Option<(vk::Semaphore, vk::PipelineStageFlags)>,
    pub signal: Option<vk::Semaphore>,
}

// ---------------------------------------------------------------------------
// Driver traits
// ---------------------------------------------------------------------------

/// Instance-level entry points.
pub trait InstanceDriver: Send + Sync {
    fn raw_instance(&self) -> vk::Instance;

    /// Names of the instance extensions that were enabled.
    fn extensions(&self) -> &[String];

    unsafe fn destroy_instance(&self);

    unsafe fn create_surface(
        &self,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> VkResult<vk::SurfaceKHR>;
    unsafe fn destroy_surface(&self, surface: vk::SurfaceKHR);

    unsafe fn enumerate_adapters(&self, surface: vk::SurfaceKHR) -> VkResult<Vec<AdapterInfo>>;
    unsafe fn surface_support(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<SurfaceSupport>;

    unsafe fn create_device(
        &self,
        adapter: &AdapterInfo,
        desc: &DeviceDesc,
    ) -> VkResult<Box<dyn DeviceDriver>>;
}

/// Device-level entry points, including the swapchain extension.
pub trait DeviceDriver: Send + Sync {
    fn raw_device(&self) -> vk::Device;

    unsafe fn destroy_device(&self);
    unsafe fn get_queue(&self, family: u32, index: u32) -> vk::Queue;
    unsafe fn device_wait_idle(&self) -> VkResult<()>;
    unsafe fn queue_wait_idle(&self, queue: vk::Queue) -> VkResult<()>;
    unsafe fn queue_submit(&self, queue: vk::Queue, submit: &SubmitDesc) -> VkResult<()>;

    // Swapchain
    unsafe fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR>;
    unsafe fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;
    unsafe fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
    /// Returns the image index and whether the swapchain is suboptimal.
    unsafe fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)>;
    unsafe fn queue_present(
        &self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool>;

    // Views, passes, framebuffers
    unsafe fn create_image_view(&self, desc: &ImageViewDesc) -> VkResult<vk::ImageView>;
    unsafe fn destroy_image_view(&self, view: vk::ImageView);
    unsafe fn create_render_pass(&self, desc: &RenderPassDesc) -> VkResult<vk::RenderPass>;
    unsafe fn destroy_render_pass(&self, render_pass: vk::RenderPass);
    unsafe fn create_framebuffer(&self, desc: &FramebufferDesc) -> VkResult<vk::Framebuffer>;
    unsafe fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    // Shaders and pipelines
    unsafe fn create_shader_module(&self, code: &[u32]) -> VkResult<vk::ShaderModule>;
    unsafe fn destroy_shader_module(&self, module: vk::ShaderModule);
    unsafe fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBinding],
    ) -> VkResult<vk::DescriptorSetLayout>;
    unsafe fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);
    unsafe fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
    ) -> VkResult<vk::PipelineLayout>;
    unsafe fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);
    unsafe fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDesc<'_>,
    ) -> VkResult<vk::Pipeline>;
    unsafe fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    // Memory, buffers, images
    unsafe fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> VkResult<vk::Buffer>;
    unsafe fn destroy_buffer(&self, buffer: vk::Buffer);
    unsafe fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements;
    unsafe fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
    ) -> VkResult<()>;
    unsafe fn create_image(&self, desc: &ImageDesc) -> VkResult<vk::Image>;
    unsafe fn destroy_image(&self, image: vk::Image);
    unsafe fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements;
    unsafe fn bind_image_memory(&self, image: vk::Image, memory: vk::DeviceMemory)
        -> VkResult<()>;
    unsafe fn allocate_memory(
        &self,
        size: vk::DeviceSize,
        memory_type_index: u32,
    ) -> VkResult<vk::DeviceMemory>;
    unsafe fn free_memory(&self, memory: vk::DeviceMemory);
    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        size: vk::DeviceSize,
    ) -> VkResult<*mut c_void>;
    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory);
    unsafe fn create_sampler(&self, desc: &SamplerDesc) -> VkResult<vk::Sampler>;
    unsafe fn destroy_sampler(&self, sampler: vk::Sampler);

    // Command pools and recording
    unsafe fn create_command_pool(&self, queue_family: u32) -> VkResult<vk::CommandPool>;
    unsafe fn destroy_command_pool(&self, pool: vk::CommandPool);
    unsafe fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>>;
    unsafe fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]);
    unsafe fn begin_command_buffer(&self, cb: vk::CommandBuffer, one_time: bool) -> VkResult<()>;
    unsafe fn end_command_buffer(&self, cb: vk::CommandBuffer) -> VkResult<()>;
    unsafe fn cmd_begin_render_pass(&self, cb: vk::CommandBuffer, begin: &RenderPassBegin);
    unsafe fn cmd_end_render_pass(&self, cb: vk::CommandBuffer);
    unsafe fn cmd_bind_pipeline(&self, cb: vk::CommandBuffer, pipeline: vk::Pipeline);
    unsafe fn cmd_bind_vertex_buffer(&self, cb: vk::CommandBuffer, binding: u32, buffer: vk::Buffer);
    unsafe fn cmd_bind_index_buffer(
        &self,
        cb: vk::CommandBuffer,
        buffer: vk::Buffer,
        index_type: vk::IndexType,
    );
    unsafe fn cmd_bind_descriptor_set(
        &self,
        cb: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    );
    unsafe fn cmd_draw_indexed(
        &self,
        cb: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );
    unsafe fn cmd_copy_buffer(
        &self,
        cb: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    );
    unsafe fn cmd_copy_buffer_to_image(
        &self,
        cb: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        extent: vk::Extent2D,
    );
    unsafe fn cmd_pipeline_barrier(&self, cb: vk::CommandBuffer, barrier: &ImageBarrier);

    // Synchronisation
    unsafe fn create_semaphore(&self) -> VkResult<vk::Semaphore>;
    unsafe fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    // Descriptors
    unsafe fn create_descriptor_pool(
        &self,
        max_sets: u32,
        sizes: &[vk::DescriptorPoolSize],
    ) -> VkResult<vk::DescriptorPool>;
    unsafe fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);
    unsafe fn allocate_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
    ) -> VkResult<Vec<vk::DescriptorSet>>;
    unsafe fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]);
}
