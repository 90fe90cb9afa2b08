// SPDX-License-Identifier: CEPL-1.0
//! RAII wrappers over Vulkan.
//!
//! Every wrapper owns one API object and holds an `Arc` to each object it
//! depends on, so destruction always runs dependents first:
//!
//! ```text
//! Instance
//! └─ Surface (keeps the window alive)
//!    └─ Device (graphics + present queues)
//!       ├─ SwapChain (image views)
//!       │  └─ RenderPass
//!       │     ├─ Framebuffer (one per swapchain image)
//!       │     └─ GraphicsPipeline (PipelineLayout, DescriptorSetLayout, Shaders)
//!       ├─ Buffer / VertexBuffer / IndexBuffer / UniformBuffer
//!       ├─ Image (memory, view, sampler)
//!       ├─ CommandPool
//!       │  └─ CommandBuffers (retain what they record)
//!       ├─ DescriptorSetPool
//!       │  └─ DescriptorSets (retain what they are written with)
//!       └─ Semaphore
//! ```
//!
//! All API calls go through the [`driver`] traits. [`Instance::new`] uses
//! the `ash` implementation; tests pass a `driver::fake::FakeInstance` to
//! [`Instance::from_driver`] and run the same code without a GPU.
//!
//! Construction order for a frame loop: instance, surface, device,
//! swapchain, render pass, pipeline, buffers and images, then
//! [`FrameResources`] and [`FrameLoop`].
#![deny(unsafe_op_in_unsafe_fn)]

mod buffer;
mod command;
mod descriptor;
mod device;
pub mod driver;
mod error;
mod frame;
mod framebuffer;
mod image;
mod instance;
mod memory;
mod pipeline;
mod render_pass;
mod scoped;
mod shader;
mod surface;
mod swapchain;
mod sync;

pub use ash;

pub use buffer::{Buffer, IndexBuffer, UniformBuffer, VertexBuffer};
pub use command::{CommandBuffers, CommandPool};
pub use descriptor::{BoundResource, DescriptorSetLayout, DescriptorSetPool, DescriptorSets};
pub use device::{select_adapter, AdapterSelection, Device, QueueFamilies};
pub use driver::{DescriptorBinding, DescriptorWrite};
pub use error::{Error, Result};
pub use frame::{DrawCommand, FrameLoop, FrameResources, FrameState};
pub use framebuffer::Framebuffer;
pub use image::{transition_masks, Image, LayoutTransition};
pub use instance::{Instance, InstanceConfig};
pub use memory::{find_memory_type, MemoryUsage};
pub use pipeline::{
    ColorBlendState, FixedFunctionState, GraphicsPipeline, GraphicsPipelineBuilder,
    InputAssemblyState, MultisampleState, PipelineLayout, RasterizationState, Scissor, Stages,
    VertexAttribute, VertexBinding, VertexInputState, Viewport, ViewportState,
};
pub use render_pass::RenderPass;
pub use shader::Shader;
pub use surface::Surface;
pub use swapchain::{
    choose_extent, choose_image_count, choose_present_mode, choose_surface_format, SwapChain,
    VsyncMode,
};
pub use sync::Semaphore;
