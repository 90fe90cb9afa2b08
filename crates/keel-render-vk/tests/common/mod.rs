// SPDX-License-Identifier: CEPL-1.0
//! Fixtures shared by the integration tests. Everything runs on the fake
//! driver.
#![allow(dead_code)]

use std::sync::Arc;

use keel_render_vk::ash::vk;
use keel_render_vk::driver::fake::{FakeConfig, FakeInstance, FakeLog, FakeWindow};
use keel_render_vk::{
    CommandPool, Device, GraphicsPipeline, GraphicsPipelineBuilder, Image, IndexBuffer, Instance,
    RenderPass, Shader, Surface, SwapChain, UniformBuffer, VertexAttribute, VertexBinding,
    VertexBuffer, VsyncMode,
};

pub const DRAWABLE: vk::Extent2D = vk::Extent2D {
    width: 800,
    height: 600,
};

/// SPIR-V magic and version; the fake driver never parses the body.
pub const SPIRV_STUB: [u32; 5] = [0x0723_0203, 0x0001_0000, 0, 1, 0];

pub const UNIFORM_SIZE: vk::DeviceSize = 3 * 64;

pub fn instance(config: FakeConfig) -> (FakeLog, Arc<Instance>) {
    let driver = FakeInstance::new(config);
    let log = driver.log();
    (log, Instance::from_driver(Box::new(driver), false))
}

pub fn device(config: FakeConfig) -> (FakeLog, Arc<Device>) {
    let (log, instance) = instance(config);
    let surface = Surface::new(&instance, Arc::new(FakeWindow)).unwrap();
    let device = Device::new(&instance, &surface).unwrap();
    (log, device)
}

pub fn swapchain(device: &Arc<Device>) -> Arc<SwapChain> {
    SwapChain::new(device, DRAWABLE, VsyncMode::Mailbox).unwrap()
}

pub fn shader(device: &Arc<Device>) -> Arc<Shader> {
    Shader::from_words(device, &SPIRV_STUB).unwrap()
}

/// Position (vec2), colour (vec3), texture coordinate (vec2).
pub fn quad_vertex_input() -> (VertexBinding, [VertexAttribute; 3]) {
    (
        VertexBinding::per_vertex(0, 28),
        [
            VertexAttribute {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: 0,
            },
            VertexAttribute {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 8,
            },
            VertexAttribute {
                location: 2,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: 20,
            },
        ],
    )
}

/// A builder with every stage configured, in the usual call order.
pub fn configured_builder(
    device: &Arc<Device>,
    swapchain: &Arc<SwapChain>,
    render_pass: &Arc<RenderPass>,
) -> GraphicsPipelineBuilder {
    let (binding, attributes) = quad_vertex_input();
    let extent = swapchain.extent();
    let mut builder = GraphicsPipelineBuilder::new(device, render_pass);
    builder
        .vertex_shader(&shader(device))
        .fragment_shader(&shader(device))
        .vertex_input(binding, &attributes)
        .input_assembly()
        .viewport(swapchain, extent.width as f32, extent.height as f32)
        .rasterization()
        .multisample()
        .color_blend()
        .descriptor_binding(UniformBuffer::layout_binding(0))
        .descriptor_binding(Image::layout_binding(1));
    builder
}

pub fn checkerboard(width: u32, height: u32) -> Vec<u8> {
    (0..width * height)
        .flat_map(|i| {
            if (i % width + i / width) % 2 == 0 {
                [255, 255, 255, 255]
            } else {
                [0, 0, 0, 255]
            }
        })
        .collect()
}

/// Everything up to, but not including, per-frame resources.
pub struct Scene {
    pub log: FakeLog,
    pub device: Arc<Device>,
    pub swapchain: Arc<SwapChain>,
    pub render_pass: Arc<RenderPass>,
    pub pipeline: Arc<GraphicsPipeline>,
    pub pool: Arc<CommandPool>,
    pub texture: Arc<Image>,
    pub vertex_buffer: Arc<VertexBuffer>,
    pub index_buffer: Arc<IndexBuffer>,
}

pub fn scene(config: FakeConfig) -> Scene {
    let (log, device) = device(config);
    let swapchain = swapchain(&device);
    let render_pass = RenderPass::new(&device, &swapchain).unwrap();
    let pipeline = configured_builder(&device, &swapchain, &render_pass)
        .build()
        .unwrap();
    let pool = CommandPool::new(&device).unwrap();
    let texture = Image::create(&device, &pool, &checkerboard(4, 4), 4, 4).unwrap();
    let vertices: [f32; 28] = [
        -0.5, -0.5, 1.0, 0.0, 0.0, 1.0, 0.0, //
        0.5, -0.5, 0.0, 1.0, 0.0, 0.0, 0.0, //
        0.5, 0.5, 0.0, 0.0, 1.0, 0.0, 1.0, //
        -0.5, 0.5, 1.0, 1.0, 1.0, 1.0, 1.0,
    ];
    let vertex_buffer = VertexBuffer::device_local(&device, &pool, &vertices).unwrap();
    let index_buffer = IndexBuffer::device_local(&device, &pool, &[0u16, 1, 2, 2, 3, 0]).unwrap();
    Scene {
        log,
        device,
        swapchain,
        render_pass,
        pipeline,
        pool,
        texture,
        vertex_buffer,
        index_buffer,
    }
}
