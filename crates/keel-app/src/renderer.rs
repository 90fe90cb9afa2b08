// SPDX-License-Identifier: CEPL-1.0
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use keel_math::Transforms;
use keel_platform::drawable_size;
use keel_platform::winit::window::Window;
use keel_render::{load_rgba8, DecodedImage, RenderSize};
use keel_render_vk::ash::vk;
use keel_render_vk::{
    CommandPool, Device, DrawCommand, FrameLoop, FrameResources, GraphicsPipelineBuilder, Image,
    IndexBuffer, Instance, InstanceConfig, RasterizationState, RenderPass, Shader, Surface,
    SwapChain, UniformBuffer, VertexBuffer,
};
use tracing::{info, warn};

use crate::config::AppCfg;
use crate::mesh::{Vertex, QUAD_INDICES, QUAD_VERTICES};

/// Textured quad spinning about +Z, one frame in flight.
pub struct QuadRenderer {
    frame_loop: FrameLoop,
    resources: FrameResources,
    device: Arc<Device>,
    size: RenderSize,
    started: Instant,
}

impl QuadRenderer {
    pub fn new(window: Arc<Window>, cfg: &AppCfg) -> Result<Self> {
        let instance_cfg = InstanceConfig {
            app_name: cfg.window.title.clone(),
            validation: cfg.render.validation,
        };
        let instance = Instance::new(&instance_cfg, window.as_ref()).context("creating instance")?;
        let size = drawable_size(&window);
        let surface = Surface::new(&instance, window).context("creating surface")?;
        let device = Device::new(&instance, &surface).context("creating device")?;

        let extent = vk::Extent2D {
            width: size.width,
            height: size.height,
        };
        let swapchain = SwapChain::new(&device, extent, cfg.render.vsync_mode.into())
            .context("creating swapchain")?;
        let render_pass = RenderPass::new(&device, &swapchain).context("creating render pass")?;

        let (vert, frag) = shader_bytes(cfg.assets.shader_dir.as_deref())?;
        let vert = Shader::from_spirv(&device, &vert).context("vertex shader")?;
        let frag = Shader::from_spirv(&device, &frag).context("fragment shader")?;

        let viewport = swapchain.extent();
        let pipeline = GraphicsPipelineBuilder::new(&device, &render_pass)
            .vertex_shader(&vert)
            .fragment_shader(&frag)
            .vertex_input(Vertex::binding(), &Vertex::attributes())
            .input_assembly()
            .viewport(&swapchain, viewport.width as f32, viewport.height as f32)
            // The flipped projection turns the quad's winding around.
            .rasterization_with(RasterizationState {
                front_face: vk::FrontFace::COUNTER_CLOCKWISE,
                ..Default::default()
            })
            .multisample()
            .color_blend()
            .descriptor_binding(UniformBuffer::layout_binding(0))
            .descriptor_binding(Image::layout_binding(1))
            .build()
            .context("building pipeline")?;

        let pool = CommandPool::new(&device).context("creating command pool")?;
        let texture = match &cfg.assets.texture {
            Some(path) => load_rgba8(path)?,
            None => DecodedImage::checkerboard(256, 256, 32),
        };
        let texture = Image::create(
            &device,
            &pool,
            &texture.pixels,
            texture.width,
            texture.height,
        )
        .context("uploading texture")?;

        let vertex_buffer = VertexBuffer::device_local(&device, &pool, &QUAD_VERTICES)
            .context("uploading vertices")?;
        let index_buffer = IndexBuffer::device_local(&device, &pool, &QUAD_INDICES)
            .context("uploading indices")?;

        let mut resources = FrameResources::new(
            &device,
            &swapchain,
            &render_pass,
            &pipeline,
            &pool,
            Transforms::SIZE,
            &texture,
        )
        .context("creating frame resources")?;
        resources
            .record(
                &DrawCommand {
                    vertex_buffer,
                    index_buffer,
                    index_type: vk::IndexType::UINT16,
                    index_count: QUAD_INDICES.len() as u32,
                },
                cfg.render.clear_color,
            )
            .context("recording draw commands")?;

        let frame_loop = FrameLoop::new(&device, &swapchain).context("creating frame sync")?;
        info!(
            "renderer ready ({} swapchain images, {:?})",
            resources.image_count(),
            swapchain.present_mode()
        );

        Ok(Self {
            frame_loop,
            resources,
            device,
            size,
            started: Instant::now(),
        })
    }

    /// Acquires, submits and presents one frame, updating that image's
    /// uniform buffer after submission.
    pub fn render(&mut self) -> Result<u32> {
        let secs = self.started.elapsed().as_secs_f32();
        let transforms = Transforms::spinning(secs, self.size.aspect());
        let resources = &self.resources;
        let index = self
            .frame_loop
            .draw_frame(resources.commands(), |i| {
                resources.uniform_buffer(i)?.fill_pod(&transforms)
            })
            .with_context(|| format!("frame failed in {:?}", self.frame_loop.state()))?;
        Ok(index)
    }

    pub fn frames_presented(&self) -> u64 {
        self.frame_loop.frames_presented()
    }

    pub fn wait_idle(&self) -> Result<()> {
        Ok(self.device.wait_idle()?)
    }
}

impl Drop for QuadRenderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            warn!("wait_idle before teardown failed: {e}");
        }
    }
}

#[cfg(embedded_shaders)]
fn shader_bytes(_dir: Option<&Path>) -> Result<(Vec<u8>, Vec<u8>)> {
    Ok((
        include_bytes!(concat!(env!("OUT_DIR"), "/quad.vert.spv")).to_vec(),
        include_bytes!(concat!(env!("OUT_DIR"), "/quad.frag.spv")).to_vec(),
    ))
}

#[cfg(not(embedded_shaders))]
fn shader_bytes(dir: Option<&Path>) -> Result<(Vec<u8>, Vec<u8>)> {
    let dir = dir.unwrap_or(Path::new("shaders"));
    Ok((
        keel_render::load_spirv(dir.join("quad.vert.spv"))?,
        keel_render::load_spirv(dir.join("quad.frag.spv"))?,
    ))
}
