// SPDX-License-Identifier: CEPL-1.0
//! Graphics pipelines and their builder.
//!
//! Each fixed-function stage is a plain value type with defaults matching
//! the common case (triangle list, filled polygons, back-face culling,
//! clockwise front faces, one sample, blending off). The builder collects
//! them in any order; [`GraphicsPipelineBuilder::build`] refuses to run
//! until every required stage is present.

use std::fmt;
use std::sync::Arc;

use ash::vk;
use bitflags::bitflags;
use tracing::{debug, info};

use crate::descriptor::DescriptorSetLayout;
use crate::device::Device;
use crate::driver::{DescriptorBinding, GraphicsPipelineDesc};
use crate::error::{Checked, Error, Result};
use crate::render_pass::RenderPass;
use crate::shader::Shader;
use crate::swapchain::SwapChain;

bitflags! {
    /// Builder stages, used to report what is still missing.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Stages: u16 {
        const VERTEX_SHADER = 1 << 0;
        const FRAGMENT_SHADER = 1 << 1;
        const VERTEX_INPUT = 1 << 2;
        const INPUT_ASSEMBLY = 1 << 3;
        const VIEWPORT = 1 << 4;
        const RASTERIZATION = 1 << 5;
        const MULTISAMPLE = 1 << 6;
        const COLOR_BLEND = 1 << 7;
        const DYNAMIC_STATE = 1 << 8;
        const DESCRIPTOR_BINDINGS = 1 << 9;

        const REQUIRED = Self::VERTEX_SHADER.bits()
            | Self::FRAGMENT_SHADER.bits()
            | Self::VERTEX_INPUT.bits()
            | Self::INPUT_ASSEMBLY.bits()
            | Self::VIEWPORT.bits()
            | Self::RASTERIZATION.bits()
            | Self::MULTISAMPLE.bits()
            | Self::COLOR_BLEND.bits();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBinding {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: vk::VertexInputRate,
}

impl VertexBinding {
    pub fn per_vertex(binding: u32, stride: u32) -> Self {
        Self {
            binding,
            stride,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: vk::Format,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VertexInputState {
    pub bindings: Vec<VertexBinding>,
    pub attributes: Vec<VertexAttribute>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputAssemblyState {
    pub topology: vk::PrimitiveTopology,
    pub primitive_restart: bool,
}

impl Default for InputAssemblyState {
    fn default() -> Self {
        Self {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            primitive_restart: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scissor {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportState {
    pub viewport: Viewport,
    pub scissor: Scissor,
}

impl ViewportState {
    /// A `width` x `height` viewport at the origin with depth 0..1, and a
    /// scissor covering `extent`.
    pub fn new(width: f32, height: f32, extent: vk::Extent2D) -> Self {
        Self {
            viewport: Viewport {
                x: 0.0,
                y: 0.0,
                width,
                height,
                min_depth: 0.0,
                max_depth: 1.0,
            },
            scissor: Scissor {
                x: 0,
                y: 0,
                width: extent.width,
                height: extent.height,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizationState {
    pub depth_clamp: bool,
    pub rasterizer_discard: bool,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub line_width: f32,
}

impl Default for RasterizationState {
    fn default() -> Self {
        Self {
            depth_clamp: false,
            rasterizer_discard: false,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::CLOCKWISE,
            line_width: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MultisampleState {
    pub samples: vk::SampleCountFlags,
    pub sample_shading: bool,
    pub min_sample_shading: f32,
    pub alpha_to_coverage: bool,
    pub alpha_to_one: bool,
}

impl Default for MultisampleState {
    fn default() -> Self {
        Self {
            samples: vk::SampleCountFlags::TYPE_1,
            sample_shading: false,
            min_sample_shading: 1.0,
            alpha_to_coverage: false,
            alpha_to_one: false,
        }
    }
}

/// Blend state for the single colour attachment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorBlendState {
    pub blend_enable: bool,
    pub src_color_factor: vk::BlendFactor,
    pub dst_color_factor: vk::BlendFactor,
    pub color_op: vk::BlendOp,
    pub src_alpha_factor: vk::BlendFactor,
    pub dst_alpha_factor: vk::BlendFactor,
    pub alpha_op: vk::BlendOp,
    pub write_mask: vk::ColorComponentFlags,
    pub logic_op: Option<vk::LogicOp>,
    pub blend_constants: [f32; 4],
}

impl Default for ColorBlendState {
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_color_factor: vk::BlendFactor::ONE,
            dst_color_factor: vk::BlendFactor::ZERO,
            color_op: vk::BlendOp::ADD,
            src_alpha_factor: vk::BlendFactor::ONE,
            dst_alpha_factor: vk::BlendFactor::ZERO,
            alpha_op: vk::BlendOp::ADD,
            write_mask: vk::ColorComponentFlags::RGBA,
            logic_op: None,
            blend_constants: [0.0; 4],
        }
    }
}

/// Everything a pipeline was built with besides shaders and layouts.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedFunctionState {
    pub vertex_input: VertexInputState,
    pub input_assembly: InputAssemblyState,
    pub viewport: ViewportState,
    pub rasterization: RasterizationState,
    pub multisample: MultisampleState,
    pub color_blend: ColorBlendState,
    pub dynamic_states: Vec<vk::DynamicState>,
}

pub struct PipelineLayout {
    device: Arc<Device>,
    set_layouts: Vec<Arc<DescriptorSetLayout>>,
    handle: vk::PipelineLayout,
}

impl PipelineLayout {
    pub fn new(device: &Arc<Device>, set_layouts: &[Arc<DescriptorSetLayout>]) -> Result<Arc<Self>> {
        let raw: Vec<_> = set_layouts.iter().map(|l| l.raw_layout()).collect();
        // SAFETY: the set layouts are retained below.
        let handle = unsafe { device.driver().create_pipeline_layout(&raw) }
            .check("vkCreatePipelineLayout")?;
        Ok(Arc::new(Self {
            device: Arc::clone(device),
            set_layouts: set_layouts.to_vec(),
            handle,
        }))
    }

    pub fn raw_layout(&self) -> vk::PipelineLayout {
        self.handle
    }

    pub fn set_layouts(&self) -> &[Arc<DescriptorSetLayout>] {
        &self.set_layouts
    }
}

impl fmt::Debug for PipelineLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineLayout")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        debug!("Dropping pipeline layout {:?}", self.handle);
        // SAFETY: pipelines and bound command buffers hold an Arc.
        unsafe { self.device.driver().destroy_pipeline_layout(self.handle) };
    }
}

pub struct GraphicsPipeline {
    device: Arc<Device>,
    render_pass: Arc<RenderPass>,
    layout: Arc<PipelineLayout>,
    set_layout: Arc<DescriptorSetLayout>,
    _shaders: [Arc<Shader>; 2],
    handle: vk::Pipeline,
    state: FixedFunctionState,
}

impl GraphicsPipeline {
    pub fn raw_pipeline(&self) -> vk::Pipeline {
        self.handle
    }

    pub fn layout(&self) -> &Arc<PipelineLayout> {
        &self.layout
    }

    pub fn descriptor_set_layout(&self) -> &Arc<DescriptorSetLayout> {
        &self.set_layout
    }

    pub fn render_pass(&self) -> &Arc<RenderPass> {
        &self.render_pass
    }

    pub fn state(&self) -> &FixedFunctionState {
        &self.state
    }
}

impl fmt::Debug for GraphicsPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphicsPipeline")
            .field("handle", &self.handle)
            .field("layout", &self.layout.raw_layout())
            .finish_non_exhaustive()
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        debug!("Dropping graphics pipeline {:?}", self.handle);
        // SAFETY: command buffers that bind this pipeline hold an Arc.
        unsafe { self.device.driver().destroy_pipeline(self.handle) };
    }
}

/// Collects shaders, fixed-function state and descriptor bindings, then
/// creates the set layout, pipeline layout and pipeline together.
pub struct GraphicsPipelineBuilder {
    device: Arc<Device>,
    render_pass: Arc<RenderPass>,
    vertex_shader: Option<Arc<Shader>>,
    fragment_shader: Option<Arc<Shader>>,
    vertex_input: Option<VertexInputState>,
    input_assembly: Option<InputAssemblyState>,
    viewport: Option<ViewportState>,
    rasterization: Option<RasterizationState>,
    multisample: Option<MultisampleState>,
    color_blend: Option<ColorBlendState>,
    dynamic_states: Vec<vk::DynamicState>,
    bindings: Vec<DescriptorBinding>,
}

impl GraphicsPipelineBuilder {
    pub fn new(device: &Arc<Device>, render_pass: &Arc<RenderPass>) -> Self {
        Self {
            device: Arc::clone(device),
            render_pass: Arc::clone(render_pass),
            vertex_shader: None,
            fragment_shader: None,
            vertex_input: None,
            input_assembly: None,
            viewport: None,
            rasterization: None,
            multisample: None,
            color_blend: None,
            dynamic_states: Vec::new(),
            bindings: Vec::new(),
        }
    }

    pub fn vertex_shader(&mut self, shader: &Arc<Shader>) -> &mut Self {
        self.vertex_shader = Some(Arc::clone(shader));
        self
    }

    pub fn fragment_shader(&mut self, shader: &Arc<Shader>) -> &mut Self {
        self.fragment_shader = Some(Arc::clone(shader));
        self
    }

    /// One vertex binding and its attributes.
    pub fn vertex_input(&mut self, binding: VertexBinding, attributes: &[VertexAttribute]) -> &mut Self {
        self.vertex_input_with(VertexInputState {
            bindings: vec![binding],
            attributes: attributes.to_vec(),
        })
    }

    pub fn vertex_input_with(&mut self, state: VertexInputState) -> &mut Self {
        self.vertex_input = Some(state);
        self
    }

    pub fn input_assembly(&mut self) -> &mut Self {
        self.input_assembly_with(InputAssemblyState::default())
    }

    pub fn input_assembly_with(&mut self, state: InputAssemblyState) -> &mut Self {
        self.input_assembly = Some(state);
        self
    }

    /// Viewport of `width` x `height`, scissor covering the swapchain.
    pub fn viewport(&mut self, swapchain: &SwapChain, width: f32, height: f32) -> &mut Self {
        self.viewport_with(ViewportState::new(width, height, swapchain.extent()))
    }

    pub fn viewport_with(&mut self, state: ViewportState) -> &mut Self {
        self.viewport = Some(state);
        self
    }

    pub fn rasterization(&mut self) -> &mut Self {
        self.rasterization_with(RasterizationState::default())
    }

    pub fn rasterization_with(&mut self, state: RasterizationState) -> &mut Self {
        self.rasterization = Some(state);
        self
    }

    pub fn multisample(&mut self) -> &mut Self {
        self.multisample_with(MultisampleState::default())
    }

    pub fn multisample_with(&mut self, state: MultisampleState) -> &mut Self {
        self.multisample = Some(state);
        self
    }

    pub fn color_blend(&mut self) -> &mut Self {
        self.color_blend_with(ColorBlendState::default())
    }

    pub fn color_blend_with(&mut self, state: ColorBlendState) -> &mut Self {
        self.color_blend = Some(state);
        self
    }

    pub fn dynamic_state(&mut self, states: &[vk::DynamicState]) -> &mut Self {
        self.dynamic_states = states.to_vec();
        self
    }

    pub fn descriptor_binding(&mut self, binding: DescriptorBinding) -> &mut Self {
        self.bindings.push(binding);
        self
    }

    /// Stages configured so far.
    pub fn configured(&self) -> Stages {
        let mut stages = Stages::empty();
        stages.set(Stages::VERTEX_SHADER, self.vertex_shader.is_some());
        stages.set(Stages::FRAGMENT_SHADER, self.fragment_shader.is_some());
        stages.set(Stages::VERTEX_INPUT, self.vertex_input.is_some());
        stages.set(Stages::INPUT_ASSEMBLY, self.input_assembly.is_some());
        stages.set(Stages::VIEWPORT, self.viewport.is_some());
        stages.set(Stages::RASTERIZATION, self.rasterization.is_some());
        stages.set(Stages::MULTISAMPLE, self.multisample.is_some());
        stages.set(Stages::COLOR_BLEND, self.color_blend.is_some());
        stages.set(Stages::DYNAMIC_STATE, !self.dynamic_states.is_empty());
        stages.set(Stages::DESCRIPTOR_BINDINGS, !self.bindings.is_empty());
        stages
    }

    pub fn missing(&self) -> Stages {
        Stages::REQUIRED.difference(self.configured())
    }

    pub fn build(&self) -> Result<Arc<GraphicsPipeline>> {
        let (
            Some(vertex_shader),
            Some(fragment_shader),
            Some(vertex_input),
            Some(input_assembly),
            Some(viewport),
            Some(rasterization),
            Some(multisample),
            Some(color_blend),
        ) = (
            &self.vertex_shader,
            &self.fragment_shader,
            &self.vertex_input,
            self.input_assembly,
            self.viewport,
            self.rasterization,
            self.multisample,
            self.color_blend,
        )
        else {
            return Err(Error::MissingStages(self.missing()));
        };

        let state = FixedFunctionState {
            vertex_input: vertex_input.clone(),
            input_assembly,
            viewport,
            rasterization,
            multisample,
            color_blend,
            dynamic_states: self.dynamic_states.clone(),
        };
        let set_layout = DescriptorSetLayout::new(&self.device, &self.bindings)?;
        let layout = PipelineLayout::new(&self.device, std::slice::from_ref(&set_layout))?;
        let desc = GraphicsPipelineDesc {
            vertex_shader: vertex_shader.raw_module(),
            fragment_shader: fragment_shader.raw_module(),
            state: &state,
            layout: layout.raw_layout(),
            render_pass: self.render_pass.raw_render_pass(),
        };
        // SAFETY: every handle in `desc` is owned by an Arc retained below.
        let handle = unsafe { self.device.driver().create_graphics_pipeline(&desc) }
            .check("vkCreateGraphicsPipelines")?;
        info!(
            "Graphics pipeline created ({} vertex attributes, {} descriptor bindings)",
            state.vertex_input.attributes.len(),
            self.bindings.len()
        );
        Ok(Arc::new(GraphicsPipeline {
            device: Arc::clone(&self.device),
            render_pass: Arc::clone(&self.render_pass),
            layout,
            set_layout,
            _shaders: [Arc::clone(vertex_shader), Arc::clone(fragment_shader)],
            handle,
            state,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_common_case() {
        let raster = RasterizationState::default();
        assert_eq!(raster.polygon_mode, vk::PolygonMode::FILL);
        assert_eq!(raster.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(raster.front_face, vk::FrontFace::CLOCKWISE);
        assert_eq!(raster.line_width, 1.0);

        let ms = MultisampleState::default();
        assert_eq!(ms.samples, vk::SampleCountFlags::TYPE_1);
        assert!(!ms.sample_shading);

        let blend = ColorBlendState::default();
        assert!(!blend.blend_enable);
        assert_eq!(blend.write_mask, vk::ColorComponentFlags::RGBA);
        assert_eq!(blend.logic_op, None);

        assert_eq!(
            InputAssemblyState::default().topology,
            vk::PrimitiveTopology::TRIANGLE_LIST
        );
    }

    #[test]
    fn required_excludes_optional_stages() {
        assert!(!Stages::REQUIRED.contains(Stages::DYNAMIC_STATE));
        assert!(!Stages::REQUIRED.contains(Stages::DESCRIPTOR_BINDINGS));
        assert_eq!(Stages::REQUIRED.iter().count(), 8);
    }

    #[test]
    fn viewport_state_covers_extent() {
        let vp = ViewportState::new(
            640.0,
            480.0,
            vk::Extent2D {
                width: 800,
                height: 600,
            },
        );
        assert_eq!(vp.viewport.width, 640.0);
        assert_eq!(vp.viewport.max_depth, 1.0);
        assert_eq!((vp.scissor.width, vp.scissor.height), (800, 600));
    }
}
