// SPDX-License-Identifier: CEPL-1.0
//! Pipeline builder tests
//!
//! Tests for:
//! - Order independence of the fixed-function stages
//! - MissingStages reporting, with nothing created on failure
//! - What a built pipeline owns

mod common;

use common::{configured_builder, device, quad_vertex_input, shader, swapchain};
use keel_render_vk::ash::vk::{self, Handle};
use keel_render_vk::driver::fake::{Event, FakeConfig, ObjectKind};
use keel_render_vk::{
    ColorBlendState, Error, GraphicsPipelineBuilder, Image, MultisampleState, RasterizationState,
    RenderPass, Stages, UniformBuffer,
};

// ============================================================================
// Order independence
// ============================================================================

#[test]
fn stage_order_does_not_change_the_state_block() {
    let (log, device) = device(FakeConfig::default());
    let swapchain = swapchain(&device);
    let render_pass = RenderPass::new(&device, &swapchain).unwrap();
    let (binding, attributes) = quad_vertex_input();

    let raster = RasterizationState {
        cull_mode: vk::CullModeFlags::NONE,
        front_face: vk::FrontFace::COUNTER_CLOCKWISE,
        ..Default::default()
    };
    let multisample = MultisampleState {
        samples: vk::SampleCountFlags::TYPE_4,
        ..Default::default()
    };
    let blend = ColorBlendState {
        blend_enable: true,
        src_color_factor: vk::BlendFactor::SRC_ALPHA,
        dst_color_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        ..Default::default()
    };

    let vs = shader(&device);
    let fs = shader(&device);
    let base = |builder: &mut GraphicsPipelineBuilder| {
        builder
            .vertex_shader(&vs)
            .fragment_shader(&fs)
            .vertex_input(binding, &attributes)
            .input_assembly()
            .viewport(&swapchain, 800.0, 600.0)
            .descriptor_binding(UniformBuffer::layout_binding(0));
    };

    let mut forward = GraphicsPipelineBuilder::new(&device, &render_pass);
    base(&mut forward);
    forward
        .rasterization_with(raster)
        .multisample_with(multisample)
        .color_blend_with(blend);

    let mut reversed = GraphicsPipelineBuilder::new(&device, &render_pass);
    reversed
        .color_blend_with(blend)
        .multisample_with(multisample)
        .rasterization_with(raster);
    base(&mut reversed);

    let a = forward.build().unwrap();
    let b = reversed.build().unwrap();

    assert_eq!(a.state(), b.state());
    assert_eq!(a.state().rasterization, raster);
    assert_eq!(a.state().multisample, multisample);
    assert_eq!(a.state().color_blend, blend);
    let states = log.pipeline_states();
    assert_eq!(states.len(), 2);
    assert_eq!(states[0], states[1]);
}

// ============================================================================
// Missing stages
// ============================================================================

#[test]
fn missing_stage_is_named() {
    let (log, device) = device(FakeConfig::default());
    let swapchain = swapchain(&device);
    let render_pass = RenderPass::new(&device, &swapchain).unwrap();
    let (binding, attributes) = quad_vertex_input();

    let mut builder = GraphicsPipelineBuilder::new(&device, &render_pass);
    builder
        .vertex_shader(&shader(&device))
        .fragment_shader(&shader(&device))
        .vertex_input(binding, &attributes)
        .input_assembly()
        .viewport(&swapchain, 800.0, 600.0)
        .multisample()
        .color_blend();

    assert_eq!(builder.missing(), Stages::RASTERIZATION);
    let err = builder.build().unwrap_err();
    assert!(matches!(err, Error::MissingStages(s) if s == Stages::RASTERIZATION));
    assert!(err.to_string().contains("RASTERIZATION"));

    assert_eq!(log.created(ObjectKind::DescriptorSetLayout), 0);
    assert_eq!(log.created(ObjectKind::PipelineLayout), 0);
    assert_eq!(log.created(ObjectKind::Pipeline), 0);
}

#[test]
fn empty_builder_reports_every_required_stage() {
    let (_log, device) = device(FakeConfig::default());
    let swapchain = swapchain(&device);
    let render_pass = RenderPass::new(&device, &swapchain).unwrap();

    let mut builder = GraphicsPipelineBuilder::new(&device, &render_pass);
    assert_eq!(builder.configured(), Stages::empty());
    assert!(matches!(builder.build(), Err(Error::MissingStages(s)) if s == Stages::REQUIRED));

    builder
        .vertex_shader(&shader(&device))
        .fragment_shader(&shader(&device));
    assert_eq!(
        builder.missing(),
        Stages::REQUIRED - Stages::VERTEX_SHADER - Stages::FRAGMENT_SHADER
    );
}

#[test]
fn optional_stages_are_tracked_but_not_required() {
    let (_log, device) = device(FakeConfig::default());
    let swapchain = swapchain(&device);
    let render_pass = RenderPass::new(&device, &swapchain).unwrap();
    let mut builder = configured_builder(&device, &swapchain, &render_pass);
    builder.dynamic_state(&[vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR]);

    assert!(builder.missing().is_empty());
    assert!(builder
        .configured()
        .contains(Stages::DYNAMIC_STATE | Stages::DESCRIPTOR_BINDINGS));
    let pipeline = builder.build().unwrap();
    assert_eq!(
        pipeline.state().dynamic_states,
        vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR]
    );
}

// ============================================================================
// Ownership
// ============================================================================

#[test]
fn pipeline_owns_layouts_and_keeps_shaders() {
    let (log, device) = device(FakeConfig::default());
    let swapchain = swapchain(&device);
    let render_pass = RenderPass::new(&device, &swapchain).unwrap();

    let pipeline = configured_builder(&device, &swapchain, &render_pass)
        .build()
        .unwrap();

    assert_eq!(
        pipeline.descriptor_set_layout().bindings(),
        &[UniformBuffer::layout_binding(0), Image::layout_binding(1)]
    );
    assert_eq!(pipeline.layout().set_layouts().len(), 1);
    assert_eq!(log.live(ObjectKind::ShaderModule), 2);
    assert_eq!(log.live(ObjectKind::DescriptorSetLayout), 1);

    let pipeline_handle = pipeline.raw_pipeline();
    let layout_handle = pipeline.layout().raw_layout();
    drop(pipeline);

    assert_eq!(log.live(ObjectKind::Pipeline), 0);
    assert_eq!(log.live(ObjectKind::PipelineLayout), 0);
    assert_eq!(log.live(ObjectKind::DescriptorSetLayout), 0);
    assert_eq!(log.live(ObjectKind::ShaderModule), 0);

    let pipeline_gone = log
        .position(Event::Destroyed(ObjectKind::Pipeline, pipeline_handle.as_raw()))
        .unwrap();
    let layout_gone = log
        .position(Event::Destroyed(ObjectKind::PipelineLayout, layout_handle.as_raw()))
        .unwrap();
    assert!(pipeline_gone < layout_gone);
}
