// SPDX-License-Identifier: CEPL-1.0
//! Frame resources and the frame loop
//!
//! Tests for:
//! - One framebuffer, uniform buffer, descriptor set and command buffer per image
//! - Descriptor set `i` referencing uniform buffer `i`
//! - Pre-recorded command contents
//! - Acquire/submit/present cycling, including a fixed acquire index
//! - State left behind by a failed step

mod common;

use common::{scene, Scene, UNIFORM_SIZE};
use keel_render_vk::ash::vk;
use keel_render_vk::driver::fake::{Command, FakeConfig};
use keel_render_vk::driver::{DescriptorResource, RenderPassBegin};
use keel_render_vk::{DrawCommand, Error, FrameLoop, FrameResources, FrameState};

const CLEAR: [f32; 4] = [0.02, 0.02, 0.04, 1.0];

fn frame_resources(scene: &Scene) -> FrameResources {
    FrameResources::new(
        &scene.device,
        &scene.swapchain,
        &scene.render_pass,
        &scene.pipeline,
        &scene.pool,
        UNIFORM_SIZE,
        &scene.texture,
    )
    .unwrap()
}

fn draw(scene: &Scene) -> DrawCommand {
    DrawCommand {
        vertex_buffer: scene.vertex_buffer.clone(),
        index_buffer: scene.index_buffer.clone(),
        index_type: vk::IndexType::UINT16,
        index_count: 6,
    }
}

// ============================================================================
// Per-image resources
// ============================================================================

#[test]
fn one_of_each_per_swapchain_image() {
    let scene = scene(FakeConfig::default().with_image_count(4));
    let resources = frame_resources(&scene);

    assert_eq!(scene.swapchain.image_count(), 4);
    assert_eq!(resources.image_count(), 4);
    assert_eq!(resources.framebuffers().len(), 4);
    assert_eq!(resources.uniform_buffers().len(), 4);
    assert_eq!(resources.descriptor_sets().len(), 4);
    assert_eq!(resources.commands().len(), 4);

    for (i, framebuffer) in resources.framebuffers().iter().enumerate() {
        assert_eq!(framebuffer.image_index(), i);
    }
    assert!(matches!(
        resources.uniform_buffer(4),
        Err(Error::IndexOutOfRange { index: 4, len: 4, .. })
    ));
}

#[test]
fn set_i_references_uniform_buffer_i_and_the_texture() {
    let scene = scene(FakeConfig::default());
    let resources = frame_resources(&scene);
    let writes = scene.log.descriptor_writes();

    for i in 0..resources.image_count() {
        let set = resources.descriptor_sets().raw_set(i).unwrap();
        let for_set: Vec<_> = writes
            .iter()
            .filter(|(s, _)| *s == set)
            .map(|(_, w)| *w)
            .collect();
        assert_eq!(for_set.len(), 2, "set {i}");

        let uniform = resources.uniform_buffer(i).unwrap();
        assert_eq!(for_set[0].binding, 0);
        assert_eq!(
            for_set[0].resource,
            DescriptorResource::UniformBuffer {
                buffer: uniform.raw_buffer(),
                range: UNIFORM_SIZE,
            }
        );
        assert_eq!(for_set[1].binding, 1);
        assert_eq!(
            for_set[1].resource,
            DescriptorResource::CombinedImageSampler {
                view: scene.texture.raw_view(),
                sampler: scene.texture.raw_sampler(),
                layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            }
        );
    }
}

#[test]
fn recorded_buffer_i_draws_framebuffer_i_with_set_i() {
    let scene = scene(FakeConfig::default());
    let mut resources = frame_resources(&scene);
    resources.record(&draw(&scene), CLEAR).unwrap();

    let layout = scene.pipeline.layout().raw_layout();
    for i in 0..resources.image_count() {
        let cb = resources.commands().raw(i).unwrap();
        let expected = vec![
            Command::BeginRenderPass(RenderPassBegin {
                render_pass: scene.render_pass.raw_render_pass(),
                framebuffer: resources.framebuffers()[i].raw_framebuffer(),
                extent: common::DRAWABLE,
                clear_color: CLEAR,
            }),
            Command::BindPipeline(scene.pipeline.raw_pipeline()),
            Command::BindVertexBuffer {
                binding: 0,
                buffer: scene.vertex_buffer.raw_buffer(),
            },
            Command::BindIndexBuffer {
                buffer: scene.index_buffer.raw_buffer(),
                index_type: vk::IndexType::UINT16,
            },
            Command::BindDescriptorSet {
                layout,
                set: resources.descriptor_sets().raw_set(i).unwrap(),
            },
            Command::DrawIndexed {
                index_count: 6,
                instance_count: 1,
            },
            Command::EndRenderPass,
        ];
        assert_eq!(scene.log.recorded(cb), expected, "command buffer {i}");
    }
}

// ============================================================================
// Frame loop
// ============================================================================

#[test]
fn thousand_frames_on_image_zero() {
    let scene = scene(FakeConfig::default().with_acquire_index(0));
    let mut resources = frame_resources(&scene);
    resources.record(&draw(&scene), CLEAR).unwrap();
    let mut frame_loop = FrameLoop::new(&scene.device, &scene.swapchain).unwrap();

    let mut updated = Vec::new();
    for frame in 0..1000u32 {
        let index = frame_loop
            .draw_frame(resources.commands(), |i| {
                updated.push(i);
                resources
                    .uniform_buffer(i)?
                    .fill_pod(&[frame as f32; 16])
            })
            .unwrap();
        assert_eq!(index, 0);
        assert_eq!(frame_loop.state(), FrameState::Idle);
    }

    assert_eq!(frame_loop.frames_presented(), 1000);
    assert_eq!(updated, vec![0; 1000]);
    let presents = scene.log.presents();
    assert_eq!(presents.len(), 1000);
    assert!(presents.iter().all(|&i| i == 0));

    let frame_cb = resources.commands().raw(0).unwrap();
    let frame_submits = scene
        .log
        .submissions()
        .into_iter()
        .filter(|s| s.desc.command_buffer == frame_cb)
        .count();
    assert_eq!(frame_submits, 1000);

    let last: [f32; 16] =
        bytemuck::pod_read_unaligned(&resources.uniform_buffer(0).unwrap().read_back().unwrap()[..64]);
    assert_eq!(last, [999.0; 16]);
}

#[test]
fn submission_waits_on_acquire_and_signals_present() {
    let scene = scene(FakeConfig::default());
    let mut resources = frame_resources(&scene);
    resources.record(&draw(&scene), CLEAR).unwrap();
    let mut frame_loop = FrameLoop::new(&scene.device, &scene.swapchain).unwrap();

    let index = frame_loop
        .draw_frame(resources.commands(), |_| Ok(()))
        .unwrap();
    let submission = scene.log.submissions().pop().unwrap();
    assert_eq!(submission.queue, scene.device.graphics_queue());
    assert_eq!(
        submission.desc.command_buffer,
        resources.commands().raw(index as usize).unwrap()
    );
    let (_, stage) = submission.desc.wait.unwrap();
    assert_eq!(stage, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
    assert!(submission.desc.signal.is_some());
    assert_ne!(submission.desc.wait.map(|w| w.0), submission.desc.signal);
}

#[test]
fn round_robin_acquire_cycles_every_image() {
    let scene = scene(FakeConfig::default());
    let mut resources = frame_resources(&scene);
    resources.record(&draw(&scene), CLEAR).unwrap();
    let mut frame_loop = FrameLoop::new(&scene.device, &scene.swapchain).unwrap();

    let count = resources.image_count() as u32;
    let indices: Vec<u32> = (0..2 * count)
        .map(|_| {
            frame_loop
                .draw_frame(resources.commands(), |_| Ok(()))
                .unwrap()
        })
        .collect();
    let expected: Vec<u32> = (0..2 * count).map(|i| i % count).collect();
    assert_eq!(indices, expected);
    assert_eq!(scene.log.presents(), expected);
}

#[test]
fn failed_acquire_stops_before_submit() {
    let scene = scene(FakeConfig::default().fail_on("vkAcquireNextImageKHR", 2));
    let mut resources = frame_resources(&scene);
    resources.record(&draw(&scene), CLEAR).unwrap();
    let mut frame_loop = FrameLoop::new(&scene.device, &scene.swapchain).unwrap();

    frame_loop.draw_frame(resources.commands(), |_| Ok(())).unwrap();
    frame_loop.draw_frame(resources.commands(), |_| Ok(())).unwrap();
    let submits_before = scene.log.submissions().len();

    let mut called = false;
    let err = frame_loop
        .draw_frame(resources.commands(), |_| {
            called = true;
            Ok(())
        })
        .unwrap_err();
    assert_eq!(err.vk_result(), Some(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
    assert!(!called);
    assert_eq!(frame_loop.state(), FrameState::AcquireImage);
    assert_eq!(frame_loop.frames_presented(), 2);
    assert_eq!(scene.log.submissions().len(), submits_before);
}

#[test]
fn failed_update_leaves_the_acquired_image_unpresented() {
    let scene = scene(FakeConfig::default());
    let mut resources = frame_resources(&scene);
    resources.record(&draw(&scene), CLEAR).unwrap();
    let mut frame_loop = FrameLoop::new(&scene.device, &scene.swapchain).unwrap();

    let err = frame_loop
        .draw_frame(resources.commands(), |_| Err(Error::NotHostVisible))
        .unwrap_err();
    assert!(matches!(err, Error::NotHostVisible));
    assert_eq!(frame_loop.state(), FrameState::Submit);
    assert_eq!(frame_loop.frames_presented(), 0);
    assert!(scene.log.presents().is_empty());
}

#[test]
fn failed_present_is_reported() {
    let scene = scene(FakeConfig::default().fail_on("vkQueuePresentKHR", 0));
    let mut resources = frame_resources(&scene);
    resources.record(&draw(&scene), CLEAR).unwrap();
    let mut frame_loop = FrameLoop::new(&scene.device, &scene.swapchain).unwrap();

    let err = frame_loop
        .draw_frame(resources.commands(), |_| Ok(()))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Vulkan {
            call: "vkQueuePresentKHR",
            ..
        }
    ));
    assert_eq!(frame_loop.state(), FrameState::Present);
    assert_eq!(frame_loop.frames_presented(), 0);
}
