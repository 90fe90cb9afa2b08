// SPDX-License-Identifier: CEPL-1.0
//! Texture upload tests
//!
//! Tests for:
//! - The barrier / copy / barrier sequence of an upload
//! - Rejection of short pixel data, zero extents and unsupported transitions
//!   before any GPU work
//! - Descriptor information for sampled images

mod common;

use common::{checkerboard, device};
use keel_render_vk::ash::vk;
use keel_render_vk::driver::fake::{Command, FakeConfig, ObjectKind};
use keel_render_vk::driver::{DescriptorResource, ImageBarrier};
use keel_render_vk::{CommandPool, Error, Image};

#[test]
fn upload_transitions_copies_and_transitions() {
    let (log, device) = device(FakeConfig::default());
    let pool = CommandPool::new(&device).unwrap();

    let image = Image::create(&device, &pool, &checkerboard(8, 4), 8, 4).unwrap();

    assert_eq!((image.width(), image.height()), (8, 4));
    assert_eq!(image.format(), vk::Format::R8G8B8A8_SRGB);
    let commands: Vec<Vec<Command>> = log
        .submissions()
        .into_iter()
        .map(|s| s.commands)
        .collect();
    assert_eq!(commands.len(), 3);

    assert_eq!(
        commands[0],
        vec![Command::PipelineBarrier(ImageBarrier {
            image: image.raw_image(),
            old_layout: vk::ImageLayout::UNDEFINED,
            new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        })]
    );
    match commands[1].as_slice() {
        [Command::CopyBufferToImage { dst, extent, .. }] => {
            assert_eq!(*dst, image.raw_image());
            assert_eq!(
                *extent,
                vk::Extent2D {
                    width: 8,
                    height: 4
                }
            );
        }
        other => panic!("expected a single buffer-to-image copy, got {other:?}"),
    }
    assert_eq!(
        commands[2],
        vec![Command::PipelineBarrier(ImageBarrier {
            image: image.raw_image(),
            old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::SHADER_READ,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        })]
    );

    // The staging buffer is gone; image, view, sampler and memory remain.
    assert_eq!(log.live(ObjectKind::Buffer), 0);
    assert_eq!(log.live(ObjectKind::Image), 1);
    assert_eq!(log.live(ObjectKind::ImageView), 1);
    assert_eq!(log.live(ObjectKind::Sampler), 1);
    assert_eq!(log.live(ObjectKind::Memory), 1);
    assert_eq!(log.live(ObjectKind::CommandBuffer), 0);
}

#[test]
fn short_pixel_data_is_rejected_before_any_gpu_work() {
    let (log, device) = device(FakeConfig::default());
    let pool = CommandPool::new(&device).unwrap();

    let err = Image::create(&device, &pool, &[0; 15], 2, 2).unwrap_err();

    assert!(matches!(
        err,
        Error::PixelDataTooShort {
            len: 15,
            expected: 16,
            width: 2,
            height: 2
        }
    ));
    assert_eq!(log.created(ObjectKind::Buffer), 0);
    assert_eq!(log.created(ObjectKind::Image), 0);
    assert!(log.submissions().is_empty());
}

#[test]
fn zero_extent_is_rejected_before_any_gpu_work() {
    let (log, device) = device(FakeConfig::default());
    let pool = CommandPool::new(&device).unwrap();

    for (width, height) in [(0, 0), (0, 4), (4, 0)] {
        let err = Image::create(&device, &pool, &[], width, height).unwrap_err();
        assert!(matches!(err, Error::ZeroSize { what: "image" }), "{width}x{height}");
    }
    assert!(matches!(
        Image::new(
            &device,
            0,
            16,
            vk::Format::R8G8B8A8_SRGB,
            vk::ImageUsageFlags::SAMPLED,
        ),
        Err(Error::ZeroSize { .. })
    ));
    assert_eq!(log.call_count("vkCreateBuffer"), 0);
    assert_eq!(log.call_count("vkCreateImage"), 0);
    assert!(log.submissions().is_empty());
}

#[test]
fn extra_pixel_data_is_ignored() {
    let (log, device) = device(FakeConfig::default());
    let pool = CommandPool::new(&device).unwrap();
    let mut pixels = checkerboard(2, 2);
    pixels.extend_from_slice(&[1, 2, 3, 4]);

    Image::create(&device, &pool, &pixels, 2, 2).unwrap();
    assert_eq!(log.submissions().len(), 3);
}

#[test]
fn unsupported_transition_records_nothing() {
    let (log, device) = device(FakeConfig::default());
    let pool = CommandPool::new(&device).unwrap();
    let image = Image::new(
        &device,
        4,
        4,
        vk::Format::R8G8B8A8_SRGB,
        vk::ImageUsageFlags::SAMPLED,
    )
    .unwrap();

    let err = image
        .transition_layout(
            &pool,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap_err();

    assert!(matches!(
        err,
        Error::UnsupportedLayoutTransition {
            old: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            new: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        }
    ));
    assert_eq!(log.call_count("vkAllocateCommandBuffers"), 0);
    assert!(log.submissions().is_empty());
}

#[test]
fn sampled_image_descriptor() {
    let (_log, device) = device(FakeConfig::default());
    let pool = CommandPool::new(&device).unwrap();
    let image = Image::create(&device, &pool, &checkerboard(2, 2), 2, 2).unwrap();

    let write = image.descriptor_write(1);
    assert_eq!(write.descriptor_type(), vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
    assert_eq!(
        write.resource,
        DescriptorResource::CombinedImageSampler {
            view: image.raw_view(),
            sampler: image.raw_sampler(),
            layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    );
    assert_eq!(
        Image::layout_binding(1).stage_flags,
        vk::ShaderStageFlags::FRAGMENT
    );
}
