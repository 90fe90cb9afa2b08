// SPDX-License-Identifier: CEPL-1.0
//! Partial construction tests
//!
//! Each test injects a failure into one step of a multi-step constructor
//! and checks that every object created by the earlier steps is released.

mod common;

use std::sync::Arc;

use common::{checkerboard, device, instance, DRAWABLE};
use keel_render_vk::ash::vk;
use keel_render_vk::driver::fake::{FakeConfig, FakeWindow, ObjectKind};
use keel_render_vk::{
    Buffer, CommandPool, Device, Error, Image, MemoryUsage, Surface, SwapChain, VsyncMode,
};

fn is_oom(err: &Error, expected_call: &str) -> bool {
    matches!(
        err,
        Error::Vulkan { call, result }
            if *call == expected_call && *result == vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
    )
}

#[test]
fn swapchain_view_failure_releases_earlier_views_and_swapchain() {
    let (log, device) = device(FakeConfig::default().fail_on("vkCreateImageView", 2));

    let err = SwapChain::new(&device, DRAWABLE, VsyncMode::Fifo).unwrap_err();

    assert!(is_oom(&err, "vkCreateImageView"));
    assert_eq!(log.created(ObjectKind::ImageView), 2);
    assert_eq!(log.live(ObjectKind::ImageView), 0);
    assert_eq!(log.created(ObjectKind::Swapchain), 1);
    assert_eq!(log.live(ObjectKind::Swapchain), 0);
}

#[test]
fn swapchain_image_query_failure_releases_swapchain() {
    let (log, device) = device(FakeConfig::default().fail_on("vkGetSwapchainImagesKHR", 0));

    let err = SwapChain::new(&device, DRAWABLE, VsyncMode::Fifo).unwrap_err();

    assert!(is_oom(&err, "vkGetSwapchainImagesKHR"));
    assert_eq!(log.live(ObjectKind::Swapchain), 0);
    assert_eq!(log.created(ObjectKind::ImageView), 0);
}

#[test]
fn buffer_bind_failure_releases_buffer_and_memory() {
    let (log, device) = device(FakeConfig::default().fail_on("vkBindBufferMemory", 0));

    let err = Buffer::new(
        &device,
        64,
        vk::BufferUsageFlags::UNIFORM_BUFFER,
        MemoryUsage::HostVisible,
    )
    .unwrap_err();

    assert!(is_oom(&err, "vkBindBufferMemory"));
    assert_eq!(log.created(ObjectKind::Buffer), 1);
    assert_eq!(log.created(ObjectKind::Memory), 1);
    assert_eq!(log.live(ObjectKind::Buffer), 0);
    assert_eq!(log.live(ObjectKind::Memory), 0);
}

#[test]
fn buffer_allocation_failure_releases_buffer() {
    let (log, device) = device(FakeConfig::default().fail_on("vkAllocateMemory", 0));

    let err = Buffer::new(
        &device,
        64,
        vk::BufferUsageFlags::VERTEX_BUFFER,
        MemoryUsage::DeviceLocal,
    )
    .unwrap_err();

    assert!(is_oom(&err, "vkAllocateMemory"));
    assert_eq!(log.created(ObjectKind::Buffer), 1);
    assert_eq!(log.live(ObjectKind::Buffer), 0);
}

#[test]
fn image_sampler_failure_releases_view_memory_and_image() {
    let (log, device) = device(FakeConfig::default().fail_on("vkCreateSampler", 0));

    let err = Image::new(
        &device,
        16,
        16,
        vk::Format::R8G8B8A8_SRGB,
        vk::ImageUsageFlags::SAMPLED,
    )
    .unwrap_err();

    assert!(is_oom(&err, "vkCreateSampler"));
    for kind in [ObjectKind::Image, ObjectKind::Memory, ObjectKind::ImageView] {
        assert_eq!(log.created(kind), 1, "{kind:?}");
        assert_eq!(log.live(kind), 0, "{kind:?}");
    }
}

#[test]
fn failed_upload_releases_staging_and_image() {
    // Submission 0 is the first transition; 1 is the copy.
    let (log, device) = device(FakeConfig::default().fail_on("vkQueueSubmit", 1));
    let pool = CommandPool::new(&device).unwrap();

    let err = Image::create(&device, &pool, &checkerboard(4, 4), 4, 4).unwrap_err();

    assert!(is_oom(&err, "vkQueueSubmit"));
    assert_eq!(log.live(ObjectKind::Buffer), 0);
    assert_eq!(log.live(ObjectKind::Image), 0);
    assert_eq!(log.live(ObjectKind::ImageView), 0);
    assert_eq!(log.live(ObjectKind::Sampler), 0);
    assert_eq!(log.live(ObjectKind::Memory), 0);
    assert_eq!(log.live(ObjectKind::CommandBuffer), 0);
}

#[test]
fn device_failure_releases_surface_and_instance() {
    let (log, instance) = instance(FakeConfig::default().fail_on("vkCreateDevice", 0));
    let surface = Surface::new(&instance, Arc::new(FakeWindow)).unwrap();

    let err = Device::new(&instance, &surface).unwrap_err();
    assert!(is_oom(&err, "vkCreateDevice"));

    drop(surface);
    drop(instance);
    assert_eq!(log.live_total(), 0);
}

#[test]
fn no_suitable_adapter() {
    let mut adapter = FakeConfig::discrete_adapter();
    adapter.swapchain_extension = false;
    let (log, instance) = instance(FakeConfig::default().with_adapters(vec![adapter]));
    let surface = Surface::new(&instance, Arc::new(FakeWindow)).unwrap();

    assert!(matches!(
        Device::new(&instance, &surface),
        Err(Error::NoSuitableAdapter)
    ));
    assert_eq!(log.created(ObjectKind::Device), 0);
}

#[test]
fn no_adapters() {
    let (_log, instance) = instance(FakeConfig::default().with_adapters(Vec::new()));
    let surface = Surface::new(&instance, Arc::new(FakeWindow)).unwrap();
    assert!(matches!(
        Device::new(&instance, &surface),
        Err(Error::NoAdapters)
    ));
}
