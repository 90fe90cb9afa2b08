// SPDX-License-Identifier: CEPL-1.0
//! Release guard for handles created during multi-step construction.
//!
//! A constructor that creates several API objects wraps each one in a
//! [`Scoped`] as soon as it exists. If a later step fails, the `?` return
//! drops the guards and every handle created so far is destroyed, later
//! locals before earlier ones. On success the constructor calls
//! [`Scoped::release`] and hands the raw handles to the wrapper, whose
//! `Drop` takes over.

use ash::vk;
use tracing::debug;

use crate::driver::DeviceDriver;

/// A device-level handle that knows how to destroy itself.
pub(crate) trait DeviceObject: Copy + std::fmt::Debug {
    /// # Safety
    /// `self` must be a live handle created by `driver`, not in use by
    /// the device.
    unsafe fn destroy(self, driver: &dyn DeviceDriver);
}

macro_rules! device_object {
    ($($ty:ty => $destroy:ident),* $(,)?) => {
        $(
            impl DeviceObject for $ty {
                unsafe fn destroy(self, driver: &dyn DeviceDriver) {
                    // SAFETY: forwarded from the trait contract.
                    unsafe { driver.$destroy(self) }
                }
            }
        )*
    };
}

device_object! {
    vk::SwapchainKHR => destroy_swapchain,
    vk::ImageView => destroy_image_view,
    vk::Buffer => destroy_buffer,
    vk::Image => destroy_image,
    vk::DeviceMemory => free_memory,
    vk::Sampler => destroy_sampler,
}

pub(crate) struct Scoped<'a, T: DeviceObject> {
    driver: &'a dyn DeviceDriver,
    handle: T,
    armed: bool,
}

impl<'a, T: DeviceObject> Scoped<'a, T> {
    pub(crate) fn new(driver: &'a dyn DeviceDriver, handle: T) -> Self {
        Self {
            driver,
            handle,
            armed: true,
        }
    }

    pub(crate) fn get(&self) -> T {
        self.handle
    }

    /// Disarms the guard; the caller now owns the handle.
    pub(crate) fn release(mut self) -> T {
        self.armed = false;
        self.handle
    }
}

impl<T: DeviceObject> Drop for Scoped<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            debug!("Releasing partially constructed {:?}", self.handle);
            // SAFETY: the guard is the sole owner of an armed handle, and the
            // handle was never handed to a submitted command buffer.
            unsafe { self.handle.destroy(self.driver) };
        }
    }
}
