// SPDX-License-Identifier: CEPL-1.0
//! Adapter selection and the logical device.

use std::fmt;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::driver::{AdapterInfo, DeviceDesc, DeviceDriver, QueueFamilyInfo};
use crate::error::{Checked, Error, Result};
use crate::instance::Instance;
use crate::surface::Surface;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// Distinct family indices, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.graphics == self.present {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterSelection {
    pub index: usize,
    pub families: QueueFamilies,
}

fn rank(device_type: vk::PhysicalDeviceType) -> Option<u8> {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => Some(0),
        vk::PhysicalDeviceType::INTEGRATED_GPU => Some(1),
        _ => None,
    }
}

fn queue_families(adapter: &AdapterInfo) -> Option<QueueFamilies> {
    let families = &adapter.queue_families;
    let is_graphics = |f: &QueueFamilyInfo| {
        f.queue_count > 0 && f.flags.contains(vk::QueueFlags::GRAPHICS)
    };
    // One family doing both avoids concurrent sharing.
    if let Some(both) = families
        .iter()
        .position(|f| is_graphics(f) && f.present_support)
    {
        return Some(QueueFamilies {
            graphics: both as u32,
            present: both as u32,
        });
    }
    let graphics = families.iter().position(is_graphics)?;
    let present = families
        .iter()
        .position(|f| f.queue_count > 0 && f.present_support)?;
    Some(QueueFamilies {
        graphics: graphics as u32,
        present: present as u32,
    })
}

/// Picks the adapter to render with.
///
/// Suitable adapters are discrete or integrated GPUs that support the
/// swapchain extension, report at least one surface format and present
/// mode, and expose a graphics family and a present-capable family.
/// Discrete beats integrated; ties keep enumeration order.
pub fn select_adapter(adapters: &[AdapterInfo]) -> Result<AdapterSelection> {
    if adapters.is_empty() {
        return Err(Error::NoAdapters);
    }
    adapters
        .iter()
        .enumerate()
        .filter(|(_, a)| {
            a.swapchain_extension && a.surface_format_count > 0 && a.present_mode_count > 0
        })
        .filter_map(|(index, a)| {
            let rank = rank(a.device_type)?;
            let families = queue_families(a)?;
            Some((rank, AdapterSelection { index, families }))
        })
        .min_by_key(|(rank, selection)| (*rank, selection.index))
        .map(|(_, selection)| selection)
        .ok_or(Error::NoSuitableAdapter)
}

/// The logical device, with its graphics and present queues.
pub struct Device {
    driver: Box<dyn DeviceDriver>,
    adapter: AdapterInfo,
    families: QueueFamilies,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    surface: Arc<Surface>,
    instance: Arc<Instance>,
}

impl Device {
    pub fn new(instance: &Arc<Instance>, surface: &Arc<Surface>) -> Result<Arc<Self>> {
        // SAFETY: the surface was created from this instance and is alive.
        let adapters = unsafe { instance.driver().enumerate_adapters(surface.raw_surface()) }
            .check("vkEnumeratePhysicalDevices")?;
        let selection = select_adapter(&adapters)?;
        let adapter = adapters[selection.index].clone();
        let families = selection.families;
        info!(
            "Using adapter {} ({:?}), graphics family {}, present family {}",
            adapter.name, adapter.device_type, families.graphics, families.present
        );

        let desc = DeviceDesc {
            queue_families: families.unique(),
            sampler_anisotropy: adapter.sampler_anisotropy,
        };
        // SAFETY: `adapter` was enumerated from this instance.
        let driver = unsafe { instance.driver().create_device(&adapter, &desc) }
            .check("vkCreateDevice")?;
        // SAFETY: one queue was requested from each family in `desc`.
        let (graphics_queue, present_queue) = unsafe {
            (
                driver.get_queue(families.graphics, 0),
                driver.get_queue(families.present, 0),
            )
        };

        Ok(Arc::new(Self {
            driver,
            adapter,
            families,
            graphics_queue,
            present_queue,
            surface: Arc::clone(surface),
            instance: Arc::clone(instance),
        }))
    }

    pub fn driver(&self) -> &dyn DeviceDriver {
        self.driver.as_ref()
    }

    pub fn raw_device(&self) -> vk::Device {
        self.driver.raw_device()
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    pub fn surface(&self) -> &Arc<Surface> {
        &self.surface
    }

    pub fn adapter(&self) -> &AdapterInfo {
        &self.adapter
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.adapter.physical_device
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.adapter.memory_properties
    }

    pub fn queue_families(&self) -> QueueFamilies {
        self.families
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Anisotropy limit when the feature was enabled at device creation.
    pub fn max_sampler_anisotropy(&self) -> Option<f32> {
        self.adapter
            .sampler_anisotropy
            .then_some(self.adapter.max_sampler_anisotropy)
    }

    pub fn wait_idle(&self) -> Result<()> {
        // SAFETY: no queue is used from another thread.
        unsafe { self.driver.device_wait_idle() }.check("vkDeviceWaitIdle")
    }

    pub fn wait_graphics_queue(&self) -> Result<()> {
        // SAFETY: the queue belongs to this device.
        unsafe { self.driver.queue_wait_idle(self.graphics_queue) }.check("vkQueueWaitIdle")
    }

    pub fn wait_present_queue(&self) -> Result<()> {
        // SAFETY: the queue belongs to this device.
        unsafe { self.driver.queue_wait_idle(self.present_queue) }.check("vkQueueWaitIdle")
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("adapter", &self.adapter.name)
            .field("families", &self.families)
            .finish_non_exhaustive()
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        debug!("Dropping device");
        // SAFETY: every device child holds an `Arc<Device>`; the surface and
        // instance are released after this body returns.
        unsafe { self.driver.destroy_device() };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::FakeConfig;

    fn family(flags: vk::QueueFlags, present: bool) -> QueueFamilyInfo {
        QueueFamilyInfo {
            flags,
            queue_count: 1,
            present_support: present,
        }
    }

    fn adapter(device_type: vk::PhysicalDeviceType) -> AdapterInfo {
        AdapterInfo {
            device_type,
            ..FakeConfig::discrete_adapter()
        }
    }

    #[test]
    fn discrete_beats_integrated() {
        let adapters = [
            adapter(vk::PhysicalDeviceType::INTEGRATED_GPU),
            adapter(vk::PhysicalDeviceType::DISCRETE_GPU),
        ];
        assert_eq!(select_adapter(&adapters).unwrap().index, 1);
    }

    #[test]
    fn ties_keep_enumeration_order() {
        let adapters = [
            adapter(vk::PhysicalDeviceType::INTEGRATED_GPU),
            adapter(vk::PhysicalDeviceType::INTEGRATED_GPU),
        ];
        assert_eq!(select_adapter(&adapters).unwrap().index, 0);
    }

    #[test]
    fn cpu_and_virtual_adapters_are_rejected() {
        let adapters = [
            adapter(vk::PhysicalDeviceType::CPU),
            adapter(vk::PhysicalDeviceType::VIRTUAL_GPU),
        ];
        assert!(matches!(
            select_adapter(&adapters),
            Err(Error::NoSuitableAdapter)
        ));
    }

    #[test]
    fn empty_list_reports_no_adapters() {
        assert!(matches!(select_adapter(&[]), Err(Error::NoAdapters)));
    }

    #[test]
    fn missing_swapchain_or_surface_modes_disqualify() {
        let mut no_swapchain = adapter(vk::PhysicalDeviceType::DISCRETE_GPU);
        no_swapchain.swapchain_extension = false;
        let mut no_modes = adapter(vk::PhysicalDeviceType::DISCRETE_GPU);
        no_modes.present_mode_count = 0;
        let fallback = adapter(vk::PhysicalDeviceType::INTEGRATED_GPU);
        let picked = select_adapter(&[no_swapchain, no_modes, fallback]).unwrap();
        assert_eq!(picked.index, 2);
    }

    #[test]
    fn prefers_a_family_that_does_both() {
        let mut a = adapter(vk::PhysicalDeviceType::DISCRETE_GPU);
        a.queue_families = vec![
            family(vk::QueueFlags::GRAPHICS, false),
            family(vk::QueueFlags::TRANSFER, true),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, true),
        ];
        let families = select_adapter(&[a]).unwrap().families;
        assert_eq!(families, QueueFamilies { graphics: 2, present: 2 });
    }

    #[test]
    fn split_families_use_the_present_query() {
        let mut a = adapter(vk::PhysicalDeviceType::DISCRETE_GPU);
        a.queue_families = vec![
            family(vk::QueueFlags::GRAPHICS, false),
            family(vk::QueueFlags::TRANSFER, true),
        ];
        let families = select_adapter(&[a]).unwrap().families;
        assert_eq!(families, QueueFamilies { graphics: 0, present: 1 });
        assert_eq!(families.unique(), vec![0, 1]);
    }

    #[test]
    fn no_present_family_disqualifies() {
        let mut a = adapter(vk::PhysicalDeviceType::DISCRETE_GPU);
        a.queue_families = vec![family(vk::QueueFlags::GRAPHICS, false)];
        assert!(matches!(select_adapter(&[a]), Err(Error::NoSuitableAdapter)));
    }
}
