// SPDX-License-Identifier: CEPL-1.0
//! Memory-type selection and allocation.

use ash::vk;

use crate::device::Device;
use crate::error::{Checked, Error, Result};
use crate::scoped::Scoped;

/// Where an allocation lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryUsage {
    /// Host-visible and coherent; can be mapped and filled directly.
    HostVisible,
    /// Device-local; written through a staging copy.
    DeviceLocal,
}

impl MemoryUsage {
    pub fn property_flags(self) -> vk::MemoryPropertyFlags {
        match self {
            MemoryUsage::HostVisible => {
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
            }
            MemoryUsage::DeviceLocal => vk::MemoryPropertyFlags::DEVICE_LOCAL,
        }
    }

    pub fn is_host_visible(self) -> bool {
        self == MemoryUsage::HostVisible
    }
}

/// Index of the first memory type in `type_bits` that has every flag in
/// `required`.
pub fn find_memory_type(
    properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Result<u32> {
    let count = (properties.memory_type_count as usize).min(properties.memory_types.len());
    properties.memory_types[..count]
        .iter()
        .enumerate()
        .find(|(i, ty)| type_bits & (1 << i) != 0 && ty.property_flags.contains(required))
        .map(|(i, _)| i as u32)
        .ok_or(Error::NoCompatibleMemoryType {
            type_bits,
            required,
        })
}

/// Allocates memory matching `requirements`, guarded until the caller
/// releases it into a wrapper.
pub(crate) fn allocate(
    device: &Device,
    requirements: vk::MemoryRequirements,
    usage: MemoryUsage,
) -> Result<Scoped<'_, vk::DeviceMemory>> {
    let type_index = find_memory_type(
        device.memory_properties(),
        requirements.memory_type_bits,
        usage.property_flags(),
    )?;
    let driver = device.driver();
    // SAFETY: allocation has no handle preconditions.
    let memory = unsafe { driver.allocate_memory(requirements.size, type_index) }
        .check("vkAllocateMemory")?;
    Ok(Scoped::new(driver, memory))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut p = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (slot, flags) in p.memory_types.iter_mut().zip(types) {
            slot.property_flags = *flags;
        }
        p
    }

    #[test]
    fn picks_first_matching_type() {
        let p = props(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT
                | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);
        let idx = find_memory_type(&p, 0b111, MemoryUsage::HostVisible.property_flags()).unwrap();
        assert_eq!(idx, 1);
    }

    #[test]
    fn respects_type_mask() {
        let p = props(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);
        let idx = find_memory_type(&p, 0b10, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap();
        assert_eq!(idx, 1);
    }

    #[test]
    fn no_match_is_an_error() {
        let p = props(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        let err = find_memory_type(&p, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap_err();
        assert!(matches!(err, Error::NoCompatibleMemoryType { type_bits: 1, .. }));
    }
}
