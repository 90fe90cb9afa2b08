// SPDX-License-Identifier: CEPL-1.0
use std::fmt;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{Checked, Result};

/// A binary semaphore for GPU-to-GPU ordering within a frame.
pub struct Semaphore {
    device: Arc<Device>,
    handle: vk::Semaphore,
}

impl Semaphore {
    pub fn new(device: &Arc<Device>) -> Result<Self> {
        // SAFETY: semaphore creation has no handle preconditions.
        let handle =
            unsafe { device.driver().create_semaphore() }.check("vkCreateSemaphore")?;
        Ok(Self {
            device: Arc::clone(device),
            handle,
        })
    }

    pub fn raw_semaphore(&self) -> vk::Semaphore {
        self.handle
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Semaphore")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        debug!("Dropping semaphore {:?}", self.handle);
        // SAFETY: the owner waits for the device to go idle before dropping
        // frame synchronisation.
        unsafe { self.device.driver().destroy_semaphore(self.handle) };
    }
}
