// SPDX-License-Identifier: CEPL-1.0
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use ash::util::read_spv;
use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{Checked, Error, Result};

pub struct Shader {
    device: Arc<Device>,
    handle: vk::ShaderModule,
    word_count: usize,
}

impl Shader {
    /// Builds a module from a SPIR-V blob as read from disk. The bytes are
    /// only regrouped into aligned words; validity is the driver's call.
    pub fn from_spirv(device: &Arc<Device>, bytes: &[u8]) -> Result<Arc<Self>> {
        let words = read_spv(&mut Cursor::new(bytes)).map_err(Error::InvalidSpirv)?;
        Self::from_words(device, &words)
    }

    pub fn from_words(device: &Arc<Device>, words: &[u32]) -> Result<Arc<Self>> {
        // SAFETY: `words` is a borrowed, aligned slice for the whole call.
        let handle = unsafe { device.driver().create_shader_module(words) }
            .check("vkCreateShaderModule")?;
        Ok(Arc::new(Self {
            device: Arc::clone(device),
            handle,
            word_count: words.len(),
        }))
    }

    pub fn raw_module(&self) -> vk::ShaderModule {
        self.handle
    }

    pub fn word_count(&self) -> usize {
        self.word_count
    }
}

impl fmt::Debug for Shader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shader")
            .field("handle", &self.handle)
            .field("words", &self.word_count)
            .finish_non_exhaustive()
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        debug!("Dropping shader module {:?}", self.handle);
        // SAFETY: pipelines built from this module hold an Arc to it.
        unsafe { self.device.driver().destroy_shader_module(self.handle) };
    }
}

