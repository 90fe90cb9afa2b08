// SPDX-License-Identifier: CEPL-1.0
//! Error type shared by every wrapper in this crate.
//!
//! Failures fall into three groups: an API call that did not report
//! success while creating or using a resource, a request for a
//! configuration the wrappers do not support, and a capability that
//! could not be discovered at startup. None of them are retried.

use ash::prelude::VkResult;
use ash::vk;
use thiserror::Error;

use crate::pipeline::Stages;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{call} failed: {result}")]
    Vulkan {
        call: &'static str,
        result: vk::Result,
    },

    #[error("failed to load the Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("window handle unavailable: {0}")]
    WindowHandle(#[from] raw_window_handle::HandleError),

    #[error("validation layers requested, but not available")]
    ValidationUnavailable,

    #[error("failed to find GPUs with Vulkan support")]
    NoAdapters,

    #[error("failed to find a suitable GPU")]
    NoSuitableAdapter,

    #[error("surface reports no formats or no present modes")]
    SurfaceUnsupported,

    #[error("no memory type in mask {type_bits:#x} has properties {required:?}")]
    NoCompatibleMemoryType {
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    },

    #[error("unsupported layout transition: {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },

    #[error("pipeline builder is missing stages: {0:?}")]
    MissingStages(Stages),

    #[error("{len} bytes do not fit in a {capacity}-byte buffer")]
    FillTooLarge { len: usize, capacity: vk::DeviceSize },

    #[error("{len} bytes of pixel data, {expected} required for {width}x{height} RGBA8")]
    PixelDataTooShort {
        len: usize,
        expected: usize,
        width: u32,
        height: u32,
    },

    #[error("{what} index {index} out of range (len {len})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("{what} has zero size")]
    ZeroSize { what: &'static str },

    #[error("{width}x{height} RGBA8 image does not fit in host memory")]
    ImageTooLarge { width: u32, height: u32 },

    #[error("buffer memory is not host-visible")]
    NotHostVisible,

    #[error("invalid SPIR-V blob: {0}")]
    InvalidSpirv(std::io::Error),
}

impl Error {
    pub fn vulkan(call: &'static str, result: vk::Result) -> Self {
        Error::Vulkan { call, result }
    }

    /// The raw result code when this is an API-call failure.
    pub fn vk_result(&self) -> Option<vk::Result> {
        match self {
            Error::Vulkan { result, .. } => Some(*result),
            _ => None,
        }
    }
}

/// Tags a raw `VkResult` with the name of the call that produced it.
pub(crate) trait Checked<T> {
    fn check(self, call: &'static str) -> Result<T>;
}

impl<T> Checked<T> for VkResult<T> {
    fn check(self, call: &'static str) -> Result<T> {
        self.map_err(|result| Error::vulkan(call, result))
    }
}

pub(crate) fn check_index(what: &'static str, index: usize, len: usize) -> Result<()> {
    if index < len {
        Ok(())
    } else {
        Err(Error::IndexOutOfRange { what, index, len })
    }
}
