// SPDX-License-Identifier: CEPL-1.0
//! Backend-neutral pieces a renderer consumes: the drawable size and asset
//! loaders for shader bytecode and textures.

pub mod assets;

pub use assets::{load_rgba8, load_spirv, AssetError, DecodedImage};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A minimised window reports a zero-sized drawable.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect(&self) -> f32 {
        self.width.max(1) as f32 / self.height.max(1) as f32
    }
}
