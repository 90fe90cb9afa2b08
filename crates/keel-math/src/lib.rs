// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Transform math for the demo's per-frame uniform block.

use bytemuck::{Pod, Zeroable};
pub use glam::{Mat4, Vec3};

/// Degrees per second the demo quad turns about +Z.
pub const SPIN_DEGREES_PER_SEC: f32 = 90.0;

/// Uniform block consumed by the quad vertex shader at binding 0.
///
/// Layout matches a std140 block of three `mat4`s.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Transforms {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl Transforms {
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    /// Quad turned about +Z for `secs` seconds, seen from (2, 2, 2) with a
    /// 45 degree perspective.
    ///
    /// The projection's Y axis is flipped for Vulkan clip space.
    pub fn spinning(secs: f32, aspect: f32) -> Self {
        let model = Mat4::from_rotation_z((secs * SPIN_DEGREES_PER_SEC).to_radians());
        let view = Mat4::look_at_rh(Vec3::splat(2.0), Vec3::ZERO, Vec3::Z);
        let mut proj = Mat4::perspective_rh(45f32.to_radians(), aspect, 0.1, 10.0);
        proj.y_axis.y *= -1.0;
        Self { model, view, proj }
    }
}

impl Default for Transforms {
    fn default() -> Self {
        Self {
            model: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
        }
    }
}
