// SPDX-License-Identifier: CEPL-1.0
use std::mem::{offset_of, size_of};

use bytemuck::{Pod, Zeroable};
use keel_render_vk::ash::vk;
use keel_render_vk::{VertexAttribute, VertexBinding};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 2],
    pub color: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    const fn new(pos: [f32; 2], color: [f32; 3], uv: [f32; 2]) -> Self {
        Self { pos, color, uv }
    }

    pub fn binding() -> VertexBinding {
        VertexBinding::per_vertex(0, size_of::<Self>() as u32)
    }

    /// Locations 0..3 match `shaders/quad.vert`.
    pub fn attributes() -> [VertexAttribute; 3] {
        let attr = |location, format, offset: usize| VertexAttribute {
            location,
            binding: 0,
            format,
            offset: offset as u32,
        };
        [
            attr(0, vk::Format::R32G32_SFLOAT, offset_of!(Vertex, pos)),
            attr(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, color)),
            attr(2, vk::Format::R32G32_SFLOAT, offset_of!(Vertex, uv)),
        ]
    }
}

pub const QUAD_VERTICES: [Vertex; 4] = [
    Vertex::new([-0.5, -0.5], [1.0, 0.0, 0.0], [1.0, 0.0]),
    Vertex::new([0.5, -0.5], [0.0, 1.0, 0.0], [0.0, 0.0]),
    Vertex::new([0.5, 0.5], [0.0, 0.0, 1.0], [0.0, 1.0]),
    Vertex::new([-0.5, 0.5], [1.0, 1.0, 1.0], [1.0, 1.0]),
];

pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_tightly_packed() {
        assert_eq!(Vertex::binding().stride, 28);
        let offsets: Vec<u32> = Vertex::attributes().iter().map(|a| a.offset).collect();
        assert_eq!(offsets, [0, 8, 20]);
    }

    #[test]
    fn indices_cover_two_triangles() {
        assert_eq!(QUAD_INDICES.len(), 6);
        assert!(QUAD_INDICES.iter().all(|&i| (i as usize) < QUAD_VERTICES.len()));
    }
}
