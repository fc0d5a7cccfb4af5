//! Line-list geometry outlining tile bounds

use bytemuck::{Pod, Zeroable};

use crate::core::types::{DMat4, DVec3};
use crate::math::BoundingVolume;

/// Vertex of a line list, ready for upload as a vertex buffer
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LineVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

/// Vertices emitted per outlined volume (12 edges)
pub const VERTICES_PER_BOX: usize = 24;

/// Corner index pairs of the 12 box edges; corner bits are x, y, z
const EDGES: [(usize, usize); 12] = [
    (0, 1), (2, 3), (4, 5), (6, 7),
    (0, 2), (1, 3), (4, 6), (5, 7),
    (0, 4), (1, 5), (2, 6), (3, 7),
];

/// Color for a tile at the given depth, cycling through a small palette
pub fn depth_color(depth: u32) -> [f32; 4] {
    const PALETTE: [[f32; 4]; 6] = [
        [1.0, 0.2, 0.2, 1.0],
        [1.0, 0.6, 0.1, 1.0],
        [0.9, 0.9, 0.2, 1.0],
        [0.2, 0.9, 0.3, 1.0],
        [0.2, 0.6, 1.0, 1.0],
        [0.7, 0.3, 1.0, 1.0],
    ];
    PALETTE[depth as usize % PALETTE.len()]
}

/// Append the outline of `volume`, placed by `transform`
pub fn push_outline(lines: &mut Vec<LineVertex>, volume: &BoundingVolume, transform: &DMat4, color: [f32; 4]) {
    let corners = volume.outline_corners().map(|c: DVec3| transform.transform_point3(c).as_vec3().to_array());
    for (a, b) in EDGES {
        lines.push(LineVertex { position: corners[a], color });
        lines.push(LineVertex { position: corners[b], color });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Aabb;

    #[test]
    fn test_outline_vertex_count_and_extent() {
        let volume = BoundingVolume::from_aabb(&Aabb::new(DVec3::ZERO, DVec3::ONE));
        let mut lines = Vec::new();
        push_outline(&mut lines, &volume, &DMat4::from_translation(DVec3::X * 10.0), depth_color(0));

        assert_eq!(lines.len(), VERTICES_PER_BOX);
        assert!(lines.iter().all(|v| v.position[0] >= 10.0 && v.position[0] <= 11.0));
        // Each edge joins corners that differ on exactly one axis
        for pair in lines.chunks(2) {
            let differing = (0..3).filter(|&i| pair[0].position[i] != pair[1].position[i]).count();
            assert_eq!(differing, 1);
        }
    }

    #[test]
    fn test_vertices_cast_to_bytes() {
        let vertex = LineVertex { position: [1.0, 2.0, 3.0], color: depth_color(7) };
        let bytes: &[u8] = bytemuck::cast_slice(std::slice::from_ref(&vertex));
        assert_eq!(bytes.len(), 28);
    }
}
