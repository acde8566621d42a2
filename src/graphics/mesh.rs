// Mesh data consumed by geometries
//
// Interleaved position + normal + color, matching the pipeline's
// vertex input layout (9 floats per vertex).

use bytemuck::{Pod, Zeroable};

/// One vertex as uploaded to the GPU.
#[derive(Debug, Default, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 3],
}

/// Caller-supplied vertex data; ownership moves into the vertex buffer.
pub type VertexArray = Vec<Vertex>;

/// Caller-supplied index data; ownership moves into the index buffer.
pub type Indices = Vec<u32>;

/// Unit cube centered on the origin, one color per face.
pub fn cube() -> (VertexArray, Indices) {
    const FACES: [([f32; 3], [f32; 3]); 6] = [
        ([0.0, 0.0, 1.0], [0.9, 0.2, 0.2]),  // front
        ([0.0, 0.0, -1.0], [0.2, 0.9, 0.2]), // back
        ([0.0, 1.0, 0.0], [0.2, 0.2, 0.9]),  // top
        ([0.0, -1.0, 0.0], [0.9, 0.9, 0.2]), // bottom
        ([1.0, 0.0, 0.0], [0.9, 0.2, 0.9]),  // right
        ([-1.0, 0.0, 0.0], [0.2, 0.9, 0.9]), // left
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);

    for (face, (normal, color)) in FACES.iter().enumerate() {
        // Two axes spanning the face plane, derived from the normal
        let n = glam::Vec3::from_array(*normal);
        let u = if n.x.abs() > 0.5 {
            glam::Vec3::Z
        } else {
            glam::Vec3::X
        };
        let v = n.cross(u);
        let u = v.cross(n);

        let base = (face * 4) as u32;
        for (su, sv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
            let position = n * 0.5 + u * su + v * sv;
            vertices.push(Vertex {
                position: position.to_array(),
                normal: *normal,
                color: *color,
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
    }

    (vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_has_expected_counts() {
        let (vertices, indices) = cube();
        assert_eq!(vertices.len(), 24); // 6 faces x 4 corners
        assert_eq!(indices.len(), 36); // 6 faces x 2 triangles
    }

    #[test]
    fn cube_indices_are_in_range() {
        let (vertices, indices) = cube();
        assert!(indices.iter().all(|&i| (i as usize) < vertices.len()));
    }

    #[test]
    fn cube_vertices_lie_on_unit_cube() {
        let (vertices, _) = cube();
        for vertex in &vertices {
            let max = vertex
                .position
                .iter()
                .fold(0.0_f32, |acc, c| acc.max(c.abs()));
            assert!((max - 0.5).abs() < 1e-6);
        }
    }
}
