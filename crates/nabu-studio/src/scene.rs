use nabu_engine::render::{DrawConstants, Vertex};

/// Unit cube with one color and normal per face, 24 vertices / 36 indices.
pub fn cube() -> (Vec<Vertex>, Vec<u32>) {
    // (normal, tangent u, tangent v, color)
    const FACES: [([f32; 3], [f32; 3], [f32; 3], [f32; 4]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0], [0.9, 0.3, 0.3, 1.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0], [0.3, 0.9, 0.3, 1.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.3, 0.3, 0.9, 1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.9, 0.9, 0.3, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.3, 0.9, 0.9, 1.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.9, 0.3, 0.9, 1.0]),
    ];
    const CORNERS: [(f32, f32); 4] = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, u, v, color) in FACES {
        let base = vertices.len() as u32;
        for (su, sv) in CORNERS {
            let position = [0, 1, 2].map(|i| 0.5 * (normal[i] + su * u[i] + sv * v[i]));
            vertices.push(Vertex {
                position,
                normal,
                color,
                uv: [(su + 1.0) * 0.5, (1.0 - sv) * 0.5],
            });
        }
        indices.extend([0, 1, 2, 0, 2, 3].map(|i| base + i));
    }
    (vertices, indices)
}

/// RGBA checkerboard, `cells` squares per side.
pub fn checker(size: u32, cells: u32, a: [u8; 4], b: [u8; 4]) -> Vec<u8> {
    let cell = (size / cells.max(1)).max(1);
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let odd = (x / cell + y / cell) % 2 == 1;
            pixels.extend_from_slice(if odd { &b } else { &a });
        }
    }
    pixels
}

/// Column-major transform spinning the cube around two axes, kept inside
/// the wgpu clip volume (z in 0..1) without a projection.
pub fn spin(angle: f32, offset_x: f32, scale: f32) -> DrawConstants {
    let (sy, cy) = angle.sin_cos();
    let (sx, cx) = (angle * 0.7).sin_cos();

    // R = Rx * Ry, then scale, then translate by (offset_x, 0, 0.5).
    let r = [
        [cy, sx * sy, -cx * sy],
        [0.0, cx, sx],
        [sy, -sx * cy, cx * cy],
    ];
    let s = scale;
    DrawConstants {
        transform: [
            [r[0][0] * s, r[0][1] * s, r[0][2] * s * 0.5, 0.0],
            [r[1][0] * s, r[1][1] * s, r[1][2] * s * 0.5, 0.0],
            [r[2][0] * s, r[2][1] * s, r[2][2] * s * 0.5, 0.0],
            [offset_x, 0.0, 0.5, 1.0],
        ],
        tint: [1.0; 4],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_indices_stay_in_range() {
        let (vertices, indices) = cube();
        assert_eq!(vertices.len(), 24);
        assert_eq!(indices.len(), 36);
        assert!(indices.iter().all(|&i| (i as usize) < vertices.len()));
    }

    #[test]
    fn spun_cube_stays_in_clip_depth() {
        let (vertices, _) = cube();
        for step in 0..32 {
            let m = spin(step as f32 * 0.3, 0.0, 0.8).transform;
            for v in &vertices {
                let p = v.position;
                let z = m[0][2] * p[0] + m[1][2] * p[1] + m[2][2] * p[2] + m[3][2];
                assert!((0.0..=1.0).contains(&z), "z = {z}");
            }
        }
    }

    #[test]
    fn checker_has_rgba_texels() {
        let pixels = checker(8, 2, [0; 4], [255; 4]);
        assert_eq!(pixels.len(), 8 * 8 * 4);
        assert_eq!(&pixels[..4], &[0; 4]);
        assert_eq!(&pixels[4 * 4..4 * 4 + 4], &[255; 4]);
    }
}
