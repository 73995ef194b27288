//! Voxel-grid downsampling

use glam::{DVec3, Vec3};
use indexmap::IndexMap;
use stipple_core::Color;

#[derive(Default)]
struct Cell {
    position: DVec3,
    color: [f64; 4],
    count: u32,
}

/// Integer cell containing a point
pub fn voxel_cell(point: Vec3, voxel_size: f32) -> [i64; 3] {
    let size = voxel_size as f64;
    [
        (point.x as f64 / size).floor() as i64,
        (point.y as f64 / size).floor() as i64,
        (point.z as f64 / size).floor() as i64,
    ]
}

/// Replace every occupied voxel by the mean of its points and colours.
///
/// `colors` must be empty or match `points` in length. Output points are
/// in the order their cells were first seen. A non-positive or
/// non-finite `voxel_size` returns the input unchanged.
pub fn voxel_downsample(points: &[Vec3], colors: &[Color], voxel_size: f32) -> (Vec<Vec3>, Vec<Color>) {
    if !(voxel_size.is_finite() && voxel_size > 0.0) {
        return (points.to_vec(), colors.to_vec());
    }

    let with_colors = !colors.is_empty();
    let mut cells: IndexMap<[i64; 3], Cell, ahash::RandomState> =
        IndexMap::with_hasher(ahash::RandomState::new());

    for (i, &point) in points.iter().enumerate() {
        let cell = cells.entry(voxel_cell(point, voxel_size)).or_default();
        cell.position += point.as_dvec3();
        if with_colors {
            let c = colors[i];
            cell.color[0] += c.r as f64;
            cell.color[1] += c.g as f64;
            cell.color[2] += c.b as f64;
            cell.color[3] += c.a as f64;
        }
        cell.count += 1;
    }

    let mut out_points = Vec::with_capacity(cells.len());
    let mut out_colors = Vec::with_capacity(if with_colors { cells.len() } else { 0 });
    for cell in cells.values() {
        let n = cell.count as f64;
        out_points.push((cell.position / n).as_vec3());
        if with_colors {
            out_colors.push(Color {
                r: (cell.color[0] / n) as f32,
                g: (cell.color[1] / n) as f32,
                b: (cell.color[2] / n) as f32,
                a: (cell.color[3] / n) as f32,
            });
        }
    }

    log::debug!(
        "Voxel downsample at {}: {} -> {} points",
        voxel_size,
        points.len(),
        out_points.len()
    );
    (out_points, out_colors)
}
