//! Decoded point cloud data
//!
//! Column-oriented storage: one position array, an optional parallel
//! colour array, and the exact bounds of the accepted points.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::math::Bounds;
use crate::{CoreError, CoreResult};

/// RGBA colour with channels normalised to `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    /// Opaque white, used when a point has no readable colour
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);

    /// Create an opaque colour
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Create a colour from 8-bit channels
    pub fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self::rgb(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0)
    }

    /// Quantise to 8-bit RGB for renderer buffers
    pub fn to_rgb8(&self) -> [u8; 3] {
        let quantise = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        [quantise(self.r), quantise(self.g), quantise(self.b)]
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

/// A decoded point cloud
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloudDataset {
    points: Vec<Vec3>,
    colors: Vec<Color>,
    bounds: Bounds,
    skipped_points: usize,
}

impl PointCloudDataset {
    /// Build a dataset, computing exact bounds.
    ///
    /// `colors` must be empty or the same length as `points`.
    pub fn new(points: Vec<Vec3>, colors: Vec<Color>) -> CoreResult<Self> {
        if !colors.is_empty() && colors.len() != points.len() {
            return Err(CoreError::ColorCountMismatch {
                points: points.len(),
                colors: colors.len(),
            });
        }

        let bounds = Bounds::from_points(&points);
        Ok(Self {
            points,
            colors,
            bounds,
            skipped_points: 0,
        })
    }

    /// Record how many source points were rejected while decoding
    pub fn with_skipped(mut self, skipped_points: usize) -> Self {
        self.skipped_points = skipped_points;
        self
    }

    /// Point positions
    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    /// Point colours; empty when the source carried no colour field
    pub fn colors(&self) -> &[Color] {
        &self.colors
    }

    /// Whether a colour array is present
    pub fn has_colors(&self) -> bool {
        !self.colors.is_empty()
    }

    /// Exact bounds of all points
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Number of source points dropped as invalid
    pub fn skipped_points(&self) -> usize {
        self.skipped_points
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the dataset has no points
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Take ownership of the point and colour arrays
    pub fn into_parts(self) -> (Vec<Vec3>, Vec<Color>) {
        (self.points, self.colors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_bounds() {
        let dataset = PointCloudDataset::new(
            vec![Vec3::ZERO, Vec3::ONE, Vec3::splat(2.0)],
            Vec::new(),
        )
        .unwrap();

        assert_eq!(dataset.len(), 3);
        assert!(!dataset.has_colors());
        assert_eq!(dataset.bounds().min, Vec3::ZERO);
        assert_eq!(dataset.bounds().max, Vec3::splat(2.0));
        assert_eq!(dataset.bounds().center(), Vec3::ONE);
    }

    #[test]
    fn test_color_length_mismatch() {
        let result = PointCloudDataset::new(vec![Vec3::ZERO, Vec3::ONE], vec![Color::WHITE]);
        assert!(matches!(
            result,
            Err(CoreError::ColorCountMismatch { points: 2, colors: 1 })
        ));
    }

    #[test]
    fn test_color_quantisation() {
        assert_eq!(Color::from_rgb8(255, 128, 0).to_rgb8(), [255, 128, 0]);
        assert_eq!(Color::rgb(2.0, -1.0, 0.5).to_rgb8(), [255, 0, 128]);
    }

    #[test]
    fn test_skipped_counter() {
        let dataset = PointCloudDataset::new(vec![Vec3::ZERO], Vec::new())
            .unwrap()
            .with_skipped(4);
        assert_eq!(dataset.skipped_points(), 4);
    }
}
