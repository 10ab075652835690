//! Depth maps and the transforms that rescale them.
//!
//! A [`DepthMap`] is an immutable rectangle of signed 16-bit samples.
//! Larger samples are nearer to the viewer. Transforms never mutate a
//! map; they return a new one.

use image::GrayImage;

use crate::types::{Dimensions, PipelineError};

/// An immutable rectangular grid of depth samples, stored row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthMap {
    width: usize,
    height: usize,
    samples: Vec<i16>,
}

impl DepthMap {
    /// Build a map from row-major samples.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidDepthMap`] if either dimension is
    /// zero or `samples.len() != width * height`.
    pub fn new(width: usize, height: usize, samples: Vec<i16>) -> Result<Self, PipelineError> {
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidDepthMap(format!(
                "dimensions must be non-zero, got {width}x{height}"
            )));
        }
        if samples.len() != width * height {
            return Err(PipelineError::InvalidDepthMap(format!(
                "{width}x{height} map needs {} samples, got {}",
                width * height,
                samples.len()
            )));
        }
        Ok(Self {
            width,
            height,
            samples,
        })
    }

    /// Build a map from a list of rows.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidDepthMap`] if there are no rows,
    /// the rows are empty, or the rows differ in length.
    pub fn from_rows<R: AsRef<[i16]>>(rows: &[R]) -> Result<Self, PipelineError> {
        let width = rows.first().map_or(0, |r| r.as_ref().len());
        if let Some((y, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.as_ref().len() != width)
        {
            return Err(PipelineError::InvalidDepthMap(format!(
                "row {y} has {} samples, expected {width}",
                row.as_ref().len()
            )));
        }
        let samples = rows.iter().flat_map(|r| r.as_ref().iter().copied()).collect();
        Self::new(width, rows.len(), samples)
    }

    /// Convert a grayscale raster: each luma byte becomes one sample in
    /// `0..=255`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidDepthMap`] if the image is empty.
    pub fn from_gray(image: &GrayImage) -> Result<Self, PipelineError> {
        let samples = image.as_raw().iter().map(|&v| i16::from(v)).collect();
        Self::new(image.width() as usize, image.height() as usize, samples)
    }

    /// Width in samples.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Height in samples.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Width and height as [`Dimensions`].
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: u32::try_from(self.width).unwrap_or(u32::MAX),
            height: u32::try_from(self.height).unwrap_or(u32::MAX),
        }
    }

    /// Sample at column `x`, row `y`.
    ///
    /// Out-of-range coordinates read as 0.
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> i16 {
        if x >= self.width {
            return 0;
        }
        self.samples.get(y * self.width + x).copied().unwrap_or(0)
    }

    /// One row of samples. Rows past the bottom edge are empty.
    #[must_use]
    pub fn row(&self, y: usize) -> &[i16] {
        let start = y * self.width;
        self.samples.get(start..start + self.width).unwrap_or(&[])
    }

    /// Iterate over the rows, top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &[i16]> {
        self.samples.chunks_exact(self.width)
    }

    /// All samples, row-major.
    #[must_use]
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Largest sample in the map.
    #[must_use]
    pub fn max(&self) -> i16 {
        self.samples.iter().copied().max().unwrap_or(0)
    }
}

/// A transform producing a new depth map from an existing one.
pub trait DepthMapTransform {
    /// Apply the transform.
    fn transform(&self, input: &DepthMap) -> DepthMap;
}

/// Multiply every sample by a fixed factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleTransform(pub f32);

impl DepthMapTransform for ScaleTransform {
    fn transform(&self, input: &DepthMap) -> DepthMap {
        rescale_by_factor(input, self.0)
    }
}

/// Rescale so that the largest sample becomes the target depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxDepthTransform(pub i32);

impl DepthMapTransform for MaxDepthTransform {
    fn transform(&self, input: &DepthMap) -> DepthMap {
        rescale_to_max(input, self.0)
    }
}

/// Multiply every sample by `scale`, truncating toward zero.
///
/// Products outside the `i16` range saturate at `i16::MIN`/`i16::MAX`
/// and NaN maps to 0.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn rescale_by_factor(input: &DepthMap, scale: f32) -> DepthMap {
    let samples = input
        .samples
        .iter()
        .map(|&v| (f32::from(v) * scale) as i16)
        .collect();
    DepthMap {
        width: input.width,
        height: input.height,
        samples,
    }
}

/// Rescale so the largest sample maps to `target_max`.
///
/// A map whose largest sample is zero or negative cannot be scaled up
/// to a positive target; it is returned unchanged.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rescale_to_max(input: &DepthMap, target_max: i32) -> DepthMap {
    let max = input.max();
    if max <= 0 {
        tracing::warn!(max, "depth map has no positive samples, not rescaling");
        return input.clone();
    }
    let scale = target_max as f32 / f32::from(max);
    rescale_by_factor(input, scale)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_wrong_sample_count() {
        assert!(matches!(
            DepthMap::new(3, 2, vec![0; 5]),
            Err(PipelineError::InvalidDepthMap(_))
        ));
    }

    #[test]
    fn new_rejects_empty() {
        assert!(DepthMap::new(0, 4, vec![]).is_err());
        assert!(DepthMap::from_rows::<Vec<i16>>(&[]).is_err());
    }

    #[test]
    fn from_rows_rejects_ragged_rows() {
        let result = DepthMap::from_rows(&[vec![1, 2, 3], vec![4, 5]]);
        assert!(matches!(result, Err(PipelineError::InvalidDepthMap(_))));
    }

    #[test]
    fn accessors() {
        let map = DepthMap::from_rows(&[[1, 2, 3], [4, 5, 6]]).unwrap();
        assert_eq!(map.width(), 3);
        assert_eq!(map.height(), 2);
        assert_eq!(map.get(2, 1), 6);
        assert_eq!(map.get(3, 0), 0);
        assert_eq!(map.row(1), &[4, 5, 6]);
        assert!(map.row(2).is_empty());
        assert_eq!(map.rows().count(), 2);
        assert_eq!(map.max(), 6);
        assert_eq!(
            map.dimensions(),
            Dimensions {
                width: 3,
                height: 2
            }
        );
    }

    #[test]
    fn from_gray_copies_luma() {
        let gray = GrayImage::from_fn(4, 2, |x, y| image::Luma([u8::try_from(x * 10 + y).unwrap()]));
        let map = DepthMap::from_gray(&gray).unwrap();
        assert_eq!(map.get(3, 1), 31);
        assert_eq!(map.get(0, 0), 0);
    }

    #[test]
    fn rescale_to_max_truncates_toward_zero() {
        let map = DepthMap::from_rows(&[[0, 7, 13, 25, 50]]).unwrap();
        let scaled = rescale_to_max(&map, 20);
        // 20 / 50 = 0.4
        assert_eq!(scaled.row(0), &[0, 2, 5, 10, 20]);
        for (&before, &after) in map.samples().iter().zip(scaled.samples()) {
            assert_eq!(after, (f32::from(before) * 0.4) as i16);
        }
    }

    #[test]
    fn rescale_leaves_input_untouched() {
        let map = DepthMap::from_rows(&[[10, 20]]).unwrap();
        let _ = MaxDepthTransform(5).transform(&map);
        assert_eq!(map.row(0), &[10, 20]);
    }

    #[test]
    fn all_zero_map_is_returned_unchanged() {
        let map = DepthMap::from_rows(&[[0, 0], [0, 0]]).unwrap();
        assert_eq!(rescale_to_max(&map, 30), map);
    }

    #[test]
    fn rescale_saturates_instead_of_wrapping() {
        let map = DepthMap::from_rows(&[[1, 2]]).unwrap();
        let scaled = rescale_to_max(&map, 100_000);
        assert_eq!(scaled.row(0), &[i16::MAX, i16::MAX]);
    }

    #[test]
    fn negative_samples_truncate_toward_zero() {
        let map = DepthMap::from_rows(&[[-5, 10]]).unwrap();
        let scaled = ScaleTransform(0.5).transform(&map);
        assert_eq!(scaled.row(0), &[-2, 5]);
    }

    #[test]
    fn target_zero_flattens_the_map() {
        let map = DepthMap::from_rows(&[[3, 9]]).unwrap();
        assert_eq!(rescale_to_max(&map, 0).row(0), &[0, 0]);
    }
}
