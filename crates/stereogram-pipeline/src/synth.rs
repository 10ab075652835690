//! Stereogram synthesis.
//!
//! Walks each depth-map row left to right, feeding every change in depth
//! to that row's texture ring and emitting one ring pixel per column.

use crate::depth::DepthMap;
use crate::texture::TextureGrid;
use crate::types::{PackedImage, PipelineError};

/// Fill `out` with the stereogram of `depth` drawn from `grid`.
///
/// The grid is consumed: synthesis edits every ring in place, so a grid
/// is good for exactly one pass.
///
/// # Errors
///
/// Returns [`PipelineError::DimensionMismatch`] if `out` is not the same
/// size as `depth`, and [`PipelineError::GridHeightMismatch`] if the
/// grid has fewer rows than the depth map.
pub fn synthesize(
    depth: &DepthMap,
    mut grid: TextureGrid,
    out: &mut PackedImage,
) -> Result<(), PipelineError> {
    if out.dimensions() != depth.dimensions() {
        return Err(PipelineError::DimensionMismatch {
            expected: depth.dimensions(),
            actual: out.dimensions(),
        });
    }
    if grid.height() < depth.height() {
        return Err(PipelineError::GridHeightMismatch {
            expected: depth.height(),
            actual: grid.height(),
        });
    }

    for ((samples, row), pixels) in depth.rows().zip(grid.rows_mut()).zip(out.rows_mut()) {
        let mut last = samples.first().copied().unwrap_or(0);
        for (&current, pixel) in samples.iter().zip(pixels.iter_mut()) {
            let delta = i32::from(current) - i32::from(last);
            if delta != 0 {
                row.set_level_delta(delta);
                last = current;
            }
            *pixel = row.get_and_increment();
        }
    }
    Ok(())
}
