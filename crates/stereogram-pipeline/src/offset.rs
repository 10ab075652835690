//! Per-row starting offsets for the texture rings.
//!
//! Synthesis walks every row left to right, so without correction the
//! pattern is undistorted at the left edge and drifts further out of
//! shape toward the right. An [`OffsetStrategy`] computes, per row, how
//! far to pre-rotate the ring so the pattern is at rest somewhere else.
//!
//! Strategies are selected at runtime through [`OffsetStrategyKind`],
//! which also implements [`OffsetStrategy`] by dispatching to the
//! matching variant.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::depth::DepthMap;
use crate::texture::TextureGrid;

/// Selects which offset strategy to apply before synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OffsetStrategyKind {
    /// No rotation: the pattern is at rest at the left edge.
    #[default]
    Zero,
    /// Rotate each row so the pattern is at rest at the horizontal
    /// midpoint of the depth map.
    CentreAlign,
}

impl fmt::Display for OffsetStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zero => f.write_str("Zero"),
            Self::CentreAlign => f.write_str("CentreAlign"),
        }
    }
}

/// Computes one offset per depth-map row.
pub trait OffsetStrategy {
    /// Offsets for each row of `depth`, read against the unmutated rings
    /// of `grid`. The result has `depth.height()` entries.
    fn offsets(&self, depth: &DepthMap, grid: &TextureGrid) -> Vec<usize>;
}

impl OffsetStrategy for OffsetStrategyKind {
    fn offsets(&self, depth: &DepthMap, grid: &TextureGrid) -> Vec<usize> {
        match *self {
            Self::Zero => vec![0; depth.height()],
            Self::CentreAlign => centre_align(depth, grid),
        }
    }
}

/// Simulate each ring up to the midpoint without touching it.
///
/// Replays the same width arithmetic [`TextureRow::set_level_delta`]
/// performs, honouring the row's invert flag, and tracks where the
/// cursor would land.
///
/// [`TextureRow::set_level_delta`]: crate::texture::TextureRow::set_level_delta
fn centre_align(depth: &DepthMap, grid: &TextureGrid) -> Vec<usize> {
    let midpoint = depth.width() / 2;
    (0..depth.height())
        .map(|y| {
            let Some(row) = grid.row(y) else {
                return 0;
            };
            // An inverted ring grows where a plain one shrinks. The plain
            // `width -= delta` walk would mispredict those rows.
            let sign: i64 = if row.invert() { -1 } else { 1 };
            let mut width = i64::try_from(row.len()).unwrap_or(i64::MAX);
            let mut position: i64 = 0;
            let mut last = depth.get(0, y);
            for &current in &depth.row(y)[..midpoint] {
                let delta = i64::from(current) - i64::from(last);
                width -= delta * sign;
                if width < 1 {
                    tracing::debug!(y, width, "clamping simulated ring width to 1");
                    width = 1;
                }
                position = (position + 1) % width;
                last = current;
            }
            usize::try_from(position).unwrap_or(0)
        })
        .collect()
}
