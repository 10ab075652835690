//! Shared types for the stereogram pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::offset::OffsetStrategyKind;
use crate::raster::ResizeFilter;

/// Re-export `GrayImage` so downstream crates can hand decoded depth
/// rasters to the pipeline without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbaImage` so downstream crates can save the rendered
/// stereogram without depending on `image` directly.
pub use image::RgbaImage;

/// A pixel packed as `0xAABBGGRR`: red in the lowest byte, then green,
/// then blue, with alpha in the highest byte.
pub type PackedPixel = u32;

/// Pack an RGBA quadruple into a [`PackedPixel`].
#[must_use]
pub const fn pack_rgba(rgba: [u8; 4]) -> PackedPixel {
    u32::from_le_bytes(rgba)
}

/// Unpack a [`PackedPixel`] into its RGBA quadruple.
#[must_use]
pub const fn unpack_rgba(pixel: PackedPixel) -> [u8; 4] {
    pixel.to_le_bytes()
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A rectangular grid of packed pixels, stored row-major.
///
/// This is the pipeline's output buffer and the form the decoded
/// texture takes before it is split into rings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedImage {
    width: u32,
    height: u32,
    pixels: Vec<PackedPixel>,
}

impl PackedImage {
    /// Allocate a zeroed (transparent black) image.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize],
        }
    }

    /// Pack every pixel of an RGBA image.
    #[must_use]
    pub fn from_rgba(image: &RgbaImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            pixels: image.pixels().map(|p| pack_rgba(p.0)).collect(),
        }
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Width and height as [`Dimensions`].
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }

    /// One row of packed pixels.
    ///
    /// Rows past the bottom edge are empty.
    #[must_use]
    pub fn row(&self, y: u32) -> &[PackedPixel] {
        let width = self.width as usize;
        let start = y as usize * width;
        self.pixels.get(start..start + width).unwrap_or(&[])
    }

    /// Mutable access to one row of packed pixels.
    pub fn row_mut(&mut self, y: u32) -> &mut [PackedPixel] {
        let width = self.width as usize;
        let start = y as usize * width;
        self.pixels.get_mut(start..start + width).unwrap_or(&mut [])
    }

    /// Iterate over the rows, top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &[PackedPixel]> {
        self.pixels.chunks_exact(self.width.max(1) as usize)
    }

    /// Iterate mutably over the rows, top to bottom.
    pub fn rows_mut(&mut self) -> impl Iterator<Item = &mut [PackedPixel]> {
        self.pixels.chunks_exact_mut(self.width.max(1) as usize)
    }

    /// All pixels, row-major.
    #[must_use]
    pub fn pixels(&self) -> &[PackedPixel] {
        &self.pixels
    }

    /// Convert into an `RgbaImage` for display or encoding.
    #[must_use]
    pub fn to_rgba_image(&self) -> RgbaImage {
        let raw: Vec<u8> = self.pixels.iter().flat_map(|&p| unpack_rgba(p)).collect();
        RgbaImage::from_raw(self.width, self.height, raw)
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }
}

/// Black border added around a decoded depth map, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Padding {
    /// Columns added to the left edge.
    pub left: u32,
    /// Columns added to the right edge.
    pub right: u32,
    /// Rows added to the top edge.
    pub top: u32,
    /// Rows added to the bottom edge.
    pub bottom: u32,
}

impl Padding {
    /// No border at all.
    pub const NONE: Self = Self {
        left: 0,
        right: 0,
        top: 0,
        bottom: 0,
    };

    /// Same border on every side.
    #[must_use]
    pub const fn uniform(amount: u32) -> Self {
        Self {
            left: amount,
            right: amount,
            top: amount,
            bottom: amount,
        }
    }

    /// Size of a `width` x `height` image with this border added, or
    /// `None` if either side overflows `u32`.
    #[must_use]
    pub fn around(self, width: u32, height: u32) -> Option<(u32, u32)> {
        let width = width.checked_add(self.left)?.checked_add(self.right)?;
        let height = height.checked_add(self.top)?.checked_add(self.bottom)?;
        Some((width, height))
    }
}

impl Default for Padding {
    fn default() -> Self {
        StereogramConfig::DEFAULT_DEPTH_PADDING
    }
}

/// Configuration for the stereogram pipeline.
///
/// Every field maps onto one parameter node of
/// [`StereogramPipeline`](crate::StereogramPipeline); the image sources
/// are not part of the config since they are opaque handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StereogramConfig {
    /// Largest depth sample after rescaling, in pixels of ring shrink.
    pub max_depth: i32,

    /// Width the texture is resized to before tiling. Must be at least 1.
    pub texture_width: u32,

    /// How each texture row is pre-rotated before synthesis.
    pub offset_strategy: OffsetStrategyKind,

    /// Swap near and far: depth increases grow the ring instead of
    /// shrinking it.
    pub invert: bool,

    /// Border added around the depth map when it is decoded.
    pub depth_padding: Padding,

    /// Resampling filter used to resize the texture.
    pub texture_filter: ResizeFilter,
}

impl StereogramConfig {
    /// Default maximum depth.
    pub const DEFAULT_MAX_DEPTH: i32 = 20;

    /// Default texture width in pixels.
    pub const DEFAULT_TEXTURE_WIDTH: u32 = 128;

    /// Default offset strategy.
    pub const DEFAULT_OFFSET_STRATEGY: OffsetStrategyKind = OffsetStrategyKind::Zero;

    /// Default depth-map border.
    pub const DEFAULT_DEPTH_PADDING: Padding = Padding {
        left: 159,
        right: 159,
        top: 40,
        bottom: 40,
    };

    /// Default texture resampling filter (bicubic).
    pub const DEFAULT_TEXTURE_FILTER: ResizeFilter = ResizeFilter::CatmullRom;

    /// Check the invariants that the pipeline relies on.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `texture_width` is zero,
    /// `max_depth` is negative, or the padding on opposite sides sums past
    /// `u32::MAX`.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.texture_width == 0 {
            return Err(PipelineError::InvalidConfig(
                "texture_width must be at least 1".to_string(),
            ));
        }
        if self.max_depth < 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "max_depth must not be negative, got {}",
                self.max_depth
            )));
        }
        if self.depth_padding.around(0, 0).is_none() {
            return Err(PipelineError::InvalidConfig(format!(
                "depth_padding {:?} overflows the image size",
                self.depth_padding
            )));
        }
        Ok(())
    }
}

impl Default for StereogramConfig {
    fn default() -> Self {
        Self {
            max_depth: Self::DEFAULT_MAX_DEPTH,
            texture_width: Self::DEFAULT_TEXTURE_WIDTH,
            offset_strategy: Self::DEFAULT_OFFSET_STRATEGY,
            invert: false,
            depth_padding: Self::DEFAULT_DEPTH_PADDING,
            texture_filter: Self::DEFAULT_TEXTURE_FILTER,
        }
    }
}

/// Errors that can occur while building or evaluating the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode an input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// An image source could not produce its data.
    #[error("failed to read source {name}: {reason}")]
    SourceRead {
        /// Display name of the source.
        name: String,
        /// Underlying failure, rendered as text.
        reason: String,
    },

    /// No source has been selected for an input.
    #[error("no {0} source selected")]
    MissingSource(&'static str),

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// Depth samples do not form a non-empty rectangle.
    #[error("invalid depth map: {0}")]
    InvalidDepthMap(String),

    /// The texture has no pixels.
    #[error("texture has no pixels")]
    EmptyTexture,

    /// A node was pulled before one of its inputs was connected.
    #[error("node {node} pulled with input slot {slot} unconnected")]
    UnconnectedInput {
        /// Name of the node that was pulled.
        node: &'static str,
        /// Zero-based slot index.
        slot: usize,
    },

    /// An offset table does not have one entry per texture row.
    #[error("expected {expected} texture offsets, got {actual}")]
    OffsetCountMismatch {
        /// Number of rows in the texture grid.
        expected: usize,
        /// Number of offsets supplied.
        actual: usize,
    },

    /// A texture grid has fewer rings than the depth map has rows.
    #[error("texture grid has {actual} rows, depth map needs {expected}")]
    GridHeightMismatch {
        /// Rows in the depth map.
        expected: usize,
        /// Rows in the texture grid.
        actual: usize,
    },

    /// Two rasters that must line up have different sizes.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Required dimensions.
        expected: Dimensions,
        /// Dimensions actually supplied.
        actual: Dimensions,
    },
}
