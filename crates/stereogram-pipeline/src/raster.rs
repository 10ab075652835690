//! Raster collaborators: decoding, padding and resizing.
//!
//! Everything here operates on in-memory bytes and images. Reading files
//! is left to the binaries.

use std::fmt;

use image::{DynamicImage, GrayImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::types::{Padding, PipelineError};

/// Resampling filter used when resizing the texture.
///
/// Ordered from fastest/lowest-quality to slowest/highest-quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResizeFilter {
    /// Nearest-neighbor: fastest, blocky artifacts.
    Nearest,
    /// Bilinear interpolation.
    Triangle,
    /// Bicubic (Catmull-Rom).
    #[default]
    CatmullRom,
    /// Gaussian: smooth output.
    Gaussian,
    /// Lanczos with 3 lobes: sharpest.
    Lanczos3,
}

impl ResizeFilter {
    /// Convert to the `image` crate's `FilterType`.
    #[must_use]
    pub const fn to_image_filter(self) -> image::imageops::FilterType {
        match self {
            Self::Nearest => image::imageops::FilterType::Nearest,
            Self::Triangle => image::imageops::FilterType::Triangle,
            Self::CatmullRom => image::imageops::FilterType::CatmullRom,
            Self::Gaussian => image::imageops::FilterType::Gaussian,
            Self::Lanczos3 => image::imageops::FilterType::Lanczos3,
        }
    }
}

impl fmt::Display for ResizeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => f.write_str("Nearest"),
            Self::Triangle => f.write_str("Triangle"),
            Self::CatmullRom => f.write_str("CatmullRom"),
            Self::Gaussian => f.write_str("Gaussian"),
            Self::Lanczos3 => f.write_str("Lanczos3"),
        }
    }
}

/// Decode raw image bytes (PNG, JPEG, BMP, WebP).
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the format is unrecognized
/// or the data is corrupt.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }
    Ok(image::load_from_memory(bytes)?)
}

/// Convert to grayscale and surround with a black border.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if the padded size does not
/// fit in `u32`.
pub fn pad_gray(image: &DynamicImage, padding: Padding) -> Result<GrayImage, PipelineError> {
    let gray = image.to_luma8();
    if padding == Padding::NONE {
        return Ok(gray);
    }
    let (width, height) = padding
        .around(gray.width(), gray.height())
        .ok_or_else(|| {
            PipelineError::InvalidConfig(format!(
                "depth padding {padding:?} around a {}x{} image overflows",
                gray.width(),
                gray.height()
            ))
        })?;
    let mut canvas = GrayImage::new(width, height);
    image::imageops::overlay(
        &mut canvas,
        &gray,
        i64::from(padding.left),
        i64::from(padding.top),
    );
    Ok(canvas)
}

/// Scale `image` to `width` pixels wide, preserving aspect ratio.
///
/// The new height is `height * width / original_width`, truncated and
/// at least 1. An image already `width` wide is returned as is.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn resize_to_width(image: &RgbaImage, width: u32, filter: ResizeFilter) -> RgbaImage {
    if image.width() == width || image.width() == 0 || width == 0 {
        return image.clone();
    }
    let height = (u64::from(image.height()) * u64::from(width) / u64::from(image.width()))
        .clamp(1, u64::from(u32::MAX)) as u32;
    image::imageops::resize(image, width, height, filter.to_image_filter())
}
