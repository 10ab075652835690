//! The stereogram graph: parameter constants wired into derived stages.
//!
//! ```text
//! depth source ─┐
//! depth padding ┴─ depth map ─┬─────────────────────── buffer ───────────┐
//!                             │                                          │
//! max depth ──────────────────┴─ rescaled ─┬─────────────────────────── stereogram
//!                                          │                             │
//! texture source ┐                         │                             │
//! texture width  ┼─ texture image ─ texture data ─┬─ texture grid ───────┘
//! texture filter ┘                 offset ────────┤
//!                                  invert ────────┘
//! ```
//!
//! Every parameter is a [`ConstantNode`]; every stage is a [`Node`]. The
//! graph is wired once in [`StereogramPipeline::new`] and pulled through
//! [`StereogramPipeline::output`].

use std::rc::Rc;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::depth::{DepthMap, DepthMapTransform, MaxDepthTransform};
use crate::node::{ConstantNode, Node, Output, Slot};
use crate::offset::{OffsetStrategy, OffsetStrategyKind};
use crate::raster::{self, ResizeFilter};
use crate::source::SourceRef;
use crate::synth;
use crate::texture::TextureGrid;
use crate::types::{PackedImage, Padding, PipelineError, StereogramConfig};

type DepthMapNode = Node<(Slot<Option<SourceRef>>, Slot<Padding>), Rc<DepthMap>>;
type RescaleNode = Node<(Slot<Rc<DepthMap>>, Slot<i32>), Rc<DepthMap>>;
type TextureImageNode = Node<(Slot<Option<SourceRef>>, Slot<u32>, Slot<ResizeFilter>), Rc<RgbaImage>>;
type TextureDataNode = Node<(Slot<Rc<RgbaImage>>,), Rc<PackedImage>>;
type TextureGridNode = Node<
    (
        Slot<Rc<PackedImage>>,
        Slot<Rc<DepthMap>>,
        Slot<OffsetStrategyKind>,
        Slot<bool>,
    ),
    Rc<TextureGrid>,
>;
type BufferNode = Node<(Slot<Rc<DepthMap>>,), Rc<PackedImage>>;
type StereogramNode = Node<(Slot<Rc<DepthMap>>, Slot<Rc<TextureGrid>>, Slot<Rc<PackedImage>>), Rc<PackedImage>>;

/// How many times each derived stage has recomputed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecomputeCounts {
    /// Decode and pad the depth-map source.
    pub depth_map: u64,
    /// Rescale the depth map to the maximum depth.
    pub rescaled: u64,
    /// Decode and resize the texture source.
    pub texture_image: u64,
    /// Pack the texture pixels.
    pub texture_data: u64,
    /// Build the rings and apply offsets.
    pub texture_grid: u64,
    /// Allocate the output buffer.
    pub buffer: u64,
    /// Synthesize the stereogram.
    pub stereogram: u64,
}

impl RecomputeCounts {
    /// Recomputes that happened between `earlier` and `self`.
    #[must_use]
    pub const fn since(&self, earlier: &Self) -> Self {
        Self {
            depth_map: self.depth_map.saturating_sub(earlier.depth_map),
            rescaled: self.rescaled.saturating_sub(earlier.rescaled),
            texture_image: self.texture_image.saturating_sub(earlier.texture_image),
            texture_data: self.texture_data.saturating_sub(earlier.texture_data),
            texture_grid: self.texture_grid.saturating_sub(earlier.texture_grid),
            buffer: self.buffer.saturating_sub(earlier.buffer),
            stereogram: self.stereogram.saturating_sub(earlier.stereogram),
        }
    }
}

/// Incremental stereogram renderer.
///
/// Setters replace parameter values and invalidate dependent stages;
/// [`output`](Self::output) recomputes only what was invalidated.
#[derive(Debug)]
pub struct StereogramPipeline {
    depth_source: Rc<ConstantNode<Option<SourceRef>>>,
    depth_padding: Rc<ConstantNode<Padding>>,
    max_depth: Rc<ConstantNode<i32>>,
    texture_source: Rc<ConstantNode<Option<SourceRef>>>,
    texture_width: Rc<ConstantNode<u32>>,
    texture_filter: Rc<ConstantNode<ResizeFilter>>,
    offset_strategy: Rc<ConstantNode<OffsetStrategyKind>>,
    invert: Rc<ConstantNode<bool>>,

    depth_map: Rc<DepthMapNode>,
    rescaled: Rc<RescaleNode>,
    texture_image: Rc<TextureImageNode>,
    texture_data: Rc<TextureDataNode>,
    texture_grid: Rc<TextureGridNode>,
    buffer: Rc<BufferNode>,
    stereogram: Rc<StereogramNode>,
}

impl Default for StereogramPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl StereogramPipeline {
    /// Build the graph with default parameters and no sources selected.
    #[must_use]
    pub fn new() -> Self {
        let config = StereogramConfig::default();

        let depth_source = ConstantNode::new("depth_source", None);
        let depth_padding = ConstantNode::new("depth_padding", config.depth_padding);
        let max_depth = ConstantNode::new("max_depth", config.max_depth);
        let texture_source = ConstantNode::new("texture_source", None);
        let texture_width = ConstantNode::new("texture_width", config.texture_width);
        let texture_filter = ConstantNode::new("texture_filter", config.texture_filter);
        let offset_strategy = ConstantNode::new("offset_strategy", config.offset_strategy);
        let invert = ConstantNode::new("invert", config.invert);

        let depth_map = DepthMapNode::new("depth_map", |(source, padding)| {
            let source = source.ok_or(PipelineError::MissingSource("depth map"))?;
            let image = source.load()?;
            let map = DepthMap::from_gray(&raster::pad_gray(&image, padding)?)?;
            tracing::info!(
                source = source.name(),
                dimensions = %map.dimensions(),
                "loaded depth map"
            );
            Ok(Rc::new(map))
        });
        depth_map.connect::<0>(&depth_source);
        depth_map.connect::<1>(&depth_padding);

        let rescaled = RescaleNode::new("rescaled", |(map, max_depth)| {
            Ok(Rc::new(MaxDepthTransform(max_depth).transform(&map)))
        });
        rescaled.connect::<0>(&depth_map);
        rescaled.connect::<1>(&max_depth);

        let texture_image = TextureImageNode::new("texture_image", |(source, width, filter)| {
            let source = source.ok_or(PipelineError::MissingSource("texture"))?;
            if width == 0 {
                return Err(PipelineError::InvalidConfig(
                    "texture_width must be at least 1".to_string(),
                ));
            }
            let image = source.load()?.to_rgba8();
            let resized = raster::resize_to_width(&image, width, filter);
            tracing::info!(
                source = source.name(),
                width = resized.width(),
                height = resized.height(),
                %filter,
                "loaded texture"
            );
            Ok(Rc::new(resized))
        });
        texture_image.connect::<0>(&texture_source);
        texture_image.connect::<1>(&texture_width);
        texture_image.connect::<2>(&texture_filter);

        let texture_data = TextureDataNode::new("texture_data", |(image,)| {
            Ok(Rc::new(PackedImage::from_rgba(&image)))
        });
        texture_data.connect::<0>(&texture_image);

        let texture_grid = TextureGridNode::new("texture_grid", |(data, depth, strategy, invert)| {
            let mut grid = TextureGrid::new(&data, depth.height(), invert)?;
            let offsets = strategy.offsets(&depth, &grid);
            grid.set_initial_offsets(&offsets)?;
            Ok(Rc::new(grid))
        });
        texture_grid.connect::<0>(&texture_data);
        texture_grid.connect::<1>(&rescaled);
        texture_grid.connect::<2>(&offset_strategy);
        texture_grid.connect::<3>(&invert);

        let buffer = BufferNode::new("buffer", |(depth,)| {
            let dimensions = depth.dimensions();
            Ok(Rc::new(PackedImage::new(dimensions.width, dimensions.height)))
        });
        buffer.connect::<0>(&depth_map);

        let stereogram = StereogramNode::new("stereogram", |(depth, grid, buffer)| {
            // The cached grid and buffer stay pristine for the next pass.
            let grid = TextureGrid::clone(&grid);
            let mut out = PackedImage::clone(&buffer);
            synth::synthesize(&depth, grid, &mut out)?;
            Ok(Rc::new(out))
        });
        stereogram.connect::<0>(&rescaled);
        stereogram.connect::<1>(&texture_grid);
        stereogram.connect::<2>(&buffer);

        Self {
            depth_source,
            depth_padding,
            max_depth,
            texture_source,
            texture_width,
            texture_filter,
            offset_strategy,
            invert,
            depth_map,
            rescaled,
            texture_image,
            texture_data,
            texture_grid,
            buffer,
            stereogram,
        }
    }

    /// Build the graph and apply `config`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `config` fails
    /// validation.
    pub fn with_config(config: &StereogramConfig) -> Result<Self, PipelineError> {
        let pipeline = Self::new();
        pipeline.apply_config(config)?;
        Ok(pipeline)
    }

    /// Pull the finished stereogram, recomputing whatever is stale.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MissingSource`] if either source is unset,
    /// and propagates decode or structural errors from any stage. Nothing
    /// is cached for a failed pull.
    pub fn output(&self) -> Result<Rc<PackedImage>, PipelineError> {
        self.stereogram.output()
    }

    /// The rescaled depth map that synthesis reads.
    ///
    /// # Errors
    ///
    /// Same as [`output`](Self::output), for the depth branch only.
    pub fn rescaled_depth_map(&self) -> Result<Rc<DepthMap>, PipelineError> {
        self.rescaled.output()
    }

    /// Whether [`output`](Self::output) would return without recomputing.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.stereogram.is_valid()
    }

    // ───── Parameters ─────

    /// Select the depth-map source.
    pub fn set_depth_source(&self, source: SourceRef) {
        self.depth_source.set(Some(source));
    }

    /// Deselect the depth-map source.
    pub fn clear_depth_source(&self) {
        self.depth_source.set(None);
    }

    /// The selected depth-map source, if any.
    #[must_use]
    pub fn depth_source(&self) -> Option<SourceRef> {
        self.depth_source.get()
    }

    /// Set the border added around the decoded depth map.
    pub fn set_depth_padding(&self, padding: Padding) {
        self.depth_padding.set(padding);
    }

    /// Current depth-map border.
    #[must_use]
    pub fn depth_padding(&self) -> Padding {
        self.depth_padding.get()
    }

    /// Set the depth the largest sample is rescaled to.
    pub fn set_max_depth(&self, max_depth: i32) {
        self.max_depth.set(max_depth);
    }

    /// Current maximum depth.
    #[must_use]
    pub fn max_depth(&self) -> i32 {
        self.max_depth.get()
    }

    /// Select the texture source.
    pub fn set_texture_source(&self, source: SourceRef) {
        self.texture_source.set(Some(source));
    }

    /// Deselect the texture source.
    pub fn clear_texture_source(&self) {
        self.texture_source.set(None);
    }

    /// The selected texture source, if any.
    #[must_use]
    pub fn texture_source(&self) -> Option<SourceRef> {
        self.texture_source.get()
    }

    /// Set the width, in pixels, the texture is resized to.
    pub fn set_texture_width(&self, width: u32) {
        self.texture_width.set(width);
    }

    /// Current texture width.
    #[must_use]
    pub fn texture_width(&self) -> u32 {
        self.texture_width.get()
    }

    /// Set the filter used to resize the texture.
    pub fn set_texture_filter(&self, filter: ResizeFilter) {
        self.texture_filter.set(filter);
    }

    /// Current texture resampling filter.
    #[must_use]
    pub fn texture_filter(&self) -> ResizeFilter {
        self.texture_filter.get()
    }

    /// Select the per-row offset strategy.
    pub fn set_offset_strategy(&self, strategy: OffsetStrategyKind) {
        self.offset_strategy.set(strategy);
    }

    /// Current offset strategy.
    #[must_use]
    pub fn offset_strategy(&self) -> OffsetStrategyKind {
        self.offset_strategy.get()
    }

    /// Swap near and far.
    pub fn set_invert(&self, invert: bool) {
        self.invert.set(invert);
    }

    /// Whether near and far are swapped.
    #[must_use]
    pub fn invert(&self) -> bool {
        self.invert.get()
    }

    // ───── Whole-config access ─────

    /// Apply every field of `config`.
    ///
    /// Only parameters whose value differs from the current one are set,
    /// so re-applying the same config invalidates nothing.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `config` fails
    /// validation, in which case no parameter is changed.
    pub fn apply_config(&self, config: &StereogramConfig) -> Result<(), PipelineError> {
        config.validate()?;
        set_if_changed(&self.max_depth, config.max_depth);
        set_if_changed(&self.texture_width, config.texture_width);
        set_if_changed(&self.offset_strategy, config.offset_strategy);
        set_if_changed(&self.invert, config.invert);
        set_if_changed(&self.depth_padding, config.depth_padding);
        set_if_changed(&self.texture_filter, config.texture_filter);
        tracing::debug!(?config, "applied config");
        Ok(())
    }

    /// Current parameter values as a config.
    #[must_use]
    pub fn config(&self) -> StereogramConfig {
        StereogramConfig {
            max_depth: self.max_depth(),
            texture_width: self.texture_width(),
            offset_strategy: self.offset_strategy(),
            invert: self.invert(),
            depth_padding: self.depth_padding(),
            texture_filter: self.texture_filter(),
        }
    }

    /// Snapshot of the per-stage recompute counters.
    #[must_use]
    pub fn recompute_counts(&self) -> RecomputeCounts {
        RecomputeCounts {
            depth_map: self.depth_map.recompute_count(),
            rescaled: self.rescaled.recompute_count(),
            texture_image: self.texture_image.recompute_count(),
            texture_data: self.texture_data.recompute_count(),
            texture_grid: self.texture_grid.recompute_count(),
            buffer: self.buffer.recompute_count(),
            stereogram: self.stereogram.recompute_count(),
        }
    }
}

fn set_if_changed<T>(node: &ConstantNode<T>, value: T)
where
    T: Clone + PartialEq + std::fmt::Debug + 'static,
{
    if node.get() != value {
        node.set(value);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::{GrayImage, Luma, Rgba};

    use super::*;
    use crate::source::{CachedSource, EncodedSource, RasterSource};

    fn depth_source() -> SourceRef {
        Rc::new(RasterSource::new(
            "steps",
            GrayImage::from_fn(12, 4, |x, _| Luma([if (4..8).contains(&x) { 50 } else { 0 }])),
        ))
    }

    fn texture_source(width: u32) -> SourceRef {
        Rc::new(RasterSource::new(
            "stripes",
            RgbaImage::from_fn(width, 2, |x, y| {
                Rgba([u8::try_from(x).unwrap(), u8::try_from(y).unwrap(), 0, 255])
            }),
        ))
    }

    fn small_pipeline() -> StereogramPipeline {
        let config = StereogramConfig {
            depth_padding: Padding::NONE,
            texture_width: 6,
            max_depth: 2,
            ..StereogramConfig::default()
        };
        let pipeline = StereogramPipeline::with_config(&config).unwrap();
        pipeline.set_depth_source(depth_source());
        pipeline.set_texture_source(texture_source(6));
        pipeline
    }

    #[test]
    fn missing_sources_are_reported() {
        let pipeline = StereogramPipeline::new();
        assert!(matches!(
            pipeline.output(),
            Err(PipelineError::MissingSource("depth map"))
        ));
        pipeline.set_depth_source(depth_source());
        assert!(matches!(
            pipeline.output(),
            Err(PipelineError::MissingSource("texture"))
        ));
    }

    #[test]
    fn output_matches_depth_dimensions() {
        let pipeline = small_pipeline();
        let out = pipeline.output().unwrap();
        assert_eq!((out.width(), out.height()), (12, 4));
    }

    #[test]
    fn padding_grows_the_output() {
        let pipeline = small_pipeline();
        pipeline.set_depth_padding(Padding::uniform(2));
        let out = pipeline.output().unwrap();
        assert_eq!((out.width(), out.height()), (16, 8));
    }

    #[test]
    fn repeated_output_does_not_recompute() {
        let pipeline = small_pipeline();
        let first = pipeline.output().unwrap();
        let counts = pipeline.recompute_counts();
        assert!(pipeline.is_valid());
        let second = pipeline.output().unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(pipeline.recompute_counts(), counts);
        assert_eq!(counts.stereogram, 1);
    }

    #[test]
    fn max_depth_change_skips_decode_stages() {
        let pipeline = small_pipeline();
        pipeline.output().unwrap();
        pipeline.set_max_depth(3);
        pipeline.output().unwrap();
        assert_eq!(
            pipeline.recompute_counts(),
            RecomputeCounts {
                depth_map: 1,
                rescaled: 2,
                texture_image: 1,
                texture_data: 1,
                texture_grid: 2,
                buffer: 1,
                stereogram: 2,
            }
        );
    }

    #[test]
    fn texture_width_change_skips_depth_stages() {
        let pipeline = small_pipeline();
        pipeline.output().unwrap();
        let before = pipeline.recompute_counts();
        pipeline.set_texture_width(4);
        pipeline.output().unwrap();
        let delta = pipeline.recompute_counts().since(&before);
        assert_eq!(delta.depth_map, 0);
        assert_eq!(delta.texture_image, 1);
        let counts = pipeline.recompute_counts();
        assert_eq!((counts.depth_map, counts.rescaled, counts.buffer), (1, 1, 1));
        assert_eq!((counts.texture_image, counts.texture_data), (2, 2));
        assert_eq!((counts.texture_grid, counts.stereogram), (2, 2));
    }

    #[test]
    fn invert_and_offset_only_rebuild_the_grid() {
        let pipeline = small_pipeline();
        pipeline.output().unwrap();
        pipeline.set_invert(true);
        pipeline.set_offset_strategy(OffsetStrategyKind::CentreAlign);
        pipeline.output().unwrap();
        let counts = pipeline.recompute_counts();
        assert_eq!(counts.texture_image, 1);
        assert_eq!(counts.rescaled, 1);
        assert_eq!(counts.texture_grid, 2);
        assert_eq!(counts.stereogram, 2);
    }

    #[test]
    fn many_mutations_then_one_pull() {
        let pipeline = small_pipeline();
        pipeline.output().unwrap();
        for depth in 1..=10 {
            pipeline.set_max_depth(depth);
        }
        pipeline.output().unwrap();
        let counts = pipeline.recompute_counts();
        assert_eq!(counts.rescaled, 2);
        assert_eq!(counts.stereogram, 2);
        assert_eq!(pipeline.rescaled_depth_map().unwrap().max(), 10);
    }

    #[test]
    fn failed_decode_is_not_cached() {
        let pipeline = small_pipeline();
        pipeline.set_texture_source(Rc::new(EncodedSource::new("junk", vec![0xFF, 0x00])));
        assert!(matches!(
            pipeline.output(),
            Err(PipelineError::ImageDecode(_))
        ));
        assert!(!pipeline.is_valid());
        pipeline.set_texture_source(texture_source(6));
        assert!(pipeline.output().is_ok());
    }

    #[test]
    fn zero_texture_width_is_rejected_at_pull() {
        let pipeline = small_pipeline();
        pipeline.set_texture_width(0);
        assert!(matches!(
            pipeline.output(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn overflowing_padding_is_an_error_not_a_panic() {
        let pipeline = small_pipeline();
        pipeline.set_depth_padding(Padding {
            left: u32::MAX,
            right: 1,
            top: 0,
            bottom: 0,
        });
        assert!(matches!(
            pipeline.output(),
            Err(PipelineError::InvalidConfig(_))
        ));
        assert!(!pipeline.is_valid());

        let config = StereogramConfig {
            depth_padding: Padding::uniform(u32::MAX),
            ..StereogramConfig::default()
        };
        assert!(StereogramPipeline::with_config(&config).is_err());

        pipeline.set_depth_padding(Padding::NONE);
        assert!(pipeline.output().is_ok());
    }

    #[test]
    fn cached_source_survives_padding_and_width_changes() {
        let depth = Rc::new(CachedSource::new(depth_source()));
        let texture = Rc::new(CachedSource::new(texture_source(6)));
        let pipeline = small_pipeline();
        pipeline.set_depth_source(Rc::clone(&depth) as SourceRef);
        pipeline.set_texture_source(Rc::clone(&texture) as SourceRef);
        pipeline.output().unwrap();

        pipeline.set_depth_padding(Padding::uniform(2));
        pipeline.set_texture_width(4);
        let out = pipeline.output().unwrap();
        assert_eq!((out.width(), out.height()), (16, 8));

        pipeline.set_depth_source(Rc::clone(&depth) as SourceRef);
        pipeline.set_texture_source(Rc::clone(&texture) as SourceRef);
        pipeline.output().unwrap();

        assert_eq!(depth.inner_loads(), 1);
        assert_eq!(texture.inner_loads(), 1);
        assert_eq!(pipeline.recompute_counts().depth_map, 3);
    }

    #[test]
    fn flat_depth_reproduces_the_texture() {
        let pipeline = small_pipeline();
        pipeline.set_depth_source(Rc::new(RasterSource::new(
            "flat",
            GrayImage::from_pixel(9, 3, Luma([0])),
        )));
        let out = pipeline.output().unwrap();
        let texture = PackedImage::from_rgba(&RgbaImage::from_fn(6, 2, |x, y| {
            Rgba([u8::try_from(x).unwrap(), u8::try_from(y).unwrap(), 0, 255])
        }));
        for y in 0..3 {
            let source = texture.row(y % 2);
            let expected: Vec<_> = (0..9).map(|x| source[x % 6]).collect();
            assert_eq!(out.row(y), expected.as_slice());
        }
    }

    #[test]
    fn config_round_trips_through_the_pipeline() {
        let pipeline = StereogramPipeline::new();
        assert_eq!(pipeline.config(), StereogramConfig::default());
        let config = StereogramConfig {
            max_depth: 33,
            texture_width: 200,
            offset_strategy: OffsetStrategyKind::CentreAlign,
            invert: true,
            depth_padding: Padding::uniform(5),
            texture_filter: ResizeFilter::Gaussian,
        };
        pipeline.apply_config(&config).unwrap();
        assert_eq!(pipeline.config(), config);
    }

    #[test]
    fn reapplying_the_same_config_invalidates_nothing() {
        let pipeline = small_pipeline();
        pipeline.output().unwrap();
        pipeline.apply_config(&pipeline.config()).unwrap();
        assert!(pipeline.is_valid());
    }

    #[test]
    fn invalid_config_changes_nothing() {
        let pipeline = small_pipeline();
        let before = pipeline.config();
        let bad = StereogramConfig {
            texture_width: 0,
            max_depth: 7,
            ..before.clone()
        };
        assert!(pipeline.apply_config(&bad).is_err());
        assert_eq!(pipeline.config(), before);
    }

    #[test]
    fn sources_read_back() {
        let pipeline = StereogramPipeline::new();
        assert!(pipeline.depth_source().is_none());
        let source = depth_source();
        pipeline.set_depth_source(Rc::clone(&source));
        assert!(Rc::ptr_eq(&pipeline.depth_source().unwrap(), &source));
        pipeline.clear_depth_source();
        assert!(pipeline.depth_source().is_none());
    }
}
