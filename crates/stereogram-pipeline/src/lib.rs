//! stereogram-pipeline: incremental stereogram rendering (sans-IO).
//!
//! A depth map and a repeating texture go in; a packed-pixel image comes
//! out that, viewed with the eyes converged behind the page, shows the
//! depth map as a relief.
//!
//! Each output row is drawn from a circular ring of texture pixels.
//! Wherever depth changes between neighbouring columns the ring is
//! shortened or lengthened in place, changing the period of the pattern
//! from that point on. See [`texture`] and [`synth`].
//!
//! The stages are wired into a small memoizing graph ([`node`]) by
//! [`StereogramPipeline`], so changing one parameter recomputes only the
//! stages downstream of it.
//!
//! This crate has **no I/O dependencies**. Images reach it as encoded
//! bytes or decoded rasters through [`ImageSource`]; reading files and
//! saving results lives in the binaries.

pub mod depth;
pub mod node;
pub mod offset;
pub mod pipeline;
pub mod raster;
pub mod source;
pub mod synth;
pub mod texture;
pub mod types;

pub use depth::{DepthMap, DepthMapTransform, MaxDepthTransform, ScaleTransform};
pub use offset::{OffsetStrategy, OffsetStrategyKind};
pub use pipeline::{RecomputeCounts, StereogramPipeline};
pub use raster::ResizeFilter;
pub use source::{CachedSource, EncodedSource, ImageSource, RasterSource, SourceRef};
pub use synth::synthesize;
pub use texture::{TextureGrid, TextureRow};
pub use types::{
    Dimensions, PackedImage, PackedPixel, Padding, PipelineError, StereogramConfig, pack_rgba,
    unpack_rgba,
};
