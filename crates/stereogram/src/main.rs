//! Render a stereogram from a depth-map image and a texture image and
//! save it as a PNG.
//!
//! ```text
//! cargo run --release --bin stereogram -- depth.png texture.jpg -o out.png
//! ```

use std::path::PathBuf;
use std::rc::Rc;

use clap::{Parser, ValueEnum};
use stereogram::FileSource;
use stereogram_pipeline::{
    OffsetStrategyKind, Padding, ResizeFilter, StereogramConfig, StereogramPipeline,
};

/// Render a stereogram: the depth map appears as a relief when the
/// texture pattern is viewed with the eyes converged behind the image.
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Depth-map image. Brighter pixels are nearer.
    depth: PathBuf,

    /// Texture image, tiled across the output.
    texture: PathBuf,

    /// Output image path (PNG recommended).
    #[arg(short, long)]
    output: PathBuf,

    /// Depth, in pixels of pattern shift, of the brightest depth-map pixel.
    #[arg(long, default_value_t = StereogramConfig::DEFAULT_MAX_DEPTH,
          value_parser = clap::value_parser!(i32).range(0..))]
    max_depth: i32,

    /// Width the texture is resized to before tiling.
    #[arg(long, default_value_t = StereogramConfig::DEFAULT_TEXTURE_WIDTH,
          value_parser = clap::value_parser!(u32).range(1..))]
    texture_width: u32,

    /// Where the pattern is undistorted.
    #[arg(long, value_enum, default_value_t = Offset::Zero)]
    offset: Offset,

    /// Swap near and far.
    #[arg(long)]
    invert: bool,

    /// Texture resampling filter.
    #[arg(long, value_enum, default_value_t = Filter::CatmullRom)]
    filter: Filter,

    /// Border added around the depth map, as "LEFT,RIGHT,TOP,BOTTOM" or a
    /// single value for all sides.
    #[arg(long, value_name = "PIXELS", default_value = "159,159,40,40")]
    padding: String,

    /// Full config as a JSON string.
    ///
    /// When provided, all other rendering flags are ignored.
    #[arg(long)]
    config_json: Option<String>,

    /// Log each stage as it recomputes.
    #[arg(short, long)]
    verbose: bool,
}

/// Offset strategy selection.
#[derive(Clone, Copy, ValueEnum)]
enum Offset {
    /// Undistorted at the left edge.
    Zero,
    /// Undistorted at the horizontal centre.
    Centre,
}

/// Texture resampling filter selection.
#[derive(Clone, Copy, ValueEnum)]
enum Filter {
    /// Nearest-neighbor (fastest, blocky).
    Nearest,
    /// Bilinear interpolation.
    Triangle,
    /// Bicubic Catmull-Rom.
    CatmullRom,
    /// Gaussian (smooth).
    Gaussian,
    /// Lanczos with 3 lobes (sharpest).
    Lanczos3,
}

fn parse_padding(text: &str) -> Result<Padding, String> {
    let values = text
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<u32>()
                .map_err(|e| format!("invalid padding value '{v}': {e}"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    match values.as_slice() {
        [all] => Ok(Padding::uniform(*all)),
        [left, right, top, bottom] => Ok(Padding {
            left: *left,
            right: *right,
            top: *top,
            bottom: *bottom,
        }),
        _ => Err(format!(
            "padding must be one value or four comma-separated values, got '{text}'"
        )),
    }
}

fn config_from_args(args: &Args) -> Result<StereogramConfig, String> {
    if let Some(ref json) = args.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(StereogramConfig {
        max_depth: args.max_depth,
        texture_width: args.texture_width,
        offset_strategy: match args.offset {
            Offset::Zero => OffsetStrategyKind::Zero,
            Offset::Centre => OffsetStrategyKind::CentreAlign,
        },
        invert: args.invert,
        depth_padding: parse_padding(&args.padding).map_err(|e| format!("--padding: {e}"))?,
        texture_filter: match args.filter {
            Filter::Nearest => ResizeFilter::Nearest,
            Filter::Triangle => ResizeFilter::Triangle,
            Filter::CatmullRom => ResizeFilter::CatmullRom,
            Filter::Gaussian => ResizeFilter::Gaussian,
            Filter::Lanczos3 => ResizeFilter::Lanczos3,
        },
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    stereogram::init_logging(args.verbose);

    let config = config_from_args(&args)?;
    tracing::info!(?config, "rendering");

    let pipeline = StereogramPipeline::with_config(&config)?;
    pipeline.set_depth_source(Rc::new(FileSource::new(&args.depth)));
    pipeline.set_texture_source(Rc::new(FileSource::new(&args.texture)));

    let out = pipeline.output()?;
    tracing::info!(
        width = out.width(),
        height = out.height(),
        "rendered stereogram"
    );

    tracing::info!(path = %args.output.display(), "saving");
    out.to_rgba_image().save(&args.output)?;
    Ok(())
}
