//! Integration test: drive the full pipeline from encoded PNG bytes and
//! check it against the stages run by hand.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::rc::Rc;

use image::{GrayImage, Luma, Rgba, RgbaImage};
use stereogram_pipeline::{
    DepthMap, DepthMapTransform, EncodedSource, MaxDepthTransform, OffsetStrategy,
    OffsetStrategyKind, PackedImage, Padding, RecomputeCounts, StereogramConfig,
    StereogramPipeline, TextureGrid, raster, synthesize,
};

fn encode_png(img: &image::DynamicImage) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// A raised disc in the middle of a flat field.
fn disc_depth() -> GrayImage {
    GrayImage::from_fn(64, 32, |x, y| {
        let dx = f64::from(x) - 32.0;
        let dy = f64::from(y) - 16.0;
        if dx.hypot(dy) < 10.0 {
            Luma([180])
        } else {
            Luma([30])
        }
    })
}

fn noise_texture() -> RgbaImage {
    RgbaImage::from_fn(96, 40, |x, y| {
        let v = (x * 37 + y * 101) % 251;
        Rgba([
            u8::try_from(v).unwrap(),
            u8::try_from((v * 3) % 256).unwrap(),
            u8::try_from((v * 7) % 256).unwrap(),
            255,
        ])
    })
}

fn render_by_hand(depth_png: &[u8], texture_png: &[u8], config: &StereogramConfig) -> PackedImage {
    let depth_image = raster::decode(depth_png).unwrap();
    let depth =
        DepthMap::from_gray(&raster::pad_gray(&depth_image, config.depth_padding).unwrap()).unwrap();
    let rescaled = MaxDepthTransform(config.max_depth).transform(&depth);

    let texture = raster::decode(texture_png).unwrap().to_rgba8();
    let texture = raster::resize_to_width(&texture, config.texture_width, config.texture_filter);
    let texture = PackedImage::from_rgba(&texture);

    let mut grid = TextureGrid::new(&texture, rescaled.height(), config.invert).unwrap();
    let offsets = config.offset_strategy.offsets(&rescaled, &grid);
    grid.set_initial_offsets(&offsets).unwrap();

    let dimensions = depth.dimensions();
    let mut out = PackedImage::new(dimensions.width, dimensions.height);
    synthesize(&rescaled, grid, &mut out).unwrap();
    out
}

#[test]
fn pipeline_matches_hand_run_stages() {
    let depth_png = encode_png(&disc_depth().into());
    let texture_png = encode_png(&noise_texture().into());

    let pipeline = StereogramPipeline::new();
    pipeline.set_depth_source(Rc::new(EncodedSource::new("disc", depth_png.clone())));
    pipeline.set_texture_source(Rc::new(EncodedSource::new("noise", texture_png.clone())));

    let out = pipeline.output().expect("pipeline should render");
    let padding = StereogramConfig::DEFAULT_DEPTH_PADDING;
    assert_eq!(out.width(), 64 + padding.left + padding.right);
    assert_eq!(out.height(), 32 + padding.top + padding.bottom);
    assert_eq!(*out, render_by_hand(&depth_png, &texture_png, &pipeline.config()));

    let config = StereogramConfig {
        max_depth: 12,
        texture_width: 80,
        offset_strategy: OffsetStrategyKind::CentreAlign,
        invert: true,
        depth_padding: Padding::uniform(8),
        ..StereogramConfig::default()
    };
    pipeline.apply_config(&config).unwrap();
    let out = pipeline.output().unwrap();
    assert_eq!(*out, render_by_hand(&depth_png, &texture_png, &config));

    let rgba = out.to_rgba_image();
    assert_eq!(rgba.dimensions(), (80, 48));
    assert!(rgba.pixels().all(|p| p.0[3] == 255));
}

#[test]
fn only_dependent_stages_recompute() {
    let pipeline = StereogramPipeline::with_config(&StereogramConfig {
        depth_padding: Padding::NONE,
        ..StereogramConfig::default()
    })
    .unwrap();
    pipeline.set_depth_source(Rc::new(EncodedSource::new(
        "disc",
        encode_png(&disc_depth().into()),
    )));
    pipeline.set_texture_source(Rc::new(EncodedSource::new(
        "noise",
        encode_png(&noise_texture().into()),
    )));

    pipeline.output().unwrap();
    pipeline.output().unwrap();
    let once = RecomputeCounts {
        depth_map: 1,
        rescaled: 1,
        texture_image: 1,
        texture_data: 1,
        texture_grid: 1,
        buffer: 1,
        stereogram: 1,
    };
    assert_eq!(pipeline.recompute_counts(), once);

    // Swapping the depth source reloads the depth branch and everything
    // below it, but not the texture decode.
    pipeline.set_depth_source(Rc::new(EncodedSource::new(
        "flat",
        encode_png(&GrayImage::from_pixel(40, 20, Luma([0])).into()),
    )));
    let out = pipeline.output().unwrap();
    assert_eq!((out.width(), out.height()), (40, 20));
    let counts = pipeline.recompute_counts();
    assert_eq!(counts.depth_map, 2);
    assert_eq!(counts.buffer, 2);
    assert_eq!(counts.texture_image, 1);
    assert_eq!(counts.texture_data, 1);
    assert_eq!(counts.stereogram, 2);

    let json = serde_json::to_value(counts).unwrap();
    assert_eq!(json["depth_map"], 2);
    assert_eq!(json["texture_image"], 1);
}

#[test]
fn config_json_drives_the_pipeline() {
    let config: StereogramConfig =
        serde_json::from_str(r#"{"max_depth": 8, "offset_strategy": "CentreAlign"}"#).unwrap();
    assert_eq!(config.texture_width, StereogramConfig::DEFAULT_TEXTURE_WIDTH);
    let pipeline = StereogramPipeline::with_config(&config).unwrap();
    assert_eq!(pipeline.max_depth(), 8);
    assert_eq!(pipeline.offset_strategy(), OffsetStrategyKind::CentreAlign);

    let invalid: StereogramConfig = serde_json::from_str(r#"{"texture_width": 0}"#).unwrap();
    assert!(StereogramPipeline::with_config(&invalid).is_err());
}
