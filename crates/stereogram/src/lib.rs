//! Filesystem and process glue for the stereogram binaries.
//!
//! The pipeline crate stays free of I/O; this crate supplies an
//! [`ImageSource`] backed by a file on disk and the shared logging setup.

use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use image::DynamicImage;
use stereogram_pipeline::{ImageSource, PipelineError, raster};
use tracing_subscriber::EnvFilter;

/// An image file read from disk each time it is loaded.
///
/// Reading happens only when the pipeline recomputes the stage that owns
/// the source, so a file edited between renders is picked up by
/// selecting the source again. Wrap it in a
/// [`CachedSource`](stereogram_pipeline::CachedSource) to decode once.
#[derive(Clone)]
pub struct FileSource {
    path: PathBuf,
    name: String,
}

impl FileSource {
    /// Source for the image at `path`, named after the path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.display().to_string();
        Self { path, name }
    }

    /// The file this source reads.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for FileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FileSource").field(&self.path).finish()
    }
}

impl ImageSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Rc<DynamicImage>, PipelineError> {
        let bytes = std::fs::read(&self.path).map_err(|e| PipelineError::SourceRead {
            name: self.name.clone(),
            reason: e.to_string(),
        })?;
        tracing::debug!(source = %self.name, bytes = bytes.len(), "read image file");
        raster::decode(&bytes).map(Rc::new)
    }
}

/// Install a stderr `fmt` subscriber.
///
/// `RUST_LOG` wins when set; otherwise the level is `info`, or `debug`
/// with `verbose`.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A second install (e.g. from tests) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("stereogram-{}-{name}", std::process::id()))
    }

    #[test]
    fn loads_an_image_file() {
        let path = temp_path("depth.png");
        image::GrayImage::from_pixel(5, 4, image::Luma([77]))
            .save(&path)
            .unwrap();
        let source = FileSource::new(&path);
        let img = source.load().unwrap();
        assert_eq!((img.width(), img.height()), (5, 4));
        assert_eq!(source.path(), path.as_path());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn cached_file_is_read_once() {
        let path = temp_path("cached.png");
        image::GrayImage::from_pixel(3, 3, image::Luma([10]))
            .save(&path)
            .unwrap();
        let source = stereogram_pipeline::CachedSource::new(Rc::new(FileSource::new(&path)));
        let first = source.load().unwrap();
        std::fs::remove_file(&path).unwrap();
        let second = source.load().unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(source.inner_loads(), 1);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let source = FileSource::new(temp_path("does-not-exist.png"));
        let err = source.load().unwrap_err();
        assert!(matches!(err, PipelineError::SourceRead { .. }));
        assert!(err.to_string().contains("does-not-exist.png"));
    }

    #[test]
    fn non_image_file_is_a_decode_error() {
        let path = temp_path("notes.txt");
        std::fs::write(&path, b"not an image").unwrap();
        let err = FileSource::new(&path).load().unwrap_err();
        assert!(matches!(err, PipelineError::ImageDecode(_)));
        std::fs::remove_file(&path).ok();
    }
}
