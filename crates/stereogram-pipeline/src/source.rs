//! Opaque image sources.
//!
//! The pipeline never knows where an image comes from. It holds a
//! [`SourceRef`] and asks it to [`load`](ImageSource::load) when a decode
//! stage is recomputed. The binaries add a filesystem source on top of
//! the two in-memory ones here.
//!
//! [`CachedSource`] wraps any source so that reselecting it after a
//! parameter change does not decode it again.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use image::DynamicImage;

use crate::raster;
use crate::types::PipelineError;

/// A named provider of a decoded image.
pub trait ImageSource: fmt::Debug {
    /// Human-readable name, used in logs and errors.
    fn name(&self) -> &str;

    /// Produce the decoded image.
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be read or decoded.
    fn load(&self) -> Result<Rc<DynamicImage>, PipelineError>;
}

/// Shared handle to an [`ImageSource`].
pub type SourceRef = Rc<dyn ImageSource>;

/// Encoded image bytes held in memory.
#[derive(Clone)]
pub struct EncodedSource {
    name: String,
    bytes: Vec<u8>,
}

impl EncodedSource {
    /// Wrap encoded bytes (PNG, JPEG, BMP, WebP).
    #[must_use]
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// The encoded bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for EncodedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedSource")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl ImageSource for EncodedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Rc<DynamicImage>, PipelineError> {
        raster::decode(&self.bytes).map(Rc::new)
    }
}

/// An image that is already decoded.
#[derive(Debug, Clone)]
pub struct RasterSource {
    name: String,
    image: Rc<DynamicImage>,
}

impl RasterSource {
    /// Wrap a decoded image under `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, image: impl Into<DynamicImage>) -> Self {
        Self {
            name: name.into(),
            image: Rc::new(image.into()),
        }
    }
}

impl ImageSource for RasterSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Rc<DynamicImage>, PipelineError> {
        Ok(Rc::clone(&self.image))
    }
}

/// Memoizes the decoded image of another source.
///
/// The first successful [`load`](ImageSource::load) is kept and shared by
/// every later one until [`clear`](Self::clear). Failures are not kept.
/// The cache belongs to the handle, so the same decoded image serves
/// every padding and texture width the pipeline asks for.
pub struct CachedSource {
    inner: SourceRef,
    cached: RefCell<Option<Rc<DynamicImage>>>,
    loads: Cell<u64>,
}

impl CachedSource {
    /// Cache the output of `inner`.
    #[must_use]
    pub fn new(inner: SourceRef) -> Self {
        Self {
            inner,
            cached: RefCell::new(None),
            loads: Cell::new(0),
        }
    }

    /// The wrapped source.
    #[must_use]
    pub fn inner(&self) -> &SourceRef {
        &self.inner
    }

    /// Whether a decoded image is held.
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.cached.borrow().is_some()
    }

    /// Number of times the wrapped source has actually been loaded.
    #[must_use]
    pub fn inner_loads(&self) -> u64 {
        self.loads.get()
    }

    /// Drop the held image so the next load reaches the wrapped source.
    pub fn clear(&self) {
        self.cached.borrow_mut().take();
    }
}

impl fmt::Debug for CachedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedSource")
            .field("inner", &self.inner)
            .field("cached", &self.is_cached())
            .finish()
    }
}

impl ImageSource for CachedSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn load(&self) -> Result<Rc<DynamicImage>, PipelineError> {
        if let Some(image) = self.cached.borrow().as_ref() {
            tracing::debug!(source = self.name(), "decoded image cache hit");
            return Ok(Rc::clone(image));
        }
        self.loads.set(self.loads.get() + 1);
        let image = self.inner.load()?;
        *self.cached.borrow_mut() = Some(Rc::clone(&image));
        Ok(image)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::GrayImage;

    #[test]
    fn raster_source_returns_its_image() {
        let source = RasterSource::new("flat", GrayImage::from_pixel(3, 2, image::Luma([9])));
        assert_eq!(source.name(), "flat");
        let img = source.load().unwrap();
        assert_eq!((img.width(), img.height()), (3, 2));
    }

    #[test]
    fn encoded_source_propagates_decode_errors() {
        let source = EncodedSource::new("junk", vec![1, 2, 3]);
        assert!(matches!(source.load(), Err(PipelineError::ImageDecode(_))));
        let empty = EncodedSource::new("empty", Vec::new());
        assert!(matches!(empty.load(), Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn debug_hides_bytes() {
        let source = EncodedSource::new("big", vec![0; 4096]);
        let text = format!("{source:?}");
        assert!(text.contains("4096"));
        assert!(!text.contains("0, 0"));
    }

    #[test]
    fn cached_source_decodes_once() {
        let png = {
            let mut buf = std::io::Cursor::new(Vec::new());
            DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 3, image::Luma([50])))
                .write_to(&mut buf, image::ImageFormat::Png)
                .unwrap();
            buf.into_inner()
        };
        let cached = CachedSource::new(Rc::new(EncodedSource::new("depth", png)));
        assert!(!cached.is_cached());

        let first = cached.load().unwrap();
        let second = cached.load().unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(cached.inner_loads(), 1);
        assert_eq!(cached.name(), "depth");

        cached.clear();
        let third = cached.load().unwrap();
        assert!(!Rc::ptr_eq(&first, &third));
        assert_eq!(cached.inner_loads(), 2);
    }

    #[test]
    fn cached_source_does_not_keep_failures() {
        let cached = CachedSource::new(Rc::new(EncodedSource::new("junk", vec![1, 2, 3])));
        assert!(cached.load().is_err());
        assert!(!cached.is_cached());
        assert!(cached.load().is_err());
        assert_eq!(cached.inner_loads(), 2);
    }

    #[test]
    fn handles_are_shared() {
        let handle: SourceRef = Rc::new(RasterSource::new("a", GrayImage::new(1, 1)));
        let other = Rc::clone(&handle);
        assert!(Rc::ptr_eq(&handle, &other));
        assert_eq!(other.name(), "a");
    }
}
