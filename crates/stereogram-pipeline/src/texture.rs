//! Texture rings: the structure that turns depth into pattern period.
//!
//! Each output row owns a [`TextureRow`], a circular sequence of packed
//! pixels. Walking the ring left to right emits the repeating pattern;
//! shrinking or growing the ring mid-row shortens or lengthens the
//! period, which the eye reads as the surface moving nearer or further.
//!
//! The ring lives in an arena of `{value, next}` slots addressed by
//! index. Slots unlinked by a shrink go on a free list and are reused by
//! the next grow, so a row that oscillates in depth does not keep
//! allocating.

use crate::types::{PackedImage, PackedPixel, PipelineError};

#[derive(Debug, Clone, Copy)]
struct Link {
    value: PackedPixel,
    next: usize,
}

/// A circular sequence of packed pixels with a cursor.
#[derive(Debug, Clone)]
pub struct TextureRow {
    slots: Vec<Link>,
    free: Vec<usize>,
    cursor: usize,
    len: usize,
    original_len: usize,
    position: usize,
    invert: bool,
}

impl TextureRow {
    /// Build a closed ring over `pixels` with the cursor on the first.
    ///
    /// With `invert` set, [`set_level_delta`](Self::set_level_delta)
    /// negates every delta so raised areas appear sunken.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyTexture`] if `pixels` is empty.
    pub fn new(pixels: &[PackedPixel], invert: bool) -> Result<Self, PipelineError> {
        if pixels.is_empty() {
            return Err(PipelineError::EmptyTexture);
        }
        let len = pixels.len();
        let slots = pixels
            .iter()
            .enumerate()
            .map(|(i, &value)| Link {
                value,
                next: (i + 1) % len,
            })
            .collect();
        Ok(Self {
            slots,
            free: Vec::new(),
            cursor: 0,
            len,
            original_len: len,
            position: 0,
            invert,
        })
    }

    /// Current number of pixels in the ring.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Always `false`: a ring keeps at least one pixel.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of pixels the ring was built with.
    #[must_use]
    pub const fn original_len(&self) -> usize {
        self.original_len
    }

    /// Whether level deltas are negated.
    #[must_use]
    pub const fn invert(&self) -> bool {
        self.invert
    }

    /// Steps the cursor has taken, modulo the current ring length.
    ///
    /// Level changes do not move the cursor, so this tracks exactly the
    /// arithmetic the centre-align offset strategy simulates.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position % self.len
    }

    /// Advance the cursor `n` steps around the ring.
    pub fn cycle(&mut self, n: usize) {
        let steps = n % self.len;
        for _ in 0..steps {
            self.cursor = self.slots[self.cursor].next;
        }
        self.position = (self.position + steps) % self.len;
    }

    /// Pixel under the cursor.
    #[must_use]
    pub fn get(&self) -> PackedPixel {
        self.slots[self.cursor].value
    }

    /// Pixel under the cursor, then advance one step.
    pub fn get_and_increment(&mut self) -> PackedPixel {
        let link = self.slots[self.cursor];
        self.cursor = link.next;
        self.position = (self.position + 1) % self.len;
        link.value
    }

    /// Change the apparent depth at the cursor by `delta` levels.
    ///
    /// A positive effective delta unlinks that many pixels following the
    /// cursor; a negative one inserts copies of the cursor's pixel right
    /// after it. The ring never shrinks below one pixel.
    pub fn set_level_delta(&mut self, delta: i32) {
        let value = if self.invert {
            delta.saturating_neg()
        } else {
            delta
        };
        match value.cmp(&0) {
            std::cmp::Ordering::Greater => self.shrink(value.unsigned_abs() as usize),
            std::cmp::Ordering::Less => self.grow(value.unsigned_abs() as usize),
            std::cmp::Ordering::Equal => {}
        }
    }

    fn shrink(&mut self, requested: usize) {
        let count = requested.min(self.len - 1);
        if count < requested {
            tracing::debug!(
                requested,
                len = self.len,
                "clamping ring shrink to keep one pixel"
            );
        }
        for _ in 0..count {
            let skipped = self.slots[self.cursor].next;
            self.slots[self.cursor].next = self.slots[skipped].next;
            self.free.push(skipped);
        }
        self.len -= count;
    }

    fn grow(&mut self, count: usize) {
        let value = self.slots[self.cursor].value;
        let mut tail = self.cursor;
        let resume = self.slots[self.cursor].next;
        for _ in 0..count {
            let link = Link {
                value,
                next: resume,
            };
            let index = if let Some(index) = self.free.pop() {
                self.slots[index] = link;
                index
            } else {
                self.slots.push(link);
                self.slots.len() - 1
            };
            self.slots[tail].next = index;
            tail = index;
        }
        self.len += count;
    }

    /// The ring's pixels in order, starting at the cursor.
    #[must_use]
    pub fn values(&self) -> Vec<PackedPixel> {
        let mut out = Vec::with_capacity(self.len);
        let mut at = self.cursor;
        for _ in 0..self.len {
            out.push(self.slots[at].value);
            at = self.slots[at].next;
        }
        out
    }
}

/// One [`TextureRow`] per output row, tiled from a source texture.
#[derive(Debug, Clone)]
pub struct TextureGrid {
    rows: Vec<TextureRow>,
}

impl TextureGrid {
    /// Build `height` rings, row `y` taken from texture row
    /// `y % texture.height()`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyTexture`] if the texture has no
    /// pixels.
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(texture: &PackedImage, height: usize, invert: bool) -> Result<Self, PipelineError> {
        let source_height = texture.height() as usize;
        if source_height == 0 || texture.width() == 0 {
            return Err(PipelineError::EmptyTexture);
        }
        // y % source_height always fits back into the texture's u32 range
        let rows = (0..height)
            .map(|y| TextureRow::new(texture.row((y % source_height) as u32), invert))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rows })
    }

    /// Number of rows.
    #[must_use]
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Row `y`, if present.
    #[must_use]
    pub fn row(&self, y: usize) -> Option<&TextureRow> {
        self.rows.get(y)
    }

    /// Mutable row `y`, if present.
    pub fn row_mut(&mut self, y: usize) -> Option<&mut TextureRow> {
        self.rows.get_mut(y)
    }

    /// Iterate over the rows mutably.
    pub fn rows_mut(&mut self) -> impl Iterator<Item = &mut TextureRow> {
        self.rows.iter_mut()
    }

    /// Pre-rotate each row so that its pattern is at rest at `offsets[y]`.
    ///
    /// A row with offset `k` is cycled forward by `(size - k) mod size`
    /// steps, where `size` is the row's original length.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::OffsetCountMismatch`] unless there is
    /// exactly one offset per row.
    pub fn set_initial_offsets(&mut self, offsets: &[usize]) -> Result<(), PipelineError> {
        if offsets.len() != self.rows.len() {
            return Err(PipelineError::OffsetCountMismatch {
                expected: self.rows.len(),
                actual: offsets.len(),
            });
        }
        for (row, &offset) in self.rows.iter_mut().zip(offsets) {
            if offset != 0 {
                let size = row.original_len();
                row.cycle((size - offset % size) % size);
            }
        }
        Ok(())
    }
}
