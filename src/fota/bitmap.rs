//! Fixed-capacity reception bitmap.
//!
//! Tracks which chunk indices of the active update have been stored.
//! Sixteen 32-bit words give room for [`CAPACITY`] chunks; the manifest
//! validator's `total_chunks` ceiling is tied to the same constant.
//!
//! ```text
//!  word 0            word 1                 word 15
//! ┌──────────────┐ ┌──────────────┐       ┌──────────────┐
//! │ bits 0..31   │ │ bits 32..63  │  ...  │ bits 480..511│
//! └──────────────┘ └──────────────┘       └──────────────┘
//! ```

/// Number of 32-bit words backing the bitmap.
const WORDS: usize = 16;

/// Maximum number of chunks one update may declare.
pub const CAPACITY: u16 = (WORDS * 32) as u16;

/// Compact set of received chunk indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReceptionBitmap {
    words: [u32; WORDS],
}

impl ReceptionBitmap {
    pub const fn new() -> Self {
        Self { words: [0; WORDS] }
    }

    /// Mark `index` as received.
    ///
    /// Returns `true` only when the bit was previously clear. Indices at or
    /// beyond [`CAPACITY`] are ignored and return `false`.
    pub fn insert(&mut self, index: u16) -> bool {
        let Some((word, mask)) = Self::locate(index) else {
            return false;
        };
        if self.words[word] & mask != 0 {
            return false;
        }
        self.words[word] |= mask;
        true
    }

    pub fn contains(&self, index: u16) -> bool {
        Self::locate(index).is_some_and(|(word, mask)| self.words[word] & mask != 0)
    }

    /// Number of indices currently set.
    pub fn count(&self) -> u16 {
        self.words.iter().map(|w| w.count_ones() as u16).sum()
    }

    /// `true` when every index in `0..total` is set.
    pub fn is_full(&self, total: u16) -> bool {
        total > 0 && total <= CAPACITY && self.first_missing(total).is_none()
    }

    /// Lowest index in `0..total` that has not been received.
    pub fn first_missing(&self, total: u16) -> Option<u16> {
        self.missing(total).next()
    }

    /// Iterate the indices in `0..total` that have not been received.
    pub fn missing(&self, total: u16) -> impl Iterator<Item = u16> + '_ {
        (0..total.min(CAPACITY)).filter(move |i| !self.contains(*i))
    }

    pub fn clear(&mut self) {
        self.words = [0; WORDS];
    }

    fn locate(index: u16) -> Option<(usize, u32)> {
        if index >= CAPACITY {
            return None;
        }
        let index = index as usize;
        Some((index / 32, 1u32 << (index % 32)))
    }
}
