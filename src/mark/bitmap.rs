//! Two per-region mark bitmaps (prev/next) plus the TAMS-gated liveness
//! predicates that sit on top of them (component C5). Grounded on the
//! teacher's `MarkBitMap` (`policy/regionspace/region.rs`): one bit per
//! machine word, CAS-based `par_mark`, `is_marked`/`clear` — generalized from
//! the teacher's chunk-embedded fixed-size table to a plain heap-allocated
//! `Vec<AtomicUsize>` sized to the region.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::util::address::Address;
use crate::util::constants::BYTES_IN_WORD;

/// One bit per machine word of the covered range.
struct Bitmap {
    base: Address,
    words: Vec<AtomicUsize>,
}

const BITS_PER_WORD: usize = usize::BITS as usize;

impl Bitmap {
    fn new(base: Address, extent_bytes: usize) -> Self {
        let covered_words = extent_bytes / BYTES_IN_WORD;
        let table_words = covered_words.div_ceil(BITS_PER_WORD).max(1);
        Bitmap {
            base,
            words: (0..table_words).map(|_| AtomicUsize::new(0)).collect(),
        }
    }

    #[inline]
    fn slot(&self, addr: Address) -> (usize, usize) {
        let word_index = (addr - self.base) / BYTES_IN_WORD;
        (word_index / BITS_PER_WORD, word_index % BITS_PER_WORD)
    }

    /// Mark `addr`'s word. Returns `true` iff this call set a bit that was
    /// previously clear (i.e. this caller "won" the mark).
    fn par_mark(&self, addr: Address) -> bool {
        let (slot, bit) = self.slot(addr);
        let mask = 1usize << bit;
        let old = self.words[slot].fetch_or(mask, Ordering::AcqRel);
        (old & mask) == 0
    }

    fn is_marked(&self, addr: Address) -> bool {
        let (slot, bit) = self.slot(addr);
        let mask = 1usize << bit;
        (self.words[slot].load(Ordering::Acquire) & mask) != 0
    }

    fn clear(&self) {
        for w in &self.words {
            w.store(0, Ordering::Relaxed);
        }
    }
}

/// A region's prev/next mark bitmaps plus the TAMS gating rule: a mark is
/// meaningful only for addresses below the corresponding TAMS, but the TAMS
/// comparison itself lives on `Region` (it needs `prev_tams`/`next_tams`).
/// This type owns just the two bit tables and their raw mark/query/clear
/// operations; `Region::is_obj_dead`/`is_obj_ill` compose them with TAMS.
pub struct RegionMarkState {
    prev: Bitmap,
    next: Bitmap,
}

impl RegionMarkState {
    pub fn new(bottom: Address, end: Address) -> Self {
        let extent = end - bottom;
        RegionMarkState {
            prev: Bitmap::new(bottom, extent),
            next: Bitmap::new(bottom, extent),
        }
    }

    pub fn prev_is_marked(&self, addr: Address) -> bool {
        self.prev.is_marked(addr)
    }

    pub fn next_is_marked(&self, addr: Address) -> bool {
        self.next.is_marked(addr)
    }

    /// CAS-mark `addr` in the next bitmap (the one concurrent mark writes
    /// to). Returns `true` exactly once across all concurrent callers for
    /// the same address between two `clear()`s.
    pub fn par_mark_next(&self, addr: Address) -> bool {
        self.next.par_mark(addr)
    }

    /// Reset the next bitmap to all-clear, e.g. at initial-mark.
    pub fn clear_next(&self) {
        self.next.clear();
    }

    /// CAS-mark `addr` in the prev bitmap directly. Used by evacuation-failure
    /// recovery to re-establish a self-forwarded object as live without
    /// waiting for a marking cycle to do it.
    pub fn par_mark_prev(&self, addr: Address) -> bool {
        self.prev.par_mark(addr)
    }

    pub fn clear(&self) {
        self.prev.clear();
        self.next.clear();
    }

    /// Swap prev and next bitmaps at the end of a completed cycle (C6
    /// cleanup). `next` becomes the old `prev` (now stale, about to be
    /// cleared at the next initial-mark) and `prev` becomes the just-finished
    /// `next`.
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.prev, &mut self.next);
    }
}
