//! Dual-buffer (data/shadow) versioned memory for a contiguous block.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use tracing::trace;

use crate::control::{ControlState, ControlWord};
use crate::types::TransactionId;

/// Sentinel for [`Segment::creator`] meaning "not provisional — this
/// segment survived a prior epoch's commit".
const NO_CREATOR: u64 = 0;

/// Upper bound on a single segment's byte length.
///
/// Rust's global allocator aborts the process on an allocation failure
/// it can't recover from; rather than risk that, allocation requests
/// above this bound are rejected up front and surfaced as
/// [`crate::AllocOutcome::NoMemory`] like a real allocator failure
/// would be.
const MAX_SEGMENT_BYTES: usize = 1 << 34;

/// A contiguous, word-aligned block of transactional memory.
///
/// Every segment carries two full byte buffers — `data` (the last
/// committed values) and `shadow` (this epoch's speculative values) —
/// plus one [`ControlWord`] per `align`-byte word. See SPEC_FULL.md §3
/// for the invariants this type upholds and §4.2/§4.3 for how the
/// batcher drives its commit and undo paths (grounded on
/// `batcher_func.h`'s `Commit_seg`/`Undo_seg`/`try_write`).
#[derive(Debug)]
pub(crate) struct Segment {
    align: usize,
    word_count: usize,
    data: Vec<AtomicU8>,
    shadow: Vec<AtomicU8>,
    control: Vec<ControlWord>,
    creator: AtomicU64,
    to_delete: AtomicBool,
}

impl Segment {
    /// Builds a zero-initialized segment, or `None` if the requested
    /// size overflows or exceeds [`MAX_SEGMENT_BYTES`].
    pub(crate) fn try_new(word_count: usize, align: usize, creator: u64) -> Option<Self> {
        let byte_len = word_count.checked_mul(align)?;
        if byte_len > MAX_SEGMENT_BYTES {
            return None;
        }
        Some(Self {
            align,
            word_count,
            data: (0..byte_len).map(|_| AtomicU8::new(0)).collect(),
            shadow: (0..byte_len).map(|_| AtomicU8::new(0)).collect(),
            control: (0..word_count).map(|_| ControlWord::new()).collect(),
            creator: AtomicU64::new(creator),
            to_delete: AtomicBool::new(false),
        })
    }

    pub(crate) fn byte_len(&self) -> usize {
        self.word_count * self.align
    }

    pub(crate) const fn word_count(&self) -> usize {
        self.word_count
    }

    pub(crate) const fn align(&self) -> usize {
        self.align
    }

    fn creator(&self) -> u64 {
        self.creator.load(Ordering::SeqCst)
    }

    pub(crate) fn created_by(&self, tx: TransactionId) -> bool {
        self.creator() == u64::from(tx.as_u32())
    }

    pub(crate) fn is_tombstoned(&self) -> bool {
        self.to_delete.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_tombstoned(&self) {
        self.to_delete.store(true, Ordering::SeqCst);
    }

    pub(crate) fn control_word(&self, word_index: usize) -> &ControlWord {
        &self.control[word_index]
    }

    pub(crate) fn read_data(&self, byte_offset: usize, out: &mut [u8]) {
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.data[byte_offset + i].load(Ordering::SeqCst);
        }
    }

    pub(crate) fn read_shadow(&self, byte_offset: usize, out: &mut [u8]) {
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.shadow[byte_offset + i].load(Ordering::SeqCst);
        }
    }

    pub(crate) fn write_shadow(&self, byte_offset: usize, src: &[u8]) {
        for (i, &b) in src.iter().enumerate() {
            self.shadow[byte_offset + i].store(b, Ordering::SeqCst);
        }
    }

    /// Restores `len` bytes of this segment's shadow buffer from `data`
    /// at `byte_offset` — undoing a speculative write. Must happen
    /// *before* the corresponding control word is released to FREE, so
    /// a concurrent reader never observes a stale shadow value under a
    /// freed lock. See SPEC_FULL.md §4.2.
    pub(crate) fn restore_shadow_from_data(&self, byte_offset: usize, len: usize) {
        for i in 0..len {
            let v = self.data[byte_offset + i].load(Ordering::SeqCst);
            self.shadow[byte_offset + i].store(v, Ordering::SeqCst);
        }
    }

    /// Publishes this epoch's shadow writes into `data` and clears
    /// every control word, readying the segment for the next epoch.
    pub(crate) fn publish_and_reset(&self) {
        for i in 0..self.byte_len() {
            let v = self.shadow[i].load(Ordering::SeqCst);
            self.data[i].store(v, Ordering::SeqCst);
        }
        for c in &self.control {
            c.reset();
        }
        self.creator.store(NO_CREATOR, Ordering::SeqCst);
        trace!(words = self.word_count, "segment published");
    }
}

/// Undoes every effect `tx` had on `segment`: if `tx` created it, the
/// segment is tombstoned outright (its bytes never having been visible
/// to anyone else); otherwise each word `tx` holds as writer has its
/// shadow restored and lock released, and each word `tx` holds as
/// reader has its mark retracted.
///
/// Grounded on `batcher_func.h`'s `Undo_seg`.
pub(crate) fn undo_segment(segment: &Segment, tx: TransactionId) {
    if segment.is_tombstoned() {
        return;
    }
    if segment.created_by(tx) {
        segment.mark_tombstoned();
        return;
    }
    for w in 0..segment.word_count() {
        let control = segment.control_word(w);
        if let ControlState::Writer(holder) = control.load() {
            if holder == tx {
                let byte_offset = w * segment.align();
                segment.restore_shadow_from_data(byte_offset, segment.align());
                control.release_to_free();
                continue;
            }
        }
        control.retract_read(tx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_overflowing_size() {
        assert!(Segment::try_new(usize::MAX, 8, 0).is_none());
    }

    #[test]
    fn rejects_oversized_segment() {
        assert!(Segment::try_new(MAX_SEGMENT_BYTES, 8, 0).is_none());
    }

    #[test]
    fn publish_moves_shadow_into_data() {
        let seg = Segment::try_new(1, 8, 0).unwrap();
        seg.write_shadow(0, &[1, 2, 3, 4, 5, 6, 7, 8]);
        seg.publish_and_reset();
        let mut out = [0u8; 8];
        seg.read_data(0, &mut out);
        assert_eq!(out, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(seg.control_word(0).load(), ControlState::Free);
    }

    #[test]
    fn undo_restores_shadow_and_releases_lock() {
        let seg = Segment::try_new(1, 8, 0).unwrap();
        let tx = TransactionId::new(1);
        assert!(seg.control_word(0).try_claim_write(tx));
        seg.write_shadow(0, &[9; 8]);
        undo_segment(&seg, tx);
        let mut out = [0u8; 8];
        seg.read_shadow(0, &mut out);
        assert_eq!(out, [0u8; 8]);
        assert_eq!(seg.control_word(0).load(), ControlState::Free);
    }

    #[test]
    fn undo_tombstones_a_segment_it_created() {
        let seg = Segment::try_new(1, 8, 1).unwrap();
        undo_segment(&seg, TransactionId::new(1));
        assert!(seg.is_tombstoned());
    }
}
