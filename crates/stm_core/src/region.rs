//! The top-level region handle: arena of segments plus the batcher that
//! serializes epoch boundaries over them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::batcher::Batcher;
use crate::config::StmConfig;
use crate::control::BATCH_OFFSET;
use crate::error::{StmError, StmResult};
use crate::segment::{undo_segment, Segment};
use crate::transaction::{AllocOutcome, Transaction};
use crate::types::{Address, SegmentId, TransactionId};

/// A shared transactional memory region: the handle clients open
/// transactions against.
///
/// Holds the non-freeable initial segment inline and every
/// `alloc`ated segment in an index-based arena keyed by [`SegmentId`] —
/// the safe-Rust replacement for the original's intrusive linked list
/// of raw segment pointers (SPEC_FULL.md §2, §9).
pub struct Region {
    align: usize,
    initial_size: usize,
    initial: Segment,
    allocs: Mutex<HashMap<SegmentId, Segment>>,
    /// Allocation order, oldest first; commit sweeps in this order so
    /// segment numbering stays stable across a run.
    alloc_order: Mutex<Vec<SegmentId>>,
    next_segment_id: AtomicU64,
    batcher: Batcher,
}

impl Region {
    /// Creates a region of `size` bytes, word-aligned to `align`.
    ///
    /// # Errors
    ///
    /// Returns [`StmError::InvalidRegion`] if `align` isn't a power of
    /// two pointer-sized-or-larger value, or `size` isn't a positive
    /// multiple of `align`.
    pub fn create(size: usize, align: usize, config: StmConfig) -> StmResult<Arc<Self>> {
        if align < std::mem::size_of::<usize>() || !align.is_power_of_two() {
            return Err(StmError::invalid_region(
                "alignment must be a power of two at least pointer-sized",
            ));
        }
        if size == 0 || size % align != 0 {
            return Err(StmError::invalid_region(
                "size must be a positive multiple of alignment",
            ));
        }
        if config.batch_size == 0 {
            return Err(StmError::invalid_region("batch_size must be at least 1"));
        }
        if config.batch_size >= BATCH_OFFSET {
            return Err(StmError::invalid_region(
                "batch_size must stay below BATCH_OFFSET, or writer and reader control-word encodings collide",
            ));
        }

        let word_count = size / align;
        let initial = Segment::try_new(word_count, align, 0)
            .ok_or_else(|| StmError::invalid_region("requested region size is too large"))?;

        info!(size, align, batch_size = config.batch_size, "region created");

        Ok(Arc::new(Self {
            align,
            initial_size: size,
            initial,
            allocs: Mutex::new(HashMap::new()),
            alloc_order: Mutex::new(Vec::new()),
            next_segment_id: AtomicU64::new(1),
            batcher: Batcher::new(config.batch_size),
        }))
    }

    /// Total byte size of the region's initial segment.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.initial_size
    }

    /// Word alignment shared by every segment in this region.
    #[must_use]
    pub const fn align(&self) -> usize {
        self.align
    }

    /// The address of word 0 of the region's initial segment.
    #[must_use]
    pub const fn start_address(&self) -> Address {
        Address::new(SegmentId::INITIAL, 0)
    }

    /// Begins a new transaction. `read_only` transactions never block a
    /// writer out of a writer slot and can never conflict.
    pub fn begin(self: &Arc<Self>, read_only: bool) -> Transaction {
        let admission = self.batcher.begin(read_only);
        Transaction::new(Arc::clone(self), admission)
    }

    pub(crate) fn batcher(&self) -> &Batcher {
        &self.batcher
    }

    /// Runs `f` against the segment named by `addr`, or returns `None`
    /// if it names no live segment.
    pub(crate) fn resolve<F, R>(&self, addr: Address, f: F) -> Option<R>
    where
        F: FnOnce(&Segment, usize) -> R,
    {
        if addr.segment == SegmentId::INITIAL {
            return Some(f(&self.initial, addr.word_offset as usize));
        }
        let guard = self.allocs.lock();
        guard.get(&addr.segment).map(|seg| f(seg, addr.word_offset as usize))
    }

    pub(crate) fn alloc_segment(&self, tx: TransactionId, size: usize) -> AllocOutcome {
        let word_count = size / self.align;
        let Some(seg) = Segment::try_new(word_count, self.align, u64::from(tx.as_u32())) else {
            warn!(size, "allocation request rejected: no memory");
            return AllocOutcome::NoMemory;
        };
        let id = SegmentId(self.next_segment_id.fetch_add(1, Ordering::SeqCst));
        self.allocs.lock().insert(id, seg);
        self.alloc_order.lock().push(id);
        AllocOutcome::Success(Address::new(id, 0))
    }

    /// Tombstones the segment named `id`, if it is one of ours and not
    /// already tombstoned. Never succeeds for the initial segment.
    pub(crate) fn free_segment(&self, id: SegmentId) -> bool {
        if id == SegmentId::INITIAL {
            return false;
        }
        let guard = self.allocs.lock();
        match guard.get(&id) {
            Some(seg) if !seg.is_tombstoned() => {
                seg.mark_tombstoned();
                true
            }
            _ => false,
        }
    }

    /// Publishes every live segment's shadow writes and sweeps
    /// tombstoned ones. Runs once, from inside the batcher, when the
    /// last transaction of a writing epoch departs.
    pub(crate) fn commit_all(&self) {
        if !self.initial.is_tombstoned() {
            self.initial.publish_and_reset();
        }

        let mut order = self.alloc_order.lock();
        let mut allocs = self.allocs.lock();
        let mut next_order = Vec::with_capacity(order.len());
        for id in order.drain(..) {
            let tombstoned = allocs.get(&id).map_or(true, Segment::is_tombstoned);
            if tombstoned {
                allocs.remove(&id);
            } else if let Some(seg) = allocs.get(&id) {
                seg.publish_and_reset();
                next_order.push(id);
            }
        }
        *order = next_order;
    }

    /// Undoes every effect `tx` had across the whole region: restores
    /// shadow state and releases locks on every segment it touched, and
    /// tombstones any segment it created.
    pub(crate) fn undo_all(&self, tx: TransactionId) {
        undo_segment(&self.initial, tx);
        for seg in self.allocs.lock().values() {
            undo_segment(seg, tx);
        }
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        debug_assert_eq!(
            self.batcher.active_count(),
            0,
            "region destroyed with transactions still active"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_batch_size_at_or_above_batch_offset() {
        let err = Region::create(8, 8, StmConfig::new().batch_size(BATCH_OFFSET)).unwrap_err();
        assert!(matches!(err, StmError::InvalidRegion { .. }));
    }

    #[test]
    fn accepts_batch_size_below_batch_offset() {
        assert!(Region::create(8, 8, StmConfig::new().batch_size(BATCH_OFFSET - 1)).is_ok());
    }
}
