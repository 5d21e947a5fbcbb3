//! The transaction facade: begin/end/read/write/alloc/free.

use std::cell::RefCell;
use std::sync::Arc;

use tracing::debug;

use crate::batcher::Admission;
use crate::control::ControlState;
use crate::error::{StmError, StmResult};
use crate::region::Region;
use crate::types::{Address, SegmentId, TransactionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    ReadOnly,
    Writer(TransactionId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Active,
    Committed,
    Aborted,
}

/// Outcome of [`Transaction::alloc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocOutcome {
    /// The segment was allocated; this is the address of its first
    /// word.
    Success(Address),
    /// The region could not satisfy this allocation request. The
    /// transaction remains active.
    NoMemory,
}

/// An in-flight transaction against a [`Region`].
///
/// Created by [`Region::begin`]. Every fallible operation (`read`,
/// `write`, `alloc`, `free`) reports conflict by returning `false` (or
/// [`AllocOutcome::NoMemory`] for `alloc`'s distinct non-conflict
/// failure) rather than an `Err`; per SPEC_FULL.md §7 a conflict
/// immediately runs this transaction's undo and retires it from the
/// batcher, so it must not be used again afterward. Dropping an active
/// `Transaction` without calling [`Transaction::end`] or
/// [`Transaction::abort`] aborts it, the same as an explicit `abort`
/// call would: undoing any writes and read marks it holds and retiring
/// it from the batcher, so a panic mid-transaction can't leave the
/// batcher's epoch accounting stuck *or* publish an incomplete write.
pub struct Transaction {
    region: Arc<Region>,
    kind: Kind,
    state: RefCell<State>,
}

impl Transaction {
    pub(crate) fn new(region: Arc<Region>, admission: Admission) -> Self {
        let kind = match admission {
            Admission::ReadOnly => Kind::ReadOnly,
            Admission::Writer(id) => Kind::Writer(id),
        };
        Self {
            region,
            kind,
            state: RefCell::new(State::Active),
        }
    }

    /// Whether this transaction is still active (neither ended nor
    /// aborted).
    #[must_use]
    pub fn is_active(&self) -> bool {
        *self.state.borrow() == State::Active
    }

    /// Whether this transaction was opened read-only.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        matches!(self.kind, Kind::ReadOnly)
    }

    fn admission(&self) -> Admission {
        match self.kind {
            Kind::ReadOnly => Admission::ReadOnly,
            Kind::Writer(id) => Admission::Writer(id),
        }
    }

    /// Reads `dst.len()` bytes (a positive multiple of the region's
    /// alignment) from `src` into `dst`.
    ///
    /// Returns `false` if `src` names no live segment, if the range
    /// runs past the segment's end, or if the read conflicts with
    /// another writer's lock in the current epoch. Any of these
    /// self-aborts the transaction, which rendezvouses with the batcher
    /// the same way [`Transaction::end`] does: unless this call happens
    /// to be its epoch's last departure, it blocks here until some other
    /// transaction in the same epoch reaches `end` and commits it. A
    /// caller driving multiple writers that might conflict must run them
    /// concurrently, not in sequence on one thread — the loser's blocked
    /// abort would otherwise never unblock.
    pub fn read(&self, src: Address, dst: &mut [u8]) -> bool {
        if !self.is_active() {
            return false;
        }
        let align = self.region.align();
        if dst.is_empty() || dst.len() % align != 0 {
            self.abort_internal();
            return false;
        }
        let word_span = dst.len() / align;
        let kind = self.kind;

        let outcome = self.region.resolve(src, move |seg, word_offset| -> bool {
            if seg.is_tombstoned() || word_offset + word_span > seg.word_count() {
                return false;
            }
            match kind {
                Kind::ReadOnly => {
                    seg.read_data(word_offset * align, dst);
                    true
                }
                Kind::Writer(tx) => {
                    for (i, chunk) in dst.chunks_mut(align).enumerate() {
                        let w = word_offset + i;
                        let control = seg.control_word(w);
                        let byte_offset = w * align;
                        match control.load() {
                            ControlState::Writer(holder) if holder == tx => {
                                seg.read_shadow(byte_offset, chunk);
                            }
                            _ => {
                                if control.try_mark_read(tx) {
                                    seg.read_data(byte_offset, chunk);
                                } else {
                                    return false;
                                }
                            }
                        }
                    }
                    true
                }
            }
        });

        if outcome == Some(true) {
            true
        } else {
            self.abort_internal();
            false
        }
    }

    /// Writes `src` (a positive multiple of the region's alignment) to
    /// `dst`.
    ///
    /// Read-only transactions can never write; calling this on one
    /// self-aborts and returns `false`. Returns `false` if `dst` names
    /// no live segment, if the range runs past the segment's end, or
    /// if any word in range is already locked by another writer —
    /// acquisition is all-or-nothing: a failed CAS partway through
    /// releases every word already claimed by this call before
    /// reporting failure (SPEC_FULL.md §4.2, grounded on
    /// `batcher_func.h`'s `try_write`). A conflict here self-aborts the
    /// transaction and blocks until its epoch commits, exactly as
    /// described on [`Transaction::read`] — drive potentially-conflicting
    /// writers from separate threads.
    pub fn write(&self, src: &[u8], dst: Address) -> bool {
        if !self.is_active() {
            return false;
        }
        let Kind::Writer(tx) = self.kind else {
            self.abort_internal();
            return false;
        };
        let align = self.region.align();
        if src.is_empty() || src.len() % align != 0 {
            self.abort_internal();
            return false;
        }
        let word_span = src.len() / align;

        let outcome = self.region.resolve(dst, move |seg, word_offset| -> bool {
            if seg.is_tombstoned() || word_offset + word_span > seg.word_count() {
                return false;
            }

            for i in 0..word_span {
                let control = seg.control_word(word_offset + i);
                let acquired = control.try_claim_write(tx)
                    || control.holds_writer(tx)
                    || control.try_upgrade_to_write(tx);
                if !acquired {
                    for j in 0..i {
                        seg.control_word(word_offset + j).release_to_free();
                    }
                    return false;
                }
            }

            seg.write_shadow(word_offset * align, src);
            true
        });

        if outcome == Some(true) {
            true
        } else {
            self.abort_internal();
            false
        }
    }

    /// Allocates a new segment of `size` bytes (a positive multiple of
    /// the region's alignment), provisionally owned by this
    /// transaction until the epoch commits.
    ///
    /// # Errors
    ///
    /// Returns [`StmError::TransactionInactive`] if this transaction
    /// already ended, or [`StmError::InvalidArgument`] if called on a
    /// read-only transaction or with a malformed `size`.
    pub fn alloc(&self, size: usize) -> StmResult<AllocOutcome> {
        if !self.is_active() {
            return Err(StmError::transaction_inactive());
        }
        let Kind::Writer(tx) = self.kind else {
            return Err(StmError::invalid_argument(
                "read-only transactions cannot allocate",
            ));
        };
        let align = self.region.align();
        if size == 0 || size % align != 0 {
            return Err(StmError::invalid_argument(
                "alloc size must be a positive multiple of alignment",
            ));
        }
        Ok(self.region.alloc_segment(tx, size))
    }

    /// Marks the segment named by `target` for removal once the
    /// current epoch commits.
    ///
    /// Returns `false` (and self-aborts) if called on a read-only
    /// transaction, against the region's initial segment, or against a
    /// segment that is already tombstoned or doesn't exist.
    pub fn free(&self, target: Address) -> bool {
        if !self.is_active() {
            return false;
        }
        if matches!(self.kind, Kind::ReadOnly) || target.segment == SegmentId::INITIAL {
            self.abort_internal();
            return false;
        }
        if self.region.free_segment(target.segment) {
            true
        } else {
            self.abort_internal();
            false
        }
    }

    /// Explicitly aborts this transaction: undoes every write and read
    /// mark it holds, tombstones any segment it created, and retires
    /// it from the batcher. Returns `false` if it had already ended.
    pub fn abort(&self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.abort_internal();
        true
    }

    /// Ends this transaction, rendezvousing with the batcher. For a
    /// writer, blocks until the epoch it belongs to has committed.
    /// Returns `false` if this transaction had already committed or
    /// aborted (the correct response to such a call is simply to stop
    /// using the transaction; `end` is then a harmless no-op).
    #[must_use]
    pub fn end(self) -> bool {
        self.end_inner()
    }

    fn end_inner(&self) -> bool {
        let mut state = self.state.borrow_mut();
        if *state != State::Active {
            return false;
        }
        *state = State::Committed;
        drop(state);

        let admission = self.admission();
        self.region.batcher().end(admission, || self.region.commit_all());
        true
    }

    fn abort_internal(&self) {
        let mut state = self.state.borrow_mut();
        if *state != State::Active {
            return;
        }
        *state = State::Aborted;
        drop(state);

        if let Kind::Writer(tx) = self.kind {
            debug!(%tx, "transaction aborted");
            self.region.undo_all(tx);
        }

        let admission = self.admission();
        self.region.batcher().end(admission, || self.region.commit_all());
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.is_active() {
            self.abort_internal();
        }
    }
}
