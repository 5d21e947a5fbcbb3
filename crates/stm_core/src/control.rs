//! Per-word control tags: the lock-free lock over a segment's bytes.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::TransactionId;

/// Offset added to a writer id to encode a reader mark in a control
/// word.
///
/// Chosen far larger than any `batch_size` this crate will ever be
/// configured with, so writer ids (`1..=batch_size`) and reader marks
/// (`BATCH_OFFSET + 1 ..`) can never collide. Fixed rather than derived
/// from the configured batch size, so a control word never needs to
/// know which region it belongs to. See SPEC_FULL.md §3.
pub const BATCH_OFFSET: u64 = 1 << 32;

/// Sentinel meaning "no transaction holds this word in the current
/// epoch".
const FREE: u64 = 0;

/// Decoded state of a single control word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ControlState {
    /// Nobody has claimed this word in the current epoch.
    Free,
    /// `TransactionId` has speculatively written this word.
    Writer(TransactionId),
    /// `TransactionId` has read (but not written) this word.
    Reader(TransactionId),
}

/// An atomic per-word lock tag: FREE, a writer's id, or a reader's id
/// encoded with [`BATCH_OFFSET`].
///
/// All operations are `SeqCst`: the upstream C reference this crate is
/// modeled on uses unqualified C11 atomics, which default to sequential
/// consistency, and this crate keeps that choice explicit rather than
/// hand-tuning acquire/release pairs around it.
#[derive(Debug)]
pub(crate) struct ControlWord(AtomicU64);

impl ControlWord {
    pub(crate) fn new() -> Self {
        Self(AtomicU64::new(FREE))
    }

    pub(crate) fn load(&self) -> ControlState {
        decode(self.0.load(Ordering::SeqCst))
    }

    /// Attempts FREE -> Writer(tx).
    pub(crate) fn try_claim_write(&self, tx: TransactionId) -> bool {
        self.0
            .compare_exchange(
                FREE,
                u64::from(tx.as_u32()),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Attempts Reader(tx) -> Writer(tx), upgrading our own read mark.
    pub(crate) fn try_upgrade_to_write(&self, tx: TransactionId) -> bool {
        let reader_encoding = BATCH_OFFSET + u64::from(tx.as_u32());
        self.0
            .compare_exchange(
                reader_encoding,
                u64::from(tx.as_u32()),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    pub(crate) fn holds_writer(&self, tx: TransactionId) -> bool {
        self.0.load(Ordering::SeqCst) == u64::from(tx.as_u32())
    }

    /// Attempts FREE -> Reader(tx); an existing Reader(tx) mark (ours
    /// already, from a prior read of the same word) also counts as
    /// success.
    pub(crate) fn try_mark_read(&self, tx: TransactionId) -> bool {
        let encoding = BATCH_OFFSET + u64::from(tx.as_u32());
        match self
            .0
            .compare_exchange(FREE, encoding, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => true,
            Err(observed) => observed == encoding,
        }
    }

    pub(crate) fn release_to_free(&self) {
        self.0.store(FREE, Ordering::SeqCst);
    }

    /// Retracts our own reader mark, if present; a no-op otherwise
    /// (e.g. the word was never touched, or is held by someone else).
    pub(crate) fn retract_read(&self, tx: TransactionId) {
        let encoding = BATCH_OFFSET + u64::from(tx.as_u32());
        let _ = self
            .0
            .compare_exchange(encoding, FREE, Ordering::SeqCst, Ordering::SeqCst);
    }

    pub(crate) fn reset(&self) {
        self.0.store(FREE, Ordering::SeqCst);
    }
}

fn decode(raw: u64) -> ControlState {
    if raw == FREE {
        ControlState::Free
    } else if raw >= BATCH_OFFSET {
        ControlState::Reader(TransactionId::new((raw - BATCH_OFFSET) as u32))
    } else {
        ControlState::Writer(TransactionId::new(raw as u32))
    }
}
