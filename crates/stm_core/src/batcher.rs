//! The epoch synchronizer: ticket-ordered entry/exit, bounded writer
//! concurrency, single designated committer per epoch.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;

use tracing::debug;

use crate::types::TransactionId;

/// Outcome of entering the batcher's admission protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    ReadOnly,
    Writer(TransactionId),
}

/// The epoch synchronizer described in SPEC_FULL.md §4.1.
///
/// Admits transactions in strict ticket order, bounds the number of
/// writers active in any one epoch to `batch_size`, and has the last
/// transaction to depart a writing epoch run that epoch's commit. Every
/// atomic here is `SeqCst`: the upstream C reference this crate is
/// modeled on uses unqualified C11 atomics, which default to
/// sequential consistency, and this crate keeps that choice explicit
/// rather than hand-tuning acquire/release pairs around it.
#[derive(Debug)]
pub(crate) struct Batcher {
    /// Next ticket to hand out.
    timestamp: AtomicU64,
    /// Ticket currently allowed to proceed.
    next: AtomicU64,
    /// Monotonically increasing epoch counter.
    epoch: AtomicU64,
    /// Transactions currently admitted into the present epoch.
    active: AtomicU64,
    /// Writer slots remaining in the present epoch.
    write_slots: AtomicU64,
    /// Whether any writer has been admitted into the present epoch.
    writing: AtomicBool,
    /// Writer ids handed out so far this epoch.
    next_writer_id: AtomicU64,
    batch_size: u64,
}

impl Batcher {
    pub(crate) fn new(batch_size: u64) -> Self {
        Self {
            timestamp: AtomicU64::new(0),
            next: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
            active: AtomicU64::new(0),
            write_slots: AtomicU64::new(batch_size),
            writing: AtomicBool::new(false),
            next_writer_id: AtomicU64::new(0),
            batch_size,
        }
    }

    pub(crate) fn active_count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    fn take_ticket(&self) -> u64 {
        self.timestamp.fetch_add(1, Ordering::SeqCst)
    }

    fn wait_for_ticket(&self, ticket: u64) {
        while self.next.load(Ordering::SeqCst) != ticket {
            thread::yield_now();
        }
    }

    fn advance(&self) {
        self.next.fetch_add(1, Ordering::SeqCst);
    }

    /// Admits a read-only transaction immediately, or a writer once the
    /// present epoch has a free writer slot — blocking (via cooperative
    /// spin-yield, one of the protocol's three suspension points) across
    /// an epoch boundary otherwise.
    pub(crate) fn begin(&self, read_only: bool) -> Admission {
        loop {
            let ticket = self.take_ticket();
            self.wait_for_ticket(ticket);

            if read_only {
                self.active.fetch_add(1, Ordering::SeqCst);
                self.advance();
                return Admission::ReadOnly;
            }

            if self.write_slots.load(Ordering::SeqCst) > 0 {
                self.write_slots.fetch_sub(1, Ordering::SeqCst);
                self.active.fetch_add(1, Ordering::SeqCst);
                self.writing.store(true, Ordering::SeqCst);
                let id = self.next_writer_id.fetch_add(1, Ordering::SeqCst) + 1;
                self.advance();
                return Admission::Writer(TransactionId::new(id as u32));
            }

            // No writer slot left this epoch: release the ticket lock
            // and wait for the epoch to roll over before retrying.
            let observed_epoch = self.epoch.load(Ordering::SeqCst);
            self.advance();
            while self.epoch.load(Ordering::SeqCst) == observed_epoch {
                thread::yield_now();
            }
        }
    }

    /// Ends a transaction's participation in the present epoch. If this
    /// is the last departure from a writing epoch, `commit` runs here
    /// (under the ticket lock, before the epoch is rolled over and the
    /// next one admitted) and every writer still waiting out the epoch
    /// is released once it returns.
    pub(crate) fn end(&self, admission: Admission, commit: impl FnOnce()) {
        let ticket = self.take_ticket();
        self.wait_for_ticket(ticket);

        let remaining = self.active.fetch_sub(1, Ordering::SeqCst) - 1;
        let was_writing = self.writing.load(Ordering::SeqCst);

        if remaining == 0 && was_writing {
            commit();
            self.write_slots.store(self.batch_size, Ordering::SeqCst);
            self.writing.store(false, Ordering::SeqCst);
            self.next_writer_id.store(0, Ordering::SeqCst);
            let new_epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            debug!(epoch = new_epoch, "epoch committed");
            self.advance();
            return;
        }

        if matches!(admission, Admission::ReadOnly) {
            self.advance();
            return;
        }

        // A writer that didn't trigger the commit waits for whoever
        // does to finish, then proceeds.
        let observed_epoch = self.epoch.load(Ordering::SeqCst);
        self.advance();
        while self.epoch.load(Ordering::SeqCst) == observed_epoch {
            thread::yield_now();
        }
    }
}
