//! Core type definitions for the STM region.

use std::fmt;

/// Identifier for a writer transaction within the current epoch.
///
/// Writer ids are small positive integers, assigned from 1 at every
/// epoch boundary by the transaction that commits the previous epoch.
/// They are never reused within the same epoch and carry no meaning
/// once the epoch that produced them has committed — see SPEC_FULL.md
/// §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub(crate) u32);

impl TransactionId {
    pub(crate) const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw writer id.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx:{}", self.0)
    }
}

/// Identifier for a segment within a region's arena.
///
/// [`SegmentId::INITIAL`] names the region's non-freeable initial
/// segment; every other id names a segment returned by
/// [`crate::Transaction::alloc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentId(pub(crate) u64);

impl SegmentId {
    /// The region's initial, non-freeable segment.
    pub const INITIAL: SegmentId = SegmentId(0);
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seg:{}", self.0)
    }
}

/// An opaque handle to a word-aligned position inside a region.
///
/// This is the safe-Rust replacement for the raw `void*` addresses of a
/// C transactional-memory ABI: callers never see a pointer, and
/// resolving an `Address` back to its segment is a direct arena lookup
/// rather than a pointer-range scan. Returned by [`crate::Region::start_address`]
/// and [`crate::Transaction::alloc`]; consumed by
/// [`crate::Transaction::read`], [`crate::Transaction::write`], and
/// [`crate::Transaction::free`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    pub(crate) segment: SegmentId,
    pub(crate) word_offset: u32,
}

impl Address {
    pub(crate) const fn new(segment: SegmentId, word_offset: u32) -> Self {
        Self {
            segment,
            word_offset,
        }
    }

    /// Returns an address `words` words past this one, within the same
    /// segment. The caller is responsible for staying inside the
    /// segment's bounds; out-of-range addresses are rejected by
    /// `read`/`write`/`free` as a conflict abort.
    #[must_use]
    pub const fn offset_words(self, words: u32) -> Self {
        Self {
            segment: self.segment,
            word_offset: self.word_offset + words,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}w", self.segment, self.word_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_id_display() {
        let tx = TransactionId::new(3);
        assert_eq!(format!("{tx}"), "tx:3");
    }

    #[test]
    fn initial_segment_is_zero() {
        assert_eq!(SegmentId::INITIAL.0, 0);
    }

    #[test]
    fn address_offset_words() {
        let base = Address::new(SegmentId::INITIAL, 0);
        let next = base.offset_words(4);
        assert_eq!(next.word_offset, 4);
        assert_eq!(next.segment, SegmentId::INITIAL);
    }
}
