//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random region/transaction inputs
//! that maintain the invariants `Region::create` and `Transaction`'s
//! operations require.

use proptest::prelude::*;

/// Strategy for a valid `(align, word_count)` pair: `align` a power of
/// two at least pointer-sized, `word_count` small enough to keep
/// property tests fast.
pub fn region_dims_strategy() -> impl Strategy<Value = (usize, usize)> {
    (0u32..=4).prop_flat_map(|align_pow| {
        let align = (std::mem::size_of::<usize>()).next_power_of_two() << align_pow;
        (1usize..=64).prop_map(move |word_count| (align, word_count))
    })
}

/// Strategy for a `BATCH_SIZE` candidate (SPEC_FULL.md §9 notes the
/// upstream reference varies it between 2 and 8).
pub fn batch_size_strategy() -> impl Strategy<Value = u64> {
    1u64..=8
}

/// Strategy for a single word-aligned payload of exactly `align` bytes.
pub fn aligned_payload_strategy(align: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), align..=align)
}

/// Strategy for a batch of `count` aligned payloads, one per word.
pub fn aligned_payload_batch_strategy(
    align: usize,
    count: usize,
) -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(aligned_payload_strategy(align), count..=count)
}
