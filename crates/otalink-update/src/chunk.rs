// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chunk arithmetic for artifact transfer.

use std::ops::Range;

/// Number of chunks needed for `size` bytes. `chunk_size` must be non-zero.
pub fn chunk_count(size: usize, chunk_size: usize) -> usize {
    size.div_ceil(chunk_size)
}

/// Byte range of chunk `index`, or `None` if the index is past the end.
pub fn chunk_range(index: usize, size: usize, chunk_size: usize) -> Option<Range<usize>> {
    let start = index.checked_mul(chunk_size)?;
    if start >= size {
        return None;
    }
    Some(start..size.min(start.saturating_add(chunk_size)))
}

/// Expected wall-clock duration of an update in milliseconds.
pub fn estimate_duration_ms(total_chunks: u32, per_chunk_ms: u64, overhead_ms: u64) -> u64 {
    u64::from(total_chunks)
        .saturating_mul(per_chunk_ms)
        .saturating_add(overhead_ms)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn nine_thousand_bytes_in_4k_chunks() {
        assert_eq!(chunk_count(9000, 4096), 3);
        assert_eq!(chunk_range(0, 9000, 4096), Some(0..4096));
        assert_eq!(chunk_range(1, 9000, 4096), Some(4096..8192));
        assert_eq!(chunk_range(2, 9000, 4096), Some(8192..9000));
        assert_eq!(chunk_range(2, 9000, 4096).map(|r| r.len()), Some(808));
        assert_eq!(chunk_range(3, 9000, 4096), None);
    }

    #[test]
    fn empty_artifact_has_no_chunks() {
        assert_eq!(chunk_count(0, 4096), 0);
        assert_eq!(chunk_range(0, 0, 4096), None);
    }

    #[test]
    fn exact_multiple_has_no_short_tail() {
        assert_eq!(chunk_count(8192, 4096), 2);
        assert_eq!(chunk_range(1, 8192, 4096), Some(4096..8192));
    }

    #[test]
    fn duration_estimate() {
        assert_eq!(estimate_duration_ms(3, 1000, 30_000), 33_000);
        assert_eq!(estimate_duration_ms(0, 1000, 30_000), 30_000);
    }

    proptest! {
        #[test]
        fn chunks_tile_the_artifact(size in 0usize..100_000, chunk_size in 1usize..10_000) {
            let count = chunk_count(size, chunk_size);
            let mut covered = 0;
            for i in 0..count {
                let range = chunk_range(i, size, chunk_size).unwrap();
                prop_assert_eq!(range.start, covered);
                prop_assert!(!range.is_empty());
                prop_assert!(range.len() <= chunk_size);
                covered = range.end;
            }
            prop_assert_eq!(covered, size);
            prop_assert!(chunk_range(count, size, chunk_size).is_none());
        }
    }
}
