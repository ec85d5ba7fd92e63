//! Property-based tests for download state and manifest round-trips.

use proptest::prelude::*;
use snapsync::manifest::Manifest;
use snapsync::state::DownloadState;

proptest! {
    /// Completion becomes true exactly when the last distinct index lands,
    /// regardless of arrival order or duplicates.
    #[test]
    fn completion_exactly_after_last_distinct_index(
        order in proptest::collection::vec(0u32..32, 1..200),
        total in 1u32..32,
    ) {
        let mut st = DownloadState::new(total);
        let mut seen = std::collections::HashSet::new();
        let mut now = 1_000i64;
        for chunk in order {
            let was_complete = st.is_complete();
            st.mark_chunk_received(chunk, now);
            now += 1;
            if chunk < total {
                seen.insert(chunk);
            }
            prop_assert_eq!(st.received_count() as usize, seen.len());
            prop_assert_eq!(st.is_complete(), seen.len() == total as usize);
            // completion is monotone
            if was_complete {
                prop_assert!(st.is_complete());
            }
        }
        if st.is_complete() {
            prop_assert_eq!(st.next_chunk_to_request(), total);
        }
    }

    /// `next_chunk_to_request` always returns the lowest unreceived index.
    #[test]
    fn next_chunk_is_lowest_unreceived(
        marks in proptest::collection::vec(0u32..24, 0..24),
        total in 1u32..24,
    ) {
        let mut st = DownloadState::new(total);
        for chunk in marks {
            st.mark_chunk_received(chunk, 1_000);
        }
        let expected = (0..total)
            .find(|&i| !st.is_chunk_received(i))
            .unwrap_or(total);
        prop_assert_eq!(st.next_chunk_to_request(), expected);
    }

    /// Manifest serialization round-trips bitwise.
    #[test]
    fn manifest_roundtrip(
        payloads in proptest::collection::vec(
            proptest::collection::vec(any::<u8>(), 1..64),
            1..8,
        ),
        height in 1u32..u32::MAX,
        timestamp in any::<u64>(),
    ) {
        let refs: Vec<&[u8]> = payloads.iter().map(|p| p.as_slice()).collect();
        let m = Manifest::from_payload_chunks(height, timestamp, &refs);
        prop_assert!(m.is_valid());
        let bytes = m.to_bytes().unwrap();
        let back = Manifest::from_bytes(&bytes).unwrap();
        prop_assert_eq!(&m, &back);
        prop_assert_eq!(bytes, back.to_bytes().unwrap());
    }
}
