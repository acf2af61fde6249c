//! Property tests for range bookkeeping.
//!
//! Random sequences of activation, deactivation, purges and splits must keep
//! the registry and the granule view consistent after every step.

mod common;

use common::{client, fast_purge_config};
use granary::blob::{BlobClient, PurgeVersion, PurgeWorker};
use granary::error::ErrorKind;
use granary::keys::{KeyRange, RangeMap};
use proptest::prelude::*;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
        .block_on(future)
}

prop_compose! {
    /// A short range over a small alphabet so that overlaps are common.
    fn arb_range()(
        begin in 0u8..16,
        len in 1u8..6,
    ) -> KeyRange {
        let end = begin.saturating_add(len);
        KeyRange::new(vec![b'a' + begin], vec![b'a' + end]).unwrap()
    }
}

#[derive(Debug, Clone)]
enum Op {
    Activate(KeyRange),
    Deactivate(KeyRange),
    Purge { range: KeyRange, force: bool, all: bool },
    /// Split the `pick`-th visible granule.
    Split { pick: usize },
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => arb_range().prop_map(Op::Activate),
        2 => arb_range().prop_map(Op::Deactivate),
        2 => (arb_range(), any::<bool>(), any::<bool>())
            .prop_map(|(range, force, all)| Op::Purge { range, force, all }),
        1 => any::<usize>().prop_map(|pick| Op::Split { pick }),
    ]
}

async fn drain(client: &BlobClient) {
    PurgeWorker::new(client.database().clone(), fast_purge_config())
        .drain()
        .await
        .unwrap();
}

/// Whether `granules` lying inside `range` tile it without gaps.
fn tiles(range: &KeyRange, granules: &[KeyRange]) -> bool {
    let mut cursor = range.begin();
    for granule in granules.iter().filter(|g| range.contains_range(g)) {
        if granule.begin() != cursor {
            return false;
        }
        cursor = granule.end();
    }
    cursor == range.end()
}

/// Registry and granule view agree with each other.
async fn check_consistent(client: &BlobClient) -> (Vec<KeyRange>, Vec<KeyRange>) {
    let everything = KeyRange::normal_keys();
    let listed = client.list_active(&everything, 0, None).await.unwrap();
    for pair in listed.windows(2) {
        assert!(pair[0].end() <= pair[1].begin(), "{} overlaps {}", pair[0], pair[1]);
    }

    let granules = client.granule_ranges(&everything, 0, None).await.unwrap();
    for pair in granules.windows(2) {
        assert!(pair[0].end() <= pair[1].begin(), "granule {} overlaps {}", pair[0], pair[1]);
    }
    for granule in &granules {
        assert!(
            listed.iter().any(|r| r.contains_range(granule)),
            "granule {} outside every active range",
            granule
        );
    }

    for range in &listed {
        let served = client.is_active(range, None, None).await.unwrap().is_some();
        assert_eq!(served, tiles(range, &granules), "coverage of {}", range);
    }
    (listed, granules)
}

prop_compose! {
    /// Strictly increasing split keys inside `[b, z)`.
    fn arb_split_keys()(
        picks in prop::collection::btree_set(b'c'..b'y', 0..6),
    ) -> Vec<Vec<u8>> {
        picks.into_iter().map(|b| vec![b]).collect()
    }
}

proptest! {
    #[test]
    fn registry_stays_consistent(ops in prop::collection::vec(arb_op(), 1..40)) {
        block_on(async {
            let client = client();

            for op in &ops {
                let (listed, granules) = check_consistent(&client).await;
                match op {
                    Op::Activate(range) | Op::Deactivate(range) => {
                        let activate = matches!(op, Op::Activate(_));
                        let clash = listed.iter().any(|r| r.intersects(range) && r != range);
                        let accepted = if activate {
                            client.activate(range, None).await.unwrap()
                        } else {
                            client.deactivate(range, None).await.unwrap()
                        };
                        assert_eq!(accepted, !clash, "{:?}", op);

                        let served = client.is_active(range, None, None).await.unwrap();
                        if accepted && activate && !listed.contains(range) {
                            assert!(served.is_some(), "{} not served after activation", range);
                        }
                        if accepted && !activate {
                            assert!(served.is_none(), "{} served after deactivation", range);
                        }
                    }
                    Op::Purge { range, force, all } => {
                        let version = if *all {
                            PurgeVersion::All
                        } else {
                            PurgeVersion::Before(client.database().committed_version())
                        };
                        let cuts_granule = granules
                            .iter()
                            .any(|g| g.intersects(range) && !range.contains_range(g));
                        match client.request_purge(range, version, *force, None).await {
                            Ok(_) => {
                                assert!(!cuts_granule, "misaligned purge of {} accepted", range);
                                drain(&client).await;
                                if *force {
                                    // Repeating an executed force purge changes nothing.
                                    let state = check_consistent(&client).await;
                                    client.request_purge(range, version, true, None).await.unwrap();
                                    drain(&client).await;
                                    assert_eq!(check_consistent(&client).await, state);
                                }
                            }
                            Err(e) => assert_eq!(e.kind(), ErrorKind::UnsupportedOperation, "{:?}", op),
                        }
                    }
                    Op::Split { pick } => {
                        if granules.is_empty() {
                            continue;
                        }
                        let granule = &granules[pick % granules.len()];
                        let mut key = granule.begin().to_vec();
                        key.push(0x01);
                        if key.as_slice() < granule.end() {
                            assert!(client.split_granule(granule, &[key], None).await.unwrap());
                        }
                    }
                }
            }
            check_consistent(&client).await;
        });
    }

    #[test]
    fn splits_tile_the_granule(keys in arb_split_keys()) {
        block_on(async {
            let client = client();
            let r = KeyRange::new(b"b".to_vec(), b"z".to_vec()).unwrap();
            client.activate(&r, None).await.unwrap();
            assert!(client.split_granule(&r, &keys, None).await.unwrap());

            let granules = client.granule_ranges(&r, 0, None).await.unwrap();
            assert_eq!(granules.len(), keys.len() + 1);
            assert_eq!(granules.first().unwrap().begin(), r.begin());
            assert_eq!(granules.last().unwrap().end(), r.end());
            for pair in granules.windows(2) {
                assert_eq!(pair[0].end(), pair[1].begin());
            }
            assert!(client.is_active(&r, None, None).await.unwrap().is_some());
        });
    }

    #[test]
    fn range_map_covers_matches_union(ranges in prop::collection::vec(arb_range(), 0..8), query in arb_range()) {
        let mut map = RangeMap::new();
        for r in &ranges {
            // Overlapping inserts are rejected and leave the map unchanged.
            let _ = map.insert(r.clone(), ());
        }
        let expected = (query.begin()[0]..query.end()[0]).all(|b| {
            map.iter().any(|(r, _)| r.contains_key(&[b]))
        });
        prop_assert_eq!(map.covers(&query), expected);
    }

    #[test]
    fn prefix_mapping_round_trips(range in arb_range(), tenant in 1u64..1000) {
        let prefix = tenant.to_be_bytes();
        let absolute = range.with_prefix(&prefix);
        prop_assert_eq!(absolute.strip_prefix(&prefix), Some(range));
    }
}
