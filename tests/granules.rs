//! Granule view tests.

mod common;

use common::{client, range};
use granary::error::ErrorKind;

#[tokio::test]
async fn activation_seeds_one_granule() {
    let client = client();
    let r = range("a", "m");
    client.activate(&r, None).await.unwrap();

    assert_eq!(client.granule_ranges(&r, 0, None).await.unwrap(), vec![r.clone()]);
    // Partial queries still return whole granules.
    assert_eq!(
        client.granule_ranges(&range("c", "d"), 0, None).await.unwrap(),
        vec![r]
    );
}

#[tokio::test]
async fn unregistered_space_has_no_granules() {
    let client = client();
    client.activate(&range("a", "c"), None).await.unwrap();
    assert!(client.granule_ranges(&range("x", "z"), 0, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn split_refines_tiling() {
    let client = client();
    let r = range("a", "m");
    client.activate(&r, None).await.unwrap();

    let split = client
        .split_granule(&r, &[b"d".to_vec(), b"h".to_vec()], None)
        .await
        .unwrap();
    assert!(split);

    let granules = client.granule_ranges(&r, 0, None).await.unwrap();
    assert_eq!(granules, vec![range("a", "d"), range("d", "h"), range("h", "m")]);

    let limited = client.granule_ranges(&r, 2, None).await.unwrap();
    assert_eq!(limited, vec![range("a", "d"), range("d", "h")]);

    let middle = client.granule_ranges(&range("e", "f"), 0, None).await.unwrap();
    assert_eq!(middle, vec![range("d", "h")]);

    // Coverage is unaffected by the split.
    assert!(client.is_active(&r, None, None).await.unwrap().is_some());
}

#[tokio::test]
async fn split_of_unknown_granule_is_refused() {
    let client = client();
    client.activate(&range("a", "m"), None).await.unwrap();

    let split = client
        .split_granule(&range("a", "f"), &[b"c".to_vec()], None)
        .await
        .unwrap();
    assert!(!split);
    assert_eq!(
        client.granule_ranges(&range("a", "m"), 0, None).await.unwrap(),
        vec![range("a", "m")]
    );
}

#[tokio::test]
async fn split_keys_must_be_inside_and_increasing() {
    let client = client();
    let r = range("b", "m");
    client.activate(&r, None).await.unwrap();

    for keys in [
        vec![b"a".to_vec()],
        vec![b"b".to_vec()],
        vec![b"m".to_vec()],
        vec![b"h".to_vec(), b"d".to_vec()],
        vec![b"d".to_vec(), b"d".to_vec()],
    ] {
        let err = client.split_granule(&r, &keys, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
    assert_eq!(client.granule_ranges(&r, 0, None).await.unwrap(), vec![r]);
}

#[tokio::test]
async fn granules_span_adjacent_ranges_in_order() {
    let client = client();
    client.activate(&range("a", "c"), None).await.unwrap();
    client.activate(&range("c", "e"), None).await.unwrap();
    client
        .split_granule(&range("c", "e"), &[b"d".to_vec()], None)
        .await
        .unwrap();

    let granules = client.granule_ranges(&range("b", "z"), 0, None).await.unwrap();
    assert_eq!(granules, vec![range("a", "c"), range("c", "d"), range("d", "e")]);
}

#[tokio::test]
async fn reactivation_restores_single_granule() {
    let client = client();
    let r = range("a", "m");
    client.activate(&r, None).await.unwrap();
    client.split_granule(&r, &[b"f".to_vec()], None).await.unwrap();
    client.deactivate(&r, None).await.unwrap();
    assert!(client.granule_ranges(&r, 0, None).await.unwrap().is_empty());

    client.activate(&r, None).await.unwrap();
    assert_eq!(client.granule_ranges(&r, 0, None).await.unwrap(), vec![r]);
}
