//! Tests for paginated listing.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::FakeDrive;
use drive_fetch::{DriveError, ListingClient};

fn drive_with_children(n: usize) -> FakeDrive {
    (0..n).fold(FakeDrive::new(), |drive, i| {
        drive.file("root", &format!("f{}", i), &format!("file{}.txt", i), "text/plain", b"x")
    })
}

#[tokio::test]
async fn collects_every_page_for_any_page_size() {
    for n in [0usize, 1, 2, 9, 10, 11, 25] {
        for page_size in [1u32, 2, 3, 10, 100] {
            let drive = Arc::new(drive_with_children(n));
            let client = ListingClient::new(drive.clone(), page_size);

            let entries = client.list_children("root").await.unwrap();

            assert_eq!(entries.len(), n, "n={} page_size={}", n, page_size);
            let ids: HashSet<_> = entries.iter().map(|e| e.id.clone()).collect();
            assert_eq!(ids.len(), n, "duplicates for n={} page_size={}", n, page_size);

            let expected_calls = if n == 0 { 1 } else { n.div_ceil(page_size as usize) };
            assert_eq!(drive.list_calls(), expected_calls);
        }
    }
}

#[tokio::test]
async fn keeps_listing_order_across_pages() {
    let drive = Arc::new(drive_with_children(5));
    let client = ListingClient::new(drive, 2);

    let ids: Vec<_> = client
        .list_children("root")
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(ids, vec!["f0", "f1", "f2", "f3", "f4"]);
}

#[tokio::test]
async fn empty_container_returns_nothing() {
    let client = ListingClient::new(Arc::new(FakeDrive::new()), 10);
    assert!(client.list_children("empty").await.unwrap().is_empty());
}

#[tokio::test]
async fn api_failure_becomes_listing_error() {
    let client = ListingClient::new(Arc::new(FakeDrive::new().failing("root")), 10);

    let err = client.list_children("root").await.unwrap_err();
    match err {
        DriveError::Listing {
            container_id,
            source,
        } => {
            assert_eq!(container_id, "root");
            assert!(matches!(*source, DriveError::Api { status: 500, .. }));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn zero_page_size_is_clamped() {
    let drive = Arc::new(drive_with_children(3));
    let client = ListingClient::new(drive, 0);
    assert_eq!(client.list_children("root").await.unwrap().len(), 3);
}
