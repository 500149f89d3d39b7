//! Integration tests for the pagination-traversal state machine.

mod support;

use std::sync::atomic::Ordering;

use docharvest_core::discovery::{PageRange, PaginatedDiscovery};
use docharvest_core::session::AcquisitionSession;
use docharvest_core::store::ReferenceStore;
use support::paged_session::PagedSession;
use tempfile::TempDir;

fn open_session(paged: &'static PagedSession) -> AcquisitionSession {
    AcquisitionSession::open(Box::new(paged)).expect("session opens")
}

fn leaked(total_pages: u32, links_per_page: u32, gate_present: bool) -> &'static PagedSession {
    Box::leak(Box::new(PagedSession::new(
        total_pages,
        links_per_page,
        gate_present,
    )))
}

#[tokio::test(start_paused = true)]
async fn test_bounded_range_extracts_only_pages_two_to_four_in_order() {
    let paged = leaked(5, 2, false);
    let session = open_session(paged);
    let discovery = PaginatedDiscovery::new(&session);

    let range = PageRange {
        start: 2,
        end: Some(4),
    };
    let refs = discovery
        .run("https://example.com/listing/search", None, &range)
        .await
        .expect("discovery must succeed");

    let urls: Vec<&str> = refs.iter().map(|r| r.url.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            "https://example.com/files/doc-2-1.pdf",
            "https://example.com/files/doc-2-2.pdf",
            "https://example.com/files/doc-3-1.pdf",
            "https://example.com/files/doc-3-2.pdf",
            "https://example.com/files/doc-4-1.pdf",
            "https://example.com/files/doc-4-2.pdf",
        ],
        "pages 2..4 only, in strictly increasing page order"
    );

    // One click to skip page 1, two clicks for pages 3 and 4 - and never a
    // click beyond the end page.
    assert_eq!(paged.next_clicks.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_range_traverses_until_no_next_page() {
    let paged = leaked(3, 1, false);
    let session = open_session(paged);
    let discovery = PaginatedDiscovery::new(&session);

    let refs = discovery
        .run("https://example.com/listing/search", None, &PageRange::all())
        .await
        .expect("discovery must succeed");

    assert_eq!(refs.len(), 3, "one document per page across all pages");
    assert_eq!(paged.next_clicks.load(Ordering::SeqCst), 2);
    assert_eq!(
        refs.iter().map(|r| r.origin_page).collect::<Vec<_>>(),
        vec![Some(1), Some(2), Some(3)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_start_page_beyond_listing_yields_empty_set() {
    let paged = leaked(2, 1, false);
    let session = open_session(paged);
    let discovery = PaginatedDiscovery::new(&session);

    let range = PageRange {
        start: 10,
        end: None,
    };
    let refs = discovery
        .run("https://example.com/listing/search", None, &range)
        .await
        .expect("unreachable start page degrades to empty, not an error");
    assert!(refs.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_gate_checked_once_before_extraction() {
    let paged = leaked(2, 1, true);
    let session = open_session(paged);
    let discovery = PaginatedDiscovery::new(&session);

    let refs = discovery
        .run("https://example.com/listing/search", None, &PageRange::all())
        .await
        .expect("discovery must succeed");
    assert_eq!(refs.len(), 2);
    assert_eq!(
        paged.gate_clicks.load(Ordering::SeqCst),
        1,
        "gate clicked exactly once, before extraction"
    );

    // A second discovery over the same session must not re-verify.
    let _ = discovery
        .run("https://example.com/listing/search", None, &PageRange::all())
        .await
        .expect("second discovery must succeed");
    assert_eq!(paged.gate_clicks.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_query_is_submitted_through_search_form() {
    let paged = leaked(1, 1, false);
    let session = open_session(paged);
    let discovery = PaginatedDiscovery::new(&session);

    let refs = discovery
        .run(
            "https://example.com/listing/search",
            Some("flight logs"),
            &PageRange::all(),
        )
        .await
        .expect("discovery must succeed");
    assert_eq!(refs.len(), 1);
    assert_eq!(paged.searches(), vec!["flight logs".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_run_into_store_flushes_pages_and_dedups() {
    let dir = TempDir::new().expect("tempdir");
    let mut store = ReferenceStore::open(
        dir.path().join("references.txt"),
        dir.path().join("completed.txt"),
    )
    .expect("store opens");

    let paged = leaked(3, 2, false);
    let session = open_session(paged);
    let discovery = PaginatedDiscovery::new(&session);

    let report = discovery
        .run_into_store(
            "https://example.com/listing/search",
            None,
            &PageRange::all(),
            &mut store,
        )
        .await
        .expect("discovery must succeed");

    assert_eq!(report.found, 6);
    assert_eq!(report.added, 6);
    assert_eq!(report.pages, 3);

    // A second run over the same listing discovers the same references but
    // adds nothing new.
    let report = discovery
        .run_into_store(
            "https://example.com/listing/search",
            None,
            &PageRange::all(),
            &mut store,
        )
        .await
        .expect("second discovery must succeed");
    assert_eq!(report.found, 6);
    assert_eq!(report.added, 0);
    assert_eq!(store.reference_count(), 6);
}
