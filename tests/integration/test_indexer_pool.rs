//! Indexer pool over a directory store.

#![allow(clippy::float_cmp)]

use std::sync::Arc;

use atlex_lib::asset::Asset;
use atlex_lib::h5::DirectorySource;
use atlex_lib::indexer::{GranuleIndexer, IndexerStats};
use atlex_lib::queue;
use atlex_lib::record::IndexRecord;
use tempfile::TempDir;

use crate::helpers::index_datasets;

/// Two resources, two workers: one index record per resource plus a single
/// end-of-stream frame.
#[test]
fn test_indexer_round_trip() {
    let tmp = TempDir::new().unwrap();
    DirectorySource::write_granule(
        &tmp.path().join("granule_a"),
        &index_datasets(1.0e9, 100.0, 400.0, 6, 737),
    )
    .unwrap();
    DirectorySource::write_granule(
        &tmp.path().join("granule_b"),
        &index_datasets(1.0e9, 500.0, 800.0, 7, 1042),
    )
    .unwrap();

    let asset = Asset::new("store", "file", &tmp.path().display().to_string());
    let (tx, rx) = queue::bounded(16);
    let indexer = GranuleIndexer::spawn(
        Arc::new(DirectorySource::new()),
        asset,
        vec!["granule_a".to_string(), "granule_b".to_string()],
        2,
        tx,
    );
    let stats = indexer.join();
    assert_eq!(stats, IndexerStats { processed: 2, threads: 2, completed: 2 });

    let mut records = Vec::new();
    loop {
        let frame = rx.recv().unwrap();
        if queue::is_eos(&frame) {
            break;
        }
        records.push(IndexRecord::from_bytes(&frame).unwrap());
    }
    assert!(rx.try_recv().is_err());
    assert_eq!(records.len(), 2);

    records.sort_by(|a, b| a.name.cmp(&b.name));
    assert_eq!(records[0].name, "granule_a");
    assert_eq!(records[0].t0, 1.0e9 + 100.0);
    assert_eq!(records[0].t1, 1.0e9 + 400.0);
    assert_eq!(records[0].cycle, 6);
    assert_eq!(records[0].rgt, 737);
    // Endpoints: first gt3r reference photon, last gt1l reference photon.
    assert_eq!(records[0].lat0, -70.0);
    assert_eq!(records[0].lon0, 44.0);
    assert_eq!(records[0].lat1, -71.1);
    assert_eq!(records[0].lon1, 45.1);

    assert_eq!(records[1].name, "granule_b");
    assert_eq!(records[1].rgt, 1042);
}

/// A resource that fails to read is skipped; the rest of the list is still
/// indexed and the sentinel still arrives.
#[test]
fn test_indexer_skips_failing_resource() {
    let tmp = TempDir::new().unwrap();
    DirectorySource::write_granule(
        &tmp.path().join("granule_a"),
        &index_datasets(1.0e9, 100.0, 400.0, 6, 737),
    )
    .unwrap();

    let asset = Asset::new("store", "file", &tmp.path().display().to_string());
    let (tx, rx) = queue::bounded(16);
    let indexer = GranuleIndexer::spawn(
        Arc::new(DirectorySource::new()),
        asset,
        vec!["missing".to_string(), "granule_a".to_string()],
        1,
        tx,
    );
    let stats = indexer.join();
    assert_eq!(stats.processed, 2);

    let frame = rx.recv().unwrap();
    assert_eq!(IndexRecord::from_bytes(&frame).unwrap().name, "granule_a");
    assert!(queue::is_eos(&rx.recv().unwrap()));
}
