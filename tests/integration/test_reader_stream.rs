//! Stream-level behavior of the extent reader: completion signalling,
//! failure isolation, and the pass-invalid escape hatch.

use std::sync::Arc;

use atlex_lib::asset::Asset;
use atlex_lib::beam::{Track, TrackSelection};
use atlex_lib::geo::Coord;
use atlex_lib::h5::MemSource;
use atlex_lib::parms::ExtractParms;
use atlex_lib::queue;
use atlex_lib::record::ExtentRecord;
use atlex_lib::reader::ExtentReader;

use crate::helpers::{mem_insert, resource_url, uniform_granule, BeamSpec, STORE_URL};

fn test_asset() -> Asset {
    Asset::new("store", "file", STORE_URL)
}

fn lenient_parms() -> ExtractParms {
    ExtractParms {
        extent_length: 20.0,
        extent_step: 20.0,
        minimum_photon_count: 1,
        along_track_spread: 0.0,
        ..ExtractParms::default()
    }
}

/// One worker hits an I/O failure while the other two succeed: the stream
/// still carries their extents and exactly one end-of-stream frame.
#[test]
fn test_worker_failure_does_not_break_the_stream() {
    let spec = BeamSpec::new(&[0.0, 5.0, 10.0], &[3], &[0.0]);
    let mut src = MemSource::new();
    // Track 2's datasets are missing entirely.
    mem_insert(
        &mut src,
        &resource_url("g"),
        &uniform_granule(&spec, &[Track::Gt1, Track::Gt3]),
    );

    let (tx, rx) = queue::bounded(16);
    let reader = ExtentReader::spawn(
        Arc::new(src),
        test_asset(),
        "g",
        lenient_parms(),
        TrackSelection::All,
        tx,
    )
    .unwrap();

    let mut tracks_seen = Vec::new();
    loop {
        let frame = rx.recv().unwrap();
        if queue::is_eos(&frame) {
            break;
        }
        tracks_seen.push(ExtentRecord::from_bytes(&frame).unwrap().track);
    }

    // All three workers completed, including the failing one.
    assert_eq!(reader.completed(), 3);
    let stats = reader.stats(false);
    assert_eq!(stats.extents_sent, 2);
    tracks_seen.sort_unstable();
    assert_eq!(tracks_seen, vec![1, 3]);

    // Exactly one end-of-stream frame was posted.
    assert!(rx.try_recv().is_err());
    let _ = reader.join();
}

/// An empty spatial region is informational: the worker skips the walker
/// but completion and the sentinel still happen.
#[test]
fn test_empty_region_completes_cleanly() {
    let spec = BeamSpec::new(&[0.0, 5.0, 10.0], &[3], &[0.0]);
    let mut src = MemSource::new();
    mem_insert(&mut src, &resource_url("g"), &uniform_granule(&spec, &[Track::Gt1]));

    let mut parms = lenient_parms();
    // The granule sits at (-70, 45); this polygon is nowhere near it.
    parms.polygon = vec![
        Coord { lat: 10.0, lon: 10.0 },
        Coord { lat: 10.0, lon: 11.0 },
        Coord { lat: 11.0, lon: 11.0 },
        Coord { lat: 11.0, lon: 10.0 },
    ];

    let (tx, rx) = queue::bounded(16);
    let reader = ExtentReader::spawn(
        Arc::new(src),
        test_asset(),
        "g",
        parms,
        TrackSelection::One(Track::Gt1),
        tx,
    )
    .unwrap();

    assert!(queue::is_eos(&rx.recv().unwrap()));
    assert_eq!(reader.completed(), 1);
    let stats = reader.join();
    assert_eq!(stats.extents_sent, 0);
    assert_eq!(stats.extents_filtered, 0);
}

/// With pass_invalid set, a neither-beam-valid extent is still posted,
/// flagged invalid and carrying no photons.
#[test]
fn test_pass_invalid_posts_filtered_extents() {
    let spec = BeamSpec::new(&[0.0, 5.0], &[2], &[0.0]);
    let mut src = MemSource::new();
    mem_insert(&mut src, &resource_url("g"), &uniform_granule(&spec, &[Track::Gt1]));

    let parms = ExtractParms {
        extent_length: 20.0,
        extent_step: 20.0,
        minimum_photon_count: 1,
        along_track_spread: 10.0,
        pass_invalid: true,
        ..ExtractParms::default()
    };

    let (tx, rx) = queue::bounded(16);
    let reader = ExtentReader::spawn(
        Arc::new(src),
        test_asset(),
        "g",
        parms,
        TrackSelection::One(Track::Gt1),
        tx,
    )
    .unwrap();
    let stats = reader.join();

    let frame = rx.recv().unwrap();
    let record = ExtentRecord::from_bytes(&frame).unwrap();
    assert_eq!(record.valid, [false, false]);
    assert!(record.photons[0].is_empty());
    assert!(record.photons[1].is_empty());
    assert_eq!(stats.extents_sent, 1);
    assert_eq!(stats.extents_filtered, 0);
    assert!(queue::is_eos(&rx.recv().unwrap()));
}

/// All three tracks of a healthy granule produce one extent each.
#[test]
fn test_all_tracks_stream() {
    let spec = BeamSpec::new(&[0.0, 5.0, 10.0], &[3], &[0.0]);
    let mut src = MemSource::new();
    mem_insert(&mut src, &resource_url("g"), &uniform_granule(&spec, &Track::TRACKS));

    let (tx, rx) = queue::bounded(16);
    let reader = ExtentReader::spawn(
        Arc::new(src),
        test_asset(),
        "g",
        lenient_parms(),
        TrackSelection::All,
        tx,
    )
    .unwrap();

    let mut tracks_seen = Vec::new();
    loop {
        let frame = rx.recv().unwrap();
        if queue::is_eos(&frame) {
            break;
        }
        tracks_seen.push(ExtentRecord::from_bytes(&frame).unwrap().track);
    }
    tracks_seen.sort_unstable();
    assert_eq!(tracks_seen, vec![1, 2, 3]);

    let stats = reader.join();
    assert_eq!(stats.extents_sent, 3);
    assert_eq!(stats.segments_read, 6);
}
