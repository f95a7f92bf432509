//! Extent extraction scenarios over synthetic granules.

#![allow(clippy::float_cmp)]

use std::sync::Arc;

use atlex_lib::asset::Asset;
use atlex_lib::beam::{Track, TrackSelection};
use atlex_lib::geo::Coord;
use atlex_lib::h5::MemSource;
use atlex_lib::parms::ExtractParms;
use atlex_lib::queue;
use atlex_lib::reader::{ExtentReader, ReaderStats};
use atlex_lib::record::ExtentRecord;

use crate::helpers::{
    atl08_datasets, mem_insert, resource_url, uniform_granule, BeamSpec, STORE_URL,
};

fn lenient_parms(extent_length: f64, extent_step: f64) -> ExtractParms {
    ExtractParms {
        extent_length,
        extent_step,
        minimum_photon_count: 1,
        along_track_spread: 0.0,
        ..ExtractParms::default()
    }
}

/// Run a reader to completion and decode every emitted extent.
fn run_reader(
    src: MemSource,
    resource: &str,
    parms: ExtractParms,
    tracks: TrackSelection,
) -> (Vec<ExtentRecord>, ReaderStats) {
    let (tx, rx) = queue::bounded(64);
    let reader = ExtentReader::spawn(
        Arc::new(src),
        Asset::new("store", "file", STORE_URL),
        resource,
        parms,
        tracks,
        tx,
    )
    .expect("reader spawns");
    let stats = reader.join();

    let mut records = Vec::new();
    loop {
        let frame = rx.recv().expect("stream stays open until end-of-stream");
        if queue::is_eos(&frame) {
            break;
        }
        records.push(ExtentRecord::from_bytes(&frame).expect("valid extent record"));
    }
    assert!(rx.try_recv().is_err(), "nothing follows the end-of-stream frame");
    (records, stats)
}

#[test]
fn test_degenerate_single_segment() {
    let spec = BeamSpec::new(&[0.0, 5.0, 10.0], &[3], &[0.0]);
    let mut src = MemSource::new();
    mem_insert(&mut src, &resource_url("g"), &uniform_granule(&spec, &[Track::Gt1]));

    let (records, stats) =
        run_reader(src, "g", lenient_parms(20.0, 20.0), TrackSelection::One(Track::Gt1));

    assert_eq!(records.len(), 1);
    assert_eq!(stats.extents_sent, 1);
    let record = &records[0];
    assert_eq!(record.track, 1);
    assert_eq!(record.sc_orient, 1);
    assert_eq!(record.rgt, 737);
    assert_eq!(record.cycle, 6);
    assert_eq!(record.valid, [true, true]);
    for side in 0..2 {
        assert_eq!(record.photons[side].len(), 3);
        let distances: Vec<f64> = record.photons[side].iter().map(|p| p.distance).collect();
        assert_eq!(distances, vec![-10.0, -5.0, 0.0]);
        let heights: Vec<f32> = record.photons[side].iter().map(|p| p.height).collect();
        assert_eq!(heights, vec![100.0, 101.0, 102.0]);
    }
}

#[test]
fn test_overlap_stepping() {
    let spec = BeamSpec::new(&[0.0, 10.0, 20.0, 30.0, 40.0], &[5], &[0.0]);
    let mut src = MemSource::new();
    mem_insert(&mut src, &resource_url("g"), &uniform_granule(&spec, &[Track::Gt2]));

    let (records, stats) =
        run_reader(src, "g", lenient_parms(40.0, 20.0), TrackSelection::One(Track::Gt2));

    // The photon at exactly extent_length is excluded; the tail extents
    // walk the remaining step snapshots.
    let counts: Vec<usize> = records.iter().map(|r| r.photons[0].len()).collect();
    assert_eq!(counts, vec![4, 3, 1]);
    assert_eq!(stats.extents_sent, 3);

    // Extent starts advance by one step each: the closest-segment estimate
    // grows by step/SEGMENT_LENGTH per record.
    let ids: Vec<u32> = records.iter().map(|r| r.segment_id[0]).collect();
    assert_eq!(ids, vec![101, 102, 103]);
}

#[test]
fn test_spread_filter() {
    let spec = BeamSpec::new(&[0.0, 5.0], &[2], &[0.0]);
    let mut src = MemSource::new();
    mem_insert(&mut src, &resource_url("g"), &uniform_granule(&spec, &[Track::Gt1]));

    let parms = ExtractParms {
        extent_length: 20.0,
        extent_step: 20.0,
        minimum_photon_count: 1,
        along_track_spread: 10.0,
        ..ExtractParms::default()
    };
    let (records, stats) = run_reader(src, "g", parms, TrackSelection::One(Track::Gt1));

    assert!(records.is_empty());
    assert_eq!(stats.extents_filtered, 1);
    assert_eq!(stats.extents_sent, 0);
}

#[test]
fn test_polygon_subset() {
    // Twenty 20 m segments walking north one degree at a time, two photons
    // per segment; the polygon covers segments 10..=19.
    let n_seg = 20;
    let dist_ph: Vec<f32> = (0..n_seg).flat_map(|_| [0.0f32, 10.0]).collect();
    let ph_cnt = vec![2; n_seg];
    let dist_x: Vec<f64> = (0..n_seg).map(|i| i as f64 * 20.0).collect();
    let ref_lat: Vec<f64> = (0..n_seg).map(|i| i as f64).collect();
    let ref_lon = vec![0.0; n_seg];
    let spec = BeamSpec::new(&dist_ph, &ph_cnt, &dist_x).with_refs(ref_lat, ref_lon);

    let mut src = MemSource::new();
    mem_insert(&mut src, &resource_url("g"), &uniform_granule(&spec, &[Track::Gt1]));

    let mut parms = lenient_parms(20.0, 20.0);
    parms.polygon = vec![
        Coord { lat: 9.5, lon: -1.0 },
        Coord { lat: 9.5, lon: 1.0 },
        Coord { lat: 19.5, lon: 1.0 },
        Coord { lat: 19.5, lon: -1.0 },
    ];
    let (records, stats) = run_reader(src, "g", parms, TrackSelection::One(Track::Gt1));

    // Ten segments per beam survive the subset.
    assert_eq!(stats.segments_read, 20);
    assert!(!records.is_empty());
    // The first extent sits on segment 10: id 110 plus half an extent.
    assert_eq!(records[0].segment_id[0], 111);
    // Every subset photon is observed exactly once when length == step.
    let observed: usize = records.iter().map(|r| r.photons[0].len()).sum();
    assert_eq!(observed, 20);
}

#[test]
fn test_atl08_classification_join() {
    let spec = BeamSpec::new(&[0.0, 5.0, 10.0], &[3], &[0.0]);
    let mut src = MemSource::new();
    mem_insert(
        &mut src,
        &resource_url("ATL03_demo"),
        &uniform_granule(&spec, &[Track::Gt1]),
    );
    // Companion file: photons 1 and 3 of segment 100 are ground and canopy.
    let companion = resource_url("ATL08_demo");
    for group in ["gt1l", "gt1r"] {
        mem_insert(&mut src, &companion, &atl08_datasets(group, &[100, 100], &[1, 3], &[1, 2]));
    }

    let mut parms = lenient_parms(20.0, 20.0);
    parms.use_atl08_classification = true;
    parms.atl08_class = [true; 5];
    let (records, _) = run_reader(src, "ATL03_demo", parms, TrackSelection::One(Track::Gt1));

    assert_eq!(records.len(), 1);
    let info: Vec<u32> = records[0].photons[0].iter().map(|p| p.info).collect();
    assert_eq!(info, vec![1, 4, 2]);
}

#[test]
fn test_atl08_mask_filters_photons() {
    let spec = BeamSpec::new(&[0.0, 5.0, 10.0], &[3], &[0.0]);
    let mut src = MemSource::new();
    mem_insert(
        &mut src,
        &resource_url("ATL03_demo"),
        &uniform_granule(&spec, &[Track::Gt1]),
    );
    let companion = resource_url("ATL08_demo");
    for group in ["gt1l", "gt1r"] {
        mem_insert(
            &mut src,
            &companion,
            &atl08_datasets(group, &[100, 100, 100], &[1, 2, 3], &[0, 1, 0]),
        );
    }

    let mut parms = lenient_parms(20.0, 20.0);
    parms.use_atl08_classification = true;
    parms.atl08_class = [false, true, false, false, false];
    let (records, _) = run_reader(src, "ATL03_demo", parms, TrackSelection::One(Track::Gt1));

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].photons[0].len(), 1);
    assert_eq!(records[0].photons[0][0].info, 1);
}
