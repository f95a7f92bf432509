//! Granule indexer: a worker pool producing one index record per resource.
//!
//! Workers pull resource names from a shared cursor, read a small fixed set
//! of datasets per granule (times, orbit numbers, and the reference-track
//! endpoints), and post one packed [`IndexRecord`] each. A failing resource
//! is logged and skipped; the pool moves on. The last worker to finish
//! posts the end-of-stream sentinel, exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{debug, error, warn};
use parking_lot::Mutex;

use crate::asset::Asset;
use crate::errors::{AtlexError, Result};
use crate::h5::{read_as, H5Source, ReadContext, Selection};
use crate::queue::{PostFailure, RecordQueue};
use crate::record::IndexRecord;

/// Worker count used when none (or an invalid one) is requested.
pub const DEFAULT_NUM_THREADS: usize = 4;
/// Largest accepted worker count.
pub const MAX_NUM_THREADS: usize = 32;

/// Beam whose first reference photon supplies `(lat0, lon0)`.
///
/// The endpoint pairing is inherited from the upstream product definition:
/// the bounding box runs from the first `gt3r` reference photon to the last
/// `gt1l` reference photon, and each longitude follows its latitude's beam.
pub const START_ENDPOINT_BEAM: &str = "gt3r";
/// Beam whose last reference photon supplies `(lat1, lon1)`.
pub const END_ENDPOINT_BEAM: &str = "gt1l";

/// Indexer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexerStats {
    /// Resources taken from the list so far
    pub processed: usize,
    /// Worker threads in the pool
    pub threads: usize,
    /// Workers that have completed
    pub completed: usize,
}

struct IndexerShared {
    source: Arc<dyn H5Source>,
    asset: Asset,
    resources: Vec<String>,
    cursor: Mutex<usize>,
    num_complete: Mutex<usize>,
    active: AtomicBool,
    queue: RecordQueue,
    thread_count: usize,
}

/// Produces a compact spatial/temporal index record per input resource.
pub struct GranuleIndexer {
    shared: Arc<IndexerShared>,
    handles: Vec<JoinHandle<()>>,
}

impl GranuleIndexer {
    /// Start indexing `resources` with `num_threads` workers.
    ///
    /// An out-of-range thread count is replaced by [`DEFAULT_NUM_THREADS`]
    /// with a logged warning. The caller must drain the queue's receiver;
    /// workers block once it fills.
    #[must_use]
    pub fn spawn(
        source: Arc<dyn H5Source>,
        asset: Asset,
        resources: Vec<String>,
        num_threads: usize,
        queue: RecordQueue,
    ) -> GranuleIndexer {
        let thread_count = if (1..=MAX_NUM_THREADS).contains(&num_threads) {
            num_threads
        } else {
            warn!(
                "Invalid number of threads supplied: {num_threads}. \
                 Setting to default: {DEFAULT_NUM_THREADS}."
            );
            DEFAULT_NUM_THREADS
        };

        let shared = Arc::new(IndexerShared {
            source,
            asset,
            resources,
            cursor: Mutex::new(0),
            num_complete: Mutex::new(0),
            active: AtomicBool::new(true),
            queue,
            thread_count,
        });

        let handles = (0..thread_count)
            .map(|_| {
                let worker_shared = Arc::clone(&shared);
                std::thread::spawn(move || run_worker(&worker_shared))
            })
            .collect();

        GranuleIndexer { shared, handles }
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> IndexerStats {
        IndexerStats {
            processed: *self.shared.cursor.lock(),
            threads: self.shared.thread_count,
            completed: *self.shared.num_complete.lock(),
        }
    }

    /// Ask workers to stop; they exit within one post-timeout window.
    pub fn shutdown(&self) {
        self.shared.active.store(false, Ordering::Relaxed);
    }

    fn join_handles(&mut self) {
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }

    /// Wait for all workers and return the final counters.
    #[must_use]
    pub fn join(mut self) -> IndexerStats {
        self.join_handles();
        self.stats()
    }
}

impl Drop for GranuleIndexer {
    fn drop(&mut self) {
        self.shutdown();
        self.join_handles();
    }
}

fn run_worker(shared: &IndexerShared) {
    while shared.active.load(Ordering::Relaxed) {
        let resource = {
            let mut cursor = shared.cursor.lock();
            if *cursor < shared.resources.len() {
                let resource = shared.resources[*cursor].clone();
                *cursor += 1;
                Some(resource)
            } else {
                None
            }
        };
        let Some(resource) = resource else { break };

        match index_resource(shared, &resource) {
            Ok(record) => post_record(shared, record),
            Err(e) => error!("Unable to index resource {resource}: {e}"),
        }
    }

    let mut num_complete = shared.num_complete.lock();
    *num_complete += 1;
    if *num_complete == shared.thread_count {
        shared.queue.post_eos(&shared.active);
    }
}

/// Read the nine index datasets of one granule and assemble its record.
fn index_resource(shared: &IndexerShared, resource: &str) -> Result<IndexRecord> {
    let source = shared.source.as_ref();
    let url = shared.asset.resource_url(resource);
    let ctx = ReadContext::default();

    let first = |dataset: &str| -> Result<f64> {
        let values: Vec<f64> = read_as(source, &url, dataset, Selection::all(), &ctx)?;
        values.first().copied().ok_or_else(|| AtlexError::io(dataset, "empty dataset"))
    };

    let sdp_epoch = first("/ancillary_data/atlas_sdp_gps_epoch")?;
    let start_delta_time = first("/ancillary_data/start_delta_time")?;
    let end_delta_time = first("/ancillary_data/end_delta_time")?;

    let cycle: Vec<i8> =
        read_as(source, &url, "/orbit_info/cycle_number", Selection::all(), &ctx)?;
    let cycle = cycle
        .first()
        .copied()
        .ok_or_else(|| AtlexError::io("/orbit_info/cycle_number", "empty dataset"))?;
    let rgt: Vec<u16> = read_as(source, &url, "/orbit_info/rgt", Selection::all(), &ctx)?;
    let rgt =
        rgt.first().copied().ok_or_else(|| AtlexError::io("/orbit_info/rgt", "empty dataset"))?;

    // Start endpoint: only the first reference photon is needed.
    let start_lat_ds = format!("/{START_ENDPOINT_BEAM}/geolocation/reference_photon_lat");
    let start_lon_ds = format!("/{START_ENDPOINT_BEAM}/geolocation/reference_photon_lon");
    let lat0: Vec<f64> = read_as(source, &url, &start_lat_ds, Selection::rows(0, Some(1)), &ctx)?;
    let lat0 = lat0.first().copied().ok_or_else(|| AtlexError::io(&start_lat_ds, "empty dataset"))?;
    let lon0: Vec<f64> = read_as(source, &url, &start_lon_ds, Selection::rows(0, Some(1)), &ctx)?;
    let lon0 = lon0.first().copied().ok_or_else(|| AtlexError::io(&start_lon_ds, "empty dataset"))?;

    // End endpoint: last reference photon of the other outer beam.
    let end_lat_ds = format!("/{END_ENDPOINT_BEAM}/geolocation/reference_photon_lat");
    let end_lon_ds = format!("/{END_ENDPOINT_BEAM}/geolocation/reference_photon_lon");
    let end_lat: Vec<f64> = read_as(source, &url, &end_lat_ds, Selection::all(), &ctx)?;
    let lat1 =
        end_lat.last().copied().ok_or_else(|| AtlexError::io(&end_lat_ds, "empty dataset"))?;
    let end_lon: Vec<f64> = read_as(source, &url, &end_lon_ds, Selection::all(), &ctx)?;
    let lon1 =
        end_lon.last().copied().ok_or_else(|| AtlexError::io(&end_lon_ds, "empty dataset"))?;

    debug!("Indexed {resource}: {} reads, {} bytes", ctx.reads(), ctx.bytes_read());

    Ok(IndexRecord {
        name: resource.to_string(),
        t0: sdp_epoch + start_delta_time,
        t1: sdp_epoch + end_delta_time,
        lat0,
        lon0,
        lat1,
        lon1,
        cycle: cycle.max(0) as u32,
        rgt: u32::from(rgt),
    })
}

fn post_record(shared: &IndexerShared, record: IndexRecord) {
    let mut frame = record.to_bytes();
    loop {
        if !shared.active.load(Ordering::Relaxed) {
            return;
        }
        match shared.queue.post(frame) {
            Ok(()) => return,
            Err(failure @ PostFailure::Timeout(_)) => {
                debug!("Granule indexer failed to post record: queue full");
                frame = failure.into_frame();
            }
            Err(PostFailure::Closed(_)) => {
                debug!("Granule indexer dropped record: consumer gone");
                return;
            }
        }
    }
}
