//! Extent reader: per-track workers over one granule.
//!
//! The reader owns one resource. It reads the granule-level arrays
//! (`sc_orient`, `start_rgt`, `start_cycle`) once, then either spawns one
//! worker thread per ground track or runs a single track's worker on the
//! calling thread. Each worker builds its own region subset, issues its own
//! range-limited reads under a private read context, walks extents, and
//! posts packed records. Workers share only the aggregated statistics and
//! the completion counter, under one mutex; the worker that completes last
//! posts the end-of-stream sentinel, exactly once, on every path including
//! failures.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{debug, error, info};
use parking_lot::Mutex;

use crate::asset::Asset;
use crate::beam::{BeamSide, ScOrient, Track, TrackSelection};
use crate::errors::{AtlexError, Result};
use crate::extent::{ExtentWalker, TrackData};
use crate::h5::{read_as, H5Source, ReadContext, Selection};
use crate::parms::ExtractParms;
use crate::queue::{PostFailure, RecordQueue};
use crate::region::Region;

/// Aggregated reader counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    /// Segments covered by the subset windows, both beams
    pub segments_read: u32,
    /// Extents where neither beam passed the filters
    pub extents_filtered: u32,
    /// Extents delivered to the queue
    pub extents_sent: u32,
    /// Extents abandoned during shutdown or consumer loss
    pub extents_dropped: u32,
    /// Post attempts that timed out and were retried
    pub extents_retried: u32,
}

impl ReaderStats {
    fn merge(&mut self, other: &ReaderStats) {
        self.segments_read += other.segments_read;
        self.extents_filtered += other.extents_filtered;
        self.extents_sent += other.extents_sent;
        self.extents_dropped += other.extents_dropped;
        self.extents_retried += other.extents_retried;
    }
}

struct ReaderState {
    stats: ReaderStats,
    num_complete: usize,
}

struct Shared {
    source: Arc<dyn H5Source>,
    asset: Asset,
    resource: String,
    parms: ExtractParms,
    queue: RecordQueue,
    active: AtomicBool,
    state: Mutex<ReaderState>,
    thread_count: usize,
    sc_orient: u8,
    rgt: u16,
    cycle: u16,
}

/// Streams one granule's extents onto an outbound queue.
pub struct ExtentReader {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
}

impl ExtentReader {
    /// Start reading `resource`.
    ///
    /// With [`TrackSelection::All`] three worker threads are spawned and
    /// this returns immediately; the caller must drain the queue's receiver
    /// concurrently, since workers block once it fills. With a single track
    /// the worker runs on the calling thread and this returns when the
    /// track is done, so the queue must be deep enough for its output (or a
    /// drain thread must already be running).
    ///
    /// # Errors
    ///
    /// Fails when the granule-level arrays cannot be read; the end-of-stream
    /// sentinel is still posted so consumers do not block.
    pub fn spawn(
        source: Arc<dyn H5Source>,
        asset: Asset,
        resource: &str,
        parms: ExtractParms,
        tracks: TrackSelection,
        queue: RecordQueue,
    ) -> Result<ExtentReader> {
        let url = asset.resource_url(resource);
        let globals = Self::read_globals(source.as_ref(), &url);
        let (sc_orient, rgt, cycle) = match globals {
            Ok(values) => values,
            Err(e) => {
                error!("Failed to read global information in resource {resource}: {e}");
                queue.post_eos(&AtomicBool::new(true));
                return Err(e);
            }
        };

        let shared = Arc::new(Shared {
            source,
            asset,
            resource: resource.to_string(),
            parms,
            queue,
            active: AtomicBool::new(true),
            state: Mutex::new(ReaderState { stats: ReaderStats::default(), num_complete: 0 }),
            thread_count: tracks.worker_count(),
            sc_orient,
            rgt,
            cycle,
        });

        let mut handles = Vec::new();
        match tracks {
            TrackSelection::All => {
                for track in Track::TRACKS {
                    let worker_shared = Arc::clone(&shared);
                    handles.push(std::thread::spawn(move || run_worker(&worker_shared, track)));
                }
            }
            TrackSelection::One(track) => run_worker(&shared, track),
        }

        Ok(ExtentReader { shared, handles })
    }

    fn read_globals(source: &dyn H5Source, url: &str) -> Result<(u8, u16, u16)> {
        let ctx = ReadContext::default();
        let first = |dataset: &str, values: Vec<i32>| -> Result<i32> {
            values.first().copied().ok_or_else(|| AtlexError::io(dataset, "empty dataset"))
        };
        let sc_orient: Vec<i8> =
            read_as(source, url, "/orbit_info/sc_orient", Selection::all(), &ctx)?;
        let sc_orient = sc_orient
            .first()
            .copied()
            .ok_or_else(|| AtlexError::io("/orbit_info/sc_orient", "empty dataset"))?;
        let rgt: Vec<i32> =
            read_as(source, url, "/ancillary_data/start_rgt", Selection::all(), &ctx)?;
        let rgt = first("/ancillary_data/start_rgt", rgt)?;
        let cycle: Vec<i32> =
            read_as(source, url, "/ancillary_data/start_cycle", Selection::all(), &ctx)?;
        let cycle = first("/ancillary_data/start_cycle", cycle)?;
        debug!(
            "Granule globals: orientation {:?}, rgt {rgt}, cycle {cycle}",
            ScOrient::from_index(sc_orient as u8)
        );
        Ok((sc_orient as u8, rgt as u16, cycle as u16))
    }

    /// Effective configuration.
    #[must_use]
    pub fn parms(&self) -> &ExtractParms {
        &self.shared.parms
    }

    /// Aggregated counters, optionally zeroing them.
    pub fn stats(&self, clear: bool) -> ReaderStats {
        let mut state = self.shared.state.lock();
        let stats = state.stats;
        if clear {
            state.stats = ReaderStats::default();
        }
        stats
    }

    /// Number of workers that have completed.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.shared.state.lock().num_complete
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

    /// Wait for all workers and return the final statistics.
    #[must_use]
    pub fn join(mut self) -> ReaderStats {
        self.join_handles();
        self.stats(false)
    }
}

impl Drop for ExtentReader {
    fn drop(&mut self) {
        self.shutdown();
        self.join_handles();
    }
}

/// One track's worker: subset, read, walk, post; then report completion.
fn run_worker(shared: &Shared, track: Track) {
    let mut local = ReaderStats::default();

    match process_track(shared, track, &mut local) {
        Ok(()) => {}
        Err(AtlexError::EmptyRegion) => {
            info!("No photons within region of {} track {track}", shared.resource);
        }
        Err(e) => {
            error!("Failure during processing of resource {} track {track}: {e}", shared.resource);
        }
    }

    let mut state = shared.state.lock();
    state.stats.merge(&local);
    state.num_complete += 1;
    if state.num_complete == shared.thread_count {
        info!("Completed processing resource {}", shared.resource);
        shared.queue.post_eos(&shared.active);
    }
}

fn process_track(shared: &Shared, track: Track, local: &mut ReaderStats) -> Result<()> {
    let source = shared.source.as_ref();
    let url = shared.asset.resource_url(&shared.resource);
    let atl08_url = shared.asset.classification_url(&shared.resource);

    let ctx = ReadContext::default();
    let ctx08 = ReadContext::default();

    let region = Region::subset(source, &url, track, &shared.parms, &ctx)?;
    let data =
        TrackData::read(source, &url, &atl08_url, track, &region, &shared.parms, &ctx, &ctx08)?;

    // All reads for this track are issued; log and retire the contexts.
    info!(
        "I/O context for {} track {track}: {} reads, {} bytes",
        shared.resource,
        ctx.reads() + ctx08.reads(),
        ctx.bytes_read() + ctx08.bytes_read()
    );
    drop(ctx);
    drop(ctx08);

    local.segments_read += (region.segment_ph_cnt.len(BeamSide::Left)
        + region.segment_ph_cnt.len(BeamSide::Right)) as u32;

    let mut walker = ExtentWalker::new(&data, &region, &shared.parms, track, &shared.resource);
    while shared.active.load(Ordering::Relaxed) {
        let Some(mut record) = walker.next_extent()? else {
            break;
        };
        if !(record.valid[0] || record.valid[1] || shared.parms.pass_invalid) {
            local.extents_filtered += 1;
            continue;
        }

        record.sc_orient = shared.sc_orient;
        record.rgt = shared.rgt;
        record.cycle = shared.cycle;

        let mut frame = record.to_bytes();
        loop {
            if !shared.active.load(Ordering::Relaxed) {
                local.extents_dropped += 1;
                break;
            }
            match shared.queue.post(frame) {
                Ok(()) => {
                    local.extents_sent += 1;
                    break;
                }
                Err(failure @ PostFailure::Timeout(_)) => {
                    local.extents_retried += 1;
                    debug!("Extent reader failed to post record: queue full");
                    frame = failure.into_frame();
                }
                Err(PostFailure::Closed(_)) => {
                    local.extents_dropped += 1;
                    debug!("Extent reader dropped record: consumer gone");
                    break;
                }
            }
        }
    }
    Ok(())
}
