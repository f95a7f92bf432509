//! Extract photon extents from one ATL03 granule into a frame file.
//!
//! Reads the granule from a directory store, walks overlapping along-track
//! extents per ground track, and writes the packed `atl03rec` frames to the
//! output file, terminated by the zero-length end-of-stream frame.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use atlex_lib::asset::Asset;
use atlex_lib::beam::{Track, TrackSelection};
use atlex_lib::h5::DirectorySource;
use atlex_lib::logging::{format_count, OperationTimer};
use atlex_lib::parms::ExtractParms;
use atlex_lib::queue;
use atlex_lib::reader::ExtentReader;
use atlex_lib::record;

use crate::commands::command::Command;
use crate::commands::common::{spawn_frame_writer, StoreOptions, StreamOptions};

fn parse_track(value: &str) -> Result<TrackSelection, String> {
    if value.eq_ignore_ascii_case("all") {
        return Ok(TrackSelection::All);
    }
    value
        .parse::<u8>()
        .ok()
        .and_then(Track::from_number)
        .map(TrackSelection::One)
        .ok_or_else(|| format!("expected 'all' or a track number 1-3, got '{value}'"))
}

/// Extract photon extents from an ATL03 granule.
///
/// Walks each selected ground track into overlapping fixed-length extents,
/// filters photons by signal confidence (and optionally ATL08 class), and
/// streams one record per extent.
#[derive(Debug, Parser)]
#[command(
    name = "extract",
    about = "Extract photon extents from an ATL03 granule",
    long_about = r#"
Extract photon extents from an ATL03 granule stored in a directory store.

Each selected ground track is walked into overlapping extents of the
configured length and step. Photons are filtered by signal confidence and,
when enabled, by ATL08 classification joined from the companion granule.
One atl03rec frame is written per extent; a zero-length frame terminates
the stream.

Parameters are given as a JSON table using the short key names, e.g.:
  {"cnf": 3, "len": 40.0, "res": 20.0, "poly": [{"lat": -71.0, "lon": 45.0}, ...]}

Example usage:
  atlex extract -s ./store -r ATL03_20200304_0001 -o extents.bin
  atlex extract -s ./store -r ATL03_20200304_0001 -o extents.bin -t 2 -p parms.json
"#
)]
pub struct Extract {
    /// Granule store options
    #[command(flatten)]
    pub store: StoreOptions,

    /// Resource name of the granule within the store
    #[arg(short = 'r', long = "resource")]
    pub resource: String,

    /// Optional JSON parameter table
    #[arg(short = 'p', long = "parms")]
    pub parms: Option<PathBuf>,

    /// Ground track to process ('all' or 1-3)
    #[arg(short = 't', long = "track", default_value = "all", value_parser = parse_track)]
    pub track: TrackSelection,

    /// Output stream options
    #[command(flatten)]
    pub stream: StreamOptions,
}

impl Command for Extract {
    fn execute(&self) -> Result<()> {
        self.store.validate()?;

        let parms = match &self.parms {
            Some(path) => {
                let text = std::fs::read_to_string(path).with_context(|| {
                    format!("Failed to read parameter file '{}'", path.display())
                })?;
                ExtractParms::from_json(&text)?
            }
            None => ExtractParms::default(),
        };

        record::register_builtin();

        let timer = OperationTimer::new("Extracting extents");
        info!("Store: {}", self.store.store.display());
        info!("Resource: {}", self.resource);
        info!("Output: {}", self.stream.output.display());

        let asset = Asset::new("store", "file", &self.store.url());
        let source = Arc::new(DirectorySource::new());
        let (tx, rx) = queue::bounded(self.stream.queue_depth);
        let writer = spawn_frame_writer(&self.stream.output, rx)?;

        let reader =
            ExtentReader::spawn(source, asset, &self.resource, parms, self.track, tx)?;
        let stats = reader.join();
        let (frames, bytes) = writer
            .join()
            .map_err(|_| anyhow::anyhow!("Frame writer thread panicked"))??;

        info!("=== Summary ===");
        info!("Segments read: {}", format_count(u64::from(stats.segments_read)));
        info!("Extents sent: {}", format_count(u64::from(stats.extents_sent)));
        info!("Extents filtered: {}", format_count(u64::from(stats.extents_filtered)));
        if stats.extents_retried > 0 {
            info!("Extents retried: {}", format_count(u64::from(stats.extents_retried)));
        }
        if stats.extents_dropped > 0 {
            info!("Extents dropped: {}", format_count(u64::from(stats.extents_dropped)));
        }
        info!("Wrote {} frames ({} payload bytes)", format_count(frames), format_count(bytes));

        timer.log_completion(u64::from(stats.extents_sent));
        Ok(())
    }
}
