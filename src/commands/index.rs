//! Index a collection of ATL03 granules into a frame file.
//!
//! A worker pool reads the small index datasets of each granule and writes
//! one packed `atl03rec.index` frame per resource.

use anyhow::Result;
use clap::Parser;
use log::info;

use std::sync::Arc;

use atlex_lib::asset::Asset;
use atlex_lib::h5::DirectorySource;
use atlex_lib::indexer::{GranuleIndexer, DEFAULT_NUM_THREADS};
use atlex_lib::logging::{format_count, OperationTimer};
use atlex_lib::queue;
use atlex_lib::record;

use crate::commands::command::Command;
use crate::commands::common::{spawn_frame_writer, StoreOptions, StreamOptions};

/// Build spatial/temporal index records over a set of granules.
#[derive(Debug, Parser)]
#[command(
    name = "index",
    about = "Index ATL03 granules into bounding-box records",
    long_about = r#"
Index a collection of ATL03 granules.

A pool of workers reads each granule's time span, orbit numbers, and
reference-track endpoints, and writes one atl03rec.index frame per
resource. A zero-length frame terminates the stream. Failures of single
resources are logged and skipped.

Example usage:
  atlex index -s ./store -o index.bin ATL03_a ATL03_b ATL03_c
  atlex index -s ./store -o index.bin --threads 8 ATL03_a ATL03_b
"#
)]
pub struct Index {
    /// Granule store options
    #[command(flatten)]
    pub store: StoreOptions,

    /// Resource names of the granules to index
    #[arg(required = true)]
    pub resources: Vec<String>,

    /// Worker thread count
    #[arg(long = "threads", default_value_t = DEFAULT_NUM_THREADS)]
    pub threads: usize,

    /// Output stream options
    #[command(flatten)]
    pub stream: StreamOptions,
}

impl Command for Index {
    fn execute(&self) -> Result<()> {
        self.store.validate()?;
        record::register_builtin();

        let timer = OperationTimer::new("Indexing granules");
        info!("Store: {}", self.store.store.display());
        info!("Resources: {}", self.resources.len());

        let asset = Asset::new("store", "file", &self.store.url());
        let source = Arc::new(DirectorySource::new());
        let (tx, rx) = queue::bounded(self.stream.queue_depth);
        let writer = spawn_frame_writer(&self.stream.output, rx)?;

        let indexer =
            GranuleIndexer::spawn(source, asset, self.resources.clone(), self.threads, tx);
        let stats = indexer.join();
        let (frames, bytes) = writer
            .join()
            .map_err(|_| anyhow::anyhow!("Frame writer thread panicked"))??;

        info!("=== Summary ===");
        info!("Resources processed: {}", format_count(stats.processed as u64));
        info!("Workers completed: {}", format_count(stats.completed as u64));
        info!("Wrote {} frames ({} payload bytes)", format_count(frames), format_count(bytes));

        timer.log_completion(frames);
        Ok(())
    }
}
