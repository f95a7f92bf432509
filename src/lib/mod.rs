#![deny(unsafe_code)]
// Clippy lint configuration for CI
// These lints are allowed because:
// - cast_*: geophysical code intentionally casts between numeric types
// - missing_*_doc: error/panic docs tracked case by case
// - module_name_repetitions: record/queue types read better fully named
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_lossless,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::uninlined_format_args
)]

//! # atlex - ATL03 extent extraction library
//!
//! This library turns photon-level ICESat-2 ATL03 granules into streams of
//! fixed-length, overlapping along-track extents suitable for surface-fit
//! algorithms, and builds compact spatial/temporal index records over
//! granule collections.
//!
//! ## Overview
//!
//! - **[`reader`]** - the extent reader: per-track workers that subset,
//!   walk, and publish extents for one granule
//! - **[`indexer`]** - the granule indexer: a worker pool producing one
//!   index record per resource
//! - **[`extent`]** - the extent walker and its cursor state
//! - **[`region`]** - polygon-based spatial subsetting
//! - **[`parms`]** - extraction parameters with defaults and validation
//! - **[`record`]** - packed record layouts and the schema registry
//! - **[`h5`]** - the granule provider contract and bundled providers
//! - **[`queue`]** - the bounded framed queue between workers and consumers
//!
//! Supporting modules: [`beam`] (track/beam vocabulary), [`paired`]
//! (per-beam array pairs), [`geo`] (projections and polygon tests),
//! [`asset`] (resource naming), [`errors`], and [`logging`].
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use atlex_lib::asset::Asset;
//! use atlex_lib::beam::TrackSelection;
//! use atlex_lib::h5::DirectorySource;
//! use atlex_lib::parms::ExtractParms;
//! use atlex_lib::queue;
//! use atlex_lib::reader::ExtentReader;
//!
//! # fn main() -> atlex_lib::errors::Result<()> {
//! atlex_lib::record::register_builtin();
//! let source = Arc::new(DirectorySource::new());
//! let asset = Asset::new("local", "file", "/data/granules");
//! let (tx, rx) = queue::bounded(256);
//!
//! let reader = ExtentReader::spawn(
//!     source,
//!     asset,
//!     "ATL03_20200304_0001.h5",
//!     ExtractParms::default(),
//!     TrackSelection::All,
//!     tx,
//! )?;
//!
//! // Drain frames until the end-of-stream sentinel.
//! while let Ok(frame) = rx.recv() {
//!     if queue::is_eos(&frame) {
//!         break;
//!     }
//!     // hand the frame to a consumer ...
//! }
//! let stats = reader.join();
//! println!("sent {} extents", stats.extents_sent);
//! # Ok(())
//! # }
//! ```

pub mod asset;
pub mod beam;
pub mod errors;
pub mod extent;
pub mod geo;
pub mod h5;
pub mod indexer;
pub mod logging;
pub mod paired;
pub mod parms;
pub mod queue;
pub mod reader;
pub mod record;
pub mod region;

// Re-export the error type for convenient access
pub use errors::{AtlexError, Result};
