//! Common CLI options shared across commands.
//!
//! This module provides shared argument structures that can be composed into
//! command structs using `#[command(flatten)]`, plus the frame-file writer
//! both commands use to persist queue output.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use anyhow::{bail, Context, Result};
use clap::Args;
use crossbeam_channel::Receiver;

use atlex_lib::queue::{is_eos, Frame};

/// Options addressing a granule store on disk.
#[derive(Debug, Clone, Args)]
pub struct StoreOptions {
    /// Directory holding one granule directory per resource
    #[arg(short = 's', long = "store")]
    pub store: PathBuf,
}

impl StoreOptions {
    /// Validates that the store directory exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is missing or not a directory.
    pub fn validate(&self) -> Result<()> {
        if !self.store.is_dir() {
            bail!("Granule store '{}' is not a directory", self.store.display());
        }
        Ok(())
    }

    /// The store path as an asset base URL.
    #[must_use]
    pub fn url(&self) -> String {
        self.store.display().to_string()
    }
}

/// Options for the outbound record stream.
#[derive(Debug, Clone, Args)]
pub struct StreamOptions {
    /// Output file receiving length-prefixed record frames
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// Depth of the in-flight record queue
    #[arg(long = "queue-depth", default_value = "256")]
    pub queue_depth: usize,
}

/// Drain queue frames into a length-prefixed frame file on a background
/// thread.
///
/// Each frame is written as a host-endian `u32` length followed by the
/// frame bytes; the zero-length end-of-stream sentinel terminates the file.
/// Returns a handle yielding `(record_frames, payload_bytes)`.
pub fn spawn_frame_writer(
    path: &Path,
    rx: Receiver<Frame>,
) -> Result<JoinHandle<Result<(u64, u64)>>> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create output file '{}'", path.display()))?;
    Ok(std::thread::spawn(move || {
        let mut writer = BufWriter::new(file);
        let mut frames: u64 = 0;
        let mut bytes: u64 = 0;
        while let Ok(frame) = rx.recv() {
            writer.write_all(&(frame.len() as u32).to_ne_bytes())?;
            writer.write_all(&frame)?;
            if is_eos(&frame) {
                break;
            }
            frames += 1;
            bytes += frame.len() as u64;
        }
        writer.flush()?;
        Ok((frames, bytes))
    }))
}

/// Read back a frame file written by [`spawn_frame_writer`].
///
/// Returns the record frames in order, without the end-of-stream sentinel.
///
/// # Errors
///
/// Fails on truncated files or a missing sentinel.
pub fn read_frame_file(path: &Path) -> Result<Vec<Frame>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read frame file '{}'", path.display()))?;
    let mut frames = Vec::new();
    let mut offset = 0usize;
    loop {
        let Some(len_bytes) = bytes.get(offset..offset + 4) else {
            bail!("Frame file '{}' ended without an end-of-stream frame", path.display());
        };
        let len = u32::from_ne_bytes(len_bytes.try_into().expect("4 bytes")) as usize;
        offset += 4;
        if len == 0 {
            return Ok(frames);
        }
        let Some(frame) = bytes.get(offset..offset + len) else {
            bail!("Frame file '{}' is truncated", path.display());
        };
        frames.push(frame.to_vec());
        offset += len;
    }
}
