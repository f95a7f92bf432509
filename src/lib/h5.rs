//! Granule provider contract and the providers shipped with the crate.
//!
//! The extraction pipelines never touch storage directly; they go through
//! [`H5Source`], which models the external scientific-file reader: typed
//! range reads of a named dataset with `(row_start, row_count, column)`
//! slicing, plus an opaque per-resource [`ReadContext`] that lets a provider
//! coalesce I/O and expose `(reads, bytes)` counters.
//!
//! Two implementations are included: [`MemSource`] holds datasets in memory
//! and backs the test suites, and [`DirectorySource`] serves granules stored
//! as raw little-endian arrays under a directory, which is what the CLI uses.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::{AtlexError, Result};

/// Column selection for 2-D datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColSelect {
    /// A single column, extracted with a stride
    Index(usize),
    /// All columns, returned row-major flattened
    All,
}

/// A range-read request: rows `[row_start, row_start + row_count)` of one
/// column (or all columns) of a dataset. `row_count = None` means the
/// remainder of the axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    /// Column to read (1-D datasets have a single column 0)
    pub col: ColSelect,
    /// First row of the read
    pub row_start: usize,
    /// Number of rows, or `None` for the remainder of the axis
    pub row_count: Option<usize>,
}

impl Selection {
    /// The whole dataset.
    #[must_use]
    pub fn all() -> Self {
        Selection { col: ColSelect::Index(0), row_start: 0, row_count: None }
    }

    /// A row window of column 0.
    #[must_use]
    pub fn rows(row_start: usize, row_count: Option<usize>) -> Self {
        Selection { col: ColSelect::Index(0), row_start, row_count }
    }

    /// Replace the column selection.
    #[must_use]
    pub fn with_col(mut self, col: ColSelect) -> Self {
        self.col = col;
        self
    }
}

/// A typed 1-D slice returned by a provider.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    /// 64-bit floats
    F64(Vec<f64>),
    /// 32-bit floats
    F32(Vec<f32>),
    /// 32-bit signed integers
    I32(Vec<i32>),
    /// 8-bit signed integers
    I8(Vec<i8>),
    /// 16-bit unsigned integers
    U16(Vec<u16>),
}

impl ArrayData {
    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            ArrayData::F64(v) => v.len(),
            ArrayData::F32(v) => v.len(),
            ArrayData::I32(v) => v.len(),
            ArrayData::I8(v) => v.len(),
            ArrayData::U16(v) => v.len(),
        }
    }

    /// True when the slice holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short type name, as used in directory-store manifests.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            ArrayData::F64(_) => "f64",
            ArrayData::F32(_) => "f32",
            ArrayData::I32(_) => "i32",
            ArrayData::I8(_) => "i8",
            ArrayData::U16(_) => "u16",
        }
    }

    /// Size of one element in bytes.
    #[must_use]
    pub fn elem_size(&self) -> usize {
        match self {
            ArrayData::F64(_) => 8,
            ArrayData::F32(_) | ArrayData::I32(_) => 4,
            ArrayData::I8(_) => 1,
            ArrayData::U16(_) => 2,
        }
    }
}

/// Element types a provider can return.
///
/// Implemented for the scalar types ATL03/ATL08 datasets use. `extract`
/// rejects a slice of the wrong type with a dataset-named I/O error.
pub trait Element: Copy + Send + Sync + 'static {
    /// Unwrap a typed slice, or fail when the stored type differs.
    fn extract(data: ArrayData, dataset: &str) -> Result<Vec<Self>>;

    /// Decode a little-endian byte buffer.
    fn decode_le(bytes: &[u8], dataset: &str) -> Result<Vec<Self>>;
}

macro_rules! impl_element {
    ($t:ty, $variant:ident, $name:literal, $size:literal) => {
        impl Element for $t {
            fn extract(data: ArrayData, dataset: &str) -> Result<Vec<Self>> {
                match data {
                    ArrayData::$variant(v) => Ok(v),
                    other => Err(AtlexError::io(
                        dataset,
                        format!("expected {} data, found {}", $name, other.type_name()),
                    )),
                }
            }

            fn decode_le(bytes: &[u8], dataset: &str) -> Result<Vec<Self>> {
                if bytes.len() % $size != 0 {
                    return Err(AtlexError::io(
                        dataset,
                        format!("byte length {} is not a multiple of {}", bytes.len(), $size),
                    ));
                }
                Ok(bytes
                    .chunks_exact($size)
                    .map(|c| <$t>::from_le_bytes(c.try_into().expect("chunk size")))
                    .collect())
            }
        }
    };
}

impl_element!(f64, F64, "f64", 8);
impl_element!(f32, F32, "f32", 4);
impl_element!(i32, I32, "i32", 4);
impl_element!(i8, I8, "i8", 1);
impl_element!(u16, U16, "u16", 2);

/// Per-resource read-coalescing handle with observability counters.
///
/// A context is created empty, passed to every read issued for one resource,
/// and dropped once all reads are done; the accumulated counters are logged
/// at that point.
#[derive(Debug, Default)]
pub struct ReadContext {
    reads: AtomicU64,
    bytes: AtomicU64,
}

impl ReadContext {
    /// Record one completed read of `bytes` bytes.
    pub fn record(&self, bytes: u64) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Number of reads issued through this context.
    #[must_use]
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Total bytes read through this context.
    #[must_use]
    pub fn bytes_read(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

/// The granule provider contract.
///
/// Each call either returns a complete slice or fails with
/// [`AtlexError::Io`], which the caller surfaces and uses to terminate the
/// pipeline for that resource.
pub trait H5Source: Send + Sync {
    /// Read a slice of `dataset` within the resource at `url`.
    fn read(&self, url: &str, dataset: &str, sel: Selection, ctx: &ReadContext)
        -> Result<ArrayData>;
}

/// Typed convenience wrapper over [`H5Source::read`].
pub fn read_as<T: Element>(
    source: &dyn H5Source,
    url: &str,
    dataset: &str,
    sel: Selection,
    ctx: &ReadContext,
) -> Result<Vec<T>> {
    let data = source.read(url, dataset, sel, ctx)?;
    T::extract(data, dataset)
}

/// Dataset names are matched without their leading slash, so
/// `/orbit_info/sc_orient` and `orbit_info/sc_orient` address the same data.
fn normalize_dataset(dataset: &str) -> &str {
    dataset.trim_start_matches('/')
}

/// Apply a selection to a flattened row-major array with `cols` columns.
fn select_rows<T: Copy>(
    values: &[T],
    cols: usize,
    sel: Selection,
    dataset: &str,
) -> Result<Vec<T>> {
    if cols == 0 {
        return Err(AtlexError::io(dataset, "dataset has zero columns"));
    }
    let rows = values.len() / cols;
    let start = sel.row_start.min(rows);
    let count = sel.row_count.map_or(rows - start, |c| c.min(rows - start));
    match sel.col {
        ColSelect::All => Ok(values[start * cols..(start + count) * cols].to_vec()),
        ColSelect::Index(i) => {
            if i >= cols {
                return Err(AtlexError::io(
                    dataset,
                    format!("column {i} out of range ({cols} columns)"),
                ));
            }
            Ok((0..count).map(|r| values[(start + r) * cols + i]).collect())
        }
    }
}

fn select_data(data: &ArrayData, cols: usize, sel: Selection, dataset: &str) -> Result<ArrayData> {
    Ok(match data {
        ArrayData::F64(v) => ArrayData::F64(select_rows(v, cols, sel, dataset)?),
        ArrayData::F32(v) => ArrayData::F32(select_rows(v, cols, sel, dataset)?),
        ArrayData::I32(v) => ArrayData::I32(select_rows(v, cols, sel, dataset)?),
        ArrayData::I8(v) => ArrayData::I8(select_rows(v, cols, sel, dataset)?),
        ArrayData::U16(v) => ArrayData::U16(select_rows(v, cols, sel, dataset)?),
    })
}

#[derive(Debug, Clone)]
struct MemDataset {
    data: ArrayData,
    cols: usize,
}

/// In-memory provider keyed by `(url, dataset)`.
///
/// Datasets are stored flattened row-major; 2-D datasets carry their column
/// count so per-column and all-column selections behave like the real
/// provider's hyperslab reads.
#[derive(Debug, Default)]
pub struct MemSource {
    datasets: HashMap<(String, String), MemDataset>,
}

impl MemSource {
    /// Create an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a 1-D dataset.
    pub fn insert(&mut self, url: &str, dataset: &str, data: ArrayData) {
        self.insert_2d(url, dataset, data, 1);
    }

    /// Insert a 2-D dataset stored row-major with `cols` columns.
    pub fn insert_2d(&mut self, url: &str, dataset: &str, data: ArrayData, cols: usize) {
        self.datasets.insert(
            (url.to_string(), normalize_dataset(dataset).to_string()),
            MemDataset { data, cols },
        );
    }
}

impl H5Source for MemSource {
    fn read(
        &self,
        url: &str,
        dataset: &str,
        sel: Selection,
        ctx: &ReadContext,
    ) -> Result<ArrayData> {
        let entry = self
            .datasets
            .get(&(url.to_string(), normalize_dataset(dataset).to_string()))
            .ok_or_else(|| AtlexError::io(dataset, format!("no such dataset in {url}")))?;
        let out = select_data(&entry.data, entry.cols, sel, dataset)?;
        ctx.record((out.len() * out.elem_size()) as u64);
        Ok(out)
    }
}

/// Name of the per-granule manifest file in a directory store.
pub const MANIFEST_NAME: &str = "manifest.tsv";

/// A named dataset staged for [`DirectorySource::write_granule`].
#[derive(Debug, Clone)]
pub struct GranuleDataset {
    /// Dataset path within the granule, e.g. `geolocation/segment_id`
    pub name: String,
    /// Column count (1 for 1-D datasets)
    pub cols: usize,
    /// Flattened row-major values
    pub data: ArrayData,
}

impl GranuleDataset {
    /// A 1-D dataset.
    #[must_use]
    pub fn new(name: &str, data: ArrayData) -> Self {
        GranuleDataset { name: name.to_string(), cols: 1, data }
    }

    /// A 2-D dataset stored row-major with `cols` columns.
    #[must_use]
    pub fn with_cols(name: &str, data: ArrayData, cols: usize) -> Self {
        GranuleDataset { name: name.to_string(), cols, data }
    }
}

/// Directory-backed provider.
///
/// A granule is a directory holding one raw little-endian file per dataset
/// (dataset path + `.bin`) and a `manifest.tsv` of
/// `dataset<TAB>type<TAB>cols` rows. Resource URLs take the form
/// `file://<granule-dir>`; a bare path is accepted as well.
#[derive(Debug, Default)]
pub struct DirectorySource;

impl DirectorySource {
    /// Create a directory-backed provider.
    #[must_use]
    pub fn new() -> Self {
        DirectorySource
    }

    fn granule_dir(url: &str) -> &Path {
        Path::new(url.strip_prefix("file://").unwrap_or(url))
    }

    fn manifest_entry(dir: &Path, dataset: &str) -> Result<(String, usize)> {
        let manifest_path = dir.join(MANIFEST_NAME);
        let manifest = fs::read_to_string(&manifest_path)
            .map_err(|e| AtlexError::io(dataset, format!("{}: {e}", manifest_path.display())))?;
        for line in manifest.lines() {
            let mut parts = line.split('\t');
            if parts.next() == Some(normalize_dataset(dataset)) {
                let ty = parts
                    .next()
                    .ok_or_else(|| AtlexError::io(dataset, "manifest row missing type"))?;
                let cols = parts
                    .next()
                    .and_then(|c| c.parse::<usize>().ok())
                    .ok_or_else(|| AtlexError::io(dataset, "manifest row missing columns"))?;
                return Ok((ty.to_string(), cols));
            }
        }
        Err(AtlexError::io(dataset, format!("not listed in {}", manifest_path.display())))
    }

    fn data_path(dir: &Path, dataset: &str) -> PathBuf {
        let mut path = dir.to_path_buf();
        for part in normalize_dataset(dataset).split('/').filter(|p| !p.is_empty()) {
            path.push(part);
        }
        path.set_extension("bin");
        path
    }

    /// Write a granule directory from staged datasets, replacing the
    /// manifest. Intended for store construction and test fixtures.
    pub fn write_granule(dir: &Path, datasets: &[GranuleDataset]) -> Result<()> {
        let to_io = |name: &str, e: std::io::Error| AtlexError::io(name, e.to_string());
        fs::create_dir_all(dir).map_err(|e| to_io(MANIFEST_NAME, e))?;
        let mut manifest = String::new();
        for ds in datasets {
            let path = Self::data_path(dir, &ds.name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| to_io(&ds.name, e))?;
            }
            let mut bytes = Vec::with_capacity(ds.data.len() * ds.data.elem_size());
            match &ds.data {
                ArrayData::F64(v) => v.iter().for_each(|x| bytes.extend(x.to_le_bytes())),
                ArrayData::F32(v) => v.iter().for_each(|x| bytes.extend(x.to_le_bytes())),
                ArrayData::I32(v) => v.iter().for_each(|x| bytes.extend(x.to_le_bytes())),
                ArrayData::I8(v) => v.iter().for_each(|x| bytes.extend(x.to_le_bytes())),
                ArrayData::U16(v) => v.iter().for_each(|x| bytes.extend(x.to_le_bytes())),
            }
            fs::write(&path, bytes).map_err(|e| to_io(&ds.name, e))?;
            manifest.push_str(&format!(
                "{}\t{}\t{}\n",
                normalize_dataset(&ds.name),
                ds.data.type_name(),
                ds.cols
            ));
        }
        fs::write(dir.join(MANIFEST_NAME), manifest).map_err(|e| to_io(MANIFEST_NAME, e))
    }
}

impl H5Source for DirectorySource {
    fn read(
        &self,
        url: &str,
        dataset: &str,
        sel: Selection,
        ctx: &ReadContext,
    ) -> Result<ArrayData> {
        let dir = Self::granule_dir(url);
        let (ty, cols) = Self::manifest_entry(dir, dataset)?;
        let path = Self::data_path(dir, dataset);
        let bytes = fs::read(&path)
            .map_err(|e| AtlexError::io(dataset, format!("{}: {e}", path.display())))?;
        let data = match ty.as_str() {
            "f64" => ArrayData::F64(f64::decode_le(&bytes, dataset)?),
            "f32" => ArrayData::F32(f32::decode_le(&bytes, dataset)?),
            "i32" => ArrayData::I32(i32::decode_le(&bytes, dataset)?),
            "i8" => ArrayData::I8(i8::decode_le(&bytes, dataset)?),
            "u16" => ArrayData::U16(u16::decode_le(&bytes, dataset)?),
            other => {
                return Err(AtlexError::io(dataset, format!("unknown manifest type '{other}'")))
            }
        };
        let out = select_data(&data, cols, sel, dataset)?;
        ctx.record((out.len() * out.elem_size()) as u64);
        Ok(out)
    }
}
