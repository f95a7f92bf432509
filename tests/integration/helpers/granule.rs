//! Synthetic granule builders.
//!
//! Tests assemble granules as lists of [`GranuleDataset`], which feed both
//! the in-memory provider (via [`mem_insert`]) and directory stores on disk
//! (via `DirectorySource::write_granule`).

use atlex_lib::beam::{BeamSide, Track};
use atlex_lib::h5::{ArrayData, GranuleDataset, MemSource};

/// Base URL used by in-memory granules.
pub const STORE_URL: &str = "/store";

/// Resource URL as composed by an `Asset::new("store", "file", STORE_URL)`.
pub fn resource_url(resource: &str) -> String {
    format!("file://{STORE_URL}/{resource}")
}

/// One beam's worth of datasets, with derived fields filled in.
#[derive(Debug, Clone)]
pub struct BeamSpec {
    /// Per-photon distance within its segment
    pub dist_ph: Vec<f32>,
    /// Photons per segment
    pub ph_cnt: Vec<i32>,
    /// Segment start distances
    pub dist_x: Vec<f64>,
    /// Per-segment reference latitude
    pub ref_lat: Vec<f64>,
    /// Per-segment reference longitude
    pub ref_lon: Vec<f64>,
    /// Per-photon signal confidence (applied to all surface types)
    pub conf: Vec<i8>,
    /// First segment id
    pub seg_id_base: i32,
}

impl BeamSpec {
    /// A beam with the given photon layout, high confidence everywhere,
    /// reference points at (-70, 45), and segment ids from 100.
    pub fn new(dist_ph: &[f32], ph_cnt: &[i32], dist_x: &[f64]) -> Self {
        assert_eq!(ph_cnt.len(), dist_x.len());
        assert_eq!(ph_cnt.iter().sum::<i32>() as usize, dist_ph.len());
        BeamSpec {
            dist_ph: dist_ph.to_vec(),
            ph_cnt: ph_cnt.to_vec(),
            dist_x: dist_x.to_vec(),
            ref_lat: vec![-70.0; dist_x.len()],
            ref_lon: vec![45.0; dist_x.len()],
            conf: vec![4; dist_ph.len()],
            seg_id_base: 100,
        }
    }

    /// Replace the per-segment reference coordinates.
    pub fn with_refs(mut self, ref_lat: Vec<f64>, ref_lon: Vec<f64>) -> Self {
        assert_eq!(ref_lat.len(), self.dist_x.len());
        assert_eq!(ref_lon.len(), self.dist_x.len());
        self.ref_lat = ref_lat;
        self.ref_lon = ref_lon;
        self
    }

    /// All datasets of this beam under `group` (e.g. `gt1l`).
    pub fn datasets(&self, group: &str) -> Vec<GranuleDataset> {
        let n_seg = self.dist_x.len();
        let n_ph = self.dist_ph.len();
        let seg_times: Vec<f64> = (0..n_seg).map(|i| i as f64 * 10.0).collect();
        let seg_ids: Vec<i32> = (0..n_seg).map(|i| self.seg_id_base + i as i32).collect();
        let velocity: Vec<f32> = (0..n_seg).flat_map(|_| [3.0, 4.0, 0.0]).collect();
        let heights: Vec<f32> = (0..n_ph).map(|i| 100.0 + i as f32).collect();
        let ph_times: Vec<f64> = (0..n_ph).map(|i| i as f64 * 0.01).collect();
        let lat_ph: Vec<f64> = (0..n_ph).map(|i| -70.0 - i as f64 * 1e-4).collect();
        let lon_ph: Vec<f64> = (0..n_ph).map(|i| 45.0 + i as f64 * 1e-4).collect();
        let conf_rows: Vec<i8> = self.conf.iter().flat_map(|&c| [c; 5]).collect();

        vec![
            GranuleDataset::new(
                &format!("{group}/geolocation/reference_photon_lat"),
                ArrayData::F64(self.ref_lat.clone()),
            ),
            GranuleDataset::new(
                &format!("{group}/geolocation/reference_photon_lon"),
                ArrayData::F64(self.ref_lon.clone()),
            ),
            GranuleDataset::new(
                &format!("{group}/geolocation/segment_ph_cnt"),
                ArrayData::I32(self.ph_cnt.clone()),
            ),
            GranuleDataset::with_cols(
                &format!("{group}/geolocation/velocity_sc"),
                ArrayData::F32(velocity),
                3,
            ),
            GranuleDataset::new(
                &format!("{group}/geolocation/delta_time"),
                ArrayData::F64(seg_times),
            ),
            GranuleDataset::new(
                &format!("{group}/geolocation/segment_id"),
                ArrayData::I32(seg_ids),
            ),
            GranuleDataset::new(
                &format!("{group}/geolocation/segment_dist_x"),
                ArrayData::F64(self.dist_x.clone()),
            ),
            GranuleDataset::new(
                &format!("{group}/heights/dist_ph_along"),
                ArrayData::F32(self.dist_ph.clone()),
            ),
            GranuleDataset::new(&format!("{group}/heights/h_ph"), ArrayData::F32(heights)),
            GranuleDataset::with_cols(
                &format!("{group}/heights/signal_conf_ph"),
                ArrayData::I8(conf_rows),
                5,
            ),
            GranuleDataset::new(&format!("{group}/heights/lat_ph"), ArrayData::F64(lat_ph)),
            GranuleDataset::new(&format!("{group}/heights/lon_ph"), ArrayData::F64(lon_ph)),
            GranuleDataset::new(&format!("{group}/heights/delta_time"), ArrayData::F64(ph_times)),
            GranuleDataset::new(
                &format!("{group}/bckgrd_atlas/delta_time"),
                ArrayData::F64(vec![0.0, 1.0e6]),
            ),
            GranuleDataset::new(
                &format!("{group}/bckgrd_atlas/bckgrd_rate"),
                ArrayData::F32(vec![50.0, 50.0]),
            ),
        ]
    }
}

/// The granule-level arrays the extent reader needs.
pub fn reader_globals(sc_orient: i8, rgt: i32, cycle: i32) -> Vec<GranuleDataset> {
    vec![
        GranuleDataset::new("orbit_info/sc_orient", ArrayData::I8(vec![sc_orient])),
        GranuleDataset::new("ancillary_data/start_rgt", ArrayData::I32(vec![rgt])),
        GranuleDataset::new("ancillary_data/start_cycle", ArrayData::I32(vec![cycle])),
    ]
}

/// The nine datasets the indexer reads, with simple derived endpoints.
pub fn index_datasets(
    epoch: f64,
    start: f64,
    end: f64,
    cycle: i8,
    rgt: u16,
) -> Vec<GranuleDataset> {
    vec![
        GranuleDataset::new("ancillary_data/atlas_sdp_gps_epoch", ArrayData::F64(vec![epoch])),
        GranuleDataset::new("ancillary_data/start_delta_time", ArrayData::F64(vec![start])),
        GranuleDataset::new("ancillary_data/end_delta_time", ArrayData::F64(vec![end])),
        GranuleDataset::new("orbit_info/cycle_number", ArrayData::I8(vec![cycle])),
        GranuleDataset::new("orbit_info/rgt", ArrayData::U16(vec![rgt])),
        GranuleDataset::new(
            "gt3r/geolocation/reference_photon_lat",
            ArrayData::F64(vec![-70.0, -70.5, -71.0]),
        ),
        GranuleDataset::new(
            "gt3r/geolocation/reference_photon_lon",
            ArrayData::F64(vec![44.0, 44.5, 45.0]),
        ),
        GranuleDataset::new(
            "gt1l/geolocation/reference_photon_lat",
            ArrayData::F64(vec![-70.1, -70.6, -71.1]),
        ),
        GranuleDataset::new(
            "gt1l/geolocation/reference_photon_lon",
            ArrayData::F64(vec![44.1, 44.6, 45.1]),
        ),
    ]
}

/// ATL08 classification datasets for one beam group.
pub fn atl08_datasets(
    group: &str,
    seg_ids: &[i32],
    indices: &[i32],
    flags: &[i8],
) -> Vec<GranuleDataset> {
    vec![
        GranuleDataset::new(
            &format!("{group}/signal_photons/ph_segment_id"),
            ArrayData::I32(seg_ids.to_vec()),
        ),
        GranuleDataset::new(
            &format!("{group}/signal_photons/classed_pc_indx"),
            ArrayData::I32(indices.to_vec()),
        ),
        GranuleDataset::new(
            &format!("{group}/signal_photons/classed_pc_flag"),
            ArrayData::I8(flags.to_vec()),
        ),
    ]
}

/// The same beam layout on every side of the given tracks, plus reader
/// globals.
pub fn uniform_granule(spec: &BeamSpec, tracks: &[Track]) -> Vec<GranuleDataset> {
    let mut datasets = reader_globals(1, 737, 6);
    for &track in tracks {
        for side in BeamSide::SIDES {
            datasets.extend(spec.datasets(&track.group(side)));
        }
    }
    datasets
}

/// Insert staged datasets into an in-memory source under `url`.
pub fn mem_insert(src: &mut MemSource, url: &str, datasets: &[GranuleDataset]) {
    for ds in datasets {
        src.insert_2d(url, &ds.name, ds.data.clone(), ds.cols);
    }
}

/// Parse a length-prefixed frame file written by the CLI commands,
/// returning the record frames without the end-of-stream sentinel.
pub fn parse_frame_file(path: &std::path::Path) -> Vec<Vec<u8>> {
    let bytes = std::fs::read(path).expect("frame file readable");
    let mut frames = Vec::new();
    let mut offset = 0usize;
    loop {
        let len_bytes: [u8; 4] =
            bytes[offset..offset + 4].try_into().expect("length prefix present");
        let len = u32::from_ne_bytes(len_bytes) as usize;
        offset += 4;
        if len == 0 {
            assert_eq!(offset, bytes.len(), "data after end-of-stream frame");
            return frames;
        }
        frames.push(bytes[offset..offset + len].to_vec());
        offset += len;
    }
}
