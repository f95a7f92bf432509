//! Outbound record layouts and the named schema registry.
//!
//! Records cross the outbound queue as packed host-endian byte frames.
//! Downstream consumers discover field layout by name: each record type is
//! registered once under its type name with a field table of
//! `(name, type, offset, count)`, so the packed encoders here and the
//! registry stay in lockstep (the tests assert that).
//!
//! Three record types exist: `atl03rec.photons` (one photon), `atl03rec`
//! (one extent: fixed header plus the left then right photon lists), and
//! `atl03rec.index` (one granule index row).

use std::collections::HashMap;
use std::sync::LazyLock;

use parking_lot::Mutex;

use crate::errors::{AtlexError, Result};

/// Record type name for photon records.
pub const PHOTON_REC_TYPE: &str = "atl03rec.photons";
/// Record type name for extent records.
pub const EXTENT_REC_TYPE: &str = "atl03rec";
/// Record type name for granule index records.
pub const INDEX_REC_TYPE: &str = "atl03rec.index";

/// Bytes reserved for the resource name in an index record.
pub const RESOURCE_NAME_LEN: usize = 64;

/// Scalar field types understood by record consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Unsigned 8-bit
    U8,
    /// Unsigned 16-bit
    U16,
    /// Unsigned 32-bit
    U32,
    /// Signed 8-bit
    I8,
    /// Signed 32-bit
    I32,
    /// 32-bit float
    F32,
    /// 64-bit float
    F64,
    /// Fixed-length NUL-padded string
    Str,
}

/// One field of a packed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name as published to consumers
    pub name: &'static str,
    /// Scalar type
    pub ty: FieldType,
    /// Byte offset from the start of the record
    pub offset: usize,
    /// Element count (1 for scalars, 2 for per-beam pairs, string length for `Str`)
    pub count: usize,
}

/// A named record layout.
#[derive(Debug, PartialEq, Eq)]
pub struct RecordSchema {
    /// Registered type name
    pub rec_type: &'static str,
    /// Fixed (header) size in bytes
    pub size: usize,
    /// Field table
    pub fields: &'static [FieldDef],
}

/// Packed size of one photon record.
pub const PHOTON_SIZE: usize = 40;

/// Field table for `atl03rec.photons`.
pub static PHOTON_SCHEMA: RecordSchema = RecordSchema {
    rec_type: PHOTON_REC_TYPE,
    size: PHOTON_SIZE,
    fields: &[
        FieldDef { name: "delta_time", ty: FieldType::F64, offset: 0, count: 1 },
        FieldDef { name: "latitude", ty: FieldType::F64, offset: 8, count: 1 },
        FieldDef { name: "longitude", ty: FieldType::F64, offset: 16, count: 1 },
        FieldDef { name: "distance", ty: FieldType::F64, offset: 24, count: 1 },
        FieldDef { name: "height", ty: FieldType::F32, offset: 32, count: 1 },
        FieldDef { name: "info", ty: FieldType::U32, offset: 36, count: 1 },
    ],
};

/// Packed size of the fixed extent header preceding the photon lists.
pub const EXTENT_HEADER_SIZE: usize = 80;

/// Field table for `atl03rec`. The `photons` field carries record-relative
/// byte offsets to each beam's photon list.
pub static EXTENT_SCHEMA: RecordSchema = RecordSchema {
    rec_type: EXTENT_REC_TYPE,
    size: EXTENT_HEADER_SIZE,
    fields: &[
        FieldDef { name: "valid", ty: FieldType::U8, offset: 0, count: 2 },
        FieldDef { name: "track", ty: FieldType::U8, offset: 2, count: 1 },
        FieldDef { name: "sc_orient", ty: FieldType::U8, offset: 3, count: 1 },
        FieldDef { name: "rgt", ty: FieldType::U16, offset: 4, count: 1 },
        FieldDef { name: "cycle", ty: FieldType::U16, offset: 6, count: 1 },
        FieldDef { name: "segment_id", ty: FieldType::U32, offset: 8, count: 2 },
        FieldDef { name: "extent_len", ty: FieldType::F64, offset: 16, count: 2 },
        FieldDef { name: "velocity", ty: FieldType::F64, offset: 32, count: 2 },
        FieldDef { name: "bckgrd", ty: FieldType::F64, offset: 48, count: 2 },
        FieldDef { name: "count", ty: FieldType::U32, offset: 64, count: 2 },
        FieldDef { name: "photons", ty: FieldType::U32, offset: 72, count: 2 },
    ],
};

/// Packed size of one index record.
pub const INDEX_SIZE: usize = 120;

/// Field table for `atl03rec.index`.
pub static INDEX_SCHEMA: RecordSchema = RecordSchema {
    rec_type: INDEX_REC_TYPE,
    size: INDEX_SIZE,
    fields: &[
        FieldDef { name: "name", ty: FieldType::Str, offset: 0, count: RESOURCE_NAME_LEN },
        FieldDef { name: "t0", ty: FieldType::F64, offset: 64, count: 1 },
        FieldDef { name: "t1", ty: FieldType::F64, offset: 72, count: 1 },
        FieldDef { name: "lat0", ty: FieldType::F64, offset: 80, count: 1 },
        FieldDef { name: "lon0", ty: FieldType::F64, offset: 88, count: 1 },
        FieldDef { name: "lat1", ty: FieldType::F64, offset: 96, count: 1 },
        FieldDef { name: "lon1", ty: FieldType::F64, offset: 104, count: 1 },
        FieldDef { name: "cycle", ty: FieldType::U32, offset: 112, count: 1 },
        FieldDef { name: "rgt", ty: FieldType::U32, offset: 116, count: 1 },
    ],
};

static REGISTRY: LazyLock<Mutex<HashMap<&'static str, &'static RecordSchema>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Register a record schema under its type name.
///
/// Re-registering an identical schema is a no-op; registering a different
/// schema under an existing name fails.
pub fn register(schema: &'static RecordSchema) -> Result<()> {
    let mut registry = REGISTRY.lock();
    match registry.get(schema.rec_type) {
        Some(existing) if *existing == schema => Ok(()),
        Some(_) => Err(AtlexError::InvalidParameter {
            parameter: schema.rec_type.to_string(),
            reason: "conflicting record definition already registered".to_string(),
        }),
        None => {
            registry.insert(schema.rec_type, schema);
            Ok(())
        }
    }
}

/// Look up a registered schema by type name.
#[must_use]
pub fn lookup(rec_type: &str) -> Option<&'static RecordSchema> {
    REGISTRY.lock().get(rec_type).copied()
}

/// Register the built-in record types, logging any definition conflict.
pub fn register_builtin() {
    for schema in [&PHOTON_SCHEMA, &EXTENT_SCHEMA, &INDEX_SCHEMA] {
        if let Err(e) = register(schema) {
            log::error!("Failed to define {}: {e}", schema.rec_type);
        }
    }
}

fn take<const N: usize>(buf: &[u8], offset: usize, rec_type: &str) -> Result<[u8; N]> {
    buf.get(offset..offset + N).and_then(|s| s.try_into().ok()).ok_or_else(|| {
        AtlexError::Malformed {
            rec_type: rec_type.to_string(),
            reason: format!("buffer too short at offset {offset}"),
        }
    })
}

/// One photon of an extent record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Photon {
    /// Seconds since the mission SDP epoch
    pub delta_time: f64,
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Along-track distance recentered so 0 is the extent midpoint, metres
    pub distance: f64,
    /// Height above the ellipsoid, metres
    pub height: f32,
    /// ATL08 classification, masked to 3 bits
    pub info: u32,
}

impl Photon {
    fn write_to(&self, buf: &mut Vec<u8>) {
        buf.extend(self.delta_time.to_ne_bytes());
        buf.extend(self.latitude.to_ne_bytes());
        buf.extend(self.longitude.to_ne_bytes());
        buf.extend(self.distance.to_ne_bytes());
        buf.extend(self.height.to_ne_bytes());
        buf.extend(self.info.to_ne_bytes());
    }

    /// Decode one photon from `buf[offset..]`.
    pub fn from_bytes(buf: &[u8], offset: usize) -> Result<Photon> {
        Ok(Photon {
            delta_time: f64::from_ne_bytes(take(buf, offset, PHOTON_REC_TYPE)?),
            latitude: f64::from_ne_bytes(take(buf, offset + 8, PHOTON_REC_TYPE)?),
            longitude: f64::from_ne_bytes(take(buf, offset + 16, PHOTON_REC_TYPE)?),
            distance: f64::from_ne_bytes(take(buf, offset + 24, PHOTON_REC_TYPE)?),
            height: f32::from_ne_bytes(take(buf, offset + 32, PHOTON_REC_TYPE)?),
            info: u32::from_ne_bytes(take(buf, offset + 36, PHOTON_REC_TYPE)?),
        })
    }
}

/// One extent: the primary output unit of the reader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtentRecord {
    /// Whether each beam passed the extent filters
    pub valid: [bool; 2],
    /// 1-based ground-track number
    pub track: u8,
    /// Spacecraft orientation at granule start
    pub sc_orient: u8,
    /// Reference ground track at granule start
    pub rgt: u16,
    /// Orbit cycle at granule start
    pub cycle: u16,
    /// Closest-segment estimate per beam
    pub segment_id: [u32; 2],
    /// Extent length per beam, metres
    pub extent_length: [f64; 2],
    /// Spacecraft velocity magnitude per beam, m/s
    pub spacecraft_velocity: [f64; 2],
    /// Interpolated background rate per beam, PE/s
    pub background_rate: [f64; 2],
    /// Photons per beam, left then right
    pub photons: [Vec<Photon>; 2],
}

impl ExtentRecord {
    /// Total packed size of this record.
    #[must_use]
    pub fn packed_size(&self) -> usize {
        EXTENT_HEADER_SIZE + (self.photons[0].len() + self.photons[1].len()) * PHOTON_SIZE
    }

    /// Pack the record: header with counts and record-relative photon
    /// offsets, then the left photon list, then the right.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let left_count = self.photons[0].len() as u32;
        let right_count = self.photons[1].len() as u32;
        let left_offset = EXTENT_HEADER_SIZE as u32;
        let right_offset = left_offset + left_count * PHOTON_SIZE as u32;

        let mut buf = Vec::with_capacity(self.packed_size());
        buf.push(u8::from(self.valid[0]));
        buf.push(u8::from(self.valid[1]));
        buf.push(self.track);
        buf.push(self.sc_orient);
        buf.extend(self.rgt.to_ne_bytes());
        buf.extend(self.cycle.to_ne_bytes());
        buf.extend(self.segment_id[0].to_ne_bytes());
        buf.extend(self.segment_id[1].to_ne_bytes());
        buf.extend(self.extent_length[0].to_ne_bytes());
        buf.extend(self.extent_length[1].to_ne_bytes());
        buf.extend(self.spacecraft_velocity[0].to_ne_bytes());
        buf.extend(self.spacecraft_velocity[1].to_ne_bytes());
        buf.extend(self.background_rate[0].to_ne_bytes());
        buf.extend(self.background_rate[1].to_ne_bytes());
        buf.extend(left_count.to_ne_bytes());
        buf.extend(right_count.to_ne_bytes());
        buf.extend(left_offset.to_ne_bytes());
        buf.extend(right_offset.to_ne_bytes());
        for photon in self.photons.iter().flatten() {
            photon.write_to(&mut buf);
        }
        buf
    }

    /// Decode a packed extent record, validating counts and offsets.
    pub fn from_bytes(buf: &[u8]) -> Result<ExtentRecord> {
        let malformed = |reason: &str| AtlexError::Malformed {
            rec_type: EXTENT_REC_TYPE.to_string(),
            reason: reason.to_string(),
        };
        let counts = [
            u32::from_ne_bytes(take(buf, 64, EXTENT_REC_TYPE)?) as usize,
            u32::from_ne_bytes(take(buf, 68, EXTENT_REC_TYPE)?) as usize,
        ];
        let offsets = [
            u32::from_ne_bytes(take(buf, 72, EXTENT_REC_TYPE)?) as usize,
            u32::from_ne_bytes(take(buf, 76, EXTENT_REC_TYPE)?) as usize,
        ];
        if offsets[0] != EXTENT_HEADER_SIZE
            || offsets[1] != EXTENT_HEADER_SIZE + counts[0] * PHOTON_SIZE
        {
            return Err(malformed("photon offsets disagree with counts"));
        }
        if buf.len() != EXTENT_HEADER_SIZE + (counts[0] + counts[1]) * PHOTON_SIZE {
            return Err(malformed("record length disagrees with photon counts"));
        }

        let mut photons: [Vec<Photon>; 2] = [Vec::new(), Vec::new()];
        for (i, count) in counts.iter().enumerate() {
            photons[i] = (0..*count)
                .map(|p| Photon::from_bytes(buf, offsets[i] + p * PHOTON_SIZE))
                .collect::<Result<_>>()?;
        }

        Ok(ExtentRecord {
            valid: [buf[0] != 0, buf[1] != 0],
            track: buf[2],
            sc_orient: buf[3],
            rgt: u16::from_ne_bytes(take(buf, 4, EXTENT_REC_TYPE)?),
            cycle: u16::from_ne_bytes(take(buf, 6, EXTENT_REC_TYPE)?),
            segment_id: [
                u32::from_ne_bytes(take(buf, 8, EXTENT_REC_TYPE)?),
                u32::from_ne_bytes(take(buf, 12, EXTENT_REC_TYPE)?),
            ],
            extent_length: [
                f64::from_ne_bytes(take(buf, 16, EXTENT_REC_TYPE)?),
                f64::from_ne_bytes(take(buf, 24, EXTENT_REC_TYPE)?),
            ],
            spacecraft_velocity: [
                f64::from_ne_bytes(take(buf, 32, EXTENT_REC_TYPE)?),
                f64::from_ne_bytes(take(buf, 40, EXTENT_REC_TYPE)?),
            ],
            background_rate: [
                f64::from_ne_bytes(take(buf, 48, EXTENT_REC_TYPE)?),
                f64::from_ne_bytes(take(buf, 56, EXTENT_REC_TYPE)?),
            ],
            photons,
        })
    }
}

/// Temporal and geospatial bounding box of one granule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexRecord {
    /// Resource name, truncated to [`RESOURCE_NAME_LEN`] bytes when packed
    pub name: String,
    /// Start time, seconds since the GPS epoch
    pub t0: f64,
    /// End time, seconds since the GPS epoch
    pub t1: f64,
    /// Latitude of the first bounding endpoint
    pub lat0: f64,
    /// Longitude of the first bounding endpoint
    pub lon0: f64,
    /// Latitude of the second bounding endpoint
    pub lat1: f64,
    /// Longitude of the second bounding endpoint
    pub lon1: f64,
    /// Orbit cycle
    pub cycle: u32,
    /// Reference ground track
    pub rgt: u32,
}

impl IndexRecord {
    /// Pack the record with a NUL-padded name field.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(INDEX_SIZE);
        let name = self.name.as_bytes();
        let copied = name.len().min(RESOURCE_NAME_LEN);
        buf.extend(&name[..copied]);
        buf.resize(RESOURCE_NAME_LEN, 0);
        buf.extend(self.t0.to_ne_bytes());
        buf.extend(self.t1.to_ne_bytes());
        buf.extend(self.lat0.to_ne_bytes());
        buf.extend(self.lon0.to_ne_bytes());
        buf.extend(self.lat1.to_ne_bytes());
        buf.extend(self.lon1.to_ne_bytes());
        buf.extend(self.cycle.to_ne_bytes());
        buf.extend(self.rgt.to_ne_bytes());
        buf
    }

    /// Decode a packed index record.
    pub fn from_bytes(buf: &[u8]) -> Result<IndexRecord> {
        if buf.len() != INDEX_SIZE {
            return Err(AtlexError::Malformed {
                rec_type: INDEX_REC_TYPE.to_string(),
                reason: format!("expected {INDEX_SIZE} bytes, got {}", buf.len()),
            });
        }
        let name_field = &buf[..RESOURCE_NAME_LEN];
        let name_len = name_field.iter().position(|&b| b == 0).unwrap_or(RESOURCE_NAME_LEN);
        let name = String::from_utf8_lossy(&name_field[..name_len]).into_owned();
        Ok(IndexRecord {
            name,
            t0: f64::from_ne_bytes(take(buf, 64, INDEX_REC_TYPE)?),
            t1: f64::from_ne_bytes(take(buf, 72, INDEX_REC_TYPE)?),
            lat0: f64::from_ne_bytes(take(buf, 80, INDEX_REC_TYPE)?),
            lon0: f64::from_ne_bytes(take(buf, 88, INDEX_REC_TYPE)?),
            lat1: f64::from_ne_bytes(take(buf, 96, INDEX_REC_TYPE)?),
            lon1: f64::from_ne_bytes(take(buf, 104, INDEX_REC_TYPE)?),
            cycle: u32::from_ne_bytes(take(buf, 112, INDEX_REC_TYPE)?),
            rgt: u32::from_ne_bytes(take(buf, 116, INDEX_REC_TYPE)?),
        })
    }
}
