//! Beam, track, and classification vocabulary for ATL03/ATL08 granules.
//!
//! An ICESat-2 granule carries three ground tracks, each made of a left and a
//! right beam. Datasets are stored per beam under group names like
//! `gt1l/heights/h_ph`; the types here compose those names and hold the
//! constants shared by the subsetter, walker, and parameter parsing.

use std::fmt;

/// Length of one along-track geolocation segment in metres.
pub const SEGMENT_LENGTH: f64 = 20.0;

/// Number of defined ATL08 photon classes.
pub const NUM_ATL08_CLASSES: usize = 5;

/// Number of downstream processing stages.
pub const NUM_STAGES: usize = 1;

/// Index of the least-squares-fit stage in the stage mask.
pub const STAGE_LSF: usize = 0;

/// One side of a beam pair. Every ground track has both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BeamSide {
    /// The weak/left beam of the pair
    Left,
    /// The strong/right beam of the pair
    Right,
}

impl BeamSide {
    /// Both sides, in record order (left first).
    pub const SIDES: [BeamSide; 2] = [BeamSide::Left, BeamSide::Right];

    /// Index of this side into per-pair arrays.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            BeamSide::Left => 0,
            BeamSide::Right => 1,
        }
    }

    /// Single-letter suffix used in dataset group names.
    #[must_use]
    pub fn suffix(self) -> char {
        match self {
            BeamSide::Left => 'l',
            BeamSide::Right => 'r',
        }
    }
}

/// One of the three ground-track beam pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Track {
    /// Ground track 1
    Gt1,
    /// Ground track 2
    Gt2,
    /// Ground track 3
    Gt3,
}

impl Track {
    /// All tracks, in granule order.
    pub const TRACKS: [Track; 3] = [Track::Gt1, Track::Gt2, Track::Gt3];

    /// The 1-based track number as recorded in extent records.
    #[must_use]
    pub fn number(self) -> u8 {
        match self {
            Track::Gt1 => 1,
            Track::Gt2 => 2,
            Track::Gt3 => 3,
        }
    }

    /// Parse a 1-based track number.
    #[must_use]
    pub fn from_number(n: u8) -> Option<Track> {
        match n {
            1 => Some(Track::Gt1),
            2 => Some(Track::Gt2),
            3 => Some(Track::Gt3),
            _ => None,
        }
    }

    /// Dataset group name for one side of this track, e.g. `gt2r`.
    #[must_use]
    pub fn group(self, side: BeamSide) -> String {
        format!("gt{}{}", self.number(), side.suffix())
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Which tracks a reader should process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSelection {
    /// Process all three tracks, one worker per track
    All,
    /// Process a single track on the calling thread
    One(Track),
}

impl TrackSelection {
    /// The tracks covered by this selection.
    #[must_use]
    pub fn tracks(self) -> Vec<Track> {
        match self {
            TrackSelection::All => Track::TRACKS.to_vec(),
            TrackSelection::One(t) => vec![t],
        }
    }

    /// Number of workers this selection spawns.
    #[must_use]
    pub fn worker_count(self) -> usize {
        match self {
            TrackSelection::All => Track::TRACKS.len(),
            TrackSelection::One(_) => 1,
        }
    }
}

/// Surface types indexing the signal-confidence columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SurfaceType {
    /// Land surface
    Land = 0,
    /// Open ocean
    Ocean = 1,
    /// Sea ice
    SeaIce = 2,
    /// Land ice (glaciers and ice sheets)
    LandIce = 3,
    /// Inland water
    InlandWater = 4,
}

impl SurfaceType {
    /// Number of surface-type columns in `signal_conf_ph`.
    pub const COUNT: usize = 5;

    /// Column index into the per-photon signal-confidence dataset.
    #[must_use]
    pub fn column(self) -> usize {
        self as usize
    }

    /// Parse a surface-type column index.
    #[must_use]
    pub fn from_index(index: u8) -> Option<SurfaceType> {
        match index {
            0 => Some(SurfaceType::Land),
            1 => Some(SurfaceType::Ocean),
            2 => Some(SurfaceType::SeaIce),
            3 => Some(SurfaceType::LandIce),
            4 => Some(SurfaceType::InlandWater),
            _ => None,
        }
    }
}

/// Per-photon signal-confidence levels.
pub mod signal_conf {
    /// Possible transmitter-echo-path photon
    pub const POSSIBLE_TEP: i8 = -2;
    /// Not considered for this surface type
    pub const NOT_CONSIDERED: i8 = -1;
    /// Background noise
    pub const BACKGROUND: i8 = 0;
    /// Within 10 m of the surface
    pub const WITHIN_10M: i8 = 1;
    /// Low-confidence surface photon
    pub const SURFACE_LOW: i8 = 2;
    /// Medium-confidence surface photon
    pub const SURFACE_MEDIUM: i8 = 3;
    /// High-confidence surface photon
    pub const SURFACE_HIGH: i8 = 4;

    /// Inclusive range of valid confidence levels.
    pub const RANGE: std::ops::RangeInclusive<i8> = POSSIBLE_TEP..=SURFACE_HIGH;
}

/// ATL08 photon classifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Atl08Class {
    /// Noise photon
    Noise = 0,
    /// Ground-return photon
    Ground = 1,
    /// Canopy photon
    Canopy = 2,
    /// Top-of-canopy photon
    TopOfCanopy = 3,
    /// Photon not classified by ATL08
    Unclassified = 4,
}

impl Atl08Class {
    /// Parse a classification index.
    #[must_use]
    pub fn from_index(index: u8) -> Option<Atl08Class> {
        match index {
            0 => Some(Atl08Class::Noise),
            1 => Some(Atl08Class::Ground),
            2 => Some(Atl08Class::Canopy),
            3 => Some(Atl08Class::TopOfCanopy),
            4 => Some(Atl08Class::Unclassified),
            _ => None,
        }
    }

    /// Parse a classification by its parameter-table name, e.g. `atl08_ground`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Atl08Class> {
        match name {
            "atl08_noise" => Some(Atl08Class::Noise),
            "atl08_ground" => Some(Atl08Class::Ground),
            "atl08_canopy" => Some(Atl08Class::Canopy),
            "atl08_top_of_canopy" => Some(Atl08Class::TopOfCanopy),
            "atl08_unclassified" => Some(Atl08Class::Unclassified),
            _ => None,
        }
    }
}

/// Spacecraft orientation, mapping beam pairs to spot numbers downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ScOrient {
    /// Flying backward
    Backward = 0,
    /// Flying forward
    Forward = 1,
    /// Yaw-flip transition
    Transition = 2,
}

impl ScOrient {
    /// Parse the `sc_orient` dataset value.
    #[must_use]
    pub fn from_index(index: u8) -> Option<ScOrient> {
        match index {
            0 => Some(ScOrient::Backward),
            1 => Some(ScOrient::Forward),
            2 => Some(ScOrient::Transition),
            _ => None,
        }
    }
}
