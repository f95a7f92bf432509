//! Extraction parameters: defaults, parsing, and validation.
//!
//! Parameters arrive as a keyed JSON table using the short upstream key names
//! (`srt`, `cnf`, `poly`, ...). Every key is optional; omitted keys fall back
//! to the defaults below. Provided keys are logged as they are applied, and
//! invalid values fail parsing before any worker is started.

use log::{info, warn};
use serde::Deserialize;

use crate::beam::{signal_conf, Atl08Class, SurfaceType, NUM_ATL08_CLASSES, NUM_STAGES, STAGE_LSF};
use crate::errors::{AtlexError, Result};
use crate::geo::{Coord, MAX_COORDS};

/// Default surface type for confidence selection.
pub const DEFAULT_SURFACE_TYPE: SurfaceType = SurfaceType::LandIce;
/// Default minimum signal confidence.
pub const DEFAULT_SIGNAL_CONFIDENCE: i8 = signal_conf::SURFACE_HIGH;
/// Default minimum along-track spread in metres.
pub const DEFAULT_ALONG_TRACK_SPREAD: f64 = 20.0;
/// Default minimum photons per extent.
pub const DEFAULT_MIN_PHOTON_COUNT: usize = 10;
/// Default extent length in metres.
pub const DEFAULT_EXTENT_LENGTH: f64 = 40.0;
/// Default extent step in metres.
pub const DEFAULT_EXTENT_STEP: f64 = 20.0;
/// Default surface-fit iteration cap.
pub const DEFAULT_MAX_ITERATIONS: u32 = 20;
/// Default minimum fit window in metres.
pub const DEFAULT_MIN_WINDOW: f64 = 3.0;
/// Default maximum robust dispersion in metres.
pub const DEFAULT_MAX_ROBUST_DISPERSION: f64 = 5.0;

/// Validated extraction parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractParms {
    /// Surface type selecting the signal-confidence column
    pub surface_type: SurfaceType,
    /// Minimum signal confidence for a photon to be kept
    pub signal_confidence: i8,
    /// Bounding region; empty means no spatial subsetting
    pub polygon: Vec<Coord>,
    /// Enabled downstream stages
    pub stages: [bool; NUM_STAGES],
    /// Emit compact (lat, lon, height, time) elevations downstream
    pub compact: bool,
    /// Post the extent even when neither beam is valid
    pub pass_invalid: bool,
    /// Filter photons through the ATL08 classification mask
    pub use_atl08_classification: bool,
    /// ATL08 classes accepted when classification is enabled
    pub atl08_class: [bool; NUM_ATL08_CLASSES],
    /// Minimum along-track spread of an extent's photons in metres
    pub along_track_spread: f64,
    /// Minimum photons per extent
    pub minimum_photon_count: usize,
    /// Minimum fit window in metres (passed through to the surface fitter)
    pub minimum_window: f64,
    /// Maximum robust dispersion in metres (passed through)
    pub maximum_robust_dispersion: f64,
    /// Along-track length of one extent in metres
    pub extent_length: f64,
    /// Along-track distance between extent starts in metres
    pub extent_step: f64,
    /// Surface-fit iteration cap (passed through)
    pub max_iterations: u32,
}

impl Default for ExtractParms {
    fn default() -> Self {
        ExtractParms {
            surface_type: DEFAULT_SURFACE_TYPE,
            signal_confidence: DEFAULT_SIGNAL_CONFIDENCE,
            polygon: Vec::new(),
            stages: {
                let mut stages = [false; NUM_STAGES];
                stages[STAGE_LSF] = true;
                stages
            },
            compact: false,
            pass_invalid: false,
            use_atl08_classification: false,
            atl08_class: [false; NUM_ATL08_CLASSES],
            along_track_spread: DEFAULT_ALONG_TRACK_SPREAD,
            minimum_photon_count: DEFAULT_MIN_PHOTON_COUNT,
            minimum_window: DEFAULT_MIN_WINDOW,
            maximum_robust_dispersion: DEFAULT_MAX_ROBUST_DISPERSION,
            extent_length: DEFAULT_EXTENT_LENGTH,
            extent_step: DEFAULT_EXTENT_STEP,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// A stage or classification given either by index or by name.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NameOrIndex {
    Index(u64),
    Name(String),
}

/// Raw parameter table as deserialized; all keys optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawParms {
    srt: Option<u8>,
    cnf: Option<i8>,
    poly: Option<Vec<Coord>>,
    stages: Option<Vec<NameOrIndex>>,
    compact: Option<bool>,
    pass_invalid: Option<bool>,
    ats: Option<f64>,
    cnt: Option<usize>,
    len: Option<f64>,
    res: Option<f64>,
    maxi: Option<u32>,
    #[serde(rename = "H_min_win")]
    h_min_win: Option<f64>,
    sigma_r_max: Option<f64>,
    atl08_class: Option<Vec<NameOrIndex>>,
}

fn invalid(parameter: &str, reason: impl Into<String>) -> AtlexError {
    AtlexError::InvalidParameter { parameter: parameter.to_string(), reason: reason.into() }
}

fn require_positive(parameter: &str, value: f64) -> Result<f64> {
    if value > 0.0 {
        Ok(value)
    } else {
        Err(invalid(parameter, format!("must be positive, got {value}")))
    }
}

impl ExtractParms {
    /// Parse a JSON parameter table, applying defaults for omitted keys.
    ///
    /// # Errors
    ///
    /// Fails on malformed JSON, unknown keys, or out-of-range values.
    pub fn from_json(text: &str) -> Result<Self> {
        let raw: RawParms =
            serde_json::from_str(text).map_err(|e| invalid("parms", e.to_string()))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawParms) -> Result<Self> {
        let mut parms = ExtractParms::default();

        if let Some(srt) = raw.srt {
            parms.surface_type = SurfaceType::from_index(srt)
                .ok_or_else(|| invalid("srt", format!("must be 0..4, got {srt}")))?;
            info!("Setting srt to {srt}");
        }

        if let Some(cnf) = raw.cnf {
            if !signal_conf::RANGE.contains(&cnf) {
                return Err(invalid("cnf", format!("must be between -2 and 4, got {cnf}")));
            }
            parms.signal_confidence = cnf;
            info!("Setting cnf to {cnf}");
        }

        if let Some(mut poly) = raw.poly {
            if poly.len() > MAX_COORDS {
                warn!("Points in polygon [{}] exceed maximum: {MAX_COORDS}", poly.len());
                poly.truncate(MAX_COORDS);
            }
            info!("Setting poly to {} points", poly.len());
            parms.polygon = poly;
        }

        if let Some(stages) = raw.stages {
            parms.stages = [false; NUM_STAGES];
            for stage in stages {
                match stage {
                    NameOrIndex::Index(i) if (i as usize) < NUM_STAGES => {
                        parms.stages[i as usize] = true;
                    }
                    NameOrIndex::Index(i) => {
                        return Err(invalid("stages", format!("unknown stage index {i}")));
                    }
                    NameOrIndex::Name(name) if name == "LSF" => {
                        parms.stages[STAGE_LSF] = true;
                        info!("Enabling LSF stage");
                    }
                    NameOrIndex::Name(name) => {
                        return Err(invalid("stages", format!("unknown stage '{name}'")));
                    }
                }
            }
        }

        if let Some(compact) = raw.compact {
            parms.compact = compact;
            info!("Setting compact to {compact}");
        }

        if let Some(pass_invalid) = raw.pass_invalid {
            parms.pass_invalid = pass_invalid;
            info!("Setting pass_invalid to {pass_invalid}");
        }

        if let Some(ats) = raw.ats {
            if ats < 0.0 {
                return Err(invalid("ats", format!("must be non-negative, got {ats}")));
            }
            parms.along_track_spread = ats;
            info!("Setting ats to {ats}");
        }

        if let Some(cnt) = raw.cnt {
            parms.minimum_photon_count = cnt;
            info!("Setting cnt to {cnt}");
        }

        if let Some(len) = raw.len {
            parms.extent_length = require_positive("len", len)?;
            info!("Setting len to {len}");
        }

        if let Some(res) = raw.res {
            parms.extent_step = require_positive("res", res)?;
            info!("Setting res to {res}");
        }

        if let Some(maxi) = raw.maxi {
            parms.max_iterations = maxi;
            info!("Setting maxi to {maxi}");
        }

        if let Some(h_min_win) = raw.h_min_win {
            parms.minimum_window = require_positive("H_min_win", h_min_win)?;
            info!("Setting H_min_win to {h_min_win}");
        }

        if let Some(sigma_r_max) = raw.sigma_r_max {
            parms.maximum_robust_dispersion = require_positive("sigma_r_max", sigma_r_max)?;
            info!("Setting sigma_r_max to {sigma_r_max}");
        }

        if let Some(classes) = raw.atl08_class {
            parms.use_atl08_classification = true;
            for class in classes {
                let parsed = match class {
                    NameOrIndex::Index(i) => u8::try_from(i).ok().and_then(Atl08Class::from_index),
                    NameOrIndex::Name(ref name) => Atl08Class::from_name(name),
                };
                let parsed = parsed.ok_or_else(|| {
                    invalid("atl08_class", format!("unrecognized classification {class:?}"))
                })?;
                parms.atl08_class[parsed as usize] = true;
            }
            info!("Enabling ATL08 classification filter");
        }

        Ok(parms)
    }
}
