//! Spatial subsetting of a track against the configured polygon.
//!
//! Photon datasets can run past 10^8 elements per beam while segment
//! datasets stay near 10^6, so the subsetter works at segment granularity:
//! it projects the polygon once, scans each beam's per-segment reference
//! coordinates in index order, and derives the `[first_segment,
//! first_segment + num_segments)` window plus the matching photon window
//! from the per-segment photon counts. Downstream reads are then
//! range-limited to those windows. No per-photon filtering happens here.

use log::debug;

use crate::beam::{BeamSide, Track};
use crate::errors::{AtlexError, Result};
use crate::geo::{point_in_polygon, project_polygon, Coord, Projection};
use crate::h5::{H5Source, ReadContext, Selection};
use crate::paired::PairArray;
use crate::parms::ExtractParms;

/// Per-beam dataset windows for one track, with the segment-level arrays
/// the walker needs (trimmed to the windows).
#[derive(Debug)]
pub struct Region {
    /// Per-segment reference latitude, trimmed
    pub segment_lat: PairArray<f64>,
    /// Per-segment reference longitude, trimmed
    pub segment_lon: PairArray<f64>,
    /// Per-segment photon counts, trimmed
    pub segment_ph_cnt: PairArray<i32>,
    /// First segment of the window per beam
    pub first_segment: [usize; 2],
    /// Segment count of the window per beam; `None` = remainder of axis
    pub num_segments: [Option<usize>; 2],
    /// First photon of the window per beam
    pub first_photon: [usize; 2],
    /// Photon count of the window per beam; `None` = remainder of axis
    pub num_photons: [Option<usize>; 2],
}

impl Region {
    /// Read the reference coordinates for `track` and subset them against
    /// the parameter polygon.
    ///
    /// # Errors
    ///
    /// Fails with [`AtlexError::EmptyRegion`] when a polygon is configured
    /// and neither beam has any photon inside it, or with
    /// [`AtlexError::Io`] when a dataset read fails.
    pub fn subset(
        source: &dyn H5Source,
        url: &str,
        track: Track,
        parms: &ExtractParms,
        ctx: &ReadContext,
    ) -> Result<Region> {
        let segment_lat = PairArray::<f64>::read_both(
            source,
            url,
            track,
            "geolocation/reference_photon_lat",
            Selection::all(),
            ctx,
        )?;
        let segment_lon = PairArray::<f64>::read_both(
            source,
            url,
            track,
            "geolocation/reference_photon_lon",
            Selection::all(),
            ctx,
        )?;
        let segment_ph_cnt = PairArray::<i32>::read_both(
            source,
            url,
            track,
            "geolocation/segment_ph_cnt",
            Selection::all(),
            ctx,
        )?;

        let mut region = Region {
            segment_lat,
            segment_lon,
            segment_ph_cnt,
            first_segment: [0, 0],
            num_segments: [None, None],
            first_photon: [0, 0],
            num_photons: [None, None],
        };

        if !parms.polygon.is_empty() {
            region.apply_polygon(&parms.polygon, track)?;
        }

        region.segment_lat.trim(region.first_segment, region.num_segments);
        region.segment_lon.trim(region.first_segment, region.num_segments);
        region.segment_ph_cnt.trim(region.first_segment, region.num_segments);

        Ok(region)
    }

    /// Row window into the untrimmed segment datasets.
    #[must_use]
    pub fn segment_selection(&self, side: BeamSide) -> Selection {
        Selection::rows(self.first_segment[side.index()], self.num_segments[side.index()])
    }

    /// Row window into the photon datasets.
    #[must_use]
    pub fn photon_selection(&self, side: BeamSide) -> Selection {
        Selection::rows(self.first_photon[side.index()], self.num_photons[side.index()])
    }

    fn apply_polygon(&mut self, polygon: &[Coord], track: Track) -> Result<()> {
        let first_lat = self.segment_lat[BeamSide::Left].first().copied().unwrap_or(0.0);
        let projection = Projection::select(first_lat);
        let projected = project_polygon(polygon, projection);

        for side in BeamSide::SIDES {
            let i = side.index();
            let lats = &self.segment_lat[side];
            let lons = &self.segment_lon[side];
            let counts = &self.segment_ph_cnt[side];

            let mut first_found = false;
            let mut last_found = false;
            let mut first_photon = 0usize;
            let mut num_photons = 0usize;
            let mut segment = 0usize;

            while segment < counts.len() {
                let point =
                    projection.project(Coord { lat: lats[segment], lon: lons[segment] });
                let inside = point_in_polygon(&projected, point);
                let count = counts[segment].max(0) as usize;

                if !first_found {
                    if inside && count != 0 {
                        first_found = true;
                        self.first_segment[i] = segment;
                        num_photons = count;
                    } else {
                        first_photon += count;
                    }
                } else if !last_found {
                    if !inside && count != 0 {
                        last_found = true;
                        break;
                    }
                    num_photons += count;
                }

                segment += 1;
            }

            if first_found {
                self.num_segments[i] = Some(segment - self.first_segment[i]);
            } else {
                // Nothing of this beam falls inside the polygon.
                self.first_segment[i] = 0;
                self.num_segments[i] = Some(0);
            }
            self.first_photon[i] = first_photon;
            self.num_photons[i] = Some(num_photons);

            debug!(
                "track {track} {side:?}: segments [{}, +{:?}), photons [{}, +{:?})",
                self.first_segment[i], self.num_segments[i], first_photon, self.num_photons[i]
            );
        }

        if self.num_photons == [Some(0), Some(0)] {
            return Err(AtlexError::EmptyRegion);
        }
        Ok(())
    }
}
