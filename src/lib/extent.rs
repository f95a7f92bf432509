//! The extent walker: synchronized cursors over a track's photon stream.
//!
//! One walker processes both beams of a track. Each beam keeps its own
//! cursor state (photon index, segment index, in-segment count, extent start
//! base, background and classification cursors) and the walker steps both in
//! lockstep, producing one [`ExtentRecord`] per step. Extents overlap:
//! each spans `extent_length` metres along-track and starts `extent_step`
//! metres after the previous one, so the step snapshot taken while scanning
//! one extent becomes the start of the next.
//!
//! All cursors are monotonic. The background-rate and classification arrays
//! are produced in lockstep with the photon stream, so their cursors are
//! never reset between extents.

use log::error;

use crate::beam::{Atl08Class, BeamSide, Track, SEGMENT_LENGTH};
use crate::errors::{AtlexError, Result};
use crate::h5::{ColSelect, H5Source, ReadContext, Selection};
use crate::paired::PairArray;
use crate::parms::ExtractParms;
use crate::record::{ExtentRecord, Photon};
use crate::region::Region;

/// ATL08 classification arrays joined by `(segment_id, in-segment-index)`.
#[derive(Debug)]
pub struct Atl08Data {
    /// Segment id of each classified photon
    pub ph_segment_id: PairArray<i32>,
    /// 1-based in-segment index of each classified photon
    pub classed_pc_indx: PairArray<i32>,
    /// Classification flag of each classified photon
    pub classed_pc_flag: PairArray<i8>,
}

impl Atl08Data {
    /// Read the classification arrays for one track.
    pub fn read(
        source: &dyn H5Source,
        url: &str,
        track: Track,
        ctx: &ReadContext,
    ) -> Result<Atl08Data> {
        Ok(Atl08Data {
            ph_segment_id: PairArray::read_both(
                source,
                url,
                track,
                "signal_photons/ph_segment_id",
                Selection::all(),
                ctx,
            )?,
            classed_pc_indx: PairArray::read_both(
                source,
                url,
                track,
                "signal_photons/classed_pc_indx",
                Selection::all(),
                ctx,
            )?,
            classed_pc_flag: PairArray::read_both(
                source,
                url,
                track,
                "signal_photons/classed_pc_flag",
                Selection::all(),
                ctx,
            )?,
        })
    }
}

/// All per-track arrays the walker consumes, range-limited by the region's
/// windows.
#[derive(Debug)]
pub struct TrackData {
    /// Spacecraft velocity triples per segment, row-major flattened
    pub velocity_sc: PairArray<f32>,
    /// Delta-time per segment
    pub segment_delta_time: PairArray<f64>,
    /// Segment id per segment
    pub segment_id: PairArray<i32>,
    /// Along-track distance of each segment start
    pub segment_dist_x: PairArray<f64>,
    /// Along-track distance of each photon within its segment
    pub dist_ph_along: PairArray<f32>,
    /// Height of each photon
    pub h_ph: PairArray<f32>,
    /// Signal confidence of each photon for the configured surface type
    pub signal_conf_ph: PairArray<i8>,
    /// Latitude of each photon
    pub lat_ph: PairArray<f64>,
    /// Longitude of each photon
    pub lon_ph: PairArray<f64>,
    /// Delta-time of each photon
    pub delta_time: PairArray<f64>,
    /// Delta-time of each background-rate sample
    pub bckgrd_delta_time: PairArray<f64>,
    /// Background rate samples, non-decreasing in delta-time
    pub bckgrd_rate: PairArray<f32>,
    /// Classification arrays, present when the ATL08 filter is enabled
    pub atl08: Option<Atl08Data>,
}

impl TrackData {
    /// Issue the range-limited reads for one track.
    ///
    /// `url` addresses the ATL03 granule and `atl08_url` its classification
    /// companion; the companion is only touched when the parameters enable
    /// classification. Photon and segment reads are limited to the region's
    /// windows; the background arrays are read whole.
    #[allow(clippy::too_many_arguments)]
    pub fn read(
        source: &dyn H5Source,
        url: &str,
        atl08_url: &str,
        track: Track,
        region: &Region,
        parms: &ExtractParms,
        ctx: &ReadContext,
        ctx08: &ReadContext,
    ) -> Result<TrackData> {
        let seg = [
            region.segment_selection(BeamSide::Left),
            region.segment_selection(BeamSide::Right),
        ];
        let ph =
            [region.photon_selection(BeamSide::Left), region.photon_selection(BeamSide::Right)];
        let conf_col = ColSelect::Index(parms.surface_type.column());

        let atl08 = if parms.use_atl08_classification {
            Some(Atl08Data::read(source, atl08_url, track, ctx08)?)
        } else {
            None
        };

        Ok(TrackData {
            velocity_sc: PairArray::read(
                source,
                url,
                track,
                "geolocation/velocity_sc",
                [seg[0].with_col(ColSelect::All), seg[1].with_col(ColSelect::All)],
                ctx,
            )?,
            segment_delta_time: PairArray::read(
                source,
                url,
                track,
                "geolocation/delta_time",
                seg,
                ctx,
            )?,
            segment_id: PairArray::read(source, url, track, "geolocation/segment_id", seg, ctx)?,
            segment_dist_x: PairArray::read(
                source,
                url,
                track,
                "geolocation/segment_dist_x",
                seg,
                ctx,
            )?,
            dist_ph_along: PairArray::read(source, url, track, "heights/dist_ph_along", ph, ctx)?,
            h_ph: PairArray::read(source, url, track, "heights/h_ph", ph, ctx)?,
            signal_conf_ph: PairArray::read(
                source,
                url,
                track,
                "heights/signal_conf_ph",
                [ph[0].with_col(conf_col), ph[1].with_col(conf_col)],
                ctx,
            )?,
            lat_ph: PairArray::read(source, url, track, "heights/lat_ph", ph, ctx)?,
            lon_ph: PairArray::read(source, url, track, "heights/lon_ph", ph, ctx)?,
            delta_time: PairArray::read(source, url, track, "heights/delta_time", ph, ctx)?,
            bckgrd_delta_time: PairArray::read_both(
                source,
                url,
                track,
                "bckgrd_atlas/delta_time",
                Selection::all(),
                ctx,
            )?,
            bckgrd_rate: PairArray::read_both(
                source,
                url,
                track,
                "bckgrd_atlas/bckgrd_rate",
                Selection::all(),
                ctx,
            )?,
            atl08,
        })
    }
}

/// Walker state for one beam.
#[derive(Debug)]
struct BeamCursor {
    /// Next photon index in the subset
    ph_in: usize,
    /// Next segment index in the subset
    seg_in: usize,
    /// Photons of `seg_in` already consumed
    seg_ph: i32,
    /// Cursor into the cumulative along-track distance base
    start_segment: usize,
    /// Along-track distance at which the next extent begins
    start_distance: f64,
    /// Fraction of the first segment preceding the extent's first photon
    start_seg_portion: f64,
    /// Cursor into the background-rate arrays
    bckgrd_in: usize,
    /// Cursor into the classification arrays
    atl08_in: usize,
    /// Once set, this beam contributes no further photons
    complete: bool,
}

/// Steps both beams of a track through overlapping extents.
pub struct ExtentWalker<'a> {
    data: &'a TrackData,
    region: &'a Region,
    parms: &'a ExtractParms,
    track: Track,
    resource: &'a str,
    cursors: [BeamCursor; 2],
}

impl<'a> ExtentWalker<'a> {
    /// Initialize cursors for both beams. A beam with no photons or no
    /// segments in the subset starts out complete.
    #[must_use]
    pub fn new(
        data: &'a TrackData,
        region: &'a Region,
        parms: &'a ExtractParms,
        track: Track,
        resource: &'a str,
    ) -> Self {
        let cursors = BeamSide::SIDES.map(|side| {
            let empty =
                data.dist_ph_along.is_empty(side) || data.segment_dist_x.is_empty(side);
            BeamCursor {
                ph_in: 0,
                seg_in: 0,
                seg_ph: 0,
                start_segment: 0,
                start_distance: if empty { 0.0 } else { data.segment_dist_x[side][0] },
                start_seg_portion: 0.0,
                bckgrd_in: 0,
                atl08_in: 0,
                complete: empty,
            }
        });
        ExtentWalker { data, region, parms, track, resource, cursors }
    }

    /// True once both beams are complete.
    #[must_use]
    pub fn done(&self) -> bool {
        self.cursors.iter().all(|c| c.complete)
    }

    /// Assemble the next extent, stepping both beam cursors.
    ///
    /// Returns `None` once both beams are complete. A beam that was already
    /// complete contributes `valid = false` and no photons; a beam whose
    /// filters fail contributes its derived fields but no photons.
    ///
    /// # Errors
    ///
    /// Fails with [`AtlexError::Classification`] when a joined ATL08 class
    /// is out of range.
    pub fn next_extent(&mut self) -> Result<Option<ExtentRecord>> {
        if self.done() {
            return Ok(None);
        }

        let mut record = ExtentRecord {
            track: self.track.number(),
            extent_length: [self.parms.extent_length; 2],
            ..ExtentRecord::default()
        };

        for side in BeamSide::SIDES {
            let i = side.index();
            if self.cursors[i].complete {
                continue;
            }

            let (photons, extent_segment) = self.scan_beam(side)?;
            self.advance_start(side);

            record.valid[i] = self.extent_is_valid(&photons);
            record.segment_id[i] = self.closest_segment_id(side, extent_segment);
            record.spacecraft_velocity[i] = self.velocity_magnitude(side, extent_segment);
            record.background_rate[i] = self.background_rate(side, extent_segment);
            record.photons[i] = photons;
        }

        // Invalid beams still report their derived fields but carry no
        // photon payload.
        for i in 0..2 {
            if !record.valid[i] {
                record.photons[i].clear();
            }
        }

        Ok(Some(record))
    }

    /// Collect this extent's photons for one beam and locate the start of
    /// the next extent.
    fn scan_beam(&mut self, side: BeamSide) -> Result<(Vec<Photon>, usize)> {
        let data = self.data;
        let region = self.region;
        let parms = self.parms;
        let resource = self.resource;
        let track = self.track;

        let dist_x = &data.segment_dist_x[side];
        let dist_ph = &data.dist_ph_along[side];
        let ph_cnt = &region.segment_ph_cnt[side];
        let seg_ids = &data.segment_id[side];
        let conf = &data.signal_conf_ph[side];

        let cursor = &mut self.cursors[side.index()];
        let extent_segment = cursor.seg_in;
        cursor.start_seg_portion = f64::from(dist_ph[cursor.ph_in]) / SEGMENT_LENGTH;

        let mut current_photon = cursor.ph_in;
        let mut current_segment = cursor.seg_in;
        let mut current_count = cursor.seg_ph;
        let mut extent_complete = false;
        let mut step_complete = false;
        let mut photons = Vec::new();

        loop {
            // Move to the photon's segment, skipping exhausted or empty ones.
            current_count += 1;
            while current_segment < dist_x.len() && current_count > ph_cnt[current_segment] {
                current_count = 1;
                current_segment += 1;
            }
            if current_segment >= dist_x.len() {
                error!("Photons with no segments detected in {resource} track {track}");
                cursor.complete = true;
                break;
            }

            let delta_distance = dist_x[current_segment] - cursor.start_distance;
            let along_track_distance = delta_distance + f64::from(dist_ph[current_photon]);

            // First crossing of the step boundary marks where the next
            // extent begins.
            if !step_complete && along_track_distance >= parms.extent_step {
                cursor.ph_in = current_photon;
                cursor.seg_in = current_segment;
                cursor.seg_ph = current_count - 1;
                step_complete = true;
            }

            if along_track_distance < parms.extent_length {
                let (classification, acceptable) = classify(
                    data.atl08.as_ref(),
                    side,
                    parms,
                    seg_ids[current_segment],
                    current_count,
                    &mut cursor.atl08_in,
                )?;
                if acceptable && conf[current_photon] >= parms.signal_confidence {
                    photons.push(Photon {
                        delta_time: data.delta_time[side][current_photon],
                        latitude: data.lat_ph[side][current_photon],
                        longitude: data.lon_ph[side][current_photon],
                        distance: along_track_distance - parms.extent_length / 2.0,
                        height: data.h_ph[side][current_photon],
                        info: u32::from(classification) & 0x7,
                    });
                }
            } else {
                extent_complete = true;
            }

            current_photon += 1;
            if current_photon >= dist_ph.len() {
                // Subset exhausted. The beam is complete unless the next
                // extent's first photon was already located, in which case
                // the tail extents are still walked.
                if !step_complete {
                    cursor.complete = true;
                }
                break;
            }
            if extent_complete && step_complete {
                break;
            }
        }

        Ok((photons, extent_segment))
    }

    /// Advance the extent start base by one step, normalising the distance
    /// base so it stays within the current segment.
    fn advance_start(&mut self, side: BeamSide) {
        let dist_x = &self.data.segment_dist_x[side];
        let cursor = &mut self.cursors[side.index()];
        cursor.start_distance += self.parms.extent_step;
        while cursor.start_segment + 1 < dist_x.len()
            && cursor.start_distance >= dist_x[cursor.start_segment + 1]
        {
            cursor.start_distance +=
                dist_x[cursor.start_segment + 1] - dist_x[cursor.start_segment] - SEGMENT_LENGTH;
            cursor.start_segment += 1;
        }
    }

    fn extent_is_valid(&self, photons: &[Photon]) -> bool {
        if photons.len() < self.parms.minimum_photon_count {
            return false;
        }
        if photons.len() > 1 {
            let spread = photons[photons.len() - 1].distance - photons[0].distance;
            if spread < self.parms.along_track_spread {
                return false;
            }
        }
        true
    }

    /// Closest downstream segment id represented by the extent: the first
    /// segment's id, plus the portion of it preceding the first photon,
    /// plus half the extent measured in segments, rounded.
    fn closest_segment_id(&self, side: BeamSide, extent_segment: usize) -> u32 {
        let cursor = &self.cursors[side.index()];
        let id = f64::from(self.data.segment_id[side][extent_segment])
            + cursor.start_seg_portion
            + (self.parms.extent_length / SEGMENT_LENGTH) / 2.0;
        (id + 0.5) as u32
    }

    fn velocity_magnitude(&self, side: BeamSide, extent_segment: usize) -> f64 {
        let v = &self.data.velocity_sc[side];
        let offset = extent_segment * 3;
        let (v1, v2, v3) =
            (f64::from(v[offset]), f64::from(v[offset + 1]), f64::from(v[offset + 2]));
        (v1 * v1 + v2 * v2 + v3 * v3).sqrt()
    }

    /// Interpolated background rate at the extent segment's delta-time.
    ///
    /// The cursor only moves forward; when it reaches the end of the array
    /// the last sample is used, and before the first sample the first is
    /// used unchanged.
    fn background_rate(&mut self, side: BeamSide, extent_segment: usize) -> f64 {
        let times = &self.data.bckgrd_delta_time[side];
        let rates = &self.data.bckgrd_rate[side];
        if rates.is_empty() {
            return 0.0;
        }
        let segment_time = self.data.segment_delta_time[side][extent_segment];
        let cursor = &mut self.cursors[side.index()];

        let mut rate = f64::from(rates[rates.len() - 1]);
        while cursor.bckgrd_in < rates.len() {
            if times[cursor.bckgrd_in] >= segment_time {
                if cursor.bckgrd_in > 0 {
                    let run = times[cursor.bckgrd_in] - times[cursor.bckgrd_in - 1];
                    let rise =
                        f64::from(rates[cursor.bckgrd_in]) - f64::from(rates[cursor.bckgrd_in - 1]);
                    let delta = segment_time - times[cursor.bckgrd_in - 1];
                    rate = (rise / run) * delta + f64::from(rates[cursor.bckgrd_in - 1]);
                } else {
                    rate = f64::from(rates[0]);
                }
                break;
            }
            cursor.bckgrd_in += 1;
        }
        rate
    }
}

/// Join one photon against the ATL08 classification arrays.
///
/// Returns the classification and whether the configured mask accepts it.
/// Photons with no matching classification row stay unclassified and are
/// always acceptable.
fn classify(
    atl08: Option<&Atl08Data>,
    side: BeamSide,
    parms: &ExtractParms,
    segment_id: i32,
    current_count: i32,
    atl08_in: &mut usize,
) -> Result<(u8, bool)> {
    let Some(atl08) = atl08 else {
        return Ok((Atl08Class::Unclassified as u8, true));
    };
    let seg = &atl08.ph_segment_id[side];
    let idx = &atl08.classed_pc_indx[side];
    let flags = &atl08.classed_pc_flag[side];

    while *atl08_in < seg.len() && seg[*atl08_in] < segment_id {
        *atl08_in += 1;
    }
    while *atl08_in < seg.len() && seg[*atl08_in] == segment_id && idx[*atl08_in] < current_count {
        *atl08_in += 1;
    }
    if *atl08_in < seg.len() && seg[*atl08_in] == segment_id && idx[*atl08_in] == current_count {
        let value = flags[*atl08_in];
        let class = u8::try_from(value)
            .ok()
            .and_then(Atl08Class::from_index)
            .ok_or(AtlexError::Classification { value })?;
        *atl08_in += 1;
        Ok((class as u8, parms.atl08_class[class as usize]))
    } else {
        Ok((Atl08Class::Unclassified as u8, true))
    }
}
