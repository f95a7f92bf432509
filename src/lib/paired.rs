//! Co-indexed per-beam dataset pairs.
//!
//! Most ATL03 datasets exist once per beam; the pipelines always process the
//! left and right beams of a track together. [`PairArray`] issues one read
//! per side (composing the dataset path with the beam group) and exposes
//! indexed access per side. Side lengths are independent.

use std::ops::Index;

use crate::beam::{BeamSide, Track};
use crate::errors::Result;
use crate::h5::{read_as, Element, H5Source, ReadContext, Selection};

/// Two co-indexed typed slices, one per beam side.
#[derive(Debug, Clone, Default)]
pub struct PairArray<T> {
    left: Vec<T>,
    right: Vec<T>,
}

impl<T: Element> PairArray<T> {
    /// Read one dataset for both sides of a track, with a per-side selection.
    pub fn read(
        source: &dyn H5Source,
        url: &str,
        track: Track,
        dataset: &str,
        sel: [Selection; 2],
        ctx: &ReadContext,
    ) -> Result<Self> {
        let mut sides: [Vec<T>; 2] = [Vec::new(), Vec::new()];
        for side in BeamSide::SIDES {
            let path = format!("{}/{}", track.group(side), dataset);
            sides[side.index()] = read_as(source, url, &path, sel[side.index()], ctx)?;
        }
        let [left, right] = sides;
        Ok(PairArray { left, right })
    }

    /// Read one dataset for both sides with the same selection.
    pub fn read_both(
        source: &dyn H5Source,
        url: &str,
        track: Track,
        dataset: &str,
        sel: Selection,
        ctx: &ReadContext,
    ) -> Result<Self> {
        Self::read(source, url, track, dataset, [sel, sel], ctx)
    }
}

impl<T> PairArray<T> {
    /// Build a pair from in-memory sides (test fixtures and adapters).
    #[must_use]
    pub fn from_sides(left: Vec<T>, right: Vec<T>) -> Self {
        PairArray { left, right }
    }

    /// Length of one side.
    #[must_use]
    pub fn len(&self, side: BeamSide) -> usize {
        self[side].len()
    }

    /// True when the given side holds no elements.
    #[must_use]
    pub fn is_empty(&self, side: BeamSide) -> bool {
        self[side].is_empty()
    }

    /// Narrow the observable window of each side to
    /// `[first[side], first[side] + count[side])`; `None` keeps the remainder
    /// of the side. Used after spatial subsetting.
    pub fn trim(&mut self, first: [usize; 2], count: [Option<usize>; 2]) {
        for side in BeamSide::SIDES {
            let i = side.index();
            let v = match side {
                BeamSide::Left => &mut self.left,
                BeamSide::Right => &mut self.right,
            };
            let start = first[i].min(v.len());
            v.drain(..start);
            if let Some(n) = count[i] {
                v.truncate(n);
            }
        }
    }
}

impl<T> Index<BeamSide> for PairArray<T> {
    type Output = [T];

    fn index(&self, side: BeamSide) -> &[T] {
        match side {
            BeamSide::Left => &self.left,
            BeamSide::Right => &self.right,
        }
    }
}
