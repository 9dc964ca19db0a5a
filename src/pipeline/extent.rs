//! Structured extents and unstructured piece descriptors.
//!
//! An [`Extent`] is six inclusive index bounds `[xmin, xmax, ymin, ymax, zmin, zmax]`.
//! Any axis with `min > max` makes the extent empty; the canonical empty extent
//! is `[0, -1, 0, -1, 0, -1]`.

use crate::pipeline::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Inclusive structured index-space bounds.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Extent(pub [i32; 6]);

impl Extent {
    pub const EMPTY: Extent = Extent([0, -1, 0, -1, 0, -1]);

    pub const fn new(xmin: i32, xmax: i32, ymin: i32, ymax: i32, zmin: i32, zmax: i32) -> Self {
        Self([xmin, xmax, ymin, ymax, zmin, zmax])
    }

    /// Build from 2, 4 or 6 integers. Missing axes collapse to `[0, 0]`.
    pub fn from_slice(values: &[i32]) -> PipelineResult<Self> {
        if !matches!(values.len(), 2 | 4 | 6) {
            return Err(PipelineError::MalformedExtent(format!(
                "expected 2, 4 or 6 bounds, got {}",
                values.len()
            )));
        }
        let mut bounds = [0i32; 6];
        bounds[..values.len()].copy_from_slice(values);
        let extent = Self(bounds);
        extent.validate()?;
        Ok(extent)
    }

    /// Reject extents that are neither well-formed nor the canonical empty extent.
    pub fn validate(&self) -> PipelineResult<()> {
        if *self == Self::EMPTY {
            return Ok(());
        }
        for axis in 0..3 {
            let (lo, hi) = self.axis(axis);
            if lo > hi {
                return Err(PipelineError::MalformedExtent(format!(
                    "{} has min {} > max {} on axis {}",
                    self, lo, hi, axis
                )));
            }
        }
        Ok(())
    }

    #[inline]
    pub fn axis(&self, axis: usize) -> (i32, i32) {
        (self.0[axis * 2], self.0[axis * 2 + 1])
    }

    #[inline]
    pub fn set_axis(&mut self, axis: usize, lo: i32, hi: i32) {
        self.0[axis * 2] = lo;
        self.0[axis * 2 + 1] = hi;
    }

    pub fn is_empty(&self) -> bool {
        (0..3).any(|a| {
            let (lo, hi) = self.axis(a);
            lo > hi
        })
    }

    /// Number of points along `axis` (0 when empty).
    pub fn points_along(&self, axis: usize) -> usize {
        if self.is_empty() {
            return 0;
        }
        let (lo, hi) = self.axis(axis);
        (hi as i64 - lo as i64 + 1) as usize
    }

    pub fn dimensions(&self) -> [usize; 3] {
        [
            self.points_along(0),
            self.points_along(1),
            self.points_along(2),
        ]
    }

    pub fn num_points(&self) -> usize {
        self.dimensions().iter().product()
    }

    /// Cells span axes with more than one point; a single point has no cells.
    pub fn num_cells(&self) -> usize {
        let dims = self.dimensions();
        if dims.iter().any(|&d| d == 0) {
            return 0;
        }
        let spans: Vec<usize> = dims.iter().filter(|&&d| d > 1).map(|&d| d - 1).collect();
        if spans.is_empty() {
            0
        } else {
            spans.iter().product()
        }
    }

    /// True when `other` lies entirely inside `self`. The empty extent is inside everything.
    pub fn contains(&self, other: &Extent) -> bool {
        if other.is_empty() {
            return true;
        }
        if self.is_empty() {
            return false;
        }
        (0..3).all(|a| {
            let (lo, hi) = self.axis(a);
            let (olo, ohi) = other.axis(a);
            lo <= olo && ohi <= hi
        })
    }

    pub fn contains_point(&self, ijk: [i32; 3]) -> bool {
        !self.is_empty()
            && (0..3).all(|a| {
                let (lo, hi) = self.axis(a);
                lo <= ijk[a] && ijk[a] <= hi
            })
    }

    /// Bounding box of both extents. Empty is the identity.
    pub fn union(&self, other: &Extent) -> Extent {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let mut out = *self;
        for a in 0..3 {
            let (lo, hi) = self.axis(a);
            let (olo, ohi) = other.axis(a);
            out.set_axis(a, lo.min(olo), hi.max(ohi));
        }
        out
    }

    /// Overlap of both extents, or [`Extent::EMPTY`] when disjoint.
    pub fn intersection(&self, other: &Extent) -> Extent {
        if self.is_empty() || other.is_empty() {
            return Self::EMPTY;
        }
        let mut out = *self;
        for a in 0..3 {
            let (lo, hi) = self.axis(a);
            let (olo, ohi) = other.axis(a);
            let (nlo, nhi) = (lo.max(olo), hi.min(ohi));
            if nlo > nhi {
                return Self::EMPTY;
            }
            out.set_axis(a, nlo, nhi);
        }
        out
    }

    pub fn intersects(&self, other: &Extent) -> bool {
        !self.intersection(other).is_empty()
    }

    /// Grow every axis by `layers`, never leaving `within`.
    pub fn grow(&self, layers: u32, within: &Extent) -> Extent {
        if self.is_empty() || layers == 0 {
            return *self;
        }
        let layers = layers.min(i32::MAX as u32) as i32;
        let mut out = *self;
        for a in 0..3 {
            let (lo, hi) = self.axis(a);
            out.set_axis(a, lo.saturating_sub(layers), hi.saturating_add(layers));
        }
        out.intersection(within)
    }

    /// Flat index of `ijk` inside this extent, x fastest.
    pub fn point_index(&self, ijk: [i32; 3]) -> Option<usize> {
        if !self.contains_point(ijk) {
            return None;
        }
        let dims = self.dimensions();
        let i = (ijk[0] - self.0[0]) as usize;
        let j = (ijk[1] - self.0[2]) as usize;
        let k = (ijk[2] - self.0[4]) as usize;
        Some(i + dims[0] * (j + dims[1] * k))
    }

    /// Every point of the extent, x fastest.
    pub fn iter_points(&self) -> impl Iterator<Item = [i32; 3]> + '_ {
        let empty = self.is_empty();
        let [x0, x1, y0, y1, z0, z1] = self.0;
        (z0..=z1)
            .flat_map(move |k| (y0..=y1).flat_map(move |j| (x0..=x1).map(move |i| [i, j, k])))
            .filter(move |_| !empty)
    }
}

impl Default for Extent {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Extent{}", self)
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "[{}, {}, {}, {}, {}, {}]", a, b, c, d, e, g)
    }
}

impl FromStr for Extent {
    type Err = PipelineError;

    /// Accepts integers separated by whitespace and/or commas, optionally bracketed.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('[').trim_end_matches(']');
        let values = trimmed
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
            .map(|t| {
                t.parse::<i32>().map_err(|e| {
                    PipelineError::MalformedExtent(format!("'{}' is not an integer: {}", t, e))
                })
            })
            .collect::<PipelineResult<Vec<i32>>>()?;
        Self::from_slice(&values)
    }
}

/// A partition unit of unstructured data: `(piece, num_pieces, ghost_level)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPieceRequest")]
pub struct PieceRequest {
    pub piece: u32,
    pub num_pieces: u32,
    pub ghost_level: u32,
}

#[derive(Deserialize)]
struct RawPieceRequest {
    piece: u32,
    num_pieces: u32,
    #[serde(default)]
    ghost_level: u32,
}

impl TryFrom<RawPieceRequest> for PieceRequest {
    type Error = PipelineError;

    fn try_from(raw: RawPieceRequest) -> PipelineResult<Self> {
        Ok(Self::new(raw.piece, raw.num_pieces)?.with_ghost_level(raw.ghost_level))
    }
}

impl PieceRequest {
    /// The whole dataset as a single piece.
    pub const WHOLE: PieceRequest = PieceRequest {
        piece: 0,
        num_pieces: 1,
        ghost_level: 0,
    };

    pub fn new(piece: u32, num_pieces: u32) -> PipelineResult<Self> {
        if num_pieces == 0 {
            return Err(PipelineError::InvalidArgument(
                "number of pieces must be at least 1".to_string(),
            ));
        }
        if piece >= num_pieces {
            return Err(PipelineError::InvalidArgument(format!(
                "piece index {} out of range for {} pieces",
                piece, num_pieces
            )));
        }
        Ok(Self {
            piece,
            num_pieces,
            ghost_level: 0,
        })
    }

    pub fn with_ghost_level(mut self, ghost_level: u32) -> Self {
        self.ghost_level = ghost_level;
        self
    }

    /// Two or three integers; the ghost level defaults to 0.
    pub fn from_ints(values: &[u32]) -> PipelineResult<Self> {
        match values {
            [piece, num] => Self::new(*piece, *num),
            [piece, num, ghost] => Ok(Self::new(*piece, *num)?.with_ghost_level(*ghost)),
            _ => Err(PipelineError::InvalidArgument(format!(
                "piece descriptor needs 2 or 3 integers, got {}",
                values.len()
            ))),
        }
    }

    pub fn to_ints(&self) -> [u32; 3] {
        [self.piece, self.num_pieces, self.ghost_level]
    }

    pub fn is_whole(&self) -> bool {
        self.num_pieces == 1
    }
}

impl Default for PieceRequest {
    fn default() -> Self {
        Self::WHOLE
    }
}

impl fmt::Display for PieceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.piece, self.num_pieces)?;
        if self.ghost_level > 0 {
            write!(f, "+{}", self.ghost_level)?;
        }
        Ok(())
    }
}

impl FromStr for PieceRequest {
    type Err = PipelineError;

    /// `piece/num_pieces[+ghost]` or whitespace-separated integers.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace(['/', '+'], " ");
        let values = normalized
            .split_whitespace()
            .map(|t| {
                t.parse::<u32>().map_err(|e| {
                    PipelineError::InvalidArgument(format!("'{}' is not a piece number: {}", t, e))
                })
            })
            .collect::<PipelineResult<Vec<u32>>>()?;
        Self::from_ints(&values)
    }
}
