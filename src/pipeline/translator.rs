//! Extent and piece translation.
//!
//! Splits a whole structured extent into per-piece sub-extents, and a count of
//! unstructured pieces into per-partition ranges. Both are pure functions of
//! their arguments, so every process computes the same decomposition.
//!
//! Splitting works on point indices: pieces never share a point unless a ghost
//! level is requested, in which case each local extent grows by that many
//! layers (clamped to the whole extent).

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::extent::Extent;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// How a whole extent is divided among pieces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMode {
    /// Recursive bisection along the longest axis.
    #[default]
    Block,
    XSlab,
    YSlab,
    ZSlab,
}

impl SplitMode {
    /// The fixed split axis for slab modes.
    pub fn slab_axis(self) -> Option<usize> {
        match self {
            SplitMode::Block => None,
            SplitMode::XSlab => Some(0),
            SplitMode::YSlab => Some(1),
            SplitMode::ZSlab => Some(2),
        }
    }

    pub fn all() -> &'static [SplitMode] {
        &[
            SplitMode::Block,
            SplitMode::XSlab,
            SplitMode::YSlab,
            SplitMode::ZSlab,
        ]
    }
}

impl fmt::Display for SplitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SplitMode::Block => "block",
            SplitMode::XSlab => "x-slab",
            SplitMode::YSlab => "y-slab",
            SplitMode::ZSlab => "z-slab",
        };
        f.write_str(name)
    }
}

impl FromStr for SplitMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "block" => Ok(SplitMode::Block),
            "x-slab" | "x" => Ok(SplitMode::XSlab),
            "y-slab" | "y" => Ok(SplitMode::YSlab),
            "z-slab" | "z" => Ok(SplitMode::ZSlab),
            other => Err(PipelineError::InvalidArgument(format!(
                "unknown split mode '{}'",
                other
            ))),
        }
    }
}

fn check_piece(num_pieces: u32, piece: u32) -> PipelineResult<()> {
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
    Ok(())
}

/// The sub-extent of `whole` owned by `piece` out of `num_pieces`, without ghosts.
///
/// Returns [`Extent::EMPTY`] when there are more pieces than points along the
/// split direction; never clamps an out-of-range `piece`.
pub fn compute_local_extent(
    whole: &Extent,
    num_pieces: u32,
    piece: u32,
    mode: SplitMode,
) -> PipelineResult<Extent> {
    check_piece(num_pieces, piece)?;
    whole.validate()?;
    if whole.is_empty() {
        return Ok(Extent::EMPTY);
    }
    match mode.slab_axis() {
        Some(axis) => Ok(split_slab(whole, num_pieces, piece, axis)),
        None => Ok(split_block(whole, num_pieces, piece)),
    }
}

/// [`compute_local_extent`] grown by `ghost_level` layers inside `whole`.
pub fn compute_local_extent_with_ghosts(
    whole: &Extent,
    num_pieces: u32,
    piece: u32,
    ghost_level: u32,
    mode: SplitMode,
) -> PipelineResult<Extent> {
    let local = compute_local_extent(whole, num_pieces, piece, mode)?;
    Ok(local.grow(ghost_level, whole))
}

fn split_slab(whole: &Extent, num_pieces: u32, piece: u32, axis: usize) -> Extent {
    let (lo, _) = whole.axis(axis);
    let n = whole.points_along(axis) as u64;
    let start = n * piece as u64 / num_pieces as u64;
    let end = n * (piece as u64 + 1) / num_pieces as u64;
    if end <= start {
        return Extent::EMPTY;
    }
    let mut out = *whole;
    out.set_axis(axis, lo + start as i32, lo + end as i32 - 1);
    out
}

fn split_block(whole: &Extent, num_pieces: u32, piece: u32) -> Extent {
    let mut ext = *whole;
    let mut piece = piece;
    let mut count = num_pieces;

    while count > 1 {
        // Longest splittable axis; ties go to the higher axis.
        let axis = (0..3)
            .filter(|&a| ext.points_along(a) >= 2)
            .max_by_key(|&a| ext.points_along(a));
        let Some(axis) = axis else {
            // Nothing left to split: the first piece of the group keeps it all.
            return if piece == 0 { ext } else { Extent::EMPTY };
        };

        let (lo, hi) = ext.axis(axis);
        let n = ext.points_along(axis) as u64;
        let half = count / 2;
        let first = (n * half as u64 / count as u64) as i32;

        if piece < half {
            if first == 0 {
                return Extent::EMPTY;
            }
            ext.set_axis(axis, lo, lo + first - 1);
            count = half;
        } else {
            ext.set_axis(axis, lo + first, hi);
            piece -= half;
            count -= half;
        }
    }
    ext
}

/// The contiguous range of `total_pieces` owned by `partition` out of `num_partitions`.
///
/// With `total_pieces == num_partitions` each partition owns exactly one piece.
pub fn compute_piece_range(
    total_pieces: u32,
    num_partitions: u32,
    partition: u32,
) -> PipelineResult<Range<u32>> {
    check_piece(num_partitions, partition)?;
    let total = total_pieces as u64;
    let start = total * partition as u64 / num_partitions as u64;
    let end = total * (partition as u64 + 1) / num_partitions as u64;
    Ok(start as u32..end as u32)
}

/// Stateful translator mirroring the usual set-then-compute usage.
///
/// ```
/// use vispipe::pipeline::{Extent, ExtentTranslator, SplitMode};
///
/// let mut et = ExtentTranslator::new()
///     .with_whole_extent(Extent::new(0, 31, 0, 31, 0, 31))
///     .with_number_of_pieces(4)
///     .with_piece(3)
///     .with_split_mode(SplitMode::ZSlab);
/// let extent = et.piece_to_extent().unwrap();
/// assert_eq!(extent.axis(2), (24, 31));
/// ```
#[derive(Debug, Clone)]
pub struct ExtentTranslator {
    whole_extent: Extent,
    number_of_pieces: u32,
    piece: u32,
    ghost_level: u32,
    split_mode: SplitMode,
    extent: Extent,
}

impl ExtentTranslator {
    pub fn new() -> Self {
        Self {
            whole_extent: Extent::EMPTY,
            number_of_pieces: 1,
            piece: 0,
            ghost_level: 0,
            split_mode: SplitMode::default(),
            extent: Extent::EMPTY,
        }
    }

    pub fn with_whole_extent(mut self, whole: Extent) -> Self {
        self.whole_extent = whole;
        self
    }

    pub fn with_number_of_pieces(mut self, n: u32) -> Self {
        self.number_of_pieces = n;
        self
    }

    pub fn with_piece(mut self, piece: u32) -> Self {
        self.piece = piece;
        self
    }

    pub fn with_ghost_level(mut self, ghost_level: u32) -> Self {
        self.ghost_level = ghost_level;
        self
    }

    pub fn with_split_mode(mut self, mode: SplitMode) -> Self {
        self.split_mode = mode;
        self
    }

    pub fn set_piece(&mut self, piece: u32) {
        self.piece = piece;
    }

    /// Compute and remember the local extent for the current settings.
    pub fn piece_to_extent(&mut self) -> PipelineResult<Extent> {
        self.extent = compute_local_extent_with_ghosts(
            &self.whole_extent,
            self.number_of_pieces,
            self.piece,
            self.ghost_level,
            self.split_mode,
        )?;
        Ok(self.extent)
    }

    /// Result of the last [`piece_to_extent`](Self::piece_to_extent).
    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// Local extents of every piece, in piece order.
    pub fn all_extents(&self) -> PipelineResult<Vec<Extent>> {
        (0..self.number_of_pieces)
            .map(|p| {
                compute_local_extent_with_ghosts(
                    &self.whole_extent,
                    self.number_of_pieces,
                    p,
                    self.ghost_level,
                    self.split_mode,
                )
            })
            .collect()
    }
}

impl Default for ExtentTranslator {
    fn default() -> Self {
        Self::new()
    }
}
