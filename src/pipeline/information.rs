//! Per-port pipeline information.
//!
//! A [`PortInformation`] is filled twice per update: the producing node
//! declares what it *can* produce during the information pass, then the
//! executive records what downstream consumers *want* during update-extent
//! propagation.

use crate::pipeline::data::DataKind;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::extent::{Extent, PieceRequest};
use crate::pipeline::translator::{compute_local_extent_with_ghosts, SplitMode};
use serde::{Deserialize, Serialize};

/// What a consumer asks of a producer. `None` fields are unrestricted.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub extent: Option<Extent>,
    pub piece: Option<PieceRequest>,
    pub time: Option<f64>,
}

impl UpdateRequest {
    /// Everything, at no particular time.
    pub fn whole() -> Self {
        Self::default()
    }

    pub fn for_extent(extent: Extent) -> Self {
        Self {
            extent: Some(extent),
            ..Self::default()
        }
    }

    pub fn for_piece(piece: PieceRequest) -> Self {
        Self {
            piece: Some(piece),
            ..Self::default()
        }
    }

    pub fn at_time(mut self, time: f64) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_piece(mut self, piece: PieceRequest) -> Self {
        self.piece = Some(piece);
        self
    }

    pub fn with_extent(mut self, extent: Extent) -> Self {
        self.extent = Some(extent);
        self
    }

    /// Reject malformed extents and non-finite times before they reach the pipeline.
    pub fn validate(&self) -> PipelineResult<()> {
        if let Some(extent) = &self.extent {
            extent.validate()?;
        }
        if let Some(piece) = &self.piece {
            PieceRequest::new(piece.piece, piece.num_pieces)?;
        }
        if let Some(t) = self.time {
            if !t.is_finite() {
                return Err(PipelineError::InvalidArgument(format!(
                    "requested time {} is not finite",
                    t
                )));
            }
        }
        Ok(())
    }

    /// Combine two resolved requests for the same producer port.
    ///
    /// Extents merge to their bounding box. Equal pieces keep the larger ghost
    /// level; different pieces fall back to the whole dataset. Two different
    /// concrete times cannot both be served by one output.
    pub fn merge(&self, other: &UpdateRequest) -> PipelineResult<UpdateRequest> {
        let extent = match (self.extent, other.extent) {
            (Some(a), Some(b)) => Some(a.union(&b)),
            _ => None,
        };
        let piece = match (self.piece, other.piece) {
            (Some(a), Some(b)) if a.piece == b.piece && a.num_pieces == b.num_pieces => {
                Some(a.with_ghost_level(a.ghost_level.max(b.ghost_level)))
            }
            (Some(_), Some(_)) => Some(PieceRequest::WHOLE),
            _ => None,
        };
        let time = match (self.time, other.time) {
            (Some(a), Some(b)) if a != b => {
                return Err(PipelineError::ConflictingTimeRequests {
                    first: a,
                    second: b,
                })
            }
            (a, b) => a.or(b),
        };
        Ok(UpdateRequest {
            extent,
            piece,
            time,
        })
    }

    /// Whether output produced for `produced` can serve this request unchanged.
    pub fn is_satisfied_by(&self, produced: &UpdateRequest) -> bool {
        let extent_ok = match (self.extent, produced.extent) {
            (Some(want), Some(have)) => have.contains(&want),
            (None, None) => true,
            _ => false,
        };
        let piece_ok = match (self.piece, produced.piece) {
            (Some(want), Some(have)) => {
                want.piece == have.piece
                    && want.num_pieces == have.num_pieces
                    && have.ghost_level >= want.ghost_level
            }
            (None, None) => true,
            _ => false,
        };
        extent_ok && piece_ok && self.time == produced.time
    }
}

/// Outcome of fitting a request to what a port can produce.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub request: UpdateRequest,
    /// The original extent, when it had to be clamped to the whole extent.
    pub clamped_from: Option<Extent>,
}

/// Metadata owned by one output port.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PortInformation {
    data_kind: Option<DataKind>,
    whole_extent: Option<Extent>,
    origin: [f64; 3],
    spacing: [f64; 3],
    number_of_pieces: Option<u32>,
    max_ghost_level: u32,
    time_steps: Vec<f64>,
    requested: Option<UpdateRequest>,
}

impl PortInformation {
    pub fn new(data_kind: Option<DataKind>) -> Self {
        Self {
            data_kind,
            spacing: [1.0; 3],
            ..Self::default()
        }
    }

    pub fn data_kind(&self) -> Option<DataKind> {
        self.data_kind
    }

    pub fn set_data_kind(&mut self, kind: DataKind) {
        self.data_kind = Some(kind);
    }

    pub fn whole_extent(&self) -> Option<Extent> {
        self.whole_extent
    }

    pub fn set_whole_extent(&mut self, extent: Extent) {
        self.whole_extent = Some(extent);
    }

    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    pub fn set_geometry(&mut self, origin: [f64; 3], spacing: [f64; 3]) {
        self.origin = origin;
        self.spacing = spacing;
    }

    /// How many natively stored pieces the producer has, if it has a fixed count.
    pub fn number_of_pieces(&self) -> Option<u32> {
        self.number_of_pieces
    }

    pub fn set_number_of_pieces(&mut self, n: u32) {
        self.number_of_pieces = Some(n);
    }

    pub fn max_ghost_level(&self) -> u32 {
        self.max_ghost_level
    }

    pub fn set_max_ghost_level(&mut self, level: u32) {
        self.max_ghost_level = level;
    }

    pub fn time_steps(&self) -> &[f64] {
        &self.time_steps
    }

    pub fn set_time_steps(&mut self, steps: Vec<f64>) {
        self.time_steps = steps;
    }

    pub fn time_range(&self) -> Option<(f64, f64)> {
        Some((*self.time_steps.first()?, *self.time_steps.last()?))
    }

    /// Largest available step not after `t`; the first step when `t` precedes all.
    pub fn snap_time(&self, t: f64) -> f64 {
        match self.time_steps.iter().rev().find(|&&s| s <= t) {
            Some(&s) => s,
            None => self.time_steps.first().copied().unwrap_or(t),
        }
    }

    /// The merged request recorded during the last propagation.
    pub fn requested(&self) -> Option<&UpdateRequest> {
        self.requested.as_ref()
    }

    pub(crate) fn set_requested(&mut self, request: Option<UpdateRequest>) {
        self.requested = request;
    }

    /// Check what a producer declared. Errors describe the inconsistency.
    pub fn validate(&self) -> Result<(), String> {
        if self.data_kind == Some(DataKind::Image) {
            match self.whole_extent {
                None => return Err("image output declared no whole extent".to_string()),
                Some(e) if e.is_empty() => {
                    return Err(format!("image output declared empty whole extent {}", e))
                }
                Some(e) => e.validate().map_err(|err| err.to_string())?,
            }
        }
        if self.time_steps.iter().any(|t| !t.is_finite()) {
            return Err("time steps must be finite".to_string());
        }
        if self.time_steps.windows(2).any(|w| w[0] >= w[1]) {
            return Err("time steps must be strictly increasing".to_string());
        }
        if self.number_of_pieces == Some(0) {
            return Err("a fixed piece count must be at least 1".to_string());
        }
        Ok(())
    }

    /// Fit `request` to this port.
    ///
    /// Image ports turn pieces into extents with `split` and clamp to the whole
    /// extent; poly ports keep piece requests, defaulting to the whole dataset.
    /// Times snap to the available steps.
    pub fn resolve(&self, request: &UpdateRequest, split: SplitMode) -> PipelineResult<Resolution> {
        let time = request.time.map(|t| self.snap_time(t));
        match self.data_kind {
            Some(DataKind::Image) => {
                let whole = self.whole_extent.unwrap_or(Extent::EMPTY);
                let wanted = match (request.extent, request.piece) {
                    (Some(extent), _) => extent,
                    (None, Some(p)) => compute_local_extent_with_ghosts(
                        &whole,
                        p.num_pieces,
                        p.piece,
                        p.ghost_level,
                        split,
                    )?,
                    (None, None) => whole,
                };
                let (extent, clamped_from) = if whole.contains(&wanted) {
                    (wanted, None)
                } else {
                    (whole.intersection(&wanted), Some(wanted))
                };
                Ok(Resolution {
                    request: UpdateRequest {
                        extent: Some(extent),
                        piece: None,
                        time,
                    },
                    clamped_from,
                })
            }
            Some(DataKind::Poly) => Ok(Resolution {
                request: UpdateRequest {
                    extent: None,
                    piece: Some(request.piece.unwrap_or(PieceRequest::WHOLE)),
                    time,
                },
                clamped_from: None,
            }),
            None => Ok(Resolution {
                request: UpdateRequest { time, ..*request },
                clamped_from: None,
            }),
        }
    }
}
