//! PointCloudSourceNode: deterministic unstructured source.
//!
//! Every point is derived from `(seed, global index)`, so any piece of the
//! cloud is bit-identical to the same range cut out of the whole cloud.

use super::assign;
use crate::pipeline::data::{DataArray, DataSet, PolyData};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::extent::PieceRequest;
use crate::pipeline::node::{Algorithm, Capabilities, ExecuteContext};
use crate::pipeline::param::{invalid, ConfigValue};
use crate::pipeline::port::{PortDescriptor, PortKind};
use crate::pipeline::translator::compute_piece_range;

static PORTS: &[PortDescriptor] = &[PortDescriptor::output("out", PortKind::PolyData)];

/// Random points in a cube of half-width `radius`, one vertex cell per point.
pub struct PointCloudSourceNode {
    number_of_points: u32,
    radius: f64,
    center: [f64; 3],
    seed: u64,
}

impl PointCloudSourceNode {
    pub fn new(number_of_points: u32) -> Self {
        Self {
            number_of_points,
            radius: 0.5,
            center: [0.0; 3],
            seed: 1,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn number_of_points(&self) -> u32 {
        self.number_of_points
    }

    fn point(&self, index: u32) -> [f64; 3] {
        let mut state = self.seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        let mut coord = |axis: usize| {
            let unit = (splitmix64(&mut state) >> 11) as f64 / (1u64 << 53) as f64;
            self.center[axis] + self.radius * (2.0 * unit - 1.0)
        };
        [coord(0), coord(1), coord(2)]
    }

    /// Points `range` of the cloud with their global indices as a point array.
    fn generate(&self, piece: PieceRequest) -> PipelineResult<PolyData> {
        let range = compute_piece_range(self.number_of_points, piece.num_pieces, piece.piece)?;
        let mut poly = PolyData::new();
        poly.points = range.clone().map(|i| self.point(i)).collect();
        poly.verts = (0..poly.points.len() as u32).collect();
        poly.point_data
            .push(DataArray::scalars("PointIds", range.map(f64::from).collect()));
        Ok(poly)
    }
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

impl Algorithm for PointCloudSourceNode {
    fn name(&self) -> &str {
        "PointCloudSource"
    }

    fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::EXECUTE_ONLY
    }

    // Points carry no connectivity, so ghost levels add nothing.
    fn execute(&mut self, ctx: &mut ExecuteContext) -> PipelineResult<()> {
        let piece = ctx.request(0).piece.unwrap_or(PieceRequest::WHOLE);
        let poly = self.generate(piece)?;
        ctx.set_output(0, DataSet::Poly(poly));
        Ok(())
    }

    fn set_parameter(&mut self, key: &str, value: &ConfigValue) -> PipelineResult<bool> {
        match key {
            "number_of_points" => {
                let v = value
                    .as_int()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| invalid(key, "a non-negative integer", value))?;
                Ok(assign(&mut self.number_of_points, v))
            }
            "radius" => {
                let v = value.as_f64().ok_or_else(|| invalid(key, "a number", value))?;
                Ok(assign(&mut self.radius, v))
            }
            "center" => {
                let v = value.as_triple().ok_or_else(|| invalid(key, "three numbers", value))?;
                Ok(assign(&mut self.center, v))
            }
            "seed" => {
                let v = value
                    .as_int()
                    .ok_or_else(|| invalid(key, "an integer", value))?;
                Ok(assign(&mut self.seed, v as u64))
            }
            _ => Err(PipelineError::UnknownParameter {
                node: self.name().to_string(),
                key: key.to_string(),
            }),
        }
    }
}
