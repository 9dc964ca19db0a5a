//! ImageToPointsNode: converts a structured grid into vertex cells.
//!
//! Requests flow upstream as pieces, so the image producer decides the split
//! and each poly piece holds exactly the points of one image piece.

use crate::pipeline::data::{DataKind, DataSet, PolyData};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::information::UpdateRequest;
use crate::pipeline::node::{Algorithm, ExecuteContext, InformationContext, UpdateExtentContext};
use crate::pipeline::port::{PortDescriptor, PortKind};

static PORTS: &[PortDescriptor] = &[
    PortDescriptor::input("in", PortKind::ImageData),
    PortDescriptor::output("out", PortKind::PolyData),
];

pub struct ImageToPointsNode;

impl ImageToPointsNode {
    pub fn new() -> Self {
        Self
    }
}

impl Algorithm for ImageToPointsNode {
    fn name(&self) -> &str {
        "ImageToPoints"
    }

    fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    fn request_information(&mut self, ctx: &mut InformationContext) -> PipelineResult<()> {
        let steps = ctx
            .input(0, 0)
            .map(|info| info.time_steps().to_vec())
            .unwrap_or_default();
        let out = ctx.output_mut(0);
        out.set_data_kind(DataKind::Poly);
        out.set_time_steps(steps);
        Ok(())
    }

    fn request_update_extent(&mut self, ctx: &mut UpdateExtentContext) -> PipelineResult<()> {
        let wanted = *ctx.request(0);
        ctx.set_input_requests(
            0,
            UpdateRequest {
                extent: None,
                piece: wanted.piece,
                time: wanted.time,
            },
        );
        Ok(())
    }

    fn execute(&mut self, ctx: &mut ExecuteContext) -> PipelineResult<()> {
        let input = ctx.required_input(0)?;
        let image = input.as_image().ok_or_else(|| {
            PipelineError::UnsupportedData(format!("ImageToPoints needs image data, got {}", input.kind()))
        })?;
        let cropped;
        let image = match ctx.input_request(0, 0).and_then(|r| r.extent) {
            Some(wanted) if wanted != image.extent => {
                cropped = image.extract(&wanted);
                &cropped
            }
            _ => image,
        };

        let mut poly = PolyData::new();
        poly.points = image
            .extent
            .iter_points()
            .map(|ijk| image.point_coordinates(ijk))
            .collect();
        poly.verts = (0..poly.points.len() as u32).collect();
        poly.point_data = image.point_data.clone();

        ctx.set_output(0, DataSet::Poly(poly));
        Ok(())
    }
}

impl Default for ImageToPointsNode {
    fn default() -> Self {
        Self::new()
    }
}
