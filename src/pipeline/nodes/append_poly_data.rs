//! AppendPolyDataNode: concatenates every connected poly input.

use crate::pipeline::data::{DataKind, DataSet, PolyData};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::node::{Algorithm, ExecuteContext, InformationContext};
use crate::pipeline::port::{PortDescriptor, PortKind};

static PORTS: &[PortDescriptor] = &[
    PortDescriptor::repeatable_input("in", PortKind::PolyData),
    PortDescriptor::output("out", PortKind::PolyData),
];

/// Output points are the inputs' points in connection order; cells are renumbered.
///
/// The piece request is forwarded unchanged to every input, so piece `p` of
/// the output is the concatenation of piece `p` of each input.
pub struct AppendPolyDataNode;

impl AppendPolyDataNode {
    pub fn new() -> Self {
        Self
    }
}

impl Algorithm for AppendPolyDataNode {
    fn name(&self) -> &str {
        "AppendPolyData"
    }

    fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    fn request_information(&mut self, ctx: &mut InformationContext) -> PipelineResult<()> {
        // Only times every input offers survive.
        let mut steps: Option<Vec<f64>> = None;
        for info in ctx.inputs(0) {
            let theirs = info.time_steps();
            if theirs.is_empty() {
                continue;
            }
            steps = Some(match steps {
                None => theirs.to_vec(),
                Some(ours) => ours.into_iter().filter(|t| theirs.contains(t)).collect(),
            });
        }
        let out = ctx.output_mut(0);
        out.set_data_kind(DataKind::Poly);
        out.set_time_steps(steps.unwrap_or_default());
        Ok(())
    }

    fn execute(&mut self, ctx: &mut ExecuteContext) -> PipelineResult<()> {
        let mut poly = PolyData::new();
        for (conn, input) in ctx.inputs(0).iter().enumerate() {
            let part = input.as_poly().ok_or_else(|| {
                PipelineError::UnsupportedData(format!(
                    "AppendPolyData input {} is {} data",
                    conn,
                    input.kind()
                ))
            })?;
            poly.append(part);
        }
        ctx.set_output(0, DataSet::Poly(poly));
        Ok(())
    }
}

impl Default for AppendPolyDataNode {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::information::{PortInformation, UpdateRequest};
    use std::sync::Arc;

    fn cloud(n: usize) -> Arc<DataSet> {
        let mut poly = PolyData::new();
        poly.points = vec![[0.0; 3]; n];
        poly.verts = (0..n as u32).collect();
        Arc::new(DataSet::Poly(poly))
    }

    #[test]
    fn test_concatenates_all_connections() {
        let mut ctx = ExecuteContext::new(
            vec![vec![cloud(2), cloud(3)]],
            vec![vec![UpdateRequest::whole(); 2]],
            vec![vec![PortInformation::default(); 2]],
            vec![UpdateRequest::whole()],
            vec![PortInformation::new(Some(DataKind::Poly))],
        );
        AppendPolyDataNode::new().execute(&mut ctx).unwrap();
        let out = ctx.into_outputs().remove(0).unwrap();
        assert_eq!(out.num_points(), 5);
        assert_eq!(out.as_poly().unwrap().verts, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_time_steps_are_intersected() {
        let mut a = PortInformation::new(Some(DataKind::Poly));
        a.set_time_steps(vec![0.0, 1.0, 2.0]);
        let mut b = PortInformation::new(Some(DataKind::Poly));
        b.set_time_steps(vec![1.0, 2.0, 3.0]);
        let mut ctx = InformationContext::new(
            vec![vec![a, b]],
            vec![PortInformation::new(Some(DataKind::Poly))],
        );
        AppendPolyDataNode::new().request_information(&mut ctx).unwrap();
        assert_eq!(ctx.into_outputs()[0].time_steps(), &[1.0, 2.0]);
    }
}
