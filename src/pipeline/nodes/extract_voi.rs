//! ExtractVoiNode: volume-of-interest extraction.

use super::assign;
use crate::pipeline::data::DataSet;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::extent::Extent;
use crate::pipeline::information::UpdateRequest;
use crate::pipeline::node::{Algorithm, ExecuteContext, InformationContext, UpdateExtentContext};
use crate::pipeline::param::ConfigValue;
use crate::pipeline::port::{PortDescriptor, PortKind};

static PORTS: &[PortDescriptor] = &[
    PortDescriptor::input("in", PortKind::ImageData),
    PortDescriptor::output("out", PortKind::ImageData),
];

/// Keeps the part of the input inside `voi`.
///
/// The output whole extent is `voi` clipped to the input's whole extent; a VOI
/// that misses the input entirely is an information error for this branch.
pub struct ExtractVoiNode {
    voi: Extent,
}

impl ExtractVoiNode {
    pub fn new(voi: Extent) -> Self {
        Self { voi }
    }

    pub fn voi(&self) -> Extent {
        self.voi
    }
}

impl Algorithm for ExtractVoiNode {
    fn name(&self) -> &str {
        "ExtractVoi"
    }

    fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    fn request_information(&mut self, ctx: &mut InformationContext) -> PipelineResult<()> {
        ctx.pass_through();
        let input_whole = ctx
            .input(0, 0)
            .and_then(|info| info.whole_extent())
            .unwrap_or(Extent::EMPTY);
        ctx.output_mut(0)
            .set_whole_extent(input_whole.intersection(&self.voi));
        Ok(())
    }

    fn request_update_extent(&mut self, ctx: &mut UpdateExtentContext) -> PipelineResult<()> {
        let mut bound = self.voi;
        if let Some(whole) = ctx.input_info(0, 0).and_then(|info| info.whole_extent()) {
            bound = bound.intersection(&whole);
        }
        let wanted = ctx.request(0).extent.unwrap_or(bound);
        let request = UpdateRequest {
            extent: Some(wanted.intersection(&bound)),
            piece: None,
            time: ctx.request(0).time,
        };
        ctx.set_input_requests(0, request);
        Ok(())
    }

    fn execute(&mut self, ctx: &mut ExecuteContext) -> PipelineResult<()> {
        let input = ctx.required_input(0)?;
        let image = input.as_image().ok_or_else(|| {
            PipelineError::UnsupportedData(format!("ExtractVoi needs image data, got {}", input.kind()))
        })?;
        let target = ctx.request(0).extent.unwrap_or(self.voi).intersection(&self.voi);
        let out = image.extract(&target);
        ctx.set_output(0, DataSet::Image(out));
        Ok(())
    }

    fn set_parameter(&mut self, key: &str, value: &ConfigValue) -> PipelineResult<bool> {
        match key {
            "voi" => Ok(assign(&mut self.voi, value.as_extent()?)),
            _ => Err(PipelineError::UnknownParameter {
                node: self.name().to_string(),
                key: key.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::data::DataKind;
    use crate::pipeline::information::PortInformation;

    fn image_info(whole: Extent) -> PortInformation {
        let mut info = PortInformation::new(Some(DataKind::Image));
        info.set_whole_extent(whole);
        info
    }

    #[test]
    fn test_whole_extent_is_clipped_voi() {
        let mut node = ExtractVoiNode::new(Extent::new(5, 20, 0, 3, 0, 0));
        let mut ctx = InformationContext::new(
            vec![vec![image_info(Extent::new(0, 9, 0, 9, 0, 0))]],
            vec![PortInformation::new(Some(DataKind::Image))],
        );
        node.request_information(&mut ctx).unwrap();
        let out = ctx.into_outputs();
        assert_eq!(out[0].whole_extent(), Some(Extent::new(5, 9, 0, 3, 0, 0)));
    }

    #[test]
    fn test_disjoint_voi_yields_invalid_information() {
        let mut node = ExtractVoiNode::new(Extent::new(50, 60, 0, 0, 0, 0));
        let mut ctx = InformationContext::new(
            vec![vec![image_info(Extent::new(0, 9, 0, 9, 0, 0))]],
            vec![PortInformation::new(Some(DataKind::Image))],
        );
        node.request_information(&mut ctx).unwrap();
        assert!(ctx.into_outputs()[0].validate().is_err());
    }

    #[test]
    fn test_requests_only_voi_upstream() {
        let mut node = ExtractVoiNode::new(Extent::new(2, 4, 2, 4, 0, 0));
        let mut ctx = UpdateExtentContext::new(
            vec![UpdateRequest::for_extent(Extent::new(2, 4, 2, 4, 0, 0))],
            vec![vec![image_info(Extent::new(0, 9, 0, 9, 0, 0))]],
        );
        node.request_update_extent(&mut ctx).unwrap();
        let requests = ctx.into_input_requests();
        assert_eq!(requests[0][0].extent, Some(Extent::new(2, 4, 2, 4, 0, 0)));
    }
}
