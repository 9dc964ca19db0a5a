//! Node abstraction for the pipeline.
//!
//! Two-layer design:
//! - **`Algorithm` trait**: the three pipeline hooks (information, update
//!   extent, execute) plus parameters. User-defined nodes implement it.
//! - **`BuiltinNode` enum**: for all built-in nodes. The compiler can inline
//!   match arms, eliminating dynamic dispatch for the common nodes.
//!
//! `AnyNode` wraps either variant so the pipeline can handle both uniformly.
//! The executive only ever talks to a node through these hooks and the
//! [`Capabilities`] it declares; it never inspects which variant it holds.

use crate::pipeline::data::{DataKind, DataSet};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::information::{PortInformation, UpdateRequest};
use crate::pipeline::param::ConfigValue;
use crate::pipeline::port::PortDescriptor;
use std::sync::Arc;

/// Which hooks a node actually implements. Missing ones get pass-through behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Declares metadata in the information pass.
    pub information: bool,
    /// Rewrites upstream requests during update-extent propagation.
    pub update_extent: bool,
    /// Computes outputs; without it the first input is forwarded unchanged.
    pub executes: bool,
}

impl Capabilities {
    pub const ALL: Capabilities = Capabilities {
        information: true,
        update_extent: true,
        executes: true,
    };

    pub const EXECUTE_ONLY: Capabilities = Capabilities {
        information: false,
        update_extent: false,
        executes: true,
    };
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::ALL
    }
}

/// Context for the information pass.
pub struct InformationContext {
    inputs: Vec<Vec<PortInformation>>,
    outputs: Vec<PortInformation>,
}

impl InformationContext {
    pub fn new(inputs: Vec<Vec<PortInformation>>, outputs: Vec<PortInformation>) -> Self {
        Self { inputs, outputs }
    }

    /// Information of connection `conn` on input port `port`.
    pub fn input(&self, port: usize, conn: usize) -> Option<&PortInformation> {
        self.inputs.get(port)?.get(conn)
    }

    pub fn inputs(&self, port: usize) -> &[PortInformation] {
        self.inputs.get(port).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn output_mut(&mut self, port: usize) -> &mut PortInformation {
        &mut self.outputs[port]
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    /// Copy the first input's metadata onto every output, keeping declared output kinds.
    pub fn pass_through(&mut self) {
        let Some(source) = self.input(0, 0).cloned() else {
            return;
        };
        for out in &mut self.outputs {
            let kind = out.data_kind().or(source.data_kind());
            let mut copy = source.clone();
            copy.set_requested(None);
            if let Some(kind) = kind {
                copy.set_data_kind(kind);
            }
            *out = copy;
        }
    }

    pub(crate) fn into_outputs(self) -> Vec<PortInformation> {
        self.outputs
    }
}

/// Context for update-extent propagation.
///
/// `requests` holds what downstream wants from this node (one entry per
/// output port, or a single entry for a node without outputs). The hook
/// fills `input_requests`, which start out as copies of the first request.
pub struct UpdateExtentContext {
    requests: Vec<UpdateRequest>,
    input_info: Vec<Vec<PortInformation>>,
    input_requests: Vec<Vec<UpdateRequest>>,
}

impl UpdateExtentContext {
    pub fn new(requests: Vec<UpdateRequest>, input_info: Vec<Vec<PortInformation>>) -> Self {
        let mut ctx = Self {
            requests,
            input_requests: input_info.iter().map(|c| vec![UpdateRequest::whole(); c.len()]).collect(),
            input_info,
        };
        ctx.pass_through();
        ctx
    }

    pub fn request(&self, port: usize) -> &UpdateRequest {
        &self.requests[port]
    }

    pub fn requests(&self) -> &[UpdateRequest] {
        &self.requests
    }

    pub fn input_info(&self, port: usize, conn: usize) -> Option<&PortInformation> {
        self.input_info.get(port)?.get(conn)
    }

    pub fn num_connections(&self, port: usize) -> usize {
        self.input_info.get(port).map_or(0, Vec::len)
    }

    pub fn set_input_request(&mut self, port: usize, conn: usize, request: UpdateRequest) {
        self.input_requests[port][conn] = request;
    }

    /// Same request for every connection of `port`.
    pub fn set_input_requests(&mut self, port: usize, request: UpdateRequest) {
        for slot in &mut self.input_requests[port] {
            *slot = request;
        }
    }

    /// Forward the first request to every input connection.
    pub fn pass_through(&mut self) {
        let request = self.requests.first().copied().unwrap_or_default();
        for port in &mut self.input_requests {
            for slot in port.iter_mut() {
                *slot = request;
            }
        }
    }

    pub(crate) fn into_input_requests(self) -> Vec<Vec<UpdateRequest>> {
        self.input_requests
    }
}

/// Context for the execution pass.
///
/// Inputs are shared read-only handles to upstream outputs; `input_request`
/// reports what this node asked for, which may be smaller than what it got.
pub struct ExecuteContext {
    inputs: Vec<Vec<Arc<DataSet>>>,
    input_requests: Vec<Vec<UpdateRequest>>,
    input_info: Vec<Vec<PortInformation>>,
    requests: Vec<UpdateRequest>,
    output_info: Vec<PortInformation>,
    outputs: Vec<Option<Arc<DataSet>>>,
}

impl ExecuteContext {
    pub fn new(
        inputs: Vec<Vec<Arc<DataSet>>>,
        input_requests: Vec<Vec<UpdateRequest>>,
        input_info: Vec<Vec<PortInformation>>,
        requests: Vec<UpdateRequest>,
        output_info: Vec<PortInformation>,
    ) -> Self {
        let outputs = vec![None; output_info.len()];
        Self {
            inputs,
            input_requests,
            input_info,
            requests,
            output_info,
            outputs,
        }
    }

    pub fn input(&self, port: usize, conn: usize) -> Option<&DataSet> {
        self.inputs.get(port)?.get(conn).map(Arc::as_ref)
    }

    pub fn inputs(&self, port: usize) -> &[Arc<DataSet>] {
        self.inputs.get(port).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The first connection of `port`, or an error naming the missing input.
    pub fn required_input(&self, port: usize) -> PipelineResult<&DataSet> {
        self.input(port, 0).ok_or_else(|| {
            PipelineError::InvalidEdge(format!("input port {} has no connection", port))
        })
    }

    pub fn input_request(&self, port: usize, conn: usize) -> Option<&UpdateRequest> {
        self.input_requests.get(port)?.get(conn)
    }

    pub fn input_info(&self, port: usize, conn: usize) -> Option<&PortInformation> {
        self.input_info.get(port)?.get(conn)
    }

    /// What downstream wants from output `port` (or the node's own request when it has no outputs).
    pub fn request(&self, port: usize) -> UpdateRequest {
        self.requests.get(port).copied().unwrap_or_default()
    }

    pub fn output_info(&self, port: usize) -> &PortInformation {
        &self.output_info[port]
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    pub fn set_output(&mut self, port: usize, data: DataSet) {
        self.outputs[port] = Some(Arc::new(data));
    }

    /// Forward the first input to every output without copying.
    pub fn pass_through(&mut self) -> PipelineResult<()> {
        let Some(first) = self.inputs.first().and_then(|c| c.first()).cloned() else {
            return Err(PipelineError::InvalidEdge(
                "pass-through node has no input".to_string(),
            ));
        };
        for out in &mut self.outputs {
            *out = Some(first.clone());
        }
        Ok(())
    }

    /// Expected kind of output `port`, falling back to the first input's kind.
    pub fn output_kind(&self, port: usize) -> Option<DataKind> {
        self.output_info
            .get(port)
            .and_then(PortInformation::data_kind)
            .or_else(|| self.input(0, 0).map(DataSet::kind))
    }

    pub(crate) fn into_outputs(self) -> Vec<Option<Arc<DataSet>>> {
        self.outputs
    }
}

/// Trait for pluggable/user-defined nodes.
///
/// A node must be pure with respect to its parameters: the same parameters and
/// the same upstream outputs must produce identical outputs. Output caching
/// relies on it.
pub trait Algorithm: Send {
    /// Human-readable name of this node.
    fn name(&self) -> &str;

    /// Port descriptors for this node.
    fn ports(&self) -> &[PortDescriptor];

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    /// Declare what this node can produce.
    fn request_information(&mut self, ctx: &mut InformationContext) -> PipelineResult<()> {
        ctx.pass_through();
        Ok(())
    }

    /// Translate downstream requests into requests on the inputs.
    fn request_update_extent(&mut self, ctx: &mut UpdateExtentContext) -> PipelineResult<()> {
        ctx.pass_through();
        Ok(())
    }

    /// Produce every output for the current requests.
    fn execute(&mut self, ctx: &mut ExecuteContext) -> PipelineResult<()>;

    /// Apply a parameter. Returns whether the value actually changed.
    fn set_parameter(&mut self, key: &str, _value: &ConfigValue) -> PipelineResult<bool> {
        Err(PipelineError::UnknownParameter {
            node: self.name().to_string(),
            key: key.to_string(),
        })
    }
}

// Forward-declare built-in node types (defined in nodes/ submodule).
use crate::pipeline::nodes::{
    AppendPolyDataNode, ArrayScaleNode, ExtractVoiNode, ImageToPointsNode, PieceReaderNode,
    PointCloudSourceNode, WaveletSourceNode,
};

/// Enum dispatch for built-in nodes.
pub enum BuiltinNode {
    WaveletSource(WaveletSourceNode),
    PointCloudSource(PointCloudSourceNode),
    ExtractVoi(ExtractVoiNode),
    ArrayScale(ArrayScaleNode),
    ImageToPoints(ImageToPointsNode),
    AppendPolyData(AppendPolyDataNode),
    PieceReader(PieceReaderNode),
}

impl BuiltinNode {
    pub fn name(&self) -> &str {
        match self {
            BuiltinNode::WaveletSource(n) => n.name(),
            BuiltinNode::PointCloudSource(n) => n.name(),
            BuiltinNode::ExtractVoi(n) => n.name(),
            BuiltinNode::ArrayScale(n) => n.name(),
            BuiltinNode::ImageToPoints(n) => n.name(),
            BuiltinNode::AppendPolyData(n) => n.name(),
            BuiltinNode::PieceReader(n) => n.name(),
        }
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        match self {
            BuiltinNode::WaveletSource(n) => n.ports(),
            BuiltinNode::PointCloudSource(n) => n.ports(),
            BuiltinNode::ExtractVoi(n) => n.ports(),
            BuiltinNode::ArrayScale(n) => n.ports(),
            BuiltinNode::ImageToPoints(n) => n.ports(),
            BuiltinNode::AppendPolyData(n) => n.ports(),
            BuiltinNode::PieceReader(n) => n.ports(),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        match self {
            BuiltinNode::WaveletSource(n) => n.capabilities(),
            BuiltinNode::PointCloudSource(n) => n.capabilities(),
            BuiltinNode::ExtractVoi(n) => n.capabilities(),
            BuiltinNode::ArrayScale(n) => n.capabilities(),
            BuiltinNode::ImageToPoints(n) => n.capabilities(),
            BuiltinNode::AppendPolyData(n) => n.capabilities(),
            BuiltinNode::PieceReader(n) => n.capabilities(),
        }
    }

    pub fn request_information(&mut self, ctx: &mut InformationContext) -> PipelineResult<()> {
        match self {
            BuiltinNode::WaveletSource(n) => n.request_information(ctx),
            BuiltinNode::PointCloudSource(n) => n.request_information(ctx),
            BuiltinNode::ExtractVoi(n) => n.request_information(ctx),
            BuiltinNode::ArrayScale(n) => n.request_information(ctx),
            BuiltinNode::ImageToPoints(n) => n.request_information(ctx),
            BuiltinNode::AppendPolyData(n) => n.request_information(ctx),
            BuiltinNode::PieceReader(n) => n.request_information(ctx),
        }
    }

    pub fn request_update_extent(&mut self, ctx: &mut UpdateExtentContext) -> PipelineResult<()> {
        match self {
            BuiltinNode::WaveletSource(n) => n.request_update_extent(ctx),
            BuiltinNode::PointCloudSource(n) => n.request_update_extent(ctx),
            BuiltinNode::ExtractVoi(n) => n.request_update_extent(ctx),
            BuiltinNode::ArrayScale(n) => n.request_update_extent(ctx),
            BuiltinNode::ImageToPoints(n) => n.request_update_extent(ctx),
            BuiltinNode::AppendPolyData(n) => n.request_update_extent(ctx),
            BuiltinNode::PieceReader(n) => n.request_update_extent(ctx),
        }
    }

    pub fn execute(&mut self, ctx: &mut ExecuteContext) -> PipelineResult<()> {
        match self {
            BuiltinNode::WaveletSource(n) => n.execute(ctx),
            BuiltinNode::PointCloudSource(n) => n.execute(ctx),
            BuiltinNode::ExtractVoi(n) => n.execute(ctx),
            BuiltinNode::ArrayScale(n) => n.execute(ctx),
            BuiltinNode::ImageToPoints(n) => n.execute(ctx),
            BuiltinNode::AppendPolyData(n) => n.execute(ctx),
            BuiltinNode::PieceReader(n) => n.execute(ctx),
        }
    }

    pub fn set_parameter(&mut self, key: &str, value: &ConfigValue) -> PipelineResult<bool> {
        match self {
            BuiltinNode::WaveletSource(n) => n.set_parameter(key, value),
            BuiltinNode::PointCloudSource(n) => n.set_parameter(key, value),
            BuiltinNode::ExtractVoi(n) => n.set_parameter(key, value),
            BuiltinNode::ArrayScale(n) => n.set_parameter(key, value),
            BuiltinNode::ImageToPoints(n) => n.set_parameter(key, value),
            BuiltinNode::AppendPolyData(n) => n.set_parameter(key, value),
            BuiltinNode::PieceReader(n) => n.set_parameter(key, value),
        }
    }
}

/// Wrapper that holds either a built-in node (enum dispatch) or a plugin (trait object).
pub enum AnyNode {
    Builtin(BuiltinNode),
    Plugin(Box<dyn Algorithm>),
}

impl AnyNode {
    pub fn plugin(node: impl Algorithm + 'static) -> Self {
        AnyNode::Plugin(Box::new(node))
    }

    pub fn name(&self) -> &str {
        match self {
            AnyNode::Builtin(n) => n.name(),
            AnyNode::Plugin(n) => n.name(),
        }
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        match self {
            AnyNode::Builtin(n) => n.ports(),
            AnyNode::Plugin(n) => n.ports(),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        match self {
            AnyNode::Builtin(n) => n.capabilities(),
            AnyNode::Plugin(n) => n.capabilities(),
        }
    }

    pub fn request_information(&mut self, ctx: &mut InformationContext) -> PipelineResult<()> {
        match self {
            AnyNode::Builtin(n) => n.request_information(ctx),
            AnyNode::Plugin(n) => n.request_information(ctx),
        }
    }

    pub fn request_update_extent(&mut self, ctx: &mut UpdateExtentContext) -> PipelineResult<()> {
        match self {
            AnyNode::Builtin(n) => n.request_update_extent(ctx),
            AnyNode::Plugin(n) => n.request_update_extent(ctx),
        }
    }

    pub fn execute(&mut self, ctx: &mut ExecuteContext) -> PipelineResult<()> {
        match self {
            AnyNode::Builtin(n) => n.execute(ctx),
            AnyNode::Plugin(n) => n.execute(ctx),
        }
    }

    pub fn set_parameter(&mut self, key: &str, value: &ConfigValue) -> PipelineResult<bool> {
        match self {
            AnyNode::Builtin(n) => n.set_parameter(key, value),
            AnyNode::Plugin(n) => n.set_parameter(key, value),
        }
    }
}

impl From<BuiltinNode> for AnyNode {
    fn from(node: BuiltinNode) -> Self {
        AnyNode::Builtin(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extent::Extent;

    fn image_info(whole: Extent) -> PortInformation {
        let mut info = PortInformation::new(Some(DataKind::Image));
        info.set_whole_extent(whole);
        info
    }

    #[test]
    fn test_information_pass_through_keeps_output_kind() {
        let whole = Extent::new(0, 3, 0, 3, 0, 0);
        let mut ctx = InformationContext::new(
            vec![vec![image_info(whole)]],
            vec![PortInformation::new(Some(DataKind::Poly))],
        );
        ctx.pass_through();
        let out = ctx.into_outputs();
        assert_eq!(out[0].data_kind(), Some(DataKind::Poly));
        assert_eq!(out[0].whole_extent(), Some(whole));
    }

    #[test]
    fn test_update_extent_defaults_to_first_request() {
        let req = UpdateRequest::for_extent(Extent::new(0, 1, 0, 1, 0, 0));
        let ctx = UpdateExtentContext::new(
            vec![req],
            vec![vec![PortInformation::default(), PortInformation::default()]],
        );
        let inputs = ctx.into_input_requests();
        assert_eq!(inputs[0], vec![req, req]);
    }

    #[test]
    fn test_execute_pass_through_shares_input() {
        let data = Arc::new(DataSet::empty(DataKind::Poly));
        let mut ctx = ExecuteContext::new(
            vec![vec![data.clone()]],
            vec![vec![UpdateRequest::whole()]],
            vec![vec![PortInformation::default()]],
            vec![UpdateRequest::whole()],
            vec![PortInformation::default()],
        );
        ctx.pass_through().unwrap();
        let outputs = ctx.into_outputs();
        let out = outputs[0].as_ref().unwrap();
        assert!(Arc::ptr_eq(out, &data));
    }

    #[test]
    fn test_execute_pass_through_requires_input() {
        let mut ctx = ExecuteContext::new(
            vec![],
            vec![],
            vec![],
            vec![UpdateRequest::whole()],
            vec![PortInformation::default()],
        );
        assert!(ctx.pass_through().is_err());
    }
}
