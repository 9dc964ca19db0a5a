//! Node type enumeration for dynamic node creation.
//!
//! Pipeline description files name nodes by [`NodeType`]; [`NodeFactory`]
//! turns a type plus its parameter table into a ready [`AnyNode`].

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::extent::Extent;
use crate::pipeline::node::{AnyNode, BuiltinNode};
use crate::pipeline::nodes::{
    AppendPolyDataNode, ArrayScaleNode, ExtractVoiNode, ImageToPointsNode, PieceReaderNode,
    PointCloudSourceNode, WaveletSourceNode,
};
use crate::pipeline::param::ConfigValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Types of nodes that can be instantiated from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    // Sources
    WaveletSource,
    PointCloudSource,
    PieceReader,

    // Filters
    ExtractVoi,
    ArrayScale,
    ImageToPoints,
    AppendPolyData,
}

impl NodeType {
    /// Get the display name for this node type.
    pub fn display_name(&self) -> &'static str {
        match self {
            NodeType::WaveletSource => "Wavelet Source",
            NodeType::PointCloudSource => "Point Cloud Source",
            NodeType::PieceReader => "Piece Reader",
            NodeType::ExtractVoi => "Extract VOI",
            NodeType::ArrayScale => "Array Scale",
            NodeType::ImageToPoints => "Image To Points",
            NodeType::AppendPolyData => "Append Poly Data",
        }
    }

    /// Get all available node types.
    pub fn all() -> &'static [NodeType] {
        &[
            NodeType::WaveletSource,
            NodeType::PointCloudSource,
            NodeType::PieceReader,
            NodeType::ExtractVoi,
            NodeType::ArrayScale,
            NodeType::ImageToPoints,
            NodeType::AppendPolyData,
        ]
    }

    pub fn is_source(&self) -> bool {
        matches!(
            self,
            NodeType::WaveletSource | NodeType::PointCloudSource | NodeType::PieceReader
        )
    }

    /// Get a detailed description of what this node does.
    pub fn description(&self) -> &'static str {
        match self {
            NodeType::WaveletSource =>
                "Analytic image source.\n\
                 Computes the RTData field for exactly the requested extent.\n\
                 Params: whole_extent, center, maximum, standard_deviation, frequencies, magnitudes, time_steps.",

            NodeType::PointCloudSource =>
                "Deterministic random point cloud.\n\
                 Each piece holds a contiguous range of point indices.\n\
                 Params: number_of_points, radius, center, seed.",

            NodeType::PieceReader =>
                "Reads a partitioned dataset through its manifest.\n\
                 Loads only the fragments a request touches.\n\
                 Params: manifest (required).",

            NodeType::ExtractVoi =>
                "Keeps a volume of interest of an image.\n\
                 Requests only that sub-extent upstream.\n\
                 Params: voi.",

            NodeType::ArrayScale =>
                "Multiplies a point array by a constant.\n\
                 Works on image and poly data.\n\
                 Params: factor, array.",

            NodeType::ImageToPoints =>
                "Turns image points into vertex cells.\n\
                 Point arrays are carried over.",

            NodeType::AppendPolyData =>
                "Concatenates all connected poly inputs.\n\
                 Accepts any number of connections.",
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Builds built-in nodes from a type and a parameter table.
pub struct NodeFactory;

impl NodeFactory {
    /// A node of `node_type` with defaults, then every entry of `params` applied.
    pub fn create(node_type: NodeType, params: &BTreeMap<String, ConfigValue>) -> PipelineResult<AnyNode> {
        let mut node = AnyNode::Builtin(Self::default_node(node_type, params)?);
        for (key, value) in params {
            node.set_parameter(key, value)?;
        }
        Ok(node)
    }

    fn default_node(node_type: NodeType, params: &BTreeMap<String, ConfigValue>) -> PipelineResult<BuiltinNode> {
        let node = match node_type {
            NodeType::WaveletSource => BuiltinNode::WaveletSource(WaveletSourceNode::new()),
            NodeType::PointCloudSource => {
                BuiltinNode::PointCloudSource(PointCloudSourceNode::new(1000))
            }
            NodeType::PieceReader => {
                let path = params
                    .get("manifest")
                    .and_then(ConfigValue::as_str)
                    .ok_or_else(|| PipelineError::InvalidParameter {
                        key: "manifest".to_string(),
                        message: "PieceReader needs a manifest path".to_string(),
                    })?;
                BuiltinNode::PieceReader(PieceReaderNode::new(path))
            }
            NodeType::ExtractVoi => {
                let voi = match params.get("voi") {
                    Some(v) => v.as_extent()?,
                    None => Extent::new(0, i32::MAX, 0, i32::MAX, 0, i32::MAX),
                };
                BuiltinNode::ExtractVoi(ExtractVoiNode::new(voi))
            }
            NodeType::ArrayScale => BuiltinNode::ArrayScale(ArrayScaleNode::new()),
            NodeType::ImageToPoints => BuiltinNode::ImageToPoints(ImageToPointsNode::new()),
            NodeType::AppendPolyData => BuiltinNode::AppendPolyData(AppendPolyDataNode::new()),
        };
        Ok(node)
    }
}
