//! # vispipe: demand-driven visualization pipeline
//!
//! An executive for DAGs of visualization algorithms that computes only what a
//! consumer asks for. Structured data is addressed by extents and unstructured
//! data by pieces, so a dataset can be streamed or written in partitions that
//! reassemble exactly.
//!
//! ## Architecture
//!
//! - **Pipeline**: owns nodes and edges, runs the information, update-extent and execution passes
//! - **Translator**: deterministic extent and piece decomposition
//! - **Nodes**: built-in sources and filters behind the `Algorithm` hooks
//! - **I/O**: sequential piece writer and a manifest-driven piece reader
//! - **Config**: TOML/JSON pipeline descriptions with explicit executive settings
//!
//! ## Example
//!
//! ```no_run
//! use vispipe::pipeline::{
//!     nodes::{ExtractVoiNode, WaveletSourceNode},
//!     BuiltinNode, Extent, Pipeline,
//! };
//!
//! let mut pipeline = Pipeline::default();
//! let source = pipeline.add_node(BuiltinNode::WaveletSource(WaveletSourceNode::new()));
//! let voi = pipeline.add_node(BuiltinNode::ExtractVoi(ExtractVoiNode::new(
//!     Extent::new(0, 5, 0, 5, 0, 5),
//! )));
//! pipeline.connect_nodes(source, voi)?;
//!
//! let report = pipeline.update(voi)?;
//! assert_eq!(report.executed().len(), 2);
//! # Ok::<(), vispipe::pipeline::PipelineError>(())
//! ```

pub mod config;
pub mod error;
pub mod pipeline;

// Re-export commonly used types
pub use config::{BuiltPipeline, ExecutiveConfig, PipelineConfig};
pub use error::{Result, ResultExt, VisPipeError};
pub use pipeline::{Extent, NodeId, PieceRequest, Pipeline, PipelineError, SplitMode};
