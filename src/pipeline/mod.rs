//! Demand-driven visualization pipeline.
//!
//! Nodes are connected output port to input port into a DAG owned by a
//! [`Pipeline`]. Nothing computes until a consumer asks: an update walks the
//! nodes a target depends on in three passes (information, update-extent
//! propagation, execution) and re-executes only what is stale.
//!
//! # Architecture
//!
//! ```text
//! [WaveletSource] ──► [ExtractVoi] ──► [ArrayScale]
//!        │
//!        └──────────► [ImageToPoints] ──► [AppendPolyData] ──► ParallelPieceWriter
//!                                               ▲
//! [PointCloudSource] ───────────────────────────┘
//! ```
//!
//! # Design
//!
//! - **Enum dispatch for built-ins**: `BuiltinNode` enum, `Algorithm` trait objects for plugins.
//! - **Capabilities, not downcasts**: missing hooks get pass-through behavior.
//! - **Per-pipeline clock**: modification times never leak between pipelines.
//! - **Cached plans**: the compiler reruns only when the graph generation changes.
//! - **Typed events**: crossbeam channels keyed by `EventKind`.

pub mod clock;
pub mod compiler;
pub mod data;
pub mod error;
pub mod events;
pub mod executive;
pub mod extent;
pub mod id;
pub mod information;
pub mod io;
pub mod node;
pub mod node_type;
pub mod nodes;
pub mod param;
pub mod plan;
pub mod port;
pub mod translator;

pub use clock::{ModifiedClock, Timestamp};
pub use data::{DataArray, DataKind, DataSet, ImageData, PolyData};
pub use error::{PipelineError, PipelineResult};
pub use events::{EventKind, PipelineEvent};
pub use executive::{
    Edge, ExecuteReason, NodeOutcome, NodeState, PassPhase, Pipeline, UpdateReport,
};
pub use extent::{Extent, PieceRequest};
pub use id::{EdgeId, NodeId, PortId};
pub use information::{PortInformation, UpdateRequest};
pub use io::{
    DirectorySink, Fragment, FragmentSink, MemorySink, ParallelPieceWriter, PieceManifest,
    WriteSummary,
};
pub use node::{
    Algorithm, AnyNode, BuiltinNode, Capabilities, ExecuteContext, InformationContext,
    UpdateExtentContext,
};
pub use node_type::{NodeFactory, NodeType};
pub use param::ConfigValue;
pub use plan::{ExecutionPlan, PlanStats};
pub use port::{PortDescriptor, PortDirection, PortKind};
pub use translator::{
    compute_local_extent, compute_local_extent_with_ghosts, compute_piece_range, ExtentTranslator,
    SplitMode,
};
