//! Partitioned dataset I/O: the sequential piece writer and the manifest
//! format shared with [`PieceReaderNode`](crate::pipeline::nodes::PieceReaderNode).

pub mod manifest;
pub mod writer;

pub use manifest::{fragments_for, Fragment, FragmentRecord, PieceManifest, MANIFEST_VERSION};
pub use writer::{DirectorySink, FragmentSink, MemorySink, ParallelPieceWriter, WriteSummary};
