//! Executive and writer settings
//!
//! These settings are handed to each pipeline or writer at construction.
//! There is no process-wide default executive: two pipelines built from
//! different settings never influence each other.
//!
//! # Main Types
//!
//! - [`ExecutiveConfig`] - Split mode, ghost level and event queue size for one pipeline
//! - [`WriterConfig`] - Which node to write, where, and which pieces this process owns

use crate::error::{Result, VisPipeError};
use crate::pipeline::{ParallelPieceWriter, SplitMode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default fragment file prefix
pub const DEFAULT_FRAGMENT_PREFIX: &str = "piece";

/// Settings for one pipeline executive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutiveConfig {
    /// How piece requests on structured outputs become extents
    #[serde(default)]
    pub split_mode: SplitMode,

    /// Ghost level applied by `update_piece`
    #[serde(default)]
    pub ghost_level: u32,

    /// Per-subscriber event queue bound (unbounded when absent)
    #[serde(default)]
    pub event_capacity: Option<usize>,
}

impl Default for ExecutiveConfig {
    fn default() -> Self {
        Self {
            split_mode: SplitMode::Block,
            ghost_level: 0,
            event_capacity: None,
        }
    }
}

impl ExecutiveConfig {
    pub fn with_split_mode(mut self, mode: SplitMode) -> Self {
        self.split_mode = mode;
        self
    }

    pub fn with_ghost_level(mut self, ghost_level: u32) -> Self {
        self.ghost_level = ghost_level;
        self
    }
}

/// The `[writer]` table of a pipeline description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Name of the node whose first output is written
    pub input: String,

    /// Directory receiving fragments and the manifest
    pub directory: PathBuf,

    /// Fragment file prefix
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Total pieces in the decomposition
    pub number_of_pieces: u32,

    /// First owned piece (default 0)
    #[serde(default)]
    pub start_piece: Option<u32>,

    /// Last owned piece, inclusive (default the last piece)
    #[serde(default)]
    pub end_piece: Option<u32>,

    #[serde(default)]
    pub ghost_level: u32,

    #[serde(default)]
    pub time: Option<f64>,
}

fn default_prefix() -> String {
    DEFAULT_FRAGMENT_PREFIX.to_string()
}

impl WriterConfig {
    /// Build the writer these settings describe
    pub fn writer(&self) -> Result<ParallelPieceWriter> {
        let start = self.start_piece.unwrap_or(0);
        let end = self
            .end_piece
            .unwrap_or(self.number_of_pieces.saturating_sub(1));
        let mut writer = ParallelPieceWriter::new(start, end, self.number_of_pieces)
            .map_err(|e| VisPipeError::Config(format!("Invalid [writer] table: {}", e)))?
            .with_ghost_level(self.ghost_level);
        if let Some(t) = self.time {
            writer = writer.with_time(t);
        }
        Ok(writer)
    }
}
