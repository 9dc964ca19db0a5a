//! Configuration module for vispipe
//!
//! This module handles pipeline description files:
//! - `[executive]` settings passed to the pipeline at construction
//! - `[[nodes]]` with a unique name, a [`NodeType`] and a parameter table
//! - `[[connections]]` between `"node[:port]"` endpoints
//! - an optional `[writer]` table for partitioned output
//!
//! Files ending in `.json` are read as JSON; everything else as TOML.
//!
//! # Example
//!
//! ```toml
//! [executive]
//! split_mode = "z_slab"
//!
//! [[nodes]]
//! name = "wavelet"
//! type = "WaveletSource"
//! params = { whole_extent = [0, 31, 0, 31, 0, 31] }
//!
//! [[nodes]]
//! name = "points"
//! type = "ImageToPoints"
//!
//! [[connections]]
//! from = "wavelet"
//! to = "points"
//!
//! [writer]
//! input = "points"
//! directory = "out"
//! number_of_pieces = 4
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{Result, ResultExt, VisPipeError};
use crate::pipeline::{ConfigValue, NodeFactory, NodeId, NodeType, Pipeline};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// One `[[nodes]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub params: BTreeMap<String, ConfigValue>,
}

/// One `[[connections]]` entry. Endpoints are `"node"` or `"node:port"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub from: String,
    pub to: String,
}

/// A complete pipeline description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub executive: ExecutiveConfig,
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writer: Option<WriterConfig>,
}

/// A pipeline built from a description, with its node names
pub struct BuiltPipeline {
    pub pipeline: Pipeline,
    pub names: BTreeMap<String, NodeId>,
}

impl BuiltPipeline {
    pub fn node(&self, name: &str) -> Result<NodeId> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| VisPipeError::Config(format!("Unknown node '{}'", name)))
    }
}

/// Split `"name:port"` into its parts; the port defaults to 0.
fn parse_endpoint(endpoint: &str) -> Result<(&str, u16)> {
    match endpoint.rsplit_once(':') {
        Some((name, port)) => {
            let port = port.trim().parse::<u16>().map_err(|_| {
                VisPipeError::Config(format!("Invalid port in endpoint '{}'", endpoint))
            })?;
            Ok((name.trim(), port))
        }
        None => Ok((endpoint.trim(), 0)),
    }
}

impl PipelineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| VisPipeError::Config(format!("Failed to parse pipeline description: {}", e)))
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| VisPipeError::Config(format!("Failed to parse pipeline description: {}", e)))
    }

    /// Load a pipeline description from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            VisPipeError::Config(format!("Failed to read pipeline file {:?}: {}", path, e))
        })?;
        let config = if is_json(path) {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
        .with_context(|| format!("Loading {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Save the description, as JSON or TOML depending on the extension
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                VisPipeError::Config(format!("Failed to create directory {:?}: {}", parent, e))
            })?;
        }

        let content = if is_json(path) {
            serde_json::to_string_pretty(self)
                .map_err(|e| VisPipeError::Config(format!("Failed to serialize pipeline: {}", e)))?
        } else {
            toml::to_string_pretty(self)
                .map_err(|e| VisPipeError::Config(format!("Failed to serialize pipeline: {}", e)))?
        };

        std::fs::write(path, content).map_err(|e| {
            VisPipeError::Config(format!("Failed to write pipeline file {:?}: {}", path, e))
        })
    }

    /// Check names and endpoints without building anything
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.name.is_empty() {
                return Err(VisPipeError::Config("Node with empty name".to_string()));
            }
            if !seen.insert(node.name.as_str()) {
                return Err(VisPipeError::Config(format!(
                    "Duplicate node name '{}'",
                    node.name
                )));
            }
        }
        let known = |endpoint: &str| -> Result<()> {
            let (name, _) = parse_endpoint(endpoint)?;
            if seen.contains(name) {
                Ok(())
            } else {
                Err(VisPipeError::Config(format!(
                    "Connection endpoint '{}' names no node",
                    endpoint
                )))
            }
        };
        for conn in &self.connections {
            known(&conn.from)?;
            known(&conn.to)?;
        }
        if let Some(writer) = &self.writer {
            known(&writer.input)?;
            writer.writer()?;
        }
        Ok(())
    }

    /// Build the pipeline: nodes in file order, then connections
    pub fn build(&self) -> Result<BuiltPipeline> {
        self.validate()?;
        let mut pipeline = Pipeline::new(self.executive.clone());
        let mut names = BTreeMap::new();

        for node in &self.nodes {
            let built = NodeFactory::create(node.node_type, &node.params)
                .with_context(|| format!("Creating node '{}'", node.name))?;
            let id = pipeline.add_node(built);
            tracing::debug!("Built node '{}' ({}) as {}", node.name, node.node_type, id);
            names.insert(node.name.clone(), id);
        }

        let lookup = |names: &BTreeMap<String, NodeId>, name: &str| -> Result<NodeId> {
            names
                .get(name)
                .copied()
                .ok_or_else(|| VisPipeError::Config(format!("Unknown node '{}'", name)))
        };
        for conn in &self.connections {
            let (from, from_port) = parse_endpoint(&conn.from)?;
            let (to, to_port) = parse_endpoint(&conn.to)?;
            let from_id = lookup(&names, from)?;
            let to_id = lookup(&names, to)?;
            pipeline
                .connect(from_id.output(from_port), to_id.input(to_port))
                .with_context(|| format!("Connecting '{}' to '{}'", conn.from, conn.to))?;
        }

        tracing::info!(
            "Built pipeline with {} nodes and {} connections",
            self.nodes.len(),
            self.connections.len()
        );
        Ok(BuiltPipeline { pipeline, names })
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}
