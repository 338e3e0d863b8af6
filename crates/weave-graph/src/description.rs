//! Declarative graph descriptions (TOML or JSON).

use std::path::Path;

use serde::{Deserialize, Serialize};
use weave_core::{ConfigRecord, WeaveError, WeaveResult};

use crate::graph::RenderGraph;
use crate::registry::PassRegistry;

/// A graph written down as data: stages with their options, edges and marked outputs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphDescription {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub passes: Vec<PassEntry>,
    #[serde(default)]
    pub edges: Vec<EdgeEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub pass_type: String,
    #[serde(default, skip_serializing_if = "ConfigRecord::is_empty")]
    pub options: ConfigRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeEntry {
    pub from: String,
    pub to: String,
}

impl GraphDescription {
    pub fn from_toml_str(contents: &str) -> WeaveResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_json_str(contents: &str) -> WeaveResult<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Load a description; `.json` files are read as JSON, anything else as TOML.
    pub fn load(path: &Path) -> WeaveResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&contents),
            _ => Self::from_toml_str(&contents),
        }
    }

    pub fn to_toml_string(&self) -> WeaveResult<String> {
        toml::to_string_pretty(self).map_err(|e| WeaveError::Config(e.to_string()))
    }

    pub fn to_json_string(&self) -> WeaveResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Assemble a live graph: create and add every stage, then add edges,
    /// then mark outputs, each in file order. Stops at the first error.
    pub fn build(&self, registry: &PassRegistry) -> WeaveResult<RenderGraph> {
        let mut graph = RenderGraph::new(&self.name);
        for pass in &self.passes {
            let stage = registry.create(&pass.pass_type, &pass.options)?;
            graph.add_stage(stage, &pass.name)?;
        }
        for edge in &self.edges {
            graph.add_edge(&edge.from, &edge.to)?;
        }
        for output in &self.outputs {
            graph.mark_output(output)?;
        }
        Ok(graph)
    }
}

impl RenderGraph {
    /// Export the graph as a description, with resolved options.
    pub fn to_description(&self) -> GraphDescription {
        GraphDescription {
            name: self.name().to_string(),
            outputs: self.outputs().iter().map(|o| o.to_string()).collect(),
            passes: self
                .stages()
                .map(|(name, stage)| PassEntry {
                    name: name.to_string(),
                    pass_type: stage.pass_type().to_string(),
                    options: stage.config().clone(),
                })
                .collect(),
            edges: self
                .edges()
                .iter()
                .map(|e| EdgeEntry {
                    from: e.from.to_string(),
                    to: e.to.to_string(),
                })
                .collect(),
        }
    }
}
