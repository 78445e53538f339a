//! Read-side access to an exported graph.
//!
//! Loads the JSON export back into memory and builds the side indexes
//! the extractor and reports need: id lookup, label lookup, and incoming
//! relationship traversal.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use tracing::debug;

use super::types::{GraphData, GraphNode, GraphRelationship};
use crate::error::{Result, TrellisError};

/// In-memory view of one exported graph.
pub struct GraphLoader {
    data: GraphData,
    /// Edge weights index into `data.relationships`.
    graph: DiGraph<u64, usize>,
    /// Index: node_id -> petgraph index.
    id_index: HashMap<u64, NodeIndex>,
    /// Index: node_id -> position in `data.nodes`.
    node_positions: HashMap<u64, usize>,
}

impl GraphLoader {
    /// Load an exported graph from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| TrellisError::GraphLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let data: GraphData =
            serde_json::from_str(&contents).map_err(|e| TrellisError::GraphLoad {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        debug!(
            nodes = data.nodes.len(),
            relationships = data.relationships.len(),
            "graph loaded"
        );
        Ok(Self::from_data(data))
    }

    /// Build the loader from already-deserialized graph data.
    pub fn from_data(data: GraphData) -> Self {
        let mut graph = DiGraph::new();
        let mut id_index = HashMap::new();
        let mut node_positions = HashMap::new();

        for (position, node) in data.nodes.iter().enumerate() {
            let idx = graph.add_node(node.node_id);
            id_index.insert(node.node_id, idx);
            node_positions.insert(node.node_id, position);
        }
        for (position, rel) in data.relationships.iter().enumerate() {
            if let (Some(&from), Some(&to)) =
                (id_index.get(&rel.from_id), id_index.get(&rel.to_id))
            {
                graph.add_edge(from, to, position);
            }
        }

        Self {
            data,
            graph,
            id_index,
            node_positions,
        }
    }

    pub fn get_node_by_id(&self, node_id: u64) -> Option<&GraphNode> {
        self.node_positions
            .get(&node_id)
            .map(|&pos| &self.data.nodes[pos])
    }

    pub fn find_nodes_by_label(&self, label: &str) -> Vec<&GraphNode> {
        self.data
            .nodes
            .iter()
            .filter(|n| n.labels.iter().any(|l| l == label))
            .collect()
    }

    /// All relationships pointing at `node_id`.
    pub fn incoming_relationships(&self, node_id: u64) -> Vec<&GraphRelationship> {
        let Some(&idx) = self.id_index.get(&node_id) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| &self.data.relationships[*e.weight()])
            .collect()
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.data.nodes
    }

    pub fn relationships(&self) -> &[GraphRelationship] {
        &self.data.relationships
    }

    pub fn metadata(&self) -> &super::types::GraphMetadata {
        &self.data.metadata
    }
}

/// Load a graph, returning the loader.
pub fn load_graph<P: Into<PathBuf>>(path: P) -> Result<GraphLoader> {
    GraphLoader::load(&path.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::{GraphMetadata, Properties};
    use serde_json::json;

    fn node(id: u64, label: &str, qn: &str) -> GraphNode {
        let mut properties = Properties::new();
        properties.insert("qualified_name".to_string(), json!(qn));
        GraphNode {
            node_id: id,
            labels: vec![label.to_string()],
            properties,
        }
    }

    fn rel(from: u64, to: u64, kind: &str) -> GraphRelationship {
        GraphRelationship {
            from_id: from,
            to_id: to,
            rel_type: kind.to_string(),
            properties: Properties::new(),
        }
    }

    fn sample() -> GraphData {
        GraphData {
            nodes: vec![
                node(0, "Module", "p.m"),
                node(1, "Class", "p.m.C"),
                node(2, "Method", "p.m.C.run"),
            ],
            relationships: vec![rel(0, 1, "DEFINES"), rel(1, 2, "DEFINES_METHOD")],
            metadata: GraphMetadata {
                total_nodes: 3,
                total_relationships: 2,
                exported_at: "2026-01-01T00:00:00Z".to_string(),
            },
        }
    }

    #[test]
    fn id_and_label_lookup() {
        let loader = GraphLoader::from_data(sample());
        assert_eq!(
            loader.get_node_by_id(1).unwrap().properties["qualified_name"],
            json!("p.m.C")
        );
        assert_eq!(loader.find_nodes_by_label("Method").len(), 1);
        assert!(loader.get_node_by_id(99).is_none());
    }

    #[test]
    fn incoming_relationships_follow_edge_direction() {
        let loader = GraphLoader::from_data(sample());
        let incoming = loader.incoming_relationships(2);
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].rel_type, "DEFINES_METHOD");
        assert_eq!(incoming[0].from_id, 1);
        assert!(loader.incoming_relationships(0).is_empty());
    }

    #[test]
    fn load_rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(GraphLoader::load(&path).is_err());
    }
}
