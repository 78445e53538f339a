//
//  ingest.rs
//  Trellis
//
//  Created by hak (tharun)
//

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use tracing::{debug, info};

use super::types::{
    identity_key, GraphData, GraphMetadata, GraphNode, GraphRelationship, NodeRef, Properties,
    RelKind,
};
use crate::error::Result;

/// Write interface shared by all file-processing workers.
///
/// Implementations must be safe to call from many threads at once;
/// processors only ever write through this interface and hold no graph
/// state of their own.
pub trait Ingestor: Send + Sync {
    /// Idempotently register a node. First registration wins; later
    /// property sets for the same identity key are discarded.
    fn ensure_node(&self, label: &str, properties: Properties);

    /// Buffer a relationship between two symbolic endpoints. Endpoints
    /// are resolved to ids at flush time; duplicates are preserved.
    fn ensure_relationship(
        &self,
        from: NodeRef,
        rel_type: RelKind,
        to: NodeRef,
        properties: Option<Properties>,
    );
}

struct PendingRelationship {
    from_key: String,
    to_key: String,
    rel_type: RelKind,
    properties: Properties,
}

#[derive(Default)]
struct IngestState {
    nodes: HashMap<String, GraphNode>,
    node_ids: HashMap<String, u64>,
    relationships: Vec<PendingRelationship>,
    counter: u64,
}

/// Thread-safe JSON-backed graph sink.
///
/// One coarse mutex guards the node table, the id counter and the
/// relationship buffer; dedup lookups and inserts are cheap relative to
/// per-file parse cost, so finer-grained locking buys nothing.
pub struct JsonIngestor {
    output_path: PathBuf,
    state: Mutex<IngestState>,
}

impl JsonIngestor {
    pub fn new<P: Into<PathBuf>>(output_path: P) -> Self {
        let output_path = output_path.into();
        info!(path = %output_path.display(), "json ingestor initialized");
        Self {
            output_path,
            state: Mutex::new(IngestState::default()),
        }
    }

    /// Resolve, sort and serialize the graph. Consumes the ingestor, so
    /// a second flush is impossible by construction; callers must ensure
    /// all workers have finished before calling.
    pub fn flush(self) -> Result<GraphData> {
        let state = self.state.into_inner().unwrap_or_else(|e| e.into_inner());
        info!(path = %self.output_path.display(), "flushing graph");

        // Reproducible ordering independent of registration order.
        let mut nodes: Vec<GraphNode> = state.nodes.into_values().collect();
        nodes.sort_by(|a, b| {
            (a.primary_label(), sort_name(a)).cmp(&(b.primary_label(), sort_name(b)))
        });

        let mut relationships = Vec::with_capacity(state.relationships.len());
        for rel in &state.relationships {
            let (Some(&from_id), Some(&to_id)) = (
                state.node_ids.get(&rel.from_key),
                state.node_ids.get(&rel.to_key),
            ) else {
                debug!(
                    from = %rel.from_key,
                    to = %rel.to_key,
                    "dropping relationship with unregistered endpoint"
                );
                continue;
            };
            relationships.push(GraphRelationship {
                from_id,
                to_id,
                rel_type: rel.rel_type.as_str().to_string(),
                properties: rel.properties.clone(),
            });
        }
        relationships.sort_by(|a, b| {
            (a.from_id, a.rel_type.as_str(), a.to_id).cmp(&(b.from_id, b.rel_type.as_str(), b.to_id))
        });

        let metadata = GraphMetadata {
            total_nodes: nodes.len(),
            total_relationships: relationships.len(),
            exported_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        };

        let data = GraphData {
            nodes,
            relationships,
            metadata,
        };

        if let Some(parent) = self.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Write atomically (write to temp, then rename).
        let temp_path = self.output_path.with_extension("json.tmp");
        let mut file = File::create(&temp_path)?;
        file.write_all(serde_json::to_string_pretty(&data)?.as_bytes())?;
        file.sync_all()?;
        fs::rename(&temp_path, &self.output_path)?;

        info!(
            nodes = data.metadata.total_nodes,
            relationships = data.metadata.total_relationships,
            path = %self.output_path.display(),
            "graph flushed"
        );
        Ok(data)
    }
}

fn sort_name(node: &GraphNode) -> &str {
    for key in [
        super::types::keys::QUALIFIED_NAME,
        super::types::keys::NAME,
        super::types::keys::PATH,
    ] {
        if let Some(value) = node.properties.get(key).and_then(|v| v.as_str()) {
            if !value.is_empty() {
                return value;
            }
        }
    }
    ""
}

impl Ingestor for JsonIngestor {
    fn ensure_node(&self, label: &str, properties: Properties) {
        let node_key = identity_key(label, &properties);

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.nodes.contains_key(&node_key) {
            return;
        }

        let node_id = state.counter;
        state.counter += 1;
        state.node_ids.insert(node_key.clone(), node_id);

        let properties: Properties = properties
            .into_iter()
            .filter(|(_, v)| !v.is_null())
            .collect();

        state.nodes.insert(
            node_key,
            GraphNode {
                node_id,
                labels: vec![label.to_string()],
                properties,
            },
        );
    }

    fn ensure_relationship(
        &self,
        from: NodeRef,
        rel_type: RelKind,
        to: NodeRef,
        properties: Option<Properties>,
    ) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.relationships.push(PendingRelationship {
            from_key: from.key(),
            to_key: to.key(),
            rel_type,
            properties: properties.unwrap_or_default(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(pairs: &[(&str, serde_json::Value)]) -> Properties {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn temp_output() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        (dir, path)
    }

    #[test]
    fn first_registration_wins() {
        let (_dir, path) = temp_output();
        let ingestor = JsonIngestor::new(&path);
        ingestor.ensure_node(
            "Function",
            props(&[
                ("qualified_name", json!("p.m.f")),
                ("start_line", json!(1)),
            ]),
        );
        ingestor.ensure_node(
            "Function",
            props(&[
                ("qualified_name", json!("p.m.f")),
                ("start_line", json!(99)),
            ]),
        );

        let data = ingestor.flush().unwrap();
        assert_eq!(data.nodes.len(), 1);
        assert_eq!(data.nodes[0].properties["start_line"], json!(1));
    }

    #[test]
    fn ids_are_sequential_from_zero() {
        let (_dir, path) = temp_output();
        let ingestor = JsonIngestor::new(&path);
        ingestor.ensure_node("Function", props(&[("qualified_name", json!("p.a"))]));
        ingestor.ensure_node("Function", props(&[("qualified_name", json!("p.b"))]));
        ingestor.ensure_node("Function", props(&[("qualified_name", json!("p.a"))]));

        let data = ingestor.flush().unwrap();
        let mut ids: Vec<u64> = data.nodes.iter().map(|n| n.node_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn null_properties_are_dropped() {
        let (_dir, path) = temp_output();
        let ingestor = JsonIngestor::new(&path);
        ingestor.ensure_node(
            "Function",
            props(&[
                ("qualified_name", json!("p.f")),
                ("decorators", json!(null)),
            ]),
        );
        let data = ingestor.flush().unwrap();
        assert!(!data.nodes[0].properties.contains_key("decorators"));
    }

    #[test]
    fn dangling_relationships_are_dropped_and_flush_succeeds() {
        let (_dir, path) = temp_output();
        let ingestor = JsonIngestor::new(&path);
        ingestor.ensure_node("Function", props(&[("qualified_name", json!("p.f"))]));
        ingestor.ensure_relationship(
            NodeRef::new("Function", "p.f"),
            RelKind::Calls,
            NodeRef::new("Function", "p.never_registered"),
            None,
        );

        let data = ingestor.flush().unwrap();
        assert!(data.relationships.is_empty());
        assert_eq!(data.metadata.total_relationships, 0);
    }

    #[test]
    fn duplicate_relationships_are_preserved() {
        let (_dir, path) = temp_output();
        let ingestor = JsonIngestor::new(&path);
        ingestor.ensure_node("Function", props(&[("qualified_name", json!("p.a"))]));
        ingestor.ensure_node("Function", props(&[("qualified_name", json!("p.b"))]));
        for _ in 0..2 {
            ingestor.ensure_relationship(
                NodeRef::new("Function", "p.a"),
                RelKind::Calls,
                NodeRef::new("Function", "p.b"),
                None,
            );
        }
        let data = ingestor.flush().unwrap();
        assert_eq!(data.relationships.len(), 2);
    }

    #[test]
    fn flush_output_is_sorted_regardless_of_registration_order() {
        let (_dir, path) = temp_output();
        let ingestor = JsonIngestor::new(&path);
        ingestor.ensure_node("Module", props(&[("qualified_name", json!("p.z"))]));
        ingestor.ensure_node("Function", props(&[("qualified_name", json!("p.z.f"))]));
        ingestor.ensure_node("Function", props(&[("qualified_name", json!("p.a.f"))]));
        ingestor.ensure_node("Folder", props(&[("path", json!("src"))]));

        let data = ingestor.flush().unwrap();
        let order: Vec<(String, String)> = data
            .nodes
            .iter()
            .map(|n| {
                let name = n
                    .properties
                    .get("qualified_name")
                    .or_else(|| n.properties.get("path"))
                    .and_then(|v| v.as_str())
                    .unwrap()
                    .to_string();
                (n.primary_label().to_string(), name)
            })
            .collect();
        assert_eq!(
            order,
            vec![
                ("Folder".to_string(), "src".to_string()),
                ("Function".to_string(), "p.a.f".to_string()),
                ("Function".to_string(), "p.z.f".to_string()),
                ("Module".to_string(), "p.z".to_string()),
            ]
        );
    }

    #[test]
    fn concurrent_writers_do_not_lose_nodes() {
        use rayon::prelude::*;

        let (_dir, path) = temp_output();
        let ingestor = JsonIngestor::new(&path);
        (0..64).into_par_iter().for_each(|i| {
            ingestor.ensure_node(
                "Function",
                props(&[("qualified_name", json!(format!("p.f{i}")))]),
            );
            ingestor.ensure_relationship(
                NodeRef::new("Function", format!("p.f{i}")),
                RelKind::Calls,
                NodeRef::new("Function", "p.f0"),
                None,
            );
        });

        let data = ingestor.flush().unwrap();
        assert_eq!(data.nodes.len(), 64);
        assert_eq!(data.relationships.len(), 64);
    }
}
