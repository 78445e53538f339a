//! Graph module — the structural backbone of Trellis.
//!
//! Provides the node/relationship data model, the thread-safe ingestion
//! sink with its deterministic JSON export, the read-side loader, and
//! the node-to-source-text extractor.

pub mod extract;
pub mod ingest;
pub mod loader;
pub mod query;
pub mod types;

pub use extract::{categorize, ExtractError, NodeCategory, NodeTextExtractor, NodeTextResult};
pub use ingest::{Ingestor, JsonIngestor};
pub use loader::{load_graph, GraphLoader};
pub use query::{external_dependency_imports, ExternalDependencyReport, ImportingModule};
pub use types::{
    identity_key, GraphData, GraphMetadata, GraphNode, GraphRelationship, NodeLabel, NodeRef,
    Properties, RelKind,
};
