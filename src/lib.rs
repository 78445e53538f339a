//! # Trellis SDK
//!
//! Structural knowledge graph of a source repository.
//!
//! Trellis walks a repository once, parses every supported source file,
//! and builds a graph where functions, methods, classes, modules and
//! files are nodes and calls, definitions, inheritance and imports are
//! typed relationships. The export is deterministic JSON: two runs over
//! unchanged input are byte-identical, so downstream retrieval tooling
//! can diff and cache it.
//!
//! ## Key pieces
//!
//! - [`walk::FileEnumerator`] — single-pass cached filesystem enumeration
//! - [`parser::CallProcessor`] — call-site attribution and `CALLS` edges
//! - [`graph::JsonIngestor`] — deduplicating, thread-safe graph sink
//! - [`graph::NodeTextExtractor`] — node id back to exact source text
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use trellis::{build_graph, TrellisConfig};
//!
//! let config = TrellisConfig::default();
//! let data = build_graph(Path::new("."), &config, Path::new("trellis_graph.json")).unwrap();
//! println!("{} nodes", data.metadata.total_nodes);
//! ```

pub mod config;
pub mod deps;
pub mod error;
pub mod graph;
pub mod indexer;
pub mod parser;
pub mod walk;

// Re-exports for convenience
pub use config::TrellisConfig;
pub use error::{Result, TrellisError};
pub use graph::{
    external_dependency_imports, GraphData, GraphLoader, Ingestor, JsonIngestor, NodeLabel,
    NodeRef, NodeTextExtractor, RelKind,
};
pub use indexer::build_graph;
pub use parser::{CallProcessor, DefinitionProcessor, SupportedLanguage};
pub use walk::FileEnumerator;
