//
//  extract.rs
//  Trellis
//
//  Created by hak (tharun)
//

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::warn;

use super::loader::GraphLoader;
use super::types::{keys, GraphNode, NodeLabel, RelKind};

/// Containment chains deeper than this indicate a malformed graph; the
/// walk stops with an error instead of looping forever.
const MAX_CONTAINMENT_DEPTH: usize = 64;

/// What kind of content a node can yield.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCategory {
    /// Has a line range: functions, methods, classes, interfaces,
    /// enums, type aliases, unions.
    Code,
    /// Is itself a source file: modules and loose files. The whole
    /// content is the text.
    File,
    /// Has neither: projects, packages, folders, external packages.
    Structural,
    /// Unrecognized label.
    Unknown,
}

/// Bucket a node into exactly one category by its labels.
pub fn categorize(node: &GraphNode) -> NodeCategory {
    for label in &node.labels {
        match NodeLabel::parse(label) {
            Some(
                NodeLabel::Function
                | NodeLabel::Method
                | NodeLabel::Class
                | NodeLabel::Interface
                | NodeLabel::Enum
                | NodeLabel::Type
                | NodeLabel::Union,
            ) => return NodeCategory::Code,
            Some(NodeLabel::Module | NodeLabel::File) => return NodeCategory::File,
            Some(
                NodeLabel::Project
                | NodeLabel::Package
                | NodeLabel::Folder
                | NodeLabel::ExternalPackage,
            ) => return NodeCategory::Structural,
            None => {}
        }
    }
    NodeCategory::Unknown
}

/// Why an extraction produced no text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ExtractError {
    NodeNotFound(u64),
    /// Structural nodes never carry extractable content.
    NoExtractableContent(String),
    UnknownLabel(String),
    /// No DEFINES/DEFINES_METHOD chain reached a file-category node.
    ModuleNotFound,
    /// The containment walk exceeded the depth bound.
    ContainmentLoop,
    ModuleMissingPath,
    FileUnreadable(PathBuf),
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractError::NodeNotFound(id) => write!(f, "node with id {id} not found"),
            ExtractError::NoExtractableContent(label) => {
                write!(f, "structural node type '{label}' has no extractable content")
            }
            ExtractError::UnknownLabel(label) => write!(f, "unknown node type '{label}'"),
            ExtractError::ModuleNotFound => write!(f, "could not find module/file for node"),
            ExtractError::ContainmentLoop => {
                write!(f, "containment chain exceeded {MAX_CONTAINMENT_DEPTH} hops")
            }
            ExtractError::ModuleMissingPath => write!(f, "module node has no path property"),
            ExtractError::FileUnreadable(path) => {
                write!(f, "could not read file: {}", path.display())
            }
        }
    }
}

/// Resolved source text for one node id.
#[derive(Debug, Clone)]
pub struct NodeTextResult {
    pub node_id: u64,
    pub qualified_name: Option<String>,
    pub file_path: Option<PathBuf>,
    pub start_line: Option<u64>,
    pub end_line: Option<u64>,
    pub code_chunk: Option<String>,
    pub file_content: Option<String>,
    pub error: Option<ExtractError>,
}

impl NodeTextResult {
    fn failed(node_id: u64, qualified_name: Option<String>, error: ExtractError) -> Self {
        Self {
            node_id,
            qualified_name,
            file_path: None,
            start_line: None,
            end_line: None,
            code_chunk: None,
            file_content: None,
            error: Some(error),
        }
    }
}

/// Maps node ids back to their exact source text.
///
/// Owns a private file-content cache keyed by resolved absolute path, so
/// repeated extractions against the same file cost one disk read. The
/// cache is per-instance and not synchronized; give each thread its own
/// extractor if concurrent access is needed.
pub struct NodeTextExtractor<'g> {
    loader: &'g GraphLoader,
    repo_base_path: PathBuf,
    file_cache: HashMap<PathBuf, Option<String>>,
}

impl<'g> NodeTextExtractor<'g> {
    pub fn new<P: Into<PathBuf>>(loader: &'g GraphLoader, repo_base_path: P) -> Self {
        Self {
            loader,
            repo_base_path: repo_base_path.into(),
            file_cache: HashMap::new(),
        }
    }

    /// Resolve one node id to its source text, or a typed reason why not.
    pub fn extract(&mut self, node_id: u64) -> NodeTextResult {
        let Some(node) = self.loader.get_node_by_id(node_id) else {
            return NodeTextResult::failed(node_id, None, ExtractError::NodeNotFound(node_id));
        };

        let qualified_name = node
            .properties
            .get(keys::QUALIFIED_NAME)
            .and_then(|v| v.as_str())
            .map(str::to_string);

        match categorize(node) {
            NodeCategory::Structural => {
                return NodeTextResult::failed(
                    node_id,
                    qualified_name,
                    ExtractError::NoExtractableContent(node.primary_label().to_string()),
                );
            }
            NodeCategory::Unknown => {
                return NodeTextResult::failed(
                    node_id,
                    qualified_name,
                    ExtractError::UnknownLabel(node.primary_label().to_string()),
                );
            }
            NodeCategory::Code | NodeCategory::File => {}
        }

        let owning_file = match self.find_owning_file(node) {
            Ok(n) => n,
            Err(e) => return NodeTextResult::failed(node_id, qualified_name, e),
        };

        let Some(rel_path) = owning_file
            .properties
            .get(keys::PATH)
            .and_then(|v| v.as_str())
        else {
            return NodeTextResult::failed(node_id, qualified_name, ExtractError::ModuleMissingPath);
        };
        let file_path = self.repo_base_path.join(rel_path);

        let Some(content) = self.read_cached(&file_path) else {
            return NodeTextResult::failed(
                node_id,
                qualified_name,
                ExtractError::FileUnreadable(file_path),
            );
        };

        if categorize(node) == NodeCategory::File {
            let line_count = content.lines().count() as u64;
            return NodeTextResult {
                node_id,
                qualified_name,
                file_path: Some(file_path),
                start_line: Some(1),
                end_line: Some(line_count),
                code_chunk: Some(content.clone()),
                file_content: Some(content),
                error: None,
            };
        }

        let start_line = node.properties.get(keys::START_LINE).and_then(|v| v.as_u64());
        let end_line = node.properties.get(keys::END_LINE).and_then(|v| v.as_u64());
        let code_chunk = match (start_line, end_line) {
            (Some(start), Some(end)) => Some(slice_lines(&content, start, end)),
            _ => None,
        };

        NodeTextResult {
            node_id,
            qualified_name,
            file_path: Some(file_path),
            start_line,
            end_line,
            code_chunk,
            file_content: Some(content),
            error: None,
        }
    }

    /// Apply `extract` independently per id; one failure never affects
    /// the others.
    pub fn extract_batch(&mut self, node_ids: &[u64]) -> BTreeMap<u64, NodeTextResult> {
        node_ids
            .iter()
            .map(|&id| (id, self.extract(id)))
            .collect()
    }

    /// Walk the defining-relationship chain up to the owning file node.
    ///
    /// Methods reach their class via DEFINES_METHOD; functions and
    /// classes reach their parent via DEFINES; the loop ends at the
    /// first file-category node, at arbitrary nesting depth.
    fn find_owning_file(&self, node: &'g GraphNode) -> Result<&'g GraphNode, ExtractError> {
        let mut current = node;
        for _ in 0..MAX_CONTAINMENT_DEPTH {
            match categorize(current) {
                NodeCategory::File => return Ok(current),
                NodeCategory::Code => {}
                _ => return Err(ExtractError::ModuleNotFound),
            }

            let is_method = current.labels.iter().any(|l| l == NodeLabel::Method.as_str());
            let via = if is_method {
                RelKind::DefinesMethod
            } else {
                RelKind::Defines
            };

            let parent = self
                .loader
                .incoming_relationships(current.node_id)
                .into_iter()
                .find(|rel| rel.rel_type == via.as_str())
                .and_then(|rel| self.loader.get_node_by_id(rel.from_id));

            match parent {
                Some(p) => current = p,
                None => return Err(ExtractError::ModuleNotFound),
            }
        }
        Err(ExtractError::ContainmentLoop)
    }

    fn read_cached(&mut self, path: &Path) -> Option<String> {
        if let Some(cached) = self.file_cache.get(path) {
            return cached.clone();
        }
        let content = match fs::read_to_string(path) {
            Ok(c) => Some(c),
            Err(e) => {
                warn!(path = %path.display(), "file read failed: {e}");
                None
            }
        };
        self.file_cache.insert(path.to_path_buf(), content.clone());
        content
    }
}

/// Slice 1-based inclusive line range, clamped to valid bounds.
fn slice_lines(content: &str, start_line: u64, end_line: u64) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = (start_line.max(1) as usize) - 1;
    let end = (end_line as usize).min(lines.len());
    if start >= end {
        return String::new();
    }
    lines[start..end].join("\n")
}

/// Serialized form of one extraction, one JSON object per line.
#[derive(Serialize)]
struct JsonlRecord<'a> {
    node_id: u64,
    text: Option<&'a str>,
    qualified_name: Option<&'a str>,
    file_path: Option<String>,
    start_line: Option<u64>,
    end_line: Option<u64>,
    error: Option<String>,
}

/// Render batch results as JSONL in the order the ids were requested.
pub fn results_to_jsonl(node_ids: &[u64], results: &BTreeMap<u64, NodeTextResult>) -> String {
    let lines: Vec<String> = node_ids
        .iter()
        .filter_map(|id| results.get(id))
        .map(|r| {
            let record = JsonlRecord {
                node_id: r.node_id,
                text: r.code_chunk.as_deref(),
                qualified_name: r.qualified_name.as_deref(),
                file_path: r.file_path.as_ref().map(|p| p.display().to_string()),
                start_line: r.start_line,
                end_line: r.end_line,
                error: r.error.as_ref().map(|e| e.to_string()),
            };
            serde_json::to_string(&record).expect("jsonl record serializes")
        })
        .collect();
    lines.join("\n")
}

/// Read node ids from a file: one id per line, `#` starts a comment.
pub fn read_node_ids_from_file(path: &Path) -> crate::error::Result<Vec<u64>> {
    let content = fs::read_to_string(path)?;
    let mut ids = Vec::new();
    for line in content.lines() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }
        if let Ok(id) = stripped.parse::<u64>() {
            ids.push(id);
        } else {
            warn!(line = stripped, "skipping non-numeric node id");
        }
    }
    Ok(ids)
}
