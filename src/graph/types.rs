//
//  types.rs
//  Trellis
//
//  Created by hak (tharun)
//

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known property keys.
pub mod keys {
    pub const NAME: &str = "name";
    pub const QUALIFIED_NAME: &str = "qualified_name";
    pub const PATH: &str = "path";
    pub const START_LINE: &str = "start_line";
    pub const END_LINE: &str = "end_line";
    pub const DECORATORS: &str = "decorators";
    pub const VERSION_SPEC: &str = "version_spec";
}

/// Node properties. A `BTreeMap` keeps serialization key order stable,
/// which the byte-identical export contract depends on.
pub type Properties = BTreeMap<String, Value>;

/// The closed set of node type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeLabel {
    Project,
    Package,
    Folder,
    File,
    Module,
    Class,
    Function,
    Method,
    Interface,
    Enum,
    Type,
    Union,
    ExternalPackage,
}

impl NodeLabel {
    pub const ALL: &'static [NodeLabel] = &[
        NodeLabel::Project,
        NodeLabel::Package,
        NodeLabel::Folder,
        NodeLabel::File,
        NodeLabel::Module,
        NodeLabel::Class,
        NodeLabel::Function,
        NodeLabel::Method,
        NodeLabel::Interface,
        NodeLabel::Enum,
        NodeLabel::Type,
        NodeLabel::Union,
        NodeLabel::ExternalPackage,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeLabel::Project => "Project",
            NodeLabel::Package => "Package",
            NodeLabel::Folder => "Folder",
            NodeLabel::File => "File",
            NodeLabel::Module => "Module",
            NodeLabel::Class => "Class",
            NodeLabel::Function => "Function",
            NodeLabel::Method => "Method",
            NodeLabel::Interface => "Interface",
            NodeLabel::Enum => "Enum",
            NodeLabel::Type => "Type",
            NodeLabel::Union => "Union",
            NodeLabel::ExternalPackage => "ExternalPackage",
        }
    }

    pub fn parse(label: &str) -> Option<NodeLabel> {
        NodeLabel::ALL.iter().copied().find(|l| l.as_str() == label)
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of relationship type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelKind {
    Calls,
    Defines,
    DefinesMethod,
    Inherits,
    Imports,
    Overrides,
    DependsOnExternal,
}

impl RelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RelKind::Calls => "CALLS",
            RelKind::Defines => "DEFINES",
            RelKind::DefinesMethod => "DEFINES_METHOD",
            RelKind::Inherits => "INHERITS",
            RelKind::Imports => "IMPORTS",
            RelKind::Overrides => "OVERRIDES",
            RelKind::DependsOnExternal => "DEPENDS_ON_EXTERNAL",
        }
    }
}

impl fmt::Display for RelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a label derives its identity key.
///
/// Folders and loose files are identified by where they live; external
/// packages and the project root only have a name; everything else is a
/// symbol with a qualified name.
fn is_path_keyed(label: NodeLabel) -> bool {
    matches!(label, NodeLabel::Folder | NodeLabel::File)
}

fn is_name_keyed(label: NodeLabel) -> bool {
    matches!(label, NodeLabel::ExternalPackage | NodeLabel::Project)
}

fn prop_str<'a>(properties: &'a Properties, key: &str) -> &'a str {
    properties.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Compute the label-scoped identity key for a node.
///
/// Unrecognized labels fall back to `qualified_name`-or-`name`; this
/// never fails, so one bad property set cannot abort a batch run.
pub fn identity_key(label: &str, properties: &Properties) -> String {
    let value = match NodeLabel::parse(label) {
        Some(l) if is_path_keyed(l) => prop_str(properties, keys::PATH),
        Some(l) if is_name_keyed(l) => prop_str(properties, keys::NAME),
        Some(_) => prop_str(properties, keys::QUALIFIED_NAME),
        None => {
            let qn = prop_str(properties, keys::QUALIFIED_NAME);
            if qn.is_empty() {
                prop_str(properties, keys::NAME)
            } else {
                qn
            }
        }
    };
    format!("{label}:{value}")
}

/// Symbolic reference to a graph node, used for relationship endpoints
/// before ids exist. The target node may not be registered yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub label: String,
    pub value: String,
}

impl NodeRef {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }

    /// The `label:value` form matching `identity_key`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.label, self.value)
    }
}

/// One exported node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub node_id: u64,
    pub labels: Vec<String>,
    pub properties: Properties,
}

impl GraphNode {
    /// First label is the primary type tag.
    pub fn primary_label(&self) -> &str {
        self.labels.first().map(String::as_str).unwrap_or("")
    }
}

/// One exported relationship. Both endpoints resolved to node ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRelationship {
    pub from_id: u64,
    pub to_id: u64,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub properties: Properties,
}

/// Export metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphMetadata {
    pub total_nodes: usize,
    pub total_relationships: usize,
    pub exported_at: String,
}

/// The full export: the contract downstream tooling relies on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphData {
    pub nodes: Vec<GraphNode>,
    pub relationships: Vec<GraphRelationship>,
    pub metadata: GraphMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(pairs: &[(&str, &str)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    #[test]
    fn path_keyed_labels_use_path() {
        let p = props(&[("path", "src/a.py"), ("name", "a.py")]);
        assert_eq!(identity_key("File", &p), "File:src/a.py");
        assert_eq!(identity_key("Folder", &p), "Folder:src/a.py");
    }

    #[test]
    fn name_keyed_labels_use_name() {
        let p = props(&[("name", "serde"), ("qualified_name", "x.serde")]);
        assert_eq!(identity_key("ExternalPackage", &p), "ExternalPackage:serde");
        assert_eq!(identity_key("Project", &p), "Project:serde");
    }

    #[test]
    fn symbol_labels_use_qualified_name() {
        let p = props(&[("qualified_name", "proj.mod.f"), ("name", "f")]);
        assert_eq!(identity_key("Function", &p), "Function:proj.mod.f");
        assert_eq!(identity_key("Module", &p), "Module:proj.mod.f");
    }

    #[test]
    fn unknown_label_falls_back_without_erroring() {
        let p = props(&[("name", "thing")]);
        assert_eq!(identity_key("Widget", &p), "Widget:thing");
        let q = props(&[("qualified_name", "a.b"), ("name", "b")]);
        assert_eq!(identity_key("Widget", &q), "Widget:a.b");
    }

    #[test]
    fn node_ref_key_matches_identity_key() {
        let p = props(&[("qualified_name", "proj.mod.f")]);
        let r = NodeRef::new("Function", "proj.mod.f");
        assert_eq!(r.key(), identity_key("Function", &p));
    }
}
