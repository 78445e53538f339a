//! Read-side reports over a loaded graph.

use serde::Serialize;

use super::loader::GraphLoader;
use super::types::{keys, GraphNode, NodeLabel, RelKind};
use crate::error::{Result, TrellisError};

/// One module importing something under an external package.
#[derive(Debug, Clone, Serialize)]
pub struct ImportingModule {
    pub module: String,
    pub file_path: String,
    pub imported_entity: String,
}

/// Which modules import a given external dependency.
#[derive(Debug, Clone, Serialize)]
pub struct ExternalDependencyReport {
    pub external_package: String,
    pub version_spec: String,
    pub project_name: String,
    pub importing_modules: Vec<ImportingModule>,
    pub import_count: usize,
}

fn prop<'a>(node: &'a GraphNode, key: &str) -> &'a str {
    node.properties.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

/// Report the modules whose IMPORTS targets fall under an external
/// package.
///
/// With no `package_name`, the alphabetically first package is chosen so
/// repeated runs agree. Missing DEPENDS_ON_EXTERNAL or IMPORTS data
/// yields empty fields, not errors.
pub fn external_dependency_imports(
    loader: &GraphLoader,
    package_name: Option<&str>,
) -> Result<ExternalDependencyReport> {
    let mut packages = loader.find_nodes_by_label(NodeLabel::ExternalPackage.as_str());
    if packages.is_empty() {
        return Err(TrellisError::NoExternalPackages);
    }
    packages.sort_by_key(|p| prop(p, keys::NAME).to_string());

    let selected = match package_name {
        Some(name) => packages
            .iter()
            .find(|p| prop(p, keys::NAME) == name)
            .copied()
            .ok_or_else(|| TrellisError::PackageNotFound {
                name: name.to_string(),
                available: packages
                    .iter()
                    .map(|p| prop(p, keys::NAME))
                    .collect::<Vec<_>>()
                    .join(", "),
            })?,
        None => packages[0],
    };
    let selected_name = prop(selected, keys::NAME).to_string();

    let dependency_rel = loader
        .relationships()
        .iter()
        .find(|rel| {
            rel.rel_type == RelKind::DependsOnExternal.as_str() && rel.to_id == selected.node_id
        });

    let (version_spec, project_name) = match dependency_rel {
        Some(rel) => {
            let version = rel
                .properties
                .get(keys::VERSION_SPEC)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let project = loader
                .get_node_by_id(rel.from_id)
                .map(|n| prop(n, keys::NAME).to_string())
                .unwrap_or_default();
            (version, project)
        }
        None => (String::new(), String::new()),
    };

    let mut importing_modules = Vec::new();
    for rel in loader.relationships() {
        if rel.rel_type != RelKind::Imports.as_str() {
            continue;
        }
        let Some(imported) = loader.get_node_by_id(rel.to_id) else {
            continue;
        };
        let imported_qn = prop(imported, keys::QUALIFIED_NAME);
        if imported_qn != selected_name
            && !imported_qn.starts_with(&format!("{selected_name}."))
        {
            continue;
        }
        let Some(module) = loader.get_node_by_id(rel.from_id) else {
            continue;
        };
        importing_modules.push(ImportingModule {
            module: prop(module, keys::QUALIFIED_NAME).to_string(),
            file_path: prop(module, keys::PATH).to_string(),
            imported_entity: imported_qn.to_string(),
        });
    }
    importing_modules.sort_by(|a, b| a.module.cmp(&b.module));
    importing_modules.dedup_by(|a, b| a.module == b.module && a.imported_entity == b.imported_entity);

    Ok(ExternalDependencyReport {
        external_package: selected_name,
        version_spec,
        project_name,
        import_count: importing_modules.len(),
        importing_modules,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::{GraphData, GraphMetadata, GraphRelationship, Properties};
    use serde_json::json;

    fn node(id: u64, label: &str, props: &[(&str, &str)]) -> GraphNode {
        GraphNode {
            node_id: id,
            labels: vec![label.to_string()],
            properties: props
                .iter()
                .map(|(k, v)| (k.to_string(), json!(v)))
                .collect(),
        }
    }

    fn sample() -> GraphData {
        let mut dep_props = Properties::new();
        dep_props.insert("version_spec".to_string(), json!("^1.0"));
        GraphData {
            nodes: vec![
                node(0, "Project", &[("name", "demo")]),
                node(1, "ExternalPackage", &[("name", "requests")]),
                node(2, "ExternalPackage", &[("name", "attrs")]),
                node(
                    3,
                    "Module",
                    &[("qualified_name", "demo.app"), ("path", "app.py")],
                ),
                node(4, "Module", &[("qualified_name", "requests.sessions")]),
            ],
            relationships: vec![
                GraphRelationship {
                    from_id: 0,
                    to_id: 1,
                    rel_type: "DEPENDS_ON_EXTERNAL".to_string(),
                    properties: dep_props,
                },
                GraphRelationship {
                    from_id: 3,
                    to_id: 4,
                    rel_type: "IMPORTS".to_string(),
                    properties: Properties::new(),
                },
            ],
            metadata: GraphMetadata {
                total_nodes: 5,
                total_relationships: 2,
                exported_at: "2026-01-01T00:00:00Z".to_string(),
            },
        }
    }

    #[test]
    fn named_package_reports_importers_and_version() {
        let loader = GraphLoader::from_data(sample());
        let report = external_dependency_imports(&loader, Some("requests")).unwrap();
        assert_eq!(report.version_spec, "^1.0");
        assert_eq!(report.project_name, "demo");
        assert_eq!(report.import_count, 1);
        assert_eq!(report.importing_modules[0].module, "demo.app");
        assert_eq!(
            report.importing_modules[0].imported_entity,
            "requests.sessions"
        );
    }

    #[test]
    fn default_selection_is_alphabetical() {
        let loader = GraphLoader::from_data(sample());
        let report = external_dependency_imports(&loader, None).unwrap();
        assert_eq!(report.external_package, "attrs");
        assert_eq!(report.import_count, 0);
    }

    #[test]
    fn unknown_package_lists_available() {
        let loader = GraphLoader::from_data(sample());
        let err = external_dependency_imports(&loader, Some("numpy")).unwrap_err();
        assert!(err.to_string().contains("attrs, requests"));
    }

    #[test]
    fn empty_graph_is_an_error() {
        let loader = GraphLoader::from_data(GraphData {
            nodes: vec![],
            relationships: vec![],
            metadata: GraphMetadata {
                total_nodes: 0,
                total_relationships: 0,
                exported_at: "2026-01-01T00:00:00Z".to_string(),
            },
        });
        assert!(external_dependency_imports(&loader, None).is_err());
    }
}
