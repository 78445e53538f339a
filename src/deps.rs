//! Manifest scan: external packages the project depends on.
//!
//! Reads the first supported manifest at the repository root and
//! registers `ExternalPackage` nodes plus `DEPENDS_ON_EXTERNAL` edges
//! from the project node, each carrying the declared version spec.

use std::fs;
use std::path::Path;

use serde_json::json;
use tracing::debug;

use crate::error::{Result, TrellisError};
use crate::graph::ingest::Ingestor;
use crate::graph::types::{keys, NodeLabel, NodeRef, Properties, RelKind};

/// One declared dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestDependency {
    pub name: String,
    pub version_spec: String,
}

/// Scan the repository root for a manifest and register its
/// dependencies. Returns how many were registered.
pub fn scan_manifest(
    ingestor: &dyn Ingestor,
    repo_root: &Path,
    project_name: &str,
) -> Result<usize> {
    let dependencies = read_manifest(repo_root)?;

    for dep in &dependencies {
        let mut properties = Properties::new();
        properties.insert(keys::NAME.to_string(), json!(dep.name));
        ingestor.ensure_node(NodeLabel::ExternalPackage.as_str(), properties);

        let mut rel_properties = Properties::new();
        rel_properties.insert(keys::VERSION_SPEC.to_string(), json!(dep.version_spec));
        ingestor.ensure_relationship(
            NodeRef::new(NodeLabel::Project.as_str(), project_name),
            RelKind::DependsOnExternal,
            NodeRef::new(NodeLabel::ExternalPackage.as_str(), &dep.name),
            Some(rel_properties),
        );
    }

    debug!(count = dependencies.len(), "registered external dependencies");
    Ok(dependencies.len())
}

/// Parse the first manifest present: Cargo.toml, pyproject.toml, then
/// package.json.
pub fn read_manifest(repo_root: &Path) -> Result<Vec<ManifestDependency>> {
    let cargo = repo_root.join("Cargo.toml");
    if cargo.is_file() {
        return read_cargo_toml(&cargo);
    }
    let pyproject = repo_root.join("pyproject.toml");
    if pyproject.is_file() {
        return read_pyproject_toml(&pyproject);
    }
    let package = repo_root.join("package.json");
    if package.is_file() {
        return read_package_json(&package);
    }
    Err(TrellisError::ManifestNotFound(repo_root.to_path_buf()))
}

fn read_cargo_toml(path: &Path) -> Result<Vec<ManifestDependency>> {
    let contents = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&contents).unwrap_or(toml::Value::Boolean(false));

    let mut dependencies = Vec::new();
    if let Some(table) = value.get("dependencies").and_then(|d| d.as_table()) {
        for (name, spec) in table {
            let version_spec = match spec {
                toml::Value::String(v) => v.clone(),
                toml::Value::Table(t) => t
                    .get("version")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                _ => String::new(),
            };
            dependencies.push(ManifestDependency {
                name: name.clone(),
                version_spec,
            });
        }
    }
    dependencies.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(dependencies)
}

fn read_pyproject_toml(path: &Path) -> Result<Vec<ManifestDependency>> {
    let contents = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&contents).unwrap_or(toml::Value::Boolean(false));

    let mut dependencies = Vec::new();
    let requirement_list = value
        .get("project")
        .and_then(|p| p.get("dependencies"))
        .and_then(|d| d.as_array());
    if let Some(requirements) = requirement_list {
        for requirement in requirements.iter().filter_map(|r| r.as_str()) {
            dependencies.push(split_requirement(requirement));
        }
    }
    dependencies.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(dependencies)
}

/// Split a PEP 508 requirement into name and the trailing spec.
fn split_requirement(requirement: &str) -> ManifestDependency {
    let boundary = requirement
        .find(|c: char| "><=!~[; ".contains(c))
        .unwrap_or(requirement.len());
    ManifestDependency {
        name: requirement[..boundary].trim().to_string(),
        version_spec: requirement[boundary..].trim().to_string(),
    }
}

fn read_package_json(path: &Path) -> Result<Vec<ManifestDependency>> {
    let contents = fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&contents)?;

    let mut dependencies = Vec::new();
    if let Some(map) = value.get("dependencies").and_then(|d| d.as_object()) {
        for (name, spec) in map {
            dependencies.push(ManifestDependency {
                name: name.clone(),
                version_spec: spec.as_str().unwrap_or("").to_string(),
            });
        }
    }
    dependencies.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(dependencies)
}
