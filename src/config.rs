//
//  config.rs
//  Trellis
//
//  Created by hak (tharun)
//

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level Trellis configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrellisConfig {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub graph: GraphConfig,
}

/// Project-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name used as the qualified-name prefix for every symbol.
    /// Defaults to the repository directory name when empty.
    #[serde(default)]
    pub name: String,
}

/// Filesystem enumeration settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Glob patterns to exclude from the walk.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// If non-empty, only paths matching one of these globs are kept.
    /// Exclusion wins when a path matches both sets.
    #[serde(default)]
    pub include: Vec<String>,
}

/// Graph export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Output path for the exported graph JSON.
    #[serde(default = "default_output_path")]
    pub output_path: String,
}

fn default_output_path() -> String {
    "trellis_graph.json".to_string()
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            output_path: default_output_path(),
        }
    }
}

impl TrellisConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Project name, defaulting to the repository directory name.
    pub fn project_name(&self, repo_root: &Path) -> String {
        if !self.project.name.is_empty() {
            return self.project.name.clone();
        }
        repo_root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "project".to_string())
    }

    /// Resolve the export path relative to the repository root.
    pub fn resolve_output_path(&self, repo_root: &Path) -> PathBuf {
        let path = Path::new(&self.graph.output_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            repo_root.join(path)
        }
    }
}
