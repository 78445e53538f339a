//! Error types for the Trellis SDK.

use std::path::PathBuf;

use thiserror::Error;

/// All errors the Trellis library can produce.
#[derive(Debug, Error)]
pub enum TrellisError {
    /// File extension does not map to a supported language.
    #[error("unsupported language for file: {0}")]
    UnsupportedLanguage(PathBuf),

    /// tree-sitter rejected the grammar for this parser.
    #[error("parser init failed for {0}: {1}")]
    ParserInit(PathBuf, String),

    /// tree-sitter returned no tree (timeout or cancellation).
    #[error("failed to parse file: {0}")]
    ParseFailed(PathBuf),

    /// A built-in query failed to compile against its grammar.
    #[error("query compile failed for {language}: {message}")]
    QueryCompile {
        language: &'static str,
        message: String,
    },

    /// A path expected to live under the repository root did not.
    #[error("path {path} is not under repository root {root}")]
    PathOutsideRoot { path: PathBuf, root: PathBuf },

    /// Exported graph file was missing or not valid graph JSON.
    #[error("could not load graph from {path}: {message}")]
    GraphLoad { path: PathBuf, message: String },

    /// No dependency manifest found at the repository root.
    #[error("no supported manifest (Cargo.toml, pyproject.toml, package.json) in {0}")]
    ManifestNotFound(PathBuf),

    /// The graph has no ExternalPackage nodes to report on.
    #[error("no external dependencies found in graph")]
    NoExternalPackages,

    /// A named package is absent from the graph.
    #[error("package '{name}' not found; available: {available}")]
    PackageNotFound { name: String, available: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TrellisError>;
