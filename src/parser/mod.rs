//! Parsing module — language detection, tree queries, and the
//! definition/call processors that turn syntax trees into graph writes.

pub mod calls;
pub mod language;
pub mod queries;
pub mod resolve;
pub mod structure;

use std::path::Path;

use tree_sitter::{Parser, Tree};

pub use calls::CallProcessor;
pub use language::{module_qualified_name, SupportedLanguage};
pub use queries::{queries_for, LanguageQueries};
pub use resolve::{CallResolver, FunctionRegistry, NoInference, RegistryResolver, ResolvedCallee, TypeInference};
pub use structure::DefinitionProcessor;

use crate::error::{Result, TrellisError};

/// Parse one source file, detecting the language from its path.
pub fn parse_source(path: &Path, source: &str) -> Result<(SupportedLanguage, Tree)> {
    let language = SupportedLanguage::from_path(path)
        .ok_or_else(|| TrellisError::UnsupportedLanguage(path.to_path_buf()))?;

    let mut parser = Parser::new();
    parser
        .set_language(&language.tree_sitter_language())
        .map_err(|e| TrellisError::ParserInit(path.to_path_buf(), e.to_string()))?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| TrellisError::ParseFailed(path.to_path_buf()))?;

    Ok((language, tree))
}
