//
//  indexer.rs
//  Trellis
//
//  Created by hak (tharun)
//

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info, warn};
use tree_sitter::Tree;

use crate::config::TrellisConfig;
use crate::deps;
use crate::error::{Result, TrellisError};
use crate::graph::ingest::JsonIngestor;
use crate::graph::types::GraphData;
use crate::parser::{
    self, CallProcessor, DefinitionProcessor, FunctionRegistry, NoInference, RegistryResolver,
    SupportedLanguage,
};
use crate::walk::FileEnumerator;

/// One source file parsed and held for both passes.
struct ParsedFile {
    path: PathBuf,
    language: SupportedLanguage,
    source: String,
    tree: Tree,
}

/// Build the full graph for a repository and flush it to `output_path`.
///
/// One enumeration pass feeds everything. Definitions are ingested in
/// sorted file order so node ids are reproducible; the call pass then
/// fans out per file over the shared sink, and `flush` runs once after
/// all workers return.
pub fn build_graph(
    repo_root: &Path,
    config: &TrellisConfig,
    output_path: &Path,
) -> Result<GraphData> {
    let project_name = config.project_name(repo_root);
    info!(project = %project_name, root = %repo_root.display(), "building graph");

    let mut enumerator = FileEnumerator::new(repo_root);
    enumerator.enumerate(&config.scan.exclude, &config.scan.include);

    let ingestor = JsonIngestor::new(output_path);

    let definitions = DefinitionProcessor::new(&ingestor, repo_root, project_name.clone());
    definitions.process_structure(&enumerator);

    // Parse in parallel; collect preserves the sorted file order.
    let parsed: Vec<ParsedFile> = enumerator
        .files()
        .par_iter()
        .filter_map(|path| parse_file(path))
        .collect();
    info!(files = parsed.len(), "parsed source files");

    let mut registry = FunctionRegistry::default();
    for file in &parsed {
        definitions.process_file(&file.path, file.language, &file.tree, &file.source, &mut registry);
    }

    match deps::scan_manifest(&ingestor, repo_root, &project_name) {
        Ok(count) => debug!(count, "manifest scan complete"),
        Err(TrellisError::ManifestNotFound(_)) => {
            debug!("no manifest at repository root, skipping dependency scan");
        }
        Err(e) => return Err(e),
    }

    // Call pass: file-granularity parallelism over the one shared sink.
    let resolver = RegistryResolver::new(&registry);
    let inference = NoInference;
    let calls = CallProcessor::new(&ingestor, repo_root, project_name, &resolver, &inference);
    parsed.par_iter().for_each(|file| {
        calls.process_file(&file.path, file.language, &file.tree, &file.source);
    });

    ingestor.flush()
}

fn parse_file(path: &Path) -> Option<ParsedFile> {
    SupportedLanguage::from_path(path)?;
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            warn!(path = %path.display(), "skipping unreadable file: {e}");
            return None;
        }
    };
    match parser::parse_source(path, &source) {
        Ok((language, tree)) => Some(ParsedFile {
            path: path.to_path_buf(),
            language,
            source,
            tree,
        }),
        Err(e) => {
            warn!(path = %path.display(), "skipping unparseable file: {e}");
            None
        }
    }
}
