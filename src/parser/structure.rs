//
//  structure.rs
//  Trellis
//
//  Created by hak (tharun)
//

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde_json::json;
use tracing::{debug, error};
use tree_sitter::{Node, Tree};

use super::language::{self, SupportedLanguage};
use super::queries;
use super::resolve::FunctionRegistry;
use crate::error::{Result, TrellisError};
use crate::graph::ingest::Ingestor;
use crate::graph::types::{keys, NodeLabel, NodeRef, Properties, RelKind};
use crate::walk::FileEnumerator;

/// Registers the nodes the call edges later resolve against: the
/// project root, directories, files, and every definition with its
/// DEFINES / DEFINES_METHOD chain.
pub struct DefinitionProcessor<'a> {
    ingestor: &'a dyn Ingestor,
    repo_path: PathBuf,
    project_name: String,
}

fn props(pairs: Vec<(&str, serde_json::Value)>) -> Properties {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

/// Decorator names on a Python definition, `@` stripped.
fn decorators(node: Node, source: &[u8]) -> Vec<String> {
    let Some(parent) = node.parent() else {
        return Vec::new();
    };
    if parent.kind() != "decorated_definition" {
        return Vec::new();
    }
    let mut cursor = parent.walk();
    parent
        .children(&mut cursor)
        .filter(|c| c.kind() == "decorator")
        .filter_map(|c| language::node_text(c, source))
        .map(|text| text.trim_start_matches('@').to_string())
        .collect()
}

impl<'a> DefinitionProcessor<'a> {
    pub fn new(
        ingestor: &'a dyn Ingestor,
        repo_path: impl Into<PathBuf>,
        project_name: impl Into<String>,
    ) -> Self {
        Self {
            ingestor,
            repo_path: repo_path.into(),
            project_name: project_name.into(),
        }
    }

    /// Register the project root, every directory (packages where a
    /// package-init file is present) and every non-source file.
    pub fn process_structure(&self, enumerator: &FileEnumerator) {
        self.ingestor.ensure_node(
            NodeLabel::Project.as_str(),
            props(vec![(keys::NAME, json!(self.project_name))]),
        );

        let file_set: HashSet<&Path> = enumerator.files().iter().map(PathBuf::as_path).collect();

        for directory in enumerator.directories() {
            let Ok(relative) = directory.strip_prefix(&self.repo_path) else {
                continue;
            };
            if relative.as_os_str().is_empty() {
                continue;
            }
            let name = relative
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            if file_set.contains(directory.join("__init__.py").as_path()) {
                let qualified_name = language::module_qualified_name(
                    &self.project_name,
                    &relative.join("__init__.py"),
                );
                self.ingestor.ensure_node(
                    NodeLabel::Package.as_str(),
                    props(vec![
                        (keys::QUALIFIED_NAME, json!(qualified_name)),
                        (keys::NAME, json!(name)),
                        (keys::PATH, json!(relative.to_string_lossy())),
                    ]),
                );
            } else {
                self.ingestor.ensure_node(
                    NodeLabel::Folder.as_str(),
                    props(vec![
                        (keys::NAME, json!(name)),
                        (keys::PATH, json!(relative.to_string_lossy())),
                    ]),
                );
            }
        }

        for file in enumerator.files() {
            if SupportedLanguage::from_path(file).is_some() {
                continue; // source files become Module nodes in process_file
            }
            let Ok(relative) = file.strip_prefix(&self.repo_path) else {
                continue;
            };
            let name = relative
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            self.ingestor.ensure_node(
                NodeLabel::File.as_str(),
                props(vec![
                    (keys::NAME, json!(name)),
                    (keys::PATH, json!(relative.to_string_lossy())),
                ]),
            );
        }
    }

    /// Register one source file's module and definitions. Failures are
    /// logged and swallowed; the batch continues.
    pub fn process_file(
        &self,
        file_path: &Path,
        language: SupportedLanguage,
        tree: &Tree,
        source: &str,
        registry: &mut FunctionRegistry,
    ) {
        if let Err(e) = self.process_file_inner(file_path, language, tree, source, registry) {
            error!(path = %file_path.display(), "definition processing failed: {e}");
        }
    }

    fn process_file_inner(
        &self,
        file_path: &Path,
        language: SupportedLanguage,
        tree: &Tree,
        source: &str,
        registry: &mut FunctionRegistry,
    ) -> Result<()> {
        let relative =
            file_path
                .strip_prefix(&self.repo_path)
                .map_err(|_| TrellisError::PathOutsideRoot {
                    path: file_path.to_path_buf(),
                    root: self.repo_path.clone(),
                })?;
        let module_qn = language::module_qualified_name(&self.project_name, relative);
        debug!(module = %module_qn, "registering definitions");

        let stem = relative
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        self.ingestor.ensure_node(
            NodeLabel::Module.as_str(),
            props(vec![
                (keys::QUALIFIED_NAME, json!(module_qn)),
                (keys::NAME, json!(stem)),
                (keys::PATH, json!(relative.to_string_lossy())),
            ]),
        );

        let compiled = queries::queries_for(language)?;
        let source_bytes = source.as_bytes();
        let spec = language.spec();
        let root = tree.root_node();

        // Standalone functions, nested chains included.
        for func_node in
            super::calls::capture_nodes(&compiled.functions, root, queries::CAPTURE_FUNCTION, source_bytes)
        {
            if language::is_method_node(func_node, spec) {
                continue;
            }
            let Some(func_name) = language::function_name(func_node, language, source_bytes) else {
                continue;
            };
            let Some(func_qn) = super::calls::build_nested_qualified_name(
                func_node,
                &module_qn,
                &func_name,
                spec,
                language,
                source_bytes,
            ) else {
                continue;
            };

            let mut properties = props(vec![
                (keys::QUALIFIED_NAME, json!(func_qn)),
                (keys::NAME, json!(func_name)),
                (keys::START_LINE, json!(func_node.start_position().row + 1)),
                (keys::END_LINE, json!(func_node.end_position().row + 1)),
            ]);
            let decorator_names = decorators(func_node, source_bytes);
            if !decorator_names.is_empty() {
                properties.insert(keys::DECORATORS.to_string(), json!(decorator_names));
            }
            self.ingestor.ensure_node(NodeLabel::Function.as_str(), properties);
            registry.insert(NodeLabel::Function, &func_qn);

            // Chain DEFINES through the enclosing function, or the
            // module at the top.
            let parent_qn = func_qn
                .rsplit_once('.')
                .map(|(p, _)| p)
                .unwrap_or(module_qn.as_str());
            let parent_kind = if parent_qn == module_qn {
                NodeLabel::Module
            } else {
                NodeLabel::Function
            };
            self.ingestor.ensure_relationship(
                NodeRef::new(parent_kind.as_str(), parent_qn),
                RelKind::Defines,
                NodeRef::new(NodeLabel::Function.as_str(), &func_qn),
                None,
            );
        }

        // Classes and their methods.
        for class_node in
            super::calls::capture_nodes(&compiled.classes, root, queries::CAPTURE_CLASS, source_bytes)
        {
            let Some(class_name) = language::class_name(class_node, language, source_bytes) else {
                continue;
            };
            let class_qn = format!("{module_qn}.{class_name}");

            self.ingestor.ensure_node(
                NodeLabel::Class.as_str(),
                props(vec![
                    (keys::QUALIFIED_NAME, json!(class_qn)),
                    (keys::NAME, json!(class_name)),
                    (keys::START_LINE, json!(class_node.start_position().row + 1)),
                    (keys::END_LINE, json!(class_node.end_position().row + 1)),
                ]),
            );
            registry.insert(NodeLabel::Class, &class_qn);
            self.ingestor.ensure_relationship(
                NodeRef::new(NodeLabel::Module.as_str(), &module_qn),
                RelKind::Defines,
                NodeRef::new(NodeLabel::Class.as_str(), &class_qn),
                None,
            );

            self.register_superclasses(class_node, &class_qn, &module_qn, language, source_bytes);

            let Some(body) = class_node.child_by_field_name("body") else {
                continue;
            };
            for method_node in super::calls::capture_nodes(
                &compiled.functions,
                body,
                queries::CAPTURE_FUNCTION,
                source_bytes,
            ) {
                let Some(method_name) = language::function_name(method_node, language, source_bytes)
                else {
                    continue;
                };
                let method_qn = format!("{class_qn}.{method_name}");
                let mut properties = props(vec![
                    (keys::QUALIFIED_NAME, json!(method_qn)),
                    (keys::NAME, json!(method_name)),
                    (keys::START_LINE, json!(method_node.start_position().row + 1)),
                    (keys::END_LINE, json!(method_node.end_position().row + 1)),
                ]);
                let decorator_names = decorators(method_node, source_bytes);
                if !decorator_names.is_empty() {
                    properties.insert(keys::DECORATORS.to_string(), json!(decorator_names));
                }
                self.ingestor.ensure_node(NodeLabel::Method.as_str(), properties);
                registry.insert(NodeLabel::Method, &method_qn);
                self.ingestor.ensure_relationship(
                    NodeRef::new(NodeLabel::Class.as_str(), &class_qn),
                    RelKind::DefinesMethod,
                    NodeRef::new(NodeLabel::Method.as_str(), &method_qn),
                    None,
                );
            }
        }

        Ok(())
    }

    /// INHERITS edges for module-local base classes. Unknown bases
    /// leave dangling edges that flush drops.
    fn register_superclasses(
        &self,
        class_node: Node,
        class_qn: &str,
        module_qn: &str,
        language: SupportedLanguage,
        source: &[u8],
    ) {
        let bases: Vec<String> = match language {
            SupportedLanguage::Python => class_node
                .child_by_field_name("superclasses")
                .map(|args| {
                    let mut cursor = args.walk();
                    args.children(&mut cursor)
                        .filter(|c| c.kind() == "identifier")
                        .filter_map(|c| language::node_text(c, source))
                        .collect()
                })
                .unwrap_or_default(),
            SupportedLanguage::Java => class_node
                .child_by_field_name("superclass")
                .and_then(|sc| {
                    let mut cursor = sc.walk();
                    let base = sc
                        .children(&mut cursor)
                        .find(|c| c.kind() == "type_identifier")
                        .and_then(|c| language::node_text(c, source));
                    base
                })
                .into_iter()
                .collect(),
            _ => Vec::new(),
        };

        for base in bases {
            self.ingestor.ensure_relationship(
                NodeRef::new(NodeLabel::Class.as_str(), class_qn),
                RelKind::Inherits,
                NodeRef::new(NodeLabel::Class.as_str(), format!("{module_qn}.{base}")),
                None,
            );
        }
    }
}
