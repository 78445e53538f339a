//
//  language.rs
//  Trellis
//
//  Created by hak (tharun)
//

use std::path::Path;

use tree_sitter::{Language, Node};

/// File names that contribute their parent directory's path segment to
/// the module qualified name instead of their own stem.
pub const INDEX_FILE_NAMES: &[&str] = &[
    "__init__.py",
    "mod.rs",
    "lib.rs",
    "index.js",
    "index.jsx",
    "index.ts",
    "index.tsx",
];

/// Languages Trellis can parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupportedLanguage {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    Java,
    Cpp,
}

impl SupportedLanguage {
    /// Detect language from file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        match ext {
            "rs" => Some(Self::Rust),
            "py" => Some(Self::Python),
            "js" | "jsx" | "mjs" | "cjs" => Some(Self::JavaScript),
            "ts" => Some(Self::TypeScript),
            "tsx" => Some(Self::Tsx),
            "java" => Some(Self::Java),
            "cpp" | "cc" | "cxx" | "hpp" | "hh" | "h" => Some(Self::Cpp),
            _ => None,
        }
    }

    pub fn tree_sitter_language(self) -> Language {
        match self {
            Self::Rust => tree_sitter_rust::LANGUAGE.into(),
            Self::Python => tree_sitter_python::LANGUAGE.into(),
            Self::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Self::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Self::Java => tree_sitter_java::LANGUAGE.into(),
            Self::Cpp => tree_sitter_cpp::LANGUAGE.into(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Tsx => "tsx",
            Self::Java => "java",
            Self::Cpp => "cpp",
        }
    }

    /// Structural node-type lists for this language's grammar.
    pub fn spec(self) -> &'static LanguageSpec {
        match self {
            Self::Rust => &RUST_SPEC,
            Self::Python => &PYTHON_SPEC,
            Self::JavaScript | Self::TypeScript | Self::Tsx => &ECMA_SPEC,
            Self::Java => &JAVA_SPEC,
            Self::Cpp => &CPP_SPEC,
        }
    }
}

/// Grammar node kinds that matter to context building.
pub struct LanguageSpec {
    pub function_node_types: &'static [&'static str],
    pub class_node_types: &'static [&'static str],
    pub module_node_types: &'static [&'static str],
}

static RUST_SPEC: LanguageSpec = LanguageSpec {
    function_node_types: &["function_item"],
    class_node_types: &["impl_item"],
    module_node_types: &["source_file"],
};

static PYTHON_SPEC: LanguageSpec = LanguageSpec {
    function_node_types: &["function_definition"],
    class_node_types: &["class_definition"],
    module_node_types: &["module"],
};

static ECMA_SPEC: LanguageSpec = LanguageSpec {
    function_node_types: &[
        "function_declaration",
        "function_expression",
        "generator_function_declaration",
        "arrow_function",
        "method_definition",
    ],
    class_node_types: &["class_declaration", "class"],
    module_node_types: &["program"],
};

static JAVA_SPEC: LanguageSpec = LanguageSpec {
    function_node_types: &["method_declaration", "constructor_declaration"],
    class_node_types: &["class_declaration", "interface_declaration", "enum_declaration"],
    module_node_types: &["program"],
};

static CPP_SPEC: LanguageSpec = LanguageSpec {
    function_node_types: &["function_definition"],
    class_node_types: &["class_specifier", "struct_specifier"],
    module_node_types: &["translation_unit"],
};

/// Text of a node's `name` field, if any.
pub fn node_name(node: Node, source: &[u8]) -> Option<String> {
    node.child_by_field_name("name")?
        .utf8_text(source)
        .ok()
        .map(str::to_string)
}

pub fn node_text(node: Node, source: &[u8]) -> Option<String> {
    node.utf8_text(source).ok().map(str::to_string)
}

/// A function is a method when the nearest enclosing function-or-class
/// ancestor is a class.
pub fn is_method_node(func_node: Node, spec: &LanguageSpec) -> bool {
    let mut current = func_node.parent();
    while let Some(node) = current {
        let kind = node.kind();
        if spec.module_node_types.contains(&kind) {
            return false;
        }
        if spec.class_node_types.contains(&kind) {
            return true;
        }
        if spec.function_node_types.contains(&kind) {
            return false;
        }
        current = node.parent();
    }
    false
}

/// Get the name of a function-like node, handling C++ declarators.
pub fn function_name(node: Node, language: SupportedLanguage, source: &[u8]) -> Option<String> {
    if language == SupportedLanguage::Cpp {
        return cpp_function_name(node, source);
    }
    node_name(node, source)
}

/// Get the name of a class-like node, handling Rust impl blocks.
pub fn class_name(node: Node, language: SupportedLanguage, source: &[u8]) -> Option<String> {
    if language == SupportedLanguage::Rust && node.kind() == "impl_item" {
        return rust_impl_type_name(node, source);
    }
    node_name(node, source)
}

/// The type an impl block attaches to: `impl Foo` or `impl Trait for Foo`.
fn rust_impl_type_name(node: Node, source: &[u8]) -> Option<String> {
    if let Some(type_node) = node.child_by_field_name("type") {
        return node_text(type_node, source);
    }
    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .find(|child| child.kind() == "type_identifier" && child.is_named());
    found.and_then(|n| node_text(n, source))
}

/// Unwrap the declarator chain of a C++ function_definition down to the
/// declared name.
fn cpp_function_name(node: Node, source: &[u8]) -> Option<String> {
    let mut current = node.child_by_field_name("declarator")?;
    loop {
        match current.kind() {
            "identifier" | "field_identifier" | "operator_name" | "destructor_name" => {
                return node_text(current, source);
            }
            "qualified_identifier" => {
                // Out-of-line definition: keep only the trailing name.
                current = current.child_by_field_name("name")?;
            }
            "function_declarator" | "pointer_declarator" | "reference_declarator" => {
                current = current.child_by_field_name("declarator")?;
            }
            _ => return None,
        }
    }
}

/// Module qualified name from a repository-relative path.
///
/// Index-style files (`__init__.py`, `mod.rs`, `index.ts`, ...) take
/// their parent directory's segment instead of their own stem.
pub fn module_qualified_name(project_name: &str, relative_path: &Path) -> String {
    let file_name = relative_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut parts = vec![project_name.to_string()];
    if INDEX_FILE_NAMES.contains(&file_name.as_str()) {
        if let Some(parent) = relative_path.parent() {
            parts.extend(
                parent
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().to_string()),
            );
        }
    } else {
        let stemmed = relative_path.with_extension("");
        parts.extend(
            stemmed
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string()),
        );
    }
    parts.retain(|p| !p.is_empty());
    parts.join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn language_detection_by_extension() {
        assert_eq!(
            SupportedLanguage::from_path(Path::new("a/b.py")),
            Some(SupportedLanguage::Python)
        );
        assert_eq!(
            SupportedLanguage::from_path(Path::new("x.tsx")),
            Some(SupportedLanguage::Tsx)
        );
        assert_eq!(SupportedLanguage::from_path(Path::new("notes.md")), None);
        assert_eq!(SupportedLanguage::from_path(Path::new("Makefile")), None);
    }

    #[test]
    fn module_qn_from_plain_path() {
        assert_eq!(
            module_qualified_name("proj", &PathBuf::from("pkg/util.py")),
            "proj.pkg.util"
        );
        assert_eq!(
            module_qualified_name("proj", &PathBuf::from("main.rs")),
            "proj.main"
        );
    }

    #[test]
    fn index_files_take_the_parent_segment() {
        assert_eq!(
            module_qualified_name("proj", &PathBuf::from("pkg/__init__.py")),
            "proj.pkg"
        );
        assert_eq!(
            module_qualified_name("proj", &PathBuf::from("src/net/mod.rs")),
            "proj.src.net"
        );
        assert_eq!(
            module_qualified_name("proj", &PathBuf::from("components/index.ts")),
            "proj.components"
        );
        // Top-level index file collapses to the project itself.
        assert_eq!(
            module_qualified_name("proj", &PathBuf::from("__init__.py")),
            "proj"
        );
    }
}
