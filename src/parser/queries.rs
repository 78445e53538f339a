//! Per-language tree queries for call, function and class discovery.
//!
//! One query per concern, one capture name each (`@call`, `@function`,
//! `@class`), so the processors can stay language-agnostic.

use tree_sitter::Query;

use super::language::SupportedLanguage;
use crate::error::{Result, TrellisError};

pub const CAPTURE_CALL: &str = "call";
pub const CAPTURE_FUNCTION: &str = "function";
pub const CAPTURE_CLASS: &str = "class";

const RUST_CALLS: &str = "(call_expression) @call";
const RUST_FUNCTIONS: &str = "(function_item) @function";
const RUST_CLASSES: &str = "(impl_item) @class";

const PYTHON_CALLS: &str = "(call) @call";
const PYTHON_FUNCTIONS: &str = "(function_definition) @function";
const PYTHON_CLASSES: &str = "(class_definition) @class";

const ECMA_CALLS: &str = "(call_expression) @call";
const ECMA_FUNCTIONS: &str = "[
  (function_declaration)
  (function_expression)
  (generator_function_declaration)
  (arrow_function)
  (method_definition)
] @function";
const ECMA_CLASSES: &str = "[
  (class_declaration)
  (class)
] @class";

const JAVA_CALLS: &str = "(method_invocation) @call";
const JAVA_FUNCTIONS: &str = "[
  (method_declaration)
  (constructor_declaration)
] @function";
const JAVA_CLASSES: &str = "[
  (class_declaration)
  (interface_declaration)
  (enum_declaration)
] @class";

// Operator expressions ride along in the C++ call query so overload
// resolution gets a chance at them.
const CPP_CALLS: &str = "[
  (call_expression)
  (binary_expression)
  (unary_expression)
  (update_expression)
] @call";
const CPP_FUNCTIONS: &str = "(function_definition) @function";
const CPP_CLASSES: &str = "[
  (class_specifier)
  (struct_specifier)
] @class";

/// Compiled query set for one language.
pub struct LanguageQueries {
    pub calls: Query,
    pub functions: Query,
    pub classes: Query,
}

fn sources(language: SupportedLanguage) -> (&'static str, &'static str, &'static str) {
    match language {
        SupportedLanguage::Rust => (RUST_CALLS, RUST_FUNCTIONS, RUST_CLASSES),
        SupportedLanguage::Python => (PYTHON_CALLS, PYTHON_FUNCTIONS, PYTHON_CLASSES),
        SupportedLanguage::JavaScript | SupportedLanguage::TypeScript | SupportedLanguage::Tsx => {
            (ECMA_CALLS, ECMA_FUNCTIONS, ECMA_CLASSES)
        }
        SupportedLanguage::Java => (JAVA_CALLS, JAVA_FUNCTIONS, JAVA_CLASSES),
        SupportedLanguage::Cpp => (CPP_CALLS, CPP_FUNCTIONS, CPP_CLASSES),
    }
}

/// Compile the query set for a language.
pub fn queries_for(language: SupportedLanguage) -> Result<LanguageQueries> {
    let ts_lang = language.tree_sitter_language();
    let (calls_src, functions_src, classes_src) = sources(language);
    let compile = |src: &str| {
        Query::new(&ts_lang, src).map_err(|e| TrellisError::QueryCompile {
            language: language.as_str(),
            message: e.to_string(),
        })
    };
    Ok(LanguageQueries {
        calls: compile(calls_src)?,
        functions: compile(functions_src)?,
        classes: compile(classes_src)?,
    })
}
