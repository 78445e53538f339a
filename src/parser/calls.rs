//
//  calls.rs
//  Trellis
//
//  Created by hak (tharun)
//

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, error};
use tree_sitter::{Node, Query, QueryCursor, StreamingIterator, Tree};

use super::language::{self, LanguageSpec, SupportedLanguage};
use super::queries::{self, LanguageQueries};
use super::resolve::{CallResolver, TypeInference};
use crate::error::{Result, TrellisError};
use crate::graph::ingest::Ingestor;
use crate::graph::types::{NodeLabel, NodeRef, RelKind};

/// Stable substitute for AST node identity.
///
/// Queries re-materialize equivalent wrapper nodes, so object identity
/// cannot key the context index; byte ranges are stable and comparable.
type StructuralKey = (usize, usize);

fn structural_key(node: Node) -> StructuralKey {
    (node.start_byte(), node.end_byte())
}

/// The attribution unit: one enclosing callable and the calls charged
/// to it. Built per file, discarded after the file's calls are emitted.
struct CallContext<'t> {
    caller_node: Node<'t>,
    caller_qn: String,
    caller_kind: NodeLabel,
    class_context: Option<String>,
    call_nodes: Vec<Node<'t>>,
}

/// Discovers every call expression in a file, attributes each to its
/// innermost enclosing callable, resolves the callee through the
/// injected collaborators, and emits CALLS edges.
///
/// Holds no graph state across files; everything goes through the
/// ingestor.
pub struct CallProcessor<'a> {
    ingestor: &'a dyn Ingestor,
    repo_path: PathBuf,
    project_name: String,
    resolver: &'a dyn CallResolver,
    type_inference: &'a dyn TypeInference,
}

impl<'a> CallProcessor<'a> {
    pub fn new(
        ingestor: &'a dyn Ingestor,
        repo_path: impl Into<PathBuf>,
        project_name: impl Into<String>,
        resolver: &'a dyn CallResolver,
        type_inference: &'a dyn TypeInference,
    ) -> Self {
        Self {
            ingestor,
            repo_path: repo_path.into(),
            project_name: project_name.into(),
            resolver,
            type_inference,
        }
    }

    /// Process all calls in one parsed file. Failures are logged and
    /// swallowed so one bad file never aborts a batch run.
    pub fn process_file(
        &self,
        file_path: &Path,
        language: SupportedLanguage,
        tree: &Tree,
        source: &str,
    ) {
        if let Err(e) = self.process_file_inner(file_path, language, tree, source) {
            error!(path = %file_path.display(), "call processing failed: {e}");
        }
    }

    fn process_file_inner(
        &self,
        file_path: &Path,
        language: SupportedLanguage,
        tree: &Tree,
        source: &str,
    ) -> Result<()> {
        let relative =
            file_path
                .strip_prefix(&self.repo_path)
                .map_err(|_| TrellisError::PathOutsideRoot {
                    path: file_path.to_path_buf(),
                    root: self.repo_path.clone(),
                })?;
        debug!(path = %relative.display(), "processing calls");

        let module_qn = language::module_qualified_name(&self.project_name, relative);
        let queries = queries::queries_for(language)?;
        let source_bytes = source.as_bytes();

        let mut contexts =
            self.build_caller_contexts(tree.root_node(), &module_qn, language, &queries, source_bytes);

        // All call expressions, one query pass.
        let all_calls = capture_nodes(
            &queries.calls,
            tree.root_node(),
            queries::CAPTURE_CALL,
            source_bytes,
        );

        attribute_calls(all_calls, &mut contexts);

        for context in contexts.values() {
            if context.call_nodes.is_empty() {
                continue;
            }
            // One type-map build per context, shared by all its calls.
            let local_types = self.type_inference.build_local_variable_types(
                context.caller_node,
                source_bytes,
                &module_qn,
                language,
            );
            debug!(
                count = context.call_nodes.len(),
                caller = %context.caller_qn,
                "resolving calls"
            );
            for &call_node in &context.call_nodes {
                self.process_single_call(call_node, context, &module_qn, language, &local_types, source_bytes);
            }
        }
        Ok(())
    }

    /// Map every caller in the file by structural key: the module root,
    /// standalone functions (with nested qualified names), and methods
    /// under their classes.
    fn build_caller_contexts<'t>(
        &self,
        root: Node<'t>,
        module_qn: &str,
        language: SupportedLanguage,
        queries: &LanguageQueries,
        source: &[u8],
    ) -> HashMap<StructuralKey, CallContext<'t>> {
        let spec = language.spec();
        let mut contexts = HashMap::new();

        contexts.insert(
            structural_key(root),
            CallContext {
                caller_node: root,
                caller_qn: module_qn.to_string(),
                caller_kind: NodeLabel::Module,
                class_context: None,
                call_nodes: Vec::new(),
            },
        );

        for func_node in capture_nodes(&queries.functions, root, queries::CAPTURE_FUNCTION, source) {
            if language::is_method_node(func_node, spec) {
                continue;
            }
            let Some(func_name) = language::function_name(func_node, language, source) else {
                continue;
            };
            let Some(func_qn) =
                build_nested_qualified_name(func_node, module_qn, &func_name, spec, language, source)
            else {
                continue;
            };
            contexts.insert(
                structural_key(func_node),
                CallContext {
                    caller_node: func_node,
                    caller_qn: func_qn,
                    caller_kind: NodeLabel::Function,
                    class_context: None,
                    call_nodes: Vec::new(),
                },
            );
        }

        for class_node in capture_nodes(&queries.classes, root, queries::CAPTURE_CLASS, source) {
            let Some(class_name) = language::class_name(class_node, language, source) else {
                continue;
            };
            let class_qn = format!("{module_qn}.{class_name}");
            let Some(body) = class_node.child_by_field_name("body") else {
                continue;
            };
            for method_node in capture_nodes(&queries.functions, body, queries::CAPTURE_FUNCTION, source)
            {
                let Some(method_name) = language::function_name(method_node, language, source)
                else {
                    continue;
                };
                contexts.insert(
                    structural_key(method_node),
                    CallContext {
                        caller_node: method_node,
                        caller_qn: format!("{class_qn}.{method_name}"),
                        caller_kind: NodeLabel::Method,
                        class_context: Some(class_qn.clone()),
                        call_nodes: Vec::new(),
                    },
                );
            }
        }

        contexts
    }

    fn process_single_call(
        &self,
        call_node: Node,
        context: &CallContext,
        module_qn: &str,
        language: SupportedLanguage,
        local_types: &HashMap<String, String>,
        source: &[u8],
    ) {
        let Some(call_name) = callee_name(call_node, source) else {
            return;
        };

        let primary = if language == SupportedLanguage::Java
            && call_node.kind() == "method_invocation"
        {
            let object = call_node
                .child_by_field_name("object")
                .and_then(|n| language::node_text(n, source));
            let Some(method) = call_node
                .child_by_field_name("name")
                .and_then(|n| language::node_text(n, source))
            else {
                return;
            };
            self.resolver
                .resolve_method_invocation(object.as_deref(), &method, module_qn, local_types)
        } else {
            self.resolver.resolve_function_call(
                &call_name,
                module_qn,
                local_types,
                context.class_context.as_deref(),
            )
        };

        let resolved = primary
            .or_else(|| self.resolver.resolve_builtin(&call_name))
            .or_else(|| self.resolver.resolve_operator(&call_name, module_qn));

        // Unresolvable targets are the expected common case at
        // repository scale (dynamic dispatch, externals): skip quietly.
        let Some(callee) = resolved else {
            return;
        };

        debug!(
            caller = %context.caller_qn,
            call = %call_name,
            callee = %callee.qualified_name,
            "resolved call"
        );
        self.ingestor.ensure_relationship(
            NodeRef::new(context.caller_kind.as_str(), &context.caller_qn),
            RelKind::Calls,
            NodeRef::new(callee.label.as_str(), &callee.qualified_name),
            None,
        );
    }
}

/// Charge each call to the innermost enclosing context by walking its
/// ancestor chain until a byte-range key matches. The module root
/// always matches, so well-formed trees never drop a call.
fn attribute_calls<'t>(
    calls: Vec<Node<'t>>,
    contexts: &mut HashMap<StructuralKey, CallContext<'t>>,
) {
    for call in calls {
        let mut current = call.parent();
        while let Some(node) = current {
            if let Some(context) = contexts.get_mut(&structural_key(node)) {
                context.call_nodes.push(call);
                break;
            }
            current = node.parent();
        }
    }
}

/// Collect the nodes a query captures under `capture_name`.
pub(crate) fn capture_nodes<'t>(
    query: &Query,
    node: Node<'t>,
    capture_name: &str,
    source: &[u8],
) -> Vec<Node<'t>> {
    let Some(index) = query.capture_index_for_name(capture_name) else {
        return Vec::new();
    };
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(query, node, source);
    let mut nodes = Vec::new();
    while let Some(m) = matches.next() {
        for capture in m.captures {
            if capture.index == index {
                nodes.push(capture.node);
            }
        }
    }
    nodes
}

/// Prefix the names of enclosing functions onto a standalone function's
/// qualified name. A class ancestor aborts — methods are keyed by the
/// class pass instead.
pub(crate) fn build_nested_qualified_name(
    func_node: Node,
    module_qn: &str,
    func_name: &str,
    spec: &LanguageSpec,
    language: SupportedLanguage,
    source: &[u8],
) -> Option<String> {
    let mut path_parts: Vec<String> = Vec::new();
    let mut current = func_node.parent();

    while let Some(node) = current {
        let kind = node.kind();
        if spec.module_node_types.contains(&kind) {
            break;
        }
        if spec.function_node_types.contains(&kind) {
            if let Some(name) = language::function_name(node, language, source) {
                path_parts.push(name);
            }
        } else if spec.class_node_types.contains(&kind) {
            return None;
        }
        current = node.parent();
    }

    path_parts.reverse();
    if path_parts.is_empty() {
        Some(format!("{module_qn}.{func_name}"))
    } else {
        Some(format!("{module_qn}.{}.{func_name}", path_parts.join(".")))
    }
}

/// The finite set of syntactic call forms a callee name can be read
/// from. Keeping this closed makes the extraction total per language.
enum CallShape<'t> {
    /// Plain target: identifier, attribute/member access, scoped or
    /// qualified identifier. The full text is the name.
    Direct(Node<'t>),
    /// Field access target: only the trailing field names the callee.
    FieldAccess(Node<'t>),
    /// Immediately-invoked function or arrow expression.
    Iife(Node<'t>),
    /// Operator expression routed to overload resolution.
    Operator(Node<'t>),
    /// Java method invocation: `name` with optional `object` receiver.
    MethodInvocation(Node<'t>),
    /// Anything else that still carries a `name` field.
    Named(Node<'t>),
}

fn classify(call_node: Node) -> Option<CallShape> {
    if let Some(func) = call_node.child_by_field_name("function") {
        match func.kind() {
            "identifier"
            | "attribute"
            | "member_expression"
            | "qualified_identifier"
            | "scoped_identifier" => return Some(CallShape::Direct(func)),
            "field_expression" => return Some(CallShape::FieldAccess(func)),
            "parenthesized_expression" => return Some(CallShape::Iife(func)),
            _ => {}
        }
    }
    match call_node.kind() {
        "binary_expression" | "unary_expression" | "update_expression" => {
            return Some(CallShape::Operator(call_node));
        }
        "method_invocation" => return Some(CallShape::MethodInvocation(call_node)),
        _ => {}
    }
    if call_node.child_by_field_name("name").is_some() {
        return Some(CallShape::Named(call_node));
    }
    None
}

/// Extract the callee name for one call expression, or None when the
/// shape names nothing resolvable.
fn callee_name(call_node: Node, source: &[u8]) -> Option<String> {
    match classify(call_node)? {
        CallShape::Direct(node) => language::node_text(node, source),
        CallShape::FieldAccess(node) => node
            .child_by_field_name("field")
            .and_then(|f| language::node_text(f, source)),
        CallShape::Iife(node) => iife_name(node),
        CallShape::Operator(node) => {
            let operator = node.child_by_field_name("operator")?;
            operator_symbol_to_name(operator.utf8_text(source).ok()?)
        }
        CallShape::MethodInvocation(node) => {
            let method = node
                .child_by_field_name("name")
                .and_then(|n| language::node_text(n, source))?;
            match node
                .child_by_field_name("object")
                .and_then(|o| language::node_text(o, source))
            {
                Some(object) => Some(format!("{object}.{method}")),
                None => Some(method),
            }
        }
        CallShape::Named(node) => node
            .child_by_field_name("name")
            .and_then(|n| language::node_text(n, source)),
    }
}

/// Synthetic, position-derived name for an immediately-invoked
/// function or arrow expression.
fn iife_name(parenthesized: Node) -> Option<String> {
    let mut cursor = parenthesized.walk();
    for child in parenthesized.children(&mut cursor) {
        let point = child.start_position();
        match child.kind() {
            "function_expression" | "function" => {
                return Some(format!("iife_fn_{}_{}", point.row, point.column));
            }
            "arrow_function" => {
                return Some(format!("iife_arrow_{}_{}", point.row, point.column));
            }
            _ => {}
        }
    }
    None
}

/// Operator symbol → overload name (`+` → `operator+`). Unknown
/// symbols name nothing.
fn operator_symbol_to_name(symbol: &str) -> Option<String> {
    const OPERATORS: &[&str] = &[
        "+", "-", "*", "/", "%", "==", "!=", "<", ">", "<=", ">=", "&&", "||", "<<", ">>", "&",
        "|", "^", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "<<=", ">>=", "++", "--", "!",
        "~", "=", "->", "[]",
    ];
    OPERATORS
        .contains(&symbol)
        .then(|| format!("operator{symbol}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::Properties;
    use crate::parser::parse_source;
    use crate::parser::resolve::{NoInference, ResolvedCallee};
    use std::sync::Mutex;

    /// Records every relationship it is handed.
    #[derive(Default)]
    struct RecordingIngestor {
        edges: Mutex<Vec<(String, String, String, String, String)>>,
    }

    impl RecordingIngestor {
        fn edges(&self) -> Vec<(String, String, String, String, String)> {
            self.edges.lock().unwrap().clone()
        }
    }

    impl Ingestor for RecordingIngestor {
        fn ensure_node(&self, _label: &str, _properties: Properties) {}

        fn ensure_relationship(
            &self,
            from: NodeRef,
            rel_type: RelKind,
            to: NodeRef,
            _properties: Option<Properties>,
        ) {
            self.edges.lock().unwrap().push((
                from.label,
                from.value,
                rel_type.as_str().to_string(),
                to.label,
                to.value,
            ));
        }
    }

    /// Resolves every call to `ext.<name>` and records what it saw.
    #[derive(Default)]
    struct EchoResolver {
        seen: Mutex<Vec<(String, Option<String>)>>,
    }

    impl CallResolver for EchoResolver {
        fn resolve_function_call(
            &self,
            call_name: &str,
            _module_qn: &str,
            _local_types: &HashMap<String, String>,
            class_context: Option<&str>,
        ) -> Option<ResolvedCallee> {
            self.seen
                .lock()
                .unwrap()
                .push((call_name.to_string(), class_context.map(str::to_string)));
            Some(ResolvedCallee::new(
                NodeLabel::Function,
                format!("ext.{call_name}"),
            ))
        }

        fn resolve_method_invocation(
            &self,
            object: Option<&str>,
            method: &str,
            _module_qn: &str,
            _local_types: &HashMap<String, String>,
        ) -> Option<ResolvedCallee> {
            let shown = match object {
                Some(o) => format!("{o}#{method}"),
                None => method.to_string(),
            };
            Some(ResolvedCallee::new(NodeLabel::Method, format!("ext.{shown}")))
        }

        fn resolve_builtin(&self, _call_name: &str) -> Option<ResolvedCallee> {
            None
        }

        fn resolve_operator(&self, _call_name: &str, _module_qn: &str) -> Option<ResolvedCallee> {
            None
        }
    }

    fn run(file_name: &str, source: &str) -> (RecordingIngestor, EchoResolver) {
        let ingestor = RecordingIngestor::default();
        let resolver = EchoResolver::default();
        let inference = NoInference;
        let path = Path::new("/repo").join(file_name);
        let (language, tree) = parse_source(&path, source).unwrap();
        let processor = CallProcessor::new(&ingestor, "/repo", "proj", &resolver, &inference);
        processor.process_file(&path, language, &tree, source);
        (ingestor, resolver)
    }

    #[test]
    fn python_calls_attribute_to_innermost_context() {
        let source = "\
top()

def outer():
    middle()
    def inner():
        deep()

class C:
    def run(self):
        self.go()
";
        let (ingestor, _) = run("m.py", source);
        let mut froms: Vec<(String, String)> = ingestor
            .edges()
            .into_iter()
            .map(|(label, value, _, _, _)| (label, value))
            .collect();
        froms.sort();
        assert_eq!(
            froms,
            vec![
                ("Function".to_string(), "proj.m.outer".to_string()),
                ("Function".to_string(), "proj.m.outer.inner".to_string()),
                ("Method".to_string(), "proj.m.C.run".to_string()),
                ("Module".to_string(), "proj.m".to_string()),
            ]
        );
    }

    #[test]
    fn every_call_is_attributed_exactly_once() {
        let source = "\
def a():
    one()
    two()

def b():
    three()
";
        let (ingestor, _) = run("m.py", source);
        let edges = ingestor.edges();
        assert_eq!(edges.len(), 3);
        let from_a = edges.iter().filter(|e| e.1 == "proj.m.a").count();
        assert_eq!(from_a, 2);
    }

    #[test]
    fn method_context_carries_its_class() {
        let source = "\
class Service:
    def start(self):
        helper()
";
        let (_, resolver) = run("m.py", source);
        let seen = resolver.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "helper");
        assert_eq!(seen[0].1.as_deref(), Some("proj.m.Service"));
    }

    #[test]
    fn attribute_call_keeps_receiver_prefix() {
        let source = "\
def f(client):
    client.fetch()
";
        let (_, resolver) = run("m.py", source);
        let seen = resolver.seen.lock().unwrap().clone();
        assert_eq!(seen[0].0, "client.fetch");
    }

    #[test]
    fn rust_impl_methods_are_method_contexts() {
        let source = "\
struct Server;

impl Server {
    fn start(&self) {
        helper();
    }
}

fn helper() {
    ping();
}
";
        let (ingestor, _) = run("srv.rs", source);
        let mut froms: Vec<String> = ingestor.edges().into_iter().map(|e| e.1).collect();
        froms.sort();
        assert_eq!(froms, vec!["proj.srv.Server.start", "proj.srv.helper"]);
    }

    #[test]
    fn rust_method_call_uses_trailing_field_name() {
        let source = "\
fn f(conn: Conn) {
    conn.send();
}
";
        let (_, resolver) = run("m.rs", source);
        let seen = resolver.seen.lock().unwrap().clone();
        assert_eq!(seen[0].0, "send");
    }

    #[test]
    fn java_method_invocation_splits_receiver() {
        let source = "\
class App {
    void run() {
        server.start();
        helper();
    }
}
";
        let (ingestor, _) = run("App.java", source);
        let mut tos: Vec<String> = ingestor.edges().into_iter().map(|e| e.4).collect();
        tos.sort();
        assert_eq!(tos, vec!["ext.helper", "ext.server#start"]);
    }

    #[test]
    fn javascript_iife_gets_synthetic_name() {
        let source = "(function() { return 1; })();\n";
        let (_, resolver) = run("m.js", source);
        let seen = resolver.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].0.starts_with("iife_fn_0_"), "got {}", seen[0].0);
    }

    #[test]
    fn cpp_operator_expression_names_the_overload() {
        struct OperatorOnly;
        impl CallResolver for OperatorOnly {
            fn resolve_function_call(
                &self,
                _: &str,
                _: &str,
                _: &HashMap<String, String>,
                _: Option<&str>,
            ) -> Option<ResolvedCallee> {
                None
            }
            fn resolve_method_invocation(
                &self,
                _: Option<&str>,
                _: &str,
                _: &str,
                _: &HashMap<String, String>,
            ) -> Option<ResolvedCallee> {
                None
            }
            fn resolve_builtin(&self, _: &str) -> Option<ResolvedCallee> {
                None
            }
            fn resolve_operator(&self, call_name: &str, _: &str) -> Option<ResolvedCallee> {
                Some(ResolvedCallee::new(
                    NodeLabel::Method,
                    format!("ops.{call_name}"),
                ))
            }
        }

        let ingestor = RecordingIngestor::default();
        let resolver = OperatorOnly;
        let inference = NoInference;
        let source = "\
int apply(Vec a, Vec b) {
    return a + b;
}
";
        let path = Path::new("/repo/math.cpp");
        let (language, tree) = parse_source(path, source).unwrap();
        let processor = CallProcessor::new(&ingestor, "/repo", "proj", &resolver, &inference);
        processor.process_file(path, language, &tree, source);

        let tos: Vec<String> = ingestor.edges().into_iter().map(|e| e.4).collect();
        assert!(tos.contains(&"ops.operator+".to_string()), "got {tos:?}");
    }

    #[test]
    fn file_outside_repo_root_is_swallowed() {
        let ingestor = RecordingIngestor::default();
        let resolver = EchoResolver::default();
        let inference = NoInference;
        let source = "def f():\n    g()\n";
        let path = Path::new("/elsewhere/m.py");
        let (language, tree) = parse_source(path, source).unwrap();
        let processor = CallProcessor::new(&ingestor, "/repo", "proj", &resolver, &inference);
        // Must log and continue, not panic or propagate.
        processor.process_file(path, language, &tree, source);
        assert!(ingestor.edges().is_empty());
    }

    #[test]
    fn nested_function_qualified_names_chain() {
        let source = "\
def l1():
    def l2():
        def l3():
            leaf()
";
        let (ingestor, _) = run("m.py", source);
        let edges = ingestor.edges();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].1, "proj.m.l1.l2.l3");
    }

    #[test]
    fn index_style_file_uses_parent_module_name() {
        let source = "boot()\n";
        let ingestor = RecordingIngestor::default();
        let resolver = EchoResolver::default();
        let inference = NoInference;
        let path = Path::new("/repo/pkg/__init__.py");
        let (language, tree) = parse_source(path, source).unwrap();
        let processor = CallProcessor::new(&ingestor, "/repo", "proj", &resolver, &inference);
        processor.process_file(path, language, &tree, source);
        assert_eq!(ingestor.edges()[0].1, "proj.pkg");
    }

    #[test]
    fn operator_table_is_closed() {
        assert_eq!(operator_symbol_to_name("+"), Some("operator+".to_string()));
        assert_eq!(operator_symbol_to_name("<<"), Some("operator<<".to_string()));
        assert_eq!(operator_symbol_to_name("?:"), None);
    }
}
