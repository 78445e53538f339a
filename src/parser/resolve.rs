//
//  resolve.rs
//  Trellis
//
//  Created by hak (tharun)
//

use std::collections::HashMap;

use tree_sitter::Node;

use super::language::SupportedLanguage;
use crate::graph::types::NodeLabel;

/// A resolved call target: its node kind and qualified name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCallee {
    pub label: NodeLabel,
    pub qualified_name: String,
}

impl ResolvedCallee {
    pub fn new(label: NodeLabel, qualified_name: impl Into<String>) -> Self {
        Self {
            label,
            qualified_name: qualified_name.into(),
        }
    }
}

/// Symbol-resolution strategy. The call processor treats this as a black
/// box; resolution order and precision are the implementation's choice.
pub trait CallResolver: Send + Sync {
    /// Resolve a call by extracted name, given the caller's module, its
    /// local variable types, and its class context if it is a method.
    fn resolve_function_call(
        &self,
        call_name: &str,
        module_qn: &str,
        local_types: &HashMap<String, String>,
        class_context: Option<&str>,
    ) -> Option<ResolvedCallee>;

    /// Language-aware method-invocation resolution (receiver + method
    /// name split out by the caller).
    fn resolve_method_invocation(
        &self,
        object: Option<&str>,
        method: &str,
        module_qn: &str,
        local_types: &HashMap<String, String>,
    ) -> Option<ResolvedCallee>;

    /// Resolve a known-builtin name.
    fn resolve_builtin(&self, call_name: &str) -> Option<ResolvedCallee>;

    /// Resolve a known operator overload (`operator+`-style names).
    fn resolve_operator(&self, call_name: &str, module_qn: &str) -> Option<ResolvedCallee>;
}

/// Local-variable type map builder, invoked once per caller context.
pub trait TypeInference: Send + Sync {
    fn build_local_variable_types(
        &self,
        caller: Node<'_>,
        source: &[u8],
        module_qn: &str,
        language: SupportedLanguage,
    ) -> HashMap<String, String>;
}

/// Type inference that infers nothing. The baseline: resolution then
/// rests entirely on the registry.
#[derive(Debug, Default)]
pub struct NoInference;

impl TypeInference for NoInference {
    fn build_local_variable_types(
        &self,
        _caller: Node<'_>,
        _source: &[u8],
        _module_qn: &str,
        _language: SupportedLanguage,
    ) -> HashMap<String, String> {
        HashMap::new()
    }
}

/// Every definition the structure pass registered, indexed for lookup.
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    exact: HashMap<String, NodeLabel>,
    by_name: HashMap<String, Vec<String>>,
}

impl FunctionRegistry {
    pub fn insert(&mut self, label: NodeLabel, qualified_name: &str) {
        if self.exact.contains_key(qualified_name) {
            return;
        }
        self.exact.insert(qualified_name.to_string(), label);
        if let Some(trailing) = qualified_name.rsplit('.').next() {
            self.by_name
                .entry(trailing.to_string())
                .or_default()
                .push(qualified_name.to_string());
        }
    }

    pub fn get(&self, qualified_name: &str) -> Option<NodeLabel> {
        self.exact.get(qualified_name).copied()
    }

    /// All qualified names whose trailing segment is `name`.
    pub fn candidates(&self, name: &str) -> &[String] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty()
    }
}

/// Registry-backed resolver.
///
/// Lookup order: receiver-qualified names through local types and the
/// class context, then module-local, then class-local, then a unique
/// trailing-name match. Ambiguous trailing names are declined rather
/// than guessed — disambiguation belongs to a type-aware resolver.
pub struct RegistryResolver<'r> {
    registry: &'r FunctionRegistry,
}

impl<'r> RegistryResolver<'r> {
    pub fn new(registry: &'r FunctionRegistry) -> Self {
        Self { registry }
    }

    fn lookup(&self, qualified_name: &str) -> Option<ResolvedCallee> {
        self.registry
            .get(qualified_name)
            .map(|label| ResolvedCallee::new(label, qualified_name))
    }

    fn unique_trailing(&self, name: &str) -> Option<ResolvedCallee> {
        match self.registry.candidates(name) {
            [only] => self.lookup(only),
            _ => None,
        }
    }
}

impl CallResolver for RegistryResolver<'_> {
    fn resolve_function_call(
        &self,
        call_name: &str,
        module_qn: &str,
        local_types: &HashMap<String, String>,
        class_context: Option<&str>,
    ) -> Option<ResolvedCallee> {
        if let Some((receiver, method)) = call_name.rsplit_once('.') {
            if matches!(receiver, "self" | "this") {
                if let Some(class_qn) = class_context {
                    if let Some(found) = self.lookup(&format!("{class_qn}.{method}")) {
                        return Some(found);
                    }
                }
            }
            if let Some(type_qn) = local_types.get(receiver) {
                if let Some(found) = self.lookup(&format!("{type_qn}.{method}")) {
                    return Some(found);
                }
            }
            // The name may already be fully qualified relative to the
            // module or the project.
            if let Some(found) = self.lookup(&format!("{module_qn}.{call_name}")) {
                return Some(found);
            }
            if let Some(found) = self.lookup(call_name) {
                return Some(found);
            }
            return self.unique_trailing(method);
        }

        if let Some(found) = self.lookup(&format!("{module_qn}.{call_name}")) {
            return Some(found);
        }
        if let Some(class_qn) = class_context {
            if let Some(found) = self.lookup(&format!("{class_qn}.{call_name}")) {
                return Some(found);
            }
        }
        self.unique_trailing(call_name)
    }

    fn resolve_method_invocation(
        &self,
        object: Option<&str>,
        method: &str,
        module_qn: &str,
        local_types: &HashMap<String, String>,
    ) -> Option<ResolvedCallee> {
        if let Some(object) = object {
            if let Some(type_qn) = local_types.get(object) {
                if let Some(found) = self.lookup(&format!("{type_qn}.{method}")) {
                    return Some(found);
                }
            }
        }
        self.resolve_function_call(method, module_qn, local_types, None)
    }

    fn resolve_builtin(&self, _call_name: &str) -> Option<ResolvedCallee> {
        None
    }

    fn resolve_operator(&self, call_name: &str, module_qn: &str) -> Option<ResolvedCallee> {
        if !call_name.starts_with("operator") {
            return None;
        }
        self.lookup(&format!("{module_qn}.{call_name}"))
            .or_else(|| self.unique_trailing(call_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> FunctionRegistry {
        let mut r = FunctionRegistry::default();
        r.insert(NodeLabel::Function, "proj.app.main");
        r.insert(NodeLabel::Function, "proj.util.helper");
        r.insert(NodeLabel::Method, "proj.app.Server.start");
        r.insert(NodeLabel::Method, "proj.app.Client.start");
        r
    }

    #[test]
    fn module_local_lookup_wins() {
        let r = registry();
        let resolver = RegistryResolver::new(&r);
        let hit = resolver
            .resolve_function_call("main", "proj.app", &HashMap::new(), None)
            .unwrap();
        assert_eq!(hit.qualified_name, "proj.app.main");
        assert_eq!(hit.label, NodeLabel::Function);
    }

    #[test]
    fn self_receiver_uses_class_context() {
        let r = registry();
        let resolver = RegistryResolver::new(&r);
        let hit = resolver
            .resolve_function_call(
                "self.start",
                "proj.app",
                &HashMap::new(),
                Some("proj.app.Server"),
            )
            .unwrap();
        assert_eq!(hit.qualified_name, "proj.app.Server.start");
        assert_eq!(hit.label, NodeLabel::Method);
    }

    #[test]
    fn receiver_type_disambiguates() {
        let r = registry();
        let resolver = RegistryResolver::new(&r);
        let locals = HashMap::from([("client".to_string(), "proj.app.Client".to_string())]);
        let hit = resolver
            .resolve_function_call("client.start", "proj.app", &locals, None)
            .unwrap();
        assert_eq!(hit.qualified_name, "proj.app.Client.start");
    }

    #[test]
    fn ambiguous_trailing_name_is_declined() {
        let r = registry();
        let resolver = RegistryResolver::new(&r);
        // Two classes define `start`; without type info, decline.
        assert!(resolver
            .resolve_function_call("start", "proj.other", &HashMap::new(), None)
            .is_none());
    }

    #[test]
    fn unique_trailing_name_resolves_cross_module() {
        let r = registry();
        let resolver = RegistryResolver::new(&r);
        let hit = resolver
            .resolve_function_call("helper", "proj.app", &HashMap::new(), None)
            .unwrap();
        assert_eq!(hit.qualified_name, "proj.util.helper");
    }

    #[test]
    fn method_invocation_prefers_typed_receiver() {
        let r = registry();
        let resolver = RegistryResolver::new(&r);
        let locals = HashMap::from([("srv".to_string(), "proj.app.Server".to_string())]);
        let hit = resolver
            .resolve_method_invocation(Some("srv"), "start", "proj.app", &locals)
            .unwrap();
        assert_eq!(hit.qualified_name, "proj.app.Server.start");
    }

    #[test]
    fn first_registry_insert_wins() {
        let mut r = FunctionRegistry::default();
        r.insert(NodeLabel::Function, "proj.a.f");
        r.insert(NodeLabel::Method, "proj.a.f");
        assert_eq!(r.get("proj.a.f"), Some(NodeLabel::Function));
        assert_eq!(r.candidates("f").len(), 1);
    }
}
