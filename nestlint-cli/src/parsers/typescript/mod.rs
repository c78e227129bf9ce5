//! TypeScript/JavaScript parser and declaration classifier using tree-sitter
//!
//! Parses one file and walks the tree once, producing [`FileFacts`]: classified
//! classes, call sites, string-literal assignments and import statements.

use super::facts::{
    CallFact, ClassFact, DeclKind, DecoratorFact, FileFacts, ImportFact, LiteralAssignment,
    MethodFact, ModuleMetadata, ParamFact,
};
use anyhow::{Context, Result};
use std::rc::Rc;
use tree_sitter::{Language, Node, Parser, Tree};

/// Grammar for a file extension
fn language_for(ext: &str) -> Language {
    match ext {
        "ts" | "mts" | "cts" => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        "tsx" => tree_sitter_typescript::LANGUAGE_TSX.into(),
        "js" | "jsx" | "mjs" | "cjs" => tree_sitter_javascript::LANGUAGE.into(),
        _ => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
    }
}

/// Parse source text and classify its declarations.
///
/// Syntax errors do not fail the parse; they set
/// [`FileFacts::has_syntax_errors`].
pub fn parse_source(source: &str, ext: &str) -> Result<(Tree, FileFacts)> {
    let mut parser = Parser::new();
    let language = language_for(ext);
    parser
        .set_language(&language)
        .context("Failed to set TypeScript/JavaScript language")?;

    let tree = parser
        .parse(source, None)
        .context("Failed to parse source")?;

    let root = tree.root_node();
    let mut collector = FactCollector {
        source,
        facts: FileFacts {
            has_syntax_errors: root.has_error(),
            ..Default::default()
        },
    };
    collector.visit(root);

    let facts = collector.facts;
    Ok((tree, facts))
}

/// Enclosing class and method of the node being visited
#[derive(Default)]
struct Scope {
    class: Option<String>,
    method: Option<String>,
}

struct FactCollector<'a> {
    source: &'a str,
    facts: FileFacts,
}

impl<'a> FactCollector<'a> {
    fn text(&self, node: Node) -> &'a str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    fn column_of(&self, node: Node) -> u32 {
        column_at(self.source, node.start_byte())
    }

    /// Pre-order walk with an explicit stack so nesting depth is bounded by
    /// heap, not by the thread stack.
    fn visit<'t>(&mut self, root: Node<'t>) {
        let mut stack: Vec<(Node<'t>, Rc<Scope>)> = vec![(root, Rc::new(Scope::default()))];
        while let Some((node, scope)) = stack.pop() {
            let (container, child_scope) = match node.kind() {
                "class_declaration" | "abstract_class_declaration" | "class" => {
                    match self.class_fact(node) {
                        Some(class) => {
                            let inner = Scope {
                                class: Some(class.name.clone()),
                                method: None,
                            };
                            self.facts.classes.push(class);
                            match node.child_by_field_name("body") {
                                Some(body) => (body, Rc::new(inner)),
                                None => continue,
                            }
                        }
                        None => (node, scope),
                    }
                }
                "method_definition" => {
                    let inner = Scope {
                        class: scope.class.clone(),
                        method: node
                            .child_by_field_name("name")
                            .map(|n| self.text(n).to_string()),
                    };
                    (node, Rc::new(inner))
                }
                kind => {
                    self.record(kind, node, &scope);
                    (node, scope)
                }
            };

            let first = stack.len();
            let mut cursor = container.walk();
            for child in container.children(&mut cursor) {
                stack.push((child, Rc::clone(&child_scope)));
            }
            stack[first..].reverse();
        }
    }

    fn record(&mut self, kind: &str, node: Node, scope: &Scope) {
        match kind {
            "call_expression" => self.record_call(node, scope),
            "import_statement" => self.record_import(node),
            "variable_declarator" => {
                self.record_literal(node.child_by_field_name("name"), node.child_by_field_name("value"))
            }
            "public_field_definition" | "field_definition" => {
                let name = node
                    .child_by_field_name("name")
                    .or_else(|| node.child_by_field_name("property"));
                self.record_literal(name, node.child_by_field_name("value"))
            }
            "pair" => {
                self.record_literal(node.child_by_field_name("key"), node.child_by_field_name("value"))
            }
            "assignment_expression" => {
                let left = node.child_by_field_name("left").map(|l| {
                    if l.kind() == "member_expression" {
                        l.child_by_field_name("property").unwrap_or(l)
                    } else {
                        l
                    }
                });
                self.record_literal(left, node.child_by_field_name("right"))
            }
            _ => {}
        }
    }

    fn record_call(&mut self, node: Node, scope: &Scope) {
        let Some(function) = node.child_by_field_name("function") else {
            return;
        };
        let callee = self.text(function);
        if callee.is_empty() || function.kind() == "super" {
            return;
        }
        self.facts.calls.push(CallFact {
            callee: callee.to_string(),
            line: line_of(node),
            column: self.column_of(node),
            class: scope.class.clone(),
            method: scope.method.clone(),
        });
    }

    fn record_literal(&mut self, name: Option<Node>, value: Option<Node>) {
        let (Some(name), Some(value)) = (name, value) else {
            return;
        };
        if value.kind() != "string" {
            return;
        }
        let key = unquote(self.text(name));
        if key.is_empty() {
            return;
        }
        self.facts.literal_assignments.push(LiteralAssignment {
            name: key.to_string(),
            value: unquote(self.text(value)).to_string(),
            line: line_of(value),
            column: self.column_of(value),
        });
    }

    fn record_import(&mut self, node: Node) {
        let Some(source) = node.child_by_field_name("source") else {
            return;
        };
        let mut names = Vec::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "import_clause" {
                self.collect_import_names(child, &mut names);
            }
        }
        self.facts.imports.push(ImportFact {
            source: unquote(self.text(source)).to_string(),
            names,
            line: line_of(node),
        });
    }

    fn collect_import_names(&self, clause: Node, names: &mut Vec<String>) {
        let mut cursor = clause.walk();
        for child in clause.children(&mut cursor) {
            match child.kind() {
                "identifier" => names.push(self.text(child).to_string()),
                "namespace_import" => {
                    let mut inner = child.walk();
                    for n in child.named_children(&mut inner) {
                        if n.kind() == "identifier" {
                            names.push(self.text(n).to_string());
                        }
                    }
                }
                "named_imports" => {
                    let mut inner = child.walk();
                    for spec in child.named_children(&mut inner) {
                        if spec.kind() == "import_specifier" {
                            if let Some(name) = spec.child_by_field_name("name") {
                                names.push(self.text(name).to_string());
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn class_fact(&self, node: Node) -> Option<ClassFact> {
        let name_node = node.child_by_field_name("name")?;
        let name = self.text(name_node).to_string();
        if name.is_empty() {
            return None;
        }

        let parent = node.parent();
        let exported = parent.map(|p| p.kind() == "export_statement").unwrap_or(false);

        // `@Module() export class X` puts decorators on the export statement
        let mut decorator_nodes = Vec::new();
        if let Some(p) = parent.filter(|_| exported) {
            decorator_nodes.extend(child_decorators(p));
        }
        decorator_nodes.extend(child_decorators(node));

        let decorators: Vec<DecoratorFact> = decorator_nodes
            .iter()
            .filter_map(|d| self.decorator_fact(*d))
            .collect();

        let (extends, implements) = self.heritage(node);

        let mut methods = Vec::new();
        let mut constructor_params = Vec::new();
        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for member in body.children(&mut cursor) {
                match member.kind() {
                    "method_definition" | "method_signature" | "abstract_method_signature" => {
                        let Some(name_node) = member.child_by_field_name("name") else {
                            continue;
                        };
                        if self.text(name_node) == "constructor" {
                            constructor_params = self.constructor_params(member);
                        } else {
                            methods.push(self.method_fact(member, name_node));
                        }
                    }
                    _ => {}
                }
            }
        }

        let module = decorator_nodes
            .iter()
            .find(|d| self.decorator_fact(**d).map(|f| f.name == "Module").unwrap_or(false))
            .map(|d| self.module_metadata(*d));

        let mut kinds: Vec<DeclKind> = Vec::new();
        let candidates = decorators
            .iter()
            .filter_map(|d| DeclKind::from_decorator(&d.name))
            .chain(implements.iter().filter_map(|i| DeclKind::from_interface(i)))
            .chain(DeclKind::from_name_suffix(&name));
        for kind in candidates {
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }

        Some(ClassFact {
            name,
            line: line_of(name_node),
            column: self.column_of(name_node),
            end_line: node.end_position().row as u32 + 1,
            exported,
            kinds,
            decorators,
            extends,
            implements,
            methods,
            constructor_params,
            module,
        })
    }

    /// Decorator name (last segment of the callee, no `@`, no arguments)
    fn decorator_fact(&self, decorator: Node) -> Option<DecoratorFact> {
        let mut cursor = decorator.walk();
        for inner in decorator.named_children(&mut cursor) {
            let (callee, is_call) = match inner.kind() {
                "comment" => continue,
                "call_expression" => (inner.child_by_field_name("function")?, true),
                _ => (inner, false),
            };
            let text = self.text(callee);
            let name = text.rsplit('.').next().unwrap_or(text).trim();
            if name.is_empty() {
                return None;
            }
            return Some(DecoratorFact {
                name: name.to_string(),
                line: line_of(decorator),
                column: self.column_of(decorator),
                is_call,
            });
        }
        None
    }

    /// `extends` target and `implements` list, generics stripped
    fn heritage(&self, class: Node) -> (Option<String>, Vec<String>) {
        let mut extends = None;
        let mut implements = Vec::new();

        let mut cursor = class.walk();
        for child in class.children(&mut cursor) {
            if child.kind() != "class_heritage" {
                continue;
            }
            let mut inner = child.walk();
            for clause in child.named_children(&mut inner) {
                match clause.kind() {
                    "extends_clause" => {
                        extends = clause
                            .child_by_field_name("value")
                            .map(|v| base_type_name(self.text(v)));
                    }
                    "implements_clause" => {
                        let mut types = clause.walk();
                        for ty in clause.named_children(&mut types) {
                            let name = base_type_name(self.text(ty));
                            if !name.is_empty() {
                                implements.push(name);
                            }
                        }
                    }
                    // JavaScript: `class_heritage` holds the expression directly
                    "comment" => {}
                    _ => extends = Some(base_type_name(self.text(clause))),
                }
            }
        }
        (extends, implements)
    }

    fn method_fact(&self, method: Node, name_node: Node) -> MethodFact {
        // The JavaScript grammar nests method decorators inside the method node
        let decorators = preceding_decorators(method)
            .into_iter()
            .chain(child_decorators(method))
            .filter_map(|d| self.decorator_fact(d))
            .collect();

        let mut is_async = false;
        let mut is_static = false;
        let mut cursor = method.walk();
        for child in method.children(&mut cursor) {
            match child.kind() {
                "async" => is_async = true,
                "static" => is_static = true,
                _ => {}
            }
        }

        let param_count = method
            .child_by_field_name("parameters")
            .map(|params| {
                let mut cursor = params.walk();
                let count = params
                    .named_children(&mut cursor)
                    .filter(|p| p.kind() != "comment")
                    .count();
                count
            })
            .unwrap_or(0);

        MethodFact {
            name: self.text(name_node).to_string(),
            line: line_of(name_node),
            column: self.column_of(name_node),
            decorators,
            is_async,
            is_static,
            param_count,
        }
    }

    fn constructor_params(&self, ctor: Node) -> Vec<ParamFact> {
        let Some(params) = ctor.child_by_field_name("parameters") else {
            return Vec::new();
        };

        let mut result = Vec::new();
        let mut cursor = params.walk();
        for param in params.named_children(&mut cursor) {
            match param.kind() {
                "required_parameter" | "optional_parameter" => {
                    let Some(pattern) = param.child_by_field_name("pattern") else {
                        continue;
                    };
                    if pattern.kind() == "this" {
                        continue;
                    }
                    let type_name = param.child_by_field_name("type").map(|t| {
                        self.text(t).trim_start_matches(':').trim().to_string()
                    });
                    let decorators = child_decorators(param)
                        .into_iter()
                        .filter_map(|d| self.decorator_fact(d))
                        .map(|d| d.name)
                        .collect();
                    result.push(ParamFact {
                        name: self.text(pattern).to_string(),
                        type_name,
                        decorators,
                    });
                }
                "identifier" | "assignment_pattern" | "object_pattern" | "array_pattern"
                | "rest_pattern" => result.push(ParamFact {
                    name: self.text(param).to_string(),
                    type_name: None,
                    decorators: Vec::new(),
                }),
                _ => {}
            }
        }
        result
    }

    /// Identifier arrays of the `@Module({...})` argument object
    fn module_metadata(&self, decorator: Node) -> ModuleMetadata {
        let mut metadata = ModuleMetadata::default();

        let mut cursor = decorator.walk();
        let call = decorator
            .named_children(&mut cursor)
            .find(|n| n.kind() == "call_expression");
        let Some(object) = call
            .and_then(|c| c.child_by_field_name("arguments"))
            .and_then(|args| first_named_child(args, "object"))
        else {
            return metadata;
        };

        let mut pairs = object.walk();
        for pair in object.named_children(&mut pairs) {
            if pair.kind() != "pair" {
                continue;
            }
            let (Some(key), Some(value)) = (
                pair.child_by_field_name("key"),
                pair.child_by_field_name("value"),
            ) else {
                continue;
            };
            let target = match unquote(self.text(key)) {
                "imports" => &mut metadata.imports,
                "providers" => &mut metadata.providers,
                "controllers" => &mut metadata.controllers,
                "exports" => &mut metadata.exports,
                _ => continue,
            };
            if value.kind() != "array" {
                continue;
            }
            let mut elements = value.walk();
            for element in value.named_children(&mut elements) {
                if let Some(name) = self.module_ref(element) {
                    target.push(name);
                }
            }
        }
        metadata
    }

    /// Resolve one metadata array element to an identifier.
    ///
    /// `X`, `forwardRef(() => X)`, `X.forRoot(...)` and
    /// `{ provide: X, useClass: Y }` all resolve to `X`.
    fn module_ref(&self, element: Node) -> Option<String> {
        let mut element = element;
        loop {
            match element.kind() {
                "identifier" => return Some(self.text(element).to_string()),
                "parenthesized_expression" => {
                    let mut cursor = element.walk();
                    let inner = element.named_children(&mut cursor).next()?;
                    element = inner;
                }
                "call_expression" => {
                    let function = element.child_by_field_name("function")?;
                    match function.kind() {
                        "identifier" if self.text(function) == "forwardRef" => {
                            let args = element.child_by_field_name("arguments")?;
                            let arrow = first_named_child(args, "arrow_function")?;
                            element = arrow.child_by_field_name("body")?;
                        }
                        "member_expression" => {
                            let object = function.child_by_field_name("object")?;
                            return (object.kind() == "identifier")
                                .then(|| self.text(object).to_string());
                        }
                        _ => return None,
                    }
                }
                "object" => return self.provider_token(element),
                _ => return None,
            }
        }
    }

    /// `{ provide: X, useClass: Y }` -> `X`, falling back to `Y`
    fn provider_token(&self, object: Node) -> Option<String> {
        let mut cursor = object.walk();
        let mut provide = None;
        let mut use_class = None;
        for pair in object.named_children(&mut cursor) {
            if pair.kind() != "pair" {
                continue;
            }
            let key = pair.child_by_field_name("key").map(|k| unquote(self.text(k)));
            let value = pair.child_by_field_name("value");
            match (key, value) {
                (Some("provide"), Some(v)) if v.kind() == "identifier" => {
                    provide = Some(self.text(v).to_string())
                }
                (Some("provide"), Some(v)) if v.kind() == "string" => {
                    provide = Some(unquote(self.text(v)).to_string())
                }
                (Some("useClass"), Some(v)) if v.kind() == "identifier" => {
                    use_class = Some(self.text(v).to_string())
                }
                _ => {}
            }
        }
        provide.or(use_class)
    }
}

fn line_of(node: Node) -> u32 {
    node.start_position().row as u32 + 1
}

/// 1-based column of a byte offset, counted in characters
pub fn column_at(source: &str, offset: usize) -> u32 {
    let offset = offset.min(source.len());
    let line_start = source.as_bytes()[..offset]
        .iter()
        .rposition(|b| *b == b'\n')
        .map(|nl| nl + 1)
        .unwrap_or(0);
    let chars = source
        .get(line_start..offset)
        .map(|text| text.chars().count())
        .unwrap_or(offset - line_start);
    chars as u32 + 1
}

fn unquote(text: &str) -> &str {
    text.trim_matches(|c| c == '"' || c == '\'' || c == '`')
}

/// `Repository<User>` -> `Repository`, `ns.Base` -> `Base`
fn base_type_name(text: &str) -> String {
    let head = text.split('<').next().unwrap_or(text).trim();
    head.rsplit('.').next().unwrap_or(head).to_string()
}

fn first_named_child<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    let found = node.named_children(&mut cursor).find(|n| n.kind() == kind);
    found
}

/// Decorator nodes that are direct children of `node`
fn child_decorators(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .filter(|c| c.kind() == "decorator")
        .collect();
    found
}

/// TypeScript method decorators are preceding siblings inside `class_body`
fn preceding_decorators(node: Node) -> Vec<Node> {
    let mut decorators = Vec::new();
    let mut sibling = node.prev_sibling();
    while let Some(sib) = sibling {
        if sib.kind() != "decorator" {
            break;
        }
        decorators.push(sib);
        sibling = sib.prev_sibling();
    }
    decorators.reverse();
    decorators
}

#[cfg(test)]
mod tests;
