//! Context collection for out-of-place evaluation.
//!
//! To evaluate an expression somewhere other than where it appears, every declaration
//! and side effect it depends on has to be replayed first. [`ContextCollector::collect`]
//! finds that set with a breadth-first walk over a dependency graph built on the fly:
//!
//! - identifiers lead to their declaration and to every reference that may change the
//!   binding (plain and property assignments, updates, mutating method calls, calls
//!   passing the binding as an argument),
//! - member expressions lead to their object and computed property,
//! - scope-creating nodes lead to every free variable referenced across their boundary,
//! - collected nodes lead to the identifiers they use.
//!
//! Function declarations and expressions, arrow functions, calls, assignments, updates,
//! class declarations and variable declarators are collected. The result is pruned of
//! nodes nested in other collected nodes and ordered by source position.
//!
//! If anything on the way is already marked for mutation the collection yields an empty
//! set. Evaluating against code that is about to change could produce a wrong value.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    rc::Rc,
};

use crate::{
    arborist::Arborist,
    ast::{content_hash, Ast, NodeId, NodeKind, NodeType},
    oracle::PROPERTIES_THAT_MODIFY_CONTENT,
};

/// Ordered, deduplicated statements that must run before an expression can be
/// evaluated in isolation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextSet {
    nodes: Vec<NodeId>,
}

impl ContextSet {
    /// An empty context.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the collected nodes in source order.
    #[must_use]
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Number of collected nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns `true` if `id` is part of the context.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(&id)
    }

    /// Renders the context as a runnable statement list.
    ///
    /// Declarators are replayed as `var` declarations and bare expressions get a
    /// terminating semicolon.
    #[must_use]
    pub fn source(&self, ast: &Ast) -> String {
        let mut out = String::new();
        for &id in &self.nodes {
            let text = ast.text(id);
            match ast.kind(id) {
                NodeKind::VariableDeclarator { .. } => {
                    out.push_str("var ");
                    out.push_str(&text);
                    out.push(';');
                }
                kind if kind.is_statement() => {
                    out.push_str(&text);
                    if !text.ends_with([';', '}']) {
                        out.push(';');
                    }
                }
                NodeKind::FunctionExpression { .. }
                | NodeKind::ArrowFunctionExpression { .. }
                | NodeKind::ClassExpression { .. } => {
                    out.push('(');
                    out.push_str(&text);
                    out.push_str(");");
                }
                _ => {
                    out.push_str(&text);
                    out.push(';');
                }
            }
            out.push('\n');
        }
        out
    }
}

/// Per-script cache of collected contexts.
///
/// Entries are reachable by the origin's id and by the hash of the origin's text, so
/// identical expressions at different positions share one collection. Everything is
/// dropped when the script hash changes.
#[derive(Debug, Default)]
pub struct ContextCache {
    script_hash: String,
    by_id: HashMap<(NodeId, bool), Rc<ContextSet>>,
    by_text: HashMap<(String, bool), Rc<ContextSet>>,
}

impl ContextCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn sync(&mut self, ast: &Ast) {
        if self.script_hash != ast.hash() {
            self.clear();
            self.script_hash = ast.hash().to_string();
        }
    }

    fn get(&self, origin: NodeId, text_hash: &str, exclude_origin: bool) -> Option<Rc<ContextSet>> {
        self.by_id
            .get(&(origin, exclude_origin))
            .or_else(|| self.by_text.get(&(text_hash.to_string(), exclude_origin)))
            .cloned()
    }

    fn insert(&mut self, origin: NodeId, text_hash: String, exclude_origin: bool, set: Rc<ContextSet>) {
        self.by_id.insert((origin, exclude_origin), Rc::clone(&set));
        self.by_text.insert((text_hash, exclude_origin), set);
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_text.clear();
        self.script_hash.clear();
    }

    /// Number of cached collections (by id).
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Collects evaluation contexts, caching results per script version.
///
/// # Examples
///
/// ```rust
/// use unravel::{ast::{Ast, NodeType}, context::ContextCollector, Arborist};
///
/// let ast = Ast::parse("const a = ['x']; const b = a[0];")?;
/// let member = ast.nodes_of(NodeType::MemberExpression)[0];
/// let mut collector = ContextCollector::new();
/// let context = collector.collect(&ast, &Arborist::new(), member, true);
/// assert_eq!(context.source(&ast), "const a = ['x'];\n");
/// # Ok::<(), unravel::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct ContextCollector {
    cache: ContextCache,
    hits: usize,
}

impl ContextCollector {
    /// Creates a collector with an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops all cached contexts.
    pub fn reset(&mut self) {
        self.cache.clear();
    }

    /// Number of collections answered from the cache.
    #[must_use]
    pub fn cache_hits(&self) -> usize {
        self.hits
    }

    /// Returns the context needed to evaluate `origin` in isolation.
    ///
    /// # Arguments
    ///
    /// * `ast` - The current tree.
    /// * `arborist` - Pending marks; a context touching a marked node is empty.
    /// * `origin` - The node to be evaluated or inlined.
    /// * `exclude_origin` - Drop collected nodes that contain `origin` itself.
    #[must_use]
    pub fn collect(
        &mut self,
        ast: &Ast,
        arborist: &Arborist,
        origin: NodeId,
        exclude_origin: bool,
    ) -> ContextSet {
        self.cache.sync(ast);
        let text_hash = content_hash(&ast.text(origin));

        if let Some(cached) = self.cache.get(origin, &text_hash, exclude_origin) {
            self.hits += 1;
            if cached.nodes.iter().any(|&n| arborist.is_marked_within(ast, n)) {
                return ContextSet::empty();
            }
            return (*cached).clone();
        }

        let Some(set) = gather(ast, arborist, origin, exclude_origin) else {
            return ContextSet::empty();
        };
        let set = Rc::new(set);
        self.cache
            .insert(origin, text_hash, exclude_origin, Rc::clone(&set));
        (*set).clone()
    }
}

fn is_collected(kind: &NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::CallExpression { .. }
            | NodeKind::FunctionDeclaration { .. }
            | NodeKind::FunctionExpression { .. }
            | NodeKind::ArrowFunctionExpression { .. }
            | NodeKind::AssignmentExpression { .. }
            | NodeKind::UpdateExpression { .. }
            | NodeKind::VariableDeclarator { .. }
            | NodeKind::ClassDeclaration { .. }
    )
}

/// Returns `None` when a marked node was reached.
fn gather(ast: &Ast, arborist: &Arborist, origin: NodeId, exclude_origin: bool) -> Option<ContextSet> {
    let mut queue = VecDeque::from([origin]);
    let mut visited = HashSet::new();
    let mut collected = Vec::new();
    let mut guards = HashSet::new();

    while let Some(node) = queue.pop_front() {
        if !visited.insert(node) {
            continue;
        }
        if arborist.is_marked_within(ast, node) {
            return None;
        }

        let mut targets = Vec::new();
        match ast.kind(node) {
            NodeKind::Identifier { .. } => {
                let decl = ast.decl(node).or_else(|| {
                    (!ast.references(node).is_empty()).then_some(node)
                });
                if let Some(decl) = decl {
                    targets.push(decl);
                    for site in ast
                        .references(decl)
                        .iter()
                        .filter_map(|&r| mutation_site(ast, r))
                    {
                        targets.push(site);
                        if let Some(guard) = guard_of(ast, site, decl, origin) {
                            guards.insert(guard);
                            targets.push(guard);
                        }
                    }
                }
            }
            NodeKind::MemberExpression {
                object,
                property,
                computed,
                ..
            } => {
                targets.push(*object);
                if *computed {
                    targets.push(*property);
                }
            }
            _ => {}
        }

        if let Some(scope) = ast.scope_of(node).filter(|s| s.block == node) {
            targets.extend(scope.through.iter().copied());
        }

        if is_collected(ast.kind(node)) || guards.contains(&node) {
            collected.push(node);
            targets.extend(free_identifiers(ast, node));
        }

        for target in targets {
            if visited.contains(&target) {
                continue;
            }
            queue.push_back(target);
            if let Some(relevant) = relevant_ancestor(ast, target) {
                queue.push_back(relevant);
            }
        }
    }

    collected.sort_unstable();
    collected.dedup();
    let pruned: Vec<NodeId> = collected
        .iter()
        .copied()
        .filter(|&n| {
            !collected
                .iter()
                .any(|&other| other != n && ast.is_ancestor(other, n))
        })
        .filter(|&n| !(exclude_origin && ast.is_ancestor(n, origin)))
        .map(|n| statement_of(ast, n))
        .collect();

    let mut nodes = pruned;
    nodes.sort_unstable();
    nodes.dedup();
    Some(ContextSet { nodes })
}

/// Identifiers inside `node` that refer to bindings declared outside of it.
fn free_identifiers(ast: &Ast, node: NodeId) -> Vec<NodeId> {
    ast.descendants(node)
        .into_iter()
        .filter(|&d| ast.node_type(d) == NodeType::Identifier)
        .filter(|&d| ast.decl(d).is_some_and(|decl| !ast.is_ancestor(node, decl)))
        .collect()
}

/// The node that changes the binding `reference` points at, if any.
fn mutation_site(ast: &Ast, reference: NodeId) -> Option<NodeId> {
    let parent = ast.parent(reference)?;
    match ast.kind(parent) {
        NodeKind::AssignmentExpression { left, .. } if *left == reference => Some(parent),
        NodeKind::UpdateExpression { .. } => Some(parent),
        NodeKind::CallExpression { arguments, .. } if arguments.contains(&reference) => {
            Some(parent)
        }
        NodeKind::MemberExpression { object, .. } if *object == reference => {
            let outer = ast.parent(parent)?;
            match ast.kind(outer) {
                NodeKind::AssignmentExpression { left, .. } if *left == parent => Some(outer),
                NodeKind::UpdateExpression { .. } => Some(outer),
                NodeKind::CallExpression { callee, .. } if *callee == parent => {
                    let name = member_name(ast, parent)?;
                    PROPERTIES_THAT_MODIFY_CONTENT
                        .contains(&name.as_str())
                        .then_some(outer)
                }
                _ => None,
            }
        }
        _ => None,
    }
}

/// Outermost conditional or loop that decides whether the mutation `site` of `decl`
/// runs, when `origin` is not under it too. Replaying `site` without it would apply
/// the mutation unconditionally.
///
/// The walk stops at the first function boundary (calls to the function decide
/// instead) and at the first node that also holds the declaration.
fn guard_of(ast: &Ast, site: NodeId, decl: NodeId, origin: NodeId) -> Option<NodeId> {
    ast.ancestors(site)
        .take_while(|&n| !ast.kind(n).is_function() && !ast.is_ancestor(n, decl))
        .filter(|&n| is_guard(ast.kind(n)) && !ast.is_ancestor(n, origin))
        .last()
}

fn is_guard(kind: &NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::IfStatement { .. }
            | NodeKind::SwitchStatement { .. }
            | NodeKind::TryStatement { .. }
            | NodeKind::WhileStatement { .. }
            | NodeKind::DoWhileStatement { .. }
            | NodeKind::ForStatement { .. }
            | NodeKind::ForInStatement { .. }
            | NodeKind::ForOfStatement { .. }
            | NodeKind::LogicalExpression { .. }
            | NodeKind::ConditionalExpression { .. }
    )
}

fn member_name(ast: &Ast, member: NodeId) -> Option<String> {
    let NodeKind::MemberExpression {
        property, computed, ..
    } = ast.kind(member)
    else {
        return None;
    };
    match ast.kind(*property) {
        NodeKind::Identifier { name } if !computed => Some(name.clone()),
        kind => kind.string_value().map(str::to_string),
    }
}

/// Closest ancestor (or self) worth replaying for `node`.
fn relevant_ancestor(ast: &Ast, node: NodeId) -> Option<NodeId> {
    std::iter::once(node)
        .chain(ast.ancestors(node))
        .take_while(|&n| n == node || !ast.kind(n).is_statement() || is_collected(ast.kind(n)))
        .find(|&n| is_collected(ast.kind(n)))
}

/// Widens a collected expression to the statement holding it when nothing else lives
/// in that statement.
fn statement_of(ast: &Ast, node: NodeId) -> NodeId {
    let Some(parent) = ast.parent(node) else {
        return node;
    };
    match ast.kind(parent) {
        NodeKind::ExpressionStatement { .. } => parent,
        NodeKind::VariableDeclaration { declarations, .. } if declarations.len() == 1 => parent,
        _ => node,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_of(source: &str, ty: NodeType, index: usize) -> crate::Result<String> {
        let ast = Ast::parse(source)?;
        let origin = ast.nodes_of(ty)[index];
        let mut collector = ContextCollector::new();
        Ok(collector
            .collect(&ast, &Arborist::new(), origin, true)
            .source(&ast))
    }

    #[test]
    fn test_declaration_is_collected() -> crate::Result<()> {
        let context = context_of(
            "const a = ['hello']; const b = a[0];",
            NodeType::MemberExpression,
            0,
        )?;
        assert_eq!(context, "const a = ['hello'];\n");
        Ok(())
    }

    #[test]
    fn test_transitive_free_variables() -> crate::Result<()> {
        let context = context_of(
            "var k = 3; function f(x) { return x * k; } var unrelated = 1; f(2);",
            NodeType::CallExpression,
            0,
        )?;
        assert!(context.contains("var k = 3;"));
        assert!(context.contains("function f(x)"));
        assert!(!context.contains("unrelated"));
        let k = context.find("var k").unwrap_or(usize::MAX);
        let f = context.find("function f").unwrap_or(0);
        assert!(k < f);
        Ok(())
    }

    #[test]
    fn test_mutations_are_collected() -> crate::Result<()> {
        let context = context_of(
            "var a = [1, 2]; a.push(3); a.x = 1; g(a); a[0];",
            NodeType::MemberExpression,
            2,
        )?;
        assert!(context.contains("a.push(3);"));
        assert!(context.contains("a.x = 1;"));
        assert!(context.contains("g(a);"));
        Ok(())
    }

    #[test]
    fn test_guarded_mutation_keeps_its_guard() -> crate::Result<()> {
        let context = context_of(
            "var c = g(); var a = [1]; if (c) a[0] = 2; f(a[0]);",
            NodeType::MemberExpression,
            1,
        )?;
        assert!(context.contains("if (c)"), "{context}");
        assert!(context.contains("var c = g();"), "{context}");

        let looped = context_of(
            "var a = []; for (var i = 0; i < n; i++) a.push(i); f(a[0]);",
            NodeType::MemberExpression,
            1,
        )?;
        assert!(looped.contains("for ("), "{looped}");
        Ok(())
    }

    #[test]
    fn test_shared_guard_is_not_widened() -> crate::Result<()> {
        let context = context_of(
            "var a = [1]; if (c) { a[0] = 2; f(a[0]); }",
            NodeType::MemberExpression,
            1,
        )?;
        assert!(context.contains("a[0] = 2;"), "{context}");
        assert!(!context.contains("if (c)"), "{context}");
        Ok(())
    }

    #[test]
    fn test_marked_dependency_yields_empty() -> crate::Result<()> {
        let mut ast = Ast::parse("var a = [1]; a[0];")?;
        let mut arborist = Arborist::new();
        let declarator = ast.nodes_of(NodeType::VariableDeclarator)[0];
        let init = match ast.kind(declarator) {
            NodeKind::VariableDeclarator { init: Some(init), .. } => *init,
            _ => return Err(malformed_error!("no initializer")),
        };
        let replacement = ast.number(9.0);
        assert!(arborist.mark_replace(&ast, init, replacement));

        let member = ast.nodes_of(NodeType::MemberExpression)[0];
        let mut collector = ContextCollector::new();
        assert!(collector.collect(&ast, &arborist, member, true).is_empty());
        Ok(())
    }

    #[test]
    fn test_cache_by_text() -> crate::Result<()> {
        let ast = Ast::parse("var a = [1]; f(a[0]); g(a[0]);")?;
        let members = ast.nodes_of(NodeType::MemberExpression).to_vec();
        let arborist = Arborist::new();
        let mut collector = ContextCollector::new();
        let first = collector.collect(&ast, &arborist, members[0], true);
        let second = collector.collect(&ast, &arborist, members[1], true);
        assert_eq!(first, second);
        assert_eq!(collector.cache_hits(), 1);
        Ok(())
    }
}
