//! Arena based JavaScript syntax tree.
//!
//! An [`Ast`] owns every node of one parsed script in a flat vector addressed by
//! [`NodeId`]. Parent links, child links and binding links are all ids, which keeps the
//! tree free of ownership cycles and lets rules hold on to node identities across
//! borrows. The tree is never patched in place after parsing: rewrites are staged in an
//! [`Arborist`](crate::Arborist), printed, and the result parsed into a fresh `Ast`.
//!
//! # Architecture
//!
//! - [`node`] - node kinds, ids and the child walker
//! - [`parse`] - swc front-end producing arena nodes in pre-order
//! - [`scope`] - lexical scopes and declaration/reference links
//! - [`print`] - source printer with substitution support
//! - [`build`] - constructors for synthetic nodes
//!
//! # Examples
//!
//! ```rust
//! use unravel::ast::{Ast, NodeType};
//!
//! let ast = Ast::parse("var a = 1; a + 2;")?;
//! assert_eq!(ast.nodes_of(NodeType::BinaryExpression).len(), 1);
//! assert_eq!(ast.print(), "var a = 1;\na + 2;");
//! # Ok::<(), unravel::Error>(())
//! ```

pub mod build;
pub mod node;
pub mod parse;
pub mod print;
pub mod scope;

use std::{borrow::Cow, collections::HashMap};

use sha1::{Digest, Sha1};

pub use node::{LitValue, MethodKind, Node, NodeId, NodeKind, NodeType, PropKind, Span, VarKind};
pub use print::Substitution;
pub use scope::{Scope, ScopeId, ScopeKind};

use crate::Result;

/// Returns the hex encoded SHA-1 digest of `text`.
#[must_use]
pub fn content_hash(text: &str) -> String {
    let digest = Sha1::digest(text.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// A parsed, scope-resolved script.
#[derive(Debug, Clone)]
pub struct Ast {
    pub(crate) nodes: Vec<Node>,
    root: NodeId,
    source: String,
    hash: String,
    type_index: HashMap<NodeType, Vec<NodeId>>,
    pub(crate) scopes: Vec<Scope>,
    parsed: usize,
}

impl Ast {
    /// Parses and resolves a script.
    ///
    /// # Arguments
    ///
    /// * `source` - JavaScript source text (script or module).
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Parse`] when the text is not valid JavaScript.
    pub fn parse(source: &str) -> Result<Self> {
        let nodes = parse::parse_nodes(source)?;
        let parsed = nodes.len();
        let mut ast = Self {
            nodes,
            root: NodeId(0),
            source: source.to_string(),
            hash: content_hash(source),
            type_index: HashMap::new(),
            scopes: Vec::new(),
            parsed,
        };
        ast.link();
        scope::resolve(&mut ast);
        Ok(ast)
    }

    fn link(&mut self) {
        for i in 0..self.nodes.len() {
            let id = NodeId(i as u32);
            let mut children = Vec::new();
            self.nodes[i]
                .kind
                .for_each_child(|c, key| children.push((c, key)));
            for (child, key) in children {
                let node = &mut self.nodes[child.index()];
                node.parent = Some(id);
                node.parent_key = key;
            }
            self.type_index
                .entry(self.nodes[i].node_type())
                .or_default()
                .push(id);
        }
    }

    /// Returns the program node.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Returns the text this tree was parsed from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the SHA-1 of the source text, identifying this version of the script.
    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Returns the number of nodes, including synthetic ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the arena holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns `true` if `id` was produced by the parser rather than created afterwards.
    #[must_use]
    pub fn is_parsed(&self, id: NodeId) -> bool {
        id.index() < self.parsed
    }

    /// Returns the node with the given id.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this tree.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Returns the node with the given id, if it exists.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Returns the kind of a node.
    #[must_use]
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    /// Returns the type tag of a node.
    #[must_use]
    pub fn node_type(&self, id: NodeId) -> NodeType {
        self.nodes[id.index()].node_type()
    }

    /// Returns the parent of a node.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    /// Returns the kind of a node's parent.
    #[must_use]
    pub fn parent_kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.parent(id).map(|p| self.kind(p))
    }

    /// Returns the name of the parent field holding the node.
    #[must_use]
    pub fn parent_key(&self, id: NodeId) -> &'static str {
        self.nodes[id.index()].parent_key
    }

    /// Returns the declaring identifier an identifier reference resolves to.
    #[must_use]
    pub fn decl(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].decl
    }

    /// Returns the references of a declaring identifier.
    #[must_use]
    pub fn references(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].references
    }

    /// Returns every parsed node of the given type, in source order.
    #[must_use]
    pub fn nodes_of(&self, ty: NodeType) -> &[NodeId] {
        self.type_index.get(&ty).map_or(&[], Vec::as_slice)
    }

    /// Returns the innermost scope of a node. Scope-creating nodes own their scope.
    #[must_use]
    pub fn scope_of(&self, id: NodeId) -> Option<&Scope> {
        self.nodes[id.index()]
            .scope
            .and_then(|s| self.scopes.get(s.0 as usize))
    }

    /// Returns a scope by id.
    #[must_use]
    pub fn scope(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get(id.0 as usize)
    }

    /// Returns all scopes, the global scope first.
    #[must_use]
    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    /// Iterates the ancestors of a node, closest first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |p| self.parent(*p))
    }

    /// Returns `true` if `ancestor` is `id` or one of its ancestors.
    #[must_use]
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        id == ancestor || self.ancestors(id).any(|a| a == ancestor)
    }

    /// Returns the subtree rooted at `id` in pre-order, including `id`.
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            let mut children = self.kind(current).children();
            children.reverse();
            stack.extend(children);
        }
        out
    }

    /// Returns the source text of a node.
    ///
    /// Parsed nodes slice the original source; synthetic nodes are printed.
    #[must_use]
    pub fn text(&self, id: NodeId) -> Cow<'_, str> {
        let node = self.node(id);
        if let Some(span) = node.span.filter(|_| self.is_parsed(id)) {
            if let Some(text) = self.source.get(span.start as usize..span.end as usize) {
                return Cow::Borrowed(text);
            }
        }
        Cow::Owned(print::print_node(self, id))
    }

    /// Prints the whole tree.
    #[must_use]
    pub fn print(&self) -> String {
        print::print_node(self, self.root)
    }

    /// Appends a detached node and returns its id.
    pub fn add(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(id, kind, None));
        id
    }

    /// Replaces the kind of a detached node created with [`Ast::add`].
    ///
    /// Parsed nodes are never modified; this returns `false` for them.
    pub fn set_kind(&mut self, id: NodeId, kind: NodeKind) -> bool {
        if self.is_parsed(id) {
            return false;
        }
        self.nodes[id.index()].kind = kind;
        true
    }

    /// Copies the subtree rooted at `id` of `other` into this arena.
    ///
    /// Returns the id of the copied root. The copy is detached and carries no spans.
    pub fn import_subtree(&mut self, other: &Ast, id: NodeId) -> NodeId {
        let mut map = HashMap::new();
        for old in other.descendants(id) {
            let new = self.add(other.kind(old).clone());
            map.insert(old, new);
        }
        for new in map.values() {
            self.nodes[new.index()]
                .kind
                .for_each_child_mut(|c, _| *c = map.get(&*c).copied().unwrap_or(*c));
        }
        map.get(&id).copied().unwrap_or(id)
    }

    /// Copies a subtree of this arena, returning the detached copy.
    pub fn clone_subtree(&mut self, id: NodeId) -> NodeId {
        let snapshot = self.clone();
        self.import_subtree(&snapshot, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_links() -> crate::Result<()> {
        let ast = Ast::parse("f(a);")?;
        let call = ast.nodes_of(NodeType::CallExpression)[0];
        let args: Vec<_> = ast
            .nodes_of(NodeType::Identifier)
            .iter()
            .filter(|id| ast.parent_key(**id) == "arguments")
            .collect();
        assert_eq!(args.len(), 1);
        assert_eq!(ast.parent(*args[0]), Some(call));
        assert_eq!(ast.parent_key(call), "expression");
        Ok(())
    }

    #[test]
    fn test_text_of_parsed_and_synthetic() -> crate::Result<()> {
        let mut ast = Ast::parse("var a = 'x' + \"y\";")?;
        let bin = ast.nodes_of(NodeType::BinaryExpression)[0];
        assert_eq!(ast.text(bin), "'x' + \"y\"");
        let lit = ast.string("z");
        assert_eq!(ast.text(lit), "'z'");
        Ok(())
    }

    #[test]
    fn test_hash_tracks_source() -> crate::Result<()> {
        let a = Ast::parse("a;")?;
        let b = Ast::parse("b;")?;
        assert_ne!(a.hash(), b.hash());
        assert_eq!(a.hash(), content_hash("a;"));
        Ok(())
    }

    #[test]
    fn test_import_subtree() -> crate::Result<()> {
        let other = Ast::parse("x + [1, 2];")?;
        let mut ast = Ast::parse("y;")?;
        let bin = other.nodes_of(NodeType::BinaryExpression)[0];
        let copy = ast.import_subtree(&other, bin);
        assert!(!ast.is_parsed(copy));
        assert_eq!(ast.text(copy), "x + [\n  1,\n  2\n]");
        Ok(())
    }

    #[test]
    fn test_ancestors() -> crate::Result<()> {
        let ast = Ast::parse("if (a) { b(); }")?;
        let call = ast.nodes_of(NodeType::CallExpression)[0];
        let chain: Vec<_> = ast.ancestors(call).map(|a| ast.node_type(a)).collect();
        assert_eq!(
            chain,
            vec![
                NodeType::ExpressionStatement,
                NodeType::BlockStatement,
                NodeType::IfStatement,
                NodeType::Program
            ]
        );
        assert!(ast.is_ancestor(ast.root(), call));
        Ok(())
    }
}
