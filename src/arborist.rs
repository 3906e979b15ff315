//! Mutation ledger for staged tree rewrites.
//!
//! Rules never modify an [`Ast`] directly. They record [`Mark`]s in an [`Arborist`]: a
//! replacement of a node by a (usually synthetic) subtree, or the deletion of a node.
//! [`Arborist::apply`] prints the tree with every accepted mark substituted, re-parses the
//! result and swaps the fresh tree in. Scope links, the type index and node ids are
//! therefore always those of a freshly parsed script.
//!
//! # Conflicts
//!
//! A mark is refused when its target, or any ancestor of its target, already carries a
//! mark. Marks on descendants of a later mark are accepted but only count as applied if
//! the printer actually reaches them. Marks recorded against an older version of the
//! script (different hash, or different text at the target) are dropped at commit time.
//!
//! # Example
//!
//! ```rust
//! use unravel::{ast::{Ast, NodeType}, Arborist};
//!
//! let mut ast = Ast::parse("a + 1;")?;
//! let mut arborist = Arborist::new();
//! let bin = ast.nodes_of(NodeType::BinaryExpression)[0];
//! let b = ast.ident("b");
//! assert!(arborist.mark_replace(&ast, bin, b));
//! assert_eq!(arborist.apply(&mut ast)?, 1);
//! assert_eq!(ast.source(), "b;");
//! # Ok::<(), unravel::Error>(())
//! ```

use std::collections::{BTreeMap, HashMap};

use crate::{
    ast::{print, Ast, NodeId, Substitution},
    oracle::OracleError,
    Result,
};

/// What a mark does to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkAction {
    /// Replace the target with the given node.
    Replace(NodeId),
    /// Remove the target from its parent.
    Delete,
}

/// A staged change to one node.
#[derive(Debug, Clone)]
pub struct Mark {
    /// Node being changed.
    pub target: NodeId,
    /// The change.
    pub action: MarkAction,
    snapshot: String,
    script_hash: String,
}

impl Mark {
    /// Returns the target's text at the time the mark was recorded.
    #[must_use]
    pub fn snapshot(&self) -> &str {
        &self.snapshot
    }

    fn substitution(&self) -> Substitution {
        match self.action {
            MarkAction::Replace(with) => Substitution::Replace(with),
            MarkAction::Delete => Substitution::Delete,
        }
    }
}

/// Collects marks against one script version and commits them in a single pass.
#[derive(Debug, Default)]
pub struct Arborist {
    marks: Vec<Mark>,
    targets: HashMap<NodeId, usize>,
}

impl Arborist {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of pending marks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.marks.len()
    }

    /// Returns `true` if no marks are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    /// Returns the pending marks in the order they were recorded.
    #[must_use]
    pub fn marks(&self) -> &[Mark] {
        &self.marks
    }

    /// Drops every pending mark.
    pub fn clear(&mut self) {
        self.marks.clear();
        self.targets.clear();
    }

    /// Returns `true` if `id` or one of its ancestors carries a mark.
    #[must_use]
    pub fn is_marked(&self, ast: &Ast, id: NodeId) -> bool {
        if self.targets.is_empty() {
            return false;
        }
        self.targets.contains_key(&id) || ast.ancestors(id).any(|a| self.targets.contains_key(&a))
    }

    /// Returns `true` if `id`, one of its ancestors or one of its descendants carries a mark.
    #[must_use]
    pub fn is_marked_within(&self, ast: &Ast, id: NodeId) -> bool {
        self.is_marked(ast, id) || self.marks.iter().any(|m| ast.is_ancestor(id, m.target))
    }

    /// Stages the replacement of `target` by `replacement`.
    ///
    /// # Returns
    ///
    /// `true` if the mark was accepted. Marks conflicting with an existing mark, and
    /// replacements printing exactly like the target, are refused.
    pub fn mark_replace(&mut self, ast: &Ast, target: NodeId, replacement: NodeId) -> bool {
        if target == replacement || ast.get(replacement).is_none() {
            return false;
        }
        if print::print_node(ast, target) == print::print_node(ast, replacement) {
            return false;
        }
        self.push(ast, target, MarkAction::Replace(replacement))
    }

    /// Stages the removal of `target`.
    ///
    /// # Returns
    ///
    /// `true` if the mark was accepted.
    pub fn mark_delete(&mut self, ast: &Ast, target: NodeId) -> bool {
        if target == ast.root() {
            return false;
        }
        self.push(ast, target, MarkAction::Delete)
    }

    /// Stages the replacement of `target` by an evaluation result.
    ///
    /// A failed evaluation never reaches the tree: on `Err` nothing is recorded.
    pub fn mark_evaluated(
        &mut self,
        ast: &Ast,
        target: NodeId,
        result: std::result::Result<NodeId, OracleError>,
    ) -> bool {
        match result {
            Ok(replacement) => self.mark_replace(ast, target, replacement),
            Err(_) => false,
        }
    }

    fn push(&mut self, ast: &Ast, target: NodeId, action: MarkAction) -> bool {
        if ast.get(target).is_none() || self.is_marked(ast, target) {
            return false;
        }
        self.targets.insert(target, self.marks.len());
        self.marks.push(Mark {
            target,
            action,
            snapshot: ast.text(target).into_owned(),
            script_hash: ast.hash().to_string(),
        });
        true
    }

    /// Commits all pending marks.
    ///
    /// The tree is printed with every valid mark substituted and the result is parsed
    /// into a fresh [`Ast`] that replaces `ast`. The ledger is empty afterwards.
    ///
    /// # Returns
    ///
    /// The number of marks that made it into the printed output. `0` leaves `ast`
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Parse`] if the rewritten script does not parse. `ast` is
    /// left unchanged and the marks are discarded.
    pub fn apply(&mut self, ast: &mut Ast) -> Result<usize> {
        let marks = std::mem::take(&mut self.marks);
        self.targets.clear();

        let substitutions: HashMap<NodeId, Substitution> = marks
            .iter()
            .filter(|m| {
                m.script_hash == ast.hash()
                    && ast.get(m.target).is_some()
                    && ast.text(m.target) == m.snapshot
            })
            .map(|m| (m.target, m.substitution()))
            .collect();
        if substitutions.is_empty() {
            return Ok(0);
        }

        let (text, emitted) = print::print_with(ast, &substitutions);
        if emitted.is_empty() || text == ast.source() {
            return Ok(0);
        }

        *ast = Ast::parse(&text)?;
        Ok(emitted.len())
    }
}

/// Groups statement-list edits per container.
///
/// Replacing one statement with several (or with none) cannot be expressed as a
/// single-node substitution, so the splicer rebuilds each touched container with its
/// new statement list and marks the container instead. Containers are marked innermost
/// first, which keeps nested splices from refusing each other.
#[derive(Debug, Default)]
pub struct ListSplicer {
    edits: BTreeMap<NodeId, HashMap<NodeId, Vec<NodeId>>>,
}

impl ListSplicer {
    /// Creates an empty splicer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if no edits were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Replaces `statement` with `replacement` inside its statement list.
    ///
    /// # Returns
    ///
    /// `false` if the statement is not held by a statement list or was already edited.
    pub fn replace(&mut self, ast: &Ast, statement: NodeId, replacement: Vec<NodeId>) -> bool {
        let Some(container) = ast.parent(statement) else {
            return false;
        };
        if ast.kind(container).statement_list().is_none()
            || !matches!(ast.parent_key(statement), "body" | "consequent")
        {
            return false;
        }
        let slot = self.edits.entry(container).or_default();
        if slot.contains_key(&statement) {
            return false;
        }
        slot.insert(statement, replacement);
        true
    }

    /// Removes `statement` from its statement list.
    pub fn remove(&mut self, ast: &Ast, statement: NodeId) -> bool {
        self.replace(ast, statement, Vec::new())
    }

    /// Returns `true` if the statement list holding `statement` already has edits.
    #[must_use]
    pub fn touches(&self, ast: &Ast, statement: NodeId) -> bool {
        ast.parent(statement)
            .is_some_and(|c| self.edits.contains_key(&c))
    }

    /// Builds the rewritten containers and marks them.
    ///
    /// # Returns
    ///
    /// The number of containers marked.
    pub fn commit(self, ast: &mut Ast, arborist: &mut Arborist) -> usize {
        let mut containers: Vec<(usize, NodeId, HashMap<NodeId, Vec<NodeId>>)> = self
            .edits
            .into_iter()
            .map(|(c, edits)| (ast.ancestors(c).count(), c, edits))
            .collect();
        containers.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        let mut marked = 0;
        for (_, container, mut edits) in containers {
            let kind = ast.kind(container);
            let Some(body) = kind.statement_list() else {
                continue;
            };
            let mut new_body = Vec::with_capacity(body.len());
            for stmt in body {
                match edits.remove(stmt) {
                    Some(replacement) => new_body.extend(replacement),
                    None => new_body.push(*stmt),
                }
            }
            let Some(new_kind) = kind.with_statement_list(new_body) else {
                continue;
            };
            let replacement = ast.add(new_kind);
            if arborist.mark_replace(ast, container, replacement) {
                marked += 1;
            }
        }
        marked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeType;

    #[test]
    fn test_conflicting_marks() -> crate::Result<()> {
        let mut ast = Ast::parse("f(a + b);")?;
        let mut arborist = Arborist::new();
        let call = ast.nodes_of(NodeType::CallExpression)[0];
        let bin = ast.nodes_of(NodeType::BinaryExpression)[0];
        let x = ast.ident("x");
        let y = ast.ident("y");

        assert!(arborist.mark_replace(&ast, call, x));
        assert!(!arborist.mark_replace(&ast, bin, y));
        assert!(arborist.is_marked(&ast, bin));
        assert_eq!(arborist.len(), 1);
        Ok(())
    }

    #[test]
    fn test_descendant_marked_first() -> crate::Result<()> {
        let mut ast = Ast::parse("f(a + b);")?;
        let mut arborist = Arborist::new();
        let call = ast.nodes_of(NodeType::CallExpression)[0];
        let bin = ast.nodes_of(NodeType::BinaryExpression)[0];
        let y = ast.ident("y");
        let x = ast.ident("x");

        assert!(arborist.mark_replace(&ast, bin, y));
        assert!(arborist.is_marked_within(&ast, call));
        assert!(arborist.mark_replace(&ast, call, x));
        assert_eq!(arborist.apply(&mut ast)?, 1);
        assert_eq!(ast.source(), "x;");
        Ok(())
    }

    #[test]
    fn test_failed_evaluation_is_not_marked() -> crate::Result<()> {
        let ast = Ast::parse("a;")?;
        let mut arborist = Arborist::new();
        let id = ast.nodes_of(NodeType::Identifier)[0];
        assert!(!arborist.mark_evaluated(&ast, id, Err(OracleError::NonDeterministic)));
        assert!(arborist.is_empty());
        Ok(())
    }

    #[test]
    fn test_identical_replacement_refused() -> crate::Result<()> {
        let mut ast = Ast::parse("a;")?;
        let mut arborist = Arborist::new();
        let id = ast.nodes_of(NodeType::Identifier)[0];
        let same = ast.ident("a");
        assert!(!arborist.mark_replace(&ast, id, same));
        Ok(())
    }

    #[test]
    fn test_stale_marks_dropped() -> crate::Result<()> {
        let old = Ast::parse("a;")?;
        let mut ast = Ast::parse("b;")?;
        let mut arborist = Arborist::new();
        let id = old.nodes_of(NodeType::ExpressionStatement)[0];
        assert!(arborist.mark_delete(&old, id));
        assert_eq!(arborist.apply(&mut ast)?, 0);
        assert_eq!(ast.source(), "b;");
        Ok(())
    }

    #[test]
    fn test_splicer_nested() -> crate::Result<()> {
        let mut ast = Ast::parse("a(); { b(); c(); } d();")?;
        let mut arborist = Arborist::new();
        let stmts = ast.nodes_of(NodeType::ExpressionStatement).to_vec();
        let mut splicer = ListSplicer::new();
        // drop a() at the top level, and c() inside the block
        assert!(splicer.remove(&ast, stmts[0]));
        assert!(splicer.remove(&ast, stmts[2]));
        assert_eq!(splicer.commit(&mut ast, &mut arborist), 2);
        assert_eq!(arborist.apply(&mut ast)?, 2);
        assert_eq!(ast.source(), "{\n  b();\n}\nd();");
        Ok(())
    }

    #[test]
    fn test_unparsable_commit_is_rejected() -> crate::Result<()> {
        let mut ast = Ast::parse("a;")?;
        let mut arborist = Arborist::new();
        let id = ast.nodes_of(NodeType::Identifier)[0];
        let raw = ast.add(crate::ast::NodeKind::Raw {
            text: "(".to_string(),
        });
        assert!(arborist.mark_replace(&ast, id, raw));
        assert!(arborist.apply(&mut ast).is_err());
        assert_eq!(ast.source(), "a;");
        assert!(arborist.is_empty());
        Ok(())
    }
}
