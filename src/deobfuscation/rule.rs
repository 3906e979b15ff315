//! Rule trait and the types the scheduler exchanges with rules.
//!
//! A rule is one rewrite pattern. It scans the current tree of a
//! [`Session`](crate::deobfuscation::Session), stages marks in the session's
//! [`Arborist`](crate::Arborist) and reports how many it staged. Rules never commit:
//! the [`RuleScheduler`](crate::deobfuscation::RuleScheduler) commits after every rule,
//! so each rule sees a freshly parsed and resolved tree.

use std::{fmt, time::Duration};

use strum::{Display, IntoStaticStr};

use crate::{
    ast::{Ast, NodeId, NodeType},
    deobfuscation::session::Session,
    Error, Result,
};

/// Group a rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum RuleCategory {
    /// Syntactic rewrite that never executes code.
    Safe,
    /// Rewrite that evaluates code in the sandbox.
    Unsafe,
    /// Dead declaration removal.
    Clean,
    /// Readability normalization.
    Normalize,
    /// Obfuscation family specific processing.
    Processor,
}

/// A rewrite rule.
///
/// Rules are stateless; every piece of state lives in the [`Session`] passed to
/// [`Rule::run`]. A rule that finds nothing to do must leave the session's ledger
/// untouched and return `Ok(0)`.
///
/// # Example
///
/// ```rust
/// use unravel::{
///     ast::NodeType,
///     deobfuscation::{CandidateFilter, Rule, RuleCategory, Session},
///     Result,
/// };
///
/// struct RemoveDebugger;
///
/// impl Rule for RemoveDebugger {
///     fn name(&self) -> &'static str {
///         "removeDebugger"
///     }
///
///     fn category(&self) -> RuleCategory {
///         RuleCategory::Safe
///     }
///
///     fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
///         let mut marked = 0;
///         for id in session.candidates(NodeType::DebuggerStatement, filter) {
///             if session.arborist.mark_delete(&session.ast, id) {
///                 marked += 1;
///             }
///         }
///         Ok(marked)
///     }
/// }
///
/// let mut session = Session::new("debugger; a();")?;
/// let marked = RemoveDebugger.run(&mut session, &CandidateFilter::all())?;
/// assert_eq!(marked, 1);
/// assert_eq!(session.commit()?, 1);
/// assert_eq!(session.script(), "a();");
/// # Ok::<(), unravel::Error>(())
/// ```
pub trait Rule: Send + Sync {
    /// Unique name for logging and debugging.
    fn name(&self) -> &'static str;

    /// Get a description of what this rule does.
    fn description(&self) -> &'static str {
        "No description available"
    }

    /// Group the rule belongs to.
    fn category(&self) -> RuleCategory;

    /// Scans the session's tree and stages marks.
    ///
    /// # Arguments
    ///
    /// * `session` - The session holding the tree, ledger, caches and oracle.
    /// * `filter` - Predicate every candidate must pass before it is rewritten.
    ///
    /// # Returns
    ///
    /// The number of marks staged.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree has a shape the rule cannot handle. The scheduler
    /// discards the rule's marks and continues with the next rule.
    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize>;
}

type Predicate = dyn Fn(&Ast, NodeId) -> bool + Send + Sync;

/// Predicate applied to every candidate before a rule rewrites it.
#[derive(Default)]
pub struct CandidateFilter {
    predicate: Option<Box<Predicate>>,
}

impl CandidateFilter {
    /// Accepts every candidate.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Accepts the candidates for which `predicate` returns `true`.
    #[must_use]
    pub fn new(predicate: impl Fn(&Ast, NodeId) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Some(Box::new(predicate)),
        }
    }

    /// Accepts only candidates of the given types.
    #[must_use]
    pub fn of_types(types: &'static [NodeType]) -> Self {
        Self::new(move |ast, id| types.contains(&ast.node_type(id)))
    }

    /// Returns `true` if `id` may be rewritten.
    #[must_use]
    pub fn accepts(&self, ast: &Ast, id: NodeId) -> bool {
        self.predicate.as_ref().map_or(true, |p| p(ast, id))
    }
}

impl fmt::Debug for CandidateFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CandidateFilter")
            .field("custom", &self.predicate.is_some())
            .finish()
    }
}

/// What one rule application did.
#[derive(Debug)]
pub struct Outcome {
    /// Rule that ran.
    pub rule: &'static str,
    /// Marks the rule staged.
    pub proposed: usize,
    /// Marks that made it into the committed script.
    pub applied: usize,
    /// Failure of the rule or of its commit.
    pub error: Option<Error>,
    /// Time spent in the rule and its commit.
    pub elapsed: Duration,
}

impl Outcome {
    /// Returns `true` if the script changed.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.applied > 0
    }

    /// Returns `true` if the rule or its commit failed.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_all() -> crate::Result<()> {
        let ast = Ast::parse("a;")?;
        assert!(CandidateFilter::all().accepts(&ast, ast.root()));
        Ok(())
    }

    #[test]
    fn test_filter_of_types() -> crate::Result<()> {
        let ast = Ast::parse("a(b);")?;
        let filter = CandidateFilter::of_types(&[NodeType::CallExpression]);
        let call = ast.nodes_of(NodeType::CallExpression)[0];
        let ident = ast.nodes_of(NodeType::Identifier)[0];
        assert!(filter.accepts(&ast, call));
        assert!(!filter.accepts(&ast, ident));
        Ok(())
    }

    #[test]
    fn test_outcome_flags() {
        let outcome = Outcome {
            rule: "r",
            proposed: 2,
            applied: 0,
            error: Some(Error::Error("boom".to_string())),
            elapsed: Duration::ZERO,
        };
        assert!(!outcome.changed());
        assert!(outcome.failed());
    }
}
