//! State of one deobfuscation run.
//!
//! A [`Session`] owns everything that belongs to a single input script: the current
//! tree, the pending marks, the context cache, the evaluator with its result cache and
//! the event log. Nothing is shared between sessions, so independent scripts can be
//! processed by independent sessions on different threads.

use crate::{
    arborist::Arborist,
    ast::{Ast, NodeId, NodeType},
    context::{ContextCollector, ContextSet},
    deobfuscation::{changes::EventLog, config::Verbosity, rule::CandidateFilter},
    oracle::{EvalOracle, EvalValue, Evaluator, OracleError},
    Result,
};

/// Tree, ledger, caches and oracle of one script.
///
/// # Example
///
/// ```rust
/// use unravel::{ast::NodeType, deobfuscation::Session};
///
/// let mut session = Session::new("a + b;")?;
/// let bin = session.ast.nodes_of(NodeType::BinaryExpression)[0];
/// let c = session.ast.ident("c");
/// assert!(session.arborist.mark_replace(&session.ast, bin, c));
/// assert_eq!(session.commit()?, 1);
/// assert_eq!(session.script(), "c;");
/// # Ok::<(), unravel::Error>(())
/// ```
#[derive(Debug)]
pub struct Session {
    /// Current tree.
    pub ast: Ast,
    /// Marks staged against [`Session::ast`].
    pub arborist: Arborist,
    /// Activity record.
    pub events: EventLog,
    /// Reporting level.
    pub verbosity: Verbosity,
    /// Current main loop iteration (0 outside the loop).
    pub iteration: usize,
    contexts: ContextCollector,
    evaluator: Option<Evaluator>,
}

impl Session {
    /// Parses `source` into a session without an oracle.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Parse`] if `source` is not valid JavaScript.
    pub fn new(source: &str) -> Result<Self> {
        Ok(Self {
            ast: Ast::parse(source)?,
            arborist: Arborist::new(),
            events: EventLog::new(),
            verbosity: Verbosity::default(),
            iteration: 0,
            contexts: ContextCollector::new(),
            evaluator: None,
        })
    }

    /// Attaches an oracle with default evaluator settings.
    #[must_use]
    pub fn with_oracle(self, oracle: Box<dyn EvalOracle>) -> Self {
        self.with_evaluator(Evaluator::new(oracle))
    }

    /// Attaches a configured evaluator.
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: Evaluator) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Sets the reporting level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Returns the current script text.
    #[must_use]
    pub fn script(&self) -> &str {
        self.ast.source()
    }

    /// Returns `true` if code can be evaluated in this session.
    #[must_use]
    pub fn has_oracle(&self) -> bool {
        self.evaluator.is_some()
    }

    /// Returns the evaluator, if any.
    #[must_use]
    pub fn evaluator(&self) -> Option<&Evaluator> {
        self.evaluator.as_ref()
    }

    /// Detaches the evaluator so it can serve another session.
    pub fn take_evaluator(&mut self) -> Option<Evaluator> {
        self.evaluator.take()
    }

    /// Returns the parsed nodes of type `ty` that pass `filter`, in source order.
    #[must_use]
    pub fn candidates(&self, ty: NodeType, filter: &CandidateFilter) -> Vec<NodeId> {
        self.ast
            .nodes_of(ty)
            .iter()
            .copied()
            .filter(|&id| filter.accepts(&self.ast, id))
            .collect()
    }

    /// Returns the context needed to evaluate `origin` out of place.
    ///
    /// Empty if any node the context depends on is already marked.
    #[must_use]
    pub fn context(&mut self, origin: NodeId, exclude_origin: bool) -> ContextSet {
        self.contexts
            .collect(&self.ast, &self.arborist, origin, exclude_origin)
    }

    /// Evaluates `source` and returns its completion value.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::Engine`] if the session has no oracle, or the failure of
    /// the evaluation.
    pub fn evaluate_value(&mut self, source: &str) -> std::result::Result<EvalValue, OracleError> {
        match self.evaluator.as_mut() {
            Some(evaluator) => evaluator.evaluate_value(source),
            None => Err(OracleError::Engine("no oracle attached".to_string())),
        }
    }

    /// Evaluates `source` and builds the result as detached nodes of the tree.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::Engine`] if the session has no oracle, or the failure of
    /// the evaluation or of the conversion.
    pub fn evaluate(&mut self, source: &str) -> std::result::Result<NodeId, OracleError> {
        match self.evaluator.as_mut() {
            Some(evaluator) => evaluator.evaluate(&mut self.ast, source),
            None => Err(OracleError::Engine("no oracle attached".to_string())),
        }
    }

    /// Commits the staged marks.
    ///
    /// # Returns
    ///
    /// The number of marks applied.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Parse`] if the rewritten script does not parse; the tree
    /// is left unchanged and the marks are discarded.
    pub fn commit(&mut self) -> Result<usize> {
        if self.arborist.is_empty() {
            return Ok(0);
        }
        self.arborist.apply(&mut self.ast)
    }

    /// Drops every staged mark.
    pub fn discard(&mut self) {
        self.arborist.clear();
    }

    /// Flushes the context and evaluation caches.
    pub fn reset_caches(&mut self) {
        self.contexts.reset();
        if let Some(evaluator) = self.evaluator.as_mut() {
            evaluator.reset_cache();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::testing::ScriptedOracle;

    #[test]
    fn test_without_oracle() -> crate::Result<()> {
        let mut session = Session::new("1 + 1;")?;
        assert!(!session.has_oracle());
        assert!(matches!(
            session.evaluate("1 + 1"),
            Err(OracleError::Engine(_))
        ));
        Ok(())
    }

    #[test]
    fn test_evaluate_with_scripted_oracle() -> crate::Result<()> {
        let oracle = ScriptedOracle::new().answer("1 + 1", EvalValue::Number(2.0));
        let mut session = Session::new("1 + 1;")?.with_oracle(Box::new(oracle));
        let node = session.evaluate("1 + 1")?;
        assert_eq!(session.ast.text(node), "2");
        Ok(())
    }

    #[test]
    fn test_commit_empty_is_noop() -> crate::Result<()> {
        let mut session = Session::new("a;")?;
        assert_eq!(session.commit()?, 0);
        assert_eq!(session.script(), "a;");
        Ok(())
    }

    #[test]
    fn test_candidates_respect_filter() -> crate::Result<()> {
        let session = Session::new("a(); b();")?;
        let all = session.candidates(NodeType::CallExpression, &CandidateFilter::all());
        assert_eq!(all.len(), 2);
        let first = all[0];
        let only_first = CandidateFilter::new(move |_, id| id == first);
        assert_eq!(
            session.candidates(NodeType::CallExpression, &only_first),
            vec![first]
        );
        Ok(())
    }
}
