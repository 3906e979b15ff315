//! Fixed-point rule scheduler.
//!
//! The [`RuleScheduler`] runs the safe rules and then the unsafe rules, committing
//! after every single rule, and repeats until a whole iteration leaves the script
//! unchanged or the iteration cap is reached. Rule failures are contained: the failing
//! rule's marks are discarded, the failure is logged and recorded, and the loop goes on.

use std::time::Instant;

use crate::deobfuscation::{
    changes::EventKind,
    config::Verbosity,
    rule::{CandidateFilter, Outcome, Rule},
    session::Session,
};

/// Totals of a scheduler run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    /// Iterations started.
    pub iterations: usize,
    /// Marks applied over all iterations.
    pub changes: usize,
    /// `true` if the last iteration changed nothing.
    pub converged: bool,
}

/// Runs rule pipelines over a [`Session`].
///
/// # Example
///
/// ```rust
/// use unravel::deobfuscation::{rules, RuleScheduler, Session};
///
/// let scheduler = RuleScheduler::new(rules::safe_rules(), Vec::new(), 10);
/// let mut session = Session::new("if (true) a(); else b();")?;
/// let summary = scheduler.run(&mut session);
/// assert!(summary.converged);
/// assert_eq!(session.script(), "a();");
/// # Ok::<(), unravel::Error>(())
/// ```
pub struct RuleScheduler {
    safe: Vec<Box<dyn Rule>>,
    unsafe_rules: Vec<Box<dyn Rule>>,
    max_iterations: usize,
}

impl RuleScheduler {
    /// Creates a scheduler.
    ///
    /// # Arguments
    ///
    /// * `safe` - Rules that never execute code, in pipeline order.
    /// * `unsafe_rules` - Rules that evaluate code, in pipeline order.
    /// * `max_iterations` - Cap on main loop iterations.
    #[must_use]
    pub fn new(
        safe: Vec<Box<dyn Rule>>,
        unsafe_rules: Vec<Box<dyn Rule>>,
        max_iterations: usize,
    ) -> Self {
        Self {
            safe,
            unsafe_rules,
            max_iterations,
        }
    }

    /// Returns the iteration cap.
    #[must_use]
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Sets the iteration cap.
    pub fn set_max_iterations(&mut self, max: usize) {
        self.max_iterations = max;
    }

    /// Names of the scheduled rules, safe rules first.
    #[must_use]
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.safe
            .iter()
            .chain(&self.unsafe_rules)
            .map(|r| r.name())
            .collect()
    }

    /// Runs the main loop until a fixed point or the iteration cap.
    pub fn run(&self, session: &mut Session) -> LoopSummary {
        let mut summary = LoopSummary::default();
        let filter = CandidateFilter::all();

        while summary.iterations < self.max_iterations {
            summary.iterations += 1;
            session.iteration = summary.iterations;
            let started = Instant::now();

            let changes = run_pass(session, &self.safe, &filter)
                + run_pass(session, &self.unsafe_rules, &filter);
            summary.changes += changes;

            session
                .events
                .record(EventKind::IterationCompleted)
                .iteration(summary.iterations)
                .message(format!("{changes} changes"));
            if session.verbosity.allows(Verbosity::Log) {
                log::info!(
                    "iteration #{} finished with {changes} changes in {:.2?}",
                    summary.iterations,
                    started.elapsed()
                );
            }

            if changes == 0 {
                summary.converged = true;
                break;
            }
        }

        if !summary.converged && session.verbosity.allows(Verbosity::Error) {
            log::warn!(
                "stopped after {} iterations without reaching a fixed point",
                summary.iterations
            );
        }
        session.iteration = 0;
        summary
    }
}

impl std::fmt::Debug for RuleScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleScheduler")
            .field("safe", &self.safe.iter().map(|r| r.name()).collect::<Vec<_>>())
            .field(
                "unsafe_rules",
                &self.unsafe_rules.iter().map(|r| r.name()).collect::<Vec<_>>(),
            )
            .field("max_iterations", &self.max_iterations)
            .finish()
    }
}

/// Applies every rule once, committing after each.
///
/// # Returns
///
/// The number of marks applied.
pub fn run_pass(session: &mut Session, rules: &[Box<dyn Rule>], filter: &CandidateFilter) -> usize {
    rules
        .iter()
        .map(|rule| apply_rule(session, rule.as_ref(), filter).applied)
        .sum()
}

/// Applies rules repeatedly until none of them changes the script.
///
/// # Returns
///
/// The number of marks applied.
pub fn run_to_fixed_point(
    session: &mut Session,
    rules: &[Box<dyn Rule>],
    max_iterations: usize,
) -> usize {
    let filter = CandidateFilter::all();
    let mut total = 0;
    for _ in 0..max_iterations {
        let changes = run_pass(session, rules, &filter);
        total += changes;
        if changes == 0 {
            break;
        }
    }
    total
}

/// Runs one rule and commits its marks.
///
/// A failing rule has its marks discarded; a commit whose output does not parse is
/// rejected. Both are logged with the rule name and iteration and recorded in the
/// session's event log.
pub fn apply_rule(session: &mut Session, rule: &dyn Rule, filter: &CandidateFilter) -> Outcome {
    let started = Instant::now();
    let name = rule.name();
    let mut outcome = Outcome {
        rule: name,
        proposed: 0,
        applied: 0,
        error: None,
        elapsed: started.elapsed(),
    };

    match rule.run(session, filter) {
        Ok(proposed) => {
            outcome.proposed = proposed;
            match session.commit() {
                Ok(applied) => outcome.applied = applied,
                Err(e) => {
                    if session.verbosity.allows(Verbosity::Error) {
                        log::warn!(
                            "{name}: commit rejected in iteration {}: {e}",
                            session.iteration
                        );
                    }
                    session
                        .events
                        .record(EventKind::CommitRejected)
                        .rule(name)
                        .iteration(session.iteration)
                        .message(e.to_string());
                    outcome.error = Some(e);
                }
            }
        }
        Err(e) => {
            session.discard();
            if session.verbosity.allows(Verbosity::Error) {
                log::warn!("{name} failed in iteration {}: {e}", session.iteration);
            }
            session
                .events
                .record(EventKind::RuleFailed)
                .rule(name)
                .iteration(session.iteration)
                .message(e.to_string());
            outcome.error = Some(e);
        }
    }

    outcome.elapsed = started.elapsed();
    if session.verbosity.allows(Verbosity::Debug) {
        log::debug!(
            "{name}: {} proposed, {} applied in {:.2?}",
            outcome.proposed,
            outcome.applied,
            outcome.elapsed
        );
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ast::NodeType,
        deobfuscation::rule::RuleCategory,
        Error, Result,
    };

    struct Failing;

    impl Rule for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn category(&self) -> RuleCategory {
            RuleCategory::Safe
        }

        fn run(&self, session: &mut Session, _filter: &CandidateFilter) -> Result<usize> {
            let root = session.ast.root();
            let body = session.ast.kind(root).children();
            if let Some(first) = body.first() {
                session.arborist.mark_delete(&session.ast, *first);
            }
            Err(Error::Error("unexpected shape".to_string()))
        }
    }

    struct DropFirstCall;

    impl Rule for DropFirstCall {
        fn name(&self) -> &'static str {
            "dropFirstCall"
        }

        fn category(&self) -> RuleCategory {
            RuleCategory::Safe
        }

        fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
            let stmts = session.candidates(NodeType::ExpressionStatement, filter);
            Ok(stmts
                .first()
                .map_or(0, |s| usize::from(session.arborist.mark_delete(&session.ast, *s))))
        }
    }

    #[test]
    fn test_failing_rule_is_contained() -> crate::Result<()> {
        let mut session = Session::new("a(); b();")?;
        let outcome = apply_rule(&mut session, &Failing, &CandidateFilter::all());
        assert!(outcome.failed());
        assert!(!outcome.changed());
        assert!(session.arborist.is_empty());
        assert_eq!(session.script(), "a(); b();");
        assert_eq!(session.events.count_kind(EventKind::RuleFailed), 1);
        Ok(())
    }

    #[test]
    fn test_loop_reaches_fixed_point() -> crate::Result<()> {
        let scheduler = RuleScheduler::new(
            vec![Box::new(DropFirstCall), Box::new(Failing)],
            Vec::new(),
            10,
        );
        let mut session = Session::new("a(); b(); c();")?;
        let summary = scheduler.run(&mut session);
        assert!(summary.converged);
        assert_eq!(summary.changes, 3);
        assert_eq!(summary.iterations, 4);
        assert_eq!(session.script(), "");
        assert_eq!(session.events.count_kind(EventKind::IterationCompleted), 4);
        Ok(())
    }

    #[test]
    fn test_iteration_cap() -> crate::Result<()> {
        let scheduler = RuleScheduler::new(vec![Box::new(DropFirstCall)], Vec::new(), 2);
        let mut session = Session::new("a(); b(); c();")?;
        let summary = scheduler.run(&mut session);
        assert!(!summary.converged);
        assert_eq!(summary.iterations, 2);
        assert_eq!(session.script(), "c();");
        Ok(())
    }
}
