//! The rewrite rule library.
//!
//! Rules come in four groups, each exposed as a constructor returning the rules in
//! pipeline order:
//!
//! - [`safe_rules`] rewrite syntax without ever executing code.
//! - [`unsafe_rules`] evaluate candidate expressions in the sandbox and replace them with
//!   the value they produce. Without an oracle they do nothing.
//! - [`clean_rules`] remove dead declarations (opt-in).
//! - [`normalize_rules`] make the final output easier to read.
//!
//! Every rule only stages marks; the scheduler commits after each rule.

pub mod clean;
pub mod helpers;
pub mod normalize;
pub mod safe;
pub mod unsafe_rules;

use crate::{
    ast::NodeId,
    deobfuscation::{changes::EventKind, rule::Rule, session::Session},
};

pub use clean::RemoveDeadNodes;
pub use normalize::NormalizeComputed;
pub use safe::*;
pub use unsafe_rules::*;

/// Safe rules in pipeline order.
#[must_use]
pub fn safe_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(RemoveRedundantBlockStatements),
        Box::new(NormalizeEmptyStatements),
        Box::new(ParseTemplateLiteralsIntoStringLiterals),
        Box::new(RearrangeSequences),
        Box::new(SeparateChainedDeclarators),
        Box::new(ReplaceSequencesWithExpressions),
        Box::new(ResolveDeterministicIfStatements),
        Box::new(ResolveRedundantLogicalExpressions),
        Box::new(SimplifyIfStatements),
        Box::new(ReplaceBooleanExpressionsWithIf),
        Box::new(RearrangeSwitches),
        Box::new(ReplaceCallExpressionsWithUnwrappedIdentifier),
        Box::new(ReplaceEvalCallsWithLiteralContent),
        Box::new(ReplaceNewFuncCallsWithLiteralContent),
        Box::new(ResolveFunctionConstructorCalls),
        Box::new(ReplaceFunctionShellsWithWrappedValue),
        Box::new(ReplaceFunctionShellsWithWrappedValueIIFE),
        Box::new(UnwrapFunctionShells),
        Box::new(UnwrapIIFEs),
        Box::new(UnwrapSimpleOperations),
        Box::new(ReplaceIdentifierWithFixedAssignedValue),
        Box::new(ReplaceIdentifierWithFixedValueNotAssignedAtDeclaration),
        Box::new(ResolveProxyVariables),
        Box::new(ResolveProxyReferences),
        Box::new(ResolveProxyCalls),
        Box::new(ResolveMemberExpressionReferencesToArrayIndex),
        Box::new(ResolveMemberExpressionsWithDirectAssignment),
        Box::new(SimplifyCalls),
    ]
}

/// Unsafe rules in pipeline order.
#[must_use]
pub fn unsafe_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(ResolveMinimalAlphabet),
        Box::new(ResolveDefiniteBinaryExpressions),
        Box::new(ResolveAugmentedFunctionWrappedArrayReplacements),
        Box::new(ResolveMemberExpressionsLocalReferences),
        Box::new(ResolveDefiniteMemberExpressions),
        Box::new(ResolveLocalCalls),
        Box::new(ResolveBuiltinCalls),
        Box::new(NormalizeRedundantNotOperator),
        Box::new(ResolveDeterministicConditionalExpressions),
        Box::new(ResolveInjectedPrototypeMethodCalls),
        Box::new(ResolveEvalCallsOnNonLiterals),
        Box::new(ResolveFunctionToArray),
    ]
}

/// Dead code removal rules.
#[must_use]
pub fn clean_rules() -> Vec<Box<dyn Rule>> {
    vec![Box::new(RemoveDeadNodes)]
}

/// Readability rules run after the main loop.
#[must_use]
pub fn normalize_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(NormalizeComputed),
        Box::new(NormalizeEmptyStatements),
        Box::new(NormalizeRedundantNotOperator),
    ]
}

/// Records that `rule` staged a change of `kind` at `node`.
pub(crate) fn note(session: &Session, kind: EventKind, rule: &'static str, node: NodeId) {
    let text = session.ast.text(node);
    let message = match text.char_indices().nth(60) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.into_owned(),
    };
    session
        .events
        .record(kind)
        .rule(rule)
        .node(node)
        .iteration(session.iteration)
        .message(message);
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::{
        deobfuscation::{rule::CandidateFilter, rule::Rule, session::Session},
        Result,
    };

    /// Runs `rule` once over `source`, commits, and returns the resulting script.
    pub fn apply(rule: &dyn Rule, source: &str) -> Result<String> {
        let mut session = Session::new(source)?;
        apply_to(rule, &mut session)
    }

    /// Runs `rule` once over a prepared session and commits.
    pub fn apply_to(rule: &dyn Rule, session: &mut Session) -> Result<String> {
        rule.run(session, &CandidateFilter::all())?;
        session.commit()?;
        Ok(session.script().to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_rule_names_are_unique() {
        let mut seen = HashSet::new();
        for rule in safe_rules()
            .iter()
            .chain(&unsafe_rules())
            .chain(&clean_rules())
        {
            assert!(seen.insert(rule.name()), "duplicate rule {}", rule.name());
        }
        assert_eq!(seen.len(), 41);
    }

    #[test]
    fn test_pipeline_order() {
        let safe = safe_rules();
        assert_eq!(safe[0].name(), "removeRedundantBlockStatements");
        assert_eq!(safe[27].name(), "simplifyCalls");
        let unsafe_list = unsafe_rules();
        assert_eq!(unsafe_list[1].name(), "resolveDefiniteBinaryExpressions");
        assert_eq!(unsafe_list.len(), 12);
    }
}
