//! Rules that evaluate code.
//!
//! Each rule picks candidate expressions, assembles the code needed to compute them
//! (the candidate alone, or the candidate after its collected context) and asks the
//! session's evaluator for the value. A value of an acceptable shape replaces the
//! candidate; any evaluation failure leaves the candidate untouched.
//!
//! Without an oracle the evaluating rules stage nothing. [`ResolveBuiltinCalls`] still
//! resolves `atob`/`btoa` through the host implementations, and the two folding rules
//! that only need truthiness ([`NormalizeRedundantNotOperator`] and
//! [`ResolveDeterministicConditionalExpressions`]) never evaluate at all.

mod builtin;
mod folding;
mod local;

use crate::{
    ast::{Ast, NodeId},
    deobfuscation::{changes::EventKind, rules::note, session::Session},
    oracle::{reify, EvalValue},
};

pub use builtin::ResolveBuiltinCalls;
pub use folding::{
    NormalizeRedundantNotOperator, ResolveDefiniteBinaryExpressions,
    ResolveDefiniteMemberExpressions, ResolveDeterministicConditionalExpressions,
    ResolveMinimalAlphabet,
};
pub use local::{
    ResolveAugmentedFunctionWrappedArrayReplacements, ResolveEvalCallsOnNonLiterals,
    ResolveFunctionToArray, ResolveInjectedPrototypeMethodCalls, ResolveLocalCalls,
    ResolveMemberExpressionsLocalReferences,
};

/// Returns the source of an expression, parenthesized where a statement would read
/// it differently.
pub(crate) fn expression_source(ast: &Ast, id: NodeId) -> String {
    let text = ast.text(id);
    if text.starts_with('{') || text.starts_with("function") || text.starts_with("class") {
        format!("({text})")
    } else {
        text.into_owned()
    }
}

/// Accepts primitive values other than `undefined`.
pub(crate) fn defined_primitive(value: &EvalValue) -> bool {
    value.is_primitive() && *value != EvalValue::Undefined
}

/// Accepts primitives other than `undefined` and arrays.
pub(crate) fn primitive_or_array(value: &EvalValue) -> bool {
    defined_primitive(value) || matches!(value, EvalValue::Array(_))
}

/// Evaluates `source` and stages the replacement of `target` by the value when `accept`
/// allows it.
///
/// Returns `true` if a mark was staged.
pub(crate) fn replace_with_evaluation(
    session: &mut Session,
    rule: &'static str,
    kind: EventKind,
    target: NodeId,
    source: &str,
    accept: fn(&EvalValue) -> bool,
) -> bool {
    let value = match session.evaluate_value(source) {
        Ok(value) => value,
        Err(e) => {
            log::trace!("{rule}: {e}");
            return false;
        }
    };
    if !accept(&value) {
        return false;
    }
    let replacement = reify(&mut session.ast, &value);
    if session
        .arborist
        .mark_evaluated(&session.ast, target, replacement)
    {
        note(session, kind, rule, target);
        return true;
    }
    false
}
