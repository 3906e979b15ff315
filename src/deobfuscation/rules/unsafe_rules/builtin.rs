//! Resolution of calls to builtin functions with literal arguments.

use crate::{
    ast::{Ast, LitValue, NodeId, NodeKind, NodeType},
    deobfuscation::{
        changes::EventKind,
        rule::{CandidateFilter, Rule, RuleCategory},
        rules::{
            helpers::{
                global_never_written, is_global_reference, is_literal_argument, is_literal_like,
                literal_to_string, member_property_name,
            },
            note,
            unsafe_rules::{expression_source, primitive_or_array, replace_with_evaluation},
        },
        session::Session,
    },
    oracle::{
        is_safe_implementation, safe_call, PROPERTIES_THAT_MODIFY_CONTENT,
        SKIP_BUILTIN_FUNCTIONS, SKIP_IDENTIFIERS, SKIP_PROPERTIES,
    },
    Result,
};

/// Global functions whose result only depends on their arguments.
const GLOBAL_FUNCTIONS: &[&str] = &[
    "parseInt",
    "parseFloat",
    "isNaN",
    "isFinite",
    "String",
    "Number",
    "Boolean",
    "escape",
    "unescape",
    "encodeURI",
    "decodeURI",
    "encodeURIComponent",
    "decodeURIComponent",
];

/// Global objects whose static methods may be resolved.
const BUILTIN_OBJECTS: &[&str] = &["String", "Number", "JSON", "Boolean"];

/// How a builtin call can be resolved.
enum Resolution {
    /// Through a host implementation.
    Host(String, Vec<String>),
    /// Through the sandbox.
    Sandbox,
}

/// Resolves calls to builtins whose arguments are literals.
///
/// `atob` and `btoa` use host implementations and need no sandbox. Other global
/// functions, methods called on literals and static methods of a few global objects are
/// evaluated. Builtins with side effects or nondeterministic results are skipped.
///
/// ```text
/// atob('dGVzdA==')             =>  'test'
/// 'a-b'.split('-')             =>  ['a', 'b']
/// String.fromCharCode(104, 105) =>  'hi'
/// ```
pub struct ResolveBuiltinCalls;

impl ResolveBuiltinCalls {
    fn resolution(ast: &Ast, call: NodeId) -> Option<Resolution> {
        let NodeKind::CallExpression {
            callee, arguments, ..
        } = ast.kind(call)
        else {
            return None;
        };
        if !arguments.iter().all(|a| is_literal_argument(ast, *a)) {
            return None;
        }

        match ast.kind(*callee) {
            NodeKind::Identifier { name } => {
                if !is_global_reference(ast, *callee)
                    || SKIP_BUILTIN_FUNCTIONS.contains(&name.as_str())
                    || !global_never_written(ast, name)
                {
                    return None;
                }
                if is_safe_implementation(name) {
                    let args = arguments
                        .iter()
                        .map(|a| ast.kind(*a).literal().and_then(literal_to_string))
                        .collect::<Option<Vec<String>>>()?;
                    return Some(Resolution::Host(name.clone(), args));
                }
                GLOBAL_FUNCTIONS
                    .contains(&name.as_str())
                    .then_some(Resolution::Sandbox)
            }
            NodeKind::MemberExpression { object, .. } => {
                let method = member_property_name(ast, *callee)?;
                if SKIP_PROPERTIES.contains(&method.as_str())
                    || PROPERTIES_THAT_MODIFY_CONTENT.contains(&method.as_str())
                {
                    return None;
                }
                let receiver_ok = match ast.kind(*object) {
                    NodeKind::Literal { value } => !matches!(value, LitValue::RegExp { .. }),
                    NodeKind::ArrayExpression { .. } => is_literal_argument(ast, *object),
                    NodeKind::Identifier { name } => {
                        BUILTIN_OBJECTS.contains(&name.as_str())
                            && !SKIP_IDENTIFIERS.contains(&name.as_str())
                            && is_global_reference(ast, *object)
                            && global_never_written(ast, name)
                    }
                    _ => is_literal_like(ast, *object),
                };
                receiver_ok.then_some(Resolution::Sandbox)
            }
            _ => None,
        }
    }
}

impl Rule for ResolveBuiltinCalls {
    fn name(&self) -> &'static str {
        "resolveBuiltinCalls"
    }

    fn description(&self) -> &'static str {
        "Resolves calls to deterministic builtins with literal arguments"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Unsafe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        let mut marked = 0;
        for call in session.candidates(NodeType::CallExpression, filter) {
            match Self::resolution(&session.ast, call) {
                Some(Resolution::Host(name, args)) => {
                    let Some(value) = safe_call(&name, &args) else {
                        continue;
                    };
                    let replacement = session.ast.string(&value);
                    if session.arborist.mark_replace(&session.ast, call, replacement) {
                        note(session, EventKind::CallResolved, self.name(), call);
                        marked += 1;
                    }
                }
                Some(Resolution::Sandbox) if session.has_oracle() => {
                    let source = expression_source(&session.ast, call);
                    if replace_with_evaluation(
                        session,
                        self.name(),
                        EventKind::CallResolved,
                        call,
                        &source,
                        primitive_or_array,
                    ) {
                        marked += 1;
                    }
                }
                _ => {}
            }
        }
        Ok(marked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        deobfuscation::rules::testing::{apply, apply_to},
        oracle::{testing::ScriptedOracle, EvalValue},
    };

    #[test]
    fn test_atob_without_sandbox() -> crate::Result<()> {
        assert_eq!(apply(&ResolveBuiltinCalls, "atob('dGVzdA==');")?, "'test';");
        assert_eq!(apply(&ResolveBuiltinCalls, "x = btoa('test');")?, "x = 'dGVzdA==';");
        Ok(())
    }

    #[test]
    fn test_shadowed_atob_untouched() -> crate::Result<()> {
        let src = "function atob(s) { return s; } x = atob('dGVzdA==');";
        assert_eq!(apply(&ResolveBuiltinCalls, src)?, src);
        Ok(())
    }

    #[test]
    fn test_method_on_literal() -> crate::Result<()> {
        let oracle = ScriptedOracle::new().answer(
            "'a-b'.split('-')",
            EvalValue::Array(vec![
                EvalValue::String("a".into()),
                EvalValue::String("b".into()),
            ]),
        );
        let mut session = Session::new("x = 'a-b'.split('-');")?.with_oracle(Box::new(oracle));
        let out = apply_to(&ResolveBuiltinCalls, &mut session)?;
        assert!(out.starts_with("x = ["), "{out}");
        assert!(out.contains("'a'") && out.contains("'b'"), "{out}");
        Ok(())
    }

    #[test]
    fn test_skipped_builtins() -> crate::Result<()> {
        let oracle = ScriptedOracle::new();
        let calls = oracle.calls();
        let src = "x = eval('1');\ny = 'abc'.match('a');\nz = Math.random();";
        let mut session = Session::new(src)?.with_oracle(Box::new(oracle));
        assert_eq!(apply_to(&ResolveBuiltinCalls, &mut session)?, src);
        assert!(calls.borrow().is_empty());
        Ok(())
    }
}
