//! Family specific rules run once around the main loop.

use crate::{
    ast::{Ast, NodeId, NodeKind, NodeType},
    deobfuscation::{
        changes::EventKind,
        obfuscators::arrays::{declared_array, held_array, rotations},
        rule::{CandidateFilter, Rule, RuleCategory},
        rules::{
            helpers::{enclosing_statement, function_of, member_property_name, single_return},
            note,
        },
        session::Session,
    },
    oracle::{reify, EvalValue},
    Result,
};

/// Names of the self-defending guards obfuscator.io installs.
const GUARDS: &[&str] = &["newState", "removeCookie"];

/// Value the frozen guards return.
const BYPASSED: &str = "bypassed!";

/// Applies array rotations ahead of time.
///
/// The array declaration and the rotating IIFE are evaluated together; the array
/// literal is replaced by the rotated array and the IIFE is removed.
///
/// ```text
/// var s = ['a', 'b', 'c'];
/// (function (arr, n) { while (--n) arr.push(arr.shift()); })(s, 2);
///   =>
/// var s = ['b', 'c', 'a'];
/// ```
pub struct AugmentedArrayProcessor;

impl Rule for AugmentedArrayProcessor {
    fn name(&self) -> &'static str {
        "augmentedArrayProcessor"
    }

    fn description(&self) -> &'static str {
        "Replaces a rotated string array with its rotated contents"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Processor
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        if !session.has_oracle() {
            return Ok(0);
        }
        let mut marked = 0;
        for rotation in rotations(&session.ast) {
            let ast = &session.ast;
            if !filter.accepts(ast, rotation.statement) {
                continue;
            }
            let array = if rotation.wrapped {
                function_of(ast, rotation.target).and_then(|func| held_array(ast, func))
            } else {
                declared_array(ast, rotation.target)
            };
            let (Some(array), Some(holder)) = (array, enclosing_statement(ast, rotation.target))
            else {
                continue;
            };
            let name = ast.text(rotation.target);
            let read = if rotation.wrapped {
                format!("{name}()")
            } else {
                name.into_owned()
            };
            let source = format!(
                "{}\n{}\n{read}",
                ast.text(holder),
                ast.text(rotation.statement)
            );

            let rotated = match session.evaluate_value(&source) {
                Ok(EvalValue::Array(items))
                    if items.iter().all(|v| matches!(v, EvalValue::String(_))) =>
                {
                    EvalValue::Array(items)
                }
                Ok(other) => {
                    log::debug!("{}: rotation produced {}", self.name(), other.type_name());
                    continue;
                }
                Err(e) => {
                    log::debug!("{}: {e}", self.name());
                    continue;
                }
            };
            let Ok(replacement) = reify(&mut session.ast, &rotated) else {
                continue;
            };
            if session
                .arborist
                .mark_replace(&session.ast, array, replacement)
            {
                session.arborist.mark_delete(&session.ast, rotation.statement);
                note(session, EventKind::ConstantFolded, self.name(), array);
                marked += 2;
            }
        }
        Ok(marked)
    }
}

/// Disarms the guards obfuscator.io uses to break reformatted scripts.
///
/// The guards test the source text of their own functions against a regular
/// expression. Reformatting changes that text, so every guard function is replaced by
/// one returning a constant.
///
/// ```text
/// { removeCookie: function () { return 'dev'; } }
///   =>
/// { removeCookie: function () { return 'bypassed!'; } }
/// ```
pub struct FreezeUnbeautifiedValues;

impl FreezeUnbeautifiedValues {
    /// Returns the guard function a property or assignment installs.
    fn guard(ast: &Ast, id: NodeId) -> Option<NodeId> {
        let (name, value) = match ast.kind(id) {
            NodeKind::Property {
                key,
                value,
                computed,
                ..
            } => {
                let key = ast.kind(*key);
                let name = if *computed {
                    key.string_value()
                } else {
                    key.ident_name().or_else(|| key.string_value())
                };
                (name?.to_string(), *value)
            }
            NodeKind::AssignmentExpression {
                operator: "=",
                left,
                right,
            } => (member_property_name(ast, *left)?, *right),
            _ => return None,
        };
        if !GUARDS.contains(&name.as_str())
            || !matches!(ast.kind(value), NodeKind::FunctionExpression { .. })
        {
            return None;
        }
        let frozen = single_return(ast, value)
            .and_then(|r| ast.kind(r).string_value())
            .is_some_and(|s| s == BYPASSED);
        (!frozen).then_some(value)
    }
}

impl Rule for FreezeUnbeautifiedValues {
    fn name(&self) -> &'static str {
        "freezeUnbeautifiedValues"
    }

    fn description(&self) -> &'static str {
        "Replaces self-defending guard functions with constant functions"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Processor
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        let mut marked = 0;
        let mut candidates = session.candidates(NodeType::Property, filter);
        candidates.extend(session.candidates(NodeType::AssignmentExpression, filter));
        for id in candidates {
            let Some(guard) = Self::guard(&session.ast, id) else {
                continue;
            };
            let ast = &mut session.ast;
            let value = ast.string(BYPASSED);
            let ret = ast.return_stmt(Some(value));
            let body = ast.block(vec![ret]);
            let frozen = ast.func_expr(Vec::new(), body);
            if session.arborist.mark_replace(&session.ast, guard, frozen) {
                note(session, EventKind::ConstantFolded, self.name(), guard);
                marked += 1;
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
        oracle::testing::ScriptedOracle,
    };

    #[test]
    fn test_rotation_applied() -> crate::Result<()> {
        let declaration = "var s = ['a', 'b', 'c'];";
        let iife = "(function (arr, n) { while (--n) { arr.push(arr.shift()); } })(s, 2);";
        let oracle = ScriptedOracle::new().answer(
            &format!("{declaration}\n{iife}\ns"),
            EvalValue::Array(vec![
                EvalValue::String("b".into()),
                EvalValue::String("c".into()),
                EvalValue::String("a".into()),
            ]),
        );
        let src = format!("{declaration}\n{iife}\nf(s[0]);");
        let mut session = Session::new(&src)?.with_oracle(Box::new(oracle));
        let out = apply_to(&AugmentedArrayProcessor, &mut session)?;
        assert!(!out.contains("shift"), "{out}");
        assert!(out.starts_with("var s = [\n  'b',"), "{out}");
        assert!(out.ends_with("f(s[0]);"), "{out}");
        Ok(())
    }

    #[test]
    fn test_rotation_needs_oracle() -> crate::Result<()> {
        let src = "var s = ['a', 'b'];\n(function (arr, n) { arr.push(arr.shift()); })(s, 1);";
        assert_eq!(apply(&AugmentedArrayProcessor, src)?, src);
        Ok(())
    }

    #[test]
    fn test_guards_frozen() -> crate::Result<()> {
        let out = apply(
            &FreezeUnbeautifiedValues,
            "var g = { removeCookie: function () { return 'dev'; }, other: function () {} };",
        )?;
        assert!(out.contains("return 'bypassed!';"), "{out}");
        assert!(!out.contains("'dev'"), "{out}");
        assert!(out.contains("other: function ()"), "{out}");

        let frozen = "x.newState = function () {\n  return 'bypassed!';\n};";
        assert_eq!(apply(&FreezeUnbeautifiedValues, frozen)?, frozen);
        Ok(())
    }
}
