//! Folding of expressions built only from literals.

use crate::{
    ast::{Ast, LitValue, NodeId, NodeKind, NodeType},
    deobfuscation::{
        changes::EventKind,
        rule::{CandidateFilter, Rule, RuleCategory},
        rules::{
            helpers::{is_literal_like, is_member_write, static_truthiness},
            note,
            unsafe_rules::{defined_primitive, expression_source, replace_with_evaluation},
        },
        session::Session,
    },
    Result,
};

/// Returns `true` for a literal that evaluates to a primitive.
fn is_plain_literal(ast: &Ast, id: NodeId) -> bool {
    matches!(ast.kind(id), NodeKind::Literal { value } if !matches!(value, LitValue::RegExp { .. }))
}

/// Evaluates JSFuck-style expressions built from `[]`, `{}`, `!`, `+` and `-`.
///
/// ```text
/// +!![]        =>  1
/// [] + {}      =>  '[object Object]'
/// ```
pub struct ResolveMinimalAlphabet;

impl ResolveMinimalAlphabet {
    fn is_minimal(ast: &Ast, id: NodeId) -> bool {
        match ast.kind(id) {
            NodeKind::UnaryExpression {
                operator: "+" | "-" | "!" | "~",
                argument,
            } => Self::is_minimal(ast, *argument),
            NodeKind::BinaryExpression {
                operator: "+" | "-",
                left,
                right,
            } => Self::is_minimal(ast, *left) && Self::is_minimal(ast, *right),
            NodeKind::ArrayExpression { elements } => elements
                .iter()
                .all(|e| e.is_some_and(|e| Self::is_minimal(ast, e))),
            NodeKind::ObjectExpression { properties } => properties.is_empty(),
            _ => is_plain_literal(ast, id),
        }
    }

    fn has_container(ast: &Ast, id: NodeId) -> bool {
        ast.descendants(id).iter().any(|&d| {
            matches!(
                ast.kind(d),
                NodeKind::ArrayExpression { .. } | NodeKind::ObjectExpression { .. }
            )
        })
    }
}

impl Rule for ResolveMinimalAlphabet {
    fn name(&self) -> &'static str {
        "resolveMinimalAlphabet"
    }

    fn description(&self) -> &'static str {
        "Evaluates expressions written in the []/{}/!/+ alphabet"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Unsafe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        if !session.has_oracle() {
            return Ok(0);
        }
        let mut candidates = session.candidates(NodeType::UnaryExpression, filter);
        candidates.extend(session.candidates(NodeType::BinaryExpression, filter));
        candidates.sort_unstable();

        let mut marked = 0;
        for id in candidates {
            let ast = &session.ast;
            let outermost = !ast.parent(id).is_some_and(|p| Self::is_minimal(ast, p));
            if !outermost || !Self::is_minimal(ast, id) || !Self::has_container(ast, id) {
                continue;
            }
            let source = expression_source(ast, id);
            if replace_with_evaluation(
                session,
                self.name(),
                EventKind::ConstantFolded,
                id,
                &source,
                defined_primitive,
            ) {
                marked += 1;
            }
        }
        Ok(marked)
    }
}

/// Evaluates the outermost binary expressions whose leaves are all literals.
///
/// ```text
/// "2" + 3 - "5" * 0 + "1"  =>  '231'
/// ```
pub struct ResolveDefiniteBinaryExpressions;

impl ResolveDefiniteBinaryExpressions {
    fn is_definite(ast: &Ast, id: NodeId) -> bool {
        match ast.kind(id) {
            NodeKind::BinaryExpression {
                operator,
                left,
                right,
            } => {
                !matches!(*operator, "in" | "instanceof")
                    && Self::is_definite(ast, *left)
                    && Self::is_definite(ast, *right)
            }
            NodeKind::UnaryExpression {
                operator: "-" | "+" | "!" | "~",
                argument,
            } => Self::is_definite(ast, *argument),
            _ => is_plain_literal(ast, id),
        }
    }
}

impl Rule for ResolveDefiniteBinaryExpressions {
    fn name(&self) -> &'static str {
        "resolveDefiniteBinaryExpressions"
    }

    fn description(&self) -> &'static str {
        "Evaluates binary expressions over literals"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Unsafe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        if !session.has_oracle() {
            return Ok(0);
        }
        let mut marked = 0;
        for id in session.candidates(NodeType::BinaryExpression, filter) {
            let ast = &session.ast;
            let nested = ast.parent(id).is_some_and(|p| {
                matches!(
                    ast.kind(p),
                    NodeKind::BinaryExpression { .. } | NodeKind::UnaryExpression { .. }
                ) && Self::is_definite(ast, p)
            });
            if nested || !Self::is_definite(ast, id) {
                continue;
            }
            let source = expression_source(ast, id);
            if replace_with_evaluation(
                session,
                self.name(),
                EventKind::ConstantFolded,
                id,
                &source,
                defined_primitive,
            ) {
                marked += 1;
            }
        }
        Ok(marked)
    }
}

/// Evaluates property reads on literal strings and arrays.
///
/// ```text
/// 'abc'[1]      =>  'b'
/// [1, 2][0]     =>  1
/// 'abc'.length  =>  3
/// ```
pub struct ResolveDefiniteMemberExpressions;

impl ResolveDefiniteMemberExpressions {
    fn is_definite(ast: &Ast, member: NodeId) -> bool {
        let NodeKind::MemberExpression {
            object,
            property,
            computed,
            ..
        } = *ast.kind(member)
        else {
            return false;
        };
        let object_ok = match ast.kind(object) {
            NodeKind::Literal {
                value: LitValue::String(_),
            } => true,
            NodeKind::ArrayExpression { elements } => elements
                .iter()
                .all(|e| e.is_some_and(|e| is_literal_like(ast, e))),
            _ => false,
        };
        let property_ok = match (ast.kind(property), computed) {
            (NodeKind::Literal { value }, true) => {
                matches!(value, LitValue::Number(_) | LitValue::String(_))
            }
            (NodeKind::Identifier { name }, false) => name == "length",
            _ => false,
        };
        object_ok && property_ok
    }
}

impl Rule for ResolveDefiniteMemberExpressions {
    fn name(&self) -> &'static str {
        "resolveDefiniteMemberExpressions"
    }

    fn description(&self) -> &'static str {
        "Evaluates indexing into literal strings and arrays"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Unsafe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        if !session.has_oracle() {
            return Ok(0);
        }
        let mut marked = 0;
        for member in session.candidates(NodeType::MemberExpression, filter) {
            let ast = &session.ast;
            if !Self::is_definite(ast, member)
                || is_member_write(ast, member)
                || ast.parent_key(member) == "callee"
            {
                continue;
            }
            let source = expression_source(ast, member);
            if replace_with_evaluation(
                session,
                self.name(),
                EventKind::MemberResolved,
                member,
                &source,
                defined_primitive,
            ) {
                marked += 1;
            }
        }
        Ok(marked)
    }
}

/// Folds `!` applied to literals, arrays and objects.
///
/// ```text
/// !0   =>  true
/// ![]  =>  false
/// ```
pub struct NormalizeRedundantNotOperator;

impl Rule for NormalizeRedundantNotOperator {
    fn name(&self) -> &'static str {
        "normalizeRedundantNotOperator"
    }

    fn description(&self) -> &'static str {
        "Folds logical not over values of known truthiness"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Unsafe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        let mut marked = 0;
        for id in session.candidates(NodeType::UnaryExpression, filter) {
            let ast = &session.ast;
            let NodeKind::UnaryExpression {
                operator: "!",
                argument,
            } = *ast.kind(id)
            else {
                continue;
            };
            let foldable = matches!(
                ast.kind(argument),
                NodeKind::Literal { .. }
                    | NodeKind::ArrayExpression { .. }
                    | NodeKind::ObjectExpression { .. }
                    | NodeKind::UnaryExpression { operator: "!", .. }
            );
            let Some(truthy) = static_truthiness(ast, argument).filter(|_| foldable) else {
                continue;
            };
            let replacement = session.ast.boolean(!truthy);
            if session.arborist.mark_replace(&session.ast, id, replacement) {
                note(session, EventKind::ConstantFolded, self.name(), id);
                marked += 1;
            }
        }
        Ok(marked)
    }
}

/// Picks the branch of conditional expressions whose test has a known truthiness.
///
/// ```text
/// x = 1 ? a : b;  =>  x = a;
/// ```
pub struct ResolveDeterministicConditionalExpressions;

impl Rule for ResolveDeterministicConditionalExpressions {
    fn name(&self) -> &'static str {
        "resolveDeterministicConditionalExpressions"
    }

    fn description(&self) -> &'static str {
        "Replaces conditional expressions on constant tests with the taken branch"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Unsafe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        let mut marked = 0;
        for id in session.candidates(NodeType::ConditionalExpression, filter) {
            let ast = &session.ast;
            let NodeKind::ConditionalExpression {
                test,
                consequent,
                alternate,
            } = *ast.kind(id)
            else {
                continue;
            };
            let Some(truthy) = static_truthiness(ast, test) else {
                continue;
            };
            let taken = if truthy { consequent } else { alternate };
            if session.arborist.mark_replace(&session.ast, id, taken) {
                note(session, EventKind::BranchResolved, self.name(), id);
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
        oracle::{testing::ScriptedOracle, EvalValue},
    };

    fn session(source: &str, oracle: ScriptedOracle) -> crate::Result<Session> {
        Ok(Session::new(source)?.with_oracle(Box::new(oracle)))
    }

    #[test]
    fn test_definite_binary_expression() -> crate::Result<()> {
        let src = r#""2" + 3 - "5" * 0 + "1""#;
        let oracle = ScriptedOracle::new().answer(src, EvalValue::String("231".into()));
        let calls = oracle.calls();
        let mut session = session(src, oracle)?;
        assert_eq!(
            apply_to(&ResolveDefiniteBinaryExpressions, &mut session)?,
            "'231';"
        );
        assert!(calls.borrow().iter().all(|c| c == src));
        Ok(())
    }

    #[test]
    fn test_binary_without_oracle_untouched() -> crate::Result<()> {
        let src = "x = 1 + 2;";
        assert_eq!(apply(&ResolveDefiniteBinaryExpressions, src)?, src);
        Ok(())
    }

    #[test]
    fn test_binary_with_identifier_untouched() -> crate::Result<()> {
        let src = "x = a + 2;";
        let oracle = ScriptedOracle::new();
        let calls = oracle.calls();
        let mut session = session(src, oracle)?;
        assert_eq!(apply_to(&ResolveDefiniteBinaryExpressions, &mut session)?, src);
        assert!(calls.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn test_minimal_alphabet() -> crate::Result<()> {
        let src = "x = +!![];";
        let oracle = ScriptedOracle::new().answer("+!![]", EvalValue::Number(1.0));
        let mut session = session(src, oracle)?;
        assert_eq!(apply_to(&ResolveMinimalAlphabet, &mut session)?, "x = 1;");
        Ok(())
    }

    #[test]
    fn test_definite_member() -> crate::Result<()> {
        let src = "x = 'abc'[1];";
        let oracle = ScriptedOracle::new().answer("'abc'[1]", EvalValue::String("b".into()));
        let mut session = session(src, oracle)?;
        assert_eq!(
            apply_to(&ResolveDefiniteMemberExpressions, &mut session)?,
            "x = 'b';"
        );
        Ok(())
    }

    #[test]
    fn test_failed_evaluation_leaves_tree() -> crate::Result<()> {
        let src = "x = [1, 2][5];";
        let oracle = ScriptedOracle::new().answer("[1, 2][5]", EvalValue::Undefined);
        let mut session = session(src, oracle)?;
        assert_eq!(apply_to(&ResolveDefiniteMemberExpressions, &mut session)?, src);
        Ok(())
    }

    #[test]
    fn test_redundant_not() -> crate::Result<()> {
        assert_eq!(
            apply(&NormalizeRedundantNotOperator, "x = !0; y = ![]; z = !a;")?,
            "x = true;\ny = false;\nz = !a;"
        );
        Ok(())
    }

    #[test]
    fn test_deterministic_conditional() -> crate::Result<()> {
        assert_eq!(
            apply(
                &ResolveDeterministicConditionalExpressions,
                "x = 1 ? a : b; y = '' ? a : b; z = c ? a : b;"
            )?,
            "x = a;\ny = b;\nz = c ? a : b;"
        );
        Ok(())
    }
}
