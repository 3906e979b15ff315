//! Control flow simplification: constant branches, redundant logic, boolean statements
//! and flattened switches.

use std::collections::HashSet;

use crate::{
    ast::{Ast, LitValue, NodeId, NodeKind, NodeType},
    deobfuscation::{
        changes::EventKind,
        rule::{CandidateFilter, Rule, RuleCategory},
        rules::{
            helpers::{declarator_init, is_empty_statement, is_pure, static_truthiness},
            note,
        },
        session::Session,
    },
    Result,
};

/// Replaces `if` statements with a constant test by the branch that runs.
///
/// ```text
/// if (true) a(); else b();  =>  a();
/// if (!1) c();              =>  (removed)
/// ```
pub struct ResolveDeterministicIfStatements;

impl Rule for ResolveDeterministicIfStatements {
    fn name(&self) -> &'static str {
        "resolveDeterministicIfStatements"
    }

    fn description(&self) -> &'static str {
        "Resolves if statements whose test is a constant"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Safe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        let mut marked = 0;
        for stmt in session.candidates(NodeType::IfStatement, filter) {
            let NodeKind::IfStatement {
                test,
                consequent,
                alternate,
            } = *session.ast.kind(stmt)
            else {
                continue;
            };
            let Some(truthy) = static_truthiness(&session.ast, test) else {
                continue;
            };
            let taken = if truthy { Some(consequent) } else { alternate };
            let staged = match taken {
                Some(branch) => session.arborist.mark_replace(&session.ast, stmt, branch),
                None => session.arborist.mark_delete(&session.ast, stmt),
            };
            if staged {
                note(session, EventKind::BranchResolved, self.name(), stmt);
                marked += 1;
            }
        }
        Ok(marked)
    }
}

/// Drops operands of `&&` / `||` chains in `if` tests whose truthiness is known.
///
/// Only the truthiness of a test matters, so `a && true` tests like `a`. Operands are
/// dropped only when they have no side effects.
pub struct ResolveRedundantLogicalExpressions;

impl ResolveRedundantLogicalExpressions {
    /// Returns a simpler node with the same truthiness as `id`, if there is one.
    fn simplify(ast: &mut Ast, id: NodeId) -> Option<NodeId> {
        let NodeKind::LogicalExpression {
            operator,
            left,
            right,
        } = *ast.kind(id)
        else {
            return None;
        };
        if !matches!(operator, "&&" | "||") {
            return None;
        }
        let new_left = Self::simplify(ast, left);
        let new_right = Self::simplify(ast, right);
        let l = new_left.unwrap_or(left);
        let r = new_right.unwrap_or(right);

        let lt = static_truthiness(ast, l);
        let rt = static_truthiness(ast, r);
        let resolved = match (operator, lt, rt) {
            ("&&", Some(true), _) | ("||", Some(false), _) if is_pure(ast, l) => Some(r),
            ("&&", Some(false), _) | ("||", Some(true), _) => Some(l),
            ("&&", _, Some(true)) | ("||", _, Some(false)) if is_pure(ast, r) => Some(l),
            ("&&", _, Some(false)) | ("||", _, Some(true)) if is_pure(ast, l) && is_pure(ast, r) => {
                Some(r)
            }
            _ => None,
        };
        match resolved {
            Some(node) => Some(node),
            None if new_left.is_some() || new_right.is_some() => {
                Some(ast.add(NodeKind::LogicalExpression {
                    operator,
                    left: l,
                    right: r,
                }))
            }
            None => None,
        }
    }
}

impl Rule for ResolveRedundantLogicalExpressions {
    fn name(&self) -> &'static str {
        "resolveRedundantLogicalExpressions"
    }

    fn description(&self) -> &'static str {
        "Removes constant operands from logical if tests"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Safe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        let mut marked = 0;
        for stmt in session.candidates(NodeType::IfStatement, filter) {
            let NodeKind::IfStatement { test, .. } = *session.ast.kind(stmt) else {
                continue;
            };
            let Some(simpler) = Self::simplify(&mut session.ast, test) else {
                continue;
            };
            if session.arborist.mark_replace(&session.ast, test, simpler) {
                note(session, EventKind::ConstantFolded, self.name(), test);
                marked += 1;
            }
        }
        Ok(marked)
    }
}

/// Removes empty branches from `if` statements.
///
/// ```text
/// if (a) {} else b();  =>  if (!a) b();
/// if (a) b(); else {}  =>  if (a) b();
/// if (a) {}            =>  a;
/// ```
pub struct SimplifyIfStatements;

impl Rule for SimplifyIfStatements {
    fn name(&self) -> &'static str {
        "simplifyIfStatements"
    }

    fn description(&self) -> &'static str {
        "Removes empty if branches"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Safe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        let mut marked = 0;
        for stmt in session.candidates(NodeType::IfStatement, filter) {
            let NodeKind::IfStatement {
                test,
                consequent,
                alternate,
            } = *session.ast.kind(stmt)
            else {
                continue;
            };
            let empty_consequent = is_empty_statement(&session.ast, consequent);
            let empty_alternate = alternate.map(|a| is_empty_statement(&session.ast, a));
            let ast = &mut session.ast;

            let replacement = match (empty_consequent, empty_alternate) {
                (true, None | Some(true)) => ast.expr_stmt(test),
                (true, Some(false)) => {
                    let inner = match ast.kind(test) {
                        NodeKind::UnaryExpression {
                            operator: "!",
                            argument,
                        } => Some(*argument),
                        _ => None,
                    };
                    let negated = match inner {
                        Some(argument) => argument,
                        None => ast.unary("!", test),
                    };
                    ast.if_stmt(negated, alternate.unwrap_or(consequent), None)
                }
                (false, Some(true)) => ast.if_stmt(test, consequent, None),
                _ => continue,
            };
            if session.arborist.mark_replace(&session.ast, stmt, replacement) {
                note(session, EventKind::StatementsRestructured, self.name(), stmt);
                marked += 1;
            }
        }
        Ok(marked)
    }
}

/// Turns logical expression statements into `if` statements.
///
/// ```text
/// a && b();  =>  if (a) b();
/// a || b();  =>  if (!a) b();
/// ```
pub struct ReplaceBooleanExpressionsWithIf;

impl Rule for ReplaceBooleanExpressionsWithIf {
    fn name(&self) -> &'static str {
        "replaceBooleanExpressionsWithIf"
    }

    fn description(&self) -> &'static str {
        "Rewrites short-circuit expression statements as if statements"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Safe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        let mut marked = 0;
        for stmt in session.candidates(NodeType::ExpressionStatement, filter) {
            let NodeKind::ExpressionStatement { expression } = *session.ast.kind(stmt) else {
                continue;
            };
            let NodeKind::LogicalExpression {
                operator,
                left,
                right,
            } = *session.ast.kind(expression)
            else {
                continue;
            };
            let ast = &mut session.ast;
            let test = match operator {
                "&&" => left,
                "||" => ast.unary("!", left),
                _ => continue,
            };
            let body = ast.expr_stmt(right);
            let replacement = ast.if_stmt(test, body, None);
            if session.arborist.mark_replace(&session.ast, stmt, replacement) {
                note(session, EventKind::StatementsRestructured, self.name(), stmt);
                marked += 1;
            }
        }
        Ok(marked)
    }
}

/// Upper bound on case transitions followed through one flattened switch.
const MAX_SWITCH_STEPS: usize = 1000;

/// Linearizes switches whose control flow is driven by a state variable with a literal
/// initial value.
///
/// ```text
/// var s = 1;
/// while (true) {
///   switch (s) {
///     case 0: b(); return;
///     case 1: a(); s = 0; break;
///   }
/// }
/// ```
///
/// becomes `{ a(); b(); return; }`. A standalone switch is replaced by the body of the
/// case its state selects. Switches with fallthrough, cycles or state changes outside
/// plain case-level assignments are left alone.
pub struct RearrangeSwitches;

/// A case of a flattened switch.
struct FlatCase {
    test: Option<LitValue>,
    body: Vec<NodeId>,
}

impl RearrangeSwitches {
    /// Returns the loop a switch drives if the switch is the loop's only statement.
    fn driving_loop(ast: &Ast, switch: NodeId) -> Option<NodeId> {
        let mut current = switch;
        let mut parent = ast.parent(current)?;
        if let NodeKind::BlockStatement { body } = ast.kind(parent) {
            if body.len() != 1 {
                return None;
            }
            current = parent;
            parent = ast.parent(current)?;
        }
        if ast.parent_key(current) != "body"
            || matches!(ast.parent_kind(parent), Some(NodeKind::LabeledStatement { .. }))
        {
            return None;
        }
        let endless = match ast.kind(parent) {
            NodeKind::WhileStatement { test, .. } => static_truthiness(ast, *test) == Some(true),
            NodeKind::ForStatement {
                init: None,
                test,
                update: None,
                ..
            } => test.map_or(true, |t| static_truthiness(ast, t) == Some(true)),
            _ => false,
        };
        endless.then_some(parent)
    }

    /// Returns the literal assigned by a `state = <literal>;` statement.
    fn state_write(ast: &Ast, stmt: NodeId, state: NodeId) -> Option<LitValue> {
        let NodeKind::ExpressionStatement { expression } = ast.kind(stmt) else {
            return None;
        };
        match ast.kind(*expression) {
            NodeKind::AssignmentExpression {
                operator: "=",
                left,
                right,
            } if ast.decl(*left) == Some(state) => ast.kind(*right).literal().cloned(),
            _ => None,
        }
    }

    /// Returns `true` if `stmt` holds a `break` or `continue` that would leave the
    /// switch or its loop.
    fn escapes(ast: &Ast, stmt: NodeId) -> bool {
        let mut stack = vec![stmt];
        while let Some(id) = stack.pop() {
            match ast.kind(id) {
                NodeKind::BreakStatement { .. } | NodeKind::ContinueStatement { .. } => {
                    return true
                }
                kind if kind.is_function() => {}
                // only labelled jumps can leave a nested loop or switch
                NodeKind::WhileStatement { .. }
                | NodeKind::DoWhileStatement { .. }
                | NodeKind::ForStatement { .. }
                | NodeKind::ForInStatement { .. }
                | NodeKind::ForOfStatement { .. }
                | NodeKind::SwitchStatement { .. } => stack.extend(Self::labelled_jumps(ast, id)),
                kind => stack.extend(kind.children()),
            }
        }
        false
    }

    fn labelled_jumps(ast: &Ast, id: NodeId) -> Vec<NodeId> {
        ast.descendants(id)
            .into_iter()
            .filter(|d| {
                matches!(
                    ast.kind(*d),
                    NodeKind::BreakStatement { label: Some(_) }
                        | NodeKind::ContinueStatement { label: Some(_) }
                )
            })
            .collect()
    }

    /// Follows the state machine and returns the statements it runs, in order.
    fn linearize(
        ast: &Ast,
        cases: &[FlatCase],
        state: NodeId,
        mut value: LitValue,
        in_loop: bool,
    ) -> Option<Vec<NodeId>> {
        let mut visited = HashSet::new();
        let mut out = Vec::new();
        for _ in 0..MAX_SWITCH_STEPS {
            let index = cases
                .iter()
                .position(|c| c.test.as_ref() == Some(&value))
                .or_else(|| cases.iter().position(|c| c.test.is_none()));
            let Some(index) = index else {
                return (!in_loop).then_some(out);
            };
            if !visited.insert(index) {
                return None;
            }

            let mut ended = false;
            for &stmt in &cases[index].body {
                if let Some(next) = Self::state_write(ast, stmt, state) {
                    value = next;
                    continue;
                }
                match ast.kind(stmt) {
                    NodeKind::BreakStatement { label: None } => {
                        ended = true;
                        break;
                    }
                    NodeKind::ContinueStatement { label: None } if in_loop => {
                        ended = true;
                        break;
                    }
                    NodeKind::ReturnStatement { .. } | NodeKind::ThrowStatement { .. }
                        if in_loop =>
                    {
                        out.push(stmt);
                        return Some(out);
                    }
                    _ if Self::escapes(ast, stmt) => return None,
                    _ => out.push(stmt),
                }
            }
            if !ended {
                return None;
            }
            if !in_loop {
                return Some(out);
            }
        }
        None
    }
}

impl Rule for RearrangeSwitches {
    fn name(&self) -> &'static str {
        "rearrangeSwitches"
    }

    fn description(&self) -> &'static str {
        "Linearizes switch statements driven by a literal state variable"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Safe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        let mut marked = 0;
        for switch in session.candidates(NodeType::SwitchStatement, filter) {
            let ast = &session.ast;
            let NodeKind::SwitchStatement {
                discriminant,
                cases,
            } = ast.kind(switch)
            else {
                continue;
            };
            let Some(state) = ast.decl(*discriminant) else {
                continue;
            };
            let Some(initial) = declarator_init(ast, state)
                .and_then(|init| ast.kind(init).literal().cloned())
            else {
                continue;
            };

            let mut flat = Vec::with_capacity(cases.len());
            let mut valid = true;
            for &case in cases {
                let NodeKind::SwitchCase { test, consequent } = ast.kind(case) else {
                    valid = false;
                    break;
                };
                let test = match test {
                    Some(t) => match ast.kind(*t).literal() {
                        Some(value) => Some(value.clone()),
                        None => {
                            valid = false;
                            break;
                        }
                    },
                    None => None,
                };
                flat.push(FlatCase {
                    test,
                    body: consequent.clone(),
                });
            }
            if !valid {
                continue;
            }

            // every other use of the state must be a case-level literal assignment
            let case_level: HashSet<NodeId> = flat
                .iter()
                .flat_map(|c| c.body.iter().copied())
                .filter(|s| Self::state_write(ast, *s, state).is_some())
                .collect();
            let controlled = ast.references(state).iter().all(|&r| {
                r == *discriminant
                    || ast
                        .ancestors(r)
                        .nth(1)
                        .is_some_and(|stmt| case_level.contains(&stmt))
            });
            if !controlled {
                continue;
            }

            let driving = Self::driving_loop(ast, switch);
            let Some(statements) =
                Self::linearize(ast, &flat, state, initial, driving.is_some())
            else {
                continue;
            };
            let target = driving.unwrap_or(switch);
            let block = session.ast.block(statements);
            if session.arborist.mark_replace(&session.ast, target, block) {
                note(session, EventKind::StatementsRestructured, self.name(), target);
                marked += 1;
            }
        }
        Ok(marked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deobfuscation::rules::testing::apply;

    #[test]
    fn test_deterministic_if() -> crate::Result<()> {
        assert_eq!(
            apply(
                &ResolveDeterministicIfStatements,
                "if (true) do_a(); else do_b(); if (false) do_c(); else do_d();"
            )?,
            "do_a();\ndo_d();"
        );
        assert_eq!(apply(&ResolveDeterministicIfStatements, "a(); if (!1) c();")?, "a();");
        Ok(())
    }

    #[test]
    fn test_unknown_test_untouched() -> crate::Result<()> {
        let src = "if (x) a();";
        assert_eq!(apply(&ResolveDeterministicIfStatements, src)?, src);
        Ok(())
    }

    #[test]
    fn test_redundant_logical() -> crate::Result<()> {
        assert_eq!(
            apply(&ResolveRedundantLogicalExpressions, "if (true && a) b();")?,
            "if (a)\n  b();"
        );
        assert_eq!(
            apply(&ResolveRedundantLogicalExpressions, "if (a || false) b();")?,
            "if (a)\n  b();"
        );
        // the call on the left must still run
        let src = "if (f() && false) b();";
        assert_eq!(apply(&ResolveRedundantLogicalExpressions, src)?, src);
        Ok(())
    }

    #[test]
    fn test_simplify_if() -> crate::Result<()> {
        assert_eq!(
            apply(&SimplifyIfStatements, "if (a) {} else b();")?,
            "if (!a)\n  b();"
        );
        assert_eq!(apply(&SimplifyIfStatements, "if (a) b(); else {}")?, "if (a)\n  b();");
        assert_eq!(apply(&SimplifyIfStatements, "if (a) {}")?, "a;");
        Ok(())
    }

    #[test]
    fn test_boolean_expressions() -> crate::Result<()> {
        assert_eq!(
            apply(&ReplaceBooleanExpressionsWithIf, "a && b();")?,
            "if (a)\n  b();"
        );
        assert_eq!(
            apply(&ReplaceBooleanExpressionsWithIf, "a || b();")?,
            "if (!a)\n  b();"
        );
        Ok(())
    }

    #[test]
    fn test_flattened_switch_in_loop() -> crate::Result<()> {
        let src = "function f() {\n  var s = 1;\n  while (true) {\n    switch (s) {\n      case 0:\n        b();\n        return;\n      case 1:\n        a();\n        s = 0;\n        break;\n    }\n  }\n}";
        let out = apply(&RearrangeSwitches, src)?;
        assert!(out.contains("{\n    a();\n    b();\n    return;\n  }"), "{out}");
        assert!(!out.contains("switch"));
        Ok(())
    }

    #[test]
    fn test_standalone_switch() -> crate::Result<()> {
        let out = apply(
            &RearrangeSwitches,
            "var s = 'b'; switch (s) { case 'a': x(); break; case 'b': y(); break; }",
        )?;
        assert_eq!(out, "var s = 'b';\n{\n  y();\n}");
        Ok(())
    }

    #[test]
    fn test_switch_cycle_left_alone() -> crate::Result<()> {
        let src = "function f() { var s = 0; while (true) { switch (s) { case 0: a(); s = 1; break; case 1: b(); s = 0; break; } } }";
        assert_eq!(apply(&RearrangeSwitches, src)?, src);
        Ok(())
    }
}
