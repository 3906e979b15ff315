//! Statement-level restructuring: blocks, empty statements, sequences and declarator
//! chains.

use crate::{
    arborist::ListSplicer,
    ast::{NodeId, NodeKind, NodeType},
    deobfuscation::{
        changes::EventKind,
        rule::{CandidateFilter, Rule, RuleCategory},
        rules::{
            helpers::{in_statement_list, is_lexical_declaration},
            note,
        },
        session::Session,
    },
    Result,
};

/// Splices nested blocks into the enclosing statement list.
///
/// ```text
/// a(); { b(); c(); }  =>  a(); b(); c();
/// ```
pub struct RemoveRedundantBlockStatements;

impl Rule for RemoveRedundantBlockStatements {
    fn name(&self) -> &'static str {
        "removeRedundantBlockStatements"
    }

    fn description(&self) -> &'static str {
        "Splices nested blocks without lexical declarations into their parent"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Safe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        let mut splicer = ListSplicer::new();
        for block in session.candidates(NodeType::BlockStatement, filter) {
            let ast = &session.ast;
            if !in_statement_list(ast, block) {
                continue;
            }
            let NodeKind::BlockStatement { body } = ast.kind(block) else {
                continue;
            };
            if body.iter().any(|s| is_lexical_declaration(ast, *s)) {
                continue;
            }
            if splicer.replace(ast, block, body.clone()) {
                note(session, EventKind::StatementsRestructured, self.name(), block);
            }
        }
        Ok(splicer.commit(&mut session.ast, &mut session.arborist))
    }
}

/// Drops empty statements held in statement lists.
///
/// Empty statements that form a required body (`for (;;);`) are kept.
pub struct NormalizeEmptyStatements;

impl Rule for NormalizeEmptyStatements {
    fn name(&self) -> &'static str {
        "normalizeEmptyStatements"
    }

    fn description(&self) -> &'static str {
        "Removes empty statements from statement lists"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Safe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        let mut marked = 0;
        for stmt in session.candidates(NodeType::EmptyStatement, filter) {
            if in_statement_list(&session.ast, stmt)
                && session.arborist.mark_delete(&session.ast, stmt)
            {
                note(session, EventKind::NodeRemoved, self.name(), stmt);
                marked += 1;
            }
        }
        Ok(marked)
    }
}

/// Places `statements` where `stmt` was: spliced into its statement list, or wrapped
/// in a block anywhere else.
fn restructure(
    session: &mut Session,
    splicer: &mut ListSplicer,
    stmt: NodeId,
    statements: Vec<NodeId>,
) -> bool {
    if in_statement_list(&session.ast, stmt) {
        return splicer.replace(&session.ast, stmt, statements);
    }
    let block = session.ast.block(statements);
    session.arborist.mark_replace(&session.ast, stmt, block)
}

/// Moves the leading expressions of a sequence out of `return` and `if` heads.
///
/// ```text
/// return a(), b();   =>  a(); return b();
/// if (a(), b) c();   =>  a(); if (b) c();
/// ```
pub struct RearrangeSequences;

impl Rule for RearrangeSequences {
    fn name(&self) -> &'static str {
        "rearrangeSequences"
    }

    fn description(&self) -> &'static str {
        "Moves leading sequence expressions out of return statements and if tests"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Safe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        let mut splicer = ListSplicer::new();
        let mut marked = 0;

        let mut candidates = session.candidates(NodeType::ReturnStatement, filter);
        candidates.extend(session.candidates(NodeType::IfStatement, filter));
        for stmt in candidates {
            let kind = session.ast.kind(stmt).clone();
            let head = match kind {
                NodeKind::ReturnStatement {
                    argument: Some(argument),
                } => argument,
                NodeKind::IfStatement { test, .. } => test,
                _ => continue,
            };
            let NodeKind::SequenceExpression { expressions } = session.ast.kind(head).clone()
            else {
                continue;
            };
            let Some((&last, leading)) = expressions.split_last() else {
                continue;
            };

            let mut statements: Vec<NodeId> =
                leading.iter().map(|e| session.ast.expr_stmt(*e)).collect();
            statements.push(match kind {
                NodeKind::IfStatement {
                    consequent,
                    alternate,
                    ..
                } => session.ast.if_stmt(last, consequent, alternate),
                _ => session.ast.return_stmt(Some(last)),
            });
            let in_list = in_statement_list(&session.ast, stmt);
            if restructure(session, &mut splicer, stmt, statements) {
                note(session, EventKind::StatementsRestructured, self.name(), stmt);
                if !in_list {
                    marked += 1;
                }
            }
        }

        Ok(marked + splicer.commit(&mut session.ast, &mut session.arborist))
    }
}

/// Splits declarations with several declarators.
///
/// ```text
/// var a = 1, b = 2;  =>  var a = 1; var b = 2;
/// ```
///
/// Declarations in `for` heads are left alone.
pub struct SeparateChainedDeclarators;

impl Rule for SeparateChainedDeclarators {
    fn name(&self) -> &'static str {
        "separateChainedDeclarators"
    }

    fn description(&self) -> &'static str {
        "Gives every declarator its own declaration statement"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Safe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        let mut splicer = ListSplicer::new();
        let mut marked = 0;
        for decl in session.candidates(NodeType::VariableDeclaration, filter) {
            let NodeKind::VariableDeclaration { kind, declarations } =
                session.ast.kind(decl).clone()
            else {
                continue;
            };
            if declarations.len() < 2 {
                continue;
            }
            let in_list = in_statement_list(&session.ast, decl);
            let var_in_body = kind == crate::ast::VarKind::Var
                && matches!(
                    session.ast.parent_key(decl),
                    "consequent" | "alternate" | "body"
                );
            if !in_list && !var_in_body {
                continue;
            }

            let statements = declarations
                .into_iter()
                .map(|d| {
                    session.ast.add(NodeKind::VariableDeclaration {
                        kind,
                        declarations: vec![d],
                    })
                })
                .collect();
            if restructure(session, &mut splicer, decl, statements) {
                note(session, EventKind::StatementsRestructured, self.name(), decl);
                if !in_list {
                    marked += 1;
                }
            }
        }
        Ok(marked + splicer.commit(&mut session.ast, &mut session.arborist))
    }
}

/// Splits sequence expression statements into one statement per expression.
///
/// ```text
/// a(), b();  =>  a(); b();
/// ```
pub struct ReplaceSequencesWithExpressions;

impl Rule for ReplaceSequencesWithExpressions {
    fn name(&self) -> &'static str {
        "replaceSequencesWithExpressions"
    }

    fn description(&self) -> &'static str {
        "Splits sequence expression statements"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Safe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        let mut splicer = ListSplicer::new();
        let mut marked = 0;
        for stmt in session.candidates(NodeType::ExpressionStatement, filter) {
            let NodeKind::ExpressionStatement { expression } = *session.ast.kind(stmt) else {
                continue;
            };
            let NodeKind::SequenceExpression { expressions } =
                session.ast.kind(expression).clone()
            else {
                continue;
            };
            let in_list = in_statement_list(&session.ast, stmt);
            let statements = expressions
                .into_iter()
                .map(|e| session.ast.expr_stmt(e))
                .collect();
            if restructure(session, &mut splicer, stmt, statements) {
                note(session, EventKind::StatementsRestructured, self.name(), stmt);
                if !in_list {
                    marked += 1;
                }
            }
        }
        Ok(marked + splicer.commit(&mut session.ast, &mut session.arborist))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deobfuscation::rules::testing::apply;

    #[test]
    fn test_remove_redundant_blocks() -> crate::Result<()> {
        assert_eq!(
            apply(&RemoveRedundantBlockStatements, "a(); { b(); c(); }")?,
            "a();\nb();\nc();"
        );
        assert_eq!(
            apply(&RemoveRedundantBlockStatements, "{ let x = 1; f(x); }")?,
            "{ let x = 1; f(x); }"
        );
        Ok(())
    }

    #[test]
    fn test_block_bodies_stay() -> crate::Result<()> {
        let src = "if (a) { b(); }";
        assert_eq!(apply(&RemoveRedundantBlockStatements, src)?, src);
        Ok(())
    }

    #[test]
    fn test_empty_statements() -> crate::Result<()> {
        assert_eq!(apply(&NormalizeEmptyStatements, "a();;; b();")?, "a();\nb();");
        let loop_body = "for (;;);";
        assert_eq!(apply(&NormalizeEmptyStatements, loop_body)?, loop_body);
        Ok(())
    }

    #[test]
    fn test_rearrange_return_sequence() -> crate::Result<()> {
        let out = apply(&RearrangeSequences, "function f() { return a(), b(); }")?;
        assert!(out.contains("a();\n  return b();"), "{out}");
        Ok(())
    }

    #[test]
    fn test_rearrange_if_sequence() -> crate::Result<()> {
        assert_eq!(
            apply(&RearrangeSequences, "if (a(), b) c();")?,
            "a();\nif (b)\n  c();"
        );
        Ok(())
    }

    #[test]
    fn test_separate_declarators() -> crate::Result<()> {
        assert_eq!(
            apply(&SeparateChainedDeclarators, "var a = 1, b = 2;")?,
            "var a = 1;\nvar b = 2;"
        );
        let for_head = "for (var i = 0, j = 1; i < j; i++) f();";
        assert_eq!(apply(&SeparateChainedDeclarators, for_head)?, for_head);
        Ok(())
    }

    #[test]
    fn test_split_sequence_statements() -> crate::Result<()> {
        assert_eq!(
            apply(&ReplaceSequencesWithExpressions, "a(), b(), c();")?,
            "a();\nb();\nc();"
        );
        Ok(())
    }
}
