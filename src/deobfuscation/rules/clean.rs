//! Dead declaration removal.
//!
//! Removing unreferenced declarations is not always behavior preserving: code built at
//! runtime (`eval`, `new Function`, another script on the same page) can still reach a
//! name that has no static reference. The rule therefore only runs when explicitly
//! requested.

use crate::{
    ast::{Ast, NodeId, NodeKind, NodeType},
    deobfuscation::{
        changes::EventKind,
        rule::{CandidateFilter, Rule, RuleCategory},
        rules::{
            helpers::{in_statement_list, is_declaring, is_pure},
            note,
        },
        session::Session,
    },
    Result,
};

/// Returns `true` if nothing other than redeclarations refers to the binding.
fn unreferenced(ast: &Ast, decl: NodeId) -> bool {
    ast.references(decl)
        .iter()
        .all(|&r| r == decl || is_declaring(ast, r))
}

/// Removes declarations nothing refers to.
///
/// Variable declarators are removed when their initializer has no side effects;
/// function and class declarations are removed from statement lists.
///
/// ```text
/// var a = 1, b = f(); function g() {} use(b);  =>  var b = f(); use(b);
/// ```
pub struct RemoveDeadNodes;

impl RemoveDeadNodes {
    fn dead_declarator(ast: &Ast, declarator: NodeId) -> Option<NodeId> {
        let NodeKind::VariableDeclarator { id, init } = *ast.kind(declarator) else {
            return None;
        };
        if !matches!(ast.kind(id), NodeKind::Identifier { .. })
            || !unreferenced(ast, id)
            || init.is_some_and(|init| !is_pure(ast, init))
        {
            return None;
        }
        let declaration = ast.parent(declarator)?;
        // for heads keep their declaration
        if matches!(ast.parent_key(declaration), "init" | "left") {
            return None;
        }
        let alone = matches!(
            ast.kind(declaration),
            NodeKind::VariableDeclaration { declarations, .. } if declarations.len() == 1
        );
        if !alone {
            return Some(declarator);
        }
        in_statement_list(ast, declaration).then_some(declaration)
    }

    fn dead_declaration(ast: &Ast, declaration: NodeId) -> bool {
        let id = match ast.kind(declaration) {
            NodeKind::FunctionDeclaration { id: Some(id), .. }
            | NodeKind::ClassDeclaration { id: Some(id), .. } => *id,
            _ => return false,
        };
        in_statement_list(ast, declaration) && unreferenced(ast, id)
    }
}

impl Rule for RemoveDeadNodes {
    fn name(&self) -> &'static str {
        "removeDeadNodes"
    }

    fn description(&self) -> &'static str {
        "Removes declarations that are never referenced"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Clean
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        let mut marked = 0;
        for declarator in session.candidates(NodeType::VariableDeclarator, filter) {
            let Some(removed) = Self::dead_declarator(&session.ast, declarator) else {
                continue;
            };
            if session.arborist.mark_delete(&session.ast, removed) {
                note(session, EventKind::NodeRemoved, self.name(), removed);
                marked += 1;
            }
        }

        let mut declarations = session.candidates(NodeType::FunctionDeclaration, filter);
        declarations.extend(session.candidates(NodeType::ClassDeclaration, filter));
        for declaration in declarations {
            if !Self::dead_declaration(&session.ast, declaration) {
                continue;
            }
            if session.arborist.mark_delete(&session.ast, declaration) {
                note(session, EventKind::NodeRemoved, self.name(), declaration);
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
    fn test_removes_unreferenced() -> crate::Result<()> {
        assert_eq!(
            apply(&RemoveDeadNodes, "var a = 1, b = f(); function g() {} use(b);")?,
            "var b = f();\nuse(b);"
        );
        Ok(())
    }

    #[test]
    fn test_keeps_side_effects() -> crate::Result<()> {
        let src = "var a = f();";
        assert_eq!(apply(&RemoveDeadNodes, src)?, src);
        Ok(())
    }

    #[test]
    fn test_removes_unused_class_and_single_declaration() -> crate::Result<()> {
        assert_eq!(
            apply(&RemoveDeadNodes, "class A {}\nconst x = 'y';\nrun();")?,
            "run();"
        );
        Ok(())
    }

    #[test]
    fn test_keeps_referenced_and_loop_heads() -> crate::Result<()> {
        let out = apply(&RemoveDeadNodes, "function g() { return 1; } for (var k = 0;;) g();")?;
        assert!(out.starts_with("function g()"), "{out}");
        assert!(out.contains("for (var k = 0;;)"), "{out}");
        Ok(())
    }
}
