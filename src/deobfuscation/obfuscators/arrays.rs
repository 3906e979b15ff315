//! String array families.
//!
//! All three families hoist the script's string literals into one array and replace
//! every use with a read from it. They differ in how the array is reached: directly,
//! after an IIFE rotated it in place, or through a function returning it.

use crate::{
    ast::{Ast, LitValue, NodeId, NodeKind, NodeType},
    deobfuscation::{
        detection::{DetectionEvidence, DetectionScore},
        obfuscators::{AugmentedArrayProcessor, Obfuscator},
        rule::Rule,
        rules::{
            helpers::{function_of, is_declaring, is_member_write, is_write},
            ResolveFunctionToArray,
        },
    },
};

/// An IIFE that rotates a string array before the script uses it.
///
/// ```text
/// (function (arr, n) { while (--n) arr.push(arr.shift()); })(strings, 0x1a2);
/// ```
#[derive(Debug, Clone, Copy)]
pub(super) struct Rotation {
    /// The statement holding the IIFE.
    pub statement: NodeId,
    /// The identifier declaring the rotated array or the function holding it.
    pub target: NodeId,
    /// `true` if the array is held by a function.
    pub wrapped: bool,
}

/// Returns `true` for a non-empty array literal of strings.
pub(super) fn is_string_array(ast: &Ast, id: NodeId) -> bool {
    match ast.kind(id) {
        NodeKind::ArrayExpression { elements } => {
            !elements.is_empty()
                && elements.iter().all(|e| {
                    e.is_some_and(|e| {
                        matches!(
                            ast.kind(e),
                            NodeKind::Literal {
                                value: LitValue::String(_)
                            }
                        )
                    })
                })
        }
        _ => false,
    }
}

/// Returns the string array a function declaration holds.
pub(super) fn held_array(ast: &Ast, func: NodeId) -> Option<NodeId> {
    ast.descendants(func)
        .into_iter()
        .find(|&d| is_string_array(ast, d))
}

/// Returns the initializer of a declarator binding `decl` when it is a string array.
pub(super) fn declared_array(ast: &Ast, decl: NodeId) -> Option<NodeId> {
    match ast.parent_kind(decl) {
        Some(NodeKind::VariableDeclarator { id, init: Some(init) })
            if *id == decl && is_string_array(ast, *init) =>
        {
            Some(*init)
        }
        _ => None,
    }
}

/// Returns the references of `decl` other than its declarations.
fn reads(ast: &Ast, decl: NodeId) -> Vec<NodeId> {
    ast.references(decl)
        .iter()
        .copied()
        .filter(|&r| r != decl && !is_declaring(ast, r))
        .collect()
}

/// Returns `true` if a reference is the object of `ref[...]` read access.
fn is_indexed_read(ast: &Ast, reference: NodeId) -> bool {
    ast.parent_key(reference) == "object"
        && matches!(
            ast.parent_kind(reference),
            Some(NodeKind::MemberExpression { computed: true, .. })
        )
        && ast.parent(reference).is_some_and(|m| !is_member_write(ast, m))
        && !is_write(ast, reference)
}

/// Returns `true` if a function contains `push` and `shift` member accesses.
fn shuffles(ast: &Ast, func: NodeId) -> bool {
    let names: Vec<&str> = ast
        .descendants(func)
        .into_iter()
        .filter_map(|d| match ast.kind(d) {
            NodeKind::MemberExpression {
                property,
                computed,
                ..
            } => {
                let property = ast.kind(*property);
                if *computed {
                    property.string_value()
                } else {
                    property.ident_name()
                }
            }
            _ => None,
        })
        .collect();
    names.contains(&"push") && names.contains(&"shift")
}

/// Finds the array rotating IIFEs at the top level of a script.
pub(super) fn rotations(ast: &Ast) -> Vec<Rotation> {
    let NodeKind::Program { body, .. } = ast.kind(ast.root()) else {
        return Vec::new();
    };
    body.iter()
        .filter_map(|&statement| {
            let NodeKind::ExpressionStatement { mut expression } = *ast.kind(statement) else {
                return None;
            };
            if let NodeKind::UnaryExpression {
                operator: "!",
                argument,
            } = *ast.kind(expression)
            {
                expression = argument;
            }
            let NodeKind::CallExpression {
                callee, arguments, ..
            } = ast.kind(expression)
            else {
                return None;
            };
            if !matches!(ast.kind(*callee), NodeKind::FunctionExpression { .. })
                || !shuffles(ast, *callee)
            {
                return None;
            }
            let counted = arguments.iter().any(|a| {
                matches!(
                    ast.kind(*a),
                    NodeKind::Literal {
                        value: LitValue::Number(_)
                    }
                )
            });
            if !counted {
                return None;
            }
            arguments.iter().find_map(|&a| {
                let decl = ast.decl(a)?;
                if declared_array(ast, decl).is_some() {
                    return Some(Rotation {
                        statement,
                        target: decl,
                        wrapped: false,
                    });
                }
                let func = function_of(ast, decl)?;
                held_array(ast, func).map(|_| Rotation {
                    statement,
                    target: decl,
                    wrapped: true,
                })
            })
        })
        .collect()
}

/// Adds the evidence of global string arrays that are only read through indices.
fn score_indexed_arrays(ast: &Ast, score: &DetectionScore) {
    for &declarator in ast.nodes_of(NodeType::VariableDeclarator) {
        let NodeKind::VariableDeclarator { id, init: Some(init) } = *ast.kind(declarator) else {
            continue;
        };
        let global = ast
            .parent(declarator)
            .is_some_and(|d| matches!(ast.parent_kind(d), Some(NodeKind::Program { .. })));
        if !global || !is_string_array(ast, init) {
            continue;
        }
        let reads = reads(ast, id);
        if reads.is_empty() || !reads.iter().all(|&r| is_indexed_read(ast, r)) {
            continue;
        }
        score.add(DetectionEvidence::StructuralPattern {
            description: format!("global string array {}", ast.text(id)),
            confidence: 30,
        });
        score.add(DetectionEvidence::CodePattern {
            pattern: "indexed array read".to_string(),
            match_count: reads.len(),
            confidence_per_match: 10,
        });
    }
}

/// A global string array read through numeric indices.
///
/// The generic rules resolve the reads; the family needs no processing of its own.
pub struct ArrayReplacements;

impl Obfuscator for ArrayReplacements {
    fn id(&self) -> String {
        "array_replacements".to_string()
    }

    fn name(&self) -> String {
        "Array Replacements".to_string()
    }

    fn detect(&self, ast: &Ast) -> DetectionScore {
        let score = DetectionScore::new();
        score_indexed_arrays(ast, &score);
        if rotations(ast).iter().any(|r| !r.wrapped) {
            score.add(DetectionEvidence::Contradiction {
                description: "array is rotated".to_string(),
                confidence_reduction: 40,
            });
        }
        score
    }

    fn description(&self) -> &'static str {
        "Global string array read through numeric indices"
    }
}

/// A global string array rotated in place by an IIFE before it is read.
///
/// The rotation is evaluated once and the array literal replaced by its rotated form,
/// after which the reads resolve like plain array replacements.
pub struct AugmentedArrayReplacements;

impl Obfuscator for AugmentedArrayReplacements {
    fn id(&self) -> String {
        "augmented_array_replacements".to_string()
    }

    fn name(&self) -> String {
        "Augmented Array Replacements".to_string()
    }

    fn detect(&self, ast: &Ast) -> DetectionScore {
        let score = DetectionScore::new();
        for rotation in rotations(ast).iter().filter(|r| !r.wrapped) {
            score.add(DetectionEvidence::StructuralPattern {
                description: format!("rotation of {}", ast.text(rotation.target)),
                confidence: 60,
            });
        }
        score
    }

    fn preprocessors(&self) -> Vec<Box<dyn Rule>> {
        vec![Box::new(AugmentedArrayProcessor)]
    }

    fn description(&self) -> &'static str {
        "String array rotated by an IIFE before use"
    }
}

/// A string array produced by calling a function, then read through indices.
pub struct FunctionToArrayReplacements;

impl FunctionToArrayReplacements {
    /// Returns `true` if a function returns an array literal.
    fn returns_array(ast: &Ast, func: NodeId) -> bool {
        ast.descendants(func).into_iter().any(|d| {
            matches!(
                ast.kind(d),
                NodeKind::ReturnStatement { argument: Some(a) }
                    if matches!(ast.kind(*a), NodeKind::ArrayExpression { .. })
            )
        })
    }
}

impl Obfuscator for FunctionToArrayReplacements {
    fn id(&self) -> String {
        "function_to_array_replacements".to_string()
    }

    fn name(&self) -> String {
        "Function To Array Replacements".to_string()
    }

    fn detect(&self, ast: &Ast) -> DetectionScore {
        let score = DetectionScore::new();
        for &declarator in ast.nodes_of(NodeType::VariableDeclarator) {
            let NodeKind::VariableDeclarator { id, init: Some(init) } = *ast.kind(declarator)
            else {
                continue;
            };
            let NodeKind::CallExpression { callee, .. } = ast.kind(init) else {
                continue;
            };
            let returns_array = ast
                .decl(*callee)
                .and_then(|decl| function_of(ast, decl))
                .is_some_and(|func| Self::returns_array(ast, func));
            if !returns_array {
                continue;
            }
            let reads = reads(ast, id);
            if reads.is_empty() || !reads.iter().all(|&r| is_indexed_read(ast, r)) {
                continue;
            }
            score.add(DetectionEvidence::StructuralPattern {
                description: format!("array returned to {}", ast.text(id)),
                confidence: 40,
            });
            score.add(DetectionEvidence::CodePattern {
                pattern: "indexed array read".to_string(),
                match_count: reads.len(),
                confidence_per_match: 10,
            });
        }
        score
    }

    fn preprocessors(&self) -> Vec<Box<dyn Rule>> {
        vec![Box::new(ResolveFunctionToArray)]
    }

    fn description(&self) -> &'static str {
        "String array returned by a function and read through indices"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROTATED: &str = "var s = ['a', 'b', 'c'];\n\
        (function (arr, n) { while (--n) { arr.push(arr.shift()); } })(s, 2);\n\
        f(s[0], s[1]);";

    #[test]
    fn test_array_replacements() -> crate::Result<()> {
        let ast = Ast::parse("var s = ['a', 'b']; f(s[0]); g(s[1]);")?;
        assert_eq!(ArrayReplacements.detect(&ast).score(), 50);

        let ast = Ast::parse("var s = ['a', 'b']; f(s[0]); s.push('c');")?;
        assert_eq!(ArrayReplacements.detect(&ast).score(), 0);
        Ok(())
    }

    #[test]
    fn test_rotation() -> crate::Result<()> {
        let ast = Ast::parse(ROTATED)?;
        let found = rotations(&ast);
        assert_eq!(found.len(), 1);
        assert!(!found[0].wrapped);
        assert_eq!(ast.text(found[0].target), "s");

        assert_eq!(AugmentedArrayReplacements.detect(&ast).score(), 60);
        assert!(ArrayReplacements.detect(&ast).score() < 50);
        Ok(())
    }

    #[test]
    fn test_function_to_array() -> crate::Result<()> {
        let ast = Ast::parse("function f() { return ['a', 'b']; } var a = f(); g(a[0], a[1]);")?;
        assert_eq!(FunctionToArrayReplacements.detect(&ast).score(), 60);
        let ast = Ast::parse("function f() { return 1; } var a = f(); g(a[0]);")?;
        assert_eq!(FunctionToArrayReplacements.detect(&ast).score(), 0);
        Ok(())
    }
}
