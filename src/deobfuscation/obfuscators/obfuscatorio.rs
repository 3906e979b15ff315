//! obfuscator.io (javascript-obfuscator) support.
//!
//! The tool's default preset moves string literals into an array held by a
//! self-replacing function, rotates that array at startup and reads it through a
//! decoder function. With the self-defending option it also installs guards
//! (`newState`, `removeCookie`) that hang the script once it is reformatted.

use std::{collections::HashSet, sync::OnceLock};

use regex::Regex;

use crate::{
    ast::{Ast, NodeKind, NodeType},
    deobfuscation::{
        detection::{DetectionEvidence, DetectionScore},
        obfuscators::{
            arrays::{held_array, rotations},
            AugmentedArrayProcessor, FreezeUnbeautifiedValues, Obfuscator,
        },
        rule::Rule,
        rules::helpers::is_write,
    },
};

/// Identifiers the tool generates by default.
fn hex_identifier() -> Option<&'static Regex> {
    static HEX: OnceLock<Option<Regex>> = OnceLock::new();
    HEX.get_or_init(|| Regex::new("^_0x[0-9a-f]{4,6}$").ok())
        .as_ref()
}

/// obfuscator.io output.
pub struct ObfuscatorIo;

impl ObfuscatorIo {
    /// Adds evidence for functions that hold a string array and replace themselves.
    fn score_array_functions(ast: &Ast, score: &DetectionScore) {
        for &func in ast.nodes_of(NodeType::FunctionDeclaration) {
            let NodeKind::FunctionDeclaration { id: Some(id), .. } = *ast.kind(func) else {
                continue;
            };
            if held_array(ast, func).is_none() {
                continue;
            }
            let replaces_itself = ast
                .references(id)
                .iter()
                .any(|&r| ast.is_ancestor(func, r) && is_write(ast, r));
            if replaces_itself {
                score.add(DetectionEvidence::StructuralPattern {
                    description: format!("self-replacing array function {}", ast.text(id)),
                    confidence: 30,
                });
            }
        }
    }
}

impl Obfuscator for ObfuscatorIo {
    fn id(&self) -> String {
        "obfuscator.io".to_string()
    }

    fn name(&self) -> String {
        "obfuscator.io".to_string()
    }

    fn detect(&self, ast: &Ast) -> DetectionScore {
        let score = DetectionScore::new();
        Self::score_array_functions(ast, &score);

        if rotations(ast).iter().any(|r| r.wrapped) {
            score.add(DetectionEvidence::StructuralPattern {
                description: "rotation of a function-wrapped array".to_string(),
                confidence: 30,
            });
        }

        let strings: HashSet<&str> = ast
            .nodes_of(NodeType::Literal)
            .iter()
            .filter_map(|&l| ast.kind(l).string_value())
            .collect();
        for guard in ["newState", "removeCookie"] {
            if strings.contains(guard) {
                score.add(DetectionEvidence::StringLiteral {
                    value: guard.to_string(),
                    confidence: 20,
                });
            }
        }

        let generated: HashSet<&str> = match hex_identifier() {
            Some(hex) => ast
                .nodes_of(NodeType::Identifier)
                .iter()
                .filter_map(|&i| ast.kind(i).ident_name())
                .filter(|name| hex.is_match(name))
                .collect(),
            None => HashSet::new(),
        };
        if generated.len() >= 3 {
            score.add(DetectionEvidence::Identifier {
                name: "_0x".to_string(),
                confidence: 20,
            });
        }
        score
    }

    fn preprocessors(&self) -> Vec<Box<dyn Rule>> {
        vec![
            Box::new(FreezeUnbeautifiedValues),
            Box::new(AugmentedArrayProcessor),
        ]
    }

    fn description(&self) -> &'static str {
        "Function-wrapped rotated string arrays and self-defending guards"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "function _0x1a2b() {\n\
        var _0x3c4d = ['log', 'hello', 'newState'];\n\
        _0x1a2b = function () { return _0x3c4d; };\n\
        return _0x1a2b();\n\
        }\n\
        (function (_0x5e6f, n) { var a = _0x5e6f(); while (--n) { a.push(a.shift()); } })(_0x1a2b, 2);\n\
        function _0x7a8b(i) { return _0x1a2b()[i]; }\n\
        console[_0x7a8b(0)](_0x7a8b(1));";

    #[test]
    fn test_detect_sample() -> crate::Result<()> {
        let ast = Ast::parse(SAMPLE)?;
        let score = ObfuscatorIo.detect(&ast);
        assert_eq!(score.score(), 100);
        assert!(score.evidence_summary().contains("string:newState"));
        Ok(())
    }

    #[test]
    fn test_plain_script() -> crate::Result<()> {
        let ast = Ast::parse("function add(a, b) { return a + b; }")?;
        assert_eq!(ObfuscatorIo.detect(&ast).score(), 0);
        Ok(())
    }
}
