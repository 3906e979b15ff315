//! Readability normalization run after the main loop.

use crate::{
    ast::{build::is_identifier_name, Ast, NodeId, NodeKind, NodeType},
    deobfuscation::{
        changes::EventKind,
        rule::{CandidateFilter, Rule, RuleCategory},
        rules::note,
        session::Session,
    },
    Result,
};

/// Returns the key of a member, property or method when it is a string that can be
/// written as an identifier.
fn identifier_key(ast: &Ast, key: NodeId) -> Option<String> {
    ast.kind(key)
        .string_value()
        .filter(|name| is_identifier_name(name))
        .map(str::to_string)
}

/// Rewrites computed access with string keys into dot access and plain keys.
///
/// ```text
/// a['b']            =>  a.b
/// x = { ['b']: 1 }  =>  x = { b: 1 }
/// ```
pub struct NormalizeComputed;

impl NormalizeComputed {
    fn member(ast: &mut Ast, member: NodeId) -> Option<NodeId> {
        let NodeKind::MemberExpression {
            object,
            property,
            computed: true,
            optional,
        } = *ast.kind(member)
        else {
            return None;
        };
        let name = identifier_key(ast, property)?;
        let property = ast.ident(&name);
        Some(ast.add(NodeKind::MemberExpression {
            object,
            property,
            computed: false,
            optional,
        }))
    }

    fn key(ast: &mut Ast, node: NodeId) -> Option<NodeId> {
        let mut kind = ast.kind(node).clone();
        let (key, computed) = match &mut kind {
            NodeKind::Property { key, computed, .. }
            | NodeKind::MethodDefinition { key, computed, .. }
            | NodeKind::PropertyDefinition { key, computed, .. } => (key, computed),
            _ => return None,
        };
        let name = identifier_key(ast, *key)?;
        // a computed `__proto__` defines an own property, a plain one sets the prototype
        if *computed && name == "__proto__" {
            return None;
        }
        *key = ast.ident(&name);
        *computed = false;
        Some(ast.add(kind))
    }
}

impl Rule for NormalizeComputed {
    fn name(&self) -> &'static str {
        "normalizeComputed"
    }

    fn description(&self) -> &'static str {
        "Replaces computed string keys with dot access and identifier keys"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Normalize
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        let mut marked = 0;
        let members = session.candidates(NodeType::MemberExpression, filter);
        for member in members {
            let Some(replacement) = Self::member(&mut session.ast, member) else {
                continue;
            };
            if session.arborist.mark_replace(&session.ast, member, replacement) {
                note(session, EventKind::Normalized, self.name(), member);
                marked += 1;
            }
        }

        let mut keyed = session.candidates(NodeType::Property, filter);
        keyed.extend(session.candidates(NodeType::MethodDefinition, filter));
        keyed.extend(session.candidates(NodeType::PropertyDefinition, filter));
        for node in keyed {
            let Some(replacement) = Self::key(&mut session.ast, node) else {
                continue;
            };
            if session.arborist.mark_replace(&session.ast, node, replacement) {
                note(session, EventKind::Normalized, self.name(), node);
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
    fn test_dot_access() -> crate::Result<()> {
        assert_eq!(apply(&NormalizeComputed, "a['b'](c['d e']);")?, "a.b(c['d e']);");
        assert_eq!(apply(&NormalizeComputed, "x = a['class'];")?, "x = a['class'];");
        Ok(())
    }

    #[test]
    fn test_object_keys() -> crate::Result<()> {
        assert_eq!(apply(&NormalizeComputed, "x = { ['b']: 1 };")?, "x = { b: 1 };");
        Ok(())
    }
}
