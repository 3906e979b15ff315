//! Rules that inline what a binding is known to hold: fixed literals, aliases of other
//! bindings, proxy functions, literal arrays and directly assigned properties.

use crate::{
    ast::{Ast, LitValue, NodeId, NodeKind, NodeType},
    deobfuscation::{
        changes::EventKind,
        rule::{CandidateFilter, Rule, RuleCategory},
        rules::{
            helpers::{
                declaration_of, declarator_init, duplicate, enclosing_function,
                global_never_written, in_statement_list, is_call_argument, is_declaring,
                is_global_reference, is_literal_like, is_member_write, is_mutated_through,
                is_read_only, is_write, member_property_name, resolve_name, simple_params,
                single_return,
            },
            note,
        },
        session::Session,
    },
    Result,
};

/// Arrays shorter than this are left to the other rules.
const MIN_ARRAY_LENGTH: usize = 20;

/// Returns the identifier and initializer of a declarator binding a plain name outside
/// a `for` head.
fn plain_declarator(ast: &Ast, declarator: NodeId) -> Option<(NodeId, Option<NodeId>)> {
    let NodeKind::VariableDeclarator { id, init } = *ast.kind(declarator) else {
        return None;
    };
    if !matches!(ast.kind(id), NodeKind::Identifier { .. }) {
        return None;
    }
    let declaration = ast.parent(declarator)?;
    if matches!(ast.parent_key(declaration), "init" | "left") {
        return None;
    }
    Some((id, init))
}

/// Returns the references of `decl` that read it after its declaration.
fn later_reads(ast: &Ast, decl: NodeId) -> Vec<NodeId> {
    ast.references(decl)
        .iter()
        .copied()
        .filter(|&r| r > decl && !is_declaring(ast, r))
        .collect()
}

/// Returns `true` if nothing ever reassigns the binding `decl`.
fn never_reassigned(ast: &Ast, decl: NodeId) -> bool {
    ast.references(decl).iter().all(|&r| !is_write(ast, r))
}

/// Returns `true` if the identifier `target` holds the same value wherever it is read:
/// a binding that is never reassigned, or a global that is never written.
fn stable_target(ast: &Ast, target: NodeId) -> bool {
    match (ast.decl(target), ast.kind(target).ident_name()) {
        (Some(decl), _) => never_reassigned(ast, decl),
        (None, Some(name)) => {
            is_global_reference(ast, target) && global_never_written(ast, name)
        }
        _ => false,
    }
}

/// Returns `true` if every site in `sites` sees `target` resolve to the same binding.
fn resolves_everywhere(ast: &Ast, target: NodeId, sites: &[NodeId]) -> bool {
    let Some(name) = ast.kind(target).ident_name() else {
        return false;
    };
    let binding = ast.decl(target);
    sites.iter().all(|&s| resolve_name(ast, s, name) == binding)
}

/// Replaces references of never-reassigned bindings initialized with a literal.
///
/// ```text
/// var a = 3; f(a);  =>  var a = 3; f(3);
/// ```
pub struct ReplaceIdentifierWithFixedAssignedValue;

impl Rule for ReplaceIdentifierWithFixedAssignedValue {
    fn name(&self) -> &'static str {
        "replaceIdentifierWithFixedAssignedValue"
    }

    fn description(&self) -> &'static str {
        "Inlines literals held by bindings that are never reassigned"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Safe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        let mut marked = 0;
        for declarator in session.candidates(NodeType::VariableDeclarator, filter) {
            let ast = &session.ast;
            let Some((id, Some(init))) = plain_declarator(ast, declarator) else {
                continue;
            };
            if !is_literal_like(ast, init) || !is_read_only(ast, id, true) {
                continue;
            }
            for reference in later_reads(ast, id) {
                let value = duplicate(&mut session.ast, init);
                if session.arborist.mark_replace(&session.ast, reference, value) {
                    note(session, EventKind::IdentifierInlined, self.name(), reference);
                    marked += 1;
                }
            }
        }
        Ok(marked)
    }
}

/// Replaces reads of a binding declared without a value and assigned a literal exactly
/// once, in a statement of the same list as the declaration.
///
/// ```text
/// var a; a = 3; f(a);  =>  var a; a = 3; f(3);
/// ```
pub struct ReplaceIdentifierWithFixedValueNotAssignedAtDeclaration;

impl ReplaceIdentifierWithFixedValueNotAssignedAtDeclaration {
    /// Returns the assignment statement and assigned literal of the single write.
    fn single_assignment(
        ast: &Ast,
        declaration: NodeId,
        write: NodeId,
    ) -> Option<(NodeId, NodeId)> {
        let assignment = ast.parent(write)?;
        let NodeKind::AssignmentExpression {
            operator: "=",
            left,
            right,
        } = *ast.kind(assignment)
        else {
            return None;
        };
        if left != write
            || !is_literal_like(ast, right)
            || ast.parent_key(assignment) != "expression"
        {
            return None;
        }
        let stmt = ast.parent(assignment)?;
        let same_list = in_statement_list(ast, stmt)
            && in_statement_list(ast, declaration)
            && ast.parent(stmt) == ast.parent(declaration)
            && stmt > declaration;
        same_list.then_some((stmt, right))
    }
}

impl Rule for ReplaceIdentifierWithFixedValueNotAssignedAtDeclaration {
    fn name(&self) -> &'static str {
        "replaceIdentifierWithFixedValueNotAssignedAtDeclaration"
    }

    fn description(&self) -> &'static str {
        "Inlines literals assigned once to bindings declared without a value"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Safe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        let mut marked = 0;
        for declarator in session.candidates(NodeType::VariableDeclarator, filter) {
            let ast = &session.ast;
            let Some((id, None)) = plain_declarator(ast, declarator) else {
                continue;
            };
            let Some(declaration) = ast.parent(declarator) else {
                continue;
            };
            let refs = ast.references(id);
            let writes: Vec<NodeId> = refs.iter().copied().filter(|&r| is_write(ast, r)).collect();
            let [write] = writes.as_slice() else {
                continue;
            };
            let Some((stmt, value)) = Self::single_assignment(ast, declaration, *write) else {
                continue;
            };
            let scope = enclosing_function(ast, stmt);
            let reads: Vec<NodeId> = refs
                .iter()
                .copied()
                .filter(|&r| r != *write && !is_declaring(ast, r))
                .collect();
            let ordered = reads.iter().all(|&r| {
                r > stmt
                    && !ast.is_ancestor(stmt, r)
                    && !is_mutated_through(ast, r)
                    && enclosing_function(ast, r) == scope
            });
            if !ordered || reads.is_empty() {
                continue;
            }

            for reference in reads {
                let replacement = duplicate(&mut session.ast, value);
                if session.arborist.mark_replace(&session.ast, reference, replacement) {
                    note(session, EventKind::IdentifierInlined, self.name(), reference);
                    marked += 1;
                }
            }
        }
        Ok(marked)
    }
}

/// Replaces a binding that only aliases another identifier with that identifier, and
/// drops the alias.
///
/// ```text
/// const a = b; f(a);  =>  f(b);
/// ```
pub struct ResolveProxyVariables;

impl Rule for ResolveProxyVariables {
    fn name(&self) -> &'static str {
        "resolveProxyVariables"
    }

    fn description(&self) -> &'static str {
        "Replaces aliases of identifiers with the identifier they alias"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Safe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        let mut marked = 0;
        for declarator in session.candidates(NodeType::VariableDeclarator, filter) {
            let ast = &session.ast;
            let Some((id, Some(target))) = plain_declarator(ast, declarator) else {
                continue;
            };
            let Some(name) = ast.kind(target).ident_name().map(str::to_owned) else {
                continue;
            };
            if ast.decl(target) == Some(id) || !never_reassigned(ast, id) {
                continue;
            }
            let refs: Vec<NodeId> = ast.references(id).to_vec();
            if refs.is_empty()
                || refs.iter().any(|&r| r < id || is_declaring(ast, r))
                || !stable_target(ast, target)
                || !resolves_everywhere(ast, target, &refs)
            {
                continue;
            }
            let Some(declaration) = ast.parent(declarator) else {
                continue;
            };
            let alone = matches!(
                ast.kind(declaration),
                NodeKind::VariableDeclaration { declarations, .. } if declarations.len() == 1
            );

            let mut replaced = 0;
            for reference in refs {
                let replacement = session.ast.ident(&name);
                if session.arborist.mark_replace(&session.ast, reference, replacement) {
                    replaced += 1;
                }
            }
            if replaced == 0 {
                continue;
            }
            let removed = if alone { declaration } else { declarator };
            session.arborist.mark_delete(&session.ast, removed);
            note(session, EventKind::ProxyResolved, self.name(), declarator);
            marked += replaced + 1;
        }
        Ok(marked)
    }
}

/// Replaces references of a binding initialized with a member chain with the chain.
///
/// ```text
/// var log = console.log; log('x');  =>  var log = console.log; console.log('x');
/// ```
pub struct ResolveProxyReferences;

impl ResolveProxyReferences {
    /// Returns the root identifier of a static member chain (`a.b['c']`).
    fn chain_root(ast: &Ast, id: NodeId) -> Option<NodeId> {
        match ast.kind(id) {
            NodeKind::Identifier { .. } => Some(id),
            NodeKind::MemberExpression { object, .. } => {
                member_property_name(ast, id)?;
                Self::chain_root(ast, *object)
            }
            _ => None,
        }
    }

    /// Returns `true` if no reference to the root of the chain changes what it holds.
    fn root_unchanged(ast: &Ast, root: NodeId) -> bool {
        match ast.decl(root) {
            Some(decl) => ast
                .references(decl)
                .iter()
                .all(|&r| !is_write(ast, r) && !is_mutated_through(ast, r)),
            None => stable_target(ast, root),
        }
    }
}

impl Rule for ResolveProxyReferences {
    fn name(&self) -> &'static str {
        "resolveProxyReferences"
    }

    fn description(&self) -> &'static str {
        "Replaces aliases of member expressions with the member expression"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Safe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        let mut marked = 0;
        for declarator in session.candidates(NodeType::VariableDeclarator, filter) {
            let ast = &session.ast;
            let Some((id, Some(init))) = plain_declarator(ast, declarator) else {
                continue;
            };
            if !matches!(ast.kind(init), NodeKind::MemberExpression { .. }) {
                continue;
            }
            let Some(root) = Self::chain_root(ast, init) else {
                continue;
            };
            if ast.decl(root) == Some(id)
                || !never_reassigned(ast, id)
                || !Self::root_unchanged(ast, root)
            {
                continue;
            }
            let reads = later_reads(ast, id);
            if reads.len() != ast.references(id).len() || !resolves_everywhere(ast, root, &reads) {
                continue;
            }

            for reference in reads {
                let replacement = duplicate(&mut session.ast, init);
                if session.arborist.mark_replace(&session.ast, reference, replacement) {
                    note(session, EventKind::ProxyResolved, self.name(), reference);
                    marked += 1;
                }
            }
        }
        Ok(marked)
    }
}

/// Calls functions directly instead of through functions that only forward to them.
///
/// ```text
/// function p(a, b) { return f(a, b); }
/// p(1, 2);  =>  f(1, 2);
/// ```
pub struct ResolveProxyCalls;

impl ResolveProxyCalls {
    /// Returns the forwarded-to identifier and parameter count of a proxy function.
    fn forwarded(ast: &Ast, func: NodeId) -> Option<(NodeId, usize)> {
        let params = simple_params(ast, func)?;
        let value = single_return(ast, func)?;
        let NodeKind::CallExpression {
            callee, arguments, ..
        } = ast.kind(value)
        else {
            return None;
        };
        let forwards = arguments.len() == params.len()
            && arguments
                .iter()
                .zip(&params)
                .all(|(a, p)| ast.decl(*a) == Some(*p));
        let target = ast.decl(*callee);
        let outer = matches!(ast.kind(*callee), NodeKind::Identifier { .. })
            && !target.is_some_and(|t| ast.is_ancestor(func, t));
        (forwards && outer && stable_target(ast, *callee)).then_some((*callee, params.len()))
    }
}

impl Rule for ResolveProxyCalls {
    fn name(&self) -> &'static str {
        "resolveProxyCalls"
    }

    fn description(&self) -> &'static str {
        "Calls functions directly instead of through forwarding functions"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Safe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        let mut marked = 0;
        for func in session.candidates(NodeType::FunctionDeclaration, filter) {
            let ast = &session.ast;
            let NodeKind::FunctionDeclaration { id: Some(name), .. } = *ast.kind(func) else {
                continue;
            };
            let Some((target, arity)) = Self::forwarded(ast, func) else {
                continue;
            };
            let Some(target_name) = ast.kind(target).ident_name().map(str::to_owned) else {
                continue;
            };
            if !never_reassigned(ast, name) {
                continue;
            }
            let sites: Vec<NodeId> = ast
                .references(name)
                .iter()
                .copied()
                .filter(|&r| ast.parent_key(r) == "callee")
                .filter(|&r| {
                    matches!(
                        ast.parent_kind(r),
                        Some(NodeKind::CallExpression { arguments, .. }) if arguments.len() <= arity
                    )
                })
                .filter(|&r| !ast.is_ancestor(func, r))
                .collect();
            if sites.is_empty() || !resolves_everywhere(ast, target, &sites) {
                continue;
            }

            for site in sites {
                let replacement = session.ast.ident(&target_name);
                if session.arborist.mark_replace(&session.ast, site, replacement) {
                    note(session, EventKind::ProxyResolved, self.name(), site);
                    marked += 1;
                }
            }
        }
        Ok(marked)
    }
}

/// Replaces numeric indexing into large literal arrays with the indexed element.
///
/// ```text
/// var a = ['x', 'y', ...]; f(a[1]);  =>  f('y');
/// ```
pub struct ResolveMemberExpressionReferencesToArrayIndex;

impl ResolveMemberExpressionReferencesToArrayIndex {
    /// Returns the element index a member expression reads, if it is a literal integer.
    fn index(ast: &Ast, member: NodeId) -> Option<usize> {
        let NodeKind::MemberExpression {
            property,
            computed: true,
            ..
        } = *ast.kind(member)
        else {
            return None;
        };
        match ast.kind(property).literal() {
            Some(LitValue::Number(n)) if n.fract() == 0.0 && *n >= 0.0 => Some(*n as usize),
            _ => None,
        }
    }
}

impl Rule for ResolveMemberExpressionReferencesToArrayIndex {
    fn name(&self) -> &'static str {
        "resolveMemberExpressionReferencesToArrayIndex"
    }

    fn description(&self) -> &'static str {
        "Replaces literal indexing into large literal arrays with the element"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Safe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        let mut marked = 0;
        for declarator in session.candidates(NodeType::VariableDeclarator, filter) {
            let ast = &session.ast;
            let Some((id, Some(init))) = plain_declarator(ast, declarator) else {
                continue;
            };
            let NodeKind::ArrayExpression { elements } = ast.kind(init) else {
                continue;
            };
            let Some(elements) = elements
                .iter()
                .map(|e| e.filter(|e| is_literal_like(ast, *e)))
                .collect::<Option<Vec<NodeId>>>()
            else {
                continue;
            };
            if elements.len() < MIN_ARRAY_LENGTH || !is_read_only(ast, id, false) {
                continue;
            }

            let sites: Vec<(NodeId, NodeId)> = later_reads(ast, id)
                .into_iter()
                .filter(|&r| ast.parent_key(r) == "object")
                .filter_map(|r| ast.parent(r))
                .filter(|&m| !is_member_write(ast, m))
                .filter_map(|m| Some((m, *elements.get(Self::index(ast, m)?)?)))
                .collect();
            for (member, element) in sites {
                let replacement = duplicate(&mut session.ast, element);
                if session.arborist.mark_replace(&session.ast, member, replacement) {
                    note(session, EventKind::MemberResolved, self.name(), member);
                    marked += 1;
                }
            }
        }
        Ok(marked)
    }
}

/// Replaces reads of an object property that is assigned a literal exactly once, in a
/// statement of the same list as the object's declaration.
///
/// ```text
/// var o = {}; o.p = 1; f(o.p);  =>  var o = {}; o.p = 1; f(1);
/// ```
pub struct ResolveMemberExpressionsWithDirectAssignment;

impl ResolveMemberExpressionsWithDirectAssignment {
    /// Returns the object binding, property name and value of `o.p = <literal>;`.
    fn assignment(ast: &Ast, stmt: NodeId) -> Option<(NodeId, NodeId, String, NodeId)> {
        let NodeKind::ExpressionStatement { expression } = *ast.kind(stmt) else {
            return None;
        };
        let NodeKind::AssignmentExpression {
            operator: "=",
            left,
            right,
        } = *ast.kind(expression)
        else {
            return None;
        };
        let NodeKind::MemberExpression { object, .. } = *ast.kind(left) else {
            return None;
        };
        let decl = ast.decl(object)?;
        let property = member_property_name(ast, left)?;
        let object_literal = declarator_init(ast, decl)
            .is_some_and(|init| matches!(ast.kind(init), NodeKind::ObjectExpression { .. }));
        (object_literal && is_literal_like(ast, right)).then_some((object, decl, property, right))
    }
}

impl Rule for ResolveMemberExpressionsWithDirectAssignment {
    fn name(&self) -> &'static str {
        "resolveMemberExpressionsWithDirectAssignment"
    }

    fn description(&self) -> &'static str {
        "Inlines object properties assigned a literal exactly once"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Safe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        let mut marked = 0;
        for stmt in session.candidates(NodeType::ExpressionStatement, filter) {
            let ast = &session.ast;
            if !in_statement_list(ast, stmt) {
                continue;
            }
            let Some((target, decl, property, value)) = Self::assignment(ast, stmt) else {
                continue;
            };
            let Some(declarator) = declaration_of(ast, decl) else {
                continue;
            };
            // The write must run whenever the declaration does.
            let same_list = ast.parent(declarator).is_some_and(|declaration| {
                in_statement_list(ast, declaration)
                    && ast.parent(declaration) == ast.parent(stmt)
            });
            if !same_list {
                continue;
            }
            let scope = enclosing_function(ast, stmt);

            let mut reads = Vec::new();
            let mut safe = true;
            for &r in ast.references(decl) {
                if r == target {
                    continue;
                }
                let member = ast.parent(r).filter(|_| ast.parent_key(r) == "object");
                let name = member.and_then(|m| member_property_name(ast, m));
                if is_write(ast, r) || is_call_argument(ast, r) || name.is_none() {
                    safe = false;
                    break;
                }
                if name.as_deref() != Some(property.as_str()) {
                    continue;
                }
                let Some(member) = member else {
                    safe = false;
                    break;
                };
                let ordered = r > stmt
                    && !ast.is_ancestor(stmt, r)
                    && enclosing_function(ast, r) == scope
                    && ast.parent_key(member) != "callee";
                if is_mutated_through(ast, r) || !ordered || r < declarator {
                    safe = false;
                    break;
                }
                reads.push(member);
            }
            if !safe || reads.is_empty() {
                continue;
            }

            for member in reads {
                let replacement = duplicate(&mut session.ast, value);
                if session.arborist.mark_replace(&session.ast, member, replacement) {
                    note(session, EventKind::MemberResolved, self.name(), member);
                    marked += 1;
                }
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
    fn test_fixed_assigned_value() -> crate::Result<()> {
        assert_eq!(
            apply(&ReplaceIdentifierWithFixedAssignedValue, "var a = 3; f(a, a);")?,
            "var a = 3;\nf(3, 3);"
        );
        let reassigned = "var a = 3; a = 4; f(a);";
        assert_eq!(
            apply(&ReplaceIdentifierWithFixedAssignedValue, reassigned)?,
            reassigned
        );
        Ok(())
    }

    #[test]
    fn test_fixed_value_assigned_later() -> crate::Result<()> {
        assert_eq!(
            apply(
                &ReplaceIdentifierWithFixedValueNotAssignedAtDeclaration,
                "var a; a = 'x'; f(a);"
            )?,
            "var a;\na = 'x';\nf('x');"
        );
        let conditional = "var a; if (c) a = 1; f(a);";
        assert_eq!(
            apply(
                &ReplaceIdentifierWithFixedValueNotAssignedAtDeclaration,
                conditional
            )?,
            conditional
        );
        Ok(())
    }

    #[test]
    fn test_proxy_variables() -> crate::Result<()> {
        assert_eq!(
            apply(&ResolveProxyVariables, "const a = b; f(a);")?,
            "f(b);"
        );
        assert_eq!(
            apply(&ResolveProxyVariables, "var x = 1, a = x; f(a);")?,
            "var x = 1;\nf(x);"
        );
        Ok(())
    }

    #[test]
    fn test_proxy_variable_with_written_target() -> crate::Result<()> {
        let src = "var a = b; b = 2; f(a);";
        assert_eq!(apply(&ResolveProxyVariables, src)?, src);
        Ok(())
    }

    #[test]
    fn test_proxy_references() -> crate::Result<()> {
        assert_eq!(
            apply(&ResolveProxyReferences, "var log = console.log; log('x');")?,
            "var log = console.log;\nconsole.log('x');"
        );
        Ok(())
    }

    #[test]
    fn test_proxy_calls() -> crate::Result<()> {
        let out = apply(
            &ResolveProxyCalls,
            "function p(a, b) { return f(a, b); } p(1, 2); p(1, 2, 3);",
        )?;
        assert!(out.contains("\nf(1, 2);"), "{out}");
        assert!(out.contains("\np(1, 2, 3);"), "{out}");
        Ok(())
    }

    #[test]
    fn test_proxy_calls_reordered_arguments() -> crate::Result<()> {
        let src = "function p(a, b) { return f(b, a); } p(1, 2);";
        assert_eq!(apply(&ResolveProxyCalls, src)?, src);
        Ok(())
    }

    #[test]
    fn test_array_index() -> crate::Result<()> {
        let elements: Vec<String> = (0..25).map(|i| format!("'s{i}'")).collect();
        let src = format!("var a = [{}]; f(a[3], a[30]);", elements.join(", "));
        let out = apply(&ResolveMemberExpressionReferencesToArrayIndex, &src)?;
        assert!(out.ends_with("f('s3', a[30]);"), "{out}");
        Ok(())
    }

    #[test]
    fn test_small_array_untouched() -> crate::Result<()> {
        let src = "var a = [1, 2]; f(a[0]);";
        assert_eq!(
            apply(&ResolveMemberExpressionReferencesToArrayIndex, src)?,
            src
        );
        Ok(())
    }

    #[test]
    fn test_direct_member_assignment() -> crate::Result<()> {
        assert_eq!(
            apply(
                &ResolveMemberExpressionsWithDirectAssignment,
                "var o = {}; o.p = 1; f(o.p);"
            )?,
            "var o = {};\no.p = 1;\nf(1);"
        );
        let escaped = "var o = {}; o.p = 1; g(o); f(o.p);";
        assert_eq!(
            apply(&ResolveMemberExpressionsWithDirectAssignment, escaped)?,
            escaped
        );
        Ok(())
    }

    #[test]
    fn test_guarded_member_assignment_untouched() -> crate::Result<()> {
        for src in [
            "var o = {}; if (c) { o.p = 1; } f(o.p);",
            "var o = {}; while (c()) { o.p = 1; } f(o.p);",
            "var o = {}; try { o.p = 1; } catch (e) {} f(o.p);",
        ] {
            assert_eq!(apply(&ResolveMemberExpressionsWithDirectAssignment, src)?, src);
        }
        Ok(())
    }
}
