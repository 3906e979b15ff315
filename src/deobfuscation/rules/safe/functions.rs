//! Rules that see through trivial functions: shells that return a value, wrappers that
//! forward their arguments, and immediately invoked function expressions.

use crate::{
    arborist::ListSplicer,
    ast::{Ast, NodeId, NodeKind, NodeType, ScopeKind},
    deobfuscation::{
        changes::EventKind,
        rule::{CandidateFilter, Rule, RuleCategory},
        rules::{
            helpers::{
                contains_return, declared_names, duplicate, function_body, function_of,
                in_statement_list, is_declaring, is_global_reference, is_literal_like,
                is_plain_function, is_pure, is_write, member_property_name, resolve_name,
                simple_params, single_return, uses_function_context,
            },
            note,
        },
        session::Session,
    },
    Result,
};

/// Returns the function a callee identifier is bound to, provided the binding is never
/// reassigned or redeclared.
fn bound_function(ast: &Ast, callee: NodeId) -> Option<NodeId> {
    if !matches!(ast.kind(callee), NodeKind::Identifier { .. }) {
        return None;
    }
    let decl = ast.decl(callee)?;
    let stable = ast
        .references(decl)
        .iter()
        .all(|&r| !is_write(ast, r) && !is_declaring(ast, r));
    if !stable {
        return None;
    }
    function_of(ast, decl)
}

/// Returns `true` if the identifier `value` returned from `func` names the same binding
/// when written at `site`.
fn resolves_alike(ast: &Ast, func: NodeId, value: NodeId, site: NodeId) -> bool {
    let Some(name) = ast.kind(value).ident_name() else {
        return false;
    };
    if name == "arguments" {
        return false;
    }
    let target = ast.decl(value);
    if target.is_some_and(|t| ast.is_ancestor(func, t)) {
        return false;
    }
    if target.is_none() && !is_global_reference(ast, value) {
        return false;
    }
    resolve_name(ast, site, name) == target
}

/// Returns the arguments of a call if the node is one and all of them are pure.
fn pure_arguments(ast: &Ast, call: NodeId) -> Option<(NodeId, Vec<NodeId>)> {
    match ast.kind(call) {
        NodeKind::CallExpression {
            callee, arguments, ..
        } if arguments.iter().all(|a| is_pure(ast, *a)) => Some((*callee, arguments.clone())),
        _ => None,
    }
}

/// Replaces calls to functions that only return an outer identifier with that
/// identifier.
///
/// ```text
/// function a() { return btoa; }
/// a()('yo');  =>  btoa('yo');
/// ```
pub struct ReplaceCallExpressionsWithUnwrappedIdentifier;

impl Rule for ReplaceCallExpressionsWithUnwrappedIdentifier {
    fn name(&self) -> &'static str {
        "replaceCallExpressionsWithUnwrappedIdentifier"
    }

    fn description(&self) -> &'static str {
        "Replaces calls to functions returning an outer identifier with the identifier"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Safe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        let mut marked = 0;
        for call in session.candidates(NodeType::CallExpression, filter) {
            let ast = &session.ast;
            let Some((callee, _)) = pure_arguments(ast, call) else {
                continue;
            };
            let Some(func) = bound_function(ast, callee) else {
                continue;
            };
            let Some(value) = single_return(ast, func) else {
                continue;
            };
            if !resolves_alike(ast, func, value, call) {
                continue;
            }
            let Some(name) = ast.kind(value).ident_name().map(str::to_owned) else {
                continue;
            };

            let replacement = session.ast.ident(&name);
            if session.arborist.mark_replace(&session.ast, call, replacement) {
                note(session, EventKind::FunctionUnwrapped, self.name(), call);
                marked += 1;
            }
        }
        Ok(marked)
    }
}

/// Replaces calls to function declarations that return a literal or an outer identifier
/// with the returned value.
///
/// ```text
/// function k() { return 'key'; }
/// x = k();  =>  x = 'key';
/// ```
pub struct ReplaceFunctionShellsWithWrappedValue;

impl Rule for ReplaceFunctionShellsWithWrappedValue {
    fn name(&self) -> &'static str {
        "replaceFunctionShellsWithWrappedValue"
    }

    fn description(&self) -> &'static str {
        "Replaces calls to functions returning a fixed value with that value"
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
            let Some(value) = single_return(ast, func) else {
                continue;
            };
            let literal = is_literal_like(ast, value);
            if !literal && ast.kind(value).ident_name().is_none() {
                continue;
            }
            let refs = ast.references(name);
            if refs.iter().any(|&r| is_write(ast, r) || is_declaring(ast, r)) {
                continue;
            }
            let sites: Vec<NodeId> = refs
                .iter()
                .filter(|&&r| ast.parent_key(r) == "callee")
                .filter_map(|&r| ast.parent(r))
                .filter(|&call| pure_arguments(ast, call).is_some())
                .filter(|&call| literal || resolves_alike(ast, func, value, call))
                .collect();

            for call in sites {
                let replacement = duplicate(&mut session.ast, value);
                if session.arborist.mark_replace(&session.ast, call, replacement) {
                    note(session, EventKind::FunctionUnwrapped, self.name(), call);
                    marked += 1;
                }
            }
        }
        Ok(marked)
    }
}

/// Replaces argument-less IIFEs that return a literal with the literal.
///
/// ```text
/// x = (function () { return 3; })();  =>  x = 3;
/// ```
pub struct ReplaceFunctionShellsWithWrappedValueIIFE;

impl Rule for ReplaceFunctionShellsWithWrappedValueIIFE {
    fn name(&self) -> &'static str {
        "replaceFunctionShellsWithWrappedValueIIFE"
    }

    fn description(&self) -> &'static str {
        "Replaces IIFEs returning a literal with the literal"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Safe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        let mut marked = 0;
        for call in session.candidates(NodeType::CallExpression, filter) {
            let ast = &session.ast;
            let NodeKind::CallExpression {
                callee, arguments, ..
            } = ast.kind(call)
            else {
                continue;
            };
            if !arguments.is_empty() || !ast.kind(*callee).is_function() {
                continue;
            }
            let Some(value) = single_return(ast, *callee) else {
                continue;
            };
            if !is_literal_like(ast, value) {
                continue;
            }

            let replacement = duplicate(&mut session.ast, value);
            if session.arborist.mark_replace(&session.ast, call, replacement) {
                note(session, EventKind::FunctionUnwrapped, self.name(), call);
                marked += 1;
            }
        }
        Ok(marked)
    }
}

/// Collapses functions whose body only forwards to an inner function via
/// `.apply(this, arguments)`.
///
/// ```text
/// function f() { return function (a) { return a + 1; }.apply(this, arguments); }
///   =>  function f(a) { return a + 1; }
/// ```
pub struct UnwrapFunctionShells;

impl UnwrapFunctionShells {
    /// Returns the inner function if `value` is `function () {...}.apply(this, arguments)`.
    fn forwarded(ast: &Ast, value: NodeId) -> Option<NodeId> {
        let NodeKind::CallExpression {
            callee, arguments, ..
        } = ast.kind(value)
        else {
            return None;
        };
        let [this, args] = arguments.as_slice() else {
            return None;
        };
        let forwards = matches!(ast.kind(*this), NodeKind::ThisExpression)
            && ast.kind(*args).ident_name() == Some("arguments")
            && ast.decl(*args).is_none();
        if !forwards || member_property_name(ast, *callee).as_deref() != Some("apply") {
            return None;
        }
        let NodeKind::MemberExpression { object, .. } = *ast.kind(*callee) else {
            return None;
        };
        match ast.kind(object) {
            NodeKind::FunctionExpression { id: None, .. } if is_plain_function(ast, object) => {
                Some(object)
            }
            _ => None,
        }
    }
}

impl Rule for UnwrapFunctionShells {
    fn name(&self) -> &'static str {
        "unwrapFunctionShells"
    }

    fn description(&self) -> &'static str {
        "Merges functions that only forward their arguments to an inner function"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Safe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        let mut marked = 0;
        let mut candidates = session.candidates(NodeType::FunctionDeclaration, filter);
        candidates.extend(session.candidates(NodeType::FunctionExpression, filter));
        for outer in candidates {
            let ast = &session.ast;
            let Some(inner) = single_return(ast, outer).and_then(|v| Self::forwarded(ast, v))
            else {
                continue;
            };
            let (Some(outer_params), Some(inner_params), Some(body)) = (
                simple_params(ast, outer),
                simple_params(ast, inner),
                function_body(ast, inner),
            ) else {
                continue;
            };
            let params = match (outer_params.is_empty(), inner_params.is_empty()) {
                (true, _) => inner_params,
                (false, true) => outer_params,
                (false, false) => continue,
            };

            let merged = match *ast.kind(outer) {
                NodeKind::FunctionDeclaration { id, .. } => NodeKind::FunctionDeclaration {
                    id,
                    params,
                    body,
                    is_async: false,
                    is_generator: false,
                },
                NodeKind::FunctionExpression { id, .. } => NodeKind::FunctionExpression {
                    id,
                    params,
                    body,
                    is_async: false,
                    is_generator: false,
                },
                _ => continue,
            };
            let replacement = session.ast.add(merged);
            if session.arborist.mark_replace(&session.ast, outer, replacement) {
                note(session, EventKind::FunctionUnwrapped, self.name(), outer);
                marked += 1;
            }
        }
        Ok(marked)
    }
}

/// Unwraps immediately invoked function expressions.
///
/// An IIFE used as a value whose body only returns a function or a global is replaced
/// by what it returns. An IIFE run as a statement has its body spliced into the
/// enclosing statement list when nothing it declares can clash with outer names.
///
/// ```text
/// var f = (function () { return function (a) { return a; }; })();
///   =>  var f = function (a) { return a; };
/// (function () { var x = 1; use(x); })();  =>  var x = 1; use(x);
/// ```
pub struct UnwrapIIFEs;

impl UnwrapIIFEs {
    /// Returns the function of an argument-less IIFE without parameters or name.
    fn iife(ast: &Ast, call: NodeId) -> Option<NodeId> {
        let NodeKind::CallExpression {
            callee, arguments, ..
        } = ast.kind(call)
        else {
            return None;
        };
        if !arguments.is_empty() || !is_plain_function(ast, *callee) {
            return None;
        }
        match ast.kind(*callee) {
            NodeKind::FunctionExpression {
                id: None, params, ..
            }
            | NodeKind::ArrowFunctionExpression { params, .. }
                if params.is_empty() =>
            {
                Some(*callee)
            }
            _ => None,
        }
    }

    /// Returns the value an IIFE can be replaced with.
    fn unwrapped_value(ast: &Ast, func: NodeId, call: NodeId) -> Option<NodeId> {
        let value = single_return(ast, func)?;
        let usable = match ast.kind(value) {
            NodeKind::FunctionExpression { .. } => true,
            NodeKind::ArrowFunctionExpression { .. } => {
                matches!(ast.kind(func), NodeKind::ArrowFunctionExpression { .. })
            }
            NodeKind::Identifier { name } => {
                is_global_reference(ast, value) && resolve_name(ast, call, name).is_none()
            }
            _ => false,
        };
        usable.then_some(value)
    }

    /// Returns the statement-level IIFE call wrapped by `stmt`, including the
    /// `!function () {}()` and `void function () {}()` forms.
    fn statement_call(ast: &Ast, stmt: NodeId) -> Option<NodeId> {
        let NodeKind::ExpressionStatement { expression } = *ast.kind(stmt) else {
            return None;
        };
        match ast.kind(expression) {
            NodeKind::CallExpression { .. } => Some(expression),
            NodeKind::UnaryExpression {
                operator: "!" | "void",
                argument,
            } if matches!(ast.kind(*argument), NodeKind::CallExpression { .. }) => {
                Some(*argument)
            }
            _ => None,
        }
    }

    /// Returns `true` if splicing a binding `name` in place of `stmt` would shadow a
    /// visible binding or capture a reference that resolves past the hoisting scope.
    fn collides(ast: &Ast, func: NodeId, stmt: NodeId, name: &str) -> bool {
        if resolve_name(ast, stmt, name).is_some() {
            return true;
        }
        let mut scope = ast.scope_of(stmt);
        while let Some(s) = scope {
            if matches!(s.kind, ScopeKind::Function | ScopeKind::Global) {
                return s.through.iter().any(|&r| {
                    ast.kind(r).ident_name() == Some(name) && !ast.is_ancestor(func, r)
                });
            }
            scope = s.parent.and_then(|p| ast.scope(p));
        }
        false
    }

    /// Returns the body statements of the IIFE called by `stmt` if they can run inline.
    fn inline_body(ast: &Ast, func: NodeId, stmt: NodeId) -> Option<Vec<NodeId>> {
        let body = function_body(ast, func)?;
        let NodeKind::BlockStatement { body: statements } = ast.kind(body) else {
            return None;
        };
        if statements.iter().any(|s| contains_return(ast, *s)) {
            return None;
        }
        if !matches!(ast.kind(func), NodeKind::ArrowFunctionExpression { .. })
            && uses_function_context(ast, func)
        {
            return None;
        }
        let clashes = declared_names(ast, func)
            .iter()
            .any(|name| Self::collides(ast, func, stmt, name));
        (!clashes).then(|| statements.clone())
    }
}

impl Rule for UnwrapIIFEs {
    fn name(&self) -> &'static str {
        "unwrapIIFEs"
    }

    fn description(&self) -> &'static str {
        "Replaces immediately invoked functions with their result or their body"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Safe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        let mut marked = 0;
        for call in session.candidates(NodeType::CallExpression, filter) {
            let ast = &session.ast;
            if ast.parent_key(call) == "expression" {
                continue;
            }
            let Some(value) =
                Self::iife(ast, call).and_then(|func| Self::unwrapped_value(ast, func, call))
            else {
                continue;
            };
            if session.arborist.mark_replace(&session.ast, call, value) {
                note(session, EventKind::FunctionUnwrapped, self.name(), call);
                marked += 1;
            }
        }

        let mut splicer = ListSplicer::new();
        for stmt in session.candidates(NodeType::ExpressionStatement, filter) {
            let ast = &session.ast;
            if !in_statement_list(ast, stmt) {
                continue;
            }
            let Some(statements) = Self::statement_call(ast, stmt)
                .and_then(|call| Self::iife(ast, call))
                .and_then(|func| Self::inline_body(ast, func, stmt))
            else {
                continue;
            };
            if splicer.replace(ast, stmt, statements) {
                note(session, EventKind::FunctionUnwrapped, self.name(), stmt);
            }
        }
        Ok(marked + splicer.commit(&mut session.ast, &mut session.arborist))
    }
}

/// Replaces calls to functions that wrap a single operator with the operation.
///
/// ```text
/// function add(a, b) { return a + b; }
/// x = add(1, 2);  =>  x = 1 + 2;
/// ```
pub struct UnwrapSimpleOperations;

impl UnwrapSimpleOperations {
    /// Builds the operation of `func` applied to `arguments`.
    fn inline(ast: &mut Ast, func: NodeId, arguments: &[NodeId]) -> Option<NodeId> {
        let params = simple_params(ast, func)?;
        let value = single_return(ast, func)?;
        let is_param = |ast: &Ast, id: NodeId, index: usize| {
            params.get(index).is_some_and(|p| ast.decl(id) == Some(*p))
        };
        let plain_args = arguments
            .iter()
            .all(|a| !matches!(ast.kind(*a), NodeKind::SpreadElement { .. }));
        if !plain_args || arguments.len() != params.len() {
            return None;
        }

        match ast.kind(value).clone() {
            NodeKind::BinaryExpression {
                operator,
                left,
                right,
            } if params.len() == 2 && is_param(ast, left, 0) && is_param(ast, right, 1) => {
                Some(ast.binary(operator, arguments[0], arguments[1]))
            }
            NodeKind::LogicalExpression {
                operator,
                left,
                right,
            } if params.len() == 2 && is_param(ast, left, 0) && is_param(ast, right, 1) => {
                Some(ast.add(NodeKind::LogicalExpression {
                    operator,
                    left: arguments[0],
                    right: arguments[1],
                }))
            }
            NodeKind::UnaryExpression { operator, argument }
                if operator != "delete" && params.len() == 1 && is_param(ast, argument, 0) =>
            {
                Some(ast.unary(operator, arguments[0]))
            }
            _ => None,
        }
    }
}

impl Rule for UnwrapSimpleOperations {
    fn name(&self) -> &'static str {
        "unwrapSimpleOperations"
    }

    fn description(&self) -> &'static str {
        "Inlines calls to functions wrapping a single operator"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Safe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        let mut marked = 0;
        for call in session.candidates(NodeType::CallExpression, filter) {
            let ast = &session.ast;
            let NodeKind::CallExpression {
                callee, arguments, ..
            } = ast.kind(call)
            else {
                continue;
            };
            let Some(func) = bound_function(ast, *callee) else {
                continue;
            };
            let arguments = arguments.clone();
            let Some(operation) = Self::inline(&mut session.ast, func, &arguments) else {
                continue;
            };
            if session.arborist.mark_replace(&session.ast, call, operation) {
                note(session, EventKind::FunctionUnwrapped, self.name(), call);
                marked += 1;
            }
        }
        Ok(marked)
    }
}

/// Turns `f.call(this, ...)` and `f.apply(this, [...])` into direct calls.
///
/// ```text
/// f.call(this, 1, 2);      =>  f(1, 2);
/// f.apply(this, [1, 2]);   =>  f(1, 2);
/// ```
pub struct SimplifyCalls;

impl SimplifyCalls {
    /// Returns the callee and the direct arguments of a simplifiable call.
    fn direct(ast: &Ast, call: NodeId) -> Option<(NodeId, Vec<NodeId>)> {
        let NodeKind::CallExpression {
            callee, arguments, ..
        } = ast.kind(call)
        else {
            return None;
        };
        let NodeKind::MemberExpression { object, .. } = *ast.kind(*callee) else {
            return None;
        };
        let target_ok = match ast.kind(object) {
            NodeKind::Identifier { name } => name != "Function",
            NodeKind::FunctionExpression { .. } => true,
            _ => false,
        };
        let (this, rest) = arguments.split_first()?;
        if !target_ok || !matches!(ast.kind(*this), NodeKind::ThisExpression) {
            return None;
        }
        match member_property_name(ast, *callee)?.as_str() {
            "call" => Some((object, rest.to_vec())),
            "apply" => match rest {
                [] => Some((object, Vec::new())),
                [array] => match ast.kind(*array) {
                    NodeKind::ArrayExpression { elements } => elements
                        .iter()
                        .map(|e| {
                            e.filter(|e| !matches!(ast.kind(*e), NodeKind::SpreadElement { .. }))
                        })
                        .collect::<Option<Vec<_>>>()
                        .map(|args| (object, args)),
                    _ => None,
                },
                _ => None,
            },
            _ => None,
        }
    }
}

impl Rule for SimplifyCalls {
    fn name(&self) -> &'static str {
        "simplifyCalls"
    }

    fn description(&self) -> &'static str {
        "Replaces .call(this, ...) and .apply(this, [...]) with direct calls"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Safe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        let mut marked = 0;
        for call in session.candidates(NodeType::CallExpression, filter) {
            let Some((callee, arguments)) = Self::direct(&session.ast, call) else {
                continue;
            };
            let replacement = session.ast.call(callee, arguments);
            if session.arborist.mark_replace(&session.ast, call, replacement) {
                note(session, EventKind::CallResolved, self.name(), call);
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
    fn test_unwrapped_identifier() -> crate::Result<()> {
        assert_eq!(
            apply(
                &ReplaceCallExpressionsWithUnwrappedIdentifier,
                "function a() { return btoa; } a()('yo');"
            )?,
            "function a() {\n  return btoa;\n}\nbtoa('yo');"
        );
        Ok(())
    }

    #[test]
    fn test_unwrapped_identifier_shadowed() -> crate::Result<()> {
        let src = "function a() { return b; } function g(b) { return a(); }";
        let out = apply(&ReplaceCallExpressionsWithUnwrappedIdentifier, src)?;
        assert!(out.contains("return a();"), "{out}");
        Ok(())
    }

    #[test]
    fn test_function_shell_literal() -> crate::Result<()> {
        assert_eq!(
            apply(
                &ReplaceFunctionShellsWithWrappedValue,
                "function k() { return 'key'; } x = k();"
            )?,
            "function k() {\n  return 'key';\n}\nx = 'key';"
        );
        Ok(())
    }

    #[test]
    fn test_function_shell_reassigned() -> crate::Result<()> {
        let out = apply(
            &ReplaceFunctionShellsWithWrappedValue,
            "function k() { return 1; } k = g; x = k();",
        )?;
        assert!(out.ends_with("x = k();"), "{out}");
        Ok(())
    }

    #[test]
    fn test_iife_literal() -> crate::Result<()> {
        assert_eq!(
            apply(
                &ReplaceFunctionShellsWithWrappedValueIIFE,
                "x = (function () { return 3; })();"
            )?,
            "x = 3;"
        );
        assert_eq!(
            apply(&ReplaceFunctionShellsWithWrappedValueIIFE, "x = (() => 'a')();")?,
            "x = 'a';"
        );
        Ok(())
    }

    #[test]
    fn test_unwrap_function_shells() -> crate::Result<()> {
        assert_eq!(
            apply(
                &UnwrapFunctionShells,
                "function f() { return function (a) { return a + 1; }.apply(this, arguments); }"
            )?,
            "function f(a) {\n  return a + 1;\n}"
        );
        Ok(())
    }

    #[test]
    fn test_unwrap_iife_value() -> crate::Result<()> {
        assert_eq!(
            apply(
                &UnwrapIIFEs,
                "var f = (function () { return function (a) { return a; }; })();"
            )?,
            "var f = function (a) {\n  return a;\n};"
        );
        Ok(())
    }

    #[test]
    fn test_unwrap_iife_statement() -> crate::Result<()> {
        assert_eq!(
            apply(&UnwrapIIFEs, "(function () { var x = 1; use(x); })();")?,
            "var x = 1;\nuse(x);"
        );
        assert_eq!(
            apply(&UnwrapIIFEs, "!function () { go(); }();")?,
            "go();"
        );
        Ok(())
    }

    #[test]
    fn test_iife_statement_name_collisions() -> crate::Result<()> {
        for src in [
            "var x = 0; (function () { var x = 1; use(x); })(); use(x);",
            "(function () { var x = 1; use(x); })(); use(x);",
            "function g() { return x; } (function () { var x = 1; use(x); })();",
        ] {
            assert_eq!(apply(&UnwrapIIFEs, src)?, src);
        }
        assert_eq!(
            apply(&UnwrapIIFEs, "(function () { var x = 1; use(x); })(); o.x();")?,
            "var x = 1;\nuse(x);\no.x();"
        );
        Ok(())
    }

    #[test]
    fn test_unwrap_iife_name_clash() -> crate::Result<()> {
        let src = "var x = 0;\n(function () { var x = 1; use(x); })();";
        let out = apply(&UnwrapIIFEs, src)?;
        assert!(out.contains("function ()"), "{out}");
        Ok(())
    }

    #[test]
    fn test_unwrap_iife_with_return_kept() -> crate::Result<()> {
        let out = apply(&UnwrapIIFEs, "(function () { if (a) return; b(); })();")?;
        assert!(out.contains("function ()"), "{out}");
        Ok(())
    }

    #[test]
    fn test_simple_operations() -> crate::Result<()> {
        let out = apply(
            &UnwrapSimpleOperations,
            "function add(a, b) { return a + b; } x = add(1, 2); y = neg(3); function neg(n) { return -n; }",
        )?;
        assert!(out.contains("x = 1 + 2;"), "{out}");
        assert!(out.contains("y = -3;"), "{out}");
        Ok(())
    }

    #[test]
    fn test_simple_operations_swapped_params() -> crate::Result<()> {
        let out = apply(
            &UnwrapSimpleOperations,
            "function sub(a, b) { return b - a; } x = sub(1, 2);",
        )?;
        assert!(out.ends_with("x = sub(1, 2);"), "{out}");
        Ok(())
    }

    #[test]
    fn test_simplify_calls() -> crate::Result<()> {
        assert_eq!(apply(&SimplifyCalls, "f.call(this, 1, 2);")?, "f(1, 2);");
        assert_eq!(apply(&SimplifyCalls, "f.apply(this, [1, 2]);")?, "f(1, 2);");
        let other_this = "f.call(o, 1);";
        assert_eq!(apply(&SimplifyCalls, other_this)?, other_this);
        Ok(())
    }
}
