//! Rules that evaluate code together with the declarations it depends on.

use crate::{
    ast::{Ast, LitValue, NodeId, NodeKind, NodeType},
    deobfuscation::{
        changes::EventKind,
        rule::{CandidateFilter, Rule, RuleCategory},
        rules::{
            helpers::{
                binding, function_of, is_global_reference, is_literal_argument, is_literal_like,
                is_member_write, is_write, member_property_name,
            },
            unsafe_rules::{defined_primitive, expression_source, replace_with_evaluation},
        },
        session::Session,
    },
    oracle::EvalValue,
    Result,
};

/// Returns the context of `origin` followed by the origin itself, or `None` if the
/// origin depends on declarations but no context could be collected.
fn with_context(session: &mut Session, origin: NodeId, needs_context: bool) -> Option<String> {
    let context = session.context(origin, true);
    if needs_context && context.is_empty() {
        return None;
    }
    let mut source = context.source(&session.ast);
    source.push_str(&expression_source(&session.ast, origin));
    Some(source)
}

/// Returns the root identifier of a member chain.
fn member_root(ast: &Ast, mut id: NodeId) -> Option<NodeId> {
    loop {
        match ast.kind(id) {
            NodeKind::MemberExpression { object, .. } => id = *object,
            NodeKind::Identifier { .. } => return Some(id),
            _ => return None,
        }
    }
}

/// Returns the identifiers inside `node` that refer to the binding `decl`.
fn refers_to(ast: &Ast, node: NodeId, decl: NodeId) -> bool {
    ast.descendants(node)
        .into_iter()
        .any(|d| d != decl && ast.decl(d) == Some(decl))
}

/// Decodes calls to a string decoder that reads a function-wrapped array rotated by an
/// augmenting IIFE.
///
/// ```text
/// function _a() { var x = ['b', 'a']; _a = function () { return x; }; return _a(); }
/// function _d(i) { var x = _a(); return x[i]; }
/// (function (f, n) { var a = f(); while (--n) a.push(a.shift()); })(_a, 3);
/// use(_d(0));  =>  use('a');
/// ```
pub struct ResolveAugmentedFunctionWrappedArrayReplacements;

impl ResolveAugmentedFunctionWrappedArrayReplacements {
    /// Returns `true` if a function holds a literal string array.
    fn holds_string_array(ast: &Ast, func: NodeId) -> bool {
        ast.descendants(func).into_iter().any(|d| match ast.kind(d) {
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
        })
    }

    /// Returns the statement of an IIFE that receives the binding `name` as an argument.
    fn augmenting_call(ast: &Ast, name: NodeId) -> Option<NodeId> {
        ast.references(name).iter().find_map(|&r| {
            if ast.parent_key(r) != "arguments" {
                return None;
            }
            let call = ast.parent(r)?;
            let NodeKind::CallExpression { callee, .. } = ast.kind(call) else {
                return None;
            };
            if !ast.kind(*callee).is_function() {
                return None;
            }
            let stmt = std::iter::once(call)
                .chain(ast.ancestors(call))
                .find(|&a| matches!(ast.kind(a), NodeKind::ExpressionStatement { .. }))?;
            matches!(ast.parent_kind(stmt), Some(NodeKind::Program { .. })).then_some(stmt)
        })
    }
}

impl Rule for ResolveAugmentedFunctionWrappedArrayReplacements {
    fn name(&self) -> &'static str {
        "resolveAugmentedFunctionWrappedArrayReplacements"
    }

    fn description(&self) -> &'static str {
        "Decodes strings read from a rotated, function-wrapped array"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Unsafe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        if !session.has_oracle() {
            return Ok(0);
        }
        let mut marked = 0;
        let functions = session.ast.nodes_of(NodeType::FunctionDeclaration).to_vec();
        for &array_fn in &functions {
            let ast = &session.ast;
            let NodeKind::FunctionDeclaration {
                id: Some(array_name),
                ..
            } = *ast.kind(array_fn)
            else {
                continue;
            };
            if !Self::holds_string_array(ast, array_fn) {
                continue;
            }
            let Some(augment) = Self::augmenting_call(ast, array_name) else {
                continue;
            };

            for &decoder in &functions {
                let ast = &session.ast;
                let NodeKind::FunctionDeclaration {
                    id: Some(decoder_name),
                    ..
                } = *ast.kind(decoder)
                else {
                    continue;
                };
                if decoder == array_fn
                    || ast.is_ancestor(array_fn, decoder)
                    || !refers_to(ast, decoder, array_name)
                {
                    continue;
                }
                let parts = [array_fn, decoder, augment];
                if parts.iter().any(|&p| session.arborist.is_marked_within(ast, p)) {
                    continue;
                }
                let context: String = parts
                    .iter()
                    .map(|&p| format!("{}\n", ast.text(p)))
                    .collect();

                let calls: Vec<NodeId> = ast
                    .references(decoder_name)
                    .iter()
                    .filter(|&&r| ast.parent_key(r) == "callee")
                    .filter_map(|&r| ast.parent(r))
                    .filter(|&call| filter.accepts(ast, call))
                    .filter(|&call| !parts.iter().any(|&p| ast.is_ancestor(p, call)))
                    .filter(|&call| match ast.kind(call) {
                        NodeKind::CallExpression { arguments, .. } => {
                            arguments.iter().all(|a| is_literal_argument(ast, *a))
                        }
                        _ => false,
                    })
                    .collect();
                for call in calls {
                    let source = format!("{context}{}", ast_text(&session.ast, call));
                    if replace_with_evaluation(
                        session,
                        self.name(),
                        EventKind::CallResolved,
                        call,
                        &source,
                        defined_primitive,
                    ) {
                        marked += 1;
                    }
                }
            }
        }
        Ok(marked)
    }
}

fn ast_text(ast: &Ast, id: NodeId) -> String {
    ast.text(id).into_owned()
}

/// Evaluates member reads of local bindings with the context they depend on.
///
/// ```text
/// const a = ['hello']; const b = a[0];  =>  const a = ['hello']; const b = 'hello';
/// ```
pub struct ResolveMemberExpressionsLocalReferences;

impl ResolveMemberExpressionsLocalReferences {
    fn is_candidate(ast: &Ast, member: NodeId) -> bool {
        if member_property_name(ast, member).is_none()
            || is_member_write(ast, member)
            || matches!(ast.parent_key(member), "callee" | "object")
        {
            return false;
        }
        let Some(root) = member_root(ast, member) else {
            return false;
        };
        let Some(decl) = ast.decl(root) else {
            return false;
        };
        // parameters have no value to replay
        if ast.parent_key(decl) == "params" {
            return false;
        }
        !ast
            .parent(decl)
            .is_some_and(|declarator| ast.is_ancestor(declarator, member))
    }
}

impl Rule for ResolveMemberExpressionsLocalReferences {
    fn name(&self) -> &'static str {
        "resolveMemberExpressionsLocalReferences"
    }

    fn description(&self) -> &'static str {
        "Evaluates member reads of local bindings with their collected context"
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
            if !Self::is_candidate(&session.ast, member) {
                continue;
            }
            let Some(source) = with_context(session, member, true) else {
                continue;
            };
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

/// Evaluates calls to locally defined functions with literal arguments.
///
/// ```text
/// function d(i) { return ['a', 'b'][i]; }
/// x = d(1);  =>  x = 'b';
/// ```
pub struct ResolveLocalCalls;

impl ResolveLocalCalls {
    fn is_candidate(ast: &Ast, call: NodeId) -> bool {
        let NodeKind::CallExpression {
            callee, arguments, ..
        } = ast.kind(call)
        else {
            return false;
        };
        if ast.parent_key(call) == "expression"
            || !arguments.iter().all(|a| is_literal_argument(ast, *a))
        {
            return false;
        }
        let Some(root) = member_root(ast, *callee) else {
            return false;
        };
        let Some(decl) = ast.decl(root) else {
            return false;
        };
        if ast.parent_key(decl) == "params" {
            return false;
        }
        // calls from inside the callee would replay the call site
        !function_of(ast, decl).is_some_and(|func| ast.is_ancestor(func, call))
    }
}

impl Rule for ResolveLocalCalls {
    fn name(&self) -> &'static str {
        "resolveLocalCalls"
    }

    fn description(&self) -> &'static str {
        "Evaluates calls to local functions with their collected context"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Unsafe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        if !session.has_oracle() {
            return Ok(0);
        }
        let mut marked = 0;
        for call in session.candidates(NodeType::CallExpression, filter) {
            if !Self::is_candidate(&session.ast, call) {
                continue;
            }
            let Some(source) = with_context(session, call, true) else {
                continue;
            };
            if replace_with_evaluation(
                session,
                self.name(),
                EventKind::CallResolved,
                call,
                &source,
                defined_primitive,
            ) {
                marked += 1;
            }
        }
        Ok(marked)
    }
}

/// Evaluates calls of methods injected into a builtin prototype.
///
/// ```text
/// String.prototype.rev = function () { return this.split('').reverse().join(''); };
/// x = 'ab'.rev();  =>  x = 'ba';
/// ```
pub struct ResolveInjectedPrototypeMethodCalls;

impl ResolveInjectedPrototypeMethodCalls {
    /// Returns the method name of `X.prototype.m = function () {...};`.
    fn injected_method(ast: &Ast, stmt: NodeId) -> Option<String> {
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
        let on_prototype = member_property_name(ast, object).as_deref() == Some("prototype")
            && member_root(ast, object).is_some_and(|root| is_global_reference(ast, root));
        (on_prototype && ast.kind(right).is_function())
            .then(|| member_property_name(ast, left))
            .flatten()
    }
}

impl Rule for ResolveInjectedPrototypeMethodCalls {
    fn name(&self) -> &'static str {
        "resolveInjectedPrototypeMethodCalls"
    }

    fn description(&self) -> &'static str {
        "Evaluates calls to methods assigned to builtin prototypes"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Unsafe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        if !session.has_oracle() {
            return Ok(0);
        }
        let mut marked = 0;
        let injections: Vec<(NodeId, String)> = session
            .ast
            .nodes_of(NodeType::ExpressionStatement)
            .iter()
            .filter_map(|&s| Self::injected_method(&session.ast, s).map(|m| (s, m)))
            .collect();
        for (stmt, method) in injections {
            let calls: Vec<NodeId> = session
                .candidates(NodeType::CallExpression, filter)
                .into_iter()
                .filter(|&call| {
                    let ast = &session.ast;
                    let NodeKind::CallExpression {
                        callee, arguments, ..
                    } = ast.kind(call)
                    else {
                        return false;
                    };
                    let NodeKind::MemberExpression { object, .. } = *ast.kind(*callee) else {
                        return false;
                    };
                    member_property_name(ast, *callee).as_deref() == Some(method.as_str())
                        && is_literal_like(ast, object)
                        && arguments.iter().all(|a| is_literal_argument(ast, *a))
                })
                .collect();
            for call in calls {
                let source = format!(
                    "{}\n{}",
                    session.ast.text(stmt),
                    expression_source(&session.ast, call)
                );
                if replace_with_evaluation(
                    session,
                    self.name(),
                    EventKind::CallResolved,
                    call,
                    &source,
                    defined_primitive,
                ) {
                    marked += 1;
                }
            }
        }
        Ok(marked)
    }
}

/// Evaluates the argument of `eval` when it is not a literal, leaving `eval` of the
/// resulting string for the literal eval rule.
///
/// ```text
/// eval('f' + '()');  =>  eval('f()');
/// ```
pub struct ResolveEvalCallsOnNonLiterals;

impl Rule for ResolveEvalCallsOnNonLiterals {
    fn name(&self) -> &'static str {
        "resolveEvalCallsOnNonLiterals"
    }

    fn description(&self) -> &'static str {
        "Evaluates the code string passed to eval"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Unsafe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        if !session.has_oracle() {
            return Ok(0);
        }
        let mut marked = 0;
        for call in session.candidates(NodeType::CallExpression, filter) {
            let ast = &session.ast;
            let NodeKind::CallExpression {
                callee, arguments, ..
            } = ast.kind(call)
            else {
                continue;
            };
            let [argument] = arguments.as_slice() else {
                continue;
            };
            let argument = *argument;
            if ast.kind(*callee).ident_name() != Some("eval")
                || !is_global_reference(ast, *callee)
                || ast.kind(argument).string_value().is_some()
            {
                continue;
            }
            let Some(source) = with_context(session, argument, false) else {
                continue;
            };
            if replace_with_evaluation(
                session,
                self.name(),
                EventKind::EvalUnwrapped,
                argument,
                &source,
                |value| matches!(value, EvalValue::String(_)),
            ) {
                marked += 1;
            }
        }
        Ok(marked)
    }
}

/// Replaces the call initializing a binding that is only ever indexed with the array
/// the call returns.
///
/// ```text
/// function f() { return ['a', 'b']; }
/// var a = f(); use(a[0]);  =>  var a = ['a', 'b']; use(a[0]);
/// ```
pub struct ResolveFunctionToArray;

impl ResolveFunctionToArray {
    /// Returns the initializer call of a declarator whose binding is only indexed.
    fn indexed_call(ast: &Ast, declarator: NodeId) -> Option<NodeId> {
        let NodeKind::VariableDeclarator { id, init: Some(init) } = *ast.kind(declarator) else {
            return None;
        };
        let NodeKind::CallExpression {
            callee, arguments, ..
        } = ast.kind(init)
        else {
            return None;
        };
        let bound = binding(ast, *callee).and_then(|decl| function_of(ast, decl));
        if bound.is_none() || !arguments.iter().all(|a| is_literal_argument(ast, *a)) {
            return None;
        }
        let refs = ast.references(id);
        let indexed = !refs.is_empty()
            && refs.iter().all(|&r| {
                !is_write(ast, r)
                    && ast.parent_key(r) == "object"
                    && matches!(
                        ast.parent_kind(r),
                        Some(NodeKind::MemberExpression { computed: true, .. })
                    )
                    && ast.parent(r).is_some_and(|m| !is_member_write(ast, m))
            });
        indexed.then_some(init)
    }
}

impl Rule for ResolveFunctionToArray {
    fn name(&self) -> &'static str {
        "resolveFunctionToArray"
    }

    fn description(&self) -> &'static str {
        "Replaces array-returning initializer calls of indexed bindings with the array"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Unsafe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        if !session.has_oracle() {
            return Ok(0);
        }
        let mut marked = 0;
        for declarator in session.candidates(NodeType::VariableDeclarator, filter) {
            let Some(call) = Self::indexed_call(&session.ast, declarator) else {
                continue;
            };
            let Some(source) = with_context(session, call, true) else {
                continue;
            };
            if replace_with_evaluation(
                session,
                self.name(),
                EventKind::CallResolved,
                call,
                &source,
                |value| matches!(value, EvalValue::Array(_)),
            ) {
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
        deobfuscation::rules::testing::apply_to,
        oracle::{testing::ScriptedOracle, EvalValue},
    };

    fn session(source: &str, oracle: ScriptedOracle) -> crate::Result<Session> {
        Ok(Session::new(source)?.with_oracle(Box::new(oracle)))
    }

    #[test]
    fn test_local_member_reference() -> crate::Result<()> {
        let oracle = ScriptedOracle::new().answer(
            "const a = ['hello'];\na[0]",
            EvalValue::String("hello".into()),
        );
        let mut session = session("const a = ['hello']; const b = a[0];", oracle)?;
        assert_eq!(
            apply_to(&ResolveMemberExpressionsLocalReferences, &mut session)?,
            "const a = ['hello'];\nconst b = 'hello';"
        );
        Ok(())
    }

    #[test]
    fn test_parameter_member_untouched() -> crate::Result<()> {
        let oracle = ScriptedOracle::new();
        let calls = oracle.calls();
        let src = "function f(a) { return a[0]; }";
        let mut session = session(src, oracle)?;
        assert_eq!(
            apply_to(&ResolveMemberExpressionsLocalReferences, &mut session)?,
            src
        );
        assert!(calls.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn test_local_call() -> crate::Result<()> {
        let src = "function d(i) { return ['a', 'b'][i]; } x = d(1);";
        let oracle = ScriptedOracle::new().answer(
            "function d(i) { return ['a', 'b'][i]; }\nd(1)",
            EvalValue::String("b".into()),
        );
        let mut session = session(src, oracle)?;
        let out = apply_to(&ResolveLocalCalls, &mut session)?;
        assert!(out.ends_with("x = 'b';"), "{out}");
        Ok(())
    }

    #[test]
    fn test_local_call_statement_untouched() -> crate::Result<()> {
        let src = "function d(i) { return i; } d(1);";
        let oracle = ScriptedOracle::new();
        let calls = oracle.calls();
        let mut session = session(src, oracle)?;
        assert_eq!(apply_to(&ResolveLocalCalls, &mut session)?, src);
        assert!(calls.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn test_injected_prototype_method() -> crate::Result<()> {
        let src = "String.prototype.rev = function () { return 'x'; }; y = 'ab'.rev();";
        let oracle = ScriptedOracle::new().answer(
            "String.prototype.rev = function () { return 'x'; };\n'ab'.rev()",
            EvalValue::String("x".into()),
        );
        let mut session = session(src, oracle)?;
        let out = apply_to(&ResolveInjectedPrototypeMethodCalls, &mut session)?;
        assert!(out.ends_with("y = 'x';"), "{out}");
        Ok(())
    }

    #[test]
    fn test_eval_on_expression() -> crate::Result<()> {
        let oracle =
            ScriptedOracle::new().answer("'f' + '()'", EvalValue::String("f()".into()));
        let mut session = session("eval('f' + '()');", oracle)?;
        assert_eq!(
            apply_to(&ResolveEvalCallsOnNonLiterals, &mut session)?,
            "eval('f()');"
        );
        Ok(())
    }

    #[test]
    fn test_function_to_array() -> crate::Result<()> {
        let src = "function f() { return ['a', 'b']; } var a = f(); use(a[0]);";
        let oracle = ScriptedOracle::new().answer(
            "function f() { return ['a', 'b']; }\nf()",
            EvalValue::Array(vec![
                EvalValue::String("a".into()),
                EvalValue::String("b".into()),
            ]),
        );
        let mut session = session(src, oracle)?;
        let out = apply_to(&ResolveFunctionToArray, &mut session)?;
        assert!(out.contains("var a = ["), "{out}");
        assert!(!out.contains("f()"), "{out}");
        Ok(())
    }

    #[test]
    fn test_augmented_array_decoder() -> crate::Result<()> {
        let array_fn =
            "function _a() { var x = ['b', 'a']; _a = function () { return x; }; return _a(); }";
        let decoder = "function _d(i) { var x = _a(); return x[i]; }";
        let augment = "(function (f, n) { var a = f(); while (--n) a.push(a.shift()); })(_a, 2);";
        let src = format!("{array_fn}\n{decoder}\n{augment}\nuse(_d(0));");
        let oracle = ScriptedOracle::new().answer(
            &format!("{array_fn}\n{decoder}\n{augment}\n_d(0)"),
            EvalValue::String("a".into()),
        );
        let mut session = session(&src, oracle)?;
        let out = apply_to(&ResolveAugmentedFunctionWrappedArrayReplacements, &mut session)?;
        assert!(out.ends_with("use('a');"), "{out}");
        Ok(())
    }
}
