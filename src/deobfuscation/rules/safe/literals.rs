//! Rules that turn code held in string literals back into code, and template literals
//! back into strings. Nothing is executed.

use crate::{
    arborist::ListSplicer,
    ast::{Ast, NodeId, NodeKind, NodeType},
    deobfuscation::{
        changes::EventKind,
        rule::{CandidateFilter, Rule, RuleCategory},
        rules::{
            helpers::{
                contains_return, function_body, function_of, in_statement_list,
                is_global_reference, literal_to_string, member_property_name,
                uses_function_context,
            },
            note,
        },
        session::Session,
    },
    Result,
};

/// Folds template literals whose substitutions are all literals.
///
/// ```text
/// `a${1}b${'c'}`  =>  'a1bc'
/// ```
pub struct ParseTemplateLiteralsIntoStringLiterals;

impl Rule for ParseTemplateLiteralsIntoStringLiterals {
    fn name(&self) -> &'static str {
        "parseTemplateLiteralsIntoStringLiterals"
    }

    fn description(&self) -> &'static str {
        "Folds template literals over literal substitutions into strings"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Safe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        let mut marked = 0;
        for template in session.candidates(NodeType::TemplateLiteral, filter) {
            let ast = &session.ast;
            if ast.parent_key(template) == "quasi" {
                continue;
            }
            let NodeKind::TemplateLiteral {
                quasis,
                expressions,
            } = ast.kind(template)
            else {
                continue;
            };

            let mut folded = String::new();
            let mut complete = true;
            for (i, quasi) in quasis.iter().enumerate() {
                match ast.kind(*quasi) {
                    NodeKind::TemplateElement {
                        cooked: Some(cooked),
                        ..
                    } => folded.push_str(cooked),
                    _ => complete = false,
                }
                if let Some(expr) = expressions.get(i) {
                    match ast.kind(*expr).literal().and_then(literal_to_string) {
                        Some(text) => folded.push_str(&text),
                        None => complete = false,
                    }
                }
            }
            if !complete {
                continue;
            }

            let string = session.ast.string(&folded);
            if session.arborist.mark_replace(&session.ast, template, string) {
                note(session, EventKind::ConstantFolded, self.name(), template);
                marked += 1;
            }
        }
        Ok(marked)
    }
}

/// Places parsed `statements` where the expression statement `stmt` was.
fn replace_statement(
    session: &mut Session,
    splicer: &mut ListSplicer,
    stmt: NodeId,
    statements: Vec<NodeId>,
) -> bool {
    if in_statement_list(&session.ast, stmt) {
        return splicer.replace(&session.ast, stmt, statements);
    }
    match statements.as_slice() {
        [] => session.arborist.mark_delete(&session.ast, stmt),
        [single] => session.arborist.mark_replace(&session.ast, stmt, *single),
        _ => {
            let block = session.ast.block(statements);
            session.arborist.mark_replace(&session.ast, stmt, block)
        }
    }
}

/// Returns the expression of a lone expression statement.
fn lone_expression(ast: &Ast, statements: &[NodeId]) -> Option<NodeId> {
    match statements {
        [single] => match ast.kind(*single) {
            NodeKind::ExpressionStatement { expression } => Some(*expression),
            _ => None,
        },
        _ => None,
    }
}

/// Replaces `eval` of a string literal with the code in the string.
///
/// ```text
/// eval('console.log("hello world")');  =>  console.log('hello world');
/// ```
///
/// Outside statement position the code must be a single expression.
pub struct ReplaceEvalCallsWithLiteralContent;

impl Rule for ReplaceEvalCallsWithLiteralContent {
    fn name(&self) -> &'static str {
        "replaceEvalCallsWithLiteralContent"
    }

    fn description(&self) -> &'static str {
        "Replaces eval of string literals with the parsed code"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Safe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        let mut splicer = ListSplicer::new();
        let mut marked = 0;
        for call in session.candidates(NodeType::CallExpression, filter) {
            let ast = &session.ast;
            let NodeKind::CallExpression {
                callee, arguments, ..
            } = ast.kind(call)
            else {
                continue;
            };
            if ast.kind(*callee).ident_name() != Some("eval")
                || !is_global_reference(ast, *callee)
            {
                continue;
            }
            let [argument] = arguments.as_slice() else {
                continue;
            };
            let Some(code) = ast.kind(*argument).string_value().map(str::to_owned) else {
                continue;
            };
            let Ok(statements) = session.ast.parse_fragment(&code) else {
                continue;
            };

            let staged = match session.ast.parent(call) {
                Some(stmt) if session.ast.parent_key(call) == "expression" => {
                    let in_list = in_statement_list(&session.ast, stmt);
                    let staged = replace_statement(session, &mut splicer, stmt, statements);
                    if staged && !in_list {
                        marked += 1;
                    }
                    staged
                }
                _ => match lone_expression(&session.ast, &statements) {
                    Some(expression) => {
                        let staged = session.arborist.mark_replace(&session.ast, call, expression);
                        marked += usize::from(staged);
                        staged
                    }
                    None => false,
                },
            };
            if staged {
                note(session, EventKind::EvalUnwrapped, self.name(), call);
            }
        }
        Ok(marked + splicer.commit(&mut session.ast, &mut session.arborist))
    }
}

/// Replaces immediately invoked `Function` constructors with their code.
///
/// ```text
/// new Function('a();')();               =>  a();
/// x = Function('return 1 + 2')();       =>  x = 1 + 2;
/// ```
///
/// Code run as a statement must not declare names or return; code used as a value
/// must be a single `return` statement.
pub struct ReplaceNewFuncCallsWithLiteralContent;

impl ReplaceNewFuncCallsWithLiteralContent {
    /// Returns the code string of `new Function('<code>')` or `Function('<code>')`.
    fn function_code(ast: &Ast, callee: NodeId) -> Option<String> {
        let (ctor, arguments) = match ast.kind(callee) {
            NodeKind::NewExpression { callee, arguments } => (*callee, arguments),
            NodeKind::CallExpression {
                callee, arguments, ..
            } => (*callee, arguments),
            _ => return None,
        };
        if ast.kind(ctor).ident_name() != Some("Function") || !is_global_reference(ast, ctor) {
            return None;
        }
        match arguments.as_slice() {
            [code] => ast.kind(*code).string_value().map(str::to_owned),
            _ => None,
        }
    }

    /// Returns `true` if the statements may run in place of the call.
    fn runs_inline(ast: &Ast, func: NodeId, statements: &[NodeId]) -> bool {
        !uses_function_context(ast, func)
            && statements.iter().all(|s| {
                !matches!(
                    ast.kind(*s),
                    NodeKind::VariableDeclaration { .. }
                        | NodeKind::FunctionDeclaration { .. }
                        | NodeKind::ClassDeclaration { .. }
                ) && !contains_return(ast, *s)
            })
    }
}

impl Rule for ReplaceNewFuncCallsWithLiteralContent {
    fn name(&self) -> &'static str {
        "replaceNewFuncCallsWithLiteralContent"
    }

    fn description(&self) -> &'static str {
        "Replaces immediately invoked Function constructors with their code"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Safe
    }

    fn run(&self, session: &mut Session, filter: &CandidateFilter) -> Result<usize> {
        let mut splicer = ListSplicer::new();
        let mut marked = 0;
        for call in session.candidates(NodeType::CallExpression, filter) {
            let NodeKind::CallExpression {
                callee, arguments, ..
            } = session.ast.kind(call)
            else {
                continue;
            };
            if !arguments.is_empty() {
                continue;
            }
            let Some(code) = Self::function_code(&session.ast, *callee) else {
                continue;
            };
            let Ok(func) = session
                .ast
                .parse_expression(&format!("function () {{\n{code}\n}}"))
            else {
                continue;
            };
            let Some(NodeKind::BlockStatement { body: statements }) =
                function_body(&session.ast, func).map(|b| session.ast.kind(b).clone())
            else {
                continue;
            };

            let as_statement = session.ast.parent_key(call) == "expression";
            let staged = match session.ast.parent(call) {
                Some(stmt) if as_statement => {
                    if !Self::runs_inline(&session.ast, func, &statements) {
                        continue;
                    }
                    let in_list = in_statement_list(&session.ast, stmt);
                    let staged = replace_statement(session, &mut splicer, stmt, statements);
                    if staged && !in_list {
                        marked += 1;
                    }
                    staged
                }
                _ => {
                    let value = match statements.as_slice() {
                        [single] => match session.ast.kind(*single) {
                            NodeKind::ReturnStatement {
                                argument: Some(value),
                            } => *value,
                            _ => continue,
                        },
                        _ => continue,
                    };
                    if uses_function_context(&session.ast, func) {
                        continue;
                    }
                    let staged = session.arborist.mark_replace(&session.ast, call, value);
                    marked += usize::from(staged);
                    staged
                }
            };
            if staged {
                note(session, EventKind::EvalUnwrapped, self.name(), call);
            }
        }
        Ok(marked + splicer.commit(&mut session.ast, &mut session.arborist))
    }
}

/// Builds functions from `X.constructor(...)` calls with literal arguments.
///
/// ```text
/// (function () {}).constructor('a', 'return a')  =>  function (a) { return a; }
/// ```
///
/// The receiver must be a function, so that `constructor` is `Function`.
pub struct ResolveFunctionConstructorCalls;

impl ResolveFunctionConstructorCalls {
    fn receiver_is_function(ast: &Ast, object: NodeId) -> bool {
        match ast.kind(object) {
            NodeKind::FunctionExpression { .. } | NodeKind::ArrowFunctionExpression { .. } => true,
            NodeKind::Identifier { name } => match ast.decl(object) {
                Some(decl) => function_of(ast, decl).is_some(),
                None => name == "Function" && is_global_reference(ast, object),
            },
            _ => false,
        }
    }
}

impl Rule for ResolveFunctionConstructorCalls {
    fn name(&self) -> &'static str {
        "resolveFunctionConstructorCalls"
    }

    fn description(&self) -> &'static str {
        "Turns Function constructor calls with literal arguments into function expressions"
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
            if member_property_name(ast, *callee).as_deref() != Some("constructor") {
                continue;
            }
            let NodeKind::MemberExpression { object, .. } = ast.kind(*callee) else {
                continue;
            };
            if !Self::receiver_is_function(ast, *object) {
                continue;
            }
            let Some(strings) = arguments
                .iter()
                .map(|a| ast.kind(*a).string_value().map(str::to_owned))
                .collect::<Option<Vec<_>>>()
            else {
                continue;
            };
            let Some((body, params)) = strings.split_last() else {
                continue;
            };

            let source = format!("function ({}) {{\n{body}\n}}", params.join(", "));
            let Ok(func) = session.ast.parse_expression(&source) else {
                continue;
            };
            if session.arborist.mark_replace(&session.ast, call, func) {
                note(session, EventKind::EvalUnwrapped, self.name(), call);
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
    fn test_template_literals() -> crate::Result<()> {
        assert_eq!(
            apply(&ParseTemplateLiteralsIntoStringLiterals, "x = `a${1}b${'c'}`;")?,
            "x = 'a1bc';"
        );
        let src = "x = `a${b}`;";
        assert_eq!(apply(&ParseTemplateLiteralsIntoStringLiterals, src)?, src);
        Ok(())
    }

    #[test]
    fn test_eval_statement() -> crate::Result<()> {
        assert_eq!(
            apply(
                &ReplaceEvalCallsWithLiteralContent,
                "eval('console.log(\"hello world\")');"
            )?,
            "console.log('hello world');"
        );
        Ok(())
    }

    #[test]
    fn test_eval_expression() -> crate::Result<()> {
        assert_eq!(
            apply(&ReplaceEvalCallsWithLiteralContent, "x = eval('1 + 2');")?,
            "x = 1 + 2;"
        );
        Ok(())
    }

    #[test]
    fn test_shadowed_eval_untouched() -> crate::Result<()> {
        let src = "function f(eval) { eval('a'); }";
        assert_eq!(apply(&ReplaceEvalCallsWithLiteralContent, src)?, src);
        Ok(())
    }

    #[test]
    fn test_new_function_statement() -> crate::Result<()> {
        assert_eq!(
            apply(&ReplaceNewFuncCallsWithLiteralContent, "new Function('a(); b();')();")?,
            "a();\nb();"
        );
        Ok(())
    }

    #[test]
    fn test_new_function_value() -> crate::Result<()> {
        assert_eq!(
            apply(
                &ReplaceNewFuncCallsWithLiteralContent,
                "x = Function('return 1 + 2')();"
            )?,
            "x = 1 + 2;"
        );
        let declares = "new Function('var a = 1;')();";
        assert_eq!(apply(&ReplaceNewFuncCallsWithLiteralContent, declares)?, declares);
        Ok(())
    }

    #[test]
    fn test_function_constructor() -> crate::Result<()> {
        let out = apply(
            &ResolveFunctionConstructorCalls,
            "x = (function () {}).constructor('a', 'return a');",
        )?;
        assert_eq!(out, "x = function (a) {\n  return a;\n};");
        let unknown = "x = y.constructor('return 1');";
        assert_eq!(apply(&ResolveFunctionConstructorCalls, unknown)?, unknown);
        Ok(())
    }
}
