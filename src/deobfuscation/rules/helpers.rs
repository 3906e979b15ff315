//! Predicates and small tree utilities shared by the rules.

use std::collections::HashMap;

use crate::{
    ast::{print::js_number, Ast, LitValue, NodeId, NodeKind},
    oracle::PROPERTIES_THAT_MODIFY_CONTENT,
};

/// Returns `true` if `stmt` sits directly in a statement list.
pub fn in_statement_list(ast: &Ast, stmt: NodeId) -> bool {
    ast.parent_kind(stmt)
        .is_some_and(|p| p.statement_list().is_some())
        && matches!(ast.parent_key(stmt), "body" | "consequent")
}

/// Returns the statement holding `id` (which may be `id` itself).
pub fn enclosing_statement(ast: &Ast, id: NodeId) -> Option<NodeId> {
    std::iter::once(id)
        .chain(ast.ancestors(id))
        .find(|&n| ast.kind(n).is_statement())
}

/// Returns the closest function-like ancestor of `id`, excluding `id` itself.
pub fn enclosing_function(ast: &Ast, id: NodeId) -> Option<NodeId> {
    ast.ancestors(id).find(|&a| ast.kind(a).is_function())
}

/// Returns the binding `ident` refers to: its declaring identifier, or itself if it
/// declares one.
pub fn binding(ast: &Ast, ident: NodeId) -> Option<NodeId> {
    ast.decl(ident)
        .or_else(|| is_declaring(ast, ident).then_some(ident))
}

/// Returns `true` if `ident` is a declaring occurrence (declarator, function, class,
/// parameter or catch parameter name).
pub fn is_declaring(ast: &Ast, ident: NodeId) -> bool {
    let Some(parent) = ast.parent(ident) else {
        return false;
    };
    match (ast.kind(parent), ast.parent_key(ident)) {
        (
            NodeKind::VariableDeclarator { .. }
            | NodeKind::FunctionDeclaration { .. }
            | NodeKind::FunctionExpression { .. }
            | NodeKind::ClassDeclaration { .. }
            | NodeKind::ClassExpression { .. },
            "id",
        ) => true,
        (_, "params" | "param") => true,
        _ => false,
    }
}

/// Resolves `name` from the scope of `at`.
///
/// Returns the declaring identifier of the closest binding, or `None` if the name is
/// not declared anywhere on the scope chain (a global or undeclared name).
pub fn resolve_name(ast: &Ast, at: NodeId, name: &str) -> Option<NodeId> {
    let mut scope = ast.scope_of(at);
    while let Some(s) = scope {
        if let Some(&decl) = s.variables.get(name) {
            return Some(decl);
        }
        scope = s.parent.and_then(|p| ast.scope(p));
    }
    None
}

/// Returns `true` if `ident` is an identifier reference to an undeclared (global) name.
pub fn is_global_reference(ast: &Ast, ident: NodeId) -> bool {
    match ast.kind(ident) {
        NodeKind::Identifier { name } => {
            ast.decl(ident).is_none()
                && !is_declaring(ast, ident)
                && !is_property_name(ast, ident)
                && resolve_name(ast, ident, name).is_none()
        }
        _ => false,
    }
}

/// Returns `true` if `ident` is a non-computed property name rather than a reference.
pub fn is_property_name(ast: &Ast, ident: NodeId) -> bool {
    let Some(parent) = ast.parent(ident) else {
        return false;
    };
    match ast.kind(parent) {
        NodeKind::MemberExpression {
            property, computed, ..
        } => *property == ident && !computed,
        NodeKind::Property {
            key,
            computed,
            shorthand,
            ..
        } => *key == ident && !computed && !shorthand,
        NodeKind::MethodDefinition { key, computed, .. }
        | NodeKind::PropertyDefinition { key, computed, .. } => *key == ident && !computed,
        NodeKind::LabeledStatement { .. }
        | NodeKind::BreakStatement { .. }
        | NodeKind::ContinueStatement { .. } => true,
        _ => false,
    }
}

/// Climbs out of destructuring patterns and returns the outermost pattern node.
fn pattern_root(ast: &Ast, mut id: NodeId) -> NodeId {
    while let Some(parent) = ast.parent(id) {
        let climb = match ast.kind(parent) {
            NodeKind::ArrayPattern { .. }
            | NodeKind::ObjectPattern { .. }
            | NodeKind::RestElement { .. } => true,
            NodeKind::AssignmentPattern { left, .. } => *left == id,
            NodeKind::Property { value, .. } => {
                *value == id
                    && ast
                        .parent_kind(parent)
                        .is_some_and(|k| matches!(k, NodeKind::ObjectPattern { .. }))
            }
            _ => false,
        };
        if !climb {
            break;
        }
        id = parent;
    }
    id
}

/// Returns `true` if the reference `ident` writes its binding.
///
/// Covers assignment targets (including destructuring), update expressions, `for-in`
/// and `for-of` heads, and redeclarations that carry an initializer.
pub fn is_write(ast: &Ast, ident: NodeId) -> bool {
    let root = pattern_root(ast, ident);
    let Some(parent) = ast.parent(root) else {
        return false;
    };
    match (ast.kind(parent), ast.parent_key(root)) {
        (NodeKind::AssignmentExpression { .. }, "left") => true,
        (NodeKind::UpdateExpression { .. }, _) => true,
        (NodeKind::ForInStatement { .. } | NodeKind::ForOfStatement { .. }, "left") => true,
        (NodeKind::VariableDeclarator { init, .. }, "id") => init.is_some() || root != ident,
        (NodeKind::VariableDeclaration { .. }, _) => {
            // `for (var a in b)` heads hold the declaration itself
            ast.parent_kind(parent).is_some_and(|k| {
                matches!(
                    k,
                    NodeKind::ForInStatement { .. } | NodeKind::ForOfStatement { .. }
                )
            })
        }
        (NodeKind::FunctionDeclaration { .. } | NodeKind::ClassDeclaration { .. }, "id") => true,
        _ => false,
    }
}

/// Returns `true` if the member expression `member` is written to or deleted.
pub fn is_member_write(ast: &Ast, member: NodeId) -> bool {
    let root = pattern_root(ast, member);
    let Some(parent) = ast.parent(root) else {
        return false;
    };
    match (ast.kind(parent), ast.parent_key(root)) {
        (NodeKind::AssignmentExpression { .. }, "left") => true,
        (NodeKind::UpdateExpression { .. }, _) => true,
        (NodeKind::UnaryExpression { operator, .. }, _) => *operator == "delete",
        (NodeKind::ForInStatement { .. } | NodeKind::ForOfStatement { .. }, "left") => true,
        _ => false,
    }
}

/// Returns `true` if the reference `ident` is used to change the value it refers to:
/// a property write through it, or a call of a content-modifying method on it.
pub fn is_mutated_through(ast: &Ast, ident: NodeId) -> bool {
    let mut current = ident;
    while let Some(parent) = ast.parent(current) {
        match ast.kind(parent) {
            NodeKind::MemberExpression { object, .. } if *object == current => {
                if is_member_write(ast, parent) {
                    return true;
                }
                if let Some(name) = member_property_name(ast, parent) {
                    if PROPERTIES_THAT_MODIFY_CONTENT.contains(&name.as_str())
                        && ast.parent_key(parent) == "callee"
                    {
                        return true;
                    }
                }
                current = parent;
            }
            _ => return false,
        }
    }
    false
}

/// Returns `true` if `ident` is passed as an argument to a call or `new`.
pub fn is_call_argument(ast: &Ast, ident: NodeId) -> bool {
    ast.parent_key(ident) == "arguments"
}

/// Returns `true` if every reference of the binding `decl` only reads it.
///
/// # Arguments
///
/// * `ast` - The tree.
/// * `decl` - A declaring identifier.
/// * `allow_escape` - Whether passing the value to a call is acceptable.
pub fn is_read_only(ast: &Ast, decl: NodeId, allow_escape: bool) -> bool {
    ast.references(decl).iter().all(|&r| {
        !is_write(ast, r) && !is_mutated_through(ast, r) && (allow_escape || !is_call_argument(ast, r))
    })
}

/// Returns `true` if no identifier named `name` that resolves to no binding is ever
/// written anywhere in the script.
pub fn global_never_written(ast: &Ast, name: &str) -> bool {
    !ast.nodes_of(crate::ast::NodeType::Identifier)
        .iter()
        .any(|&id| {
            ast.kind(id).ident_name() == Some(name)
                && ast.decl(id).is_none()
                && !is_property_name(ast, id)
                && (is_write(ast, id) || is_mutated_through(ast, id) || is_declaring(ast, id))
        })
}

/// Returns the declarator or function node that declares `decl`, if `decl` names one.
pub fn declaration_of(ast: &Ast, decl: NodeId) -> Option<NodeId> {
    let parent = ast.parent(decl)?;
    match ast.kind(parent) {
        NodeKind::VariableDeclarator { id, .. }
        | NodeKind::FunctionDeclaration { id: Some(id), .. }
        | NodeKind::ClassDeclaration { id: Some(id), .. }
            if *id == decl =>
        {
            Some(parent)
        }
        _ => None,
    }
}

/// Returns the initializer of the declarator declaring `decl`.
pub fn declarator_init(ast: &Ast, decl: NodeId) -> Option<NodeId> {
    let parent = ast.parent(decl)?;
    match ast.kind(parent) {
        NodeKind::VariableDeclarator { id, init } if *id == decl => *init,
        _ => None,
    }
}

/// Returns the function bound to `decl`: a function declaration named by it, or a
/// function expression or arrow it is initialized with.
pub fn function_of(ast: &Ast, decl: NodeId) -> Option<NodeId> {
    let parent = ast.parent(decl)?;
    match ast.kind(parent) {
        NodeKind::FunctionDeclaration { id: Some(id), .. } if *id == decl => Some(parent),
        NodeKind::VariableDeclarator { id, init: Some(init) } if *id == decl => {
            ast.kind(*init).is_function().then_some(*init)
        }
        _ => None,
    }
}

/// Returns the parameters of a function if they are all plain identifiers.
pub fn simple_params(ast: &Ast, func: NodeId) -> Option<Vec<NodeId>> {
    let params = match ast.kind(func) {
        NodeKind::FunctionDeclaration { params, .. }
        | NodeKind::FunctionExpression { params, .. }
        | NodeKind::ArrowFunctionExpression { params, .. } => params,
        _ => return None,
    };
    params
        .iter()
        .all(|p| matches!(ast.kind(*p), NodeKind::Identifier { .. }))
        .then(|| params.clone())
}

/// Returns the body node of a function.
pub fn function_body(ast: &Ast, func: NodeId) -> Option<NodeId> {
    match ast.kind(func) {
        NodeKind::FunctionDeclaration { body, .. }
        | NodeKind::FunctionExpression { body, .. }
        | NodeKind::ArrowFunctionExpression { body, .. } => Some(*body),
        _ => None,
    }
}

/// Returns `true` for plain (non-async, non-generator) functions.
pub fn is_plain_function(ast: &Ast, func: NodeId) -> bool {
    match ast.kind(func) {
        NodeKind::FunctionDeclaration {
            is_async,
            is_generator,
            ..
        }
        | NodeKind::FunctionExpression {
            is_async,
            is_generator,
            ..
        } => !is_async && !is_generator,
        NodeKind::ArrowFunctionExpression { is_async, .. } => !is_async,
        _ => false,
    }
}

/// Returns the expression a function returns if its body consists of that return only.
pub fn single_return(ast: &Ast, func: NodeId) -> Option<NodeId> {
    if !is_plain_function(ast, func) {
        return None;
    }
    let body = function_body(ast, func)?;
    match ast.kind(body) {
        NodeKind::BlockStatement { body } => match body.as_slice() {
            [stmt] => match ast.kind(*stmt) {
                NodeKind::ReturnStatement { argument } => *argument,
                _ => None,
            },
            _ => None,
        },
        _ if matches!(ast.kind(func), NodeKind::ArrowFunctionExpression { .. }) => Some(body),
        _ => None,
    }
}

/// Returns `true` if `stmt` holds a `return` of its enclosing function.
pub fn contains_return(ast: &Ast, stmt: NodeId) -> bool {
    let mut stack = vec![stmt];
    while let Some(id) = stack.pop() {
        match ast.kind(id) {
            NodeKind::ReturnStatement { .. } => return true,
            kind if kind.is_function() => {}
            kind => stack.extend(kind.children()),
        }
    }
    false
}

/// Returns `true` if the subtree uses `this` or `arguments` of its own function.
pub fn uses_function_context(ast: &Ast, func: NodeId) -> bool {
    let Some(body) = function_body(ast, func) else {
        return false;
    };
    let mut stack = vec![body];
    while let Some(id) = stack.pop() {
        match ast.kind(id) {
            NodeKind::ThisExpression => return true,
            NodeKind::Identifier { name } if name == "arguments" && !is_property_name(ast, id) => {
                return true
            }
            NodeKind::FunctionDeclaration { .. } | NodeKind::FunctionExpression { .. } => continue,
            kind => stack.extend(kind.children()),
        }
    }
    false
}

/// Returns the name of a member expression's property if it is static
/// (`a.b` or `a['b']`).
pub fn member_property_name(ast: &Ast, member: NodeId) -> Option<String> {
    match ast.kind(member) {
        NodeKind::MemberExpression {
            property, computed, ..
        } => match (ast.kind(*property), computed) {
            (NodeKind::Identifier { name }, false) => Some(name.clone()),
            (NodeKind::Literal { value }, true) => literal_to_string(value),
            _ => None,
        },
        _ => None,
    }
}

/// Converts a literal value to the string JavaScript's `String()` would produce.
pub fn literal_to_string(value: &LitValue) -> Option<String> {
    Some(match value {
        LitValue::String(s) => s.clone(),
        LitValue::Number(n) if n.is_sign_negative() && *n != 0.0 => format!("-{}", js_number(*n)),
        LitValue::Number(n) => js_number(*n),
        LitValue::Boolean(b) => b.to_string(),
        LitValue::Null => "null".to_string(),
        LitValue::RegExp { pattern, flags } => format!("/{pattern}/{flags}"),
        LitValue::BigInt(digits) => digits.clone(),
    })
}

/// Returns `true` for literals and negated numeric literals (`1`, `'a'`, `-2`).
pub fn is_literal_like(ast: &Ast, id: NodeId) -> bool {
    match ast.kind(id) {
        NodeKind::Literal { value } => !matches!(value, LitValue::RegExp { .. }),
        NodeKind::UnaryExpression {
            operator: "-" | "+" | "!" | "~",
            argument,
        } => is_literal_like(ast, *argument),
        _ => false,
    }
}

/// Returns `true` for literal-like values and arrays of them.
pub fn is_literal_argument(ast: &Ast, id: NodeId) -> bool {
    match ast.kind(id) {
        NodeKind::ArrayExpression { elements } => elements
            .iter()
            .all(|e| e.is_some_and(|e| is_literal_like(ast, e))),
        _ => is_literal_like(ast, id),
    }
}

/// Returns `true` if evaluating the expression cannot have side effects.
pub fn is_pure(ast: &Ast, id: NodeId) -> bool {
    match ast.kind(id) {
        NodeKind::Literal { .. }
        | NodeKind::Identifier { .. }
        | NodeKind::ThisExpression
        | NodeKind::FunctionExpression { .. }
        | NodeKind::ArrowFunctionExpression { .. } => true,
        NodeKind::UnaryExpression { operator, argument } => {
            *operator != "delete" && is_pure(ast, *argument)
        }
        NodeKind::ArrayExpression { elements } => {
            elements.iter().flatten().all(|e| is_pure(ast, *e))
        }
        NodeKind::ObjectExpression { properties } => properties.iter().all(|p| {
            matches!(ast.kind(*p), NodeKind::Property { computed: false, value, .. } if is_pure(ast, *value))
        }),
        NodeKind::TemplateLiteral { expressions, .. } => {
            expressions.iter().all(|e| is_pure(ast, *e))
        }
        _ => false,
    }
}

/// Returns the truthiness of an expression whose value is known without evaluation.
pub fn static_truthiness(ast: &Ast, id: NodeId) -> Option<bool> {
    match ast.kind(id) {
        NodeKind::Literal { value } => Some(value.is_truthy()),
        NodeKind::UnaryExpression {
            operator: "!",
            argument,
        } => static_truthiness(ast, *argument).map(|t| !t),
        NodeKind::UnaryExpression {
            operator: "void",
            argument,
        } if is_pure(ast, *argument) => Some(false),
        NodeKind::ArrayExpression { .. } | NodeKind::ObjectExpression { .. } if is_pure(ast, id) => {
            Some(true)
        }
        NodeKind::FunctionExpression { .. } | NodeKind::ArrowFunctionExpression { .. } => Some(true),
        NodeKind::Identifier { name } if name == "undefined" && is_global_reference(ast, id) => {
            Some(false)
        }
        _ => None,
    }
}

/// Returns `true` if the statement is empty or an empty block.
pub fn is_empty_statement(ast: &Ast, id: NodeId) -> bool {
    match ast.kind(id) {
        NodeKind::EmptyStatement => true,
        NodeKind::BlockStatement { body } => body.is_empty(),
        _ => false,
    }
}

/// Copies the subtree rooted at `id` into fresh detached nodes of the same tree.
pub fn duplicate(ast: &mut Ast, id: NodeId) -> NodeId {
    let originals = ast.descendants(id);
    let mut map = HashMap::with_capacity(originals.len());
    for old in &originals {
        let kind = ast.kind(*old).clone();
        map.insert(*old, ast.add(kind));
    }
    for new in map.values().copied().collect::<Vec<_>>() {
        let mut kind = ast.kind(new).clone();
        kind.for_each_child_mut(|c, _| *c = map.get(&*c).copied().unwrap_or(*c));
        ast.set_kind(new, kind);
    }
    map.get(&id).copied().unwrap_or(id)
}

/// Builds the statements to put in place of `stmt` when it is replaced by `body`.
///
/// In a statement list the statements are spliced; elsewhere (an `if` branch or a loop
/// body) they are wrapped in a block unless there is exactly one.
pub enum Placement {
    /// Splice into the enclosing statement list.
    Splice,
    /// Replace the statement with one node.
    Single(NodeId),
}

/// Decides how `replacement` statements take the place of `stmt`.
pub fn place_statements(ast: &mut Ast, stmt: NodeId, replacement: &[NodeId]) -> Placement {
    if in_statement_list(ast, stmt) {
        return Placement::Splice;
    }
    match replacement {
        [single] => Placement::Single(*single),
        many => Placement::Single(ast.block(many.to_vec())),
    }
}

/// Returns `true` if a declaration binds names lexically (`let`, `const`, `class`,
/// or a function declaration inside a block).
pub fn is_lexical_declaration(ast: &Ast, stmt: NodeId) -> bool {
    matches!(
        ast.kind(stmt),
        NodeKind::VariableDeclaration {
            kind: crate::ast::VarKind::Let | crate::ast::VarKind::Const,
            ..
        } | NodeKind::ClassDeclaration { .. }
            | NodeKind::FunctionDeclaration { .. }
    )
}

/// Collects the names declared directly in a function's own scope.
pub fn declared_names(ast: &Ast, func: NodeId) -> Vec<String> {
    ast.scope_of(func)
        .filter(|s| s.block == func)
        .map(|s| s.variables.keys().cloned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeType;

    fn ident(ast: &Ast, name: &str, nth: usize) -> NodeId {
        ast.nodes_of(NodeType::Identifier)
            .iter()
            .copied()
            .filter(|&i| ast.kind(i).ident_name() == Some(name))
            .nth(nth)
            .unwrap_or(NodeId(0))
    }

    #[test]
    fn test_writes() -> crate::Result<()> {
        let ast = Ast::parse("var a = 1; a = 2; a++; [a] = [3]; b(a); for (a in o);")?;
        let refs: Vec<bool> = (1..6).map(|n| is_write(&ast, ident(&ast, "a", n))).collect();
        assert_eq!(refs, vec![true, true, true, false, true]);
        Ok(())
    }

    #[test]
    fn test_read_only() -> crate::Result<()> {
        let ast = Ast::parse("var a = [1]; f(a[0]); var b = [2]; b.push(3); var c = [4]; g(c);")?;
        assert!(is_read_only(&ast, ident(&ast, "a", 0), false));
        assert!(!is_read_only(&ast, ident(&ast, "b", 0), true));
        assert!(is_read_only(&ast, ident(&ast, "c", 0), true));
        assert!(!is_read_only(&ast, ident(&ast, "c", 0), false));
        Ok(())
    }

    #[test]
    fn test_resolve_name_and_globals() -> crate::Result<()> {
        let ast = Ast::parse("var x = 1; function f(y) { return x + y + z; }")?;
        let z = ident(&ast, "z", 0);
        assert!(is_global_reference(&ast, z));
        assert_eq!(resolve_name(&ast, z, "x"), Some(ident(&ast, "x", 0)));
        assert_eq!(resolve_name(&ast, z, "y"), Some(ident(&ast, "y", 0)));
        assert!(!is_global_reference(&ast, ident(&ast, "x", 1)));
        Ok(())
    }

    #[test]
    fn test_single_return() -> crate::Result<()> {
        let ast = Ast::parse("function a() { return b; } var c = () => 1;")?;
        let funcs = ast.nodes_of(NodeType::FunctionDeclaration);
        let ret = single_return(&ast, funcs[0]);
        assert_eq!(ret.map(|r| ast.text(r).into_owned()).as_deref(), Some("b"));
        let arrow = ast.nodes_of(NodeType::ArrowFunctionExpression)[0];
        assert_eq!(single_return(&ast, arrow).map(|r| ast.node_type(r)), Some(NodeType::Literal));
        Ok(())
    }

    #[test]
    fn test_static_truthiness() -> crate::Result<()> {
        let ast = Ast::parse("!0; []; ''; x; void 0;")?;
        let exprs: Vec<Option<bool>> = ast
            .nodes_of(NodeType::ExpressionStatement)
            .iter()
            .map(|&s| match ast.kind(s) {
                NodeKind::ExpressionStatement { expression } => static_truthiness(&ast, *expression),
                _ => None,
            })
            .collect();
        assert_eq!(exprs, vec![Some(true), Some(true), Some(false), None, Some(false)]);
        Ok(())
    }

    #[test]
    fn test_duplicate() -> crate::Result<()> {
        let mut ast = Ast::parse("f(a.b, !c);")?;
        let call = ast.nodes_of(NodeType::CallExpression)[0];
        let copy = duplicate(&mut ast, call);
        assert_ne!(copy, call);
        assert!(!ast.is_parsed(copy));
        assert_eq!(ast.text(copy), "f(a.b, !c)");
        Ok(())
    }

    #[test]
    fn test_literal_to_string() {
        assert_eq!(literal_to_string(&LitValue::Number(1.5)).as_deref(), Some("1.5"));
        assert_eq!(literal_to_string(&LitValue::Null).as_deref(), Some("null"));
        assert_eq!(
            literal_to_string(&LitValue::Boolean(false)).as_deref(),
            Some("false")
        );
    }
}
