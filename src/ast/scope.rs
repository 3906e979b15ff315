//! Lexical scope resolution.
//!
//! Builds the scope tree of a parsed [`Ast`] and links identifiers to their bindings:
//! a referencing identifier gets [`Node::decl`](crate::ast::Node::decl) pointing at the
//! declaring identifier, and the declaring identifier collects every reference in
//! [`Node::references`](crate::ast::Node::references). References that leave a scope
//! (free variables) are recorded in that scope's [`Scope::through`] list.
//!
//! `var` and function declarations hoist to the closest function (or global) scope,
//! `let`, `const` and `class` bind in the closest block. Redeclarations resolve to the
//! first declaring identifier and count as references to it.

use std::collections::HashMap;

use crate::ast::{
    node::{NodeId, NodeKind, VarKind},
    Ast,
};

/// Identity of a scope inside one [`Ast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(pub u32);

/// Construct that opened a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// The program
    Global,
    /// Function body and parameters
    Function,
    /// Block statement
    Block,
    /// `for` / `for-in` / `for-of` head
    For,
    /// `switch` body
    Switch,
    /// `catch` parameter
    Catch,
    /// Class body (binds the class name of class expressions)
    Class,
}

/// A lexical scope.
#[derive(Debug, Clone)]
pub struct Scope {
    /// Identity of this scope.
    pub id: ScopeId,
    /// What opened the scope.
    pub kind: ScopeKind,
    /// Node that opened the scope.
    pub block: NodeId,
    /// Enclosing scope, `None` for the global scope.
    pub parent: Option<ScopeId>,
    /// Bindings declared in this scope, mapped to their first declaring identifier.
    pub variables: HashMap<String, NodeId>,
    /// Identifier references that resolve outside this scope, or not at all.
    pub through: Vec<NodeId>,
}

impl Scope {
    fn new(id: ScopeId, kind: ScopeKind, block: NodeId, parent: Option<ScopeId>) -> Self {
        Self {
            id,
            kind,
            block,
            parent,
            variables: HashMap::new(),
            through: Vec::new(),
        }
    }

    /// Returns `true` if `var` declarations hoist into this scope.
    #[must_use]
    pub fn is_function_scope(&self) -> bool {
        matches!(self.kind, ScopeKind::Global | ScopeKind::Function)
    }
}

/// How an identifier occurrence takes part in binding.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Role {
    /// Reads or writes a binding
    Reference,
    /// Declares a `var`-like binding (hoisted)
    Hoisted,
    /// Declares a block-scoped binding
    Lexical,
    /// Declares a binding in the current scope (parameters, catch parameter)
    Local,
}

struct Resolver<'a> {
    ast: &'a mut Ast,
    scopes: Vec<Scope>,
    /// Pending references: identifier and the scope it occurs in.
    pending: Vec<(NodeId, ScopeId)>,
}

/// Resolves scopes and binding links of `ast` in place.
pub(crate) fn resolve(ast: &mut Ast) {
    for node in &mut ast.nodes {
        node.decl = None;
        node.references.clear();
        node.scope = None;
    }

    let root = ast.root();
    let mut resolver = Resolver {
        ast,
        scopes: vec![Scope::new(ScopeId(0), ScopeKind::Global, root, None)],
        pending: Vec::new(),
    };
    resolver.hoist(root, ScopeId(0));
    resolver.walk(root, ScopeId(0));
    resolver.link();

    let Resolver { ast, scopes, .. } = resolver;
    ast.scopes = scopes;
}

impl Resolver<'_> {
    fn open(&mut self, kind: ScopeKind, block: NodeId, parent: ScopeId) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope::new(id, kind, block, Some(parent)));
        id
    }

    fn function_scope(&self, mut scope: ScopeId) -> ScopeId {
        loop {
            let s = &self.scopes[scope.0 as usize];
            match (s.is_function_scope(), s.parent) {
                (true, _) | (false, None) => return scope,
                (false, Some(parent)) => scope = parent,
            }
        }
    }

    fn declare(&mut self, scope: ScopeId, ident: NodeId) {
        let Some(name) = self.ast.nodes[ident.index()].kind.ident_name() else {
            return;
        };
        let name = name.to_string();
        let vars = &mut self.scopes[scope.0 as usize].variables;
        match vars.get(&name) {
            Some(&first) if first != ident => {
                self.ast.nodes[ident.index()].decl = Some(first);
                self.ast.nodes[first.index()].references.push(ident);
            }
            Some(_) => {}
            None => {
                vars.insert(name, ident);
            }
        }
    }

    /// Declares every identifier bound by a pattern.
    fn declare_pattern(&mut self, scope: ScopeId, pattern: NodeId) {
        let mut stack = vec![pattern];
        while let Some(id) = stack.pop() {
            match &self.ast.nodes[id.index()].kind {
                NodeKind::Identifier { .. } => self.declare(scope, id),
                NodeKind::ArrayPattern { elements } => stack.extend(elements.iter().flatten()),
                NodeKind::ObjectPattern { properties } => stack.extend(properties.iter()),
                NodeKind::Property { value, .. } => stack.push(*value),
                NodeKind::AssignmentPattern { left, .. } => stack.push(*left),
                NodeKind::RestElement { argument } => stack.push(*argument),
                _ => {}
            }
        }
    }

    /// Registers hoisted `var` and function declarations of a function body ahead of the
    /// walk, so references preceding the declaration still resolve.
    fn hoist(&mut self, id: NodeId, scope: ScopeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let kind = &self.ast.nodes[current.index()].kind;
            match kind {
                NodeKind::VariableDeclaration {
                    kind: VarKind::Var,
                    declarations,
                } => {
                    let patterns: Vec<NodeId> = declarations
                        .iter()
                        .filter_map(|d| match &self.ast.nodes[d.index()].kind {
                            NodeKind::VariableDeclarator { id, .. } => Some(*id),
                            _ => None,
                        })
                        .collect();
                    for p in patterns {
                        self.declare_pattern(scope, p);
                    }
                    continue;
                }
                NodeKind::FunctionDeclaration { id: Some(name), .. } if current != id => {
                    let name = *name;
                    self.declare(scope, name);
                    continue;
                }
                _ if current != id && kind.is_function() => continue,
                NodeKind::ClassDeclaration { .. } | NodeKind::ClassExpression { .. }
                    if current != id =>
                {
                    continue
                }
                _ => {}
            }
            let mut children = kind.children();
            children.reverse();
            stack.extend(children);
        }
    }

    fn walk(&mut self, id: NodeId, scope: ScopeId) {
        self.ast.nodes[id.index()].scope = Some(scope);
        let kind = self.ast.nodes[id.index()].kind.clone();

        match &kind {
            NodeKind::Identifier { .. } => {
                self.pending.push((id, scope));
            }
            NodeKind::FunctionDeclaration {
                id: name,
                params,
                body,
                ..
            }
            | NodeKind::FunctionExpression {
                id: name,
                params,
                body,
                ..
            } => {
                if let Some(name) = name {
                    self.ast.nodes[name.index()].scope = Some(scope);
                    if matches!(kind, NodeKind::FunctionDeclaration { .. }) {
                        let target = self.function_scope(scope);
                        self.declare(target, *name);
                    }
                }
                let inner = self.open(ScopeKind::Function, id, scope);
                self.ast.nodes[id.index()].scope = Some(inner);
                if let (Some(name), NodeKind::FunctionExpression { .. }) = (name, &kind) {
                    self.declare(inner, *name);
                }
                self.params(params, inner);
                self.hoist(*body, inner);
                self.body_in(*body, inner);
            }
            NodeKind::ArrowFunctionExpression { params, body, .. } => {
                let inner = self.open(ScopeKind::Function, id, scope);
                self.ast.nodes[id.index()].scope = Some(inner);
                self.params(params, inner);
                if matches!(self.ast.nodes[body.index()].kind, NodeKind::BlockStatement { .. }) {
                    self.hoist(*body, inner);
                    self.body_in(*body, inner);
                } else {
                    self.walk(*body, inner);
                }
            }
            NodeKind::ClassDeclaration {
                id: name,
                super_class,
                body,
            }
            | NodeKind::ClassExpression {
                id: name,
                super_class,
                body,
            } => {
                if let Some(name) = name {
                    self.ast.nodes[name.index()].scope = Some(scope);
                    if matches!(kind, NodeKind::ClassDeclaration { .. }) {
                        self.declare(scope, *name);
                    }
                }
                if let Some(sc) = super_class {
                    self.walk(*sc, scope);
                }
                let inner = self.open(ScopeKind::Class, id, scope);
                self.ast.nodes[id.index()].scope = Some(inner);
                if let (Some(name), NodeKind::ClassExpression { .. }) = (name, &kind) {
                    self.declare(inner, *name);
                }
                self.walk(*body, inner);
            }
            NodeKind::BlockStatement { body } | NodeKind::StaticBlock { body } => {
                let inner = self.open(ScopeKind::Block, id, scope);
                self.ast.nodes[id.index()].scope = Some(inner);
                if matches!(kind, NodeKind::StaticBlock { .. }) {
                    self.hoist(id, inner);
                }
                self.statements(body, inner);
            }
            NodeKind::Program { body } => {
                self.statements(body, scope);
            }
            NodeKind::SwitchStatement {
                discriminant,
                cases,
            } => {
                self.walk(*discriminant, scope);
                let inner = self.open(ScopeKind::Switch, id, scope);
                self.ast.nodes[id.index()].scope = Some(inner);
                let consequents: Vec<NodeId> = cases
                    .iter()
                    .flat_map(|c| match &self.ast.nodes[c.index()].kind {
                        NodeKind::SwitchCase { consequent, .. } => consequent.clone(),
                        _ => Vec::new(),
                    })
                    .collect();
                self.declare_lexical(&consequents, inner);
                for case in cases {
                    self.walk(*case, inner);
                }
            }
            NodeKind::ForStatement { .. }
            | NodeKind::ForInStatement { .. }
            | NodeKind::ForOfStatement { .. } => {
                let inner = self.open(ScopeKind::For, id, scope);
                self.ast.nodes[id.index()].scope = Some(inner);
                let head = match &kind {
                    NodeKind::ForStatement { init, .. } => *init,
                    NodeKind::ForInStatement { left, .. } | NodeKind::ForOfStatement { left, .. } => {
                        Some(*left)
                    }
                    _ => None,
                };
                if let Some(head) = head {
                    self.declare_lexical(&[head], inner);
                }
                self.children_in(&kind, inner);
            }
            NodeKind::CatchClause { param, body } => {
                let inner = self.open(ScopeKind::Catch, id, scope);
                self.ast.nodes[id.index()].scope = Some(inner);
                if let Some(param) = param {
                    self.declare_pattern(inner, *param);
                    self.walk_pattern(*param, inner, Role::Local);
                }
                self.walk(*body, inner);
            }
            NodeKind::VariableDeclarator { id: pattern, init } => {
                let role = match self.declarator_kind(id) {
                    Some(VarKind::Var) => Role::Hoisted,
                    _ => Role::Lexical,
                };
                self.walk_pattern(*pattern, scope, role);
                if let Some(init) = init {
                    self.walk(*init, scope);
                }
            }
            NodeKind::AssignmentExpression { left, right, .. } => {
                self.walk_pattern(*left, scope, Role::Reference);
                self.walk(*right, scope);
            }
            NodeKind::MemberExpression {
                object,
                property,
                computed,
                ..
            } => {
                self.walk(*object, scope);
                if *computed {
                    self.walk(*property, scope);
                } else {
                    self.ast.nodes[property.index()].scope = Some(scope);
                }
            }
            NodeKind::Property {
                key,
                value,
                computed,
                ..
            }
            | NodeKind::MethodDefinition {
                key,
                value,
                computed,
                ..
            } => {
                self.key(*key, *computed, scope);
                self.walk(*value, scope);
            }
            NodeKind::PropertyDefinition {
                key,
                value,
                computed,
                ..
            } => {
                self.key(*key, *computed, scope);
                if let Some(value) = value {
                    self.walk(*value, scope);
                }
            }
            NodeKind::LabeledStatement { label, body } => {
                self.ast.nodes[label.index()].scope = Some(scope);
                self.walk(*body, scope);
            }
            NodeKind::BreakStatement { label } | NodeKind::ContinueStatement { label } => {
                if let Some(label) = label {
                    self.ast.nodes[label.index()].scope = Some(scope);
                }
            }
            _ => self.children_in(&kind, scope),
        }
    }

    fn key(&mut self, key: NodeId, computed: bool, scope: ScopeId) {
        if computed {
            self.walk(key, scope);
        } else {
            self.ast.nodes[key.index()].scope = Some(scope);
        }
    }

    fn declarator_kind(&self, declarator: NodeId) -> Option<VarKind> {
        let parent = self.ast.nodes[declarator.index()].parent?;
        match &self.ast.nodes[parent.index()].kind {
            NodeKind::VariableDeclaration { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    fn children_in(&mut self, kind: &NodeKind, scope: ScopeId) {
        for child in kind.children() {
            self.walk(child, scope);
        }
    }

    fn params(&mut self, params: &[NodeId], scope: ScopeId) {
        for p in params {
            self.declare_pattern(scope, *p);
        }
        for p in params {
            self.walk_pattern(*p, scope, Role::Local);
        }
    }

    /// Walks a function body block without opening an extra block scope.
    fn body_in(&mut self, body: NodeId, scope: ScopeId) {
        self.ast.nodes[body.index()].scope = Some(scope);
        let stmts = match &self.ast.nodes[body.index()].kind {
            NodeKind::BlockStatement { body } => body.clone(),
            _ => return,
        };
        self.statements(&stmts, scope);
    }

    fn statements(&mut self, stmts: &[NodeId], scope: ScopeId) {
        self.declare_lexical(stmts, scope);
        for s in stmts {
            self.walk(*s, scope);
        }
    }

    /// Declares `let`/`const`/`class` bindings of a statement list up front.
    fn declare_lexical(&mut self, stmts: &[NodeId], scope: ScopeId) {
        for s in stmts {
            match &self.ast.nodes[s.index()].kind {
                NodeKind::VariableDeclaration { kind, declarations } if *kind != VarKind::Var => {
                    let patterns: Vec<NodeId> = declarations
                        .iter()
                        .filter_map(|d| match &self.ast.nodes[d.index()].kind {
                            NodeKind::VariableDeclarator { id, .. } => Some(*id),
                            _ => None,
                        })
                        .collect();
                    for p in patterns {
                        self.declare_pattern(scope, p);
                    }
                }
                NodeKind::ClassDeclaration { id: Some(name), .. } => {
                    let name = *name;
                    self.declare(scope, name);
                }
                _ => {}
            }
        }
    }

    /// Walks a binding or assignment pattern. Identifiers in binding position are
    /// already declared, everything else is an ordinary reference.
    fn walk_pattern(&mut self, id: NodeId, scope: ScopeId, role: Role) {
        self.ast.nodes[id.index()].scope = Some(scope);
        let kind = self.ast.nodes[id.index()].kind.clone();
        match &kind {
            NodeKind::Identifier { .. } => {
                if role == Role::Reference {
                    self.pending.push((id, scope));
                }
            }
            NodeKind::ArrayPattern { elements } => {
                for e in elements.iter().flatten() {
                    self.walk_pattern(*e, scope, role);
                }
            }
            NodeKind::ObjectPattern { properties } => {
                for p in properties {
                    self.walk_pattern(*p, scope, role);
                }
            }
            NodeKind::Property {
                key,
                value,
                computed,
                ..
            } => {
                self.key(*key, *computed, scope);
                self.walk_pattern(*value, scope, role);
            }
            NodeKind::AssignmentPattern { left, right } => {
                self.walk_pattern(*left, scope, role);
                self.walk(*right, scope);
            }
            NodeKind::RestElement { argument } => self.walk_pattern(*argument, scope, role),
            _ => self.walk(id, scope),
        }
    }

    fn lookup(&self, name: &str, from: ScopeId) -> Option<(NodeId, ScopeId)> {
        let mut current = Some(from);
        while let Some(scope) = current {
            let s = &self.scopes[scope.0 as usize];
            if let Some(&decl) = s.variables.get(name) {
                return Some((decl, scope));
            }
            current = s.parent;
        }
        None
    }

    fn link(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        for (ident, scope) in pending {
            let Some(name) = self.ast.nodes[ident.index()].kind.ident_name() else {
                continue;
            };
            let found = self.lookup(name, scope);
            let stop = found.map(|(_, s)| s);
            if let Some((decl, _)) = found {
                if decl != ident {
                    self.ast.nodes[ident.index()].decl = Some(decl);
                    self.ast.nodes[decl.index()].references.push(ident);
                }
            }

            let mut current = Some(scope);
            while let Some(s) = current {
                if Some(s) == stop {
                    break;
                }
                self.scopes[s.0 as usize].through.push(ident);
                current = self.scopes[s.0 as usize].parent;
            }
        }

        for node in &mut self.ast.nodes {
            node.references.sort();
            node.references.dedup();
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{Ast, NodeKind, NodeType};

    fn idents<'a>(ast: &'a Ast, name: &'a str) -> Vec<crate::ast::NodeId> {
        ast.nodes_of(NodeType::Identifier)
            .iter()
            .copied()
            .filter(|id| ast.kind(*id).ident_name() == Some(name))
            .collect()
    }

    #[test]
    fn test_var_hoisting() -> crate::Result<()> {
        let ast = Ast::parse("a(); function f() { return x; } var x = 1; f();")?;
        let x = idents(&ast, "x");
        assert_eq!(x.len(), 2);
        assert_eq!(ast.node(x[0]).decl, Some(x[1]));
        assert_eq!(ast.node(x[1]).references, vec![x[0]]);
        Ok(())
    }

    #[test]
    fn test_block_shadowing() -> crate::Result<()> {
        let ast = Ast::parse("let a = 1; { let a = 2; a; } a;")?;
        let a = idents(&ast, "a");
        assert_eq!(a.len(), 4);
        assert_eq!(ast.node(a[2]).decl, Some(a[1]));
        assert_eq!(ast.node(a[3]).decl, Some(a[0]));
        Ok(())
    }

    #[test]
    fn test_member_property_is_not_reference() -> crate::Result<()> {
        let ast = Ast::parse("var b = 1; a.b;")?;
        let b = idents(&ast, "b");
        assert!(ast.node(b[0]).references.is_empty());
        assert_eq!(ast.node(b[1]).decl, None);
        Ok(())
    }

    #[test]
    fn test_through_references() -> crate::Result<()> {
        let ast = Ast::parse("var a = 1; function f(b) { return a + b + c; }")?;
        let f = ast.nodes_of(NodeType::FunctionDeclaration)[0];
        let scope = ast.scope_of(f).map(|s| s.through.clone()).unwrap_or_default();
        let names: Vec<_> = scope
            .iter()
            .filter_map(|id| ast.kind(*id).ident_name())
            .collect();
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(ast.scope_of(f).map(|s| s.block), Some(f));
        Ok(())
    }

    #[test]
    fn test_assignment_is_reference() -> crate::Result<()> {
        let ast = Ast::parse("var a; a = 2; [a] = [3];")?;
        let a = idents(&ast, "a");
        assert_eq!(ast.node(a[0]).references, vec![a[1], a[2]]);
        assert!(matches!(ast.kind(a[0]), NodeKind::Identifier { .. }));
        Ok(())
    }
}
