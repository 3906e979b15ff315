//! Node types of the arena AST.
//!
//! Every syntactic construct is a [`NodeKind`] variant. Child links are [`NodeId`]s into
//! the owning [`Ast`](crate::ast::Ast) arena, so the tree can be freely shared and
//! inspected without ownership cycles. Variant and field names follow ESTree so that
//! rules read like the patterns they match.

use std::fmt;

use strum::{Display, EnumIter, IntoStaticStr};

use crate::ast::scope::ScopeId;

/// Stable identity of a node inside one parsed [`Ast`](crate::ast::Ast).
///
/// Ids are assigned in pre-order while parsing, so comparing ids of parsed nodes
/// compares their source positions. Nodes created afterwards (replacement subtrees)
/// receive ids above every parsed node and therefore sort last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Returns the arena index of this id.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Byte range of a parsed node within the script it was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    /// Inclusive start offset.
    pub start: u32,
    /// Exclusive end offset.
    pub end: u32,
}

impl Span {
    /// Creates a span from byte offsets.
    #[must_use]
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Returns `true` if `other` lies entirely within this span.
    #[must_use]
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Declaration keyword of a `VariableDeclaration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum VarKind {
    /// `var`
    Var,
    /// `let`
    Let,
    /// `const`
    Const,
}

/// Kind of an object literal property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropKind {
    /// `key: value`, shorthand or method
    Init,
    /// `get key() {}`
    Get,
    /// `set key(v) {}`
    Set,
}

/// Kind of a class method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodKind {
    /// `constructor() {}`
    Constructor,
    /// `name() {}`
    Method,
    /// `get name() {}`
    Get,
    /// `set name(v) {}`
    Set,
}

/// Value carried by a `Literal` node.
#[derive(Debug, Clone, PartialEq)]
pub enum LitValue {
    /// String literal (cooked value)
    String(String),
    /// Numeric literal
    Number(f64),
    /// `true` / `false`
    Boolean(bool),
    /// `null`
    Null,
    /// Regular expression literal
    RegExp {
        /// Pattern between the slashes
        pattern: String,
        /// Flags after the closing slash
        flags: String,
    },
    /// BigInt literal, decimal digits without the `n` suffix
    BigInt(String),
}

impl LitValue {
    /// JavaScript truthiness of the literal value.
    ///
    /// Regular expressions are objects and therefore always truthy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            LitValue::String(s) => !s.is_empty(),
            LitValue::Number(n) => *n != 0.0 && !n.is_nan(),
            LitValue::Boolean(b) => *b,
            LitValue::Null => false,
            LitValue::RegExp { .. } => true,
            LitValue::BigInt(digits) => digits.trim_start_matches(['-', '0']).len() > 0,
        }
    }
}

/// Type tag of a node, used as the key of the type index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, EnumIter)]
#[allow(missing_docs)]
pub enum NodeType {
    Program,
    ExpressionStatement,
    BlockStatement,
    EmptyStatement,
    DebuggerStatement,
    WithStatement,
    ReturnStatement,
    LabeledStatement,
    BreakStatement,
    ContinueStatement,
    IfStatement,
    SwitchStatement,
    SwitchCase,
    ThrowStatement,
    TryStatement,
    CatchClause,
    WhileStatement,
    DoWhileStatement,
    ForStatement,
    ForInStatement,
    ForOfStatement,
    FunctionDeclaration,
    VariableDeclaration,
    VariableDeclarator,
    ClassDeclaration,
    ClassExpression,
    ClassBody,
    MethodDefinition,
    PropertyDefinition,
    StaticBlock,
    Identifier,
    Literal,
    ThisExpression,
    Super,
    ArrayExpression,
    ObjectExpression,
    Property,
    FunctionExpression,
    ArrowFunctionExpression,
    TemplateLiteral,
    TemplateElement,
    TaggedTemplateExpression,
    UnaryExpression,
    UpdateExpression,
    BinaryExpression,
    LogicalExpression,
    AssignmentExpression,
    ConditionalExpression,
    CallExpression,
    NewExpression,
    MemberExpression,
    SequenceExpression,
    SpreadElement,
    YieldExpression,
    AwaitExpression,
    MetaProperty,
    ImportExpression,
    ArrayPattern,
    ObjectPattern,
    AssignmentPattern,
    RestElement,
    Raw,
}

/// A syntactic construct with its child links.
///
/// Operators are stored as their source spelling (`"+"`, `"typeof"`, `"+="`).
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum NodeKind {
    // Statements
    Program {
        body: Vec<NodeId>,
    },
    ExpressionStatement {
        expression: NodeId,
    },
    BlockStatement {
        body: Vec<NodeId>,
    },
    EmptyStatement,
    DebuggerStatement,
    WithStatement {
        object: NodeId,
        body: NodeId,
    },
    ReturnStatement {
        argument: Option<NodeId>,
    },
    LabeledStatement {
        label: NodeId,
        body: NodeId,
    },
    BreakStatement {
        label: Option<NodeId>,
    },
    ContinueStatement {
        label: Option<NodeId>,
    },
    IfStatement {
        test: NodeId,
        consequent: NodeId,
        alternate: Option<NodeId>,
    },
    SwitchStatement {
        discriminant: NodeId,
        cases: Vec<NodeId>,
    },
    SwitchCase {
        test: Option<NodeId>,
        consequent: Vec<NodeId>,
    },
    ThrowStatement {
        argument: NodeId,
    },
    TryStatement {
        block: NodeId,
        handler: Option<NodeId>,
        finalizer: Option<NodeId>,
    },
    CatchClause {
        param: Option<NodeId>,
        body: NodeId,
    },
    WhileStatement {
        test: NodeId,
        body: NodeId,
    },
    DoWhileStatement {
        body: NodeId,
        test: NodeId,
    },
    ForStatement {
        init: Option<NodeId>,
        test: Option<NodeId>,
        update: Option<NodeId>,
        body: NodeId,
    },
    ForInStatement {
        left: NodeId,
        right: NodeId,
        body: NodeId,
    },
    ForOfStatement {
        left: NodeId,
        right: NodeId,
        body: NodeId,
        is_await: bool,
    },

    // Declarations
    FunctionDeclaration {
        id: Option<NodeId>,
        params: Vec<NodeId>,
        body: NodeId,
        is_async: bool,
        is_generator: bool,
    },
    VariableDeclaration {
        kind: VarKind,
        declarations: Vec<NodeId>,
    },
    VariableDeclarator {
        id: NodeId,
        init: Option<NodeId>,
    },
    ClassDeclaration {
        id: Option<NodeId>,
        super_class: Option<NodeId>,
        body: NodeId,
    },
    ClassExpression {
        id: Option<NodeId>,
        super_class: Option<NodeId>,
        body: NodeId,
    },
    ClassBody {
        body: Vec<NodeId>,
    },
    MethodDefinition {
        key: NodeId,
        value: NodeId,
        kind: MethodKind,
        computed: bool,
        is_static: bool,
    },
    PropertyDefinition {
        key: NodeId,
        value: Option<NodeId>,
        computed: bool,
        is_static: bool,
    },
    StaticBlock {
        body: Vec<NodeId>,
    },

    // Expressions
    Identifier {
        name: String,
    },
    Literal {
        value: LitValue,
    },
    ThisExpression,
    Super,
    ArrayExpression {
        elements: Vec<Option<NodeId>>,
    },
    ObjectExpression {
        properties: Vec<NodeId>,
    },
    Property {
        key: NodeId,
        value: NodeId,
        kind: PropKind,
        computed: bool,
        shorthand: bool,
        method: bool,
    },
    FunctionExpression {
        id: Option<NodeId>,
        params: Vec<NodeId>,
        body: NodeId,
        is_async: bool,
        is_generator: bool,
    },
    ArrowFunctionExpression {
        params: Vec<NodeId>,
        body: NodeId,
        expression: bool,
        is_async: bool,
    },
    TemplateLiteral {
        quasis: Vec<NodeId>,
        expressions: Vec<NodeId>,
    },
    TemplateElement {
        raw: String,
        cooked: Option<String>,
        tail: bool,
    },
    TaggedTemplateExpression {
        tag: NodeId,
        quasi: NodeId,
    },
    UnaryExpression {
        operator: &'static str,
        argument: NodeId,
    },
    UpdateExpression {
        operator: &'static str,
        prefix: bool,
        argument: NodeId,
    },
    BinaryExpression {
        operator: &'static str,
        left: NodeId,
        right: NodeId,
    },
    LogicalExpression {
        operator: &'static str,
        left: NodeId,
        right: NodeId,
    },
    AssignmentExpression {
        operator: &'static str,
        left: NodeId,
        right: NodeId,
    },
    ConditionalExpression {
        test: NodeId,
        consequent: NodeId,
        alternate: NodeId,
    },
    CallExpression {
        callee: NodeId,
        arguments: Vec<NodeId>,
        optional: bool,
    },
    NewExpression {
        callee: NodeId,
        arguments: Vec<NodeId>,
    },
    MemberExpression {
        object: NodeId,
        property: NodeId,
        computed: bool,
        optional: bool,
    },
    SequenceExpression {
        expressions: Vec<NodeId>,
    },
    SpreadElement {
        argument: NodeId,
    },
    YieldExpression {
        argument: Option<NodeId>,
        delegate: bool,
    },
    AwaitExpression {
        argument: NodeId,
    },
    MetaProperty {
        meta: String,
        property: String,
    },
    ImportExpression {
        source: NodeId,
    },

    // Patterns
    ArrayPattern {
        elements: Vec<Option<NodeId>>,
    },
    ObjectPattern {
        properties: Vec<NodeId>,
    },
    AssignmentPattern {
        left: NodeId,
        right: NodeId,
    },
    RestElement {
        argument: NodeId,
    },

    /// Syntax the engine does not model (module declarations, private names, JSX).
    /// Printed back verbatim and never rewritten.
    Raw {
        text: String,
    },
}

/// Expands `$body` once per child of `$kind` with `$f(child, "fieldName")`.
///
/// Works on both `&NodeKind` and `&mut NodeKind` through match ergonomics, which
/// keeps the shared and the mutable child walk in lockstep.
macro_rules! each_child {
    ($kind:expr, $f:ident) => {
        match $kind {
            NodeKind::Program { body }
            | NodeKind::BlockStatement { body }
            | NodeKind::ClassBody { body }
            | NodeKind::StaticBlock { body } => {
                for c in body {
                    $f(c, "body");
                }
            }
            NodeKind::ExpressionStatement { expression } => $f(expression, "expression"),
            NodeKind::EmptyStatement
            | NodeKind::DebuggerStatement
            | NodeKind::Identifier { .. }
            | NodeKind::Literal { .. }
            | NodeKind::ThisExpression
            | NodeKind::Super
            | NodeKind::TemplateElement { .. }
            | NodeKind::MetaProperty { .. }
            | NodeKind::Raw { .. } => {}
            NodeKind::WithStatement { object, body } => {
                $f(object, "object");
                $f(body, "body");
            }
            NodeKind::ReturnStatement { argument } => {
                if let Some(c) = argument {
                    $f(c, "argument");
                }
            }
            NodeKind::LabeledStatement { label, body } => {
                $f(label, "label");
                $f(body, "body");
            }
            NodeKind::BreakStatement { label } | NodeKind::ContinueStatement { label } => {
                if let Some(c) = label {
                    $f(c, "label");
                }
            }
            NodeKind::IfStatement {
                test,
                consequent,
                alternate,
            } => {
                $f(test, "test");
                $f(consequent, "consequent");
                if let Some(c) = alternate {
                    $f(c, "alternate");
                }
            }
            NodeKind::SwitchStatement {
                discriminant,
                cases,
            } => {
                $f(discriminant, "discriminant");
                for c in cases {
                    $f(c, "cases");
                }
            }
            NodeKind::SwitchCase { test, consequent } => {
                if let Some(c) = test {
                    $f(c, "test");
                }
                for c in consequent {
                    $f(c, "consequent");
                }
            }
            NodeKind::ThrowStatement { argument }
            | NodeKind::SpreadElement { argument }
            | NodeKind::AwaitExpression { argument }
            | NodeKind::RestElement { argument }
            | NodeKind::UnaryExpression { argument, .. }
            | NodeKind::UpdateExpression { argument, .. } => $f(argument, "argument"),
            NodeKind::TryStatement {
                block,
                handler,
                finalizer,
            } => {
                $f(block, "block");
                if let Some(c) = handler {
                    $f(c, "handler");
                }
                if let Some(c) = finalizer {
                    $f(c, "finalizer");
                }
            }
            NodeKind::CatchClause { param, body } => {
                if let Some(c) = param {
                    $f(c, "param");
                }
                $f(body, "body");
            }
            NodeKind::WhileStatement { test, body } => {
                $f(test, "test");
                $f(body, "body");
            }
            NodeKind::DoWhileStatement { body, test } => {
                $f(body, "body");
                $f(test, "test");
            }
            NodeKind::ForStatement {
                init,
                test,
                update,
                body,
            } => {
                if let Some(c) = init {
                    $f(c, "init");
                }
                if let Some(c) = test {
                    $f(c, "test");
                }
                if let Some(c) = update {
                    $f(c, "update");
                }
                $f(body, "body");
            }
            NodeKind::ForInStatement { left, right, body }
            | NodeKind::ForOfStatement {
                left, right, body, ..
            } => {
                $f(left, "left");
                $f(right, "right");
                $f(body, "body");
            }
            NodeKind::FunctionDeclaration {
                id, params, body, ..
            }
            | NodeKind::FunctionExpression {
                id, params, body, ..
            } => {
                if let Some(c) = id {
                    $f(c, "id");
                }
                for c in params {
                    $f(c, "params");
                }
                $f(body, "body");
            }
            NodeKind::ArrowFunctionExpression { params, body, .. } => {
                for c in params {
                    $f(c, "params");
                }
                $f(body, "body");
            }
            NodeKind::VariableDeclaration { declarations, .. } => {
                for c in declarations {
                    $f(c, "declarations");
                }
            }
            NodeKind::VariableDeclarator { id, init } => {
                $f(id, "id");
                if let Some(c) = init {
                    $f(c, "init");
                }
            }
            NodeKind::ClassDeclaration {
                id,
                super_class,
                body,
            }
            | NodeKind::ClassExpression {
                id,
                super_class,
                body,
            } => {
                if let Some(c) = id {
                    $f(c, "id");
                }
                if let Some(c) = super_class {
                    $f(c, "superClass");
                }
                $f(body, "body");
            }
            NodeKind::MethodDefinition { key, value, .. }
            | NodeKind::Property { key, value, .. } => {
                $f(key, "key");
                $f(value, "value");
            }
            NodeKind::PropertyDefinition { key, value, .. } => {
                $f(key, "key");
                if let Some(c) = value {
                    $f(c, "value");
                }
            }
            NodeKind::ArrayExpression { elements } | NodeKind::ArrayPattern { elements } => {
                for c in elements.into_iter().flatten() {
                    $f(c, "elements");
                }
            }
            NodeKind::ObjectExpression { properties } | NodeKind::ObjectPattern { properties } => {
                for c in properties {
                    $f(c, "properties");
                }
            }
            NodeKind::TemplateLiteral {
                quasis,
                expressions,
            } => {
                for c in quasis {
                    $f(c, "quasis");
                }
                for c in expressions {
                    $f(c, "expressions");
                }
            }
            NodeKind::TaggedTemplateExpression { tag, quasi } => {
                $f(tag, "tag");
                $f(quasi, "quasi");
            }
            NodeKind::BinaryExpression { left, right, .. }
            | NodeKind::LogicalExpression { left, right, .. }
            | NodeKind::AssignmentExpression { left, right, .. }
            | NodeKind::AssignmentPattern { left, right } => {
                $f(left, "left");
                $f(right, "right");
            }
            NodeKind::ConditionalExpression {
                test,
                consequent,
                alternate,
            } => {
                $f(test, "test");
                $f(consequent, "consequent");
                $f(alternate, "alternate");
            }
            NodeKind::CallExpression {
                callee, arguments, ..
            }
            | NodeKind::NewExpression { callee, arguments } => {
                $f(callee, "callee");
                for c in arguments {
                    $f(c, "arguments");
                }
            }
            NodeKind::MemberExpression {
                object, property, ..
            } => {
                $f(object, "object");
                $f(property, "property");
            }
            NodeKind::SequenceExpression { expressions } => {
                for c in expressions {
                    $f(c, "expressions");
                }
            }
            NodeKind::YieldExpression { argument, .. } => {
                if let Some(c) = argument {
                    $f(c, "argument");
                }
            }
            NodeKind::ImportExpression { source } => $f(source, "source"),
        }
    };
}

impl NodeKind {
    /// Returns the type tag of this node.
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Program { .. } => NodeType::Program,
            NodeKind::ExpressionStatement { .. } => NodeType::ExpressionStatement,
            NodeKind::BlockStatement { .. } => NodeType::BlockStatement,
            NodeKind::EmptyStatement => NodeType::EmptyStatement,
            NodeKind::DebuggerStatement => NodeType::DebuggerStatement,
            NodeKind::WithStatement { .. } => NodeType::WithStatement,
            NodeKind::ReturnStatement { .. } => NodeType::ReturnStatement,
            NodeKind::LabeledStatement { .. } => NodeType::LabeledStatement,
            NodeKind::BreakStatement { .. } => NodeType::BreakStatement,
            NodeKind::ContinueStatement { .. } => NodeType::ContinueStatement,
            NodeKind::IfStatement { .. } => NodeType::IfStatement,
            NodeKind::SwitchStatement { .. } => NodeType::SwitchStatement,
            NodeKind::SwitchCase { .. } => NodeType::SwitchCase,
            NodeKind::ThrowStatement { .. } => NodeType::ThrowStatement,
            NodeKind::TryStatement { .. } => NodeType::TryStatement,
            NodeKind::CatchClause { .. } => NodeType::CatchClause,
            NodeKind::WhileStatement { .. } => NodeType::WhileStatement,
            NodeKind::DoWhileStatement { .. } => NodeType::DoWhileStatement,
            NodeKind::ForStatement { .. } => NodeType::ForStatement,
            NodeKind::ForInStatement { .. } => NodeType::ForInStatement,
            NodeKind::ForOfStatement { .. } => NodeType::ForOfStatement,
            NodeKind::FunctionDeclaration { .. } => NodeType::FunctionDeclaration,
            NodeKind::VariableDeclaration { .. } => NodeType::VariableDeclaration,
            NodeKind::VariableDeclarator { .. } => NodeType::VariableDeclarator,
            NodeKind::ClassDeclaration { .. } => NodeType::ClassDeclaration,
            NodeKind::ClassExpression { .. } => NodeType::ClassExpression,
            NodeKind::ClassBody { .. } => NodeType::ClassBody,
            NodeKind::MethodDefinition { .. } => NodeType::MethodDefinition,
            NodeKind::PropertyDefinition { .. } => NodeType::PropertyDefinition,
            NodeKind::StaticBlock { .. } => NodeType::StaticBlock,
            NodeKind::Identifier { .. } => NodeType::Identifier,
            NodeKind::Literal { .. } => NodeType::Literal,
            NodeKind::ThisExpression => NodeType::ThisExpression,
            NodeKind::Super => NodeType::Super,
            NodeKind::ArrayExpression { .. } => NodeType::ArrayExpression,
            NodeKind::ObjectExpression { .. } => NodeType::ObjectExpression,
            NodeKind::Property { .. } => NodeType::Property,
            NodeKind::FunctionExpression { .. } => NodeType::FunctionExpression,
            NodeKind::ArrowFunctionExpression { .. } => NodeType::ArrowFunctionExpression,
            NodeKind::TemplateLiteral { .. } => NodeType::TemplateLiteral,
            NodeKind::TemplateElement { .. } => NodeType::TemplateElement,
            NodeKind::TaggedTemplateExpression { .. } => NodeType::TaggedTemplateExpression,
            NodeKind::UnaryExpression { .. } => NodeType::UnaryExpression,
            NodeKind::UpdateExpression { .. } => NodeType::UpdateExpression,
            NodeKind::BinaryExpression { .. } => NodeType::BinaryExpression,
            NodeKind::LogicalExpression { .. } => NodeType::LogicalExpression,
            NodeKind::AssignmentExpression { .. } => NodeType::AssignmentExpression,
            NodeKind::ConditionalExpression { .. } => NodeType::ConditionalExpression,
            NodeKind::CallExpression { .. } => NodeType::CallExpression,
            NodeKind::NewExpression { .. } => NodeType::NewExpression,
            NodeKind::MemberExpression { .. } => NodeType::MemberExpression,
            NodeKind::SequenceExpression { .. } => NodeType::SequenceExpression,
            NodeKind::SpreadElement { .. } => NodeType::SpreadElement,
            NodeKind::YieldExpression { .. } => NodeType::YieldExpression,
            NodeKind::AwaitExpression { .. } => NodeType::AwaitExpression,
            NodeKind::MetaProperty { .. } => NodeType::MetaProperty,
            NodeKind::ImportExpression { .. } => NodeType::ImportExpression,
            NodeKind::ArrayPattern { .. } => NodeType::ArrayPattern,
            NodeKind::ObjectPattern { .. } => NodeType::ObjectPattern,
            NodeKind::AssignmentPattern { .. } => NodeType::AssignmentPattern,
            NodeKind::RestElement { .. } => NodeType::RestElement,
            NodeKind::Raw { .. } => NodeType::Raw,
        }
    }

    /// Calls `f` for every child id together with the name of the field holding it.
    pub fn for_each_child(&self, mut f: impl FnMut(NodeId, &'static str)) {
        let mut visit = |c: &NodeId, key: &'static str| f(*c, key);
        each_child!(self, visit);
    }

    /// Calls `f` with a mutable reference to every child id, for remapping links.
    pub fn for_each_child_mut(&mut self, mut f: impl FnMut(&mut NodeId, &'static str)) {
        let mut visit = |c: &mut NodeId, key: &'static str| f(c, key);
        each_child!(self, visit);
    }

    /// Returns the child ids in field order.
    #[must_use]
    pub fn children(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.for_each_child(|c, _| out.push(c));
        out
    }

    /// Returns the statement list held by this node, if it is a statement container.
    #[must_use]
    pub fn statement_list(&self) -> Option<&[NodeId]> {
        match self {
            NodeKind::Program { body }
            | NodeKind::BlockStatement { body }
            | NodeKind::StaticBlock { body } => Some(body),
            NodeKind::SwitchCase { consequent, .. } => Some(consequent),
            _ => None,
        }
    }

    /// Returns a copy of this statement container holding `body` instead of its statements.
    #[must_use]
    pub fn with_statement_list(&self, body: Vec<NodeId>) -> Option<NodeKind> {
        match self {
            NodeKind::Program { .. } => Some(NodeKind::Program { body }),
            NodeKind::BlockStatement { .. } => Some(NodeKind::BlockStatement { body }),
            NodeKind::StaticBlock { .. } => Some(NodeKind::StaticBlock { body }),
            NodeKind::SwitchCase { test, .. } => Some(NodeKind::SwitchCase {
                test: *test,
                consequent: body,
            }),
            _ => None,
        }
    }

    /// Returns the identifier name if this is an `Identifier`.
    #[must_use]
    pub fn ident_name(&self) -> Option<&str> {
        match self {
            NodeKind::Identifier { name } => Some(name),
            _ => None,
        }
    }

    /// Returns the literal value if this is a `Literal`.
    #[must_use]
    pub fn literal(&self) -> Option<&LitValue> {
        match self {
            NodeKind::Literal { value } => Some(value),
            _ => None,
        }
    }

    /// Returns the string value if this is a string `Literal`.
    #[must_use]
    pub fn string_value(&self) -> Option<&str> {
        match self {
            NodeKind::Literal {
                value: LitValue::String(s),
            } => Some(s),
            _ => None,
        }
    }

    /// Returns `true` for function-like nodes (declarations, expressions and arrows).
    #[must_use]
    pub fn is_function(&self) -> bool {
        matches!(
            self,
            NodeKind::FunctionDeclaration { .. }
                | NodeKind::FunctionExpression { .. }
                | NodeKind::ArrowFunctionExpression { .. }
        )
    }

    /// Returns `true` for nodes that appear in statement position.
    #[must_use]
    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            NodeKind::ExpressionStatement { .. }
                | NodeKind::BlockStatement { .. }
                | NodeKind::EmptyStatement
                | NodeKind::DebuggerStatement
                | NodeKind::WithStatement { .. }
                | NodeKind::ReturnStatement { .. }
                | NodeKind::LabeledStatement { .. }
                | NodeKind::BreakStatement { .. }
                | NodeKind::ContinueStatement { .. }
                | NodeKind::IfStatement { .. }
                | NodeKind::SwitchStatement { .. }
                | NodeKind::ThrowStatement { .. }
                | NodeKind::TryStatement { .. }
                | NodeKind::WhileStatement { .. }
                | NodeKind::DoWhileStatement { .. }
                | NodeKind::ForStatement { .. }
                | NodeKind::ForInStatement { .. }
                | NodeKind::ForOfStatement { .. }
                | NodeKind::FunctionDeclaration { .. }
                | NodeKind::VariableDeclaration { .. }
                | NodeKind::ClassDeclaration { .. }
        )
    }
}

/// One arena slot: a node kind plus its links into the tree and the scope graph.
#[derive(Debug, Clone)]
pub struct Node {
    /// Identity of this node.
    pub id: NodeId,
    /// Kind and child links.
    pub kind: NodeKind,
    /// Parent link, `None` for the program root and detached nodes.
    pub parent: Option<NodeId>,
    /// Name of the parent field holding this node (`"callee"`, `"arguments"`, ...).
    pub parent_key: &'static str,
    /// Source range, `None` for nodes created after parsing.
    pub span: Option<Span>,
    /// For identifier references: the declaring identifier.
    pub decl: Option<NodeId>,
    /// For declaring identifiers: every identifier referencing the binding.
    pub references: Vec<NodeId>,
    /// Innermost scope enclosing this node.
    pub scope: Option<ScopeId>,
}

impl Node {
    /// Creates an unlinked node.
    #[must_use]
    pub fn new(id: NodeId, kind: NodeKind, span: Option<Span>) -> Self {
        Self {
            id,
            kind,
            parent: None,
            parent_key: "",
            span,
            decl: None,
            references: Vec::new(),
            scope: None,
        }
    }

    /// Returns the type tag of this node.
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_children_field_order() {
        let kind = NodeKind::IfStatement {
            test: NodeId(1),
            consequent: NodeId(2),
            alternate: Some(NodeId(3)),
        };
        let mut keys = Vec::new();
        kind.for_each_child(|c, k| keys.push((c, k)));
        assert_eq!(
            keys,
            vec![
                (NodeId(1), "test"),
                (NodeId(2), "consequent"),
                (NodeId(3), "alternate")
            ]
        );
    }

    #[test]
    fn test_children_mut_remaps() {
        let mut kind = NodeKind::ArrayExpression {
            elements: vec![Some(NodeId(4)), None, Some(NodeId(5))],
        };
        kind.for_each_child_mut(|c, _| c.0 += 10);
        assert_eq!(
            kind,
            NodeKind::ArrayExpression {
                elements: vec![Some(NodeId(14)), None, Some(NodeId(15))],
            }
        );
    }

    #[test]
    fn test_truthiness() {
        assert!(LitValue::String("a".into()).is_truthy());
        assert!(!LitValue::String(String::new()).is_truthy());
        assert!(!LitValue::Number(f64::NAN).is_truthy());
        assert!(!LitValue::Number(-0.0).is_truthy());
        assert!(LitValue::RegExp {
            pattern: "a".into(),
            flags: String::new()
        }
        .is_truthy());
        assert!(!LitValue::BigInt("0".into()).is_truthy());
        assert!(LitValue::BigInt("10".into()).is_truthy());
    }

    #[test]
    fn test_node_type_names() {
        let name: &'static str = NodeType::CallExpression.into();
        assert_eq!(name, "CallExpression");
        assert_eq!(VarKind::Const.to_string(), "const");
    }
}
