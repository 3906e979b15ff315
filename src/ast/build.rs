//! Constructors for synthetic nodes.
//!
//! Replacement subtrees are appended to the arena as detached nodes. They carry no span
//! and no scope information; both are recomputed when the edited script is re-parsed.

use crate::{
    ast::{
        node::{LitValue, NodeId, NodeKind, PropKind, VarKind},
        Ast,
    },
    Error, Result,
};

impl Ast {
    /// Creates an `Identifier`.
    pub fn ident(&mut self, name: &str) -> NodeId {
        self.add(NodeKind::Identifier {
            name: name.to_string(),
        })
    }

    /// Creates a literal node holding `value`.
    ///
    /// Negative numbers become a unary minus applied to the magnitude, matching what the
    /// parser produces for the printed form.
    pub fn literal(&mut self, value: LitValue) -> NodeId {
        match value {
            LitValue::Number(n) => self.number(n),
            value => self.add(NodeKind::Literal { value }),
        }
    }

    /// Creates a string literal.
    pub fn string(&mut self, value: &str) -> NodeId {
        self.add(NodeKind::Literal {
            value: LitValue::String(value.to_string()),
        })
    }

    /// Creates a numeric expression.
    ///
    /// `NaN` and `Infinity` are identifiers in JavaScript and are built as such.
    pub fn number(&mut self, value: f64) -> NodeId {
        if value.is_nan() {
            return self.ident("NaN");
        }
        let magnitude = if value.is_infinite() {
            self.ident("Infinity")
        } else {
            self.add(NodeKind::Literal {
                value: LitValue::Number(value.abs()),
            })
        };
        if value.is_sign_negative() {
            self.unary("-", magnitude)
        } else {
            magnitude
        }
    }

    /// Creates a boolean literal.
    pub fn boolean(&mut self, value: bool) -> NodeId {
        self.add(NodeKind::Literal {
            value: LitValue::Boolean(value),
        })
    }

    /// Creates `null`.
    pub fn null(&mut self) -> NodeId {
        self.add(NodeKind::Literal {
            value: LitValue::Null,
        })
    }

    /// Creates the `undefined` identifier.
    pub fn undefined(&mut self) -> NodeId {
        self.ident("undefined")
    }

    /// Creates a prefix unary expression.
    pub fn unary(&mut self, operator: &'static str, argument: NodeId) -> NodeId {
        self.add(NodeKind::UnaryExpression { operator, argument })
    }

    /// Creates a binary expression.
    pub fn binary(&mut self, operator: &'static str, left: NodeId, right: NodeId) -> NodeId {
        self.add(NodeKind::BinaryExpression {
            operator,
            left,
            right,
        })
    }

    /// Creates a call expression.
    pub fn call(&mut self, callee: NodeId, arguments: Vec<NodeId>) -> NodeId {
        self.add(NodeKind::CallExpression {
            callee,
            arguments,
            optional: false,
        })
    }

    /// Creates `object.name`.
    pub fn member(&mut self, object: NodeId, name: &str) -> NodeId {
        let property = self.ident(name);
        self.add(NodeKind::MemberExpression {
            object,
            property,
            computed: false,
            optional: false,
        })
    }

    /// Creates `object[property]`.
    pub fn computed_member(&mut self, object: NodeId, property: NodeId) -> NodeId {
        self.add(NodeKind::MemberExpression {
            object,
            property,
            computed: true,
            optional: false,
        })
    }

    /// Creates a sequence expression.
    pub fn sequence(&mut self, expressions: Vec<NodeId>) -> NodeId {
        self.add(NodeKind::SequenceExpression { expressions })
    }

    /// Creates an array literal without holes.
    pub fn array(&mut self, elements: Vec<NodeId>) -> NodeId {
        self.add(NodeKind::ArrayExpression {
            elements: elements.into_iter().map(Some).collect(),
        })
    }

    /// Creates an object literal.
    pub fn object(&mut self, properties: Vec<NodeId>) -> NodeId {
        self.add(NodeKind::ObjectExpression { properties })
    }

    /// Creates a `key: value` property. Keys that are not valid identifiers are quoted.
    ///
    /// `__proto__` is emitted as a computed key; a plain one would set the prototype
    /// instead of defining an own property.
    pub fn property(&mut self, key: &str, value: NodeId) -> NodeId {
        let computed = key == "__proto__";
        let key = if is_identifier_name(key) && !computed {
            self.ident(key)
        } else {
            self.string(key)
        };
        self.add(NodeKind::Property {
            key,
            value,
            kind: PropKind::Init,
            computed,
            shorthand: false,
            method: false,
        })
    }

    /// Creates an anonymous function expression.
    pub fn func_expr(&mut self, params: Vec<NodeId>, body: NodeId) -> NodeId {
        self.add(NodeKind::FunctionExpression {
            id: None,
            params,
            body,
            is_async: false,
            is_generator: false,
        })
    }

    /// Wraps an expression in an `ExpressionStatement`.
    pub fn expr_stmt(&mut self, expression: NodeId) -> NodeId {
        self.add(NodeKind::ExpressionStatement { expression })
    }

    /// Creates a block statement.
    pub fn block(&mut self, body: Vec<NodeId>) -> NodeId {
        self.add(NodeKind::BlockStatement { body })
    }

    /// Creates `return argument;`.
    pub fn return_stmt(&mut self, argument: Option<NodeId>) -> NodeId {
        self.add(NodeKind::ReturnStatement { argument })
    }

    /// Creates an `if` statement.
    pub fn if_stmt(&mut self, test: NodeId, consequent: NodeId, alternate: Option<NodeId>) -> NodeId {
        self.add(NodeKind::IfStatement {
            test,
            consequent,
            alternate,
        })
    }

    /// Creates a single-declarator declaration `kind name = init;`.
    pub fn var_decl(&mut self, kind: VarKind, name: &str, init: Option<NodeId>) -> NodeId {
        let id = self.ident(name);
        let declarator = self.add(NodeKind::VariableDeclarator { id, init });
        self.add(NodeKind::VariableDeclaration {
            kind,
            declarations: vec![declarator],
        })
    }

    /// Parses a statement list and imports it as detached nodes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if `source` is not a valid statement list.
    pub fn parse_fragment(&mut self, source: &str) -> Result<Vec<NodeId>> {
        let fragment = Ast::parse(source)?;
        let body = fragment
            .kind(fragment.root())
            .statement_list()
            .map(<[NodeId]>::to_vec)
            .unwrap_or_default();
        Ok(body
            .into_iter()
            .map(|stmt| self.import_subtree(&fragment, stmt))
            .collect())
    }

    /// Parses a single expression and imports it as a detached node.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if `source` is not exactly one expression.
    pub fn parse_expression(&mut self, source: &str) -> Result<NodeId> {
        let fragment = Ast::parse(&format!("(\n{source}\n);"))?;
        let body = fragment
            .kind(fragment.root())
            .statement_list()
            .unwrap_or_default();
        match body {
            [stmt] => match fragment.kind(*stmt) {
                NodeKind::ExpressionStatement { expression } => {
                    Ok(self.import_subtree(&fragment, *expression))
                }
                _ => Err(Error::Parse {
                    message: "not an expression".to_string(),
                    offset: 0,
                }),
            },
            _ => Err(Error::Parse {
                message: format!("expected one expression, found {} statements", body.len()),
                offset: 0,
            }),
        }
    }
}

const RESERVED: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete",
    "do", "else", "export", "extends", "false", "finally", "for", "function", "if", "import",
    "in", "instanceof", "new", "null", "return", "super", "switch", "this", "throw", "true",
    "try", "typeof", "var", "void", "while", "with", "yield", "let", "static", "enum", "await",
];

/// Returns `true` if `name` can be written as a bare identifier.
#[must_use]
pub fn is_identifier_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_alphabetic() || first == '_' || first == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        && !RESERVED.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbers() -> crate::Result<()> {
        let mut ast = Ast::parse("")?;
        let neg = ast.number(-2.5);
        let nan = ast.number(f64::NAN);
        let inf = ast.number(f64::NEG_INFINITY);
        assert_eq!(ast.text(neg), "-2.5");
        assert_eq!(ast.text(nan), "NaN");
        assert_eq!(ast.text(inf), "-Infinity");
        Ok(())
    }

    #[test]
    fn test_fragment() -> crate::Result<()> {
        let mut ast = Ast::parse("x;")?;
        let stmts = ast.parse_fragment("a(); var b = 1;")?;
        assert_eq!(stmts.len(), 2);
        let block = ast.block(stmts);
        assert_eq!(ast.text(block), "{\n  a();\n  var b = 1;\n}");
        Ok(())
    }

    #[test]
    fn test_expression() -> crate::Result<()> {
        let mut ast = Ast::parse("")?;
        let obj = ast.parse_expression("{a: 1}")?;
        assert_eq!(ast.node_type(obj), crate::ast::NodeType::ObjectExpression);
        assert!(ast.parse_expression("a; b").is_err());
        Ok(())
    }

    #[test]
    fn test_property_keys() -> crate::Result<()> {
        let mut ast = Ast::parse("")?;
        let one = ast.number(1.0);
        let two = ast.number(2.0);
        let a = ast.property("a", one);
        let b = ast.property("b-c", two);
        let obj = ast.object(vec![a, b]);
        assert_eq!(ast.text(obj), "{\n  a: 1,\n  'b-c': 2\n}");
        assert!(!is_identifier_name("class"));
        Ok(())
    }
}
