//! Source printer.
//!
//! Emits normalized source for a subtree: two-space indentation, single-quoted
//! strings, one statement per line, multi-line arrays and objects once they hold more
//! than one element. Parentheses are derived from operator precedence rather than kept
//! from the input.
//!
//! The printer optionally takes a substitution map. A [`Substitution::Replace`] prints
//! another node in place of the target, a [`Substitution::Delete`] drops the target
//! from the list holding it (or leaves an optional slot empty). This is how staged
//! rewrites are committed without mutating the tree.

use std::collections::{HashMap, HashSet};

use crate::ast::{
    node::{LitValue, MethodKind, NodeId, NodeKind, PropKind},
    Ast,
};

const INDENT: &str = "  ";

/// Staged change for one node, applied while printing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Substitution {
    /// Print the given node instead of the target.
    Replace(NodeId),
    /// Omit the target.
    Delete,
}

mod prec {
    pub const SEQUENCE: u8 = 0;
    pub const YIELD: u8 = 1;
    pub const ASSIGNMENT: u8 = 1;
    pub const CONDITIONAL: u8 = 2;
    pub const ARROW: u8 = 2;
    pub const COALESCE: u8 = 3;
    pub const LOGICAL_OR: u8 = 4;
    pub const LOGICAL_AND: u8 = 5;
    pub const BITWISE_OR: u8 = 6;
    pub const BITWISE_XOR: u8 = 7;
    pub const BITWISE_AND: u8 = 8;
    pub const EQUALITY: u8 = 9;
    pub const RELATIONAL: u8 = 10;
    pub const SHIFT: u8 = 11;
    pub const ADDITIVE: u8 = 12;
    pub const MULTIPLICATIVE: u8 = 13;
    pub const EXPONENTIATION: u8 = 14;
    pub const UNARY: u8 = 15;
    pub const POSTFIX: u8 = 16;
    pub const CALL: u8 = 18;
    pub const NEW: u8 = 19;
    pub const TAGGED_TEMPLATE: u8 = 20;
    pub const MEMBER: u8 = 21;
    pub const PRIMARY: u8 = 22;
}

/// Precedence of a binary or logical operator.
#[must_use]
pub fn binary_precedence(operator: &str) -> u8 {
    match operator {
        "??" => prec::COALESCE,
        "||" => prec::LOGICAL_OR,
        "&&" => prec::LOGICAL_AND,
        "|" => prec::BITWISE_OR,
        "^" => prec::BITWISE_XOR,
        "&" => prec::BITWISE_AND,
        "==" | "!=" | "===" | "!==" => prec::EQUALITY,
        "<" | ">" | "<=" | ">=" | "in" | "instanceof" => prec::RELATIONAL,
        "<<" | ">>" | ">>>" => prec::SHIFT,
        "+" | "-" => prec::ADDITIVE,
        "*" | "/" | "%" => prec::MULTIPLICATIVE,
        "**" => prec::EXPONENTIATION,
        _ => prec::SEQUENCE,
    }
}

/// Prints the subtree rooted at `id`.
#[must_use]
pub fn print_node(ast: &Ast, id: NodeId) -> String {
    let mut printer = Printer::new(ast, None);
    printer.any(id);
    printer.out
}

/// Prints the whole tree with substitutions applied.
///
/// Returns the printed text and the set of substitution targets that were actually
/// reached. Targets inside a replaced or deleted subtree are never reached.
#[must_use]
pub fn print_with(
    ast: &Ast,
    substitutions: &HashMap<NodeId, Substitution>,
) -> (String, HashSet<NodeId>) {
    let mut printer = Printer::new(ast, Some(substitutions));
    printer.any(ast.root());
    (printer.out, printer.emitted)
}

/// Formats a number the way `Number.prototype.toString` does.
///
/// The sign is ignored; negative values are printed as unary minus by the caller.
#[must_use]
pub fn js_number(value: f64) -> String {
    let value = value.abs();
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return "Infinity".to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }

    // Shortest round-trip digits and decimal exponent.
    let sci = format!("{value:e}");
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    let exp: i32 = exp.parse().unwrap_or(0);
    let k = digits.len() as i32;
    let n = exp + 1;

    if k <= n && n <= 21 {
        let mut s = digits;
        s.extend(std::iter::repeat('0').take((n - k) as usize));
        s
    } else if 0 < n && n <= 21 {
        format!("{}.{}", &digits[..n as usize], &digits[n as usize..])
    } else if -6 < n && n <= 0 {
        format!("0.{}{}", "0".repeat((-n) as usize), digits)
    } else {
        let sign = if n - 1 < 0 { '-' } else { '+' };
        let (first, rest) = digits.split_at(1);
        if rest.is_empty() {
            format!("{first}e{sign}{}", (n - 1).abs())
        } else {
            format!("{first}.{rest}e{sign}{}", (n - 1).abs())
        }
    }
}

/// Quotes a string literal with single quotes, escaping what must be escaped.
#[must_use]
pub fn quote_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\u{b}' => out.push_str("\\x0B"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            '\0' if !chars.peek().is_some_and(char::is_ascii_digit) => out.push_str("\\0"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02X}", c as u32));
            }
            c if (c as u32) > 0x7e && !c.is_alphanumeric() => {
                let mut buf = [0u16; 2];
                for unit in c.encode_utf16(&mut buf) {
                    out.push_str(&format!("\\u{unit:04X}"));
                }
            }
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn starts_with_word(text: &str, word: &str) -> bool {
    text.strip_prefix(word).is_some_and(|rest| {
        !rest
            .chars()
            .next()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$')
    })
}

struct Printer<'a> {
    ast: &'a Ast,
    substitutions: Option<&'a HashMap<NodeId, Substitution>>,
    out: String,
    indent: usize,
    active: HashSet<NodeId>,
    emitted: HashSet<NodeId>,
}

impl<'a> Printer<'a> {
    fn new(ast: &'a Ast, substitutions: Option<&'a HashMap<NodeId, Substitution>>) -> Self {
        Self {
            ast,
            substitutions,
            out: String::new(),
            indent: 0,
            active: HashSet::new(),
            emitted: HashSet::new(),
        }
    }

    fn kind(&self, id: NodeId) -> &'a NodeKind {
        let ast: &'a Ast = self.ast;
        ast.kind(id)
    }

    fn lookup(&self, id: NodeId) -> Option<Substitution> {
        if self.active.contains(&id) {
            return None;
        }
        self.substitutions?.get(&id).copied()
    }

    fn push(&mut self, s: &str) {
        self.out.push_str(s);
    }

    fn newline(&mut self) {
        self.out.push('\n');
        for _ in 0..self.indent {
            self.out.push_str(INDENT);
        }
    }

    fn capture(&mut self, f: impl FnOnce(&mut Self)) -> String {
        let saved = std::mem::take(&mut self.out);
        f(self);
        std::mem::replace(&mut self.out, saved)
    }

    /// Prints a replacement for `target`, guarding against the replacement containing
    /// the target itself.
    fn replaced(&mut self, target: NodeId, with: NodeId, f: impl FnOnce(&mut Self, NodeId)) {
        self.emitted.insert(target);
        self.active.insert(target);
        f(self, with);
        self.active.remove(&target);
    }

    /// Returns `true` if the node disappears from the list holding it.
    fn vanishes(&mut self, id: NodeId) -> bool {
        match self.lookup(id) {
            Some(Substitution::Delete) => {
                self.emitted.insert(id);
                true
            }
            Some(Substitution::Replace(with)) => {
                self.active.insert(id);
                let gone = self.vanishes(with);
                self.active.remove(&id);
                if gone {
                    self.emitted.insert(id);
                }
                gone
            }
            None => {
                if let NodeKind::VariableDeclaration { declarations, .. } = self.kind(id) {
                    if declarations.is_empty() {
                        return false;
                    }
                    let all_deleted = declarations
                        .iter()
                        .all(|d| self.lookup(*d) == Some(Substitution::Delete));
                    if all_deleted {
                        self.emitted.extend(declarations.iter().copied());
                    }
                    return all_deleted;
                }
                false
            }
        }
    }

    fn kept(&mut self, items: &[NodeId]) -> Vec<NodeId> {
        items
            .iter()
            .copied()
            .filter(|id| !self.vanishes(*id))
            .collect()
    }

    /// Prints a node whose syntactic category is decided by its own kind.
    fn any(&mut self, id: NodeId) {
        let kind = self.kind(id);
        if kind.is_statement() || matches!(kind, NodeKind::Program { .. }) {
            self.stmt(id);
        } else {
            self.expr(id, prec::SEQUENCE);
        }
    }

    // Statements

    fn stmt(&mut self, id: NodeId) {
        match self.lookup(id) {
            Some(Substitution::Replace(with)) => self.replaced(id, with, Self::stmt),
            Some(Substitution::Delete) => {
                self.emitted.insert(id);
                self.push(";");
            }
            None => self.stmt_kind(id),
        }
    }

    fn statements(&mut self, body: &[NodeId]) {
        let kept = self.kept(body);
        for (i, s) in kept.iter().enumerate() {
            if i > 0 {
                self.newline();
            }
            self.stmt(*s);
        }
    }

    fn block_body(&mut self, body: &[NodeId]) {
        self.push("{");
        let kept = self.kept(body);
        self.indent += 1;
        for s in &kept {
            self.newline();
            self.stmt(*s);
        }
        self.indent -= 1;
        self.newline();
        self.push("}");
    }

    fn block(&mut self, id: NodeId) {
        match self.lookup(id) {
            Some(Substitution::Replace(with)) => self.replaced(id, with, Self::block),
            Some(Substitution::Delete) => {
                self.emitted.insert(id);
                self.push("{\n}");
            }
            None => match self.kind(id) {
                NodeKind::BlockStatement { body } => self.block_body(body),
                _ => self.stmt_kind(id),
            },
        }
    }

    fn resolved_kind(&self, id: NodeId) -> Option<&'a NodeKind> {
        match self.lookup(id) {
            Some(Substitution::Replace(with)) => Some(self.kind(with)),
            Some(Substitution::Delete) => None,
            None => Some(self.kind(id)),
        }
    }

    /// Prints the body of an `if`/loop: blocks stay on the line, other statements go
    /// on their own indented line. Returns `true` if the body was a block.
    fn nested_body(&mut self, id: NodeId) -> bool {
        if matches!(self.resolved_kind(id), Some(NodeKind::BlockStatement { .. })) {
            self.push(" ");
            self.stmt(id);
            true
        } else {
            self.indent += 1;
            self.newline();
            self.stmt(id);
            self.indent -= 1;
            false
        }
    }

    fn opt_expr_slot(&mut self, id: Option<NodeId>) -> Option<NodeId> {
        let id = id?;
        match self.lookup(id) {
            Some(Substitution::Delete) => {
                self.emitted.insert(id);
                None
            }
            _ => Some(id),
        }
    }

    fn stmt_kind(&mut self, id: NodeId) {
        let ast = self.ast;
        match ast.kind(id) {
            NodeKind::Program { body } => self.statements(body),
            NodeKind::BlockStatement { body } => self.block_body(body),
            NodeKind::StaticBlock { body } => {
                self.push("static ");
                self.block_body(body);
            }
            NodeKind::ExpressionStatement { expression } => {
                let text = self.capture(|p| p.expr(*expression, prec::SEQUENCE));
                let wrap = text.starts_with('{')
                    || starts_with_word(&text, "function")
                    || starts_with_word(&text, "class")
                    || text.starts_with("let[")
                    || text.starts_with("let [")
                    || text.starts_with("async function");
                if wrap {
                    self.push("(");
                    self.push(&text);
                    self.push(")");
                } else {
                    self.push(&text);
                }
                self.push(";");
            }
            NodeKind::EmptyStatement => self.push(";"),
            NodeKind::DebuggerStatement => self.push("debugger;"),
            NodeKind::WithStatement { object, body } => {
                self.push("with (");
                self.expr(*object, prec::SEQUENCE);
                self.push(")");
                self.nested_body(*body);
            }
            NodeKind::ReturnStatement { argument } => {
                self.push("return");
                if let Some(arg) = self.opt_expr_slot(*argument) {
                    self.push(" ");
                    self.expr(arg, prec::SEQUENCE);
                }
                self.push(";");
            }
            NodeKind::LabeledStatement { label, body } => {
                self.expr(*label, prec::PRIMARY);
                self.push(": ");
                self.stmt(*body);
            }
            NodeKind::BreakStatement { label } | NodeKind::ContinueStatement { label } => {
                self.push(if matches!(ast.kind(id), NodeKind::BreakStatement { .. }) {
                    "break"
                } else {
                    "continue"
                });
                if let Some(label) = label {
                    self.push(" ");
                    self.expr(*label, prec::PRIMARY);
                }
                self.push(";");
            }
            NodeKind::IfStatement {
                test,
                consequent,
                alternate,
            } => self.if_stmt(*test, *consequent, *alternate),
            NodeKind::SwitchStatement {
                discriminant,
                cases,
            } => {
                self.push("switch (");
                self.expr(*discriminant, prec::SEQUENCE);
                self.push(") {");
                let kept = self.kept(cases);
                for case in kept {
                    self.newline();
                    self.stmt(case);
                }
                self.newline();
                self.push("}");
            }
            NodeKind::SwitchCase { test, consequent } => {
                match test {
                    Some(t) => {
                        self.push("case ");
                        self.expr(*t, prec::SEQUENCE);
                        self.push(":");
                    }
                    None => self.push("default:"),
                }
                let kept = self.kept(consequent);
                let mut rest = kept.as_slice();
                if let Some((first, tail)) = kept.split_first() {
                    if matches!(self.resolved_kind(*first), Some(NodeKind::BlockStatement { .. }))
                    {
                        self.push(" ");
                        self.stmt(*first);
                        rest = tail;
                    }
                }
                self.indent += 1;
                for s in rest {
                    self.newline();
                    self.stmt(*s);
                }
                self.indent -= 1;
            }
            NodeKind::ThrowStatement { argument } => {
                self.push("throw ");
                self.expr(*argument, prec::SEQUENCE);
                self.push(";");
            }
            NodeKind::TryStatement {
                block,
                handler,
                finalizer,
            } => {
                self.push("try ");
                self.block(*block);
                if let Some(h) = self.opt_expr_slot(*handler) {
                    self.push(" ");
                    self.stmt(h);
                }
                if let Some(f) = self.opt_expr_slot(*finalizer) {
                    self.push(" finally ");
                    self.block(f);
                }
            }
            NodeKind::CatchClause { param, body } => {
                self.push("catch ");
                if let Some(p) = self.opt_expr_slot(*param) {
                    self.push("(");
                    self.pattern(p);
                    self.push(") ");
                }
                self.block(*body);
            }
            NodeKind::WhileStatement { test, body } => {
                self.push("while (");
                self.expr(*test, prec::SEQUENCE);
                self.push(")");
                self.nested_body(*body);
            }
            NodeKind::DoWhileStatement { body, test } => {
                self.push("do");
                if self.nested_body(*body) {
                    self.push(" ");
                } else {
                    self.newline();
                }
                self.push("while (");
                self.expr(*test, prec::SEQUENCE);
                self.push(");");
            }
            NodeKind::ForStatement {
                init,
                test,
                update,
                body,
            } => {
                self.push("for (");
                if let Some(init) = self.opt_expr_slot(*init) {
                    self.for_head(init);
                }
                self.push(";");
                if let Some(test) = self.opt_expr_slot(*test) {
                    self.push(" ");
                    self.expr(test, prec::SEQUENCE);
                }
                self.push(";");
                if let Some(update) = self.opt_expr_slot(*update) {
                    self.push(" ");
                    self.expr(update, prec::SEQUENCE);
                }
                self.push(")");
                self.nested_body(*body);
            }
            NodeKind::ForInStatement { left, right, body }
            | NodeKind::ForOfStatement {
                left, right, body, ..
            } => {
                let (keyword, is_await) = match ast.kind(id) {
                    NodeKind::ForOfStatement { is_await, .. } => ("of", *is_await),
                    _ => ("in", false),
                };
                self.push(if is_await { "for await (" } else { "for (" });
                self.for_head(*left);
                self.push(" ");
                self.push(keyword);
                self.push(" ");
                self.expr(*right, prec::ASSIGNMENT);
                self.push(")");
                self.nested_body(*body);
            }
            NodeKind::VariableDeclaration { .. } => {
                self.var_decl(id);
                self.push(";");
            }
            NodeKind::FunctionDeclaration {
                id: name,
                params,
                body,
                is_async,
                is_generator,
            } => self.function(*name, params, *body, *is_async, *is_generator),
            NodeKind::ClassDeclaration {
                id: name,
                super_class,
                body,
            } => self.class(*name, *super_class, *body),
            NodeKind::Raw { text } => self.push(text),
            NodeKind::VariableDeclarator { .. } => self.declarator(id),
            NodeKind::MethodDefinition { .. } | NodeKind::PropertyDefinition { .. } => {
                self.class_member(id);
            }
            NodeKind::ClassBody { body } => {
                self.push("{");
                let kept = self.kept(body);
                self.indent += 1;
                for m in kept {
                    self.newline();
                    self.class_member(m);
                }
                self.indent -= 1;
                self.newline();
                self.push("}");
            }
            _ => {
                // An expression in statement position (a replacement of a statement).
                let text = self.capture(|p| p.expr(id, prec::SEQUENCE));
                let wrap = text.starts_with('{')
                    || starts_with_word(&text, "function")
                    || starts_with_word(&text, "class");
                if wrap {
                    self.push("(");
                    self.push(&text);
                    self.push(")");
                } else {
                    self.push(&text);
                }
                self.push(";");
            }
        }
    }

    fn if_stmt(&mut self, test: NodeId, consequent: NodeId, alternate: Option<NodeId>) {
        self.push("if (");
        self.expr(test, prec::SEQUENCE);
        self.push(")");
        let block = self.nested_body(consequent);
        let Some(alt) = self.opt_expr_slot(alternate) else {
            return;
        };
        if block {
            self.push(" else");
        } else {
            self.newline();
            self.push("else");
        }
        match self.resolved_kind(alt) {
            Some(NodeKind::IfStatement { .. }) => {
                self.push(" ");
                self.stmt(alt);
            }
            _ => {
                self.nested_body(alt);
            }
        }
    }

    fn for_head(&mut self, id: NodeId) {
        match self.resolved_kind(id) {
            Some(NodeKind::VariableDeclaration { .. }) => match self.lookup(id) {
                Some(Substitution::Replace(with)) => self.replaced(id, with, Self::var_decl),
                _ => self.var_decl(id),
            },
            _ => self.pattern(id),
        }
    }

    fn var_decl(&mut self, id: NodeId) {
        let NodeKind::VariableDeclaration { kind, declarations } = self.kind(id) else {
            self.expr(id, prec::SEQUENCE);
            return;
        };
        let kind: &'static str = (*kind).into();
        self.push(kind);
        self.push(" ");
        let kept = self.kept(declarations);
        for (i, d) in kept.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.declarator(*d);
        }
    }

    fn declarator(&mut self, id: NodeId) {
        match self.lookup(id) {
            Some(Substitution::Replace(with)) => self.replaced(id, with, Self::declarator),
            Some(Substitution::Delete) => {
                self.emitted.insert(id);
            }
            None => match self.kind(id) {
                NodeKind::VariableDeclarator { id: target, init } => {
                    self.pattern(*target);
                    if let Some(init) = self.opt_expr_slot(*init) {
                        self.push(" = ");
                        self.expr(init, prec::ASSIGNMENT);
                    }
                }
                _ => self.expr(id, prec::ASSIGNMENT),
            },
        }
    }

    fn function(
        &mut self,
        name: Option<NodeId>,
        params: &[NodeId],
        body: NodeId,
        is_async: bool,
        is_generator: bool,
    ) {
        if is_async {
            self.push("async ");
        }
        self.push("function");
        if is_generator {
            self.push("*");
        }
        match name {
            Some(n) => {
                self.push(" ");
                self.expr(n, prec::PRIMARY);
            }
            None => self.push(" "),
        }
        self.params(params);
        self.push(" ");
        self.block(body);
    }

    fn params(&mut self, params: &[NodeId]) {
        self.push("(");
        let kept = self.kept(params);
        for (i, p) in kept.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.pattern(*p);
        }
        self.push(")");
    }

    fn class(&mut self, name: Option<NodeId>, super_class: Option<NodeId>, body: NodeId) {
        self.push("class");
        if let Some(n) = name {
            self.push(" ");
            self.expr(n, prec::PRIMARY);
        }
        if let Some(sc) = self.opt_expr_slot(super_class) {
            self.push(" extends ");
            self.expr(sc, prec::CALL);
        }
        self.push(" ");
        let members = match self.kind(body) {
            NodeKind::ClassBody { body } => body.as_slice(),
            _ => &[],
        };
        self.push("{");
        let kept = self.kept(members);
        self.indent += 1;
        for m in kept {
            self.newline();
            self.class_member(m);
        }
        self.indent -= 1;
        self.newline();
        self.push("}");
    }

    fn class_member(&mut self, id: NodeId) {
        match self.lookup(id) {
            Some(Substitution::Replace(with)) => {
                self.replaced(id, with, Self::class_member);
                return;
            }
            Some(Substitution::Delete) => {
                self.emitted.insert(id);
                return;
            }
            None => {}
        }
        match self.kind(id) {
            NodeKind::MethodDefinition {
                key,
                value,
                kind,
                computed,
                is_static,
            } => {
                if *is_static {
                    self.push("static ");
                }
                let prefix = match kind {
                    MethodKind::Get => Some(PropKind::Get),
                    MethodKind::Set => Some(PropKind::Set),
                    _ => None,
                };
                self.method(*key, *value, *computed, prefix);
            }
            NodeKind::PropertyDefinition {
                key,
                value,
                computed,
                is_static,
            } => {
                if *is_static {
                    self.push("static ");
                }
                self.property_key(*key, *computed);
                if let Some(v) = self.opt_expr_slot(*value) {
                    self.push(" = ");
                    self.expr(v, prec::ASSIGNMENT);
                }
                self.push(";");
            }
            NodeKind::StaticBlock { .. } | NodeKind::Raw { .. } => self.stmt_kind(id),
            _ => self.any(id),
        }
    }

    /// Prints `[get |set ][async ][*]key(params) body`.
    fn method(&mut self, key: NodeId, value: NodeId, computed: bool, prefix: Option<PropKind>) {
        match prefix {
            Some(PropKind::Get) => self.push("get "),
            Some(PropKind::Set) => self.push("set "),
            _ => {}
        }
        match self.resolved_kind(value) {
            Some(NodeKind::FunctionExpression {
                params,
                body,
                is_async,
                is_generator,
                ..
            }) => {
                if *is_async {
                    self.push("async ");
                }
                if *is_generator {
                    self.push("*");
                }
                self.property_key(key, computed);
                self.params(params);
                self.push(" ");
                self.block(*body);
            }
            _ => {
                self.property_key(key, computed);
                self.push(": ");
                self.expr(value, prec::ASSIGNMENT);
            }
        }
    }

    fn property_key(&mut self, key: NodeId, computed: bool) {
        if computed {
            self.push("[");
            self.expr(key, prec::ASSIGNMENT);
            self.push("]");
        } else {
            self.expr(key, prec::PRIMARY);
        }
    }

    // Patterns

    fn pattern(&mut self, id: NodeId) {
        match self.lookup(id) {
            Some(Substitution::Replace(with)) => self.replaced(id, with, Self::pattern),
            Some(Substitution::Delete) => {
                self.emitted.insert(id);
            }
            None => self.pattern_kind(id),
        }
    }

    fn pattern_kind(&mut self, id: NodeId) {
        let ast = self.ast;
        match ast.kind(id) {
            NodeKind::ArrayPattern { elements } => {
                self.push("[");
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    match e {
                        Some(e) => self.pattern(*e),
                        None if i + 1 == elements.len() => self.push(","),
                        None => {}
                    }
                }
                self.push("]");
            }
            NodeKind::ObjectPattern { properties } => {
                let kept = self.kept(properties);
                if kept.is_empty() {
                    self.push("{}");
                    return;
                }
                let multiline = if kept.len() == 1 {
                    matches!(ast.kind(kept[0]), NodeKind::Property { value, .. }
                        if !matches!(ast.kind(*value), NodeKind::Identifier { .. }))
                } else {
                    kept.iter().any(|p| {
                        matches!(ast.kind(*p), NodeKind::Property { shorthand, .. } if !shorthand)
                    })
                };
                self.push("{");
                if multiline {
                    self.indent += 1;
                }
                for (i, p) in kept.iter().enumerate() {
                    if i > 0 {
                        self.push(",");
                        if !multiline {
                            self.push(" ");
                        }
                    }
                    if multiline {
                        self.newline();
                    }
                    self.pattern_property(*p);
                }
                if multiline {
                    self.indent -= 1;
                    self.newline();
                }
                self.push("}");
            }
            NodeKind::AssignmentPattern { left, right } => {
                self.pattern(*left);
                self.push(" = ");
                self.expr(*right, prec::ASSIGNMENT);
            }
            NodeKind::RestElement { argument } => {
                self.push("...");
                self.pattern(*argument);
            }
            _ => self.expr(id, prec::CALL),
        }
    }

    fn pattern_property(&mut self, id: NodeId) {
        match self.kind(id) {
            NodeKind::Property {
                key,
                value,
                computed,
                ..
            } => {
                if self.is_shorthand_pair(*key, *value, *computed) {
                    self.pattern(*value);
                } else {
                    self.property_key(*key, *computed);
                    self.push(": ");
                    self.pattern(*value);
                }
            }
            _ => self.pattern(id),
        }
    }

    /// A property prints as shorthand when its value still carries the key's name.
    fn is_shorthand_pair(&self, key: NodeId, value: NodeId, computed: bool) -> bool {
        if computed {
            return false;
        }
        let Some(key_name) = self.resolved_kind(key).and_then(NodeKind::ident_name) else {
            return false;
        };
        match self.resolved_kind(value) {
            Some(NodeKind::Identifier { name }) => name == key_name,
            Some(NodeKind::AssignmentPattern { left, .. }) => {
                self.resolved_kind(*left).and_then(NodeKind::ident_name) == Some(key_name)
            }
            _ => false,
        }
    }

    // Expressions

    fn expr(&mut self, id: NodeId, precedence: u8) {
        match self.lookup(id) {
            Some(Substitution::Replace(with)) => {
                self.replaced(id, with, |p, w| p.expr(w, precedence));
            }
            Some(Substitution::Delete) => {
                self.emitted.insert(id);
                self.push("void 0");
            }
            None => self.expr_kind(id, precedence),
        }
    }

    fn own_precedence(kind: &NodeKind) -> u8 {
        match kind {
            NodeKind::SequenceExpression { .. } => prec::SEQUENCE,
            NodeKind::YieldExpression { .. } => prec::YIELD,
            NodeKind::AssignmentExpression { .. } => prec::ASSIGNMENT,
            NodeKind::ConditionalExpression { .. } => prec::CONDITIONAL,
            NodeKind::ArrowFunctionExpression { .. } => prec::ARROW,
            NodeKind::LogicalExpression { operator, .. }
            | NodeKind::BinaryExpression { operator, .. } => binary_precedence(operator),
            NodeKind::UnaryExpression { .. } | NodeKind::AwaitExpression { .. } => prec::UNARY,
            NodeKind::UpdateExpression { prefix: true, .. } => prec::UNARY,
            NodeKind::UpdateExpression { prefix: false, .. } => prec::POSTFIX,
            NodeKind::Literal {
                value: LitValue::Number(n),
            } if n.is_sign_negative() && *n != 0.0 => prec::UNARY,
            NodeKind::CallExpression { .. } | NodeKind::ImportExpression { .. } => prec::CALL,
            NodeKind::NewExpression { .. } => prec::NEW,
            NodeKind::TaggedTemplateExpression { .. } => prec::TAGGED_TEMPLATE,
            NodeKind::MemberExpression { .. } => prec::MEMBER,
            _ => prec::PRIMARY,
        }
    }

    fn expr_kind(&mut self, id: NodeId, precedence: u8) {
        let ast = self.ast;
        let kind = ast.kind(id);
        let wrap = Self::own_precedence(kind) < precedence;
        if wrap {
            self.push("(");
        }

        match kind {
            NodeKind::Identifier { name } => self.push(name),
            NodeKind::Literal { value } => self.literal(value),
            NodeKind::ThisExpression => self.push("this"),
            NodeKind::Super => self.push("super"),
            NodeKind::Raw { text } => self.push(text),
            NodeKind::MetaProperty { meta, property } => {
                self.push(meta);
                self.push(".");
                self.push(property);
            }
            NodeKind::ArrayExpression { elements } => self.array(elements),
            NodeKind::ObjectExpression { properties } => self.object(properties),
            NodeKind::Property { .. } => self.property(id),
            NodeKind::FunctionExpression {
                id: name,
                params,
                body,
                is_async,
                is_generator,
            }
            | NodeKind::FunctionDeclaration {
                id: name,
                params,
                body,
                is_async,
                is_generator,
            } => self.function(*name, params, *body, *is_async, *is_generator),
            NodeKind::ClassExpression {
                id: name,
                super_class,
                body,
            }
            | NodeKind::ClassDeclaration {
                id: name,
                super_class,
                body,
            } => self.class(*name, *super_class, *body),
            NodeKind::ArrowFunctionExpression {
                params,
                body,
                is_async,
                ..
            } => self.arrow(params, *body, *is_async),
            NodeKind::TemplateLiteral {
                quasis,
                expressions,
            } => self.template(quasis, expressions),
            NodeKind::TemplateElement { raw, .. } => self.push(raw),
            NodeKind::TaggedTemplateExpression { tag, quasi } => {
                self.expr(*tag, prec::CALL);
                self.expr(*quasi, prec::PRIMARY);
            }
            NodeKind::UnaryExpression { operator, argument } => {
                let arg = self.capture(|p| p.expr(*argument, prec::UNARY));
                self.push(operator);
                let word = operator.chars().all(|c| c.is_ascii_alphabetic());
                let clash = matches!(*operator, "-" | "+")
                    && arg.starts_with(operator.chars().next().unwrap_or(' '));
                if word || clash {
                    self.push(" ");
                }
                self.push(&arg);
            }
            NodeKind::UpdateExpression {
                operator,
                prefix,
                argument,
            } => {
                if *prefix {
                    self.push(operator);
                    self.expr(*argument, prec::UNARY);
                } else {
                    self.expr(*argument, prec::CALL);
                    self.push(operator);
                }
            }
            NodeKind::AwaitExpression { argument } => {
                self.push("await ");
                self.expr(*argument, prec::UNARY);
            }
            NodeKind::YieldExpression { argument, delegate } => {
                self.push("yield");
                if *delegate {
                    self.push("*");
                }
                if let Some(arg) = self.opt_expr_slot(*argument) {
                    self.push(" ");
                    self.expr(arg, prec::YIELD);
                }
            }
            NodeKind::BinaryExpression {
                operator,
                left,
                right,
            } => {
                let own = binary_precedence(operator);
                let (lp, rp) = if *operator == "**" {
                    (own + 1, own)
                } else {
                    (own, own + 1)
                };
                self.expr(*left, lp);
                self.push(" ");
                self.push(operator);
                self.push(" ");
                self.expr(*right, rp);
            }
            NodeKind::LogicalExpression {
                operator,
                left,
                right,
            } => {
                let own = binary_precedence(operator);
                self.logical_operand(*left, operator, own);
                self.push(" ");
                self.push(operator);
                self.push(" ");
                self.logical_operand(*right, operator, own + 1);
            }
            NodeKind::AssignmentExpression {
                operator,
                left,
                right,
            } => {
                self.pattern(*left);
                self.push(" ");
                self.push(operator);
                self.push(" ");
                self.expr(*right, prec::ASSIGNMENT);
            }
            NodeKind::ConditionalExpression {
                test,
                consequent,
                alternate,
            } => {
                self.expr(*test, prec::COALESCE);
                self.push(" ? ");
                self.expr(*consequent, prec::ASSIGNMENT);
                self.push(" : ");
                self.expr(*alternate, prec::ASSIGNMENT);
            }
            NodeKind::CallExpression {
                callee,
                arguments,
                optional,
            } => {
                self.expr(*callee, prec::CALL);
                if *optional {
                    self.push("?.");
                }
                self.arguments(arguments);
            }
            NodeKind::NewExpression { callee, arguments } => {
                self.push("new ");
                if self.has_call_in_chain(*callee) {
                    self.push("(");
                    self.expr(*callee, prec::SEQUENCE);
                    self.push(")");
                } else {
                    self.expr(*callee, prec::NEW);
                }
                self.arguments(arguments);
            }
            NodeKind::MemberExpression {
                object,
                property,
                computed,
                optional,
            } => {
                let obj = self.capture(|p| p.expr(*object, prec::CALL));
                self.push(&obj);
                let integer = !*computed
                    && matches!(self.resolved_kind(*object), Some(NodeKind::Literal { value: LitValue::Number(_) }))
                    && obj.chars().all(|c| c.is_ascii_digit());
                if integer {
                    self.push(" ");
                }
                if *computed {
                    self.push(if *optional { "?.[" } else { "[" });
                    self.expr(*property, prec::SEQUENCE);
                    self.push("]");
                } else {
                    self.push(if *optional { "?." } else { "." });
                    self.expr(*property, prec::PRIMARY);
                }
            }
            NodeKind::SequenceExpression { expressions } => {
                let kept = self.kept(expressions);
                for (i, e) in kept.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.expr(*e, prec::ASSIGNMENT);
                }
            }
            NodeKind::SpreadElement { argument } => {
                self.push("...");
                self.expr(*argument, prec::ASSIGNMENT);
            }
            NodeKind::ImportExpression { source } => {
                self.push("import(");
                self.expr(*source, prec::ASSIGNMENT);
                self.push(")");
            }
            NodeKind::ArrayPattern { .. }
            | NodeKind::ObjectPattern { .. }
            | NodeKind::AssignmentPattern { .. }
            | NodeKind::RestElement { .. } => self.pattern_kind(id),
            _ => self.stmt_kind(id),
        }

        if wrap {
            self.push(")");
        }
    }

    fn logical_operand(&mut self, id: NodeId, operator: &str, precedence: u8) {
        let mixes = match self.resolved_kind(id) {
            Some(NodeKind::LogicalExpression { operator: inner, .. }) => {
                (*inner == "??") != (operator == "??")
            }
            _ => false,
        };
        if mixes {
            self.push("(");
            self.expr(id, prec::SEQUENCE);
            self.push(")");
        } else {
            self.expr(id, precedence);
        }
    }

    fn has_call_in_chain(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            match self.resolved_kind(current) {
                Some(NodeKind::CallExpression { .. }) => return true,
                Some(NodeKind::MemberExpression { object, .. }) => current = *object,
                Some(NodeKind::TaggedTemplateExpression { tag, .. }) => current = *tag,
                _ => return false,
            }
        }
    }

    fn arguments(&mut self, arguments: &[NodeId]) {
        self.push("(");
        let kept = self.kept(arguments);
        for (i, a) in kept.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.expr(*a, prec::ASSIGNMENT);
        }
        self.push(")");
    }

    fn literal(&mut self, value: &LitValue) {
        match value {
            LitValue::String(s) => {
                let quoted = quote_string(s);
                self.push(&quoted);
            }
            LitValue::Number(n) => {
                if n.is_sign_negative() && *n != 0.0 {
                    self.push("-");
                }
                let text = js_number(*n);
                self.push(&text);
            }
            LitValue::Boolean(b) => self.push(if *b { "true" } else { "false" }),
            LitValue::Null => self.push("null"),
            LitValue::RegExp { pattern, flags } => {
                self.push("/");
                self.push(pattern);
                self.push("/");
                self.push(flags);
            }
            LitValue::BigInt(digits) => {
                self.push(digits);
                self.push("n");
            }
        }
    }

    fn array(&mut self, elements: &[Option<NodeId>]) {
        let kept: Vec<Option<NodeId>> = elements
            .iter()
            .copied()
            .filter(|e| e.map_or(true, |id| !self.vanishes(id)))
            .collect();
        if kept.is_empty() {
            self.push("[]");
            return;
        }
        let multiline = kept.len() > 1;
        self.push("[");
        if multiline {
            self.indent += 1;
        }
        for (i, e) in kept.iter().enumerate() {
            if multiline {
                self.newline();
            }
            match e {
                Some(e) => self.expr(*e, prec::ASSIGNMENT),
                None if i + 1 == kept.len() => self.push(","),
                None => {}
            }
            if i + 1 < kept.len() {
                self.push(",");
            }
        }
        if multiline {
            self.indent -= 1;
            self.newline();
        }
        self.push("]");
    }

    fn object(&mut self, properties: &[NodeId]) {
        let kept = self.kept(properties);
        match kept.as_slice() {
            [] => self.push("{}"),
            [single] => {
                self.indent += 1;
                let text = self.capture(|p| p.expr(*single, prec::ASSIGNMENT));
                self.indent -= 1;
                if text.contains('\n') {
                    self.push("{");
                    self.indent += 1;
                    self.newline();
                    self.push(&text);
                    self.indent -= 1;
                    self.newline();
                    self.push("}");
                } else {
                    self.push("{ ");
                    self.push(&text);
                    self.push(" }");
                }
            }
            many => {
                self.push("{");
                self.indent += 1;
                for (i, p) in many.iter().enumerate() {
                    self.newline();
                    self.expr(*p, prec::ASSIGNMENT);
                    if i + 1 < many.len() {
                        self.push(",");
                    }
                }
                self.indent -= 1;
                self.newline();
                self.push("}");
            }
        }
    }

    fn property(&mut self, id: NodeId) {
        let NodeKind::Property {
            key,
            value,
            kind,
            computed,
            method,
            ..
        } = self.kind(id)
        else {
            return;
        };
        match kind {
            PropKind::Get | PropKind::Set => self.method(*key, *value, *computed, Some(*kind)),
            PropKind::Init if *method => self.method(*key, *value, *computed, None),
            PropKind::Init => {
                if self.is_shorthand_pair(*key, *value, *computed)
                    && matches!(self.resolved_kind(*value), Some(NodeKind::Identifier { .. }))
                {
                    self.expr(*value, prec::PRIMARY);
                } else {
                    self.property_key(*key, *computed);
                    self.push(": ");
                    self.expr(*value, prec::ASSIGNMENT);
                }
            }
        }
    }

    fn arrow(&mut self, params: &[NodeId], body: NodeId, is_async: bool) {
        if is_async {
            self.push("async ");
        }
        let kept = self.kept(params);
        match kept.as_slice() {
            [single] if matches!(self.resolved_kind(*single), Some(NodeKind::Identifier { .. })) => {
                self.pattern(*single);
            }
            _ => self.params(&kept),
        }
        self.push(" => ");
        match self.resolved_kind(body) {
            Some(NodeKind::BlockStatement { .. }) => self.block(body),
            _ => {
                let text = self.capture(|p| p.expr(body, prec::ASSIGNMENT));
                if text.starts_with('{') {
                    self.push("(");
                    self.push(&text);
                    self.push(")");
                } else {
                    self.push(&text);
                }
            }
        }
    }

    fn template(&mut self, quasis: &[NodeId], expressions: &[NodeId]) {
        self.push("`");
        for (i, q) in quasis.iter().enumerate() {
            if let NodeKind::TemplateElement { raw, .. } = self.kind(*q) {
                self.push(raw);
            }
            if let Some(e) = expressions.get(i) {
                self.push("${");
                self.expr(*e, prec::SEQUENCE);
                self.push("}");
            }
        }
        self.push("`");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeType;

    fn roundtrip(src: &str) -> String {
        match Ast::parse(src) {
            Ok(ast) => ast.print(),
            Err(e) => panic!("parse failed: {e}"),
        }
    }

    #[test]
    fn test_number_format() {
        assert_eq!(js_number(1.0), "1");
        assert_eq!(js_number(0.5), "0.5");
        assert_eq!(js_number(123.456), "123.456");
        assert_eq!(js_number(1e21), "1e+21");
        assert_eq!(js_number(1.5e-7), "1.5e-7");
        assert_eq!(js_number(0.000001), "0.000001");
        assert_eq!(js_number(f64::NAN), "NaN");
        assert_eq!(js_number(100.0), "100");
    }

    #[test]
    fn test_quote_string() {
        assert_eq!(quote_string("it's"), "'it\\'s'");
        assert_eq!(quote_string("a\nb"), "'a\\nb'");
        assert_eq!(quote_string("h\u{e9}"), "'h\u{e9}'");
        assert_eq!(quote_string("\u{2028}"), "'\\u2028'");
    }

    #[test]
    fn test_statements() {
        assert_eq!(
            roundtrip("if (a) b(); else c();"),
            "if (a)\n  b();\nelse\n  c();"
        );
        assert_eq!(roundtrip("if(a){b()}"), "if (a) {\n  b();\n}");
        assert_eq!(roundtrip("function a(){return btoa}"), "function a() {\n  return btoa;\n}");
        assert_eq!(roundtrip("function a(){}"), "function a() {\n}");
        assert_eq!(roundtrip("for(;;){}"), "for (;;) {\n}");
        assert_eq!(
            roundtrip("switch(a){case 1:b();break;default:c()}"),
            "switch (a) {\ncase 1:\n  b();\n  break;\ndefault:\n  c();\n}"
        );
    }

    #[test]
    fn test_expressions() {
        assert_eq!(roundtrip("\"2\" + 3"), "'2' + 3;");
        assert_eq!(roundtrip("(a + b) * c"), "(a + b) * c;");
        assert_eq!(roundtrip("a - (b - c)"), "a - (b - c);");
        assert_eq!(roundtrip("-(-x)"), "- -x;");
        assert_eq!(roundtrip("typeof a"), "typeof a;");
        assert_eq!(roundtrip("x = [1,2]"), "x = [\n  1,\n  2\n];");
        assert_eq!(roundtrip("x = ['a']"), "x = ['a'];");
        assert_eq!(roundtrip("x = {a: 1}"), "x = { a: 1 };");
        assert_eq!(roundtrip("x = {a: 1, b}"), "x = {\n  a: 1,\n  b\n};");
        assert_eq!(roundtrip("(function(){})()"), "(function () {\n}());");
        assert_eq!(roundtrip("new (a())()"), "new (a())();");
        assert_eq!(roundtrip("a => a"), "a => a;");
        assert_eq!(roundtrip("() => ({})"), "() => ({});");
        assert_eq!(roundtrip("(a ?? b) || c"), "(a ?? b) || c;");
        assert_eq!(roundtrip("1..toString()"), "1 .toString();");
    }

    #[test]
    fn test_patterns() {
        assert_eq!(roundtrip("const {a, b} = c;"), "const {a, b} = c;");
        assert_eq!(roundtrip("const [a, b] = c;"), "const [a, b] = c;");
        assert_eq!(roundtrip("var a = 1, b;"), "var a = 1, b;");
    }

    #[test]
    fn test_substitutions() -> crate::Result<()> {
        let mut ast = Ast::parse("var a = 1, b = 2; f(a, b); g();")?;
        let calls = ast.nodes_of(NodeType::CallExpression).to_vec();
        let args: Vec<_> = ast
            .nodes_of(NodeType::Identifier)
            .iter()
            .copied()
            .filter(|id| ast.parent_key(*id) == "arguments")
            .collect();
        let lit = ast.number(3.0);
        let declarators = ast.nodes_of(NodeType::VariableDeclarator).to_vec();

        let mut subs = HashMap::new();
        subs.insert(args[0], Substitution::Replace(lit));
        subs.insert(args[1], Substitution::Delete);
        subs.insert(declarators[0], Substitution::Delete);
        subs.insert(declarators[1], Substitution::Delete);
        subs.insert(ast.parent(calls[1]).unwrap_or(calls[1]), Substitution::Delete);

        let (text, emitted) = print_with(&ast, &subs);
        assert_eq!(text, "f(3);");
        assert_eq!(emitted.len(), 5);
        Ok(())
    }

    #[test]
    fn test_replacement_containing_target() -> crate::Result<()> {
        let mut ast = Ast::parse("a;")?;
        let ident = ast.nodes_of(NodeType::Identifier)[0];
        let wrapper = ast.call(ident, Vec::new());
        let mut subs = HashMap::new();
        subs.insert(ident, Substitution::Replace(wrapper));
        let (text, _) = print_with(&ast, &subs);
        assert_eq!(text, "a();");
        Ok(())
    }
}
