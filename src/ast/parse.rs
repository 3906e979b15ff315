//! swc based front-end converting source text into arena nodes.
//!
//! Node ids are handed out in pre-order: the parent slot is reserved before its
//! children are converted, so id order matches source order. Constructs without an
//! ESTree counterpart in [`NodeKind`] become [`NodeKind::Raw`] and keep their source text.

use swc_common::{BytePos, Globals, Spanned, GLOBALS};
use swc_ecma_ast::{
    self as swc, AssignOp, AssignTarget, AssignTargetPat, BinaryOp, BlockStmtOrExpr, Callee,
    ClassMember, Decl, EsVersion, Expr, ForHead, Lit, MemberProp, MetaPropKind, ModuleItem,
    ObjectPatProp, OptChainBase, ParamOrTsParamProp, Pat, Program, Prop, PropName,
    PropOrSpread, SimpleAssignTarget, Stmt, SuperProp, UnaryOp, UpdateOp, VarDeclKind,
    VarDeclOrExpr,
};
use swc_ecma_parser::{lexer::Lexer, Parser, StringInput, Syntax};

use crate::{
    ast::node::{LitValue, MethodKind, Node, NodeId, NodeKind, PropKind, Span, VarKind},
    Error, Result,
};

/// Maximum nesting depth accepted by the converter.
const MAX_DEPTH: usize = 2048;

/// Parses `source` into a flat node list whose first entry is the `Program` node.
///
/// # Errors
///
/// Returns [`Error::Parse`] if swc rejects the input (including recoverable errors) and
/// [`Error::RecursionLimit`] for pathologically nested input.
pub(crate) fn parse_nodes(source: &str) -> Result<Vec<Node>> {
    GLOBALS.set(&Globals::new(), || {
        let program = parse_program(source)?;
        let mut converter = Converter {
            source,
            nodes: Vec::new(),
            depth: 0,
        };
        converter.program(&program)?;
        Ok(converter.nodes)
    })
}

fn parse_program(source: &str) -> Result<Program> {
    let end = u32::try_from(source.len())
        .map_err(|_| Error::Error("script exceeds 4 GiB".to_string()))?;
    let input = StringInput::new(source, BytePos(1), BytePos(1 + end));
    let lexer = Lexer::new(Syntax::Es(Default::default()), EsVersion::EsNext, input, None);
    let mut parser = Parser::new_from(lexer);

    let program = parser.parse_program().map_err(parse_error)?;
    if let Some(err) = parser.take_errors().into_iter().next() {
        return Err(parse_error(err));
    }
    Ok(program)
}

fn parse_error(err: swc_ecma_parser::error::Error) -> Error {
    Error::Parse {
        message: err.kind().msg().to_string(),
        offset: err.span().lo.0.saturating_sub(1) as usize,
    }
}

struct Converter<'a> {
    source: &'a str,
    nodes: Vec<Node>,
    depth: usize,
}

impl Converter<'_> {
    fn span(sp: swc_common::Span) -> Option<Span> {
        if sp.lo.0 == 0 && sp.hi.0 == 0 {
            None
        } else {
            Some(Span::new(sp.lo.0.saturating_sub(1), sp.hi.0.saturating_sub(1)))
        }
    }

    /// Reserves a slot so the parent id precedes its children.
    fn reserve(&mut self, sp: swc_common::Span) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes
            .push(Node::new(id, NodeKind::EmptyStatement, Self::span(sp)));
        id
    }

    fn finish(&mut self, id: NodeId, kind: NodeKind) -> NodeId {
        self.nodes[id.index()].kind = kind;
        id
    }

    fn leaf(&mut self, sp: swc_common::Span, kind: NodeKind) -> NodeId {
        let id = self.reserve(sp);
        self.finish(id, kind)
    }

    fn raw(&mut self, sp: swc_common::Span) -> NodeId {
        let text = Self::span(sp)
            .and_then(|s| self.source.get(s.start as usize..s.end as usize))
            .unwrap_or_default()
            .to_string();
        self.leaf(sp, NodeKind::Raw { text })
    }

    fn ident(&mut self, sp: swc_common::Span, sym: &str) -> NodeId {
        self.leaf(
            sp,
            NodeKind::Identifier {
                name: sym.to_string(),
            },
        )
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(Error::RecursionLimit(MAX_DEPTH));
        }
        Ok(())
    }

    fn program(&mut self, program: &Program) -> Result<NodeId> {
        let id = self.reserve(program.span());
        let mut body = Vec::new();
        match program {
            Program::Module(module) => {
                for item in &module.body {
                    body.push(match item {
                        ModuleItem::Stmt(stmt) => self.stmt(stmt)?,
                        ModuleItem::ModuleDecl(decl) => self.raw(decl.span()),
                    });
                }
            }
            Program::Script(script) => {
                for stmt in &script.body {
                    body.push(self.stmt(stmt)?);
                }
            }
        }
        Ok(self.finish(id, NodeKind::Program { body }))
    }

    fn stmts(&mut self, stmts: &[Stmt]) -> Result<Vec<NodeId>> {
        stmts.iter().map(|s| self.stmt(s)).collect()
    }

    fn block(&mut self, block: &swc::BlockStmt) -> Result<NodeId> {
        let id = self.reserve(block.span);
        let body = self.stmts(&block.stmts)?;
        Ok(self.finish(id, NodeKind::BlockStatement { body }))
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<NodeId> {
        self.enter()?;
        let result = self.stmt_inner(stmt);
        self.depth -= 1;
        result
    }

    fn stmt_inner(&mut self, stmt: &Stmt) -> Result<NodeId> {
        let id = match stmt {
            Stmt::Block(b) => return self.block(b),
            Stmt::Empty(e) => return Ok(self.leaf(e.span, NodeKind::EmptyStatement)),
            Stmt::Debugger(d) => return Ok(self.leaf(d.span, NodeKind::DebuggerStatement)),
            Stmt::Decl(decl) => return self.decl(decl),
            _ => self.reserve(stmt.span()),
        };

        let kind = match stmt {
            Stmt::With(w) => NodeKind::WithStatement {
                object: self.expr(&w.obj)?,
                body: self.stmt(&w.body)?,
            },
            Stmt::Return(r) => NodeKind::ReturnStatement {
                argument: self.opt_expr(r.arg.as_deref())?,
            },
            Stmt::Labeled(l) => NodeKind::LabeledStatement {
                label: self.ident(l.label.span, &l.label.sym),
                body: self.stmt(&l.body)?,
            },
            Stmt::Break(b) => NodeKind::BreakStatement {
                label: b.label.as_ref().map(|l| self.ident(l.span, &l.sym)),
            },
            Stmt::Continue(c) => NodeKind::ContinueStatement {
                label: c.label.as_ref().map(|l| self.ident(l.span, &l.sym)),
            },
            Stmt::If(i) => NodeKind::IfStatement {
                test: self.expr(&i.test)?,
                consequent: self.stmt(&i.cons)?,
                alternate: match &i.alt {
                    Some(alt) => Some(self.stmt(alt)?),
                    None => None,
                },
            },
            Stmt::Switch(s) => {
                let discriminant = self.expr(&s.discriminant)?;
                let mut cases = Vec::with_capacity(s.cases.len());
                for case in &s.cases {
                    let case_id = self.reserve(case.span);
                    let test = self.opt_expr(case.test.as_deref())?;
                    let consequent = self.stmts(&case.cons)?;
                    cases.push(self.finish(case_id, NodeKind::SwitchCase { test, consequent }));
                }
                NodeKind::SwitchStatement {
                    discriminant,
                    cases,
                }
            }
            Stmt::Throw(t) => NodeKind::ThrowStatement {
                argument: self.expr(&t.arg)?,
            },
            Stmt::Try(t) => {
                let block = self.block(&t.block)?;
                let handler = match &t.handler {
                    Some(clause) => {
                        let clause_id = self.reserve(clause.span);
                        let param = match &clause.param {
                            Some(p) => Some(self.pat(p)?),
                            None => None,
                        };
                        let body = self.block(&clause.body)?;
                        Some(self.finish(clause_id, NodeKind::CatchClause { param, body }))
                    }
                    None => None,
                };
                let finalizer = match &t.finalizer {
                    Some(f) => Some(self.block(f)?),
                    None => None,
                };
                NodeKind::TryStatement {
                    block,
                    handler,
                    finalizer,
                }
            }
            Stmt::While(w) => NodeKind::WhileStatement {
                test: self.expr(&w.test)?,
                body: self.stmt(&w.body)?,
            },
            Stmt::DoWhile(d) => NodeKind::DoWhileStatement {
                body: self.stmt(&d.body)?,
                test: self.expr(&d.test)?,
            },
            Stmt::For(f) => NodeKind::ForStatement {
                init: match &f.init {
                    Some(VarDeclOrExpr::VarDecl(v)) => Some(self.var_decl(v)?),
                    Some(VarDeclOrExpr::Expr(e)) => Some(self.expr(e)?),
                    None => None,
                },
                test: self.opt_expr(f.test.as_deref())?,
                update: self.opt_expr(f.update.as_deref())?,
                body: self.stmt(&f.body)?,
            },
            Stmt::ForIn(f) => NodeKind::ForInStatement {
                left: self.for_head(&f.left)?,
                right: self.expr(&f.right)?,
                body: self.stmt(&f.body)?,
            },
            Stmt::ForOf(f) => NodeKind::ForOfStatement {
                left: self.for_head(&f.left)?,
                right: self.expr(&f.right)?,
                body: self.stmt(&f.body)?,
                is_await: f.is_await,
            },
            Stmt::Expr(e) => NodeKind::ExpressionStatement {
                expression: self.expr(&e.expr)?,
            },
            _ => NodeKind::Raw {
                text: self.slice(stmt.span()),
            },
        };
        Ok(self.finish(id, kind))
    }

    fn slice(&self, sp: swc_common::Span) -> String {
        Self::span(sp)
            .and_then(|s| self.source.get(s.start as usize..s.end as usize))
            .unwrap_or_default()
            .to_string()
    }

    fn for_head(&mut self, head: &ForHead) -> Result<NodeId> {
        match head {
            ForHead::VarDecl(v) => self.var_decl(v),
            ForHead::Pat(p) => self.pat(p),
            ForHead::UsingDecl(u) => Ok(self.raw(u.span)),
        }
    }

    fn decl(&mut self, decl: &Decl) -> Result<NodeId> {
        match decl {
            Decl::Fn(f) => {
                let id = self.reserve(f.function.span);
                let name = self.ident(f.ident.span, &f.ident.sym);
                let kind = self.function(Some(name), &f.function, true)?;
                Ok(self.finish(id, kind))
            }
            Decl::Class(c) => {
                let id = self.reserve(c.class.span);
                let name = self.ident(c.ident.span, &c.ident.sym);
                let (super_class, body) = self.class(&c.class)?;
                Ok(self.finish(
                    id,
                    NodeKind::ClassDeclaration {
                        id: Some(name),
                        super_class,
                        body,
                    },
                ))
            }
            Decl::Var(v) => self.var_decl(v),
            _ => Ok(self.raw(decl.span())),
        }
    }

    fn var_decl(&mut self, v: &swc::VarDecl) -> Result<NodeId> {
        let id = self.reserve(v.span);
        let kind = match v.kind {
            VarDeclKind::Var => VarKind::Var,
            VarDeclKind::Let => VarKind::Let,
            VarDeclKind::Const => VarKind::Const,
        };
        let mut declarations = Vec::with_capacity(v.decls.len());
        for d in &v.decls {
            let decl_id = self.reserve(d.span);
            let name = self.pat(&d.name)?;
            let init = self.opt_expr(d.init.as_deref())?;
            declarations.push(self.finish(decl_id, NodeKind::VariableDeclarator { id: name, init }));
        }
        Ok(self.finish(id, NodeKind::VariableDeclaration { kind, declarations }))
    }

    /// Converts a function body and parameters into a declaration or expression kind.
    fn function(
        &mut self,
        name: Option<NodeId>,
        f: &swc::Function,
        declaration: bool,
    ) -> Result<NodeKind> {
        let mut params = Vec::with_capacity(f.params.len());
        for p in &f.params {
            params.push(self.pat(&p.pat)?);
        }
        let body = match &f.body {
            Some(b) => self.block(b)?,
            None => self.leaf(f.span, NodeKind::BlockStatement { body: Vec::new() }),
        };
        Ok(if declaration {
            NodeKind::FunctionDeclaration {
                id: name,
                params,
                body,
                is_async: f.is_async,
                is_generator: f.is_generator,
            }
        } else {
            NodeKind::FunctionExpression {
                id: name,
                params,
                body,
                is_async: f.is_async,
                is_generator: f.is_generator,
            }
        })
    }

    fn function_expr(&mut self, f: &swc::Function) -> Result<NodeId> {
        let id = self.reserve(f.span);
        let kind = self.function(None, f, false)?;
        Ok(self.finish(id, kind))
    }

    fn class(&mut self, class: &swc::Class) -> Result<(Option<NodeId>, NodeId)> {
        let super_class = self.opt_expr(class.super_class.as_deref())?;
        let body_id = self.reserve(class.span);
        let mut body = Vec::with_capacity(class.body.len());
        for member in &class.body {
            match member {
                ClassMember::Constructor(c) => {
                    let Some(block) = &c.body else {
                        body.push(self.raw(c.span));
                        continue;
                    };
                    let id = self.reserve(c.span);
                    let key = self.ident(c.key.span(), "constructor");
                    let value_id = self.reserve(c.span);
                    let mut params = Vec::with_capacity(c.params.len());
                    for p in &c.params {
                        params.push(match p {
                            ParamOrTsParamProp::Param(p) => self.pat(&p.pat)?,
                            ParamOrTsParamProp::TsParamProp(t) => self.raw(t.span),
                        });
                    }
                    let fn_body = self.block(block)?;
                    let value = self.finish(
                        value_id,
                        NodeKind::FunctionExpression {
                            id: None,
                            params,
                            body: fn_body,
                            is_async: false,
                            is_generator: false,
                        },
                    );
                    body.push(self.finish(
                        id,
                        NodeKind::MethodDefinition {
                            key,
                            value,
                            kind: MethodKind::Constructor,
                            computed: false,
                            is_static: false,
                        },
                    ));
                }
                ClassMember::Method(m) => {
                    let id = self.reserve(m.span);
                    let (key, computed) = self.prop_name(&m.key)?;
                    let value = self.function_expr(&m.function)?;
                    let kind = match m.kind {
                        swc::MethodKind::Method => MethodKind::Method,
                        swc::MethodKind::Getter => MethodKind::Get,
                        swc::MethodKind::Setter => MethodKind::Set,
                    };
                    body.push(self.finish(
                        id,
                        NodeKind::MethodDefinition {
                            key,
                            value,
                            kind,
                            computed,
                            is_static: m.is_static,
                        },
                    ));
                }
                ClassMember::ClassProp(p) => {
                    let id = self.reserve(p.span);
                    let (key, computed) = self.prop_name(&p.key)?;
                    let value = self.opt_expr(p.value.as_deref())?;
                    body.push(self.finish(
                        id,
                        NodeKind::PropertyDefinition {
                            key,
                            value,
                            computed,
                            is_static: p.is_static,
                        },
                    ));
                }
                ClassMember::StaticBlock(s) => {
                    let id = self.reserve(s.span);
                    let stmts = self.stmts(&s.body.stmts)?;
                    body.push(self.finish(id, NodeKind::StaticBlock { body: stmts }));
                }
                ClassMember::Empty(_) => {}
                other => body.push(self.raw(other.span())),
            }
        }
        let body = self.finish(body_id, NodeKind::ClassBody { body });
        Ok((super_class, body))
    }

    fn prop_name(&mut self, name: &PropName) -> Result<(NodeId, bool)> {
        Ok(match name {
            PropName::Ident(i) => (self.ident(i.span, &i.sym), false),
            PropName::Str(s) => (
                self.leaf(
                    s.span,
                    NodeKind::Literal {
                        value: LitValue::String(s.value.to_string()),
                    },
                ),
                false,
            ),
            PropName::Num(n) => (
                self.leaf(
                    n.span,
                    NodeKind::Literal {
                        value: LitValue::Number(n.value),
                    },
                ),
                false,
            ),
            PropName::BigInt(b) => (
                self.leaf(
                    b.span,
                    NodeKind::Literal {
                        value: LitValue::BigInt(b.value.to_string()),
                    },
                ),
                false,
            ),
            PropName::Computed(c) => (self.expr(&c.expr)?, true),
        })
    }

    fn opt_expr(&mut self, expr: Option<&Expr>) -> Result<Option<NodeId>> {
        match expr {
            Some(e) => Ok(Some(self.expr(e)?)),
            None => Ok(None),
        }
    }

    fn args(&mut self, args: &[swc::ExprOrSpread]) -> Result<Vec<NodeId>> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            out.push(self.expr_or_spread(arg)?);
        }
        Ok(out)
    }

    fn expr_or_spread(&mut self, arg: &swc::ExprOrSpread) -> Result<NodeId> {
        match arg.spread {
            Some(dots) => {
                let id = self.reserve(dots.with_hi(arg.expr.span().hi));
                let argument = self.expr(&arg.expr)?;
                Ok(self.finish(id, NodeKind::SpreadElement { argument }))
            }
            None => self.expr(&arg.expr),
        }
    }

    fn expr(&mut self, expr: &Expr) -> Result<NodeId> {
        self.enter()?;
        let result = self.expr_inner(expr);
        self.depth -= 1;
        result
    }

    fn expr_inner(&mut self, expr: &Expr) -> Result<NodeId> {
        match expr {
            Expr::Paren(p) => return self.expr(&p.expr),
            Expr::Ident(i) => return Ok(self.ident(i.span, &i.sym)),
            Expr::This(t) => return Ok(self.leaf(t.span, NodeKind::ThisExpression)),
            Expr::Lit(lit) => return Ok(self.lit(lit)),
            Expr::Fn(f) => {
                let id = self.reserve(f.function.span);
                let name = f.ident.as_ref().map(|i| self.ident(i.span, &i.sym));
                let kind = self.function(name, &f.function, false)?;
                return Ok(self.finish(id, kind));
            }
            Expr::Class(c) => {
                let id = self.reserve(c.class.span);
                let name = c.ident.as_ref().map(|i| self.ident(i.span, &i.sym));
                let (super_class, body) = self.class(&c.class)?;
                return Ok(self.finish(
                    id,
                    NodeKind::ClassExpression {
                        id: name,
                        super_class,
                        body,
                    },
                ));
            }
            Expr::Tpl(t) => return self.template(t),
            Expr::Call(c) => {
                if let Callee::Import(_) = c.callee {
                    let id = self.reserve(c.span);
                    return match c.args.first() {
                        Some(arg) => {
                            let source = self.expr(&arg.expr)?;
                            Ok(self.finish(id, NodeKind::ImportExpression { source }))
                        }
                        None => Ok(self.finish(
                            id,
                            NodeKind::Raw {
                                text: self.slice(c.span),
                            },
                        )),
                    };
                }
            }
            _ => {}
        }

        let id = self.reserve(expr.span());
        let kind = match expr {
            Expr::Array(a) => {
                let mut elements = Vec::with_capacity(a.elems.len());
                for elem in &a.elems {
                    elements.push(match elem {
                        Some(e) => Some(self.expr_or_spread(e)?),
                        None => None,
                    });
                }
                NodeKind::ArrayExpression { elements }
            }
            Expr::Object(o) => {
                let mut properties = Vec::with_capacity(o.props.len());
                for prop in &o.props {
                    properties.push(match prop {
                        PropOrSpread::Spread(s) => {
                            let sid = self.reserve(s.dot3_token.with_hi(s.expr.span().hi));
                            let argument = self.expr(&s.expr)?;
                            self.finish(sid, NodeKind::SpreadElement { argument })
                        }
                        PropOrSpread::Prop(p) => self.prop(p)?,
                    });
                }
                NodeKind::ObjectExpression { properties }
            }
            Expr::Unary(u) => NodeKind::UnaryExpression {
                operator: unary_op(u.op),
                argument: self.expr(&u.arg)?,
            },
            Expr::Update(u) => NodeKind::UpdateExpression {
                operator: match u.op {
                    UpdateOp::PlusPlus => "++",
                    UpdateOp::MinusMinus => "--",
                },
                prefix: u.prefix,
                argument: self.expr(&u.arg)?,
            },
            Expr::Bin(b) => {
                let operator = binary_op(b.op);
                let left = self.expr(&b.left)?;
                let right = self.expr(&b.right)?;
                if matches!(
                    b.op,
                    BinaryOp::LogicalAnd | BinaryOp::LogicalOr | BinaryOp::NullishCoalescing
                ) {
                    NodeKind::LogicalExpression {
                        operator,
                        left,
                        right,
                    }
                } else {
                    NodeKind::BinaryExpression {
                        operator,
                        left,
                        right,
                    }
                }
            }
            Expr::Assign(a) => NodeKind::AssignmentExpression {
                operator: assign_op(a.op),
                left: self.assign_target(&a.left)?,
                right: self.expr(&a.right)?,
            },
            Expr::Member(m) => self.member(m, false)?,
            Expr::SuperProp(s) => {
                let object = self.leaf(s.obj.span, NodeKind::Super);
                let (property, computed) = match &s.prop {
                    SuperProp::Ident(i) => (self.ident(i.span, &i.sym), false),
                    SuperProp::Computed(c) => (self.expr(&c.expr)?, true),
                };
                NodeKind::MemberExpression {
                    object,
                    property,
                    computed,
                    optional: false,
                }
            }
            Expr::Cond(c) => NodeKind::ConditionalExpression {
                test: self.expr(&c.test)?,
                consequent: self.expr(&c.cons)?,
                alternate: self.expr(&c.alt)?,
            },
            Expr::Call(c) => NodeKind::CallExpression {
                callee: match &c.callee {
                    Callee::Expr(e) => self.expr(e)?,
                    Callee::Super(s) => self.leaf(s.span, NodeKind::Super),
                    Callee::Import(i) => self.raw(i.span),
                },
                arguments: self.args(&c.args)?,
                optional: false,
            },
            Expr::New(n) => NodeKind::NewExpression {
                callee: self.expr(&n.callee)?,
                arguments: match &n.args {
                    Some(args) => self.args(args)?,
                    None => Vec::new(),
                },
            },
            Expr::Seq(s) => {
                let mut expressions = Vec::with_capacity(s.exprs.len());
                for e in &s.exprs {
                    expressions.push(self.expr(e)?);
                }
                NodeKind::SequenceExpression { expressions }
            }
            Expr::TaggedTpl(t) => NodeKind::TaggedTemplateExpression {
                tag: self.expr(&t.tag)?,
                quasi: self.template(&t.tpl)?,
            },
            Expr::Arrow(a) => {
                let mut params = Vec::with_capacity(a.params.len());
                for p in &a.params {
                    params.push(self.pat(p)?);
                }
                let (body, expression) = match &*a.body {
                    BlockStmtOrExpr::BlockStmt(b) => (self.block(b)?, false),
                    BlockStmtOrExpr::Expr(e) => (self.expr(e)?, true),
                };
                NodeKind::ArrowFunctionExpression {
                    params,
                    body,
                    expression,
                    is_async: a.is_async,
                }
            }
            Expr::Yield(y) => NodeKind::YieldExpression {
                argument: self.opt_expr(y.arg.as_deref())?,
                delegate: y.delegate,
            },
            Expr::Await(a) => NodeKind::AwaitExpression {
                argument: self.expr(&a.arg)?,
            },
            Expr::MetaProp(m) => match m.kind {
                MetaPropKind::NewTarget => NodeKind::MetaProperty {
                    meta: "new".to_string(),
                    property: "target".to_string(),
                },
                MetaPropKind::ImportMeta => NodeKind::MetaProperty {
                    meta: "import".to_string(),
                    property: "meta".to_string(),
                },
            },
            Expr::OptChain(o) => match &*o.base {
                OptChainBase::Member(m) => self.member(m, o.optional)?,
                OptChainBase::Call(c) => NodeKind::CallExpression {
                    callee: self.expr(&c.callee)?,
                    arguments: self.args(&c.args)?,
                    optional: o.optional,
                },
            },
            _ => NodeKind::Raw {
                text: self.slice(expr.span()),
            },
        };
        Ok(self.finish(id, kind))
    }

    fn member(&mut self, m: &swc::MemberExpr, optional: bool) -> Result<NodeKind> {
        let object = self.expr(&m.obj)?;
        let (property, computed) = match &m.prop {
            MemberProp::Ident(i) => (self.ident(i.span, &i.sym), false),
            MemberProp::PrivateName(p) => (self.raw(p.span), false),
            MemberProp::Computed(c) => (self.expr(&c.expr)?, true),
        };
        Ok(NodeKind::MemberExpression {
            object,
            property,
            computed,
            optional,
        })
    }

    fn prop(&mut self, prop: &Prop) -> Result<NodeId> {
        let id = self.reserve(prop.span());
        let kind = match prop {
            Prop::Shorthand(i) => {
                let key = self.ident(i.span, &i.sym);
                let value = self.ident(i.span, &i.sym);
                NodeKind::Property {
                    key,
                    value,
                    kind: PropKind::Init,
                    computed: false,
                    shorthand: true,
                    method: false,
                }
            }
            Prop::KeyValue(kv) => {
                let (key, computed) = self.prop_name(&kv.key)?;
                NodeKind::Property {
                    key,
                    value: self.expr(&kv.value)?,
                    kind: PropKind::Init,
                    computed,
                    shorthand: false,
                    method: false,
                }
            }
            Prop::Method(m) => {
                let (key, computed) = self.prop_name(&m.key)?;
                NodeKind::Property {
                    key,
                    value: self.function_expr(&m.function)?,
                    kind: PropKind::Init,
                    computed,
                    shorthand: false,
                    method: true,
                }
            }
            Prop::Getter(g) => {
                let (key, computed) = self.prop_name(&g.key)?;
                let value_id = self.reserve(g.span);
                let body = match &g.body {
                    Some(b) => self.block(b)?,
                    None => self.leaf(g.span, NodeKind::BlockStatement { body: Vec::new() }),
                };
                let value = self.finish(
                    value_id,
                    NodeKind::FunctionExpression {
                        id: None,
                        params: Vec::new(),
                        body,
                        is_async: false,
                        is_generator: false,
                    },
                );
                NodeKind::Property {
                    key,
                    value,
                    kind: PropKind::Get,
                    computed,
                    shorthand: false,
                    method: false,
                }
            }
            Prop::Setter(s) => {
                let (key, computed) = self.prop_name(&s.key)?;
                let value_id = self.reserve(s.span);
                let param = self.pat(&s.param)?;
                let body = match &s.body {
                    Some(b) => self.block(b)?,
                    None => self.leaf(s.span, NodeKind::BlockStatement { body: Vec::new() }),
                };
                let value = self.finish(
                    value_id,
                    NodeKind::FunctionExpression {
                        id: None,
                        params: vec![param],
                        body,
                        is_async: false,
                        is_generator: false,
                    },
                );
                NodeKind::Property {
                    key,
                    value,
                    kind: PropKind::Set,
                    computed,
                    shorthand: false,
                    method: false,
                }
            }
            Prop::Assign(_) => NodeKind::Raw {
                text: self.slice(prop.span()),
            },
        };
        Ok(self.finish(id, kind))
    }

    fn template(&mut self, tpl: &swc::Tpl) -> Result<NodeId> {
        let id = self.reserve(tpl.span);
        let mut quasis = Vec::with_capacity(tpl.quasis.len());
        for q in &tpl.quasis {
            quasis.push(self.leaf(
                q.span,
                NodeKind::TemplateElement {
                    raw: q.raw.to_string(),
                    cooked: q.cooked.as_ref().map(ToString::to_string),
                    tail: q.tail,
                },
            ));
        }
        let mut expressions = Vec::with_capacity(tpl.exprs.len());
        for e in &tpl.exprs {
            expressions.push(self.expr(e)?);
        }
        Ok(self.finish(
            id,
            NodeKind::TemplateLiteral {
                quasis,
                expressions,
            },
        ))
    }

    fn lit(&mut self, lit: &Lit) -> NodeId {
        let value = match lit {
            Lit::Str(s) => LitValue::String(s.value.to_string()),
            Lit::Bool(b) => LitValue::Boolean(b.value),
            Lit::Null(_) => LitValue::Null,
            Lit::Num(n) => LitValue::Number(n.value),
            Lit::BigInt(b) => LitValue::BigInt(b.value.to_string()),
            Lit::Regex(r) => LitValue::RegExp {
                pattern: r.exp.to_string(),
                flags: r.flags.to_string(),
            },
            Lit::JSXText(t) => return self.raw(t.span),
        };
        self.leaf(lit.span(), NodeKind::Literal { value })
    }

    fn assign_target(&mut self, target: &AssignTarget) -> Result<NodeId> {
        match target {
            AssignTarget::Simple(simple) => match simple {
                SimpleAssignTarget::Ident(b) => Ok(self.ident(b.id.span, &b.id.sym)),
                SimpleAssignTarget::Member(m) => {
                    let id = self.reserve(m.span);
                    let kind = self.member(m, false)?;
                    Ok(self.finish(id, kind))
                }
                SimpleAssignTarget::SuperProp(s) => self.expr(&Expr::SuperProp(s.clone())),
                SimpleAssignTarget::Paren(p) => self.expr(&p.expr),
                SimpleAssignTarget::OptChain(o) => self.expr(&Expr::OptChain(o.clone())),
                other => Ok(self.raw(other.span())),
            },
            AssignTarget::Pat(p) => match p {
                AssignTargetPat::Array(a) => self.array_pat(a),
                AssignTargetPat::Object(o) => self.object_pat(o),
                AssignTargetPat::Invalid(i) => Ok(self.raw(i.span)),
            },
        }
    }

    fn pat(&mut self, pat: &Pat) -> Result<NodeId> {
        self.enter()?;
        let result = match pat {
            Pat::Ident(b) => Ok(self.ident(b.id.span, &b.id.sym)),
            Pat::Array(a) => self.array_pat(a),
            Pat::Object(o) => self.object_pat(o),
            Pat::Rest(r) => {
                let id = self.reserve(r.span);
                let argument = self.pat(&r.arg)?;
                Ok(self.finish(id, NodeKind::RestElement { argument }))
            }
            Pat::Assign(a) => {
                let id = self.reserve(a.span);
                let left = self.pat(&a.left)?;
                let right = self.expr(&a.right)?;
                Ok(self.finish(id, NodeKind::AssignmentPattern { left, right }))
            }
            Pat::Expr(e) => self.expr(e),
            Pat::Invalid(i) => Ok(self.raw(i.span)),
        };
        self.depth -= 1;
        result
    }

    fn array_pat(&mut self, a: &swc::ArrayPat) -> Result<NodeId> {
        let id = self.reserve(a.span);
        let mut elements = Vec::with_capacity(a.elems.len());
        for elem in &a.elems {
            elements.push(match elem {
                Some(p) => Some(self.pat(p)?),
                None => None,
            });
        }
        Ok(self.finish(id, NodeKind::ArrayPattern { elements }))
    }

    fn object_pat(&mut self, o: &swc::ObjectPat) -> Result<NodeId> {
        let id = self.reserve(o.span);
        let mut properties = Vec::with_capacity(o.props.len());
        for prop in &o.props {
            properties.push(match prop {
                ObjectPatProp::KeyValue(kv) => {
                    let pid = self.reserve(kv.span());
                    let (key, computed) = self.prop_name(&kv.key)?;
                    let value = self.pat(&kv.value)?;
                    self.finish(
                        pid,
                        NodeKind::Property {
                            key,
                            value,
                            kind: PropKind::Init,
                            computed,
                            shorthand: false,
                            method: false,
                        },
                    )
                }
                ObjectPatProp::Assign(a) => {
                    let pid = self.reserve(a.span);
                    let key = self.ident(a.key.id.span, &a.key.id.sym);
                    let value = match &a.value {
                        Some(default) => {
                            let vid = self.reserve(a.span);
                            let left = self.ident(a.key.id.span, &a.key.id.sym);
                            let right = self.expr(default)?;
                            self.finish(vid, NodeKind::AssignmentPattern { left, right })
                        }
                        None => self.ident(a.key.id.span, &a.key.id.sym),
                    };
                    self.finish(
                        pid,
                        NodeKind::Property {
                            key,
                            value,
                            kind: PropKind::Init,
                            computed: false,
                            shorthand: true,
                            method: false,
                        },
                    )
                }
                ObjectPatProp::Rest(r) => {
                    let rid = self.reserve(r.span);
                    let argument = self.pat(&r.arg)?;
                    self.finish(rid, NodeKind::RestElement { argument })
                }
            });
        }
        Ok(self.finish(id, NodeKind::ObjectPattern { properties }))
    }
}

fn unary_op(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Minus => "-",
        UnaryOp::Plus => "+",
        UnaryOp::Bang => "!",
        UnaryOp::Tilde => "~",
        UnaryOp::TypeOf => "typeof",
        UnaryOp::Void => "void",
        UnaryOp::Delete => "delete",
    }
}

fn binary_op(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::EqEq => "==",
        BinaryOp::NotEq => "!=",
        BinaryOp::EqEqEq => "===",
        BinaryOp::NotEqEq => "!==",
        BinaryOp::Lt => "<",
        BinaryOp::LtEq => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::GtEq => ">=",
        BinaryOp::LShift => "<<",
        BinaryOp::RShift => ">>",
        BinaryOp::ZeroFillRShift => ">>>",
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
        BinaryOp::BitOr => "|",
        BinaryOp::BitXor => "^",
        BinaryOp::BitAnd => "&",
        BinaryOp::LogicalOr => "||",
        BinaryOp::LogicalAnd => "&&",
        BinaryOp::In => "in",
        BinaryOp::InstanceOf => "instanceof",
        BinaryOp::Exp => "**",
        BinaryOp::NullishCoalescing => "??",
    }
}

fn assign_op(op: AssignOp) -> &'static str {
    match op {
        AssignOp::Assign => "=",
        AssignOp::AddAssign => "+=",
        AssignOp::SubAssign => "-=",
        AssignOp::MulAssign => "*=",
        AssignOp::DivAssign => "/=",
        AssignOp::ModAssign => "%=",
        AssignOp::LShiftAssign => "<<=",
        AssignOp::RShiftAssign => ">>=",
        AssignOp::ZeroFillRShiftAssign => ">>>=",
        AssignOp::BitOrAssign => "|=",
        AssignOp::BitXorAssign => "^=",
        AssignOp::BitAndAssign => "&=",
        AssignOp::ExpAssign => "**=",
        AssignOp::AndAssign => "&&=",
        AssignOp::OrAssign => "||=",
        AssignOp::NullishAssign => "??=",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeType;

    #[test]
    fn test_preorder_ids() -> crate::Result<()> {
        let nodes = parse_nodes("a(b, c);")?;
        let kinds: Vec<_> = nodes.iter().map(|n| n.kind.node_type()).collect();
        assert_eq!(
            kinds,
            vec![
                NodeType::Program,
                NodeType::ExpressionStatement,
                NodeType::CallExpression,
                NodeType::Identifier,
                NodeType::Identifier,
                NodeType::Identifier
            ]
        );
        Ok(())
    }

    #[test]
    fn test_spans_are_zero_based() -> crate::Result<()> {
        let nodes = parse_nodes("var abc = 1;")?;
        let ident = nodes
            .iter()
            .find(|n| n.kind.ident_name() == Some("abc"))
            .map(|n| n.span);
        assert_eq!(ident, Some(Some(Span::new(4, 7))));
        Ok(())
    }

    #[test]
    fn test_syntax_error() {
        match parse_nodes("var = ;") {
            Err(Error::Parse { .. }) => {}
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_logical_split_from_binary() -> crate::Result<()> {
        let nodes = parse_nodes("a && b + c;")?;
        assert!(matches!(
            nodes[2].kind,
            NodeKind::LogicalExpression { operator: "&&", .. }
        ));
        Ok(())
    }
}
