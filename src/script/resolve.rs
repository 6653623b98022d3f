//! Static name resolution.
//!
//! Walks a parsed program (or template expressions) with a stack of lexical
//! scopes and reports every problem it can find before anything runs:
//! undefined names, lambdas outside argument position, calls on things that
//! are not methods, and static classes whose module is disabled.

use rustc_hash::FxHashSet;

use super::ast::{Expr, ExprKind, Program, Segment, Stmt};
use super::diagnostic::{Diagnostic, Span};
use super::library::Library;

pub struct Resolver<'l> {
    library: &'l Library,
    scopes: Vec<FxHashSet<String>>,
    diagnostics: Vec<Diagnostic>,
}

impl<'l> Resolver<'l> {
    pub fn new(library: &'l Library) -> Self {
        Self {
            library,
            scopes: vec![FxHashSet::default()],
            diagnostics: Vec::new(),
        }
    }

    /// Declare `name` in the innermost scope.
    pub fn declare(&mut self, name: &str, span: Span) {
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };
        if !scope.insert(name.to_string()) {
            self.diagnostics.push(Diagnostic::new(
                span.start,
                format!("a local variable named `{name}` is already defined in this scope"),
            ));
        }
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.scopes.iter().rev().any(|scope| scope.contains(name))
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(FxHashSet::default());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn finish(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn program(&mut self, program: &Program) {
        for stmt in &program.stmts {
            self.stmt(stmt);
        }
    }

    pub fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Let { name, value, span } => {
                self.expr(value);
                self.declare(name, *span);
            }
            Stmt::Expr(expr) => self.expr(expr),
        }
    }

    pub fn expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Null
            | ExprKind::Bool(_)
            | ExprKind::Int(_)
            | ExprKind::Float(_)
            | ExprKind::Str(_) => {}
            ExprKind::Interpolated(segments) => {
                for segment in segments {
                    if let Segment::Expr(inner) = segment {
                        self.expr(inner);
                    }
                }
            }
            ExprKind::Array(items) => items.iter().for_each(|item| self.expr(item)),
            ExprKind::Object(members) => members.iter().for_each(|(_, value)| self.expr(value)),
            ExprKind::Name(name) => self.name(name, expr.span),
            ExprKind::Member(target, member) => self.member(target, member),
            ExprKind::Index(target, index) => {
                self.expr(target);
                self.expr(index);
            }
            ExprKind::Call(callee, args) => {
                match &callee.kind {
                    ExprKind::Member(target, member) => self.member(target, member),
                    _ => {
                        self.report(Diagnostic::new(callee.span.start, "only methods can be invoked"));
                        self.expr(callee);
                    }
                }
                for arg in args {
                    match &arg.kind {
                        ExprKind::Lambda(lambda) => {
                            self.push_scope();
                            for param in &lambda.params {
                                self.declare(param, arg.span);
                            }
                            self.expr(&lambda.body);
                            self.pop_scope();
                        }
                        _ => self.expr(arg),
                    }
                }
            }
            ExprKind::Lambda(_) => self.report(Diagnostic::new(
                expr.span.start,
                "lambda expressions can only be passed as method arguments",
            )),
            ExprKind::Unary(_, operand) => self.expr(operand),
            ExprKind::Binary(_, left, right) => {
                self.expr(left);
                self.expr(right);
            }
            ExprKind::Conditional(cond, then, otherwise) => {
                self.expr(cond);
                self.expr(then);
                self.expr(otherwise);
            }
        }
    }

    fn name(&mut self, name: &str, span: Span) {
        if self.is_declared(name) {
            return;
        }
        let message = if Library::static_module(name).is_some() {
            format!("`{name}` is a static class; use one of its members")
        } else {
            format!("the name `{name}` does not exist in the current context")
        };
        self.report(Diagnostic::new(span.start, message));
    }

    /// `target.member`, where an unshadowed static class is allowed as target.
    fn member(&mut self, target: &Expr, member: &str) {
        if let ExprKind::Name(root) = &target.kind
            && !self.is_declared(root)
            && let Some(module) = Library::static_module(root)
        {
            if !self.library.allows(module) {
                self.report(Diagnostic::new(
                    target.span.start,
                    format!("`{root}.{member}` requires the `{module}` module, which is not enabled"),
                ));
            }
            return;
        }
        self.expr(target);
    }
}
