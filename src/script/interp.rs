//! Tree-walking interpreter shared by model scripts and templates.

use std::cell::Cell;

use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use thiserror::Error;

use super::ast::{BinaryOp, Expr, ExprKind, Lambda, MAX_DEPTH, Program, Segment, Stmt, UnaryOp};
use super::diagnostic::{Diagnostic, Span};
use super::library::Library;
use super::value::{self, as_float, as_int, display, type_name};

/// Evaluation failure anchored at the offending expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RuntimeError {
    pub offset: usize,
    pub message: String,
}

impl RuntimeError {
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        Self {
            offset: span.start,
            message: message.into(),
        }
    }
}

impl From<RuntimeError> for Diagnostic {
    fn from(err: RuntimeError) -> Self {
        Diagnostic::new(err.offset, err.message)
    }
}

pub type EvalResult<T = Value> = Result<T, RuntimeError>;

/// Lexical scope; children borrow their parent for the duration of a call.
#[derive(Debug, Default)]
pub struct Scope<'p> {
    vars: FxHashMap<String, Value>,
    parent: Option<&'p Scope<'p>>,
}

impl<'p> Scope<'p> {
    pub fn root() -> Scope<'static> {
        Scope {
            vars: FxHashMap::default(),
            parent: None,
        }
    }

    pub fn child(&'p self) -> Scope<'p> {
        Scope {
            vars: FxHashMap::default(),
            parent: Some(self),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars
            .get(name)
            .or_else(|| self.parent.and_then(|p| p.get(name)))
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }
}

/// A lambda argument closed over the scope it was written in.
pub struct Func<'a> {
    pub lambda: &'a Lambda,
    pub scope: &'a Scope<'a>,
    pub span: Span,
}

pub enum Arg<'a> {
    Value(Value),
    Func(Func<'a>),
}

pub struct Interpreter<'l> {
    library: &'l Library,
    /// Current `eval` nesting, lambda bodies included.
    depth: Cell<usize>,
}

impl<'l> Interpreter<'l> {
    pub fn new(library: &'l Library) -> Self {
        Self {
            library,
            depth: Cell::new(0),
        }
    }

    /// Run statements in `scope`; the last expression statement's value is
    /// the result, `Null` when the program ends with a declaration.
    pub fn run(&self, program: &Program, scope: &mut Scope<'_>) -> EvalResult {
        let mut result = Value::Null;
        for stmt in &program.stmts {
            match stmt {
                Stmt::Let { name, value, .. } => {
                    let value = self.eval(value, scope)?;
                    scope.set(name.clone(), value);
                    result = Value::Null;
                }
                Stmt::Expr(expr) => result = self.eval(expr, scope)?,
            }
        }
        Ok(result)
    }

    pub fn eval(&self, expr: &Expr, scope: &Scope<'_>) -> EvalResult {
        let depth = self.depth.get();
        if depth >= MAX_DEPTH {
            return Err(RuntimeError::new(expr.span, "expression nested too deeply"));
        }
        self.depth.set(depth + 1);
        let result = self.eval_kind(expr, scope);
        self.depth.set(depth);
        result
    }

    fn eval_kind(&self, expr: &Expr, scope: &Scope<'_>) -> EvalResult {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Int(n) => Ok(Value::from(*n)),
            ExprKind::Float(f) => value::float(*f)
                .ok_or_else(|| RuntimeError::new(span, "number is not finite")),
            ExprKind::Str(s) => Ok(Value::String(s.clone())),
            ExprKind::Interpolated(segments) => {
                let mut out = String::new();
                for segment in segments {
                    match segment {
                        Segment::Text(text) => out.push_str(text),
                        Segment::Expr(expr) => out.push_str(&display(&self.eval(expr, scope)?)),
                    }
                }
                Ok(Value::String(out))
            }
            ExprKind::Array(items) => items
                .iter()
                .map(|item| self.eval(item, scope))
                .collect::<EvalResult<Vec<_>>>()
                .map(Value::Array),
            ExprKind::Object(members) => {
                let mut map = Map::with_capacity(members.len());
                for (name, member) in members {
                    map.insert(name.clone(), self.eval(member, scope)?);
                }
                Ok(Value::Object(map))
            }
            ExprKind::Name(name) => self.name(name, span, scope),
            ExprKind::Member(target, name) => match self.static_root(target, scope) {
                Some(root) => self.library.static_property(root, name, span),
                None => {
                    let target = self.eval(target, scope)?;
                    self.library.property(target, name, span)
                }
            },
            ExprKind::Index(target, index) => {
                let target = self.eval(target, scope)?;
                let index = self.eval(index, scope)?;
                self.index(target, index, span)
            }
            ExprKind::Call(callee, args) => self.call(callee, args, span, scope),
            ExprKind::Lambda(_) => Err(RuntimeError::new(
                span,
                "lambda expressions can only be passed as method arguments",
            )),
            ExprKind::Unary(op, operand) => {
                let operand = self.eval(operand, scope)?;
                unary(*op, operand, span)
            }
            ExprKind::Binary(op, left, right) => self.binary(*op, left, right, span, scope),
            ExprKind::Conditional(cond, then, otherwise) => {
                let cond = self.eval(cond, scope)?;
                if self.condition(&cond, span)? {
                    self.eval(then, scope)
                } else {
                    self.eval(otherwise, scope)
                }
            }
        }
    }

    /// Booleans decide; `null` counts as false; anything else is an error.
    pub fn condition(&self, value: &Value, span: Span) -> EvalResult<bool> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Null => Ok(false),
            other => Err(RuntimeError::new(
                span,
                format!("condition must be a bool, found {}", type_name(other)),
            )),
        }
    }

    /// Call a lambda argument with positional values.
    pub fn invoke(&self, func: &Func<'_>, args: Vec<Value>) -> EvalResult {
        let params = &func.lambda.params;
        if params.len() > args.len() {
            return Err(RuntimeError::new(
                func.span,
                format!(
                    "lambda takes {} parameter(s) but only {} are supplied here",
                    params.len(),
                    args.len()
                ),
            ));
        }
        let mut scope = func.scope.child();
        for (param, arg) in params.iter().zip(args) {
            scope.set(param.clone(), arg);
        }
        self.eval(&func.lambda.body, &scope)
    }

    fn name(&self, name: &str, span: Span, scope: &Scope<'_>) -> EvalResult {
        if let Some(value) = scope.get(name) {
            return Ok(value.clone());
        }
        if Library::static_module(name).is_some() {
            return Err(RuntimeError::new(
                span,
                format!("`{name}` is a static class; use one of its members"),
            ));
        }
        Err(RuntimeError::new(
            span,
            format!("the name `{name}` does not exist in the current context"),
        ))
    }

    /// `Math`, `Enumerable`, ... when not shadowed by a variable.
    fn static_root<'e>(&self, target: &'e Expr, scope: &Scope<'_>) -> Option<&'e str> {
        match &target.kind {
            ExprKind::Name(name)
                if scope.get(name).is_none() && Library::static_module(name).is_some() =>
            {
                Some(name)
            }
            _ => None,
        }
    }

    fn call(&self, callee: &Expr, args: &[Expr], span: Span, scope: &Scope<'_>) -> EvalResult {
        let ExprKind::Member(target, method) = &callee.kind else {
            return Err(RuntimeError::new(span, "only methods can be invoked"));
        };

        let args = args
            .iter()
            .map(|arg| match &arg.kind {
                ExprKind::Lambda(lambda) => Ok(Arg::Func(Func {
                    lambda,
                    scope,
                    span: arg.span,
                })),
                _ => self.eval(arg, scope).map(Arg::Value),
            })
            .collect::<EvalResult<Vec<_>>>()?;

        match self.static_root(target, scope) {
            Some(root) => self.library.call_static(root, method, args, span),
            None => {
                let target = self.eval(target, scope)?;
                self.library.call_method(self, target, method, args, span)
            }
        }
    }

    fn index(&self, target: Value, index: Value, span: Span) -> EvalResult {
        match (&target, &index) {
            (Value::Null, _) => Ok(Value::Null),
            (Value::Array(items), _) => {
                let i = position(&index, items.len(), span)?;
                Ok(items[i].clone())
            }
            (Value::String(s), _) => {
                let chars: Vec<char> = s.chars().collect();
                let i = position(&index, chars.len(), span)?;
                Ok(Value::String(chars[i].to_string()))
            }
            (Value::Object(map), Value::String(key)) => {
                Ok(map.get(key).cloned().unwrap_or(Value::Null))
            }
            _ => Err(RuntimeError::new(
                span,
                format!(
                    "cannot index {} with {}",
                    type_name(&target),
                    type_name(&index)
                ),
            )),
        }
    }

    fn binary(
        &self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        span: Span,
        scope: &Scope<'_>,
    ) -> EvalResult {
        let lhs = self.eval(left, scope)?;
        match op {
            BinaryOp::Coalesce => {
                return if lhs.is_null() {
                    self.eval(right, scope)
                } else {
                    Ok(lhs)
                };
            }
            BinaryOp::And | BinaryOp::Or => {
                let l = logical_operand(op, &lhs, left.span)?;
                if (op == BinaryOp::And && !l) || (op == BinaryOp::Or && l) {
                    return Ok(Value::Bool(l));
                }
                let rhs = self.eval(right, scope)?;
                return logical_operand(op, &rhs, right.span).map(Value::Bool);
            }
            _ => {}
        }

        let rhs = self.eval(right, scope)?;
        match op {
            BinaryOp::Eq => Ok(Value::Bool(value::equals(&lhs, &rhs))),
            BinaryOp::NotEq => Ok(Value::Bool(!value::equals(&lhs, &rhs))),
            BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
                let ordered = match (&lhs, &rhs) {
                    (Value::Number(_), Value::Number(_)) | (Value::String(_), Value::String(_)) => {
                        value::compare(&lhs, &rhs)
                    }
                    _ => None,
                };
                let Some(ordering) = ordered else {
                    return Err(operand_error(op, &lhs, &rhs, span));
                };
                Ok(Value::Bool(match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::LtEq => ordering.is_le(),
                    BinaryOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                }))
            }
            _ => arithmetic(op, lhs, rhs, span),
        }
    }
}

fn position(index: &Value, len: usize, span: Span) -> EvalResult<usize> {
    let Some(i) = as_int(index) else {
        return Err(RuntimeError::new(
            span,
            format!("index must be an integer, found {}", type_name(index)),
        ));
    };
    usize::try_from(i)
        .ok()
        .filter(|i| *i < len)
        .ok_or_else(|| {
            RuntimeError::new(
                span,
                format!("index {i} is out of range for length {len}"),
            )
        })
}

fn logical_operand(op: BinaryOp, value: &Value, span: Span) -> EvalResult<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        other => Err(RuntimeError::new(
            span,
            format!(
                "operator `{}` requires bool operands, found {}",
                symbol(op),
                type_name(other)
            ),
        )),
    }
}

fn unary(op: UnaryOp, operand: Value, span: Span) -> EvalResult {
    match (op, &operand) {
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Neg, Value::Number(_)) => match as_int(&operand) {
            Some(i) => i
                .checked_neg()
                .map(Value::from)
                .ok_or_else(|| RuntimeError::new(span, "arithmetic operation resulted in an overflow")),
            None => as_float(&operand)
                .and_then(|f| value::float(-f))
                .ok_or_else(|| RuntimeError::new(span, "number is not finite")),
        },
        _ => Err(RuntimeError::new(
            span,
            format!(
                "operator `{}` cannot be applied to operand of type {}",
                if op == UnaryOp::Not { "!" } else { "-" },
                type_name(&operand)
            ),
        )),
    }
}

pub(super) fn arithmetic(op: BinaryOp, lhs: Value, rhs: Value, span: Span) -> EvalResult {
    if op == BinaryOp::Add && (lhs.is_string() || rhs.is_string()) {
        return Ok(Value::String(display(&lhs) + &display(&rhs)));
    }

    if let (Some(a), Some(b)) = (as_int(&lhs), as_int(&rhs)) {
        if matches!(op, BinaryOp::Div | BinaryOp::Rem) && b == 0 {
            return Err(RuntimeError::new(span, "attempted to divide by zero"));
        }
        let result = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Div => a.checked_div(b),
            BinaryOp::Rem => a.checked_rem(b),
            _ => return Err(operand_error(op, &lhs, &rhs, span)),
        };
        return result
            .map(Value::from)
            .ok_or_else(|| RuntimeError::new(span, "arithmetic operation resulted in an overflow"));
    }

    let (Some(a), Some(b)) = (as_float(&lhs), as_float(&rhs)) else {
        return Err(operand_error(op, &lhs, &rhs, span));
    };
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        _ => return Err(operand_error(op, &lhs, &rhs, span)),
    };
    value::float(result).ok_or_else(|| RuntimeError::new(span, "result is not a finite number"))
}

fn operand_error(op: BinaryOp, lhs: &Value, rhs: &Value, span: Span) -> RuntimeError {
    RuntimeError::new(
        span,
        format!(
            "operator `{}` cannot be applied to operands of type {} and {}",
            symbol(op),
            type_name(lhs),
            type_name(rhs)
        ),
    )
}

fn symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Rem => "%",
        BinaryOp::Eq => "==",
        BinaryOp::NotEq => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::LtEq => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::GtEq => ">=",
        BinaryOp::And => "&&",
        BinaryOp::Or => "||",
        BinaryOp::Coalesce => "??",
    }
}
