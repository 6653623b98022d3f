//! Walks compiled nodes against a model.

use std::cell::Cell;

use serde_json::{Map, Value};

use super::parser::{MAX_BLOCK_NESTING, Node};
use crate::script::diagnostic::Span;
use crate::script::interp::{EvalResult, Interpreter, RuntimeError, Scope};
use crate::script::value::{display, type_name};
use crate::utils::html::escape;

pub(super) struct Renderer<'a> {
    interp: Interpreter<'a>,
    nesting: Cell<usize>,
}

impl<'a> Renderer<'a> {
    pub(super) fn new(interp: Interpreter<'a>) -> Self {
        Self {
            interp,
            nesting: Cell::new(0),
        }
    }

    /// Render a block body one level deeper; `span` is blamed past the limit.
    fn block(&self, body: &[Node], scope: &mut Scope<'_>, out: &mut String, span: Span) -> EvalResult<()> {
        let nesting = self.nesting.get();
        if nesting >= MAX_BLOCK_NESTING {
            return Err(RuntimeError::new(span, "template blocks nested too deeply"));
        }
        self.nesting.set(nesting + 1);
        let result = self.nodes(body, scope, out);
        self.nesting.set(nesting);
        result
    }

    pub(super) fn nodes(&self, nodes: &[Node], scope: &mut Scope<'_>, out: &mut String) -> EvalResult<()> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Expr { expr, raw } => {
                    let text = display(&self.interp.eval(expr, scope)?);
                    if *raw {
                        out.push_str(&text);
                    } else {
                        out.push_str(&escape(&text));
                    }
                }
                Node::Foreach {
                    var, source, body, ..
                } => {
                    let items = match self.interp.eval(source, scope)? {
                        Value::Null => Vec::new(),
                        Value::Array(items) => items,
                        Value::Object(map) => entries(map),
                        other => {
                            return Err(RuntimeError::new(
                                source.span,
                                format!("cannot iterate over a value of type {}", type_name(&other)),
                            ));
                        }
                    };
                    for item in items {
                        let mut child = scope.child();
                        child.set(var.clone(), item);
                        self.block(body, &mut child, out, source.span)?;
                    }
                }
                Node::If {
                    branches,
                    otherwise,
                } => {
                    let mut taken = None;
                    let mut span = Span::default();
                    for (cond, body) in branches {
                        span = cond.span;
                        let value = self.interp.eval(cond, scope)?;
                        if self.interp.condition(&value, cond.span)? {
                            taken = Some(body);
                            break;
                        }
                    }
                    if let Some(body) = taken.or(otherwise.as_ref()) {
                        let mut child = scope.child();
                        self.block(body, &mut child, out, span)?;
                    }
                }
                Node::Code(program) => {
                    self.interp.run(program, scope)?;
                }
            }
        }
        Ok(())
    }
}

/// Objects iterate as `{ Key, Value }` pairs in field order.
fn entries(map: Map<String, Value>) -> Vec<Value> {
    map.into_iter()
        .map(|(key, value)| {
            let mut entry = Map::new();
            entry.insert("Key".to_string(), Value::String(key));
            entry.insert("Value".to_string(), value);
            Value::Object(entry)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ast::{Expr, ExprKind};
    use crate::script::library::Library;
    use serde_json::json;

    fn nested_ifs(depth: usize) -> Vec<Node> {
        let mut body = vec![Node::Text("core".to_string())];
        for level in 0..depth {
            let cond = Expr::new(ExprKind::Bool(true), Span::new(level, level + 1));
            body = vec![Node::If {
                branches: vec![(cond, body)],
                otherwise: None,
            }];
        }
        body
    }

    fn render(nodes: &[Node]) -> EvalResult<String> {
        let library = Library::standard();
        let renderer = Renderer::new(Interpreter::new(&library));
        let mut out = String::new();
        renderer.nodes(nodes, &mut Scope::root(), &mut out)?;
        Ok(out)
    }

    #[test]
    fn test_nested_blocks_render() {
        assert_eq!(render(&nested_ifs(10)).unwrap(), "core");
    }

    #[test]
    fn test_blocks_past_limit_fail() {
        let err = render(&nested_ifs(MAX_BLOCK_NESTING + 1)).unwrap_err();
        assert_eq!(err.message, "template blocks nested too deeply");
        assert_eq!(err.offset, 0);
    }

    #[test]
    fn test_object_iterates_as_entries() {
        let Value::Object(map) = json!({"b": 1, "a": 2}) else {
            panic!("expected object");
        };
        assert_eq!(
            Value::Array(entries(map)),
            json!([{"Key": "b", "Value": 1}, {"Key": "a", "Value": 2}])
        );
    }
}
