//! Razor-style template compiler.
//!
//! Markup is copied through verbatim; `@` switches into code:
//!
//! ```text
//! @Model.Name  @(a + b)  @Html.Raw(x)  @{ let n = 1; }  @* comment *@  @@
//! @foreach it in Model.Items { ... }   @foreach (var it in Model.Items) { ... }
//! @if cond { ... } else if cond { ... } else { ... }
//! ```
//!
//! Expressions are handed to the script parser with their absolute offset,
//! so every diagnostic points into the template text. The compiler never
//! stops at the first problem.

use crate::script::ast::{Expr, ExprKind, Program};
use crate::script::diagnostic::{Diagnostic, Span};
use crate::script::parser::{is_keyword, parse_expression, parse_program};
use crate::script::resolve::Resolver;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    /// Interpolation; HTML-escaped unless written as `@Html.Raw(...)`.
    Expr { expr: Expr, raw: bool },
    Foreach {
        var: String,
        var_span: Span,
        source: Expr,
        body: Vec<Node>,
    },
    If {
        branches: Vec<(Expr, Vec<Node>)>,
        otherwise: Option<Vec<Node>>,
    },
    /// `@{ ... }`; declarations land in the enclosing scope.
    Code(Program),
}

/// Razor keywords this engine does not implement.
const UNSUPPORTED_DIRECTIVES: &[&str] = &[
    "for",
    "while",
    "do",
    "switch",
    "using",
    "section",
    "functions",
    "inherits",
    "helper",
    "try",
    "lock",
    "else",
    "let",
    "var",
    "page",
    "inject",
    "layout",
    "namespace",
];

/// Deepest `@foreach`/`@if` block nesting compiled and rendered.
pub const MAX_BLOCK_NESTING: usize = 64;

/// Parse `source` into nodes, collecting every syntax diagnostic.
pub fn parse_template(source: &str) -> (Vec<Node>, Vec<Diagnostic>) {
    let mut compiler = Compiler {
        src: source,
        pos: 0,
        nesting: 0,
        diagnostics: Vec::new(),
    };
    let nodes = compiler.nodes(None);
    (nodes, compiler.diagnostics)
}

/// Name-check every expression in `nodes`.
pub fn resolve_nodes(resolver: &mut Resolver<'_>, nodes: &[Node]) {
    for node in nodes {
        match node {
            Node::Text(_) => {}
            Node::Expr { expr, .. } => resolver.expr(expr),
            Node::Foreach {
                var,
                var_span,
                source,
                body,
            } => {
                resolver.expr(source);
                resolver.push_scope();
                resolver.declare(var, *var_span);
                resolve_nodes(resolver, body);
                resolver.pop_scope();
            }
            Node::If {
                branches,
                otherwise,
            } => {
                for (cond, body) in branches {
                    resolver.expr(cond);
                    resolver.push_scope();
                    resolve_nodes(resolver, body);
                    resolver.pop_scope();
                }
                if let Some(body) = otherwise {
                    resolver.push_scope();
                    resolve_nodes(resolver, body);
                    resolver.pop_scope();
                }
            }
            Node::Code(program) => resolver.program(program),
        }
    }
}

struct Block {
    open: usize,
    directive: &'static str,
}

struct Compiler<'s> {
    src: &'s str,
    pos: usize,
    /// Open blocks around `pos`.
    nesting: usize,
    diagnostics: Vec<Diagnostic>,
}

impl<'s> Compiler<'s> {
    fn error(&mut self, offset: usize, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::new(offset, message));
    }

    fn peek_char(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn skip_ws(&mut self) {
        self.pos += ws_len(&self.src[self.pos..]);
    }

    /// Consume `word` if it appears next as a whole identifier.
    fn eat_word(&mut self, word: &str) -> bool {
        let rest = &self.src[self.pos..];
        if rest.starts_with(word) && ident_len(rest) == word.len() {
            self.pos += word.len();
            true
        } else {
            false
        }
    }

    /// Markup up to the end of input, or up to the `}` closing `block`.
    fn nodes(&mut self, block: Option<Block>) -> Vec<Node> {
        if let Some(block) = &block
            && self.nesting >= MAX_BLOCK_NESTING
        {
            self.error(block.open, "template blocks nested too deeply");
            self.pos = find_close(self.src, block.open).map_or(self.src.len(), |close| close + 1);
            return Vec::new();
        }
        self.nesting += 1;
        let nodes = self.markup(block);
        self.nesting -= 1;
        nodes
    }

    fn markup(&mut self, block: Option<Block>) -> Vec<Node> {
        let mut nodes = Vec::new();
        let mut text = String::new();
        let mut depth = 0usize;

        while let Some(c) = self.peek_char() {
            match c {
                '@' => {
                    if let Some(node) = self.directive(&mut text) {
                        flush(&mut text, &mut nodes);
                        nodes.push(node);
                    }
                }
                '{' if block.is_some() => {
                    depth += 1;
                    text.push(c);
                    self.pos += 1;
                }
                '}' if block.is_some() => {
                    self.pos += 1;
                    if depth == 0 {
                        flush(&mut text, &mut nodes);
                        return nodes;
                    }
                    depth -= 1;
                    text.push(c);
                }
                _ => {
                    text.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }

        flush(&mut text, &mut nodes);
        if let Some(block) = block {
            self.error(
                block.open,
                format!("unclosed `{{` for `@{}` block", block.directive),
            );
        }
        nodes
    }

    /// Handle the `@` at `self.pos`. Literal output goes to `text`.
    fn directive(&mut self, text: &mut String) -> Option<Node> {
        let at = self.pos;
        let after_word = self.src[..at]
            .chars()
            .next_back()
            .is_some_and(char::is_alphanumeric);
        self.pos += 1;
        if after_word {
            // e-mail address
            text.push('@');
            return None;
        }

        match self.peek_char() {
            Some('@') => {
                self.pos += 1;
                text.push('@');
                None
            }
            Some('*') => {
                self.comment(at);
                None
            }
            Some('(') => self.explicit(at),
            Some('{') => self.code_block(at),
            Some(c) if is_ident_start(c) => self.keyword_or_implicit(at),
            _ => {
                self.error(
                    at,
                    "`@` must be followed by an expression, a directive, `@@` or `@*`",
                );
                None
            }
        }
    }

    fn comment(&mut self, at: usize) {
        match self.src[self.pos..].find("*@") {
            Some(end) => self.pos += end + 2,
            None => {
                self.error(at, "unterminated `@*` comment");
                self.pos = self.src.len();
            }
        }
    }

    fn explicit(&mut self, at: usize) -> Option<Node> {
        let src = self.src;
        let open = self.pos;
        let Some(close) = find_close(src, open) else {
            self.error(at, "unclosed `@(`");
            self.pos = src.len();
            return None;
        };
        self.pos = close + 1;

        let inner = &src[open + 1..close];
        if inner.trim().is_empty() {
            self.error(at, "empty `@()` expression");
            return None;
        }
        self.expression(inner, open + 1)
    }

    fn code_block(&mut self, at: usize) -> Option<Node> {
        let src = self.src;
        let open = self.pos;
        let Some(close) = find_close(src, open) else {
            self.error(at, "unclosed `@{` code block");
            self.pos = src.len();
            return None;
        };
        self.pos = close + 1;

        let (program, mut diagnostics) = parse_program(&src[open + 1..close], open + 1);
        if diagnostics.is_empty() {
            Some(Node::Code(program))
        } else {
            self.diagnostics.append(&mut diagnostics);
            None
        }
    }

    fn keyword_or_implicit(&mut self, at: usize) -> Option<Node> {
        let src = self.src;
        let rest = &src[self.pos..];
        let word = &rest[..ident_len(rest)];
        match word {
            "foreach" => {
                self.pos += word.len();
                self.foreach(at)
            }
            "if" => {
                self.pos += word.len();
                self.if_chain(at)
            }
            "model" => {
                // type declaration, accepted and ignored
                self.pos = rest
                    .find('\n')
                    .map_or(src.len(), |nl| self.pos + nl + 1);
                None
            }
            w if UNSUPPORTED_DIRECTIVES.contains(&w) => {
                self.error(at, format!("unknown directive `@{w}`"));
                self.pos += w.len();
                None
            }
            _ => self.implicit(),
        }
    }

    /// `name(.member | [index] | (args))*`
    fn implicit(&mut self) -> Option<Node> {
        let src = self.src;
        let start = self.pos;
        let mut end = start + ident_len(&src[start..]);

        loop {
            let rest = &src[end..];
            if rest.starts_with('.') && rest[1..].chars().next().is_some_and(is_ident_start) {
                end += 1 + ident_len(&rest[1..]);
            } else if rest.starts_with('[') || rest.starts_with('(') {
                match find_close(src, end) {
                    Some(close) => end = close + 1,
                    None => {
                        self.error(end, format!("unclosed `{}` in expression", &rest[..1]));
                        self.pos = src.len();
                        return None;
                    }
                }
            } else {
                break;
            }
        }

        self.pos = end;
        self.expression(&src[start..end], start)
    }

    fn expression(&mut self, text: &str, offset: usize) -> Option<Node> {
        match parse_expression(text, offset) {
            Ok(expr) => self.output(expr),
            Err(mut diagnostics) => {
                self.diagnostics.append(&mut diagnostics);
                None
            }
        }
    }

    /// Interpolation node, unwrapping `Html.Raw(...)`.
    fn output(&mut self, expr: Expr) -> Option<Node> {
        if let ExprKind::Call(callee, args) = &expr.kind
            && let ExprKind::Member(target, helper) = &callee.kind
            && matches!(&target.kind, ExprKind::Name(name) if name == "Html")
        {
            if helper != "Raw" {
                self.error(
                    expr.span.start,
                    format!("`Html.{helper}` is not supported; only `Html.Raw` is available"),
                );
                return None;
            }
            let [arg] = args.as_slice() else {
                self.error(expr.span.start, "`Html.Raw` takes exactly one argument");
                return None;
            };
            return Some(Node::Expr {
                expr: arg.clone(),
                raw: true,
            });
        }
        Some(Node::Expr { expr, raw: false })
    }

    fn foreach(&mut self, at: usize) -> Option<Node> {
        let src = self.src;
        self.skip_ws();

        let (header, header_start) = if self.peek_char() == Some('(') {
            let open = self.pos;
            let Some(close) = find_close(src, open) else {
                self.error(at, "unclosed `(` in `@foreach` header");
                self.pos = src.len();
                return None;
            };
            self.pos = close + 1;
            (&src[open + 1..close], open + 1)
        } else {
            let start = self.pos;
            let Some(brace) = find_top_level_brace(src, start) else {
                self.error(at, "expected `{` after `@foreach` header");
                self.pos = src.len();
                return None;
            };
            self.pos = brace;
            (&src[start..brace], start)
        };

        let parsed = match split_foreach_header(header, header_start) {
            Some((var, var_span, source, offset)) => match parse_expression(source, offset) {
                Ok(expr) => Some((var, var_span, expr)),
                Err(mut diagnostics) => {
                    self.diagnostics.append(&mut diagnostics);
                    None
                }
            },
            None => {
                self.error(
                    header_start,
                    "expected `<name> in <expression>` in `@foreach` header",
                );
                None
            }
        };

        self.skip_ws();
        if self.peek_char() != Some('{') {
            self.error(self.pos, "expected `{` to open the `@foreach` body");
            return None;
        }
        let open = self.pos;
        self.pos += 1;
        let body = self.nodes(Some(Block {
            open,
            directive: "foreach",
        }));

        let (var, var_span, source) = parsed?;
        Some(Node::Foreach {
            var,
            var_span,
            source,
            body,
        })
    }

    fn if_chain(&mut self, at: usize) -> Option<Node> {
        let src = self.src;
        let mut branches = Vec::new();
        let mut otherwise = None;
        let mut valid = true;

        loop {
            self.skip_ws();
            let start = self.pos;
            let Some(brace) = find_top_level_brace(src, start) else {
                self.error(at, "expected `{` after `@if` condition");
                self.pos = src.len();
                return None;
            };
            let text = &src[start..brace];
            let cond = if text.trim().is_empty() {
                self.error(start, "`@if` requires a condition");
                None
            } else {
                match parse_expression(text, start) {
                    Ok(expr) => Some(expr),
                    Err(mut diagnostics) => {
                        self.diagnostics.append(&mut diagnostics);
                        None
                    }
                }
            };

            self.pos = brace + 1;
            let body = self.nodes(Some(Block {
                open: brace,
                directive: "if",
            }));
            match cond {
                Some(cond) => branches.push((cond, body)),
                None => valid = false,
            }

            let save = self.pos;
            self.skip_ws();
            if !self.eat_word("else") {
                self.pos = save;
                break;
            }
            self.skip_ws();
            if self.eat_word("if") {
                continue;
            }
            if self.peek_char() == Some('{') {
                let open = self.pos;
                self.pos += 1;
                otherwise = Some(self.nodes(Some(Block {
                    open,
                    directive: "else",
                })));
            } else {
                self.error(self.pos, "expected `{` or `if` after `else`");
                valid = false;
            }
            break;
        }

        valid.then_some(Node::If {
            branches,
            otherwise,
        })
    }
}

fn flush(text: &mut String, nodes: &mut Vec<Node>) {
    if !text.is_empty() {
        nodes.push(Node::Text(std::mem::take(text)));
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn ident_len(s: &str) -> usize {
    let mut chars = s.char_indices();
    match chars.next() {
        Some((_, c)) if is_ident_start(c) => {}
        _ => return 0,
    }
    chars
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
        .map_or(s.len(), |(i, _)| i)
}

fn ws_len(s: &str) -> usize {
    s.len() - s.trim_start().len()
}

/// `[var] name in expr`, returning the name, its span and the source text
/// with its absolute offset.
fn split_foreach_header(header: &str, base: usize) -> Option<(String, Span, &str, usize)> {
    let mut i = ws_len(header);
    if let Some(after) = header[i..].strip_prefix("var")
        && after.starts_with(char::is_whitespace)
    {
        i += 3;
        i += ws_len(&header[i..]);
    }

    let len = ident_len(&header[i..]);
    let name = &header[i..i + len];
    if len == 0 || is_keyword(name) || name == "in" {
        return None;
    }
    let span = Span::new(base + i, base + i + len);
    i += len;

    let ws = ws_len(&header[i..]);
    if ws == 0 {
        return None;
    }
    i += ws;
    let after_in = header[i..].strip_prefix("in")?;
    if !after_in.starts_with(char::is_whitespace) {
        return None;
    }
    i += 2;

    let source = &header[i..];
    if source.trim().is_empty() {
        return None;
    }
    Some((name.to_string(), span, source, base + i))
}

/// Index of the quote closing the string that opens at `i`.
fn skip_string(bytes: &[u8], i: usize) -> Option<usize> {
    let verbatim = i > 0 && bytes[i - 1] == b'@';
    let mut j = i + 1;
    while j < bytes.len() {
        match bytes[j] {
            b'"' if verbatim && bytes.get(j + 1) == Some(&b'"') => j += 2,
            b'"' => return Some(j),
            b'\\' if !verbatim => j += 2,
            _ => j += 1,
        }
    }
    None
}

/// Index of the bracket matching the one at `open`, skipping string
/// literals and comments.
fn find_close(src: &str, open: usize) -> Option<usize> {
    let bytes = src.as_bytes();
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            b'"' => i = skip_string(bytes, i)?,
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                i = src[i..].find('\n').map_or(bytes.len(), |nl| i + nl);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = src[i + 2..].find("*/").map(|end| i + 2 + end + 1)?;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// First `{` at bracket depth zero from `start`, outside string literals.
fn find_top_level_brace(src: &str, start: usize) -> Option<usize> {
    let bytes = src.as_bytes();
    let mut depth = 0usize;
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth = depth.saturating_sub(1),
            b'{' if depth == 0 => return Some(i),
            b'"' => i = skip_string(bytes, i)?,
            _ => {}
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Vec<Node> {
        let (nodes, diagnostics) = parse_template(src);
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        nodes
    }

    fn errors(src: &str) -> Vec<(usize, String)> {
        let (_, diagnostics) = parse_template(src);
        diagnostics.into_iter().map(|d| (d.offset, d.message)).collect()
    }

    #[test]
    fn test_deep_blocks_reported_once() {
        let depth = MAX_BLOCK_NESTING + 36;
        let src = format!("{}x{}after", "@if true {".repeat(depth), "}".repeat(depth));
        let (nodes, diagnostics) = parse_template(&src);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].offset, (MAX_BLOCK_NESTING - 1) * 10 + 9);
        assert_eq!(diagnostics[0].message, "template blocks nested too deeply");
        assert_eq!(nodes.last(), Some(&Node::Text("after".to_string())));
    }

    #[test]
    fn test_deep_expression_in_template() {
        let src = format!("<p>@({}1{})</p>", "(".repeat(300), ")".repeat(300));
        let errors = errors(&src);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].1, "expression nested too deeply");
    }

    #[test]
    fn test_implicit_expression_stops_at_markup() {
        let nodes = parse("<h1>Hello @Model.Name</h1>.");
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0], Node::Text("<h1>Hello ".to_string()));
        let Node::Expr { expr, raw } = &nodes[1] else {
            panic!("expected expression, got {:?}", nodes[1]);
        };
        assert!(!raw);
        assert_eq!(expr.span, Span::new(11, 21));
        assert_eq!(nodes[2], Node::Text("</h1>.".to_string()));
    }

    #[test]
    fn test_trailing_dot_is_markup() {
        let nodes = parse("Hi @Model.Name.");
        assert_eq!(nodes.last(), Some(&Node::Text(".".to_string())));
    }

    #[test]
    fn test_literal_at_forms() {
        let nodes = parse("mail me@example.com or @@handle @* note *@!");
        assert_eq!(
            nodes,
            vec![Node::Text("mail me@example.com or @handle !".to_string())]
        );
    }

    #[test]
    fn test_foreach_forms() {
        for src in [
            "@foreach it in Model.Items {<li>@it</li>}",
            "@foreach (var it in Model.Items) {<li>@it</li>}",
        ] {
            let nodes = parse(src);
            let [Node::Foreach { var, body, .. }] = nodes.as_slice() else {
                panic!("expected one foreach in {src:?}");
            };
            assert_eq!(var, "it");
            assert_eq!(body.len(), 3);
        }
    }

    #[test]
    fn test_if_else_chain() {
        let nodes = parse("@if Model.A {a} else if (Model.B) {b} else {c}");
        let [Node::If { branches, otherwise }] = nodes.as_slice() else {
            panic!("expected one if");
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(otherwise.as_deref(), Some(&[Node::Text("c".to_string())][..]));
    }

    #[test]
    fn test_braces_in_markup_blocks() {
        let nodes = parse("@if Model.A {<style>p { color: red }</style>}");
        let [Node::If { branches, .. }] = nodes.as_slice() else {
            panic!("expected one if");
        };
        assert_eq!(
            branches[0].1,
            vec![Node::Text("<style>p { color: red }</style>".to_string())]
        );
    }

    #[test]
    fn test_html_raw_and_explicit() {
        let nodes = parse("@Html.Raw(Model.Body)@(1 + 2)");
        assert!(matches!(nodes[0], Node::Expr { raw: true, .. }));
        assert!(matches!(nodes[1], Node::Expr { raw: false, .. }));
    }

    #[test]
    fn test_model_directive_ignored() {
        assert_eq!(
            parse("@model dynamic\n<p></p>"),
            vec![Node::Text("<p></p>".to_string())]
        );
    }

    #[test]
    fn test_strings_inside_code_hide_brackets() {
        let nodes = parse(r#"@("a)b") @{ let s = "}"; }"#);
        assert!(matches!(nodes[0], Node::Expr { .. }));
        assert!(matches!(nodes.last(), Some(Node::Code(_))));
    }

    #[test]
    fn test_collects_every_error() {
        let errs = errors("@for x\n@( 1 +\n");
        assert_eq!(errs[0], (0, "unknown directive `@for`".to_string()));
        assert_eq!(errs[1], (7, "unclosed `@(`".to_string()));
        assert_eq!(errs.len(), 2);

        let errs = errors("@foreach it in Model.Items {<li>@it</li>");
        assert_eq!(errs, vec![(27, "unclosed `{` for `@foreach` block".to_string())]);

        let errs = errors("a @ b @*");
        assert_eq!(errs.len(), 2);
        assert_eq!(errs[1].1, "unterminated `@*` comment");
    }

    #[test]
    fn test_bad_foreach_header() {
        let errs = errors("@foreach Model.Items {x}");
        assert_eq!(errs.len(), 1);
        assert!(errs[0].1.contains("in <expression>"));
    }
}
