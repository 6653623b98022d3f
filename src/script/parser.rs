//! Script parser built from chumsky combinators.
//!
//! Operators go through a Pratt parser. A statement that fails to parse is
//! reported and skipped up to the next `;`, so one pass reports every
//! broken statement.

use chumsky::{input::ValueInput, pratt::*, prelude::*};

use super::ast::{BinaryOp, Expr, ExprKind, Lambda, MAX_DEPTH, Program, Segment, Stmt, UnaryOp};
use super::diagnostic::{Diagnostic, Span};
use super::lexer::{InterpPart, Spanned, Token, tokenize};

pub type ParseError<'tokens> = Rich<'tokens, Token>;
type Extra<'tokens> = extra::Err<ParseError<'tokens>>;

/// Deepest bracket nesting accepted, interpolation holes included.
const MAX_NESTING: usize = 64;

/// Parse a statement sequence. Always returns a (possibly partial) program.
pub fn parse_program(source: &str, base: usize) -> (Program, Vec<Diagnostic>) {
    let (tokens, mut diagnostics) = tokenize(source, base);
    if let Some(diagnostic) = check_nesting(&tokens, 0, 0) {
        diagnostics.push(diagnostic);
        return (Program::default(), diagnostics);
    }

    let (stmts, errors) = program()
        .parse(tokens.as_slice().map(eoi(base + source.len()), |(t, s)| (t, s)))
        .into_output_errors();
    diagnostics.extend(errors.iter().map(|error| Diagnostic::from_rich(error, 0)));
    let program = Program {
        stmts: stmts.unwrap_or_default(),
    };
    (program, diagnostics)
}

/// Parse a single expression spanning all of `source`.
pub fn parse_expression(source: &str, base: usize) -> Result<Expr, Vec<Diagnostic>> {
    let (tokens, diagnostics) = tokenize(source, base);
    if !diagnostics.is_empty() {
        return Err(diagnostics);
    }
    if let Some(diagnostic) = check_nesting(&tokens, 0, 0) {
        return Err(vec![diagnostic]);
    }

    let (expr, errors) = expression()
        .then_ignore(end())
        .parse(tokens.as_slice().map(eoi(base + source.len()), |(t, s)| (t, s)))
        .into_output_errors();
    match expr {
        Some(expr) if errors.is_empty() => Ok(expr),
        _ => Err(errors.iter().map(|error| Diagnostic::from_rich(error, 0)).collect()),
    }
}

/// Identifiers with a fixed meaning in expression position.
pub fn is_keyword(name: &str) -> bool {
    matches!(name, "new" | "true" | "false" | "null" | "let" | "var")
}

fn eoi(offset: usize) -> SimpleSpan {
    SimpleSpan::from(offset..offset)
}

fn span(span: SimpleSpan) -> Span {
    Span::new(span.start, span.end)
}

// ============================================================================
// Nesting limit
// ============================================================================

/// Reject input whose tree would nest deeper than [`MAX_DEPTH`] before any
/// recursive parsing starts.
///
/// Depth is estimated from the tokens: every open bracket adds a level, and
/// so does every operator chained inside the current bracket. Interpolation
/// holes continue the count of the string they sit in.
fn check_nesting(tokens: &[Spanned<Token>], brackets: usize, depth: usize) -> Option<Diagnostic> {
    let mut chains = vec![0usize];
    let mut depth = depth;

    for (token, at) in tokens {
        match token {
            Token::LParen | Token::LBracket | Token::LBrace => {
                chains.push(0);
                depth += 1;
            }
            Token::RParen | Token::RBracket | Token::RBrace if chains.len() > 1 => {
                let chain = chains.pop().unwrap_or_default();
                depth -= chain + 1;
            }
            Token::Comma | Token::Semi => {
                if let Some(chain) = chains.last_mut() {
                    depth -= *chain;
                    *chain = 0;
                }
            }
            Token::Interpolated(parts) => {
                let open = brackets + chains.len();
                for part in parts {
                    if let InterpPart::Code { source, offset } = part {
                        let (inner, _) = tokenize(source, *offset);
                        if let Some(diagnostic) = check_nesting(&inner, open, depth + 1) {
                            return Some(diagnostic);
                        }
                    }
                }
            }
            token if token.is_operator() => {
                if let Some(chain) = chains.last_mut() {
                    *chain += 1;
                }
                depth += 1;
            }
            _ => {}
        }

        if brackets + chains.len() - 1 > MAX_NESTING || depth > MAX_DEPTH {
            return Some(Diagnostic::new(at.start, "expression nested too deeply"));
        }
    }
    None
}

// ============================================================================
// Grammar
// ============================================================================

fn program<'tokens, I>() -> impl Parser<'tokens, I, Vec<Stmt>, Extra<'tokens>>
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    let expr = expression();

    let name = identifier().validate(|(name, at), _, emitter| {
        if is_keyword(&name) {
            emitter.emit(Rich::custom(
                at,
                format!("`{name}` is a keyword and cannot be used as a name"),
            ));
        }
        name
    });
    let declaration = keyword("let")
        .or(keyword("var"))
        .ignore_then(name)
        .then_ignore(just(Token::Assign))
        .then(expr.clone())
        .map_with(|(name, value), e| Stmt::Let {
            name,
            value,
            span: span(e.span()),
        });

    let terminator = just(Token::Semi).ignored().or(end()).labelled("`;`");

    let statement = declaration
        .or(expr.map(Stmt::Expr))
        .then_ignore(terminator)
        .map(Some)
        .recover_with(via_parser(
            none_of([Token::Semi])
                .repeated()
                .at_least(1)
                .then(just(Token::Semi).or_not())
                .to(None),
        ));

    just(Token::Semi)
        .to(None)
        .or(statement)
        .repeated()
        .collect::<Vec<_>>()
        .map(|stmts| stmts.into_iter().flatten().collect())
}

fn expression<'tokens, I>() -> impl Parser<'tokens, I, Expr, Extra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    recursive(|expr| {
        let list = |open: Token, close: Token| {
            expr.clone()
                .separated_by(just(Token::Comma))
                .allow_trailing()
                .collect::<Vec<_>>()
                .delimited_by(just(open), just(close))
        };

        let literal = select! {
            Token::Int(n) => ExprKind::Int(n),
            Token::Float(n) => ExprKind::Float(n),
            Token::Str(text) => ExprKind::Str(text),
            Token::Ident(word) if word == "true" => ExprKind::Bool(true),
            Token::Ident(word) if word == "false" => ExprKind::Bool(false),
            Token::Ident(word) if word == "null" => ExprKind::Null,
            Token::Ident(name) if !is_keyword(&name) => ExprKind::Name(name),
        }
        .map_with(|kind, e| Expr::new(kind, span(e.span())));

        let interpolated = select! { Token::Interpolated(parts) => parts }.validate(
            |parts: Vec<InterpPart>, e, emitter| {
                let mut segments = Vec::with_capacity(parts.len());
                for part in parts {
                    match part {
                        InterpPart::Text(text) => segments.push(Segment::Text(text)),
                        InterpPart::Code { source, offset } => match hole(&source, offset) {
                            Ok(expr) => segments.push(Segment::Expr(expr)),
                            Err(diagnostics) => {
                                for diagnostic in diagnostics {
                                    emitter.emit(Rich::custom(
                                        eoi(diagnostic.offset),
                                        diagnostic.message,
                                    ));
                                }
                            }
                        },
                    }
                }
                Expr::new(ExprKind::Interpolated(segments), span(e.span()))
            },
        );

        // x => ..., () => ..., (a, b) => ...
        let param = identifier().filter(|(name, _)| !is_keyword(name));
        let params = param.clone().map(|param| vec![param]).or(param
            .separated_by(just(Token::Comma))
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LParen), just(Token::RParen)));
        let lambda = params
            .then_ignore(just(Token::Arrow))
            .then(expr.clone())
            .validate(|(params, body): (Vec<(String, SimpleSpan)>, Expr), e, emitter| {
                let mut names: Vec<String> = Vec::with_capacity(params.len());
                for (name, at) in params {
                    if names.contains(&name) {
                        emitter.emit(Rich::custom(at, format!("duplicate lambda parameter `{name}`")));
                    }
                    names.push(name);
                }
                let lambda = Lambda {
                    params: names,
                    body: Box::new(body),
                };
                Expr::new(ExprKind::Lambda(lambda), span(e.span()))
            });

        let new_array = keyword("new")
            .ignore_then(just(Token::LBracket))
            .ignore_then(just(Token::RBracket))
            .ignore_then(list(Token::LBrace, Token::RBrace))
            .map_with(|items, e| Expr::new(ExprKind::Array(items), span(e.span())));

        // `Name = value`, or a projection that borrows the name of its last member
        let member = choice((
            identifier()
                .then_ignore(just(Token::Assign))
                .then(expr.clone())
                .map(|((name, at), value)| Some((name, at, value))),
            expr.clone().validate(|value: Expr, e, emitter| {
                let name = match &value.kind {
                    ExprKind::Name(name) | ExprKind::Member(_, name) => Some(name.clone()),
                    _ => None,
                };
                match name {
                    Some(name) => Some((name, e.span(), value)),
                    None => {
                        emitter.emit(Rich::custom(e.span(), "invalid anonymous type member declarator"));
                        None
                    }
                }
            }),
        ));
        let new_object = keyword("new")
            .ignore_then(
                member
                    .separated_by(just(Token::Comma))
                    .allow_trailing()
                    .collect::<Vec<_>>()
                    .delimited_by(just(Token::LBrace), just(Token::RBrace)),
            )
            .validate(|members: Vec<Option<(String, SimpleSpan, Expr)>>, e, emitter| {
                let mut fields: Vec<(String, Expr)> = Vec::with_capacity(members.len());
                for (name, at, value) in members.into_iter().flatten() {
                    if fields.iter().any(|(existing, _)| *existing == name) {
                        emitter.emit(Rich::custom(
                            at,
                            format!("anonymous type cannot have multiple members named `{name}`"),
                        ));
                    } else {
                        fields.push((name, value));
                    }
                }
                Expr::new(ExprKind::Object(fields), span(e.span()))
            });

        // `new List()` and friends: report, then parse on as if it were null
        let new_named = keyword("new")
            .ignore_then(none_of([Token::LBrace, Token::LBracket]).map_with(|_, e| e.span()))
            .validate(|at: SimpleSpan, _, emitter| {
                emitter.emit(Rich::custom(
                    at,
                    "only anonymous objects (`new { ... }`) and implicitly typed arrays \
                     (`new [] { ... }`) can be created",
                ));
                Expr::new(ExprKind::Null, span(at))
            });

        let array = list(Token::LBracket, Token::RBracket)
            .map_with(|items, e| Expr::new(ExprKind::Array(items), span(e.span())));

        let atom = choice((
            lambda,
            interpolated,
            literal,
            expr.clone().delimited_by(just(Token::LParen), just(Token::RParen)),
            array,
            new_array,
            new_object,
            new_named,
        ));

        // any identifier is a member name after `.`, keywords included
        let member_access = just(Token::Dot).ignore_then(identifier());
        let index = expr
            .clone()
            .delimited_by(just(Token::LBracket), just(Token::RBracket))
            .map_with(|index, e| (index, e.span()));
        let arguments = list(Token::LParen, Token::RParen).map_with(|args, e| (args, e.span()));

        atom.pratt((
            postfix(10, member_access, |target: Expr, (name, at): (String, SimpleSpan), _| {
                let full = target.span.to(span(at));
                Expr::new(ExprKind::Member(Box::new(target), name), full)
            }),
            postfix(10, index, |target: Expr, (index, at): (Expr, SimpleSpan), _| {
                let full = target.span.to(span(at));
                Expr::new(ExprKind::Index(Box::new(target), Box::new(index)), full)
            }),
            postfix(10, arguments, |callee: Expr, (args, at): (Vec<Expr>, SimpleSpan), _| {
                let full = callee.span.to(span(at));
                Expr::new(ExprKind::Call(Box::new(callee), args), full)
            }),
            prefix(9, unary_op(), |(op, at): (UnaryOp, SimpleSpan), operand: Expr, _| {
                let full = span(at).to(operand.span);
                Expr::new(ExprKind::Unary(op, Box::new(operand)), full)
            }),
            infix(
                left(8),
                select! {
                    Token::Star => BinaryOp::Mul,
                    Token::Slash => BinaryOp::Div,
                    Token::Percent => BinaryOp::Rem,
                },
                |l, op, r, _| binary(op, l, r),
            ),
            infix(
                left(7),
                select! {
                    Token::Plus => BinaryOp::Add,
                    Token::Minus => BinaryOp::Sub,
                },
                |l, op, r, _| binary(op, l, r),
            ),
            infix(
                left(6),
                select! {
                    Token::Lt => BinaryOp::Lt,
                    Token::LtEq => BinaryOp::LtEq,
                    Token::Gt => BinaryOp::Gt,
                    Token::GtEq => BinaryOp::GtEq,
                },
                |l, op, r, _| binary(op, l, r),
            ),
            infix(
                left(5),
                select! {
                    Token::EqEq => BinaryOp::Eq,
                    Token::NotEq => BinaryOp::NotEq,
                },
                |l, op, r, _| binary(op, l, r),
            ),
            infix(left(4), just(Token::AndAnd).to(BinaryOp::And), |l, op, r, _| binary(op, l, r)),
            infix(left(3), just(Token::OrOr).to(BinaryOp::Or), |l, op, r, _| binary(op, l, r)),
            infix(
                right(2),
                just(Token::QuestionQuestion).to(BinaryOp::Coalesce),
                |l, op, r, _| binary(op, l, r),
            ),
            // `cond ? then : otherwise`, with `? then :` as the operator
            infix(
                right(1),
                expr.clone().delimited_by(just(Token::Question), just(Token::Colon)),
                |cond: Expr, then: Expr, otherwise: Expr, _| {
                    let full = cond.span.to(otherwise.span);
                    Expr::new(
                        ExprKind::Conditional(Box::new(cond), Box::new(then), Box::new(otherwise)),
                        full,
                    )
                },
            ),
        ))
        .labelled("expression")
    })
}

fn identifier<'tokens, I>() -> impl Parser<'tokens, I, (String, SimpleSpan), Extra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    select! { Token::Ident(name) => name }
        .map_with(|name, e| (name, e.span()))
        .labelled("identifier")
}

fn keyword<'tokens, I>(word: &'static str) -> impl Parser<'tokens, I, (), Extra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    just(Token::Ident(word.to_string())).ignored()
}

fn unary_op<'tokens, I>() -> impl Parser<'tokens, I, (UnaryOp, SimpleSpan), Extra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    select! {
        Token::Bang => UnaryOp::Not,
        Token::Minus => UnaryOp::Neg,
    }
    .map_with(|op, e| (op, e.span()))
}

/// Parse the code of an interpolation hole.
fn hole(source: &str, offset: usize) -> Result<Expr, Vec<Diagnostic>> {
    if source.trim().is_empty() {
        return Err(vec![Diagnostic::new(offset, "empty interpolation hole")]);
    }
    parse_expression(source, offset)
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    let full = left.span.to(right.span);
    Expr::new(ExprKind::Binary(op, Box::new(left), Box::new(right)), full)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(src: &str) -> Expr {
        parse_expression(src, 0).unwrap_or_else(|d| panic!("{src}: {d:?}"))
    }

    #[test]
    fn test_precedence() {
        let e = expr("1 + 2 * 3 == 7 && !false");
        let ExprKind::Binary(BinaryOp::And, left, right) = e.kind else {
            panic!("expected &&");
        };
        assert!(matches!(right.kind, ExprKind::Unary(UnaryOp::Not, _)));
        let ExprKind::Binary(BinaryOp::Eq, sum, _) = left.kind else {
            panic!("expected ==");
        };
        let ExprKind::Binary(BinaryOp::Add, _, product) = sum.kind else {
            panic!("expected +");
        };
        assert!(matches!(product.kind, ExprKind::Binary(BinaryOp::Mul, _, _)));
    }

    #[test]
    fn test_associativity() {
        // left: (10 - 4) - 3
        let ExprKind::Binary(BinaryOp::Sub, left, _) = expr("10 - 4 - 3").kind else {
            panic!("expected -");
        };
        assert!(matches!(left.kind, ExprKind::Binary(BinaryOp::Sub, _, _)));

        // right: a ?? (b ?? c)
        let ExprKind::Binary(BinaryOp::Coalesce, left, right) = expr("a ?? b ?? c").kind else {
            panic!("expected ??");
        };
        assert!(matches!(left.kind, ExprKind::Name(_)));
        assert!(matches!(right.kind, ExprKind::Binary(BinaryOp::Coalesce, _, _)));
    }

    #[test]
    fn test_conditional_binds_loosest() {
        let e = expr("a || b ? 1 : c ? 2 : 3");
        let ExprKind::Conditional(cond, _, otherwise) = e.kind else {
            panic!("expected ?:");
        };
        assert!(matches!(cond.kind, ExprKind::Binary(BinaryOp::Or, _, _)));
        assert!(matches!(otherwise.kind, ExprKind::Conditional(..)));
    }

    #[test]
    fn test_postfix_chain_and_spans() {
        let e = expr("-xs[0].Name.ToUpper()");
        assert_eq!(e.span, Span::new(0, 21));
        let ExprKind::Unary(UnaryOp::Neg, call) = e.kind else {
            panic!("expected unary minus");
        };
        let ExprKind::Call(callee, args) = call.kind else {
            panic!("expected call");
        };
        assert!(args.is_empty());
        assert_eq!(callee.root_name(), Some("xs"));
    }

    #[test]
    fn test_anonymous_object_and_arrays() {
        let e = expr(r#"new { Name = "Welt", Items = ["Alpha", "Beta"], Old = new [] { 1, 2, } }"#);
        let ExprKind::Object(members) = e.kind else {
            panic!("expected object");
        };
        let names: Vec<_> = members.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["Name", "Items", "Old"]);
        assert!(matches!(&members[2].1.kind, ExprKind::Array(items) if items.len() == 2));
    }

    #[test]
    fn test_projection_member_names() {
        let e = expr("new { x, p.Name }");
        let ExprKind::Object(members) = e.kind else {
            panic!("expected object");
        };
        assert_eq!(members[0].0, "x");
        assert_eq!(members[1].0, "Name");
    }

    #[test]
    fn test_lambdas() {
        let e = expr("xs.Aggregate(0, (acc, x) => acc + x)");
        let ExprKind::Call(_, args) = e.kind else {
            panic!("expected call");
        };
        assert!(matches!(&args[1].kind, ExprKind::Lambda(l) if l.params == ["acc", "x"]));
        assert!(matches!(expr("x => x * 2").kind, ExprKind::Lambda(_)));
        assert!(matches!(expr("() => 1").kind, ExprKind::Lambda(_)));
        // parenthesized expression, not a lambda
        assert!(matches!(expr("(a)").kind, ExprKind::Name(_)));
    }

    #[test]
    fn test_duplicate_lambda_parameter() {
        let diagnostics = parse_expression("(a, a) => a", 0).unwrap_err();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].offset, 4);
        assert!(diagnostics[0].message.contains("duplicate lambda parameter `a`"));
    }

    #[test]
    fn test_keyword_member_names() {
        let e = expr("Model.if.foreach");
        assert!(matches!(e.kind, ExprKind::Member(_, ref name) if name == "foreach"));
    }

    #[test]
    fn test_interpolation_errors_point_into_hole() {
        let diagnostics = parse_expression(r#"$"a{1 +}""#, 0).unwrap_err();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].offset, 7);

        let diagnostics = parse_expression(r#"$"a{ }""#, 0).unwrap_err();
        assert_eq!(diagnostics[0].message, "empty interpolation hole");
    }

    #[test]
    fn test_program_recovers_per_statement() {
        let (program, diagnostics) = parse_program("let a = ;\nlet b = 2;\nb +;\nb", 0);
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].offset, 8);
        assert!(diagnostics[0].message.contains("expected expression"));
        assert_eq!(program.stmts.len(), 2);
    }

    #[test]
    fn test_keyword_as_declared_name() {
        let (_, diagnostics) = parse_program("let null = 1;", 0);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].offset, 4);
        assert!(diagnostics[0].message.contains("keyword"));
    }

    #[test]
    fn test_unmatched_brace() {
        let (_, diagnostics) = parse_program(r#"new { Name = "Welt""#, 0);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("`}`"));
    }

    #[test]
    fn test_missing_semicolon() {
        let (_, diagnostics) = parse_program("let a = 1\nlet b = 2", 0);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].offset, 10);
        assert!(diagnostics[0].message.contains("expected `;`"));
    }

    #[test]
    fn test_duplicate_members_reported() {
        let (_, diagnostics) = parse_program("new { A = 1, A = 2 }", 0);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("multiple members named `A`"));
    }

    #[test]
    fn test_named_types_rejected() {
        let (_, diagnostics) = parse_program("new List()", 0);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("anonymous objects"));
    }

    #[test]
    fn test_deep_parentheses_rejected() {
        let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        let diagnostics = parse_expression(&deep, 0).unwrap_err();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].offset, MAX_NESTING);
        assert_eq!(diagnostics[0].message, "expression nested too deeply");

        let shallow = format!("{}1{}", "(".repeat(20), ")".repeat(20));
        assert!(matches!(expr(&shallow).kind, ExprKind::Int(1)));
    }

    #[test]
    fn test_long_operator_chains_rejected() {
        let chain = format!("1{}", " + 1".repeat(MAX_DEPTH + 10));
        let diagnostics = parse_expression(&chain, 0).unwrap_err();
        assert!(diagnostics[0].message.contains("nested too deeply"));

        let (program, diagnostics) = parse_program(&format!("{}true", "!".repeat(1000)), 0);
        assert!(program.stmts.is_empty());
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("nested too deeply"));
    }

    #[test]
    fn test_nesting_counts_through_interpolation() {
        let inner = format!("{}1{}", "(".repeat(40), ")".repeat(40));
        let source = format!("{}$\"{{{inner}}}\"{}", "(".repeat(40), ")".repeat(40));
        let diagnostics = parse_expression(&source, 0).unwrap_err();
        assert!(diagnostics[0].message.contains("nested too deeply"));
    }
}
