//! Script tokenizer.
//!
//! Keywords are lexed as identifiers; the parser decides where they are
//! special, which keeps `Model.if` a plain member access.

use std::fmt;

use chumsky::prelude::*;

use super::diagnostic::Diagnostic;

pub type LexError<'src> = Rich<'src, char>;
pub type Spanned<T> = (T, SimpleSpan);

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    /// `$"..."` split into literal text and embedded code.
    Interpolated(Vec<InterpPart>),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Semi,
    Dot,
    Question,
    Colon,
    QuestionQuestion,
    Assign,
    Arrow,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    AndAnd,
    OrOr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InterpPart {
    Text(String),
    /// Embedded expression source and the offset it starts at.
    Code { source: String, offset: usize },
}

impl Token {
    /// Tokens that can add a level to the expression tree.
    pub fn is_operator(&self) -> bool {
        matches!(
            self,
            Token::Dot
                | Token::Question
                | Token::QuestionQuestion
                | Token::Arrow
                | Token::Plus
                | Token::Minus
                | Token::Star
                | Token::Slash
                | Token::Percent
                | Token::Bang
                | Token::EqEq
                | Token::NotEq
                | Token::Lt
                | Token::LtEq
                | Token::Gt
                | Token::GtEq
                | Token::AndAnd
                | Token::OrOr
        )
    }

    fn symbol(&self) -> &'static str {
        match self {
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Comma => ",",
            Token::Semi => ";",
            Token::Dot => ".",
            Token::Question => "?",
            Token::Colon => ":",
            Token::QuestionQuestion => "??",
            Token::Assign => "=",
            Token::Arrow => "=>",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::Bang => "!",
            Token::EqEq => "==",
            Token::NotEq => "!=",
            Token::Lt => "<",
            Token::LtEq => "<=",
            Token::Gt => ">",
            Token::GtEq => ">=",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
            Token::Ident(_) | Token::Int(_) | Token::Float(_) | Token::Str(_) | Token::Interpolated(_) => "",
        }
    }

    fn shifted(self, base: usize) -> Self {
        match self {
            Token::Interpolated(parts) => Token::Interpolated(
                parts
                    .into_iter()
                    .map(|part| match part {
                        InterpPart::Code { source, offset } => InterpPart::Code {
                            source,
                            offset: offset + base,
                        },
                        text => text,
                    })
                    .collect(),
            ),
            other => other,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "`{name}`"),
            Token::Int(n) => write!(f, "`{n}`"),
            Token::Float(n) => write!(f, "`{n}`"),
            Token::Str(_) | Token::Interpolated(_) => f.write_str("string literal"),
            other => write!(f, "`{}`", other.symbol()),
        }
    }
}

/// Tokenize `source`, whose first byte sits at absolute offset `base`.
///
/// Lexical errors are collected and the offending characters skipped.
pub fn tokenize(source: &str, base: usize) -> (Vec<Spanned<Token>>, Vec<Diagnostic>) {
    let (tokens, errors) = lexer().parse(source).into_output_errors();
    let tokens = tokens
        .unwrap_or_default()
        .into_iter()
        .map(|(token, span)| {
            let span = SimpleSpan::from(span.start + base..span.end + base);
            (token.shifted(base), span)
        })
        .collect();
    let diagnostics = errors
        .iter()
        .map(|error| Diagnostic::from_rich(error, base))
        .collect();
    (tokens, diagnostics)
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone)]
enum Piece {
    Char(char),
    /// Hole source and the offset of its first byte.
    Hole(String, usize),
}

pub fn lexer<'src>() -> impl Parser<'src, &'src str, Vec<Spanned<Token>>, extra::Err<LexError<'src>>> {
    let escape = just('\\').ignore_then(choice((
        just('n').to('\n'),
        just('t').to('\t'),
        just('r').to('\r'),
        just('0').to('\0'),
        one_of("\"'\\{}"),
        just('u')
            .ignore_then(text::digits(16).to_slice().delimited_by(just('{'), just('}')))
            .validate(|digits: &str, e, emitter| {
                u32::from_str_radix(digits, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .unwrap_or_else(|| {
                        emitter.emit(Rich::custom(e.span(), "invalid unicode escape"));
                        char::REPLACEMENT_CHARACTER
                    })
            }),
        any().validate(|c: char, e, emitter| {
            emitter.emit(Rich::custom(
                e.span(),
                format!("unrecognized escape sequence `\\{c}`"),
            ));
            c
        }),
    )));

    let string = just('"')
        .ignore_then(
            none_of("\\\"\n")
                .or(escape.clone())
                .repeated()
                .collect::<String>(),
        )
        .then(just('"').or_not())
        .validate(|(text, closed), e, emitter| {
            if closed.is_none() {
                emitter.emit(Rich::custom(e.span(), "unterminated string literal"));
            }
            Token::Str(text)
        });

    let verbatim = just("@\"")
        .ignore_then(
            just("\"\"")
                .to('"')
                .or(none_of('"'))
                .repeated()
                .collect::<String>(),
        )
        .then(just('"').or_not())
        .validate(|(text, closed), e, emitter| {
            if closed.is_none() {
                emitter.emit(Rich::custom(e.span(), "unterminated string literal"));
            }
            Token::Str(text)
        });

    // Code inside `{...}` of an interpolated string: balanced braces, string
    // literals skipped whole
    let hole = recursive(|hole| {
        choice((
            string.clone().ignored(),
            hole.delimited_by(just('{'), just('}')).ignored(),
            none_of("{}\"\n").ignored(),
        ))
        .repeated()
    });

    let piece = choice((
        just("{{").to(Piece::Char('{')),
        just("}}").to(Piece::Char('}')),
        hole.to_slice()
            .map_with(|code: &str, e: &mut chumsky::input::MapExtra<'src, '_, &'src str, extra::Err<LexError<'src>>>| Piece::Hole(code.to_string(), e.span().start))
            .delimited_by(just('{'), just('}')),
        just('}').validate(|_, e, emitter| {
            emitter.emit(Rich::custom(e.span(), "unescaped `}` in interpolated string"));
            Piece::Char('}')
        }),
        escape.map(Piece::Char),
        none_of("{}\"\\\n").map(Piece::Char),
    ));

    let interpolated = just("$\"")
        .ignore_then(piece.repeated().collect::<Vec<_>>())
        .then(just('"').or_not())
        .validate(|(pieces, closed), e, emitter| {
            if closed.is_none() {
                emitter.emit(Rich::custom(e.span(), "unterminated string literal"));
            }
            Token::Interpolated(join_pieces(pieces))
        });

    // `1.ToString()` stays a member access
    let number = text::digits(10)
        .then(just('.').then(text::digits(10)).or_not())
        .to_slice()
        .validate(|text: &str, e, emitter| {
            let parsed = if text.contains('.') {
                text.parse().ok().map(Token::Float)
            } else {
                text.parse().ok().map(Token::Int)
            };
            parsed.unwrap_or_else(|| {
                emitter.emit(Rich::custom(e.span(), "integral constant is too large"));
                Token::Int(0)
            })
        });

    let ident = any()
        .filter(|c: &char| c.is_alphabetic() || *c == '_')
        .then(any().filter(|c: &char| c.is_alphanumeric() || *c == '_').repeated())
        .to_slice()
        .map(|name: &str| Token::Ident(name.to_string()));

    let operator = choice((
        just("??").to(Token::QuestionQuestion),
        just("=>").to(Token::Arrow),
        just("==").to(Token::EqEq),
        just("!=").to(Token::NotEq),
        just("<=").to(Token::LtEq),
        just(">=").to(Token::GtEq),
        just("&&").to(Token::AndAnd),
        just("||").to(Token::OrOr),
    ));

    let single = select! {
        '(' => Token::LParen,
        ')' => Token::RParen,
        '[' => Token::LBracket,
        ']' => Token::RBracket,
        '{' => Token::LBrace,
        '}' => Token::RBrace,
        ',' => Token::Comma,
        ';' => Token::Semi,
        '.' => Token::Dot,
        '?' => Token::Question,
        ':' => Token::Colon,
        '=' => Token::Assign,
        '+' => Token::Plus,
        '-' => Token::Minus,
        '*' => Token::Star,
        '/' => Token::Slash,
        '%' => Token::Percent,
        '!' => Token::Bang,
        '<' => Token::Lt,
        '>' => Token::Gt,
    };

    let unknown = any().validate(|c: char, e, emitter| {
        emitter.emit(Rich::custom(e.span(), format!("unexpected character `{c}`")));
        None
    });

    let token = choice((interpolated, verbatim, string, number, ident, operator, single))
        .map(Some)
        .or(unknown);

    let line_comment = just("//").then(none_of('\n').repeated()).ignored();
    let block_comment = just("/*")
        .then(any().and_is(just("*/").not()).repeated())
        .then(just("*/").or_not())
        .validate(|(_, closed), e, emitter| {
            if closed.is_none() {
                emitter.emit(Rich::custom(e.span(), "unterminated block comment"));
            }
        });
    let padding = choice((text::whitespace().at_least(1), line_comment, block_comment)).repeated();

    padding
        .clone()
        .ignore_then(
            token
                .map_with(|token, e| token.map(|token| (token, e.span())))
                .then_ignore(padding)
                .repeated()
                .collect::<Vec<_>>(),
        )
        .map(|tokens| tokens.into_iter().flatten().collect())
}

fn join_pieces(pieces: Vec<Piece>) -> Vec<InterpPart> {
    let mut parts = Vec::new();
    let mut text = String::new();
    for piece in pieces {
        match piece {
            Piece::Char(c) => text.push(c),
            Piece::Hole(source, offset) => {
                if !text.is_empty() {
                    parts.push(InterpPart::Text(std::mem::take(&mut text)));
                }
                parts.push(InterpPart::Code { source, offset });
            }
        }
    }
    if !text.is_empty() {
        parts.push(InterpPart::Text(text));
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Token> {
        let (tokens, diagnostics) = tokenize(src, 0);
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        tokens.into_iter().map(|(token, _)| token).collect()
    }

    #[test]
    fn test_operators_and_literals() {
        assert_eq!(
            tokens("x => x ?? 1.5 >= 2;"),
            vec![
                Token::Ident("x".into()),
                Token::Arrow,
                Token::Ident("x".into()),
                Token::QuestionQuestion,
                Token::Float(1.5),
                Token::GtEq,
                Token::Int(2),
                Token::Semi,
            ]
        );
    }

    #[test]
    fn test_member_on_integer() {
        assert_eq!(
            tokens("1.ToString"),
            vec![Token::Int(1), Token::Dot, Token::Ident("ToString".into())]
        );
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            tokens(r#""a\"b\u{41}" @"c""d""#),
            vec![Token::Str("a\"bA".into()), Token::Str("c\"d".into())]
        );
    }

    #[test]
    fn test_spans_are_absolute() {
        let (tokens, _) = tokenize("a  bc", 100);
        let spans: Vec<_> = tokens.iter().map(|(_, span)| (span.start, span.end)).collect();
        assert_eq!(spans, [(100, 101), (103, 105)]);
    }

    #[test]
    fn test_interpolated_parts_carry_offsets() {
        let tokens = tokens(r#"$"Hi {name}!{{""#);
        assert_eq!(
            tokens[0],
            Token::Interpolated(vec![
                InterpPart::Text("Hi ".into()),
                InterpPart::Code {
                    source: "name".into(),
                    offset: 6,
                },
                InterpPart::Text("!{".into()),
            ])
        );
    }

    #[test]
    fn test_interpolation_hole_keeps_braces_and_strings() {
        let tokens = tokens(r#"$"{new { A = "}" }.A}""#);
        let Token::Interpolated(parts) = &tokens[0] else {
            panic!("expected interpolated string, got {:?}", tokens[0]);
        };
        assert_eq!(
            parts,
            &[InterpPart::Code {
                source: r#"new { A = "}" }.A"#.into(),
                offset: 3,
            }]
        );
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(
            tokens("// line\n/* block */ a // tail"),
            vec![Token::Ident("a".into())]
        );
        assert!(tokens("  /* only */ \n").is_empty());
    }

    #[test]
    fn test_errors_collected() {
        let (tokens, diagnostics) = tokenize("a # b \"open", 10);
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].offset, 12);
        assert_eq!(diagnostics[0].message, "unexpected character `#`");
        assert_eq!(diagnostics[1].offset, 16);
        assert_eq!(diagnostics[1].message, "unterminated string literal");
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn test_integer_overflow() {
        let (_, diagnostics) = tokenize("99999999999999999999", 0);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].message, "integral constant is too large");
    }
}
