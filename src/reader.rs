//! Tokenizer and recursive-descent reader.
//!
//! The tokenizer splits source text into parentheses, quote markers, verbatim
//! string tokens and bare atoms. The reader turns tokens into [`Value`] trees:
//!
//! ```text
//! expr  := NUMBER | SYMBOL | STRING-TOKEN | '(' expr* ')' | QUOTE expr
//! QUOTE expr      => (quote expr)
//! STRING-TOKEN s  => (string s)
//! ```

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{is_not, take_while1},
    character::complete::{anychar, char, multispace1, not_line_ending},
    combinator::{map, recognize, value},
    multi::many0,
    sequence::{delimited, pair, preceded},
};

use crate::ast::{Number, QUOTE_FORM, Value, string_form, sym};
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Reader options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParseConfig {
    /// Treat `;` as the start of a comment running to the end of the line
    pub handle_comments: bool,
}

impl Default for ParseConfig {
    fn default() -> Self {
        ParseConfig {
            handle_comments: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TokenKind<'a> {
    Open,
    Close,
    Quote,
    /// Text between the double quotes, verbatim
    Str(&'a str),
    Atom(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    /// Byte offset of the token in the source text
    pub offset: usize,
}

impl TokenKind<'_> {
    fn describe(&self) -> String {
        match self {
            TokenKind::Open => "(".into(),
            TokenKind::Close => ")".into(),
            TokenKind::Quote => "'".into(),
            TokenKind::Str(s) => format!("\"{s}\""),
            TokenKind::Atom(a) => (*a).to_owned(),
        }
    }
}

fn is_atom_char(c: char, config: ParseConfig) -> bool {
    !(c.is_whitespace()
        || matches!(c, '(' | ')' | '\'' | '"')
        || (config.handle_comments && c == ';'))
}

/// Parse a string token; a backslash protects the following character
fn parse_string_token(input: &str) -> IResult<&str, &str> {
    delimited(
        char('"'),
        recognize(many0(alt((
            is_not("\\\""),
            recognize(pair(char('\\'), anychar)),
        )))),
        char('"'),
    )
    .parse(input)
}

fn parse_token(input: &str, config: ParseConfig) -> IResult<&str, TokenKind<'_>> {
    alt((
        value(TokenKind::Open, char('(')),
        value(TokenKind::Close, char(')')),
        value(TokenKind::Quote, char('\'')),
        map(parse_string_token, TokenKind::Str),
        map(take_while1(|c| is_atom_char(c, config)), TokenKind::Atom),
    ))
    .parse(input)
}

/// Skip whitespace and, when enabled, `;` comments
fn skip_trivia(mut input: &str, config: ParseConfig) -> &str {
    loop {
        if let Ok((rest, _)) = multispace1::<&str, nom::error::Error<&str>>(input) {
            input = rest;
        } else if config.handle_comments
            && let Ok((rest, _)) =
                preceded(char::<&str, nom::error::Error<&str>>(';'), not_line_ending)
                    .parse(input)
        {
            input = rest;
        } else {
            return input;
        }
    }
}

/// Split source text into tokens.
///
/// The only tokenizer-level failure is a string literal with no closing quote.
pub fn tokenize(source: &str, config: ParseConfig) -> Result<Vec<Token<'_>>, Error> {
    let mut tokens = Vec::new();
    let mut input = skip_trivia(source, config);

    while !input.is_empty() {
        let offset = source.len() - input.len();
        match parse_token(input, config) {
            Ok((rest, kind)) => {
                tokens.push(Token { kind, offset });
                input = skip_trivia(rest, config);
            }
            Err(_) => {
                let (kind, message) = if input.starts_with('"') {
                    (ParseErrorKind::Incomplete, "unterminated string literal")
                } else {
                    (ParseErrorKind::UnexpectedEnd, "unrecognized input")
                };
                let found: String = input.chars().take(10).collect();
                return Err(ParseError::with_context_and_found(
                    kind,
                    message,
                    source,
                    offset,
                    Some(found),
                )
                .into());
            }
        }
    }

    Ok(tokens)
}

/// Resolve an atom token: integer, then floating point, else symbol
fn parse_atom(token: &str) -> Value {
    if let Ok(n) = token.parse::<i64>() {
        return Value::Number(Number::Int(n));
    }
    // Only numeric-looking tokens may become reals, so `inf` and `nan` stay symbols.
    // Non-finite results (`1e400`, `-inf`) have no printed form that reads back as a real.
    let numeric_start = token
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.'));
    if numeric_start
        && let Ok(r) = token.parse::<f64>()
        && r.is_finite()
    {
        return Value::Number(Number::Real(r));
    }
    sym(token)
}

/// Streaming reader over a tokenized source: yields one top-level expression at a time.
///
/// After the first error the reader is exhausted.
pub struct Reader<'a> {
    source: &'a str,
    tokens: Vec<Token<'a>>,
    pos: usize,
    failed: bool,
}

impl<'a> Reader<'a> {
    pub fn new(source: &'a str, config: ParseConfig) -> Result<Self, Error> {
        Ok(Reader {
            source,
            tokens: tokenize(source, config)?,
            pos: 0,
            failed: false,
        })
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn error_at(&self, kind: ParseErrorKind, message: &str, token: Option<Token<'a>>) -> Error {
        match token {
            Some(token) => ParseError::with_context_and_found(
                kind,
                message,
                self.source,
                token.offset,
                Some(token.kind.describe()),
            )
            .into(),
            None => ParseError::with_context_and_found(
                kind,
                message,
                self.source,
                self.source.len(),
                None,
            )
            .into(),
        }
    }

    /// Read one expression starting at the current token
    pub fn read_expr(&mut self) -> Result<Value, Error> {
        self.read_expr_at_depth(0)
    }

    fn read_expr_at_depth(&mut self, depth: usize) -> Result<Value, Error> {
        let Some(token) = self.tokens.get(self.pos).copied() else {
            return Err(self.error_at(
                ParseErrorKind::UnexpectedEnd,
                "unexpected end of input",
                None,
            ));
        };
        if depth >= MAX_PARSE_DEPTH {
            return Err(self.error_at(
                ParseErrorKind::TooDeeplyNested,
                &format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
                Some(token),
            ));
        }
        self.pos += 1;

        match token.kind {
            TokenKind::Quote => {
                let quoted = self.read_expr_at_depth(depth + 1)?;
                Ok(Value::List(vec![sym(QUOTE_FORM), quoted].into()))
            }
            TokenKind::Str(text) => Ok(string_form(text)),
            TokenKind::Atom(text) => Ok(parse_atom(text)),
            TokenKind::Close => Err(self.error_at(
                ParseErrorKind::UnexpectedClose,
                "unexpected closing parenthesis",
                Some(token),
            )),
            TokenKind::Open => {
                let mut elements = Vec::new();
                loop {
                    match self.tokens.get(self.pos) {
                        Some(Token {
                            kind: TokenKind::Close,
                            ..
                        }) => {
                            self.pos += 1;
                            return Ok(Value::List(elements.into()));
                        }
                        Some(_) => elements.push(self.read_expr_at_depth(depth + 1)?),
                        None => {
                            return Err(self.error_at(
                                ParseErrorKind::UnexpectedEnd,
                                "unexpected end of input",
                                None,
                            ));
                        }
                    }
                }
            }
        }
    }
}

impl Iterator for Reader<'_> {
    type Item = Result<Value, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.is_at_end() {
            return None;
        }
        let result = self.read_expr();
        self.failed = result.is_err();
        Some(result)
    }
}

/// Parse exactly one expression with the given configuration.
pub fn parse_with_config(input: &str, config: ParseConfig) -> Result<Value, Error> {
    let mut reader = Reader::new(input, config)?;
    let expr = reader.read_expr()?;

    if let Some(extra) = reader.tokens.get(reader.pos).copied() {
        return Err(reader.error_at(
            ParseErrorKind::TrailingContent,
            "Unexpected remaining input after expression",
            Some(extra),
        ));
    }
    Ok(expr)
}

/// Parse exactly one expression.
pub fn parse(input: &str) -> Result<Value, Error> {
    parse_with_config(input, ParseConfig::default())
}

/// Parse every top-level expression in a program text.
pub fn parse_program(input: &str, config: ParseConfig) -> Result<Vec<Value>, Error> {
    Reader::new(input, config)?.collect()
}
