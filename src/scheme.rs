//! S-expression reader shared by uScheme and Impcore.
//!
//! Reads integers, `#t`/`#f`, symbols and lists. `;` starts a comment that
//! runs to the end of the line, `'x` abbreviates `(quote x)`, and square
//! brackets may be used in place of parentheses (a list closes with the
//! bracket that opened it).
//!
//! A [`Reader`] yields the top-level data of a source one at a time, each
//! tagged with the line it starts on.

use std::fmt;
use std::rc::Rc;

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, multispace1, not_line_ending},
    combinator::{cut, recognize, value},
    error::ErrorKind,
    multi::many0_count,
    sequence::preceded,
};

use crate::value::{Name, NumberType};
use crate::{MAX_PARSE_DEPTH, ParseError, ParseErrorKind, SourceLoc};

/// A datum as read, before any surface syntax is recognized
#[derive(Debug, Clone, PartialEq)]
pub enum Sexp {
    Number(NumberType),
    Bool(bool),
    Symbol(Name),
    List(Vec<Sexp>),
}

impl Sexp {
    pub fn as_symbol(&self) -> Option<&Name> {
        match self {
            Sexp::Symbol(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Sexp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sexp::Number(n) => write!(f, "{n}"),
            Sexp::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Sexp::Symbol(s) => write!(f, "{s}"),
            Sexp::List(elements) => {
                write!(f, "(")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{element}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// A top-level datum and where it starts
#[derive(Debug, Clone, PartialEq)]
pub struct Datum {
    pub sexp: Sexp,
    pub loc: SourceLoc,
}

/// Whether an integer literal that doesn't fit a `NumberType` is an error
#[derive(Debug, Clone, Copy, PartialEq)]
enum Literals {
    Checked,
    /// Read oversized literals as symbols; used to find where a bad datum ends
    Unchecked,
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']' | ';')
}

fn is_integer_token(token: &str) -> bool {
    let digits = token.strip_prefix(['+', '-']).unwrap_or(token);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Skip whitespace and comments
fn atmosphere(input: &str) -> IResult<&str, ()> {
    value(
        (),
        many0_count(alt((
            multispace1,
            recognize(preceded(char(';'), not_line_ending)),
        ))),
    )
    .parse(input)
}

/// Parse an atom: boolean, integer or symbol
fn parse_atom(input: &str, literals: Literals) -> IResult<&str, Sexp> {
    let (rest, token) = take_while1(|c: char| !is_delimiter(c)).parse(input)?;

    let atom = match token {
        "#t" => Sexp::Bool(true),
        "#f" => Sexp::Bool(false),
        _ if is_integer_token(token) => match token.parse::<NumberType>() {
            Ok(n) => Sexp::Number(n),
            Err(_) if literals == Literals::Unchecked => Sexp::Symbol(Rc::from(token)),
            Err(_) => {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    input,
                    ErrorKind::Digit,
                )));
            }
        },
        _ => Sexp::Symbol(Rc::from(token)),
    };
    Ok((rest, atom))
}

/// Parse quoted datum ('x -> (quote x))
fn parse_quote(input: &str, literals: Literals, depth: usize) -> IResult<&str, Sexp> {
    let (input, quoted) =
        preceded(char('\''), cut(|i| parse_sexp(i, literals, depth + 1))).parse(input)?;
    Ok((
        input,
        Sexp::List(vec![Sexp::Symbol(Rc::from("quote")), quoted]),
    ))
}

/// Parse a list opened by `(` or `[`, closed by the matching bracket
fn parse_list(input: &str, literals: Literals, depth: usize) -> IResult<&str, Sexp> {
    let (mut input, open) = alt((char('('), char('['))).parse(input)?;
    let close = if open == '(' { ')' } else { ']' };

    let mut elements = Vec::new();
    loop {
        let (rest, ()) = atmosphere(input)?;
        if let Some(rest) = rest.strip_prefix(close) {
            return Ok((rest, Sexp::List(elements)));
        }
        if rest.is_empty() {
            return Err(nom::Err::Failure(nom::error::Error::new(
                rest,
                ErrorKind::Eof,
            )));
        }
        if rest.starts_with([')', ']']) {
            return Err(nom::Err::Failure(nom::error::Error::new(
                rest,
                ErrorKind::Char,
            )));
        }
        let (rest, element) = cut(|i| parse_sexp(i, literals, depth + 1)).parse(rest)?;
        elements.push(element);
        input = rest;
    }
}

/// Parse one S-expression after optional whitespace and comments
fn parse_sexp(input: &str, literals: Literals, depth: usize) -> IResult<&str, Sexp> {
    if depth >= MAX_PARSE_DEPTH {
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            ErrorKind::TooLarge,
        )));
    }
    let (input, ()) = atmosphere(input)?;
    if input.is_empty() {
        return Err(nom::Err::Error(nom::error::Error::new(input, ErrorKind::Eof)));
    }
    alt((
        |i| parse_quote(i, literals, depth),
        |i| parse_list(i, literals, depth),
        |i| parse_atom(i, literals),
    ))
    .parse(input)
}

/// Convert nom parsing errors to a structured [`ParseError`]
fn to_parse_error(input: &str, error: nom::Err<nom::error::Error<&str>>) -> ParseError {
    let (position, code) = match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => (input.len() - e.input.len(), e.code),
        nom::Err::Incomplete(_) => (input.len(), ErrorKind::Eof),
    };
    let at = &input[position..];
    let found: Option<String> = match code {
        ErrorKind::Digit => at.split(is_delimiter).next().map(str::to_owned),
        _ => at.chars().next().map(String::from),
    };

    let (kind, message) = match (code, found.as_deref()) {
        (ErrorKind::Eof, _) | (_, None) => (
            ParseErrorKind::Incomplete,
            "unexpected end of input".to_owned(),
        ),
        (ErrorKind::TooLarge, _) => (
            ParseErrorKind::TooDeeplyNested,
            format!("expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
        ),
        (ErrorKind::Digit, Some(token)) => (
            ParseErrorKind::ImplementationLimit,
            format!("arithmetic overflow in integer literal {token}"),
        ),
        (_, Some(token)) => (
            ParseErrorKind::InvalidSyntax,
            format!("unexpected '{token}'"),
        ),
    };

    let mut err = ParseError::with_context(kind, message, input, position);
    err.found = found;
    err
}

/// Parse exactly one S-expression from input.
pub fn parse_sexp_str(input: &str) -> Result<Sexp, ParseError> {
    let (rest, sexp) =
        parse_sexp(input, Literals::Checked, 0).map_err(|e| to_parse_error(input, e))?;
    let (rest, ()) = atmosphere(rest).map_err(|e| to_parse_error(input, e))?;
    if rest.is_empty() {
        Ok(sexp)
    } else {
        let position = input.len() - rest.len();
        let mut err = ParseError::with_context(
            ParseErrorKind::InvalidSyntax,
            format!("unexpected remaining input: '{rest}'"),
            input,
            position,
        );
        err.found = rest.chars().next().map(String::from);
        Err(err)
    }
}

/// Iterator over the top-level data of one source.
///
/// An integer literal that overflows is reported for its datum alone and
/// reading carries on after it. Any other error ends the iteration, since
/// the reader can't tell where the broken datum stops.
pub struct Reader<'a> {
    source: String,
    input: &'a str,
    offset: usize,
    failed: bool,
    /// Line number at `line_offset`; both only move forward
    line: usize,
    line_offset: usize,
}

impl<'a> Reader<'a> {
    pub fn new(source: impl Into<String>, input: &'a str) -> Self {
        Reader {
            source: source.into(),
            input,
            offset: 0,
            failed: false,
            line: 1,
            line_offset: 0,
        }
    }

    /// Line number of `offset`, counting only the newlines since the last call
    fn line_at(&mut self, offset: usize) -> usize {
        if let Some(skipped) = self.input.get(self.line_offset..offset) {
            self.line += skipped.matches('\n').count();
            self.line_offset = offset;
        }
        self.line
    }
}

impl Iterator for Reader<'_> {
    type Item = Result<Datum, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let rest = &self.input[self.offset..];
        let start = match atmosphere(rest) {
            Ok((start, ())) => start,
            Err(_) => rest,
        };
        if start.is_empty() {
            self.offset = self.input.len();
            return None;
        }
        let start_offset = self.input.len() - start.len();
        let loc = SourceLoc {
            source: self.source.clone(),
            line: self.line_at(start_offset),
        };

        match parse_sexp(start, Literals::Checked, 0) {
            Ok((remaining, sexp)) => {
                self.offset = self.input.len() - remaining.len();
                Some(Ok(Datum { sexp, loc }))
            }
            Err(nom::Err::Failure(e)) if e.code == ErrorKind::Digit => {
                let err = to_parse_error(start, nom::Err::Failure(e)).at(&loc);
                match parse_sexp(start, Literals::Unchecked, 0) {
                    Ok((remaining, _)) => self.offset = self.input.len() - remaining.len(),
                    Err(_) => self.failed = true,
                }
                Some(Err(err))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(to_parse_error(start, e).at(&loc)))
            }
        }
    }
}

/// True when `input` ends inside an unfinished datum, so an interactive
/// reader should ask for another line before running it
pub fn needs_more_input(input: &str) -> bool {
    Reader::new("", input)
        .any(|datum| matches!(datum, Err(ParseError { kind: ParseErrorKind::Incomplete, .. })))
}
