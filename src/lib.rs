//! uScheme - tree-walking evaluators for uScheme and its ancestor Impcore
//!
//! This crate implements the core of two small teaching languages: expression
//! evaluation, environments, closures, top-level definitions, unit tests and a
//! call-trace facility. uScheme is a lexically scoped Scheme with first-class
//! closures; Impcore is the simpler imperative ancestor with a separate function
//! table and three unchained scopes (locals, formals, globals).
//!
//! ```scheme
//! (val counter 0)
//! (define add (x y) (+ x y))
//! (letrec ((even? (lambda (n) (if (= n 0) #t (odd? (- n 1)))))
//!          (odd?  (lambda (n) (if (= n 0) #f (even? (- n 1))))))
//!   (even? 10))
//! (check-expect (add 2 3) 5)
//! ```
//!
//! ## Semantics worth knowing
//!
//! - Integers are 32-bit; `+ - * /` signal an arithmetic overflow instead of
//!   wrapping, and `/` by zero signals its own error.
//! - The languages have different truth conventions: in uScheme only `#f` is
//!   false, in Impcore only `0` is false.
//! - Arguments are evaluated strictly left to right.
//! - Errors never travel inside values. Every failure is an [`Error`] that
//!   propagates to the nearest recovery point: the top-level session (which
//!   reports it and moves on to the next form) or the unit-test runner.
//!
//! ## Modules
//!
//! - `scheme`: S-expression reader
//! - `parse`: uScheme surface syntax into [`ast`] definitions
//! - `value`, `ast`: uScheme runtime values and abstract syntax
//! - `evaluator`: uScheme evaluation, environments and call tracing
//! - `builtinops`: the primitive catalog and checked arithmetic
//! - `impcore`: the Impcore language (syntax, parser, evaluator)
//! - `recovery`: error reporting modes and message formatting
//! - `toplevel`: the read-eval-print driver, `use` and unit tests
//! - `streams`, `stack`: output streams and host stack growth

use std::fmt;

use thiserror::Error as ThisError;

/// Maximum nesting depth accepted by the S-expression reader
pub const MAX_PARSE_DEPTH: usize = 256;

/// Maximum evaluation depth before "recursion too deep" is signaled.
/// Each nested expression and each function body counts as one level.
pub const MAX_EVAL_DEPTH: usize = 10_000;

/// Name of the variable that switches on call tracing when bound to a positive count
pub const TRACE_NAME: &str = "&trace";

/// Name bound to the value of the most recent top-level expression
pub const IT_NAME: &str = "it";

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (bad tokens, malformed forms)
    InvalidSyntax,
    /// Input ended before the datum was complete (unclosed parens)
    Incomplete,
    /// Datum nesting exceeded the maximum parse depth
    TooDeeplyNested,
    /// Implementation-imposed limit exceeded (integer literal overflow)
    ImplementationLimit,
}

/// Where a top-level form came from
#[derive(Debug, PartialEq, Clone)]
pub struct SourceLoc {
    pub source: String,
    pub line: usize,
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, line {}", self.source, self.line)
    }
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Clone, ThisError)]
#[error("{message}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
    /// The problematic token or character encountered, if identifiable
    pub found: Option<String>,
    /// Source name and line of the enclosing top-level form
    pub location: Option<SourceLoc>,
}

impl ParseError {
    /// Create a ParseError with all fields except the location
    pub fn new(
        kind: ParseErrorKind,
        message: impl Into<String>,
        context: Option<String>,
        found: Option<String>,
    ) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context,
            found,
            location: None,
        }
    }

    /// Create a simple ParseError with a kind and message but no context
    pub fn from_message(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, None, None)
    }

    /// Create a ParseError with context extracted from input at a given offset
    pub fn with_context(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
    ) -> Self {
        const MAX_CONTEXT: usize = 100;

        let context_start = error_offset.saturating_sub(20);
        let context_str: String = input
            .chars()
            .skip(context_start)
            .take(MAX_CONTEXT)
            .collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.len() < input.len() {
            display_context.push_str("[...]");
        }

        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        Self::new(kind, message, Some(display_context), None)
    }

    /// Attach the location of the enclosing form, keeping one already present
    pub fn at(mut self, location: &SourceLoc) -> Self {
        if self.location.is_none() {
            self.location = Some(location.clone());
        }
        self
    }
}

/// Error types for both interpreters.
///
/// Runtime variants that mention an expression hold its printed form, so an
/// error stays meaningful after the evaluation that raised it is abandoned.
#[derive(Debug, Clone, PartialEq, ThisError)]
pub enum Error {
    #[error("{0}")]
    ParseError(ParseError),
    #[error("name {0} not found")]
    UnboundVariable(String),
    #[error("set unbound variable {name} in {expression}")]
    UnboundAssignment { name: String, expression: String },
    /// Impcore: a name bound in none of the locals, formals or globals
    #[error("unbound variable {0}")]
    UnboundImpcoreVariable(String),
    #[error("tried to set unbound variable {name} in {expression}")]
    UnboundImpcoreAssignment { name: String, expression: String },
    #[error("call to undefined function {name} in {expression}")]
    UndefinedFunction { name: String, expression: String },
    #[error("{}", describe_arity(.expected, .got, .expression))]
    ArityError {
        expected: usize,
        got: usize,
        expression: Option<String>,
    },
    #[error("{0}")]
    TypeError(String),
    #[error("division by zero{}", context_suffix(.expression))]
    DivisionByZero { expression: Option<String> },
    #[error("arithmetic overflow{}", context_suffix(.expression))]
    ArithmeticOverflow { expression: Option<String> },
    #[error("{callee} evaluates to non-function {value} in {expression}")]
    NotAFunction {
        callee: String,
        value: String,
        expression: String,
    },
    #[error("formal parameter {parameter} appears twice in definition of function {function}")]
    DuplicateFormal { parameter: String, function: String },
    #[error("Formal parameter {parameter} appears twice in definition of function {function}")]
    DuplicateImpcoreFormal { parameter: String, function: String },
    #[error("letrec tries to bind non-lambda expression {0}")]
    MalformedBinding(String),
    #[error("recursion too deep (evaluation depth limit {0} reached)")]
    RecursionTooDeep(usize),
    #[error("{0}")]
    EvalError(String),
    #[error("I/O error: {0}")]
    Io(String),
}

fn describe_arity(expected: &usize, got: &usize, expression: &Option<String>) -> String {
    let plural = if *expected == 1 { "" } else { "s" };
    match expression {
        Some(expr) => format!("in {expr}, expected {expected} argument{plural} but found {got}"),
        None => format!("expected {expected} argument{plural} but found {got}"),
    }
}

fn context_suffix(expression: &Option<String>) -> String {
    expression
        .as_ref()
        .map(|expr| format!(" in {expr}"))
        .unwrap_or_default()
}

impl Error {
    /// Create an ArityError without expression context
    pub fn arity_error(expected: usize, got: usize) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: None,
        }
    }

    pub fn division_by_zero() -> Self {
        Error::DivisionByZero { expression: None }
    }

    pub fn overflow() -> Self {
        Error::ArithmeticOverflow { expression: None }
    }

    /// Fill in the call expression for errors raised without one.
    ///
    /// Primitives don't see the expression that called them; the evaluator
    /// attaches it here once the error reaches the application step.
    pub fn in_expression(self, expr: &impl fmt::Display) -> Self {
        match self {
            Error::ArityError {
                expected,
                got,
                expression: None,
            } => Error::ArityError {
                expected,
                got,
                expression: Some(expr.to_string()),
            },
            Error::DivisionByZero { expression: None } => Error::DivisionByZero {
                expression: Some(expr.to_string()),
            },
            Error::ArithmeticOverflow { expression: None } => Error::ArithmeticOverflow {
                expression: Some(expr.to_string()),
            },
            other => other,
        }
    }

}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::ParseError(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod parse;
pub mod recovery;
pub mod scheme;
pub mod stack;
pub mod streams;
pub mod toplevel;
pub mod value;

#[cfg(feature = "impcore")]
pub mod impcore;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let cases = vec![
            (Error::UnboundVariable("x".into()), "name x not found"),
            (
                Error::UnboundAssignment {
                    name: "y".into(),
                    expression: "(set y 1)".into(),
                },
                "set unbound variable y in (set y 1)",
            ),
            (
                Error::arity_error(2, 1),
                "expected 2 arguments but found 1",
            ),
            (
                Error::arity_error(1, 3).in_expression(&"(f 1 2 3)"),
                "in (f 1 2 3), expected 1 argument but found 3",
            ),
            (Error::division_by_zero(), "division by zero"),
            (
                Error::division_by_zero().in_expression(&"(/ 4 0)"),
                "division by zero in (/ 4 0)",
            ),
            (
                Error::overflow().in_expression(&"(+ x y)"),
                "arithmetic overflow in (+ x y)",
            ),
            (
                Error::DuplicateFormal {
                    parameter: "x".into(),
                    function: "f".into(),
                },
                "formal parameter x appears twice in definition of function f",
            ),
            (Error::UnboundImpcoreVariable("n".into()), "unbound variable n"),
            (
                Error::UnboundImpcoreAssignment {
                    name: "n".into(),
                    expression: "(set n 0)".into(),
                },
                "tried to set unbound variable n in (set n 0)",
            ),
            (
                Error::DuplicateImpcoreFormal {
                    parameter: "a".into(),
                    function: "g".into(),
                },
                "Formal parameter a appears twice in definition of function g",
            ),
        ];

        for (i, (error, expected)) in cases.into_iter().enumerate() {
            assert_eq!(error.to_string(), expected, "case #{}", i + 1);
        }
    }

    #[test]
    fn test_in_expression_keeps_existing_context() {
        let err = Error::arity_error(2, 0)
            .in_expression(&"(inner)")
            .in_expression(&"(outer)");
        assert_eq!(err.to_string(), "in (inner), expected 2 arguments but found 0");

        let unrelated = Error::UnboundVariable("z".into()).in_expression(&"(f z)");
        assert_eq!(unrelated, Error::UnboundVariable("z".into()));
    }

    #[test]
    fn test_parse_error_context_and_location() {
        let err = ParseError::with_context(ParseErrorKind::InvalidSyntax, "bad", "(a\nb", 2);
        assert_eq!(err.context.as_deref(), Some("(a\\nb"));

        let loc = SourceLoc {
            source: "prog.scm".into(),
            line: 4,
        };
        let other = SourceLoc {
            source: "other.scm".into(),
            line: 9,
        };
        let err = err.at(&loc).at(&other);
        assert_eq!(err.location, Some(loc));
    }
}
