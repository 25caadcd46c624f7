//! Error reporting at recovery points.
//!
//! Evaluation never reports its own failures: an [`Error`] propagates to the
//! nearest recovery point, which is either the top-level session or the
//! unit-test runner. The session's [`ErrorMode`] decides what happens there.
//! In `Normal` mode the message is written to the diagnostic stream. In
//! `Testing` mode the error is swallowed, because the test runner reports
//! failures in its own words.

use std::io::{self, Write};

use crate::Error;
use crate::streams::Streams;

/// Where a signaled error is caught
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    /// Report the error and continue with the next top-level form
    #[default]
    Normal,
    /// A unit test is running; the error is the test's outcome
    Testing,
}

/// Whether syntax errors in interactive input mention a source location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorFormat {
    #[default]
    WithLocations,
    /// Leave out the location for input read from "standard input"
    WithoutLocations,
}

/// Source name of interactive input
pub const STANDARD_INPUT: &str = "standard input";

/// The message a recovery point prints for `err`
pub fn format_error(err: &Error, format: ErrorFormat) -> String {
    match err {
        Error::ParseError(parse_error) => match &parse_error.location {
            Some(loc)
                if format == ErrorFormat::WithoutLocations && loc.source == STANDARD_INPUT =>
            {
                format!("syntax error: {}", parse_error.message)
            }
            Some(loc) => format!("syntax error in {loc}: {}", parse_error.message),
            None => format!("syntax error: {}", parse_error.message),
        },
        other => format!("Run-time error: {other}"),
    }
}

/// Report `err` as the given mode requires.
///
/// Standard output is flushed first so the message lands after anything the
/// failed form already printed.
pub fn report(
    err: &Error,
    mode: ErrorMode,
    format: ErrorFormat,
    streams: &mut Streams,
) -> io::Result<()> {
    match mode {
        ErrorMode::Normal => {
            streams.flush_out()?;
            writeln!(streams.diag, "{}", format_error(err, format))?;
            streams.diag.flush()
        }
        ErrorMode::Testing => Ok(()),
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::{ParseError, ParseErrorKind, SourceLoc};

    fn syntax_error(source: &str, line: usize) -> Error {
        ParseError::from_message(ParseErrorKind::InvalidSyntax, "unexpected ')'")
            .at(&SourceLoc {
                source: source.into(),
                line,
            })
            .into()
    }

    #[test]
    fn test_format_error() {
        let cases = vec![
            (
                syntax_error("prog.scm", 3),
                ErrorFormat::WithLocations,
                "syntax error in prog.scm, line 3: unexpected ')'",
            ),
            (
                syntax_error("prog.scm", 3),
                ErrorFormat::WithoutLocations,
                "syntax error in prog.scm, line 3: unexpected ')'",
            ),
            (
                syntax_error(STANDARD_INPUT, 1),
                ErrorFormat::WithoutLocations,
                "syntax error: unexpected ')'",
            ),
            (
                syntax_error(STANDARD_INPUT, 1),
                ErrorFormat::WithLocations,
                "syntax error in standard input, line 1: unexpected ')'",
            ),
            (
                ParseError::from_message(ParseErrorKind::Incomplete, "unexpected end of input")
                    .into(),
                ErrorFormat::WithLocations,
                "syntax error: unexpected end of input",
            ),
            (
                Error::UnboundVariable("x".into()),
                ErrorFormat::WithLocations,
                "Run-time error: name x not found",
            ),
            (
                Error::division_by_zero().in_expression(&"(/ 1 0)"),
                ErrorFormat::WithoutLocations,
                "Run-time error: division by zero in (/ 1 0)",
            ),
        ];

        for (i, (err, format, expected)) in cases.into_iter().enumerate() {
            assert_eq!(format_error(&err, format), expected, "case #{}", i + 1);
        }
    }

    #[test]
    fn test_report_by_mode() {
        let (mut streams, capture) = Streams::captured();
        let err = Error::UnboundVariable("y".into());

        report(&err, ErrorMode::Testing, ErrorFormat::WithLocations, &mut streams).unwrap();
        assert_eq!(capture.diag(), "");

        report(&err, ErrorMode::Normal, ErrorFormat::WithLocations, &mut streams).unwrap();
        assert_eq!(capture.diag(), "Run-time error: name y not found\n");
        assert_eq!(capture.out(), "");
    }
}
