//! The read-eval-print driver shared by both languages.
//!
//! A [`Session`] reads a source unit datum by datum. Definitions are
//! evaluated immediately; an error aborts only the form that raised it.
//! `use` runs another file as a nested unit. Unit tests are collected while
//! the unit is read and run after its last form, so they see every
//! definition in the unit no matter where the test appears.
//!
//! ```scheme
//! (check-expect (double 2) 4)     ; runs after the whole unit is read,
//! (define double (x) (* 2 x))     ; so this definition is in place
//! ```

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::evaluator::Interpreter;
use crate::recovery::{ErrorFormat, ErrorMode, report};
use crate::scheme::{Reader, Sexp};
use crate::stack::ensure_sufficient_stack;
use crate::streams::Streams;
use crate::value::Value;
use crate::{ast, parse, Error, ParseError};

/// Whether definitions print what they define
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Echo {
    #[default]
    On,
    Off,
}

/// A top-level form: a definition, a file inclusion or a unit test
#[derive(Debug, Clone, PartialEq)]
pub enum XDef<D, E> {
    Def(D),
    Use(String),
    Test(UnitTest<E>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnitTest<E> {
    /// The two expressions evaluate to equal values
    CheckExpect(E, E),
    /// The expression evaluates to a true value
    CheckAssert(E),
    /// Evaluating the expression signals an error
    CheckError(E),
}

/// What the session needs from an interpreter
pub trait Language {
    type Def;
    type Exp: fmt::Display;
    type Value: fmt::Display;

    /// Recognize the surface syntax of a top-level datum
    fn parse(&self, sexp: &Sexp) -> Result<XDef<Self::Def, Self::Exp>, ParseError>;

    /// Process a definition against the global state
    fn eval_def(&mut self, def: &Self::Def, echo: Echo) -> Result<(), Error>;

    /// Evaluate a test expression in the global environment
    fn eval_exp(&mut self, exp: &Self::Exp) -> Result<Self::Value, Error>;

    /// Equality used by `check-expect`
    fn equal(&self, a: &Self::Value, b: &Self::Value) -> bool;

    /// Truth convention used by `check-assert`
    fn is_true(&self, value: &Self::Value) -> bool;

    fn streams(&mut self) -> &mut Streams;

    /// Forget trace nesting abandoned by an error
    fn reset_trace(&mut self);
}

impl Language for Interpreter {
    type Def = ast::Def;
    type Exp = ast::Exp;
    type Value = Value;

    fn parse(&self, sexp: &Sexp) -> Result<XDef<ast::Def, ast::Exp>, ParseError> {
        parse::parse_form(sexp)
    }

    fn eval_def(&mut self, def: &ast::Def, echo: Echo) -> Result<(), Error> {
        Interpreter::eval_def(self, def, echo).map(|_| ())
    }

    fn eval_exp(&mut self, exp: &ast::Exp) -> Result<Value, Error> {
        self.eval_global(exp)
    }

    fn equal(&self, a: &Value, b: &Value) -> bool {
        a == b
    }

    fn is_true(&self, value: &Value) -> bool {
        value.is_true()
    }

    fn streams(&mut self) -> &mut Streams {
        Interpreter::streams(self)
    }

    fn reset_trace(&mut self) {
        self.tracer().reset();
    }
}

/// Session settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionConfig {
    pub echo: Echo,
    pub error_format: ErrorFormat,
}

/// Counts from running one or more units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Summary {
    /// Errors reported at top level, syntax errors included
    pub errors: usize,
    pub tests_run: usize,
    pub tests_passed: usize,
}

impl Summary {
    fn absorb(&mut self, other: Summary) {
        self.errors += other.errors;
        self.tests_run += other.tests_run;
        self.tests_passed += other.tests_passed;
    }
}

/// Outcome of one unit test
enum Outcome {
    Passed,
    Failed(String),
}

/// An interpreter together with its error mode and settings
pub struct Session<L> {
    lang: L,
    config: SessionConfig,
    mode: ErrorMode,
    /// Canonical paths of the files whose `use` is in progress, outermost first
    active_files: Vec<PathBuf>,
}

impl<L: fmt::Debug> fmt::Debug for Session<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("lang", &self.lang)
            .field("config", &self.config)
            .field("mode", &self.mode)
            .field("active_files", &self.active_files)
            .finish()
    }
}

impl<L: Language> Session<L> {
    pub fn new(lang: L, config: SessionConfig) -> Self {
        Session {
            lang,
            config,
            mode: ErrorMode::Normal,
            active_files: Vec::new(),
        }
    }

    pub fn language(&self) -> &L {
        &self.lang
    }

    /// Run one unit: every form in `input`, then the unit's tests
    pub fn run_source(&mut self, source: &str, input: &str) -> Summary {
        let mut summary = Summary::default();
        let mut tests = Vec::new();

        for datum in Reader::new(source, input) {
            let form = datum.map_err(Error::from).and_then(|datum| {
                self.lang
                    .parse(&datum.sexp)
                    .map_err(|err| Error::from(err.at(&datum.loc)))
            });
            match form {
                Ok(XDef::Def(def)) => {
                    if let Err(err) = self.lang.eval_def(&def, self.config.echo) {
                        self.recover(&err, &mut summary);
                    }
                }
                Ok(XDef::Use(file)) => match self.run_file(Path::new(&file)) {
                    Ok(nested) => summary.absorb(nested),
                    Err(err) => self.recover(&err, &mut summary),
                },
                Ok(XDef::Test(test)) => tests.push(test),
                Err(err) => self.recover(&err, &mut summary),
            }
        }

        self.run_tests(&tests, &mut summary);
        summary
    }

    /// Read and run a file as one unit.
    /// A file that is already being run, directly or through other files,
    /// is an error.
    pub fn run_file(&mut self, path: &Path) -> Result<Summary, Error> {
        let input = std::fs::read_to_string(path)
            .map_err(|_| Error::EvalError(format!("cannot open file \"{}\"", path.display())))?;
        let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if self.active_files.contains(&canonical) {
            return Err(Error::EvalError(format!(
                "use of file \"{}\" is circular",
                path.display()
            )));
        }
        debug!(file = %path.display(), depth = self.active_files.len(), "use");

        self.active_files.push(canonical);
        let summary =
            ensure_sufficient_stack(|| self.run_source(&path.display().to_string(), &input));
        self.active_files.pop();
        Ok(summary)
    }

    /// The recovery point: report the error as the current mode requires
    fn recover(&mut self, err: &Error, summary: &mut Summary) {
        debug!(error = %err, mode = ?self.mode, "recovered");
        if self.mode == ErrorMode::Normal {
            summary.errors += 1;
        }
        if let Err(io_err) = report(err, self.mode, self.config.error_format, self.lang.streams()) {
            warn!(error = %io_err, "could not report error");
        }
        self.lang.reset_trace();
    }

    fn run_tests(&mut self, tests: &[UnitTest<L::Exp>], summary: &mut Summary) {
        if tests.is_empty() {
            return;
        }
        self.mode = ErrorMode::Testing;
        let mut passed = 0;
        for test in tests {
            match self.run_test(test, summary) {
                Outcome::Passed => passed += 1,
                Outcome::Failed(message) => {
                    let streams = self.lang.streams();
                    if let Err(io_err) = streams
                        .flush_out()
                        .and_then(|()| writeln!(streams.diag, "{message}"))
                    {
                        warn!(error = %io_err, "could not report test failure");
                    }
                }
            }
        }
        self.mode = ErrorMode::Normal;
        debug!(passed, total = tests.len(), "unit tests");

        summary.tests_run += tests.len();
        summary.tests_passed += passed;
        let line = test_report(passed, tests.len());
        if let Err(io_err) = writeln!(self.lang.streams().out, "{line}") {
            warn!(error = %io_err, "could not report test results");
        }
    }

    /// Evaluate a test expression, recovering from any error it signals
    fn try_eval(&mut self, exp: &L::Exp, summary: &mut Summary) -> Option<L::Value> {
        match self.lang.eval_exp(exp) {
            Ok(value) => Some(value),
            Err(err) => {
                self.recover(&err, summary);
                None
            }
        }
    }

    fn run_test(&mut self, test: &UnitTest<L::Exp>, summary: &mut Summary) -> Outcome {
        match test {
            UnitTest::CheckExpect(e1, e2) => {
                let Some(v1) = self.try_eval(e1, summary) else {
                    return Outcome::Failed(format!(
                        "Check-expect failed: expected {e1} to evaluate to the same value as {e2}, but evaluating {e1} causes an error."
                    ));
                };
                let Some(v2) = self.try_eval(e2, summary) else {
                    return Outcome::Failed(format!(
                        "Check-expect failed: expected {e1} to evaluate to the same value as {e2}, but evaluating {e2} causes an error."
                    ));
                };
                if self.lang.equal(&v1, &v2) {
                    Outcome::Passed
                } else {
                    Outcome::Failed(format!(
                        "Check-expect failed: expected {e1} to evaluate to {v2}, but it's {v1}."
                    ))
                }
            }
            UnitTest::CheckAssert(e) => match self.try_eval(e, summary) {
                None => Outcome::Failed(format!(
                    "Check-assert failed: evaluating {e} causes an error."
                )),
                Some(v) if self.lang.is_true(&v) => Outcome::Passed,
                Some(v) => Outcome::Failed(format!("Check-assert failed: {e} evaluated to {v}.")),
            },
            UnitTest::CheckError(e) => match self.try_eval(e, summary) {
                None => Outcome::Passed,
                Some(v) => Outcome::Failed(format!(
                    "Check-error failed: evaluating {e} was expected to produce an error, but instead it produced the value {v}."
                )),
            },
        }
    }
}

/// The summary line printed after a unit's tests
pub fn test_report(passed: usize, total: usize) -> String {
    match (passed, total) {
        (1, 1) => "The only test passed.".to_owned(),
        (0, 1) => "The only test failed.".to_owned(),
        (2, 2) => "Both tests passed.".to_owned(),
        (0, 2) => "Both tests failed.".to_owned(),
        (p, n) if p == n => format!("All {n} tests passed."),
        (p, n) => format!("{p} of {n} tests passed."),
    }
}
