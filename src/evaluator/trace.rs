//! Call tracing.
//!
//! When the variable `&trace` is bound to a positive count, each function
//! application prints a line before the call and a line after it, and uses up
//! one unit of the count. Tracing only writes to the diagnostic stream; it
//! never changes which value a call returns.
//!
//! ```text
//! (fact 2) => ...
//!   (fact 1) => ...
//!   ... &trace goes to 0 ...
//!     (fact 0) => 1
//!   (fact 1) => 1
//! (fact 2) => 2
//! ```

use std::fmt;
use std::io::Write;

use crate::Error;
use crate::value::NumberType;

/// A traced call: callee as written, arguments as evaluated
pub struct CallSite<'a, C, A> {
    pub callee: &'a C,
    pub args: &'a [A],
}

impl<C: fmt::Display, A: fmt::Display> fmt::Display for CallSite<'_, C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.callee)?;
        for arg in self.args {
            write!(f, " {arg}")?;
        }
        write!(f, ")")
    }
}

/// Nesting state of the trace output
#[derive(Debug, Default)]
pub struct Tracer {
    indent: usize,
}

impl Tracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn indent(&self) -> usize {
        self.indent
    }

    /// Start tracing a call if `budget` holds a positive count.
    ///
    /// Uses up one unit of the budget. Returns whether the call is traced; a
    /// traced call must be closed with [`Tracer::leave`].
    pub fn enter(
        &mut self,
        budget: Option<&mut NumberType>,
        call: &dyn fmt::Display,
        diag: &mut dyn Write,
    ) -> Result<bool, Error> {
        let Some(count) = budget.filter(|count| **count > 0) else {
            return Ok(false);
        };
        let pad = self.indent;
        writeln!(diag, "{:pad$}{call} => ...", "")?;
        *count -= 1;
        if *count == 0 {
            writeln!(diag, "{:pad$}... &trace goes to 0 ...", "")?;
        }
        self.indent += 2;
        Ok(true)
    }

    /// Finish a traced call. A result of `None` means the call failed: the
    /// nesting is unwound but nothing is printed.
    pub fn leave(
        &mut self,
        call: &dyn fmt::Display,
        result: Option<&dyn fmt::Display>,
        diag: &mut dyn Write,
    ) -> Result<(), Error> {
        self.indent = self.indent.saturating_sub(2);
        if let Some(result) = result {
            let pad = self.indent;
            writeln!(diag, "{:pad$}{call} => {result}", "")?;
        }
        Ok(())
    }

    /// Forget any nesting, after an error abandoned traced calls
    pub fn reset(&mut self) {
        self.indent = 0;
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;

    #[test]
    fn test_call_site_display() {
        let call = CallSite {
            callee: &"f",
            args: &[1, 2],
        };
        assert_eq!(call.to_string(), "(f 1 2)");

        let no_args: CallSite<'_, &str, i32> = CallSite {
            callee: &"g",
            args: &[],
        };
        assert_eq!(no_args.to_string(), "(g)");
    }

    #[test]
    fn test_budget_is_consumed_and_nesting_indents() {
        let mut tracer = Tracer::new();
        let mut diag = Vec::new();
        let mut budget: NumberType = 2;

        let outer = CallSite { callee: &"f", args: &[2] };
        let inner = CallSite { callee: &"f", args: &[1] };

        assert!(tracer.enter(Some(&mut budget), &outer, &mut diag).unwrap());
        assert!(tracer.enter(Some(&mut budget), &inner, &mut diag).unwrap());
        assert_eq!(budget, 0);
        assert_eq!(tracer.indent(), 4);

        // exhausted: no more lines
        assert!(!tracer.enter(Some(&mut budget), &inner, &mut diag).unwrap());

        tracer.leave(&inner, Some(&1), &mut diag).unwrap();
        tracer.leave(&outer, Some(&2), &mut diag).unwrap();
        assert_eq!(tracer.indent(), 0);

        assert_eq!(
            String::from_utf8(diag).unwrap(),
            "(f 2) => ...\n  (f 1) => ...\n  ... &trace goes to 0 ...\n  (f 1) => 1\n(f 2) => 2\n"
        );
    }

    #[test]
    fn test_no_budget_or_non_positive_budget_is_silent() {
        let mut tracer = Tracer::new();
        let mut diag = Vec::new();
        let call = CallSite { callee: &"f", args: &[0] };

        assert!(!tracer.enter(None, &call, &mut diag).unwrap());
        let mut zero: NumberType = 0;
        assert!(!tracer.enter(Some(&mut zero), &call, &mut diag).unwrap());
        let mut negative: NumberType = -3;
        assert!(!tracer.enter(Some(&mut negative), &call, &mut diag).unwrap());
        assert_eq!(negative, -3);
        assert!(diag.is_empty());
    }

    #[test]
    fn test_failed_call_unwinds_silently() {
        let mut tracer = Tracer::new();
        let mut diag = Vec::new();
        let mut budget: NumberType = 5;
        let call = CallSite { callee: &"f", args: &[0] };

        tracer.enter(Some(&mut budget), &call, &mut diag).unwrap();
        tracer.leave(&call, None, &mut diag).unwrap();
        assert_eq!(tracer.indent(), 0);
        assert_eq!(String::from_utf8(diag.clone()).unwrap(), "(f 0) => ...\n");

        tracer.enter(Some(&mut budget), &call, &mut diag).unwrap();
        tracer.reset();
        assert_eq!(tracer.indent(), 0);
    }
}
