//! Impcore: uScheme's imperative ancestor.
//!
//! Every value is a 32-bit integer and only `0` is false. There are no
//! closures; functions are defined at top level into their own table.

pub mod ast;
pub mod eval;
pub mod parse;
pub mod primitives;

pub use eval::Interpreter;

use crate::scheme::Sexp;
use crate::streams::Streams;
use crate::toplevel::{Echo, Language, XDef};
use crate::value::NumberType;
use crate::{Error, ParseError};

impl Language for Interpreter {
    type Def = ast::Def;
    type Exp = ast::Exp;
    type Value = NumberType;

    fn parse(&self, sexp: &Sexp) -> Result<XDef<ast::Def, ast::Exp>, ParseError> {
        parse::parse_form(sexp)
    }

    fn eval_def(&mut self, def: &ast::Def, echo: Echo) -> Result<(), Error> {
        Interpreter::eval_def(self, def, echo)
    }

    fn eval_exp(&mut self, exp: &ast::Exp) -> Result<NumberType, Error> {
        self.eval_global(exp)
    }

    fn equal(&self, a: &NumberType, b: &NumberType) -> bool {
        a == b
    }

    fn is_true(&self, value: &NumberType) -> bool {
        *value != 0
    }

    fn streams(&mut self) -> &mut Streams {
        Interpreter::streams(self)
    }

    fn reset_trace(&mut self) {
        self.tracer().reset();
    }
}
