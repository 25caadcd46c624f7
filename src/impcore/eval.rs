//! Impcore evaluation.
//!
//! Variables live in three unchained scopes, consulted in order: the current
//! call's locals, its formals, then the globals. Functions live in a table of
//! their own, so a function and a global variable may share a name.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::rc::Rc;

use tracing::{debug, trace};

use super::ast::{Def, Exp, UserFun};
use super::primitives::{Primitive, primitives};
use crate::ast::first_duplicate;
use crate::evaluator::{CallSite, Tracer};
use crate::stack::ensure_sufficient_stack;
use crate::streams::Streams;
use crate::toplevel::Echo;
use crate::value::{Name, NumberType};
use crate::{Error, IT_NAME, MAX_EVAL_DEPTH, TRACE_NAME};

/// An entry in the function table
#[derive(Debug, Clone)]
pub enum Func {
    UserDef(Rc<UserFun>),
    Primitive(&'static Primitive),
}

/// Formals and locals of the active call
#[derive(Debug, Default)]
struct Frame {
    formals: HashMap<Name, NumberType>,
    locals: HashMap<Name, NumberType>,
}

/// Find a variable's cell, locals first, then formals, then globals
fn lookup<'a>(
    frame: &'a mut Frame,
    globals: &'a mut HashMap<Name, NumberType>,
    name: &str,
) -> Option<&'a mut NumberType> {
    if let Some(cell) = frame.locals.get_mut(name) {
        return Some(cell);
    }
    if let Some(cell) = frame.formals.get_mut(name) {
        return Some(cell);
    }
    globals.get_mut(name)
}

pub struct Interpreter {
    globals: HashMap<Name, NumberType>,
    functions: HashMap<Name, Func>,
    streams: Streams,
    tracer: Tracer,
    max_depth: usize,
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("globals", &self.globals.len())
            .field("functions", &self.functions.len())
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

impl Interpreter {
    /// A fresh interpreter whose function table holds the primitives
    pub fn new(streams: Streams) -> Self {
        let functions = primitives()
            .iter()
            .map(|prim| (Name::from(prim.name), Func::Primitive(prim)))
            .collect();
        Interpreter {
            globals: HashMap::new(),
            functions,
            streams,
            tracer: Tracer::new(),
            max_depth: MAX_EVAL_DEPTH,
        }
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn global(&self, name: &str) -> Option<NumberType> {
        self.globals.get(name).copied()
    }

    /// Global variables, sorted by name
    pub fn global_bindings(&self) -> Vec<(Name, NumberType)> {
        let mut bindings: Vec<_> = self
            .globals
            .iter()
            .map(|(name, value)| (Rc::clone(name), *value))
            .collect();
        bindings.sort_by(|a, b| a.0.cmp(&b.0));
        bindings
    }

    /// Names of user-defined functions, sorted
    pub fn function_names(&self) -> Vec<Name> {
        let mut names: Vec<_> = self
            .functions
            .iter()
            .filter(|(_, f)| matches!(f, Func::UserDef(_)))
            .map(|(name, _)| Rc::clone(name))
            .collect();
        names.sort();
        names
    }

    pub fn streams(&mut self) -> &mut Streams {
        &mut self.streams
    }

    pub fn tracer(&mut self) -> &mut Tracer {
        &mut self.tracer
    }

    /// Evaluate with only the globals in scope
    pub fn eval_global(&mut self, exp: &Exp) -> Result<NumberType, Error> {
        self.eval_with_depth_tracking(exp, &mut Frame::default(), 0)
    }

    fn eval_with_depth_tracking(
        &mut self,
        exp: &Exp,
        frame: &mut Frame,
        depth: usize,
    ) -> Result<NumberType, Error> {
        if depth >= self.max_depth {
            return Err(Error::RecursionTooDeep(self.max_depth));
        }
        ensure_sufficient_stack(|| self.eval_exp(exp, frame, depth))
    }

    fn eval_exp(
        &mut self,
        exp: &Exp,
        frame: &mut Frame,
        depth: usize,
    ) -> Result<NumberType, Error> {
        match exp {
            Exp::Literal(n) => Ok(*n),

            Exp::Var(name) => lookup(frame, &mut self.globals, name)
                .map(|cell| *cell)
                .ok_or_else(|| Error::UnboundImpcoreVariable(name.to_string())),

            Exp::Set(name, rhs) => {
                let value = self.eval_with_depth_tracking(rhs, frame, depth + 1)?;
                let cell = lookup(frame, &mut self.globals, name).ok_or_else(|| {
                    Error::UnboundImpcoreAssignment {
                        name: name.to_string(),
                        expression: exp.to_string(),
                    }
                })?;
                *cell = value;
                Ok(value)
            }

            Exp::If(condition, then_exp, else_exp) => {
                if self.eval_with_depth_tracking(condition, frame, depth + 1)? != 0 {
                    self.eval_with_depth_tracking(then_exp, frame, depth + 1)
                } else {
                    self.eval_with_depth_tracking(else_exp, frame, depth + 1)
                }
            }

            Exp::While(condition, body) => {
                while self.eval_with_depth_tracking(condition, frame, depth + 1)? != 0 {
                    self.eval_with_depth_tracking(body, frame, depth + 1)?;
                }
                Ok(0)
            }

            Exp::Begin(exps) => {
                let mut last = 0;
                for e in exps {
                    last = self.eval_with_depth_tracking(e, frame, depth + 1)?;
                }
                Ok(last)
            }

            Exp::Apply(name, arg_exps) => {
                let Some(function) = self.functions.get(name).cloned() else {
                    return Err(Error::UndefinedFunction {
                        name: name.to_string(),
                        expression: exp.to_string(),
                    });
                };
                let args = arg_exps
                    .iter()
                    .map(|arg| self.eval_with_depth_tracking(arg, frame, depth + 1))
                    .collect::<Result<Vec<_>, _>>()?;

                let call = CallSite {
                    callee: name,
                    args: &args,
                };
                let budget = lookup(frame, &mut self.globals, TRACE_NAME);
                let traced = self.tracer.enter(budget, &call, &mut *self.streams.diag)?;
                let result = self.apply(exp, function, &args, depth);
                if traced {
                    let shown = result.as_ref().ok().map(|v| v as &dyn fmt::Display);
                    self.tracer.leave(&call, shown, &mut *self.streams.diag)?;
                }
                result
            }
        }
    }

    fn apply(
        &mut self,
        call: &Exp,
        function: Func,
        args: &[NumberType],
        depth: usize,
    ) -> Result<NumberType, Error> {
        match function {
            Func::UserDef(fun) => {
                if fun.formals.len() != args.len() {
                    return Err(
                        Error::arity_error(fun.formals.len(), args.len()).in_expression(call)
                    );
                }
                trace!(function = %call, args = args.len(), "apply function");
                let mut frame = Frame {
                    formals: fun.formals.iter().cloned().zip(args.iter().copied()).collect(),
                    locals: fun.locals.iter().map(|name| (Rc::clone(name), 0)).collect(),
                };
                self.eval_with_depth_tracking(&fun.body, &mut frame, depth + 1)
            }
            Func::Primitive(prim) => {
                trace!(primitive = prim.name, args = args.len(), "apply primitive");
                prim.apply(args, &mut *self.streams.out)
                    .map_err(|err| err.in_expression(call))
            }
        }
    }

    /// Process a top-level definition
    pub fn eval_def(&mut self, def: &Def, echo: Echo) -> Result<(), Error> {
        match def {
            Def::Val(name, exp) => {
                let value = self.eval_global(exp)?;
                debug!(name = %name, "val");
                self.globals.insert(Rc::clone(name), value);
                self.echo(echo, &value)
            }
            Def::Define(name, fun) => {
                if let Some(parameter) = first_duplicate(&fun.formals) {
                    return Err(Error::DuplicateImpcoreFormal {
                        parameter: parameter.to_string(),
                        function: name.to_string(),
                    });
                }
                debug!(name = %name, arity = fun.formals.len(), "define");
                self.functions
                    .insert(Rc::clone(name), Func::UserDef(Rc::clone(fun)));
                self.echo(echo, name)
            }
            Def::Exp(exp) => {
                let value = self.eval_global(exp)?;
                self.globals.insert(Name::from(IT_NAME), value);
                self.echo(echo, &value)
            }
        }
    }

    fn echo(&mut self, echo: Echo, shown: &dyn fmt::Display) -> Result<(), Error> {
        if echo == Echo::On {
            writeln!(self.streams.out, "{shown}")?;
        }
        Ok(())
    }
}
