use std::fmt;
use std::io::Write;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::ast::{Def, Exp, LetKind, first_duplicate};
use crate::builtinops::builtin_ops;
use crate::stack::ensure_sufficient_stack;
use crate::streams::Streams;
use crate::toplevel::Echo;
use crate::value::{Name, Value};
use crate::{Error, IT_NAME, MAX_EVAL_DEPTH, TRACE_NAME};

mod environment;
mod trace;

pub use environment::{Env, FrameCollector, Location, MIN_COLLECTION_THRESHOLD};
pub use trace::{CallSite, Tracer};

/// The uScheme interpreter: global environment, output streams and trace state
pub struct Interpreter {
    globals: Env,
    streams: Streams,
    tracer: Tracer,
    max_depth: usize,
    frames: FrameCollector,
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("globals", &self.globals)
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}

impl Drop for Interpreter {
    /// Globals refer to themselves through every closure defined at top level
    fn drop(&mut self) {
        self.globals.clear();
        self.frames.collect(&self.globals);
    }
}

impl Interpreter {
    /// A fresh interpreter whose global environment holds every primitive
    pub fn new(streams: Streams) -> Self {
        let globals = Env::new();
        for op in builtin_ops() {
            globals.define(Rc::from(op.name), Value::Primitive(op));
        }
        Interpreter {
            globals,
            streams,
            tracer: Tracer::new(),
            max_depth: MAX_EVAL_DEPTH,
            frames: FrameCollector::new(),
        }
    }

    /// Lower (or raise) the evaluation depth at which "recursion too deep" is signaled
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn globals(&self) -> &Env {
        &self.globals
    }

    pub fn streams(&mut self) -> &mut Streams {
        &mut self.streams
    }

    pub fn tracer(&mut self) -> &mut Tracer {
        &mut self.tracer
    }

    /// Evaluate an expression in the given environment
    pub fn eval(&mut self, exp: &Exp, env: &Env) -> Result<Value, Error> {
        self.eval_with_depth_tracking(exp, env, 0)
    }

    /// Evaluate an expression in the global environment
    pub fn eval_global(&mut self, exp: &Exp) -> Result<Value, Error> {
        let globals = self.globals.clone();
        self.eval(exp, &globals)
    }

    /// Evaluate with depth tracking to prevent stack overflow
    fn eval_with_depth_tracking(
        &mut self,
        exp: &Exp,
        env: &Env,
        depth: usize,
    ) -> Result<Value, Error> {
        if depth >= self.max_depth {
            return Err(Error::RecursionTooDeep(self.max_depth));
        }
        ensure_sufficient_stack(|| self.eval_exp(exp, env, depth))
    }

    fn eval_exp(&mut self, exp: &Exp, env: &Env, depth: usize) -> Result<Value, Error> {
        match exp {
            Exp::Literal(value) => Ok(value.clone()),

            Exp::Var(name) => env
                .get(name)
                .ok_or_else(|| Error::UnboundVariable(name.to_string())),

            Exp::Set(name, rhs) => {
                let value = self.eval_with_depth_tracking(rhs, env, depth + 1)?;
                if env.assign(name, value.clone()) {
                    Ok(value)
                } else {
                    Err(Error::UnboundAssignment {
                        name: name.to_string(),
                        expression: exp.to_string(),
                    })
                }
            }

            Exp::If(condition, then_exp, else_exp) => {
                if self
                    .eval_with_depth_tracking(condition, env, depth + 1)?
                    .is_true()
                {
                    self.eval_with_depth_tracking(then_exp, env, depth + 1)
                } else {
                    self.eval_with_depth_tracking(else_exp, env, depth + 1)
                }
            }

            Exp::While(condition, body) => {
                while self
                    .eval_with_depth_tracking(condition, env, depth + 1)?
                    .is_true()
                {
                    self.eval_with_depth_tracking(body, env, depth + 1)?;
                }
                Ok(Value::Bool(false))
            }

            Exp::Begin(exps) => {
                let mut last = Value::Bool(false);
                for e in exps {
                    last = self.eval_with_depth_tracking(e, env, depth + 1)?;
                }
                Ok(last)
            }

            Exp::Apply(callee, arg_exps) => {
                let function = self.eval_with_depth_tracking(callee, env, depth + 1)?;
                let args = self.eval_args(arg_exps, env, depth)?;

                let call = CallSite {
                    callee: callee.as_ref(),
                    args: &args,
                };
                let traced = self.trace_enter(env, &call)?;
                let result = self.apply(exp, callee, function, &args, depth);
                if traced {
                    let shown = result.as_ref().ok().map(|v| v as &dyn fmt::Display);
                    self.tracer.leave(&call, shown, &mut *self.streams.diag)?;
                }
                result
            }

            Exp::Lambda(lambda) => Ok(Value::Closure {
                lambda: Rc::clone(lambda),
                env: env.clone(),
            }),

            Exp::Let(LetKind::Let, bindings, body) => {
                let values = bindings
                    .iter()
                    .map(|(_, e)| self.eval_with_depth_tracking(e, env, depth + 1))
                    .collect::<Result<Vec<_>, _>>()?;
                let names = bindings.iter().map(|(name, _)| Rc::clone(name));
                let frame = self.extend(env, names.zip(values));
                self.eval_with_depth_tracking(body, &frame, depth + 1)
            }

            Exp::Let(LetKind::LetStar, bindings, body) => {
                let mut frame = env.clone();
                for (name, e) in bindings {
                    let value = self.eval_with_depth_tracking(e, &frame, depth + 1)?;
                    frame = self.extend(&frame, [(Rc::clone(name), value)]);
                }
                self.eval_with_depth_tracking(body, &frame, depth + 1)
            }

            Exp::Let(LetKind::LetRec, bindings, body) => {
                if let Some((_, e)) = bindings.iter().find(|(_, e)| !matches!(e, Exp::Lambda(_))) {
                    return Err(Error::MalformedBinding(e.to_string()));
                }
                let frame = self.extend(
                    env,
                    bindings
                        .iter()
                        .map(|(name, _)| (Rc::clone(name), Value::Unspecified)),
                );
                let values = bindings
                    .iter()
                    .map(|(_, e)| self.eval_with_depth_tracking(e, &frame, depth + 1))
                    .collect::<Result<Vec<_>, _>>()?;
                for ((name, _), value) in bindings.iter().zip(values) {
                    frame.assign(name, value);
                }
                self.eval_with_depth_tracking(body, &frame, depth + 1)
            }
        }
    }

    /// A new frame over `env`, tracked so that it is released even if a
    /// closure stored in it refers back to it
    fn extend<I>(&mut self, env: &Env, bindings: I) -> Env
    where
        I: IntoIterator<Item = (Name, Value)>,
    {
        let frame = env.extend(bindings);
        self.frames.track(&frame);
        if self.frames.is_due() {
            self.frames.collect(&self.globals);
        }
        frame
    }

    /// Evaluate arguments strictly left to right
    fn eval_args(&mut self, args: &[Exp], env: &Env, depth: usize) -> Result<Vec<Value>, Error> {
        args.iter()
            .map(|arg| self.eval_with_depth_tracking(arg, env, depth + 1))
            .collect()
    }

    fn apply(
        &mut self,
        call: &Exp,
        callee: &Exp,
        function: Value,
        args: &[Value],
        depth: usize,
    ) -> Result<Value, Error> {
        match &function {
            Value::Closure { lambda, env } => {
                if lambda.formals.len() != args.len() {
                    return Err(
                        Error::arity_error(lambda.formals.len(), args.len()).in_expression(call)
                    );
                }
                trace!(function = %callee, args = args.len(), "apply closure");
                let bindings = lambda.formals.iter().cloned().zip(args.iter().cloned());
                let frame = self.extend(env, bindings);
                self.eval_with_depth_tracking(&lambda.body, &frame, depth + 1)
            }
            Value::Primitive(op) => {
                trace!(primitive = op.name, args = args.len(), "apply primitive");
                op.apply(args, &mut *self.streams.out)
                    .map_err(|err| err.in_expression(call))
            }
            other => Err(Error::NotAFunction {
                callee: callee.to_string(),
                value: other.to_string(),
                expression: call.to_string(),
            }),
        }
    }

    /// Start tracing a call when `&trace` holds a positive count
    fn trace_enter(&mut self, env: &Env, call: &dyn fmt::Display) -> Result<bool, Error> {
        let Some(location) = env.lookup(TRACE_NAME) else {
            return Ok(false);
        };
        let mut count = location.borrow_mut();
        let budget = match &mut *count {
            Value::Number(n) => Some(n),
            _ => None,
        };
        self.tracer.enter(budget, call, &mut *self.streams.diag)
    }

    /// Process a top-level definition, returning the value it bound
    pub fn eval_def(&mut self, def: &Def, echo: Echo) -> Result<Value, Error> {
        match def {
            Def::Val(name, exp) => {
                let value = self.eval_global(exp)?;
                debug!(name = %name, "val");
                self.globals.define(Rc::clone(name), value.clone());
                if value.is_function() {
                    self.echo(echo, name)?;
                } else {
                    self.echo(echo, &value)?;
                }
                Ok(value)
            }
            Def::Define(name, lambda) => {
                if let Some(parameter) = first_duplicate(&lambda.formals) {
                    return Err(Error::DuplicateFormal {
                        parameter: parameter.to_string(),
                        function: name.to_string(),
                    });
                }
                debug!(name = %name, arity = lambda.formals.len(), "define");
                let closure = Value::Closure {
                    lambda: Rc::clone(lambda),
                    env: self.globals.clone(),
                };
                self.globals.define(Rc::clone(name), closure.clone());
                self.echo(echo, name)?;
                Ok(closure)
            }
            Def::Exp(exp) => {
                let value = self.eval_global(exp)?;
                self.globals.define(Name::from(IT_NAME), value.clone());
                self.echo(echo, &value)?;
                Ok(value)
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
