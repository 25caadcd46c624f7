//! Abstract syntax of uScheme.
//!
//! Expressions are built once by the parser and only read afterwards. A
//! [`Lambda`] sits behind an `Rc` so creating a closure shares it instead of
//! copying the body.

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use crate::value::{Name, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LetKind {
    /// Initializers see the enclosing environment only
    Let,
    /// Each initializer sees the bindings before it
    LetStar,
    /// Initializers must be lambdas and see all the bindings
    LetRec,
}

impl LetKind {
    pub fn keyword(self) -> &'static str {
        match self {
            LetKind::Let => "let",
            LetKind::LetStar => "let*",
            LetKind::LetRec => "letrec",
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct Lambda {
    pub formals: Vec<Name>,
    pub body: Exp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Exp {
    Literal(Value),
    Var(Name),
    Set(Name, Box<Exp>),
    If(Box<Exp>, Box<Exp>, Box<Exp>),
    While(Box<Exp>, Box<Exp>),
    Begin(Vec<Exp>),
    /// Callee expression and argument expressions
    Apply(Box<Exp>, Vec<Exp>),
    Lambda(Rc<Lambda>),
    Let(LetKind, Vec<(Name, Exp)>, Box<Exp>),
}

/// A top-level definition
#[derive(Debug, Clone, PartialEq)]
pub enum Def {
    Val(Name, Exp),
    /// `(define f (x ...) body)`; formals are checked for duplicates when evaluated
    Define(Name, Rc<Lambda>),
    Exp(Exp),
}

/// The first name that appears more than once in `names`
pub fn first_duplicate(names: &[Name]) -> Option<&Name> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Some(name);
        }
    }
    None
}

fn write_names(f: &mut fmt::Formatter<'_>, names: &[Name]) -> fmt::Result {
    write!(f, "(")?;
    for (i, name) in names.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{name}")?;
    }
    write!(f, ")")
}

impl fmt::Display for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(lambda ")?;
        write_names(f, &self.formals)?;
        write!(f, " {})", self.body)
    }
}

impl fmt::Display for Exp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exp::Literal(v @ (Value::Symbol(_) | Value::Nil | Value::Pair(..))) => {
                write!(f, "'{v}")
            }
            Exp::Literal(v) => write!(f, "{v}"),
            Exp::Var(name) => write!(f, "{name}"),
            Exp::Set(name, e) => write!(f, "(set {name} {e})"),
            Exp::If(c, t, e) => write!(f, "(if {c} {t} {e})"),
            Exp::While(c, body) => write!(f, "(while {c} {body})"),
            Exp::Begin(es) => {
                write!(f, "(begin")?;
                for e in es {
                    write!(f, " {e}")?;
                }
                write!(f, ")")
            }
            Exp::Apply(callee, args) => {
                write!(f, "({callee}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                write!(f, ")")
            }
            Exp::Lambda(lambda) => write!(f, "{lambda}"),
            Exp::Let(kind, bindings, body) => {
                write!(f, "({} (", kind.keyword())?;
                for (i, (name, e)) in bindings.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "({name} {e})")?;
                }
                write!(f, ") {body})")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{sym, val};

    fn var(name: &str) -> Exp {
        Exp::Var(Rc::from(name))
    }

    #[test]
    fn test_display_round_trips_surface_syntax() {
        let lambda = Rc::new(Lambda {
            formals: vec![Rc::from("x"), Rc::from("y")],
            body: Exp::Apply(Box::new(var("+")), vec![var("x"), var("y")]),
        });

        let cases = vec![
            (Exp::Literal(val(3)), "3"),
            (Exp::Literal(val(true)), "#t"),
            (Exp::Literal(sym("a")), "'a"),
            (Exp::Literal(val([1, 2])), "'(1 2)"),
            (
                Exp::Set(Rc::from("x"), Box::new(Exp::Literal(val(1)))),
                "(set x 1)",
            ),
            (
                Exp::If(
                    Box::new(var("c")),
                    Box::new(Exp::Literal(val(1))),
                    Box::new(Exp::Literal(val(2))),
                ),
                "(if c 1 2)",
            ),
            (Exp::Begin(vec![]), "(begin)"),
            (Exp::Lambda(lambda.clone()), "(lambda (x y) (+ x y))"),
            (
                Exp::Let(
                    LetKind::LetStar,
                    vec![(Rc::from("x"), Exp::Literal(val(1)))],
                    Box::new(var("x")),
                ),
                "(let* ((x 1)) x)",
            ),
        ];

        for (i, (exp, expected)) in cases.iter().enumerate() {
            assert_eq!(exp.to_string(), *expected, "case #{}", i + 1);
        }
    }

    #[test]
    fn test_first_duplicate() {
        let names = |xs: &[&str]| xs.iter().map(|x| Rc::from(*x)).collect::<Vec<Name>>();
        assert_eq!(first_duplicate(&names(&[])), None);
        assert_eq!(first_duplicate(&names(&["a", "b", "c"])), None);
        assert_eq!(
            first_duplicate(&names(&["a", "b", "a", "b"])).map(|n| &**n),
            Some("a")
        );
    }
}
