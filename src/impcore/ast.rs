use std::fmt;
use std::rc::Rc;

use crate::value::{Name, NumberType};

#[derive(Debug, Clone, PartialEq)]
pub enum Exp {
    Literal(NumberType),
    Var(Name),
    Set(Name, Box<Exp>),
    If(Box<Exp>, Box<Exp>, Box<Exp>),
    While(Box<Exp>, Box<Exp>),
    Begin(Vec<Exp>),
    /// Functions live in their own table, so the callee is always a name
    Apply(Name, Vec<Exp>),
}

/// A user-defined function: formals, locals (zero on entry) and body
#[derive(Debug, Clone, PartialEq)]
pub struct UserFun {
    pub formals: Vec<Name>,
    pub locals: Vec<Name>,
    pub body: Exp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Def {
    Val(Name, Exp),
    Define(Name, Rc<UserFun>),
    Exp(Exp),
}

impl fmt::Display for Exp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exp::Literal(n) => write!(f, "{n}"),
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
            Exp::Apply(name, args) => {
                write!(f, "({name}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}
