//! Runtime values of uScheme.
//!
//! The main enum, [`Value`], covers numbers, booleans, symbols, the empty list,
//! pairs, closures and primitives. Values are immutable once built; the only
//! mutation in the language is re-binding the *location* that holds a value.
//! Helper functions [`val`], [`sym`] and [`nil`] make it easy to build values
//! in code and tests.

use std::fmt;
use std::rc::Rc;

use crate::ast::Lambda;
use crate::builtinops::BuiltinOp;
use crate::evaluator::Env;
use crate::stack::ensure_sufficient_stack;

/// Integer type shared by both languages; all arithmetic is checked at this width
pub type NumberType = i32;

/// An identifier. Cloning shares the string.
pub type Name = Rc<str>;

/// Core runtime value type of uScheme
#[derive(Clone)]
pub enum Value {
    Number(NumberType),
    Bool(bool),
    Symbol(Name),
    /// The empty list
    Nil,
    Pair(Rc<Value>, Rc<Value>),
    /// A lambda paired with the environment it was created in
    Closure { lambda: Rc<Lambda>, env: Env },
    Primitive(&'static BuiltinOp),
    /// Placeholder held by letrec-bound names until their initializers run.
    /// Never equal to anything, itself included.
    Unspecified,
}

impl Value {
    /// uScheme's truth convention: everything except `#f` is true
    pub fn is_true(&self) -> bool {
        !matches!(self, Value::Bool(false))
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Value::Closure { .. } | Value::Primitive(_))
    }

    pub fn cons(car: Value, cdr: Value) -> Value {
        Value::Pair(Rc::new(car), Rc::new(cdr))
    }

    /// Build a proper list from the given elements
    pub fn list<I>(elements: I) -> Value
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: DoubleEndedIterator,
    {
        elements
            .into_iter()
            .rev()
            .fold(Value::Nil, |tail, head| Value::cons(head, tail))
    }

    /// Equality of atoms, as used by the `=` primitive.
    /// Pairs and functions are never `=`.
    pub fn equal_atoms(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Nil, Value::Nil) => true,
            _ => false,
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<NumberType> for Value {
    fn from(n: NumberType) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::list(v.into_iter().map(Into::into).collect::<Vec<_>>())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::list(arr.into_iter().map(Into::into))
    }
}

/// Helper function for creating symbols
pub fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(Rc::from(name.as_ref()))
}

/// Helper function for creating Values from anything convertible
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for the empty list
pub fn nil() -> Value {
    Value::Nil
}

impl PartialEq for Value {
    /// Structural equality on atoms and pairs, identity on functions.
    /// Walks the cdr chain in a loop; only cars are compared recursively.
    fn eq(&self, other: &Self) -> bool {
        let (mut left, mut right) = (self, other);
        loop {
            match (left, right) {
                (Value::Pair(a1, d1), Value::Pair(a2, d2)) => {
                    if !ensure_sufficient_stack(|| a1 == a2) {
                        return false;
                    }
                    left = d1.as_ref();
                    right = d2.as_ref();
                }
                (
                    Value::Closure {
                        lambda: l1,
                        env: e1,
                    },
                    Value::Closure {
                        lambda: l2,
                        env: e2,
                    },
                ) => return Rc::ptr_eq(l1, l2) && e1.ptr_eq(e2),
                (Value::Primitive(p1), Value::Primitive(p2)) => return p1.name == p2.name,
                (Value::Unspecified, _) | (_, Value::Unspecified) => return false,
                _ => return left.equal_atoms(right),
            }
        }
    }
}

thread_local! {
    static SHARED_NIL: Rc<Value> = Rc::new(Value::Nil);
}

fn shared_nil() -> Rc<Value> {
    SHARED_NIL
        .try_with(Rc::clone)
        .unwrap_or_else(|_| Rc::new(Value::Nil))
}

/// Move the pair-valued fields of a pair onto `pending`, leaving `()` behind
fn detach_pairs(value: &mut Value, pending: &mut Vec<Rc<Value>>) {
    if let Value::Pair(car, cdr) = value {
        for field in [car, cdr] {
            if matches!(**field, Value::Pair(..)) {
                pending.push(std::mem::replace(field, shared_nil()));
            }
        }
    }
}

impl Drop for Value {
    /// Release nested pairs from a worklist, so dropping a long list
    /// uses constant stack.
    fn drop(&mut self) {
        let mut pending = Vec::new();
        detach_pairs(self, &mut pending);
        while let Some(cell) = pending.pop() {
            if let Ok(mut value) = Rc::try_unwrap(cell) {
                detach_pairs(&mut value, &mut pending);
            }
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::Nil => write!(f, "Nil"),
            Value::Pair(car, cdr) => {
                ensure_sufficient_stack(|| write!(f, "Pair({car:?}, {cdr:?})"))
            }
            Value::Closure { lambda, .. } => write!(f, "Closure({lambda})"),
            Value::Primitive(op) => write!(f, "Primitive({})", op.name),
            Value::Unspecified => write!(f, "Unspecified"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::Nil => write!(f, "()"),
            Value::Pair(car, cdr) => {
                ensure_sufficient_stack(|| write!(f, "({car}"))?;
                let mut rest = cdr.as_ref();
                loop {
                    match rest {
                        Value::Nil => break,
                        Value::Pair(car, cdr) => {
                            ensure_sufficient_stack(|| write!(f, " {car}"))?;
                            rest = cdr.as_ref();
                        }
                        other => {
                            write!(f, " . {other}")?;
                            break;
                        }
                    }
                }
                write!(f, ")")
            }
            Value::Closure { .. } | Value::Primitive(_) => write!(f, "<function>"),
            Value::Unspecified => write!(f, "<unspecified>"),
        }
    }
}
