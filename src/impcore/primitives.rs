//! Impcore's primitive functions.
//!
//! Every value is an integer, so the table only needs arity and an integer
//! function. Comparisons answer 1 for true and 0 for false; the printers
//! return their argument.

use std::io::Write;

use crate::Error;
use crate::builtinops::{checked_add, checked_div, checked_mul, checked_sub, write_utf8};
use crate::value::NumberType;

pub type PrimitiveFn = fn(&[NumberType], &mut dyn Write) -> Result<NumberType, Error>;

pub struct Primitive {
    pub name: &'static str,
    pub arity: usize,
    func: PrimitiveFn,
}

impl std::fmt::Debug for Primitive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Primitive({}/{})", self.name, self.arity)
    }
}

impl Primitive {
    /// Apply to already-evaluated arguments, checking the count first
    pub fn apply(&self, args: &[NumberType], out: &mut dyn Write) -> Result<NumberType, Error> {
        if args.len() != self.arity {
            return Err(Error::arity_error(self.arity, args.len()));
        }
        (self.func)(args, out)
    }
}

fn truth(b: bool) -> NumberType {
    NumberType::from(b)
}

macro_rules! binary {
    ($name:ident, |$a:ident, $b:ident| $body:expr) => {
        fn $name(args: &[NumberType], _out: &mut dyn Write) -> Result<NumberType, Error> {
            let ($a, $b) = (args[0], args[1]);
            $body
        }
    };
}

binary!(prim_add, |a, b| checked_add(a, b));
binary!(prim_sub, |a, b| checked_sub(a, b));
binary!(prim_mul, |a, b| checked_mul(a, b));
binary!(prim_div, |a, b| checked_div(a, b));
binary!(prim_lt, |a, b| Ok(truth(a < b)));
binary!(prim_gt, |a, b| Ok(truth(a > b)));
binary!(prim_eq, |a, b| Ok(truth(a == b)));

fn prim_print(args: &[NumberType], out: &mut dyn Write) -> Result<NumberType, Error> {
    write!(out, "{}", args[0])?;
    Ok(args[0])
}

fn prim_println(args: &[NumberType], out: &mut dyn Write) -> Result<NumberType, Error> {
    writeln!(out, "{}", args[0])?;
    Ok(args[0])
}

fn prim_printu(args: &[NumberType], out: &mut dyn Write) -> Result<NumberType, Error> {
    write_utf8(out, args[0])?;
    Ok(args[0])
}

static PRIMITIVES: &[Primitive] = &[
    Primitive {
        name: "+",
        arity: 2,
        func: prim_add,
    },
    Primitive {
        name: "-",
        arity: 2,
        func: prim_sub,
    },
    Primitive {
        name: "*",
        arity: 2,
        func: prim_mul,
    },
    Primitive {
        name: "/",
        arity: 2,
        func: prim_div,
    },
    Primitive {
        name: "<",
        arity: 2,
        func: prim_lt,
    },
    Primitive {
        name: ">",
        arity: 2,
        func: prim_gt,
    },
    Primitive {
        name: "=",
        arity: 2,
        func: prim_eq,
    },
    Primitive {
        name: "print",
        arity: 1,
        func: prim_print,
    },
    Primitive {
        name: "println",
        arity: 1,
        func: prim_println,
    },
    Primitive {
        name: "printu",
        arity: 1,
        func: prim_printu,
    },
];

pub fn primitives() -> &'static [Primitive] {
    PRIMITIVES
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;

    fn call(name: &str, args: &[NumberType]) -> Result<NumberType, Error> {
        let prim = primitives().iter().find(|p| p.name == name).unwrap();
        prim.apply(args, &mut std::io::sink())
    }

    #[test]
    fn test_primitives_data_driven() {
        let cases: Vec<(&str, Vec<NumberType>, Result<NumberType, Error>)> = vec![
            ("+", vec![2, 3], Ok(5)),
            ("-", vec![2, 3], Ok(-1)),
            ("*", vec![-4, 3], Ok(-12)),
            ("/", vec![7, 2], Ok(3)),
            ("/", vec![-7, 2], Ok(-3)),
            ("<", vec![1, 2], Ok(1)),
            ("<", vec![2, 2], Ok(0)),
            (">", vec![3, 2], Ok(1)),
            ("=", vec![2, 2], Ok(1)),
            ("=", vec![2, 3], Ok(0)),
            ("+", vec![NumberType::MAX, 1], Err(Error::overflow())),
            ("*", vec![65536, 65536], Err(Error::overflow())),
            ("/", vec![NumberType::MIN, -1], Err(Error::overflow())),
            ("/", vec![1, 0], Err(Error::division_by_zero())),
            ("+", vec![1], Err(Error::arity_error(2, 1))),
            ("println", vec![1, 2], Err(Error::arity_error(1, 2))),
        ];

        for (i, (name, args, expected)) in cases.into_iter().enumerate() {
            assert_eq!(call(name, &args), expected, "case #{} ({name} {args:?})", i + 1);
        }
    }

    #[test]
    fn test_printers_write_and_return_their_argument() {
        let mut out = Vec::new();
        for name in ["print", "println", "printu"] {
            let prim = primitives().iter().find(|p| p.name == name).unwrap();
            assert_eq!(prim.apply(&[65], &mut out).unwrap(), 65);
        }
        assert_eq!(String::from_utf8(out).unwrap(), "6565\nA");
    }
}
