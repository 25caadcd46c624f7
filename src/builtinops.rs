//! Built-in operations of uScheme and the checked arithmetic both languages share.
//!
//! Every primitive declares a fixed arity. The application step checks it
//! before calling the primitive, so implementations can rely on the argument
//! count.
//!
//! ```scheme
//! (+ 1 2)            ; 3
//! (/ 7 0)            ; division by zero
//! (* 65536 65536)    ; arithmetic overflow
//! (println 'hello)   ; prints, then returns the symbol
//! ```
//!
//! ## Error Handling
//!
//! - **Type Safety**: arithmetic and comparison reject non-numbers
//! - **Overflow Detection**: results outside 32 bits signal an overflow instead of wrapping
//! - **Arity Checking**: strict argument count validation for every primitive
//!
//! Primitives don't see the call expression; the evaluator attaches it to
//! their errors with [`Error::in_expression`].
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** with the signature [`PrimitiveFn`]
//! 2. **Add to BUILTIN_OPS** with its name and arity
//! 3. **Add tests** covering edge cases and error conditions

use std::collections::HashMap;
use std::io::Write;
use std::sync::LazyLock;

use crate::Error;
use crate::value::{NumberType, Value};

/// Canonical primitive signature: checked arguments and the standard output stream
pub type PrimitiveFn = fn(&[Value], &mut dyn Write) -> Result<Value, Error>;

/// Definition of a built-in operation
pub struct BuiltinOp {
    pub name: &'static str,
    /// Exact number of arguments
    pub arity: usize,
    func: PrimitiveFn,
}

impl std::fmt::Debug for BuiltinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BuiltinOp({}/{})", self.name, self.arity)
    }
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl BuiltinOp {
    pub fn validate_arity(&self, arg_count: usize) -> Result<(), Error> {
        if arg_count == self.arity {
            Ok(())
        } else {
            Err(Error::arity_error(self.arity, arg_count))
        }
    }

    /// Check the arity, then run the primitive
    pub fn apply(&self, args: &[Value], out: &mut dyn Write) -> Result<Value, Error> {
        self.validate_arity(args.len())?;
        (self.func)(args, out)
    }
}

//
// Checked arithmetic, shared with Impcore
//

pub(crate) fn checked_add(a: NumberType, b: NumberType) -> Result<NumberType, Error> {
    a.checked_add(b).ok_or_else(Error::overflow)
}

pub(crate) fn checked_sub(a: NumberType, b: NumberType) -> Result<NumberType, Error> {
    a.checked_sub(b).ok_or_else(Error::overflow)
}

pub(crate) fn checked_mul(a: NumberType, b: NumberType) -> Result<NumberType, Error> {
    a.checked_mul(b).ok_or_else(Error::overflow)
}

/// Truncating division. `MIN / -1` is the one quotient that overflows.
pub(crate) fn checked_div(a: NumberType, b: NumberType) -> Result<NumberType, Error> {
    if b == 0 {
        return Err(Error::division_by_zero());
    }
    a.checked_div(b).ok_or_else(Error::overflow)
}

/// Write the Unicode code point `code` as UTF-8
pub(crate) fn write_utf8(out: &mut dyn Write, code: NumberType) -> Result<(), Error> {
    let ch = u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| Error::EvalError(format!("printu: {code} is not a Unicode code point")))?;
    write!(out, "{ch}")?;
    Ok(())
}

//
// Builtin Function Implementations
//

fn number(op: &str, value: &Value) -> Result<NumberType, Error> {
    match value {
        Value::Number(n) => Ok(*n),
        other => Err(Error::TypeError(format!(
            "operands of {op} must be numbers, but got {other}"
        ))),
    }
}

fn unary(args: &[Value]) -> Result<&Value, Error> {
    match args {
        [v] => Ok(v),
        _ => Err(Error::arity_error(1, args.len())),
    }
}

fn binary(args: &[Value]) -> Result<(&Value, &Value), Error> {
    match args {
        [v, w] => Ok((v, w)),
        _ => Err(Error::arity_error(2, args.len())),
    }
}

macro_rules! arithmetic {
    ($name:ident, $op_str:expr, $checked:ident) => {
        fn $name(args: &[Value], _out: &mut dyn Write) -> Result<Value, Error> {
            let (v, w) = binary(args)?;
            $checked(number($op_str, v)?, number($op_str, w)?).map(Value::Number)
        }
    };
}

arithmetic!(builtin_add, "+", checked_add);
arithmetic!(builtin_sub, "-", checked_sub);
arithmetic!(builtin_mul, "*", checked_mul);
arithmetic!(builtin_div, "/", checked_div);

macro_rules! numeric_comparison {
    ($name:ident, $op:tt, $op_str:expr) => {
        fn $name(args: &[Value], _out: &mut dyn Write) -> Result<Value, Error> {
            let (v, w) = binary(args)?;
            Ok(Value::Bool(number($op_str, v)? $op number($op_str, w)?))
        }
    };
}

numeric_comparison!(builtin_lt, <, "<");
numeric_comparison!(builtin_gt, >, ">");

fn builtin_eq(args: &[Value], _out: &mut dyn Write) -> Result<Value, Error> {
    let (v, w) = binary(args)?;
    Ok(Value::Bool(v.equal_atoms(w)))
}

fn builtin_print(args: &[Value], out: &mut dyn Write) -> Result<Value, Error> {
    let v = unary(args)?;
    write!(out, "{v}")?;
    Ok(v.clone())
}

fn builtin_println(args: &[Value], out: &mut dyn Write) -> Result<Value, Error> {
    let v = unary(args)?;
    writeln!(out, "{v}")?;
    Ok(v.clone())
}

fn builtin_printu(args: &[Value], out: &mut dyn Write) -> Result<Value, Error> {
    let v = unary(args)?;
    write_utf8(out, number("printu", v)?)?;
    Ok(v.clone())
}

fn builtin_cons(args: &[Value], _out: &mut dyn Write) -> Result<Value, Error> {
    let (car, cdr) = binary(args)?;
    Ok(Value::cons(car.clone(), cdr.clone()))
}

fn builtin_car(args: &[Value], _out: &mut dyn Write) -> Result<Value, Error> {
    match unary(args)? {
        Value::Pair(car, _) => Ok(car.as_ref().clone()),
        other => Err(Error::TypeError(format!("car applied to non-pair {other}"))),
    }
}

fn builtin_cdr(args: &[Value], _out: &mut dyn Write) -> Result<Value, Error> {
    match unary(args)? {
        Value::Pair(_, cdr) => Ok(cdr.as_ref().clone()),
        other => Err(Error::TypeError(format!("cdr applied to non-pair {other}"))),
    }
}

macro_rules! type_predicate {
    ($name:ident, $pattern:pat) => {
        fn $name(args: &[Value], _out: &mut dyn Write) -> Result<Value, Error> {
            Ok(Value::Bool(matches!(unary(args)?, $pattern)))
        }
    };
}

type_predicate!(builtin_null, Value::Nil);
type_predicate!(builtin_pair, Value::Pair(..));
type_predicate!(builtin_number, Value::Number(_));
type_predicate!(builtin_symbol, Value::Symbol(_));
type_predicate!(builtin_boolean, Value::Bool(_));
type_predicate!(builtin_function, Value::Closure { .. } | Value::Primitive(_));

fn builtin_error(args: &[Value], _out: &mut dyn Write) -> Result<Value, Error> {
    Err(Error::EvalError(unary(args)?.to_string()))
}

/// Global registry of all built-in operations
static BUILTIN_OPS: &[BuiltinOp] = &[
    // Arithmetic operations
    BuiltinOp {
        name: "+",
        arity: 2,
        func: builtin_add,
    },
    BuiltinOp {
        name: "-",
        arity: 2,
        func: builtin_sub,
    },
    BuiltinOp {
        name: "*",
        arity: 2,
        func: builtin_mul,
    },
    BuiltinOp {
        name: "/",
        arity: 2,
        func: builtin_div,
    },
    // Comparison operations
    BuiltinOp {
        name: "<",
        arity: 2,
        func: builtin_lt,
    },
    BuiltinOp {
        name: ">",
        arity: 2,
        func: builtin_gt,
    },
    BuiltinOp {
        name: "=",
        arity: 2,
        func: builtin_eq,
    },
    // Output
    BuiltinOp {
        name: "print",
        arity: 1,
        func: builtin_print,
    },
    BuiltinOp {
        name: "println",
        arity: 1,
        func: builtin_println,
    },
    BuiltinOp {
        name: "printu",
        arity: 1,
        func: builtin_printu,
    },
    // List operations
    BuiltinOp {
        name: "cons",
        arity: 2,
        func: builtin_cons,
    },
    BuiltinOp {
        name: "car",
        arity: 1,
        func: builtin_car,
    },
    BuiltinOp {
        name: "cdr",
        arity: 1,
        func: builtin_cdr,
    },
    // Type predicates
    BuiltinOp {
        name: "null?",
        arity: 1,
        func: builtin_null,
    },
    BuiltinOp {
        name: "pair?",
        arity: 1,
        func: builtin_pair,
    },
    BuiltinOp {
        name: "number?",
        arity: 1,
        func: builtin_number,
    },
    BuiltinOp {
        name: "symbol?",
        arity: 1,
        func: builtin_symbol,
    },
    BuiltinOp {
        name: "boolean?",
        arity: 1,
        func: builtin_boolean,
    },
    BuiltinOp {
        name: "function?",
        arity: 1,
        func: builtin_function,
    },
    // Error handling
    BuiltinOp {
        name: "error",
        arity: 1,
        func: builtin_error,
    },
];

/// Lazy static map from name to BuiltinOp
static BUILTIN_INDEX: LazyLock<HashMap<&'static str, &'static BuiltinOp>> =
    LazyLock::new(|| BUILTIN_OPS.iter().map(|op| (op.name, op)).collect());

/// All builtin operations, in catalog order
pub fn builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS
}

pub fn find_builtin_op(name: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_INDEX.get(name).copied()
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::value::{nil, sym, val};

    /// Micro-helper for success cases
    fn success<T: Into<Value>>(value: T) -> Option<Value> {
        Some(val(value))
    }

    fn call_builtin(name: &str, args: &[Value]) -> Result<Value, Error> {
        let op = find_builtin_op(name).unwrap();
        op.apply(args, &mut std::io::sink())
    }

    /// Macro to create test cases, invoking builtins via the registry.
    macro_rules! test {
        ($name:expr, $args:expr, $expected:expr) => {
            ($name, call_builtin($name, $args), $expected)
        };
    }

    #[test]
    fn test_builtin_ops_registry() {
        let add = find_builtin_op("+").unwrap();
        assert_eq!(add.arity, 2);
        assert!(std::ptr::eq(add, find_builtin_op("+").unwrap()));

        assert_eq!(find_builtin_op("println").unwrap().arity, 1);
        assert!(find_builtin_op("unknown").is_none());
        assert!(find_builtin_op("lambda").is_none());

        for name in ["+", "-", "*", "/", "<", ">", "=", "print", "println", "printu"] {
            assert!(find_builtin_op(name).is_some(), "missing primitive {name}");
        }
        assert_eq!(builtin_ops().len(), BUILTIN_INDEX.len());
    }

    #[test]
    fn test_builtin_function_implementations() {
        type TestCase = (&'static str, Result<Value, Error>, Option<Value>);
        let max = NumberType::MAX;
        let min = NumberType::MIN;

        let test_cases: Vec<TestCase> = vec![
            // Arithmetic
            test!("+", &[val(1), val(2)], success(3)),
            test!("+", &[val(-5), val(10)], success(5)),
            test!("+", &[val(max), val(1)], None),
            test!("+", &[val(min), val(-1)], None),
            test!("-", &[val(10), val(3)], success(7)),
            test!("-", &[val(min), val(1)], None),
            test!("-", &[val(0), val(min)], None),
            test!("*", &[val(-2), val(3)], success(-6)),
            test!("*", &[val(65536), val(65536)], None),
            test!("*", &[val(46340), val(46340)], success(2_147_395_600)),
            test!("/", &[val(7), val(2)], success(3)),
            test!("/", &[val(-7), val(2)], success(-3)),
            test!("/", &[val(7), val(0)], None),
            test!("/", &[val(min), val(-1)], None),
            // Type errors
            test!("+", &[val(1), val(true)], None),
            test!("<", &[sym("a"), val(3)], None),
            // Arity is exactly two
            test!("+", &[val(1)], None),
            test!("+", &[val(1), val(2), val(3)], None),
            // Comparison
            test!("<", &[val(2), val(9)], success(true)),
            test!("<", &[val(9), val(2)], success(false)),
            test!(">", &[val(4), val(4)], success(false)),
            test!(">", &[val(-1), val(-2)], success(true)),
            // Atom equality
            test!("=", &[val(3), val(3)], success(true)),
            test!("=", &[sym("a"), sym("a")], success(true)),
            test!("=", &[nil(), nil()], success(true)),
            test!("=", &[val(false), val(false)], success(true)),
            test!("=", &[val(1), val(true)], success(false)),
            test!("=", &[val([1]), val([1])], success(false)),
            // Lists
            test!("cons", &[val(1), nil()], success([1])),
            test!("car", &[val([1, 2])], success(1)),
            test!("cdr", &[val([1, 2])], success([2])),
            test!("car", &[nil()], None),
            test!("cdr", &[val(5)], None),
            // Predicates
            test!("null?", &[nil()], success(true)),
            test!("null?", &[val([1])], success(false)),
            test!("pair?", &[val([1])], success(true)),
            test!("number?", &[val(0)], success(true)),
            test!("symbol?", &[sym("x")], success(true)),
            test!("boolean?", &[val(0)], success(false)),
            test!(
                "function?",
                &[Value::Primitive(find_builtin_op("car").unwrap())],
                success(true)
            ),
            // error always fails
            test!("error", &[sym("oops")], None),
        ];

        for (i, (name, actual, expected)) in test_cases.into_iter().enumerate() {
            match (actual, expected) {
                (Ok(actual), Some(expected)) => {
                    assert_eq!(actual, expected, "case #{} ({name})", i + 1);
                }
                (Err(_), None) => {}
                (actual, expected) => {
                    panic!("case #{} ({name}): expected {expected:?}, got {actual:?}", i + 1)
                }
            }
        }
    }

    #[test]
    fn test_specific_errors() {
        assert_eq!(
            call_builtin("/", &[val(1), val(0)]),
            Err(Error::division_by_zero())
        );
        assert_eq!(
            call_builtin("+", &[val(NumberType::MAX), val(1)]),
            Err(Error::overflow())
        );
        assert_eq!(call_builtin("+", &[val(1)]), Err(Error::arity_error(2, 1)));
        assert_eq!(
            call_builtin("error", &[val([1, 2])]),
            Err(Error::EvalError("(1 2)".into()))
        );
        assert!(matches!(
            call_builtin("*", &[val(2), val(true)]),
            Err(Error::TypeError(_))
        ));
    }

    #[test]
    fn test_print_primitives_return_their_argument() {
        let mut out = Vec::new();
        let print = find_builtin_op("print").unwrap();
        let println = find_builtin_op("println").unwrap();
        let printu = find_builtin_op("printu").unwrap();

        assert_eq!(print.apply(&[val(42)], &mut out).unwrap(), val(42));
        assert_eq!(println.apply(&[sym("hi")], &mut out).unwrap(), sym("hi"));
        assert_eq!(printu.apply(&[val(955)], &mut out).unwrap(), val(955));
        assert_eq!(String::from_utf8(out).unwrap(), "42hi\nλ");

        assert!(printu.apply(&[val(-1)], &mut std::io::sink()).is_err());
    }
}
