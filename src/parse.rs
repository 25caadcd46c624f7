//! uScheme surface syntax: turns S-expressions into definitions and expressions.
//!
//! ```scheme
//! (val x e)                       (define f (x ...) e)
//! (use file)                      (check-expect e e) (check-assert e) (check-error e)
//! (set x e) (if e e e) (while e e) (begin e ...)
//! (lambda (x ...) e) (let ((x e) ...) e) (let* ...) (letrec ...)
//! (quote datum) 'datum (e e ...)
//! ```
//!
//! Duplicate formals in a `lambda` and duplicate names in a `let` or `letrec`
//! are rejected here. Duplicate formals in a `define` are left to the
//! definition processor.

use std::rc::Rc;

use crate::ast::{Def, Exp, Lambda, LetKind, first_duplicate};
use crate::scheme::{Sexp, parse_sexp_str};
use crate::toplevel::{UnitTest, XDef};
use crate::value::{Name, Value};
use crate::{ParseError, ParseErrorKind};

fn syntax_error(form: &Sexp, message: impl Into<String>) -> ParseError {
    ParseError::new(
        ParseErrorKind::InvalidSyntax,
        message,
        None,
        Some(form.to_string()),
    )
}

/// The operands after the keyword, which must number exactly `N`
fn operands<'a, const N: usize>(
    form: &Sexp,
    items: &'a [Sexp],
    usage: &str,
) -> Result<&'a [Sexp; N], ParseError> {
    items
        .get(1..)
        .and_then(|rest| rest.try_into().ok())
        .ok_or_else(|| syntax_error(form, format!("in {form}, expected {usage}")))
}

fn name(form: &Sexp, sexp: &Sexp) -> Result<Name, ParseError> {
    sexp.as_symbol()
        .cloned()
        .ok_or_else(|| syntax_error(form, format!("in {form}, expected a name but found {sexp}")))
}

fn names(form: &Sexp, sexp: &Sexp) -> Result<Vec<Name>, ParseError> {
    match sexp {
        Sexp::List(items) => items.iter().map(|item| name(form, item)).collect(),
        other => Err(syntax_error(
            form,
            format!("in {form}, expected a list of names but found {other}"),
        )),
    }
}

/// Convert a quoted datum to the value it denotes
pub fn sexp_to_value(sexp: &Sexp) -> Result<Value, ParseError> {
    match sexp {
        Sexp::Number(n) => Ok(Value::Number(*n)),
        Sexp::Bool(b) => Ok(Value::Bool(*b)),
        Sexp::Symbol(s) if &**s == "." => Err(syntax_error(
            sexp,
            "this interpreter cannot handle . in quoted S-expressions",
        )),
        Sexp::Symbol(s) => Ok(Value::Symbol(Rc::clone(s))),
        Sexp::List(items) => Ok(Value::list(
            items
                .iter()
                .map(sexp_to_value)
                .collect::<Result<Vec<_>, _>>()?,
        )),
    }
}

/// Parse a top-level form
pub fn parse_form(sexp: &Sexp) -> Result<XDef<Def, Exp>, ParseError> {
    let Sexp::List(items) = sexp else {
        return Ok(XDef::Def(Def::Exp(parse_exp(sexp)?)));
    };
    let keyword = items.first().and_then(Sexp::as_symbol).map(|s| &**s);

    match keyword {
        Some("val") => {
            let [x, e] = operands::<2>(sexp, items, "(val x e)")?;
            Ok(XDef::Def(Def::Val(name(sexp, x)?, parse_exp(e)?)))
        }
        Some("define") => {
            let [f, formals, body] = operands::<3>(sexp, items, "(define f (x ...) e)")?;
            let lambda = Lambda {
                formals: names(sexp, formals)?,
                body: parse_exp(body)?,
            };
            Ok(XDef::Def(Def::Define(name(sexp, f)?, Rc::new(lambda))))
        }
        Some("use") => {
            let [file] = operands::<1>(sexp, items, "(use filename)")?;
            Ok(XDef::Use(name(sexp, file)?.to_string()))
        }
        Some("check-expect") => {
            let [e, expected] = operands::<2>(sexp, items, "(check-expect e e)")?;
            Ok(XDef::Test(UnitTest::CheckExpect(
                parse_exp(e)?,
                parse_exp(expected)?,
            )))
        }
        Some("check-assert") => {
            let [e] = operands::<1>(sexp, items, "(check-assert e)")?;
            Ok(XDef::Test(UnitTest::CheckAssert(parse_exp(e)?)))
        }
        Some("check-error") => {
            let [e] = operands::<1>(sexp, items, "(check-error e)")?;
            Ok(XDef::Test(UnitTest::CheckError(parse_exp(e)?)))
        }
        _ => Ok(XDef::Def(Def::Exp(parse_exp(sexp)?))),
    }
}

/// Parse an expression
pub fn parse_exp(sexp: &Sexp) -> Result<Exp, ParseError> {
    let items = match sexp {
        Sexp::Number(n) => return Ok(Exp::Literal(Value::Number(*n))),
        Sexp::Bool(b) => return Ok(Exp::Literal(Value::Bool(*b))),
        Sexp::Symbol(s) => return Ok(Exp::Var(Rc::clone(s))),
        Sexp::List(items) => items,
    };
    let Some(head) = items.first() else {
        return Err(syntax_error(sexp, "empty list () is not an expression"));
    };
    let exp = |e: &Sexp| parse_exp(e).map(Box::new);

    match head.as_symbol().map(|s| &**s) {
        Some("quote") => {
            let [datum] = operands::<1>(sexp, items, "(quote datum)")?;
            Ok(Exp::Literal(sexp_to_value(datum)?))
        }
        Some("set") => {
            let [x, e] = operands::<2>(sexp, items, "(set x e)")?;
            Ok(Exp::Set(name(sexp, x)?, exp(e)?))
        }
        Some("if") => {
            let [c, t, e] = operands::<3>(sexp, items, "(if e e e)")?;
            Ok(Exp::If(exp(c)?, exp(t)?, exp(e)?))
        }
        Some("while") => {
            let [c, body] = operands::<2>(sexp, items, "(while e e)")?;
            Ok(Exp::While(exp(c)?, exp(body)?))
        }
        Some("begin") => Ok(Exp::Begin(
            items[1..].iter().map(parse_exp).collect::<Result<_, _>>()?,
        )),
        Some("lambda") => {
            let [formals, body] = operands::<2>(sexp, items, "(lambda (x ...) e)")?;
            let formals = names(sexp, formals)?;
            if let Some(dup) = first_duplicate(&formals) {
                return Err(syntax_error(
                    sexp,
                    format!("formal parameter {dup} appears twice in lambda"),
                ));
            }
            Ok(Exp::Lambda(Rc::new(Lambda {
                formals,
                body: parse_exp(body)?,
            })))
        }
        Some(keyword @ ("let" | "let*" | "letrec")) => {
            let kind = match keyword {
                "let" => LetKind::Let,
                "let*" => LetKind::LetStar,
                _ => LetKind::LetRec,
            };
            let usage = format!("({keyword} ((x e) ...) e)");
            let [bindings, body] = operands::<2>(sexp, items, &usage)?;
            let bindings = parse_bindings(sexp, bindings, &usage)?;
            if kind != LetKind::LetStar {
                let bound: Vec<Name> = bindings.iter().map(|(x, _)| Rc::clone(x)).collect();
                if let Some(dup) = first_duplicate(&bound) {
                    return Err(syntax_error(
                        sexp,
                        format!("bound name {dup} appears twice in {keyword}"),
                    ));
                }
            }
            Ok(Exp::Let(kind, bindings, exp(body)?))
        }
        _ => Ok(Exp::Apply(
            exp(head)?,
            items[1..].iter().map(parse_exp).collect::<Result<_, _>>()?,
        )),
    }
}

fn parse_bindings(form: &Sexp, sexp: &Sexp, usage: &str) -> Result<Vec<(Name, Exp)>, ParseError> {
    let Sexp::List(bindings) = sexp else {
        return Err(syntax_error(form, format!("in {form}, expected {usage}")));
    };
    bindings
        .iter()
        .map(|binding| match binding {
            Sexp::List(pair) if pair.len() == 2 => {
                Ok((name(form, &pair[0])?, parse_exp(&pair[1])?))
            }
            other => Err(syntax_error(
                form,
                format!("in {form}, expected (... (x e) ...) in bindings, but found {other}"),
            )),
        })
        .collect()
}

/// Read and parse a single uScheme form from a string
pub fn parse_scheme(input: &str) -> Result<XDef<Def, Exp>, ParseError> {
    parse_form(&parse_sexp_str(input)?)
}
