//! Impcore surface syntax.
//!
//! ```scheme
//! (val x e)   (define f (x ...) e)   (define f (x ...) [locals y ...] e)
//! (use file)  (check-expect e e) (check-assert e) (check-error e)
//! (set x e) (if e e e) (while e e) (begin e ...) (f e ...)
//! ```
//!
//! Literals are integers only; Impcore has no booleans, symbols or quote.

use std::rc::Rc;

use super::ast::{Def, Exp, UserFun};
use crate::scheme::{Sexp, parse_sexp_str};
use crate::toplevel::{UnitTest, XDef};
use crate::value::Name;
use crate::{ParseError, ParseErrorKind};

fn syntax_error(form: &Sexp, message: impl Into<String>) -> ParseError {
    ParseError::new(
        ParseErrorKind::InvalidSyntax,
        message,
        None,
        Some(form.to_string()),
    )
}

fn usage_error(form: &Sexp, usage: &str) -> ParseError {
    syntax_error(form, format!("in {form}, expected {usage}"))
}

fn name(form: &Sexp, sexp: &Sexp) -> Result<Name, ParseError> {
    sexp.as_symbol()
        .cloned()
        .ok_or_else(|| syntax_error(form, format!("in {form}, expected a name but found {sexp}")))
}

fn names(form: &Sexp, sexp: &[Sexp]) -> Result<Vec<Name>, ParseError> {
    sexp.iter().map(|item| name(form, item)).collect()
}

/// `(locals y ...)`, written with either kind of bracket
fn locals_clause(sexp: &Sexp) -> Option<&[Sexp]> {
    match sexp {
        Sexp::List(items) => match items.split_first() {
            Some((Sexp::Symbol(keyword), locals)) if &**keyword == "locals" => Some(locals),
            _ => None,
        },
        _ => None,
    }
}

fn parse_define(form: &Sexp, items: &[Sexp]) -> Result<Def, ParseError> {
    const USAGE: &str = "(define f (x ...) [locals y ...] e)";
    let (f, formals, locals, body) = match items {
        [_, f, Sexp::List(formals), body] => (f, formals, &[][..], body),
        [_, f, Sexp::List(formals), clause, body] => match locals_clause(clause) {
            Some(locals) => (f, formals, locals, body),
            None => return Err(usage_error(form, USAGE)),
        },
        _ => return Err(usage_error(form, USAGE)),
    };
    let fun = UserFun {
        formals: names(form, formals)?,
        locals: names(form, locals)?,
        body: parse_exp(body)?,
    };
    Ok(Def::Define(name(form, f)?, Rc::new(fun)))
}

/// Parse a top-level form
pub fn parse_form(sexp: &Sexp) -> Result<XDef<Def, Exp>, ParseError> {
    let Sexp::List(items) = sexp else {
        return Ok(XDef::Def(Def::Exp(parse_exp(sexp)?)));
    };

    match (items.first().and_then(Sexp::as_symbol).map(|s| &**s), &items[..]) {
        (Some("val"), [_, x, e]) => Ok(XDef::Def(Def::Val(name(sexp, x)?, parse_exp(e)?))),
        (Some("val"), _) => Err(usage_error(sexp, "(val x e)")),
        (Some("define"), _) => Ok(XDef::Def(parse_define(sexp, items)?)),
        (Some("use"), [_, file]) => Ok(XDef::Use(name(sexp, file)?.to_string())),
        (Some("use"), _) => Err(usage_error(sexp, "(use filename)")),
        (Some("check-expect"), [_, e, expected]) => Ok(XDef::Test(UnitTest::CheckExpect(
            parse_exp(e)?,
            parse_exp(expected)?,
        ))),
        (Some("check-expect"), _) => Err(usage_error(sexp, "(check-expect e e)")),
        (Some("check-assert"), [_, e]) => Ok(XDef::Test(UnitTest::CheckAssert(parse_exp(e)?))),
        (Some("check-assert"), _) => Err(usage_error(sexp, "(check-assert e)")),
        (Some("check-error"), [_, e]) => Ok(XDef::Test(UnitTest::CheckError(parse_exp(e)?))),
        (Some("check-error"), _) => Err(usage_error(sexp, "(check-error e)")),
        _ => Ok(XDef::Def(Def::Exp(parse_exp(sexp)?))),
    }
}

/// Parse an expression
pub fn parse_exp(sexp: &Sexp) -> Result<Exp, ParseError> {
    let items = match sexp {
        Sexp::Number(n) => return Ok(Exp::Literal(*n)),
        Sexp::Symbol(s) => return Ok(Exp::Var(Rc::clone(s))),
        Sexp::Bool(_) => {
            return Err(syntax_error(
                sexp,
                format!("{sexp} is not an Impcore expression; use 1 and 0 for truth values"),
            ));
        }
        Sexp::List(items) => items,
    };
    let exp = |e: &Sexp| parse_exp(e).map(Box::new);

    let Some((head, rest)) = items.split_first() else {
        return Err(syntax_error(sexp, "empty list () is not an expression"));
    };
    let Some(keyword) = head.as_symbol() else {
        return Err(syntax_error(
            sexp,
            format!("in {sexp}, expected a function name but found {head}"),
        ));
    };

    match (&**keyword, rest) {
        ("set", [x, e]) => Ok(Exp::Set(name(sexp, x)?, exp(e)?)),
        ("set", _) => Err(usage_error(sexp, "(set x e)")),
        ("if", [c, t, e]) => Ok(Exp::If(exp(c)?, exp(t)?, exp(e)?)),
        ("if", _) => Err(usage_error(sexp, "(if e e e)")),
        ("while", [c, body]) => Ok(Exp::While(exp(c)?, exp(body)?)),
        ("while", _) => Err(usage_error(sexp, "(while e e)")),
        ("begin", es) => Ok(Exp::Begin(es.iter().map(parse_exp).collect::<Result<_, _>>()?)),
        ("quote" | "lambda" | "let" | "let*" | "letrec", _) => Err(syntax_error(
            sexp,
            format!("{keyword} is not part of Impcore"),
        )),
        (_, args) => Ok(Exp::Apply(
            Rc::clone(keyword),
            args.iter().map(parse_exp).collect::<Result<_, _>>()?,
        )),
    }
}

/// Read and parse a single Impcore form from a string
pub fn parse_impcore(input: &str) -> Result<XDef<Def, Exp>, ParseError> {
    parse_form(&parse_sexp_str(input)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Exp {
        Exp::Var(Rc::from(name))
    }

    fn names(xs: &[&str]) -> Vec<Name> {
        xs.iter().map(|x| Rc::from(*x)).collect()
    }

    fn exp(e: Exp) -> Option<XDef<Def, Exp>> {
        Some(XDef::Def(Def::Exp(e)))
    }

    #[test]
    fn test_parse_forms_data_driven() {
        let add = Exp::Apply(Rc::from("+"), vec![var("x"), var("y")]);
        let test_cases: Vec<(&str, Option<XDef<Def, Exp>>)> = vec![
            ("7", exp(Exp::Literal(7))),
            ("n", exp(var("n"))),
            ("(+ x y)", exp(add.clone())),
            ("(f)", exp(Exp::Apply(Rc::from("f"), vec![]))),
            ("(set n 1)", exp(Exp::Set(Rc::from("n"), Box::new(Exp::Literal(1))))),
            ("(begin)", exp(Exp::Begin(vec![]))),
            (
                "(while n (set n 0))",
                exp(Exp::While(
                    Box::new(var("n")),
                    Box::new(Exp::Set(Rc::from("n"), Box::new(Exp::Literal(0)))),
                )),
            ),
            ("(val x 3)", Some(XDef::Def(Def::Val(Rc::from("x"), Exp::Literal(3))))),
            (
                "(define add (x y) (+ x y))",
                Some(XDef::Def(Def::Define(
                    Rc::from("add"),
                    Rc::new(UserFun {
                        formals: names(&["x", "y"]),
                        locals: vec![],
                        body: add.clone(),
                    }),
                ))),
            ),
            (
                "(define add (x) [locals y] (+ x y))",
                Some(XDef::Def(Def::Define(
                    Rc::from("add"),
                    Rc::new(UserFun {
                        formals: names(&["x"]),
                        locals: names(&["y"]),
                        body: add.clone(),
                    }),
                ))),
            ),
            // a definition may repeat a formal; the evaluator rejects it
            (
                "(define f (a a) a)",
                Some(XDef::Def(Def::Define(
                    Rc::from("f"),
                    Rc::new(UserFun {
                        formals: names(&["a", "a"]),
                        locals: vec![],
                        body: var("a"),
                    }),
                ))),
            ),
            ("(use lib.imp)", Some(XDef::Use("lib.imp".into()))),
            (
                "(check-error (/ 1 0))",
                Some(XDef::Test(UnitTest::CheckError(Exp::Apply(
                    Rc::from("/"),
                    vec![Exp::Literal(1), Exp::Literal(0)],
                )))),
            ),
            // Malformed
            ("#t", None),
            ("()", None),
            ("((f) 1)", None),
            ("(if 1 2)", None),
            ("(set 1 2)", None),
            ("'x", None),
            ("(lambda (x) x)", None),
            ("(define f x 1)", None),
            ("(define f (x) (vars y) x)", None),
            ("(val x)", None),
        ];

        for (i, (input, expected)) in test_cases.into_iter().enumerate() {
            let actual = parse_impcore(input).ok();
            assert_eq!(actual, expected, "case #{} ({input})", i + 1);
        }
    }
}
