//! Rewriting of derived expressions (`cond`, `let`) into primitive forms.
//!
//! ```scheme
//! (cond (a 1) (b 2 3) (else 4))  ; => (if a 1 (if b (begin 2 3) 4))
//! (let ((x 1) (y 2)) (+ x y))     ; => ((lambda (x y) (+ x y)) 1 2)
//! ```

use crate::ast::{Value, sym};
use crate::{Error, ParseError, ParseErrorKind};

fn malformed(what: &str, form: &Value) -> Error {
    Error::UnknownForm(format!("malformed {what}: {form}"))
}

/// A body of one expression is used as-is, longer bodies are wrapped in `begin`
fn sequence(body: Vec<Value>) -> Value {
    match <[Value; 1]>::try_from(body) {
        Ok([single]) => single,
        Err(body) => Value::cons(sym("begin"), Value::list(body)),
    }
}

/// Rewrite the clauses of a `cond` into nested `if` expressions. Running out of
/// clauses yields `#f`.
pub(crate) fn cond_to_if(clauses: &[Value]) -> Result<Value, Error> {
    let mut parsed = Vec::with_capacity(clauses.len());
    for (i, clause) in clauses.iter().enumerate() {
        let mut parts = clause
            .to_vec()
            .filter(|parts| parts.len() >= 2)
            .ok_or_else(|| malformed("cond clause", clause))?;
        let body = parts.split_off(1);
        let test = parts.swap_remove(0);
        let is_else = test.as_symbol() == Some("else");
        if is_else && i + 1 != clauses.len() {
            return Err(ParseError::from_message(
                ParseErrorKind::MisplacedElse,
                "ELSE clause is not last",
            )
            .into());
        }
        parsed.push((is_else, test, body));
    }

    Ok(parsed
        .into_iter()
        .rev()
        .fold(Value::Boolean(false), |rest, (is_else, test, body)| {
            if is_else {
                sequence(body)
            } else {
                Value::list([sym("if"), test, sequence(body), rest])
            }
        }))
}

/// Rewrite `(let ((v e) ...) body ...)` into an immediately applied `lambda`.
/// `args` is everything after the `let` keyword.
pub(crate) fn let_to_application(args: &[Value]) -> Result<Value, Error> {
    let [bindings, body @ ..] = args else {
        return Err(Error::UnknownForm("malformed let: missing bindings".to_owned()));
    };
    if body.is_empty() {
        return Err(malformed("let", &Value::list(args.to_vec())));
    }

    let bindings = bindings
        .to_vec()
        .ok_or_else(|| malformed("let bindings", bindings))?;
    let mut names = Vec::with_capacity(bindings.len());
    let mut inits = Vec::with_capacity(bindings.len());
    for binding in &bindings {
        match binding.to_vec().as_deref() {
            Some([name @ Value::Symbol(_), init]) => {
                names.push(name.clone());
                inits.push(init.clone());
            }
            _ => return Err(malformed("let binding", binding)),
        }
    }

    let lambda = Value::list_with_tail(
        [sym("lambda"), Value::list(names)],
        Value::list(body.to_vec()),
    );
    Ok(Value::cons(lambda, Value::list(inits)))
}
