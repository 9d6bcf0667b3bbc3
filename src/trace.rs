//! Evaluation observers.
//!
//! A [`Tracer`] installed on an [`Evaluator`](crate::evaluator::Evaluator) is told
//! about every expression before it is evaluated and every procedure before it is
//! applied, together with the current nesting depth.

use crate::ast::Value;
use std::cell::RefCell;
use std::io::{self, Write};

/// Receives evaluation events. Both hooks default to doing nothing.
pub trait Tracer {
    fn on_eval(&self, _expr: &Value, _depth: usize) {}

    fn on_apply(&self, _procedure: &Value, _args: &[Value], _depth: usize) {}
}

/// Writes one indented line per event to an `io::Write`.
///
/// The first write error is kept and later events are dropped; evaluation
/// itself carries on. Check [`WriterTracer::take_error`] after a run.
pub struct WriterTracer<W: Write> {
    out: RefCell<W>,
    error: RefCell<Option<io::Error>>,
}

impl<W: Write> WriterTracer<W> {
    pub fn new(out: W) -> Self {
        WriterTracer {
            out: RefCell::new(out),
            error: RefCell::new(None),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    /// The write error that stopped tracing, if any; tracing resumes afterwards
    pub fn take_error(&self) -> Option<io::Error> {
        self.error.borrow_mut().take()
    }

    fn line(&self, depth: usize, text: std::fmt::Arguments<'_>) {
        let mut error = self.error.borrow_mut();
        if error.is_some() {
            return;
        }
        if let Err(e) = writeln!(self.out.borrow_mut(), "{:indent$}{text}", "", indent = depth * 2) {
            *error = Some(e);
        }
    }
}

impl<W: Write> Tracer for WriterTracer<W> {
    fn on_eval(&self, expr: &Value, depth: usize) {
        self.line(depth, format_args!("eval {expr}"));
    }

    fn on_apply(&self, procedure: &Value, args: &[Value], depth: usize) {
        let args: Vec<String> = args.iter().map(ToString::to_string).collect();
        self.line(depth, format_args!("apply {procedure} [{}]", args.join(", ")));
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{sym, val};

    #[test]
    fn test_writer_tracer_lines() {
        let tracer = WriterTracer::new(Vec::new());
        tracer.on_eval(&val([1, 2]), 0);
        tracer.on_eval(&sym("x"), 1);
        tracer.on_apply(&sym("f"), &[val(1), val("a")], 2);

        let text = String::from_utf8(tracer.into_inner()).unwrap();
        assert_eq!(text, "eval (1 2)\n  eval x\n    apply f [1, a]\n");
    }

    #[test]
    fn test_write_error_is_kept() {
        struct Full(usize);
        impl Write for Full {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                if buf.len() > self.0 {
                    return Err(io::Error::new(io::ErrorKind::WriteZero, "sink full"));
                }
                self.0 -= buf.len();
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        // Room for exactly one line: "eval 1\n"
        let tracer = WriterTracer::new(Full(7));
        tracer.on_eval(&val(1), 0);
        assert!(tracer.take_error().is_none());

        tracer.on_eval(&val(2), 0);
        tracer.on_eval(&val(3), 0);
        let err = tracer.take_error().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
        assert!(tracer.take_error().is_none());
    }

    #[test]
    fn test_default_hooks_do_nothing() {
        struct Silent;
        impl Tracer for Silent {}

        Silent.on_eval(&val(1), 0);
        Silent.on_apply(&sym("f"), &[], 0);
    }
}
