//! Embedding surface: a persistent global environment, the builtin library, and
//! an output sink for `write`.
//!
//! ```
//! use ez_scheme::{Interpreter, SharedBuffer, Value};
//!
//! let out = SharedBuffer::new();
//! let interp = Interpreter::with_output(out.clone());
//! interp.interpret_code("(define (sq x) (* x x)) (write (sq 7))").unwrap();
//! assert_eq!(out.contents(), "49\n");
//! assert_eq!(interp.run("(sq 3)").unwrap(), Value::Number(9));
//! ```

use crate::Error;
use crate::ast::Value;
use crate::builtinops::{Arity, BuiltinOp, BuiltinRegistry};
use crate::evaluator::{EvalConfig, Environment, Evaluator};
use crate::scheme::parse_scheme;
use crate::trace::Tracer;
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

type Sink = Rc<RefCell<dyn Write>>;

/// A clonable in-memory output sink; every clone appends to the same buffer
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded as UTF-8
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// The `write` procedure: the textual representation and a newline
fn write_builtin(sink: Sink) -> BuiltinOp {
    let func = move |args: Vec<Value>| -> Result<Value, String> {
        let mut out = sink.borrow_mut();
        for arg in &args {
            writeln!(out, "{arg}").map_err(|e| format!("output error: {e}"))?;
        }
        out.flush().map_err(|e| format!("output error: {e}"))?;
        Ok(Value::Nil)
    };
    BuiltinOp::new("write", Arity::Exact(1), Rc::new(func))
}

/// A Scheme interpreter with a persistent global environment
pub struct Interpreter {
    global: Environment,
    evaluator: Evaluator,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// An interpreter writing to standard output
    pub fn new() -> Self {
        Self::with_output(io::stdout())
    }

    /// An interpreter writing to `sink`
    pub fn with_output(sink: impl Write + 'static) -> Self {
        Self::with_config(EvalConfig::default(), &BuiltinRegistry::standard(), sink)
    }

    /// An interpreter with explicit evaluation policies and builtin library
    pub fn with_config(
        config: EvalConfig,
        registry: &BuiltinRegistry,
        sink: impl Write + 'static,
    ) -> Self {
        let global = Environment::new();
        registry.install(&global);
        let sink: Sink = Rc::new(RefCell::new(sink));
        global.define("write", write_builtin(sink).to_value());

        Interpreter {
            global,
            evaluator: Evaluator::new(config),
        }
    }

    /// Evaluate one parsed expression in the global environment
    pub fn interpret(&self, expr: &Value) -> Result<Value, Error> {
        self.evaluator.eval(expr, &self.global)
    }

    /// Parse a whole program and evaluate its top-level expressions in order,
    /// discarding their values. Nothing is evaluated if the program fails to parse.
    pub fn interpret_code(&self, source: &str) -> Result<(), Error> {
        self.run(source).map(|_| ())
    }

    /// Like [`Interpreter::interpret_code`], returning the value of the last
    /// expression (`()` for an empty program)
    pub fn run(&self, source: &str) -> Result<Value, Error> {
        let program = parse_scheme(source)?;
        let mut result = Value::Nil;
        for expr in &program {
            result = self.interpret(expr)?;
        }
        Ok(result)
    }

    /// Bind a global name
    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.global.define(name, value);
    }

    pub fn global_env(&self) -> &Environment {
        &self.global
    }

    pub fn set_tracer(&mut self, tracer: Rc<dyn Tracer>) {
        self.evaluator.set_tracer(tracer);
    }

    pub fn clear_tracer(&mut self) {
        self.evaluator.clear_tracer();
    }
}

/// Run a program in a fresh interpreter writing to `sink`
pub fn interpret_code(source: &str, sink: impl Write + 'static) -> Result<(), Error> {
    Interpreter::with_output(sink).interpret_code(source)
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::val;
    use crate::evaluator::ExtraArgumentPolicy;
    use crate::trace::WriterTracer;

    fn interpreter() -> (Interpreter, SharedBuffer) {
        let out = SharedBuffer::new();
        (Interpreter::with_output(out.clone()), out)
    }

    #[test]
    fn test_write_output() {
        let (interp, out) = interpreter();
        interp
            .interpret_code("(write 1) (write \"two words\") (write '(a (b . c))) (write #f)")
            .unwrap();
        assert_eq!(out.contents(), "1\ntwo words\n(a (b . c))\n#f\n");

        out.clear();
        interp.interpret_code("(write (lambda (x) x)) (write car)").unwrap();
        assert_eq!(out.contents(), "#<procedure>\n#<builtin car>\n");

        assert!(matches!(
            interp.run("(write 1 2)"),
            Err(Error::BuiltinError { ref name, .. }) if name == "write"
        ));
    }

    #[test]
    fn test_run_returns_last_value() {
        let (interp, _) = interpreter();
        assert_eq!(interp.run("").unwrap(), Value::Nil);
        assert_eq!(interp.run("; nothing\n").unwrap(), Value::Nil);
        assert_eq!(interp.run("1 2 3").unwrap(), val(3));
        assert_eq!(interp.run("(define x 5)").unwrap(), Value::Nil);
        // The global environment persists between calls
        assert_eq!(interp.run("(* x 2)").unwrap(), val(10));
    }

    #[test]
    fn test_parse_error_evaluates_nothing() {
        let (interp, out) = interpreter();
        let err = interp.interpret_code("(write 1) (write 2").unwrap_err();
        assert!(err.is_syntax_error());
        assert_eq!(out.contents(), "");

        let err = interp.interpret_code("(write 1) #q").unwrap_err();
        assert_eq!(err, Error::LexError { offset: 10 });
        assert_eq!(out.contents(), "");
    }

    #[test]
    fn test_eval_error_stops_remaining_expressions() {
        let (interp, out) = interpreter();
        let err = interp
            .interpret_code("(write 1) (car '()) (write 2)")
            .unwrap_err();
        assert!(matches!(err, Error::BuiltinError { .. }));
        assert_eq!(out.contents(), "1\n");
    }

    #[test]
    fn test_embedding_extensions() {
        fn square(n: i64) -> i64 {
            n * n
        }

        let mut registry = BuiltinRegistry::standard();
        registry.register_builtin_operation::<_, (i64,)>("square", square);
        let out = SharedBuffer::new();
        let config = EvalConfig {
            extra_arguments: ExtraArgumentPolicy::Reject,
            ..EvalConfig::default()
        };
        let interp = Interpreter::with_config(config, &registry, out.clone());

        interp.define("answer", val(42));
        assert_eq!(interp.run("(square answer)").unwrap(), val(1764));
        assert!(matches!(
            interp.run("((lambda () 1) 2)"),
            Err(Error::ArityError { .. })
        ));
        assert!(interp.global_env().get("square").is_some());
        assert!(interp.global_env().get("write").is_some());
    }

    #[test]
    fn test_tracer_toggle() {
        let (mut interp, _) = interpreter();
        let trace = SharedBuffer::new();
        interp.set_tracer(Rc::new(WriterTracer::new(trace.clone())));
        interp.run("(+ 1 2)").unwrap();
        assert_eq!(
            trace.contents(),
            "eval (+ 1 2)\n  eval +\n  eval 1\n  eval 2\n  apply #<builtin +> [1, 2]\n"
        );

        trace.clear();
        interp.clear_tracer();
        interp.run("(+ 1 2)").unwrap();
        assert_eq!(trace.contents(), "");
    }

    #[test]
    fn test_free_interpret_code() {
        let out = SharedBuffer::new();
        interpret_code("(define (f x) (+ x 1)) (write (f 41))", out.clone()).unwrap();
        assert_eq!(out.contents(), "42\n");
        assert!(interpret_code("(", out).is_err());
    }
}
