use crate::ast::{Closure, Value};
use crate::builtinops::BuiltinRegistry;
use crate::trace::Tracer;
use crate::{Error, MAX_EVAL_DEPTH};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

mod derived;
pub mod intooperation;

/// Remaining host stack below which evaluation moves to a fresh segment
const STACK_RED_ZONE: usize = 128 * 1024;
/// Size of each additional stack segment
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

struct Frame {
    bindings: HashMap<String, Value>,
    parent: Option<Environment>,
}

/// Environment for variable bindings: a shared, mutable frame plus the chain of
/// enclosing frames. Cloning yields another handle to the same frame.
#[derive(Clone)]
pub struct Environment(Rc<RefCell<Frame>>);

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Bindings may hold closures over this very frame, so only names are shown
        let frame = self.0.borrow();
        let mut names: Vec<&String> = frame.bindings.keys().collect();
        names.sort();
        f.debug_struct("Environment")
            .field("bindings", &names)
            .field("has_parent", &frame.parent.is_some())
            .finish()
    }
}

/// Environments are equal only when they are the same frame
impl PartialEq for Environment {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Environment {
    /// A frame with no parent
    pub fn new() -> Self {
        Environment(Rc::new(RefCell::new(Frame {
            bindings: HashMap::new(),
            parent: None,
        })))
    }

    /// An empty frame enclosed by `parent`
    pub fn with_parent(parent: &Environment) -> Self {
        Environment(Rc::new(RefCell::new(Frame {
            bindings: HashMap::new(),
            parent: Some(parent.clone()),
        })))
    }

    /// Bind `name` in this frame, replacing any existing binding here
    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.0.borrow_mut().bindings.insert(name.into(), value);
    }

    /// The value bound to `name` in the nearest enclosing frame
    pub fn get(&self, name: &str) -> Option<Value> {
        let mut current = self.clone();
        loop {
            let parent = {
                let frame = current.0.borrow();
                if let Some(value) = frame.bindings.get(name) {
                    return Some(value.clone());
                }
                frame.parent.clone()
            };
            current = parent?;
        }
    }

    /// Like [`Environment::get`], with `()` for unbound names
    pub fn lookup(&self, name: &str) -> Value {
        self.get(name).unwrap_or(Value::Nil)
    }

    /// Overwrite the binding of `name` in the nearest frame that has one
    pub fn set(&self, name: &str, value: Value) -> Result<(), Error> {
        let mut current = self.clone();
        loop {
            let parent = {
                let mut frame = current.0.borrow_mut();
                if let Some(slot) = frame.bindings.get_mut(name) {
                    *slot = value;
                    return Ok(());
                }
                frame.parent.clone()
            };
            match parent {
                Some(parent) => current = parent,
                None => return Err(Error::UnboundVariable(name.to_owned())),
            }
        }
    }

    /// Get all bindings in this environment and its parents
    /// Returns a Vec of (name, value) pairs sorted by name
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut chain = vec![self.clone()];
        while let Some(parent) = chain.last().and_then(|env| env.0.borrow().parent.clone()) {
            chain.push(parent);
        }

        // Outermost first, so inner frames override
        let mut bindings = HashMap::new();
        for env in chain.iter().rev() {
            for (name, value) in &env.0.borrow().bindings {
                bindings.insert(name.clone(), value.clone());
            }
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

/// What reading an unbound variable does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnboundVariablePolicy {
    /// The read yields `()`
    #[default]
    ReturnNil,
    /// The read fails with [`Error::UnboundVariable`]
    Error,
}

/// What applying a closure to more arguments than it has parameters does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtraArgumentPolicy {
    /// The surplus arguments are evaluated and dropped
    #[default]
    Ignore,
    /// The call fails with [`Error::ArityError`]
    Reject,
}

/// Configuration for evaluation behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalConfig {
    pub unbound_variable: UnboundVariablePolicy,
    pub extra_arguments: ExtraArgumentPolicy,
    /// Maximum nesting of `eval`/`apply`; `None` disables the check
    pub max_depth: Option<usize>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            unbound_variable: UnboundVariablePolicy::default(),
            extra_arguments: ExtraArgumentPolicy::default(),
            max_depth: Some(MAX_EVAL_DEPTH),
        }
    }
}

/// Evaluates expressions against environments under an [`EvalConfig`]
#[derive(Default, Clone)]
pub struct Evaluator {
    config: EvalConfig,
    tracer: Option<Rc<dyn Tracer>>,
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("config", &self.config)
            .field("tracing", &self.tracer.is_some())
            .finish()
    }
}

/// True for `(lambda ...)`, so `define` can name the closure it creates
fn is_lambda_form(expr: &Value) -> bool {
    match expr {
        Value::Pair(pair) => pair.car().as_symbol() == Some("lambda"),
        _ => false,
    }
}

fn malformed(keyword: &str, expr: &Value) -> Error {
    Error::UnknownForm(format!("malformed {keyword}: {expr}"))
}

impl Evaluator {
    pub fn new(config: EvalConfig) -> Self {
        Evaluator {
            config,
            tracer: None,
        }
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    pub fn set_tracer(&mut self, tracer: Rc<dyn Tracer>) {
        self.tracer = Some(tracer);
    }

    pub fn clear_tracer(&mut self) {
        self.tracer = None;
    }

    /// Evaluate an S-expression
    pub fn eval(&self, expr: &Value, env: &Environment) -> Result<Value, Error> {
        self.eval_with_depth_tracking(expr, env, 0)
    }

    /// Apply a procedure to already-evaluated arguments
    pub fn apply(&self, procedure: &Value, args: Vec<Value>) -> Result<Value, Error> {
        self.apply_with_depth_tracking(procedure, args, 0)
    }

    fn check_depth(&self, depth: usize) -> Result<(), Error> {
        match self.config.max_depth {
            Some(limit) if depth >= limit => Err(Error::DepthExceeded(limit)),
            _ => Ok(()),
        }
    }

    /// Evaluate an S-expression with depth tracking, growing the host stack on
    /// demand so that only `max_depth` bounds recursion
    fn eval_with_depth_tracking(
        &self,
        expr: &Value,
        env: &Environment,
        depth: usize,
    ) -> Result<Value, Error> {
        self.check_depth(depth)?;
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
            self.eval_inner(expr, env, depth)
        })
    }

    fn eval_inner(&self, expr: &Value, env: &Environment, depth: usize) -> Result<Value, Error> {
        if let Some(tracer) = &self.tracer {
            tracer.on_eval(expr, depth);
        }

        match expr {
            // Self-evaluating forms (the empty list is NOT self-evaluating)
            Value::Number(_)
            | Value::Boolean(_)
            | Value::String(_)
            | Value::Closure(_)
            | Value::Builtin { .. } => Ok(expr.clone()),

            Value::Symbol(name) => match env.get(name) {
                Some(value) => Ok(value),
                None => match self.config.unbound_variable {
                    UnboundVariablePolicy::ReturnNil => Ok(Value::Nil),
                    UnboundVariablePolicy::Error => Err(Error::UnboundVariable(name.clone())),
                },
            },

            Value::Nil => Err(Error::UnknownForm("cannot evaluate ()".to_owned())),

            Value::Pair(_) => {
                let Some(elements) = expr.to_vec() else {
                    return Err(Error::UnknownForm(format!("improper list {expr}")));
                };
                self.eval_list(expr, &elements, env, depth)
            }
        }
    }

    /// Evaluate a proper list: a special form or a procedure application
    fn eval_list(
        &self,
        expr: &Value,
        elements: &[Value],
        env: &Environment,
        depth: usize,
    ) -> Result<Value, Error> {
        let keyword = elements.first().and_then(Value::as_symbol).unwrap_or("");
        match (keyword, elements) {
            ("quote", [_, datum]) => Ok(datum.clone()),

            ("set!", [_, Value::Symbol(name), value_expr]) => {
                let value = self.eval_with_depth_tracking(value_expr, env, depth + 1)?;
                env.set(name, value)?;
                Ok(Value::Nil)
            }

            ("define", [_, Value::Symbol(name), value_expr]) => {
                let value = if is_lambda_form(value_expr) {
                    // Evaluated directly so the closure carries its name
                    let lambda = value_expr.to_vec().ok_or_else(|| malformed("lambda", value_expr))?;
                    self.eval_lambda(value_expr, &lambda[1..], env, Some(name.as_str()))?
                } else {
                    self.eval_with_depth_tracking(value_expr, env, depth + 1)?
                };
                env.define(name.clone(), value);
                Ok(Value::Nil)
            }

            // (define (name param ...) body ...)
            ("define", [_, Value::Pair(signature), body @ ..]) if !body.is_empty() => {
                let Value::Symbol(name) = signature.car() else {
                    return Err(malformed("define", expr));
                };
                let mut lambda = vec![signature.cdr()];
                lambda.extend_from_slice(body);
                let closure = self.eval_lambda(expr, &lambda, env, Some(name.as_str()))?;
                env.define(name, closure);
                Ok(Value::Nil)
            }

            ("if", [_, test, consequent, rest @ ..]) if rest.len() <= 1 => {
                if self.eval_with_depth_tracking(test, env, depth + 1)?.is_true() {
                    self.eval_with_depth_tracking(consequent, env, depth + 1)
                } else {
                    match rest {
                        [alternative] => self.eval_with_depth_tracking(alternative, env, depth + 1),
                        _ => Ok(Value::Boolean(false)),
                    }
                }
            }

            ("cond", [_, clauses @ ..]) => {
                let rewritten = derived::cond_to_if(clauses)?;
                self.eval_with_depth_tracking(&rewritten, env, depth + 1)
            }

            ("let", [_, args @ ..]) => {
                let rewritten = derived::let_to_application(args)?;
                self.eval_with_depth_tracking(&rewritten, env, depth + 1)
            }

            ("lambda", [_, args @ ..]) => self.eval_lambda(expr, args, env, None),

            ("begin", [_, body @ ..]) if !body.is_empty() => {
                self.eval_sequence(body, env, depth + 1)
            }

            ("quote" | "set!" | "define" | "if" | "lambda" | "begin", _) => {
                Err(malformed(keyword, expr))
            }

            // Procedure application, arguments strictly left to right
            (_, [operator, operands @ ..]) => {
                let procedure = self.eval_with_depth_tracking(operator, env, depth + 1)?;
                let args = operands
                    .iter()
                    .map(|operand| self.eval_with_depth_tracking(operand, env, depth + 1))
                    .collect::<Result<Vec<_>, _>>()?;
                self.apply_with_depth_tracking(&procedure, args, depth + 1)
            }

            (_, []) => Err(Error::UnknownForm("cannot evaluate ()".to_owned())),
        }
    }

    /// Build a closure from `(params body ...)`, the operands of a `lambda` form
    fn eval_lambda(
        &self,
        expr: &Value,
        args: &[Value],
        env: &Environment,
        name: Option<&str>,
    ) -> Result<Value, Error> {
        let [params, body @ ..] = args else {
            return Err(malformed("lambda", expr));
        };
        if body.is_empty() {
            return Err(malformed("lambda", expr));
        }

        // Only flat lists of symbols; no rest parameters
        let params = params
            .to_vec()
            .and_then(|params| {
                params
                    .iter()
                    .map(|param| param.as_symbol().map(str::to_owned))
                    .collect::<Option<Vec<_>>>()
            })
            .ok_or_else(|| {
                Error::UnknownForm(format!("lambda parameters must be a list of symbols: {expr}"))
            })?;

        Ok(Value::Closure(Rc::new(Closure {
            name: name.map(str::to_owned),
            params,
            body: body.to_vec(),
            env: env.clone(),
        })))
    }

    /// Evaluate expressions in order, returning the value of the last
    fn eval_sequence(&self, body: &[Value], env: &Environment, depth: usize) -> Result<Value, Error> {
        let mut result = Value::Nil;
        for expr in body {
            result = self.eval_with_depth_tracking(expr, env, depth)?;
        }
        Ok(result)
    }

    fn apply_with_depth_tracking(
        &self,
        procedure: &Value,
        args: Vec<Value>,
        depth: usize,
    ) -> Result<Value, Error> {
        self.check_depth(depth)?;
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
            self.apply_inner(procedure, args, depth)
        })
    }

    fn apply_inner(
        &self,
        procedure: &Value,
        args: Vec<Value>,
        depth: usize,
    ) -> Result<Value, Error> {
        if let Some(tracer) = &self.tracer {
            tracer.on_apply(procedure, &args, depth);
        }

        match procedure {
            Value::Builtin { name, func } => {
                func(args).map_err(|message| Error::builtin(name.clone(), message))
            }
            Value::Closure(closure) => {
                let expected = closure.params.len();
                let got = args.len();
                let rejected = got > expected
                    && self.config.extra_arguments == ExtraArgumentPolicy::Reject;
                if got < expected || rejected {
                    return Err(Error::arity_error(procedure.to_string(), expected, got));
                }

                let frame = Environment::with_parent(&closure.env);
                for (param, arg) in closure.params.iter().zip(args) {
                    frame.define(param.clone(), arg);
                }
                self.eval_sequence(&closure.body, &frame, depth + 1)
            }
            other => Err(Error::UnknownForm(format!("cannot apply {other}"))),
        }
    }
}

/// Evaluate an S-expression with the default configuration
pub fn eval(expr: &Value, env: &Environment) -> Result<Value, Error> {
    Evaluator::default().eval(expr, env)
}

/// Create a global environment with the standard builtin procedures
pub fn create_global_env() -> Environment {
    let env = Environment::new();
    BuiltinRegistry::standard().install(&env);
    env
}
