//! Builtin procedure registry.
//!
//! The registry is an explicit value: [`BuiltinRegistry::standard`] builds the fixed
//! library below, embedders may add their own procedures, and the interpreter installs
//! the result into its global environment at construction.
//!
//! ```scheme
//! (cons 1 '(2 3))      ; => (1 2 3)
//! (< 1 2 3)            ; => #t
//! (modulo (- 0 7) 2)  ; => 1
//! (and 1 2 #f 3)       ; => #f
//! ```
//!
//! ## Semantics
//!
//! - Arguments are already evaluated; `and`/`or` are procedures, not special forms.
//! - Arithmetic is a left fold over fixed-precision integers: `(- 10 1 2)` is `7` and
//!   `(- 5)` is `5`. Overflow and division by zero are errors, never wrapped.
//! - Comparisons chain over adjacent arguments and are trivially true for fewer
//!   than two. The chain stops at the first pair that fails, so arguments past it
//!   are never type-checked: `(< 2 1 'a)` is `#f`.
//! - `eq?` and `eqv?` compare pairs by identity and everything else by value.
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** with typed parameters (`NumberType`, `bool`,
//!    `String`, `Rc<Pair>`, `Value`, or a `Vec<T>` rest parameter)
//! 2. **Register it** with [`BuiltinRegistry::register_builtin_operation`] or
//!    [`BuiltinRegistry::register_variadic_builtin_operation`]
//! 3. **Add tests** covering edge cases and error conditions

use crate::ast::{NumberType, Pair, Value};
use crate::evaluator::Environment;
use crate::evaluator::intooperation::{
    FromParam, IntoOperation, IntoVariadicOperation, OperationFn,
};
use std::fmt;
use std::rc::Rc;

/// Accepted argument counts of a builtin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    /// Inclusive bounds
    Range(usize, usize),
    Any,
}

impl Arity {
    /// Check if the given number of arguments is acceptable
    pub fn validate(self, count: usize) -> Result<(), String> {
        let ok = match self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
            Arity::Range(min, max) => (min..=max).contains(&count),
            Arity::Any => true,
        };
        if ok {
            Ok(())
        } else {
            Err(format!("expected {self} arguments, got {count}"))
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "exactly {n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Range(min, max) => write!(f, "between {min} and {max}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// Definition of a builtin procedure
#[derive(Clone)]
pub struct BuiltinOp {
    /// The Scheme identifier the procedure is bound to
    pub name: String,
    pub arity: Arity,
    func: Rc<OperationFn>,
}

impl fmt::Debug for BuiltinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BuiltinOp({}, {:?})", self.name, self.arity)
    }
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl BuiltinOp {
    pub fn new(name: impl Into<String>, arity: Arity, func: Rc<OperationFn>) -> Self {
        BuiltinOp {
            name: name.into(),
            arity,
            func,
        }
    }

    /// Validate the argument count, then run the procedure
    pub fn call(&self, args: Vec<Value>) -> Result<Value, String> {
        self.arity.validate(args.len())?;
        (self.func)(args)
    }

    /// The procedure value bound in an environment
    pub fn to_value(&self) -> Value {
        let op = self.clone();
        Value::Builtin {
            name: self.name.clone(),
            func: Rc::new(move |args: Vec<Value>| op.call(args)),
        }
    }
}

//
// Builtin Function Implementations
//

fn builtin_pair_p(value: Value) -> bool {
    matches!(value, Value::Pair(_))
}

fn builtin_boolean_p(value: Value) -> bool {
    matches!(value, Value::Boolean(_))
}

fn builtin_symbol_p(value: Value) -> bool {
    matches!(value, Value::Symbol(_))
}

fn builtin_number_p(value: Value) -> bool {
    matches!(value, Value::Number(_))
}

fn builtin_null_p(value: Value) -> bool {
    value.is_nil()
}

fn builtin_zero_p(value: Value) -> bool {
    matches!(value, Value::Number(0))
}

fn builtin_cons(first: Value, second: Value) -> Value {
    Value::cons(first, second)
}

fn builtin_car(pair: Rc<Pair>) -> Value {
    pair.car()
}

fn builtin_cdr(pair: Rc<Pair>) -> Value {
    pair.cdr()
}

fn builtin_cadr(pair: Rc<Pair>) -> Result<Value, String> {
    Ok(Rc::<Pair>::from_arg(pair.cdr())?.car())
}

fn builtin_caddr(pair: Rc<Pair>) -> Result<Value, String> {
    let second = Rc::<Pair>::from_arg(pair.cdr())?;
    Ok(Rc::<Pair>::from_arg(second.cdr())?.car())
}

fn builtin_list(items: Vec<Value>) -> Value {
    Value::list(items)
}

fn builtin_set_car(pair: Rc<Pair>, value: Value) {
    pair.set_car(value);
}

fn builtin_set_cdr(pair: Rc<Pair>, value: Value) {
    pair.set_cdr(value);
}

fn builtin_eqv(first: Value, second: Value) -> bool {
    first.eqv(&second)
}

fn builtin_not(value: Value) -> bool {
    matches!(value, Value::Boolean(false))
}

/// The first `#f`, otherwise the last argument, otherwise `#t`
fn builtin_and(args: Vec<Value>) -> Value {
    if args.iter().any(|v| matches!(v, Value::Boolean(false))) {
        return Value::Boolean(false);
    }
    args.into_iter().last().unwrap_or(Value::Boolean(true))
}

/// The first `#t`, otherwise the last argument, otherwise `#f`
fn builtin_or(args: Vec<Value>) -> Value {
    if args.iter().any(|v| matches!(v, Value::Boolean(true))) {
        return Value::Boolean(true);
    }
    args.into_iter().last().unwrap_or(Value::Boolean(false))
}

// Macro to generate left-fold arithmetic over checked operations
macro_rules! checked_fold {
    ($name:ident, $op:ident, $what:expr) => {
        fn $name(first: NumberType, rest: Vec<NumberType>) -> Result<NumberType, String> {
            rest.into_iter().try_fold(first, |acc, n| {
                acc.$op(n)
                    .ok_or_else(|| concat!("integer overflow in ", $what).to_owned())
            })
        }
    };
}

checked_fold!(builtin_add, checked_add, "addition");
checked_fold!(builtin_sub, checked_sub, "subtraction");
checked_fold!(builtin_mul, checked_mul, "multiplication");

/// Truncating division
fn quotient(a: NumberType, b: NumberType) -> Result<NumberType, String> {
    if b == 0 {
        return Err("division by zero".to_owned());
    }
    a.checked_div(b)
        .ok_or_else(|| "integer overflow in quotient".to_owned())
}

/// Remainder with the sign of the divisor
fn modulo(a: NumberType, b: NumberType) -> Result<NumberType, String> {
    if b == 0 {
        return Err("division by zero".to_owned());
    }
    let r = a
        .checked_rem(b)
        .ok_or_else(|| "integer overflow in modulo".to_owned())?;
    if r != 0 && (r < 0) != (b < 0) {
        Ok(r + b)
    } else {
        Ok(r)
    }
}

fn builtin_quotient(first: NumberType, rest: Vec<NumberType>) -> Result<NumberType, String> {
    rest.into_iter().try_fold(first, quotient)
}

fn builtin_modulo(first: NumberType, rest: Vec<NumberType>) -> Result<NumberType, String> {
    rest.into_iter().try_fold(first, modulo)
}

// Macro to generate chained numeric comparison functions
macro_rules! numeric_comparison {
    ($name:ident, $op:tt) => {
        fn $name(args: Vec<Value>) -> Result<bool, String> {
            // Operands are converted as the chain reaches them
            for w in args.windows(2) {
                let a = NumberType::from_arg(w[0].clone())?;
                let b = NumberType::from_arg(w[1].clone())?;
                if !(a $op b) {
                    return Ok(false);
                }
            }
            Ok(true)
        }
    };
}

numeric_comparison!(builtin_num_eq, ==);
numeric_comparison!(builtin_ge, >=);
numeric_comparison!(builtin_le, <=);
numeric_comparison!(builtin_gt, >);
numeric_comparison!(builtin_lt, <);

/// Ordered collection of builtin procedures, keyed by name
#[derive(Debug, Clone, Default)]
pub struct BuiltinRegistry {
    ops: Vec<BuiltinOp>,
}

impl BuiltinRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard library of builtin procedures
    pub fn standard() -> Self {
        let mut registry = Self::new();

        // Type predicates
        registry.register_builtin_operation::<_, (Value,)>("pair?", builtin_pair_p);
        registry.register_builtin_operation::<_, (Value,)>("boolean?", builtin_boolean_p);
        registry.register_builtin_operation::<_, (Value,)>("symbol?", builtin_symbol_p);
        registry.register_builtin_operation::<_, (Value,)>("number?", builtin_number_p);
        registry.register_builtin_operation::<_, (Value,)>("null?", builtin_null_p);
        registry.register_builtin_operation::<_, (Value,)>("zero?", builtin_zero_p);

        // Pairs and lists
        registry.register_builtin_operation::<_, (Value, Value)>("cons", builtin_cons);
        registry.register_builtin_operation::<_, (Rc<Pair>,)>("car", builtin_car);
        registry.register_builtin_operation::<_, (Rc<Pair>,)>("cdr", builtin_cdr);
        registry.register_builtin_operation::<_, (Rc<Pair>,)>("cadr", builtin_cadr);
        registry.register_builtin_operation::<_, (Rc<Pair>,)>("caddr", builtin_caddr);
        registry.register_variadic_builtin_operation::<_, (Vec<Value>,)>(
            "list",
            Arity::Any,
            builtin_list,
        );
        registry.register_builtin_operation::<_, (Rc<Pair>, Value)>("set-car!", builtin_set_car);
        registry.register_builtin_operation::<_, (Rc<Pair>, Value)>("set-cdr!", builtin_set_cdr);

        // Equivalence
        registry.register_builtin_operation::<_, (Value, Value)>("eqv?", builtin_eqv);
        registry.register_builtin_operation::<_, (Value, Value)>("eq?", builtin_eqv);

        // Logic
        registry.register_builtin_operation::<_, (Value,)>("not", builtin_not);
        registry.register_variadic_builtin_operation::<_, (Vec<Value>,)>(
            "and",
            Arity::Any,
            builtin_and,
        );
        registry.register_variadic_builtin_operation::<_, (Vec<Value>,)>(
            "or",
            Arity::Any,
            builtin_or,
        );

        // Arithmetic
        let arithmetic: [(&str, fn(NumberType, Vec<NumberType>) -> Result<NumberType, String>); 5] = [
            ("+", builtin_add),
            ("-", builtin_sub),
            ("*", builtin_mul),
            ("quotient", builtin_quotient),
            ("modulo", builtin_modulo),
        ];
        for (name, func) in arithmetic {
            registry.register_variadic_builtin_operation::<_, (NumberType, Vec<NumberType>)>(
                name,
                Arity::AtLeast(1),
                func,
            );
        }

        // Comparison
        let comparisons: [(&str, fn(Vec<Value>) -> Result<bool, String>); 5] = [
            ("=", builtin_num_eq),
            (">=", builtin_ge),
            ("<=", builtin_le),
            (">", builtin_gt),
            ("<", builtin_lt),
        ];
        for (name, func) in comparisons {
            registry.register_variadic_builtin_operation::<_, (Vec<Value>,)>(
                name,
                Arity::Any,
                func,
            );
        }

        registry
    }

    /// Add an operation, replacing any existing one with the same name
    pub fn register(&mut self, op: BuiltinOp) {
        match self.ops.iter_mut().find(|existing| existing.name == op.name) {
            Some(existing) => *existing = op,
            None => self.ops.push(op),
        }
    }

    /// Register a function that already works on raw argument slices.
    ///
    /// ```
    /// use ez_scheme::builtinops::{Arity, BuiltinRegistry};
    /// use ez_scheme::Value;
    ///
    /// fn count_args(args: &[Value]) -> Result<Value, String> {
    ///     Ok(Value::Number(args.len() as i64))
    /// }
    ///
    /// let mut registry = BuiltinRegistry::standard();
    /// registry.register_builtin_function("count-args", Arity::Any, count_args);
    /// ```
    pub fn register_builtin_function(
        &mut self,
        name: &str,
        arity: Arity,
        func: fn(&[Value]) -> Result<Value, String>,
    ) {
        let wrapped: Rc<OperationFn> = Rc::new(move |args: Vec<Value>| func(&args));
        self.register(BuiltinOp::new(name, arity, wrapped));
    }

    /// Register a strongly-typed Rust function as a builtin using automatic
    /// argument extraction and result conversion. The arity is the number of
    /// parameters.
    ///
    /// ```
    /// use ez_scheme::builtinops::BuiltinRegistry;
    ///
    /// fn safe_div(a: i64, b: i64) -> Result<i64, String> {
    ///     if b == 0 {
    ///         Err("division by zero".to_owned())
    ///     } else {
    ///         Ok(a / b)
    ///     }
    /// }
    ///
    /// let mut registry = BuiltinRegistry::standard();
    /// registry.register_builtin_operation::<_, (i64, i64)>("safe-div", safe_div);
    /// ```
    ///
    /// Supported parameter types: `i64`, `bool`, `String`, `Rc<Pair>` and `Value`.
    /// Supported return types: `Value`, `i64`, `bool`, `String`, `()`, `Rc<Pair>`, or
    /// `Result<T, String>` for any `T: Into<Value>`.
    pub fn register_builtin_operation<F, Args>(&mut self, name: &str, func: F)
    where
        F: IntoOperation<Args>,
    {
        let arity = Arity::Exact(<F as IntoOperation<Args>>::ARITY);
        self.register(BuiltinOp::new(name, arity, func.into_operation()));
    }

    /// Register a function whose last parameter is a `Vec<T>` rest parameter.
    /// The arity cannot be derived from the signature, so it is given explicitly.
    pub fn register_variadic_builtin_operation<F, Args>(&mut self, name: &str, arity: Arity, func: F)
    where
        F: IntoVariadicOperation<Args>,
    {
        self.register(BuiltinOp::new(name, arity, func.into_variadic_operation()));
    }

    pub fn get(&self, name: &str) -> Option<&BuiltinOp> {
        self.ops.iter().find(|op| op.name == name)
    }

    pub fn ops(&self) -> &[BuiltinOp] {
        &self.ops
    }

    /// Bind every operation in `env`
    pub fn install(&self, env: &Environment) {
        for op in &self.ops {
            env.define(op.name.clone(), op.to_value());
        }
    }
}
