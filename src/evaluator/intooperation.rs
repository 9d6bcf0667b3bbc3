use crate::ast::{NumberType, Pair, Value};
use std::rc::Rc;

// NOTE: This module is the adapter layer that turns strongly-typed Rust
// functions into the erased `OperationFn` stored in `Value::Builtin`.
//
// Builtin implementations report failures as plain messages; the
// evaluator attaches the builtin's name and raises `Error::BuiltinError`.

/// Canonical erased builtin function type used by the evaluator.
///
/// Builtins receive ownership of their already-evaluated argument vector.
pub type OperationFn = dyn Fn(Vec<Value>) -> Result<Value, String>;

fn expected_exactly(count: usize, got: usize) -> String {
    format!("expected {count} arguments, got {got}")
}

// =====================================================================
// Argument conversion
// =====================================================================

/// Conversion of one evaluated argument into a typed parameter.
pub trait FromParam: Sized {
    fn from_arg(value: Value) -> Result<Self, String>;
}

impl FromParam for Value {
    fn from_arg(value: Value) -> Result<Self, String> {
        Ok(value)
    }
}

impl FromParam for NumberType {
    fn from_arg(value: Value) -> Result<Self, String> {
        match value {
            Value::Number(n) => Ok(n),
            other => Err(format!("expected number, got {}", other.type_name())),
        }
    }
}

impl FromParam for bool {
    fn from_arg(value: Value) -> Result<Self, String> {
        match value {
            Value::Boolean(b) => Ok(b),
            other => Err(format!("expected boolean, got {}", other.type_name())),
        }
    }
}

impl FromParam for String {
    fn from_arg(value: Value) -> Result<Self, String> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(format!("expected string, got {}", other.type_name())),
        }
    }
}

/// A cons cell argument, shared with the caller so mutation is visible to it
impl FromParam for Rc<Pair> {
    fn from_arg(value: Value) -> Result<Self, String> {
        match value {
            Value::Pair(pair) => Ok(pair),
            other => Err(format!("expected pair, got {other}")),
        }
    }
}

/// Conversion of the argument tail into a rest parameter.
pub trait FromRest: Sized {
    fn from_rest(values: Vec<Value>) -> Result<Self, String>;
}

/// A rest parameter of any `FromParam` element type, checked element by element
impl<T: FromParam> FromRest for Vec<T> {
    fn from_rest(values: Vec<Value>) -> Result<Self, String> {
        values.into_iter().map(T::from_arg).collect()
    }
}

// =====================================================================
// Return-type adaptation
// =====================================================================

/// Normalizes builtin return types to `Result<Value, String>`.
pub trait IntoValueResult {
    fn into_value_result(self) -> Result<Value, String>;
}

impl<T: Into<Value>> IntoValueResult for Result<T, String> {
    fn into_value_result(self) -> Result<Value, String> {
        self.map(Into::into)
    }
}

macro_rules! impl_into_value_result {
    ($($t:ty),+) => {
        $(
            impl IntoValueResult for $t {
                fn into_value_result(self) -> Result<Value, String> {
                    Ok(self.into())
                }
            }
        )+
    };
}

impl_into_value_result!(Value, NumberType, bool, String, (), Rc<Pair>);

// =====================================================================
// Adapter traits
// =====================================================================

/// Converts a typed Rust function into an [`OperationFn`], parameterized by its
/// argument tuple type. Arity mismatches are reported as builtin failures.
pub trait IntoOperation<Args> {
    /// Number of arguments the function takes
    const ARITY: usize;

    fn into_operation(self) -> Rc<OperationFn>;
}

/// Converts a typed Rust function whose last parameter is a rest parameter
/// (a `Vec<T>` collecting the remaining arguments), optionally after a fixed
/// prefix of [`FromParam`] parameters.
pub trait IntoVariadicOperation<Args> {
    fn into_variadic_operation(self) -> Rc<OperationFn>;
}

// 0-arg functions / closures
impl<F, R> IntoOperation<()> for F
where
    F: Fn() -> R + 'static,
    R: IntoValueResult,
{
    const ARITY: usize = 0;

    fn into_operation(self) -> Rc<OperationFn> {
        Rc::new(move |args: Vec<Value>| {
            if !args.is_empty() {
                return Err(expected_exactly(0, args.len()));
            }
            (self)().into_value_result()
        })
    }
}

/// Implements `IntoOperation` for a fixed arity by moving the argument
/// vector into an array and converting each slot.
macro_rules! impl_into_operation_for_arity {
    ($arity:expr, $( $v:ident : $A:ident ),+ ) => {
        impl<F, R, $( $A ),+> IntoOperation<( $( $A, )+ )> for F
        where
            F: Fn( $( $A ),+ ) -> R + 'static,
            $( $A: FromParam, )+
            R: IntoValueResult,
        {
            const ARITY: usize = $arity;

            fn into_operation(self) -> Rc<OperationFn> {
                Rc::new(move |args: Vec<Value>| {
                    let [ $( $v ),+ ]: [Value; $arity] = args
                        .try_into()
                        .map_err(|args: Vec<Value>| expected_exactly($arity, args.len()))?;
                    (self)( $( <$A as FromParam>::from_arg($v)? ),+ ).into_value_result()
                })
            }
        }
    };
}

impl_into_operation_for_arity!(1, v0: A1);
impl_into_operation_for_arity!(2, v0: A1, v1: A2);
impl_into_operation_for_arity!(3, v0: A1, v1: A2, v2: A3);
impl_into_operation_for_arity!(4, v0: A1, v1: A2, v2: A3, v3: A4);

// Rest parameter only
impl<F, I, R> IntoVariadicOperation<(I,)> for F
where
    I: FromRest,
    F: Fn(I) -> R + 'static,
    R: IntoValueResult,
{
    fn into_variadic_operation(self) -> Rc<OperationFn> {
        Rc::new(move |args: Vec<Value>| (self)(I::from_rest(args)?).into_value_result())
    }
}

/// Implements `IntoVariadicOperation` for a fixed prefix followed by a rest
/// parameter.
macro_rules! impl_into_variadic_operation_for_prefix_and_rest {
    ($prefix:expr, $( $v:ident : $A:ident ),+ ) => {
        impl<F, I, R, $( $A ),+> IntoVariadicOperation<( $( $A, )+ I, )> for F
        where
            I: FromRest,
            $( $A: FromParam, )+
            F: Fn( $( $A ),+, I ) -> R + 'static,
            R: IntoValueResult,
        {
            fn into_variadic_operation(self) -> Rc<OperationFn> {
                Rc::new(move |args: Vec<Value>| {
                    if args.len() < $prefix {
                        return Err(format!(
                            "expected at least {} arguments, got {}",
                            $prefix,
                            args.len()
                        ));
                    }
                    let mut args = args.into_iter();
                    $(
                        let $v = <$A as FromParam>::from_arg(args.next().unwrap_or(Value::Nil))?;
                    )+
                    let rest = I::from_rest(args.collect())?;
                    (self)( $( $v ),+, rest ).into_value_result()
                })
            }
        }
    };
}

impl_into_variadic_operation_for_prefix_and_rest!(1, v0: A1);
impl_into_variadic_operation_for_prefix_and_rest!(2, v0: A1, v1: A2);
impl_into_variadic_operation_for_prefix_and_rest!(3, v0: A1, v1: A2, v2: A3);
