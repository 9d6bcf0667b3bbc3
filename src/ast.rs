//! This module defines the core value types of the interpreter. The main enum,
//! [`Value`], covers all Scheme data: numbers, symbols, strings, booleans, the empty
//! list, mutable cons cells, closures and builtin procedures. Code and data share this
//! representation, so the parser produces `Value`s and the evaluator consumes them.
//!
//! Cons cells are reference counted and interior mutable: cloning a `Value::Pair`
//! aliases the same cell, and `set-car!`/`set-cdr!` through one alias are visible
//! through every other.
//!
//! Ergonomic helper functions such as [`val`], [`sym`], and [`nil`] are provided for
//! building values in code and tests, together with `From` conversions from Rust
//! literals, arrays and vectors (which become proper lists).

use crate::evaluator::Environment;
use crate::evaluator::intooperation::OperationFn;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Type alias for number values in interpreter
pub type NumberType = i64;

/// A mutable cons cell
pub struct Pair {
    first: RefCell<Value>,
    second: RefCell<Value>,
}

impl Pair {
    pub fn new(first: Value, second: Value) -> Self {
        Pair {
            first: RefCell::new(first),
            second: RefCell::new(second),
        }
    }

    pub fn car(&self) -> Value {
        self.first.borrow().clone()
    }

    pub fn cdr(&self) -> Value {
        self.second.borrow().clone()
    }

    pub fn set_car(&self, value: Value) {
        *self.first.borrow_mut() = value;
    }

    pub fn set_cdr(&self, value: Value) {
        *self.second.borrow_mut() = value;
    }
}

/// Cells this pair owns alone are unlinked into a worklist, so freeing a long
/// list (or a deeply nested one) does not recurse once per cell
impl Drop for Pair {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        detach_unique(self.first.get_mut(), &mut pending);
        detach_unique(self.second.get_mut(), &mut pending);
        while let Some(mut pair) = pending.pop() {
            if let Some(cell) = Rc::get_mut(&mut pair) {
                detach_unique(cell.first.get_mut(), &mut pending);
                detach_unique(cell.second.get_mut(), &mut pending);
            }
        }
    }
}

fn detach_unique(slot: &mut Value, pending: &mut Vec<Rc<Pair>>) {
    if !matches!(slot, Value::Pair(pair) if Rc::strong_count(pair) == 1) {
        return;
    }
    if let Value::Pair(pair) = std::mem::replace(slot, Value::Nil) {
        pending.push(pair);
    }
}

/// A compound procedure created by `lambda`
pub struct Closure {
    /// Set when the closure is bound by `define`
    pub name: Option<String>,
    pub params: Vec<String>,
    /// Body expressions, evaluated in order; never empty
    pub body: Vec<Value>,
    /// The environment the `lambda` was evaluated in
    pub env: Environment,
}

/// Core value type in interpreter
///
/// To build values, use the ergonomic helper functions:
/// - `val(42)` for values, `sym("name")` for symbols, `nil()` for the empty list
/// - `val([1, 2, 3])` for homogeneous lists
/// - `val(vec![sym("op"), val(42)])` for mixed lists
#[derive(Clone)]
pub enum Value {
    /// The empty list, also returned by forms with no useful value
    Nil,
    Boolean(bool),
    /// Numbers (integers only)
    Number(NumberType),
    /// Symbols (identifiers)
    Symbol(String),
    /// String literals, stored without the surrounding quotes
    String(String),
    /// A shared, mutable cons cell
    Pair(Rc<Pair>),
    /// User-defined procedures
    Closure(Rc<Closure>),
    /// Native procedures, compared by name rather than by function pointer
    Builtin { name: String, func: Rc<OperationFn> },
}

impl Value {
    /// Build a cons cell
    pub fn cons(first: Value, second: Value) -> Value {
        Value::Pair(Rc::new(Pair::new(first, second)))
    }

    /// Build a proper list from its elements
    pub fn list(items: impl IntoIterator<Item = Value>) -> Value {
        Value::list_with_tail(items, Value::Nil)
    }

    /// Build a list whose last cell ends in `tail` instead of `()`
    pub fn list_with_tail(items: impl IntoIterator<Item = Value>, tail: Value) -> Value {
        let items: Vec<Value> = items.into_iter().collect();
        items
            .into_iter()
            .rev()
            .fold(tail, |rest, item| Value::cons(item, rest))
    }

    /// Only `#f` is false
    pub fn is_true(&self) -> bool {
        !matches!(self, Value::Boolean(false))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_procedure(&self) -> bool {
        matches!(self, Value::Closure(_) | Value::Builtin { .. })
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Value::Symbol(name) => Some(name),
            _ => None,
        }
    }

    /// Iterate over the elements of a list. Iteration stops at the first
    /// non-pair tail, so a dotted list yields its elements without the tail.
    pub fn iter(&self) -> ListIter {
        ListIter {
            current: self.clone(),
        }
    }

    /// The elements of a proper list, or `None` if `self` is not one
    pub fn to_vec(&self) -> Option<Vec<Value>> {
        let mut items = Vec::new();
        let mut current = self.clone();
        loop {
            match current {
                Value::Nil => return Some(items),
                Value::Pair(pair) => {
                    items.push(pair.car());
                    current = pair.cdr();
                }
                _ => return None,
            }
        }
    }

    /// Identity-sensitive equivalence used by `eq?` and `eqv?`: pairs are
    /// equivalent only when they are the same cell
    pub fn eqv(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Pair(a), Value::Pair(b)) => Rc::ptr_eq(a, b),
            _ => self == other,
        }
    }

    /// Short name of the value's type, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "empty list",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::Symbol(_) => "symbol",
            Value::String(_) => "string",
            Value::Pair(_) => "pair",
            Value::Closure(_) => "procedure",
            Value::Builtin { .. } => "builtin",
        }
    }
}

/// Iterator over the elements of a (possibly dotted) list
pub struct ListIter {
    current: Value,
}

impl Iterator for ListIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        let Value::Pair(pair) = &self.current else {
            return None;
        };
        let item = pair.car();
        let rest = pair.cdr();
        self.current = rest;
        Some(item)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Boolean(b) => write!(f, "Boolean({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::String(s) => write!(f, "String(\"{s}\")"),
            // Printed through Display so that a closure's environment is never walked
            Value::Pair(_) => write!(f, "Pair({self})"),
            Value::Closure(closure) => match &closure.name {
                Some(name) => write!(f, "Closure({name}, params={:?})", closure.params),
                None => write!(f, "Closure(params={:?})", closure.params),
            },
            Value::Builtin { name, .. } => write!(f, "Builtin({name})"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "()"),
            Value::Boolean(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Value::Number(n) => write!(f, "{n}"),
            Value::Symbol(s) | Value::String(s) => write!(f, "{s}"),
            Value::Pair(pair) => {
                write!(f, "({}", pair.car())?;
                let mut rest = pair.cdr();
                loop {
                    match rest {
                        Value::Nil => break,
                        Value::Pair(next) => {
                            write!(f, " {}", next.car())?;
                            rest = next.cdr();
                        }
                        tail => {
                            write!(f, " . {tail}")?;
                            break;
                        }
                    }
                }
                write!(f, ")")
            }
            Value::Closure(closure) => match &closure.name {
                Some(name) => write!(f, "#<procedure {name}>"),
                None => write!(f, "#<procedure>"),
            },
            Value::Builtin { name, .. } => write!(f, "#<builtin {name}>"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Pair(a), Value::Pair(b)) => pairs_equal(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            // Compare builtins by name, not function pointer
            (Value::Builtin { name: a, .. }, Value::Builtin { name: b, .. }) => a == b,
            _ => false, // Different variants are never equal
        }
    }
}

/// Structural list equality; walks the spine iteratively so long lists do not
/// recurse once per element
fn pairs_equal(a: &Rc<Pair>, b: &Rc<Pair>) -> bool {
    let mut a = Rc::clone(a);
    let mut b = Rc::clone(b);
    loop {
        if Rc::ptr_eq(&a, &b) {
            return true;
        }
        if a.car() != b.car() {
            return false;
        }
        match (a.cdr(), b.cdr()) {
            (Value::Pair(next_a), Value::Pair(next_b)) => {
                a = next_a;
                b = next_b;
            }
            (tail_a, tail_b) => return tail_a == tail_b,
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Nil
    }
}

impl From<Rc<Pair>> for Value {
    fn from(pair: Rc<Pair>) -> Self {
        Value::Pair(pair)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Number(NumberType::from(n))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(NumberType);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::list(v.into_iter().map(Into::into))
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::list(arr.into_iter().map(Into::into))
    }
}

/// Helper function for creating symbols - works great in mixed lists!
pub(crate) fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating Values - works great in mixed lists!
/// Accepts any type that can be converted to Value
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for the empty list
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn nil() -> Value {
    Value::Nil
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod helper_function_tests {
    use super::*;

    #[test]
    fn test_helper_functions_data_driven() {
        // (helper_result, expected_value)
        let test_cases = vec![
            (val(42), Value::Number(42)),
            (val(-17), Value::Number(-17)),
            (val(4294967295u32), Value::Number(4294967295)),
            (val(-128i8), Value::Number(-128)),
            (val(NumberType::MAX), Value::Number(NumberType::MAX)),
            (val(true), Value::Boolean(true)),
            (val("hello"), Value::String("hello".to_owned())),
            (sym("set-car!"), Value::Symbol("set-car!".to_owned())),
            (sym(String::from("x")), Value::Symbol("x".to_owned())),
            (nil(), Value::Nil),
            (val(()), Value::Nil),
            (
                val([1, 2]),
                Value::cons(
                    Value::Number(1),
                    Value::cons(Value::Number(2), Value::Nil),
                ),
            ),
            (
                val(vec![sym("quote"), val(vec![val(1), val("a")])]),
                Value::list([
                    Value::Symbol("quote".to_owned()),
                    Value::list([Value::Number(1), Value::String("a".to_owned())]),
                ]),
            ),
            (
                Value::list_with_tail([val(1), val(2)], val(3)),
                Value::cons(val(1), Value::cons(val(2), val(3))),
            ),
        ];

        for (i, (actual, expected)) in test_cases.iter().enumerate() {
            assert_eq!(actual, expected, "Test case {} failed", i + 1);
        }
        assert_eq!(val([1, 2, 3]).to_vec().unwrap().len(), 3);
    }

    #[test]
    fn test_display_data_driven() {
        let closure = Value::Closure(Rc::new(Closure {
            name: None,
            params: vec![],
            body: vec![val(1)],
            env: Environment::new(),
        }));
        let named = Value::Closure(Rc::new(Closure {
            name: Some("square".to_owned()),
            params: vec!["x".to_owned()],
            body: vec![sym("x")],
            env: Environment::new(),
        }));
        let test_cases = vec![
            (nil(), "()"),
            (val(true), "#t"),
            (val(false), "#f"),
            (val(-42), "-42"),
            (sym("foo"), "foo"),
            (val("a string"), "a string"),
            (val([1, 2, 3]), "(1 2 3)"),
            (Value::cons(val(1), val(2)), "(1 . 2)"),
            (Value::list_with_tail([val(1), val(2)], val(3)), "(1 2 . 3)"),
            (val(vec![val(1), val(vec![val(2), nil()])]), "(1 (2 ()))"),
            (closure, "#<procedure>"),
            (named, "#<procedure square>"),
        ];

        for (value, expected) in test_cases {
            assert_eq!(value.to_string(), expected, "display of {value:?}");
        }
    }

    #[test]
    fn test_pairs_alias_and_mutate() {
        let p = Value::cons(val(1), val(2));
        let q = p.clone();
        let Value::Pair(cell) = &p else {
            panic!("expected a pair");
        };
        cell.set_car(val(9));
        let Value::Pair(alias) = &q else {
            panic!("expected a pair");
        };
        assert_eq!(alias.car(), val(9));
        assert_eq!(q.to_string(), "(9 . 2)");
    }

    #[test]
    fn test_equality_structural_vs_identity() {
        let a = val([1, 2]);
        let b = val([1, 2]);
        assert_eq!(a, b);
        assert!(!a.eqv(&b));
        assert!(a.eqv(&a.clone()));
        assert!(val(3).eqv(&val(3)));
        assert!(sym("x").eqv(&sym("x")));
        assert_ne!(val([1, 2]), val([1, 3]));
        assert_ne!(val([1, 2]), Value::list_with_tail([val(1)], val(2)));
        assert_ne!(val(0), val(false));
    }

    #[test]
    fn test_truthiness_and_list_views() {
        assert!(val(0).is_true());
        assert!(nil().is_true());
        assert!(!val(false).is_true());
        assert_eq!(Value::cons(val(1), val(2)).to_vec(), None);
        assert_eq!(
            Value::list_with_tail([val(1), val(2)], val(3))
                .iter()
                .collect::<Vec<_>>(),
            vec![val(1), val(2)]
        );
        assert_eq!(nil().to_vec().unwrap(), Vec::<Value>::new());
    }

    #[test]
    fn test_dropping_long_structures() {
        let long = Value::list((0..1_000_000).map(val));
        assert_eq!(long.iter().count(), 1_000_000);
        drop(long);

        // Nested through the car instead of the cdr
        let mut nested = nil();
        for _ in 0..200_000 {
            nested = Value::cons(nested, nil());
        }
        drop(nested);

        // A tail shared with a surviving list is left intact
        let tail = Value::list((0..1_000).map(val));
        let head = Value::cons(val(-1), tail.clone());
        drop(head);
        assert_eq!(tail.iter().count(), 1_000);
        assert_eq!(tail.iter().last().unwrap(), val(999));
    }
}
