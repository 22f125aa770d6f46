//! This module defines the core value type shared by the reader and the evaluator.
//! The main enum, [`Value`], is both the syntax tree produced by the reader (numbers,
//! symbols, string literals and lists) and the result domain of evaluation (which adds
//! booleans, closures and builtins). Quoted code is therefore ordinary data, which is
//! what lets `eval` continue evaluating a value as code.
//!
//! Ergonomic helper functions such as [`val`], [`sym`] and [`nil`] are provided for
//! convenient AST construction in code and tests. `Display` renders canonical source
//! text: re-reading a printed syntax tree yields a structurally equal tree.

use std::fmt;
use std::rc::Rc;

use crate::Error;
use crate::evaluator::Environment;
use crate::evaluator::intooperation::{IntoOperation, OperationFn};

/// Head symbol of the form the reader produces for string literals
pub const STRING_FORM: &str = "string";

/// Head symbol of the form the reader produces for the `'` marker
pub const QUOTE_FORM: &str = "quote";

/// Numeric atom: an exact integer or a floating-point real
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Int(i64),
    Real(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Real(r) => r,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Number::Int(n) => n == 0,
            Number::Real(r) => r == 0.0,
        }
    }

    /// Integer op when both sides are integers (overflow is an error), real op otherwise
    fn combine(
        self,
        other: Number,
        op_name: &str,
        int_op: fn(i64, i64) -> Option<i64>,
        real_op: fn(f64, f64) -> f64,
    ) -> Result<Number, Error> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => int_op(a, b)
                .map(Number::Int)
                .ok_or_else(|| Error::EvalError(format!("Integer overflow in {op_name}"))),
            (a, b) => Ok(Number::Real(real_op(a.as_f64(), b.as_f64()))),
        }
    }

    pub fn add(self, other: Number) -> Result<Number, Error> {
        self.combine(other, "addition", i64::checked_add, |a, b| a + b)
    }

    pub fn sub(self, other: Number) -> Result<Number, Error> {
        self.combine(other, "subtraction", i64::checked_sub, |a, b| a - b)
    }

    pub fn mul(self, other: Number) -> Result<Number, Error> {
        self.combine(other, "multiplication", i64::checked_mul, |a, b| a * b)
    }

    /// True division: the result is always a real
    pub fn div(self, other: Number) -> Result<Number, Error> {
        if other.is_zero() {
            return Err(Error::EvalError("Division by zero".into()));
        }
        Ok(Number::Real(self.as_f64() / other.as_f64()))
    }

    /// Floored modulo: a non-zero result takes the sign of the divisor
    pub fn modulo(self, other: Number) -> Result<Number, Error> {
        if other.is_zero() {
            return Err(Error::EvalError("Modulo by zero".into()));
        }
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => {
                let r = a.wrapping_rem(b);
                Ok(Number::Int(if r != 0 && (r < 0) != (b < 0) { r + b } else { r }))
            }
            (a, b) => {
                let (a, b) = (a.as_f64(), b.as_f64());
                let r = a % b;
                Ok(Number::Real(if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }))
            }
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            (a, b) => a.as_f64() == b.as_f64(),
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a.partial_cmp(b),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(n) => write!(f, "{n}"),
            // Debug formatting keeps the fractional part (`2.0`), so reals re-read as reals
            Number::Real(r) => write!(f, "{r:?}"),
        }
    }
}

/// Core AST and value type
///
/// To build an AST, use the helper functions:
/// - `val(42)` for values, `sym("name")` for symbols, `nil()` for empty lists
/// - `val([1, 2, 3])` for homogeneous lists
/// - `val(vec![sym("op"), val(42)])` for mixed lists
#[derive(Clone)]
pub enum Value {
    Number(Number),
    /// Symbols (identifiers); only a runtime value when produced by `quote`
    Symbol(String),
    /// String literal text
    String(String),
    Bool(bool),
    /// Lists; the empty list is nil
    List(List),
    /// User-defined procedures
    Closure(Rc<Closure>),
    /// Host procedures supplied by the builtin registry
    Builtin(Rc<Builtin>),
    /// Result of a `cond` whose fallback clause holds without having matched.
    /// Never equal to anything, itself included.
    Unspecified,
}

impl Value {
    /// Truthiness used by `if`, `cond` and the logical builtins
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Number(n) => !n.is_zero(),
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Unspecified => false,
            Value::Symbol(_) | Value::Closure(_) | Value::Builtin(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Symbol(_) => "symbol",
            Value::String(_) => "string",
            Value::Bool(_) => "boolean",
            Value::List(_) => "list",
            Value::Closure(_) => "closure",
            Value::Builtin(_) => "builtin",
            Value::Unspecified => "unspecified",
        }
    }

    /// Number of parameters a procedure value accepts, `None` for non-procedures
    pub fn procedure_arity(&self) -> Option<usize> {
        match self {
            Value::Closure(closure) => Some(closure.arity()),
            Value::Builtin(builtin) => Some(builtin.arity()),
            _ => None,
        }
    }
}

/// Immutable list storage shared between clones.
///
/// Cloning, environment lookups and `tail` are O(1): they hand out another view of the
/// same elements. Dropping a deeply nested list unlinks the levels it solely owns onto a
/// worklist instead of recursing.
#[derive(Clone, Default)]
pub struct List {
    items: Rc<Vec<Value>>,
    start: usize,
}

impl List {
    pub fn new(items: Vec<Value>) -> Self {
        List {
            items: Rc::new(items),
            start: 0,
        }
    }

    pub fn as_slice(&self) -> &[Value] {
        self.items.get(self.start..).unwrap_or_default()
    }

    /// Everything after the first element, sharing this list's storage
    pub fn tail(&self) -> List {
        List {
            items: Rc::clone(&self.items),
            start: (self.start + 1).min(self.items.len()),
        }
    }

    /// The elements as an owned vector; copied only when the storage is shared
    pub fn into_vec(mut self) -> Vec<Value> {
        let start = self.start;
        match Rc::get_mut(&mut self.items) {
            Some(items) => {
                let mut items = std::mem::take(items);
                items.drain(..start);
                items
            }
            None => self.as_slice().to_vec(),
        }
    }
}

impl std::ops::Deref for List {
    type Target = [Value];

    fn deref(&self) -> &[Value] {
        self.as_slice()
    }
}

impl Drop for List {
    fn drop(&mut self) {
        let Some(items) = Rc::get_mut(&mut self.items) else {
            return;
        };
        let mut pending = std::mem::take(items);
        while let Some(value) = pending.pop() {
            if let Value::List(mut inner) = value
                && let Some(items) = Rc::get_mut(&mut inner.items)
            {
                pending.append(items);
            }
        }
    }
}

// Compared with a worklist so that deep nesting does not recurse
impl PartialEq for List {
    fn eq(&self, other: &Self) -> bool {
        let mut pending = vec![(self.as_slice(), other.as_slice())];
        while let Some((a, b)) = pending.pop() {
            if a.len() != b.len() {
                return false;
            }
            for (x, y) in a.iter().zip(b) {
                match (x, y) {
                    (Value::List(x), Value::List(y)) => pending.push((x.as_slice(), y.as_slice())),
                    _ if x != y => return false,
                    _ => {}
                }
            }
        }
        true
    }
}

impl From<Vec<Value>> for List {
    fn from(items: Vec<Value>) -> Self {
        List::new(items)
    }
}

impl FromIterator<Value> for List {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        List::new(iter.into_iter().collect())
    }
}

/// A procedure value: parameter names, an unevaluated body and the frame it was created in
pub struct Closure {
    params: Vec<String>,
    body: Value,
    env: Rc<Environment>,
    help: Option<Value>,
}

impl Closure {
    pub fn new(params: Vec<String>, body: Value, env: Rc<Environment>, help: Option<Value>) -> Self {
        Closure {
            params,
            body,
            env,
            help,
        }
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    /// The captured defining frame
    pub fn env(&self) -> &Rc<Environment> {
        &self.env
    }

    /// Documentation value evaluated when the closure was created
    pub fn help(&self) -> Option<&Value> {
        self.help.as_ref()
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Build the frame for one invocation: parameters bound to arguments,
    /// parented on the captured environment.
    pub fn call_frame(&self, args: Vec<Value>) -> Result<Rc<Environment>, Error> {
        if self.params.len() != args.len() {
            return Err(Error::arity_error(self.params.len(), args.len()));
        }
        Ok(Environment::with_bindings(
            self.params.iter().cloned().zip(args),
            Some(Rc::clone(&self.env)),
        ))
    }
}

// The captured frame may hold this closure again (recursive `let`), so Debug stops here.
impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Closure(params={:?}, body={:?})", self.params, self.body)
    }
}

/// A host procedure with a declared, fixed arity
pub struct Builtin {
    name: String,
    arity: usize,
    func: Rc<OperationFn>,
}

impl Builtin {
    pub fn new(name: impl Into<String>, arity: usize, func: Rc<OperationFn>) -> Self {
        Builtin {
            name: name.into(),
            arity,
            func,
        }
    }

    /// Wrap a strongly-typed Rust function; its arity is the number of Rust parameters.
    pub fn from_operation<F, Args, R>(name: impl Into<String>, func: F) -> Self
    where
        F: IntoOperation<Args, R>,
    {
        Builtin::new(
            name,
            <F as IntoOperation<Args, R>>::ARITY,
            func.into_operation(),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn call(&self, args: Vec<Value>) -> Result<Value, Error> {
        if args.len() != self.arity {
            return Err(Error::arity_error_with_expr(
                self.arity,
                args.len(),
                self.name.clone(),
            ));
        }
        (self.func)(args)
    }
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Builtin({}/{})", self.name, self.arity)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(Number::Int(n)) => write!(f, "Int({n})"),
            Value::Number(Number::Real(r)) => write!(f, "Real({r:?})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::List(list) => {
                write!(f, "List(")?;
                for (i, v) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v:?}")?;
                }
                write!(f, ")")
            }
            Value::Closure(closure) => write!(f, "{closure:?}"),
            Value::Builtin(builtin) => write!(f, "{builtin:?}"),
            Value::Unspecified => write!(f, "Unspecified"),
        }
    }
}

impl Value {
    fn fmt_atom(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Symbol(s) => write!(f, "{s}"),
            // String tokens are kept verbatim by the reader, so no escaping on the way out
            Value::String(s) => write!(f, "\"{s}\""),
            Value::Bool(b) => write!(f, "{}", if *b { "t" } else { "nil" }),
            Value::List(_) => write!(f, "(...)"),
            Value::Closure(closure) => write!(f, "#<lambda ({})>", closure.params.join(" ")),
            Value::Builtin(builtin) => write!(f, "#<builtin:{}>", builtin.name),
            Value::Unspecified => write!(f, "#<unspecified>"),
        }
    }
}

// Lists are walked with an explicit stack of open lists, so printing deep nesting
// does not recurse.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut open: Vec<(std::slice::Iter<'_, Value>, bool)> = Vec::new();
        let mut current = self;
        loop {
            match current {
                Value::List(list) => match list.as_slice() {
                    [Value::Symbol(head), literal @ Value::String(_)] if head == STRING_FORM => {
                        literal.fmt_atom(f)?;
                    }
                    elements => {
                        write!(f, "(")?;
                        open.push((elements.iter(), true));
                    }
                },
                atom => atom.fmt_atom(f)?,
            }

            // Move to the next element, closing every list that has run out
            loop {
                let Some((elements, first)) = open.last_mut() else {
                    return Ok(());
                };
                match elements.next() {
                    Some(next) => {
                        if !*first {
                            write!(f, " ")?;
                        }
                        *first = false;
                        current = next;
                        break;
                    }
                    None => {
                        write!(f, ")")?;
                        open.pop();
                    }
                }
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            // Closures compare by identity, builtins by name
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a.name == b.name,
            (Value::Unspecified, _) | (_, Value::Unspecified) => false,
            _ => false,
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
        Value::Bool(b)
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Value::Number(Number::Real(r))
    }
}

impl From<Closure> for Value {
    fn from(closure: Closure) -> Self {
        Value::Closure(Rc::new(closure))
    }
}

impl From<Builtin> for Value {
    fn from(builtin: Builtin) -> Self {
        Value::Builtin(Rc::new(builtin))
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Number(Number::Int(i64::from(n)))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(i64);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl From<List> for Value {
    fn from(list: List) -> Self {
        Value::List(list)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::List(arr.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value> + Clone> From<&[T]> for Value {
    fn from(slice: &[T]) -> Self {
        Value::List(slice.iter().cloned().map(Into::into).collect())
    }
}

// Fallible conversions from `Value` back into Rust types, used for builtin parameters.

impl TryFrom<Value> for Number {
    type Error = Error;

    fn try_from(value: Value) -> Result<Number, Error> {
        match value {
            Value::Number(n) => Ok(n),
            other => Err(Error::TypeError(format!(
                "expected number, got {}",
                other.type_name()
            ))),
        }
    }
}

impl TryFrom<Value> for f64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<f64, Error> {
        Number::try_from(value).map(Number::as_f64)
    }
}

impl TryFrom<Value> for String {
    type Error = Error;

    fn try_from(value: Value) -> Result<String, Error> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(Error::TypeError(format!(
                "expected string, got {}",
                other.type_name()
            ))),
        }
    }
}

impl TryFrom<Value> for List {
    type Error = Error;

    fn try_from(value: Value) -> Result<List, Error> {
        match value {
            Value::List(items) => Ok(items),
            other => Err(Error::TypeError(format!(
                "expected list, got {}",
                other.type_name()
            ))),
        }
    }
}

impl TryFrom<Value> for Vec<Value> {
    type Error = Error;

    fn try_from(value: Value) -> Result<Vec<Value>, Error> {
        List::try_from(value).map(List::into_vec)
    }
}

/// Helper function for creating symbols
pub fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating Values from anything convertible
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for creating empty lists (nil)
pub fn nil() -> Value {
    Value::List(List::default())
}

/// The reader's representation of a string literal: `(string "text")`
pub fn string_form<S: Into<String>>(text: S) -> Value {
    Value::List(List::new(vec![sym(STRING_FORM), Value::String(text.into())]))
}
