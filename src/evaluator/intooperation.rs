use std::rc::Rc;

use crate::Error;
use crate::ast::{List, Number, Value};

// NOTE: This module is the adapter layer that turns strongly-typed Rust
// functions into the erased `OperationFn` stored in `Builtin` values.
// The arity of an adapted function is the number of its Rust parameters,
// which is how every builtin declares a fixed arity without reflection.

/// Canonical erased builtin function type used by the evaluator.
///
/// Builtins receive ownership of their argument vector, enabling
/// implementations that consume arguments without cloning.
pub type OperationFn = dyn Fn(Vec<Value>) -> Result<Value, Error>;

/// Turns a single evaluated argument into a strongly-typed parameter.
pub trait FromParam: Sized {
    fn from_arg(value: Value) -> Result<Self, Error>;
}

impl FromParam for Value {
    fn from_arg(value: Value) -> Result<Self, Error> {
        Ok(value)
    }
}

macro_rules! impl_from_param_via_try_from {
    ($($t:ty),+) => {
        $(
            impl FromParam for $t {
                fn from_arg(value: Value) -> Result<Self, Error> {
                    <$t>::try_from(value)
                }
            }
        )+
    };
}

// Conversions live next to `Value` in ast.rs; adding a `TryFrom<Value>` impl
// there plus an entry here makes a new parameter type available.
impl_from_param_via_try_from!(Number, f64, String, List, Vec<Value>);

/// Convert a strongly-typed Rust function or closure into the erased
/// [`OperationFn`], parameterized by an argument tuple type.
///
/// Functions must return `Result<R, Error>` where `R: Into<Value>`.
pub trait IntoOperation<Args, R> {
    /// Number of arguments the adapted function accepts
    const ARITY: usize;

    fn into_operation(self) -> Rc<OperationFn>;
}

/// Implements `IntoOperation` for functions of one fixed arity.
///
/// The owned argument vector is converted into an array of exactly
/// `$arity` slots (anything else is an arity error), then each slot is
/// converted with `FromParam` before the function is invoked.
macro_rules! impl_into_operation_for_arity {
    ($arity:expr $(, $v:ident : $A:ident )* ) => {
        impl<F, R, $( $A, )*> IntoOperation<( $( $A, )* ), R> for F
        where
            F: Fn( $( $A ),* ) -> Result<R, Error> + 'static,
            R: Into<Value> + 'static,
            $( $A: FromParam + 'static, )*
        {
            const ARITY: usize = $arity;

            fn into_operation(self) -> Rc<OperationFn> {
                Rc::new(move |args: Vec<Value>| {
                    match <[Value; $arity]>::try_from(args) {
                        Ok([ $( $v ),* ]) => {
                            $(
                                let $v = <$A as FromParam>::from_arg($v)?;
                            )*
                            (self)( $( $v ),* ).map(Into::into)
                        }
                        Err(args) => Err(Error::arity_error($arity, args.len())),
                    }
                })
            }
        }
    };
}

impl_into_operation_for_arity!(0);
impl_into_operation_for_arity!(1, v0: A1);
impl_into_operation_for_arity!(2, v0: A1, v1: A2);
impl_into_operation_for_arity!(3, v0: A1, v1: A2, v2: A3);
impl_into_operation_for_arity!(4, v0: A1, v1: A2, v2: A3, v3: A4);

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{nil, val};

    fn erase<F, Args, R>(func: F) -> (usize, Rc<OperationFn>)
    where
        F: IntoOperation<Args, R>,
    {
        (<F as IntoOperation<Args, R>>::ARITY, func.into_operation())
    }

    #[test]
    fn test_arity_comes_from_signature() {
        fn zero() -> Result<i64, Error> {
            Ok(7)
        }
        fn one(n: Number) -> Result<Number, Error> {
            Ok(n)
        }
        fn three(a: Value, _b: Value, _c: Value) -> Result<Value, Error> {
            Ok(a)
        }

        let (arity, op) = erase(zero);
        assert_eq!(arity, 0);
        assert_eq!(op(vec![]).unwrap(), val(7));

        let (arity, op) = erase(one);
        assert_eq!(arity, 1);
        assert_eq!(op(vec![val(2.5)]).unwrap(), val(2.5));

        let (arity, op) = erase(three);
        assert_eq!(arity, 3);
        assert_eq!(op(vec![val(1), val(2), val(3)]).unwrap(), val(1));
    }

    #[test]
    fn test_wrong_argument_count_is_arity_error() {
        fn pair(a: Number, b: Number) -> Result<Number, Error> {
            a.add(b)
        }

        let (_, op) = erase(pair);
        match op(vec![val(1)]) {
            Err(Error::ArityError { expected, got, .. }) => {
                assert_eq!((expected, got), (2, 1));
            }
            other => panic!("expected ArityError, got {other:?}"),
        }
    }

    #[test]
    fn test_parameter_conversion_errors() {
        fn takes_string(s: String) -> Result<i64, Error> {
            Ok(s.chars().count() as i64)
        }
        fn takes_list(items: Vec<Value>) -> Result<bool, Error> {
            Ok(items.is_empty())
        }

        let (_, op) = erase(takes_string);
        assert_eq!(op(vec![val("abc")]).unwrap(), val(3));
        assert!(matches!(op(vec![val(3)]), Err(Error::TypeError(_))));

        let (_, op) = erase(takes_list);
        assert_eq!(op(vec![nil()]).unwrap(), val(true));
        assert!(matches!(op(vec![val("x")]), Err(Error::TypeError(_))));
    }

    #[test]
    fn test_closures_can_capture_values() {
        let offset = Number::Int(10);
        let (arity, op) = erase(move |n: Number| n.add(offset));
        assert_eq!(arity, 1);
        assert_eq!(op(vec![val(5)]).unwrap(), val(15));
    }
}
