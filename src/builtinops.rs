//! Builtin operations and the registry that hands them to the evaluator.
//!
//! A [`Registry`] is an immutable name → value table built once with a
//! [`RegistryBuilder`] and passed explicitly to [`Environment::global`]; there is no
//! process-wide default table. Every builtin has a fixed arity taken from its Rust
//! signature (see [`IntoOperation`]), which is what `curry` relies on.
//!
//! ```scheme
//! (+ 1 2)               ; numbers
//! (+ "ab" "cd")         ; string concatenation
//! (cons 1 '(2 3))       ; => (1 2 3)
//! ((compose ++ *2) 1)   ; => 3
//! ```
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** with typed parameters (`Value`, `Number`, `f64`,
//!    `String`, `Vec<Value>`) returning `Result<R, Error>` with `R: Into<Value>`
//! 2. **Register it** in [`Registry::standard`] (or on your own builder)
//! 3. **Add test cases** to the table in this module's tests
//!
//! [`Environment::global`]: crate::evaluator::Environment::global

use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::rc::Rc;
use std::time::Duration;

use crate::Error;
use crate::ast::{Builtin, List, Number, Value, nil};
use crate::evaluator::apply;
use crate::evaluator::intooperation::IntoOperation;
use crate::reader;

/// Immutable table of builtin names and their values
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: BTreeMap<String, Value>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    /// All entries in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The standard builtin table: logic, comparison, arithmetic, lists,
    /// higher-order helpers and host I/O.
    pub fn standard() -> Registry {
        let pwd = std::env::current_dir()
            .map(|dir| dir.display().to_string())
            .unwrap_or_default();

        Registry::builder()
            .constant("t", true)
            .constant("nil", false)
            .constant("pwd", pwd)
            // logic
            .operation("and", builtin_and)
            .operation("or", builtin_or)
            .operation("not", builtin_not)
            .operation("->", builtin_implies)
            // comparison
            .operation("=", builtin_equal)
            .operation("!=", builtin_not_equal)
            .operation("<", builtin_lt)
            .operation("<=", builtin_le)
            .operation(">", builtin_gt)
            .operation(">=", builtin_ge)
            // arithmetic
            .operation("+", builtin_add)
            .operation("-", builtin_sub)
            .operation("*", builtin_mul)
            .operation("/", builtin_div)
            .operation("mod", builtin_mod)
            .operation("++", builtin_increment)
            .operation("*2", builtin_double)
            // lists
            .operation("cons", builtin_cons)
            .operation("head", builtin_head)
            .operation("tail", builtin_tail)
            .operation("append", builtin_append)
            .operation("is-list?", builtin_is_list)
            .operation("atom?", builtin_is_atom)
            // procedures
            .operation("compose", builtin_compose)
            .operation("help", builtin_help)
            // host
            .operation("sleep", builtin_sleep)
            .operation("read", builtin_read)
            .operation("read-with-macro", builtin_read_with_macro)
            .operation("read-file", builtin_read_file)
            .operation("write-file", builtin_write_file)
            .build()
    }
}

/// Collects builtins before freezing them into a [`Registry`]
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entries: BTreeMap<String, Value>,
}

impl RegistryBuilder {
    /// Register a strongly-typed Rust function; later registrations replace earlier ones
    pub fn operation<F, Args, R>(mut self, name: &str, func: F) -> Self
    where
        F: IntoOperation<Args, R>,
    {
        self.entries
            .insert(name.to_owned(), Builtin::from_operation(name, func).into());
        self
    }

    /// Register a function that works on the raw argument vector with an explicit arity
    pub fn raw_operation<F>(mut self, name: &str, arity: usize, func: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, Error> + 'static,
    {
        self.entries
            .insert(name.to_owned(), Builtin::new(name, arity, Rc::new(func)).into());
        self
    }

    /// Bind a name to a plain value
    pub fn constant(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.entries.insert(name.to_owned(), value.into());
        self
    }

    pub fn build(self) -> Registry {
        Registry {
            entries: self.entries,
        }
    }
}

//
// Builtin Function Implementations
//

fn builtin_and(x: Value, y: Value) -> Result<Value, Error> {
    Ok(if x.is_truthy() { y } else { x })
}

fn builtin_or(x: Value, y: Value) -> Result<Value, Error> {
    Ok(if x.is_truthy() { x } else { y })
}

fn builtin_not(x: Value) -> Result<bool, Error> {
    Ok(!x.is_truthy())
}

/// Material implication: true when the premise fails, the conclusion otherwise
fn builtin_implies(premise: Value, conclusion: Value) -> Result<Value, Error> {
    Ok(if premise.is_truthy() {
        conclusion
    } else {
        Value::Bool(true)
    })
}

fn builtin_equal(x: Value, y: Value) -> Result<bool, Error> {
    Ok(x == y)
}

fn builtin_not_equal(x: Value, y: Value) -> Result<bool, Error> {
    Ok(x != y)
}

// Macro to generate ordering comparisons over numbers or strings
macro_rules! ordering_comparison {
    ($name:ident, $op:tt) => {
        fn $name(x: Value, y: Value) -> Result<bool, Error> {
            match (&x, &y) {
                (Value::Number(a), Value::Number(b)) => Ok(a $op b),
                (Value::String(a), Value::String(b)) => Ok(a $op b),
                _ => Err(Error::TypeError(format!(
                    "{} cannot compare {} with {}",
                    stringify!($op),
                    x.type_name(),
                    y.type_name()
                ))),
            }
        }
    };
}

ordering_comparison!(builtin_lt, <);
ordering_comparison!(builtin_le, <=);
ordering_comparison!(builtin_gt, >);
ordering_comparison!(builtin_ge, >=);

/// Numeric addition, or concatenation of two strings or two lists
fn builtin_add(x: Value, y: Value) -> Result<Value, Error> {
    match (x, y) {
        (Value::Number(a), Value::Number(b)) => a.add(b).map(Value::Number),
        (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
        (Value::List(a), Value::List(b)) => {
            let mut items = a.into_vec();
            items.extend_from_slice(&b);
            Ok(Value::List(items.into()))
        }
        (x, y) => Err(Error::TypeError(format!(
            "+ cannot combine {} with {}",
            x.type_name(),
            y.type_name()
        ))),
    }
}

fn builtin_sub(a: Number, b: Number) -> Result<Number, Error> {
    a.sub(b)
}

fn builtin_mul(a: Number, b: Number) -> Result<Number, Error> {
    a.mul(b)
}

fn builtin_div(a: Number, b: Number) -> Result<Number, Error> {
    a.div(b)
}

fn builtin_mod(a: Number, b: Number) -> Result<Number, Error> {
    a.modulo(b)
}

fn builtin_increment(n: Number) -> Result<Number, Error> {
    n.add(Number::Int(1))
}

fn builtin_double(n: Number) -> Result<Number, Error> {
    n.mul(Number::Int(2))
}

fn builtin_cons(x: Value, xs: Vec<Value>) -> Result<Vec<Value>, Error> {
    let mut list = Vec::with_capacity(xs.len() + 1);
    list.push(x);
    list.extend(xs);
    Ok(list)
}

/// First element; the empty list yields the marker string `"err-empty-list"`
fn builtin_head(xs: List) -> Result<Value, Error> {
    Ok(xs
        .first()
        .cloned()
        .unwrap_or_else(|| Value::String("err-empty-list".to_owned())))
}

fn builtin_tail(xs: List) -> Result<List, Error> {
    Ok(xs.tail())
}

/// `(append x xs)` adds `x` at the end of `xs`
fn builtin_append(x: Value, mut xs: Vec<Value>) -> Result<Vec<Value>, Error> {
    xs.push(x);
    Ok(xs)
}

fn builtin_is_list(x: Value) -> Result<bool, Error> {
    Ok(matches!(x, Value::List(_)))
}

fn builtin_is_atom(x: Value) -> Result<bool, Error> {
    Ok(matches!(
        x,
        Value::Number(_) | Value::String(_) | Value::Symbol(_)
    ))
}

/// `((compose f g) x)` is `(f (g x))`
fn builtin_compose(f: Value, g: Value) -> Result<Value, Error> {
    for func in [&f, &g] {
        if func.procedure_arity().is_none() {
            return Err(Error::TypeError(format!(
                "compose expects procedures, got {}",
                func.type_name()
            )));
        }
    }
    let composed = move |x: Value| apply(&f, vec![apply(&g, vec![x])?]);
    Ok(Builtin::from_operation("composed", composed).into())
}

/// A closure's help value, or false when it has none
fn builtin_help(func: Value) -> Result<Value, Error> {
    match &func {
        Value::Closure(closure) => Ok(closure.help().cloned().unwrap_or(Value::Bool(false))),
        _ => Ok(Value::Bool(false)),
    }
}

fn builtin_sleep(seconds: f64) -> Result<Value, Error> {
    let duration = Duration::try_from_secs_f64(seconds)
        .map_err(|_| Error::EvalError(format!("sleep: invalid duration {seconds}")))?;
    std::thread::sleep(duration);
    Ok(nil())
}

/// Show a prompt, read one line from stdin and parse it as an expression
fn builtin_read(prompt: String) -> Result<Value, Error> {
    print!("{prompt}");
    io::stdout()
        .flush()
        .map_err(|e| Error::EvalError(format!("read: {e}")))?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| Error::EvalError(format!("read: {e}")))?;
    reader::parse(&line)
}

/// Like `read`, then hand the parsed expression to `macro`
fn builtin_read_with_macro(prompt: String, expander: Value) -> Result<Value, Error> {
    let expr = builtin_read(prompt)?;
    apply(&expander, vec![expr])
}

fn builtin_read_file(path: String) -> Result<String, Error> {
    std::fs::read_to_string(&path).map_err(|e| Error::EvalError(format!("read-file {path}: {e}")))
}

/// Write `data` to `path`, returning the number of bytes written
fn builtin_write_file(path: String, data: String) -> Result<Value, Error> {
    std::fs::write(&path, &data)
        .map_err(|e| Error::EvalError(format!("write-file {path}: {e}")))?;
    i64::try_from(data.len())
        .map(|n| Value::Number(Number::Int(n)))
        .map_err(|_| Error::EvalError("write-file: size out of range".to_owned()))
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{sym, val};

    /// Micro-helper for success cases
    fn success<T: Into<Value>>(value: T) -> Option<Value> {
        Some(val(value))
    }

    /// Invoke a builtin through the standard registry, as the evaluator would
    fn call_builtin(name: &str, args: &[Value]) -> Result<Value, Error> {
        match Registry::standard().get(name) {
            Some(Value::Builtin(builtin)) => builtin.call(args.to_vec()),
            other => panic!("expected builtin {name}, got {other:?}"),
        }
    }

    /// Macro to create test cases, invoking builtins via the registry.
    macro_rules! test {
        ($name:expr, $args:expr, $expected:expr) => {
            ($name, call_builtin($name, $args), $expected)
        };
    }

    #[test]
    fn test_standard_registry_contents() {
        let registry = Registry::standard();

        assert_eq!(registry.get("t"), Some(&val(true)));
        assert_eq!(registry.get("nil"), Some(&val(false)));
        assert!(matches!(registry.get("pwd"), Some(Value::String(_))));
        assert!(registry.get("unknown").is_none());

        let expected_arities = [
            ("and", 2),
            ("not", 1),
            ("->", 2),
            ("=", 2),
            ("<=", 2),
            ("+", 2),
            ("mod", 2),
            ("++", 1),
            ("*2", 1),
            ("cons", 2),
            ("head", 1),
            ("append", 2),
            ("compose", 2),
            ("help", 1),
            ("sleep", 1),
            ("read", 1),
            ("read-with-macro", 2),
            ("read-file", 1),
            ("write-file", 2),
        ];
        for (name, arity) in expected_arities {
            let value = registry.get(name).unwrap();
            assert_eq!(value.procedure_arity(), Some(arity), "arity of {name}");
        }

        // iteration is in name order
        let names: Vec<&str> = registry.iter().map(|(name, _)| name).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
        assert_eq!(names.len(), registry.len());
    }

    #[test]
    #[expect(clippy::too_many_lines)] // Comprehensive test coverage is intentionally thorough
    fn test_builtin_function_implementations() {
        type TestCase = (&'static str, Result<Value, Error>, Option<Value>);

        let test_cases: Vec<TestCase> = vec![
            // =================================================================
            // LOGIC (operands come back as-is)
            // =================================================================
            test!("and", &[val(true), val(5)], success(5)),
            test!("and", &[val(0), val(5)], success(0)),
            test!("and", &[nil(), val(true)], success(nil())),
            test!("or", &[val(0), val("x")], success("x")),
            test!("or", &[val(3), val("x")], success(3)),
            test!("or", &[val(false), nil()], success(nil())),
            test!("not", &[val(true)], success(false)),
            test!("not", &[val(0)], success(true)),
            test!("not", &[val("")], success(true)),
            test!("not", &[val([1])], success(false)),
            test!("->", &[val(false), val(0)], success(true)),
            test!("->", &[val(true), val(0)], success(0)),
            test!("->", &[val(true), val(true)], success(true)),
            test!("not", &[], None),
            // =================================================================
            // EQUALITY AND ORDERING
            // =================================================================
            test!("=", &[val(1), val(1)], success(true)),
            test!("=", &[val(1), val(1.0)], success(true)),
            test!("=", &[val("a"), val("a")], success(true)),
            test!("=", &[val([1, 2]), val([1, 2])], success(true)),
            test!("=", &[val([1, 2]), val([2, 1])], success(false)),
            test!("=", &[sym("a"), sym("a")], success(true)),
            test!("=", &[sym("a"), val("a")], success(false)),
            test!("=", &[val(1), val("1")], success(false)),
            test!("!=", &[val(1), val(2)], success(true)),
            test!("!=", &[nil(), nil()], success(false)),
            test!("<", &[val(1), val(2)], success(true)),
            test!("<", &[val(2), val(1.5)], success(false)),
            test!("<=", &[val(2), val(2)], success(true)),
            test!(">", &[val(-1), val(-2)], success(true)),
            test!(">=", &[val(1.5), val(2)], success(false)),
            test!("<", &[val("apple"), val("banana")], success(true)),
            test!(">=", &[val("b"), val("a")], success(true)),
            test!("<", &[val(1), val("2")], None),
            test!("<", &[nil(), nil()], None),
            // =================================================================
            // ARITHMETIC
            // =================================================================
            test!("+", &[val(1), val(2)], success(3)),
            test!("+", &[val(1), val(0.5)], success(1.5)),
            test!("+", &[val("ab"), val("cd")], success("abcd")),
            test!("+", &[val([1]), val([2, 3])], success([1, 2, 3])),
            test!("+", &[val(1), val("x")], None),
            test!("+", &[val(i64::MAX), val(1)], None),
            test!("+", &[val(1)], None),
            test!("-", &[val(1), val(10)], success(-9)),
            test!("-", &[val(2.5), val(1)], success(1.5)),
            test!("-", &[val("a"), val(1)], None),
            test!("*", &[val(-2), val(-9)], success(18)),
            test!("*", &[val(i64::MAX), val(2)], None),
            test!("/", &[val(7), val(2)], success(3.5)),
            test!("/", &[val(6), val(3)], success(2.0)),
            test!("/", &[val(1), val(0)], None),
            test!("mod", &[val(7), val(3)], success(1)),
            test!("mod", &[val(-7), val(3)], success(2)),
            test!("mod", &[val(7), val(0)], None),
            test!("++", &[val(41)], success(42)),
            test!("++", &[val(0.5)], success(1.5)),
            test!("*2", &[val(21)], success(42)),
            test!("*2", &[val("x")], None),
            // =================================================================
            // LISTS
            // =================================================================
            test!("cons", &[val(1), val([2, 3])], success([1, 2, 3])),
            test!("cons", &[val([1]), nil()], success(vec![val([1])])),
            test!("cons", &[val(1), val(2)], None),
            test!("head", &[val([1, 2, 3])], success(1)),
            test!("head", &[nil()], success("err-empty-list")),
            test!("head", &[val(1)], None),
            test!("tail", &[val([1, 2, 3])], success([2, 3])),
            test!("tail", &[val([1])], success(nil())),
            test!("tail", &[nil()], success(nil())),
            test!("append", &[val(4), val([1, 2, 3])], success([1, 2, 3, 4])),
            test!("append", &[val(1), nil()], success([1])),
            test!("append", &[val([1]), val(2)], None),
            test!("is-list?", &[nil()], success(true)),
            test!("is-list?", &[val([1, 2])], success(true)),
            test!("is-list?", &[val("abc")], success(false)),
            test!("atom?", &[val(1)], success(true)),
            test!("atom?", &[val("s")], success(true)),
            test!("atom?", &[sym("s")], success(true)),
            test!("atom?", &[nil()], success(false)),
            test!("atom?", &[val(true)], success(false)),
            // =================================================================
            // PROCEDURES
            // =================================================================
            test!("help", &[val(1)], success(false)),
            test!("compose", &[val(1), val(2)], None),
            test!("sleep", &[val(0)], success(nil())),
            test!("sleep", &[val(-1)], None),
            test!("read-file", &[val("/nonexistent/definitely/missing")], None),
        ];

        for (i, (name, actual, expected)) in test_cases.into_iter().enumerate() {
            let test_id = format!("#{} ({name})", i + 1);
            match (&actual, &expected) {
                (Ok(actual), Some(expected)) => {
                    assert_eq!(actual, expected, "{test_id}: value mismatch");
                }
                (Err(_), None) => {}
                _ => panic!("{test_id}: expected {expected:?}, got {actual:?}"),
            }
        }
    }

    #[test]
    fn test_compose_builds_a_unary_builtin() {
        let registry = Registry::standard();
        let inc = registry.get("++").unwrap().clone();
        let double = registry.get("*2").unwrap().clone();

        let composed = call_builtin("compose", &[inc, double]).unwrap();
        assert_eq!(composed.procedure_arity(), Some(1));
        // (++ (*2 1))
        assert_eq!(apply(&composed, vec![val(1)]).unwrap(), val(3));
        assert!(apply(&composed, vec![val("x")]).is_err());
    }

    #[test]
    fn test_custom_registry() {
        fn square(n: Number) -> Result<Number, Error> {
            n.mul(n)
        }

        let registry = Registry::builder()
            .constant("answer", 42)
            .operation("square", square)
            .raw_operation("count-args", 3, |args| Ok(val(args.len() as i64)))
            .build();

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.get("answer"), Some(&val(42)));
        assert!(registry.get("+").is_none());

        let Some(Value::Builtin(sq)) = registry.get("square") else {
            panic!("square should be a builtin");
        };
        assert_eq!(sq.call(vec![val(7)]).unwrap(), val(49));

        let Some(Value::Builtin(count)) = registry.get("count-args") else {
            panic!("count-args should be a builtin");
        };
        assert_eq!(count.arity(), 3);
        assert_eq!(count.call(vec![val(1), val(2), val(3)]).unwrap(), val(3));
        assert!(matches!(
            count.call(vec![]),
            Err(Error::ArityError {
                expected: 3,
                got: 0,
                ..
            })
        ));
    }

    #[test]
    fn test_file_round_trip() {
        let path = std::env::temp_dir().join(format!("lispy-builtin-test-{}.txt", std::process::id()));
        let path_str = path.display().to_string();

        let written = call_builtin("write-file", &[val(path_str.as_str()), val("(+ 1 2)")]).unwrap();
        assert_eq!(written, val(7));
        let contents = call_builtin("read-file", &[val(path_str.as_str())]).unwrap();
        assert_eq!(contents, val("(+ 1 2)"));

        std::fs::remove_file(path).unwrap();
    }
}
