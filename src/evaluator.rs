pub mod environment;
pub mod intooperation;

use std::cell::Cell;
use std::rc::Rc;

use crate::ast::{Builtin, Closure, Value, nil, sym};
use crate::reader;
use crate::{Error, MAX_EVAL_DEPTH};

pub use environment::Environment;

thread_local! {
    /// Nesting depth of the application whose builtin is running. Procedures that a
    /// builtin calls back through [`apply`] continue counting from here.
    static HOST_CALL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Restores the previous host call depth when a builtin returns
struct HostCallGuard(usize);

impl Drop for HostCallGuard {
    fn drop(&mut self) {
        HOST_CALL_DEPTH.set(self.0);
    }
}

fn call_builtin(builtin: &Builtin, args: Vec<Value>, depth: usize) -> Result<Value, Error> {
    let _guard = HostCallGuard(HOST_CALL_DEPTH.replace(depth));
    builtin.call(args)
}

/// Forms recognised by their head symbol before any lookup happens
#[derive(Debug, Clone, Copy, PartialEq)]
enum SpecialForm {
    Quote,
    String,
    Lambda,
    Define,
    Cond,
    If,
    Begin,
    List,
    Curry,
    Let,
    Eval,
    Print,
}

impl SpecialForm {
    fn from_symbol(name: &str) -> Option<Self> {
        Some(match name {
            "quote" => SpecialForm::Quote,
            "string" => SpecialForm::String,
            "lambda" => SpecialForm::Lambda,
            "define" => SpecialForm::Define,
            "cond" => SpecialForm::Cond,
            "if" => SpecialForm::If,
            "begin" => SpecialForm::Begin,
            "list" => SpecialForm::List,
            "curry" => SpecialForm::Curry,
            "let" => SpecialForm::Let,
            "eval" => SpecialForm::Eval,
            "print" => SpecialForm::Print,
            _ => return None,
        })
    }

    fn shape(self) -> &'static str {
        match self {
            SpecialForm::Quote => "(quote expr)",
            SpecialForm::String => "(string text)",
            SpecialForm::Lambda => "(lambda (params...) [help] body)",
            SpecialForm::Define => "(define name expr)",
            SpecialForm::Cond => "(cond (test expr) ...)",
            SpecialForm::If => "(if test then else)",
            SpecialForm::Begin => "(begin expr ...)",
            SpecialForm::List => "(list expr ...)",
            SpecialForm::Curry => "(curry (f args...))",
            SpecialForm::Let => "(let name value body) or (let ((name value) ...) body)",
            SpecialForm::Eval => "(eval expr)",
            SpecialForm::Print => "(print expr)",
        }
    }
}

fn malformed(form: SpecialForm) -> Error {
    Error::EvalError(format!("Malformed special form: expected {}", form.shape()))
}

/// Outcome of one trip through the evaluation loop
enum Step {
    /// Evaluation finished with a value
    Done(Value),
    /// Continue with this expression in the current environment
    Tail(Value),
    /// Continue with this expression in another environment
    TailIn(Value, Rc<Environment>),
}

/// Evaluate an expression (public API)
pub fn eval(expr: &Value, env: &Rc<Environment>) -> Result<Value, Error> {
    eval_with_depth_tracking(expr, env, 0)
}

/// Call a procedure value with already-evaluated arguments.
///
/// Used by builtins that take procedures (e.g. `compose`). When called from inside a
/// builtin, the callee is one level deeper than the application that invoked the
/// builtin, so recursion through host code still meets [`MAX_EVAL_DEPTH`].
pub fn apply(func: &Value, args: Vec<Value>) -> Result<Value, Error> {
    let depth = HOST_CALL_DEPTH.get();
    match func {
        Value::Closure(closure) => {
            let frame = closure_frame(closure, args)?;
            eval_with_depth_tracking(closure.body(), &frame, depth)
        }
        Value::Builtin(builtin) => call_builtin(builtin, args, depth + 1),
        other => Err(not_a_procedure(other)),
    }
}

/// Evaluate with depth tracking. `depth` counts non-tail nesting only: every form in
/// tail position is handled by rewriting `(expr, env)` and looping.
fn eval_with_depth_tracking(
    expr: &Value,
    env: &Rc<Environment>,
    depth: usize,
) -> Result<Value, Error> {
    if depth >= MAX_EVAL_DEPTH {
        return Err(Error::EvalError(format!(
            "Evaluation depth limit exceeded (max: {MAX_EVAL_DEPTH})"
        )));
    }
    match expr {
        Value::List(parts) if parts.is_empty() => return Ok(nil()),
        Value::List(_) => {}
        atom => return eval_atom(atom, env),
    }

    let mut expr = expr.clone();
    let mut env = Rc::clone(env);
    loop {
        let step = match expr {
            Value::List(parts) if parts.is_empty() => Step::Done(nil()),
            Value::List(parts) => eval_form(parts.into_vec(), &env, depth)?,
            atom => Step::Done(eval_atom(&atom, &env)?),
        };
        match step {
            Step::Done(value) => return Ok(value),
            Step::Tail(next) => expr = next,
            Step::TailIn(next, next_env) => {
                expr = next;
                env = next_env;
            }
        }
    }
}

fn eval_atom(expr: &Value, env: &Environment) -> Result<Value, Error> {
    match expr {
        Value::Symbol(name) => env.lookup(name),
        // Literals, plus procedure values spliced into code by `curry` and `eval`
        other => Ok(other.clone()),
    }
}

/// Dispatch a non-empty list: special form by head symbol, application otherwise
fn eval_form(parts: Vec<Value>, env: &Rc<Environment>, depth: usize) -> Result<Step, Error> {
    let form = match parts.first() {
        Some(Value::Symbol(head)) => SpecialForm::from_symbol(head),
        _ => None,
    };
    match form {
        Some(SpecialForm::Quote) => eval_quote(parts),
        Some(SpecialForm::String) => eval_string(parts),
        Some(SpecialForm::Lambda) => eval_lambda(&parts, env, depth),
        Some(SpecialForm::Define) => eval_define(&parts, env, depth),
        Some(SpecialForm::Cond) => eval_cond(parts, env, depth),
        Some(SpecialForm::If) => eval_if(parts, env, depth),
        Some(SpecialForm::Begin) => eval_begin(parts, env, depth),
        Some(SpecialForm::List) => eval_list(&parts, env, depth),
        Some(SpecialForm::Curry) => eval_curry(parts, env, depth),
        Some(SpecialForm::Let) => eval_let(&parts, env, depth),
        Some(SpecialForm::Eval) => eval_eval(&parts, env, depth),
        Some(SpecialForm::Print) => eval_print(&parts, env, depth),
        None => eval_application(&parts, env, depth),
    }
}

/// Evaluate quote special form
fn eval_quote(parts: Vec<Value>) -> Result<Step, Error> {
    match <[Value; 2]>::try_from(parts) {
        Ok([_, quoted]) => Ok(Step::Done(quoted)),
        Err(_) => Err(malformed(SpecialForm::Quote)),
    }
}

/// Evaluate the reader's string-literal form
fn eval_string(parts: Vec<Value>) -> Result<Step, Error> {
    match <[Value; 2]>::try_from(parts) {
        Ok([_, Value::String(text) | Value::Symbol(text)]) => Ok(Step::Done(Value::String(text))),
        _ => Err(malformed(SpecialForm::String)),
    }
}

fn parse_params(params: &Value) -> Result<Vec<String>, Error> {
    let Value::List(items) = params else {
        return Err(Error::EvalError(format!(
            "Lambda parameters must be a list, got {params}"
        )));
    };
    let mut names: Vec<String> = Vec::with_capacity(items.len());
    for item in items.iter() {
        match item {
            Value::Symbol(name) if names.contains(name) => {
                return Err(Error::EvalError(format!("Duplicate parameter name: {name}")));
            }
            Value::Symbol(name) => names.push(name.clone()),
            other => {
                return Err(Error::EvalError(format!(
                    "Lambda parameters must be symbols, got {other}"
                )));
            }
        }
    }
    Ok(names)
}

/// Evaluate lambda special form
fn eval_lambda(parts: &[Value], env: &Rc<Environment>, depth: usize) -> Result<Step, Error> {
    let (params, help, body) = match parts {
        [_, params, body] => (params, None, body),
        [_, params, help, body] => (params, Some(help), body),
        _ => return Err(malformed(SpecialForm::Lambda)),
    };
    let params = parse_params(params)?;
    let help = help
        .map(|help| eval_with_depth_tracking(help, env, depth + 1))
        .transpose()?;

    let closure = Closure::new(params, body.clone(), Rc::clone(env), help);
    Ok(Step::Done(closure.into()))
}

/// Evaluate define special form: binds in the root frame and yields the name
fn eval_define(parts: &[Value], env: &Rc<Environment>, depth: usize) -> Result<Step, Error> {
    match parts {
        [_, Value::Symbol(name), value_expr] => {
            let value = eval_with_depth_tracking(value_expr, env, depth + 1)?;
            env.bind_global(name.as_str(), value);
            Ok(Step::Done(sym(name)))
        }
        [_, other, _] => Err(Error::EvalError(format!(
            "define requires a symbol name, got {other}"
        ))),
        _ => Err(malformed(SpecialForm::Define)),
    }
}

/// Evaluate cond special form.
///
/// When no test holds, the last clause's test is evaluated once more: falsy is an
/// error, truthy (reachable only through side effects) yields `Unspecified`.
fn eval_cond(parts: Vec<Value>, env: &Rc<Environment>, depth: usize) -> Result<Step, Error> {
    let mut clauses = Vec::with_capacity(parts.len().saturating_sub(1));
    for clause in parts.into_iter().skip(1) {
        let Value::List(pair) = clause else {
            return Err(malformed(SpecialForm::Cond));
        };
        let pair =
            <[Value; 2]>::try_from(pair.into_vec()).map_err(|_| malformed(SpecialForm::Cond))?;
        clauses.push(pair);
    }
    let Some([fallback_test, _]) = clauses.last() else {
        return Err(malformed(SpecialForm::Cond));
    };
    let fallback_test = fallback_test.clone();

    for [test, expr] in clauses {
        if eval_with_depth_tracking(&test, env, depth + 1)?.is_truthy() {
            return Ok(Step::Tail(expr));
        }
    }

    if eval_with_depth_tracking(&fallback_test, env, depth + 1)?.is_truthy() {
        Ok(Step::Done(Value::Unspecified))
    } else {
        Err(Error::EvalError(format!(
            "cond: no clause matched (last test: {fallback_test})"
        )))
    }
}

/// Evaluate if special form
fn eval_if(parts: Vec<Value>, env: &Rc<Environment>, depth: usize) -> Result<Step, Error> {
    match <[Value; 4]>::try_from(parts) {
        Ok([_, condition, then_expr, else_expr]) => {
            let branch = if eval_with_depth_tracking(&condition, env, depth + 1)?.is_truthy() {
                then_expr
            } else {
                else_expr
            };
            Ok(Step::Tail(branch))
        }
        Err(_) => Err(malformed(SpecialForm::If)),
    }
}

fn eval_begin(mut parts: Vec<Value>, env: &Rc<Environment>, depth: usize) -> Result<Step, Error> {
    match parts.pop() {
        Some(last) if !parts.is_empty() => {
            for expr in &parts[1..] {
                eval_with_depth_tracking(expr, env, depth + 1)?;
            }
            Ok(Step::Tail(last))
        }
        _ => Err(malformed(SpecialForm::Begin)),
    }
}

fn eval_list(parts: &[Value], env: &Rc<Environment>, depth: usize) -> Result<Step, Error> {
    let values = eval_args(&parts[1..], env, depth)?;
    Ok(Step::Done(Value::List(values.into())))
}

/// Evaluate curry special form.
///
/// `(curry (f a1 .. ak))` builds `(lambda (p1 .. pn) (f a1 .. ak p1 .. pn))` where n is
/// the arity of `f` minus k. The procedure value itself is spliced into the body so
/// `f` is evaluated once; the fixed arguments are evaluated at each call.
fn eval_curry(parts: Vec<Value>, env: &Rc<Environment>, depth: usize) -> Result<Step, Error> {
    let call = match <[Value; 2]>::try_from(parts) {
        Ok([_, Value::List(call)]) => call,
        _ => return Err(malformed(SpecialForm::Curry)),
    };
    let [func_expr, fixed_args @ ..] = call.as_slice() else {
        return Err(malformed(SpecialForm::Curry));
    };

    let func = eval_with_depth_tracking(func_expr, env, depth + 1)?;
    let Some(arity) = func.procedure_arity() else {
        return Err(Error::TypeError(format!(
            "curry expects a procedure, got {}",
            func.type_name()
        )));
    };
    if fixed_args.len() > arity {
        return Err(Error::arity_error_with_expr(
            arity,
            fixed_args.len(),
            format!("(curry {})", Value::List(call.clone())),
        ));
    }

    // Reader symbols never contain spaces, so these names cannot capture user variables
    let params: Vec<String> = (0..arity - fixed_args.len())
        .map(|i| format!("curried arg {i}"))
        .collect();
    let body = Value::List(
        std::iter::once(func)
            .chain(fixed_args.iter().cloned())
            .chain(params.iter().map(sym))
            .collect(),
    );
    Ok(Step::Done(
        Closure::new(params, body, Rc::clone(env), None).into(),
    ))
}

/// Evaluate one `let` binding into `frame`. A closure value also gets bound inside
/// its own captured frame, which is what lets it call itself by name.
fn bind_let(
    frame: &Rc<Environment>,
    name: &str,
    value_expr: &Value,
    depth: usize,
) -> Result<(), Error> {
    let value = eval_with_depth_tracking(value_expr, frame, depth + 1)?;
    if let Value::Closure(closure) = &value {
        closure.env().bind_local(name, value.clone());
    }
    frame.bind_local(name, value);
    Ok(())
}

/// Evaluate let special form (single binding or binding list)
fn eval_let(parts: &[Value], env: &Rc<Environment>, depth: usize) -> Result<Step, Error> {
    let frame = Environment::new(Some(Rc::clone(env)));
    match parts {
        [_, Value::Symbol(name), value_expr, body] => {
            bind_let(&frame, name, value_expr, depth)?;
            Ok(Step::TailIn(body.clone(), frame))
        }
        [_, Value::List(bindings), body] => {
            for binding in bindings.iter() {
                match binding {
                    Value::List(pair) => match pair.as_slice() {
                        [Value::Symbol(name), value_expr] => {
                            bind_let(&frame, name, value_expr, depth)?;
                        }
                        _ => return Err(malformed(SpecialForm::Let)),
                    },
                    _ => return Err(malformed(SpecialForm::Let)),
                }
            }
            Ok(Step::TailIn(body.clone(), frame))
        }
        _ => Err(malformed(SpecialForm::Let)),
    }
}

/// Evaluate eval special form: a string result is read as source first
fn eval_eval(parts: &[Value], env: &Rc<Environment>, depth: usize) -> Result<Step, Error> {
    let [_, expr] = parts else {
        return Err(malformed(SpecialForm::Eval));
    };
    match eval_with_depth_tracking(expr, env, depth + 1)? {
        Value::String(source) => Ok(Step::Tail(reader::parse(&source)?)),
        code => Ok(Step::Tail(code)),
    }
}

fn eval_print(parts: &[Value], env: &Rc<Environment>, depth: usize) -> Result<Step, Error> {
    let [_, expr] = parts else {
        return Err(malformed(SpecialForm::Print));
    };
    let value = eval_with_depth_tracking(expr, env, depth + 1)?;
    match &value {
        Value::String(text) => println!("{text}"),
        other => println!("{other}"),
    }
    Ok(Step::Done(value))
}

/// Helper function to evaluate a list of argument expressions with depth tracking
fn eval_args(args: &[Value], env: &Rc<Environment>, depth: usize) -> Result<Vec<Value>, Error> {
    args.iter()
        .map(|arg| eval_with_depth_tracking(arg, env, depth + 1))
        .collect()
}

/// Evaluate a procedure application.
///
/// Every element is evaluated left to right. Closure bodies continue on the loop in a
/// fresh frame; builtins are called directly.
fn eval_application(parts: &[Value], env: &Rc<Environment>, depth: usize) -> Result<Step, Error> {
    let [func_expr, arg_exprs @ ..] = parts else {
        return Ok(Step::Done(nil()));
    };
    let func = eval_with_depth_tracking(func_expr, env, depth + 1)?;
    let args = eval_args(arg_exprs, env, depth)?;

    match func {
        Value::Closure(closure) => {
            let frame = closure_frame(&closure, args)?;
            Ok(Step::TailIn(closure.body().clone(), frame))
        }
        Value::Builtin(builtin) => call_builtin(&builtin, args, depth + 1).map(Step::Done),
        other => Err(not_a_procedure(&other)),
    }
}

/// Bind arguments for a closure call, naming the closure in arity errors
fn closure_frame(closure: &Closure, args: Vec<Value>) -> Result<Rc<Environment>, Error> {
    closure.call_frame(args).map_err(|err| match err {
        Error::ArityError {
            expected,
            got,
            expression: None,
        } => Error::arity_error_with_expr(
            expected,
            got,
            format!("(lambda ({}) {})", closure.params().join(" "), closure.body()),
        ),
        other => other,
    })
}

fn not_a_procedure(value: &Value) -> Error {
    Error::TypeError(format!("Cannot apply non-procedure: {value}"))
}
