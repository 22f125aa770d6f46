//! The catch point around evaluation: a session owns one global environment,
//! loads the prelude into it and evaluates source text expression by expression.

use std::path::Path;
use std::rc::Rc;

use crate::Error;
use crate::ast::{Value, nil};
use crate::builtinops::Registry;
use crate::evaluator::{Environment, eval};
use crate::reader::{self, ParseConfig, Reader};

/// Standard-library source evaluated by [`Session::standard`]
pub const PRELUDE: &str = include_str!("prelude.lisp");

pub struct Session {
    env: Rc<Environment>,
    config: ParseConfig,
}

impl Session {
    /// A session whose global frame holds exactly the registry's bindings
    pub fn new(registry: &Registry) -> Self {
        Session {
            env: Environment::global(registry),
            config: ParseConfig::default(),
        }
    }

    /// Standard builtins plus the prelude
    pub fn standard() -> Result<Self, Error> {
        let session = Session::new(&Registry::standard());
        session.load(PRELUDE)?;
        Ok(session)
    }

    pub fn with_config(mut self, config: ParseConfig) -> Self {
        self.config = config;
        self
    }

    /// The global frame
    pub fn env(&self) -> &Rc<Environment> {
        &self.env
    }

    /// Parse and evaluate exactly one expression
    pub fn eval_str(&self, source: &str) -> Result<Value, Error> {
        let expr = reader::parse_with_config(source, self.config)?;
        eval(&expr, &self.env)
    }

    /// Evaluate every expression in `source`, stopping at the first error.
    /// Returns the last value, or nil for empty input.
    pub fn load(&self, source: &str) -> Result<Value, Error> {
        let mut last = nil();
        for expr in Reader::new(source, self.config)? {
            last = eval(&expr?, &self.env)?;
        }
        Ok(last)
    }

    /// Evaluate every expression in `source`, collecting one result per expression.
    ///
    /// Evaluation errors are recorded and the session moves on to the next expression.
    /// A parse error is recorded and ends the batch, since the rest of the text cannot
    /// be split into expressions reliably.
    pub fn run(&self, source: &str) -> Vec<Result<Value, Error>> {
        match Reader::new(source, self.config) {
            Ok(reader) => reader
                .map(|expr| expr.and_then(|expr| eval(&expr, &self.env)))
                .collect(),
            Err(err) => vec![Err(err)],
        }
    }

    /// Read a source file and [`load`](Session::load) it
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Value, Error> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| Error::EvalError(format!("cannot read {}: {e}", path.display())))?;
        self.load(&source)
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{sym, val};

    fn session() -> Session {
        Session::standard().unwrap()
    }

    #[test]
    fn test_prelude_functions() {
        let session = session();
        let test_cases = vec![
            ("(empty? '())", val(true)),
            ("(empty? '(1))", val(false)),
            ("(length '(a b c))", val(3)),
            ("(length '())", val(0)),
            ("(reverse '(1 2 3))", val([3, 2, 1])),
            ("(map ++ '(1 2 3))", val([2, 3, 4])),
            ("(map (lambda (x) (* x x)) '(1 2 3))", val([1, 4, 9])),
            ("(map ++ '())", nil()),
            ("(filter (lambda (x) (> x 1)) '(3 1 2 0))", val([3, 2])),
            ("(foldl + 0 '(1 2 3 4))", val(10)),
            ("(foldl (lambda (acc x) (cons x acc)) '() '(1 2))", val([2, 1])),
            ("(last '(1 2 3))", val(3)),
            ("(range 0 5)", val([0, 1, 2, 3, 4])),
            ("(range 3 3)", nil()),
            ("(evalS \"(+ 1 2)\")", val(3)),
            ("(help map)", val("apply f to every element of xs")),
            ("((compose ++ *2) 1)", val(3)),
            ("(map (curry (* 10)) (range 1 4))", val([10, 20, 30])),
        ];

        for (input, expected) in test_cases {
            assert_eq!(session.eval_str(input).unwrap(), expected, "for {input}");
        }
    }

    #[test]
    fn test_prelude_walkers_handle_long_lists() {
        let session = session();
        assert_eq!(session.eval_str("(length (range 0 1000))").unwrap(), val(1000));
        assert_eq!(
            session.eval_str("(last (map ++ (range 0 1000)))").unwrap(),
            val(1000)
        );
    }

    #[test]
    fn test_load_returns_last_value_and_stops_at_first_error() {
        let session = session();
        assert_eq!(
            session.load("(define a 1) (define b (+ a 1)) (list a b)").unwrap(),
            val([1, 2])
        );
        assert_eq!(session.load("; nothing but a comment").unwrap(), nil());

        assert!(session.load("(define c 1) (car c) (define d 2)").is_err());
        assert_eq!(session.eval_str("c").unwrap(), val(1));
        assert!(session.eval_str("d").is_err()); // never reached
    }

    #[test]
    fn test_run_catches_per_expression() {
        let session = session();
        let results = session.run("(define x 1) (undefined) (+ x 1) (1 2)");
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].as_ref().unwrap(), &sym("x"));
        assert!(matches!(results[1], Err(Error::UnboundSymbol(_))));
        assert_eq!(results[2].as_ref().unwrap(), &val(2));
        assert!(matches!(results[3], Err(Error::TypeError(_))));

        // a parse error ends the batch
        let results = session.run("(+ 1 1) ) (+ 2 2)");
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(Error::ParseError(_))));

        let results = session.run("\"unterminated");
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn test_sessions_are_isolated() {
        let first = session();
        let second = session();
        first.eval_str("(define only-here 1)").unwrap();
        assert!(second.eval_str("only-here").is_err());
    }

    #[test]
    fn test_bare_session_has_no_prelude() {
        let session = Session::new(&Registry::standard());
        assert!(session.eval_str("(+ 1 2)").is_ok());
        assert!(matches!(
            session.eval_str("(map ++ '(1))"),
            Err(Error::UnboundSymbol(name)) if name == "map"
        ));
    }

    #[test]
    fn test_config_controls_comments() {
        let session = Session::new(&Registry::standard()).with_config(ParseConfig {
            handle_comments: false,
        });
        assert!(session.eval_str("(+ 1 2) ; trailing").is_err());
    }

    #[test]
    fn test_load_file() {
        let session = session();
        let path = std::env::temp_dir().join(format!("lispy-session-test-{}.lisp", std::process::id()));
        std::fs::write(&path, "(define from-file 41)\n(++ from-file)\n").unwrap();

        assert_eq!(session.load_file(&path).unwrap(), val(42));
        assert_eq!(session.eval_str("from-file").unwrap(), val(41));
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(
            session.load_file(&path),
            Err(Error::EvalError(msg)) if msg.contains("cannot read")
        ));
    }
}
