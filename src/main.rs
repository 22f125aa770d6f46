use std::process;

use lispy::Session;
use lispy::ast::Value;
use lispy::evaluator::Environment;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

fn main() {
    let session = match Session::standard() {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Failed to load the prelude: {e}");
            process::exit(1);
        }
    };

    // Source files given on the command line are loaded before the prompt starts
    let files: Vec<String> = std::env::args().skip(1).collect();
    for path in &files {
        if let Err(e) = session.load_file(path) {
            eprintln!("Error in {path}: {e}");
            process::exit(1);
        }
    }

    if let Err(e) = run_repl(&session) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run_repl(session: &Session) -> Result<(), ReadlineError> {
    println!("Lispy interpreter");
    println!("Enter S-expressions like: (+ 1 2)");
    println!("Type :help for more commands, q or Ctrl+D to exit.");
    println!();

    let mut rl = DefaultEditor::new()?;

    loop {
        match rl.readline("λ ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                // Add the line to history
                let _ = rl.add_history_entry(line);

                match line {
                    ":help" => {
                        print_help();
                        continue;
                    }
                    ":env" => {
                        print_environment(session.env());
                        continue;
                    }
                    "q" | ":quit" | ":exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    _ => {}
                }

                // Each expression on the line is evaluated on its own; errors don't end the session
                for result in session.run(line) {
                    match result {
                        Ok(value) => println!("{value}"),
                        Err(e) => println!("Error: {e}"),
                    }
                }
            }

            Err(ReadlineError::Eof | ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

fn print_help() {
    println!("Commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current environment bindings");
    println!("  q, :quit   - Exit the interpreter");
    println!("  Ctrl+D     - Exit the interpreter");
    println!();
    println!("Special forms:");
    println!("  quote ('x), string, lambda, define, cond, if, begin, list,");
    println!("  curry, let, eval, print");
    println!();
    println!("Examples:");
    println!("  (define square (lambda (x) \"squares x\" (* x x)))");
    println!("  (help square)");
    println!("  (map (curry (+ 1)) '(1 2 3))");
    println!("  (let fact (lambda (n acc) (if (< n 2) acc (fact (- n 1) (* n acc)))) (fact 10 1))");
    println!();
}

fn print_environment(env: &Environment) {
    let bindings = env.get_all_bindings();

    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    println!("Environment bindings ({} total):", bindings.len());
    println!();

    // Separate built-in functions from user-defined values
    let mut builtins = Vec::new();
    let mut user_defined = Vec::new();

    for (name, value) in bindings {
        match value {
            Value::Builtin(_) => builtins.push(name),
            _ => user_defined.push((name, value)),
        }
    }

    if !builtins.is_empty() {
        println!("Built-in functions ({}):", builtins.len());
        for row in builtins.chunks(4) {
            let line: String = row.iter().map(|name| format!("  {name:<15}")).collect();
            println!("{line}");
        }
        println!();
    }

    if !user_defined.is_empty() {
        println!("Other values ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {value}");
        }
    }
}
