use ez_scheme::ast::Value;
use ez_scheme::evaluator::Environment;
use ez_scheme::scheme::parse_datum;
use ez_scheme::trace::WriterTracer;
use ez_scheme::{Error, Interpreter};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::rc::Rc;
use std::{env, fs, io, panic, process};

fn main() {
    let result = panic::catch_unwind(|| {
        run_repl();
    });

    if let Err(panic_info) = result {
        eprintln!("The REPL encountered an unexpected error and must exit.");

        if let Some(msg) = panic_info.downcast_ref::<&str>() {
            eprintln!("Error: {msg}");
        } else if let Some(msg) = panic_info.downcast_ref::<String>() {
            eprintln!("Error: {msg}");
        } else {
            eprintln!("Error: Unknown panic occurred");
        }

        process::exit(1);
    }
}

fn run_repl() {
    let mut interp = Interpreter::new();

    // An optional program to load before the prompt appears
    if let Some(path) = env::args().nth(1) {
        match fs::read_to_string(&path) {
            Ok(source) => {
                if let Err(e) = interp.interpret_code(&source) {
                    println!("Error: {e}");
                }
            }
            Err(e) => {
                eprintln!("Could not read {path}: {e}");
                process::exit(1);
            }
        }
    }

    println!("ez-scheme interpreter");
    println!("Enter one expression per line, like: (+ 1 2)");
    println!("Type :help for more commands, or quit to exit.");
    println!();

    let mut rl = DefaultEditor::new().expect("Could not initialize REPL");
    let mut tracing = false;

    loop {
        match rl.readline("[ez] >> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                match line {
                    "quit" => break,
                    ":help" => {
                        print_help();
                        continue;
                    }
                    ":env" => {
                        print_environment(interp.global_env());
                        continue;
                    }
                    ":trace" => {
                        tracing = !tracing;
                        if tracing {
                            interp.set_tracer(Rc::new(WriterTracer::new(io::stderr())));
                            println!("Tracing enabled (on stderr)");
                        } else {
                            interp.clear_tracer();
                            println!("Tracing disabled");
                        }
                        continue;
                    }
                    _ => {}
                }

                let result = parse_datum(line).and_then(|expr| interp.interpret(&expr));
                print_result(result);
            }

            Err(ReadlineError::Eof | ReadlineError::Interrupted) => break,
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

fn print_result(result: Result<Value, Error>) {
    match result {
        // Forms like define have no value worth showing
        Ok(Value::Nil) => {}
        Ok(Value::Closure(_)) => println!(": <procedure object>"),
        Ok(value) => println!(": {value}"),
        Err(e) => println!("Error: {e}"),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  :help   - Show this help message");
    println!("  :env    - Show current environment bindings");
    println!("  :trace  - Toggle evaluation tracing on stderr");
    println!("  quit    - Exit the interpreter");
    println!();
    println!("Examples:");
    println!("  (define (sq x) (* x x))");
    println!("  (sq 12)");
    println!("  (let ((p (cons 1 2))) (set-car! p 9) p)");
    println!("  (cond ((< 1 0) 'neg) (else 'pos))");
    println!();
}

fn print_environment(env: &Environment) {
    let bindings = env.get_all_bindings();

    // Separate built-in procedures from user-defined values
    let mut builtins = Vec::new();
    let mut user_defined = Vec::new();

    for (name, value) in bindings {
        match value {
            Value::Builtin { .. } => builtins.push(name),
            _ => user_defined.push((name, value)),
        }
    }

    if !builtins.is_empty() {
        println!("Builtin procedures ({}):", builtins.len());
        // Print in columns for readability
        for row in builtins.chunks(4) {
            let row: Vec<String> = row.iter().map(|name| format!("  {name:<15}")).collect();
            println!("{}", row.concat());
        }
        println!();
    }

    if user_defined.is_empty() {
        println!("No user-defined values.");
    } else {
        println!("User-defined values ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {value}");
        }
    }
}
