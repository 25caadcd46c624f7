//! Interactive read-eval-print loop for uScheme and Impcore.
//!
//! ```text
//! cargo run --example repl                  # uScheme
//! cargo run --example repl -- -impcore      # Impcore
//! cargo run --example repl -- lib.scm       # run files, then go interactive
//! ```
//!
//! Set `RUST_LOG=uscheme=debug` to see definitions, `use` and recoveries.

use std::panic;
use std::path::Path;
use std::process;

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use uscheme::evaluator;
use uscheme::impcore;
use uscheme::recovery::{ErrorFormat, STANDARD_INPUT};
use uscheme::scheme::needs_more_input;
use uscheme::streams::Streams;
use uscheme::toplevel::{Echo, Language, Session, SessionConfig};

/// Listing for the `:env` command
trait ShowEnv {
    fn show_env(&self);
}

impl ShowEnv for evaluator::Interpreter {
    fn show_env(&self) {
        let bindings = self.globals().bindings();
        let (primitives, user_defined): (Vec<_>, Vec<_>) = bindings
            .into_iter()
            .partition(|(_, value)| matches!(value, uscheme::value::Value::Primitive(_)));

        println!("Primitives ({}):", primitives.len());
        for chunk in primitives.chunks(6) {
            let names: Vec<_> = chunk.iter().map(|(name, _)| format!("{name:<10}")).collect();
            println!("  {}", names.join(" ").trim_end());
        }
        if !user_defined.is_empty() {
            println!("User-defined ({}):", user_defined.len());
            for (name, value) in user_defined {
                println!("  {name} = {value}");
            }
        }
    }
}

impl ShowEnv for impcore::Interpreter {
    fn show_env(&self) {
        let globals = self.global_bindings();
        if globals.is_empty() {
            println!("No global variables.");
        } else {
            println!("Globals ({}):", globals.len());
            for (name, value) in globals {
                println!("  {name} = {value}");
            }
        }
        let functions = self.function_names();
        if !functions.is_empty() {
            let names: Vec<_> = functions.iter().map(|name| name.to_string()).collect();
            println!("Functions: {}", names.join(" "));
        }
    }
}

fn main() {
    init_tracing();

    let result = panic::catch_unwind(|| {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let use_impcore = args.iter().any(|arg| arg == "-impcore");
        let files: Vec<&str> = args
            .iter()
            .map(String::as_str)
            .filter(|arg| *arg != "-impcore")
            .collect();

        let config = SessionConfig {
            echo: Echo::On,
            error_format: ErrorFormat::WithoutLocations,
        };
        if use_impcore {
            let interp = impcore::Interpreter::new(Streams::stdio());
            run(Session::new(interp, config), &files, "impcore")
        } else {
            let interp = evaluator::Interpreter::new(Streams::stdio());
            run(Session::new(interp, config), &files, "uscheme")
        }
    });

    match result {
        Ok(code) => process::exit(code),
        Err(panic_info) => {
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
}

/// Only installs a subscriber when RUST_LOG is set
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .with(EnvFilter::from_default_env())
            .init();
    }
}

/// Run the named files, then read from the terminal. Returns the exit code.
fn run<L: Language + ShowEnv>(mut session: Session<L>, files: &[&str], language: &str) -> i32 {
    for file in files {
        if let Err(err) = session.run_file(Path::new(file)) {
            eprintln!("{err}");
            return 1;
        }
    }

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("Could not initialize REPL: {err}");
            return 1;
        }
    };

    println!("{language} interpreter. Type :help for commands, Ctrl+D to exit.");
    let mut buffer = String::new();
    loop {
        let prompt = if buffer.is_empty() { "-> " } else { "   " };
        match rl.readline(prompt) {
            Ok(line) => {
                if buffer.is_empty() {
                    match line.trim() {
                        "" => continue,
                        ":help" => {
                            print_help();
                            continue;
                        }
                        ":env" => {
                            session.language().show_env();
                            continue;
                        }
                        ":quit" | ":exit" => break,
                        _ => {}
                    }
                }

                buffer.push_str(&line);
                buffer.push('\n');
                if needs_more_input(&buffer) {
                    continue;
                }
                let _ = rl.add_history_entry(buffer.trim_end());
                session.run_source(STANDARD_INPUT, &buffer);
                buffer.clear();
            }
            // Ctrl+C abandons a partial datum
            Err(ReadlineError::Interrupted) if !buffer.is_empty() => buffer.clear(),
            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => break,
            Err(err) => {
                eprintln!("Error: {err:?}");
                return 1;
            }
        }
    }
    0
}

fn print_help() {
    println!("Commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show global bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  Ctrl+D     - Exit the interpreter");
    println!();
    println!("Top-level forms:");
    println!("  (val x e)  (define f (x ...) e)  (use file)  e");
    println!("  (check-expect e e)  (check-assert e)  (check-error e)");
    println!();
    println!("Set &trace to a positive count to trace that many calls:");
    println!("  (val &trace 5)");
}
