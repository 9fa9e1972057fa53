use anyhow::{Context, Result};
use clap::{Parser as ClapParser, ValueEnum};
use lox_core::diagnostics::{self, Diagnostic, Reporter};
use lox_core::printer::print_program;
use lox_core::scanner::Scanner;
use lox_lang::config::{RuntimeConfig, DEFAULT_MAX_CALL_DEPTH};
use lox_lang::{Lox, Status};
use rustyline::DefaultEditor;
use std::fs;

#[derive(ClapParser)]
#[command(name = "lox")]
#[command(about = "A tree-walking interpreter for the Lox language")]
struct Cli {
    /// Script file to run (omit for REPL)
    script: Option<String>,

    /// What to do with the source
    #[arg(long, value_enum, default_value_t = Mode::Eval)]
    mode: Mode,

    /// Deepest chain of nested calls before a stack overflow is reported
    #[arg(long, default_value_t = DEFAULT_MAX_CALL_DEPTH)]
    max_call_depth: usize,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Print the token stream
    Tokens,
    /// Print the syntax tree
    Ast,
    /// Run the program
    Eval,
}

// Renders each diagnostic against the source it came from.
struct StderrReporter<'a> {
    source: &'a str,
}

impl Reporter for StderrReporter<'_> {
    fn report(&mut self, diagnostic: &Diagnostic) {
        eprint!("{}", diagnostics::render(self.source, diagnostic));
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // Only initialize if RUST_LOG is set
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .with(EnvFilter::from_default_env())
            .init();
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let runtime_config = RuntimeConfig {
        max_call_depth: cli.max_call_depth,
    };
    let mut lox = Lox::new(runtime_config);

    match cli.script {
        None => run_prompt(&mut lox, cli.mode)?,
        Some(path) => {
            let status = run_file(&path, &mut lox, cli.mode)?;
            if status != Status::Ok {
                std::process::exit(status.exit_code());
            }
        }
    }

    Ok(())
}

fn run_prompt(lox: &mut Lox, mut mode: Mode) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    let mut buffer = String::new();

    let history_path = dirs::home_dir().map(|p| p.join(".lox_history"));
    if let Some(ref path) = history_path {
        let _ = rl.load_history(path);
    }

    loop {
        let prompt = if buffer.is_empty() { "> " } else { "| " };

        match rl.readline(prompt) {
            Ok(line) => {
                if buffer.is_empty() && line.trim_start().starts_with(':') {
                    let _ = rl.add_history_entry(line.trim());
                    match line.trim() {
                        ":tokens" => mode = Mode::Tokens,
                        ":ast" => mode = Mode::Ast,
                        ":eval" => mode = Mode::Eval,
                        ":exit" => break,
                        other => eprintln!("Unknown directive '{}'", other),
                    }
                    continue;
                }

                buffer.push_str(&line);
                buffer.push('\n');

                if is_complete(&buffer) {
                    if !buffer.trim().is_empty() {
                        let _ = rl.add_history_entry(buffer.trim());
                        // errors were already reported; the session carries on
                        match mode {
                            Mode::Eval => {
                                let mut reporter = StderrReporter { source: &buffer };
                                lox.run_prompt_line(&buffer, &mut reporter);
                            }
                            _ => {
                                run(&buffer, lox, mode);
                            }
                        }
                    }
                    buffer.clear();
                }
            }
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(rustyline::error::ReadlineError::Interrupted) => {
                buffer.clear();
                println!("^C");
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        }
    }

    if let Some(ref path) = history_path {
        let _ = rl.save_history(path);
    }

    Ok(())
}

// Input is complete once every brace and paren is closed and no string or
// block comment is left open.
fn is_complete(code: &str) -> bool {
    let mut depth = 0;
    let mut comment_depth = 0;
    let mut in_string = false;
    let mut iter = code.chars().peekable();

    while let Some(c) = iter.next() {
        if in_string {
            if c == '"' {
                in_string = false;
            }
            continue;
        }

        if comment_depth > 0 {
            if c == '*' && iter.peek() == Some(&'/') {
                iter.next();
                comment_depth -= 1;
            } else if c == '/' && iter.peek() == Some(&'*') {
                iter.next();
                comment_depth += 1;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '/' => match iter.peek() {
                Some('/') => {
                    while let Some(&next) = iter.peek() {
                        if next == '\n' {
                            break;
                        }
                        iter.next();
                    }
                }
                Some('*') => {
                    iter.next();
                    comment_depth += 1;
                }
                _ => {}
            },
            '{' | '(' => depth += 1,
            '}' | ')' => depth -= 1,
            _ => {}
        }
    }

    depth <= 0 && !in_string && comment_depth == 0
}

fn run_file(path: &str, lox: &mut Lox, mode: Mode) -> Result<Status> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("could not read script '{}'", path))?;
    Ok(run(&contents, lox, mode))
}

fn run(source: &str, lox: &mut Lox, mode: Mode) -> Status {
    let mut reporter = StderrReporter { source };

    match mode {
        Mode::Tokens => {
            let result = Scanner::new(source).scan_tokens();
            for token in &result.tokens {
                println!("{}", token);
            }
            for error in &result.errors {
                reporter.report(&Diagnostic::from(error));
            }
            if result.errors.is_empty() {
                Status::Ok
            } else {
                Status::StaticError
            }
        }
        Mode::Ast => match lox.parse(source, &mut reporter) {
            Some(program) => {
                println!("{}", print_program(&program));
                Status::Ok
            }
            None => Status::StaticError,
        },
        Mode::Eval => lox.run(source, &mut reporter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_input_is_complete() {
        assert!(is_complete("print 1;\n"));
        assert!(is_complete("fun f() { return (1); }\n"));
    }

    #[test]
    fn open_brace_waits_for_more() {
        assert!(!is_complete("fun f() {\n"));
        assert!(!is_complete("print (1 +\n"));
    }

    #[test]
    fn braces_in_strings_and_comments_are_ignored() {
        assert!(is_complete("print \"{\"; // {\n"));
        assert!(!is_complete("/* still { open\n"));
        assert!(is_complete("/* a /* b */ { */ print 1;\n"));
    }
}
