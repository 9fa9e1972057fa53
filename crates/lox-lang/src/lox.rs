use crate::config::RuntimeConfig;
use crate::interpreter::value::Value;
use crate::interpreter::Interpreter;
use lox_core::diagnostics::{Diagnostic, Reporter};
use lox_core::parser::ast::{Program, Stmt, StmtKind};
use lox_core::parser::Parser;
use lox_core::resolver::Resolver;
use lox_core::scanner::Scanner;
use std::io::Write;
use tracing::debug;

/// Outcome of one [`Lox::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    /// Scan, parse or resolution errors; nothing was executed.
    StaticError,
    RuntimeError,
    /// Stack overflow or an internal interpreter error.
    Fatal,
}

impl Status {
    /// Exit code a command-line host should use (sysexits style).
    pub fn exit_code(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::StaticError => 65,
            Status::RuntimeError | Status::Fatal => 70,
        }
    }
}

/// A Lox session: global state survives from one `run` to the next, which is
/// what the REPL relies on.
pub struct Lox {
    interpreter: Interpreter,
    resolver: Resolver,
}

impl Lox {
    pub fn new(config: RuntimeConfig) -> Self {
        Self::from_interpreter(Interpreter::new(config))
    }

    pub fn with_output(config: RuntimeConfig, out: Box<dyn Write>) -> Self {
        Self::from_interpreter(Interpreter::with_output(config, out))
    }

    fn from_interpreter(interpreter: Interpreter) -> Self {
        let mut resolver = Resolver::new();
        for name in interpreter.global_names() {
            resolver.define_global(name);
        }
        Self {
            interpreter,
            resolver,
        }
    }

    pub fn define_native(
        &mut self,
        name: &str,
        arity: usize,
        func: impl Fn(&[Value]) -> Result<Value, String> + 'static,
    ) {
        self.interpreter.define_native(name, arity, func);
        self.resolver.define_global(name);
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// Scans and parses `source`, reporting every error found. Nothing is
    /// returned if any were.
    pub fn parse(&self, source: &str, reporter: &mut dyn Reporter) -> Option<Program> {
        let scanned = Scanner::new(source).scan_tokens();
        for error in &scanned.errors {
            reporter.report(&Diagnostic::from(error));
        }

        // parse even after scan errors so syntax errors surface in the same pass
        match Parser::new(scanned.tokens).parse() {
            Ok(program) if scanned.errors.is_empty() => Some(program),
            Ok(_) => None,
            Err(errors) => {
                for error in &errors {
                    reporter.report(&Diagnostic::from(error));
                }
                None
            }
        }
    }

    pub fn run(&mut self, source: &str, reporter: &mut dyn Reporter) -> Status {
        match self.parse(source, reporter) {
            Some(program) => self.execute(&program, reporter),
            None => Status::StaticError,
        }
    }

    /// Runs one line typed at a prompt. A bare expression with no trailing
    /// `;` is evaluated and its value printed; anything else runs as a
    /// program.
    pub fn run_prompt_line(&mut self, source: &str, reporter: &mut dyn Reporter) -> Status {
        let scanned = Scanner::new(source).scan_tokens();
        if scanned.errors.is_empty() {
            if let Ok(expr) = Parser::new(scanned.tokens).parse_expression() {
                let span = expr.span;
                let program = Program {
                    statements: vec![Stmt::new(StmtKind::Print(expr), span)],
                };
                return self.execute(&program, reporter);
            }
        }
        self.run(source, reporter)
    }

    fn execute(&mut self, program: &Program, reporter: &mut dyn Reporter) -> Status {
        if let Err(errors) = self.resolver.resolve(program) {
            for error in &errors {
                reporter.report(&Diagnostic::from(error));
            }
            return Status::StaticError;
        }

        match self.interpreter.interpret(program) {
            Ok(()) => Status::Ok,
            Err(error) => {
                reporter.report(&error.diagnostic());
                if error.is_fatal() {
                    debug!(%error, "fatal runtime error");
                    Status::Fatal
                } else {
                    Status::RuntimeError
                }
            }
        }
    }
}
