use crate::parser::ParseError;
use crate::resolver::ResolutionError;
use crate::scanner::ScanError;
use crate::span::Span;
use std::fmt;

/// Which part of the pipeline produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Scan,
    Parse,
    Resolve,
    Runtime,
    /// Stack overflow or a broken interpreter invariant.
    Fatal,
}

impl Stage {
    fn label(self) -> &'static str {
        match self {
            Stage::Scan => "scan",
            Stage::Parse => "parse",
            Stage::Resolve => "resolve",
            Stage::Runtime => "runtime",
            Stage::Fatal => "fatal",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub stage: Stage,
    pub span: Span,
    /// ` at 'lexeme'`, ` at end`, or empty.
    pub location: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(stage: Stage, span: Span, message: impl Into<String>) -> Self {
        Diagnostic {
            stage,
            span,
            location: String::new(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[line {}] Error{}: {}",
            self.span.line, self.location, self.message
        )
    }
}

impl From<&ScanError> for Diagnostic {
    fn from(error: &ScanError) -> Self {
        Diagnostic::new(Stage::Scan, error.span, error.message.clone())
    }
}

impl From<&ParseError> for Diagnostic {
    fn from(error: &ParseError) -> Self {
        Diagnostic {
            stage: Stage::Parse,
            span: error.span,
            location: error.location.clone(),
            message: error.message.clone(),
        }
    }
}

impl From<&ResolutionError> for Diagnostic {
    fn from(error: &ResolutionError) -> Self {
        Diagnostic {
            stage: Stage::Resolve,
            span: error.span,
            location: error.location.clone(),
            message: error.message.clone(),
        }
    }
}

/// Receives every diagnostic a run produces, in source order per stage.
pub trait Reporter {
    fn report(&mut self, diagnostic: &Diagnostic);
}

/// Keeps diagnostics in memory; handy for embedding and tests.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    pub diagnostics: Vec<Diagnostic>,
}

impl Reporter for CollectingReporter {
    fn report(&mut self, diagnostic: &Diagnostic) {
        self.diagnostics.push(diagnostic.clone());
    }
}

pub fn render(source: &str, diagnostic: &Diagnostic) -> String {
    let span = diagnostic.span;
    let lines: Vec<&str> = source.lines().collect();
    let line_idx = span.line.saturating_sub(1);
    let source_line = lines.get(line_idx).unwrap_or(&"");

    let line_num = span.line.to_string();
    let gutter_width = line_num.len();

    let pointer_col = span.col.saturating_sub(1);
    let pointer_len = span.length.max(1);

    let mut out = String::new();

    // error[stage]: message
    out.push_str(&format!(
        "error[{}]: {}\n",
        diagnostic.stage.label(),
        diagnostic.message
    ));

    // --> line:col
    out.push_str(&format!(
        "{:>width$}--> line {}:{}\n",
        " ",
        span.line,
        span.col,
        width = gutter_width
    ));

    out.push_str(&format!("{:>width$} |\n", " ", width = gutter_width));
    out.push_str(&format!(
        "{:>width$} | {}\n",
        span.line,
        source_line,
        width = gutter_width
    ));

    // keep tabs so the carets line up under the source
    let padding: String = source_line
        .chars()
        .take(pointer_col)
        .map(|c| if c == '\t' { '\t' } else { ' ' })
        .collect();
    let carets = "^".repeat(pointer_len);
    out.push_str(&format!(
        "{:>width$} | {}{}\n",
        " ",
        padding,
        carets,
        width = gutter_width
    ));

    if let Some(hint) = suggest_hint(&diagnostic.message) {
        out.push_str(&format!("{:>width$} |\n", " ", width = gutter_width));
        out.push_str(&format!(
            "{:>width$} = hint: {}\n",
            " ",
            hint,
            width = gutter_width
        ));
    }

    out
}

pub fn suggest_hint(message: &str) -> Option<&'static str> {
    if message.starts_with("Expect ';'") {
        return Some("every statement ends with ';'");
    }

    if message == "Operands must be two numbers or two strings." {
        return Some("'+' does not convert between numbers and strings");
    }

    if message == "Can't read local variable in its own initializer." {
        return Some("give the new variable a different name");
    }

    if message.starts_with("Undefined variable") {
        return Some("declare it with 'var' before it is used");
    }

    if message == "Can only call functions and classes." {
        return Some("only functions, methods and classes can be followed by '(...)'");
    }

    None
}
