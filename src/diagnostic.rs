// Copyright 2024 Cornell University
// released under MIT License

use std::io::Write;

use clap::ColorChoice;
use codespan_reporting::diagnostic::{Diagnostic as CodespanDiagnostic, Severity};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{Buffer, Color, ColorSpec, WriteColor};

/// Severity of diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Error,
    Warning,
}

impl Level {
    fn severity(&self) -> Severity {
        match self {
            Level::Error => Severity::Error,
            Level::Warning => Severity::Warning,
        }
    }
}

/// Diagnostic about one procedure of the input program. The input comes
/// from an earlier phase, so there is no source range to point at.
struct Diagnostic {
    message: String,
    level: Level,
    proc_name: Option<String>,
}

impl Diagnostic {
    fn emit(&self, buffer: &mut Buffer, files: &SimpleFiles<String, String>) {
        match &self.proc_name {
            Some(proc_name) => {
                let diagnostic = CodespanDiagnostic::new(self.level.severity())
                    .with_message(&self.message)
                    .with_notes(vec![format!("in procedure `{proc_name}`")]);

                let config = term::Config::default();
                term::emit(buffer, &config, files, &diagnostic)
                    .expect("Failed to write diagnostic");
            }
            None => {
                let color = match self.level {
                    Level::Error => Color::Red,
                    Level::Warning => Color::Yellow,
                };

                buffer
                    .set_color(ColorSpec::new().set_bold(true).set_fg(Some(color)))
                    .expect("Failed to set color");
                write!(buffer, "{:?}", self.level).expect("Failed to write title");
                buffer
                    .set_color(&ColorSpec::new())
                    .expect("Failed to reset color");
                writeln!(buffer, ": {}", self.message).expect("Failed to write message");
            }
        }
    }
}

pub struct DiagnosticHandler {
    files: SimpleFiles<String, String>,
    error_string: String,
    /// `color_choice` indicates whether to emit error messages w/ ANSI colors
    color_choice: ColorChoice,
}

impl Default for DiagnosticHandler {
    /// Default `DiagnosticHandler` does not emit colored error messages
    fn default() -> Self {
        Self::new(ColorChoice::Never)
    }
}

impl DiagnosticHandler {
    pub fn new(color_choice: ColorChoice) -> Self {
        Self {
            files: SimpleFiles::new(),
            error_string: String::new(),
            color_choice,
        }
    }

    /// Creates a buffer for error diagnostics
    /// (different buffers are created based on whether we want colors or not)
    fn create_buffer(&self) -> Buffer {
        if self.color_choice == ColorChoice::Never {
            Buffer::no_color()
        } else {
            Buffer::ansi()
        }
    }

    /// Everything emitted so far
    pub fn error_string(&self) -> &str {
        &self.error_string
    }

    pub fn emit_diagnostic_proc(&mut self, proc_name: &str, message: &str, level: Level) {
        self.emit(Diagnostic {
            message: message.to_string(),
            level,
            proc_name: Some(proc_name.to_string()),
        });
    }

    pub fn emit_general_message(&mut self, message: &str, level: Level) {
        self.emit(Diagnostic {
            message: message.to_string(),
            level,
            proc_name: None,
        });
    }

    fn emit(&mut self, diagnostic: Diagnostic) {
        let buffer = &mut self.create_buffer();
        diagnostic.emit(buffer, &self.files);

        let error_msg = String::from_utf8_lossy(buffer.as_slice());
        self.error_string.push_str(&error_msg);
        eprint!("{}", error_msg);
    }
}

#[cfg(test)]
mod tests {
    use strip_ansi_escapes::strip_str;

    use super::*;

    #[test]
    fn test_emit_diagnostic_proc() {
        let mut handler = DiagnosticHandler::new(ColorChoice::Never);
        handler.emit_diagnostic_proc("Incr", "Random Warning", Level::Warning);
        handler.emit_diagnostic_proc("Decr", "Random Error", Level::Error);

        let content = strip_str(handler.error_string());
        assert!(content.contains("warning: Random Warning"));
        assert!(content.contains("in procedure `Incr`"));
        assert!(content.contains("error: Random Error"));
        assert!(content.contains("in procedure `Decr`"));
    }

    #[test]
    fn test_emit_general_message_with_color() {
        let mut handler = DiagnosticHandler::new(ColorChoice::Always);
        handler.emit_general_message("nothing to check", Level::Warning);

        // colors are stripped, the text survives
        assert_ne!(handler.error_string(), "Warning: nothing to check\n");
        assert_eq!(
            strip_str(handler.error_string()),
            "Warning: nothing to check\n"
        );
    }
}
