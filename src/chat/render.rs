//! Output rendering for the chat application.
//!
//! This module provides a trait-based rendering abstraction so the REPL can
//! print with or without ANSI styling.  The transcript is the source of truth;
//! renderers only display it.

use std::io::{self, Stdout, Write};

use crate::transcript::{Entry, Speaker};

/// ANSI escape code for dim text (used for the waiting indicator).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for bold text (used for speaker labels).
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for the user label).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for green text (used for the assistant label).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Trait for rendering chat output.
pub trait Renderer: Send {
    /// Print one transcript line.
    fn print_entry(&mut self, entry: &Entry);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Called when a job is submitted and input is blocked.
    fn start_waiting(&mut self);

    /// Called when the job reached a terminal state or timed out.
    fn finish_waiting(&mut self);

    /// Print every line of a transcript in order.
    fn print_transcript(&mut self, entries: &[Entry]) {
        for entry in entries {
            self.print_entry(entry);
        }
    }
}

/// Formats a transcript line as `Label: text`.
pub fn format_entry(entry: &Entry, use_color: bool) -> String {
    if use_color {
        let color = match entry.speaker {
            Speaker::User => ANSI_CYAN,
            Speaker::Assistant => ANSI_GREEN,
        };
        format!(
            "{ANSI_BOLD}{color}{}:{ANSI_RESET} {}",
            entry.speaker, entry.text
        )
    } else {
        format!("{}: {}", entry.speaker, entry.text)
    }
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
    waiting: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
            waiting: false,
        }
    }

    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn print_entry(&mut self, entry: &Entry) {
        println!("{}", format_entry(entry, self.use_color));
        self.flush();
    }

    fn print_error(&mut self, error: &str) {
        if self.use_color {
            eprintln!("{ANSI_RED}Error: {error}{ANSI_RESET}");
        } else {
            eprintln!("Error: {error}");
        }
    }

    fn print_info(&mut self, info: &str) {
        println!("{info}");
    }

    fn start_waiting(&mut self) {
        self.waiting = true;
        if self.use_color {
            print!("{ANSI_DIM}Generating response...{ANSI_RESET}");
        } else {
            print!("Generating response...");
        }
        self.flush();
    }

    fn finish_waiting(&mut self) {
        if self.waiting {
            // Overwrite the indicator line.
            print!("\r\x1b[2K");
            self.waiting = false;
            self.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::Transcript;

    #[test]
    fn renderer_default_has_color() {
        let renderer = PlainTextRenderer::new();
        assert!(renderer.use_color);
    }

    #[test]
    fn renderer_without_color() {
        let renderer = PlainTextRenderer::with_color(false);
        assert!(!renderer.use_color);
    }

    #[test]
    fn plain_entry_format() {
        let mut transcript = Transcript::new();
        transcript.append(Speaker::User, "¿Cuánto cuesta?");
        transcript.append(Speaker::Assistant, "S/ 25.00");
        assert_eq!(
            format_entry(&transcript.all()[0], false),
            "User: ¿Cuánto cuesta?"
        );
        assert_eq!(format_entry(&transcript.all()[1], false), "Assistant: S/ 25.00");
    }

    #[test]
    fn colored_entry_keeps_text() {
        let mut transcript = Transcript::new();
        transcript.append(Speaker::Assistant, "hola");
        let line = format_entry(&transcript.all()[0], true);
        assert!(line.starts_with(ANSI_BOLD));
        assert!(line.ends_with(" hola"));
    }
}
