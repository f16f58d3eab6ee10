//! User-facing console output.
//!
//! Diagnostics go through `tracing`; this is what the operator reads while a
//! build runs, including the streamed output of every subprocess.

use std::sync::{Arc, Mutex};

use console::style;

#[derive(Debug, Clone, Default)]
pub struct Console {
    mode: Mode,
}

#[derive(Debug, Clone, Default)]
enum Mode {
    #[default]
    Terminal,
    Quiet,
    Capture(Arc<Mutex<Vec<String>>>),
}

impl Console {
    pub fn terminal() -> Self {
        Self {
            mode: Mode::Terminal,
        }
    }

    /// Discards everything.
    pub fn quiet() -> Self {
        Self { mode: Mode::Quiet }
    }

    /// Records unstyled lines for inspection.
    pub fn capture() -> Self {
        Self {
            mode: Mode::Capture(Arc::new(Mutex::new(Vec::new()))),
        }
    }

    pub fn captured(&self) -> Vec<String> {
        match &self.mode {
            Mode::Capture(lines) => lines.lock().map(|l| l.clone()).unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    pub fn section(&self, message: &str) {
        self.emit(
            format!("\n{}\n{}", message, "-".repeat(message.chars().count())),
            || {
                format!(
                    "\n{}\n{}",
                    style(message).yellow().bold(),
                    style("-".repeat(message.chars().count())).yellow()
                )
            },
            false,
        );
    }

    pub fn title(&self, message: &str) {
        self.emit(
            message.to_string(),
            || format!("\n{}", style(message).cyan().bold().underlined()),
            false,
        );
    }

    pub fn note(&self, message: &str) {
        self.emit(
            format!("! [NOTE] {message}"),
            || format!("{} {}", style("! [NOTE]").yellow(), message),
            false,
        );
    }

    pub fn info(&self, message: &str) {
        self.emit(
            message.to_string(),
            || style(message).green().to_string(),
            false,
        );
    }

    pub fn text(&self, message: &str) {
        self.emit(message.to_string(), || format!(" {message}"), false);
    }

    pub fn warning(&self, message: &str) {
        self.emit(
            format!("[WARNING] {message}"),
            || style(format!("[WARNING] {message}")).black().on_yellow().to_string(),
            true,
        );
    }

    pub fn error(&self, message: &str) {
        self.emit(
            format!("[ERROR] {message}"),
            || style(format!("[ERROR] {message}")).white().on_red().to_string(),
            true,
        );
    }

    pub fn success(&self, message: &str) {
        self.emit(
            format!("[OK] {message}"),
            || style(format!("[OK] {message}")).black().on_green().to_string(),
            false,
        );
    }

    /// One line of subprocess output, forwarded as it arrives.
    pub fn stream_line(&self, line: &str) {
        self.emit(line.to_string(), || format!("  {}", style(line).dim()), false);
    }

    fn emit(&self, plain: String, styled: impl FnOnce() -> String, to_stderr: bool) {
        match &self.mode {
            Mode::Quiet => {}
            Mode::Capture(lines) => {
                if let Ok(mut lines) = lines.lock() {
                    lines.push(plain);
                }
            }
            Mode::Terminal if to_stderr => eprintln!("{}", styled()),
            Mode::Terminal => println!("{}", styled()),
        }
    }
}
