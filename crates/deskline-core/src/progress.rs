//! Progress reporting for TTY and non-TTY environments.
//!
//! TTY mode: one spinner per running assignment, counting records.
//! Non-TTY mode: hidden bars, log lines carry progress instead.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Per-assignment spinner with record counter
fn record_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {prefix:<32.dim} {pos:>9} records {wide_msg:.dim}")
        .expect("invalid template")
}

/// Overall bar over all assignments
fn overall_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{prefix:<32.cyan.bold} [{elapsed_precise}] {bar:30.green/dim} {pos}/{len}",
    )
    .expect("invalid template")
    .progress_chars("--")
}

/// Central progress context managing multi-progress bars.
pub struct ProgressContext {
    multi: MultiProgress,
    is_tty: bool,
}

impl ProgressContext {
    /// Create new context, detecting TTY automatically.
    pub fn new() -> Self {
        Self::with_tty(std::io::stderr().is_terminal())
    }

    /// Context that never draws (tests, piped output).
    pub fn hidden() -> Self {
        Self::with_tty(false)
    }

    fn with_tty(is_tty: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            is_tty,
        }
    }

    /// Spinner for one running assignment; hidden outside a TTY.
    pub fn record_bar(&self, name: &str) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(record_style());
        let display = if name.len() > 32 { &name[..32] } else { name };
        pb.set_prefix(display.to_string());
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }

    /// Bar counting finished assignments.
    pub fn overall_bar(&self, label: &str, total: u64) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new(total));
        pb.set_style(overall_style());
        pb.set_prefix(label.to_string());
        pb
    }

    /// Print a line above managed progress bars.
    pub fn println(&self, msg: impl AsRef<str>) {
        if self.is_tty {
            let _ = self.multi.println(msg);
        } else {
            eprintln!("{}", msg.as_ref());
        }
    }

    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    /// Get reference to `MultiProgress` for log bridge.
    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

impl Default for ProgressContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper for `ProgressContext`.
pub type SharedProgress = Arc<ProgressContext>;

/// Format number with thousand separators.
pub fn fmt_num(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}
