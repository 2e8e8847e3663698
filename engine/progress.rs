use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;

/// Observer for reporting bootstrap progress. Iterations run on the rayon pool,
/// so every callback takes `&self` and implementations must be `Sync`.
pub trait BootstrapProgress: Sync {
    fn on_start(&self, label: &str, total_iterations: usize) {
        let _ = (label, total_iterations);
    }
    fn on_advance(&self, completed: usize) {
        let _ = completed;
    }
    fn on_finish(&self) {}
}

#[derive(Default)]
pub struct NoopProgress;

impl BootstrapProgress for NoopProgress {}

/// Progress bar on stderr, drawn only when stderr is a terminal.
pub struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    pub fn new() -> Self {
        let draw_target = if std::io::stderr().is_terminal() {
            ProgressDrawTarget::stderr_with_hz(20)
        } else {
            ProgressDrawTarget::hidden()
        };

        let bar = ProgressBar::with_draw_target(Some(0), draw_target);
        // The template is a literal, so a parse failure would be a programming error.
        if let Ok(style) = ProgressStyle::with_template(
            "> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        ) {
            bar.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
        }
        Self { bar }
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl BootstrapProgress for TerminalProgress {
    fn on_start(&self, label: &str, total_iterations: usize) {
        self.bar.reset();
        self.bar.set_length(total_iterations as u64);
        self.bar.set_message(label.to_string());
    }

    fn on_advance(&self, completed: usize) {
        self.bar.inc(completed as u64);
    }

    fn on_finish(&self) {
        self.bar.finish_and_clear();
    }
}
