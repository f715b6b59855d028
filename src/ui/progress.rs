//! Progress indicators with CI fallback

use super::context::UiContext;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ";

/// A task spinner with CI fallback
pub struct TaskSpinner {
    spinner: Option<ProgressBar>,
    interactive: bool,
    quiet: bool,
}

impl TaskSpinner {
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            interactive: ctx.use_fancy_output(),
            quiet: ctx.is_quiet(),
        }
    }

    /// Start the spinner with a message
    pub fn start(&mut self, message: &str) {
        if self.quiet {
            return;
        }

        if self.interactive {
            let spinner = ProgressBar::new_spinner();
            if let Ok(spinner_style) =
                ProgressStyle::default_spinner().template("  {spinner:.cyan} {msg}")
            {
                spinner.set_style(spinner_style.tick_chars(TICK_CHARS));
            }
            spinner.set_message(message.to_string());
            spinner.enable_steady_tick(Duration::from_millis(120));
            self.spinner = Some(spinner);
        } else {
            // Plain output for CI
            println!("{} {}", style("...").dim(), message);
        }
    }

    /// Update the spinner message
    pub fn message(&mut self, message: &str) {
        if let Some(ref spinner) = self.spinner {
            spinner.set_message(message.to_string());
        }
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        self.finish(style("✓").green(), style("[OK]").green(), message);
    }

    /// Stop with error message
    pub fn stop_error(&mut self, message: &str) {
        self.finish(style("✗").red(), style("[FAIL]").red(), message);
    }

    /// Stop with warning message
    pub fn stop_warn(&mut self, message: &str) {
        self.finish(style("!").yellow(), style("[WARN]").yellow(), message);
    }

    /// Clear the spinner without any message
    pub fn clear(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    fn finish(
        &mut self,
        symbol: console::StyledObject<&str>,
        tag: console::StyledObject<&str>,
        message: &str,
    ) {
        self.clear();
        if self.quiet {
            return;
        }
        if self.interactive {
            println!("  {} {}", symbol, message);
        } else {
            println!("{} {}", tag, message);
        }
    }
}

impl Drop for TaskSpinner {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Counting progress bar for multi-tool operations.
///
/// Shows an indicatif bar in interactive mode and one line per finished
/// item otherwise.
pub struct TaskProgress {
    bar: Option<ProgressBar>,
    quiet: bool,
}

impl TaskProgress {
    pub fn new(ctx: &UiContext, label: &str, total: u64) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = ProgressBar::new(total);
            if let Ok(bar_style) = ProgressStyle::default_bar().template(
                "  {spinner:.cyan} {prefix}  {bar:20.cyan/dim} {pos}/{len} {msg:.dim}  {elapsed:.dim}",
            ) {
                bar.set_style(bar_style.tick_chars(TICK_CHARS).progress_chars("━╸─"));
            }
            bar.set_prefix(label.to_string());
            bar.enable_steady_tick(Duration::from_millis(120));
            Some(bar)
        } else {
            if !ctx.is_quiet() {
                println!("{} ({} tools)...", label, total);
            }
            None
        };
        Self {
            bar,
            quiet: ctx.is_quiet(),
        }
    }

    /// Mark one item finished
    pub fn inc(&self, item: &str) {
        match self.bar {
            Some(ref bar) => {
                bar.set_message(item.to_string());
                bar.inc(1);
            }
            None if !self.quiet => println!("  {} {}", style("-").dim(), item),
            None => {}
        }
    }

    /// Finish and clear the progress bar.
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}
