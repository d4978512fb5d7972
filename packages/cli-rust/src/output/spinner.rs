//! Spinner for daemon round trips
//!
//! Used where the CLI waits on the daemon without a byte count to show:
//! connecting, starting a container, inspecting a launch.

use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

/// Animated spinner that reports how long the operation took
///
/// A quiet spinner draws nothing and every call on it is a no-op.
pub struct CommandSpinner {
    bar: Option<ProgressBar>,
    started: Instant,
}

impl CommandSpinner {
    /// Start ticking immediately with `message`
    pub fn new(message: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg} ({elapsed_precise:.dim})")
                .expect("valid template")
                .tick_chars("\u{28CB}\u{2819}\u{2839}\u{2838}\u{283C}\u{2834}\u{2826}\u{2827}\u{2807}\u{280F}"),
        );
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self {
            bar: Some(bar),
            started: Instant::now(),
        }
    }

    pub fn new_maybe(message: &str, quiet: bool) -> Self {
        if quiet {
            Self {
                bar: None,
                started: Instant::now(),
            }
        } else {
            Self::new(message)
        }
    }

    pub fn update(&self, message: &str) {
        if let Some(bar) = &self.bar {
            bar.set_message(message.to_string());
        }
    }

    /// Elapsed time rounded to milliseconds, for summaries
    pub fn elapsed(&self) -> Duration {
        let elapsed = self.started.elapsed();
        Duration::from_millis(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn success(self, message: &str) {
        self.finish(console::style("\u{2713}").green(), message);
    }

    pub fn fail(self, message: &str) {
        self.finish(console::style("\u{2717}").red(), message);
    }

    fn finish(self, marker: console::StyledObject<&str>, message: &str) {
        let elapsed = humantime::format_duration(self.elapsed());
        if let Some(bar) = self.bar {
            bar.finish_with_message(format!(
                "{marker} {message} {}",
                console::style(format!("in {elapsed}")).dim()
            ));
        }
    }
}
