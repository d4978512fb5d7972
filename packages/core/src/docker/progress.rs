//! Terminal progress for base pulls and image builds
//!
//! Pulls get one bar per layer. Builds get a single spinner whose message
//! follows the daemon's output, prefixed with the stage being built.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Minimum time between spinner message updates to prevent flickering
const SPINNER_UPDATE_THROTTLE: Duration = Duration::from_millis(150);

const TICK: Duration = Duration::from_millis(100);

/// Progress bars and spinners keyed by id
pub struct ProgressReporter {
    multi: MultiProgress,
    bars: HashMap<String, ProgressBar>,
    last_update: HashMap<String, Instant>,
    last_message: HashMap<String, String>,
    context: Option<String>,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter {
    /// Reporter drawing to stderr
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    /// Reporter that tracks state but draws nothing (quiet mode, tests)
    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        Self {
            multi: MultiProgress::with_draw_target(target),
            bars: HashMap::new(),
            last_update: HashMap::new(),
            last_message: HashMap::new(),
            context: None,
        }
    }

    /// Prefix every spinner message with `context`, e.g. the current stage
    pub fn set_context(&mut self, context: impl Into<String>) {
        self.context = Some(context.into());
    }

    fn decorate(&self, message: &str) -> String {
        match &self.context {
            Some(context) => format!("[{context}] {message}"),
            None => message.to_string(),
        }
    }

    /// Add a spinner for indeterminate work
    pub fn add_spinner(&mut self, id: &str, message: &str) -> ProgressBar {
        let spinner = self.multi.add(ProgressBar::new_spinner());
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg} ({elapsed_precise:.dim})")
                .expect("valid template")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        spinner.set_message(self.decorate(message));
        spinner.enable_steady_tick(TICK);
        self.bars.insert(id.to_string(), spinner.clone());
        spinner
    }

    /// Add a byte progress bar, used per pulled layer
    pub fn add_bar(&mut self, id: &str, total: u64) -> ProgressBar {
        let bar = self.multi.add(ProgressBar::new(total));
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}")
                .expect("valid template")
                .progress_chars("=>-"),
        );
        bar.enable_steady_tick(TICK);
        self.bars.insert(id.to_string(), bar.clone());
        bar
    }

    /// Update a layer bar, creating it on first sight
    pub fn update_layer(&mut self, layer_id: &str, current: u64, total: u64, status: &str) {
        let bar = match self.bars.get(layer_id) {
            Some(bar) => bar.clone(),
            None => self.add_bar(layer_id, total),
        };
        if total > 0 && bar.length() != Some(total) {
            bar.set_length(total);
        }
        bar.set_position(current);
        bar.set_message(status.to_string());
    }

    /// Update a spinner message
    ///
    /// Rapid updates are throttled, except `Step N/M` lines which always show.
    pub fn update_spinner(&mut self, id: &str, message: &str) {
        let now = Instant::now();

        if !message.starts_with("Step ") {
            let too_soon = self
                .last_update
                .get(id)
                .is_some_and(|last| now.duration_since(*last) < SPINNER_UPDATE_THROTTLE);
            let unchanged = self.last_message.get(id).is_some_and(|last| last == message);
            if too_soon || unchanged {
                return;
            }
        }

        let decorated = self.decorate(message);
        match self.bars.get(id) {
            Some(spinner) => spinner.set_message(decorated),
            None => {
                self.add_spinner(id, message);
            }
        }

        self.last_update.insert(id.to_string(), now);
        self.last_message.insert(id.to_string(), message.to_string());
    }

    pub fn finish(&mut self, id: &str, message: &str) {
        if let Some(bar) = self.bars.get(id) {
            bar.finish_with_message(message.to_string());
        }
    }

    pub fn finish_all(&self, message: &str) {
        for bar in self.bars.values() {
            bar.finish_with_message(message.to_string());
        }
    }

    pub fn abandon_all(&self, message: &str) {
        for bar in self.bars.values() {
            bar.abandon_with_message(message.to_string());
        }
    }

    /// Drop every bar so the next operation starts clean
    pub fn clear(&mut self) {
        for bar in self.bars.values() {
            bar.finish_and_clear();
        }
        self.bars.clear();
        self.last_update.clear();
        self.last_message.clear();
    }
}
