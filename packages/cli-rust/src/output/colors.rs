//! Color utilities for CLI output
//!
//! Provides consistent styling for build stages and doctor checks.

use console::{Style, StyledObject};
use zer02prod_image_core::recipe::Stage;

/// Style a build stage label
///
/// - Done -> green bold
/// - Failed -> red bold
/// - Compile -> yellow (the long one)
/// - other -> cyan
pub fn stage_style(stage: Stage) -> StyledObject<&'static str> {
    let style = match stage {
        Stage::Done => Style::new().green().bold(),
        Stage::Failed => Style::new().red().bold(),
        Stage::Compile => Style::new().yellow(),
        _ => Style::new().cyan(),
    };
    style.apply_to(stage.label())
}

/// `[n/6]` position of a working stage, empty for terminal stages
pub fn stage_counter(stage: Stage) -> String {
    Stage::SEQUENCE
        .iter()
        .position(|s| *s == stage)
        .map(|index| format!("[{}/{}]", index + 1, Stage::SEQUENCE.len()))
        .unwrap_or_default()
}

/// Outcome of one doctor check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Ok,
    Warn,
    Fail,
}

pub fn check_marker(status: CheckStatus) -> StyledObject<&'static str> {
    match status {
        CheckStatus::Ok => Style::new().green().apply_to("\u{2713}"),
        CheckStatus::Warn => Style::new().yellow().apply_to("!"),
        CheckStatus::Fail => Style::new().red().bold().apply_to("\u{2717}"),
    }
}
