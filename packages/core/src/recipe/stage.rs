//! Build stages and the pipeline state machine
//!
//! A build walks `SelectBase → InstallDeps → CopySource → SetConfig →
//! Compile → BindEntry → Done` in order. Any stage may fail into `Failed`.
//! `Done` and `Failed` are terminal.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::RecipeError;

/// One stage of the image build
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    SelectBase,
    InstallDeps,
    CopySource,
    SetConfig,
    Compile,
    BindEntry,
    Done,
    Failed,
}

impl Stage {
    /// The working stages in execution order
    pub const SEQUENCE: [Stage; 6] = [
        Stage::SelectBase,
        Stage::InstallDeps,
        Stage::CopySource,
        Stage::SetConfig,
        Stage::Compile,
        Stage::BindEntry,
    ];

    /// Stage that follows this one on success
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::SelectBase => Some(Stage::InstallDeps),
            Stage::InstallDeps => Some(Stage::CopySource),
            Stage::CopySource => Some(Stage::SetConfig),
            Stage::SetConfig => Some(Stage::Compile),
            Stage::Compile => Some(Stage::BindEntry),
            Stage::BindEntry => Some(Stage::Done),
            Stage::Done | Stage::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }

    /// Human readable label
    pub fn label(self) -> &'static str {
        match self {
            Stage::SelectBase => "select base environment",
            Stage::InstallDeps => "install build dependencies",
            Stage::CopySource => "materialize source tree",
            Stage::SetConfig => "set build configuration",
            Stage::Compile => "compile",
            Stage::BindEntry => "bind entry point",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Time spent in a completed stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageTiming {
    pub stage: Stage,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u128(duration.as_millis())
    }
}

/// Tracks where a build is and how long each stage took
#[derive(Debug)]
pub struct PipelineState {
    current: Stage,
    entered_at: Instant,
    timings: Vec<StageTiming>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineState {
    /// Start a new build in `SelectBase`
    pub fn new() -> Self {
        Self {
            current: Stage::SelectBase,
            entered_at: Instant::now(),
            timings: Vec::new(),
        }
    }

    pub fn current(&self) -> Stage {
        self.current
    }

    pub fn timings(&self) -> &[StageTiming] {
        &self.timings
    }

    /// Move forward to `target`, passing through every stage in between
    ///
    /// Moving to the current stage is a no-op. Moving backwards, into
    /// `Failed`, or out of a terminal stage is rejected.
    pub fn advance_to(&mut self, target: Stage) -> Result<(), RecipeError> {
        if target == self.current {
            return Ok(());
        }
        if self.current.is_terminal() || target == Stage::Failed || target < self.current {
            return Err(RecipeError::InvalidTransition {
                from: self.current,
                to: target,
            });
        }

        while self.current != target {
            let next = self.current.next().ok_or(RecipeError::InvalidTransition {
                from: self.current,
                to: target,
            })?;
            self.close_current();
            tracing::debug!("Stage: {} -> {}", self.current, next);
            self.current = next;
        }
        Ok(())
    }

    /// Move to the terminal `Failed` state, returning the stage that failed
    pub fn fail(&mut self) -> Stage {
        let failed = self.current;
        if !self.current.is_terminal() {
            self.close_current();
            self.current = Stage::Failed;
        }
        failed
    }

    fn close_current(&mut self) {
        let now = Instant::now();
        self.timings.push(StageTiming {
            stage: self.current,
            elapsed: now.duration_since(self.entered_at),
        });
        self.entered_at = now;
    }
}
