//! Dockerfile rendering
//!
//! Renders a [`Recipe`] into Dockerfile text and keeps, for every
//! instruction, the stage it belongs to. The daemon reports progress as
//! `Step N/M`; the instruction list maps that step back to a stage.

use super::{Recipe, Stage};

/// Name of the generated Dockerfile inside the build context
///
/// Chosen so it cannot collide with a Dockerfile that ships in the source tree.
pub const DOCKERFILE_NAME: &str = ".z2p-image.Dockerfile";

/// One Dockerfile instruction and the stage it implements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub stage: Stage,
    pub line: String,
}

/// Rendered Dockerfile plus its instruction→stage map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDockerfile {
    instructions: Vec<Instruction>,
}

impl RenderedDockerfile {
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Stage of the 1-based build step reported by the daemon
    pub fn stage_for_step(&self, step: usize) -> Option<Stage> {
        step.checked_sub(1)
            .and_then(|index| self.instructions.get(index))
            .map(|instruction| instruction.stage)
    }

    /// Dockerfile text
    pub fn text(&self) -> String {
        let mut text = String::from("# Generated by z2p-image. Do not edit.\n");
        let mut previous = None;
        for instruction in &self.instructions {
            if previous.is_some() && previous != Some(instruction.stage) {
                text.push('\n');
            }
            text.push_str(&instruction.line);
            text.push('\n');
            previous = Some(instruction.stage);
        }
        text
    }
}

/// Render a recipe into Dockerfile instructions
pub fn render(recipe: &Recipe) -> RenderedDockerfile {
    let mut instructions = Vec::new();
    let mut push = |stage: Stage, line: String| instructions.push(Instruction { stage, line });

    push(Stage::SelectBase, format!("FROM {}", recipe.base));

    // No packages renders no instruction at all
    if !recipe.packages.is_empty() {
        push(
            Stage::InstallDeps,
            format!(
                "RUN apt-get update && apt-get install -y --no-install-recommends {} && rm -rf /var/lib/apt/lists/*",
                recipe.packages.join(" ")
            ),
        );
    }

    push(Stage::CopySource, format!("WORKDIR {}", recipe.workdir));
    push(Stage::CopySource, "COPY . .".to_string());

    // ARG values are build scoped and visible to the following RUN only as
    // environment; they never reach the runtime image config.
    for flag in &recipe.compile.flags {
        push(
            Stage::SetConfig,
            format!("ARG {}={}", flag.name, quote_arg_value(&flag.value)),
        );
    }

    push(
        Stage::Compile,
        format!("RUN {}", exec_form(&recipe.compile.command())),
    );

    push(
        Stage::BindEntry,
        format!(
            "RUN {}",
            exec_form(&[
                "test".to_string(),
                "-x".to_string(),
                recipe.entrypoint.path.clone()
            ])
        ),
    );
    push(
        Stage::BindEntry,
        format!("ENTRYPOINT {}", exec_form(&recipe.entrypoint.exec_form())),
    );

    RenderedDockerfile { instructions }
}

/// JSON array form, which docker runs without a shell
fn exec_form(args: &[String]) -> String {
    serde_json::to_string(args).unwrap_or_else(|_| "[]".to_string())
}

fn quote_arg_value(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '/' | ':'))
    {
        value.to_string()
    } else {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn default_recipe() -> Recipe {
        Recipe::from_config(&Config::default()).unwrap()
    }

    #[test]
    fn renders_stages_in_order() {
        let rendered = render(&default_recipe());
        let lines: Vec<&str> = rendered
            .instructions()
            .iter()
            .map(|i| i.line.as_str())
            .collect();

        assert_eq!(
            lines,
            vec![
                "FROM rust:1.83.0-bookworm",
                "RUN apt-get update && apt-get install -y --no-install-recommends lld clang && rm -rf /var/lib/apt/lists/*",
                "WORKDIR /app",
                "COPY . .",
                "ARG SQLX_OFFLINE=true",
                r#"RUN ["cargo","build","--release","--bin","zer02prod"]"#,
                r#"RUN ["test","-x","/app/target/release/zer02prod"]"#,
                r#"ENTRYPOINT ["/app/target/release/zer02prod"]"#,
            ]
        );

        let stages: Vec<Stage> = rendered.instructions().iter().map(|i| i.stage).collect();
        let mut sorted = stages.clone();
        sorted.sort();
        assert_eq!(stages, sorted, "stages must never go backwards");
    }

    #[test]
    fn offline_flag_precedes_compile() {
        let rendered = render(&default_recipe());
        let position = |needle: &str| {
            rendered
                .instructions()
                .iter()
                .position(|i| i.line.contains(needle))
                .unwrap()
        };
        assert!(position("ARG SQLX_OFFLINE") < position("cargo"));
    }

    #[test]
    fn entrypoint_has_no_shell_and_no_cmd() {
        let text = render(&default_recipe()).text();
        assert!(text.contains(r#"ENTRYPOINT ["/app/target/release/zer02prod"]"#));
        assert!(!text.contains("CMD"));
        assert!(!text.contains("/bin/sh"));
        assert!(!text.contains("ENV "));
    }

    #[test]
    fn stage_for_step_maps_one_based_steps() {
        let rendered = render(&default_recipe());
        assert_eq!(rendered.stage_for_step(0), None);
        assert_eq!(rendered.stage_for_step(1), Some(Stage::SelectBase));
        assert_eq!(rendered.stage_for_step(2), Some(Stage::InstallDeps));
        assert_eq!(rendered.stage_for_step(4), Some(Stage::CopySource));
        assert_eq!(rendered.stage_for_step(5), Some(Stage::SetConfig));
        assert_eq!(rendered.stage_for_step(6), Some(Stage::Compile));
        assert_eq!(rendered.stage_for_step(8), Some(Stage::BindEntry));
        assert_eq!(rendered.stage_for_step(9), None);
    }

    #[test]
    fn empty_package_list_skips_install_step() {
        let config = Config {
            build_packages: Vec::new(),
            ..Config::default()
        };
        let rendered = render(&Recipe::from_config(&config).unwrap());
        assert!(
            rendered
                .instructions()
                .iter()
                .all(|i| i.stage != Stage::InstallDeps)
        );
        assert_eq!(rendered.stage_for_step(2), Some(Stage::CopySource));
    }

    #[test]
    fn arg_values_with_spaces_are_quoted() {
        assert_eq!(quote_arg_value("true"), "true");
        assert_eq!(quote_arg_value("a b"), "\"a b\"");
        assert_eq!(quote_arg_value(""), "\"\"");
        assert_eq!(quote_arg_value("say \"hi\""), "\"say \\\"hi\\\"\"");
    }

    #[test]
    fn text_starts_with_header_and_ends_with_newline() {
        let text = render(&default_recipe()).text();
        assert!(text.starts_with("# Generated by z2p-image"));
        assert!(text.ends_with("\n"));
    }
}
