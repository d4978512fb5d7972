//! Render command implementation

use anyhow::Result;
use clap::Args;
use zer02prod_image_core::pipeline::BuildError;
use zer02prod_image_core::recipe::{Recipe, RenderedDockerfile, render};

use crate::Project;

/// Arguments for the render command
#[derive(Args)]
pub struct RenderArgs {
    /// Prefix every instruction with the stage it implements
    #[arg(long)]
    pub stages: bool,
}

/// Print the Dockerfile the build would send
pub fn cmd_render(args: &RenderArgs, project: &Project) -> Result<()> {
    let recipe = Recipe::from_config(&project.config)
        .map_err(|e| BuildError::Configuration(e.to_string()))?;
    let rendered = render(&recipe);

    if args.stages {
        print!("{}", annotated(&rendered));
    } else {
        print!("{}", rendered.text());
    }
    Ok(())
}

fn annotated(rendered: &RenderedDockerfile) -> String {
    let width = rendered
        .instructions()
        .iter()
        .map(|i| i.stage.label().len())
        .max()
        .unwrap_or(0);
    rendered
        .instructions()
        .iter()
        .enumerate()
        .map(|(index, i)| {
            format!(
                "# step {:>2}  {:<width$}  {}\n",
                index + 1,
                i.stage.label(),
                i.line
            )
        })
        .collect()
}
