//! Config show subcommand
//!
//! Displays the effective configuration in table or JSON format.

use anyhow::Result;
use comfy_table::{Cell, Color, Table};
use zer02prod_image_core::Config;
use zer02prod_image_core::recipe::Recipe;

use crate::Project;

/// Show current configuration
///
/// Missing keys are shown with their defaults. The derived image reference
/// and entry point follow the stored keys.
pub fn cmd_config_show(project: &Project, json: bool, quiet: bool) -> Result<()> {
    let config = &project.config;
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    println!("{}", config_table(config));

    if !quiet {
        println!();
        if project.config_path.exists() {
            println!("Config file: {}", project.config_path.display());
        } else {
            println!(
                "Config file: {} (not present, showing defaults)",
                project.config_path.display()
            );
        }
    }
    Ok(())
}

fn config_table(config: &Config) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Key", "Value"]);

    table.add_row(vec![
        Cell::new("version"),
        Cell::new(config.version.to_string()),
    ]);
    table.add_row(vec![Cell::new("image_name"), Cell::new(&config.image_name)]);
    table.add_row(vec![Cell::new("image_tag"), Cell::new(&config.image_tag)]);
    table.add_row(vec![
        Cell::new("base_image"),
        format_base_image(&config.base_image, config.allow_floating_base),
    ]);
    table.add_row(vec![
        Cell::new("allow_floating_base"),
        Cell::new(config.allow_floating_base.to_string()).fg(if config.allow_floating_base {
            Color::Yellow
        } else {
            Color::Reset
        }),
    ]);
    table.add_row(vec![
        Cell::new("build_packages"),
        Cell::new(format_list(&config.build_packages)),
    ]);
    table.add_row(vec![Cell::new("workdir"), Cell::new(&config.workdir)]);
    table.add_row(vec![Cell::new("binary_name"), Cell::new(&config.binary_name)]);
    table.add_row(vec![
        Cell::new("compile_flags"),
        Cell::new(format_list(&config.compile_flags)),
    ]);
    table.add_row(vec![
        Cell::new("locked"),
        Cell::new(config.locked.to_string()),
    ]);
    table.add_row(vec![Cell::new("include"), Cell::new(format_list(&config.include))]);
    table.add_row(vec![Cell::new("exclude"), Cell::new(format_list(&config.exclude))]);
    table.add_row(vec![
        Cell::new("build_timeout_secs"),
        Cell::new(config.build_timeout_secs.to_string()),
    ]);
    table.add_row(vec![
        Cell::new("no_cache"),
        Cell::new(config.no_cache.to_string()),
    ]);

    // Derived values
    table.add_row(vec![
        Cell::new("image").fg(Color::DarkGrey),
        Cell::new(config.image_reference()),
    ]);
    let entrypoint = match Recipe::from_config(config) {
        Ok(recipe) => Cell::new(recipe.entrypoint.path),
        Err(e) => Cell::new(e.to_string()).fg(Color::Red),
    };
    table.add_row(vec![Cell::new("entrypoint").fg(Color::DarkGrey), entrypoint]);

    table
}

/// Base image in green when pinned, yellow otherwise
fn format_base_image(value: &str, allow_floating: bool) -> Cell {
    let pinned = value
        .parse::<zer02prod_image_core::recipe::BaseImage>()
        .is_ok_and(|base| base.is_pinned());
    match (pinned, allow_floating) {
        (true, _) => Cell::new(value).fg(Color::Green),
        (false, true) => Cell::new(value).fg(Color::Yellow),
        (false, false) => Cell::new(value).fg(Color::Red),
    }
}

fn format_list(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}
