//! z2p-image CLI - Build the zer02prod container image
//!
//! This module contains the shared CLI implementation used by the binary.

mod commands;
mod output;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::EnvFilter;
use zer02prod_image_core::pipeline::BuildError;
use zer02prod_image_core::{Config, config, get_version, load_config};

/// Build, verify and run the zer02prod container image
#[derive(Parser)]
#[command(name = "z2p-image")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build, verify and run the zer02prod container image", long_about = None)]
#[command(after_help = get_banner())]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Increase verbosity level
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Source tree to build (default: current directory)
    #[arg(short = 'C', long = "source", global = true, default_value = ".")]
    source: PathBuf,

    /// Project configuration file (default: <source>/z2p-image.jsonc)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the image and tag it once its entry point is verified
    Build(commands::BuildArgs),
    /// Print the Dockerfile for the current configuration
    Render(commands::RenderArgs),
    /// List the files that would be sent to the daemon
    Context(commands::ContextArgs),
    /// Run the built image in the foreground
    Run(commands::RunArgs),
    /// Check that the image launches the binary directly
    Verify(commands::VerifyArgs),
    /// Build twice from scratch and compare the binaries
    Reproduce(commands::ReproduceArgs),
    /// Diagnose the daemon, configuration and source tree
    Doctor(commands::DoctorArgs),
    /// Manage configuration
    Config(commands::ConfigArgs),
}

/// The source tree a command works on and its configuration
pub(crate) struct Project {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub config: Config,
}

/// Get the ASCII banner for help display
fn get_banner() -> &'static str {
    r#"
     ____        _
 ___|___ \ _ __ (_)_ __ ___   __ _  __ _  ___
|_  / __) | '_ \| | '_ ` _ \ / _` |/ _` |/ _ \
 / / / __/| |_) | | | | | | | (_| | (_| |  __/
/___|_____| .__/|_|_| |_| |_|\__,_|\__, |\___|
          |_|                      |___/
"#
}

/// Parse arguments, run the command and return the process exit code
pub fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    // Configure color output
    if cli.no_color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let root = cli.source.clone();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| config::get_config_path(&root));

    let config = match load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            show_config_error(&e, &config_path);
            return Ok(BuildError::Configuration(String::new()).exit_code());
        }
    };

    if cli.verbose > 0 {
        let data_dir = config::get_data_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let origin = if config_path.exists() {
            ""
        } else {
            " (not present, using defaults)"
        };
        eprintln!(
            "{} Config: {}{}",
            style("[info]").cyan(),
            config_path.display(),
            origin
        );
        eprintln!("{} Source: {}", style("[info]").cyan(), root.display());
        eprintln!("{} Data: {}", style("[info]").cyan(), data_dir);
    }

    let project = Project {
        root,
        config_path,
        config,
    };

    match cli.command {
        Some(Commands::Build(args)) => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(commands::cmd_build(&args, &project, cli.quiet, cli.verbose))?;
            Ok(0)
        }
        Some(Commands::Render(args)) => {
            commands::cmd_render(&args, &project)?;
            Ok(0)
        }
        Some(Commands::Context(args)) => {
            commands::cmd_context(&args, &project, cli.quiet)?;
            Ok(0)
        }
        Some(Commands::Run(args)) => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(commands::cmd_run(&args, &project, cli.quiet))
        }
        Some(Commands::Verify(args)) => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(commands::cmd_verify(&args, &project, cli.quiet))?;
            Ok(0)
        }
        Some(Commands::Reproduce(args)) => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(commands::cmd_reproduce(&args, &project, cli.quiet))
        }
        Some(Commands::Doctor(args)) => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(commands::cmd_doctor(&args, &project, cli.quiet))
        }
        Some(Commands::Config(cmd)) => {
            commands::cmd_config(cmd, &project, cli.quiet)?;
            Ok(0)
        }
        None => {
            // No command - show a welcome message and hint to use --help
            if !cli.quiet {
                println!(
                    "{} {}",
                    style("z2p-image").cyan().bold(),
                    style(get_version()).dim()
                );
                println!();
                println!("Run {} for available commands.", style("--help").green());
            }
            Ok(0)
        }
    }
}

/// Log to stderr; `-v` raises the level, `RUST_LOG` overrides it
fn init_tracing(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("zer02prod_image_core={level},zer02prod_image={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose > 1)
        .init();
}

/// Process exit code for a failed command
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<BuildError>())
        .map_or(1, BuildError::exit_code)
}

/// Print a failed command's error to stderr
pub fn report_error(err: &anyhow::Error) {
    eprintln!();
    match err.chain().find_map(|cause| cause.downcast_ref::<BuildError>()) {
        Some(build_error) => eprintln!("{}", output::format_build_error(build_error)),
        None => eprintln!("{} {:#}", style("Error:").red().bold(), err),
    }
}

fn show_config_error(err: &anyhow::Error, config_path: &Path) {
    eprintln!("{} Configuration error", style("Error:").red().bold());
    eprintln!();
    eprintln!("  {:#}", err);
    eprintln!();
    eprintln!("  Config file: {}", style(config_path.display()).yellow());
    eprintln!();
    eprintln!(
        "  {} Check the config file for syntax errors or unknown fields.",
        style("Tip:").cyan()
    );
    eprintln!(
        "  {} Run 'z2p-image config show' against an empty directory to see every key with its default.",
        style("Tip:").cyan()
    );
}
