// Copyright 2026 Stockcheck Contributors
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use stockcheck_runtime::cli::{self, check_cmd::CheckArgs, output};
use stockcheck_runtime::logging::{self, LogFormat};

#[derive(Parser)]
#[command(
    name = "stockcheck",
    about = "Stockcheck: verify per-variant stock on marketplace listings",
    version,
    after_help = "Run 'stockcheck <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Log level when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log format on stderr (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: LogFormat,

    /// Config file (defaults to $STOCKCHECK_CONFIG, ./stockcheck.json, ~/.stockcheck/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check stock for every row of an input file
    Check(CheckArgs),
    /// Explain whether a displayed option matches a requested value
    Match {
        /// Option text as shown on the listing
        displayed: String,
        /// Value from the input row
        requested: String,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global flags via environment variables so all modules can check them
    if cli.json {
        std::env::set_var(output::JSON_ENV, "1");
    }
    if cli.quiet {
        std::env::set_var(output::QUIET_ENV, "1");
    }
    if cli.no_color {
        std::env::set_var(output::NO_COLOR_ENV, "1");
    }
    logging::init(&cli.log_level, cli.log_format);

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Check(args) => cli::check_cmd::run(&args, config).await,
        Commands::Match {
            displayed,
            requested,
        } => cli::match_cmd::run(&displayed, &requested, config).await,
        Commands::Doctor => cli::doctor::run(config).await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "stockcheck", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if !output::is_quiet() && !output::is_json() {
            eprintln!("  Error: {e:#}");
        }
        if output::is_json() {
            output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        }
        std::process::exit(1);
    }

    result
}
