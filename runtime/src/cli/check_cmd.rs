//! `stockcheck check <input>`: run a batch of listing checks.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use stockcheck_engine::{CheckStatus, ListingChecker};

use crate::cli::output::{self, Styled};
use crate::config::RuntimeConfig;
use crate::input::{self, LoadOptions};
use crate::renderer::chromium::ChromiumRenderer;
use crate::renderer::Renderer;
use crate::runner::{RunOptions, Runner};
use crate::sink::{Report, ResultLog};

#[derive(Debug, Clone, Default, clap::Args)]
pub struct CheckArgs {
    /// Input rows: a JSON array or JSON Lines file
    pub input: PathBuf,
    /// Write the full report as JSON to this file
    #[arg(long, short)]
    pub output: Option<PathBuf>,
    /// Concurrent browser pages
    #[arg(long)]
    pub workers: Option<usize>,
    /// Retries for blocked or faulted checks
    #[arg(long)]
    pub retries: Option<u32>,
    /// Delay between listings and base retry backoff, in milliseconds
    #[arg(long)]
    pub delay_ms: Option<u64>,
    /// First input row to check (1-based)
    #[arg(long, default_value = "1")]
    pub start_row: usize,
    /// Check at most this many rows
    #[arg(long)]
    pub limit: Option<usize>,
    /// Rows without a variation reuse the last one given for the same listing
    #[arg(long)]
    pub inherit_variation: bool,
    /// Show the browser window
    #[arg(long)]
    pub headful: bool,
    /// Persistent browser profile directory
    #[arg(long)]
    pub profile_dir: Option<PathBuf>,
    /// Report UNKNOWN instead of IN_STOCK when no signal is found
    #[arg(long)]
    pub strict: bool,
}

impl CheckArgs {
    /// Fold command-line overrides into the loaded config.
    pub fn apply(&self, config: &mut RuntimeConfig) {
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(retries) = self.retries {
            config.retry.max_retries = retries;
        }
        if let Some(delay) = self.delay_ms {
            config.retry.delay_ms = delay;
        }
        if self.headful {
            config.headless = false;
        }
        if let Some(dir) = &self.profile_dir {
            config.profile_dir = Some(dir.clone());
        }
        if self.strict {
            config.engine.availability.strict = true;
        }
    }

    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            start_row: self.start_row,
            limit: self.limit,
            inherit_variation: self.inherit_variation,
        }
    }
}

/// Run the check command.
pub async fn run(args: &CheckArgs, config_path: Option<&Path>) -> Result<()> {
    let (mut config, source) = RuntimeConfig::load(config_path)?;
    args.apply(&mut config);
    config.validate()?;
    if let Some(path) = &source {
        tracing::info!(path = %path.display(), "config loaded");
    }

    let items = input::load_file(&args.input, &args.load_options())?;
    if items.is_empty() {
        if output::is_json() {
            output::print_json(&serde_json::json!({ "rows": [], "message": "nothing to check" }));
        } else if !output::is_quiet() {
            eprintln!("  Nothing to check in {}.", args.input.display());
        }
        return Ok(());
    }

    let run_id = uuid::Uuid::new_v4().to_string();
    let mut log = ResultLog::open(&config.result_log_path(), run_id.as_str())?;

    let renderer = Arc::new(
        ChromiumRenderer::launch(&config)
            .await
            .context("failed to launch Chromium (run `stockcheck doctor`)")?,
    );
    let runner = Runner::new(
        renderer.clone(),
        ListingChecker::new(config.engine.clone()),
        RunOptions {
            workers: config.workers,
            retry: config.retry,
            show_progress: !output::is_quiet() && !output::is_json(),
        },
    );

    let result = runner.run(&run_id, items, &mut log).await;
    if let Err(e) = renderer.shutdown().await {
        tracing::warn!("browser shutdown failed: {e:#}");
    }
    let report = result?;

    if let Some(path) = &args.output {
        report.write(path)?;
    }

    if output::is_json() {
        output::print_json(&serde_json::to_value(&report)?);
        return Ok(());
    }
    if !output::is_quiet() {
        print_table(&report);
        print_summary(&report, log.path(), args.output.as_deref());
    }
    Ok(())
}

fn print_table(report: &Report) {
    let s = Styled::new();
    println!();
    println!(
        "  {:<5} {:<14} {:<14} {:<40} {}",
        "ROW", "ITEM", "STATUS", "VARIANT", "DETAIL"
    );
    for row in &report.rows {
        let variant = row
            .dimensions
            .iter()
            .map(|(_, v)| v.as_str())
            .collect::<Vec<_>>()
            .join(" / ");
        let flag = if row.mismatch {
            format!(" {}", s.warn_sym())
        } else {
            String::new()
        };
        println!(
            "  {:<5} {:<14} {:<14} {:<40} {}{flag}",
            row.row,
            row.item_number.as_deref().unwrap_or("-"),
            row.status.as_str(),
            truncate(&variant, 40),
            row.reason.as_deref().unwrap_or(""),
        );
    }
    println!();
}

fn print_summary(report: &Report, log_path: &Path, output: Option<&Path>) {
    let s = Styled::new();
    let total = report.rows.len();
    let in_stock = report.count(CheckStatus::InStock);
    let out_of_stock = report.count(CheckStatus::OutOfStock);
    let unknown = report.count(CheckStatus::Unknown);
    let blocked = report.count(CheckStatus::Blocked);
    let errors = report.count(CheckStatus::Error);

    let sym = if blocked + errors == 0 {
        s.ok_sym()
    } else {
        s.warn_sym()
    };
    eprintln!(
        "  {sym} {} listings: {in_stock} in stock, {out_of_stock} out of stock, {unknown} unknown, {blocked} blocked, {errors} errors",
        s.bold(&total.to_string())
    );
    let mismatches = report.mismatches();
    if mismatches > 0 {
        eprintln!(
            "  {} {mismatches} rows disagree with the sheet",
            s.warn_sym()
        );
    }
    if blocked > 0 {
        eprintln!(
            "  {}",
            s.dim("Blocked listings usually need a cookie header, a logged-in --profile-dir or a longer --delay-ms.")
        );
    }
    eprintln!("  {}", s.dim(&format!("Results appended to {}", log_path.display())));
    if let Some(path) = output {
        eprintln!("  {}", s.dim(&format!("Report written to {}", path.display())));
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let cut: String = text.chars().take(width.saturating_sub(1)).collect();
    format!("{cut}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = CheckArgs {
            workers: Some(4),
            retries: Some(0),
            delay_ms: Some(500),
            headful: true,
            strict: true,
            ..CheckArgs::default()
        };
        let mut config = RuntimeConfig::default();
        args.apply(&mut config);

        assert_eq!(config.workers, 4);
        assert_eq!(config.retry.max_retries, 0);
        assert_eq!(config.retry.delay_ms, 500);
        assert!(!config.headless);
        assert!(config.engine.availability.strict);
    }

    #[test]
    fn test_unset_flags_keep_config() {
        let mut config = RuntimeConfig {
            workers: 2,
            ..RuntimeConfig::default()
        };
        CheckArgs::default().apply(&mut config);
        assert_eq!(config, RuntimeConfig {
            workers: 2,
            ..RuntimeConfig::default()
        });
    }

    #[test]
    fn test_truncate_marks_cut() {
        assert_eq!(truncate("Grey", 10), "Grey");
        assert_eq!(truncate("Silver - Gel Back 59", 8), "Silver …");
    }
}
