//! Outcome persistence: the JSONL result log and the final batch report.
//!
//! Features:
//! - Append-only JSONL log, one line per finished check, tagged with the run
//! - Automatic log rotation when the file exceeds `MAX_LOG_SIZE` (50MB)
//! - Rotated files named `.1`, `.2`, etc. (max 5 rotations)

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use stockcheck_engine::{CheckOutcome, CheckStatus, OutcomeSink};

use crate::input::BatchItem;

/// Maximum result log size before rotation (50 MB).
const MAX_LOG_SIZE: u64 = 50 * 1024 * 1024;

/// Maximum number of rotated log files to keep.
const MAX_ROTATIONS: u32 = 5;

/// The status words a stock sheet uses for each check status.
pub fn sheet_status(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::InStock => "INSTOCK",
        CheckStatus::OutOfStock => "OUT OF STOCK",
        CheckStatus::Unknown => "UNKNOWN",
        CheckStatus::Blocked => "BLOCKED",
        CheckStatus::Error => "ERROR",
    }
}

/// Compare a sheet status with a detected one, ignoring case, spaces and
/// underscores. Only definitive detections can disagree with the sheet.
pub fn is_mismatch(sheet: Option<&str>, detected: CheckStatus) -> bool {
    let Some(sheet) = sheet.map(str::trim).filter(|s| !s.is_empty()) else {
        return false;
    };
    if !matches!(detected, CheckStatus::InStock | CheckStatus::OutOfStock) {
        return false;
    }
    let squash = |s: &str| {
        s.chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '/')
            .collect::<String>()
            .to_uppercase()
    };
    squash(sheet) != squash(sheet_status(detected))
}

/// One line of the result log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub run_id: String,
    #[serde(flatten)]
    pub outcome: CheckOutcome,
}

/// Append-only JSONL result log with automatic rotation.
pub struct ResultLog {
    file: File,
    path: PathBuf,
    run_id: String,
    /// Approximate current size (may drift slightly; re-checked on rotation).
    current_size: u64,
}

impl ResultLog {
    /// Open or create the log file.
    pub fn open(path: &Path, run_id: impl Into<String>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open result log: {}", path.display()))?;

        let current_size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            file,
            path: path.to_path_buf(),
            run_id: run_id.into(),
            current_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Append one outcome.
    pub fn append(&mut self, outcome: &CheckOutcome) -> Result<()> {
        if self.current_size >= MAX_LOG_SIZE {
            self.rotate()?;
        }

        let entry = LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            run_id: self.run_id.clone(),
            outcome: outcome.clone(),
        };
        let json = serde_json::to_string(&entry)?;
        writeln!(self.file, "{json}").context("failed to write result log")?;
        self.current_size += json.len() as u64 + 1;
        Ok(())
    }

    /// Rotate log files: results.jsonl → results.jsonl.1, .1 → .2, etc.
    fn rotate(&mut self) -> Result<()> {
        self.file.flush()?;

        let oldest = rotation_path(&self.path, MAX_ROTATIONS);
        if oldest.exists() {
            let _ = std::fs::remove_file(&oldest);
        }

        for i in (1..MAX_ROTATIONS).rev() {
            let from = rotation_path(&self.path, i);
            let to = rotation_path(&self.path, i + 1);
            if from.exists() {
                let _ = std::fs::rename(&from, &to);
            }
        }

        let first_rotation = rotation_path(&self.path, 1);
        let _ = std::fs::rename(&self.path, &first_rotation);

        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| "failed to reopen result log after rotation")?;
        self.current_size = 0;
        tracing::debug!(path = %self.path.display(), "result log rotated");

        Ok(())
    }
}

impl OutcomeSink for ResultLog {
    type Error = anyhow::Error;

    fn record(&mut self, outcome: &CheckOutcome) -> Result<()> {
        self.append(outcome)
    }
}

/// Build path for a rotated log file: `results.jsonl.1`, `results.jsonl.2`, etc.
fn rotation_path(base: &Path, index: u32) -> PathBuf {
    let name = format!(
        "{}.{index}",
        base.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("results.jsonl")
    );
    base.with_file_name(name)
}

/// One row of the final report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub row: usize,
    pub id: String,
    pub label: Option<String>,
    pub listing_url: String,
    pub item_number: Option<String>,
    pub variation_id: Option<String>,
    pub dimensions: Vec<(String, String)>,
    pub status: CheckStatus,
    /// `status` in the sheet's vocabulary.
    pub sheet_value: String,
    pub sheet_status: Option<String>,
    pub mismatch: bool,
    pub reason: Option<String>,
    pub attempts: u32,
    pub elapsed_ms: u64,
}

impl ReportRow {
    pub fn new(item: &BatchItem, outcome: &CheckOutcome) -> Self {
        Self {
            row: item.row,
            id: item.request.id().to_string(),
            label: item.label.clone(),
            listing_url: item.listing.url.clone(),
            item_number: item.listing.item_number.clone(),
            variation_id: item.listing.variation_id.clone(),
            dimensions: item
                .request
                .dimensions()
                .iter()
                .map(|d| (d.name.clone(), d.value.clone()))
                .collect(),
            status: outcome.status,
            sheet_value: sheet_status(outcome.status).to_string(),
            sheet_status: item.sheet_status.clone(),
            mismatch: is_mismatch(item.sheet_status.as_deref(), outcome.status),
            reason: outcome.reason.clone(),
            attempts: outcome.attempts,
            elapsed_ms: outcome.elapsed_ms,
        }
    }
}

/// The finished batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub rows: Vec<ReportRow>,
}

impl Report {
    pub fn count(&self, status: CheckStatus) -> usize {
        self.rows.iter().filter(|r| r.status == status).count()
    }

    pub fn mismatches(&self) -> usize {
        self.rows.iter().filter(|r| r.mismatch).count()
    }

    /// Write the report as pretty JSON.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};

    fn outcome(id: &str, status: CheckStatus) -> CheckOutcome {
        CheckOutcome {
            request_id: id.into(),
            listing_url: "https://www.ebay.co.uk/itm/1".into(),
            status,
            reason: None,
            failure: None,
            attempted: Vec::new(),
            gaps: Vec::new(),
            attempts: 1,
            elapsed_ms: 12,
        }
    }

    #[test]
    fn test_sheet_vocabulary() {
        assert_eq!(sheet_status(CheckStatus::InStock), "INSTOCK");
        assert_eq!(sheet_status(CheckStatus::OutOfStock), "OUT OF STOCK");
        assert_eq!(sheet_status(CheckStatus::Blocked), "BLOCKED");
    }

    #[test]
    fn test_mismatch_only_for_definitive_statuses() {
        assert!(!is_mismatch(Some("In Stock"), CheckStatus::InStock));
        assert!(!is_mismatch(Some("OUT_OF_STOCK"), CheckStatus::OutOfStock));
        assert!(is_mismatch(Some("INSTOCK"), CheckStatus::OutOfStock));
        assert!(!is_mismatch(Some("INSTOCK"), CheckStatus::Blocked));
        assert!(!is_mismatch(None, CheckStatus::OutOfStock));
        assert!(!is_mismatch(Some("  "), CheckStatus::OutOfStock));
    }

    #[test]
    fn test_result_log_appends_tagged_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/results.jsonl");
        let mut log = ResultLog::open(&path, "run-1").unwrap();
        log.record(&outcome("a", CheckStatus::InStock)).unwrap();
        log.record(&outcome("b", CheckStatus::Blocked)).unwrap();
        drop(log);

        let lines: Vec<LogEntry> = BufReader::new(File::open(&path).unwrap())
            .lines()
            .map(|l| serde_json::from_str(&l.unwrap()).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].run_id, "run-1");
        assert_eq!(lines[1].outcome.request_id, "b");
        assert_eq!(lines[1].outcome.status, CheckStatus::Blocked);
    }

    #[test]
    fn test_rotation_moves_full_log_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        let mut log = ResultLog::open(&path, "run-2").unwrap();
        log.record(&outcome("a", CheckStatus::InStock)).unwrap();
        log.current_size = MAX_LOG_SIZE;
        log.record(&outcome("b", CheckStatus::InStock)).unwrap();

        assert!(rotation_path(&path, 1).exists());
        let current = std::fs::read_to_string(&path).unwrap();
        assert_eq!(current.lines().count(), 1);
        assert!(current.contains("\"request_id\":\"b\""));
    }
}
