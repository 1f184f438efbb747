//! Batch runner: spread listing checks over a pool of pages.
//!
//! Each worker owns one page for the whole batch and pulls the next item
//! from a shared queue, so a page is never driven by two checks at once.
//! Outcomes flow back over a channel to the caller's sink in completion
//! order; the report is put back into input order at the end.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use stockcheck_engine::{
    check_with_retries, CheckOutcome, CheckStatus, ListingChecker, OutcomeSink, RetryPolicy,
};
use tokio::sync::{mpsc, Mutex};
use tracing::Instrument;

use crate::input::BatchItem;
use crate::renderer::Renderer;
use crate::sink::{Report, ReportRow};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub workers: usize,
    pub retry: RetryPolicy,
    pub show_progress: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            retry: RetryPolicy::default(),
            show_progress: false,
        }
    }
}

pub struct Runner {
    renderer: Arc<dyn Renderer>,
    checker: Arc<ListingChecker>,
    options: RunOptions,
}

impl Runner {
    pub fn new(renderer: Arc<dyn Renderer>, checker: ListingChecker, options: RunOptions) -> Self {
        Self {
            renderer,
            checker: Arc::new(checker),
            options,
        }
    }

    /// Check every item, recording each outcome in `sink` as it finishes.
    pub async fn run<S>(&self, run_id: &str, items: Vec<BatchItem>, sink: &mut S) -> Result<Report>
    where
        S: OutcomeSink,
        S::Error: std::fmt::Display,
    {
        let started_at = Utc::now().to_rfc3339();
        let total = items.len();
        let items = Arc::new(items);
        let queue = Arc::new(Mutex::new((0..total).collect::<VecDeque<_>>()));
        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, CheckOutcome)>();

        let workers = self.options.workers.max(1).min(total.max(1));
        tracing::info!(run_id, total, workers, "batch started");

        // Open every page before any worker starts so a failed open leaves
        // nothing running.
        let mut pages = Vec::with_capacity(workers);
        for worker in 0..workers {
            if total == 0 {
                break;
            }
            let page = self
                .renderer
                .new_page()
                .await
                .with_context(|| format!("failed to open page for worker {worker}"))?;
            pages.push(page);
        }

        let mut handles = Vec::with_capacity(pages.len());
        for (worker, mut page) in pages.into_iter().enumerate() {
            let items = Arc::clone(&items);
            let queue = Arc::clone(&queue);
            let checker = Arc::clone(&self.checker);
            let retry = self.options.retry;
            let tx = tx.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    let next = queue.lock().await.pop_front();
                    let Some(index) = next else { break };
                    let item = &items[index];
                    let span = tracing::info_span!(
                        "check",
                        id = item.request.id(),
                        row = item.row,
                        worker
                    );
                    let outcome =
                        check_with_retries(&checker, page.as_mut(), &item.request, &retry)
                            .instrument(span)
                            .await;
                    if tx.send((index, outcome)).is_err() {
                        break;
                    }
                    if !queue.lock().await.is_empty() {
                        tokio::time::sleep(Duration::from_millis(retry.delay_ms)).await;
                    }
                }
            }));
        }
        drop(tx);

        let progress = progress_bar(total as u64, self.options.show_progress);
        let mut outcomes: Vec<Option<CheckOutcome>> = vec![None; total];
        while let Some((index, outcome)) = rx.recv().await {
            sink.record(&outcome)
                .map_err(|e| anyhow!("failed to record outcome: {e}"))?;
            progress.set_message(format!("{} {}", outcome.request_id, outcome.status));
            progress.inc(1);
            outcomes[index] = Some(outcome);
        }
        progress.finish_and_clear();

        for handle in futures::future::join_all(handles).await {
            handle.context("worker task failed")?;
        }

        let rows: Vec<ReportRow> = items
            .iter()
            .zip(&outcomes)
            .filter_map(|(item, outcome)| outcome.as_ref().map(|o| ReportRow::new(item, o)))
            .collect();
        let report = Report {
            run_id: run_id.to_string(),
            started_at,
            finished_at: Utc::now().to_rfc3339(),
            rows,
        };

        let blocked = report.count(CheckStatus::Blocked);
        if blocked > 0 {
            tracing::warn!(
                blocked,
                "listings could not be checked due to bot protection; try a cookie header, a logged-in profile or a longer delay"
            );
        }
        tracing::info!(
            run_id,
            in_stock = report.count(CheckStatus::InStock),
            out_of_stock = report.count(CheckStatus::OutOfStock),
            errors = report.count(CheckStatus::Error),
            blocked,
            "batch finished"
        );
        Ok(report)
    }
}

fn progress_bar(len: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len);
    let style = ProgressStyle::with_template("  {bar:30} {pos}/{len} [{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}
