//! The resumable download loop.
//!
//! A run starts from one cursor and keeps asking for the next page until the
//! feed ends, a request fails for good, or the run is cancelled. After each
//! page the records are appended to the output and, for runs bound to a stored
//! token, the record's `last`/`latest` cursors are advanced and persisted before
//! the next request goes out. Whatever happens later, the store then never
//! points past data that is already on disk.

use indicatif::ProgressBar;
use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::error::Error;
use crate::model::{Page, EXHAUSTED_MARKER};
use crate::progress::ProgressHelper;
use crate::retry::with_retry;
use crate::service::PageFetcher;
use crate::sink::OutputSink;
use crate::store::TokenStore;

/// The stored record a run reports its progress to.
pub struct Binding<'s> {
    pub store: &'s mut TokenStore,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub outcome: Outcome,
    pub pages: u64,
    pub records: u64,
    pub retries: u32,
    /// Cursor the run stopped at: where a resumed run starts, or the end-of-data
    /// cursor (possibly [`EXHAUSTED_MARKER`]) once the feed is complete.
    pub final_token: String,
}

pub struct DownloadEngine<'a, F: ?Sized> {
    fetcher: &'a F,
    retry: RetryConfig,
    cancel: CancellationToken,
    progress: ProgressBar,
}

impl<'a, F: PageFetcher + Sync + ?Sized> DownloadEngine<'a, F> {
    pub fn new(fetcher: &'a F, retry: RetryConfig, cancel: CancellationToken) -> Self {
        DownloadEngine { fetcher, retry, cancel, progress: ProgressBar::hidden() }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Downloads everything reachable from `start_token` into `sink`.
    ///
    /// The sink is finished on every exit path. Fetch failures come back as `Err`
    /// once the output is closed; the bound record then still holds the cursor of
    /// the last page that made it to disk.
    pub async fn run(
        &self,
        start_token: &str,
        mut binding: Option<Binding<'_>>,
        mut sink: OutputSink,
    ) -> Result<DownloadReport, Error> {
        let mut report = DownloadReport {
            outcome: Outcome::Completed,
            pages: 0,
            records: 0,
            retries: 0,
            final_token: start_token.to_string(),
        };

        if let Some(binding) = binding.as_ref() {
            if let Err(e) = binding.store.ensure_writable() {
                if let Err(close_error) = sink.finish() {
                    tracing::warn!(error = %close_error, "failed to close output");
                }
                return Err(e);
            }
        }

        if start_token == EXHAUSTED_MARKER {
            tracing::info!("cursor marks an exhausted feed, nothing to download");
            sink.finish()?;
            return Ok(report);
        }

        let result = self.fetch_loop(&mut report, binding.as_mut(), &mut sink).await;
        let closed = sink.finish();

        match result {
            Ok(outcome) => {
                closed?;
                report.outcome = outcome;
                match outcome {
                    Outcome::Completed => self.progress.finish_with_message("download complete"),
                    Outcome::Interrupted => self.progress.abandon_with_message("download interrupted"),
                }
                tracing::info!(
                    ?outcome,
                    pages = report.pages,
                    records = report.records,
                    retries = report.retries,
                    "download finished"
                );
                Ok(report)
            }
            Err(e) => {
                if let Err(close_error) = closed {
                    tracing::warn!(error = %close_error, "failed to close output after error");
                }
                self.progress.abandon_with_message("download failed");
                tracing::error!(
                    error = %e,
                    pages = report.pages,
                    records = report.records,
                    final_token = %report.final_token,
                    "download failed"
                );
                Err(e)
            }
        }
    }

    async fn fetch_loop(
        &self,
        report: &mut DownloadReport,
        mut binding: Option<&mut Binding<'_>>,
        sink: &mut OutputSink,
    ) -> Result<Outcome, Error> {
        let mut progress_token = report.final_token.clone();

        loop {
            if self.cancel.is_cancelled() {
                return Ok(Outcome::Interrupted);
            }

            let fetched = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(Outcome::Interrupted),
                fetched = with_retry(&self.retry, &self.cancel, || self.fetcher.fetch_page(&progress_token)) => fetched,
            };
            let (page, retries) = match fetched {
                Ok(fetched) => fetched,
                Err(Error::Interrupted) => return Ok(Outcome::Interrupted),
                Err(e) => return Err(e),
            };
            report.retries += retries;

            let Page { records, next_token, final_token, stats } = page;
            ProgressHelper::apply_stats(&self.progress, &stats);
            sink.write_page(&records)?;
            report.pages += 1;
            report.records += records.len() as u64;
            self.progress.inc(records.len() as u64);

            match next_token {
                Some(next) => {
                    if let Some(binding) = binding.as_deref_mut() {
                        binding.store.record_progress(&binding.name, &next, stats.remaining)?;
                    }
                    tracing::debug!(page = report.pages, records = records.len(), "page committed");
                    report.final_token = next.clone();
                    progress_token = next;
                }
                None => {
                    let end = final_token.unwrap_or_else(|| EXHAUSTED_MARKER.to_string());
                    if let Some(binding) = binding.as_deref_mut() {
                        binding.store.record_completion(&binding.name, &end)?;
                    }
                    report.final_token = end;
                    return Ok(Outcome::Completed);
                }
            }
        }
    }
}
