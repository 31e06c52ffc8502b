//! Export driver - pages through a result source and streams documents
//!
//! Rows are encoded and written strictly in result order, one at a time.
//! Transient read failures are retried with bounded exponential backoff;
//! what happens once retries run out, and what happens to rows that fail to
//! encode, is decided by `ExportConfig`.

use crate::encode::{encode_row, ExportContext};
use crate::error::ExportError;
use crate::source::{Page, ResultSource};
use crate::types::{ExportConfig, KeySpec, Row, RowErrorPolicy, TimeoutAction};
use crate::xmlpipe::DocsetWriter;
use std::io::Write;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Counters for one finished export
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportStats {
    pub rows_written: u64,
    pub rows_skipped: u64,
    pub pages: u64,
    pub retries: u64,
    pub pages_skipped: u64,
    pub structured_fallbacks: u64,
}

pub struct ExportDriver {
    config: ExportConfig,
    sleep: fn(Duration),
}

impl ExportDriver {
    pub fn new(config: ExportConfig) -> Self {
        ExportDriver {
            config,
            sleep: std::thread::sleep,
        }
    }

    /// Replace the backoff sleep, e.g. to run retries instantly in tests
    pub fn with_sleep(mut self, sleep: fn(Duration)) -> Self {
        self.sleep = sleep;
        self
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Export every row of `source` as one xmlpipe2 document stream into `sink`.
    ///
    /// Key columns are resolved against the source schema before anything is
    /// written. Once the envelope is open it is always closed, including when
    /// a source failure or a row error aborts the export, so the stream stays
    /// well-formed XML. No partially written document is ever left in it.
    pub fn run<S, W>(&self, source: &mut S, key_spec: KeySpec, sink: W) -> Result<ExportStats, ExportError>
    where
        S: ResultSource + ?Sized,
        W: Write,
    {
        let ctx = ExportContext::new(source.schema().clone(), key_spec)?;
        let mut writer = DocsetWriter::new(sink).with_member_markup(self.config.member_markup);
        let mut stats = ExportStats::default();
        let started = Instant::now();

        writer.start()?;
        let outcome = self.export_pages(source, &ctx, &mut writer, &mut stats);
        if let Err(err) = &outcome {
            warn!(error = %err, rows = stats.rows_written, "export aborted, closing document set");
        }
        let closed = writer.finish();
        outcome?;
        closed?;

        info!(
            rows = stats.rows_written,
            skipped = stats.rows_skipped,
            pages = stats.pages,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "query exported"
        );
        Ok(stats)
    }

    fn export_pages<S, W>(
        &self,
        source: &mut S,
        ctx: &ExportContext,
        writer: &mut DocsetWriter<W>,
        stats: &mut ExportStats,
    ) -> Result<(), ExportError>
    where
        S: ResultSource + ?Sized,
        W: Write,
    {
        let mut batch_started = Instant::now();
        let mut since_progress = 0usize;

        while let Some(page) = self.fetch_page(source, stats)? {
            stats.pages += 1;
            for row in page {
                let row = row.map_err(ExportError::Source);
                self.export_row(row, ctx, writer, stats)?;

                since_progress += 1;
                if since_progress >= self.config.progress_interval.max(1) {
                    debug!(
                        rows = stats.rows_written,
                        elapsed_ms = batch_started.elapsed().as_millis() as u64,
                        "read records"
                    );
                    since_progress = 0;
                    batch_started = Instant::now();
                }
            }
        }
        Ok(())
    }

    /// Write one row, or apply the row-error policy to a row that failed to
    /// decode or encode
    fn export_row<W: Write>(
        &self,
        row: Result<Row, ExportError>,
        ctx: &ExportContext,
        writer: &mut DocsetWriter<W>,
        stats: &mut ExportStats,
    ) -> Result<(), ExportError> {
        match row.and_then(|row| encode_row(&row, ctx)) {
            Ok(fragment) => {
                writer.write_document(&fragment)?;
                stats.rows_written += 1;
                stats.structured_fallbacks += fragment.structured_fallbacks as u64;
                Ok(())
            }
            Err(err) => match self.config.on_row_error {
                RowErrorPolicy::Skip => {
                    warn!(error = %err, "skipping row that could not be encoded");
                    stats.rows_skipped += 1;
                    Ok(())
                }
                RowErrorPolicy::Abort => Err(err),
            },
        }
    }

    /// Next page, retrying transient failures.
    ///
    /// With `TimeoutAction::Skip`, a fetch that still fails after the last
    /// retry is logged and the driver moves on to the following page. More
    /// than `max_skipped_pages` skips in a row abort with the timeout, since a
    /// source that never recovers would otherwise be polled forever.
    fn fetch_page<S: ResultSource + ?Sized>(
        &self,
        source: &mut S,
        stats: &mut ExportStats,
    ) -> Result<Option<Page>, ExportError> {
        let retry = &self.config.retry;
        let mut attempt = 1;
        let mut skipped = 0u32;
        loop {
            match source.next_page(self.config.page_size) {
                Ok(page) => return Ok(page),
                Err(err) if err.is_retryable() && attempt < retry.max_attempts.max(1) => {
                    let delay = retry.backoff(attempt);
                    warn!(error = %err, attempt, delay_ms = delay.as_millis() as u64, "retrying page fetch");
                    (self.sleep)(delay);
                    stats.retries += 1;
                    attempt += 1;
                }
                Err(err)
                    if err.is_retryable()
                        && self.config.on_timeout == TimeoutAction::Skip
                        && skipped < self.config.max_skipped_pages =>
                {
                    warn!(error = %err, attempts = attempt, "giving up on page, continuing");
                    stats.pages_skipped += 1;
                    skipped += 1;
                    attempt = 1;
                }
                Err(err) => return Err(ExportError::Source(err)),
            }
        }
    }
}

impl Default for ExportDriver {
    fn default() -> Self {
        ExportDriver::new(ExportConfig::default())
    }
}
