//! Batch regrid/downscale of input files.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{error, info, warn};

use forcing_core::stages::FileOutcome;
use forcing_core::{ForcingEngine, ProductKind};

/// One input file that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub file: String,
    /// Error kind, e.g. `malformed_filename`
    pub kind: &'static str,
    pub error: String,
}

/// Counts for one batch run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub product: Option<ProductKind>,
    pub processed: usize,
    pub substituted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<FileFailure>,
    /// Files never started because a failure stopped the batch
    pub not_started: usize,
}

impl BatchSummary {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    fn record(&mut self, file: String, result: forcing_core::Result<FileOutcome>) {
        match result {
            Ok(FileOutcome::Processed { .. }) => self.processed += 1,
            Ok(FileOutcome::Substituted { .. }) => self.substituted += 1,
            Ok(FileOutcome::Skipped { .. }) => self.skipped += 1,
            Err(e) => {
                self.failed += 1;
                self.failures.push(FileFailure {
                    file,
                    kind: e.kind(),
                    error: e.to_string(),
                });
            }
        }
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed={} substituted={} skipped={} failed={}",
            self.processed, self.substituted, self.skipped, self.failed
        )?;
        if self.not_started > 0 {
            write!(f, " not_started={}", self.not_started)?;
        }
        Ok(())
    }
}

/// Runs the regrid/downscale chain over many input files.
pub struct BatchRunner {
    engine: Arc<ForcingEngine>,
    parallel: usize,
    fail_fast: bool,
    downscale_shortwave: bool,
}

impl BatchRunner {
    pub fn new(engine: Arc<ForcingEngine>, parallel: usize) -> Self {
        Self {
            engine,
            parallel: parallel.max(1),
            fail_fast: false,
            downscale_shortwave: false,
        }
    }

    /// Stop scheduling new files after the first failure.
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn downscale_shortwave(mut self, shortwave: bool) -> Self {
        self.downscale_shortwave = shortwave;
        self
    }

    /// Process every file. Each file succeeds or fails on its own; the
    /// summary carries the outcome counts.
    ///
    /// With fail-fast set, a failure stops new files from being scheduled.
    /// Files already scheduled run to completion and are counted normally.
    pub async fn run(&self, product: ProductKind, files: Vec<String>) -> BatchSummary {
        let total = files.len();
        info!(product = %product, files = total, parallel = self.parallel, "Starting batch");

        let stop = AtomicBool::new(false);
        let stop = &stop;
        let results: Vec<(String, Option<forcing_core::Result<FileOutcome>>)> = stream::iter(files)
            .map(move |file| {
                // Decided when the file is handed to the buffer, before any poll
                let scheduled = !stop.load(Ordering::SeqCst);
                let engine = self.engine.clone();
                let shortwave = self.downscale_shortwave;
                let fail_fast = self.fail_fast;
                async move {
                    if !scheduled {
                        return (file, None);
                    }
                    let result = engine.process_file(product, &file, shortwave).await;
                    if let Err(e) = &result {
                        error!(file = %file, error = %e, "Failed to process file");
                        if fail_fast {
                            stop.store(true, Ordering::SeqCst);
                        }
                    }
                    (file, Some(result))
                }
            })
            .buffer_unordered(self.parallel)
            .collect()
            .await;

        let mut summary = BatchSummary {
            product: Some(product),
            ..BatchSummary::default()
        };
        for (file, result) in results {
            match result {
                Some(result) => summary.record(file, result),
                None => summary.not_started += 1,
            }
        }

        if summary.not_started > 0 {
            warn!(not_started = summary.not_started, "Batch stopped after failure");
        }
        info!(
            product = %product,
            processed = summary.processed,
            substituted = summary.substituted,
            skipped = summary.skipped,
            failed = summary.failed,
            "Batch complete"
        );
        summary
    }
}
