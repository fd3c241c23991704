//! One pass over the request form, repeated on a fixed interval.

use std::sync::Arc;

use shared::config::Settings;
use shared::error::Result;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::processor::RequestProcessor;
use crate::row_store::RowStore;
use crate::storage::StorageClient;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub flushed: usize,
}

/// Loads the form, processes every eligible row in order and writes the
/// outcomes back. A load failure ends the pass before anything is written.
pub async fn run_pass(
    storage: Arc<dyn StorageClient>,
    processor: &RequestProcessor,
    settings: &Settings,
) -> Result<PassSummary> {
    let mut store = RowStore::load(storage, settings).await?;
    let mut summary = PassSummary::default();

    for idx in 0..store.len() {
        let (row, company) = {
            let entry = &store.entries()[idx];
            (entry.row, entry.record.recipient_company.clone())
        };
        info!(row, company = %company, "processing share request");
        let outcome = processor.process(&store.entries()[idx].record).await;
        let share_date = processor.clock().now().format("%d.%m.%Y").to_string();

        summary.processed += 1;
        if outcome.is_success() {
            summary.succeeded += 1;
            info!(row, company = %company, "share request completed");
        } else {
            summary.failed += 1;
        }
        store.reconcile(idx, outcome, &share_date);
    }

    let report = store.flush().await;
    summary.flushed = report.written;
    if report.failed > 0 {
        warn!(failed = report.failed, "some row outcomes were not written back");
    }
    Ok(summary)
}

/// Runs passes forever (or once, when configured), sleeping between them.
pub async fn run_forever(
    storage: Arc<dyn StorageClient>,
    processor: RequestProcessor,
    settings: &Settings,
) {
    loop {
        match run_pass(storage.clone(), &processor, settings).await {
            Ok(summary) => info!(
                processed = summary.processed,
                succeeded = summary.succeeded,
                failed = summary.failed,
                flushed = summary.flushed,
                "pass finished"
            ),
            Err(err) => error!(error = %err, "pass aborted"),
        }

        if settings.run_once {
            return;
        }
        info!(seconds = settings.frequency, "sleeping until next pass");
        sleep(settings.poll_interval()).await;
    }
}
