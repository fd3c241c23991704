//! Loads share requests from the request-form workbook and writes outcomes
//! back to it.

use std::sync::Arc;

use shared::config::Settings;
use shared::dto::ItemRef;
use shared::error::Result;
use tracing::{debug, error, info};

use crate::processor::Outcome;
use crate::record::{col, OutcomeFields, Record, ShareStatus};
use crate::storage::{RowHandle, StorageClient};

#[derive(Debug, Clone)]
pub struct RowEntry {
    pub row: RowHandle,
    pub record: Record,
    stored: OutcomeFields,
}

impl RowEntry {
    fn is_dirty(&self) -> bool {
        self.record.outcome_fields() != self.stored
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub written: usize,
    pub failed: usize,
}

pub struct RowStore {
    storage: Arc<dyn StorageClient>,
    workbook: ItemRef,
    sheet: String,
    entries: Vec<RowEntry>,
}

impl RowStore {
    /// Reads the worksheet and keeps the eligible rows, in sheet order.
    pub async fn load(storage: Arc<dyn StorageClient>, settings: &Settings) -> Result<Self> {
        let folder = storage.resolve_item(&settings.request_form_url).await?;
        let workbook = storage
            .find_child(&folder, &settings.request_form_name)
            .await?;
        let rows = storage
            .read_table(
                &workbook,
                &settings.request_form_sheet,
                settings.request_form_header_row,
            )
            .await?;

        let total = rows.len();
        let entries: Vec<RowEntry> = rows
            .into_iter()
            .filter(|(_, cells)| cells.iter().any(|c| !c.trim().is_empty()))
            .filter_map(|(row, cells)| {
                let record = Record::from_row(&cells);
                if !record.is_eligible() {
                    return None;
                }
                debug!(row, valid = record.is_valid(), "queued row");
                Some(RowEntry {
                    row,
                    record,
                    stored: OutcomeFields::from_cells(&cells),
                })
            })
            .collect();
        info!(
            workbook = %settings.request_form_name,
            rows = total,
            eligible = entries.len(),
            "request form loaded"
        );

        Ok(Self {
            storage,
            workbook,
            sheet: settings.request_form_sheet.clone(),
            entries,
        })
    }

    pub fn entries(&self) -> &[RowEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records the outcome of processing entry `idx`. The share date is set
    /// whatever the outcome; the share URL only changes on success.
    pub fn reconcile(&mut self, idx: usize, outcome: Outcome, share_date: &str) {
        let Some(entry) = self.entries.get_mut(idx) else {
            return;
        };
        let record = &mut entry.record;
        record.share_date = share_date.to_string();
        match outcome {
            Outcome::Success { share_url } => {
                record.share_url = share_url;
                record.share_status = ShareStatus::Sent;
                record.error.clear();
            }
            Outcome::Failure { error } => {
                record.share_status = ShareStatus::Error;
                record.error = error;
            }
        }
    }

    /// Writes every changed row back, one request per row, so rows written
    /// before a failure stay written.
    pub async fn flush(&mut self) -> FlushReport {
        let mut report = FlushReport::default();
        for entry in self.entries.iter_mut().filter(|e| e.is_dirty()) {
            let fields = entry.record.outcome_fields();
            let result = self
                .storage
                .write_row_range(
                    &self.workbook,
                    &self.sheet,
                    entry.row,
                    col::OUTPUT_START,
                    col::OUTPUT_END,
                    &fields.clone().into_values(),
                )
                .await;
            match result {
                Ok(()) => {
                    entry.stored = fields;
                    report.written += 1;
                }
                Err(err) => {
                    error!(row = entry.row, error = %err, "failed to write row outcome");
                    report.failed += 1;
                }
            }
        }
        report
    }
}
