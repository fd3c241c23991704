//! Drives a single request through copy, share, manifest and notification.

use std::sync::Arc;

use chrono::NaiveDateTime;
use shared::config::Settings;
use shared::dto::{CopyJob, CopyStatus, ItemRef};
use shared::error::{Result, ShareError};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::notify;
use crate::poll::{Clock, PollPolicy, SystemClock};
use crate::record::Record;
use crate::storage::StorageClient;

/// Terminal result of processing one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success { share_url: String },
    Failure { error: String },
}

impl Outcome {
    /// True when the request was copied, shared and notified.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

pub struct RequestProcessor {
    storage: Arc<dyn StorageClient>,
    sent_url: String,
    subject_prefix: String,
    poll: PollPolicy,
    clock: Arc<dyn Clock>,
}

impl RequestProcessor {
    /// Creates a processor polling and timestamping as configured in `settings`.
    pub fn new(storage: Arc<dyn StorageClient>, settings: &Settings) -> Self {
        Self {
            storage,
            sent_url: settings.sent_url.clone(),
            subject_prefix: settings.mail_subject_prefix.clone(),
            poll: PollPolicy::from_settings(settings),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Processes an eligible record. Never fails: every error ends up in the
    /// returned [`Outcome`].
    pub async fn process(&self, record: &Record) -> Outcome {
        if !record.error.is_empty() {
            return Outcome::Failure {
                error: record.error.clone(),
            };
        }
        if !record.is_valid() {
            return Outcome::Failure {
                error: "row is not queued for sharing".to_string(),
            };
        }

        match self.share(record).await {
            Ok(share_url) => Outcome::Success { share_url },
            Err(err) => {
                warn!(
                    company = %record.recipient_company,
                    error = %err,
                    "share request failed"
                );
                Outcome::Failure {
                    error: err.to_string(),
                }
            }
        }
    }

    async fn share(&self, record: &Record) -> Result<String> {
        let dest_name = destination_name(&record.recipient_company, self.clock.now());

        let source = self.storage.resolve_item(&record.source_url).await?;
        let sent_area = self.storage.resolve_item(&self.sent_url).await?;
        let company_folder = self
            .storage
            .find_folder(&sent_area, &record.recipient_company)
            .await?;

        let job = self
            .storage
            .start_copy(&source, &company_folder, &dest_name)
            .await?;
        info!(dest = %dest_name, "copy submitted");
        let copied_id = self.wait_for_copy(&job).await?;
        let copied = ItemRef::new(job.drive_id.clone(), copied_id);

        let share_url = self.storage.create_share_link(&copied).await?;
        self.storage
            .grant_access(&copied, &record.share_recipients())
            .await?;

        let manifest = self.storage.list_files_recursive(&copied).await?;
        let notification = notify::compose(
            record,
            &dest_name,
            &share_url,
            &manifest,
            &self.subject_prefix,
        );
        self.storage.send_notification(&notification).await?;
        info!(
            dest = %dest_name,
            to = %notification.to,
            files = manifest.len(),
            "notification sent"
        );

        Ok(share_url)
    }

    /// Polls the copy job until it completes or fails. With a poll ceiling,
    /// gives up right after the last allowed poll.
    async fn wait_for_copy(&self, job: &CopyJob) -> Result<String> {
        let mut attempt = 0u32;
        loop {
            match self.storage.poll_copy(job).await? {
                CopyStatus::Completed { item_id } => return Ok(item_id),
                CopyStatus::Failed { detail } => return Err(ShareError::CopyFailed(detail)),
                CopyStatus::Pending => {
                    attempt += 1;
                    if !self.poll.allows(attempt) {
                        return Err(ShareError::Timeout(attempt));
                    }
                    debug!(attempt, "copy still running");
                    sleep(self.poll.interval).await;
                }
            }
        }
    }
}

/// Name of the copied folder: `{company}-{YYYYMMDDHHmm}`.
pub fn destination_name(company: &str, now: NaiveDateTime) -> String {
    format!("{company}-{}", now.format("%Y%m%d%H%M"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn destination_name_has_minute_granularity() {
        let now = NaiveDate::from_ymd_opt(2024, 5, 3)
            .and_then(|d| d.and_hms_opt(9, 7, 59))
            .expect("valid timestamp");
        assert_eq!(destination_name("ACME", now), "ACME-202405030907");
    }
}
