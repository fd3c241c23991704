//! In-memory storage backend shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use share_dispatch::record::{col, SEND_TRIGGER};
use share_dispatch::storage::{RowHandle, StorageClient};
use shared::config::Settings;
use shared::dto::{CopyJob, CopyStatus, DriveEntry, ItemRef, Notification};
use shared::error::{Result, ShareError};

pub const FORM_URL: &str = "https://contoso.sharepoint.com/:f:/s/data/forms";
pub const SENT_URL: &str = "https://contoso.sharepoint.com/:f:/s/data/sent";
pub const SOURCE_URL: &str = "https://contoso.sharepoint.com/:f:/s/data/src";
pub const SHARE_LINK: &str = "https://contoso.sharepoint.com/:f:/s/data/shared-copy";
pub const DRIVE: &str = "drive-1";

pub fn settings() -> Settings {
    Settings {
        frequency: 60,
        run_once: true,
        tenant_id: String::new(),
        client_id: String::new(),
        client_secret: String::new(),
        graph_access_token: Some("token".into()),
        graph_base_url: "http://localhost".into(),
        login_base_url: "http://localhost".into(),
        graph_timeout_secs: 5,
        graph_accept_invalid_certs: false,
        request_form_url: FORM_URL.into(),
        request_form_name: "requests.xlsx".into(),
        request_form_sheet: "Requests".into(),
        request_form_header_row: 6,
        sent_url: SENT_URL.into(),
        mail_sender: None,
        mail_subject_prefix: "DATA_SHARE".into(),
        copy_poll_interval_secs: 0,
        copy_poll_max_attempts: None,
    }
}

pub fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 3)
        .and_then(|d| d.and_hms_opt(9, 30, 12))
        .expect("valid timestamp")
}

pub fn request_row(company: &str) -> Vec<String> {
    let mut cells = vec![String::new(); 24];
    cells[col::OEM] = "A".into();
    cells[col::PROJECT] = "P1".into();
    cells[col::SYSTEM] = "Door".into();
    cells[col::PART_NAME] = "Handle".into();
    cells[col::PART_NUMBER] = "4711".into();
    cells[col::SOURCE_URL] = SOURCE_URL.into();
    cells[col::REQUESTER] = "Ada".into();
    cells[col::REQUESTER_EMAIL] = "ada@contoso.com".into();
    cells[col::REQUESTER_CC] = "lead@contoso.com;ops@contoso.com".into();
    cells[col::RECIPIENT_COMPANY] = company.into();
    cells[col::SUBJECT] = "Drawings".into();
    cells[col::COMMENT] = "Please review".into();
    cells[col::RECIPIENT_CONTACT] = "Bob".into();
    cells[col::RECIPIENT_EMAIL] = "bob@acme.com".into();
    cells[col::SEND_FLAG] = SEND_TRIGGER.into();
    cells
}

#[derive(Default)]
pub struct FakeState {
    pub rows: Vec<(RowHandle, Vec<String>)>,
    pub company_folders: Vec<String>,
    pub copy_script: VecDeque<CopyStatus>,
    pub copy_never_finishes: bool,
    pub fail_read: bool,
    pub fail_write_rows: Vec<RowHandle>,
    pub calls: Vec<String>,
    pub copies: Vec<String>,
    pub grants: Vec<Vec<String>>,
    pub notifications: Vec<Notification>,
    pub writes: Vec<(RowHandle, Vec<String>)>,
}

#[derive(Default)]
pub struct FakeStorage {
    pub state: Mutex<FakeState>,
}

impl FakeStorage {
    pub fn with_rows(rows: Vec<(RowHandle, Vec<String>)>) -> Self {
        let storage = Self::default();
        {
            let mut state = storage.state.lock();
            state.rows = rows;
            state.company_folders = vec!["ACME".into(), "Globex".into()];
        }
        storage
    }

    pub fn row(&self, handle: RowHandle) -> Vec<String> {
        self.state
            .lock()
            .rows
            .iter()
            .find(|(row, _)| *row == handle)
            .map(|(_, cells)| cells.clone())
            .unwrap_or_default()
    }

    pub fn called(&self, name: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.as_str() == name)
            .count()
    }

    fn record(&self, name: &str) {
        self.state.lock().calls.push(name.to_string());
    }
}

#[async_trait]
impl StorageClient for FakeStorage {
    async fn resolve_item(&self, locator: &str) -> Result<ItemRef> {
        self.record("resolve_item");
        let item_id = match locator {
            FORM_URL => "form-folder",
            SENT_URL => "sent",
            SOURCE_URL => "source",
            _ => {
                return Err(ShareError::Resolution {
                    locator: locator.to_string(),
                    reason: "404 itemNotFound".into(),
                })
            }
        };
        Ok(ItemRef::new(DRIVE, item_id))
    }

    async fn list_children(&self, parent: &ItemRef) -> Result<Vec<DriveEntry>> {
        self.record("list_children");
        let entry = |id: &str, name: &str, size: Option<u64>, is_folder: bool| DriveEntry {
            id: id.to_string(),
            name: name.to_string(),
            size,
            is_folder,
        };
        let entries = match parent.item_id.as_str() {
            "form-folder" => vec![
                entry("readme", "readme.txt", Some(10), false),
                entry("workbook", "requests.xlsx", Some(2048), false),
            ],
            "sent" => self
                .state
                .lock()
                .company_folders
                .iter()
                .map(|name| entry(&format!("folder-{name}"), name, None, true))
                .collect(),
            "copied" => vec![
                entry("f1", "drawing.pdf", Some(2 * 1024 * 1024), false),
                entry("sub", "cad", None, true),
            ],
            "sub" => vec![entry("f2", "model.step", None, false)],
            _ => Vec::new(),
        };
        Ok(entries)
    }

    async fn start_copy(
        &self,
        _source: &ItemRef,
        dest_parent: &ItemRef,
        dest_name: &str,
    ) -> Result<CopyJob> {
        self.record("start_copy");
        self.state
            .lock()
            .copies
            .push(format!("{}/{dest_name}", dest_parent.item_id));
        Ok(CopyJob {
            monitor_url: "https://monitor.example/job-1".into(),
            drive_id: dest_parent.drive_id.clone(),
        })
    }

    async fn poll_copy(&self, _job: &CopyJob) -> Result<CopyStatus> {
        self.record("poll_copy");
        let mut state = self.state.lock();
        if state.copy_never_finishes {
            return Ok(CopyStatus::Pending);
        }
        Ok(state.copy_script.pop_front().unwrap_or(CopyStatus::Completed {
            item_id: "copied".into(),
        }))
    }

    async fn create_share_link(&self, _item: &ItemRef) -> Result<String> {
        self.record("create_share_link");
        Ok(SHARE_LINK.to_string())
    }

    async fn grant_access(&self, _item: &ItemRef, emails: &[String]) -> Result<()> {
        self.record("grant_access");
        self.state.lock().grants.push(emails.to_vec());
        Ok(())
    }

    async fn read_table(
        &self,
        workbook: &ItemRef,
        _sheet: &str,
        start_row: RowHandle,
    ) -> Result<Vec<(RowHandle, Vec<String>)>> {
        self.record("read_table");
        let state = self.state.lock();
        if state.fail_read {
            return Err(ShareError::backend(503, "read worksheet", "serviceNotAvailable"));
        }
        assert_eq!(workbook.item_id, "workbook");
        Ok(state
            .rows
            .iter()
            .filter(|(row, _)| *row >= start_row)
            .cloned()
            .collect())
    }

    async fn write_row_range(
        &self,
        _workbook: &ItemRef,
        _sheet: &str,
        row: RowHandle,
        col_start: &str,
        col_end: &str,
        values: &[String],
    ) -> Result<()> {
        self.record("write_row_range");
        assert_eq!((col_start, col_end), ("U", "X"));
        let mut state = self.state.lock();
        if state.fail_write_rows.contains(&row) {
            return Err(ShareError::backend(409, "write worksheet row", "editConflict"));
        }
        state.writes.push((row, values.to_vec()));
        if let Some((_, cells)) = state.rows.iter_mut().find(|(r, _)| *r == row) {
            cells.resize(col::ERROR + 1, String::new());
            for (offset, value) in values.iter().enumerate() {
                cells[col::SHARE_URL + offset] = value.clone();
            }
        }
        Ok(())
    }

    async fn send_notification(&self, notification: &Notification) -> Result<()> {
        self.record("send_notification");
        self.state.lock().notifications.push(notification.clone());
        Ok(())
    }
}
