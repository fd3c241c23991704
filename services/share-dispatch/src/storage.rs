//! Capabilities the request pipeline needs from the storage backend.

use async_trait::async_trait;
use shared::dto::{CopyJob, CopyStatus, DriveEntry, ItemRef, ManifestEntry, Notification};
use shared::error::{Result, ShareError};

/// Physical, 1-based row number inside the request form's worksheet.
pub type RowHandle = u32;

#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Maps a sharing or browser URL onto the drive item it points at.
    async fn resolve_item(&self, locator: &str) -> Result<ItemRef>;

    /// Lists the direct children of a folder, following every result page.
    async fn list_children(&self, parent: &ItemRef) -> Result<Vec<DriveEntry>>;

    /// Submits an asynchronous copy of `source` below `dest_parent`.
    async fn start_copy(
        &self,
        source: &ItemRef,
        dest_parent: &ItemRef,
        dest_name: &str,
    ) -> Result<CopyJob>;

    /// Reports the current state of a submitted copy job.
    async fn poll_copy(&self, job: &CopyJob) -> Result<CopyStatus>;

    /// Creates a view-only link scoped to explicitly granted users.
    async fn create_share_link(&self, item: &ItemRef) -> Result<String>;

    /// Grants read access without the backend mailing its own invitation.
    async fn grant_access(&self, item: &ItemRef, emails: &[String]) -> Result<()>;

    /// Returns the non-empty rows of `sheet` from `start_row` downwards.
    async fn read_table(
        &self,
        workbook: &ItemRef,
        sheet: &str,
        start_row: RowHandle,
    ) -> Result<Vec<(RowHandle, Vec<String>)>>;

    /// Overwrites the outcome columns of one worksheet row.
    async fn write_row_range(
        &self,
        workbook: &ItemRef,
        sheet: &str,
        row: RowHandle,
        col_start: &str,
        col_end: &str,
        values: &[String],
    ) -> Result<()>;

    /// Sends the notification mail from the configured sender.
    async fn send_notification(&self, notification: &Notification) -> Result<()>;

    async fn find_child(&self, parent: &ItemRef, name: &str) -> Result<ItemRef> {
        self.list_children(parent)
            .await?
            .into_iter()
            .find(|entry| entry.name == name)
            .map(|entry| parent.sibling(entry.id))
            .ok_or_else(|| ShareError::not_found("item", name))
    }

    async fn find_folder(&self, parent: &ItemRef, name: &str) -> Result<ItemRef> {
        self.list_children(parent)
            .await?
            .into_iter()
            .find(|entry| entry.is_folder && entry.name == name)
            .map(|entry| parent.sibling(entry.id))
            .ok_or_else(|| ShareError::not_found("folder", name))
    }

    /// Lists every file below `root`; a folder's own files come before those
    /// of its subfolders. Folders themselves are not listed.
    async fn list_files_recursive(&self, root: &ItemRef) -> Result<Vec<ManifestEntry>> {
        let mut manifest = Vec::new();
        let mut pending = vec![root.clone()];
        while let Some(folder) = pending.pop() {
            let mut subfolders = Vec::new();
            for entry in self.list_children(&folder).await? {
                if entry.is_folder {
                    subfolders.push(folder.sibling(entry.id));
                } else {
                    manifest.push(ManifestEntry::new(entry.name, entry.size));
                }
            }
            pending.extend(subfolders.into_iter().rev());
        }
        Ok(manifest)
    }
}
