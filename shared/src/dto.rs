//! Values exchanged with the storage backend.

use serde::{Deserialize, Serialize};

/// Locates one drive item: the drive (container) and the item inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemRef {
    pub drive_id: String,
    pub item_id: String,
}

impl ItemRef {
    pub fn new(drive_id: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            drive_id: drive_id.into(),
            item_id: item_id.into(),
        }
    }

    /// Another item living in the same drive.
    pub fn sibling(&self, item_id: impl Into<String>) -> Self {
        Self::new(self.drive_id.clone(), item_id)
    }
}

/// A direct child of a folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveEntry {
    pub id: String,
    pub name: String,
    pub size: Option<u64>,
    pub is_folder: bool,
}

/// Handle for polling an asynchronous copy job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyJob {
    pub monitor_url: String,
    pub drive_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CopyStatus {
    Pending,
    Completed { item_id: String },
    Failed { detail: String },
}

/// One line of the manifest mailed to recipients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub size: String,
}

impl ManifestEntry {
    pub fn new(name: impl Into<String>, size_bytes: Option<u64>) -> Self {
        Self {
            name: name.into(),
            size: format_size_mb(size_bytes),
        }
    }
}

/// Renders a byte count as megabytes with two decimals, or `-` when unknown.
pub fn format_size_mb(size_bytes: Option<u64>) -> String {
    match size_bytes {
        Some(bytes) => format!("{:.2}MB", bytes as f64 / (1024.0 * 1024.0)),
        None => "-".to_string(),
    }
}

/// A composed notification mail, ready to hand to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub to: String,
    pub cc: Vec<String>,
    pub subject: String,
    pub html_body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_is_rendered_in_megabytes() {
        assert_eq!(format_size_mb(Some(1024 * 1024)), "1.00MB");
        assert_eq!(format_size_mb(Some(3 * 1024 * 1024 / 2)), "1.50MB");
        assert_eq!(format_size_mb(None), "-");
    }
}
