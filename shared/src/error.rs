use thiserror::Error;

/// Failures raised while processing share requests.
///
/// The `Display` text of a row-level variant is written verbatim into the
/// request form's error column, so messages stay short and human readable.
#[derive(Error, Debug)]
pub enum ShareError {
    #[error("Missing Data: {0}")]
    Validation(String),
    #[error("could not resolve '{locator}': {reason}")]
    Resolution { locator: String, reason: String },
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },
    #[error("{context} failed: {status} {body}")]
    Backend {
        status: u16,
        context: String,
        body: String,
    },
    /// Detail reported by the backend for a failed copy job.
    #[error("{0}")]
    CopyFailed(String),
    #[error("copy job did not finish after {0} polls")]
    Timeout(u32),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ShareError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        ShareError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn backend(status: u16, context: impl Into<String>, body: impl Into<String>) -> Self {
        ShareError::Backend {
            status,
            context: context.into(),
            body: body.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ShareError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_the_missing_folder() {
        let err = ShareError::not_found("folder", "ACME");
        assert_eq!(err.to_string(), "folder 'ACME' not found");
    }

    #[test]
    fn backend_error_carries_status_and_body() {
        let err = ShareError::backend(403, "create share link", "accessDenied");
        assert_eq!(err.to_string(), "create share link failed: 403 accessDenied");
    }
}
