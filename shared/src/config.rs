use std::time::Duration;

use serde::Deserialize;

fn default_frequency() -> u64 {
    60
}

fn default_graph_base_url() -> String {
    "https://graph.microsoft.com/v1.0".into()
}

fn default_login_base_url() -> String {
    "https://login.microsoftonline.com".into()
}

fn default_graph_timeout_secs() -> u64 {
    120
}

fn default_header_row() -> u32 {
    6
}

fn default_mail_subject_prefix() -> String {
    "DATA_SHARE".into()
}

fn default_copy_poll_interval_secs() -> u64 {
    5
}

/// Runtime settings, read once from the environment at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Seconds to sleep between two passes over the request form.
    #[serde(default = "default_frequency")]
    pub frequency: u64,
    #[serde(default)]
    pub run_once: bool,

    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// Pre-acquired bearer token; bypasses the client-credentials grant.
    #[serde(default)]
    pub graph_access_token: Option<String>,
    #[serde(default = "default_graph_base_url")]
    pub graph_base_url: String,
    #[serde(default = "default_login_base_url")]
    pub login_base_url: String,
    #[serde(default = "default_graph_timeout_secs")]
    pub graph_timeout_secs: u64,
    #[serde(default)]
    pub graph_accept_invalid_certs: bool,

    pub request_form_url: String,
    pub request_form_name: String,
    pub request_form_sheet: String,
    #[serde(default = "default_header_row")]
    pub request_form_header_row: u32,
    pub sent_url: String,

    #[serde(default)]
    pub mail_sender: Option<String>,
    #[serde(default = "default_mail_subject_prefix")]
    pub mail_subject_prefix: String,

    #[serde(default = "default_copy_poll_interval_secs")]
    pub copy_poll_interval_secs: u64,
    #[serde(default)]
    pub copy_poll_max_attempts: Option<u32>,
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let settings: Settings = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        let has_token = self
            .graph_access_token
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty());
        let has_credentials = !self.tenant_id.is_empty()
            && !self.client_id.is_empty()
            && !self.client_secret.is_empty();
        if !has_token && !has_credentials {
            return Err(config::ConfigError::Message(
                "either GRAPH_ACCESS_TOKEN or TENANT_ID, CLIENT_ID and CLIENT_SECRET must be set"
                    .into(),
            ));
        }
        if self.request_form_header_row == 0 {
            return Err(config::ConfigError::Message(
                "REQUEST_FORM_HEADER_ROW is 1-based and must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.frequency)
    }

    pub fn graph_timeout(&self) -> Duration {
        Duration::from_secs(self.graph_timeout_secs)
    }

    pub fn copy_poll_interval(&self) -> Duration {
        Duration::from_secs(self.copy_poll_interval_secs)
    }

    /// Sender mailbox, if one is configured and non-blank.
    pub fn mail_sender(&self) -> Option<&str> {
        self.mail_sender.as_deref().filter(|s| !s.trim().is_empty())
    }
}
