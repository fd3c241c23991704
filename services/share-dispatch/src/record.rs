//! One row of the request form, normalised and validated.

use std::str::FromStr;

use shared::error::ShareError;

/// Value of the send column that queues a row for sharing.
pub const SEND_TRIGGER: &str = "Gönder.";

pub mod col {
    pub const OEM: usize = 0;
    pub const PROJECT: usize = 1;
    pub const SYSTEM: usize = 2;
    pub const PART_NAME: usize = 3;
    pub const PART_NUMBER: usize = 4;
    pub const SOURCE_URL: usize = 7;
    pub const REQUESTER: usize = 9;
    pub const REQUESTER_EMAIL: usize = 10;
    pub const REQUESTER_CC: usize = 11;
    pub const RECIPIENT_COMPANY: usize = 14;
    pub const SUBJECT: usize = 15;
    pub const COMMENT: usize = 16;
    pub const RECIPIENT_CONTACT: usize = 17;
    pub const RECIPIENT_EMAIL: usize = 18;
    pub const SEND_FLAG: usize = 19;
    pub const SHARE_URL: usize = 20;
    pub const SHARE_DATE: usize = 21;
    pub const SHARE_STATUS: usize = 22;
    pub const ERROR: usize = 23;

    /// Worksheet columns spanned by the outcome fields.
    pub const OUTPUT_START: &str = "U";
    pub const OUTPUT_END: &str = "X";
}

/// Value of the share status column; blank means not yet processed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ShareStatus {
    #[default]
    Pending,
    Sent,
    Error,
}

impl ShareStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShareStatus::Pending => "",
            ShareStatus::Sent => "Gönderildi.",
            ShareStatus::Error => "Hata.",
        }
    }
}

impl FromStr for ShareStatus {
    type Err = std::convert::Infallible;

    /// Anything other than the sent or error literal counts as pending.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "Gönderildi." => ShareStatus::Sent,
            "Hata." => ShareStatus::Error,
            _ => ShareStatus::Pending,
        })
    }
}

/// The four columns written back after a row has been processed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutcomeFields {
    pub share_url: String,
    pub share_date: String,
    pub share_status: String,
    pub error: String,
}

impl OutcomeFields {
    pub fn from_cells(cells: &[String]) -> Self {
        Self {
            share_url: cell(cells, col::SHARE_URL),
            share_date: cell(cells, col::SHARE_DATE),
            share_status: cell(cells, col::SHARE_STATUS),
            error: cell(cells, col::ERROR),
        }
    }

    pub fn into_values(self) -> Vec<String> {
        vec![self.share_url, self.share_date, self.share_status, self.error]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub oem: String,
    pub project: String,
    pub system: String,
    pub part_name: String,
    pub part_number: String,
    pub source_url: String,
    pub requester: String,
    pub requester_email: String,
    pub requester_cc_emails: Vec<String>,
    pub recipient_company: String,
    pub recipient_contact: String,
    pub recipient_email: String,
    pub subject: String,
    pub comment: String,
    pub send_flag: String,
    pub share_url: String,
    pub share_date: String,
    pub share_status: ShareStatus,
    pub error: String,
    is_valid: bool,
}

impl Record {
    /// Builds a record from one worksheet row. Short rows are padded with
    /// empty cells.
    pub fn from_row(cells: &[String]) -> Self {
        let mut record = Self {
            oem: cell(cells, col::OEM),
            project: cell(cells, col::PROJECT),
            system: cell(cells, col::SYSTEM),
            part_name: cell(cells, col::PART_NAME),
            part_number: cell(cells, col::PART_NUMBER),
            source_url: cell(cells, col::SOURCE_URL),
            requester: cell(cells, col::REQUESTER),
            requester_email: cell(cells, col::REQUESTER_EMAIL),
            requester_cc_emails: split_emails(&cell(cells, col::REQUESTER_CC)),
            recipient_company: cell(cells, col::RECIPIENT_COMPANY),
            recipient_contact: cell(cells, col::RECIPIENT_CONTACT),
            recipient_email: cell(cells, col::RECIPIENT_EMAIL),
            subject: cell(cells, col::SUBJECT),
            comment: cell(cells, col::COMMENT),
            send_flag: cell(cells, col::SEND_FLAG),
            share_url: cell(cells, col::SHARE_URL),
            share_date: cell(cells, col::SHARE_DATE),
            share_status: cell(cells, col::SHARE_STATUS)
                .parse()
                .unwrap_or_default(),
            error: String::new(),
            is_valid: false,
        };

        if record.is_eligible() {
            match record.validate() {
                Ok(()) => record.is_valid = true,
                Err(err) => record.error = err.to_string(),
            }
        }
        record
    }

    /// Queued for sharing and not yet sent.
    pub fn is_eligible(&self) -> bool {
        self.send_flag == SEND_TRIGGER && self.share_status != ShareStatus::Sent
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    fn validate(&self) -> Result<(), ShareError> {
        let required = [
            ("OEM", &self.oem),
            ("Project", &self.project),
            ("System", &self.system),
            ("Part Name", &self.part_name),
            ("Part Number", &self.part_number),
            ("Source URL", &self.source_url),
            ("Requester", &self.requester),
            ("Requester Email", &self.requester_email),
            ("Recipient Company", &self.recipient_company),
            ("Recipient Contact", &self.recipient_contact),
            ("Recipient Email", &self.recipient_email),
            ("Subject", &self.subject),
            ("Comment", &self.comment),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.is_empty())
            .map(|(label, _)| *label)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ShareError::Validation(missing.join(", ")))
        }
    }

    /// Everyone who gets read access: the recipient, the requester and the
    /// requester's CC list, without duplicates.
    pub fn share_recipients(&self) -> Vec<String> {
        let mut emails = Vec::new();
        push_unique(&mut emails, &self.recipient_email);
        for email in self.notification_cc() {
            push_unique(&mut emails, &email);
        }
        emails
    }

    /// CC list of the notification: the requester and the requester's CC
    /// list, without duplicates and without the recipient.
    pub fn notification_cc(&self) -> Vec<String> {
        let mut emails = Vec::new();
        let candidates =
            std::iter::once(&self.requester_email).chain(self.requester_cc_emails.iter());
        for email in candidates {
            if !email.eq_ignore_ascii_case(&self.recipient_email) {
                push_unique(&mut emails, email);
            }
        }
        emails
    }

    pub fn outcome_fields(&self) -> OutcomeFields {
        OutcomeFields {
            share_url: self.share_url.clone(),
            share_date: self.share_date.clone(),
            share_status: self.share_status.as_str().to_string(),
            error: self.error.clone(),
        }
    }
}

fn cell(cells: &[String], idx: usize) -> String {
    cells
        .get(idx)
        .map(|value| value.trim().to_string())
        .unwrap_or_default()
}

fn push_unique(emails: &mut Vec<String>, email: &str) {
    if !emails.iter().any(|e| e.eq_ignore_ascii_case(email)) {
        emails.push(email.to_string());
    }
}

fn split_emails(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|email| !email.is_empty())
        .map(str::to_string)
        .collect()
}
