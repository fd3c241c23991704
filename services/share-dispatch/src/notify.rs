//! Renders the mail that tells recipients where their files are.

use shared::dto::{ManifestEntry, Notification};

use crate::record::Record;

pub fn compose(
    record: &Record,
    dest_name: &str,
    share_url: &str,
    manifest: &[ManifestEntry],
    subject_prefix: &str,
) -> Notification {
    let file_list: String = manifest
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            format!(
                "{}-{}<br>Size: {}<br>",
                idx + 1,
                escape_html(&entry.name),
                escape_html(&entry.size)
            )
        })
        .collect();

    let html_body = format!(
        "<p>Hello {contact},</p>\
         <p>The folder {dest} has been shared with {company} via the link below.</p>\
         <p><b>OEM:</b> {oem}</p>\
         <p><b>Project:</b> {project}</p>\
         <p><b>System:</b> {system}</p>\
         <p><b>Part Name:</b> {part_name}</p>\
         <p><b>Part Number:</b> {part_number}</p>\
         <p><b>Link:</b><br><a href=\"{url}\">{dest}</a></p>\
         <p><b>Contents:</b><br>{file_list}</p>\
         <p><b>Comment / Request:</b></p>\
         <p><b>{comment}</b></p>\
         <p><b>Contact:</b> {requester}</p>\
         <p>Best regards.</p>",
        contact = escape_html(&record.recipient_contact),
        dest = escape_html(dest_name),
        company = escape_html(&record.recipient_company),
        oem = escape_html(&record.oem),
        project = escape_html(&record.project),
        system = escape_html(&record.system),
        part_name = escape_html(&record.part_name),
        part_number = escape_html(&record.part_number),
        url = escape_html(share_url),
        comment = escape_html(&record.comment),
        requester = escape_html(&record.requester),
    );

    Notification {
        to: record.recipient_email.clone(),
        cc: record.notification_cc(),
        subject: format!(
            "{subject_prefix}_{}_{}",
            record.recipient_company, record.subject
        ),
        html_body,
    }
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
