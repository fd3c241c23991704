//! Microsoft Graph implementation of the storage capabilities: drive items,
//! sharing, workbook ranges and mail.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use parking_lot::RwLock;
use rand::Rng;
use reqwest::{header::LOCATION, Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use shared::config::Settings;
use shared::dto::{CopyJob, CopyStatus, DriveEntry, ItemRef, Notification};
use shared::error::{Result, ShareError};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::storage::{RowHandle, StorageClient};

const MAX_RETRIES: u32 = 3;

pub struct MsGraphClient {
    http: Client,
    base_url: String,
    login_base_url: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    static_token: Option<String>,
    mail_sender: Option<String>,
    token: RwLock<Option<CachedToken>>,
}

#[derive(Clone, Debug, Deserialize)]
struct OAuthTokenResponse {
    expires_in: u64,
    access_token: String,
}

#[derive(Clone, Debug)]
struct CachedToken {
    token: String,
    refresh_at: Instant,
}

#[derive(Debug, Deserialize)]
struct DriveItemPage {
    value: Vec<DriveItem>,
    #[serde(rename = "@odata.nextLink", default)]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveItem {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    folder: Option<Value>,
    #[serde(default)]
    parent_reference: Option<ParentReference>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParentReference {
    drive_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MonitorResponse {
    status: String,
    #[serde(default)]
    resource_id: Option<String>,
    #[serde(default)]
    error: Option<MonitorError>,
}

#[derive(Debug, Deserialize)]
struct MonitorError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateLinkResponse {
    link: SharingLink,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SharingLink {
    web_url: String,
}

#[derive(Debug, Deserialize)]
struct RangeResponse {
    address: String,
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl MsGraphClient {
    /// Creates a new Microsoft Graph client from the runtime settings.
    pub fn new(settings: &Settings) -> Result<Self> {
        if settings.graph_accept_invalid_certs {
            warn!("TLS certificate validation is disabled for Graph requests");
        }
        let http = Client::builder()
            .timeout(settings.graph_timeout())
            .danger_accept_invalid_certs(settings.graph_accept_invalid_certs)
            .build()
            .map_err(transport)?;

        Ok(Self {
            http,
            base_url: settings.graph_base_url.trim_end_matches('/').to_string(),
            login_base_url: settings.login_base_url.trim_end_matches('/').to_string(),
            tenant_id: settings.tenant_id.clone(),
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            static_token: settings
                .graph_access_token
                .clone()
                .filter(|t| !t.trim().is_empty()),
            mail_sender: settings.mail_sender().map(str::to_string),
            token: RwLock::new(None),
        })
    }

    /// Acquires a token up front so bad credentials fail at startup.
    pub async fn authenticate(&self) -> Result<()> {
        self.access_token().await.map(|_| ())
    }

    fn drive_item_url(&self, item: &ItemRef) -> String {
        format!(
            "{}/drives/{}/items/{}",
            self.base_url, item.drive_id, item.item_id
        )
    }

    fn worksheet_url(&self, workbook: &ItemRef, sheet: &str) -> String {
        format!(
            "{}/workbook/worksheets/{}",
            self.drive_item_url(workbook),
            urlencoding::encode(sheet)
        )
    }

    async fn authorized_request(&self, method: Method, url: String) -> Result<RequestBuilder> {
        let token = self.access_token().await?;
        Ok(self.http.request(method, url).bearer_auth(token))
    }

    /// Sends the request, retrying throttled and failed attempts with backoff.
    /// POSTs are not idempotent here (mail, copy, invite), so they are only
    /// retried when the backend provably did not act on them: a 429, or a
    /// connection that was never established.
    async fn send_with_retry(&self, builder: RequestBuilder) -> Result<Response> {
        let request = builder.build().map_err(transport)?;
        let idempotent = is_idempotent(request.method());
        let mut attempt = 0u32;
        loop {
            let req = request
                .try_clone()
                .ok_or_else(|| ShareError::Transport("request body is not clonable".into()))?;
            match self.http.execute(req).await {
                Ok(response) => {
                    if should_retry(response.status(), idempotent) && attempt < MAX_RETRIES {
                        debug!(status = %response.status(), attempt, "retrying graph request");
                        sleep(backoff_with_jitter(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Ok(response);
                }
                Err(err) => {
                    if attempt >= MAX_RETRIES || !(idempotent || err.is_connect()) {
                        return Err(transport(err));
                    }
                    sleep(backoff_with_jitter(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn call(&self, method: Method, url: String, body: Option<Value>) -> Result<Response> {
        let mut builder = self.authorized_request(method, url).await?;
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        self.send_with_retry(builder).await
    }

    async fn access_token(&self) -> Result<String> {
        if let Some(token) = &self.static_token {
            return Ok(token.clone());
        }
        if let Some(token) = self.valid_cached_token() {
            return Ok(token);
        }
        self.fetch_token().await
    }

    fn valid_cached_token(&self) -> Option<String> {
        self.token.read().as_ref().and_then(|token| {
            if token.refresh_at > Instant::now() {
                Some(token.token.clone())
            } else {
                None
            }
        })
    }

    async fn fetch_token(&self) -> Result<String> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.login_base_url, self.tenant_id
        );
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", "https://graph.microsoft.com/.default"),
            ("grant_type", "client_credentials"),
        ];
        let resp = self
            .http
            .post(url)
            .form(&params)
            .send()
            .await
            .map_err(|err| ShareError::Auth(err.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ShareError::Auth(format!("{status} {body}")));
        }
        let token: OAuthTokenResponse = resp
            .json()
            .await
            .map_err(|err| ShareError::Auth(err.to_string()))?;
        let lifetime = Duration::from_secs(token.expires_in);
        let cached = CachedToken {
            token: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime - refresh_margin(lifetime),
        };
        *self.token.write() = Some(cached);
        Ok(token.access_token)
    }
}

#[async_trait]
impl StorageClient for MsGraphClient {
    async fn resolve_item(&self, locator: &str) -> Result<ItemRef> {
        let url = format!(
            "{}/shares/{}/driveItem",
            self.base_url,
            encode_sharing_url(locator)
        );
        let resp = self.call(Method::GET, url, None).await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ShareError::Resolution {
                locator: locator.to_string(),
                reason: format!("{status} {body}"),
            });
        }
        let item: DriveItem = decode(resp).await?;
        let drive_id = item
            .parent_reference
            .map(|p| p.drive_id)
            .ok_or_else(|| ShareError::Resolution {
                locator: locator.to_string(),
                reason: "response has no drive id".into(),
            })?;
        Ok(ItemRef::new(drive_id, item.id))
    }

    async fn list_children(&self, parent: &ItemRef) -> Result<Vec<DriveEntry>> {
        let mut next = Some(format!(
            "{}/children?$select=id,name,size,folder",
            self.drive_item_url(parent)
        ));
        let mut entries = Vec::new();
        while let Some(url) = next {
            let resp = checked(self.call(Method::GET, url, None).await?, "list children").await?;
            let page: DriveItemPage = decode(resp).await?;
            entries.extend(page.value.into_iter().map(|item| DriveEntry {
                is_folder: item.folder.is_some(),
                id: item.id,
                name: item.name,
                size: item.size,
            }));
            next = page.next_link;
        }
        Ok(entries)
    }

    async fn start_copy(
        &self,
        source: &ItemRef,
        dest_parent: &ItemRef,
        dest_name: &str,
    ) -> Result<CopyJob> {
        let url = format!("{}/copy", self.drive_item_url(source));
        let body = json!({
            "parentReference": {
                "driveId": dest_parent.drive_id,
                "id": dest_parent.item_id,
            },
            "name": dest_name,
        });
        let resp = checked(self.call(Method::POST, url, Some(body)).await?, "copy").await?;
        let monitor_url = resp
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ShareError::Decode("copy response has no Location header".into()))?;
        Ok(CopyJob {
            monitor_url,
            drive_id: dest_parent.drive_id.clone(),
        })
    }

    async fn poll_copy(&self, job: &CopyJob) -> Result<CopyStatus> {
        // The monitor URL is pre-authenticated and rejects bearer tokens.
        let resp = self
            .send_with_retry(self.http.get(&job.monitor_url))
            .await?;
        let resp = checked(resp, "poll copy").await?;
        let monitor: MonitorResponse = decode(resp).await?;
        match monitor.status.as_str() {
            "completed" => monitor
                .resource_id
                .map(|item_id| CopyStatus::Completed { item_id })
                .ok_or_else(|| ShareError::Decode("completed copy has no resourceId".into())),
            "failed" => {
                let detail = monitor
                    .error
                    .and_then(|e| e.message.or(e.code))
                    .unwrap_or_else(|| "copy job failed".to_string());
                Ok(CopyStatus::Failed { detail })
            }
            _ => Ok(CopyStatus::Pending),
        }
    }

    async fn create_share_link(&self, item: &ItemRef) -> Result<String> {
        let url = format!("{}/createLink", self.drive_item_url(item));
        let body = json!({ "type": "view", "scope": "users" });
        let resp = checked(
            self.call(Method::POST, url, Some(body)).await?,
            "create share link",
        )
        .await?;
        let created: CreateLinkResponse = decode(resp).await?;
        Ok(created.link.web_url)
    }

    async fn grant_access(&self, item: &ItemRef, emails: &[String]) -> Result<()> {
        let url = format!("{}/invite", self.drive_item_url(item));
        let recipients: Vec<Value> = emails.iter().map(|e| json!({ "email": e })).collect();
        let body = json!({
            "requireSignIn": true,
            "sendInvitation": false,
            "roles": ["read"],
            "recipients": recipients,
        });
        checked(self.call(Method::POST, url, Some(body)).await?, "grant access").await?;
        Ok(())
    }

    async fn read_table(
        &self,
        workbook: &ItemRef,
        sheet: &str,
        start_row: RowHandle,
    ) -> Result<Vec<(RowHandle, Vec<String>)>> {
        let url = format!(
            "{}/usedRange(valuesOnly=true)",
            self.worksheet_url(workbook, sheet)
        );
        let resp = checked(self.call(Method::GET, url, None).await?, "read worksheet").await?;
        let range: RangeResponse = decode(resp).await?;
        let (first_col, first_row) = range_origin(&range.address)?;
        Ok(table_rows(range.values, first_col, first_row, start_row))
    }

    async fn write_row_range(
        &self,
        workbook: &ItemRef,
        sheet: &str,
        row: RowHandle,
        col_start: &str,
        col_end: &str,
        values: &[String],
    ) -> Result<()> {
        let url = format!(
            "{}/range(address='{col_start}{row}:{col_end}{row}')",
            self.worksheet_url(workbook, sheet)
        );
        let body = json!({ "values": [values] });
        checked(
            self.call(Method::PATCH, url, Some(body)).await?,
            "write worksheet row",
        )
        .await?;
        Ok(())
    }

    async fn send_notification(&self, notification: &Notification) -> Result<()> {
        let url = match &self.mail_sender {
            Some(sender) => format!(
                "{}/users/{}/sendMail",
                self.base_url,
                urlencoding::encode(sender)
            ),
            None => format!("{}/me/sendMail", self.base_url),
        };
        let address = |email: &String| json!({ "emailAddress": { "address": email } });
        let body = json!({
            "message": {
                "subject": notification.subject,
                "body": {
                    "contentType": "HTML",
                    "content": notification.html_body,
                },
                "toRecipients": [address(&notification.to)],
                "ccRecipients": notification.cc.iter().map(address).collect::<Vec<_>>(),
            },
            "saveToSentItems": true,
        });
        checked(self.call(Method::POST, url, Some(body)).await?, "send mail").await?;
        Ok(())
    }
}

/// Encodes a sharing URL into the `u!` share id accepted by `/shares`.
pub fn encode_sharing_url(url: &str) -> String {
    format!("u!{}", URL_SAFE_NO_PAD.encode(url.as_bytes()))
}

/// Column index (0-based) and row number (1-based) of the top-left cell of
/// an A1 range address such as `'Form'!C6:X40`.
fn range_origin(address: &str) -> Result<(usize, RowHandle)> {
    let cells = address.rsplit_once('!').map_or(address, |(_, cells)| cells);
    let first = cells.split(':').next().unwrap_or(cells).replace('$', "");
    let letters: String = first.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    let digits = &first[letters.len()..];
    let row: RowHandle = digits
        .parse()
        .map_err(|_| ShareError::Decode(format!("bad range address '{address}'")))?;
    if letters.is_empty() {
        return Err(ShareError::Decode(format!("bad range address '{address}'")));
    }
    let col = letters
        .to_ascii_uppercase()
        .bytes()
        .fold(0usize, |acc, b| acc * 26 + (b - b'A' + 1) as usize)
        - 1;
    Ok((col, row))
}

fn table_rows(
    values: Vec<Vec<Value>>,
    first_col: usize,
    first_row: RowHandle,
    start_row: RowHandle,
) -> Vec<(RowHandle, Vec<String>)> {
    values
        .into_iter()
        .enumerate()
        .filter_map(|(idx, row)| {
            let row_number = first_row + idx as RowHandle;
            if row_number < start_row {
                return None;
            }
            let mut cells = vec![String::new(); first_col];
            cells.extend(row.iter().map(cell_text));
            cells
                .iter()
                .any(|c| !c.trim().is_empty())
                .then_some((row_number, cells))
        })
        .collect()
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

async fn checked(resp: Response, context: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ShareError::backend(status.as_u16(), context, body))
}

async fn decode<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T> {
    resp.json::<T>()
        .await
        .map_err(|err| ShareError::Decode(err.to_string()))
}

fn transport(err: reqwest::Error) -> ShareError {
    ShareError::Transport(err.to_string())
}

fn is_idempotent(method: &Method) -> bool {
    *method != Method::POST
}

fn should_retry(status: StatusCode, idempotent: bool) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || (idempotent && status.is_server_error())
}

/// How long before expiry a cached token is replaced: a minute, or half the
/// lifetime for tokens shorter than two minutes.
fn refresh_margin(expires_in: Duration) -> Duration {
    (expires_in / 2).min(Duration::from_secs(60))
}

fn backoff_with_jitter(attempt: u32) -> Duration {
    let base = 200u64 * 2u64.pow(attempt.min(6));
    let jitter: u64 = rand::thread_rng().gen_range(0..100);
    Duration::from_millis(base + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sharing_url_uses_unpadded_url_safe_base64() {
        assert_eq!(
            encode_sharing_url("https://onedrive.live.com/redir?resid=1231244193912!12&authKey=1201919!12921!1"),
            "u!aHR0cHM6Ly9vbmVkcml2ZS5saXZlLmNvbS9yZWRpcj9yZXNpZD0xMjMxMjQ0MTkzOTEyITEyJmF1dGhLZXk9MTIwMTkxOSExMjkyMSEx"
        );
    }

    #[test]
    fn posts_are_only_retried_when_throttled() {
        assert!(should_retry(StatusCode::TOO_MANY_REQUESTS, false));
        assert!(!should_retry(StatusCode::GATEWAY_TIMEOUT, false));
        assert!(should_retry(StatusCode::GATEWAY_TIMEOUT, true));
        assert!(!is_idempotent(&Method::POST));
        assert!(is_idempotent(&Method::PATCH));
    }

    #[test]
    fn refresh_margin_scales_down_for_short_tokens() {
        assert_eq!(refresh_margin(Duration::from_secs(3600)), Duration::from_secs(60));
        assert_eq!(refresh_margin(Duration::from_secs(30)), Duration::from_secs(15));
    }

    #[test]
    fn range_origin_parses_sheet_qualified_address() {
        assert_eq!(range_origin("Sheet1!A1:X40").unwrap(), (0, 1));
        assert_eq!(range_origin("'Request Form'!C6:X40").unwrap(), (2, 6));
        assert_eq!(range_origin("AA12").unwrap(), (26, 12));
        assert!(range_origin("Sheet1!").is_err());
    }

    #[test]
    fn table_rows_skip_header_and_blank_rows() {
        let values = vec![
            vec![json!("header")],
            vec![json!(""), Value::Null],
            vec![json!("A"), json!(4711), json!(true)],
        ];
        let rows = table_rows(values, 1, 5, 6);
        assert_eq!(
            rows,
            vec![(
                7,
                vec![
                    String::new(),
                    "A".to_string(),
                    "4711".to_string(),
                    "true".to_string()
                ]
            )]
        );
    }
}
