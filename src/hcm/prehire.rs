//! Prehire import endpoints and wire types.
//!
//! The import wizard consumes five backend operations:
//! - Parse an uploaded spreadsheet into raw rows
//! - Generate a prefilled spreadsheet template for chosen hire records
//! - Fetch the prehire field catalog (drives required-field validation)
//! - Bulk-complete a batch of prehire requests (the sole write path)
//! - List new-hire requests (supplies the linkage-id allow-list)
//!
//! # Security
//!
//! - Raw spreadsheet contents are never logged
//! - Auth headers and tokens are never logged
//! - Only HTTP method, path, and status codes are logged

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::error::{AppError, FieldPathError};
use crate::hcm::client::HcmClient;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// MIME type sent for uploaded Excel workbooks.
const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const PARSE_PATH: &str = "/api/v1/prehire/imports/parse";
const TEMPLATE_PATH: &str = "/api/v1/prehire/imports/template";
const FIELDS_PATH: &str = "/api/v1/prehire/fields";
const BULK_COMPLETE_PATH: &str = "/api/v1/new-hire-requests/bulk-complete";
const REQUESTS_PATH: &str = "/api/v1/new-hire-requests";

// ─────────────────────────────────────────────────────────────────────────────
// Public Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// One raw spreadsheet row as returned by the parse endpoint: column name →
/// loosely typed cell value, in file order.
pub type RawRow = BTreeMap<String, serde_json::Value>;

/// One entry of the prehire field catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrehireFieldSpec {
    /// Canonical field name (matches spreadsheet column keys).
    pub name: String,
    /// Human-readable label, if the backend provides one.
    #[serde(default)]
    pub label: Option<String>,
    /// Whether the field must be present before electronic onboarding.
    #[serde(default)]
    pub required_for_electronic_onboarding: bool,
}

/// The prehire field catalog; drives intake allow-listing and row validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrehireFields {
    pub fields: Vec<PrehireFieldSpec>,
}

impl PrehireFields {
    /// Names of fields required for electronic onboarding.
    pub fn required_names(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.required_for_electronic_onboarding)
            .map(|f| f.name.as_str())
    }

    /// Builds a catalog from `(name, required)` pairs. Test convenience.
    pub fn from_pairs(pairs: &[(&str, bool)]) -> Self {
        Self {
            fields: pairs
                .iter()
                .map(|(name, required)| PrehireFieldSpec {
                    name: name.to_string(),
                    label: None,
                    required_for_electronic_onboarding: *required,
                })
                .collect(),
        }
    }
}

/// Normalized payload shape for one row of a bulk-complete call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkCompletePayload {
    /// Numeric linkage id of the hire record being completed.
    pub new_hire_request_id: i64,
    /// Tenant the record belongs to.
    pub client_id: String,
    /// Onboarding payload fields, as entered/edited.
    pub fields: BTreeMap<String, String>,
}

/// Reference to one row the server completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedRef {
    pub new_hire_request_id: i64,
}

/// One row the server rejected during a bulk-complete call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowRejection {
    /// Linkage id of the rejected row, when the server could identify it.
    #[serde(default)]
    pub new_hire_request_id: Option<i64>,
    /// Server-supplied rejection reason.
    pub error: String,
}

/// Aggregate outcome of one bulk-complete call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkCompleteOutcome {
    #[serde(default)]
    pub completed: Vec<CompletedRef>,
    #[serde(default)]
    pub errors: Vec<RowRejection>,
    pub successful: u64,
    pub failed: u64,
}

/// A pre-existing hire record eligible (or not) for bulk completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewHireRequest {
    pub id: i64,
    pub status: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ParseResponse {
    results: Vec<RawRow>,
}

#[derive(Debug, Serialize)]
struct TemplateRequest<'a> {
    request_ids: &'a [i64],
}

#[derive(Debug, Serialize)]
struct BulkCompleteRequest<'a> {
    requests: &'a [BulkCompletePayload],
}

#[derive(Debug, Deserialize)]
struct BulkCompleteResponse {
    results: BulkCompleteOutcome,
}

/// Generic backend error body.
#[derive(Debug, Deserialize)]
struct BackendError {
    message: String,
}

/// HTTP 422 body: a list of field-path errors in `detail`.
#[derive(Debug, Deserialize)]
struct UnprocessableBody {
    #[serde(default)]
    detail: Vec<DetailEntry>,
}

#[derive(Debug, Deserialize)]
struct DetailEntry {
    /// Field path, e.g. `["body", "requests", 2, "work_email"]`.
    #[serde(default)]
    loc: Vec<serde_json::Value>,
    msg: String,
}

impl DetailEntry {
    /// Extracts `(row_position, field)` from the path: the first integer
    /// element is the row position within the submitted batch, the last
    /// string element is the field name.
    fn row_and_field(&self) -> (usize, String) {
        let position = self
            .loc
            .iter()
            .find_map(|v| v.as_u64())
            .unwrap_or(0) as usize;
        let field = self
            .loc
            .iter()
            .rev()
            .find_map(|v| v.as_str())
            .unwrap_or("row")
            .to_string();
        (position, field)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PrehireApi Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Backend operations consumed by the import wizard.
///
/// Decouples the engine from the real HTTP client; tests provide fake
/// implementations that return canned rows and outcomes.
pub trait PrehireApi: Send + Sync {
    /// Parses an uploaded spreadsheet into raw rows, in file order.
    fn upload_prehire_excel_file<'a>(
        &'a self,
        file_name: &'a str,
        bytes: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RawRow>, AppError>> + Send + 'a>>;

    /// Generates a prefilled template for the chosen hire records and streams
    /// it to `out_path`.
    fn download_prehire_excel_template<'a>(
        &'a self,
        request_ids: &'a [i64],
        out_path: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>>;

    /// Fetches the prehire field catalog.
    fn get_prehire_fields(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<PrehireFields, AppError>> + Send + '_>>;

    /// Sends the whole eligible batch in one call; no chunking.
    fn bulk_complete_prehire_requests<'a>(
        &'a self,
        payload: &'a [BulkCompletePayload],
    ) -> Pin<Box<dyn Future<Output = Result<BulkCompleteOutcome, AppError>> + Send + 'a>>;

    /// Lists new-hire requests; callers filter to the lifecycle state that is
    /// eligible for this operation.
    fn get_new_hire_requests(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<NewHireRequest>, AppError>> + Send + '_>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// PrehireClient
// ─────────────────────────────────────────────────────────────────────────────

/// Real [`PrehireApi`] implementation over [`HcmClient`].
#[derive(Clone)]
pub struct PrehireClient {
    client: HcmClient,
}

impl PrehireClient {
    pub fn new(client: HcmClient) -> Self {
        Self { client }
    }

    async fn upload_file(&self, file_name: &str, bytes: Vec<u8>) -> Result<Vec<RawRow>, AppError> {
        let byte_count = bytes.len();
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(XLSX_MIME)
            .map_err(|e| AppError::Internal(format!("Failed to build upload part: {}", e)))?;
        let form = Form::new().part("file", part);

        info!("[PREHIRE] POST {} ({} bytes)", PARSE_PATH, byte_count);

        let request = self.client.prepare(Method::POST, PARSE_PATH).await?;
        let response = self.client.send(request.multipart(form)).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(parse_error_response(response, status).await);
        }

        let parsed: ParseResponse = response.json().await.map_err(|e| {
            AppError::ParseFailed(format!("Failed to parse upload response: {}", e))
        })?;

        Ok(parsed.results)
    }

    async fn download_template(
        &self,
        request_ids: &[i64],
        out_path: &Path,
    ) -> Result<(), AppError> {
        info!(
            "[PREHIRE] POST {} ({} requests)",
            TEMPLATE_PATH,
            request_ids.len()
        );

        let body = TemplateRequest { request_ids };
        let request = self.client.prepare(Method::POST, TEMPLATE_PATH).await?;
        let response = self.client.send(request.json(&body)).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(parse_error_response(response, status).await);
        }

        // Stream to disk; templates can carry hundreds of prefilled rows.
        let mut file = tokio::fs::File::create(out_path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create template file: {}", e)))?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|_| {
                AppError::ConnectionFailed("Template download interrupted".to_string())
            })?;
            file.write_all(&chunk)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to write template: {}", e)))?;
        }

        file.flush()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to flush template: {}", e)))?;

        Ok(())
    }

    async fn fields(&self) -> Result<PrehireFields, AppError> {
        let request = self.client.prepare(Method::GET, FIELDS_PATH).await?;
        let response = self.client.send(request).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(parse_error_response(response, status).await);
        }

        response
            .json()
            .await
            .map_err(|e| AppError::HcmError(format!("Failed to parse field catalog: {}", e)))
    }

    async fn bulk_complete(
        &self,
        payload: &[BulkCompletePayload],
    ) -> Result<BulkCompleteOutcome, AppError> {
        info!(
            "[PREHIRE] POST {} ({} rows)",
            BULK_COMPLETE_PATH,
            payload.len()
        );

        let body = BulkCompleteRequest { requests: payload };
        let request = self.client.prepare(Method::POST, BULK_COMPLETE_PATH).await?;
        let response = self.client.send(request.json(&body)).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(parse_error_response(response, status).await);
        }

        let parsed: BulkCompleteResponse = response.json().await.map_err(|e| {
            AppError::HcmError(format!("Failed to parse bulk-complete response: {}", e))
        })?;

        Ok(parsed.results)
    }

    async fn requests(&self) -> Result<Vec<NewHireRequest>, AppError> {
        let request = self.client.prepare(Method::GET, REQUESTS_PATH).await?;
        let response = self.client.send(request).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(parse_error_response(response, status).await);
        }

        response
            .json()
            .await
            .map_err(|e| AppError::HcmError(format!("Failed to parse hire requests: {}", e)))
    }
}

impl PrehireApi for PrehireClient {
    fn upload_prehire_excel_file<'a>(
        &'a self,
        file_name: &'a str,
        bytes: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RawRow>, AppError>> + Send + 'a>> {
        Box::pin(self.upload_file(file_name, bytes))
    }

    fn download_prehire_excel_template<'a>(
        &'a self,
        request_ids: &'a [i64],
        out_path: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        Box::pin(self.download_template(request_ids, out_path))
    }

    fn get_prehire_fields(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<PrehireFields, AppError>> + Send + '_>> {
        Box::pin(self.fields())
    }

    fn bulk_complete_prehire_requests<'a>(
        &'a self,
        payload: &'a [BulkCompletePayload],
    ) -> Pin<Box<dyn Future<Output = Result<BulkCompleteOutcome, AppError>> + Send + 'a>> {
        Box::pin(self.bulk_complete(payload))
    }

    fn get_new_hire_requests(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<NewHireRequest>, AppError>> + Send + '_>> {
        Box::pin(self.requests())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Error Response Parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Maps a non-success response to an `AppError`.
///
/// 422 responses carry per-row field-path errors and get their own variant so
/// the submitter can map them back onto rows; everything else collapses to a
/// status-appropriate error with the backend's message when one is present.
async fn parse_error_response(
    response: reqwest::Response,
    status: reqwest::StatusCode,
) -> AppError {
    match status {
        reqwest::StatusCode::NOT_FOUND => AppError::NotFound("resource".to_string()),
        reqwest::StatusCode::TOO_MANY_REQUESTS => {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            AppError::RateLimited { retry_after_secs }
        }
        reqwest::StatusCode::UNPROCESSABLE_ENTITY => {
            let body = response.text().await.unwrap_or_default();
            parse_unprocessable_body(&body)
        }
        _ => {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<BackendError>(&body)
                .map(|e| e.message)
                .unwrap_or_else(|_| format!("HTTP {}", status.as_u16()));
            AppError::HcmError(message)
        }
    }
}

/// Parses a 422 body into `AppError::UnprocessableBatch`.
fn parse_unprocessable_body(body: &str) -> AppError {
    match serde_json::from_str::<UnprocessableBody>(body) {
        Ok(parsed) if !parsed.detail.is_empty() => {
            let errors = parsed
                .detail
                .iter()
                .map(|entry| {
                    let (row_position, field) = entry.row_and_field();
                    FieldPathError {
                        row_position,
                        field,
                        message: entry.msg.clone(),
                    }
                })
                .collect();
            AppError::UnprocessableBatch { errors }
        }
        _ => AppError::HcmError("Batch rejected by validation".to_string()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
