//! HCM HTTP client with secure credential handling and safe logging.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;
use tracing::{info, warn};
use url::Url;

use crate::error::AppError;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// User agent string for all HCM API requests.
const CLIENT_USER_AGENT: &str = "PrehireImport/1.0.0";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Query parameter keys (case-insensitive) that should have their values redacted.
const SENSITIVE_QUERY_PARAMS: &[&str] = &[
    "access_token",
    "api_key",
    "api_token",
    "token",
    "sid",
    "session",
    "authorization",
];

// ─────────────────────────────────────────────────────────────────────────────
// LoggingMode
// ─────────────────────────────────────────────────────────────────────────────

/// Controls how URLs are sanitized for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoggingMode {
    /// Log only the path component. Strips scheme, host, query, and fragment.
    /// Example: `/api/v1/prehire/fields`
    #[default]
    PathOnly,

    /// Log path and query parameters, but redact sensitive values.
    /// Example: `/api/v1/new-hire-requests?api_token=***&status=imported`
    PathAndQueryRedacted,
}

// ─────────────────────────────────────────────────────────────────────────────
// ApiCredentials
// ─────────────────────────────────────────────────────────────────────────────

/// Credentials for the HCM backend.
///
/// The bearer token is wrapped in `SecretString` to prevent accidental
/// exposure through `Debug` traits or logging. The backend issues static
/// session tokens; there is no refresh flow, so a 401 always means the
/// session is gone.
#[derive(Clone)]
pub struct ApiCredentials {
    /// Tenant identifier (the `client_id` of the signed-in company).
    pub tenant_id: String,
    /// Base URL of the HCM backend (e.g., "https://api.hcm.example.com").
    pub base_url: String,
    /// Bearer token for API access (wrapped for security).
    pub api_token: SecretString,
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("tenant_id", &self.tenant_id)
            .field("base_url", &self.base_url)
            .field("api_token", &"[REDACTED]")
            .finish()
    }
}

impl ApiCredentials {
    /// Creates placeholder credentials for startup before sign-in.
    pub(crate) fn placeholder() -> Self {
        Self {
            tenant_id: String::new(),
            base_url: String::new(),
            api_token: SecretString::from(String::new()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// URL Sanitization
// ─────────────────────────────────────────────────────────────────────────────

/// Determines if a query parameter key is sensitive and should be redacted.
fn is_sensitive_param(key: &str) -> bool {
    let key_lower = key.to_ascii_lowercase();
    SENSITIVE_QUERY_PARAMS
        .iter()
        .any(|&sensitive| key_lower == sensitive)
}

/// Sanitizes a URL for safe logging based on the specified mode.
///
/// Uses the `url` crate for proper URL parsing rather than string
/// manipulation. The returned string never contains the scheme, host, or
/// fragment.
pub fn sanitize_url_for_logs(url: &Url, mode: LoggingMode) -> String {
    let path = url.path();

    match mode {
        LoggingMode::PathOnly => path.to_string(),
        LoggingMode::PathAndQueryRedacted => {
            let query_pairs: Vec<_> = url.query_pairs().collect();
            if query_pairs.is_empty() {
                return path.to_string();
            }

            let redacted_pairs: Vec<String> = query_pairs
                .into_iter()
                .map(|(key, value)| {
                    if is_sensitive_param(&key) {
                        format!("{}=***", key)
                    } else {
                        format!("{}={}", key, value)
                    }
                })
                .collect();

            format!("{}?{}", path, redacted_pairs.join("&"))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HcmClient
// ─────────────────────────────────────────────────────────────────────────────

/// A request prepared against the HCM backend, ready for a body and dispatch.
///
/// Produced by [`HcmClient::prepare`]; consumed by [`HcmClient::send`], which
/// owns the timing, logging, and error mapping for every request.
pub struct PreparedRequest {
    builder: reqwest::RequestBuilder,
    method: Method,
    url: Url,
}

impl PreparedRequest {
    /// Attaches a JSON body.
    pub fn json<T: serde::Serialize + ?Sized>(mut self, body: &T) -> Self {
        self.builder = self.builder.json(body);
        self
    }

    /// Attaches a multipart form body (spreadsheet uploads).
    pub fn multipart(mut self, form: reqwest::multipart::Form) -> Self {
        self.builder = self.builder.multipart(form);
        self
    }
}

/// Thread-safe HTTP client for HCM API interactions.
///
/// Credentials are protected by `RwLock` allowing concurrent reads (requests)
/// but exclusive writes (sign-in / sign-out).
#[derive(Clone)]
pub struct HcmClient {
    /// The underlying HTTP client.
    http: reqwest::Client,
    /// Thread-safe credentials storage.
    creds: Arc<RwLock<ApiCredentials>>,
    /// Controls URL sanitization for logging.
    logging_mode: LoggingMode,
}

impl HcmClient {
    /// Creates a new client with the provided credentials.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Internal` if the HTTP client fails to initialize.
    pub fn new(creds: ApiCredentials) -> Result<Self, AppError> {
        let http = build_http_client()?;
        Ok(Self {
            http,
            creds: Arc::new(RwLock::new(creds)),
            logging_mode: LoggingMode::default(),
        })
    }

    /// Creates a client with placeholder credentials for startup.
    ///
    /// Credentials should be updated via `update_credentials` after sign-in.
    pub fn new_placeholder() -> Result<Self, AppError> {
        Self::new(ApiCredentials::placeholder())
    }

    /// Updates the logging mode for URL sanitization.
    pub fn with_logging_mode(mut self, mode: LoggingMode) -> Self {
        self.logging_mode = mode;
        self
    }

    /// Updates the stored credentials (e.g., after sign-in).
    pub async fn update_credentials(&self, creds: ApiCredentials) {
        let mut guard = self.creds.write().await;
        *guard = creds;
    }

    /// Returns the signed-in tenant id.
    pub async fn tenant_id(&self) -> String {
        self.creds.read().await.tenant_id.clone()
    }

    /// Builds a full URL by joining the path with the base URL.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotAuthenticated` if no base URL is configured.
    /// Returns `AppError::Internal` if the URL cannot be parsed.
    pub async fn build_url(&self, path: &str) -> Result<Url, AppError> {
        let creds = self.creds.read().await;

        if creds.base_url.is_empty() {
            return Err(AppError::NotAuthenticated);
        }

        let base = Url::parse(&creds.base_url)
            .map_err(|_| AppError::Internal("Invalid base URL".to_string()))?;

        base.join(path)
            .map_err(|_| AppError::Internal(format!("Invalid path: {}", path)))
    }

    /// Prepares an authenticated request for the given method and path.
    ///
    /// The bearer token is attached here; callers add a body via
    /// [`PreparedRequest::json`] / [`PreparedRequest::multipart`] and dispatch
    /// with [`HcmClient::send`].
    pub async fn prepare(&self, method: Method, path: &str) -> Result<PreparedRequest, AppError> {
        let url = self.build_url(path).await?;
        let token = {
            let creds = self.creds.read().await;
            creds.api_token.expose_secret().to_string()
        };

        let builder = self
            .http
            .request(method.clone(), url.as_str())
            .bearer_auth(token);

        Ok(PreparedRequest {
            builder,
            method,
            url,
        })
    }

    /// Dispatches a prepared request with timing, logging, and error mapping.
    ///
    /// # Security
    ///
    /// - Never logs the Authorization header
    /// - Never logs request/response bodies
    /// - Sanitizes URLs before logging
    /// - Error messages never contain raw URLs or tokens
    ///
    /// # Errors
    ///
    /// - `AppError::SessionExpired` - the backend returned 401
    /// - `AppError::ConnectionFailed` - network error
    pub async fn send(&self, request: PreparedRequest) -> Result<reqwest::Response, AppError> {
        let PreparedRequest {
            builder,
            method,
            url,
        } = request;

        let start = Instant::now();
        let sanitized_url = sanitize_url_for_logs(&url, self.logging_mode);

        let result = builder.send().await;
        let duration_ms = start.elapsed().as_millis();

        match result {
            Ok(response) => {
                let status = response.status();
                let x_request_id = response
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");

                info!(
                    "[HCM] {} {} {} {}ms {}",
                    method,
                    sanitized_url,
                    status.as_u16(),
                    duration_ms,
                    x_request_id
                );

                // Static session tokens: 401 always means the session is gone.
                if status == reqwest::StatusCode::UNAUTHORIZED {
                    warn!("[HCM] Unauthorized response; session expired");
                    return Err(AppError::SessionExpired);
                }

                Ok(response)
            }
            Err(_) => {
                // Log failed request without exposing the actual error
                // (which may contain the full URL with tokens)
                info!("[HCM] {} {} FAILED {}ms", method, sanitized_url, duration_ms);

                Err(AppError::ConnectionFailed(
                    "Connection to the HCM backend failed".to_string(),
                ))
            }
        }
    }
}

/// Builds the configured HTTP client.
fn build_http_client() -> Result<reqwest::Client, AppError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
