use serde::Serialize;
use thiserror::Error;

/// Patterns (lowercase) that indicate sensitive data not safe for UI display.
/// Used by `contains_sensitive()` for case-insensitive matching.
pub(crate) const SENSITIVE_PATTERNS: &[&str] = &[
    "bearer ",
    "api_key",
    "api_token",
    "access_token",
    "authorization:",
    "ssn",
];

/// Returns true if the message contains any sensitive pattern (case-insensitive).
fn contains_sensitive(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Sanitizes a message for UI display.
/// If sensitive content is detected, returns the fallback instead.
fn sanitize_message(msg: &str, fallback: &str) -> String {
    if contains_sensitive(msg) {
        fallback.into()
    } else {
        msg.to_string()
    }
}

/// One per-row error from an HTTP 422 bulk-complete rejection.
///
/// `row_position` is the 0-based position of the offending row within the
/// submitted batch (the only correlation key the server provides on 422).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldPathError {
    pub row_position: usize,
    pub field: String,
    pub message: String,
}

/// User-friendly error presentation for the frontend.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPresentation {
    pub title: String,
    pub message: String,
    pub action: Option<String>,
}

/// Application-wide error type.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Auth ──────────────────────────────────────────────────────────────────
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Session expired")]
    SessionExpired,

    // ── API ───────────────────────────────────────────────────────────────────
    #[error("HCM error: {0}")]
    HcmError(String),

    #[error("Rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Not found: {0}")]
    NotFound(String),

    /// HTTP 422: the backend rejected individual rows of a bulk batch.
    /// Carries the parsed field-path errors so the submitter can map them
    /// back onto rows; never shown to the user as-is.
    #[error("Batch rejected by validation ({} row errors)", .errors.len())]
    UnprocessableBatch { errors: Vec<FieldPathError> },

    // ── Import Workflow ───────────────────────────────────────────────────────
    #[error("File is not a spreadsheet: {0}")]
    NotSpreadsheet(String),

    #[error("Spreadsheet parse failed: {0}")]
    ParseFailed(String),

    #[error("No valid rows to submit")]
    NoValidRows,

    #[error("Operation already in flight: {0}")]
    OperationInFlight(&'static str),

    // ── Network ───────────────────────────────────────────────────────────────
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    // ── Generic fallback ──────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Converts the error into a user-friendly presentation suitable for UI display.
    /// Never leaks tokens, identifiers, or sensitive URL parameters.
    pub fn to_presentation(&self) -> ErrorPresentation {
        match self {
            // ── Auth ──────────────────────────────────────────────────────────
            AppError::NotAuthenticated => ErrorPresentation {
                title: "Not Signed In".into(),
                message: "You need to sign in to continue.".into(),
                action: Some("Sign in".into()),
            },

            AppError::SessionExpired => ErrorPresentation {
                title: "Session Expired".into(),
                message: "Your session has expired.".into(),
                action: Some("Sign in again".into()),
            },

            // ── API ───────────────────────────────────────────────────────────
            AppError::HcmError(msg) => ErrorPresentation {
                title: "Server Error".into(),
                message: sanitize_message(msg, "The server reported an error."),
                action: None,
            },

            AppError::RateLimited { retry_after_secs } => {
                let wait_msg = match retry_after_secs {
                    Some(secs) => format!("Please wait {} seconds before trying again.", secs),
                    None => "Please wait a moment before trying again.".into(),
                };
                ErrorPresentation {
                    title: "Too Many Requests".into(),
                    message: format!("The server is limiting requests. {}", wait_msg),
                    action: Some("Wait and retry".into()),
                }
            }

            AppError::NotFound(what) => ErrorPresentation {
                title: "Not Found".into(),
                message: sanitize_message(what, "The requested resource was not found."),
                action: None,
            },

            AppError::UnprocessableBatch { errors } => ErrorPresentation {
                title: "Rows Rejected".into(),
                message: format!(
                    "The server rejected {} row(s). Review the errors and resubmit.",
                    errors.len()
                ),
                action: Some("Fix the flagged rows and resubmit".into()),
            },

            // ── Import Workflow ───────────────────────────────────────────────
            AppError::NotSpreadsheet(_) => ErrorPresentation {
                title: "Wrong File Type".into(),
                message: "Please upload the Excel template (.xlsx or .xls).".into(),
                action: Some("Choose a spreadsheet file".into()),
            },

            AppError::ParseFailed(msg) => ErrorPresentation {
                title: "Upload Failed".into(),
                message: sanitize_message(msg, "The spreadsheet could not be processed."),
                action: Some("Check the file and try again".into()),
            },

            AppError::NoValidRows => ErrorPresentation {
                title: "Nothing to Submit".into(),
                message: "No valid rows are available to submit. Fix the row errors first."
                    .into(),
                action: Some("Review row errors".into()),
            },

            AppError::OperationInFlight(op) => ErrorPresentation {
                title: "Already Running".into(),
                message: format!("A {} operation is already in progress.", op),
                action: Some("Wait for it to finish".into()),
            },

            // ── Network ───────────────────────────────────────────────────────
            AppError::ConnectionFailed(_) => ErrorPresentation {
                title: "Connection Failed".into(),
                message: "Could not reach the server. Please check your internet connection."
                    .into(),
                action: Some("Check network and retry".into()),
            },

            // ── Generic ───────────────────────────────────────────────────────
            AppError::Internal(_) => ErrorPresentation {
                title: "Unexpected Error".into(),
                message: "Something went wrong. Please try again.".into(),
                action: Some("Try again".into()),
            },
        }
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_presentation().serialize(serializer)
    }
}
