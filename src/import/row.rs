//! Row model for the prehire import wizard.
//!
//! One [`ImportRow`] is created per data row of the uploaded spreadsheet and
//! lives in memory for the duration of the wizard session. Rows carry a
//! stable UUID generated at intake; every later transformation (validation,
//! submission, reconciliation) correlates through that UUID, never through
//! array position.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Reserved error-map key for server-side rejection reasons.
///
/// Client-side validation errors live under field names; a value under this
/// key means the backend rejected the row during a bulk-complete call.
pub const SUBMISSION_ERROR_KEY: &str = "submission";

/// Field names consulted, in order, when resolving a row's effective email.
pub const EMAIL_SOURCE_FIELDS: &[&str] = &["work_email", "email", "personal_email"];

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// Discriminant for the two row shapes the spreadsheet template can produce.
///
/// Quick-hire rows are abbreviated records (name, contact, start date only);
/// prehire rows carry the full onboarding payload. The tag is assigned at
/// intake so downstream code can dispatch exhaustively instead of sniffing
/// for optional fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowKind {
    /// Full prehire record awaiting bulk completion.
    Prehire,
    /// Abbreviated quick-hire record.
    QuickHire,
}

/// One prospective employee parsed from the uploaded spreadsheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRow {
    /// Stable identifier generated at intake; survives every transformation.
    pub uid: Uuid,
    /// Row shape discriminant.
    pub kind: RowKind,
    /// Tenant the row belongs to (merged in from session context).
    pub client_id: String,
    /// Linkage id correlating this row to a pre-existing hire record,
    /// exactly as it appeared in the spreadsheet (may be non-numeric).
    pub new_hire_request_id: Option<String>,
    /// 1-based spreadsheet position for user-facing error reporting
    /// (accounts for the header row).
    pub row_index: usize,
    /// Loosely typed payload fields (name, contact, employment, pay).
    pub fields: BTreeMap<String, String>,
    /// Field name → error message; presence means the row is not submittable.
    pub errors: Option<BTreeMap<String, String>>,
    /// Once true the row is excluded from further submission attempts.
    pub submitted: bool,
}

impl ImportRow {
    /// Creates an empty row for the given spreadsheet position (0-based).
    pub fn new(kind: RowKind, client_id: impl Into<String>, position: usize) -> Self {
        Self {
            uid: Uuid::new_v4(),
            kind,
            client_id: client_id.into(),
            new_hire_request_id: None,
            // +2: spreadsheet rows are 1-based and row 1 is the header
            row_index: position + 2,
            fields: BTreeMap::new(),
            errors: None,
            submitted: false,
        }
    }

    /// Returns the trimmed value of a payload field, or `None` when the field
    /// is absent or blank.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Resolves the row's effective email and the field it came from.
    ///
    /// Prefers work email, then the generic email, then the personal-email
    /// alias. Returns `None` when no source field carries a value.
    pub fn effective_email(&self) -> Option<(&'static str, &str)> {
        EMAIL_SOURCE_FIELDS
            .iter()
            .find_map(|&source| self.field(source).map(|value| (source, value)))
    }

    /// Parses the linkage id as a number, if present and numeric.
    pub fn linkage_id(&self) -> Option<i64> {
        self.new_hire_request_id
            .as_deref()
            .map(str::trim)
            .and_then(|raw| raw.parse::<i64>().ok())
    }

    /// True when the row carries any error (validation or submission).
    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().is_some_and(|e| !e.is_empty())
    }

    /// True when the row carries a server-side submission rejection.
    pub fn has_submission_error(&self) -> bool {
        self.errors
            .as_ref()
            .is_some_and(|e| e.contains_key(SUBMISSION_ERROR_KEY))
    }

    /// True when the row is eligible for submission: no errors and not
    /// already submitted.
    pub fn is_valid_data(&self) -> bool {
        !self.has_errors() && !self.submitted
    }

    /// Attaches an error message under the given key, creating the map on
    /// first use.
    pub fn set_error(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.errors
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), message.into());
    }

    /// Attaches a server-side rejection reason.
    pub fn set_submission_error(&mut self, message: impl Into<String>) {
        self.set_error(SUBMISSION_ERROR_KEY, message);
    }

    /// Clears all errors (edits reset errors; validation then repopulates).
    pub fn clear_errors(&mut self) {
        self.errors = None;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ImportSummary
// ─────────────────────────────────────────────────────────────────────────────

/// Derived counts and filtered row lists, recomputed on demand.
///
/// Pure projection over the row set; never stored. A row counts in at most
/// one of `valid`/`errors`, and rows that are neither (already submitted)
/// count in neither, so `valid + errors <= total` always holds.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    pub total: usize,
    pub valid: usize,
    pub errors: usize,
    /// UIDs of rows eligible for submission.
    pub valid_rows: Vec<Uuid>,
    /// UIDs of rows carrying errors.
    pub error_rows: Vec<Uuid>,
}

impl ImportSummary {
    /// Projects a summary over the given row set.
    pub fn project(rows: &[ImportRow]) -> Self {
        let mut summary = Self {
            total: rows.len(),
            ..Self::default()
        };

        for row in rows {
            if row.submitted {
                continue;
            }
            if row.has_errors() {
                summary.errors += 1;
                summary.error_rows.push(row.uid);
            } else {
                summary.valid += 1;
                summary.valid_rows.push(row.uid);
            }
        }

        summary
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
