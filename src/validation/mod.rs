//! Client-side validation for the import wizard.
//!
//! [`row_validator`] holds the pure per-row checks; this module carries the
//! shared constants and the pre-network spreadsheet file gate.

pub mod row_validator;

pub use row_validator::{is_valid_email, validate_row};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Error message for a missing required field.
pub const REQUIRED_FIELD_MESSAGE: &str = "This field is required";

/// Error message for a malformed email.
pub const INVALID_EMAIL_MESSAGE: &str = "Invalid email format";

/// Error message attached when a row's linkage id is absent, non-numeric, or
/// not in the allow-list of eligible hire records.
pub const LINKAGE_ID_ERROR_MESSAGE: &str =
    "Invalid or modified New Hire Request ID. Do not edit this column; download a fresh template if needed.";

/// Identity fields sourced from the upstream hire record. They must not be
/// re-entered through the import template, so they are never reported as
/// required here even when the catalog flags them.
///
/// Shared by intake and the per-row edit path; keep the two call sites on
/// this single constant.
pub const UPSTREAM_SOURCED_FIELDS: &[&str] = &["ssn", "birth_date", "gender", "employee_number"];

/// Spreadsheet extensions accepted by file intake.
const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xls"];

/// Returns true when the file name carries an accepted spreadsheet extension.
///
/// Checked before any network call; everything else is rejected outright.
pub fn is_spreadsheet_file(file_name: &str) -> bool {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| {
            let ext = ext.to_ascii_lowercase();
            SPREADSHEET_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
