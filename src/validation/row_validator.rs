//! Pure per-row validation against the prehire field catalog.
//!
//! Checks two things:
//! - Required fields: every catalog field flagged required for electronic
//!   onboarding (and not upstream-sourced) must be present and non-blank.
//! - Email format: the row's effective email must look like
//!   `local@domain.tld`; the error lands under whichever source field
//!   carries the value.
//!
//! No I/O and no mutation; callers decide what to do with the error map.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::hcm::prehire::PrehireFields;
use crate::import::row::ImportRow;
use crate::validation::{
    INVALID_EMAIL_MESSAGE, REQUIRED_FIELD_MESSAGE, UPSTREAM_SOURCED_FIELDS,
};

/// `local@domain.tld`; intentionally permissive about the local part.
fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s.]+$").expect("email pattern is valid")
    })
}

/// Returns true when the value matches the `local@domain.tld` shape.
pub fn is_valid_email(value: &str) -> bool {
    email_pattern().is_match(value)
}

/// Validates one row against the field catalog.
///
/// Returns field name → error message; empty when the row is clean. Fields
/// absent from the catalog never produce errors.
pub fn validate_row(row: &ImportRow, catalog: &PrehireFields) -> BTreeMap<String, String> {
    let mut errors = BTreeMap::new();

    for name in catalog.required_names() {
        if UPSTREAM_SOURCED_FIELDS.contains(&name) {
            continue;
        }
        if row.field(name).is_none() {
            errors.insert(name.to_string(), REQUIRED_FIELD_MESSAGE.to_string());
        }
    }

    if let Some((source_field, value)) = row.effective_email() {
        if !is_valid_email(value) {
            errors.insert(source_field.to_string(), INVALID_EMAIL_MESSAGE.to_string());
        }
    }

    errors
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
