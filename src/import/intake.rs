//! File intake: turns raw parsed spreadsheet rows into [`ImportRow`]s.
//!
//! The backend's parse endpoint returns loosely typed cells in file order.
//! Intake stringifies them, tags each row's kind, merges in session context,
//! synthesizes the display email, runs the row validator, and gates the
//! linkage id against the caller-supplied allow-list. Rows come back fully
//! annotated; no partial results leave this module.

use std::collections::{BTreeMap, HashSet};

use crate::hcm::prehire::{PrehireFields, RawRow};
use crate::import::row::{ImportRow, RowKind};
use crate::validation::{validate_row, LINKAGE_ID_ERROR_MESSAGE};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Spreadsheet column carrying the row-kind discriminant.
const ROW_TYPE_COLUMN: &str = "row_type";

/// `row_type` value marking an abbreviated quick-hire row.
const QUICK_HIRE_TYPE: &str = "quick_hire";

/// Spreadsheet column carrying the linkage id.
const LINKAGE_ID_COLUMN: &str = "new_hire_request_id";

// ─────────────────────────────────────────────────────────────────────────────
// IntakeContext
// ─────────────────────────────────────────────────────────────────────────────

/// Session context merged into every built row.
pub struct IntakeContext<'a> {
    /// Tenant the upload belongs to.
    pub client_id: &'a str,
    /// Field catalog driving required-field validation.
    pub catalog: &'a PrehireFields,
    /// Linkage ids eligible for this operation.
    pub allow_list: &'a HashSet<i64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Row Construction
// ─────────────────────────────────────────────────────────────────────────────

/// Builds annotated [`ImportRow`]s from the parse endpoint's raw rows.
///
/// Each row gets a fresh uid, the session `client_id`, a 1-based spreadsheet
/// position, a synthesized display email, validator errors, and the linkage
/// gate verdict. Input order is preserved.
pub fn build_rows(raw: Vec<RawRow>, ctx: &IntakeContext<'_>) -> Vec<ImportRow> {
    raw.into_iter()
        .enumerate()
        .map(|(position, cells)| build_row(cells, position, ctx))
        .collect()
}

fn build_row(cells: RawRow, position: usize, ctx: &IntakeContext<'_>) -> ImportRow {
    let mut fields = BTreeMap::new();
    for (name, value) in cells {
        if let Some(text) = cell_to_string(&value) {
            fields.insert(name, text);
        }
    }

    let kind = match fields.remove(ROW_TYPE_COLUMN) {
        Some(v) if v.trim().eq_ignore_ascii_case(QUICK_HIRE_TYPE) => RowKind::QuickHire,
        _ => RowKind::Prehire,
    };

    let mut row = ImportRow::new(kind, ctx.client_id, position);
    row.new_hire_request_id = fields.remove(LINKAGE_ID_COLUMN);
    row.fields = fields;

    synthesize_display_email(&mut row);

    let errors = validate_row(&row, ctx.catalog);
    for (field, message) in errors {
        row.set_error(field, message);
    }

    gate_linkage_id(&mut row, ctx.allow_list);

    row
}

/// Fills the generic `email` field from `work_email`, then `personal_email`,
/// when the row did not carry one of its own. Shared with the edit-save path.
pub fn synthesize_display_email(row: &mut ImportRow) {
    if row.field("email").is_some() {
        return;
    }
    let display = row
        .field("work_email")
        .or_else(|| row.field("personal_email"))
        .map(str::to_string);
    if let Some(email) = display {
        row.fields.insert("email".to_string(), email);
    }
}

/// Checks the row's linkage id: present, numeric, and in the allow-list.
///
/// A miss attaches the dedicated linkage error, which also warns the user not
/// to edit that column. Distinct from generic required-field errors. Shared
/// with the edit-save path.
pub fn gate_linkage_id(row: &mut ImportRow, allow_list: &HashSet<i64>) {
    let ok = row
        .linkage_id()
        .is_some_and(|id| allow_list.contains(&id));
    if !ok {
        row.set_error(LINKAGE_ID_COLUMN, LINKAGE_ID_ERROR_MESSAGE);
    }
}

/// Renders a raw cell as a trimmed string; `None` for null or blank cells.
fn cell_to_string(value: &serde_json::Value) -> Option<String> {
    let text = match value {
        serde_json::Value::Null => return None,
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
