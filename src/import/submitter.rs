//! Batch submission mechanics: payload preparation and outcome reconciliation.
//!
//! The bulk-complete endpoint takes the whole eligible batch in one call.
//! These helpers build that batch from the row set and fold the server's
//! per-row verdicts back into it. Reconciliation matches rows by linkage id
//! first; when the server cannot name the row (422 field-path errors, or a
//! rejection without an id) it falls back to the row's position within the
//! submitted batch, resolved through the batch's recorded uids so the match
//! never depends on the live array's ordering.

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::error::FieldPathError;
use crate::hcm::prehire::{BulkCompleteOutcome, BulkCompletePayload};
use crate::import::row::ImportRow;
use crate::validation::LINKAGE_ID_ERROR_MESSAGE;

// ─────────────────────────────────────────────────────────────────────────────
// PreparedBatch
// ─────────────────────────────────────────────────────────────────────────────

/// An outbound bulk-complete batch plus the uid of each row it came from.
///
/// `batch_uids[i]` is the source row of `payload[i]`; positional server
/// errors resolve through it.
#[derive(Debug, Default)]
pub struct PreparedBatch {
    pub payload: Vec<BulkCompletePayload>,
    pub batch_uids: Vec<Uuid>,
}

impl PreparedBatch {
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Batch Preparation
// ─────────────────────────────────────────────────────────────────────────────

/// Builds the outbound batch from rows that carry no errors and are not yet
/// submitted, optionally restricted to `scope` (the resubmit path passes the
/// failed subset).
///
/// An eligible row whose linkage id fails to parse as a number is annotated
/// in place instead of entering the batch.
pub fn prepare_batch(rows: &mut [ImportRow], scope: Option<&[Uuid]>) -> PreparedBatch {
    let mut batch = PreparedBatch::default();

    for row in rows.iter_mut() {
        if let Some(uids) = scope {
            if !uids.contains(&row.uid) {
                continue;
            }
        }
        if !row.is_valid_data() {
            continue;
        }

        let Some(linkage_id) = row.linkage_id() else {
            row.set_error("new_hire_request_id", LINKAGE_ID_ERROR_MESSAGE);
            continue;
        };

        batch.payload.push(BulkCompletePayload {
            new_hire_request_id: linkage_id,
            client_id: row.client_id.clone(),
            fields: row.fields.clone(),
        });
        batch.batch_uids.push(row.uid);
    }

    batch
}

// ─────────────────────────────────────────────────────────────────────────────
// Outcome Reconciliation
// ─────────────────────────────────────────────────────────────────────────────

/// Folds the server's bulk-complete verdicts back into the row set.
///
/// Completed rows are matched by linkage id and marked `submitted`.
/// Rejections are matched by linkage id, falling back to the rejection's
/// position in the batch, and receive the server reason under the
/// submission error key.
pub fn apply_outcome(
    rows: &mut [ImportRow],
    batch: &PreparedBatch,
    outcome: &BulkCompleteOutcome,
) {
    for completed in &outcome.completed {
        if let Some(row) = row_by_linkage(rows, completed.new_hire_request_id) {
            row.submitted = true;
        }
    }

    for (position, rejection) in outcome.errors.iter().enumerate() {
        let target = match rejection.new_hire_request_id {
            Some(id) => row_by_linkage(rows, id),
            None => row_by_batch_position(rows, batch, position),
        };
        if let Some(row) = target {
            row.set_submission_error(rejection.error.clone());
        }
    }
}

/// Folds an HTTP 422 field-path error list back into the row set.
///
/// Each error names a position within the submitted batch; errors for the
/// same row are joined into one submission message. Rows the payload cannot
/// name are dropped.
pub fn apply_unprocessable(
    rows: &mut [ImportRow],
    batch: &PreparedBatch,
    errors: &[FieldPathError],
) {
    let mut per_row: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for error in errors {
        per_row
            .entry(error.row_position)
            .or_default()
            .push(format!("{}: {}", error.field, error.message));
    }

    for (position, messages) in per_row {
        if let Some(row) = row_by_batch_position(rows, batch, position) {
            row.set_submission_error(messages.join("; "));
        }
    }
}

/// UIDs of rows currently carrying a server-side rejection, in row order.
pub fn recompute_failed(rows: &[ImportRow]) -> Vec<Uuid> {
    rows.iter()
        .filter(|r| r.has_submission_error())
        .map(|r| r.uid)
        .collect()
}

fn row_by_linkage(rows: &mut [ImportRow], linkage_id: i64) -> Option<&mut ImportRow> {
    rows.iter_mut().find(|r| r.linkage_id() == Some(linkage_id))
}

fn row_by_batch_position<'a>(
    rows: &'a mut [ImportRow],
    batch: &PreparedBatch,
    position: usize,
) -> Option<&'a mut ImportRow> {
    let uid = *batch.batch_uids.get(position)?;
    rows.iter_mut().find(|r| r.uid == uid)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
