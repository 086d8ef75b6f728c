//! Import wizard state store.
//!
//! Pure in-memory container for everything the wizard tracks: the active
//! step, the row set, the latest submission result, the failed-row subset,
//! and the error banners. Mutation happens through [`crate::import::session::
//! ImportSession`]; the store itself never performs I/O.

use std::collections::HashSet;

use serde::Serialize;
use uuid::Uuid;

use crate::hcm::prehire::{PrehireFields, RowRejection};
use crate::import::row::{ImportRow, ImportSummary};
use crate::wizard::WizardStep;

// ─────────────────────────────────────────────────────────────────────────────
// SubmitResult
// ─────────────────────────────────────────────────────────────────────────────

/// Aggregate result of the most recent submission round.
///
/// `successful` accumulates across resubmit rounds; `failed` is always the
/// size of the currently tracked failed subset (not the raw server count), so
/// it stays consistent with what the review screen shows.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SubmitResult {
    pub successful: u64,
    pub failed: u64,
    pub errors: Vec<RowRejection>,
}

// ─────────────────────────────────────────────────────────────────────────────
// ImportState
// ─────────────────────────────────────────────────────────────────────────────

/// All wizard state for one import session.
///
/// The row array is replaced wholesale on every mutation (copy-on-write),
/// never spliced in place.
#[derive(Debug, Clone, Default)]
pub struct ImportState {
    /// Active wizard step.
    pub step: WizardStep,
    /// The uploaded row set; empty before a successful parse.
    pub rows: Vec<ImportRow>,
    /// Result of the latest submission attempt, if any.
    pub submit_result: Option<SubmitResult>,
    /// UIDs of rows whose last submission was rejected by the server.
    pub failed_row_ids: Vec<Uuid>,
    /// Allow-list of linkage ids eligible for this operation, captured at
    /// upload time so the edit path can re-check linkage ids.
    pub allow_list: HashSet<i64>,
    /// Cached field catalog; fetched once per session.
    pub catalog: Option<PrehireFields>,
    /// True once a submission attempt has fully succeeded.
    pub has_successful_submission: bool,
    /// Success notice for the results screen, if any.
    pub notice: Option<String>,
    /// Terminal upload error banner.
    pub upload_error: Option<String>,
    /// Terminal submit error banner.
    pub submit_error: Option<String>,
    /// Terminal resubmit error banner.
    pub resubmit_error: Option<String>,
}

impl ImportState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears all fields and returns to the Upload step.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Projects the derived summary over the current row set.
    pub fn summary(&self) -> ImportSummary {
        ImportSummary::project(&self.rows)
    }

    /// Looks up a row by its stable uid.
    pub fn row(&self, uid: Uuid) -> Option<&ImportRow> {
        self.rows.iter().find(|r| r.uid == uid)
    }

    /// Rows currently tracked as failed, in failed-set order.
    pub fn failed_rows(&self) -> Vec<&ImportRow> {
        self.failed_row_ids
            .iter()
            .filter_map(|uid| self.row(*uid))
            .collect()
    }

    /// True when the set is non-empty and every row has been submitted.
    pub fn all_rows_submitted(&self) -> bool {
        !self.rows.is_empty() && self.rows.iter().all(|r| r.submitted)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
