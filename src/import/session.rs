//! Import session orchestration.
//!
//! [`ImportSession`] owns the wizard state and drives the full workflow:
//! upload → validate → review/edit → submit → resubmit. Every backend call
//! goes through the [`PrehireApi`] trait so tests can substitute canned
//! responses. Upload, submit, and resubmit each run under a single-flight
//! guard: a second trigger while one is still active is rejected outright
//! rather than queued.
//!
//! Errors follow one policy throughout: the matching banner field in
//! [`ImportState`] is set before the error is returned, so the UI always has
//! a message to show even if the caller drops the `Err`.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::hcm::prehire::{NewHireRequest, PrehireApi, PrehireFields};
use crate::import::flight::OpGuard;
use crate::import::intake::{self, IntakeContext};
use crate::import::row::{ImportRow, ImportSummary};
use crate::import::submitter::{
    apply_outcome, apply_unprocessable, prepare_batch, recompute_failed,
};
use crate::state::{ImportState, SubmitResult};
use crate::storage::Database;
use crate::validation::{self, is_spreadsheet_file};
use crate::wizard::{self, WizardStep};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state a hire record must be in to accept bulk completion.
const ELIGIBLE_STATUS: &str = "prehire";

/// Banner shown when a submission batch comes up empty.
const NO_VALID_ROWS_MESSAGE: &str = "No valid rows to submit. Fix the reported errors first.";

/// Banner shown when the failed subset has nothing eligible to resubmit.
const NOTHING_TO_RESUBMIT_MESSAGE: &str =
    "No rows are ready to resubmit. Fix the reported errors first.";

/// Notice shown when deleting the last unsubmitted row completes the import.
const ALL_SUBMITTED_NOTICE: &str = "All rows have been submitted.";

// ─────────────────────────────────────────────────────────────────────────────
// Progress Events
// ─────────────────────────────────────────────────────────────────────────────

/// Workflow phase reported alongside progress percentages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportPhase {
    Parsing,
    Validating,
    Submitting,
    Resubmitting,
}

/// Coarse progress event emitted to an optional channel.
///
/// Percentages are monotonically increasing within one operation; they track
/// batch iteration, not per-row network completion.
#[derive(Debug, Clone, Serialize)]
pub struct ImportProgress {
    pub phase: ImportPhase,
    pub percent: u8,
}

// ─────────────────────────────────────────────────────────────────────────────
// ImportSession
// ─────────────────────────────────────────────────────────────────────────────

/// One user's import wizard session.
///
/// State lives behind a `RwLock` and is mutated by whole-array replacement:
/// operations clone the row set, transform the clone, and swap it back in
/// under the write lock. Readers never observe a half-applied batch.
pub struct ImportSession<A: PrehireApi> {
    api: A,
    client_id: String,
    state: RwLock<ImportState>,
    upload_guard: OpGuard,
    submit_guard: OpGuard,
    resubmit_guard: OpGuard,
    progress: Option<UnboundedSender<ImportProgress>>,
    prefs: Option<Arc<Database>>,
}

impl<A: PrehireApi> ImportSession<A> {
    pub fn new(api: A, client_id: impl Into<String>) -> Self {
        Self {
            api,
            client_id: client_id.into(),
            state: RwLock::new(ImportState::new()),
            upload_guard: OpGuard::new("upload"),
            submit_guard: OpGuard::new("submit"),
            resubmit_guard: OpGuard::new("resubmit"),
            progress: None,
            prefs: None,
        }
    }

    /// Attaches a channel for coarse progress events.
    pub fn with_progress(mut self, sender: UnboundedSender<ImportProgress>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Attaches the preferences store used for banner dismissals.
    pub fn with_preferences(mut self, db: Arc<Database>) -> Self {
        self.prefs = Some(db);
        self
    }

    fn emit(&self, phase: ImportPhase, percent: u8) {
        if let Some(sender) = &self.progress {
            let _ = sender.send(ImportProgress { phase, percent });
        }
    }

    // ── Snapshots ─────────────────────────────────────────────────────────────

    /// Clones the current wizard state.
    pub async fn snapshot(&self) -> ImportState {
        self.state.read().await.clone()
    }

    /// Projects the derived summary over the current row set.
    pub async fn summary(&self) -> ImportSummary {
        self.state.read().await.summary()
    }

    /// True while any wizard operation is running.
    pub fn is_busy(&self) -> bool {
        self.upload_guard.in_flight()
            || self.submit_guard.in_flight()
            || self.resubmit_guard.in_flight()
    }

    // ── Upload ────────────────────────────────────────────────────────────────

    /// Runs file intake: gate the extension, parse on the backend, build the
    /// annotated row set, and advance to Review.
    ///
    /// Any failure leaves the previous row set untouched and raises the
    /// upload banner; no partial rows are ever retained.
    pub async fn upload_file(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<ImportSummary, AppError> {
        let _permit = self.upload_guard.try_begin()?;
        let started = Instant::now();

        if !is_spreadsheet_file(file_name) {
            let err = AppError::NotSpreadsheet(file_name.to_string());
            self.state.write().await.upload_error = Some(err.to_presentation().message);
            return Err(err);
        }

        self.emit(ImportPhase::Parsing, 0);

        let (catalog, allow_list, raw) = match self.fetch_upload_inputs(file_name, bytes).await {
            Ok(inputs) => inputs,
            Err(err) => {
                warn!("[IMPORT] upload failed: {err}");
                self.state.write().await.upload_error = Some(err.to_presentation().message);
                return Err(err);
            }
        };

        self.emit(ImportPhase::Validating, 50);

        let ctx = IntakeContext {
            client_id: &self.client_id,
            catalog: &catalog,
            allow_list: &allow_list,
        };
        let rows = intake::build_rows(raw, &ctx);
        let summary = ImportSummary::project(&rows);

        info!(
            "[IMPORT] parsed {} rows from {file_name} ({} valid, {} errors) in {}ms",
            summary.total,
            summary.valid,
            summary.errors,
            started.elapsed().as_millis()
        );

        {
            let mut state = self.state.write().await;
            state.rows = rows;
            state.catalog = Some(catalog);
            state.allow_list = allow_list;
            state.submit_result = None;
            state.failed_row_ids.clear();
            state.has_successful_submission = false;
            state.notice = None;
            state.upload_error = None;
            state.step = WizardStep::Review;
        }

        self.emit(ImportPhase::Validating, 100);
        Ok(summary)
    }

    /// Fetches the field catalog, the eligible-request allow-list, and the
    /// parsed rows for one upload.
    async fn fetch_upload_inputs(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<(PrehireFields, HashSet<i64>, Vec<crate::hcm::prehire::RawRow>), AppError> {
        let catalog = match self.state.read().await.catalog.clone() {
            Some(cached) => cached,
            None => self.api.get_prehire_fields().await?,
        };
        let allow_list = self
            .eligible_requests()
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();
        let raw = self.api.upload_prehire_excel_file(file_name, bytes).await?;
        Ok((catalog, allow_list, raw))
    }

    /// Hire records currently eligible for bulk completion.
    pub async fn eligible_requests(&self) -> Result<Vec<NewHireRequest>, AppError> {
        let requests = self.api.get_new_hire_requests().await?;
        Ok(requests
            .into_iter()
            .filter(|r| r.status.eq_ignore_ascii_case(ELIGIBLE_STATUS))
            .collect())
    }

    /// Streams a prefilled template for the chosen hire records to disk.
    pub async fn download_template(
        &self,
        request_ids: &[i64],
        out_path: &Path,
    ) -> Result<(), AppError> {
        self.api
            .download_prehire_excel_template(request_ids, out_path)
            .await
    }

    // ── Submit ────────────────────────────────────────────────────────────────

    /// Submits every valid unsubmitted row as one bulk-complete call and
    /// reconciles the per-row verdicts.
    ///
    /// Advances to Results only on a full first-pass success: the server
    /// reported zero failures and the batch covered the entire row set.
    pub async fn submit(&self) -> Result<SubmitResult, AppError> {
        let _permit = self.submit_guard.try_begin()?;
        let started = Instant::now();

        let mut rows = self.state.read().await.rows.clone();
        let total = rows.len();
        let batch = prepare_batch(&mut rows, None);

        if batch.is_empty() {
            let mut state = self.state.write().await;
            state.rows = rows;
            state.submit_error = Some(NO_VALID_ROWS_MESSAGE.to_string());
            return Err(AppError::NoValidRows);
        }

        self.emit(ImportPhase::Submitting, 0);
        info!("[IMPORT] submitting {} of {total} rows", batch.len());

        let outcome = match self.api.bulk_complete_prehire_requests(&batch.payload).await {
            Ok(outcome) => outcome,
            Err(AppError::UnprocessableBatch { errors }) => {
                // Per-row 422s are recoverable; map them onto rows and report
                // a zero-success round instead of failing the operation.
                apply_unprocessable(&mut rows, &batch, &errors);
                let failed_ids = recompute_failed(&rows);
                let result = SubmitResult {
                    successful: 0,
                    failed: failed_ids.len() as u64,
                    errors: vec![],
                };
                let mut state = self.state.write().await;
                state.rows = rows;
                state.failed_row_ids = failed_ids;
                state.submit_result = Some(result.clone());
                return Ok(result);
            }
            Err(err) => {
                warn!("[IMPORT] submit failed: {err}");
                self.state.write().await.submit_error = Some(err.to_presentation().message);
                return Err(err);
            }
        };

        apply_outcome(&mut rows, &batch, &outcome);
        let failed_ids = recompute_failed(&rows);
        let result = SubmitResult {
            successful: outcome.successful,
            failed: failed_ids.len() as u64,
            errors: outcome.errors,
        };
        let full_success = outcome.failed == 0 && batch.len() == total;

        info!(
            "[IMPORT] submit finished: {} successful, {} failed in {}ms",
            result.successful,
            result.failed,
            started.elapsed().as_millis()
        );

        {
            let mut state = self.state.write().await;
            state.rows = rows;
            state.failed_row_ids = failed_ids;
            state.submit_result = Some(result.clone());
            state.submit_error = None;
            if full_success {
                state.has_successful_submission = true;
                state.step = WizardStep::Results;
            }
        }

        self.emit(ImportPhase::Submitting, 100);
        Ok(result)
    }

    // ── Resubmit ──────────────────────────────────────────────────────────────

    /// Retries only the currently tracked failed subset.
    ///
    /// `successful` accumulates across rounds; `failed` is recomputed as the
    /// size of the remaining failed subset. Advances to Results once every
    /// row across all rounds has been submitted and this round had zero
    /// failures.
    pub async fn resubmit(&self) -> Result<SubmitResult, AppError> {
        let _permit = self.resubmit_guard.try_begin()?;

        let (mut rows, failed_ids, prior) = {
            let state = self.state.read().await;
            (
                state.rows.clone(),
                state.failed_row_ids.clone(),
                state.submit_result.clone().unwrap_or_default(),
            )
        };
        let total = rows.len() as u64;
        let batch = prepare_batch(&mut rows, Some(&failed_ids));

        if batch.is_empty() {
            let mut state = self.state.write().await;
            state.rows = rows;
            state.resubmit_error = Some(NOTHING_TO_RESUBMIT_MESSAGE.to_string());
            return Ok(prior);
        }

        self.emit(ImportPhase::Resubmitting, 0);
        info!("[IMPORT] resubmitting {} failed rows", batch.len());

        let outcome = match self.api.bulk_complete_prehire_requests(&batch.payload).await {
            Ok(outcome) => outcome,
            Err(AppError::UnprocessableBatch { errors }) => {
                apply_unprocessable(&mut rows, &batch, &errors);
                let failed_ids = recompute_failed(&rows);
                let result = SubmitResult {
                    successful: prior.successful,
                    failed: failed_ids.len() as u64,
                    errors: vec![],
                };
                let mut state = self.state.write().await;
                state.rows = rows;
                state.failed_row_ids = failed_ids;
                state.submit_result = Some(result.clone());
                return Ok(result);
            }
            Err(err) => {
                warn!("[IMPORT] resubmit failed: {err}");
                self.state.write().await.resubmit_error = Some(err.to_presentation().message);
                return Err(err);
            }
        };

        apply_outcome(&mut rows, &batch, &outcome);

        // Coarse, monotone progress over the batch that was just sent
        let len = batch.len() as u64;
        for i in 0..len {
            self.emit(
                ImportPhase::Resubmitting,
                (((i + 1) * 100) / len.max(1)) as u8,
            );
        }

        // Newly submitted rows leave the failed subset before totals are
        // recomputed; order matters to avoid double counting
        let failed_ids = recompute_failed(&rows);
        let result = SubmitResult {
            successful: prior.successful + outcome.successful,
            failed: failed_ids.len() as u64,
            errors: outcome.errors,
        };
        let complete = result.successful == total && outcome.failed == 0;

        info!(
            "[IMPORT] resubmit finished: {} total successful, {} still failed",
            result.successful, result.failed
        );

        {
            let mut state = self.state.write().await;
            state.rows = rows;
            state.failed_row_ids = failed_ids;
            state.submit_result = Some(result.clone());
            state.resubmit_error = None;
            if complete {
                state.has_successful_submission = true;
                state.step = WizardStep::Results;
            }
        }

        Ok(result)
    }

    // ── Row Edits ─────────────────────────────────────────────────────────────

    /// Saves an edited row: replaces its payload, clears prior errors and the
    /// submitted flag, then re-runs the full validator against the saved
    /// values (field catalog and linkage gate included).
    ///
    /// The failed subset is left untouched so a corrected row remains in
    /// scope for the next resubmit round.
    pub async fn save_row_edit(
        &self,
        uid: Uuid,
        fields: BTreeMap<String, String>,
    ) -> Result<ImportSummary, AppError> {
        let mut state = self.state.write().await;
        if state.row(uid).is_none() {
            return Err(AppError::NotFound(format!("import row {uid}")));
        }

        let catalog = state.catalog.clone().unwrap_or_default();
        let mut rows = state.rows.clone();
        for row in rows.iter_mut().filter(|r| r.uid == uid) {
            row.fields = fields.clone();
            row.clear_errors();
            row.submitted = false;
            intake::synthesize_display_email(row);
            for (field, message) in validation::validate_row(row, &catalog) {
                row.set_error(field, message);
            }
            intake::gate_linkage_id(row, &state.allow_list);
        }

        state.rows = rows;
        Ok(state.summary())
    }

    /// Deletes a row from the set.
    ///
    /// If the remaining set is non-empty and fully submitted, the import is
    /// effectively complete: advance to Results with a success notice.
    pub async fn delete_row(&self, uid: Uuid) -> Result<ImportSummary, AppError> {
        let mut state = self.state.write().await;
        if state.row(uid).is_none() {
            return Err(AppError::NotFound(format!("import row {uid}")));
        }

        let rows: Vec<ImportRow> = state.rows.iter().filter(|r| r.uid != uid).cloned().collect();
        state.rows = rows;
        state.failed_row_ids.retain(|id| *id != uid);

        if state.all_rows_submitted() {
            state.has_successful_submission = true;
            state.notice = Some(ALL_SUBMITTED_NOTICE.to_string());
            state.step = WizardStep::Results;
        }

        Ok(state.summary())
    }

    // ── Navigation ────────────────────────────────────────────────────────────

    pub async fn is_step_clickable(&self, step: WizardStep) -> bool {
        wizard::is_step_clickable(&*self.state.read().await, step)
    }

    /// Applies a nav click; returns false when the step is unreachable.
    pub async fn click_step(&self, step: WizardStep) -> bool {
        wizard::click_step(&mut *self.state.write().await, step)
    }

    /// Clears the whole session and returns to Upload.
    pub async fn reset(&self) {
        self.state.write().await.reset();
    }

    // ── Banner Preferences ────────────────────────────────────────────────────

    /// Persists a banner dismissal for this tenant, when a preferences store
    /// is attached.
    pub async fn dismiss_banner(&self, banner: &str) -> Result<(), AppError> {
        match &self.prefs {
            Some(db) => db.dismiss_banner(&self.client_id, banner).await,
            None => Ok(()),
        }
    }

    /// True when the tenant previously dismissed the banner. Without a store,
    /// banners are never considered dismissed.
    pub async fn is_banner_dismissed(&self, banner: &str) -> Result<bool, AppError> {
        match &self.prefs {
            Some(db) => db.is_banner_dismissed(&self.client_id, banner).await,
            None => Ok(false),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    use serde_json::json;
    use tokio::sync::Notify;

    use crate::error::FieldPathError;
    use crate::hcm::prehire::{
        BulkCompleteOutcome, BulkCompletePayload, CompletedRef, RawRow, RowRejection,
    };
    use crate::import::row::SUBMISSION_ERROR_KEY;

    /// Canned-response backend for scenario tests.
    struct FakeApi {
        rows: Vec<RawRow>,
        fields: PrehireFields,
        requests: Vec<NewHireRequest>,
        outcomes: Mutex<VecDeque<Result<BulkCompleteOutcome, AppError>>>,
        /// When set, uploads wait here until notified (single-flight tests).
        hold_uploads: Option<Arc<Notify>>,
    }

    impl FakeApi {
        fn new(rows: Vec<RawRow>, eligible_ids: &[i64]) -> Self {
            Self {
                rows,
                fields: PrehireFields::from_pairs(&[
                    ("first_name", true),
                    ("last_name", true),
                    ("work_email", false),
                ]),
                requests: eligible_ids
                    .iter()
                    .map(|id| NewHireRequest {
                        id: *id,
                        status: "prehire".to_string(),
                        first_name: None,
                        last_name: None,
                    })
                    .collect(),
                outcomes: Mutex::new(VecDeque::new()),
                hold_uploads: None,
            }
        }

        fn queue_outcome(self, outcome: Result<BulkCompleteOutcome, AppError>) -> Self {
            self.outcomes.lock().unwrap().push_back(outcome);
            self
        }
    }

    impl PrehireApi for FakeApi {
        fn upload_prehire_excel_file<'a>(
            &'a self,
            _file_name: &'a str,
            _bytes: Vec<u8>,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<RawRow>, AppError>> + Send + 'a>> {
            Box::pin(async move {
                if let Some(gate) = &self.hold_uploads {
                    gate.notified().await;
                }
                Ok(self.rows.clone())
            })
        }

        fn download_prehire_excel_template<'a>(
            &'a self,
            _request_ids: &'a [i64],
            _out_path: &'a Path,
        ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
            Box::pin(async { Ok(()) })
        }

        fn get_prehire_fields(
            &self,
        ) -> Pin<Box<dyn Future<Output = Result<PrehireFields, AppError>> + Send + '_>> {
            Box::pin(async { Ok(self.fields.clone()) })
        }

        fn bulk_complete_prehire_requests<'a>(
            &'a self,
            _payload: &'a [BulkCompletePayload],
        ) -> Pin<Box<dyn Future<Output = Result<BulkCompleteOutcome, AppError>> + Send + 'a>>
        {
            Box::pin(async move {
                self.outcomes
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| panic!("no outcome queued"))
            })
        }

        fn get_new_hire_requests(
            &self,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<NewHireRequest>, AppError>> + Send + '_>>
        {
            Box::pin(async { Ok(self.requests.clone()) })
        }
    }

    fn hire_row(id: i64, first: &str) -> RawRow {
        [
            ("new_hire_request_id".to_string(), json!(id)),
            ("first_name".to_string(), json!(first)),
            ("last_name".to_string(), json!("Doe")),
            ("work_email".to_string(), json!(format!("{first}@corp.com"))),
        ]
        .into_iter()
        .collect()
    }

    fn completed(ids: &[i64], failed: &[(i64, &str)]) -> BulkCompleteOutcome {
        BulkCompleteOutcome {
            completed: ids
                .iter()
                .map(|id| CompletedRef {
                    new_hire_request_id: *id,
                })
                .collect(),
            errors: failed
                .iter()
                .map(|(id, msg)| RowRejection {
                    new_hire_request_id: Some(*id),
                    error: msg.to_string(),
                })
                .collect(),
            successful: ids.len() as u64,
            failed: failed.len() as u64,
        }
    }

    #[tokio::test]
    async fn rejects_non_spreadsheet_before_any_network_call() {
        let session = ImportSession::new(FakeApi::new(vec![], &[]), "client-1");

        let err = session.upload_file("roster.csv", vec![]).await.unwrap_err();
        assert!(matches!(err, AppError::NotSpreadsheet(_)));

        let state = session.snapshot().await;
        assert!(state.upload_error.is_some());
        assert!(state.rows.is_empty());
        assert_eq!(state.step, WizardStep::Upload);
    }

    #[tokio::test]
    async fn upload_builds_rows_and_advances_to_review() {
        let api = FakeApi::new(vec![hire_row(101, "Ana"), hire_row(102, "Ben")], &[101, 102]);
        let session = ImportSession::new(api, "client-1");

        let summary = session.upload_file("hires.xlsx", vec![1, 2, 3]).await.unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.valid, 2);

        let state = session.snapshot().await;
        assert_eq!(state.step, WizardStep::Review);
        assert_eq!(state.rows[0].client_id, "client-1");
        assert!(state.catalog.is_some());
        assert_eq!(state.allow_list, HashSet::from([101, 102]));
    }

    #[tokio::test]
    async fn submit_with_no_valid_rows_raises_banner_and_errors() {
        let mut raw = hire_row(999, "Ana");
        raw.insert("first_name".to_string(), json!(""));
        let api = FakeApi::new(vec![raw], &[101]);
        let session = ImportSession::new(api, "client-1");
        session.upload_file("hires.xlsx", vec![]).await.unwrap();

        let err = session.submit().await.unwrap_err();
        assert!(matches!(err, AppError::NoValidRows));
        assert!(session.snapshot().await.submit_error.is_some());
    }

    #[tokio::test]
    async fn full_success_auto_advances_to_results() {
        let api = FakeApi::new(
            vec![hire_row(101, "Ana"), hire_row(102, "Ben"), hire_row(103, "Cy")],
            &[101, 102, 103],
        )
        .queue_outcome(Ok(completed(&[101, 102, 103], &[])));
        let session = ImportSession::new(api, "client-1");
        session.upload_file("hires.xlsx", vec![]).await.unwrap();

        let result = session.submit().await.unwrap();
        assert_eq!(result.successful, 3);
        assert_eq!(result.failed, 0);

        let state = session.snapshot().await;
        assert_eq!(state.step, WizardStep::Results);
        assert!(state.has_successful_submission);
        assert!(state.rows.iter().all(|r| r.submitted));
    }

    #[tokio::test]
    async fn partial_failure_then_resubmit_completes_the_import() {
        let api = FakeApi::new(vec![hire_row(101, "Ana"), hire_row(102, "Ben")], &[101, 102])
            .queue_outcome(Ok(completed(&[101], &[(102, "email already in use")])))
            .queue_outcome(Ok(completed(&[102], &[])));
        let session = ImportSession::new(api, "client-1");
        session.upload_file("hires.xlsx", vec![]).await.unwrap();

        // First round: A completes, B fails; wizard stays on Review
        let result = session.submit().await.unwrap();
        assert_eq!(result.successful, 1);
        assert_eq!(result.failed, 1);

        let state = session.snapshot().await;
        assert_eq!(state.step, WizardStep::Review);
        let failed_uid = state.failed_row_ids[0];
        assert_eq!(
            state
                .row(failed_uid)
                .unwrap()
                .errors
                .as_ref()
                .unwrap()
                .get(SUBMISSION_ERROR_KEY)
                .map(String::as_str),
            Some("email already in use")
        );

        // User fixes B; the failed subset keeps tracking it
        let fixed = state.row(failed_uid).unwrap().fields.clone();
        session.save_row_edit(failed_uid, fixed).await.unwrap();
        assert_eq!(session.snapshot().await.failed_row_ids, vec![failed_uid]);

        // Second round drains the failed subset and completes the import
        let result = session.resubmit().await.unwrap();
        assert_eq!(result.successful, 2);
        assert_eq!(result.failed, 0);

        let state = session.snapshot().await;
        assert!(state.failed_row_ids.is_empty());
        assert_eq!(state.step, WizardStep::Results);
        assert!(state.has_successful_submission);
    }

    #[tokio::test]
    async fn resubmit_successful_total_is_monotone() {
        let api = FakeApi::new(
            vec![hire_row(101, "Ana"), hire_row(102, "Ben"), hire_row(103, "Cy")],
            &[101, 102, 103],
        )
        .queue_outcome(Ok(completed(&[101], &[(102, "x"), (103, "y")])))
        .queue_outcome(Ok(completed(&[102], &[(103, "y")])))
        .queue_outcome(Ok(completed(&[103], &[])));
        let session = ImportSession::new(api, "client-1");
        session.upload_file("hires.xlsx", vec![]).await.unwrap();

        let r1 = session.submit().await.unwrap();
        assert_eq!((r1.successful, r1.failed), (1, 2));

        let fix = |state: &ImportState, uid: Uuid| state.row(uid).unwrap().fields.clone();

        let state = session.snapshot().await;
        for uid in state.failed_row_ids.clone() {
            session.save_row_edit(uid, fix(&state, uid)).await.unwrap();
        }
        let r2 = session.resubmit().await.unwrap();
        assert_eq!((r2.successful, r2.failed), (2, 1));

        let state = session.snapshot().await;
        for uid in state.failed_row_ids.clone() {
            session.save_row_edit(uid, fix(&state, uid)).await.unwrap();
        }
        let r3 = session.resubmit().await.unwrap();
        assert_eq!((r3.successful, r3.failed), (3, 0));

        assert!(r1.successful <= r2.successful && r2.successful <= r3.successful);
        assert!(r1.failed >= r2.failed && r2.failed >= r3.failed);
        assert_eq!(session.snapshot().await.step, WizardStep::Results);
    }

    #[tokio::test]
    async fn resubmit_with_empty_subset_warns_and_keeps_prior_result() {
        let api = FakeApi::new(vec![hire_row(101, "Ana")], &[101])
            .queue_outcome(Ok(completed(&[101], &[])));
        let session = ImportSession::new(api, "client-1");
        session.upload_file("hires.xlsx", vec![]).await.unwrap();
        let prior = session.submit().await.unwrap();

        let result = session.resubmit().await.unwrap();
        assert_eq!(result.successful, prior.successful);
        assert!(session.snapshot().await.resubmit_error.is_some());
    }

    #[tokio::test]
    async fn unprocessable_batch_maps_errors_onto_rows() {
        let api = FakeApi::new(vec![hire_row(101, "Ana"), hire_row(102, "Ben")], &[101, 102])
            .queue_outcome(Err(AppError::UnprocessableBatch {
                errors: vec![FieldPathError {
                    row_position: 1,
                    field: "work_email".to_string(),
                    message: "value is not a valid email address".to_string(),
                }],
            }));
        let session = ImportSession::new(api, "client-1");
        session.upload_file("hires.xlsx", vec![]).await.unwrap();

        let result = session.submit().await.unwrap();
        assert_eq!(result.successful, 0);
        assert_eq!(result.failed, 1);

        let state = session.snapshot().await;
        assert_eq!(state.step, WizardStep::Review);
        assert!(state.submit_error.is_none());
        let failed = state.failed_rows();
        assert_eq!(failed.len(), 1);
        assert!(failed[0]
            .errors
            .as_ref()
            .unwrap()
            .get(SUBMISSION_ERROR_KEY)
            .unwrap()
            .contains("work_email"));
    }

    #[tokio::test]
    async fn submit_network_failure_raises_banner_and_preserves_rows() {
        let api = FakeApi::new(vec![hire_row(101, "Ana")], &[101])
            .queue_outcome(Err(AppError::ConnectionFailed("timed out".to_string())));
        let session = ImportSession::new(api, "client-1");
        session.upload_file("hires.xlsx", vec![]).await.unwrap();

        let err = session.submit().await.unwrap_err();
        assert!(matches!(err, AppError::ConnectionFailed(_)));

        let state = session.snapshot().await;
        assert!(state.submit_error.is_some());
        assert_eq!(state.rows.len(), 1);
        assert!(!state.rows[0].submitted);
    }

    #[tokio::test]
    async fn deleting_last_unsubmitted_row_completes_the_import() {
        let api = FakeApi::new(vec![hire_row(101, "Ana"), hire_row(102, "Ben")], &[101, 102])
            .queue_outcome(Ok(completed(&[101], &[(102, "rejected")])));
        let session = ImportSession::new(api, "client-1");
        session.upload_file("hires.xlsx", vec![]).await.unwrap();
        session.submit().await.unwrap();

        let state = session.snapshot().await;
        assert_eq!(state.step, WizardStep::Review);
        let failed_uid = state.failed_row_ids[0];

        session.delete_row(failed_uid).await.unwrap();

        let state = session.snapshot().await;
        assert!(state.all_rows_submitted());
        assert_eq!(state.step, WizardStep::Results);
        assert_eq!(state.notice.as_deref(), Some(ALL_SUBMITTED_NOTICE));
        assert!(state.has_successful_submission);
    }

    #[tokio::test]
    async fn save_row_edit_revalidates_against_catalog_and_allow_list() {
        let api = FakeApi::new(vec![hire_row(101, "Ana")], &[101]);
        let session = ImportSession::new(api, "client-1");
        session.upload_file("hires.xlsx", vec![]).await.unwrap();

        let state = session.snapshot().await;
        let uid = state.rows[0].uid;

        // Blank out a required field and break the email
        let mut fields = state.rows[0].fields.clone();
        fields.insert("last_name".to_string(), String::new());
        fields.insert("work_email".to_string(), "not-an-email".to_string());
        fields.remove("email");
        session.save_row_edit(uid, fields).await.unwrap();

        let state = session.snapshot().await;
        let errors = state.row(uid).unwrap().errors.as_ref().unwrap();
        assert_eq!(
            errors.get("last_name").map(String::as_str),
            Some("This field is required")
        );
        assert_eq!(
            errors.get("work_email").map(String::as_str),
            Some("Invalid email format")
        );
    }

    #[tokio::test]
    async fn edit_of_unknown_row_is_not_found() {
        let session = ImportSession::new(FakeApi::new(vec![], &[]), "client-1");
        let err = session
            .save_row_edit(Uuid::new_v4(), BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn concurrent_upload_is_rejected_not_queued() {
        let mut api = FakeApi::new(vec![hire_row(101, "Ana")], &[101]);
        let gate = Arc::new(Notify::new());
        api.hold_uploads = Some(gate.clone());

        let session = Arc::new(ImportSession::new(api, "client-1"));

        let first = {
            let session = session.clone();
            tokio::spawn(async move { session.upload_file("hires.xlsx", vec![]).await })
        };
        // Let the first upload reach the gate
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(session.is_busy());

        let err = session.upload_file("hires.xlsx", vec![]).await.unwrap_err();
        assert!(matches!(err, AppError::OperationInFlight("upload")));

        gate.notify_one();
        first.await.unwrap().unwrap();
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn reset_returns_to_a_blank_upload_step() {
        let api = FakeApi::new(vec![hire_row(101, "Ana")], &[101])
            .queue_outcome(Ok(completed(&[101], &[])));
        let session = ImportSession::new(api, "client-1");
        session.upload_file("hires.xlsx", vec![]).await.unwrap();
        session.submit().await.unwrap();

        session.reset().await;

        let state = session.snapshot().await;
        assert_eq!(state.step, WizardStep::Upload);
        assert!(state.rows.is_empty());
        assert!(state.submit_result.is_none());
    }

    #[tokio::test]
    async fn progress_percentages_are_monotone() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let api = FakeApi::new(vec![hire_row(101, "Ana"), hire_row(102, "Ben")], &[101, 102])
            .queue_outcome(Ok(completed(&[101], &[(102, "x")])))
            .queue_outcome(Ok(completed(&[102], &[])));
        let session = ImportSession::new(api, "client-1").with_progress(tx);

        session.upload_file("hires.xlsx", vec![]).await.unwrap();
        session.submit().await.unwrap();
        let state = session.snapshot().await;
        for uid in state.failed_row_ids.clone() {
            session
                .save_row_edit(uid, state.row(uid).unwrap().fields.clone())
                .await
                .unwrap();
        }
        session.resubmit().await.unwrap();

        let mut last_per_phase: BTreeMap<String, u8> = BTreeMap::new();
        while let Ok(event) = rx.try_recv() {
            let key = format!("{:?}", event.phase);
            let last = last_per_phase.entry(key).or_insert(0);
            assert!(event.percent >= *last);
            *last = event.percent;
        }
        assert_eq!(last_per_phase.get("Resubmitting"), Some(&100));
    }
}
