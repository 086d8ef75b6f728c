//! Wizard step state machine and navigator.
//!
//! Three steps: Upload(0) → Review(1) → Results(2). Forward transitions fire
//! automatically (parse success advances to Review; a full first-pass submit
//! success advances to Results). Manual navigation is gated by
//! [`is_step_clickable`] and applied by [`click_step`], which also clears the
//! error banners scoped to the destination step.

use serde::{Deserialize, Serialize};

use crate::state::ImportState;

/// The wizard's only states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    /// Step 0: choose and upload the spreadsheet.
    #[default]
    Upload,
    /// Step 1: review rows, fix errors, submit.
    Review,
    /// Step 2: terminal results screen; exited only via reset.
    Results,
}

impl WizardStep {
    /// 0-based index as shown in the stepper UI.
    pub fn index(self) -> usize {
        match self {
            WizardStep::Upload => 0,
            WizardStep::Review => 1,
            WizardStep::Results => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(WizardStep::Upload),
            1 => Some(WizardStep::Review),
            2 => Some(WizardStep::Results),
            _ => None,
        }
    }
}

/// Whether a nav control for the given step is active.
///
/// - Upload is always reachable.
/// - Review requires at least one uploaded row.
/// - Results requires a submission result.
pub fn is_step_clickable(state: &ImportState, step: WizardStep) -> bool {
    match step {
        WizardStep::Upload => true,
        WizardStep::Review => !state.rows.is_empty(),
        WizardStep::Results => state.submit_result.is_some(),
    }
}

/// Applies a nav click: moves to the step when reachable and clears the
/// error banners scoped to it. Returns false (and leaves state untouched)
/// when the step is not clickable.
///
/// Banner scoping avoids stale alerts after navigation:
/// - Upload clears all three banners.
/// - Review clears the upload and resubmit banners.
/// - Results clears the submit banner.
pub fn click_step(state: &mut ImportState, step: WizardStep) -> bool {
    if !is_step_clickable(state, step) {
        return false;
    }

    match step {
        WizardStep::Upload => {
            state.upload_error = None;
            state.submit_error = None;
            state.resubmit_error = None;
        }
        WizardStep::Review => {
            state.upload_error = None;
            state.resubmit_error = None;
        }
        WizardStep::Results => {
            state.submit_error = None;
        }
    }

    state.step = step;
    true
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
