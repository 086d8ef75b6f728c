//! Bulk prehire import engine for the HCM self-service client.
//!
//! Implements the new-hire spreadsheet import workflow end to end:
//! - File intake (spreadsheet gate, backend parse, per-row validation)
//! - Batch submission to the bulk-complete endpoint
//! - Partial-failure bookkeeping and the resubmit loop
//! - Wizard step navigation (Upload → Review → Results)
//!
//! The backend is an opaque REST collaborator reached through [`hcm`];
//! all engine state lives in memory inside an [`import::session::ImportSession`].

pub mod error;
pub mod hcm;
pub mod import;
pub mod state;
pub mod storage;
pub mod validation;
pub mod wizard;

pub use error::AppError;
pub use import::session::ImportSession;
pub use state::ImportState;
pub use wizard::WizardStep;
