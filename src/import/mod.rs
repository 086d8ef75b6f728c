//! The import wizard engine: intake, submission, resubmission, session.

pub mod flight;
pub mod intake;
pub mod row;
pub mod session;
pub mod submitter;

pub use row::{ImportRow, ImportSummary, RowKind};
pub use session::{ImportPhase, ImportProgress, ImportSession};
