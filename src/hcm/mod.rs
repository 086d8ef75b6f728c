//! HCM backend integration.
//!
//! [`client`] provides the authenticated HTTP client with safe logging;
//! [`prehire`] provides the prehire-import endpoints and wire types.

pub mod client;
pub mod prehire;

pub use client::{ApiCredentials, HcmClient, LoggingMode};
pub use prehire::{
    BulkCompleteOutcome, BulkCompletePayload, NewHireRequest, PrehireApi, PrehireClient,
    PrehireFieldSpec, PrehireFields, RawRow,
};
