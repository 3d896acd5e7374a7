//! Sales domain module: quotes ("devis") sent to clients before invoicing.
//!
//! Pure domain logic (no IO, no HTTP, no storage).

pub mod quote;

pub use quote::{Quote, QuoteDraft, QuotePatch, QuoteStatus};
