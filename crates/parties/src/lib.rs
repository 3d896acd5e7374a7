//! Parties domain module: contacts (prospects and clients).
//!
//! Pure domain logic (no IO, no HTTP, no storage).

pub mod contact;

pub use contact::{Contact, ContactDraft, ContactInfo, ContactPatch, ContactStatus};
