//! Invoicing domain module.
//!
//! Invoices and their payment lifecycle, implemented purely as deterministic
//! domain logic (no IO, no HTTP, no storage).

pub mod invoice;

pub use invoice::{Invoice, InvoiceDraft, InvoicePatch, InvoiceStatus};
