//! Products domain module: the sellable catalog.
//!
//! Pure domain logic (no IO, no HTTP, no storage).

pub mod product;

pub use product::{Product, ProductDraft, ProductPatch, ProductStatus};
