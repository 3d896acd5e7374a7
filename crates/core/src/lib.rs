//! `crm-core`: shared building blocks for CRM records.
//!
//! Pure domain primitives: identifiers, the entity trait, status lifecycles
//! and the domain error model. No storage or network concerns.

pub mod entity;
pub mod error;
pub mod id;
pub mod kind;

pub use entity::{Entity, Lifecycle, Timestamps, fold_for_search, round_cents, with_tax};
pub use error::{DomainError, DomainResult};
pub use id::{EntityId, next_id};
pub use kind::EntityKind;
