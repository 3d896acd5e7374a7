//! Entity trait: identity, timestamps, derived fields and status lifecycle.
//!
//! Every persisted CRM record implements [`Entity`]. The generic entity store
//! relies only on this trait for ID assignment, merging partial updates,
//! recomputing derived fields, validating status changes and searching.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use unicode_normalization::UnicodeNormalization;

use crate::error::{DomainError, DomainResult};
use crate::id::EntityId;
use crate::kind::EntityKind;

/// Creation / last-mutation stamps shared by every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timestamps {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Timestamps {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

/// Closed status enumeration with an explicit transition table.
pub trait Lifecycle:
    Copy + Eq + core::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Whether `self -> next` is listed in the transition table.
    ///
    /// Re-applying the current status is handled by [`ensure_transition`]
    /// and does not need to be listed.
    ///
    /// [`ensure_transition`]: Lifecycle::ensure_transition
    fn can_transition_to(self, next: Self) -> bool;

    /// Wire value, as stored in snapshots.
    fn as_str(self) -> &'static str;

    /// Human-readable label used in notifications.
    fn label(self) -> &'static str;

    fn ensure_transition(self, next: Self) -> DomainResult<()> {
        if self == next || self.can_transition_to(next) {
            Ok(())
        } else {
            Err(DomainError::invalid_transition(self.as_str(), next.as_str()))
        }
    }
}

/// A persisted CRM record.
pub trait Entity:
    Clone + core::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Input for `create` (everything except ID, timestamps and derived fields).
    type Draft: Send;
    /// Partial update; `None` fields are left untouched.
    type Patch: Send;
    type Status: Lifecycle;

    const KIND: EntityKind;

    fn from_draft(id: EntityId, draft: Self::Draft, now: DateTime<Utc>) -> Self;

    fn id(&self) -> &EntityId;

    fn timestamps(&self) -> &Timestamps;

    fn timestamps_mut(&mut self) -> &mut Timestamps;

    fn status(&self) -> Self::Status;

    /// Status requested by a patch, if it carries one.
    fn patch_status(patch: &Self::Patch) -> Option<Self::Status>;

    /// A patch that only changes the status.
    fn status_patch(status: Self::Status) -> Self::Patch;

    /// Merge a patch into the record. Derived fields are recomputed separately.
    fn apply_patch(&mut self, patch: Self::Patch);

    /// Recompute derived fields from their inputs.
    fn recompute(&mut self) {}

    /// Client the record belongs to, if the entity has one.
    fn client_name(&self) -> Option<&str>;

    /// Fields matched by free-text search.
    fn search_fields(&self) -> Vec<&str>;

    /// Short identifying label for notifications, e.g. `FAC-001 (Acme)`.
    fn label(&self) -> String {
        match self.client_name() {
            Some(client) if !client.is_empty() => format!("{} ({})", self.id(), client),
            _ => self.id().to_string(),
        }
    }

    /// Substring match over [`search_fields`](Entity::search_fields),
    /// ignoring case and accents.
    fn matches(&self, query: &str) -> bool {
        let needle = fold_for_search(query.trim());
        if needle.is_empty() {
            return true;
        }
        self.search_fields()
            .iter()
            .any(|field| fold_for_search(field).contains(&needle))
    }

    /// Rewrite a raw snapshot record from an older layout before deserializing.
    fn upgrade_legacy(_raw: &mut Value) {}

    /// Demo records written when the collection has never been persisted.
    fn seed(_now: DateTime<Utc>) -> Vec<Self> {
        Vec::new()
    }
}

/// Lowercase `text` and strip diacritics: `"Société"` becomes `"societe"`.
pub fn fold_for_search(text: &str) -> String {
    text.nfd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Round a monetary amount to cents.
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// `base * (1 + rate / 100)`, rounded to cents.
pub fn with_tax(base: f64, rate_percent: f64) -> f64 {
    round_cents(base * (1.0 + rate_percent / 100.0))
}
