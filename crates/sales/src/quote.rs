use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crm_core::{Entity, EntityId, EntityKind, Lifecycle, Timestamps, with_tax};

/// Quote status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuoteStatus {
    #[serde(rename = "brouillon")]
    Draft,
    #[serde(rename = "envoye")]
    Sent,
    #[serde(rename = "accepte")]
    Accepted,
    #[serde(rename = "refuse")]
    Refused,
    #[serde(rename = "expire")]
    Expired,
}

impl Lifecycle for QuoteStatus {
    fn can_transition_to(self, next: Self) -> bool {
        use QuoteStatus::*;
        matches!(
            (self, next),
            (Draft, Sent) | (Sent, Accepted | Refused | Expired) | (Expired, Sent)
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            QuoteStatus::Draft => "brouillon",
            QuoteStatus::Sent => "envoye",
            QuoteStatus::Accepted => "accepte",
            QuoteStatus::Refused => "refuse",
            QuoteStatus::Expired => "expire",
        }
    }

    fn label(self) -> &'static str {
        match self {
            QuoteStatus::Draft => "Brouillon",
            QuoteStatus::Sent => "Envoyé",
            QuoteStatus::Accepted => "Accepté",
            QuoteStatus::Refused => "Refusé",
            QuoteStatus::Expired => "Expiré",
        }
    }
}

/// Priced proposal sent to a client. `total_ttc` is derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub id: EntityId,
    pub client: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_email: Option<String>,
    pub issue_date: NaiveDate,
    pub valid_until: NaiveDate,
    pub amount_ht: f64,
    pub tax_rate: f64,
    #[serde(default)]
    pub total_ttc: f64,
    pub status: QuoteStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl Quote {
    /// Sent but not answered before `valid_until`.
    pub fn is_stale(&self, today: NaiveDate) -> bool {
        self.status == QuoteStatus::Sent && self.valid_until < today
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteDraft {
    pub client: String,
    #[serde(default)]
    pub client_email: Option<String>,
    pub issue_date: NaiveDate,
    pub valid_until: NaiveDate,
    pub amount_ht: f64,
    pub tax_rate: f64,
    pub status: QuoteStatus,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuotePatch {
    pub client: Option<String>,
    pub client_email: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
    pub amount_ht: Option<f64>,
    pub tax_rate: Option<f64>,
    pub status: Option<QuoteStatus>,
    pub description: Option<String>,
}

impl Entity for Quote {
    type Draft = QuoteDraft;
    type Patch = QuotePatch;
    type Status = QuoteStatus;

    const KIND: EntityKind = EntityKind::Quote;

    fn from_draft(id: EntityId, draft: QuoteDraft, now: DateTime<Utc>) -> Self {
        let mut quote = Quote {
            id,
            client: draft.client,
            client_email: draft.client_email,
            issue_date: draft.issue_date,
            valid_until: draft.valid_until,
            amount_ht: draft.amount_ht,
            tax_rate: draft.tax_rate,
            total_ttc: 0.0,
            status: draft.status,
            description: draft.description,
            timestamps: Timestamps::new(now),
        };
        quote.recompute();
        quote
    }

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn timestamps(&self) -> &Timestamps {
        &self.timestamps
    }

    fn timestamps_mut(&mut self) -> &mut Timestamps {
        &mut self.timestamps
    }

    fn status(&self) -> QuoteStatus {
        self.status
    }

    fn patch_status(patch: &QuotePatch) -> Option<QuoteStatus> {
        patch.status
    }

    fn status_patch(status: QuoteStatus) -> QuotePatch {
        QuotePatch {
            status: Some(status),
            ..QuotePatch::default()
        }
    }

    fn apply_patch(&mut self, patch: QuotePatch) {
        if let Some(client) = patch.client {
            self.client = client;
        }
        if let Some(email) = patch.client_email {
            self.client_email = Some(email);
        }
        if let Some(date) = patch.issue_date {
            self.issue_date = date;
        }
        if let Some(date) = patch.valid_until {
            self.valid_until = date;
        }
        if let Some(amount) = patch.amount_ht {
            self.amount_ht = amount;
        }
        if let Some(rate) = patch.tax_rate {
            self.tax_rate = rate;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(description) = patch.description {
            self.description = Some(description);
        }
    }

    fn recompute(&mut self) {
        self.total_ttc = with_tax(self.amount_ht, self.tax_rate);
    }

    fn client_name(&self) -> Option<&str> {
        Some(&self.client)
    }

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.id.as_str(), self.client.as_str()];
        fields.extend(self.description.as_deref());
        fields
    }

    fn seed(now: DateTime<Utc>) -> Vec<Self> {
        let today = now.date_naive();
        vec![Quote::from_draft(
            EntityId::format("DEV", 1),
            QuoteDraft {
                client: "Société ABC".to_string(),
                client_email: Some("contact@societe-abc.fr".to_string()),
                issue_date: today.checked_sub_days(Days::new(40)).unwrap_or(today),
                valid_until: today.checked_sub_days(Days::new(10)).unwrap_or(today),
                amount_ht: 1000.0,
                tax_rate: 20.0,
                status: QuoteStatus::Accepted,
                description: Some("Audit du parc informatique".to_string()),
            },
            now,
        )]
    }
}
