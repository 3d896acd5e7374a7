//! Entity-specific queries and helpers on top of [`EntityStore`].

use chrono::{DateTime, NaiveDate, Utc};

use crm_core::{round_cents, DomainError};
use crm_delivery::{BonLivraison, BonLivraisonPatch, DeliveryProgress};
use crm_invoicing::Invoice;
use crm_planning::{CalendarEvent, Task};
use crm_products::Product;

use crate::entity_store::EntityStore;
use crate::error::OperationResult;

impl EntityStore<Invoice> {
    pub fn by_quote(&self, quote_id: &str) -> Vec<Invoice> {
        self.filter(|invoice| {
            invoice
                .quote_id
                .as_ref()
                .is_some_and(|id| id.as_str() == quote_id)
        })
    }

    /// Open invoices whose due date is before `today`.
    pub fn overdue(&self, today: NaiveDate) -> Vec<Invoice> {
        self.filter(|invoice| invoice.is_overdue(today))
    }

    /// Sum still owed on open invoices.
    pub fn outstanding_total(&self) -> f64 {
        round_cents(
            self.filter(|invoice| invoice.status.is_open())
                .iter()
                .map(|invoice| invoice.remaining_amount)
                .sum(),
        )
    }
}

impl EntityStore<BonLivraison> {
    /// The delivery note of an invoice, if any.
    pub fn for_invoice(&self, invoice_id: &str) -> Option<BonLivraison> {
        self.filter(|bl| {
            bl.invoice_id
                .as_ref()
                .is_some_and(|id| id.as_str() == invoice_id)
        })
        .into_iter()
        .next()
    }

    pub fn progress(&self, id: &str) -> Option<DeliveryProgress> {
        self.get_by_id(id).map(|bl| bl.progress())
    }

    /// Record the delivered quantity of one line of delivery note `id`.
    pub async fn record_delivery(
        &self,
        id: &str,
        item_index: usize,
        quantite_livree: u32,
    ) -> OperationResult<BonLivraison> {
        self.modify(id, |bl| {
            let mut items = bl.items.clone();
            let item = items
                .get_mut(item_index)
                .ok_or_else(|| DomainError::validation(format!("{id} has no line #{item_index}")))?;
            if quantite_livree > item.quantite_commandee {
                return Err(DomainError::validation(format!(
                    "cannot deliver {quantite_livree} of {} ordered for '{}'",
                    item.quantite_commandee, item.designation
                )));
            }
            item.quantite_livree = quantite_livree;
            Ok(BonLivraisonPatch {
                items: Some(items),
                ..BonLivraisonPatch::default()
            })
        })
        .await
    }
}

impl EntityStore<Task> {
    pub fn for_assignee(&self, assignee: &str) -> Vec<Task> {
        self.filter(|task| task.assignee.as_deref() == Some(assignee))
    }

    /// Tasks still open and due on or before `date`.
    pub fn due_before(&self, date: NaiveDate) -> Vec<Task> {
        self.filter(|task| {
            !task.status.is_closed() && task.due_date.is_some_and(|due| due <= date)
        })
    }
}

impl EntityStore<CalendarEvent> {
    /// Events overlapping `[from, to)`, in start order.
    pub fn between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<CalendarEvent> {
        let mut events = self.filter(|event| event.overlaps(from, to));
        events.sort_by_key(|event| event.start);
        events
    }
}

impl EntityStore<Product> {
    pub fn by_sku(&self, sku: &str) -> Option<Product> {
        self.filter(|product| product.sku.eq_ignore_ascii_case(sku))
            .into_iter()
            .next()
    }
}
