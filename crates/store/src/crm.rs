//! Composition root: one facade, one store per entity, cross-entity rules.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Days, Utc};
use serde::Serialize;

use crm_core::{DomainError, EntityId};
use crm_delivery::{BonLivraison, BonLivraisonPatch};
use crm_invoicing::{Invoice, InvoiceDraft, InvoicePatch, InvoiceStatus};
use crm_parties::Contact;
use crm_planning::{CalendarEvent, Task};
use crm_products::Product;
use crm_sales::{Quote, QuoteStatus};

use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::connectivity::{ConnectivityMonitor, ConnectivityState};
use crate::database::Database;
use crate::entity_store::EntityStore;
use crate::error::OperationResult;
use crate::gateway::{ApiGateway, RemoteApi};
use crate::local::{KeyValueStore, LocalStore};
use crate::messages;
use crate::notify::{Notifier, PersistentNotifier, TracingNotifier};
use crate::settings::SettingsStore;
use crate::sqlite::{default_store_path, SqliteKeyValueStore};
use crate::sync_queue::SyncQueue;

/// Days between invoice issue and due date for converted quotes.
pub const PAYMENT_TERM_DAYS: u64 = 30;

/// Collection sizes and sync state after [`Crm::init`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmSummary {
    pub remote_available: bool,
    pub contacts: usize,
    pub products: usize,
    pub quotes: usize,
    pub invoices: usize,
    pub delivery_notes: usize,
    pub tasks: usize,
    pub events: usize,
    pub pending_sync: usize,
    pub failed_sync: usize,
    pub last_sync: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct Crm {
    pub contacts: EntityStore<Contact>,
    pub products: EntityStore<Product>,
    pub quotes: EntityStore<Quote>,
    pub invoices: EntityStore<Invoice>,
    pub delivery_notes: EntityStore<BonLivraison>,
    pub tasks: EntityStore<Task>,
    pub events: EntityStore<CalendarEvent>,
    pub settings: SettingsStore,
    database: Arc<Database>,
    clock: Arc<dyn Clock>,
}

/// Wires a [`Crm`] from its parts; unset parts get in-process defaults.
pub struct CrmBuilder {
    config: StoreConfig,
    local: Option<LocalStore>,
    remote: Option<Arc<dyn RemoteApi>>,
    notifier: Option<Arc<dyn Notifier>>,
    clock: Option<Arc<dyn Clock>>,
    initial_state: ConnectivityState,
}

impl CrmBuilder {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            local: None,
            remote: None,
            notifier: None,
            clock: None,
            initial_state: ConnectivityState::Online,
        }
    }

    pub fn local(mut self, local: LocalStore) -> Self {
        self.local = Some(local);
        self
    }

    pub fn backend(self, backend: Arc<dyn KeyValueStore>) -> Self {
        self.local(LocalStore::new(backend))
    }

    pub fn remote(mut self, remote: Arc<dyn RemoteApi>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Connectivity assumed before the first probe.
    pub fn initial_state(mut self, state: ConnectivityState) -> Self {
        self.initial_state = state;
        self
    }

    pub fn build(self) -> Crm {
        let local = self.local.unwrap_or_else(LocalStore::in_memory);
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let notifier = self
            .notifier
            .unwrap_or_else(|| Arc::new(TracingNotifier) as Arc<dyn Notifier>);
        let queue = SyncQueue::new(local.clone(), clock.clone(), self.config.retry_policy());
        let monitor = Arc::new(ConnectivityMonitor::new(self.initial_state));

        let database = Arc::new(Database::new(
            self.config,
            local,
            self.remote,
            monitor,
            queue,
            notifier,
        ));
        Crm::with_database(database, clock)
    }
}

impl Crm {
    pub fn builder(config: StoreConfig) -> CrmBuilder {
        CrmBuilder::new(config)
    }

    fn with_database(database: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        Self {
            contacts: EntityStore::new(database.clone(), clock.clone()),
            products: EntityStore::new(database.clone(), clock.clone()),
            quotes: EntityStore::new(database.clone(), clock.clone()),
            invoices: EntityStore::new(database.clone(), clock.clone()),
            delivery_notes: EntityStore::new(database.clone(), clock.clone()),
            tasks: EntityStore::new(database.clone(), clock.clone()),
            events: EntityStore::new(database.clone(), clock.clone()),
            settings: SettingsStore::new(database.clone(), clock.clone()),
            database,
            clock,
        }
    }

    /// Production wiring: SQLite store, HTTP gateway, logged and persisted
    /// notifications.
    pub fn connect(config: StoreConfig) -> anyhow::Result<Self> {
        let path = default_store_path(config.data_dir.as_deref())
            .context("failed to resolve local store path")?;
        tracing::info!("local store at {}", path.display());

        let local = LocalStore::new(Arc::new(SqliteKeyValueStore::open(path)));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let notifier = Arc::new(PersistentNotifier::new(
            Arc::new(TracingNotifier),
            local.clone(),
            clock.clone(),
        ));

        let mut builder = CrmBuilder::new(config.clone())
            .local(local)
            .clock(clock)
            .notifier(notifier);
        if config.remote_enabled {
            let gateway = ApiGateway::from_config(&config).context("failed to build API client")?;
            builder = builder.remote(Arc::new(gateway));
        }
        Ok(builder.build())
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    /// Probe the remote API, then load every collection.
    pub async fn init(&self) -> CrmSummary {
        self.database.init().await;
        self.contacts.load().await;
        self.products.load().await;
        self.quotes.load().await;
        self.invoices.load().await;
        self.delivery_notes.load().await;
        self.tasks.load().await;
        self.events.load().await;
        self.summary().await
    }

    pub async fn summary(&self) -> CrmSummary {
        let queue = self.database.queue();
        CrmSummary {
            remote_available: self.database.is_remote_available(),
            contacts: self.contacts.count(),
            products: self.products.count(),
            quotes: self.quotes.count(),
            invoices: self.invoices.count(),
            delivery_notes: self.delivery_notes.count(),
            tasks: self.tasks.count(),
            events: self.events.count(),
            pending_sync: queue.pending_count().await,
            failed_sync: queue.list_failed().await.len(),
            last_sync: queue.last_sync().await,
        }
    }

    pub fn dispose(&self) {
        self.database.dispose();
    }

    /// The delivery note of an invoice, resolved by reference.
    pub fn delivery_note_for_invoice(&self, invoice_id: &str) -> Option<BonLivraison> {
        let invoice = self.invoices.get_by_id(invoice_id)?;
        invoice
            .bon_livraison_id
            .and_then(|bl_id| self.delivery_notes.get_by_id(bl_id.as_str()))
            .or_else(|| self.delivery_notes.for_invoice(invoice_id))
    }

    /// Link a delivery note and an invoice on both sides.
    ///
    /// An invoice has at most one delivery note and a delivery note belongs
    /// to at most one invoice. Both collections stay locked, invoices first,
    /// from the checks to the last write; if the second write fails the
    /// first is undone.
    pub async fn attach_delivery_note(&self, invoice_id: &str, bl_id: &str) -> OperationResult<(Invoice, BonLivraison)> {
        let _invoices = self.invoices.lock().await;
        let _notes = self.delivery_notes.lock().await;

        let Some(invoice) = self.invoices.get_by_id(invoice_id) else {
            return self.invoices.not_found(invoice_id).await.failure();
        };
        let Some(bl) = self.delivery_notes.get_by_id(bl_id) else {
            return self.delivery_notes.not_found(bl_id).await.failure();
        };

        let conflict = if invoice
            .bon_livraison_id
            .as_ref()
            .is_some_and(|current| current.as_str() != bl_id)
        {
            Some(format!("La facture {invoice_id} a déjà un bon de livraison."))
        } else if self
            .delivery_notes
            .for_invoice(invoice_id)
            .is_some_and(|other| other.id.as_str() != bl_id)
        {
            Some(format!("Un autre bon de livraison est déjà lié à la facture {invoice_id}."))
        } else if bl
            .invoice_id
            .as_ref()
            .is_some_and(|current| current.as_str() != invoice_id)
        {
            Some(format!("Le bon de livraison {bl_id} est déjà lié à une autre facture."))
        } else {
            None
        };
        if let Some(detail) = conflict {
            return self.refuse(DomainError::conflict(detail)).await;
        }

        let linked_bl = self
            .delivery_notes
            .update_locked(
                bl_id,
                BonLivraisonPatch {
                    invoice_id: Some(EntityId::new(invoice_id)),
                    ..BonLivraisonPatch::default()
                },
            )
            .await;
        let linked_bl = match linked_bl {
            OperationResult { success: true, data: Some(linked), .. } => linked,
            other => {
                self.delivery_notes.replace_cached(bl);
                return other.failure();
            }
        };

        let linked_invoice = self
            .invoices
            .update_locked(
                invoice_id,
                InvoicePatch {
                    bon_livraison_id: Some(EntityId::new(bl_id)),
                    ..InvoicePatch::default()
                },
            )
            .await;
        match linked_invoice {
            OperationResult { success: true, data: Some(linked), .. } => OperationResult::ok((linked, linked_bl)),
            other => {
                tracing::warn!("linking {invoice_id} to {bl_id} failed, unlinking {bl_id}");
                self.invoices.replace_cached(invoice);
                self.delivery_notes.restore_locked(bl).await;
                other.failure()
            }
        }
    }

    /// Turn an accepted quote into a draft invoice for its TTC total.
    pub async fn convert_quote_to_invoice(&self, quote_id: &str) -> OperationResult<Invoice> {
        let Some(quote) = self.quotes.get_by_id(quote_id) else {
            return self.quotes.not_found(quote_id).await.failure();
        };

        if quote.status != QuoteStatus::Accepted {
            return self
                .refuse(DomainError::validation(format!(
                    "Le devis {quote_id} doit être accepté avant facturation."
                )))
                .await;
        }
        // Held from the duplicate check through the create.
        let _invoices = self.invoices.lock().await;
        if let Some(existing) = self.invoices.by_quote(quote_id).first() {
            return self
                .refuse(DomainError::conflict(format!(
                    "Le devis {quote_id} a déjà été facturé ({}).",
                    existing.id
                )))
                .await;
        }

        let today = self.clock.now().date_naive();
        let draft = InvoiceDraft {
            client: quote.client.clone(),
            client_email: quote.client_email.clone(),
            issue_date: today,
            due_date: today
                .checked_add_days(Days::new(PAYMENT_TERM_DAYS))
                .unwrap_or(today),
            amount: quote.total_ttc,
            advance_amount: 0.0,
            status: InvoiceStatus::Draft,
            payment_method: None,
            quote_id: Some(quote.id.clone()),
            bon_livraison_id: None,
            notes: quote.description.clone(),
        };
        self.invoices.create_locked(draft).await
    }

    async fn refuse<T>(&self, err: DomainError) -> OperationResult<T> {
        tracing::warn!("operation refused: {err}");
        let detail = match &err {
            DomainError::Validation(detail) | DomainError::Conflict(detail) => detail.clone(),
            other => other.to_string(),
        };
        self.database
            .notifier()
            .notify(messages::operation_refused(&detail))
            .await;
        OperationResult::err(err)
    }
}
