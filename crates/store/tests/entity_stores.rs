mod common;

use std::sync::Arc;

use chrono::Duration;

use crm_delivery::{BonLivraisonDraft, DeliveryItem, DeliveryProgress, DeliveryStatus};
use crm_invoicing::{InvoicePatch, InvoiceStatus};
use crm_parties::{ContactDraft, ContactInfo, ContactStatus};
use crm_sales::{QuoteDraft, QuoteStatus};
use crm_store::{
    CompanySettings, MemoryKeyValueStore, NotificationLevel, StoreConfig, WhatsAppConfig,
};

use common::{crm_over, date, invoice_draft, task_draft, ticking_clock, Harness, ScriptedBackend};

fn delivery_draft(client: &str, items: Vec<DeliveryItem>) -> BonLivraisonDraft {
    BonLivraisonDraft {
        invoice_id: None,
        client: client.to_string(),
        adresse_livraison: "3 place du Marché, 69002 Lyon".to_string(),
        date_livraison: date(2024, 3, 5),
        transporteur: None,
        numero_suivi: None,
        items,
        status: DeliveryStatus::Preparing,
        notes: None,
    }
}

fn quote_draft(client: &str, status: QuoteStatus) -> QuoteDraft {
    QuoteDraft {
        client: client.to_string(),
        client_email: Some("achats@acme.fr".to_string()),
        issue_date: date(2024, 3, 1),
        valid_until: date(2024, 3, 31),
        amount_ht: 1000.0,
        tax_rate: 20.0,
        status,
        description: Some("Maintenance annuelle".to_string()),
    }
}

#[tokio::test]
async fn invoice_remaining_amount_follows_advance() {
    let h = Harness::local_only();
    h.crm.init().await;

    let created = h
        .crm
        .invoices
        .create(invoice_draft("Acme", 1000.0, 300.0))
        .await;
    assert!(created.success, "{:?}", created.error);
    let invoice = created.data.unwrap();
    assert_eq!(invoice.id.as_str(), "FAC-001");
    assert_eq!(invoice.remaining_amount, 700.0);
    assert_eq!(invoice.timestamps.created_at, invoice.timestamps.updated_at);

    let updated = h
        .crm
        .invoices
        .update(
            "FAC-001",
            InvoicePatch {
                advance_amount: Some(1000.0),
                ..InvoicePatch::default()
            },
        )
        .await
        .into_data()
        .unwrap();
    assert_eq!(updated.remaining_amount, 0.0);
    assert!(updated.is_fully_paid());
    assert!(updated.timestamps.updated_at > updated.timestamps.created_at);
    assert_eq!(updated.timestamps.created_at, invoice.timestamps.created_at);

    let notes = h.notifier.snapshot();
    assert_eq!(notes.len(), 2);
    assert_eq!(notes[0].title, "Facture créée");
    assert_eq!(notes[0].description, "Facture FAC-001 (Acme) a été créée avec succès.");
    assert_eq!(notes[0].level, NotificationLevel::Success);
    assert_eq!(notes[1].title, "Facture mise à jour");
}

#[tokio::test]
async fn newest_records_come_first() {
    let h = Harness::local_only();
    h.crm.init().await;

    for title in ["Appeler Acme", "Relancer Globex", "Préparer la démo"] {
        h.crm.tasks.create(task_draft(title)).await;
    }

    let ids: Vec<String> = h.crm.tasks.list().iter().map(|t| t.id.to_string()).collect();
    assert_eq!(ids, ["TSK-003", "TSK-002", "TSK-001"]);
}

#[tokio::test]
async fn ids_are_never_reused_after_delete_or_restart() {
    let h = Harness::local_only();
    h.crm.init().await;

    for title in ["a", "b", "c"] {
        h.crm.tasks.create(task_draft(title)).await;
    }
    assert!(h.crm.tasks.delete("TSK-003").await.success);

    let next = h.crm.tasks.create(task_draft("d")).await.into_data().unwrap();
    assert_eq!(next.id.as_str(), "TSK-004");
    assert!(h.crm.tasks.delete("TSK-004").await.success);

    let restarted = h.restart();
    restarted.crm.init().await;
    let after_restart = restarted
        .crm
        .tasks
        .create(task_draft("e"))
        .await
        .into_data()
        .unwrap();
    assert_eq!(after_restart.id.as_str(), "TSK-005");
}

#[tokio::test]
async fn delivery_progress_tracks_recorded_quantities() {
    let h = Harness::local_only();
    h.crm.init().await;

    let bl = h
        .crm
        .delivery_notes
        .create(delivery_draft(
            "Acme",
            vec![DeliveryItem::new("Écran 27 pouces", 5), DeliveryItem::new("Câble HDMI", 2)],
        ))
        .await
        .into_data()
        .unwrap();
    assert_eq!(bl.id.as_str(), "BL-001");
    assert_eq!(bl.progress(), DeliveryProgress::NotDelivered);

    let partial = h.crm.delivery_notes.record_delivery("BL-001", 0, 3).await;
    assert!(partial.success);
    let partial = partial.data.unwrap();
    assert_eq!(partial.items[0].quantite_restante, 2);
    assert_eq!(partial.progress(), DeliveryProgress::Partial);

    h.crm.delivery_notes.record_delivery("BL-001", 0, 5).await;
    h.crm.delivery_notes.record_delivery("BL-001", 1, 2).await;
    let progress = h.crm.delivery_notes.progress("BL-001").unwrap();
    assert_eq!(progress, DeliveryProgress::Complete);
    assert_eq!(progress.label(), "Complet");
    assert_eq!(h.crm.delivery_notes.get_by_id("BL-001").unwrap().total_remaining(), 0);
}

#[tokio::test]
async fn over_delivery_is_refused() {
    let h = Harness::local_only();
    h.crm.init().await;
    h.crm
        .delivery_notes
        .create(delivery_draft("Acme", vec![DeliveryItem::new("Écran", 5)]))
        .await;
    let before = h.notifier.count();

    let refused = h.crm.delivery_notes.record_delivery("BL-001", 0, 6).await;
    assert!(!refused.success);
    assert!(refused.data.is_none());

    let out_of_range = h.crm.delivery_notes.record_delivery("BL-001", 4, 1).await;
    assert!(!out_of_range.success);

    assert_eq!(h.notifier.count(), before + 2);
    assert_eq!(h.notifier.last().unwrap().title, "Opération impossible");
    assert_eq!(
        h.crm.delivery_notes.get_by_id("BL-001").unwrap().items[0].quantite_livree,
        0
    );
}

#[tokio::test]
async fn concurrent_changes_to_one_note_are_all_kept() {
    let backend = ScriptedBackend::new();
    let (crm, _) = crm_over(backend.clone());
    crm.init().await;
    crm.delivery_notes
        .create(delivery_draft(
            "Acme",
            vec![DeliveryItem::new("Écran", 5), DeliveryItem::new("Câble HDMI", 5)],
        ))
        .await;

    let (shipped, first, second) = tokio::join!(
        crm.delivery_notes.update_status("BL-001", DeliveryStatus::Shipped),
        crm.delivery_notes.record_delivery("BL-001", 0, 5),
        crm.delivery_notes.record_delivery("BL-001", 1, 5),
    );
    assert!(shipped.success && first.success && second.success);

    let delivered = |bl: &crm_delivery::BonLivraison| -> Vec<u32> {
        bl.items.iter().map(|item| item.quantite_livree).collect()
    };
    let bl = crm.delivery_notes.get_by_id("BL-001").unwrap();
    assert_eq!(delivered(&bl), [5, 5]);
    assert_eq!(bl.status, DeliveryStatus::Shipped);

    let (reopened, _) = crm_over(backend);
    reopened.init().await;
    assert_eq!(reopened.delivery_notes.get_by_id("BL-001"), Some(bl));
}

#[tokio::test]
async fn racing_quote_conversions_bill_once() {
    let (crm, _) = crm_over(ScriptedBackend::new());
    crm.init().await;
    crm.quotes.create(quote_draft("Acme", QuoteStatus::Draft)).await;
    crm.quotes.update_status("DEV-001", QuoteStatus::Sent).await;
    crm.quotes.update_status("DEV-001", QuoteStatus::Accepted).await;

    let (a, b) = tokio::join!(
        crm.convert_quote_to_invoice("DEV-001"),
        crm.convert_quote_to_invoice("DEV-001"),
    );
    assert_eq!([a.success, b.success].iter().filter(|ok| **ok).count(), 1);
    assert_eq!(crm.invoices.by_quote("DEV-001").len(), 1);
}

#[tokio::test]
async fn racing_attaches_link_one_invoice_only() {
    let (crm, _) = crm_over(ScriptedBackend::new());
    crm.init().await;
    crm.invoices.create(invoice_draft("Acme", 100.0, 0.0)).await;
    crm.invoices.create(invoice_draft("Globex", 200.0, 0.0)).await;
    crm.delivery_notes
        .create(delivery_draft("Acme", vec![DeliveryItem::new("Écran", 1)]))
        .await;

    let (first, second) = tokio::join!(
        crm.attach_delivery_note("FAC-001", "BL-001"),
        crm.attach_delivery_note("FAC-002", "BL-001"),
    );
    assert_ne!(first.success, second.success);

    let winner = if first.success { "FAC-001" } else { "FAC-002" };
    let loser = if first.success { "FAC-002" } else { "FAC-001" };
    let bl = crm.delivery_notes.get_by_id("BL-001").unwrap();
    assert_eq!(bl.invoice_id.unwrap().as_str(), winner);
    assert_eq!(
        crm.invoices.get_by_id(winner).unwrap().bon_livraison_id.unwrap().as_str(),
        "BL-001"
    );
    assert!(crm.invoices.get_by_id(loser).unwrap().bon_livraison_id.is_none());
}

#[tokio::test]
async fn failed_invoice_write_unlinks_the_delivery_note() {
    let backend = ScriptedBackend::new();
    let (crm, notifier) = crm_over(backend.clone());
    crm.init().await;
    crm.invoices.create(invoice_draft("Acme", 100.0, 0.0)).await;
    crm.delivery_notes
        .create(delivery_draft("Acme", vec![DeliveryItem::new("Écran", 1)]))
        .await;

    backend.reject_writes_to("crm_invoices");
    let attached = crm.attach_delivery_note("FAC-001", "BL-001").await;
    assert!(!attached.success);
    assert!(attached.error.unwrap().contains("quota"));
    assert!(notifier.snapshot().iter().any(|n| n.title == "Erreur de sauvegarde"));

    assert!(crm.delivery_notes.get_by_id("BL-001").unwrap().invoice_id.is_none());
    assert!(crm.invoices.get_by_id("FAC-001").unwrap().bon_livraison_id.is_none());
    assert!(!backend.raw("crm_bon_livraisons").unwrap_or_default().contains("FAC-001"));

    let (reopened, _) = crm_over(backend);
    reopened.init().await;
    assert!(reopened.delivery_notes.get_by_id("BL-001").unwrap().invoice_id.is_none());
    assert!(reopened.delivery_note_for_invoice("FAC-001").is_none());
}

#[tokio::test]
async fn search_ignores_case_and_accents() {
    let h = Harness::build(
        StoreConfig::local_only().with_seed_demo(true),
        None,
        ticking_clock(),
        Arc::new(MemoryKeyValueStore::new()),
    );
    h.crm.init().await;

    let all: Vec<String> = h.crm.invoices.search("").iter().map(|i| i.id.to_string()).collect();
    assert_eq!(all, ["FAC-002", "FAC-001"]);

    for query in ["société", "SOCIÉTÉ", "  Société ABC ", "societe", "SOCIETE abc"] {
        let found: Vec<String> = h
            .crm
            .invoices
            .search(query)
            .iter()
            .map(|i| i.id.to_string())
            .collect();
        assert_eq!(found, ["FAC-001"], "query {query:?}");
    }
    assert_eq!(h.crm.invoices.by_client("tech").len(), 1);
    assert_eq!(h.crm.invoices.by_client("societe").len(), 1);
    assert!(h.crm.invoices.search("introuvable").is_empty());
}

#[tokio::test]
async fn seeding_happens_once_and_only_when_enabled() {
    let plain = Harness::local_only();
    let summary = plain.crm.init().await;
    assert_eq!(summary.invoices, 0);
    assert_eq!(plain.backend.raw("crm_invoices").as_deref(), Some("[]"));

    let backend = Arc::new(MemoryKeyValueStore::new());
    let config = StoreConfig::local_only().with_seed_demo(true);
    let demo = Harness::build(config, None, ticking_clock(), backend);
    assert_eq!(demo.crm.init().await.invoices, 2);
    demo.crm.invoices.delete("FAC-002").await;
    demo.crm.invoices.delete("FAC-001").await;

    // An emptied collection stays empty.
    let restarted = demo.restart();
    assert_eq!(restarted.crm.init().await.invoices, 0);
}

#[tokio::test]
async fn failed_save_keeps_the_in_memory_change() {
    let h = Harness::local_only();
    h.crm.init().await;
    h.backend.set_quota(Some(h.backend.used_bytes()));

    let result = h.crm.invoices.create(invoice_draft("Acme", 100.0, 0.0)).await;
    assert!(!result.success);
    assert_eq!(result.data.as_ref().unwrap().id.as_str(), "FAC-001");
    assert!(result.error.as_deref().unwrap().contains("quota"));

    assert_eq!(h.crm.invoices.count(), 1);
    assert_eq!(h.backend.raw("crm_invoices").as_deref(), Some("[]"));

    assert_eq!(h.titles(), ["Erreur de sauvegarde"]);
    assert_eq!(h.notifier.last().unwrap().level, NotificationLevel::Error);
}

#[tokio::test]
async fn invalid_status_transition_is_rejected() {
    let h = Harness::local_only();
    h.crm.init().await;
    h.crm.invoices.create(invoice_draft("Acme", 100.0, 0.0)).await;
    let stored = h.backend.raw("crm_invoices");

    let rejected = h.crm.invoices.update_status("FAC-001", InvoiceStatus::Paid).await;
    assert!(!rejected.success);
    assert!(rejected.error.unwrap().contains("Brouillon"));
    assert_eq!(h.crm.invoices.get_by_id("FAC-001").unwrap().status, InvoiceStatus::Draft);
    assert_eq!(h.backend.raw("crm_invoices"), stored);
    assert_eq!(h.notifier.last().unwrap().title, "Changement de statut refusé");

    let accepted = h.crm.invoices.update_status("FAC-001", InvoiceStatus::Pending).await;
    assert!(accepted.success);
    let note = h.notifier.last().unwrap();
    assert_eq!(note.title, "Statut mis à jour");
    assert_eq!(note.description, "Facture FAC-001 (Acme) est maintenant « En attente ».");
    assert_eq!(h.crm.invoices.by_status(InvoiceStatus::Pending).len(), 1);
}

#[tokio::test]
async fn unknown_ids_are_reported_and_nothing_is_written() {
    let h = Harness::local_only();
    h.crm.init().await;
    let stored = h.backend.raw("crm_tasks");

    let update = h.crm.tasks.update("TSK-404", Default::default()).await;
    assert!(!update.success);
    let delete = h.crm.tasks.delete("TSK-404").await;
    assert!(!delete.success);

    assert_eq!(h.titles(), ["Élément introuvable", "Élément introuvable"]);
    assert_eq!(h.notifier.last().unwrap().description, "Tâche TSK-404 n'existe pas.");
    assert_eq!(h.backend.raw("crm_tasks"), stored);
}

#[tokio::test]
async fn delete_notifies_with_the_record_label() {
    let h = Harness::local_only();
    h.crm.init().await;
    h.crm.invoices.create(invoice_draft("Acme", 100.0, 0.0)).await;

    let removed = h.crm.invoices.delete("FAC-001").await;
    assert_eq!(removed.data.unwrap().id.as_str(), "FAC-001");
    assert!(h.crm.invoices.get_by_id("FAC-001").is_none());

    let note = h.notifier.last().unwrap();
    assert_eq!(note.title, "Facture supprimée");
    assert_eq!(note.description, "Facture FAC-001 (Acme) a été supprimée.");
}

#[tokio::test]
async fn legacy_embedded_delivery_note_becomes_a_reference() {
    let h = Harness::local_only();
    h.backend.insert_raw(
        "crm_invoices",
        r#"[{
            "id": "FAC-007",
            "client": "Acme",
            "issueDate": "2024-01-10",
            "dueDate": "2024-02-10",
            "amount": 500.0,
            "advanceAmount": 100.0,
            "remainingAmount": 999.0,
            "status": "En attente",
            "bonLivraison": { "id": "BL-003", "client": "Acme", "items": [] },
            "createdAt": "2024-01-10T08:00:00Z",
            "updatedAt": "2024-01-10T08:00:00Z"
        }, "not an invoice"]"#,
    );
    h.crm.init().await;

    let invoice = h.crm.invoices.get_by_id("FAC-007").unwrap();
    assert_eq!(invoice.bon_livraison_id.as_ref().unwrap().as_str(), "BL-003");
    assert_eq!(invoice.remaining_amount, 400.0);
    assert_eq!(h.crm.invoices.count(), 1);

    let next = h.crm.invoices.create(invoice_draft("Globex", 10.0, 0.0)).await.into_data().unwrap();
    assert_eq!(next.id.as_str(), "FAC-008");
    let raw = h.backend.raw("crm_invoices").unwrap();
    assert!(!raw.contains("\"bonLivraison\""));
    assert!(raw.contains("\"bonLivraisonId\":\"BL-003\""));
}

#[tokio::test]
async fn records_survive_a_restart() {
    let h = Harness::local_only();
    h.crm.init().await;
    let contact = h
        .crm
        .contacts
        .create(ContactDraft {
            name: "Claire Martin".to_string(),
            company: Some("Société ABC".to_string()),
            info: ContactInfo {
                email: Some("claire@societe-abc.fr".to_string()),
                ..ContactInfo::default()
            },
            status: ContactStatus::Prospect,
            tags: vec!["salon-2024".to_string()],
            notes: None,
        })
        .await
        .into_data()
        .unwrap();

    let restarted = h.restart();
    let summary = restarted.crm.init().await;
    assert_eq!(summary.contacts, 1);
    assert_eq!(restarted.crm.contacts.get_by_id(contact.id.as_str()), Some(contact));
}

#[tokio::test]
async fn accepted_quote_converts_to_a_draft_invoice_once() {
    let h = Harness::local_only();
    h.crm.init().await;
    h.crm.quotes.create(quote_draft("Acme", QuoteStatus::Draft)).await;

    let too_early = h.crm.convert_quote_to_invoice("DEV-001").await;
    assert!(!too_early.success);
    assert_eq!(h.notifier.last().unwrap().title, "Opération impossible");

    h.crm.quotes.update_status("DEV-001", QuoteStatus::Sent).await;
    h.crm.quotes.update_status("DEV-001", QuoteStatus::Accepted).await;

    let invoice = h
        .crm
        .convert_quote_to_invoice("DEV-001")
        .await
        .into_data()
        .unwrap();
    assert_eq!(invoice.id.as_str(), "FAC-001");
    assert_eq!(invoice.status, InvoiceStatus::Draft);
    assert_eq!(invoice.amount, 1200.0);
    assert_eq!(invoice.remaining_amount, 1200.0);
    assert_eq!(invoice.quote_id.as_ref().unwrap().as_str(), "DEV-001");
    assert_eq!(invoice.due_date - invoice.issue_date, Duration::days(30));
    assert_eq!(invoice.notes.as_deref(), Some("Maintenance annuelle"));

    let twice = h.crm.convert_quote_to_invoice("DEV-001").await;
    assert!(!twice.success);
    assert!(twice.error.unwrap().contains("FAC-001"));
    assert_eq!(h.crm.invoices.count(), 1);

    let missing = h.crm.convert_quote_to_invoice("DEV-404").await;
    assert!(!missing.success);
    assert_eq!(h.notifier.last().unwrap().title, "Élément introuvable");
}

#[tokio::test]
async fn delivery_note_links_to_one_invoice_only() {
    let h = Harness::local_only();
    h.crm.init().await;
    h.crm.invoices.create(invoice_draft("Acme", 100.0, 0.0)).await;
    h.crm.invoices.create(invoice_draft("Globex", 200.0, 0.0)).await;
    h.crm
        .delivery_notes
        .create(delivery_draft("Acme", vec![DeliveryItem::new("Écran", 1)]))
        .await;
    h.crm
        .delivery_notes
        .create(delivery_draft("Acme", vec![DeliveryItem::new("Clavier", 1)]))
        .await;

    let (invoice, bl) = h
        .crm
        .attach_delivery_note("FAC-001", "BL-001")
        .await
        .into_data()
        .unwrap();
    assert_eq!(invoice.bon_livraison_id.unwrap().as_str(), "BL-001");
    assert_eq!(bl.invoice_id.unwrap().as_str(), "FAC-001");
    assert_eq!(h.crm.delivery_note_for_invoice("FAC-001").unwrap().id.as_str(), "BL-001");

    // Re-attaching the same pair is a no-op success.
    assert!(h.crm.attach_delivery_note("FAC-001", "BL-001").await.success);

    let second_note = h.crm.attach_delivery_note("FAC-001", "BL-002").await;
    assert!(!second_note.success);
    let other_invoice = h.crm.attach_delivery_note("FAC-002", "BL-001").await;
    assert!(!other_invoice.success);
    assert_eq!(h.notifier.last().unwrap().title, "Opération impossible");

    assert!(h.crm.delivery_notes.get_by_id("BL-002").unwrap().invoice_id.is_none());
    assert!(h.crm.delivery_note_for_invoice("FAC-002").is_none());
}

#[tokio::test]
async fn settings_documents_round_trip() {
    let h = Harness::local_only();
    h.crm.init().await;
    assert_eq!(h.crm.settings.company().await, CompanySettings::default());

    let saved = h
        .crm
        .settings
        .save_company(CompanySettings {
            name: "Atelier Dupont".to_string(),
            siret: Some("123 456 789 00012".to_string()),
            default_tax_rate: Some(20.0),
            ..CompanySettings::default()
        })
        .await
        .into_data()
        .unwrap();
    assert!(saved.updated_at.is_some());
    assert_eq!(h.crm.settings.company().await, saved);

    let whatsapp = WhatsAppConfig {
        enabled: true,
        phone_number_id: Some("10987".to_string()),
        ..WhatsAppConfig::default()
    };
    h.crm.settings.save_whatsapp(whatsapp.clone()).await;
    assert_eq!(h.crm.settings.whatsapp().await, Some(whatsapp));

    assert_eq!(h.titles(), ["Paramètres enregistrés", "Paramètres enregistrés"]);
    assert!(h.crm.settings.integration("stripe").await.is_none());
}
