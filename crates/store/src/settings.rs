//! Company settings and integration configuration documents.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::clock::Clock;
use crate::database::Database;
use crate::error::OperationResult;
use crate::gateway::{Endpoint, MutationOp};
use crate::local::{keys, LocalStore};
use crate::messages;
use crate::notify::Notifier;

/// Identity of the company printed on quotes and invoices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompanySettings {
    pub name: String,
    pub legal_form: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub siret: Option<String>,
    pub vat_number: Option<String>,
    pub logo_url: Option<String>,
    pub currency: Option<String>,
    pub default_tax_rate: Option<f64>,
    pub invoice_footer: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Configuration of one third-party integration (mail, payments, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IntegrationConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub enabled: bool,
    pub settings: Map<String, Value>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// WhatsApp Business messaging credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WhatsAppConfig {
    pub enabled: bool,
    pub phone_number_id: Option<String>,
    pub business_account_id: Option<String>,
    pub access_token: Option<String>,
    pub default_template: Option<String>,
}

/// Reads and saves settings documents; saves are mirrored like entity
/// mutations.
#[derive(Debug)]
pub struct SettingsStore {
    local: LocalStore,
    database: Arc<Database>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl SettingsStore {
    pub fn new(database: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        Self {
            local: database.local().clone(),
            notifier: database.notifier().clone(),
            database,
            clock,
        }
    }

    pub async fn company(&self) -> CompanySettings {
        self.local
            .read_object(keys::COMPANY_SETTINGS)
            .await
            .unwrap_or_default()
    }

    pub async fn save_company(&self, mut settings: CompanySettings) -> OperationResult<CompanySettings> {
        settings.updated_at = Some(self.clock.now());
        self.save(
            keys::COMPANY_SETTINGS,
            settings,
            Some(Endpoint::CompanySettings),
            "Paramètres de l'entreprise",
        )
        .await
    }

    pub async fn integration(&self, kind: &str) -> Option<IntegrationConfig> {
        self.local.read_object(&keys::integration(kind)).await
    }

    pub async fn save_integration(&self, kind: &str, mut config: IntegrationConfig) -> OperationResult<IntegrationConfig> {
        config.kind = kind.to_string();
        config.updated_at = Some(self.clock.now());
        self.save(
            &keys::integration(kind),
            config,
            Some(Endpoint::IntegrationSettings),
            &format!("Intégration {kind}"),
        )
        .await
    }

    pub async fn whatsapp(&self) -> Option<WhatsAppConfig> {
        self.local.read_object(keys::WHATSAPP_CONFIG).await
    }

    /// WhatsApp credentials stay on this device.
    pub async fn save_whatsapp(&self, config: WhatsAppConfig) -> OperationResult<WhatsAppConfig> {
        self.save(keys::WHATSAPP_CONFIG, config, None, "Configuration WhatsApp")
            .await
    }

    async fn save<T>(&self, key: &str, document: T, endpoint: Option<Endpoint>, what: &str) -> OperationResult<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        let _guard = self.local.lock(key).await;
        if let Err(err) = self.local.write_object(key, &document).await {
            tracing::error!("failed to save '{key}': {err}");
            self.notifier
                .notify(messages::save_failed(&err.to_string()))
                .await;
            return OperationResult::partial(document, err);
        }

        self.notifier.notify(messages::settings_saved(what)).await;

        if let Some(endpoint) = endpoint {
            match serde_json::to_value(&document) {
                Ok(payload) => {
                    let outcome = self
                        .database
                        .mirror_value(endpoint, MutationOp::Update, &payload)
                        .await;
                    tracing::debug!("'{key}' mirrored: {outcome:?}");
                }
                Err(err) => tracing::error!("failed to serialize '{key}' for sync: {err}"),
            }
        }
        OperationResult::ok(document)
    }
}
