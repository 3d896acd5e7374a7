use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crm_store::{Crm, StoreConfig, SyncWorker};

const WORKER_TICK: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    crm_observability::init();

    let config = StoreConfig::from_env();
    if !config.remote_enabled {
        tracing::warn!("CRM_REMOTE_DISABLED set; changes stay on this device");
    }

    let crm = Crm::connect(config).context("failed to open CRM store")?;
    let summary = crm.init().await;
    tracing::info!(
        remote_available = summary.remote_available,
        contacts = summary.contacts,
        products = summary.products,
        quotes = summary.quotes,
        invoices = summary.invoices,
        delivery_notes = summary.delivery_notes,
        tasks = summary.tasks,
        events = summary.events,
        pending_sync = summary.pending_sync,
        failed_sync = summary.failed_sync,
        "CRM store ready"
    );

    let worker = SyncWorker::new(Arc::clone(crm.database()), WORKER_TICK).start();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("shutting down");

    worker.shutdown().await;
    crm.dispose();

    let summary = crm.summary().await;
    if summary.pending_sync > 0 {
        tracing::warn!("{} change(s) not yet synced, they will be sent on next start", summary.pending_sync);
    }
    Ok(())
}
