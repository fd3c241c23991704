//! Polls the request form and shares the requested folders.

use std::sync::Arc;

use anyhow::Context;
use share_dispatch::msgraph::MsGraphClient;
use share_dispatch::processor::RequestProcessor;
use share_dispatch::run_loop::run_forever;
use share_dispatch::storage::StorageClient;
use shared::config::Settings;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    if let Err(err) = run().await {
        error!(error = ?err, "share-dispatch stopped");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let settings = Settings::new().context("configuration error")?;

    let graph = Arc::new(MsGraphClient::new(&settings).context("building graph client")?);
    graph.authenticate().await.context("graph authentication")?;
    info!("authenticated against graph");

    let form_folder = graph
        .resolve_item(&settings.request_form_url)
        .await
        .context("resolving request form folder")?;
    graph
        .find_child(&form_folder, &settings.request_form_name)
        .await
        .with_context(|| format!("locating workbook '{}'", settings.request_form_name))?;

    let storage: Arc<dyn StorageClient> = graph;
    let processor = RequestProcessor::new(storage.clone(), &settings);
    info!(
        frequency = settings.frequency,
        sheet = %settings.request_form_sheet,
        "starting share loop"
    );
    run_forever(storage, processor, &settings).await;
    Ok(())
}
