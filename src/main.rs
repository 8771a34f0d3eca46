use std::sync::Arc;
use tenderwatch::{
    application::ApplicationAssembler,
    collector::HttpCollector,
    config::AppConfig,
    credentials::{CredentialProvider, SigningBackend},
    scheduler::{ProcessedIdSet, TenderScheduler},
    vault::SecretVault,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging first
    let json = std::env::var_os("TENDERWATCH_LOG_JSON").is_some();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tenderwatch=info".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();

    info!("Starting tenderwatch v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load()?;
    info!("Configuration loaded for {} (BIN {})", config.company.name, config.company.bin);

    // The vault must be fully set up before anything touches the portal
    let vault = SecretVault::new(&config.storage.keys_dir);
    let missing = vault.missing_files();
    if !missing.is_empty() {
        error!("Vault setup is incomplete!");
        for path in &missing {
            error!("  missing: {}", path.display());
        }
        error!("Set it up with: tenderwatch-admin init --certificate <path/to/key.p12>");
        return Err(anyhow::anyhow!("Vault not initialized"));
    }

    let mut provider = CredentialProvider::new(vault, &config.signing)?;
    provider
        .load()
        .map_err(|e| anyhow::anyhow!("Failed to load signing credentials: {}", e))?;

    // Hard precondition: the signing service must accept the loaded key
    match provider.request_key_info().await {
        Ok(key_info) => {
            info!(
                "Signing service at {} accepted the key ({} fields reported)",
                config.signing.url,
                key_info.details.len()
            );
        }
        Err(e) => {
            error!("Signing service rejected the key check: {}", e);
            error!("Check that the signing service is running at {}", config.signing.url);
            return Err(anyhow::anyhow!("Signing service key check failed"));
        }
    }

    let signer: Arc<dyn SigningBackend> = Arc::new(provider);
    let assembler = ApplicationAssembler::new(
        signer,
        config.company.clone(),
        config.storage.output_dir.clone(),
        &config.signing,
    );

    let collector = Arc::new(HttpCollector::new(&config.collector)?);
    info!("Page driver at {} ({})", config.collector.url, config.collector.portal_url);

    let processed = ProcessedIdSet::load(config.storage.processed_file());
    info!("{} opportunities already processed", processed.len());

    let mut scheduler = TenderScheduler::new(collector, assembler, processed, &config);
    scheduler
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Cannot listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!("tenderwatch stopped");
    Ok(())
}
