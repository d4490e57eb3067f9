use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::fmt::writer::MakeWriterExt;

use dayline::broadcast::{BroadcastDispatcher, BroadcastStyle};
use dayline::catalog::{MessageCatalog, MessageKind};
use dayline::channels::{ChannelSender, SmtpConfig, SmtpSender, TwilioConfig, TwilioSender};
use dayline::commands::CommandProcessor;
use dayline::config::EngineConfig;
use dayline::error::ConfigError;
use dayline::selector::DailySelector;
use dayline::store::{LibSqlStore, Store};
use dayline::triggers::TriggerRegistry;
use dayline::webhook::{self, WebhookState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing: stderr plus a daily-rolling file log
    let file_appender = tracing_appender::rolling::daily("./logs", "dayline.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr.and(file_writer))
        .init();

    let config = EngineConfig::from_env().context("Failed to load configuration")?;
    tracing::info!(
        brand = %config.brand,
        schedule = %config.broadcast_schedule,
        db = %config.db_path.display(),
        "Dayline v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    // ── Store & catalog ─────────────────────────────────────────────
    let store: Arc<dyn Store> = Arc::new(
        LibSqlStore::new_local(&config.db_path)
            .await
            .context("Failed to open store")?,
    );

    let seeded = seed_catalog_if_empty(&store, &config.seed_path)
        .await
        .context("Failed to seed catalog")?;
    if seeded > 0 {
        tracing::info!(
            seeded,
            path = %config.seed_path.display(),
            "Catalog seeded from file"
        );
    }

    let messages = store
        .load_messages()
        .await
        .context("Failed to load catalog messages")?;
    let catalog =
        Arc::new(MessageCatalog::new(messages).context("Catalog failed validation")?);
    let triggers = Arc::new(
        TriggerRegistry::new(Arc::clone(&catalog))
            .context("Trigger registry failed validation")?,
    );
    tracing::info!(
        messages = catalog.all().len(),
        interactive = catalog.count_by_kind(MessageKind::Interactive),
        keywords = triggers.len(),
        "Catalog loaded"
    );

    // ── Engine components ───────────────────────────────────────────
    let style = BroadcastStyle {
        brand: config.brand.clone(),
        footers: config.footers.clone(),
    };

    let selector = Arc::new(DailySelector::new(
        Arc::clone(&catalog),
        Arc::clone(&store),
        config.epoch,
    ));
    let processor = Arc::new(CommandProcessor::new(
        Arc::clone(&selector),
        Arc::clone(&catalog),
        triggers,
        Arc::clone(&store),
        style.clone(),
    ));

    // ── Channel senders ─────────────────────────────────────────────
    let mut senders: Vec<Arc<dyn ChannelSender>> = Vec::new();
    if let Some(twilio) = TwilioConfig::from_env() {
        tracing::info!("SMS channel enabled");
        senders.push(Arc::new(TwilioSender::new(twilio)));
    }
    if let Some(smtp) = SmtpConfig::from_env() {
        tracing::info!("Email channel enabled");
        senders.push(Arc::new(SmtpSender::new(smtp)));
    }
    if senders.is_empty() {
        return Err(ConfigError::NoChannels)
            .context("Set TWILIO_ACCOUNT_SID and/or SMTP_HOST to enable a channel");
    }
    let sms_sender = senders.iter().find(|s| s.name() == "sms").cloned();

    let dispatcher = Arc::new(BroadcastDispatcher::new(
        selector,
        Arc::clone(&store),
        senders,
        style,
        config.send_delay,
    ));

    // ── Scheduled broadcast ─────────────────────────────────────────
    let schedule = cron::Schedule::from_str(&config.broadcast_schedule)
        .context("Invalid broadcast cron expression")?;
    tokio::spawn(run_broadcast_schedule(schedule, dispatcher));

    // ── Inbound webhook ─────────────────────────────────────────────
    let app = webhook::router(WebhookState {
        processor,
        sms: sms_sender,
    });
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "Webhook listening");
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Load catalog messages from a JSON seed file on first run. A populated
/// message table or a missing seed file are both no-ops.
async fn seed_catalog_if_empty(
    store: &Arc<dyn Store>,
    path: &std::path::Path,
) -> anyhow::Result<usize> {
    if !store.load_messages().await?.is_empty() || !path.exists() {
        return Ok(0);
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let messages: Vec<dayline::catalog::Message> =
        serde_json::from_str(&raw).context("Seed file is not a valid message list")?;

    for msg in &messages {
        store.insert_message(msg).await?;
    }
    Ok(messages.len())
}

/// Sleep until each cron fire time, then run that day's broadcast.
async fn run_broadcast_schedule(schedule: cron::Schedule, dispatcher: Arc<BroadcastDispatcher>) {
    loop {
        let Some(next) = schedule.upcoming(chrono::Local).next() else {
            tracing::error!("Broadcast schedule has no future fire times; scheduler stopping");
            return;
        };

        let wait = (next - chrono::Local::now()).to_std().unwrap_or_default();
        tracing::info!(next = %next, "Next daily broadcast scheduled");
        tokio::time::sleep(wait).await;

        let today = chrono::Local::now().date_naive();
        match dispatcher.broadcast_today(today).await {
            Ok(report) => tracing::info!(
                success = report.success,
                failed = report.failed,
                "Daily broadcast finished"
            ),
            Err(e) => tracing::error!(error = %e, "Daily broadcast failed"),
        }
    }
}
