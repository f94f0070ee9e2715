use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mailbridge::api::{ApiServer, AppState};
use mailbridge::audit::LogRecorder;
use mailbridge::config::Config;
use mailbridge::db;
use mailbridge::mailbox::ImapMailbox;
use mailbridge::registry::ServerRegistry;
use mailbridge::sync::{EngineSettings, SyncEngine};
use mailbridge::webdav::{RetryPolicy, WebDavUploader};

#[derive(Parser, Debug)]
#[command(name = "mailbridge", about = "IMAP to WebDAV attachment bridge")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Execute a single sync run and exit instead of serving
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("Starting mailbridge");

    let config = if args.config.exists() {
        Config::from_file(&args.config)?
    } else {
        info!("No config file found at {:?}, using defaults", args.config);
        Config::default()
    };
    config.validate()?;

    info!("Configuration loaded");
    info!("  HTTP listening on: {}", config.http.listen_addr);
    info!("  Database: {}", config.database.url);
    info!("  IMAP server: {}:{}", config.imap.host, config.imap.port);
    info!("  Subject keyword: '{}'", config.sync.subject_keyword);

    let pool = db::connect(&config.database.url).await?;
    db::init(&pool).await?;

    let registry = ServerRegistry::new(pool.clone());
    registry.seed_if_empty(&config.servers).await?;

    let settings = EngineSettings {
        subject_keyword: config.sync.subject_keyword.clone(),
        max_attachment_bytes: config.max_attachment_bytes(),
        max_messages_per_run: config.sync.max_messages_per_run as usize,
        lock_ttl: chrono::Duration::seconds(config.sync.lock_ttl_seconds as i64),
    };
    let retry = RetryPolicy::new(
        config.upload.retry_count,
        std::time::Duration::from_secs(config.upload.retry_delay_seconds),
    );
    let engine = SyncEngine::new(pool.clone(), WebDavUploader::new(retry), settings);

    if args.once {
        let imap = config.imap.clone();
        let summary = engine.run(|| ImapMailbox::connect(&imap), None).await?;
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let config = Arc::new(config);
    let state = Arc::new(AppState {
        pool: pool.clone(),
        config: config.clone(),
        engine,
        recorder: LogRecorder::new(pool.clone()),
        registry,
        http: reqwest::Client::new(),
    });

    let server = ApiServer::new(state, config.http.listen_addr.clone());
    server.run().await?;

    Ok(())
}
