use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use manabi_server::{
    api::AppState,
    auth::{CredentialVerifier, StoreVerifier, StubVerifier},
    content::ContentLibrary,
    store::{Store, memory::MemoryStore, sqlite::SqliteStore},
    utils::init_log,
};
use time::Duration;
use tower_sessions::{Expiry, SessionManagerLayer, cookie::Key};
use tower_sessions_moka_store::MokaStore;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the sqlite database file
    #[arg(short, long, default_value = "database/manabi.db")]
    database: PathBuf,

    /// Path to the content directory (themes/ and quizzes/ JSON)
    #[arg(short, long, default_value = "content")]
    content: PathBuf,

    /// Run on the in-memory store with fixture data and the stub
    /// credential pair, no database needed
    #[arg(long)]
    memory: bool,

    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Log directory; stdout when omitted
    #[arg(short, long)]
    log: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    let _guard = init_log(args.log.clone());

    let (store, verifier): (Arc<dyn Store>, Arc<dyn CredentialVerifier>) = if args.memory {
        (Arc::new(MemoryStore::seeded()?), Arc::new(StubVerifier))
    } else {
        if let Some(dir) = args.database.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)?;
        }
        let store = Arc::new(SqliteStore::connect(&args.database).await?);
        let verifier = Arc::new(StoreVerifier::new(store.clone()));
        (store, verifier)
    };

    let library = ContentLibrary::load(&args.content)?;
    library.seed(store.as_ref()).await?;

    // session cookies are signed; 30-day lifetime
    let key = match dotenvy::var("SESSION_SECRET") {
        Ok(secret) => {
            anyhow::ensure!(
                secret.len() >= 64,
                "SESSION_SECRET must be at least 64 bytes"
            );
            Key::from(secret.as_bytes())
        }
        Err(_) => {
            tracing::warn!("SESSION_SECRET not set, generating a random session key");
            Key::generate()
        }
    };
    let sessions = SessionManagerLayer::new(MokaStore::new(Some(10_000)))
        .with_signed(key)
        .with_expiry(Expiry::OnInactivity(Duration::days(30)));

    let app = manabi_server::app(AppState { store, verifier }).layer(sessions);
    let listener = tokio::net::TcpListener::bind((args.host.as_str(), args.port)).await?;
    tracing::info!("listening on http://{}:{}", args.host, args.port);
    tracing::info!(
        "swagger ui on http://{}:{}/swagger-ui",
        args.host,
        args.port
    );
    axum::serve(listener, app).await?;

    Ok(())
}
