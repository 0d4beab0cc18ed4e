use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};

use admit_server::config::Config;
use admit_server::http;
use admit_server::notifier::{LogNotifier, MailApiClient, Notifier};
use admit_server::repository::SqliteRepository;
use admit_server::services::Admissions;
use admit_server::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting admissions server");

    let config = Config::from_env().context("failed to load configuration")?;

    let db_path = config.state_dir.join("admit-state.db");
    info!("Using state database: {}", db_path.display());
    let repo = SqliteRepository::new(&db_path).context("failed to initialize SQLite database")?;

    let notifier: Arc<dyn Notifier> = match (&config.mail_endpoint, &config.mail_api_key) {
        (Some(endpoint), Some(api_key)) => {
            info!("Mail transport configured: {}", endpoint);
            Arc::new(MailApiClient::new(
                endpoint.clone(),
                api_key.clone(),
                config.mail_from.clone(),
            ))
        }
        _ => {
            info!("No mail transport configured; notifications will be logged");
            Arc::new(LogNotifier)
        }
    };

    let admissions = Admissions::new(Arc::new(repo), notifier, config.base_url.clone());
    let app_state = Arc::new(AppState { admissions });

    let app = http::router(app_state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
