use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use cdn_orchestrator::handlers;
use cdn_orchestrator::providers::HttpClientFactory;
use cdn_orchestrator::services::{GeolocationResolver, HttpGeolocationResolver};
use cdn_orchestrator::{CdnOrchestrator, Settings};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;
const GEOLOCATION_TIMEOUT: Duration = Duration::from_secs(2);

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,actix_web=info".into());
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let settings = Settings::from_env().context("Failed to load configuration")?;
    tracing::info!(
        host = %settings.host,
        port = settings.port,
        redundancy_factor = settings.redundancy_factor,
        "Starting cdn-orchestrator"
    );

    let factory = Arc::new(HttpClientFactory::new().context("Failed to build provider HTTP client")?);
    let resolver: Option<Arc<dyn GeolocationResolver>> = match &settings.geolocation_url {
        Some(url) => Some(Arc::new(
            HttpGeolocationResolver::new(url.clone(), GEOLOCATION_TIMEOUT)
                .context("Failed to build geolocation client")?,
        )),
        None => {
            tracing::warn!("CDN_GEOLOCATION_URL not set; geographic routing disabled");
            None
        }
    };

    let orchestrator = web::Data::new(CdnOrchestrator::new(&settings, factory, resolver));

    let definitions = settings
        .load_providers()
        .context("Failed to load provider definitions")?;
    for definition in definitions {
        let provider_id = definition.id.clone();
        orchestrator
            .register_provider(definition)
            .with_context(|| format!("Failed to register provider {}", provider_id))?;
    }
    if orchestrator.providers().is_empty() {
        tracing::warn!("No providers registered; uploads will fail until providers are added");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let background = orchestrator.start_background_tasks(shutdown_rx);

    let app_data = orchestrator.clone();
    let bind = (settings.host.clone(), settings.port);
    tracing::info!("cdn-orchestrator HTTP listening on {}:{}", bind.0, bind.1);

    HttpServer::new(move || {
        App::new()
            .app_data(app_data.clone())
            .app_data(web::PayloadConfig::new(MAX_UPLOAD_BYTES))
            .wrap(middleware::Logger::default())
            .configure(handlers::configure)
    })
    .bind(bind)?
    .run()
    .await?;

    tracing::info!("HTTP server stopped; shutting down background tasks");
    let _ = shutdown_tx.send(true);
    for handle in background {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Background task ended abnormally");
        }
    }

    Ok(())
}
