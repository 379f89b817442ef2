//! FlightSurety Oracle Server
//!
//! Answers the FlightSuretyApp contract's `OracleRequest` events with a flight
//! status submitted through the registered oracle accounts, and serves a
//! small health API for the dapp.

use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use flightsurety_oracle_server::{
    config::ServerConfig,
    event_listener::OracleEventListener,
    ledger::{Backoff, Ledger, LedgerClient, OracleRequestSubscription},
    routes,
    services::{spawn_registry_refresh, OracleRegistry, RegistryHandle, ResponseDispatcher},
    supervisor::supervise,
};

const REQUEST_CHANNEL_CAPACITY: usize = 256;
const PIPELINE_SUPERVISOR_MAX_BACKOFF_SECONDS: u64 = 30;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env().context("invalid server configuration")?;
    info!(
        network = %config.network,
        url = %config.ledger.url,
        app_address = %config.ledger.app_address,
        "configuration loaded"
    );

    let client = Arc::new(LedgerClient::new(&config).context("failed to build ledger client")?);
    match client.is_operational().await {
        Ok(true) => info!("FlightSuretyApp is operational"),
        Ok(false) => warn!("FlightSuretyApp reports it is not operational"),
        Err(err) => warn!(error = %err, "could not query FlightSuretyApp operational status"),
    }
    let ledger: Arc<dyn Ledger> = client;

    let registration_fee = config
        .register_oracles
        .then_some(config.registration_fee_wei);
    let registry = match OracleRegistry::load(ledger.as_ref(), &config.oracles, registration_fee).await {
        Ok(registry) => registry,
        Err(err) => {
            error!(error = %err, "failed to load oracle registry; starting with no oracles");
            OracleRegistry::default()
        }
    };
    if registry.is_empty() {
        warn!("no oracle accounts available; rounds will exhaust immediately");
    }
    let registry = RegistryHandle::new(registry);

    if let Some(period) = config.registry_refresh {
        spawn_registry_refresh(ledger.clone(), config.oracles.clone(), registry.clone(), period);
    }

    // Ledger events flow subscription -> channel -> listener -> rounds. Both
    // halves are restarted together if either one ends.
    let listener = OracleEventListener::new(Arc::new(ResponseDispatcher::new(ledger)), registry);
    let pipeline_config = config.clone();
    tokio::spawn(supervise(
        move || {
            let (sender, receiver) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
            vec![
                (
                    "subscription",
                    OracleRequestSubscription::from_config(&pipeline_config).spawn(sender),
                ),
                ("listener", tokio::spawn(listener.clone().start(receiver))),
            ]
        },
        Backoff::new(
            Duration::from_secs(1),
            Duration::from_secs(PIPELINE_SUPERVISOR_MAX_BACKOFF_SECONDS),
        ),
    ));

    let app = routes::api_routes().layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(build_cors_layer(&config.cors_allowed_origins)),
    );

    let addr = SocketAddr::new(config.host, config.port);
    info!("Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await.context("http server failed")?;

    Ok(())
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allowed_origins = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(false)
}
