//! API server entry point.

use std::sync::Arc;
use std::time::Duration;

use api::config::{Config, LogFormat};
use purchase::{ExpirySweeper, HttpInvoiceGateway, InMemoryPaymentGateway, PaymentGateway};
use sqlx::postgres::PgPoolOptions;
use store::{InMemoryStore, ListingStore, PostgresStore, TransactionStore};
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn connect_stores(config: &Config) -> (Arc<dyn ListingStore>, Arc<dyn TransactionStore>) {
    match config.database_url {
        Some(ref url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(url)
                .await
                .expect("failed to connect to PostgreSQL");
            let store = PostgresStore::new(pool);
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL store");

            let store = Arc::new(store);
            (
                store.clone() as Arc<dyn ListingStore>,
                store as Arc<dyn TransactionStore>,
            )
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            let store = Arc::new(InMemoryStore::new());
            (
                store.clone() as Arc<dyn ListingStore>,
                store as Arc<dyn TransactionStore>,
            )
        }
    }
}

fn payment_gateway(config: &Config) -> Arc<dyn PaymentGateway> {
    match config.gateway_credentials() {
        Some((base_url, secret_key)) => {
            tracing::info!(%base_url, "using HTTP invoice gateway");
            let invoice_duration = Duration::from_secs(config.payment_window_secs);
            Arc::new(HttpInvoiceGateway::new(base_url, secret_key, invoice_duration))
        }
        None => {
            tracing::warn!("gateway credentials not set, using in-memory payment gateway");
            Arc::new(InMemoryPaymentGateway::new())
        }
    }
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Wire stores, gateway and the purchase workflow
    let purchase_config = config
        .purchase_config()
        .expect("invalid fee policy configuration");
    let (listings, transactions) = connect_stores(&config).await;
    let state = api::AppState::new(
        listings.clone(),
        transactions.clone(),
        payment_gateway(&config),
        purchase_config,
        config.jwt_secret.as_bytes(),
    );

    // 4. Start the expiry sweeper
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = ExpirySweeper::new(listings, transactions, config.sweep_batch_size);
    let sweeper_task = tokio::spawn(sweeper.run(config.sweep_interval(), shutdown_rx));

    // 5. Start server
    let app = api::create_app(state, metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // 6. Stop background work
    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper_task.await {
        tracing::error!(error = %e, "expiry sweeper task failed");
    }

    tracing::info!("server shut down gracefully");
}
