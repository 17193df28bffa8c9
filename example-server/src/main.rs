use axum::{routing::get, Router};
use sql_driver::{connect, DriverLayer, DriverOptions};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod database;

const DEFAULT_DATABASE_URL: &str = "sqlite:./data/example.db?mode=rwc";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sql_driver=debug")),
        )
        .init();

    let options = match std::env::var("SQL_DRIVER_CONFIG") {
        Ok(path) => {
            let json = std::fs::read_to_string(&path).expect("Failed to read driver config");
            DriverOptions::from_json_str(&json).expect("Invalid driver config")
        }
        Err(_) => DriverOptions::default(),
    };

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

    // Seed the bundled SQLite demo before the driver opens it
    if database_url.starts_with("sqlite:") {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&database_url)
            .await
            .expect("Failed to open SQLite database");
        database::setup(&pool)
            .await
            .expect("Failed to setup database");
        pool.close().await;
    }

    let driver = connect(&database_url, &options)
        .await
        .expect("Failed to open driver");
    let driver: Arc<dyn sql_driver::Driver> = Arc::from(driver);

    let app = Router::new()
        .route("/", get(root_handler))
        .merge(DriverLayer::new("/sql", driver.clone(), options).into_router());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000")
        .await
        .expect("Failed to bind to port 3000");

    tracing::info!("server running at http://127.0.0.1:3000");
    tracing::info!("driver API available at http://127.0.0.1:3000/sql/api");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    driver.close().await;
}

async fn root_handler() -> &'static str {
    "Welcome to the sql-driver example server"
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(%error, "failed to listen for shutdown signal");
    }
}
