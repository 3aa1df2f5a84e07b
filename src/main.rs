use std::sync::Arc;
use tower_http::cors::CorsLayer;

use shot_counter_backend::api;
use shot_counter_backend::config::Config;
use shot_counter_backend::db::Database;
use shot_counter_backend::metrics;
use shot_counter_backend::notify::BroadcastNotifier;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::load();
    metrics::register_metrics();

    let db = Database::connect(&config.database_url, config.db_max_connections)
        .await
        .expect("Failed to initialize database");
    let db = Arc::new(db);
    let notifier = BroadcastNotifier::new(config.notify_capacity);

    let app = api::router(db, notifier).layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {addr}: {e}"));

    tracing::info!("Shot counter backend listening on {addr}");
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
