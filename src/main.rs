// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Activity-Sync API Server
//!
//! Runs provider sync jobs on behalf of the task queue: full history,
//! incremental catch-up and photo import, each resumable after a quota pause.

use activity_sync::{
    config::Config,
    db::FirestoreDb,
    services::{KmsService, NoTimezoneLookup},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Activity-Sync API");

    // Initialize Firestore database
    let db = FirestoreDb::new(&config.gcp_project_id)
        .await
        .expect("Failed to connect to Firestore");

    // Initialize KMS service
    let kms = KmsService::new(&config.gcp_project_id, &config.gcp_region, &config.kms_key_name)
        .await
        .expect("Failed to initialize KMS service");
    tracing::info!("KMS service initialized");

    tracing::info!(
        windows = ?config.rate_limit_windows,
        capacity = config.usage_store_capacity,
        "Quota governor configured"
    );

    // Build shared state
    let state = Arc::new(
        AppState::build(
            config.clone(),
            Arc::new(db),
            Arc::new(kms),
            Arc::new(NoTimezoneLookup),
        )
        .expect("Failed to build sync engine"),
    );

    // Build router
    let app = activity_sync::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("activity_sync=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
