//! Axum API server binary.

use std::net::SocketAddr;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use adrender_api::{create_router, ApiConfig, AppState};
use adrender_media::{detect_encoders, find_encoder_binary};
use adrender_queue::{Scheduler, SchedulerConfig};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("adrender=info".parse().expect("valid directive"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting adrender-api");

    let config = ApiConfig::from_env();
    info!("API config: host={}, port={}", config.host, config.port);

    let scheduler_config = SchedulerConfig::from_env();

    // No encoder binary means no jobs can ever be processed: fail fast.
    let binary = match find_encoder_binary(
        &scheduler_config.encoder_binary.to_string_lossy(),
    ) {
        Ok(path) => path,
        Err(e) => {
            error!("Encoder unavailable: {}", e);
            std::process::exit(1);
        }
    };

    let mut pool = match detect_encoders(&binary).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Encoder detection failed: {}", e);
            std::process::exit(1);
        }
    };

    // Operator override for the slot count.
    if let Some(slots) = std::env::var("RENDER_SLOTS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
    {
        pool.slots = slots.max(1);
    }

    let scheduler_config = SchedulerConfig {
        encoder_binary: binary,
        ..scheduler_config
    };

    let scheduler = match Scheduler::new(scheduler_config, pool) {
        Ok(scheduler) => scheduler,
        Err(e) => {
            error!("Failed to create scheduler: {}", e);
            std::process::exit(1);
        }
    };

    let state = AppState::new(config.clone(), scheduler);
    let app = create_router(state);

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Invalid listen address: {}", e);
            std::process::exit(1);
        }
    };

    info!("Listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
