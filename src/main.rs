use std::net::{IpAddr, SocketAddr};

use axum::{Json, Router, extract::State, routing::get};
use inspection_guard::{
    AppState, cache::ConnectionStatus, config::Config, middleware::rate_limit,
    result::ApiResult,
};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Serialize)]
struct HealthStatus {
    redis: ConnectionStatus,
    local_rate_limit_entries: usize,
}

async fn health(State(state): State<AppState>) -> Json<ApiResult<HealthStatus>> {
    Json(ApiResult::success(HealthStatus {
        redis: state.redis.status(),
        local_rate_limit_entries: state.rate_limiter.local_backend().len(),
    }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(redis = %config.redis.display_url(), "Configuration loaded");

    // 设置应用状态
    let state = AppState::build(config.clone());

    // 本地计数器定期清理
    let sweeper = state
        .rate_limiter
        .spawn_sweeper(config.local_sweep_interval());

    // 健康检查也走通用限流
    let router = Router::new().route("/health", get(health)).layer(
        axum::middleware::from_fn_with_state(
            state.rate_limit_guard(config.rate_limits.api.clone()),
            rate_limit,
        ),
    );

    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(tower_http::cors::CorsLayer::permissive())
    };

    let app = router.with_state(state.clone());

    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    sweeper.abort();
    state.shutdown().await;
    tracing::info!("Server stopped");
}
