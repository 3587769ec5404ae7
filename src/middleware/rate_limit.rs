use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::task::JoinHandle;

use crate::{
    cache::{
        ConnectionManager,
        keys::{build_key, client_id_from_request},
        models::RateLimitDecision,
        operations::{LocalCounterBackend, RedisCounterBackend},
    },
    config::RateLimitPolicy,
    error::AppError,
};

/// 限流器：Redis 可用时使用 Redis 计数，否则或失败时本次请求改用本地计数
pub struct RateLimiter {
    connection: Arc<ConnectionManager>,
    distributed: RedisCounterBackend,
    local: Arc<LocalCounterBackend>,
}

impl RateLimiter {
    pub fn new(connection: Arc<ConnectionManager>) -> Self {
        Self {
            distributed: RedisCounterBackend::new(Arc::clone(&connection)),
            connection,
            local: Arc::new(LocalCounterBackend::new()),
        }
    }

    pub fn local_backend(&self) -> &Arc<LocalCounterBackend> {
        &self.local
    }

    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        self.local.spawn_sweeper(every)
    }

    pub async fn check(&self, client_id: &str, policy: &RateLimitPolicy) -> RateLimitDecision {
        let key = build_key(&policy.prefix, client_id);

        let snapshot = if self.connection.should_try() {
            match self
                .distributed
                .increment_and_check(&key, policy.window)
                .await
            {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    tracing::trace!(key = %key, error = %err, "Using local rate-limit counter");
                    self.local.increment_and_check(&key, policy.window)
                }
            }
        } else {
            self.local.increment_and_check(&key, policy.window)
        };

        let decision = RateLimitDecision::from_snapshot(policy.max_requests, snapshot);
        if decision.limited {
            tracing::warn!(
                target: "security",
                event = "RATE_LIMIT_EXCEEDED",
                prefix = %policy.prefix,
                client_id,
                count = decision.count,
                limit = decision.limit,
                "Rate limit exceeded"
            );
        }
        decision
    }

    pub async fn check_request<B>(&self, req: &Request<B>, policy: &RateLimitPolicy) -> RateLimitDecision {
        let client_id = client_id_from_request(req);
        self.check(&client_id, policy).await
    }

    /// 清除某个客户端的计数；Redis 侧尽力而为，本地侧总是成功
    pub async fn reset(&self, prefix: &str, client_id: &str) {
        let key = build_key(prefix, client_id);
        if let Err(err) = self.distributed.reset(&key).await {
            tracing::debug!(key = %key, error = %err, "Could not reset distributed rate-limit counter");
        }
        self.local.reset(&key);
    }
}

/// 中间件状态：限流器 + 该路由使用的策略
#[derive(Clone)]
pub struct RateLimitGuard {
    limiter: Arc<RateLimiter>,
    policy: RateLimitPolicy,
}

impl RateLimitGuard {
    pub fn new(limiter: Arc<RateLimiter>, policy: RateLimitPolicy) -> Self {
        Self { limiter, policy }
    }
}

pub fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert(
        "x-ratelimit-reset",
        HeaderValue::from(decision.reset_at.timestamp()),
    );
}

pub async fn rate_limit(
    State(guard): State<RateLimitGuard>,
    req: Request<Body>,
    next: Next,
) -> Response {
    // 先解析出客户端标识，避免跨 await 持有请求引用
    let client_id = client_id_from_request(&req);
    let decision = guard.limiter.check(&client_id, &guard.policy).await;

    let mut response = if decision.limited {
        AppError::RateLimited {
            retry_after_secs: decision.retry_after_secs(),
        }
        .into_response()
    } else {
        next.run(req).await
    };

    apply_rate_limit_headers(response.headers_mut(), &decision);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedisSettings;
    use axum::{Router, http::StatusCode, routing::get};
    use tower::ServiceExt;

    fn limiter() -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new(ConnectionManager::new(RedisSettings::default())))
    }

    fn login_policy() -> RateLimitPolicy {
        RateLimitPolicy::new("login", 900_000, 5)
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_within_limit_count_down() {
        let limiter = limiter();
        let policy = RateLimitPolicy::new("api", 60_000, 10);

        for n in 1..=10u32 {
            let decision = limiter.check("c1", &policy).await;
            assert!(!decision.limited);
            assert_eq!(decision.remaining, 10 - n);
        }

        let over = limiter.check("c1", &policy).await;
        assert!(over.limited);
        assert_eq!(over.remaining, 0);
        assert_eq!(over.count, 11);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_rolls_over_after_reset_at() {
        let limiter = limiter();
        let policy = RateLimitPolicy::new("api", 1_000, 2);

        for _ in 0..3 {
            limiter.check("c1", &policy).await;
        }
        assert!(limiter.check("c1", &policy).await.limited);

        tokio::time::advance(Duration::from_millis(1_000)).await;
        let fresh = limiter.check("c1", &policy).await;
        assert_eq!(fresh.count, 1);
        assert!(!fresh.limited);
    }

    #[tokio::test]
    async fn test_unavailable_redis_goes_straight_to_local() {
        let connection = ConnectionManager::new(RedisSettings {
            url: Some("redis://127.0.0.1:1".to_string()),
            connect_timeout: Duration::from_millis(200),
            command_timeout: Duration::from_millis(200),
            max_reconnect_attempts: 0,
            ..RedisSettings::default()
        });
        let limiter = RateLimiter::new(Arc::clone(&connection));
        let policy = login_policy();

        // 首次请求触发连接尝试，失败后降级
        assert_eq!(limiter.check("c1", &policy).await.count, 1);
        assert!(!connection.is_available());
        assert!(!connection.should_try());

        for n in 2..=4 {
            assert_eq!(limiter.check("c1", &policy).await.count, n);
        }
        assert_eq!(connection.status(), crate::cache::ConnectionStatus::Unavailable);
    }

    #[tokio::test]
    async fn test_check_request_resolves_client() {
        let limiter = limiter();
        let policy = login_policy();
        let req = Request::builder()
            .header("x-real-ip", "192.0.2.10")
            .body(())
            .unwrap();

        limiter.check_request(&req, &policy).await;
        assert_eq!(limiter.check("192.0.2.10", &policy).await.count, 2);
        assert_eq!(limiter.local_backend().len(), 1);
    }

    #[tokio::test]
    async fn test_reset_restarts_count() {
        let limiter = limiter();
        let policy = login_policy();

        for _ in 0..7 {
            limiter.check("c1", &policy).await;
        }
        limiter.reset("login", "c1").await;

        assert_eq!(limiter.check("c1", &policy).await.count, 1);
    }

    #[tokio::test]
    async fn test_prefixes_and_clients_are_isolated() {
        let limiter = limiter();
        let login = login_policy();
        let api = RateLimitPolicy::new("api", 60_000, 100);

        for _ in 0..6 {
            limiter.check("c1", &login).await;
        }
        assert!(limiter.check("c1", &login).await.limited);
        assert!(!limiter.check("c2", &login).await.limited);
        assert_eq!(limiter.check("c1", &api).await.count, 1);
    }

    fn login_router(limiter: Arc<RateLimiter>) -> Router {
        Router::new()
            .route("/login", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(
                RateLimitGuard::new(limiter, login_policy()),
                rate_limit,
            ))
    }

    fn login_request() -> Request<Body> {
        Request::builder()
            .uri("/login")
            .header("x-forwarded-for", "203.0.113.50")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_login_scenario_through_middleware() {
        let app = login_router(limiter());

        for expected_remaining in [4, 3, 2, 1, 0] {
            let response = app.clone().oneshot(login_request()).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()["x-ratelimit-limit"], "5");
            assert_eq!(
                response.headers()["x-ratelimit-remaining"],
                expected_remaining.to_string().as_str()
            );
            assert!(response.headers().contains_key("x-ratelimit-reset"));
            assert!(!response.headers().contains_key("retry-after"));
        }

        let response = app.clone().oneshot(login_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");

        let retry_after: u64 = response.headers()["retry-after"]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(retry_after > 0 && retry_after <= 900);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], crate::utils::error_codes::RATE_LIMIT);
        assert_eq!(json["content"]["retry_after"], retry_after);
    }

    #[tokio::test]
    async fn test_limited_request_does_not_reach_handler() {
        let limiter = limiter();
        let policy = RateLimitPolicy::new("login", 900_000, 0);
        let app = Router::new()
            .route("/login", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(
                RateLimitGuard::new(limiter, policy),
                rate_limit,
            ));

        let response = app.oneshot(login_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
