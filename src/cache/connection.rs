use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex as StatusLock;
use redis::aio::MultiplexedConnection;
use redis::{Client as RedisClient, RedisResult};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::RedisSettings;
use crate::error::CacheError;

/// Redis 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Uninitialized,
    Connecting,
    Ready,
    Unavailable,
    Closed,
}

/// Redis 连接管理
///
/// 首次使用时才建立连接；连接失败或运行中断开后转为不可用，
/// 并在后台按指数退避重连，超过次数上限后保持不可用直到 `reset`。
pub struct ConnectionManager {
    client: Option<RedisClient>,
    settings: RedisSettings,
    status: StatusLock<ConnectionStatus>,
    connection: RwLock<Option<MultiplexedConnection>>,
    available: AtomicBool,
    init_lock: Mutex<()>,
    reconnecting: AtomicBool,
}

impl ConnectionManager {
    pub fn new(settings: RedisSettings) -> Arc<Self> {
        let client = match settings.url.as_deref() {
            None => {
                info!("Redis is not configured, rate limiting and caching run in local-only mode");
                None
            }
            Some(url) => match RedisClient::open(url) {
                Ok(client) => Some(client),
                Err(e) => {
                    warn!(
                        redis = %settings.display_url(),
                        error = %e,
                        "Invalid Redis configuration, running in local-only mode"
                    );
                    None
                }
            },
        };

        let status = if client.is_some() {
            ConnectionStatus::Uninitialized
        } else {
            ConnectionStatus::Unavailable
        };

        Arc::new(Self {
            client,
            settings,
            status: StatusLock::new(status),
            connection: RwLock::new(None),
            available: AtomicBool::new(false),
            init_lock: Mutex::new(()),
            reconnecting: AtomicBool::new(false),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.lock()
    }

    fn set_status(&self, status: ConnectionStatus) {
        *self.status.lock() = status;
    }

    /// 获取连接句柄；不可用时立即返回 None，不做任何网络 I/O
    pub async fn connection(self: &Arc<Self>) -> Option<MultiplexedConnection> {
        match self.status() {
            ConnectionStatus::Ready => self.connection.read().await.clone(),
            ConnectionStatus::Uninitialized => self.initialize().await,
            _ => None,
        }
    }

    async fn initialize(self: &Arc<Self>) -> Option<MultiplexedConnection> {
        let client = self.client.as_ref()?;
        let _guard = self.init_lock.lock().await;

        // 等锁期间可能已被其他请求初始化
        match self.status() {
            ConnectionStatus::Uninitialized => {}
            ConnectionStatus::Ready => return self.connection.read().await.clone(),
            _ => return None,
        }

        self.set_status(ConnectionStatus::Connecting);
        match self.try_connect(client).await {
            Ok(conn) => {
                self.mark_ready(conn.clone()).await;
                info!(redis = %self.settings.display_url(), "Connected to Redis");
                Some(conn)
            }
            Err(err) => {
                self.set_status(ConnectionStatus::Unavailable);
                warn!(
                    redis = %self.settings.display_url(),
                    error = %err,
                    "Redis unreachable, falling back to local mode"
                );
                self.spawn_reconnect();
                None
            }
        }
    }

    async fn try_connect(&self, client: &RedisClient) -> Result<MultiplexedConnection, CacheError> {
        let timeout = self.settings.connect_timeout;
        match tokio::time::timeout(timeout, client.get_multiplexed_async_connection()).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(CacheError::Redis(e)),
            Err(_) => Err(CacheError::Timeout(timeout)),
        }
    }

    async fn mark_ready(&self, conn: MultiplexedConnection) {
        let mut slot = self.connection.write().await;
        if self.status() == ConnectionStatus::Closed {
            return;
        }
        *slot = Some(conn);
        self.set_status(ConnectionStatus::Ready);
        self.available.store(true, Ordering::Release);
    }

    /// 本实例是否应尝试 Redis：已连通，或尚未初始化（首次使用时建立连接）
    pub fn should_try(&self) -> bool {
        self.is_available() || self.status() == ConnectionStatus::Uninitialized
    }

    /// 执行一次 Redis 操作，带超时；连接层故障会触发降级与后台重连
    pub async fn execute<T, F, Fut>(self: &Arc<Self>, op: F) -> Result<T, CacheError>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        self.run(op, true).await
    }

    /// 与 `execute` 相同，但超时只影响本次调用，不会让连接降级。
    /// 用于耗时随数据量增长的命令，例如 SCAN 分页
    pub async fn execute_bulk<T, F, Fut>(self: &Arc<Self>, op: F) -> Result<T, CacheError>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        self.run(op, false).await
    }

    async fn run<T, F, Fut>(self: &Arc<Self>, op: F, timeout_is_failure: bool) -> Result<T, CacheError>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let conn = self.connection().await.ok_or(CacheError::Unavailable)?;
        let timeout = self.settings.command_timeout;

        let err = match tokio::time::timeout(timeout, op(conn)).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => CacheError::Redis(e),
            Err(_) => CacheError::Timeout(timeout),
        };

        let degrade = match err {
            CacheError::Timeout(_) => timeout_is_failure,
            ref other => other.is_connectivity(),
        };
        if degrade {
            self.report_failure(&err);
        }
        Err(err)
    }

    /// 标记连接失效；只在 可用→不可用 的状态切换时记录日志并返回 true
    pub fn report_failure(self: &Arc<Self>, err: &CacheError) -> bool {
        if !self.available.swap(false, Ordering::AcqRel) {
            return false;
        }

        {
            let mut status = self.status.lock();
            if *status == ConnectionStatus::Closed {
                return false;
            }
            *status = ConnectionStatus::Unavailable;
        }

        warn!(error = %err, "Lost Redis connection, switching to local fallback");
        self.spawn_reconnect();
        true
    }

    fn spawn_reconnect(self: &Arc<Self>) {
        let Some(client) = self.client.clone() else {
            return;
        };
        if self.reconnecting.swap(true, Ordering::AcqRel) {
            return;
        }

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.connection.write().await.take();
            manager.reconnect_loop(&client).await;
            manager.reconnecting.store(false, Ordering::Release);
        });
    }

    async fn reconnect_loop(&self, client: &RedisClient) {
        let max_attempts = self.settings.max_reconnect_attempts;

        for attempt in 0..max_attempts {
            tokio::time::sleep(backoff_delay(
                attempt,
                self.settings.reconnect_base_delay,
                self.settings.reconnect_max_delay,
            ))
            .await;

            if self.status() != ConnectionStatus::Unavailable {
                return;
            }

            match self.try_connect(client).await {
                Ok(conn) => {
                    self.mark_ready(conn).await;
                    info!(attempt = attempt + 1, "Redis connection restored");
                    return;
                }
                Err(err) => {
                    debug!(attempt = attempt + 1, error = %err, "Redis reconnect attempt failed");
                }
            }
        }

        warn!(
            attempts = max_attempts,
            "Giving up on Redis reconnection, staying in local-only mode"
        );
    }

    /// 重置为未初始化状态，下次使用时重新连接
    pub async fn reset(&self) {
        if self.client.is_none() {
            return;
        }
        let _guard = self.init_lock.lock().await;
        self.connection.write().await.take();
        self.available.store(false, Ordering::Release);
        self.set_status(ConnectionStatus::Uninitialized);
        debug!("Redis connection state reset");
    }

    /// 关闭连接，之后所有调用都走降级路径
    pub async fn close(&self) {
        self.set_status(ConnectionStatus::Closed);
        self.available.store(false, Ordering::Release);
        if self.connection.write().await.take().is_some() {
            info!("Redis connection closed");
        }
    }
}

/// 第 `attempt` 次（从 0 开始）重连前的等待时间：`base * 2^attempt`，不超过 `max`
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt)).min(max)
}
