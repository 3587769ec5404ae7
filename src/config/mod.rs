use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Redis 连接配置
#[derive(Debug, Clone)]
pub struct RedisSettings {
    /// 为 None 时表示未配置 Redis，限流与缓存以本地模式运行
    pub url: Option<String>,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay: Duration,
    pub reconnect_max_delay: Duration,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: None,
            connect_timeout: Duration::from_millis(2000),
            command_timeout: Duration::from_millis(1000),
            max_reconnect_attempts: 5,
            reconnect_base_delay: Duration::from_millis(200),
            reconnect_max_delay: Duration::from_millis(5000),
        }
    }
}

impl RedisSettings {
    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }

    /// 用于日志输出的地址，密码会被隐藏
    pub fn display_url(&self) -> String {
        self.url
            .as_deref()
            .map(redact_url)
            .unwrap_or_else(|| "<none>".to_string())
    }
}

/// 单个限流策略
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub prefix: String,
    pub window: Duration,
    pub max_requests: u32,
}

impl RateLimitPolicy {
    pub fn new(prefix: impl Into<String>, window_ms: u64, max_requests: u32) -> Self {
        Self {
            prefix: prefix.into(),
            window: Duration::from_millis(window_ms),
            max_requests,
        }
    }

    pub fn window_ms(&self) -> u64 {
        self.window.as_millis() as u64
    }
}

/// 按用途划分的限流策略表
#[derive(Debug, Clone)]
pub struct RateLimitPolicies {
    pub api: RateLimitPolicy,
    pub login: RateLimitPolicy,
    pub upload: RateLimitPolicy,
}

impl Default for RateLimitPolicies {
    fn default() -> Self {
        Self {
            api: RateLimitPolicy::new("api", 60_000, 100),
            login: RateLimitPolicy::new("login", 900_000, 5),
            upload: RateLimitPolicy::new("upload", 3_600_000, 20),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub redis: RedisSettings,
    pub rate_limits: RateLimitPolicies,
    pub local_sweep_interval_secs: u64,
    pub cache_max_inflight_writes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: "::".to_string(),
            server_port: 3000,
            redis: RedisSettings::default(),
            rate_limits: RateLimitPolicies::default(),
            local_sweep_interval_secs: 60,
            cache_max_inflight_writes: 64,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let defaults = Config::default();
        let redis_defaults = defaults.redis;
        let policy_defaults = defaults.rate_limits;

        // REDIS_URL 优先，其次是 host/port/password 组合
        let redis_url = match non_empty_var("REDIS_URL") {
            Some(url) => Some(url),
            None => match non_empty_var("REDIS_HOST") {
                Some(host) => {
                    let port: u16 = env_or("REDIS_PORT", 6379)?;
                    let password = non_empty_var("REDIS_PASSWORD");
                    Some(redis_url_from_parts(&host, port, password.as_deref()))
                }
                None => None,
            },
        };

        let redis = RedisSettings {
            url: redis_url,
            connect_timeout: Duration::from_millis(env_or(
                "REDIS_CONNECT_TIMEOUT_MS",
                redis_defaults.connect_timeout.as_millis() as u64,
            )?),
            command_timeout: Duration::from_millis(env_or(
                "REDIS_COMMAND_TIMEOUT_MS",
                redis_defaults.command_timeout.as_millis() as u64,
            )?),
            max_reconnect_attempts: env_or(
                "REDIS_MAX_RECONNECT_ATTEMPTS",
                redis_defaults.max_reconnect_attempts,
            )?,
            reconnect_base_delay: Duration::from_millis(env_or(
                "REDIS_RECONNECT_BASE_DELAY_MS",
                redis_defaults.reconnect_base_delay.as_millis() as u64,
            )?),
            reconnect_max_delay: Duration::from_millis(env_or(
                "REDIS_RECONNECT_MAX_DELAY_MS",
                redis_defaults.reconnect_max_delay.as_millis() as u64,
            )?),
        };

        let rate_limits = RateLimitPolicies {
            api: policy_from_env("API", policy_defaults.api)?,
            login: policy_from_env("LOGIN", policy_defaults.login)?,
            upload: policy_from_env("UPLOAD", policy_defaults.upload)?,
        };

        Ok(Config {
            server_host: non_empty_var("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: env_or("SERVER_PORT", defaults.server_port)?,
            redis,
            rate_limits,
            local_sweep_interval_secs: env_or(
                "RATE_LIMIT_SWEEP_INTERVAL",
                defaults.local_sweep_interval_secs,
            )?,
            cache_max_inflight_writes: env_or(
                "CACHE_MAX_INFLIGHT_WRITES",
                defaults.cache_max_inflight_writes,
            )?,
        })
    }

    pub fn local_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.local_sweep_interval_secs.max(1))
    }
}

/// 读取 `{NAME}_RATE_LIMIT_WINDOW_MS` 与 `{NAME}_RATE_LIMIT_MAX_REQUESTS`
fn policy_from_env(name: &str, default: RateLimitPolicy) -> Result<RateLimitPolicy, ConfigError> {
    let window_ms = env_or(
        &format!("{}_RATE_LIMIT_WINDOW_MS", name),
        default.window_ms(),
    )?;
    let max_requests = env_or(
        &format!("{}_RATE_LIMIT_MAX_REQUESTS", name),
        default.max_requests,
    )?;
    Ok(RateLimitPolicy::new(default.prefix, window_ms, max_requests))
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// 变量缺失时使用默认值，存在但无法解析时报错
fn env_or<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match non_empty_var(name) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
            name: name.to_string(),
            value: raw,
        }),
        None => Ok(default),
    }
}

pub fn redis_url_from_parts(host: &str, port: u16, password: Option<&str>) -> String {
    match password {
        Some(password) => format!("redis://:{}@{}:{}", password, host, port),
        None => format!("redis://{}:{}", host, port),
    }
}

/// 隐藏连接串中的密码
pub fn redact_url(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let rest = &url[scheme_end + 3..];
    let Some(at) = rest.rfind('@') else {
        return url.to_string();
    };
    let userinfo = &rest[..at];
    let masked = match userinfo.find(':') {
        Some(colon) => format!("{}:***", &userinfo[..colon]),
        None => "***".to_string(),
    };
    format!("{}{}@{}", &url[..scheme_end + 3], masked, &rest[at + 1..])
}
