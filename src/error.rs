use std::time::Duration;

use axum::Json;
use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::result::ApiResult;
use crate::utils::error_codes;

/// 缓存与计数后端错误，只在子系统内部流转，不会传给调用方
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis is not configured or currently unavailable")]
    Unavailable,

    #[error("redis call timed out after {0:?}")]
    Timeout(Duration),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("cache payload (de)serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    /// 是否属于连接层故障（需要切换到降级模式）
    pub fn is_connectivity(&self) -> bool {
        match self {
            CacheError::Unavailable | CacheError::Timeout(_) => true,
            CacheError::Redis(e) => {
                e.is_io_error()
                    || e.is_connection_dropped()
                    || e.is_connection_refusal()
                    || e.is_timeout()
            }
            CacheError::Serialization(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for environment variable {name}")]
    Invalid { name: String, value: String },
}

#[derive(Debug)]
pub enum AppError {
    RateLimited { retry_after_secs: u64 },
}

#[derive(Serialize)]
struct RetryHint {
    retry_after: u64,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::RateLimited { retry_after_secs } => {
                let body = Json(ApiResult::failure(
                    error_codes::RATE_LIMIT,
                    &format!("请求过于频繁，请在{}秒后重试", retry_after_secs),
                    RetryHint {
                        retry_after: retry_after_secs,
                    },
                ));
                let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
                response
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_classification() {
        assert!(CacheError::Unavailable.is_connectivity());
        assert!(CacheError::Timeout(Duration::from_millis(5)).is_connectivity());

        let decode = serde_json::from_str::<u32>("not json").unwrap_err();
        assert!(!CacheError::Serialization(decode).is_connectivity());

        let refused = redis::RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(CacheError::Redis(refused).is_connectivity());

        let script = redis::RedisError::from((redis::ErrorKind::ResponseError, "WRONGTYPE"));
        assert!(!CacheError::Redis(script).is_connectivity());
    }

    #[test]
    fn test_rate_limited_response() {
        let response = AppError::RateLimited {
            retry_after_secs: 42,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }
}
