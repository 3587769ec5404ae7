mod rate_limit;

pub use rate_limit::{RateLimitGuard, RateLimiter, apply_rate_limit_headers, rate_limit};
