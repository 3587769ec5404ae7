pub mod error_codes {
    pub const SUCCESS: i32 = 0;
    pub const RATE_LIMIT: i32 = 1005;
}
