//! Client constants
//!
//! Defaults shared by the configuration structs and the services that
//! consume them.

// HTTP
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api/v1";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

// Health gate
pub const DEFAULT_HEALTH_PATH: &str = "/health/";
pub const DEFAULT_HEALTH_CHECK_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_HEALTH_CHECK_TIMEOUT_MS: u64 = 15_000;
pub const HEALTHY_STATUS: &str = "healthy";

// Retry (GET)
pub const DEFAULT_RETRIES: u32 = 2;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;
pub const DEFAULT_RETRY_BACKOFF_FACTOR: f64 = 2.0;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 10_000;

// Auth
pub const DEFAULT_REFRESH_PATH: &str = "/auth/token/refresh/";
pub const DEFAULT_LOGIN_REDIRECT_DELAY_MS: u64 = 1_500;

// Realtime
pub const DEFAULT_WS_BASE_URL: &str = "ws://localhost:8000";
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_RECONNECT_BASE_DELAY_MS: u64 = 1_000;
pub const DEFAULT_RECONNECT_FACTOR: f64 = 2.0;
pub const DEFAULT_RECONNECT_MAX_DELAY_MS: u64 = 30_000;
pub const WS_TOKEN_QUERY_PARAM: &str = "token";

// Headers
pub const HEADER_AUTHORIZATION: &str = "authorization";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_ACCEPT: &str = "accept";
pub const HEADER_REQUEST_ID: &str = "x-request-id";
pub const HEADER_RETRY_AFTER: &str = "retry-after";
pub const CONTENT_TYPE_JSON: &str = "application/json";
