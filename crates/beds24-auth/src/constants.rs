//! Beds24 authentication endpoints and token lifetimes

/// Base URL of the Beds24 API v2
pub const DEFAULT_BASE_URL: &str = "https://beds24.com/api/v2";

/// Exchanges an invite code for an access + refresh token pair
pub const SETUP_PATH: &str = "/authentication/setup";

/// Mints a new access token from a refresh token
pub const TOKEN_PATH: &str = "/authentication/token";

/// Reports whether an access token is currently accepted
pub const DETAILS_PATH: &str = "/authentication/details";

/// Access token lifetime used when the server omits `expiresIn` (24h)
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: u64 = 86_400;

/// Refresh token validity window when none is configured
pub const DEFAULT_REFRESH_VALIDITY_DAYS: u32 = 30;

/// Per-request timeout budget for remote calls
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
