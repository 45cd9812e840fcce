pub mod network {
    pub const TIMEOUT_API_REQUEST_MS: u64 = 30_000;
    pub const USER_AGENT: &str = concat!("infolab-mcp/", env!("CARGO_PKG_VERSION"));
}

pub mod auth {
    pub const DEFAULT_TOKEN_TTL_SECS: u64 = 300;
    pub const EXPIRY_BUFFER_MS: u64 = 30_000;
    pub const DEFAULT_TOKEN_PATH: &str = "/mcp/auth/token";
    pub const DEFAULT_VALIDATE_PATH: &str = "/mcp/auth/validate";
    pub const AUTHENTICATION_FAILED: &str =
        "Authentication failed. Please check your credentials.";
}

pub mod env {
    pub const API_URL: &str = "INFOLAB_API_URL";
    pub const API_KEY: &str = "INFOLAB_API_KEY";
    pub const REQUEST_TIMEOUT_MS: &str = "INFOLAB_REQUEST_TIMEOUT_MS";
    pub const TOKEN_TTL_SECS: &str = "INFOLAB_TOKEN_TTL_SECS";
    pub const TOKEN_PATH: &str = "INFOLAB_TOKEN_PATH";
    pub const VALIDATE_PATH: &str = "INFOLAB_VALIDATE_PATH";
    pub const LOG_LEVEL: &str = "LOG_LEVEL";
}

pub mod protocols {
    pub const ALLOWED_HTTP: &[&str] = &["http", "https"];
}
