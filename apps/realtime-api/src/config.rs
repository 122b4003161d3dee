use std::time::Duration;

/// Realtime API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HS256 secret shared with the token issuer.
    pub jwt_secret: String,
    /// Base URL of the user directory. When unset, an in-memory directory is used.
    pub directory_url: Option<String>,
    /// Bearer key the CRUD layer presents on `/internal` routes.
    pub internal_api_key: String,
    /// Port the HTTP/WebSocket server binds to.
    pub port: u16,
    /// Allowed CORS origin (e.g. `http://localhost:5173`). Any origin when unset.
    pub client_url: Option<String>,
    /// How long a new socket may take to send its auth frame.
    pub handshake_timeout: Duration,
    /// Keep-alive ping period.
    pub ping_interval: Duration,
    /// A connection with no inbound frame for this long is closed.
    pub idle_timeout: Duration,
    /// Per-connection outbound queue size. Events beyond it are dropped.
    pub outbound_queue_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            jwt_secret: required_var("JWT_SECRET"),
            directory_url: optional_var("DIRECTORY_URL"),
            internal_api_key: required_var("INTERNAL_API_KEY"),
            port: parsed_var("PORT").unwrap_or(5000),
            client_url: optional_var("CLIENT_URL"),
            handshake_timeout: secs_var("HANDSHAKE_TIMEOUT_SECS", 10),
            ping_interval: secs_var("PING_INTERVAL_SECS", 25),
            idle_timeout: secs_var("IDLE_TIMEOUT_SECS", 60),
            outbound_queue_capacity: parsed_var("OUTBOUND_QUEUE_CAPACITY").unwrap_or(256),
        }
    }

    /// Configuration for tests and local tooling: fixed secrets, default timings.
    pub fn for_testing(jwt_secret: &str, internal_api_key: &str) -> Self {
        Self {
            jwt_secret: jwt_secret.to_string(),
            directory_url: None,
            internal_api_key: internal_api_key.to_string(),
            port: 0,
            client_url: None,
            handshake_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(25),
            idle_timeout: Duration::from_secs(60),
            outbound_queue_capacity: 256,
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// A positive number of seconds. Zero or unparseable values use `default`.
fn secs_var(name: &str, default: u64) -> Duration {
    Duration::from_secs(parsed_var(name).filter(|&secs| secs > 0).unwrap_or(default))
}
