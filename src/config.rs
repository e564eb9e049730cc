use std::time::Duration;

/// Endpoint configuration for the client.
///
/// Backend addresses are plain values supplied by whoever constructs the
/// config — there is no environment-variable or config-file lookup here.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the meditation HTTP API (e.g. `https://host`).
    /// The client POSTs to `{meditation_api_url}/chat/`.
    pub meditation_api_url: String,
    /// Base WebSocket URL for conflict-mediation rooms
    /// (e.g. `wss://host/ws/conflict`). Room, user id and encoded user
    /// name are appended as path segments.
    pub mediation_ws_url: String,
    /// Base WebSocket URL for resolution chats (e.g. `ws://host/ws`).
    /// The resolution id is appended as a path segment.
    pub resolution_ws_url: String,
    /// TCP connection timeout for HTTP requests.
    pub connect_timeout: Duration,
    /// Per-request read timeout for HTTP requests.
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// Create a config with default timeouts.
    ///
    /// - connect_timeout: 3 s
    /// - request_timeout: 30 s
    pub fn new(
        meditation_api_url: impl Into<String>,
        mediation_ws_url: impl Into<String>,
        resolution_ws_url: impl Into<String>,
    ) -> Self {
        Self {
            meditation_api_url: trim_trailing_slash(meditation_api_url.into()),
            mediation_ws_url: trim_trailing_slash(mediation_ws_url.into()),
            resolution_ws_url: trim_trailing_slash(resolution_ws_url.into()),
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Override the TCP connect timeout (default 3 s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Override the per-request read timeout (default 30 s).
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Base URLs are joined with `/` everywhere; a trailing slash on the
/// configured value would produce `//` in paths.
fn trim_trailing_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}
