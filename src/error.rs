use thiserror::Error;

/// Errors surfaced by the HTTP side of the client.
///
/// WebSocket connection failures are deliberately NOT represented here:
/// the session manager logs them and feeds them into its bounded retry
/// loop instead of raising them to callers. Send-while-closed is reported
/// through a `bool` return for the same reason.
#[derive(Debug, Error)]
pub enum HarmonyError {
    /// A TCP-level connection could not be established.
    #[error("connection failed to {url}: {detail}")]
    Connect { url: String, detail: String },

    /// The backend replied with a non-2xx status. `detail` carries the
    /// human-readable message from the error body when one was present.
    #[error("HTTP {status} from {url}: {}", detail.as_deref().unwrap_or("no detail"))]
    Http {
        status: u16,
        url: String,
        detail: Option<String>,
    },

    /// Response body could not be parsed as the expected JSON structure.
    #[error("invalid response from {url}: {detail}")]
    Decode { url: String, detail: String },
}
