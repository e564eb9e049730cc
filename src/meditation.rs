//! HTTP client for the guided-meditation chat endpoint.
//!
//! Keeps a rolling conversation log (capped at [`CHAT_LOG_CAP`] entries)
//! and converts it to the backend's USER/CHATBOT history format on every
//! request.

use crate::config::ClientConfig;
use crate::error::HarmonyError;
use crate::protocol::{ApiErrorBody, ChatRequest, ChatResponse, ChatRole, HistoryTurn};
use crate::rooms::now_iso;
use tracing::{error, info};

/// Upper bound on retained conversation entries; older entries roll off.
pub const CHAT_LOG_CAP: usize = 50;

/// Opening line seeded into every fresh conversation.
pub const GREETING: &str = "Hello!  Come, Let's have a chat";

/// Shown in the log when the backend could not be reached or errored.
pub const FALLBACK_REPLY: &str = "Sorry, I couldn't process your request. Please try again.";

/// One entry of the meditation conversation log.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub text: String,
    pub timestamp: String,
    pub from_ai: bool,
}

/// Client for `POST {base}/chat/`.
pub struct MeditationClient {
    http: reqwest::Client,
    chat_url: String,
    log: Vec<LogEntry>,
}

impl MeditationClient {
    /// Build a client from the configured endpoint and timeouts. The
    /// conversation log starts with the AI greeting.
    pub fn new(config: &ClientConfig) -> Self {
        // reqwest::Client::builder() can fail in extreme environments, but
        // unwrap_or_default() falls back to a default client instead of
        // panicking.
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_default();
        let log = vec![LogEntry {
            text: GREETING.to_string(),
            timestamp: now_iso(),
            from_ai: true,
        }];
        Self {
            http,
            chat_url: format!("{}/chat/", config.meditation_api_url),
            log,
        }
    }

    /// Send one user message and return the AI response text.
    ///
    /// The chat history posted alongside is the log as it stood before
    /// this message — the message itself travels in `user_message`. On
    /// success the response is appended to the log; on failure a canned
    /// apology entry is appended and the descriptive error is returned.
    pub async fn send(&mut self, user_message: &str) -> Result<String, HarmonyError> {
        let request = ChatRequest {
            user_message: user_message.to_string(),
            chat_history: self.history(),
        };
        self.push(LogEntry {
            text: user_message.to_string(),
            timestamp: now_iso(),
            from_ai: false,
        });

        match self.post(&request).await {
            Ok(text) => {
                info!(chars = text.len(), "meditation response received");
                self.push(LogEntry {
                    text: text.clone(),
                    timestamp: now_iso(),
                    from_ai: true,
                });
                Ok(text)
            }
            Err(err) => {
                error!(error = %err, "meditation request failed");
                self.push(LogEntry {
                    text: FALLBACK_REPLY.to_string(),
                    timestamp: now_iso(),
                    from_ai: true,
                });
                Err(err)
            }
        }
    }

    async fn post(&self, request: &ChatRequest) -> Result<String, HarmonyError> {
        let resp = self
            .http
            .post(&self.chat_url)
            .json(request)
            .send()
            .await
            .map_err(|e| HarmonyError::Connect {
                url: self.chat_url.clone(),
                detail: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            // The backend sends {"detail": "..."} on errors; fall back to
            // the bare status when the body isn't that shape.
            let detail = resp.json::<ApiErrorBody>().await.ok().map(|b| b.detail);
            return Err(HarmonyError::Http {
                status: status.as_u16(),
                url: self.chat_url.clone(),
                detail,
            });
        }

        let body: ChatResponse = resp.json().await.map_err(|e| HarmonyError::Decode {
            url: self.chat_url.clone(),
            detail: e.to_string(),
        })?;
        Ok(body.response)
    }

    /// Convert the current log to the wire history format, oldest first.
    fn history(&self) -> Vec<HistoryTurn> {
        self.log
            .iter()
            .map(|entry| HistoryTurn {
                role: if entry.from_ai {
                    ChatRole::Chatbot
                } else {
                    ChatRole::User
                },
                message: entry.text.clone(),
            })
            .collect()
    }

    fn push(&mut self, entry: LogEntry) {
        self.log.push(entry);
        if self.log.len() > CHAT_LOG_CAP {
            let overflow = self.log.len() - CHAT_LOG_CAP;
            self.log.drain(..overflow);
        }
    }

    /// The retained conversation, oldest first.
    pub fn chat_log(&self) -> &[LogEntry] {
        &self.log
    }

    /// The most recent entry, if any.
    pub fn latest(&self) -> Option<&LogEntry> {
        self.log.last()
    }

    /// The endpoint this client posts to.
    pub fn chat_url(&self) -> &str {
        &self.chat_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn make_client() -> MeditationClient {
        let config = ClientConfig::new(
            "https://api.example.com",
            "wss://host/ws/conflict",
            "ws://host/ws",
        )
        .connect_timeout(Duration::from_millis(200))
        .request_timeout(Duration::from_millis(500));
        MeditationClient::new(&config)
    }

    // -- construction --------------------------------------------------------

    #[test]
    fn test_new_seeds_greeting() {
        let client = make_client();
        assert_eq!(client.chat_log().len(), 1);
        let first = &client.chat_log()[0];
        assert!(first.from_ai);
        assert_eq!(first.text, GREETING);
    }

    #[test]
    fn test_chat_url_has_trailing_path() {
        let client = make_client();
        assert_eq!(client.chat_url(), "https://api.example.com/chat/");
    }

    // -- history conversion --------------------------------------------------

    #[test]
    fn test_history_maps_roles() {
        let mut client = make_client();
        client.push(LogEntry {
            text: "I feel stressed".to_string(),
            timestamp: now_iso(),
            from_ai: false,
        });
        client.push(LogEntry {
            text: "Let's breathe together.".to_string(),
            timestamp: now_iso(),
            from_ai: true,
        });
        let history = client.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].role, ChatRole::Chatbot);
        assert_eq!(history[1].role, ChatRole::User);
        assert_eq!(history[1].message, "I feel stressed");
        assert_eq!(history[2].role, ChatRole::Chatbot);
    }

    #[test]
    fn test_history_preserves_order() {
        let mut client = make_client();
        for i in 0..4 {
            client.push(LogEntry {
                text: format!("turn {i}"),
                timestamp: now_iso(),
                from_ai: i % 2 == 1,
            });
        }
        let history = client.history();
        assert_eq!(history[1].message, "turn 0");
        assert_eq!(history[4].message, "turn 3");
    }

    // -- log cap -------------------------------------------------------------

    #[test]
    fn test_log_never_exceeds_cap() {
        let mut client = make_client();
        for i in 0..(CHAT_LOG_CAP * 2) {
            client.push(LogEntry {
                text: format!("entry {i}"),
                timestamp: now_iso(),
                from_ai: false,
            });
        }
        assert_eq!(client.chat_log().len(), CHAT_LOG_CAP);
    }

    #[test]
    fn test_log_cap_keeps_most_recent_entries() {
        let mut client = make_client();
        for i in 0..(CHAT_LOG_CAP + 10) {
            client.push(LogEntry {
                text: format!("entry {i}"),
                timestamp: now_iso(),
                from_ai: false,
            });
        }
        let last = client.latest().unwrap();
        assert_eq!(last.text, format!("entry {}", CHAT_LOG_CAP + 9));
        // The greeting and the oldest entries rolled off.
        assert_ne!(client.chat_log()[0].text, GREETING);
    }

    #[test]
    fn test_latest_returns_newest_entry() {
        let mut client = make_client();
        client.push(LogEntry {
            text: "newest".to_string(),
            timestamp: now_iso(),
            from_ai: false,
        });
        assert_eq!(client.latest().unwrap().text, "newest");
    }

    // -- failure path --------------------------------------------------------

    #[tokio::test]
    async fn test_send_failure_appends_user_message_and_fallback() {
        // Nothing listens on this port; the request fails at connect.
        let config = ClientConfig::new(
            "http://127.0.0.1:9",
            "wss://host/ws/conflict",
            "ws://host/ws",
        )
        .connect_timeout(Duration::from_millis(200))
        .request_timeout(Duration::from_millis(500));
        let mut client = MeditationClient::new(&config);

        let result = client.send("hello").await;
        assert!(result.is_err());

        let log = client.chat_log();
        assert_eq!(log.len(), 3);
        assert_eq!(log[1].text, "hello");
        assert!(!log[1].from_ai);
        assert_eq!(log[2].text, FALLBACK_REPLY);
        assert!(log[2].from_ai);
    }

    #[tokio::test]
    async fn test_send_failure_error_is_connect_variant() {
        let config = ClientConfig::new(
            "http://127.0.0.1:9",
            "wss://host/ws/conflict",
            "ws://host/ws",
        )
        .connect_timeout(Duration::from_millis(200))
        .request_timeout(Duration::from_millis(500));
        let mut client = MeditationClient::new(&config);

        match client.send("hello").await {
            Err(HarmonyError::Connect { url, .. }) => {
                assert_eq!(url, "http://127.0.0.1:9/chat/");
            }
            other => panic!("expected Connect error, got {other:?}"),
        }
    }
}
