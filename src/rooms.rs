//! Typed fronts over [`SessionManager`] for the two WebSocket surfaces:
//! conflict-mediation rooms and resolution chats.

use crate::protocol::{ChatMessage, ChatParticipant, RoomCommand, RoomEvent};
use crate::session::{SessionManager, Subscription};
use chrono::{SecondsFormat, Utc};
use tracing::warn;

/// Generate a throwaway participant id, e.g. `user_k3jf9a`.
pub fn generate_user_id() -> String {
    use rand::Rng;
    const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
        .collect();
    format!("user_{suffix}")
}

/// Current time as an RFC 3339 / ISO 8601 string with millisecond
/// precision, matching what the backend stamps on its own events.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ---------------------------------------------------------------------------
// MediationRoom
// ---------------------------------------------------------------------------

/// A conflict-mediation room: join by room id and display name, exchange
/// `message` / `request_mediation` commands, receive typed [`RoomEvent`]s.
pub struct MediationRoom {
    session: SessionManager,
    url: String,
    user_id: String,
    user_name: String,
}

impl MediationRoom {
    /// Build a room front. `ws_base` is the mediation WebSocket base URL
    /// (e.g. `wss://host/ws/conflict`); the connection address becomes
    /// `{ws_base}/{room_id}/{user_id}/{encoded_user_name}` with a freshly
    /// generated user id.
    pub fn new(session: SessionManager, ws_base: &str, room_id: &str, user_name: &str) -> Self {
        let user_id = generate_user_id();
        let url = format!(
            "{}/{}/{}/{}",
            ws_base,
            room_id,
            user_id,
            urlencoding::encode(user_name)
        );
        Self {
            session,
            url,
            user_id,
            user_name: user_name.to_string(),
        }
    }

    /// The full connection address for this room and participant.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The generated participant id for this room front.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    /// Open the room connection. Resolves `true` once the socket is open;
    /// failures are logged by the session manager and retried there.
    pub async fn join(&self) -> bool {
        self.session.connect(self.url.clone()).await
    }

    /// Send a chat message into the room. Returns whether the send was
    /// attempted (`false` while disconnected).
    pub fn send_message(&self, content: &str) -> bool {
        self.session.send(&RoomCommand::Message {
            content: content.to_string(),
        })
    }

    /// Ask the AI mediator to step in.
    pub fn request_mediation(&self) -> bool {
        self.session.send(&RoomCommand::RequestMediation)
    }

    /// Register a typed event callback. Frames that don't parse as a
    /// [`RoomEvent`] are logged and skipped.
    pub fn on_event<F>(&self, callback: F) -> Subscription
    where
        F: Fn(RoomEvent) + Send + Sync + 'static,
    {
        self.session.add_listener(move |value| {
            match serde_json::from_value::<RoomEvent>(value.clone()) {
                Ok(event) => callback(event),
                Err(err) => warn!(error = %err, "discarding unparseable room event"),
            }
        })
    }

    /// Leave the room. The session keeps its listeners and address; no
    /// automatic reconnect follows.
    pub fn leave(&self) {
        self.session.disconnect();
    }

    pub fn is_joined(&self) -> bool {
        self.session.is_connected()
    }
}

// ---------------------------------------------------------------------------
// ResolutionChat
// ---------------------------------------------------------------------------

/// A resolution-process chat: connects to `{ws_base}/{resolution_id}` and
/// exchanges full [`ChatMessage`] objects. Outgoing messages are stamped
/// with a fresh id and timestamp on behalf of the local participant.
pub struct ResolutionChat {
    session: SessionManager,
    url: String,
    local: ChatParticipant,
}

impl ResolutionChat {
    pub fn new(
        session: SessionManager,
        ws_base: &str,
        resolution_id: &str,
        local: ChatParticipant,
    ) -> Self {
        let url = format!("{ws_base}/{resolution_id}");
        Self {
            session,
            url,
            local,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn local_participant(&self) -> &ChatParticipant {
        &self.local
    }

    /// Open the chat connection.
    pub async fn open(&self) -> bool {
        self.session.connect(self.url.clone()).await
    }

    /// Send `text` as the local participant. The message id is a v4 UUID
    /// and the timestamp is stamped at send time. Returns the stamped
    /// message when the send was attempted, `None` while disconnected.
    pub fn send(&self, text: &str) -> Option<ChatMessage> {
        let message = ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            sender: self.local.clone(),
            text: text.to_string(),
            timestamp: now_iso(),
        };
        if self.session.send(&message) {
            Some(message)
        } else {
            None
        }
    }

    /// Register a typed message callback. Non-message frames are logged
    /// and skipped.
    pub fn on_message<F>(&self, callback: F) -> Subscription
    where
        F: Fn(ChatMessage) + Send + Sync + 'static,
    {
        self.session.add_listener(move |value| {
            match serde_json::from_value::<ChatMessage>(value.clone()) {
                Ok(message) => callback(message),
                Err(err) => warn!(error = %err, "discarding unparseable chat message"),
            }
        })
    }

    /// Close the chat connection.
    pub fn close(&self) {
        self.session.disconnect();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
