//! Wire types for everything the backend speaks: mediation-room events,
//! resolution-chat messages, and the meditation HTTP chat endpoint.
//!
//! All WebSocket traffic is UTF-8 JSON text frames carrying at least a
//! `type` field; the HTTP endpoint exchanges plain JSON bodies.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Mediation room (conflict resolution) wire types
// ---------------------------------------------------------------------------

/// Who produced an inbound room event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    User,
    Ai,
    System,
    /// Forward compatibility: unrecognized `type` values deserialize here
    /// instead of failing the whole frame.
    #[serde(other)]
    Unknown,
}

/// An inbound event from a mediation room.
///
/// The server is loose about which fields accompany which kinds — system
/// notices may carry only `type` and `content` — so everything but those
/// two is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

/// Sender id the backend uses for mediator responses.
pub const AI_MEDIATOR_ID: &str = "ai_mediator";

/// An outbound command to a mediation room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomCommand {
    /// A chat message from this participant.
    Message { content: String },
    /// Ask the AI mediator to step into the conversation.
    RequestMediation,
}

// ---------------------------------------------------------------------------
// Resolution chat wire types
// ---------------------------------------------------------------------------

/// A person attached to a resolution process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatParticipant {
    pub id: String,
    pub name: String,
}

/// A full chat message as exchanged over a resolution socket. Outgoing
/// messages are stamped client-side with a fresh id and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub sender: ChatParticipant,
    pub text: String,
    pub timestamp: String,
}

/// Lifecycle state of a resolution process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStatus {
    Ongoing,
    Resolved,
    Pending,
}

/// Summary of one resolution process, as listed by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub id: String,
    pub title: String,
    pub status: ResolutionStatus,
    pub participants: Vec<ChatParticipant>,
    pub description: String,
}

// ---------------------------------------------------------------------------
// Meditation HTTP chat types
// ---------------------------------------------------------------------------

/// Conversation role in the meditation chat history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChatRole {
    User,
    Chatbot,
}

/// One prior turn of the meditation conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: ChatRole,
    pub message: String,
}

/// Body of `POST {base}/chat/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub user_message: String,
    pub chat_history: Vec<HistoryTurn>,
}

/// Successful response body from the meditation endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

/// Error body the backend sends on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub detail: String,
}
