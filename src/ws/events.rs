use serde::{Deserialize, Serialize};

/// Events exchanged over the real-time channel. The relay never touches the
/// database; message persistence goes through the REST API and this channel
/// is a best-effort side band.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChatEvent {
    JoinRoom {
        room: String,
        user_id: String,
    },
    SendMessage {
        room: String,
        message: serde_json::Value,
    },
    ReceiveMessage {
        room: String,
        message: serde_json::Value,
    },
    TypingStart {
        room: String,
        user_id: String,
    },
    TypingStop {
        room: String,
        user_id: String,
    },
    Error {
        message: String,
    },
}
