use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;

struct Session {
    user_id: Option<String>,
    room: Option<String>,
    tx: mpsc::UnboundedSender<String>,
}

/// In-process registry of live connections. Process-local by design: state
/// is lost on restart, and a multi-instance deployment would need an
/// external presence store instead.
#[derive(Default)]
pub struct RelayState {
    sessions: DashMap<u64, Session>,
    next_id: AtomicU64,
}

impl RelayState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection and hand back its id.
    pub fn register(&self, tx: mpsc::UnboundedSender<String>) -> u64 {
        let conn_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sessions.insert(
            conn_id,
            Session {
                user_id: None,
                room: None,
                tx,
            },
        );
        conn_id
    }

    pub fn unregister(&self, conn_id: u64) {
        self.sessions.remove(&conn_id);
    }

    /// Bind a connection to a user and a room. A connection is in at most
    /// one room; joining again replaces the previous room.
    pub fn join_room(&self, conn_id: u64, room: String, user_id: String) {
        if let Some(mut session) = self.sessions.get_mut(&conn_id) {
            session.room = Some(room);
            session.user_id = Some(user_id);
        }
    }

    pub fn room_of(&self, conn_id: u64) -> Option<String> {
        self.sessions
            .get(&conn_id)
            .and_then(|session| session.room.clone())
    }

    /// Send to every connection in the room except the originating one.
    /// Closed channels are skipped; delivery is best effort.
    pub fn broadcast_to_room(&self, room: &str, exclude_conn: u64, text: &str) {
        for entry in self.sessions.iter() {
            if *entry.key() == exclude_conn {
                continue;
            }
            if entry.value().room.as_deref() == Some(room) {
                let _ = entry.value().tx.send(text.to_string());
            }
        }
    }

    pub fn connection_count(&self) -> usize {
        self.sessions.len()
    }
}
