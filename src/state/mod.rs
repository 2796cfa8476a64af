pub mod engine;
pub mod room;
pub mod turn;
pub mod view;
pub mod vote;

pub use room::{Room, RoomTimers, TimerSlot};

use crate::protocol::ServerMessage;
use crate::types::*;
use rand::Rng;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};

/// Room codes use a 32-symbol alphabet without the easily-confused glyphs
/// (0/O, 1/I).
const CODE_CHARS: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 5;

fn generate_room_code() -> RoomCode {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_CHARS[rng.random_range(0..CODE_CHARS.len())] as char)
        .collect()
}

/// Room codes are typed by humans; accept them with whitespace and in any
/// case.
pub fn normalize_code(code: &str) -> RoomCode {
    code.trim().to_uppercase()
}

pub fn normalize_color(color: &str) -> String {
    color.trim().to_lowercase()
}

/// Messages produced while holding the rooms lock, delivered after it is
/// released.
pub type Outbox = Vec<(ConnId, ServerMessage)>;

/// Shared application state: the room registry plus the outbound side of
/// every live connection.
pub struct AppState {
    pub config: GameConfig,
    pub rooms: RwLock<HashMap<RoomCode, Room>>,
    pub connections: RwLock<HashMap<ConnId, mpsc::UnboundedSender<ServerMessage>>>,
}

impl AppState {
    pub fn new() -> Self {
        Self::with_config(GameConfig::default())
    }

    pub fn with_config(config: GameConfig) -> Self {
        Self {
            config,
            rooms: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Generate a code not currently in use. Collisions are unlikely with
    /// 32^5 combinations but retried rather than assumed away.
    pub(crate) fn unique_room_code(rooms: &HashMap<RoomCode, Room>) -> RoomCode {
        loop {
            let code = generate_room_code();
            if !rooms.contains_key(&code) {
                return code;
            }
        }
    }

    pub async fn register_conn(&self, conn: ConnId, tx: mpsc::UnboundedSender<ServerMessage>) {
        self.connections.write().await.insert(conn, tx);
    }

    pub async fn unregister_conn(&self, conn: &ConnId) {
        self.connections.write().await.remove(conn);
    }

    /// Fire-and-forget delivery to one connection. A closed or missing
    /// channel is ignored; the disconnect path cleans the player up.
    pub async fn send_to(&self, conn: &ConnId, msg: ServerMessage) {
        if let Some(tx) = self.connections.read().await.get(conn) {
            let _ = tx.send(msg);
        }
    }

    pub async fn flush(&self, outbox: Outbox) {
        if outbox.is_empty() {
            return;
        }
        let connections = self.connections.read().await;
        for (conn, msg) in outbox {
            if let Some(tx) = connections.get(&conn) {
                let _ = tx.send(msg);
            }
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_normalization() {
        assert_eq!(normalize_code("  abcde "), "ABCDE");
        assert_eq!(normalize_color(" #E4572E "), "#e4572e");
    }

    #[test]
    fn generated_codes_use_safe_alphabet() {
        assert_eq!(CODE_CHARS.len(), 32);
        for _ in 0..100 {
            let code = generate_room_code();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.bytes().all(|b| CODE_CHARS.contains(&b)));
            assert!(!code.bytes().any(|b| b"0O1I".contains(&b)));
        }
    }

    #[tokio::test]
    async fn unique_code_avoids_collisions() {
        let state = AppState::new();
        let rooms = state.rooms.read().await;
        // Empty registry: any generated code is unique.
        let code = AppState::unique_room_code(&rooms);
        assert!(!rooms.contains_key(&code));
    }
}
