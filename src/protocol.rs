//! Wire protocol: a closed set of tagged client/server message variants plus
//! the per-viewer state view structs. Everything that crosses the socket is
//! defined here.

use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    CreateRoom {
        name: String,
        color: String,
    },
    JoinRoom {
        code: String,
        name: String,
        color: String,
    },
    /// Host-only.
    StartRound {
        code: String,
    },
    SubmitClue {
        code: String,
        player_id: PlayerId,
        clue: String,
    },
    SubmitVote {
        code: String,
        player_id: PlayerId,
        target_id: PlayerId,
    },
    /// Acknowledged with `ack`.
    LeaveRoom {
        code: String,
    },
    /// Acknowledged with `ack`.
    PlayAgain {
        code: String,
        player_id: PlayerId,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent to the creating/joining connection only.
    RoomJoined {
        code: RoomCode,
        player_id: PlayerId,
        state: RoomView,
    },
    /// Per-viewer projection, re-sent on every state-affecting event.
    RoomState {
        state: RoomView,
    },
    /// Sent once per new secret, to every player in the room.
    Role {
        role: PlayerRole,
    },
    /// Sent once per new secret, to crew only.
    SecretWord {
        word: String,
    },
    /// Sent once per new secret, to the impostor only.
    Category {
        category: String,
    },
    /// ≈1 Hz during timed phases.
    TimerUpdate {
        remaining_ms: i64,
        kind: TimerKind,
    },
    /// Sent to the offending connection only.
    ErrorMessage {
        message: String,
    },
    /// Acknowledgment of a voluntary departure.
    LeftRoom,
    /// Broadcast when the room is torn down.
    RoomClosed {
        message: String,
    },
    /// Structured response to acknowledged actions.
    Ack {
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

/// What one viewer is allowed to see of a room. Computed fresh per viewer by
/// the projector; never contains another viewer's secrets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomView {
    pub code: RoomCode,
    pub phase: Phase,
    pub host_id: PlayerId,
    pub replay_pending: bool,
    pub players: Vec<PlayerView>,
    pub player_count: usize,
    pub clues: Vec<ClueView>,
    pub votes: Vec<VoteView>,
    pub result: Option<GameResult>,
    pub turn_ends_at: Option<i64>,
    pub current_turn_player_id: Option<PlayerId>,
    pub vote_ends_at: Option<i64>,
    pub countdown_ends_at: Option<i64>,
    pub elimination_message: Option<String>,
    pub eliminated_player_id: Option<PlayerId>,
    /// Only present for the impostor.
    pub category: Option<String>,
    /// Only present once the game is in results.
    pub secret_word: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub color: String,
    /// Revealed only in the results phase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<PlayerRole>,
    /// Only meaningful while a replay-consensus window is open.
    pub ready: bool,
    pub alive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClueView {
    pub player_id: PlayerId,
    pub player_name: String,
    pub player_color: Option<String>,
    pub clue: String,
}

/// During voting only the voter identity is exposed; the full voter→target
/// pairing appears once the game reaches results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voter_id: Option<PlayerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voter_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
}
