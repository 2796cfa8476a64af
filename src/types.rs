use serde::{Deserialize, Serialize};

/// Opaque ID types for type safety
pub type RoomCode = String;
pub type PlayerId = String;
pub type ConnId = String;

/// Minimum players required to start a round.
pub const MIN_PLAYERS: usize = 3;

/// Fixed avatar palette. A color may be held by at most one player per room.
pub const PLAYER_COLORS: &[&str] = &[
    "#e4572e", "#17bebb", "#ffc914", "#2e282a", "#76b041", "#6943ff", "#ff7aa2", "#3d6cb9",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Lobby,
    Round,
    Voting,
    Countdown,
    Elimination,
    Results,
}

/// Which side won a finished game.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    Players,
    Impostor,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlayerRole {
    Player,
    Impostor,
}

/// Label attached to periodic timer broadcasts so clients know which
/// countdown they are rendering.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimerKind {
    Turn,
    Voting,
    Countdown,
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// Normalized (lowercased) palette value, unique within the room.
    pub color: String,
    /// Transport handle; the state layer only uses it as an address.
    pub conn: ConnId,
}

/// One clue, immutable once recorded. At most one per alive player per round.
#[derive(Debug, Clone)]
pub struct Clue {
    pub player_id: PlayerId,
    pub text: String,
}

/// One vote, immutable once recorded. At most one per alive player per
/// voting phase.
#[derive(Debug, Clone)]
pub struct Vote {
    pub voter_id: PlayerId,
    pub target_id: PlayerId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameResult {
    pub winner: Winner,
    pub reason: String,
    pub winner_names: Vec<String>,
    pub impostor_name: String,
}

/// Deferred instruction queued during the elimination reveal, consumed
/// exactly once when the reveal delay elapses.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingAction {
    Finish { winner: Winner, reason: String },
    NextRound { use_countdown: bool },
}

/// Per-room timing knobs. Production defaults match the live game; tests
/// shrink them to keep paused-clock runs short.
#[derive(Debug, Clone, Copy)]
pub struct GameConfig {
    pub turn_ms: u64,
    pub countdown_ms: u64,
    pub vote_ms: u64,
    pub elimination_ms: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            turn_ms: 30_000,
            countdown_ms: 5_000,
            vote_ms: 60_000,
            elimination_ms: 2_500,
        }
    }
}

/// Wall-clock now in epoch milliseconds, the unit used for all deadlines
/// exposed to clients.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
