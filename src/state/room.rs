//! One room: roster, game fields, and the live timer set.

use super::{normalize_code, normalize_color, view, AppState, Outbox};
use crate::error::GameError;
use crate::protocol::ServerMessage;
use crate::types::*;
use rand::seq::IndexedRandom;
use std::collections::HashSet;
use tokio::task::JoinHandle;

/// Timer classes a room may hold. Each timed phase owns a ticker and a
/// deadline; the elimination reveal only has a deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerSlot {
    TurnTicker,
    TurnDeadline,
    VoteTicker,
    VoteDeadline,
    CountdownTicker,
    CountdownDeadline,
    EliminationDeadline,
}

pub const ALL_TIMER_SLOTS: &[TimerSlot] = &[
    TimerSlot::TurnTicker,
    TimerSlot::TurnDeadline,
    TimerSlot::VoteTicker,
    TimerSlot::VoteDeadline,
    TimerSlot::CountdownTicker,
    TimerSlot::CountdownDeadline,
    TimerSlot::EliminationDeadline,
];

/// The active timers of one room, owned exclusively by the orchestrator.
///
/// Every phase entry calls [`clear`](Self::clear) before registering new
/// tasks, which enforces the at-most-one-timer-per-class invariant
/// mechanically. Clearing bumps the epoch; a task that fires with a stale
/// epoch is a no-op, so a timer that races its own cancellation cannot
/// advance the room twice.
#[derive(Debug, Default)]
pub struct RoomTimers {
    epoch: u64,
    tasks: Vec<(TimerSlot, JoinHandle<()>)>,
}

impl RoomTimers {
    /// Cancel every scheduled task and invalidate their epoch.
    pub fn clear(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        for (_, task) in self.tasks.drain(..) {
            task.abort();
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn register(&mut self, slot: TimerSlot, handle: JoinHandle<()>) {
        debug_assert!(
            !self.tasks.iter().any(|(s, _)| *s == slot),
            "second {slot:?} timer registered without a clear"
        );
        self.tasks.push((slot, handle));
    }

    pub fn registered(&self, slot: TimerSlot) -> usize {
        self.tasks.iter().filter(|(s, _)| *s == slot).count()
    }

    /// Invariant check used by tests after every action.
    pub fn at_most_one_per_slot(&self) -> bool {
        ALL_TIMER_SLOTS.iter().all(|s| self.registered(*s) <= 1)
    }
}

impl Drop for RoomTimers {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain(..) {
            task.abort();
        }
    }
}

/// One isolated game instance addressed by a short code.
pub struct Room {
    pub code: RoomCode,
    pub host_id: PlayerId,
    pub phase: Phase,
    /// Insertion order = join order. Display order only; turn order is the
    /// separate shuffled `turn_order`.
    pub players: Vec<Player>,
    pub impostor_id: Option<PlayerId>,
    pub secret_word: Option<String>,
    pub category: Option<String>,
    pub alive_ids: HashSet<PlayerId>,
    pub turn_order: Vec<PlayerId>,
    pub turn_index: usize,
    pub current_turn_player_id: Option<PlayerId>,
    pub clues: Vec<Clue>,
    pub votes: Vec<Vote>,
    pub ready_ids: HashSet<PlayerId>,
    pub replay_pending: bool,
    pub result: Option<GameResult>,
    pub pending_action: Option<PendingAction>,
    pub round_number: u32,
    pub countdown_used: bool,
    pub turn_ends_at: Option<i64>,
    pub vote_ends_at: Option<i64>,
    pub countdown_ends_at: Option<i64>,
    pub elimination_message: Option<String>,
    pub eliminated_player_id: Option<PlayerId>,
    pub timers: RoomTimers,
}

impl Room {
    pub fn new(code: RoomCode, host: Player) -> Self {
        Self {
            code,
            host_id: host.id.clone(),
            phase: Phase::Lobby,
            players: vec![host],
            impostor_id: None,
            secret_word: None,
            category: None,
            alive_ids: HashSet::new(),
            turn_order: Vec::new(),
            turn_index: 0,
            current_turn_player_id: None,
            clues: Vec::new(),
            votes: Vec::new(),
            ready_ids: HashSet::new(),
            replay_pending: false,
            result: None,
            pending_action: None,
            round_number: 0,
            countdown_used: false,
            turn_ends_at: None,
            vote_ends_at: None,
            countdown_ends_at: None,
            elimination_message: None,
            eliminated_player_id: None,
            timers: RoomTimers::default(),
        }
    }

    pub fn find_player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| &p.id == id)
    }

    pub fn alive_players(&self) -> Vec<&Player> {
        self.players
            .iter()
            .filter(|p| self.alive_ids.contains(&p.id))
            .collect()
    }

    pub fn color_taken(&self, normalized: &str) -> bool {
        self.players.iter().any(|p| p.color == normalized)
    }

    pub fn all_ready(&self) -> bool {
        !self.players.is_empty() && self.players.iter().all(|p| self.ready_ids.contains(&p.id))
    }

    /// Policy: a mid-round impostor departure re-rolls the impostor among
    /// the remaining players so the round stays playable. Swap the body of
    /// this function to force a round restart instead.
    pub fn reassign_impostor(&mut self) {
        let mut rng = rand::rng();
        self.impostor_id = self.players.choose(&mut rng).map(|p| p.id.clone());
    }
}

pub(crate) enum RemoveOutcome {
    NotMember,
    Removed,
    Destroyed,
}

impl AppState {
    /// Create a room with the caller as host. Replies with `room_joined` on
    /// success.
    pub async fn create_room(
        &self,
        conn: &ConnId,
        name: &str,
        color: &str,
    ) -> Result<ServerMessage, GameError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GameError::InvalidName);
        }
        let color = normalize_color(color);
        if !PLAYER_COLORS.contains(&color.as_str()) {
            return Err(GameError::InvalidColor);
        }

        let mut rooms = self.rooms.write().await;
        let code = Self::unique_room_code(&rooms);
        let player = Player {
            id: ulid::Ulid::new().to_string(),
            name: name.to_string(),
            color,
            conn: conn.clone(),
        };
        let player_id = player.id.clone();
        let room = Room::new(code.clone(), player);
        let state = view::project(&room, &player_id);
        rooms.insert(code.clone(), room);

        tracing::info!(%code, %player_id, "room created");
        Ok(ServerMessage::RoomJoined {
            code,
            player_id,
            state,
        })
    }

    /// Join an existing room. Allowed in the lobby, or while a
    /// replay-consensus window is open (the joiner is then auto-readied so
    /// they cannot stall the host).
    pub async fn join_room(
        &self,
        conn: &ConnId,
        code: &str,
        name: &str,
        color: &str,
    ) -> Result<ServerMessage, GameError> {
        let code = normalize_code(code);
        let name = name.trim();
        let color = normalize_color(color);

        let mut outbox = Outbox::new();
        let reply = {
            let mut rooms = self.rooms.write().await;
            let room = rooms.get_mut(&code).ok_or(GameError::RoomNotFound)?;

            if room.phase != Phase::Lobby && !room.replay_pending {
                return Err(GameError::GameInProgress);
            }
            if name.is_empty() {
                return Err(GameError::InvalidName);
            }
            if !PLAYER_COLORS.contains(&color.as_str()) {
                return Err(GameError::InvalidColor);
            }
            if room.color_taken(&color) {
                return Err(GameError::ColorTaken);
            }

            let player = Player {
                id: ulid::Ulid::new().to_string(),
                name: name.to_string(),
                color,
                conn: conn.clone(),
            };
            let player_id = player.id.clone();
            if room.replay_pending {
                room.ready_ids.insert(player_id.clone());
            }
            room.alive_ids.insert(player_id.clone());
            room.players.push(player);

            tracing::info!(%code, %player_id, "player joined");
            view::broadcast_state(room, &mut outbox);
            ServerMessage::RoomJoined {
                code: code.clone(),
                player_id: player_id.clone(),
                state: view::project(room, &player_id),
            }
        };
        self.flush(outbox).await;
        Ok(reply)
    }

    /// Voluntary departure; acknowledged. Disconnection takes the same path
    /// through [`handle_disconnect`](Self::handle_disconnect).
    pub async fn leave_room(&self, conn: &ConnId, code: &str) -> ServerMessage {
        let code = normalize_code(code);
        let mut outbox = Outbox::new();
        let ack = {
            let mut rooms = self.rooms.write().await;
            match rooms.get_mut(&code) {
                None => ServerMessage::Ack {
                    ok: false,
                    message: Some(GameError::RoomNotFound.to_string()),
                },
                Some(room) => {
                    let outcome = Self::remove_conn_player(room, conn, &mut outbox);
                    if matches!(outcome, RemoveOutcome::Destroyed) {
                        rooms.remove(&code);
                        tracing::info!(%code, "room destroyed");
                    }
                    outbox.push((conn.clone(), ServerMessage::LeftRoom));
                    ServerMessage::Ack {
                        ok: true,
                        message: None,
                    }
                }
            }
        };
        self.flush(outbox).await;
        ack
    }

    /// A dropped connection is a permanent departure for the player it
    /// represented.
    pub async fn handle_disconnect(&self, conn: &ConnId) {
        let mut outbox = Outbox::new();
        {
            let mut rooms = self.rooms.write().await;
            let mut destroyed = None;
            for (code, room) in rooms.iter_mut() {
                match Self::remove_conn_player(room, conn, &mut outbox) {
                    RemoveOutcome::NotMember => continue,
                    RemoveOutcome::Removed => break,
                    RemoveOutcome::Destroyed => {
                        destroyed = Some(code.clone());
                        break;
                    }
                }
            }
            if let Some(code) = destroyed {
                rooms.remove(&code);
                tracing::info!(%code, "room destroyed");
            }
        }
        self.flush(outbox).await;
    }

    /// Mark a player ready for a rematch and open the replay window.
    pub async fn play_again(&self, conn: &ConnId, code: &str, player_id: &PlayerId) -> ServerMessage {
        let code = normalize_code(code);
        let mut outbox = Outbox::new();
        let ack = {
            let mut rooms = self.rooms.write().await;
            let err = |e: GameError| ServerMessage::Ack {
                ok: false,
                message: Some(e.to_string()),
            };
            match rooms.get_mut(&code) {
                None => err(GameError::RoomNotFound),
                Some(room) if room.phase != Phase::Results => err(GameError::NotInResults),
                Some(room) => match room.find_player(player_id) {
                    Some(p) if &p.conn == conn => {
                        room.ready_ids.insert(player_id.clone());
                        room.replay_pending = true;
                        view::broadcast_state(room, &mut outbox);
                        ServerMessage::Ack {
                            ok: true,
                            message: None,
                        }
                    }
                    _ => err(GameError::PlayerNotFound),
                },
            }
        };
        self.flush(outbox).await;
        ack
    }

    fn remove_conn_player(room: &mut Room, conn: &ConnId, outbox: &mut Outbox) -> RemoveOutcome {
        let Some(idx) = room.players.iter().position(|p| &p.conn == conn) else {
            return RemoveOutcome::NotMember;
        };
        let removed = room.players.remove(idx);
        tracing::info!(code = %room.code, player_id = %removed.id, "player left");

        if removed.id == room.host_id {
            // No host migration: the room dies with its host.
            for p in &room.players {
                outbox.push((
                    p.conn.clone(),
                    ServerMessage::RoomClosed {
                        message: "Host left the room.".to_string(),
                    },
                ));
            }
            room.timers.clear();
            return RemoveOutcome::Destroyed;
        }

        room.alive_ids.remove(&removed.id);
        room.ready_ids.remove(&removed.id);
        if room.impostor_id.as_ref() == Some(&removed.id) {
            room.reassign_impostor();
        }
        if room.players.is_empty() {
            room.timers.clear();
            return RemoveOutcome::Destroyed;
        }

        view::broadcast_state(room, outbox);
        RemoveOutcome::Removed
    }
}
