//! Phase and timer orchestration.
//!
//! All room mutations run as short, non-overlapping reactions under the
//! rooms write lock; "waiting" is expressed purely through scheduled tasks
//! that re-enter here when they fire. Every function that enters a phase
//! clears the room's timer set before registering new tasks (see
//! [`RoomTimers`](super::RoomTimers)); a fired task whose captured epoch no
//! longer matches the room's is a no-op.

use super::{normalize_code, view, vote, AppState, Outbox, Room, TimerSlot};
use crate::error::GameError;
use crate::protocol::ServerMessage;
use crate::types::*;
use crate::words;
use rand::seq::{IndexedRandom, SliceRandom};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Host action: begin a game from the lobby, or a rematch once every
/// current player has opted in.
pub async fn start_round(
    state: &Arc<AppState>,
    conn: &ConnId,
    code: &str,
) -> Result<(), GameError> {
    let code = normalize_code(code);
    let mut outbox = Outbox::new();
    {
        let mut rooms = state.rooms.write().await;
        let room = rooms.get_mut(&code).ok_or(GameError::RoomNotFound)?;
        let host_id = room.host_id.clone();
        match room.find_player(&host_id) {
            Some(host) if &host.conn == conn => {}
            _ => return Err(GameError::NotHost),
        }
        let startable =
            room.phase == Phase::Lobby || (room.phase == Phase::Results && room.replay_pending);
        if !startable {
            return Err(GameError::WrongPhase);
        }
        if room.players.len() < MIN_PLAYERS {
            return Err(GameError::NotEnoughPlayers(MIN_PLAYERS));
        }
        if room.replay_pending && !room.all_ready() {
            return Err(GameError::NotAllReady);
        }
        start_round_now(state, room, &mut outbox, true);
    }
    state.flush(outbox).await;
    Ok(())
}

/// Enter the `round` phase. Draws a fresh secret (and impostor, and alive
/// set) when forced or when none exists yet; otherwise the round restarts
/// with the same secret.
pub(crate) fn start_round_now(
    state: &Arc<AppState>,
    room: &mut Room,
    outbox: &mut Outbox,
    force_new_secret: bool,
) {
    if !matches!(
        room.phase,
        Phase::Countdown | Phase::Lobby | Phase::Results | Phase::Elimination | Phase::Voting
    ) {
        return;
    }
    room.timers.clear();
    if room.phase == Phase::Results {
        // A rematch is a fresh game: round counter and the one-time
        // countdown both reset.
        room.round_number = 0;
        room.countdown_used = false;
    }
    room.elimination_message = None;
    room.eliminated_player_id = None;
    room.pending_action = None;

    let new_secret = force_new_secret || room.secret_word.is_none();
    if new_secret {
        let secret = words::pick_secret();
        let mut rng = rand::rng();
        room.impostor_id = room.players.choose(&mut rng).map(|p| p.id.clone());
        room.category = Some(secret.category);
        room.secret_word = Some(secret.word);
        room.alive_ids = room.players.iter().map(|p| p.id.clone()).collect();
    }
    if room.alive_ids.is_empty() {
        room.alive_ids = room.players.iter().map(|p| p.id.clone()).collect();
    }

    room.clues.clear();
    room.votes.clear();
    room.phase = Phase::Round;

    let mut order: Vec<PlayerId> = room.alive_players().iter().map(|p| p.id.clone()).collect();
    order.shuffle(&mut rand::rng());
    // The impostor never opens a round; going first is too strong a tell.
    if order.len() > 1 && room.impostor_id.as_ref() == Some(&order[0]) {
        if let Some(i) = order
            .iter()
            .position(|id| room.impostor_id.as_ref() != Some(id))
        {
            order.swap(0, i);
        }
    }
    room.turn_order = order;
    room.turn_index = 0;
    room.current_turn_player_id = None;
    room.ready_ids.clear();
    room.replay_pending = false;
    room.turn_ends_at = None;
    room.vote_ends_at = None;
    room.countdown_ends_at = None;
    room.round_number += 1;

    if new_secret {
        for p in &room.players {
            let role = if room.impostor_id.as_ref() == Some(&p.id) {
                PlayerRole::Impostor
            } else {
                PlayerRole::Player
            };
            outbox.push((p.conn.clone(), ServerMessage::Role { role }));
            match role {
                PlayerRole::Impostor => outbox.push((
                    p.conn.clone(),
                    ServerMessage::Category {
                        category: room.category.clone().unwrap_or_default(),
                    },
                )),
                PlayerRole::Player => outbox.push((
                    p.conn.clone(),
                    ServerMessage::SecretWord {
                        word: room.secret_word.clone().unwrap_or_default(),
                    },
                )),
            }
        }
    }

    tracing::debug!(code = %room.code, round = room.round_number, new_secret, "round started");
    view::broadcast_state(room, outbox);
    start_turn(state, room, outbox);
}

fn start_turn(state: &Arc<AppState>, room: &mut Room, outbox: &mut Outbox) {
    room.timers.clear();
    // Skip players who left since the order was drawn.
    while room
        .turn_order
        .get(room.turn_index)
        .is_some_and(|id| room.find_player(id).is_none())
    {
        room.turn_index += 1;
    }
    let Some(current) = room.turn_order.get(room.turn_index).cloned() else {
        end_round(state, room, outbox);
        return;
    };

    room.current_turn_player_id = Some(current);
    room.turn_ends_at = Some(now_ms() + state.config.turn_ms as i64);
    view::broadcast_state(room, outbox);

    let epoch = room.timers.epoch();
    room.timers.register(
        TimerSlot::TurnTicker,
        spawn_ticker(state, room.code.clone(), epoch, TimerKind::Turn),
    );
    room.timers.register(
        TimerSlot::TurnDeadline,
        spawn_deadline(
            state,
            room.code.clone(),
            epoch,
            state.config.turn_ms,
            TimerSlot::TurnDeadline,
        ),
    );
}

/// Move to the next player in turn order, or end the round past the last.
/// Reached from an accepted clue or from the turn deadline.
pub(crate) fn advance_turn(state: &Arc<AppState>, room: &mut Room, outbox: &mut Outbox) {
    room.timers.clear();
    room.turn_index += 1;
    if room.turn_index >= room.turn_order.len() {
        end_round(state, room, outbox);
    } else {
        start_turn(state, room, outbox);
    }
}

/// All turns taken: enter voting, unless the alive set is already down to
/// the impostor plus one, in which case the impostor has won outright.
pub(crate) fn end_round(state: &Arc<AppState>, room: &mut Room, outbox: &mut Outbox) {
    if room.phase != Phase::Round {
        return;
    }
    room.timers.clear();
    room.turn_ends_at = None;
    room.current_turn_player_id = None;
    room.countdown_ends_at = None;
    room.vote_ends_at = None;

    let alive_count = room.alive_players().len();
    let impostor_alive = room
        .impostor_id
        .as_ref()
        .is_some_and(|id| room.alive_ids.contains(id));
    if alive_count <= 2 && impostor_alive {
        finish_game(room, outbox, Winner::Impostor, "Only two players remain.");
        return;
    }

    room.phase = Phase::Voting;
    room.votes.clear();
    room.vote_ends_at = Some(now_ms() + state.config.vote_ms as i64);
    view::broadcast_state(room, outbox);

    let epoch = room.timers.epoch();
    room.timers.register(
        TimerSlot::VoteTicker,
        spawn_ticker(state, room.code.clone(), epoch, TimerKind::Voting),
    );
    room.timers.register(
        TimerSlot::VoteDeadline,
        spawn_deadline(
            state,
            room.code.clone(),
            epoch,
            state.config.vote_ms,
            TimerSlot::VoteDeadline,
        ),
    );
}

/// One-time cosmetic delay before the first round restart of a game.
pub(crate) fn begin_countdown(state: &Arc<AppState>, room: &mut Room, outbox: &mut Outbox) {
    room.timers.clear();
    room.phase = Phase::Countdown;
    room.countdown_ends_at = Some(now_ms() + state.config.countdown_ms as i64);
    room.countdown_used = true;
    view::broadcast_state(room, outbox);

    let epoch = room.timers.epoch();
    room.timers.register(
        TimerSlot::CountdownTicker,
        spawn_ticker(state, room.code.clone(), epoch, TimerKind::Countdown),
    );
    room.timers.register(
        TimerSlot::CountdownDeadline,
        spawn_deadline(
            state,
            room.code.clone(),
            epoch,
            state.config.countdown_ms,
            TimerSlot::CountdownDeadline,
        ),
    );
}

/// Elimination reveal: hold exactly one pending action for the fixed delay,
/// then execute it exactly once.
pub(crate) fn begin_elimination(
    state: &Arc<AppState>,
    room: &mut Room,
    outbox: &mut Outbox,
    action: PendingAction,
    eliminated: Option<PlayerId>,
) {
    room.timers.clear();
    room.phase = Phase::Elimination;
    room.elimination_message = Some("Someone has been eliminated.".to_string());
    room.eliminated_player_id = eliminated;
    room.pending_action = Some(action);
    view::broadcast_state(room, outbox);

    let epoch = room.timers.epoch();
    room.timers.register(
        TimerSlot::EliminationDeadline,
        spawn_deadline(
            state,
            room.code.clone(),
            epoch,
            state.config.elimination_ms,
            TimerSlot::EliminationDeadline,
        ),
    );
}

/// Consume the pending action queued by vote resolution. Taking it out of
/// the room before acting makes double execution impossible.
pub(crate) fn run_pending_action(state: &Arc<AppState>, room: &mut Room, outbox: &mut Outbox) {
    let pending = room.pending_action.take();
    room.elimination_message = None;
    room.eliminated_player_id = None;
    let Some(pending) = pending else { return };
    match pending {
        PendingAction::Finish { winner, reason } => finish_game(room, outbox, winner, &reason),
        PendingAction::NextRound { use_countdown } => {
            if use_countdown {
                begin_countdown(state, room, outbox);
            } else {
                start_round_now(state, room, outbox, false);
            }
        }
    }
}

/// Enter results with a winner and open the replay-consensus window.
pub(crate) fn finish_game(room: &mut Room, outbox: &mut Outbox, winner: Winner, reason: &str) {
    room.timers.clear();
    let impostor = room
        .impostor_id
        .as_ref()
        .and_then(|id| room.find_player(id));
    let impostor_name = impostor
        .map(|p| p.name.clone())
        .unwrap_or_else(|| "Unknown".to_string());
    let winner_names = match winner {
        Winner::Impostor => vec![impostor
            .map(|p| p.name.clone())
            .unwrap_or_else(|| "Impostor".to_string())],
        Winner::Players => room
            .players
            .iter()
            .filter(|p| {
                room.impostor_id.as_ref() != Some(&p.id)
                    && (room.alive_ids.is_empty() || room.alive_ids.contains(&p.id))
            })
            .map(|p| p.name.clone())
            .collect(),
    };

    room.phase = Phase::Results;
    room.result = Some(GameResult {
        winner,
        reason: reason.to_string(),
        winner_names,
        impostor_name,
    });
    room.ready_ids.clear();
    room.turn_ends_at = None;
    room.vote_ends_at = None;
    room.countdown_ends_at = None;
    room.current_turn_player_id = None;

    tracing::info!(code = %room.code, ?winner, reason, "game finished");
    view::broadcast_state(room, outbox);
}

/// ≈1 Hz remaining-time broadcast for a timed phase. Stops on its own when
/// the room is gone, its epoch is stale, or the phase deadline was cleared.
fn spawn_ticker(
    state: &Arc<AppState>,
    code: RoomCode,
    epoch: u64,
    kind: TimerKind,
) -> JoinHandle<()> {
    let state = Arc::clone(state);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let mut outbox = Outbox::new();
            {
                let rooms = state.rooms.read().await;
                let Some(room) = rooms.get(&code) else { break };
                if room.timers.epoch() != epoch {
                    break;
                }
                let ends_at = match kind {
                    TimerKind::Turn => room.turn_ends_at,
                    TimerKind::Voting => room.vote_ends_at,
                    TimerKind::Countdown => room.countdown_ends_at,
                };
                let Some(ends_at) = ends_at else { break };
                let remaining_ms = (ends_at - now_ms()).max(0);
                for p in &room.players {
                    outbox.push((
                        p.conn.clone(),
                        ServerMessage::TimerUpdate { remaining_ms, kind },
                    ));
                }
            }
            state.flush(outbox).await;
        }
    })
}

/// One-shot deadline for a phase. The epoch check makes a task that fires
/// after cancellation a no-op.
fn spawn_deadline(
    state: &Arc<AppState>,
    code: RoomCode,
    epoch: u64,
    delay_ms: u64,
    slot: TimerSlot,
) -> JoinHandle<()> {
    let state = Arc::clone(state);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        let mut outbox = Outbox::new();
        {
            let mut rooms = state.rooms.write().await;
            let Some(room) = rooms.get_mut(&code) else { return };
            if room.timers.epoch() != epoch {
                return;
            }
            tracing::debug!(%code, ?slot, "timer deadline fired");
            match slot {
                TimerSlot::TurnDeadline => advance_turn(&state, room, &mut outbox),
                TimerSlot::VoteDeadline => vote::resolve_votes(&state, room, &mut outbox),
                TimerSlot::CountdownDeadline => start_round_now(&state, room, &mut outbox, false),
                TimerSlot::EliminationDeadline => run_pending_action(&state, room, &mut outbox),
                _ => {}
            }
        }
        // Handling the deadline clears the timer set, which aborts this
        // task at its next await point. Hand the outbox to a fresh task so
        // the broadcasts still go out.
        if !outbox.is_empty() {
            let flusher = Arc::clone(&state);
            tokio::spawn(async move { flusher.flush(outbox).await });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ServerMessage;
    use crate::state::AppState;
    use tokio::sync::mpsc;

    fn test_config() -> GameConfig {
        GameConfig {
            turn_ms: 3_000,
            countdown_ms: 1_000,
            vote_ms: 5_000,
            elimination_ms: 500,
        }
    }

    async fn room_with_players(
        state: &Arc<AppState>,
        n: usize,
    ) -> (RoomCode, Vec<(ConnId, PlayerId)>) {
        let host_conn = "conn-0".to_string();
        let created = state
            .create_room(&host_conn, "Player0", PLAYER_COLORS[0])
            .await
            .unwrap();
        let (code, host_id) = match created {
            ServerMessage::RoomJoined {
                code, player_id, ..
            } => (code, player_id),
            other => panic!("expected RoomJoined, got {other:?}"),
        };
        let mut members = vec![(host_conn, host_id)];
        for i in 1..n {
            let conn = format!("conn-{i}");
            let joined = state
                .join_room(&conn, &code, &format!("Player{i}"), PLAYER_COLORS[i])
                .await
                .unwrap();
            match joined {
                ServerMessage::RoomJoined { player_id, .. } => members.push((conn, player_id)),
                other => panic!("expected RoomJoined, got {other:?}"),
            }
        }
        (code, members)
    }

    #[tokio::test]
    async fn start_requires_three_players() {
        let state = Arc::new(AppState::with_config(test_config()));
        let (code, members) = room_with_players(&state, 2).await;
        let err = start_round(&state, &members[0].0, &code).await.unwrap_err();
        assert_eq!(err, GameError::NotEnoughPlayers(MIN_PLAYERS));
    }

    #[tokio::test]
    async fn only_host_can_start() {
        let state = Arc::new(AppState::with_config(test_config()));
        let (code, members) = room_with_players(&state, 3).await;
        let err = start_round(&state, &members[1].0, &code).await.unwrap_err();
        assert_eq!(err, GameError::NotHost);
    }

    #[tokio::test]
    async fn starting_enters_round_with_full_turn_order() {
        let state = Arc::new(AppState::with_config(test_config()));
        let (code, members) = room_with_players(&state, 3).await;
        start_round(&state, &members[0].0, &code).await.unwrap();

        let rooms = state.rooms.read().await;
        let room = rooms.get(&code).unwrap();
        assert_eq!(room.phase, Phase::Round);
        assert_eq!(room.round_number, 1);
        assert_eq!(room.turn_order.len(), 3);
        assert_eq!(room.alive_ids.len(), 3);
        assert!(room.secret_word.is_some());
        assert!(room.category.is_some());
        assert!(room.impostor_id.is_some());
        assert!(room.turn_ends_at.is_some());
        assert_eq!(
            room.current_turn_player_id.as_ref(),
            Some(&room.turn_order[0])
        );
        assert_eq!(room.timers.registered(TimerSlot::TurnTicker), 1);
        assert_eq!(room.timers.registered(TimerSlot::TurnDeadline), 1);
        assert!(room.timers.at_most_one_per_slot());
    }

    #[tokio::test]
    async fn impostor_never_opens_the_round() {
        // Shuffle is random; try enough games for a biased order to show up.
        for _ in 0..25 {
            let state = Arc::new(AppState::with_config(test_config()));
            let (code, members) = room_with_players(&state, 4).await;
            start_round(&state, &members[0].0, &code).await.unwrap();
            let rooms = state.rooms.read().await;
            let room = rooms.get(&code).unwrap();
            assert_ne!(room.impostor_id.as_ref(), Some(&room.turn_order[0]));
        }
    }

    #[tokio::test]
    async fn crew_get_word_impostor_gets_category() {
        let state = Arc::new(AppState::with_config(test_config()));
        let (code, members) = room_with_players(&state, 3).await;

        let mut rxs = Vec::new();
        for (conn, _) in &members {
            let (tx, rx) = mpsc::unbounded_channel();
            state.register_conn(conn.clone(), tx).await;
            rxs.push(rx);
        }
        start_round(&state, &members[0].0, &code).await.unwrap();

        let impostor_id = {
            let rooms = state.rooms.read().await;
            rooms.get(&code).unwrap().impostor_id.clone().unwrap()
        };

        for (i, rx) in rxs.iter_mut().enumerate() {
            let mut got_role = None;
            let mut got_word = false;
            let mut got_category = false;
            while let Ok(msg) = rx.try_recv() {
                match msg {
                    ServerMessage::Role { role } => got_role = Some(role),
                    ServerMessage::SecretWord { .. } => got_word = true,
                    ServerMessage::Category { .. } => got_category = true,
                    _ => {}
                }
            }
            if members[i].1 == impostor_id {
                assert_eq!(got_role, Some(PlayerRole::Impostor));
                assert!(got_category && !got_word);
            } else {
                assert_eq!(got_role, Some(PlayerRole::Player));
                assert!(got_word && !got_category);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn turn_timeout_forces_advance() {
        let state = Arc::new(AppState::with_config(test_config()));
        let (code, members) = room_with_players(&state, 3).await;
        start_round(&state, &members[0].0, &code).await.unwrap();

        tokio::time::sleep(Duration::from_millis(test_config().turn_ms + 100)).await;

        let rooms = state.rooms.read().await;
        let room = rooms.get(&code).unwrap();
        assert_eq!(room.phase, Phase::Round);
        assert_eq!(room.turn_index, 1);
        assert_eq!(
            room.current_turn_player_id.as_ref(),
            Some(&room.turn_order[1])
        );
        assert!(room.timers.at_most_one_per_slot());
    }

    #[tokio::test(start_paused = true)]
    async fn three_turn_timeouts_reach_voting() {
        let state = Arc::new(AppState::with_config(test_config()));
        let (code, members) = room_with_players(&state, 3).await;
        start_round(&state, &members[0].0, &code).await.unwrap();

        tokio::time::sleep(Duration::from_millis(3 * test_config().turn_ms + 100)).await;

        let rooms = state.rooms.read().await;
        let room = rooms.get(&code).unwrap();
        assert_eq!(room.phase, Phase::Voting);
        assert!(room.vote_ends_at.is_some());
        assert_eq!(room.timers.registered(TimerSlot::VoteTicker), 1);
        assert_eq!(room.timers.registered(TimerSlot::VoteDeadline), 1);
        assert!(room.timers.at_most_one_per_slot());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_deadline_is_a_no_op() {
        let state = Arc::new(AppState::with_config(test_config()));
        let (code, members) = room_with_players(&state, 3).await;
        start_round(&state, &members[0].0, &code).await.unwrap();

        // Cancel the turn timers by hand, as a phase entry would.
        {
            let mut rooms = state.rooms.write().await;
            rooms.get_mut(&code).unwrap().timers.clear();
        }
        tokio::time::sleep(Duration::from_millis(test_config().turn_ms + 100)).await;

        let rooms = state.rooms.read().await;
        let room = rooms.get(&code).unwrap();
        // The deadline fired (or was aborted) without advancing the turn.
        assert_eq!(room.turn_index, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_broadcasts_remaining_time() {
        let state = Arc::new(AppState::with_config(test_config()));
        let (code, members) = room_with_players(&state, 3).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        state.register_conn(members[0].0.clone(), tx).await;
        start_round(&state, &members[0].0, &code).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1_100)).await;

        let mut saw_tick = false;
        while let Ok(msg) = rx.try_recv() {
            if let ServerMessage::TimerUpdate { remaining_ms, kind } = msg {
                assert_eq!(kind, TimerKind::Turn);
                assert!(remaining_ms >= 0);
                saw_tick = true;
            }
        }
        assert!(saw_tick, "expected at least one timer_update");
    }
}
