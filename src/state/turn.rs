//! Clue submission. Turn order itself is computed at round start and
//! advanced by the orchestrator; the turn timer only exists to force
//! progress when a player stalls.

use super::{engine, normalize_code, view, AppState, Outbox};
use crate::error::GameError;
use crate::types::*;
use std::sync::Arc;

/// Accepts a clue only from the alive player whose turn it is, once per
/// round. An accepted clue advances the turn immediately.
pub async fn submit_clue(
    state: &Arc<AppState>,
    conn: &ConnId,
    code: &str,
    player_id: &PlayerId,
    clue: &str,
) -> Result<(), GameError> {
    let code = normalize_code(code);
    let text = clue.trim().to_string();
    let mut outbox = Outbox::new();
    {
        let mut rooms = state.rooms.write().await;
        let room = rooms.get_mut(&code).ok_or(GameError::RoomNotFound)?;
        if room.phase != Phase::Round {
            return Err(GameError::WrongPhase);
        }
        match room.find_player(player_id) {
            Some(p) if &p.conn == conn => {}
            _ => return Err(GameError::PlayerNotFound),
        }
        if !room.alive_ids.contains(player_id) {
            return Err(GameError::NotAlive);
        }
        if room.current_turn_player_id.as_ref() != Some(player_id) {
            return Err(GameError::NotYourTurn);
        }
        if room.clues.iter().any(|c| &c.player_id == player_id) {
            return Err(GameError::AlreadySubmitted);
        }
        if text.is_empty() {
            return Err(GameError::EmptyClue);
        }

        room.clues.push(Clue {
            player_id: player_id.clone(),
            text,
        });
        view::broadcast_state(room, &mut outbox);
        engine::advance_turn(state, room, &mut outbox);
    }
    state.flush(outbox).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ServerMessage;
    use crate::state::AppState;

    async fn started_room(state: &Arc<AppState>) -> (RoomCode, Vec<(ConnId, PlayerId)>) {
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
        for i in 1..3 {
            let conn = format!("conn-{i}");
            match state
                .join_room(&conn, &code, &format!("Player{i}"), PLAYER_COLORS[i])
                .await
                .unwrap()
            {
                ServerMessage::RoomJoined { player_id, .. } => members.push((conn, player_id)),
                other => panic!("expected RoomJoined, got {other:?}"),
            }
        }
        engine::start_round(state, &members[0].0, &code)
            .await
            .unwrap();
        (code, members)
    }

    fn conn_of<'a>(members: &'a [(ConnId, PlayerId)], id: &PlayerId) -> &'a ConnId {
        &members.iter().find(|(_, pid)| pid == id).unwrap().0
    }

    #[tokio::test]
    async fn clue_only_accepted_on_turn() {
        let state = Arc::new(AppState::new());
        let (code, members) = started_room(&state).await;
        let (on_turn, not_on_turn) = {
            let rooms = state.rooms.read().await;
            let room = rooms.get(&code).unwrap();
            (room.turn_order[0].clone(), room.turn_order[1].clone())
        };

        let err = submit_clue(&state, conn_of(&members, &not_on_turn), &code, &not_on_turn, "fish")
            .await
            .unwrap_err();
        assert_eq!(err, GameError::NotYourTurn);

        submit_clue(&state, conn_of(&members, &on_turn), &code, &on_turn, "fish")
            .await
            .unwrap();

        let rooms = state.rooms.read().await;
        let room = rooms.get(&code).unwrap();
        assert_eq!(room.clues.len(), 1);
        assert_eq!(room.turn_index, 1);
        assert_eq!(room.current_turn_player_id.as_ref(), Some(&not_on_turn));
    }

    #[tokio::test]
    async fn second_clue_in_a_round_is_rejected() {
        let state = Arc::new(AppState::new());
        let (code, members) = started_room(&state).await;
        let first = {
            let rooms = state.rooms.read().await;
            rooms.get(&code).unwrap().turn_order[0].clone()
        };
        submit_clue(&state, conn_of(&members, &first), &code, &first, "one")
            .await
            .unwrap();
        let err = submit_clue(&state, conn_of(&members, &first), &code, &first, "two")
            .await
            .unwrap_err();
        // Their turn is over, so the turn check fires first.
        assert_eq!(err, GameError::NotYourTurn);
    }

    #[tokio::test]
    async fn empty_clue_is_rejected() {
        let state = Arc::new(AppState::new());
        let (code, members) = started_room(&state).await;
        let first = {
            let rooms = state.rooms.read().await;
            rooms.get(&code).unwrap().turn_order[0].clone()
        };
        let err = submit_clue(&state, conn_of(&members, &first), &code, &first, "   ")
            .await
            .unwrap_err();
        assert_eq!(err, GameError::EmptyClue);
    }

    #[tokio::test]
    async fn clue_from_wrong_connection_is_rejected() {
        let state = Arc::new(AppState::new());
        let (code, members) = started_room(&state).await;
        let first = {
            let rooms = state.rooms.read().await;
            rooms.get(&code).unwrap().turn_order[0].clone()
        };
        let stranger = "conn-stranger".to_string();
        let err = submit_clue(&state, &stranger, &code, &first, "fish")
            .await
            .unwrap_err();
        assert_eq!(err, GameError::PlayerNotFound);
        let _ = members;
    }

    #[tokio::test]
    async fn all_clues_in_move_room_to_voting() {
        let state = Arc::new(AppState::new());
        let (code, members) = started_room(&state).await;
        let order = {
            let rooms = state.rooms.read().await;
            rooms.get(&code).unwrap().turn_order.clone()
        };
        for id in &order {
            submit_clue(&state, conn_of(&members, id), &code, id, "hint")
                .await
                .unwrap();
        }
        let rooms = state.rooms.read().await;
        let room = rooms.get(&code).unwrap();
        assert_eq!(room.phase, Phase::Voting);
        assert_eq!(room.clues.len(), 3);
        assert!(room.vote_ends_at.is_some());
        assert!(room.timers.at_most_one_per_slot());
    }
}
