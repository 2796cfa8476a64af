//! Per-viewer state projection.
//!
//! `project` is a pure function of (room, viewer): the impostor sees the
//! category but never the secret word while play is live, crew see neither
//! field (they were told the word when the secret was drawn), vote targets
//! stay hidden until results, and roles are revealed only in results.

use super::{Outbox, Room};
use crate::protocol::{ClueView, PlayerView, RoomView, ServerMessage, VoteView};
use crate::types::*;

pub fn project(room: &Room, viewer_id: &PlayerId) -> RoomView {
    let is_impostor_viewer = room.impostor_id.as_ref() == Some(viewer_id);

    let players = room
        .players
        .iter()
        .map(|p| PlayerView {
            id: p.id.clone(),
            name: p.name.clone(),
            color: p.color.clone(),
            role: if room.phase == Phase::Results {
                Some(if room.impostor_id.as_ref() == Some(&p.id) {
                    PlayerRole::Impostor
                } else {
                    PlayerRole::Player
                })
            } else {
                None
            },
            ready: room.replay_pending && room.ready_ids.contains(&p.id),
            alive: room.phase == Phase::Lobby || room.alive_ids.contains(&p.id),
        })
        .collect();

    let clues = if matches!(room.phase, Phase::Round | Phase::Voting | Phase::Results) {
        room.clues
            .iter()
            .map(|c| {
                let author = room.find_player(&c.player_id);
                ClueView {
                    player_id: c.player_id.clone(),
                    player_name: author
                        .map(|p| p.name.clone())
                        .unwrap_or_else(|| "Unknown".to_string()),
                    player_color: author.map(|p| p.color.clone()),
                    clue: c.text.clone(),
                }
            })
            .collect()
    } else {
        Vec::new()
    };

    let votes = match room.phase {
        Phase::Voting => room
            .votes
            .iter()
            .map(|v| VoteView {
                voter_id: Some(v.voter_id.clone()),
                voter_name: None,
                target_name: None,
            })
            .collect(),
        Phase::Results => room
            .votes
            .iter()
            .map(|v| {
                let name_of = |id: &PlayerId| {
                    room.find_player(id)
                        .map(|p| p.name.clone())
                        .unwrap_or_else(|| "Unknown".to_string())
                };
                VoteView {
                    voter_id: None,
                    voter_name: Some(name_of(&v.voter_id)),
                    target_name: Some(name_of(&v.target_id)),
                }
            })
            .collect(),
        _ => Vec::new(),
    };

    RoomView {
        code: room.code.clone(),
        phase: room.phase,
        host_id: room.host_id.clone(),
        replay_pending: room.replay_pending,
        player_count: room.players.len(),
        players,
        clues,
        votes,
        result: if room.phase == Phase::Results {
            room.result.clone()
        } else {
            None
        },
        turn_ends_at: (room.phase == Phase::Round)
            .then_some(room.turn_ends_at)
            .flatten(),
        current_turn_player_id: if room.phase == Phase::Round {
            room.current_turn_player_id.clone()
        } else {
            None
        },
        vote_ends_at: (room.phase == Phase::Voting)
            .then_some(room.vote_ends_at)
            .flatten(),
        countdown_ends_at: (room.phase == Phase::Countdown)
            .then_some(room.countdown_ends_at)
            .flatten(),
        elimination_message: if room.phase == Phase::Elimination {
            room.elimination_message.clone()
        } else {
            None
        },
        eliminated_player_id: if room.phase == Phase::Elimination {
            room.eliminated_player_id.clone()
        } else {
            None
        },
        category: if is_impostor_viewer {
            room.category.clone()
        } else {
            None
        },
        secret_word: if room.phase == Phase::Results {
            room.secret_word.clone()
        } else {
            None
        },
    }
}

/// Queue one freshly-projected view per connected player. There is no
/// incremental diffing; every state-affecting event re-sends the whole view.
pub fn broadcast_state(room: &Room, outbox: &mut Outbox) {
    for p in &room.players {
        outbox.push((
            p.conn.clone(),
            ServerMessage::RoomState {
                state: project(room, &p.id),
            },
        ));
    }
}
