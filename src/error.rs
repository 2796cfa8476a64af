use thiserror::Error;

/// Everything that can go wrong with a player action.
///
/// Validation failures are reported back to the initiating connection as an
/// `error_message`. The `silent` variants are expected races (a timer firing
/// just before a late request arrives) and are dropped without notifying
/// anyone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("Please enter a name.")]
    InvalidName,
    #[error("Please choose a valid character color.")]
    InvalidColor,
    #[error("That color is already taken. Pick another.")]
    ColorTaken,
    #[error("Room not found.")]
    RoomNotFound,
    #[error("Game already started.")]
    GameInProgress,
    #[error("Game is not in results yet.")]
    NotInResults,
    #[error("Player not found.")]
    PlayerNotFound,
    #[error("only the host can start the round")]
    NotHost,
    #[error("at least {0} players are required")]
    NotEnoughPlayers(usize),
    #[error("not every player is ready")]
    NotAllReady,
    #[error("action is not valid in the current phase")]
    WrongPhase,
    #[error("it is not this player's turn")]
    NotYourTurn,
    #[error("player is not alive in this round")]
    NotAlive,
    #[error("a clue was already submitted this round")]
    AlreadySubmitted,
    #[error("this player already voted")]
    AlreadyVoted,
    #[error("clue must not be empty")]
    EmptyClue,
}

impl GameError {
    /// Whether the failure is an expected race that must be dropped without
    /// a reply, rather than surfaced to the initiator.
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            GameError::NotHost
                | GameError::NotEnoughPlayers(_)
                | GameError::NotAllReady
                | GameError::WrongPhase
                | GameError::NotYourTurn
                | GameError::NotAlive
                | GameError::AlreadySubmitted
                | GameError::AlreadyVoted
                | GameError::EmptyClue
                | GameError::PlayerNotFound
        )
    }
}
