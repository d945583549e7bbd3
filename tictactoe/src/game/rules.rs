//! Move validation and outcome detection.
//!
//! Both are pure functions over a [`MatchState`] / [`Board`]; the session
//! is the only caller that feeds their results back into state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::constants::BOARD_SIZE;
use super::entities::{Board, MatchState, Phase, Symbol, TurnState, UserId};

/// Reasons a submitted move is refused.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
pub enum MoveError {
    #[error("game not active")]
    GameNotActive,
    #[error("not your turn")]
    NotYourTurn,
    #[error("out of bounds")]
    OutOfBounds,
    #[error("cell occupied")]
    CellOccupied,
}

/// Result of evaluating a board.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    None,
    Draw,
    Winner(Symbol),
}

/// Rows, then columns, then the two diagonals.
const LINES: [[(usize, usize); 3]; 8] = [
    [(0, 0), (0, 1), (0, 2)],
    [(1, 0), (1, 1), (1, 2)],
    [(2, 0), (2, 1), (2, 2)],
    [(0, 0), (1, 0), (2, 0)],
    [(0, 1), (1, 1), (2, 1)],
    [(0, 2), (1, 2), (2, 2)],
    [(0, 0), (1, 1), (2, 2)],
    [(0, 2), (1, 1), (2, 0)],
];

/// Checks a proposed move against the current state.
///
/// Checks run in a fixed order and the first failure wins:
/// phase, turn, bounds, occupancy. On success the validated grid
/// coordinates are returned.
pub fn validate_move(
    state: &MatchState,
    user_id: &UserId,
    row: i32,
    col: i32,
) -> Result<(usize, usize), MoveError> {
    if state.phase != Phase::InProgress {
        return Err(MoveError::GameNotActive);
    }

    match state.turn {
        Some(ref turn) if &turn.current_user_id == user_id => {}
        _ => return Err(MoveError::NotYourTurn),
    }

    let (row, col) = match (usize::try_from(row), usize::try_from(col)) {
        (Ok(r), Ok(c)) if r < BOARD_SIZE && c < BOARD_SIZE => (r, c),
        _ => return Err(MoveError::OutOfBounds),
    };

    match state.board.get(row, col) {
        Some(cell) if cell.is_empty() => Ok((row, col)),
        _ => Err(MoveError::CellOccupied),
    }
}

/// Validates and, on success, applies a move: the mover's symbol goes
/// into the cell and the turn passes to the other seat.
///
/// Returns the symbol that was placed.
pub fn apply_move(
    state: &mut MatchState,
    user_id: &UserId,
    row: i32,
    col: i32,
) -> Result<Symbol, MoveError> {
    let (r, c) = validate_move(state, user_id, row, col)?;

    // validate_move guarantees an InProgress turn exists
    let symbol = state
        .turn
        .as_ref()
        .map(|turn| turn.current_symbol)
        .ok_or(MoveError::GameNotActive)?;
    state.board.set(r, c, symbol.into());

    let next = state
        .seats
        .iter()
        .find(|seat| &seat.user_id != user_id)
        .map(|seat| TurnState {
            current_user_id: seat.user_id.clone(),
            current_symbol: seat.symbol,
        });
    if next.is_some() {
        state.turn = next;
    }

    Ok(symbol)
}

/// Evaluates the eight winning lines of a board.
///
/// Only the final board matters; how it was reached is irrelevant.
#[must_use]
pub fn detect_outcome(board: &Board) -> Outcome {
    for [a, b, c] in LINES {
        let first = board.get(a.0, a.1);
        if let Some(symbol) = first.and_then(|cell| cell.symbol())
            && first == board.get(b.0, b.1)
            && first == board.get(c.0, c.1)
        {
            return Outcome::Winner(symbol);
        }
    }

    if board.is_full() {
        Outcome::Draw
    } else {
        Outcome::None
    }
}
