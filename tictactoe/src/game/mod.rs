//! Tic-tac-toe game model and rules.
//!
//! This module provides the pieces every match session is built from:
//! - Typed entities (board, seats, turn, phase, winner, match snapshot)
//! - The move validator and win detector
//! - Validation errors surfaced to move submitters

pub mod constants;
pub mod entities;
pub mod rules;

pub use entities::{
    Board, Cell, InvalidUserId, JoinMetadata, MatchId, MatchState, Phase, Presence, Seat, Symbol,
    TurnState, UserId, Winner,
};
pub use rules::{MoveError, Outcome, apply_move, detect_outcome, validate_move};
