use serde::{Deserialize, Deserializer, Serialize, de};
use std::{collections::HashMap, fmt};
use thiserror::Error;

use super::constants::{BOARD_SIZE, MAX_SEATS, MAX_USER_INPUT_LENGTH};

/// Opaque, immutable identifier of a match. Registry key.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct MatchId(String);

impl MatchId {
    /// Generate a fresh random match id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for MatchId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for MatchId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identifier of an authenticated user as handed to us by the transport.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

/// Why a transport-supplied user id was refused.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum InvalidUserId {
    #[error("user_id is empty")]
    Empty,
    #[error("user_id is longer than {max} characters")]
    TooLong { max: usize },
}

impl UserId {
    /// Trims surrounding whitespace and nothing else. Ids are opaque keys,
    /// so an id is never shortened; use [`UserId::parse`] at the edge.
    pub fn new(s: &str) -> Self {
        Self(s.trim().to_string())
    }

    /// Checked constructor for ids arriving from clients.
    pub fn parse(s: &str) -> Result<Self, InvalidUserId> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(InvalidUserId::Empty);
        }
        if trimmed.chars().count() > MAX_USER_INPUT_LENGTH {
            return Err(InvalidUserId::TooLong {
                max: MAX_USER_INPUT_LENGTH,
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(de::Error::custom)
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Mark placed by a seat.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Symbol {
    X,
    O,
}

impl Symbol {
    #[must_use]
    pub fn opponent(self) -> Self {
        match self {
            Self::X => Self::O,
            Self::O => Self::X,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::X => "X",
            Self::O => "O",
        };
        write!(f, "{repr}")
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Cell {
    #[default]
    Empty,
    X,
    O,
}

impl Cell {
    pub fn is_empty(self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Symbol occupying the cell, if any.
    pub fn symbol(self) -> Option<Symbol> {
        match self {
            Self::Empty => None,
            Self::X => Some(Symbol::X),
            Self::O => Some(Symbol::O),
        }
    }
}

impl From<Symbol> for Cell {
    fn from(value: Symbol) -> Self {
        match value {
            Symbol::X => Self::X,
            Symbol::O => Self::O,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.symbol() {
            Some(symbol) => symbol.fmt(f),
            None => write!(f, "."),
        }
    }
}

/// Fixed 3x3 grid, indexed `[row][col]`.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Board([[Cell; BOARD_SIZE]; BOARD_SIZE]);

impl Board {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `None` when `(row, col)` is off the grid.
    pub fn get(&self, row: usize, col: usize) -> Option<Cell> {
        self.0.get(row).and_then(|r| r.get(col)).copied()
    }

    /// Caller guarantees `(row, col)` is on the grid; the move validator
    /// bounds-checks before anything reaches here.
    pub(crate) fn set(&mut self, row: usize, col: usize, cell: Cell) {
        self.0[row][col] = cell;
    }

    pub fn rows(&self) -> &[[Cell; BOARD_SIZE]; BOARD_SIZE] {
        &self.0
    }

    pub fn is_full(&self) -> bool {
        self.0.iter().flatten().all(|cell| !cell.is_empty())
    }

    pub fn occupied(&self) -> usize {
        self.0.iter().flatten().filter(|cell| !cell.is_empty()).count()
    }
}

impl From<[[Cell; BOARD_SIZE]; BOARD_SIZE]> for Board {
    fn from(value: [[Cell; BOARD_SIZE]; BOARD_SIZE]) -> Self {
        Self(value)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, row) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, " / ")?;
            }
            write!(f, "{} {} {}", row[0], row[1], row[2])?;
        }
        Ok(())
    }
}

/// A claimed player slot.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Seat {
    pub user_id: UserId,
    pub display_name: String,
    pub symbol: Symbol,
    pub join_order: u32,
}

/// Whose move it is. Only meaningful while the match is in progress.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TurnState {
    pub current_user_id: UserId,
    pub current_symbol: Symbol,
}

/// Coarse lifecycle stage. Only ever moves forward.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Phase {
    #[default]
    WaitingForPlayers,
    InProgress,
    Finished,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::WaitingForPlayers => "waiting_for_players",
            Self::InProgress => "in_progress",
            Self::Finished => "finished",
        };
        write!(f, "{repr}")
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", content = "user_id", rename_all = "snake_case")]
pub enum Winner {
    #[default]
    None,
    Draw,
    Player(UserId),
}

/// Full match snapshot. This is what gets broadcast after every
/// state-changing event.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MatchState {
    pub match_id: MatchId,
    pub label: String,
    pub board: Board,
    /// Ordered by `join_order`.
    pub seats: Vec<Seat>,
    pub turn: Option<TurnState>,
    pub phase: Phase,
    pub winner: Winner,
}

impl MatchState {
    #[must_use]
    pub fn new(match_id: MatchId, label: String) -> Self {
        Self {
            match_id,
            label,
            board: Board::new(),
            seats: Vec::with_capacity(MAX_SEATS),
            turn: None,
            phase: Phase::WaitingForPlayers,
            winner: Winner::None,
        }
    }

    pub fn seat(&self, user_id: &UserId) -> Option<&Seat> {
        self.seats.iter().find(|seat| &seat.user_id == user_id)
    }

    pub fn seat_for_symbol(&self, symbol: Symbol) -> Option<&Seat> {
        self.seats.iter().find(|seat| seat.symbol == symbol)
    }

    pub fn is_seated(&self, user_id: &UserId) -> bool {
        self.seat(user_id).is_some()
    }

    pub fn has_free_seat(&self) -> bool {
        self.seats.len() < MAX_SEATS
    }

    pub fn user_ids(&self) -> Vec<UserId> {
        self.seats.iter().map(|seat| seat.user_id.clone()).collect()
    }
}

/// A connected user as reported by the transport layer.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Presence {
    pub user_id: UserId,
    pub session_id: String,
    pub username: String,
}

impl Presence {
    pub fn new(user_id: impl Into<UserId>, username: &str) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
        }
    }
}

/// Join metadata keys the engine understands.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum JoinMetadataKey {
    DisplayName,
}

impl JoinMetadataKey {
    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "display_name" | "displayName" => Some(Self::DisplayName),
            _ => None,
        }
    }
}

/// Typed view over the loose string map a client attaches to a join.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct JoinMetadata {
    pub display_name: Option<String>,
}

impl JoinMetadata {
    /// Picks out the recognized keys; unknown keys are logged and dropped.
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        let mut metadata = Self::default();
        for (key, value) in map {
            match JoinMetadataKey::parse(key) {
                Some(JoinMetadataKey::DisplayName) => {
                    let name: String =
                        value.trim().chars().take(MAX_USER_INPUT_LENGTH).collect();
                    if !name.is_empty() {
                        metadata.display_name = Some(name);
                    }
                }
                None => log::debug!("ignoring unrecognized join metadata key {key:?}"),
            }
        }
        metadata
    }

    pub fn with_display_name(name: &str) -> Self {
        Self {
            display_name: Some(name.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_is_trimmed() {
        assert_eq!(UserId::new("  bob ").as_str(), "bob");
        assert_eq!(UserId::parse("  bob ").unwrap().as_str(), "bob");
        assert_eq!(UserId::parse("   "), Err(InvalidUserId::Empty));
    }

    #[test]
    fn test_user_id_limit_counts_characters() {
        // 63 ASCII bytes then a two-byte character across the 64th byte.
        let straddling = format!("{}é-tail", "a".repeat(MAX_USER_INPUT_LENGTH - 1));
        assert_eq!(UserId::new(&straddling).as_str(), straddling);
        assert!(UserId::parse(&straddling).is_err());

        let exact = "é".repeat(MAX_USER_INPUT_LENGTH);
        assert_eq!(UserId::parse(&exact).unwrap().as_str(), exact);
    }

    #[test]
    fn test_long_user_ids_are_not_merged() {
        let prefix = "u".repeat(MAX_USER_INPUT_LENGTH);
        let alice = format!("{prefix}-alice");
        let bob = format!("{prefix}-bob");

        assert_ne!(UserId::new(&alice), UserId::new(&bob));
        assert_eq!(
            UserId::parse(&alice),
            Err(InvalidUserId::TooLong {
                max: MAX_USER_INPUT_LENGTH
            })
        );
        assert!(UserId::parse(&bob).is_err());
    }

    #[test]
    fn test_user_id_deserialize_rejects_invalid() {
        let ok: UserId = serde_json::from_str(r#"" carol ""#).unwrap();
        assert_eq!(ok.as_str(), "carol");

        let long = serde_json::to_string(&format!("{}é-tail", "a".repeat(63))).unwrap();
        let err = serde_json::from_str::<UserId>(&long).unwrap_err();
        assert!(err.to_string().contains("longer than"));
        assert!(serde_json::from_str::<UserId>(r#""  ""#).is_err());
    }

    #[test]
    fn test_board_display_matches_grid_notation() {
        let board = Board::from([
            [Cell::X, Cell::Empty, Cell::Empty],
            [Cell::Empty, Cell::X, Cell::Empty],
            [Cell::Empty, Cell::Empty, Cell::X],
        ]);
        assert_eq!(board.to_string(), "X . . / . X . / . . X");
        assert_eq!(board.occupied(), 3);
        assert!(!board.is_full());
    }

    #[test]
    fn test_board_get_out_of_range() {
        let board = Board::new();
        assert_eq!(board.get(3, 0), None);
        assert_eq!(board.get(0, 3), None);
        assert_eq!(board.get(2, 2), Some(Cell::Empty));
    }

    #[test]
    fn test_display_name_is_cut_on_char_boundary() {
        let mut map = HashMap::new();
        let name = format!("{}é-tail", "a".repeat(MAX_USER_INPUT_LENGTH - 1));
        map.insert("display_name".to_string(), name);
        let metadata = JoinMetadata::from_map(&map);

        let kept = metadata.display_name.unwrap();
        assert_eq!(kept.chars().count(), MAX_USER_INPUT_LENGTH);
        assert!(kept.ends_with('é'));
    }

    #[test]
    fn test_join_metadata_keeps_known_keys_only() {
        let mut map = HashMap::new();
        map.insert("display_name".to_string(), " Alice ".to_string());
        map.insert("favourite_colour".to_string(), "green".to_string());
        let metadata = JoinMetadata::from_map(&map);
        assert_eq!(metadata.display_name.as_deref(), Some("Alice"));
    }

    #[test]
    fn test_winner_serializes_tagged() {
        let json = serde_json::to_string(&Winner::Player(UserId::new("u1"))).unwrap();
        assert_eq!(json, r#"{"kind":"player","user_id":"u1"}"#);
        let json = serde_json::to_string(&Winner::Draw).unwrap();
        assert_eq!(json, r#"{"kind":"draw"}"#);
    }

    #[test]
    fn test_symbol_opponent_flips() {
        assert_eq!(Symbol::X.opponent(), Symbol::O);
        assert_eq!(Symbol::O.opponent(), Symbol::X);
    }
}
