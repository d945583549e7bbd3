use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::{Result, SerializationError};
use crate::game::entities::UserId;

/// Inbound payloads larger than this are rejected before parsing.
pub const MAX_PAYLOAD_SIZE: usize = 1024;

/// Fixed opcode enumeration. Values are part of the wire contract and
/// must never be renumbered.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum OpCode {
    /// Server to clients: full snapshot, match just started.
    MatchStarted = 1,
    /// Server to clients: full snapshot after accepted move(s).
    MoveApplied = 2,
    /// Server to clients: full snapshot including the winner.
    GameEnded = 3,
    /// Client to server: `row, col`.
    ClientMoveSubmission = 4,
    /// Server to the submitter only: why a move was dropped.
    MoveRejected = 5,
}

impl OpCode {
    pub fn code(self) -> i64 {
        self as i64
    }

    /// Whether clients are allowed to send this opcode.
    pub fn is_inbound(self) -> bool {
        matches!(self, Self::ClientMoveSubmission)
    }
}

impl From<OpCode> for i64 {
    fn from(value: OpCode) -> Self {
        value.code()
    }
}

impl TryFrom<i64> for OpCode {
    type Error = SerializationError;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            1 => Ok(Self::MatchStarted),
            2 => Ok(Self::MoveApplied),
            3 => Ok(Self::GameEnded),
            4 => Ok(Self::ClientMoveSubmission),
            5 => Ok(Self::MoveRejected),
            other => Err(SerializationError::UnknownOpCode(other)),
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::MatchStarted => "match_started",
            Self::MoveApplied => "move_applied",
            Self::GameEnded => "game_ended",
            Self::ClientMoveSubmission => "client_move_submission",
            Self::MoveRejected => "move_rejected",
        };
        write!(f, "{repr}({})", self.code())
    }
}

/// Body of an opcode 4 message.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MovePayload {
    pub row: i32,
    pub col: i32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MoveWire {
    Object { row: i32, col: i32 },
    Pair([i32; 2]),
}

impl MovePayload {
    /// Decodes `"row,col"` text or a JSON `{"row":r,"col":c}` / `[r,c]`.
    ///
    /// Range is not checked here; that is the move validator's job.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() > MAX_PAYLOAD_SIZE {
            return Err(SerializationError::PayloadTooLarge {
                actual: data.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let text = std::str::from_utf8(data)
            .map_err(|e| SerializationError::InvalidMove(e.to_string()))?
            .trim();

        if text.starts_with('{') || text.starts_with('[') {
            let payload = match serde_json::from_str::<MoveWire>(text)? {
                MoveWire::Object { row, col } => Self { row, col },
                MoveWire::Pair([row, col]) => Self { row, col },
            };
            return Ok(payload);
        }

        let (row, col) = text
            .split_once(',')
            .ok_or_else(|| SerializationError::InvalidMove(format!("expected row,col: {text:?}")))?;
        let parse = |s: &str| {
            s.trim()
                .parse::<i32>()
                .map_err(|e| SerializationError::InvalidMove(format!("{s:?}: {e}")))
        };

        Ok(Self {
            row: parse(row)?,
            col: parse(col)?,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        format!("{},{}", self.row, self.col).into_bytes()
    }
}

/// Decodes a raw client message. Only opcode 4 is accepted from clients.
pub fn decode_client_message(op_code: i64, data: &[u8]) -> Result<MovePayload> {
    let op_code = OpCode::try_from(op_code)?;
    if !op_code.is_inbound() {
        return Err(SerializationError::UnexpectedOpCode(op_code.code()));
    }
    MovePayload::decode(data)
}

/// Out-of-band single move delivered through the signal path.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SignalMove {
    pub user_id: UserId,
    pub row: i32,
    pub col: i32,
}

impl SignalMove {
    pub fn decode(data: &str) -> Result<Self> {
        if data.len() > MAX_PAYLOAD_SIZE {
            return Err(SerializationError::PayloadTooLarge {
                actual: data.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(serde_json::from_str(data)?)
    }
}

/// Reply to a signal.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SignalAck {
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SignalAck {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: Some(reason.into()),
        }
    }

    pub fn to_json(&self) -> String {
        // A struct of a bool and an optional string always serializes.
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"accepted":false}"#.to_string())
    }
}

/// Private notice sent to a submitter whose move was dropped.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RejectionNotice {
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub col: Option<i32>,
}
