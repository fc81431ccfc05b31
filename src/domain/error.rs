//! Error types shared by the codec, the RACP coordinator and the macro model.

use crate::domain::racp::{OpCode, Operator};
use thiserror::Error;

/// Failure to turn a byte buffer (or a persisted document) into a typed record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("buffer too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("unknown {field} value {value:#04x}")]
    UnknownEnum { field: &'static str, value: u8 },

    #[error("op code {0:?} is not valid in a response")]
    UnexpectedOpCode(OpCode),

    #[error("unsupported command: {op_code:?} with operator {operator:?}")]
    UnsupportedCommand { op_code: OpCode, operator: Operator },

    #[error("text command payload is not valid UTF-8")]
    InvalidText,

    #[error("invalid macro document: {0}")]
    InvalidDocument(String),
}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        DecodeError::InvalidDocument(e.to_string())
    }
}

/// Violations of the RACP request/response discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("a {pending:?} request is still waiting for its response")]
    RequestInFlight { pending: OpCode },

    #[error("response received with no outstanding request")]
    UnsolicitedResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("macro name must not be empty")]
    EmptyName,
}

/// Rejected attempt to build a RACP command outside the compatibility table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("operator {operator:?} cannot be used with {op_code:?}")]
    UnsupportedPair { op_code: OpCode, operator: Operator },

    #[error("{op_code:?} takes no operand, got {len} bytes")]
    UnexpectedOperand { op_code: OpCode, len: usize },
}
