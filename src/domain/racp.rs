//! Record Access Control Point types
//!
//! Op codes, operators and response codes of the RACP characteristic, plus the
//! validated command type that is the only thing the encoder accepts.

use crate::domain::error::{CommandError, DecodeError};
use serde::{Deserialize, Serialize};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    ReportStoredRecords = 1,
    DeleteStoredRecords = 2,
    Abort = 3,
    ReportNumberOfRecords = 4,
    NumberOfRecordsResponse = 5,
    ResponseCode = 6,
}

impl TryFrom<u8> for OpCode {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::ReportStoredRecords),
            2 => Ok(Self::DeleteStoredRecords),
            3 => Ok(Self::Abort),
            4 => Ok(Self::ReportNumberOfRecords),
            5 => Ok(Self::NumberOfRecordsResponse),
            6 => Ok(Self::ResponseCode),
            _ => Err(DecodeError::UnknownEnum {
                field: "op code",
                value,
            }),
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Null = 0,
    AllRecords = 1,
    LessOrEqual = 2,
    GreaterOrEqual = 3,
    WithinRange = 4,
    First = 5,
    Last = 6,
}

impl TryFrom<u8> for Operator {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Null),
            1 => Ok(Self::AllRecords),
            2 => Ok(Self::LessOrEqual),
            3 => Ok(Self::GreaterOrEqual),
            4 => Ok(Self::WithinRange),
            5 => Ok(Self::First),
            6 => Ok(Self::Last),
            _ => Err(DecodeError::UnknownEnum {
                field: "operator",
                value,
            }),
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    Success = 1,
    OpCodeNotSupported = 2,
    InvalidOperator = 3,
    OperatorNotSupported = 4,
    InvalidOperand = 5,
    NoRecordsFound = 6,
    AbortUnsuccessful = 7,
    ProcedureNotCompleted = 8,
    OperandNotSupported = 9,
}

impl TryFrom<u8> for ResponseCode {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Success),
            2 => Ok(Self::OpCodeNotSupported),
            3 => Ok(Self::InvalidOperator),
            4 => Ok(Self::OperatorNotSupported),
            5 => Ok(Self::InvalidOperand),
            6 => Ok(Self::NoRecordsFound),
            7 => Ok(Self::AbortUnsuccessful),
            8 => Ok(Self::ProcedureNotCompleted),
            9 => Ok(Self::OperandNotSupported),
            _ => Err(DecodeError::UnknownEnum {
                field: "response code",
                value,
            }),
        }
    }
}

impl ResponseCode {
    /// Human readable description, suitable for a status line
    pub fn description(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::OpCodeNotSupported => "Op code not supported",
            Self::InvalidOperator => "Invalid operator",
            Self::OperatorNotSupported => "Operator not supported",
            Self::InvalidOperand => "Invalid operand",
            Self::NoRecordsFound => "No records found",
            Self::AbortUnsuccessful => "Abort unsuccessful",
            Self::ProcedureNotCompleted => "Procedure not completed",
            Self::OperandNotSupported => "Operand not supported",
        }
    }
}

/// Which stored records a report request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportScope {
    #[default]
    All,
    First,
    Last,
}

impl ReportScope {
    pub fn operator(&self) -> Operator {
        match self {
            Self::All => Operator::AllRecords,
            Self::First => Operator::First,
            Self::Last => Operator::Last,
        }
    }
}

/// Which stored records a delete request removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteScope {
    AllRecords,
}

impl DeleteScope {
    pub fn operator(&self) -> Operator {
        match self {
            Self::AllRecords => Operator::AllRecords,
        }
    }
}

/// A RACP request that passed the op code / operator compatibility check.
///
/// Fields are private: the only ways to obtain one are [`RacpCommand::new`]
/// and the scoped constructors, so an encoded command is always valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RacpCommand {
    op_code: OpCode,
    operator: Operator,
    operand: Vec<u8>,
}

impl RacpCommand {
    /// Validate an `(op code, operator, operand)` triple.
    ///
    /// Accepted pairs, all with an empty operand:
    ///
    /// ```text
    /// ReportStoredRecords   : AllRecords | First | Last
    /// DeleteStoredRecords   : AllRecords
    /// ReportNumberOfRecords : AllRecords
    /// Abort                 : Null
    /// ```
    pub fn new(op_code: OpCode, operator: Operator, operand: &[u8]) -> Result<Self, CommandError> {
        let supported = matches!(
            (op_code, operator),
            (
                OpCode::ReportStoredRecords,
                Operator::AllRecords | Operator::First | Operator::Last
            ) | (OpCode::DeleteStoredRecords, Operator::AllRecords)
                | (OpCode::ReportNumberOfRecords, Operator::AllRecords)
                | (OpCode::Abort, Operator::Null)
        );
        if !supported {
            return Err(CommandError::UnsupportedPair { op_code, operator });
        }
        if !operand.is_empty() {
            return Err(CommandError::UnexpectedOperand {
                op_code,
                len: operand.len(),
            });
        }

        Ok(Self {
            op_code,
            operator,
            operand: operand.to_vec(),
        })
    }

    pub fn report(scope: ReportScope) -> Self {
        Self {
            op_code: OpCode::ReportStoredRecords,
            operator: scope.operator(),
            operand: Vec::new(),
        }
    }

    pub fn delete(scope: DeleteScope) -> Self {
        Self {
            op_code: OpCode::DeleteStoredRecords,
            operator: scope.operator(),
            operand: Vec::new(),
        }
    }

    pub fn report_number_of_records() -> Self {
        Self {
            op_code: OpCode::ReportNumberOfRecords,
            operator: Operator::AllRecords,
            operand: Vec::new(),
        }
    }

    pub fn abort() -> Self {
        Self {
            op_code: OpCode::Abort,
            operator: Operator::Null,
            operand: Vec::new(),
        }
    }

    pub fn op_code(&self) -> OpCode {
        self.op_code
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn operand(&self) -> &[u8] {
        &self.operand
    }
}

/// A decoded indication from the RACP characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RacpResponse {
    /// `[6][operator][request op code][response code]`
    ResponseCode {
        operator: Operator,
        request_op_code: OpCode,
        response_code: ResponseCode,
    },
    /// `[5][operator][count lo][count hi]`
    NumberOfRecords { operator: Operator, count: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    Response(ResponseCode),
    Timeout,
}

/// Result of feeding one RACP indication (or a timeout) to the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RacpOutcome {
    /// The outstanding request finished with `Success`
    Completed(OpCode),
    /// Answer to a ReportNumberOfRecords request
    RecordCount(u16),
    Failed(FailureCause),
    /// Response for a different op code than the one outstanding
    Ignored(OpCode),
    UnsolicitedResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_pairs_accepted() {
        for op in [Operator::AllRecords, Operator::First, Operator::Last] {
            assert!(RacpCommand::new(OpCode::ReportStoredRecords, op, &[]).is_ok());
        }
        assert!(RacpCommand::new(OpCode::DeleteStoredRecords, Operator::AllRecords, &[]).is_ok());
        assert!(RacpCommand::new(OpCode::Abort, Operator::Null, &[]).is_ok());
    }

    #[test]
    fn test_invalid_pairs_rejected() {
        assert_eq!(
            RacpCommand::new(OpCode::DeleteStoredRecords, Operator::Last, &[]),
            Err(CommandError::UnsupportedPair {
                op_code: OpCode::DeleteStoredRecords,
                operator: Operator::Last,
            })
        );
        assert!(RacpCommand::new(OpCode::ResponseCode, Operator::Null, &[]).is_err());
        assert!(RacpCommand::new(OpCode::ReportStoredRecords, Operator::Null, &[]).is_err());
    }

    #[test]
    fn test_operand_rejected() {
        assert_eq!(
            RacpCommand::new(OpCode::ReportStoredRecords, Operator::AllRecords, &[1, 0]),
            Err(CommandError::UnexpectedOperand {
                op_code: OpCode::ReportStoredRecords,
                len: 2,
            })
        );
    }

    #[test]
    fn test_scoped_constructors_match_table() {
        let cmd = RacpCommand::report(ReportScope::Last);
        assert_eq!(
            RacpCommand::new(cmd.op_code(), cmd.operator(), cmd.operand()),
            Ok(cmd)
        );
        let cmd = RacpCommand::delete(DeleteScope::AllRecords);
        assert_eq!(cmd.operator(), Operator::AllRecords);
    }

    #[test]
    fn test_unknown_values() {
        assert!(matches!(
            OpCode::try_from(7),
            Err(DecodeError::UnknownEnum { value: 7, .. })
        ));
        assert!(Operator::try_from(7).is_err());
        assert!(ResponseCode::try_from(0).is_err());
        assert!(ResponseCode::try_from(10).is_err());
        assert_eq!(ResponseCode::try_from(6), Ok(ResponseCode::NoRecordsFound));
    }
}
