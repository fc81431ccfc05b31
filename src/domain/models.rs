use crate::domain::error::{DecodeError, ProtocolError};
use crate::domain::racp::{DeleteScope, RacpOutcome, ReportScope};
use crate::domain::readings::ReadingRecord;

/// Discovery progress of one peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileState {
    Idle,
    ServicesDiscovered,
    CharacteristicsDiscovered,
    Subscribed,
    Ready,
    Disconnected,
}

/// What a characteristic is used for, resolved once at discovery time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacteristicRole {
    GlucoseMeasurement,
    GlucoseMeasurementContext,
    RecordAccessControlPoint,
    /// Nordic UART TX (peripheral to central, notify)
    UartTx,
    /// Nordic UART RX (central to peripheral, write)
    UartRx,
}

/// Events published by the services for a presentation layer
#[derive(Debug, Clone)]
pub enum AppEvent {
    ConnectionStatus(ConnectionStatus),
    ProfileState(ProfileState),
    /// Current reading set; sent after a clear and when a report completes
    Readings(Vec<ReadingRecord>),
    Racp(RacpOutcome),
    DecodeFailed {
        role: CharacteristicRole,
        error: DecodeError,
    },
    ProtocolViolation(ProtocolError),
    UartReceived {
        bytes: Vec<u8>,
        text: Option<String>,
    },
    LogMessage(StatusMessage),
}

/// User actions on the glucose monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlucoseCommand {
    /// Display selection changed (or refresh pressed): clear, then report
    Refresh(ReportScope),
    Clear,
    Delete(DeleteScope),
    ReportCount,
    Abort,
    Disconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}
