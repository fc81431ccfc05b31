//! RACP Session Coordinator
//!
//! The glucose sensor accepts one Record Access Control Point procedure at a
//! time. The coordinator holds a single slot for the outstanding op code:
//! requests fail with [`ProtocolError::RequestInFlight`] while it is taken,
//! and every response or timeout empties it. There is no queue and no retry.

use crate::domain::error::{DecodeError, ProtocolError};
use crate::domain::racp::{
    DeleteScope, FailureCause, OpCode, RacpCommand, RacpOutcome, RacpResponse, ReportScope,
    ResponseCode,
};
use crate::infrastructure::bluetooth::protocol::{decode_racp_response, encode_racp_command};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct RacpSession {
    outstanding: Option<OpCode>,
}

impl RacpSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Op code of the request waiting for a response
    pub fn outstanding(&self) -> Option<OpCode> {
        self.outstanding
    }

    pub fn is_busy(&self) -> bool {
        self.outstanding.is_some()
    }

    /// Claim the slot and return the bytes to write to the control point
    pub fn request(&mut self, command: RacpCommand) -> Result<Vec<u8>, ProtocolError> {
        if let Some(pending) = self.outstanding {
            warn!(
                "Rejecting {:?}: {:?} still outstanding",
                command.op_code(),
                pending
            );
            return Err(ProtocolError::RequestInFlight { pending });
        }
        debug!("RACP request {:?} / {:?}", command.op_code(), command.operator());
        self.outstanding = Some(command.op_code());
        Ok(encode_racp_command(&command))
    }

    pub fn request_report(&mut self, scope: ReportScope) -> Result<Vec<u8>, ProtocolError> {
        self.request(RacpCommand::report(scope))
    }

    pub fn request_delete(&mut self, scope: DeleteScope) -> Result<Vec<u8>, ProtocolError> {
        self.request(RacpCommand::delete(scope))
    }

    pub fn request_record_count(&mut self) -> Result<Vec<u8>, ProtocolError> {
        self.request(RacpCommand::report_number_of_records())
    }

    /// Abort is the one command sent while another procedure is running; it
    /// takes over the slot. With nothing outstanding it is an ordinary
    /// request.
    pub fn request_abort(&mut self) -> Vec<u8> {
        if let Some(pending) = self.outstanding {
            info!("Aborting outstanding {:?}", pending);
        }
        let command = RacpCommand::abort();
        self.outstanding = Some(command.op_code());
        encode_racp_command(&command)
    }

    /// Interpret one indication from the control point.
    ///
    /// Decode errors are returned and leave the slot as it was.
    pub fn on_response_received(&mut self, bytes: &[u8]) -> Result<RacpOutcome, DecodeError> {
        let response = decode_racp_response(bytes)?;

        let Some(pending) = self.outstanding else {
            warn!("Unsolicited RACP response {:?}", response);
            return Ok(RacpOutcome::UnsolicitedResponse);
        };

        match response {
            RacpResponse::ResponseCode {
                request_op_code,
                response_code,
                ..
            } => {
                if request_op_code != pending {
                    warn!(
                        "Ignoring response for {:?} while {:?} is outstanding",
                        request_op_code, pending
                    );
                    return Ok(RacpOutcome::Ignored(request_op_code));
                }
                self.outstanding = None;
                if response_code == ResponseCode::Success {
                    info!("RACP {:?} completed", pending);
                    Ok(RacpOutcome::Completed(pending))
                } else {
                    warn!("RACP {:?} failed: {}", pending, response_code.description());
                    Ok(RacpOutcome::Failed(FailureCause::Response(response_code)))
                }
            }
            RacpResponse::NumberOfRecords { count, .. } => {
                if pending != OpCode::ReportNumberOfRecords {
                    warn!("Ignoring record count while {:?} is outstanding", pending);
                    return Ok(RacpOutcome::Ignored(OpCode::NumberOfRecordsResponse));
                }
                self.outstanding = None;
                info!("Peripheral holds {} records", count);
                Ok(RacpOutcome::RecordCount(count))
            }
        }
    }

    /// Force the outstanding request to fail, e.g. when an external timer
    /// fires. `None` when nothing was outstanding.
    pub fn expire(&mut self) -> Option<RacpOutcome> {
        let pending = self.outstanding.take()?;
        warn!("RACP {:?} timed out", pending);
        Some(RacpOutcome::Failed(FailureCause::Timeout))
    }

    /// Forget the outstanding request without an outcome (disconnect, or a
    /// write that never reached the peripheral)
    pub fn reset(&mut self) {
        self.outstanding = None;
    }
}
