//! Glucose Monitor Service
//!
//! Wires the profile state machine, the RACP coordinator and the reading
//! aggregator to a [`Transport`], and publishes [`AppEvent`]s for whatever
//! presentation layer is listening. [`run_glucose_session`] drives a service
//! from channels and owns the RACP timeout.

use crate::domain::error::{DecodeError, ProtocolError};
use crate::domain::models::{
    AppEvent, CharacteristicRole, ConnectionStatus, GlucoseCommand, MessageSeverity,
    ProfileState, StatusMessage,
};
use crate::domain::racp::{DeleteScope, FailureCause, RacpOutcome, ReportScope};
use crate::domain::readings::{ReadingAggregator, ReadingRecord};
use crate::domain::settings::GlucoseSettings;
use crate::infrastructure::bluetooth::connection::{ProfileStateMachine, GLUCOSE_PROFILE};
use crate::infrastructure::bluetooth::protocol::{decode_glucose_context, decode_glucose_reading};
use crate::infrastructure::bluetooth::racp::RacpSession;
use crate::infrastructure::bluetooth::transport::{Transport, TransportEvent, WriteType};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("peripheral is not ready")]
    NotReady,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

/// Feed one discovery event to the state machine and issue the GATT calls
/// the new state needs
pub(crate) fn advance_discovery<T: Transport>(
    profile: &mut ProfileStateMachine,
    transport: &mut T,
    event: &TransportEvent,
) -> anyhow::Result<Option<ProfileState>> {
    match event {
        TransportEvent::Connected => {
            let transition = profile.on_connected();
            transport.discover_services()?;
            Ok(transition)
        }
        TransportEvent::ServicesDiscovered { services } => {
            let transition = profile.on_services_discovered(services);
            if transition.is_some() {
                transport.discover_characteristics(profile.profile().service)?;
            }
            Ok(transition)
        }
        TransportEvent::CharacteristicsDiscovered {
            service,
            characteristics,
        } => {
            let transition = profile.on_characteristics_discovered(service, characteristics);
            if transition.is_some() {
                for (role, uuid) in profile.pending_subscriptions() {
                    debug!("Subscribing to {:?}", role);
                    transport.subscribe(uuid)?;
                }
            }
            Ok(transition)
        }
        TransportEvent::Subscribed { characteristic } => Ok(profile.on_subscribed(characteristic)),
        TransportEvent::Disconnected => Ok(profile.on_disconnected()),
        TransportEvent::Notification { .. } => Ok(None),
    }
}

pub struct GlucoseMonitorService<T: Transport> {
    transport: T,
    profile: ProfileStateMachine,
    racp: RacpSession,
    readings: ReadingAggregator,
    event_sender: mpsc::UnboundedSender<AppEvent>,
    settings: GlucoseSettings,
    last_activity: Option<Instant>,
}

impl<T: Transport> GlucoseMonitorService<T> {
    pub fn new(
        transport: T,
        event_sender: mpsc::UnboundedSender<AppEvent>,
        settings: GlucoseSettings,
    ) -> Self {
        Self {
            transport,
            profile: ProfileStateMachine::new(&GLUCOSE_PROFILE),
            racp: RacpSession::new(),
            readings: ReadingAggregator::new(),
            event_sender,
            settings,
            last_activity: None,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn state(&self) -> ProfileState {
        self.profile.state()
    }

    pub fn racp(&self) -> &RacpSession {
        &self.racp
    }

    pub fn snapshot(&self) -> Vec<ReadingRecord> {
        self.readings.snapshot()
    }

    pub fn connect(&mut self, peripheral_id: &str) -> Result<(), ServiceError> {
        self.publish(AppEvent::ConnectionStatus(ConnectionStatus::Connecting));
        if let Err(e) = self.transport.connect(peripheral_id) {
            self.publish(AppEvent::ConnectionStatus(ConnectionStatus::Error));
            return Err(e.into());
        }
        Ok(())
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match &event {
            TransportEvent::Notification {
                characteristic,
                value,
            } => {
                self.handle_notification(characteristic, value);
                return;
            }
            TransportEvent::Connected => {
                info!("Peripheral connected");
                // A reconnect may arrive without a disconnect first
                self.teardown();
                self.publish(AppEvent::ConnectionStatus(ConnectionStatus::Connected));
            }
            TransportEvent::Disconnected => {
                self.teardown();
                self.publish(AppEvent::ConnectionStatus(ConnectionStatus::Disconnected));
            }
            _ => {}
        }

        match advance_discovery(&mut self.profile, &mut self.transport, &event) {
            Ok(Some(state)) => {
                self.publish(AppEvent::ProfileState(state));
                if state == ProfileState::Ready && self.settings.auto_report_on_ready {
                    let scope = self.settings.default_scope;
                    if let Err(e) = self.refresh(scope) {
                        self.report_error("Initial report request failed", &e);
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                error!("Discovery step failed: {}", e);
                self.send_log(&format!("Discovery failed: {}", e), MessageSeverity::Error);
            }
        }
    }

    pub fn handle_command(&mut self, command: GlucoseCommand) {
        let result = match command {
            GlucoseCommand::Refresh(scope) => self.refresh(scope),
            GlucoseCommand::Clear => {
                self.clear();
                Ok(())
            }
            GlucoseCommand::Delete(scope) => self.delete(scope),
            GlucoseCommand::ReportCount => self.report_count(),
            GlucoseCommand::Abort => self.abort(),
            GlucoseCommand::Disconnect => self.disconnect(),
        };
        if let Err(e) = result {
            self.report_error(&format!("{:?} failed", command), &e);
        }
    }

    /// Clear the displayed readings and ask for the records in `scope`
    pub fn refresh(&mut self, scope: ReportScope) -> Result<(), ServiceError> {
        self.ensure_ready()?;
        let bytes = self.racp.request_report(scope)?;
        self.clear();
        self.write_racp(&bytes)
    }

    /// Clear the displayed readings and delete the stored records
    pub fn delete(&mut self, scope: DeleteScope) -> Result<(), ServiceError> {
        self.ensure_ready()?;
        let bytes = self.racp.request_delete(scope)?;
        self.clear();
        self.write_racp(&bytes)
    }

    pub fn report_count(&mut self) -> Result<(), ServiceError> {
        self.ensure_ready()?;
        let bytes = self.racp.request_record_count()?;
        self.write_racp(&bytes)
    }

    pub fn abort(&mut self) -> Result<(), ServiceError> {
        self.ensure_ready()?;
        let bytes = self.racp.request_abort();
        self.write_racp(&bytes)
    }

    pub fn clear(&mut self) {
        self.readings.clear();
        self.publish(AppEvent::Readings(Vec::new()));
    }

    pub fn disconnect(&mut self) -> Result<(), ServiceError> {
        self.teardown();
        self.transport.disconnect()?;
        Ok(())
    }

    /// When the outstanding RACP request should be given up, if any.
    /// Every record received for it pushes the deadline back.
    pub fn racp_deadline(&self) -> Option<Instant> {
        if self.settings.racp_timeout_ms == 0 {
            return None;
        }
        self.last_activity
            .map(|t| t + Duration::from_millis(self.settings.racp_timeout_ms))
    }

    /// Fail the outstanding request with a timeout
    pub fn expire_request(&mut self) {
        self.last_activity = None;
        if let Some(outcome) = self.racp.expire() {
            self.send_log("Record access request timed out", MessageSeverity::Error);
            self.publish(AppEvent::Racp(outcome));
        }
    }

    fn ensure_ready(&self) -> Result<(), ServiceError> {
        if self.profile.is_ready() {
            Ok(())
        } else {
            Err(ServiceError::NotReady)
        }
    }

    fn write_racp(&mut self, bytes: &[u8]) -> Result<(), ServiceError> {
        let uuid = self
            .profile
            .uuid_for(CharacteristicRole::RecordAccessControlPoint)
            .ok_or(ServiceError::NotReady)?;
        if let Err(e) = self.transport.write(uuid, bytes, WriteType::WithResponse) {
            // The peripheral never saw it; free the slot
            self.racp.reset();
            self.last_activity = None;
            return Err(e.into());
        }
        self.last_activity = Some(Instant::now());
        Ok(())
    }

    fn handle_notification(&mut self, characteristic: &Uuid, value: &[u8]) {
        let Some(role) = self.profile.route(characteristic) else {
            debug!("Ignoring notification from {}", characteristic);
            return;
        };

        match role {
            CharacteristicRole::GlucoseMeasurement => match decode_glucose_reading(value) {
                Ok(reading) => {
                    debug!("Reading #{}", reading.sequence_number);
                    self.readings.add_reading(reading);
                    self.touch_request();
                }
                Err(e) => self.decode_failed(role, e),
            },
            CharacteristicRole::GlucoseMeasurementContext => match decode_glucose_context(value) {
                Ok(context) => {
                    debug!("Context #{}", context.sequence_number);
                    self.readings.add_context(context);
                    self.touch_request();
                }
                Err(e) => self.decode_failed(role, e),
            },
            CharacteristicRole::RecordAccessControlPoint => self.handle_racp(value),
            other => debug!("No handler for {:?}", other),
        }
    }

    fn touch_request(&mut self) {
        if self.racp.is_busy() {
            self.last_activity = Some(Instant::now());
        }
    }

    fn handle_racp(&mut self, value: &[u8]) {
        let outcome = match self.racp.on_response_received(value) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.decode_failed(CharacteristicRole::RecordAccessControlPoint, e);
                return;
            }
        };
        if !self.racp.is_busy() {
            self.last_activity = None;
        }

        match outcome {
            RacpOutcome::Completed(op_code) => {
                info!("{:?} finished with {} readings", op_code, self.readings.len());
                self.publish(AppEvent::Readings(self.readings.snapshot()));
            }
            RacpOutcome::Failed(FailureCause::Response(code)) => {
                self.send_log(
                    &format!("Record access failed: {}", code.description()),
                    MessageSeverity::Error,
                );
            }
            RacpOutcome::UnsolicitedResponse => {
                self.publish(AppEvent::ProtocolViolation(
                    ProtocolError::UnsolicitedResponse,
                ));
            }
            RacpOutcome::RecordCount(_)
            | RacpOutcome::Ignored(_)
            | RacpOutcome::Failed(FailureCause::Timeout) => {}
        }
        self.publish(AppEvent::Racp(outcome));
    }

    fn decode_failed(&self, role: CharacteristicRole, error: DecodeError) {
        warn!("Could not decode {:?} value: {}", role, error);
        self.publish(AppEvent::DecodeFailed { role, error });
    }

    /// Session state does not survive a disconnect
    fn teardown(&mut self) {
        self.racp.reset();
        self.last_activity = None;
        self.readings.clear();
    }

    fn report_error(&self, context: &str, e: &ServiceError) {
        warn!("{}: {}", context, e);
        if let ServiceError::Protocol(p) = e {
            self.publish(AppEvent::ProtocolViolation(*p));
        }
        self.send_log(&format!("{}: {}", context, e), MessageSeverity::Warning);
    }

    fn publish(&self, event: AppEvent) {
        let _ = self.event_sender.send(event);
    }

    fn send_log(&self, message: &str, severity: MessageSeverity) {
        self.publish(AppEvent::LogMessage(StatusMessage {
            message: message.to_string(),
            severity,
        }));
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

/// Drive a service until the transport event stream ends.
///
/// Transport events take priority over user commands so records are handled
/// in delivery order. The service is handed back for inspection.
pub async fn run_glucose_session<T: Transport>(
    mut service: GlucoseMonitorService<T>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    mut commands: mpsc::UnboundedReceiver<GlucoseCommand>,
) -> GlucoseMonitorService<T> {
    let mut commands_open = true;
    loop {
        let deadline = service.racp_deadline();
        tokio::select! {
            biased;
            event = events.recv() => match event {
                Some(event) => service.handle_transport_event(event),
                None => break,
            },
            command = commands.recv(), if commands_open => match command {
                Some(command) => service.handle_command(command),
                None => commands_open = false,
            },
            _ = wait_until(deadline) => service.expire_request(),
        }
    }
    info!("Glucose session ended");
    service
}
