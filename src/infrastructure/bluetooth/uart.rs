//! Nordic UART Service
//!
//! Same discovery flow as the glucose service. Text received on TX is
//! published as [`AppEvent::UartReceived`]; commands and macros are written
//! to RX in chunks no longer than the configured write length.

use crate::domain::models::{
    AppEvent, CharacteristicRole, ConnectionStatus, MessageSeverity, ProfileState, StatusMessage,
};
use crate::domain::settings::UartSettings;
use crate::domain::uart::{UartCommand, UartMacro};
use crate::infrastructure::bluetooth::connection::{ProfileStateMachine, UART_PROFILE};
use crate::infrastructure::bluetooth::protocol::encode_uart_command;
use crate::infrastructure::bluetooth::service::{advance_discovery, ServiceError};
use crate::infrastructure::bluetooth::transport::{Transport, TransportEvent};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info};

pub struct UartService<T: Transport> {
    transport: T,
    profile: ProfileStateMachine,
    event_sender: mpsc::UnboundedSender<AppEvent>,
    settings: UartSettings,
}

impl<T: Transport> UartService<T> {
    pub fn new(
        transport: T,
        event_sender: mpsc::UnboundedSender<AppEvent>,
        settings: UartSettings,
    ) -> Self {
        Self {
            transport,
            profile: ProfileStateMachine::new(&UART_PROFILE),
            event_sender,
            settings,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn state(&self) -> ProfileState {
        self.profile.state()
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match &event {
            TransportEvent::Notification {
                characteristic,
                value,
            } => {
                if self.profile.route(characteristic) == Some(CharacteristicRole::UartTx) {
                    let text = String::from_utf8(value.clone()).ok();
                    debug!("UART received {} bytes", value.len());
                    self.publish(AppEvent::UartReceived {
                        bytes: value.clone(),
                        text,
                    });
                } else {
                    debug!("Ignoring notification from {}", characteristic);
                }
                return;
            }
            TransportEvent::Connected => {
                self.publish(AppEvent::ConnectionStatus(ConnectionStatus::Connected));
            }
            TransportEvent::Disconnected => {
                self.publish(AppEvent::ConnectionStatus(ConnectionStatus::Disconnected));
            }
            _ => {}
        }

        match advance_discovery(&mut self.profile, &mut self.transport, &event) {
            Ok(Some(state)) => self.publish(AppEvent::ProfileState(state)),
            Ok(None) => {}
            Err(e) => {
                error!("UART discovery step failed: {}", e);
                self.publish(AppEvent::LogMessage(StatusMessage {
                    message: format!("Discovery failed: {}", e),
                    severity: MessageSeverity::Error,
                }));
            }
        }
    }

    /// Write one command to RX
    pub fn send(&mut self, command: &UartCommand) -> Result<(), ServiceError> {
        if !self.profile.is_ready() {
            return Err(ServiceError::NotReady);
        }
        let rx = self
            .profile
            .uuid_for(CharacteristicRole::UartRx)
            .ok_or(ServiceError::NotReady)?;

        let bytes = encode_uart_command(command);
        debug!("Sending {:?} ({} bytes)", command.title(), bytes.len());
        for chunk in bytes.chunks(self.settings.max_write_len.max(1)) {
            self.transport.write(rx, chunk, self.settings.write_type)?;
        }
        Ok(())
    }

    /// Send every step of a macro, pausing `delay` between two steps
    pub async fn play_macro(&mut self, uart_macro: &UartMacro) -> Result<(), ServiceError> {
        info!(
            "Playing macro '{}' ({} commands)",
            uart_macro.name,
            uart_macro.commands.len()
        );
        for (index, command) in uart_macro.commands.iter().enumerate() {
            if index > 0 && uart_macro.delay_ms > 0 {
                sleep(Duration::from_millis(uart_macro.delay_ms)).await;
            }
            self.send(command)?;
        }
        info!("Macro '{}' finished", uart_macro.name);
        Ok(())
    }

    fn publish(&self, event: AppEvent) {
        let _ = self.event_sender.send(event);
    }
}
