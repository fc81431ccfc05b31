//! BLE transport seam
//!
//! The concrete stack (CoreBluetooth, WinRT, BlueZ, a simulator) lives behind
//! [`Transport`]. It receives outbound GATT operations and feeds inbound
//! [`TransportEvent`]s back to a service.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteType {
    WithResponse,
    WithoutResponse,
}

/// Outbound GATT operations. Completion is reported later as an event.
pub trait Transport {
    fn connect(&mut self, peripheral_id: &str) -> Result<()>;
    fn discover_services(&mut self) -> Result<()>;
    fn discover_characteristics(&mut self, service: Uuid) -> Result<()>;
    fn subscribe(&mut self, characteristic: Uuid) -> Result<()>;
    fn write(&mut self, characteristic: Uuid, value: &[u8], write_type: WriteType) -> Result<()>;
    fn disconnect(&mut self) -> Result<()>;
}

/// Inbound events, in the order the stack delivered them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TransportEvent {
    Connected,
    ServicesDiscovered {
        services: Vec<Uuid>,
    },
    CharacteristicsDiscovered {
        service: Uuid,
        characteristics: Vec<Uuid>,
    },
    Subscribed {
        characteristic: Uuid,
    },
    /// Notification or indication value
    Notification {
        characteristic: Uuid,
        value: Vec<u8>,
    },
    Disconnected,
}

/// One call made on a [`RecordingTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Connect(String),
    DiscoverServices,
    DiscoverCharacteristics(Uuid),
    Subscribe(Uuid),
    Write {
        characteristic: Uuid,
        value: Vec<u8>,
        write_type: WriteType,
    },
    Disconnect,
}

/// Transport that performs no radio work: it logs and records every call.
///
/// Used to replay captured sessions and in tests. Clones share the call log.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    calls: Arc<Mutex<Vec<TransportCall>>>,
    fail_writes: bool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose writes always fail
    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Values written to one characteristic, oldest first
    pub fn writes_to(&self, characteristic: Uuid) -> Vec<Vec<u8>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Write {
                    characteristic: c,
                    value,
                    ..
                } if c == characteristic => Some(value),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: TransportCall) -> Result<()> {
        debug!("Transport call: {:?}", call);
        self.calls
            .lock()
            .map_err(|_| anyhow::anyhow!("Lock error"))?
            .push(call);
        Ok(())
    }
}

impl Transport for RecordingTransport {
    fn connect(&mut self, peripheral_id: &str) -> Result<()> {
        info!("Connecting to {}", peripheral_id);
        self.record(TransportCall::Connect(peripheral_id.to_string()))
    }

    fn discover_services(&mut self) -> Result<()> {
        self.record(TransportCall::DiscoverServices)
    }

    fn discover_characteristics(&mut self, service: Uuid) -> Result<()> {
        self.record(TransportCall::DiscoverCharacteristics(service))
    }

    fn subscribe(&mut self, characteristic: Uuid) -> Result<()> {
        self.record(TransportCall::Subscribe(characteristic))
    }

    fn write(&mut self, characteristic: Uuid, value: &[u8], write_type: WriteType) -> Result<()> {
        if self.fail_writes {
            anyhow::bail!("Write to {} failed", characteristic);
        }
        self.record(TransportCall::Write {
            characteristic,
            value: value.to_vec(),
            write_type,
        })
    }

    fn disconnect(&mut self) -> Result<()> {
        self.record(TransportCall::Disconnect)
    }
}
