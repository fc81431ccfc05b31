//! Bluetooth Module
//!
//! BLE central side of the glucose and Nordic UART profiles. The radio stack
//! itself sits behind the [`transport::Transport`] trait.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────┐   ┌─────────────────────────┐
//! │    GlucoseMonitorService     │   │       UartService       │
//! │ (run_glucose_session driver) │   │ (send, play_macro)      │
//! └───────┬──────────┬───────────┘   └──────┬──────────────────┘
//!         │          │                      │
//!         ▼          ▼                      ▼
//! ┌────────────┐ ┌────────────┐  ┌────────────────────┐
//! │    RACP    │ │ Connection │  │     Transport      │
//! │            │ │            │  │                    │
//! │ - single   │ │ - profile  │  │ - GATT operations  │
//! │   slot     │ │   states   │  │ - inbound events   │
//! │ - outcomes │ │ - routing  │  └────────────────────┘
//! └─────┬──────┘ └────────────┘
//!       ▼
//! ┌────────────┐
//! │  Protocol  │
//! │ - codecs   │
//! └────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Glucose, RACP and UART wire formats
//! - [`connection`] - Profile definitions and the discovery state machine
//! - [`racp`] - Record Access Control Point request/response discipline
//! - [`transport`] - Transport seam and a recording implementation
//! - [`service`] - Glucose monitor coordinator and its async driver
//! - [`uart`] - Nordic UART command sender

pub mod connection;
pub mod protocol;
pub mod racp;
pub mod service;
pub mod transport;
pub mod uart;

// Re-export the services for convenience
pub use service::{run_glucose_session, GlucoseMonitorService, ServiceError};
pub use uart::UartService;
