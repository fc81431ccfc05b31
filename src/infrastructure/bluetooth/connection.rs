//! Device Profile State Machine
//!
//! Tracks discovery of one peripheral against a static profile table:
//!
//! ```text
//! Idle → ServicesDiscovered → CharacteristicsDiscovered → Subscribed → Ready
//!   └──────────────┴───────────────────┴──────────────────────┴──────┴─→ Disconnected
//! ```
//!
//! The machine performs no I/O. The transport reports discovery and
//! subscription completion; the machine answers with transitions and with
//! the characteristics that still need a subscription. Characteristic UUIDs
//! are resolved once into a routing table so notifications are dispatched by
//! role.

use crate::domain::models::{CharacteristicRole, ProfileState};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Expand a 16-bit SIG-assigned number onto the Bluetooth base UUID
pub const fn sig_uuid(short: u16) -> Uuid {
    Uuid::from_u128(((short as u128) << 96) | 0x0000_0000_0000_1000_8000_0080_5f9b_34fb)
}

pub const GLUCOSE_SERVICE_UUID: Uuid = sig_uuid(0x1808);
pub const GLUCOSE_MEASUREMENT_UUID: Uuid = sig_uuid(0x2A18);
pub const GLUCOSE_CONTEXT_UUID: Uuid = sig_uuid(0x2A34);
pub const RACP_UUID: Uuid = sig_uuid(0x2A52);

pub const UART_SERVICE_UUID: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);
pub const UART_RX_UUID: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);
pub const UART_TX_UUID: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

/// One row of a profile table
#[derive(Debug, Clone, Copy)]
pub struct CharacteristicSpec {
    pub role: CharacteristicRole,
    pub uuid: Uuid,
    /// Enable notifications / indications on discovery
    pub subscribe: bool,
    pub required: bool,
}

#[derive(Debug)]
pub struct ProfileDefinition {
    pub name: &'static str,
    pub service: Uuid,
    pub characteristics: &'static [CharacteristicSpec],
    pub control_point: Option<CharacteristicRole>,
}

pub static GLUCOSE_PROFILE: ProfileDefinition = ProfileDefinition {
    name: "Glucose",
    service: GLUCOSE_SERVICE_UUID,
    characteristics: &[
        CharacteristicSpec {
            role: CharacteristicRole::GlucoseMeasurement,
            uuid: GLUCOSE_MEASUREMENT_UUID,
            subscribe: true,
            required: true,
        },
        CharacteristicSpec {
            role: CharacteristicRole::GlucoseMeasurementContext,
            uuid: GLUCOSE_CONTEXT_UUID,
            subscribe: true,
            required: true,
        },
        CharacteristicSpec {
            role: CharacteristicRole::RecordAccessControlPoint,
            uuid: RACP_UUID,
            subscribe: true,
            required: true,
        },
    ],
    control_point: Some(CharacteristicRole::RecordAccessControlPoint),
};

pub static UART_PROFILE: ProfileDefinition = ProfileDefinition {
    name: "UART",
    service: UART_SERVICE_UUID,
    characteristics: &[
        CharacteristicSpec {
            role: CharacteristicRole::UartTx,
            uuid: UART_TX_UUID,
            subscribe: true,
            required: true,
        },
        CharacteristicSpec {
            role: CharacteristicRole::UartRx,
            uuid: UART_RX_UUID,
            subscribe: false,
            required: true,
        },
    ],
    control_point: None,
};

impl ProfileDefinition {
    fn spec_for_uuid(&self, uuid: &Uuid) -> Option<&CharacteristicSpec> {
        self.characteristics.iter().find(|c| c.uuid == *uuid)
    }

    fn spec_for_role(&self, role: CharacteristicRole) -> Option<&CharacteristicSpec> {
        self.characteristics.iter().find(|c| c.role == role)
    }
}

pub struct ProfileStateMachine {
    profile: &'static ProfileDefinition,
    state: ProfileState,
    routes: HashMap<Uuid, CharacteristicRole>,
    subscribed: HashSet<CharacteristicRole>,
}

impl ProfileStateMachine {
    pub fn new(profile: &'static ProfileDefinition) -> Self {
        Self {
            profile,
            state: ProfileState::Idle,
            routes: HashMap::new(),
            subscribed: HashSet::new(),
        }
    }

    pub fn profile(&self) -> &'static ProfileDefinition {
        self.profile
    }

    pub fn state(&self) -> ProfileState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ProfileState::Ready
    }

    /// Role of a discovered characteristic; `None` for anything unknown
    pub fn route(&self, uuid: &Uuid) -> Option<CharacteristicRole> {
        self.routes.get(uuid).copied()
    }

    /// UUID of a discovered characteristic by role
    pub fn uuid_for(&self, role: CharacteristicRole) -> Option<Uuid> {
        self.routes
            .iter()
            .find(|(_, r)| **r == role)
            .map(|(uuid, _)| *uuid)
    }

    /// A new connection restarts discovery
    pub fn on_connected(&mut self) -> Option<ProfileState> {
        self.reset();
        self.transition(ProfileState::Idle)
    }

    pub fn on_services_discovered(&mut self, services: &[Uuid]) -> Option<ProfileState> {
        if self.state != ProfileState::Idle {
            debug!("Ignoring service discovery in state {:?}", self.state);
            return None;
        }
        if !services.contains(&self.profile.service) {
            warn!(
                "{} service {} not offered by peripheral",
                self.profile.name, self.profile.service
            );
            return None;
        }
        self.transition(ProfileState::ServicesDiscovered)
    }

    pub fn on_characteristics_discovered(
        &mut self,
        service: &Uuid,
        characteristics: &[Uuid],
    ) -> Option<ProfileState> {
        if self.state != ProfileState::ServicesDiscovered || *service != self.profile.service {
            debug!(
                "Ignoring characteristics of {} in state {:?}",
                service, self.state
            );
            return None;
        }

        for uuid in characteristics {
            match self.profile.spec_for_uuid(uuid) {
                Some(spec) => {
                    debug!("Found {:?} characteristic", spec.role);
                    self.routes.insert(*uuid, spec.role);
                }
                None => debug!("Ignoring unknown characteristic {}", uuid),
            }
        }

        let missing: Vec<_> = self
            .profile
            .characteristics
            .iter()
            .filter(|c| c.required && !self.routes.contains_key(&c.uuid))
            .map(|c| c.role)
            .collect();
        if !missing.is_empty() {
            warn!("Required characteristics not found: {:?}", missing);
            return None;
        }

        self.transition(ProfileState::CharacteristicsDiscovered)
    }

    /// Discovered characteristics that should be subscribed but are not yet
    pub fn pending_subscriptions(&self) -> Vec<(CharacteristicRole, Uuid)> {
        self.profile
            .characteristics
            .iter()
            .filter(|c| c.subscribe)
            .filter(|c| self.routes.contains_key(&c.uuid))
            .filter(|c| !self.subscribed.contains(&c.role))
            .map(|c| (c.role, c.uuid))
            .collect()
    }

    pub fn on_subscribed(&mut self, characteristic: &Uuid) -> Option<ProfileState> {
        if !matches!(
            self.state,
            ProfileState::CharacteristicsDiscovered | ProfileState::Subscribed
        ) {
            debug!("Ignoring subscription in state {:?}", self.state);
            return None;
        }
        let Some(role) = self.route(characteristic) else {
            debug!("Ignoring subscription to unknown characteristic {}", characteristic);
            return None;
        };
        let subscribable = self
            .profile
            .spec_for_role(role)
            .map(|s| s.subscribe)
            .unwrap_or(false);
        if !subscribable {
            debug!("{:?} is not a notification characteristic", role);
            return None;
        }
        self.subscribed.insert(role);

        if self.all_subscribed() {
            self.transition(ProfileState::Ready)
        } else {
            self.transition(ProfileState::Subscribed)
        }
    }

    /// Ready needs every required notification characteristic, the control
    /// point among them when the profile has one
    fn all_subscribed(&self) -> bool {
        let control_point_ok = self
            .profile
            .control_point
            .map(|cp| self.subscribed.contains(&cp))
            .unwrap_or(true);
        let required_ok = self
            .profile
            .characteristics
            .iter()
            .filter(|c| c.subscribe && c.required)
            .all(|c| self.subscribed.contains(&c.role));
        control_point_ok && required_ok
    }

    /// Drops routes and subscriptions; valid from every state
    pub fn on_disconnected(&mut self) -> Option<ProfileState> {
        self.reset();
        self.transition(ProfileState::Disconnected)
    }

    fn reset(&mut self) {
        self.routes.clear();
        self.subscribed.clear();
    }

    fn transition(&mut self, next: ProfileState) -> Option<ProfileState> {
        if self.state == next {
            return None;
        }
        info!("{} profile: {:?} -> {:?}", self.profile.name, self.state, next);
        self.state = next;
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discovered_glucose() -> ProfileStateMachine {
        let mut sm = ProfileStateMachine::new(&GLUCOSE_PROFILE);
        sm.on_services_discovered(&[sig_uuid(0x180A), GLUCOSE_SERVICE_UUID]);
        sm.on_characteristics_discovered(
            &GLUCOSE_SERVICE_UUID,
            &[
                GLUCOSE_MEASUREMENT_UUID,
                sig_uuid(0x2A51), // glucose feature, not used
                GLUCOSE_CONTEXT_UUID,
                RACP_UUID,
            ],
        );
        sm
    }

    #[test]
    fn test_sig_uuid() {
        assert_eq!(
            GLUCOSE_MEASUREMENT_UUID.to_string(),
            "00002a18-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_glucose_discovery_to_ready() {
        let mut sm = discovered_glucose();
        assert_eq!(sm.state(), ProfileState::CharacteristicsDiscovered);
        assert_eq!(sm.pending_subscriptions().len(), 3);
        assert_eq!(
            sm.route(&RACP_UUID),
            Some(CharacteristicRole::RecordAccessControlPoint)
        );
        assert_eq!(sm.route(&sig_uuid(0x2A51)), None);

        assert_eq!(
            sm.on_subscribed(&GLUCOSE_MEASUREMENT_UUID),
            Some(ProfileState::Subscribed)
        );
        assert_eq!(sm.on_subscribed(&GLUCOSE_CONTEXT_UUID), None);
        assert_eq!(sm.state(), ProfileState::Subscribed);
        assert_eq!(sm.on_subscribed(&RACP_UUID), Some(ProfileState::Ready));
        assert!(sm.is_ready());
        assert!(sm.pending_subscriptions().is_empty());
    }

    #[test]
    fn test_control_point_required_for_ready() {
        let mut sm = discovered_glucose();
        sm.on_subscribed(&GLUCOSE_MEASUREMENT_UUID);
        sm.on_subscribed(&GLUCOSE_CONTEXT_UUID);
        assert_eq!(sm.state(), ProfileState::Subscribed);
        assert_eq!(
            sm.pending_subscriptions(),
            vec![(CharacteristicRole::RecordAccessControlPoint, RACP_UUID)]
        );
    }

    #[test]
    fn test_missing_service_stays_idle() {
        let mut sm = ProfileStateMachine::new(&GLUCOSE_PROFILE);
        assert_eq!(sm.on_services_discovered(&[sig_uuid(0x180D)]), None);
        assert_eq!(sm.state(), ProfileState::Idle);
    }

    #[test]
    fn test_missing_required_characteristic() {
        let mut sm = ProfileStateMachine::new(&GLUCOSE_PROFILE);
        sm.on_services_discovered(&[GLUCOSE_SERVICE_UUID]);
        assert_eq!(
            sm.on_characteristics_discovered(&GLUCOSE_SERVICE_UUID, &[GLUCOSE_MEASUREMENT_UUID]),
            None
        );
        assert_eq!(sm.state(), ProfileState::ServicesDiscovered);
    }

    #[test]
    fn test_unknown_uuids_ignored() {
        let mut sm = discovered_glucose();
        let unknown = Uuid::from_u128(0x1234);
        assert_eq!(sm.on_subscribed(&unknown), None);
        assert_eq!(sm.route(&unknown), None);
        assert_eq!(sm.state(), ProfileState::CharacteristicsDiscovered);
    }

    #[test]
    fn test_uart_ready_without_control_point() {
        let mut sm = ProfileStateMachine::new(&UART_PROFILE);
        sm.on_services_discovered(&[UART_SERVICE_UUID]);
        sm.on_characteristics_discovered(&UART_SERVICE_UUID, &[UART_RX_UUID, UART_TX_UUID]);
        assert_eq!(
            sm.pending_subscriptions(),
            vec![(CharacteristicRole::UartTx, UART_TX_UUID)]
        );
        // RX is write-only and never counts as a subscription
        assert_eq!(sm.on_subscribed(&UART_RX_UUID), None);
        assert_eq!(sm.on_subscribed(&UART_TX_UUID), Some(ProfileState::Ready));
        assert_eq!(sm.uuid_for(CharacteristicRole::UartRx), Some(UART_RX_UUID));
    }

    #[test]
    fn test_disconnect_from_any_state() {
        let mut sm = discovered_glucose();
        sm.on_subscribed(&GLUCOSE_MEASUREMENT_UUID);
        assert_eq!(sm.on_disconnected(), Some(ProfileState::Disconnected));
        assert_eq!(sm.route(&RACP_UUID), None);
        assert!(sm.pending_subscriptions().is_empty());

        // Events after disconnect are ignored until a new connection
        assert_eq!(sm.on_services_discovered(&[GLUCOSE_SERVICE_UUID]), None);
        assert_eq!(sm.on_connected(), Some(ProfileState::Idle));
        assert_eq!(
            sm.on_services_discovered(&[GLUCOSE_SERVICE_UUID]),
            Some(ProfileState::ServicesDiscovered)
        );

        let mut idle = ProfileStateMachine::new(&UART_PROFILE);
        assert_eq!(idle.on_disconnected(), Some(ProfileState::Disconnected));
    }
}
