use ble_toolbox::domain::error::{DecodeError, ProtocolError};
use ble_toolbox::domain::glucose::{Meal, SFloat};
use ble_toolbox::domain::models::{AppEvent, GlucoseCommand};
use ble_toolbox::domain::racp::{
    DeleteScope, OpCode, RacpCommand, RacpOutcome, ReportScope,
};
use ble_toolbox::domain::settings::GlucoseSettings;
use ble_toolbox::domain::uart::{UartCommand, UartMacro};
use ble_toolbox::infrastructure::bluetooth::connection::{
    GLUCOSE_CONTEXT_UUID, GLUCOSE_MEASUREMENT_UUID, GLUCOSE_SERVICE_UUID, RACP_UUID,
};
use ble_toolbox::infrastructure::bluetooth::protocol::{
    decode_glucose_context, decode_glucose_reading, decode_racp_command, decode_uart_command,
    encode_racp_command, encode_uart_command, glucose_context_len, glucose_reading_len,
};
use ble_toolbox::infrastructure::bluetooth::racp::RacpSession;
use ble_toolbox::infrastructure::bluetooth::transport::{RecordingTransport, TransportEvent};
use ble_toolbox::infrastructure::bluetooth::{run_glucose_session, GlucoseMonitorService};
use tokio::sync::mpsc;

fn discovery() -> Vec<TransportEvent> {
    vec![
        TransportEvent::Connected,
        TransportEvent::ServicesDiscovered {
            services: vec![GLUCOSE_SERVICE_UUID],
        },
        TransportEvent::CharacteristicsDiscovered {
            service: GLUCOSE_SERVICE_UUID,
            characteristics: vec![GLUCOSE_MEASUREMENT_UUID, GLUCOSE_CONTEXT_UUID, RACP_UUID],
        },
        TransportEvent::Subscribed {
            characteristic: GLUCOSE_MEASUREMENT_UUID,
        },
        TransportEvent::Subscribed {
            characteristic: GLUCOSE_CONTEXT_UUID,
        },
        TransportEvent::Subscribed {
            characteristic: RACP_UUID,
        },
    ]
}

fn measurement(seq: u16) -> Vec<u8> {
    let [lo, hi] = seq.to_le_bytes();
    vec![0x00, lo, hi, 0xE8, 0x07, 3, 14, 9, 30, 0]
}

fn context_with_meal(seq: u16, meal: u8) -> Vec<u8> {
    let [lo, hi] = seq.to_le_bytes();
    vec![0x02, lo, hi, meal]
}

fn notify(characteristic: uuid::Uuid, value: Vec<u8>) -> TransportEvent {
    TransportEvent::Notification {
        characteristic,
        value,
    }
}

fn manual_service() -> (
    GlucoseMonitorService<RecordingTransport>,
    RecordingTransport,
    mpsc::UnboundedReceiver<AppEvent>,
) {
    let transport = RecordingTransport::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let settings = GlucoseSettings {
        auto_report_on_ready: false,
        ..GlucoseSettings::default()
    };
    let mut service = GlucoseMonitorService::new(transport.clone(), tx, settings);
    for event in discovery() {
        service.handle_transport_event(event);
    }
    (service, transport, rx)
}

#[test]
fn racp_commands_survive_the_wire() {
    let commands = [
        RacpCommand::report(ReportScope::All),
        RacpCommand::report(ReportScope::First),
        RacpCommand::report(ReportScope::Last),
        RacpCommand::delete(DeleteScope::AllRecords),
        RacpCommand::report_number_of_records(),
        RacpCommand::abort(),
    ];
    for command in commands {
        let bytes = encode_racp_command(&command);
        assert_eq!(decode_racp_command(&bytes), Ok(command));
    }
}

#[test]
fn uart_commands_survive_the_wire() {
    for command in [
        UartCommand::text("Play", "Play"),
        UartCommand::text("", "Empty"),
        UartCommand::data(vec![0x00, 0xFF, 0x7F], "Raw"),
    ] {
        let bytes = encode_uart_command(&command);
        let back = decode_uart_command(command.kind(), command.icon().clone(), &bytes);
        assert_eq!(back, Ok(command));
    }
}

#[test]
fn macro_documents_round_trip() {
    let mut full = UartMacro::new("Presenter", 0);
    full.push(UartCommand::text("next", "Forward"));
    full.push(UartCommand::data(vec![1, 2, 3], "Back"));

    for m in [full, UartMacro::new("Empty", 0), UartMacro::new("Slow", 60_000)] {
        assert!(m.validate().is_ok());
        let bytes = m.serialize().unwrap();
        assert_eq!(UartMacro::deserialize(&bytes).unwrap(), m);
    }
}

#[test]
fn flag_derived_lengths_are_exact() {
    for flags in 0u8..=0x1F {
        let len = glucose_reading_len(flags);
        let mut bytes = vec![0u8; len];
        bytes[0] = flags;
        assert!(decode_glucose_reading(&bytes).is_ok(), "flags {:#04x}", flags);
        assert_eq!(
            decode_glucose_reading(&bytes[..len - 1]),
            Err(DecodeError::TooShort {
                expected: len,
                actual: len - 1
            })
        );
    }

    for flags in 0u8..=0xFF {
        let len = glucose_context_len(flags);
        let mut bytes = vec![0u8; len];
        bytes[0] = flags;
        assert!(decode_glucose_context(&bytes).is_ok(), "flags {:#04x}", flags);
        assert!(matches!(
            decode_glucose_context(&bytes[..len - 1]),
            Err(DecodeError::TooShort { .. })
        ));
    }
}

#[test]
fn sfloat_sentinels() {
    for exponent in 0u16..16 {
        let raw = (exponent << 12) | 0x07FF;
        let value = SFloat::from_raw(raw);
        assert!(!value.is_finite());
        assert_eq!(value.value(), None);
    }
    assert_eq!(SFloat::from_raw(0x0000).value(), Some(0.0));
}

#[test]
fn request_in_flight_leaves_pending_request() {
    let mut session = RacpSession::new();
    session.request_report(ReportScope::All).unwrap();
    assert_eq!(
        session.request_report(ReportScope::Last),
        Err(ProtocolError::RequestInFlight {
            pending: OpCode::ReportStoredRecords
        })
    );
    assert_eq!(session.outstanding(), Some(OpCode::ReportStoredRecords));
}

#[test]
fn delete_all_clears_before_request() {
    let (mut service, transport, mut rx) = manual_service();
    service.refresh(ReportScope::All).unwrap();
    service.handle_transport_event(notify(GLUCOSE_MEASUREMENT_UUID, measurement(1)));
    service.handle_transport_event(notify(RACP_UUID, vec![6, 0, 1, 1]));
    assert_eq!(service.snapshot().len(), 1);

    service.handle_command(GlucoseCommand::Delete(DeleteScope::AllRecords));
    assert!(service.snapshot().is_empty());
    assert_eq!(transport.writes_to(RACP_UUID).last(), Some(&vec![2, 1]));

    while rx.try_recv().is_ok() {}
    service.handle_transport_event(notify(RACP_UUID, vec![6, 1, 2, 1]));
    assert!(!service.racp().is_busy());
    assert!(service.snapshot().is_empty());

    let mut outcomes = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let AppEvent::Racp(outcome) = event {
            outcomes.push(outcome);
        }
    }
    assert_eq!(
        outcomes,
        vec![RacpOutcome::Completed(OpCode::DeleteStoredRecords)]
    );
}

#[test]
fn contexts_pair_with_their_readings() {
    let (mut service, _transport, _rx) = manual_service();
    service.refresh(ReportScope::All).unwrap();
    service.handle_transport_event(notify(GLUCOSE_MEASUREMENT_UUID, measurement(5)));
    service.handle_transport_event(notify(GLUCOSE_MEASUREMENT_UUID, measurement(6)));
    service.handle_transport_event(notify(GLUCOSE_CONTEXT_UUID, context_with_meal(6, 1)));

    let snapshot = service.snapshot();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[0].reading.sequence_number, 5);
    assert!(snapshot[0].context.is_none());
    assert_eq!(snapshot[1].reading.sequence_number, 6);
    assert_eq!(
        snapshot[1].context.as_ref().map(|c| c.meal),
        Some(Some(Meal::Preprandial))
    );
}

#[tokio::test]
async fn replayed_capture_produces_readings() {
    let capture = serde_json::json!([
        {"event": "connected"},
        {"event": "services_discovered", "services": [GLUCOSE_SERVICE_UUID]},
        {"event": "characteristics_discovered", "service": GLUCOSE_SERVICE_UUID,
         "characteristics": [GLUCOSE_MEASUREMENT_UUID, GLUCOSE_CONTEXT_UUID, RACP_UUID]},
        {"event": "subscribed", "characteristic": GLUCOSE_MEASUREMENT_UUID},
        {"event": "subscribed", "characteristic": GLUCOSE_CONTEXT_UUID},
        {"event": "subscribed", "characteristic": RACP_UUID},
        {"event": "notification", "characteristic": GLUCOSE_MEASUREMENT_UUID, "value": measurement(1)},
        {"event": "notification", "characteristic": GLUCOSE_MEASUREMENT_UUID, "value": measurement(2)},
        {"event": "notification", "characteristic": RACP_UUID, "value": [6, 0, 1, 1]}
    ]);
    let events: Vec<TransportEvent> = serde_json::from_value(capture).unwrap();

    let transport = RecordingTransport::new();
    let (app_tx, mut app_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::unbounded_channel::<GlucoseCommand>();
    let service = GlucoseMonitorService::new(transport.clone(), app_tx, GlucoseSettings::default());

    for event in events {
        event_tx.send(event).unwrap();
    }
    drop(event_tx);
    drop(command_tx);

    let service = run_glucose_session(service, event_rx, command_rx).await;
    assert_eq!(service.snapshot().len(), 2);
    assert_eq!(transport.writes_to(RACP_UUID), vec![vec![1, 1]]);

    let mut completed = false;
    while let Ok(event) = app_rx.try_recv() {
        if let AppEvent::Racp(RacpOutcome::Completed(OpCode::ReportStoredRecords)) = event {
            completed = true;
        }
    }
    assert!(completed);
}
