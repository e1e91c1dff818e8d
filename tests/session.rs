use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use uwave_modem::metrics::sound_velocity;
use uwave_modem::transport::{MockConnector, MockLink};
use uwave_modem::{MemorySink, ModemConfig, ModemError, RemoteCommandId, Sentence, Session};

const DEVICE_INFO: &str = "$PUWV!,0012345,uWave,1.2,uCore,3.4,80.0,1,2,12,35.0,1,0*5A";

fn config() -> ModemConfig {
    ModemConfig {
        line_timeout_ms: 2000,
        followup_poll_interval_ms: 0,
        ..ModemConfig::default()
    }
}

fn session_with(link: &MockLink, ports: &[&str]) -> (Session, MemorySink) {
    let sink = MemorySink::new();
    let connector = MockConnector::new(link.clone(), ports.iter().map(|p| p.to_string()).collect());
    let session = Session::new(config(), Box::new(connector), Box::new(sink.clone())).unwrap();
    (session, sink)
}

#[test]
fn connect_picks_first_listed_port() {
    let link = MockLink::new();
    let (session, _) = session_with(&link, &["/dev/ttyUSB0", "/dev/ttyUSB1"]);

    assert_eq!(session.connect(None).unwrap(), "/dev/ttyUSB0");
    assert!(session.is_connected().unwrap());
    assert_eq!(link.opened(), vec![("/dev/ttyUSB0".to_string(), 9600)]);
}

#[test]
fn connect_without_ports_fails() {
    let link = MockLink::new();
    let (session, _) = session_with(&link, &[]);

    assert!(matches!(session.connect(None), Err(ModemError::NoPortAvailable)));
    assert!(!session.is_connected().unwrap());
}

#[test]
fn failed_open_leaves_session_disconnected() {
    let link = MockLink::new();
    link.fail_open(true);
    let (session, _) = session_with(&link, &[]);

    assert!(matches!(
        session.connect(Some("COM7")),
        Err(ModemError::Transport(_))
    ));
    assert!(!session.is_connected().unwrap());
}

#[test]
fn send_requires_connection() {
    let link = MockLink::new();
    let (session, _) = session_with(&link, &[]);

    assert!(matches!(
        session.send("PUWV?,0", true, true, false),
        Err(ModemError::NotConnected)
    ));
}

#[test]
fn disconnect_is_idempotent() {
    let link = MockLink::new();
    let (session, _) = session_with(&link, &[]);
    session.connect(Some("COM3")).unwrap();

    session.disconnect().unwrap();
    session.disconnect().unwrap();
    assert!(link.is_closed());
    assert_eq!(session.port().unwrap(), None);
}

#[test]
fn remote_temperature_yields_one_sample() {
    let link = MockLink::new();
    let (session, sink) = session_with(&link, &[]);
    session.connect(Some("COM3")).unwrap();

    link.push_line("$PUWV0,2,0");
    link.push_silence();
    link.push_silence();
    link.push_line("$PUWV3,0,3,0.01,21.5,20.0");

    let exchange = session
        .remote_query(0, 0, RemoteCommandId::Temperature)
        .unwrap();

    assert!(link.written()[0].starts_with("$PUWV2,0,0,3*29"));
    assert!(matches!(exchange.primary_sentence(), Some(Sentence::Ack(_))));
    assert_eq!(exchange.additional.len(), 1);

    let samples = sink.samples();
    assert_eq!(samples.len(), 1);
    let expected = 0.01 * sound_velocity(20.0, 0.0, 0.0) / 2.0;
    assert!((samples[0].slant_range - expected).abs() < 1e-9);
    assert_eq!(samples[0].velocity, 0.0);
    assert_eq!(samples[0].command_id, RemoteCommandId::Temperature);
    assert!(session.range_history().unwrap().is_some());

    // TX, primary RX, remote RX
    assert_eq!(sink.lines().len(), 3);
}

#[test]
fn remote_ping_never_yields_a_sample() {
    let link = MockLink::new();
    let (session, sink) = session_with(&link, &[]);
    session.connect(Some("COM3")).unwrap();

    link.push_line("$PUWV0,2,0");
    link.push_line("$PUWV3,0,0,0.01,21.5,");

    let exchange = session.remote_query(0, 0, RemoteCommandId::Ping).unwrap();

    assert_eq!(
        exchange.remote_response().map(|r| r.command_id),
        Some(RemoteCommandId::Ping)
    );
    assert!(sink.samples().is_empty());
    assert!(session.range_history().unwrap().is_none());
}

#[test]
fn silent_remote_times_out_without_error() {
    let link = MockLink::new();
    let (session, sink) = session_with(&link, &[]);
    session.connect(Some("COM3")).unwrap();

    link.push_line("$PUWV0,2,0");

    let exchange = session
        .remote_query(0, 0, RemoteCommandId::Battery)
        .unwrap();

    assert!(exchange.followup_timed_out);
    assert!(exchange.additional.is_empty());
    assert_eq!(link.reads(), 1 + 5);
    assert!(sink.samples().is_empty());
}

#[test]
fn device_info_sets_session_salinity() {
    let link = MockLink::new();
    let (session, _) = session_with(&link, &[]);
    session.connect(Some("COM3")).unwrap();
    assert_eq!(session.salinity().unwrap(), 0.0);

    link.push_line(DEVICE_INFO);
    let info = session.device_info().unwrap().unwrap();

    assert_eq!(info.serial_number, "0012345");
    assert_eq!(session.salinity().unwrap(), 35.0);
}

#[test]
fn packet_settings_query() {
    let link = MockLink::new();
    let (session, _) = session_with(&link, &[]);
    session.connect(Some("COM3")).unwrap();

    link.push_line("$PUWVE,1,4*00");
    let settings = session.packet_settings().unwrap().unwrap();

    assert!(settings.packet_mode_enabled);
    assert_eq!(settings.local_address, 4);
    assert_eq!(link.written(), vec!["$PUWVD,0*5C\n".to_string()]);
}

#[test]
fn read_failure_disconnects() {
    let link = MockLink::new();
    let (session, _) = session_with(&link, &[]);
    session.connect(Some("COM3")).unwrap();

    link.push_read_error(io::ErrorKind::BrokenPipe);
    assert!(matches!(
        session.send("PUWV?,0", true, true, false),
        Err(ModemError::Transport(_))
    ));
    assert!(!session.is_connected().unwrap());
    assert!(link.is_closed());

    assert!(matches!(
        session.send("PUWV?,0", true, true, false),
        Err(ModemError::NotConnected)
    ));
}

#[test]
fn write_failure_disconnects() {
    let link = MockLink::new();
    let (session, sink) = session_with(&link, &[]);
    session.connect(Some("COM3")).unwrap();

    link.fail_writes(true);
    assert!(matches!(
        session.send("PUWVD,0", true, true, false),
        Err(ModemError::Transport(_))
    ));
    assert!(!session.is_connected().unwrap());
    assert!(sink.lines().is_empty());
}

#[test]
fn second_command_in_flight_is_rejected() {
    let link = MockLink::new();
    let (session, _) = session_with(&link, &[]);
    let session = Arc::new(session);
    session.connect(Some("COM3")).unwrap();
    link.push_stall();

    let worker = {
        let session = Arc::clone(&session);
        thread::spawn(move || session.send("PUWV?,0", true, true, false))
    };

    let started = Instant::now();
    while link.reads() == 0 {
        assert!(started.elapsed() < Duration::from_secs(5), "worker never read");
        thread::sleep(Duration::from_millis(1));
    }

    assert!(matches!(
        session.send("PUWVD,0", true, true, false),
        Err(ModemError::Busy)
    ));
    assert!(session.abort_pending_read());

    let exchange = worker.join().unwrap().unwrap();
    assert!(exchange.primary.is_none());
    assert_eq!(link.written().len(), 1);
}

#[test]
fn monitoring_runs_requested_number_of_queries() {
    let link = MockLink::new();
    let (session, sink) = session_with(&link, &[]);
    session.connect(Some("COM3")).unwrap();

    for prop_time in ["0.010", "0.012"] {
        link.push_line("$PUWV0,2,0");
        link.push_line(format!("$PUWV3,0,3,{},21.5,20.0", prop_time));
    }

    let exchanges = session
        .monitor_remote_temperature(Duration::ZERO, 2)
        .unwrap();

    assert_eq!(exchanges.len(), 2);
    let samples = sink.samples();
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[0].velocity, 0.0);
    assert!(samples[1].slant_range > samples[0].slant_range);
}

#[test]
fn reset_range_history_reseeds_velocity() {
    let link = MockLink::new();
    let (session, sink) = session_with(&link, &[]);
    session.connect(Some("COM3")).unwrap();

    link.push_line("$PUWV3,0,3,0.010,21.5,20.0");
    session.remote_query(0, 0, RemoteCommandId::Temperature).unwrap();
    session.reset_range_history().unwrap();
    assert!(session.range_history().unwrap().is_none());

    link.push_line("$PUWV3,0,3,0.020,21.5,20.0");
    session.remote_query(0, 0, RemoteCommandId::Temperature).unwrap();

    let samples = sink.samples();
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[1].velocity, 0.0);
}

#[test]
fn unparseable_remote_reply_ends_the_wait() {
    let link = MockLink::new();
    let (session, sink) = session_with(&link, &[]);
    session.connect(Some("COM3")).unwrap();

    link.push_line("$PUWV0,2,0");
    link.push_line("$PUWV3,0,4,0.01,21.5,n/a");

    let exchange = session
        .remote_query(0, 0, RemoteCommandId::Battery)
        .unwrap();

    assert!(!exchange.followup_timed_out);
    assert_eq!(exchange.additional.len(), 1);
    assert_eq!(link.reads(), 2);
    assert!(sink.samples().is_empty());
}

#[test]
fn abort_while_idle_does_not_drop_next_reply() {
    let link = MockLink::new();
    let (session, _) = session_with(&link, &[]);
    session.connect(Some("COM3")).unwrap();

    assert!(session.abort_pending_read());

    link.push_line(DEVICE_INFO);
    let info = session.device_info().unwrap();
    assert_eq!(info.map(|i| i.serial_number), Some("0012345".to_string()));
}
