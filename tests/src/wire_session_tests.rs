//! Relay session behavior through the backend runtime: handshake,
//! keep-alive lifecycle, and connection state reporting.

use telegraph_core::dispatch::DispatchLoop;
use telegraph_core::hal::mock::{MockAlarmDriver, MockWireTransport};
use telegraph_core::packet::{self, WirePacket, CMD_ACK, CMD_DATA};
use telegraph_core::runtime::{BackendRuntime, Bus, Pool, Sched, UiRuntime};
use telegraph_core::{
    default_config, Instant, Message, WireConfig, WireState, BACKEND_CORE, UI_CORE,
};

use crate::CaptureSink;

type Backend<'a> = BackendRuntime<'a, MockWireTransport, MockAlarmDriver>;

fn t(ms: u64) -> Instant {
    Instant::from_millis(ms)
}

fn wire_cfg() -> WireConfig {
    WireConfig::new("relay.example.net", 7890, 11, "RT, Test Office").unwrap()
}

struct Rig<'a> {
    bus: &'a Bus,
    sched: &'a Sched,
    backend: Backend<'a>,
    ui: UiRuntime<'a, CaptureSink>,
    blp: DispatchLoop,
    ulp: DispatchLoop,
}

impl<'a> Rig<'a> {
    fn new(bus: &'a Bus, pool: &'a Pool, sched: &'a Sched) -> Self {
        Self {
            bus,
            sched,
            backend: Backend::new(
                bus,
                pool,
                sched,
                MockAlarmDriver::new(),
                MockWireTransport::new(),
                wire_cfg(),
                default_config(),
            ),
            ui: UiRuntime::new(pool, CaptureSink::default()),
            blp: DispatchLoop::new(BACKEND_CORE),
            ulp: DispatchLoop::new(UI_CORE),
        }
    }

    fn pump(&mut self, now: Instant) {
        for _ in 0..16 {
            self.blp.poll(self.bus, &mut self.backend, now);
            self.ulp.poll(self.bus, &mut self.ui, now);
        }
    }

    fn push_inbound(&mut self, buf: &[u8]) {
        self.backend.wire_mut().transport_mut().push_inbound(buf);
    }
}

#[test]
fn test_handshake_sends_connect_then_identity() {
    let (bus, pool, sched) = (Bus::new(), Pool::new(), Sched::new());
    let mut rig = Rig::new(&bus, &pool, &sched);

    bus.post(BACKEND_CORE, Message::WireConnect(11), t(0));
    rig.pump(t(1));
    assert_eq!(rig.backend.wire().state(), WireState::Connected);

    {
        let sent = &rig.backend.wire_mut().transport_mut().sent;
        assert_eq!(sent.len(), 1);
        assert!(matches!(
            packet::parse(&sent[0]),
            Ok(WirePacket::Connect { wire: 11 })
        ));
    }

    // No keep-alive before the relay answers
    assert!(rig.sched.find_scheduled(&Message::WireKeepAlive).is_none());

    rig.push_inbound(&packet::short_packet(CMD_ACK, 0));
    rig.pump(t(2));

    let sent = &rig.backend.wire_mut().transport_mut().sent;
    assert_eq!(sent.len(), 2);
    match packet::parse(&sent[1]).unwrap() {
        WirePacket::Identity { id, .. } => assert_eq!(id.as_str(), "RT, Test Office"),
        other => panic!("expected identity, got {:?}", other),
    }
    assert!(sched.find_scheduled(&Message::WireKeepAlive).is_some());
}

#[test]
fn test_keepalive_resends_identity_and_rearms() {
    let (bus, pool, sched) = (Bus::new(), Pool::new(), Sched::new());
    let mut rig = Rig::new(&bus, &pool, &sched);

    bus.post(BACKEND_CORE, Message::WireConnect(11), t(0));
    rig.pump(t(1));
    rig.push_inbound(&packet::short_packet(CMD_ACK, 0));
    rig.pump(t(2));

    let ka = sched.find_scheduled(&Message::WireKeepAlive).unwrap();
    sched.fire(ka.index(), &bus, t(10_000));
    rig.pump(t(10_001));

    // Another identity went out and the timer is armed again
    let sent = &rig.backend.wire_mut().transport_mut().sent;
    assert_eq!(sent.len(), 3);
    assert_eq!(u16::from_le_bytes([sent[2][0], sent[2][1]]), CMD_DATA);
    assert!(sched.find_scheduled(&Message::WireKeepAlive).is_some());
}

#[test]
fn test_disconnect_stops_keepalive_and_reports() {
    let (bus, pool, sched) = (Bus::new(), Pool::new(), Sched::new());
    let mut rig = Rig::new(&bus, &pool, &sched);

    bus.post(BACKEND_CORE, Message::WireConnect(11), t(0));
    rig.pump(t(1));
    rig.push_inbound(&packet::short_packet(CMD_ACK, 0));
    rig.pump(t(2));
    assert!(sched.find_scheduled(&Message::WireKeepAlive).is_some());

    bus.post(BACKEND_CORE, Message::WireDisconnect, t(3));
    rig.pump(t(4));

    assert_eq!(rig.backend.wire().state(), WireState::NotConnected);
    assert!(sched.find_scheduled(&Message::WireKeepAlive).is_none());
    assert_eq!(rig.ui.sink().connections, vec![true, false]);
}

#[test]
fn test_failed_connect_reports_not_connected() {
    let (bus, pool, sched) = (Bus::new(), Pool::new(), Sched::new());
    let mut rig = Rig::new(&bus, &pool, &sched);
    rig.backend.wire_mut().transport_mut().fail_open = true;

    bus.post(BACKEND_CORE, Message::WireConnect(11), t(0));
    rig.pump(t(1));

    assert_eq!(rig.backend.wire().state(), WireState::NotConnected);
    assert_eq!(rig.ui.sink().connections, vec![false]);
}

#[test]
fn test_toggle_round_trip() {
    let (bus, pool, sched) = (Bus::new(), Pool::new(), Sched::new());
    let mut rig = Rig::new(&bus, &pool, &sched);

    bus.post(BACKEND_CORE, Message::WireToggle, t(0));
    rig.pump(t(1));
    assert_eq!(rig.backend.wire().state(), WireState::Connected);

    bus.post(BACKEND_CORE, Message::WireToggle, t(2));
    rig.pump(t(3));
    assert_eq!(rig.backend.wire().state(), WireState::NotConnected);
    assert_eq!(rig.ui.sink().connections, vec![true, false]);
}

#[test]
fn test_station_list_tracks_identity_announcements() {
    let (bus, pool, sched) = (Bus::new(), Pool::new(), Sched::new());
    let mut rig = Rig::new(&bus, &pool, &sched);

    bus.post(BACKEND_CORE, Message::WireConnect(11), t(0));
    rig.pump(t(1));

    rig.push_inbound(&packet::identity_packet("KB, Remote, XX", 1, "v"));
    rig.push_inbound(&packet::identity_packet("KC, Portland, OR", 2, "v"));
    rig.pump(t(100));

    let stations = rig.backend.wire().stations();
    assert_eq!(stations.len(), 2);
    assert!(stations.get("KB, Remote, XX").is_some());
}

#[test]
fn test_unknown_command_is_dropped_quietly() {
    let (bus, pool, sched) = (Bus::new(), Pool::new(), Sched::new());
    let mut rig = Rig::new(&bus, &pool, &sched);

    bus.post(BACKEND_CORE, Message::WireConnect(11), t(0));
    rig.pump(t(1));

    rig.push_inbound(&[0x63, 0x00, 0x00, 0x00]);
    rig.pump(t(2));

    // Session unaffected
    assert_eq!(rig.backend.wire().state(), WireState::Connected);
    assert_eq!(pool.live(), 0);
}

#[test]
fn test_connect_replaces_existing_session() {
    let (bus, pool, sched) = (Bus::new(), Pool::new(), Sched::new());
    let mut rig = Rig::new(&bus, &pool, &sched);

    bus.post(BACKEND_CORE, Message::WireConnect(11), t(0));
    rig.pump(t(1));
    bus.post(BACKEND_CORE, Message::WireConnect(32), t(2));
    rig.pump(t(3));

    assert_eq!(rig.backend.wire().state(), WireState::Connected);
    assert_eq!(rig.backend.wire().config().wire, 32);

    // CONNECT(11), DISCONNECT(11), CONNECT(32)
    let sent = &rig.backend.wire_mut().transport_mut().sent;
    assert_eq!(sent.len(), 3);
    assert!(matches!(
        packet::parse(&sent[2]),
        Ok(WirePacket::Connect { wire: 32 })
    ));
}
