//! Whole-terminal tests: both dispatch loops, the bus, pool, scheduler,
//! codec and wire client wired together over mock hardware.

use telegraph_core::dispatch::DispatchLoop;
use telegraph_core::hal::mock::{MockAlarmDriver, MockWireTransport};
use telegraph_core::packet::{self, WirePacket, CMD_ACK};
use telegraph_core::runtime::{BackendRuntime, Bus, Pool, Sched, UiRuntime};
use telegraph_core::{
    default_config, CodeBuf, Encoder, Instant, Message, MorseConfig, Text, WireConfig,
    BACKEND_CORE, UI_CORE,
};

use crate::CaptureSink;

type Backend<'a> = BackendRuntime<'a, MockWireTransport, MockAlarmDriver>;
type Ui<'a> = UiRuntime<'a, CaptureSink>;

fn t(ms: u64) -> Instant {
    Instant::from_millis(ms)
}

fn wire_cfg() -> WireConfig {
    WireConfig::new("relay.example.net", 7890, 11, "RT, Test Office").unwrap()
}

fn text(s: &str) -> Text {
    let mut t = Text::new();
    t.push_str(s).unwrap();
    t
}

/// Alternate both loops until neither has messages left
fn pump(
    bus: &Bus,
    blp: &mut DispatchLoop,
    backend: &mut Backend<'_>,
    ulp: &mut DispatchLoop,
    ui: &mut Ui<'_>,
    now: Instant,
) {
    for _ in 0..16 {
        blp.poll(bus, backend, now);
        ulp.poll(bus, ui, now);
    }
}

/// Post a connect and answer the relay's ACK
fn bring_up(
    bus: &Bus,
    blp: &mut DispatchLoop,
    backend: &mut Backend<'_>,
    ulp: &mut DispatchLoop,
    ui: &mut Ui<'_>,
) {
    bus.post(BACKEND_CORE, Message::WireConnect(11), t(0));
    pump(bus, blp, backend, ulp, ui, t(1));
    backend
        .wire_mut()
        .transport_mut()
        .push_inbound(&packet::short_packet(CMD_ACK, 0));
    pump(bus, blp, backend, ulp, ui, t(2));
}

fn encode_with_lead(cfg: MorseConfig, s: &str) -> Vec<i32> {
    let mut enc = Encoder::new(cfg);
    let mut buf = CodeBuf::new();
    enc.encode_str(s, &mut buf);
    let mut v = vec![-210];
    v.extend_from_slice(&buf);
    v
}

#[test]
fn test_typed_text_reaches_wire_and_sounder() {
    let bus = Bus::new();
    let pool = Pool::new();
    let sched = Sched::new();
    let mut backend = Backend::new(
        &bus,
        &pool,
        &sched,
        MockAlarmDriver::new(),
        MockWireTransport::new(),
        wire_cfg(),
        default_config(),
    );
    let mut ui = Ui::new(&pool, CaptureSink::default());
    let mut blp = DispatchLoop::new(BACKEND_CORE);
    let mut ulp = DispatchLoop::new(UI_CORE);

    bring_up(&bus, &mut blp, &mut backend, &mut ulp, &mut ui);
    assert_eq!(ui.sink().connections, vec![true]);

    bus.post(BACKEND_CORE, Message::EncodeText(text("CQ")), t(10));
    pump(&bus, &mut blp, &mut backend, &mut ulp, &mut ui, t(11));

    // CONNECT, identity, then the code packet
    let sent = &backend.wire_mut().transport_mut().sent;
    assert_eq!(sent.len(), 3);
    let WirePacket::Code { id, code, .. } = packet::parse(&sent[2]).unwrap() else {
        panic!("expected a code packet");
    };
    assert_eq!(id.as_str(), "RT, Test Office");
    assert!(!code.is_empty());

    // The sounder copy matches what went out on the wire
    assert_eq!(ui.sink().local_code.len(), 1);
    assert_eq!(ui.sink().local_code[0], code.to_vec());

    // Every pool entry went back
    assert_eq!(pool.live(), 0);
}

#[test]
fn test_wire_code_decodes_to_display_text() {
    let bus = Bus::new();
    let pool = Pool::new();
    let sched = Sched::new();
    let cfg = default_config();
    let mut backend = Backend::new(
        &bus,
        &pool,
        &sched,
        MockAlarmDriver::new(),
        MockWireTransport::new(),
        wire_cfg(),
        cfg,
    );
    let mut ui = Ui::new(&pool, CaptureSink::default());
    let mut blp = DispatchLoop::new(BACKEND_CORE);
    let mut ulp = DispatchLoop::new(UI_CORE);

    bring_up(&bus, &mut blp, &mut backend, &mut ulp, &mut ui);

    let code = encode_with_lead(cfg, "HELLO");
    backend
        .wire_mut()
        .transport_mut()
        .push_inbound(&packet::code_packet("KB, Remote, XX", 1, &code, "HELLO"));
    pump(&bus, &mut blp, &mut backend, &mut ulp, &mut ui, t(100));

    // Quiet key: the deferred flush resolves the buffered tail
    let flush = sched
        .find_scheduled(&Message::DecodeFlush)
        .expect("flush timer armed");
    sched.fire(flush.index(), &bus, t(2000));
    pump(&bus, &mut blp, &mut backend, &mut ulp, &mut ui, t(2001));

    assert_eq!(ui.sink().text, "HELLO");
    assert_eq!(ui.sink().senders, vec!["KB, Remote, XX".to_string()]);
    assert_eq!(pool.live(), 0);
}

#[test]
fn test_sequence_gap_shows_as_break_in_transcript() {
    let bus = Bus::new();
    let pool = Pool::new();
    let sched = Sched::new();
    let cfg = default_config();
    let mut backend = Backend::new(
        &bus,
        &pool,
        &sched,
        MockAlarmDriver::new(),
        MockWireTransport::new(),
        wire_cfg(),
        cfg,
    );
    let mut ui = Ui::new(&pool, CaptureSink::default());
    let mut blp = DispatchLoop::new(BACKEND_CORE);
    let mut ulp = DispatchLoop::new(UI_CORE);

    bring_up(&bus, &mut blp, &mut backend, &mut ulp, &mut ui);

    // Sequence 7 is lost in transit
    for (seq, ch) in [(5, "A"), (6, "B"), (8, "C")] {
        let code = encode_with_lead(cfg, ch);
        backend
            .wire_mut()
            .transport_mut()
            .push_inbound(&packet::code_packet("KB, Remote, XX", seq, &code, ch));
        pump(&bus, &mut blp, &mut backend, &mut ulp, &mut ui, t(100 * seq as u64));
    }
    if let Some(flush) = sched.find_scheduled(&Message::DecodeFlush) {
        sched.fire(flush.index(), &bus, t(5000));
    }
    pump(&bus, &mut blp, &mut backend, &mut ulp, &mut ui, t(5001));

    // The loss shows as a wide gap before the code after the jump
    assert_eq!(ui.sink().text, "AB      C");
}

#[test]
fn test_speed_change_reaches_codec_and_display() {
    let bus = Bus::new();
    let pool = Pool::new();
    let sched = Sched::new();
    let mut backend = Backend::new(
        &bus,
        &pool,
        &sched,
        MockAlarmDriver::new(),
        MockWireTransport::new(),
        wire_cfg(),
        default_config(),
    );
    let mut ui = Ui::new(&pool, CaptureSink::default());
    let mut blp = DispatchLoop::new(BACKEND_CORE);
    let mut ulp = DispatchLoop::new(UI_CORE);

    bus.post(
        BACKEND_CORE,
        Message::SpeedChange {
            text_wpm: 25,
            char_wpm: 25,
        },
        t(0),
    );
    pump(&bus, &mut blp, &mut backend, &mut ulp, &mut ui, t(1));

    assert_eq!(ui.sink().speeds, vec![(25, 25)]);
    // 1200/25 = 48 ms dot, flush after 20 dot widths
    assert_eq!(
        backend.decoder().flush_delay(),
        telegraph_core::Duration::from_millis(960)
    );
}

#[test]
fn test_new_code_cancels_pending_flush() {
    let bus = Bus::new();
    let pool = Pool::new();
    let sched = Sched::new();
    let cfg = default_config();
    let mut backend = Backend::new(
        &bus,
        &pool,
        &sched,
        MockAlarmDriver::new(),
        MockWireTransport::new(),
        wire_cfg(),
        cfg,
    );
    let mut ui = Ui::new(&pool, CaptureSink::default());
    let mut blp = DispatchLoop::new(BACKEND_CORE);
    let mut ulp = DispatchLoop::new(UI_CORE);

    bring_up(&bus, &mut blp, &mut backend, &mut ulp, &mut ui);

    for seq in 1..=3 {
        let code = encode_with_lead(cfg, "E");
        backend
            .wire_mut()
            .transport_mut()
            .push_inbound(&packet::code_packet("KB", seq, &code, "E"));
        pump(&bus, &mut blp, &mut backend, &mut ulp, &mut ui, t(100 * seq as u64));
        // Exactly one flush timer outstanding, next to the keep-alive
        assert!(sched.find_scheduled(&Message::DecodeFlush).is_some());
        assert_eq!(sched.pending(), 2);
    }
}
