//! Per-core runtimes composing the subsystems.
//!
//! The backend core owns the codec, the scheduler, and the wire client;
//! the presentation core owns everything user-facing. Shared
//! infrastructure (bus, pool, scheduler) is borrowed, not global, so
//! several independent instances can exist side by side in tests.

use crate::bus::MessageBus;
use crate::decode::Decoder;
use crate::dispatch::CoreRuntime;
use crate::encode::{CodeBuf, Encoder};
use crate::hal::{AlarmDriver, Duration, Instant, WireTransport};
use crate::pool::{CodePool, PoolError};
use crate::scheduler::TimerScheduler;
use crate::tables::CodeTable;
use crate::types::{CodeSource, CoreId, Envelope, Message, MorseConfig, WireConfig};
use crate::wire::{WireClient, WireEvent, WireError, WireState, KEEPALIVE_INTERVAL_MS};

/// Shared infrastructure at its default sizes
pub type Bus = MessageBus;
pub type Pool = CodePool;
pub type Sched = TimerScheduler;

/// Core running codec, scheduler and wire client
pub const BACKEND_CORE: CoreId = CoreId::Core0;
/// Core running presentation
pub const UI_CORE: CoreId = CoreId::Core1;

/// Datagrams drained per idle pass, so one busy wire cannot starve the
/// backend queue
const RECV_BURST: usize = 4;

/// Presentation-side outputs, implemented by the display/terminal layer.
/// Optional callbacks default to no-ops.
pub trait StatusSink {
    fn decoded_text(&mut self, text: &str);

    fn connection(&mut self, connected: bool) {
        let _ = connected;
    }

    fn current_sender(&mut self, id: &str) {
        let _ = id;
    }

    fn speed(&mut self, text_wpm: u8, char_wpm: u8) {
        let _ = (text_wpm, char_wpm);
    }

    fn table(&mut self, table: CodeTable) {
        let _ = table;
    }

    /// Locally generated code, for the sounder and progress display
    fn local_code(&mut self, code: &[i32]) {
        let _ = code;
    }
}

/// Backend-core runtime: decodes, encodes, and drives the wire session
pub struct BackendRuntime<'a, T: WireTransport, A: AlarmDriver> {
    bus: &'a Bus,
    pool: &'a Pool,
    sched: &'a Sched,
    alarm: A,
    wire: WireClient<T>,
    encoder: Encoder,
    decoder: Decoder,
    cfg: MorseConfig,
}

impl<'a, T: WireTransport, A: AlarmDriver> BackendRuntime<'a, T, A> {
    pub fn new(
        bus: &'a Bus,
        pool: &'a Pool,
        sched: &'a Sched,
        alarm: A,
        transport: T,
        wire_cfg: WireConfig,
        cfg: MorseConfig,
    ) -> Self {
        Self {
            bus,
            pool,
            sched,
            alarm,
            wire: WireClient::new(transport, wire_cfg),
            encoder: Encoder::new(cfg),
            decoder: Decoder::new(&cfg),
            cfg,
        }
    }

    pub fn wire(&self) -> &WireClient<T> {
        &self.wire
    }

    pub fn wire_mut(&mut self) -> &mut WireClient<T> {
        &mut self.wire
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    fn handle_code(&mut self, env: Envelope, now: Instant) {
        let Message::Code(handle) = env.msg else {
            return;
        };
        // New code supersedes any pending flush timeout
        if let Some(t) = self.sched.find_scheduled(&Message::DecodeFlush) {
            self.sched.cancel(&mut self.alarm, t);
        }
        let snap = self.pool.snapshot(handle);
        self.pool.free(handle).ok();
        let Ok((_source, code)) = snap else {
            #[cfg(feature = "defmt")]
            defmt::warn!("stale code handle in message");
            return;
        };
        let text = self.decoder.feed(&code);
        if !text.is_empty() {
            self.bus.post(UI_CORE, Message::DecodedText(text), now);
        }
        self.sched.schedule_in(
            &mut self.alarm,
            self.bus,
            BACKEND_CORE,
            Message::DecodeFlush,
            self.decoder.flush_delay(),
            now,
        );
    }

    fn handle_decode_flush(&mut self, now: Instant) {
        let text = self.decoder.flush();
        if !text.is_empty() {
            self.bus.post(UI_CORE, Message::DecodedText(text), now);
        }
    }

    fn handle_encode(&mut self, text: &str, now: Instant) {
        self.encoder.reset();
        let mut buf = CodeBuf::new();
        self.encoder.encode_str(text, &mut buf);
        if buf.is_empty() {
            return;
        }
        if self.wire.state() == WireState::Connected {
            if self.wire.send_code(&buf, text).is_err() {
                #[cfg(feature = "defmt")]
                defmt::warn!("wire send failed");
            }
        }
        // A copy goes to the presentation core for the sounder
        match self.pool.alloc(CodeSource::LocalUi, &buf) {
            Ok(h) => {
                if self.bus.post_nowait(UI_CORE, Message::Code(h), now).is_err() {
                    self.pool.free(h).ok();
                }
            }
            Err(PoolError::Exhausted) => panic!("code sequence pool exhausted"),
            Err(_) => {}
        }
    }

    fn handle_connect(&mut self, wire_no: u16, now: Instant) {
        let connected = self.wire.connect(wire_no).is_ok();
        #[cfg(feature = "defmt")]
        {
            if connected {
                defmt::info!("connected to wire {}", wire_no);
            } else {
                defmt::warn!("connect to wire {} failed", wire_no);
            }
        }
        self.bus.post(UI_CORE, Message::ConnectionState(connected), now);
    }

    fn handle_disconnect(&mut self, now: Instant) {
        self.wire.disconnect();
        if let Some(t) = self.sched.find_scheduled(&Message::WireKeepAlive) {
            self.sched.cancel(&mut self.alarm, t);
        }
        self.bus.post(UI_CORE, Message::ConnectionState(false), now);
    }

    fn handle_toggle(&mut self, now: Instant) {
        match self.wire.state() {
            WireState::Connected => self.handle_disconnect(now),
            WireState::NotConnected => {
                let wire_no = self.wire.config().wire;
                self.handle_connect(wire_no, now);
            }
        }
    }

    fn handle_keepalive(&mut self, now: Instant) {
        if self.wire.state() != WireState::Connected {
            return;
        }
        self.wire.keepalive_tick().ok();
        self.arm_keepalive(now);
    }

    fn arm_keepalive(&mut self, now: Instant) {
        if self.sched.find_scheduled(&Message::WireKeepAlive).is_some() {
            return;
        }
        self.sched.schedule_in(
            &mut self.alarm,
            self.bus,
            BACKEND_CORE,
            Message::WireKeepAlive,
            Duration::from_millis(KEEPALIVE_INTERVAL_MS),
            now,
        );
    }

    fn apply_config(&mut self, cfg: MorseConfig, now: Instant) {
        self.cfg = cfg;
        self.encoder.set_config(cfg);
        self.decoder.set_config(&cfg);
        self.bus
            .post_nowait(
                UI_CORE,
                Message::SpeedChange {
                    text_wpm: cfg.text_wpm,
                    char_wpm: cfg.char_wpm,
                },
                now,
            )
            .ok();
    }

    /// Drain the transport; idle work on polling platforms, also usable
    /// from a receive callback wrapper
    pub fn poll_wire(&mut self, now: Instant) {
        let mut buf = [0u8; 512];
        for _ in 0..RECV_BURST {
            let n = match self.wire.transport_mut().try_recv(&mut buf) {
                Ok(Some(n)) => n,
                _ => return,
            };
            match self.wire.on_datagram(&buf[..n], now, self.bus, self.pool, BACKEND_CORE) {
                Ok(WireEvent::HandshakeComplete) => self.arm_keepalive(now),
                Ok(WireEvent::Code { sender_changed: true }) => {
                    if let Some(id) = self.wire.current_sender() {
                        self.bus
                            .post_nowait(UI_CORE, Message::CurrentSender(id.clone()), now)
                            .ok();
                    }
                }
                Ok(_) => {}
                Err(WireError::Pool(_)) => panic!("code sequence pool exhausted"),
                Err(_e) => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("dropped bad wire datagram");
                }
            }
        }
    }
}

impl<'a, T: WireTransport, A: AlarmDriver> CoreRuntime for BackendRuntime<'a, T, A> {
    fn on_message(&mut self, env: Envelope, now: Instant) {
        match env.msg {
            Message::Code(_) => self.handle_code(env, now),
            Message::DecodeFlush => self.handle_decode_flush(now),
            Message::EncodeText(ref text) => {
                let text = text.clone();
                self.handle_encode(&text, now);
            }
            Message::WireConnect(wire_no) => self.handle_connect(wire_no, now),
            Message::WireDisconnect => self.handle_disconnect(now),
            Message::WireToggle => self.handle_toggle(now),
            Message::WireKeepAlive => self.handle_keepalive(now),
            Message::SpeedChange { text_wpm, char_wpm } => {
                let mut cfg = self.cfg;
                cfg.text_wpm = text_wpm;
                cfg.char_wpm = char_wpm;
                self.apply_config(cfg, now);
            }
            Message::TableChange(table) => {
                let mut cfg = self.cfg;
                cfg.table = table;
                self.apply_config(cfg, now);
                self.bus
                    .post_nowait(UI_CORE, Message::TableChange(table), now)
                    .ok();
            }
            // Presentation-bound traffic is not ours
            Message::DecodedText(_) | Message::ConnectionState(_) | Message::CurrentSender(_) => {}
        }
    }

    fn idle_task_count(&self) -> usize {
        1
    }

    fn run_idle(&mut self, index: usize, now: Instant) {
        if index == 0 {
            self.poll_wire(now);
        }
    }
}

/// Presentation-core runtime: forwards status to the display layer and
/// releases code sequences after the sounder has consumed them
pub struct UiRuntime<'a, S: StatusSink> {
    pool: &'a Pool,
    sink: S,
}

impl<'a, S: StatusSink> UiRuntime<'a, S> {
    pub fn new(pool: &'a Pool, sink: S) -> Self {
        Self { pool, sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}

impl<'a, S: StatusSink> CoreRuntime for UiRuntime<'a, S> {
    fn on_message(&mut self, env: Envelope, _now: Instant) {
        match env.msg {
            Message::DecodedText(text) => self.sink.decoded_text(&text),
            Message::ConnectionState(connected) => self.sink.connection(connected),
            Message::CurrentSender(id) => self.sink.current_sender(&id),
            Message::SpeedChange { text_wpm, char_wpm } => self.sink.speed(text_wpm, char_wpm),
            Message::TableChange(table) => self.sink.table(table),
            Message::Code(handle) => {
                if let Ok((_, code)) = self.pool.snapshot(handle) {
                    self.sink.local_code(&code);
                }
                self.pool.free(handle).ok();
            }
            _ => {}
        }
    }

    fn idle_task_count(&self) -> usize {
        0
    }

    fn run_idle(&mut self, _index: usize, _now: Instant) {}
}
