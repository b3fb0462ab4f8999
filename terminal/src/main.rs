//! Line-oriented operator terminal for the telegraph core.
//!
//! Two threads stand in for the two cores, each running its dispatch
//! loop; the main thread reads commands and posts the corresponding
//! messages. The wire runs over a real UDP socket.
//!
//! Commands:
//!   connect [wire]     join a wire (defaults to the configured one)
//!   disconnect         leave the wire
//!   toggle             disconnect if connected, else reconnect
//!   wire <n>           select the wire used by the next connect
//!   speed <text> [char] set words-per-minute
//!   table american|international
//!   encode <text>      key the given text
//!   status             show connection, sender and speed
//!   quit

use std::io::{self, BufRead, Write as _};
use std::net::{ToSocketAddrs, UdpSocket};
use std::sync::Mutex;
use std::thread;
use std::time::Duration as StdDuration;

use telegraph_core::dispatch::DispatchLoop;
use telegraph_core::hal::{AlarmDriver, HalError, WireTransport};
use telegraph_core::runtime::{BackendRuntime, Bus, Pool, Sched, UiRuntime};
use telegraph_core::{
    default_config, CodeTable, Duration, Instant, Message, Polled, StatusSink, Text, WireConfig,
    BACKEND_CORE, UI_CORE,
};

/// Milliseconds since program start, as the core's time base
fn now() -> Instant {
    use std::sync::OnceLock;
    use std::time::Instant as StdInstant;
    static START: OnceLock<StdInstant> = OnceLock::new();
    let start = *START.get_or_init(StdInstant::now);
    Instant::from_millis(start.elapsed().as_millis() as u64)
}

/// Wire transport over a nonblocking UDP socket
struct UdpWireTransport {
    socket: Option<UdpSocket>,
}

impl UdpWireTransport {
    fn new() -> Self {
        Self { socket: None }
    }
}

impl WireTransport for UdpWireTransport {
    fn open(&mut self, host: &str, port: u16) -> Result<(), HalError> {
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|_| HalError::ResolveError)?
            .next()
            .ok_or(HalError::ResolveError)?;
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(|_| HalError::BindError)?;
        socket.connect(addr).map_err(|_| HalError::BindError)?;
        socket
            .set_nonblocking(true)
            .map_err(|_| HalError::BindError)?;
        self.socket = Some(socket);
        Ok(())
    }

    fn send(&mut self, buf: &[u8]) -> Result<(), HalError> {
        let socket = self.socket.as_ref().ok_or(HalError::NotOpen)?;
        socket.send(buf).map_err(|_| HalError::SendError)?;
        Ok(())
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> Result<Option<usize>, HalError> {
        let socket = self.socket.as_ref().ok_or(HalError::NotOpen)?;
        match socket.recv(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(_) => Err(HalError::SendError),
        }
    }

    fn close(&mut self) {
        self.socket = None;
    }

    fn is_open(&self) -> bool {
        self.socket.is_some()
    }
}

/// One sleeper thread per armed alarm. Cancellation is handled by the
/// scheduler itself: firing a cleared slot is a no-op, so a stale sleeper
/// waking late is harmless.
struct ThreadAlarmDriver {
    bus: &'static Bus,
    sched: &'static Sched,
}

impl AlarmDriver for ThreadAlarmDriver {
    fn arm(&mut self, slot: usize, after: Duration) -> Result<(), HalError> {
        let bus = self.bus;
        let sched = self.sched;
        let ms = after.as_millis();
        thread::spawn(move || {
            thread::sleep(StdDuration::from_millis(ms));
            sched.fire(slot, bus, now());
        });
        Ok(())
    }

    fn cancel(&mut self, _slot: usize) -> Result<(), HalError> {
        Ok(())
    }
}

/// Shared view of what the presentation core last reported
#[derive(Default)]
struct Status {
    connected: bool,
    sender: String,
    text_wpm: u8,
    char_wpm: u8,
}

static STATUS: Mutex<Option<Status>> = Mutex::new(None);

struct PrintSink;

impl StatusSink for PrintSink {
    fn decoded_text(&mut self, text: &str) {
        print!("{}", text);
        io::stdout().flush().ok();
    }

    fn connection(&mut self, connected: bool) {
        println!("\n<{}>", if connected { "connected" } else { "not connected" });
        if let Some(s) = STATUS.lock().unwrap().as_mut() {
            s.connected = connected;
        }
    }

    fn current_sender(&mut self, id: &str) {
        println!("\n<from {}>", id);
        if let Some(s) = STATUS.lock().unwrap().as_mut() {
            s.sender = id.to_string();
        }
    }

    fn speed(&mut self, text_wpm: u8, char_wpm: u8) {
        if let Some(s) = STATUS.lock().unwrap().as_mut() {
            s.text_wpm = text_wpm;
            s.char_wpm = char_wpm;
        }
    }
}

fn print_status() {
    let guard = STATUS.lock().unwrap();
    if let Some(s) = guard.as_ref() {
        println!(
            "{} | sender: {} | speed: {}/{} WPM",
            if s.connected { "connected" } else { "not connected" },
            if s.sender.is_empty() { "-" } else { &s.sender },
            s.text_wpm,
            s.char_wpm,
        );
    }
}

fn post(bus: &Bus, msg: Message) {
    bus.post(BACKEND_CORE, msg, now());
}

fn text_of(s: &str) -> Text {
    let mut t = Text::new();
    for c in s.chars() {
        if t.push(c).is_err() {
            break;
        }
    }
    t
}

fn main() {
    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "mtc-kob.dyndns.org".into());
    let port: u16 = args
        .next()
        .and_then(|p| p.parse().ok())
        .unwrap_or(7890);

    let cfg = default_config();
    let wire_cfg = match WireConfig::new(&host, port, 11, "RT, Rusty Telegraph") {
        Ok(c) => c,
        Err(e) => {
            eprintln!("bad configuration: {}", e);
            std::process::exit(2);
        }
    };

    *STATUS.lock().unwrap() = Some(Status {
        text_wpm: cfg.text_wpm,
        char_wpm: cfg.char_wpm,
        ..Status::default()
    });

    // The two cores and the alarm threads all share these
    let bus: &'static Bus = Box::leak(Box::new(Bus::new()));
    let pool: &'static Pool = Box::leak(Box::new(Pool::new()));
    let sched: &'static Sched = Box::leak(Box::new(Sched::new()));

    let alarm = ThreadAlarmDriver { bus, sched };

    // Backend "core"
    let backend_wire_cfg = wire_cfg.clone();
    thread::spawn(move || {
        let mut rt = BackendRuntime::new(
            bus,
            pool,
            sched,
            alarm,
            UdpWireTransport::new(),
            backend_wire_cfg,
            cfg,
        );
        let mut lp = DispatchLoop::new(BACKEND_CORE);
        loop {
            if lp.poll(bus, &mut rt, now()) != Polled::Message {
                thread::sleep(StdDuration::from_millis(1));
            }
        }
    });

    // Presentation "core"
    thread::spawn(move || {
        let mut rt = UiRuntime::new(pool, PrintSink);
        let mut lp = DispatchLoop::new(UI_CORE);
        loop {
            if lp.poll(bus, &mut rt, now()) != Polled::Message {
                thread::sleep(StdDuration::from_millis(1));
            }
        }
    });

    println!("rustytelegraph terminal, relay {}:{}", host, port);
    println!("type 'connect' to join wire {}, 'quit' to exit", wire_cfg.wire);

    let mut selected_wire = wire_cfg.wire;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        let mut parts = line.split_whitespace();
        let Some(cmd) = parts.next() else { continue };
        match cmd {
            "connect" => {
                let wire = parts.next().and_then(|w| w.parse().ok()).unwrap_or(selected_wire);
                selected_wire = wire;
                post(bus, Message::WireConnect(wire));
            }
            "disconnect" => post(bus, Message::WireDisconnect),
            "toggle" => post(bus, Message::WireToggle),
            "wire" => match parts.next().and_then(|w| w.parse::<u16>().ok()) {
                Some(w) if (1..=999).contains(&w) => {
                    selected_wire = w;
                    println!("wire {} selected", w);
                }
                _ => println!("usage: wire <1-999>"),
            },
            "speed" => {
                let text_wpm = parts.next().and_then(|w| w.parse::<u8>().ok());
                let char_wpm = parts.next().and_then(|w| w.parse::<u8>().ok());
                match text_wpm {
                    Some(t) if (5..=60).contains(&t) => {
                        let c = char_wpm.unwrap_or(t);
                        post(
                            bus,
                            Message::SpeedChange {
                                text_wpm: t,
                                char_wpm: c,
                            },
                        );
                    }
                    _ => println!("usage: speed <text-wpm> [char-wpm]"),
                }
            }
            "table" => match parts.next() {
                Some("american") => post(bus, Message::TableChange(CodeTable::American)),
                Some("international") => {
                    post(bus, Message::TableChange(CodeTable::International))
                }
                _ => println!("usage: table american|international"),
            },
            "encode" => {
                let rest = line.trim_start().splitn(2, ' ').nth(1).unwrap_or("");
                if rest.is_empty() {
                    println!("usage: encode <text>");
                } else {
                    post(bus, Message::EncodeText(text_of(rest)));
                }
            }
            "status" => print_status(),
            "quit" | "exit" => {
                post(bus, Message::WireDisconnect);
                break;
            }
            other => println!("unknown command: {}", other),
        }
    }

    // Give the disconnect a moment to go out
    thread::sleep(StdDuration::from_millis(100));
}
