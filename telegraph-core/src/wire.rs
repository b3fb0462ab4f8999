//! Wire protocol client: relay session state machine and station table.
//!
//! The session is a two-state machine. `connect` binds the transport,
//! sends CONNECT, and leaves a continuation armed: the next ACK answers it
//! by sending this station's identity, after which the periodic keep-alive
//! starts. Inbound DATA either announces a station (code count zero) or
//! carries code, which is forwarded to the decoding core through the bus.
//! That forward is non-blocking, because code volume is never worth
//! stalling the receive path; a refused post frees the pool entry and the
//! code is lost with a diagnostic only.

use heapless::Vec;

use crate::bus::MessageBus;
use crate::hal::{HalError, Instant, WireTransport};
use crate::packet::{self, PacketError, WirePacket};
use crate::pool::{CodePool, PoolError};
use crate::types::{CodeSource, CoreId, Message, StationId, WireConfig, LONG_BREAK};

/// Identity re-send period keeping the relay session alive
pub const KEEPALIVE_INTERVAL_MS: u64 = 10_000;
/// A station silent this long is dropped from the active list
pub const STATION_STALE_MS: u64 = 60_000;

/// Stations tracked at once
pub const STATION_TABLE_SIZE: usize = 8;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum WireState {
    NotConnected,
    Connected,
}

/// Continuation run when the next ACK arrives
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum AfterAck {
    None,
    SendId,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum WireError {
    Hal(HalError),
    Packet(PacketError),
    /// Pool exhaustion on the receive path; fatal at the call site
    Pool(PoolError),
}

impl From<HalError> for WireError {
    fn from(e: HalError) -> Self {
        WireError::Hal(e)
    }
}

impl From<PacketError> for WireError {
    fn from(e: PacketError) -> Self {
        WireError::Packet(e)
    }
}

/// What a handled datagram amounted to
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum WireEvent {
    /// Nothing the caller needs to act on
    None,
    /// ACK answered the CONNECT; identity sent, start keep-alives
    HandshakeComplete,
    /// A station announced itself
    StationSeen,
    /// Code forwarded to the decoding core
    Code { sender_changed: bool },
    /// Code arrived but the bus was full; it was dropped and freed
    CodeDropped,
}

/// One remote participant on the wire
#[derive(Clone, Debug)]
pub struct StationRecord {
    pub id: StationId,
    pub first_seen: Instant,
    pub last_ping: Instant,
    pub last_code: Option<Instant>,
}

/// Fixed-capacity table of the most recently active stations.
///
/// Eviction always takes the record with the oldest last-ping; records
/// idle past [`STATION_STALE_MS`] are invalidated outright. The compacted
/// active list is rebuilt on every upsert.
pub struct StationTable<const S: usize = STATION_TABLE_SIZE> {
    records: [Option<StationRecord>; S],
    active: Vec<u8, S>,
}

impl<const S: usize> StationTable<S> {
    pub fn new() -> Self {
        Self {
            records: core::array::from_fn(|_| None),
            active: Vec::new(),
        }
    }

    /// Record a ping (identity packet) from `id`
    pub fn touch_ping(&mut self, id: &str, now: Instant) {
        self.touch(id, now, false);
    }

    /// Record code received from `id`
    pub fn touch_code(&mut self, id: &str, now: Instant) {
        self.touch(id, now, true);
    }

    fn touch(&mut self, id: &str, now: Instant, code: bool) {
        self.invalidate_stale(now);

        let slot = match self
            .records
            .iter()
            .position(|r| r.as_ref().is_some_and(|r| r.id.as_str() == id))
        {
            Some(i) => i,
            None => self.take_slot(),
        };

        match &mut self.records[slot] {
            Some(r) if r.id.as_str() == id => {
                r.last_ping = now;
                if code {
                    r.last_code = Some(now);
                }
            }
            other => {
                let mut sid = StationId::new();
                sid.push_str(&id[..id.len().min(127)]).ok();
                *other = Some(StationRecord {
                    id: sid,
                    first_seen: now,
                    last_ping: now,
                    last_code: if code { Some(now) } else { None },
                });
            }
        }

        self.rebuild_active();
    }

    /// Free slot, or the one with the oldest last-ping
    fn take_slot(&mut self) -> usize {
        if let Some(i) = self.records.iter().position(|r| r.is_none()) {
            return i;
        }
        let mut oldest = 0;
        let mut oldest_ping: Option<Instant> = None;
        for (i, r) in self.records.iter().enumerate() {
            if let Some(rec) = r {
                if oldest_ping.map_or(true, |p| rec.last_ping < p) {
                    oldest = i;
                    oldest_ping = Some(rec.last_ping);
                }
            }
        }
        self.records[oldest] = None;
        oldest
    }

    fn invalidate_stale(&mut self, now: Instant) {
        for r in self.records.iter_mut() {
            let stale = r
                .as_ref()
                .is_some_and(|r| now.duration_since(r.last_ping).as_millis() > STATION_STALE_MS);
            if stale {
                *r = None;
            }
        }
    }

    fn rebuild_active(&mut self) {
        self.active.clear();
        for (i, r) in self.records.iter().enumerate() {
            if r.is_some() {
                self.active.push(i as u8).ok();
            }
        }
    }

    /// Compacted view of the live records
    pub fn active(&self) -> impl Iterator<Item = &StationRecord> {
        self.active
            .iter()
            .filter_map(|&i| self.records[i as usize].as_ref())
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&StationRecord> {
        self.active().find(|r| r.id.as_str() == id)
    }
}

impl<const S: usize> Default for StationTable<S> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct WireClient<T: WireTransport, const S: usize = STATION_TABLE_SIZE> {
    transport: T,
    state: WireState,
    cfg: WireConfig,
    version: &'static str,
    tx_seq: i32,
    /// Last code sequence number seen from the current sender; -1 = unsynced
    rx_seq: i32,
    after_ack: AfterAck,
    stations: StationTable<S>,
    current_sender: Option<StationId>,
}

impl<T: WireTransport, const S: usize> WireClient<T, S> {
    pub fn new(transport: T, cfg: WireConfig) -> Self {
        Self {
            transport,
            state: WireState::NotConnected,
            cfg,
            version: concat!("rustytelegraph ", env!("CARGO_PKG_VERSION")),
            tx_seq: 0,
            rx_seq: -1,
            after_ack: AfterAck::None,
            stations: StationTable::new(),
            current_sender: None,
        }
    }

    pub fn state(&self) -> WireState {
        self.state
    }

    pub fn config(&self) -> &WireConfig {
        &self.cfg
    }

    pub fn set_wire(&mut self, wire: u16) {
        self.cfg.wire = wire;
    }

    pub fn stations(&self) -> &StationTable<S> {
        &self.stations
    }

    pub fn current_sender(&self) -> Option<&StationId> {
        self.current_sender.as_ref()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Join `wire`, disconnecting from any current session first.
    ///
    /// On success a CONNECT is on its way and the identity send is armed
    /// for the next ACK. Failure leaves the client cleanly disconnected;
    /// the operator can simply retry.
    pub fn connect(&mut self, wire: u16) -> Result<(), WireError> {
        if self.state == WireState::Connected {
            self.disconnect();
        }
        self.cfg.wire = wire;
        let host = self.cfg.host.clone();
        self.transport.open(host.as_str(), self.cfg.port)?;
        self.state = WireState::Connected;
        self.rx_seq = -1;
        self.transport
            .send(&packet::short_packet(packet::CMD_CONNECT, wire))?;
        self.after_ack = AfterAck::SendId;
        Ok(())
    }

    /// Leave the wire. Always ends in `NotConnected`.
    pub fn disconnect(&mut self) {
        if self.transport.is_open() {
            self.transport
                .send(&packet::short_packet(packet::CMD_DISCONNECT, self.cfg.wire))
                .ok();
        }
        self.transport.close();
        self.state = WireState::NotConnected;
        self.after_ack = AfterAck::None;
        self.current_sender = None;
    }

    /// Disconnect if connected, else rejoin the configured wire
    pub fn connect_toggle(&mut self) -> Result<WireState, WireError> {
        match self.state {
            WireState::Connected => {
                self.disconnect();
                Ok(WireState::NotConnected)
            }
            WireState::NotConnected => {
                self.connect(self.cfg.wire)?;
                Ok(WireState::Connected)
            }
        }
    }

    /// Send this station's identity packet
    pub fn send_id(&mut self) -> Result<(), WireError> {
        self.tx_seq += 1;
        let id = self.cfg.office_id.clone();
        let buf = packet::identity_packet(id.as_str(), self.tx_seq, self.version);
        self.transport.send(&buf)?;
        Ok(())
    }

    /// Send a code sequence, chunked into wire packets
    pub fn send_code(&mut self, code: &[i32], text: &str) -> Result<(), WireError> {
        if self.state != WireState::Connected {
            return Err(WireError::Hal(HalError::NotOpen));
        }
        let id = self.cfg.office_id.clone();
        for chunk in code.chunks(packet::MAX_CODE_PER_PACKET) {
            self.tx_seq += 1;
            let buf = packet::code_packet(id.as_str(), self.tx_seq, chunk, text);
            self.transport.send(&buf)?;
        }
        Ok(())
    }

    /// Periodic keep-alive: re-send identity while connected
    pub fn keepalive_tick(&mut self) -> Result<(), WireError> {
        if self.state == WireState::Connected {
            self.send_id()?;
        }
        Ok(())
    }

    /// Handle one inbound datagram.
    ///
    /// Safe to call from the receive callback: it only touches client
    /// state, the pool and the bus through their interrupt-safe paths,
    /// and never blocks.
    pub fn on_datagram<const B: usize, const PN: usize, const PL: usize>(
        &mut self,
        buf: &[u8],
        now: Instant,
        bus: &MessageBus<B>,
        pool: &CodePool<PN, PL>,
        decode_core: CoreId,
    ) -> Result<WireEvent, WireError> {
        match packet::parse(buf)? {
            WirePacket::Ack => {
                if self.after_ack == AfterAck::SendId {
                    self.after_ack = AfterAck::None;
                    self.send_id()?;
                    return Ok(WireEvent::HandshakeComplete);
                }
                Ok(WireEvent::None)
            }
            WirePacket::Identity { id, seq } => {
                self.stations.touch_ping(id.as_str(), now);
                if self.current_sender.as_ref() == Some(&id) {
                    // Keep our gap detector aligned while the sender idles
                    self.rx_seq = seq;
                }
                Ok(WireEvent::StationSeen)
            }
            WirePacket::Code { id, seq, code } => {
                if seq == self.rx_seq {
                    // Duplicate delivery
                    return Ok(WireEvent::None);
                }
                self.stations.touch_code(id.as_str(), now);
                let sender_changed = self.current_sender.as_ref() != Some(&id);
                if sender_changed {
                    self.current_sender = Some(id);
                }
                let gap = self.rx_seq >= 0 && seq != self.rx_seq + 1;
                self.rx_seq = seq;

                let handle = if gap {
                    // Loss marker first, so the break is visible downstream
                    let h = pool
                        .alloc(CodeSource::Wire, &[LONG_BREAK])
                        .map_err(WireError::Pool)?;
                    pool.append(h, &code).map_err(WireError::Pool)?;
                    h
                } else {
                    pool.alloc(CodeSource::Wire, &code).map_err(WireError::Pool)?
                };

                if bus
                    .post_nowait(decode_core, Message::Code(handle), now)
                    .is_err()
                {
                    // Receive path never blocks on the bus; drop the code
                    pool.free(handle).ok();
                    #[cfg(feature = "defmt")]
                    defmt::warn!("bus full, dropped wire code seq {}", seq);
                    return Ok(WireEvent::CodeDropped);
                }
                Ok(WireEvent::Code { sender_changed })
            }
            // The relay never sends these to a client; ignore
            WirePacket::Connect { .. } | WirePacket::Disconnect { .. } => Ok(WireEvent::None),
        }
    }
}
