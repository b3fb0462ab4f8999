//! Binary wire packet layouts for the telegraph relay protocol.
//!
//! All packets are little-endian with fixed offsets. Short packets carry a
//! command and a wire number; full data packets are 496 bytes. Identity
//! and code packets share the DATA command and are told apart by the code
//! count field, which falls in padding (always zero) for identity packets.

use heapless::{String, Vec};

use crate::types::StationId;

pub const CMD_DISCONNECT: u16 = 2;
pub const CMD_DATA: u16 = 3;
pub const CMD_CONNECT: u16 = 4;
pub const CMD_ACK: u16 = 5;

/// Full data packet size
pub const PACKET_LEN: usize = 496;
/// Connect/disconnect packet size
pub const SHORT_PACKET_LEN: usize = 4;
/// Code elements one packet can carry
pub const MAX_CODE_PER_PACKET: usize = 51;

// Data packet offsets
const OFF_CMD: usize = 0;
const OFF_BYTE_COUNT: usize = 2;
const OFF_ID: usize = 4;
const OFF_SEQ: usize = 136;
const OFF_ID_FLAG: usize = 140;
const OFF_CODE: usize = 152;
const OFF_CODE_COUNT: usize = 356;
const OFF_TEXT: usize = 360;

const ID_LEN: usize = 128;
const TEXT_LEN: usize = 128;

/// Value of the byte-count field: payload bytes after the header
const BYTE_COUNT: u16 = (PACKET_LEN - SHORT_PACKET_LEN) as u16;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PacketError {
    /// Shorter than the smallest packet
    TooShort(usize),
    /// DATA packet shorter than the fixed layout
    Truncated(usize),
    /// Code count field outside 0..=51
    BadCodeCount(i32),
    /// Command code this protocol does not define
    UnknownCommand(u16),
}

/// A parsed inbound packet
#[derive(Clone, PartialEq, Debug)]
pub enum WirePacket {
    Connect { wire: u16 },
    Disconnect { wire: u16 },
    Ack,
    /// DATA with zero code count: a station announcing itself
    Identity { id: StationId, seq: i32 },
    /// DATA carrying code
    Code {
        id: StationId,
        seq: i32,
        code: Vec<i32, MAX_CODE_PER_PACKET>,
    },
}

fn put_u16(buf: &mut [u8], off: usize, v: u16) {
    buf[off..off + 2].copy_from_slice(&v.to_le_bytes());
}

fn put_i32(buf: &mut [u8], off: usize, v: i32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

fn get_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

fn get_i32(buf: &[u8], off: usize) -> i32 {
    i32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// NUL-terminated, truncating string write
fn put_str(buf: &mut [u8], off: usize, cap: usize, s: &str) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(cap - 1);
    buf[off..off + n].copy_from_slice(&bytes[..n]);
    buf[off + n] = 0;
}

fn get_str(buf: &[u8], off: usize, cap: usize) -> StationId {
    let field = &buf[off..off + cap];
    let end = field.iter().position(|&b| b == 0).unwrap_or(cap);
    let mut s = String::new();
    for &b in &field[..end] {
        // Station ids are ASCII on the wire; replace anything else
        s.push(if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
            .ok();
    }
    s
}

/// CONNECT or DISCONNECT
pub fn short_packet(cmd: u16, wire: u16) -> [u8; SHORT_PACKET_LEN] {
    let mut buf = [0u8; SHORT_PACKET_LEN];
    put_u16(&mut buf, OFF_CMD, cmd);
    put_u16(&mut buf, OFF_BYTE_COUNT, wire);
    buf
}

/// DATA packet announcing this station's identity
pub fn identity_packet(id: &str, seq: i32, version: &str) -> [u8; PACKET_LEN] {
    let mut buf = [0u8; PACKET_LEN];
    put_u16(&mut buf, OFF_CMD, CMD_DATA);
    put_u16(&mut buf, OFF_BYTE_COUNT, BYTE_COUNT);
    put_str(&mut buf, OFF_ID, ID_LEN, id);
    put_i32(&mut buf, OFF_SEQ, seq);
    put_i32(&mut buf, OFF_ID_FLAG, 1);
    put_str(&mut buf, OFF_TEXT, TEXT_LEN, version);
    buf
}

/// DATA packet carrying up to [`MAX_CODE_PER_PACKET`] code elements
pub fn code_packet(id: &str, seq: i32, code: &[i32], text: &str) -> [u8; PACKET_LEN] {
    let mut buf = [0u8; PACKET_LEN];
    put_u16(&mut buf, OFF_CMD, CMD_DATA);
    put_u16(&mut buf, OFF_BYTE_COUNT, BYTE_COUNT);
    put_str(&mut buf, OFF_ID, ID_LEN, id);
    put_i32(&mut buf, OFF_SEQ, seq);
    let n = code.len().min(MAX_CODE_PER_PACKET);
    for (i, &e) in code[..n].iter().enumerate() {
        put_i32(&mut buf, OFF_CODE + 4 * i, e);
    }
    put_i32(&mut buf, OFF_CODE_COUNT, n as i32);
    put_str(&mut buf, OFF_TEXT, TEXT_LEN, text);
    buf
}

/// Parse one inbound datagram
pub fn parse(buf: &[u8]) -> Result<WirePacket, PacketError> {
    if buf.len() < SHORT_PACKET_LEN {
        return Err(PacketError::TooShort(buf.len()));
    }
    match get_u16(buf, OFF_CMD) {
        CMD_ACK => Ok(WirePacket::Ack),
        CMD_CONNECT => Ok(WirePacket::Connect {
            wire: get_u16(buf, OFF_BYTE_COUNT),
        }),
        CMD_DISCONNECT => Ok(WirePacket::Disconnect {
            wire: get_u16(buf, OFF_BYTE_COUNT),
        }),
        CMD_DATA => {
            if buf.len() < PACKET_LEN {
                return Err(PacketError::Truncated(buf.len()));
            }
            let id = get_str(buf, OFF_ID, ID_LEN);
            let seq = get_i32(buf, OFF_SEQ);
            let count = get_i32(buf, OFF_CODE_COUNT);
            if count == 0 {
                return Ok(WirePacket::Identity { id, seq });
            }
            if count < 0 || count as usize > MAX_CODE_PER_PACKET {
                return Err(PacketError::BadCodeCount(count));
            }
            let mut code = Vec::new();
            for i in 0..count as usize {
                code.push(get_i32(buf, OFF_CODE + 4 * i)).ok();
            }
            Ok(WirePacket::Code { id, seq, code })
        }
        other => Err(PacketError::UnknownCommand(other)),
    }
}
