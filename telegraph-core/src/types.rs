//! Core data types for the telegraph terminal

use heapless::String;

use crate::pool::CodeHandle;
use crate::hal::Instant;
use crate::tables::CodeTable;

/// Reserved code element: circuit latched closed (extended mark begins)
pub const LATCH_MARK_START: i32 = 1;
/// Reserved code element: circuit released (extended mark ends)
pub const LATCH_MARK_END: i32 = 2;
/// Synthetic space element marking detected code loss on the wire
pub const LONG_BREAK: i32 = -0x7FFF;

/// Station identifier as carried in wire packets (127 chars + NUL)
pub type StationId = String<128>;
/// Decoded text fragment posted to the presentation core
pub type Text = String<64>;

/// Physical core a message is addressed to
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CoreId {
    /// Runs the codec, scheduler and wire client
    Core0,
    /// Runs presentation and input sampling
    Core1,
}

impl CoreId {
    pub const fn index(&self) -> usize {
        match self {
            CoreId::Core0 => 0,
            CoreId::Core1 => 1,
        }
    }

    pub const fn other(&self) -> CoreId {
        match self {
            CoreId::Core0 => CoreId::Core1,
            CoreId::Core1 => CoreId::Core0,
        }
    }
}

/// Origin of a code sequence
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CodeSource {
    /// Typed or replayed through the local UI
    LocalUi,
    /// Read from the telegraph key
    Key,
    /// Received from the wire
    Wire,
}

/// Every message exchanged between the cores and interrupt context.
///
/// Messages are cloned by value into the bus queues. A `Code` payload is an
/// ownership transfer: the receiver must release the handle back to the
/// pool once the sequence has been consumed.
#[derive(Clone, PartialEq, Debug)]
pub enum Message {
    /// Code sequence to decode and/or sound
    Code(CodeHandle),
    /// Force resolution of pending half-decoded characters
    DecodeFlush,
    /// Text to encode and transmit
    EncodeText(Text),
    /// Decoded text for the display
    DecodedText(Text),
    /// Join the given wire
    WireConnect(u16),
    /// Leave the current wire
    WireDisconnect,
    /// Disconnect if connected, else reconnect to the last wire
    WireToggle,
    /// Periodic identity re-send keeping the relay session alive
    WireKeepAlive,
    /// Connection state change for the display
    ConnectionState(bool),
    /// Speed configuration change (text and character WPM)
    SpeedChange { text_wpm: u8, char_wpm: u8 },
    /// Code table selection change
    TableChange(CodeTable),
    /// Most recent code-sending station for the display
    CurrentSender(StationId),
}

impl Message {
    /// Stable numeric identifier, used in queue diagnostics
    pub const fn id(&self) -> u8 {
        match self {
            Message::Code(_) => 1,
            Message::DecodeFlush => 2,
            Message::EncodeText(_) => 3,
            Message::DecodedText(_) => 4,
            Message::WireConnect(_) => 5,
            Message::WireDisconnect => 6,
            Message::WireToggle => 7,
            Message::WireKeepAlive => 8,
            Message::ConnectionState(_) => 9,
            Message::SpeedChange { .. } => 10,
            Message::TableChange(_) => 11,
            Message::CurrentSender(_) => 12,
        }
    }
}

/// A queued message plus its enqueue timestamp (latency diagnostics)
#[derive(Clone, Debug)]
pub struct Envelope {
    pub msg: Message,
    pub queued_at: Instant,
}

/// Where Farnsworth surplus time is injected
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Spacing {
    /// Encode at character speed, no surplus
    None,
    /// Widen inter-character gaps (and the word gap proportionally)
    Char,
    /// Widen word gaps only
    Word,
}

/// Morse codec configuration
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MorseConfig {
    /// Overall text speed in words per minute
    pub text_wpm: u8,
    /// Minimum character speed; marks never slow below this
    pub char_wpm: u8,
    pub spacing: Spacing,
    pub table: CodeTable,
}

impl Default for MorseConfig {
    fn default() -> Self {
        Self {
            text_wpm: 20,
            char_wpm: 20,
            spacing: Spacing::None,
            table: CodeTable::American,
        }
    }
}

impl MorseConfig {
    /// Create a new configuration with validation
    pub fn new(
        text_wpm: u8,
        char_wpm: u8,
        spacing: Spacing,
        table: CodeTable,
    ) -> Result<Self, &'static str> {
        if text_wpm < 5 || text_wpm > 60 {
            return Err("text WPM must be between 5 and 60");
        }
        if char_wpm < 5 || char_wpm > 60 {
            return Err("character WPM must be between 5 and 60");
        }
        Ok(Self {
            text_wpm,
            char_wpm,
            spacing,
            table,
        })
    }

    /// Character speed actually used for marks (never below text speed)
    pub fn effective_char_wpm(&self) -> u8 {
        self.char_wpm.max(self.text_wpm)
    }

    /// Unit dot length in milliseconds (PARIS standard: 50 units per word)
    pub fn dot_ms(&self) -> u32 {
        1200 / self.effective_char_wpm() as u32
    }
}

/// Wire relay configuration
#[derive(Clone, Debug, PartialEq)]
pub struct WireConfig {
    pub host: String<48>,
    pub port: u16,
    pub wire: u16,
    pub office_id: StationId,
}

impl WireConfig {
    pub fn new(host: &str, port: u16, wire: u16, office_id: &str) -> Result<Self, &'static str> {
        if host.is_empty() || host.len() > 48 {
            return Err("relay host must be 1 to 48 characters");
        }
        if port == 0 {
            return Err("relay port must be nonzero");
        }
        if wire == 0 || wire > 999 {
            return Err("wire number must be between 1 and 999");
        }
        if office_id.len() > 127 {
            return Err("office id must be at most 127 characters");
        }
        let mut h = String::new();
        h.push_str(host).map_err(|_| "relay host too long")?;
        let mut id = String::new();
        id.push_str(office_id).map_err(|_| "office id too long")?;
        Ok(Self {
            host: h,
            port,
            wire,
            office_id: id,
        })
    }
}
