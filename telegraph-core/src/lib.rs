#![cfg_attr(not(feature = "std"), no_std)]

//! # Telegraph Core
//!
//! Runtime core for a dual-core Morse telegraph terminal: interrupt-safe
//! message bus, one-shot timer scheduler, cooperative dispatch loops, a
//! fixed pool of code-sequence buffers, an American/International Morse
//! codec with Farnsworth spacing and adaptive decoding, and a UDP wire
//! protocol client with station tracking.
//!
//! Everything is allocation-free and `no_std`-capable; platform bindings
//! implement the traits in [`hal`].

pub mod types;
pub mod hal;
pub mod bus;
pub mod scheduler;
pub mod dispatch;
pub mod pool;
pub mod tables;
pub mod encode;
pub mod decode;
pub mod packet;
pub mod wire;
pub mod runtime;

pub use types::*;
pub use bus::{BusFull, MessageBus, BUS_DEPTH};
pub use scheduler::{TimerHandle, TimerScheduler, SCHED_SLOTS};
pub use dispatch::{CoreRuntime, DispatchLoop, Polled};
pub use pool::{CodeElements, CodeHandle, CodePool, PoolError, CODE_POOL_SIZE, MAX_CODE_LEN};
pub use tables::CodeTable;
pub use encode::{CodeBuf, Encoder};
pub use decode::{Calibration, Decoder, CLOSED_CIRCUIT_GLYPH};
pub use wire::{
    StationRecord, StationTable, WireClient, WireError, WireEvent, WireState,
    KEEPALIVE_INTERVAL_MS, STATION_STALE_MS,
};
pub use runtime::{BackendRuntime, StatusSink, UiRuntime, BACKEND_CORE, UI_CORE};
pub use hal::{AlarmDriver, Duration, HalError, Instant, WireTransport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration for a landline telegraph office
pub fn default_config() -> MorseConfig {
    MorseConfig {
        text_wpm: 20,
        char_wpm: 20,
        spacing: Spacing::None,
        table: CodeTable::American,
    }
}
