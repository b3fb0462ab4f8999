//! Hardware Abstraction Layer for the telegraph terminal

// Re-export time types based on feature
#[cfg(feature = "embassy-time")]
pub use embassy_time::{Duration, Instant};

#[cfg(not(feature = "embassy-time"))]
pub use self::mock_time::{Duration, Instant};

#[cfg(not(feature = "embassy-time"))]
mod mock_time {
    /// Mock instant type for compilation without embassy-time.
    ///
    /// `now()` is a placeholder; deterministic callers pass explicit
    /// instants built with `from_millis`.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
    pub struct Instant(u64);

    impl Instant {
        pub fn now() -> Self {
            Self(0) // Placeholder implementation
        }

        pub const fn from_millis(ms: u64) -> Self {
            Self(ms)
        }

        pub const fn from_secs(s: u64) -> Self {
            Self(s * 1000)
        }

        pub fn duration_since(&self, other: Instant) -> Duration {
            Duration::from_millis(self.0.saturating_sub(other.0))
        }

        pub const fn as_millis(&self) -> u64 {
            self.0
        }
    }

    /// Mock duration type
    #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
    pub struct Duration(u64);

    impl Duration {
        pub const fn from_millis(ms: u64) -> Self {
            Self(ms)
        }

        pub const fn from_secs(s: u64) -> Self {
            Self(s * 1000)
        }

        pub const fn as_millis(&self) -> u64 {
            self.0
        }
    }

    impl core::ops::Add<Duration> for Instant {
        type Output = Instant;

        fn add(self, rhs: Duration) -> Instant {
            Instant(self.0 + rhs.0)
        }
    }

    impl core::ops::Add for Duration {
        type Output = Duration;

        fn add(self, rhs: Duration) -> Duration {
            Duration(self.0 + rhs.0)
        }
    }

    impl core::ops::Div<u32> for Duration {
        type Output = Duration;

        fn div(self, rhs: u32) -> Duration {
            Duration(self.0 / rhs as u64)
        }
    }

    impl core::ops::Mul<u32> for Duration {
        type Output = Duration;

        fn mul(self, rhs: u32) -> Duration {
            Duration(self.0 * rhs as u64)
        }
    }
}

use embedded_hal::digital::OutputPin;

/// Error types for HAL operations
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HalError {
    /// One-shot alarm could not be armed or cancelled
    AlarmError,
    /// Relay host could not be resolved
    ResolveError,
    /// UDP endpoint could not be bound
    BindError,
    /// Datagram send failed
    SendError,
    /// Socket used while closed
    NotOpen,
    /// Invalid configuration
    InvalidConfig,
}

#[cfg(feature = "std")]
impl core::fmt::Display for HalError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            HalError::AlarmError => write!(f, "alarm operation failed"),
            HalError::ResolveError => write!(f, "relay host resolution failed"),
            HalError::BindError => write!(f, "UDP bind failed"),
            HalError::SendError => write!(f, "datagram send failed"),
            HalError::NotOpen => write!(f, "socket not open"),
            HalError::InvalidConfig => write!(f, "invalid configuration"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for HalError {}

/// One-shot platform alarm driver.
///
/// The scheduler reserves a slot, then arms the alarm for that slot index.
/// When the alarm fires, the platform callback runs in interrupt context and
/// must do nothing beyond calling [`TimerScheduler::fire`] for the slot;
/// that path only mutates critical-section-protected state and posts to the
/// message bus through its interrupt-safe entry points.
///
/// [`TimerScheduler::fire`]: crate::scheduler::TimerScheduler::fire
pub trait AlarmDriver {
    /// Arm the one-shot alarm for `slot` to fire after `after`
    fn arm(&mut self, slot: usize, after: Duration) -> Result<(), HalError>;

    /// Cancel a previously armed alarm; cancelling an idle slot is a no-op
    fn cancel(&mut self, slot: usize) -> Result<(), HalError>;
}

/// UDP endpoint used by the wire protocol client.
///
/// `try_recv` must never block: on platforms where reception is a callback,
/// the callback can hand datagrams to [`WireClient::on_datagram`] directly
/// and `try_recv` can simply return `Ok(None)`; on polling platforms the
/// dispatch loop drains it as idle work.
///
/// [`WireClient::on_datagram`]: crate::wire::WireClient::on_datagram
pub trait WireTransport {
    /// Resolve the relay host and bind a UDP endpoint connected to it
    fn open(&mut self, host: &str, port: u16) -> Result<(), HalError>;

    /// Send one datagram to the relay
    fn send(&mut self, buf: &[u8]) -> Result<(), HalError>;

    /// Non-blocking receive of one datagram, if available
    fn try_recv(&mut self, buf: &mut [u8]) -> Result<Option<usize>, HalError>;

    /// Release the endpoint; further sends fail with `NotOpen`
    fn close(&mut self);

    /// True between a successful `open` and `close`
    fn is_open(&self) -> bool;
}

/// Sounder drive line for embedded-hal compatible output pins.
///
/// Energized means the electromagnet pulls the lever down (circuit closed).
pub struct SounderOut<P> {
    pin: P,
    inverted: bool,
}

impl<P> SounderOut<P>
where
    P: OutputPin,
{
    pub fn new(pin: P, inverted: bool) -> Self {
        Self { pin, inverted }
    }

    /// Set the drive line (true = circuit closed, lever down)
    pub fn set_closed(&mut self, closed: bool) -> Result<(), HalError> {
        let level = if self.inverted { !closed } else { closed };
        if level {
            self.pin.set_high().map_err(|_| HalError::InvalidConfig)
        } else {
            self.pin.set_low().map_err(|_| HalError::InvalidConfig)
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    //! Mock implementations for testing

    use super::*;
    use heapless::Vec;

    const MOCK_ALARMS: usize = 16;

    /// Records arm/cancel calls; never actually fires
    pub struct MockAlarmDriver {
        pub armed: [Option<Duration>; MOCK_ALARMS],
        pub cancelled: [bool; MOCK_ALARMS],
        pub fail_arm: bool,
    }

    impl MockAlarmDriver {
        pub fn new() -> Self {
            Self {
                armed: [None; MOCK_ALARMS],
                cancelled: [false; MOCK_ALARMS],
                fail_arm: false,
            }
        }
    }

    impl Default for MockAlarmDriver {
        fn default() -> Self {
            Self::new()
        }
    }

    impl AlarmDriver for MockAlarmDriver {
        fn arm(&mut self, slot: usize, after: Duration) -> Result<(), HalError> {
            if self.fail_arm {
                return Err(HalError::AlarmError);
            }
            self.armed[slot] = Some(after);
            self.cancelled[slot] = false;
            Ok(())
        }

        fn cancel(&mut self, slot: usize) -> Result<(), HalError> {
            self.armed[slot] = None;
            self.cancelled[slot] = true;
            Ok(())
        }
    }

    /// Loopback-style transport: captures sent datagrams, replays queued ones
    pub struct MockWireTransport {
        open: bool,
        pub fail_open: bool,
        pub sent: Vec<Vec<u8, 512>, 16>,
        pub inbound: Vec<Vec<u8, 512>, 16>,
    }

    impl MockWireTransport {
        pub fn new() -> Self {
            Self {
                open: false,
                fail_open: false,
                sent: Vec::new(),
                inbound: Vec::new(),
            }
        }

        /// Queue a datagram for the next `try_recv`
        pub fn push_inbound(&mut self, buf: &[u8]) {
            let mut v = Vec::new();
            v.extend_from_slice(buf).ok();
            self.inbound.push(v).ok();
        }
    }

    impl Default for MockWireTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    impl WireTransport for MockWireTransport {
        fn open(&mut self, _host: &str, _port: u16) -> Result<(), HalError> {
            if self.fail_open {
                return Err(HalError::BindError);
            }
            self.open = true;
            Ok(())
        }

        fn send(&mut self, buf: &[u8]) -> Result<(), HalError> {
            if !self.open {
                return Err(HalError::NotOpen);
            }
            let mut v = Vec::new();
            v.extend_from_slice(buf).ok();
            self.sent.push(v).ok();
            Ok(())
        }

        fn try_recv(&mut self, buf: &mut [u8]) -> Result<Option<usize>, HalError> {
            if !self.open {
                return Err(HalError::NotOpen);
            }
            if self.inbound.is_empty() {
                return Ok(None);
            }
            let d = self.inbound.remove(0);
            buf[..d.len()].copy_from_slice(&d);
            Ok(Some(d.len()))
        }

        fn close(&mut self) {
            self.open = false;
        }

        fn is_open(&self) -> bool {
            self.open
        }
    }

    /// Mock sounder pin recording the last drive level
    #[derive(Default)]
    pub struct MockSounderPin {
        pub high: bool,
    }

    impl embedded_hal::digital::ErrorType for MockSounderPin {
        type Error = core::convert::Infallible;
    }

    impl embedded_hal::digital::OutputPin for MockSounderPin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.high = false;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.high = true;
            Ok(())
        }
    }
}
