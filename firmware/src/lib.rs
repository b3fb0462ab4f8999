#![no_std]

//! Firmware library: mock hardware bindings and the per-core tasks.
//!
//! The board HAL is not wired up yet; the mock bindings let the whole
//! message/codec/wire stack run on the bench. Real bindings replace
//! `NullWireLink` with the WiFi UDP socket and `NullAlarm` with the
//! hardware alarm block.

pub use embassy_executor::Spawner;
pub use embassy_time::Duration;
pub use static_cell::StaticCell;

pub use telegraph_core::*;

pub use crate::mock_hardware::*;
pub use crate::tasks::*;

// Mock hardware module
pub mod mock_hardware {
    use telegraph_core::hal::{AlarmDriver, Duration, HalError, WireTransport};

    /// Stands in for the WiFi UDP socket until the network stack lands
    pub struct NullWireLink {
        open: bool,
    }

    impl NullWireLink {
        pub fn new() -> Self {
            Self { open: false }
        }
    }

    impl Default for NullWireLink {
        fn default() -> Self {
            Self::new()
        }
    }

    impl WireTransport for NullWireLink {
        fn open(&mut self, _host: &str, _port: u16) -> Result<(), HalError> {
            #[cfg(feature = "defmt")]
            defmt::info!("wire link open (mock)");
            self.open = true;
            Ok(())
        }

        fn send(&mut self, _buf: &[u8]) -> Result<(), HalError> {
            if !self.open {
                return Err(HalError::NotOpen);
            }
            Ok(())
        }

        fn try_recv(&mut self, _buf: &mut [u8]) -> Result<Option<usize>, HalError> {
            Ok(None)
        }

        fn close(&mut self) {
            self.open = false;
        }

        fn is_open(&self) -> bool {
            self.open
        }
    }

    /// Always fails to arm, so the scheduler delivers every deferred
    /// message immediately. Correct, just without timing precision,
    /// until the hardware alarm binding lands.
    pub struct NullAlarm;

    impl AlarmDriver for NullAlarm {
        fn arm(&mut self, _slot: usize, _after: Duration) -> Result<(), HalError> {
            Err(HalError::AlarmError)
        }

        fn cancel(&mut self, _slot: usize) -> Result<(), HalError> {
            Ok(())
        }
    }
}

// Embassy tasks module
pub mod tasks {
    use super::*;
    use embassy_time::{Instant, Timer};
    use telegraph_core::dispatch::DispatchLoop;
    use telegraph_core::runtime::{BackendRuntime, Bus, Pool, Sched, UiRuntime};

    use crate::mock_hardware::{NullAlarm, NullWireLink};

    /// Presentation sink logging through defmt
    pub struct LogSink;

    impl StatusSink for LogSink {
        fn decoded_text(&mut self, _text: &str) {
            #[cfg(feature = "defmt")]
            defmt::info!("decoded: {=str}", _text);
        }

        fn connection(&mut self, _connected: bool) {
            #[cfg(feature = "defmt")]
            defmt::info!("wire connected: {}", _connected);
        }

        fn current_sender(&mut self, _id: &str) {
            #[cfg(feature = "defmt")]
            defmt::info!("current sender: {=str}", _id);
        }
    }

    /// Backend dispatch task (core 0 once multicore bring-up lands)
    #[embassy_executor::task]
    pub async fn backend_task(
        bus: &'static Bus,
        pool: &'static Pool,
        sched: &'static Sched,
        wire_cfg: WireConfig,
        cfg: MorseConfig,
    ) {
        #[cfg(feature = "defmt")]
        defmt::info!("backend dispatch task started");

        let mut rt =
            BackendRuntime::new(bus, pool, sched, NullAlarm, NullWireLink::new(), wire_cfg, cfg);
        let mut lp = DispatchLoop::new(BACKEND_CORE);
        loop {
            match lp.poll(bus, &mut rt, Instant::now()) {
                Polled::Message => {}
                _ => Timer::after(Duration::from_millis(1)).await,
            }
        }
    }

    /// Presentation dispatch task (core 1 once multicore bring-up lands)
    #[embassy_executor::task]
    pub async fn ui_task(bus: &'static Bus, pool: &'static Pool) {
        #[cfg(feature = "defmt")]
        defmt::info!("presentation dispatch task started");

        let mut rt = UiRuntime::new(pool, LogSink);
        let mut lp = DispatchLoop::new(UI_CORE);
        loop {
            match lp.poll(bus, &mut rt, Instant::now()) {
                Polled::Message => {}
                _ => Timer::after(Duration::from_millis(1)).await,
            }
        }
    }
}
