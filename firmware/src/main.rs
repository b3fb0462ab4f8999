#![no_std]
#![no_main]

#[cfg(feature = "defmt")]
use defmt_rtt as _;

// Cortex-M runtime
use cortex_m_rt as _;

// Panic handler
use panic_halt as _;

use embassy_executor::Spawner;
use static_cell::StaticCell;

use rustytelegraph_firmware::*;
use telegraph_core::runtime::{Bus, Pool, Sched};

// Static resources: the bus, pool and scheduler are shared between both
// dispatch tasks and the (future) alarm and receive interrupt handlers
static BUS: StaticCell<Bus> = StaticCell::new();
static POOL: StaticCell<Pool> = StaticCell::new();
static SCHED: StaticCell<Sched> = StaticCell::new();

/// Main firmware entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    #[cfg(feature = "defmt")]
    defmt::info!("rustytelegraph firmware starting");

    // TODO: board bring-up (clocks, GPIO, WiFi) once the Pico W HAL is in
    let bus: &'static Bus = BUS.init(Bus::new());
    let pool: &'static Pool = POOL.init(Pool::new());
    let sched: &'static Sched = SCHED.init(Sched::new());

    let cfg = default_config();
    let wire_cfg = match WireConfig::new("mtc-kob.dyndns.org", 7890, 11, "RT, Rusty Telegraph") {
        Ok(cfg) => cfg,
        Err(_e) => {
            #[cfg(feature = "defmt")]
            defmt::panic!("bad built-in wire config: {=str}", _e);
            #[cfg(not(feature = "defmt"))]
            panic!("bad built-in wire config");
        }
    };

    #[cfg(feature = "defmt")]
    defmt::info!(
        "config: {} WPM text / {} WPM char, wire {}",
        cfg.text_wpm,
        cfg.char_wpm,
        wire_cfg.wire
    );

    spawner.must_spawn(backend_task(bus, pool, sched, wire_cfg, cfg));
    spawner.must_spawn(ui_task(bus, pool));

    #[cfg(feature = "defmt")]
    defmt::info!("telegraph firmware ready");

    // Main supervision loop
    loop {
        embassy_time::Timer::after(Duration::from_secs(1)).await;
        #[cfg(feature = "defmt")]
        defmt::trace!("heartbeat, {} pool entries live", pool.live());
    }
}
