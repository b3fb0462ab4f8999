//! Interrupt-safe message bus: one fixed-capacity FIFO per core.
//!
//! All cross-core and interrupt-to-core communication goes through here.
//! Queue mutation happens inside a critical section (never a blocking
//! lock), so every operation is legal from alarm and receive callbacks.
//! Nothing in this module allocates.

use core::cell::RefCell;
use core::hint;

use critical_section::Mutex;
use heapless::Deque;

use crate::hal::Instant;
use crate::types::{CoreId, Envelope, Message};

/// Default queue depth per core
pub const BUS_DEPTH: usize = 32;

/// A post was refused because the addressed queue was full
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct BusFull;

/// Free-slot count below which the near-overflow diagnostic trips.
/// This is detection, not backpressure: the bus has no flow-control peer.
const NEAR_FULL_SLOTS: usize = 4;

struct MailboxInner<const N: usize> {
    q: Deque<Envelope, N>,
    /// Times the queue has been observed near capacity
    pressure_events: u32,
}

struct Mailbox<const N: usize> {
    inner: Mutex<RefCell<MailboxInner<N>>>,
}

impl<const N: usize> Mailbox<N> {
    fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(MailboxInner {
                q: Deque::new(),
                pressure_events: 0,
            })),
        }
    }
}

/// Two independent FIFO queues, addressed by [`CoreId`].
///
/// `fatal_on_pressure` turns the near-overflow diagnostic into a panic;
/// debug firmware builds enable it so a queue sized too small surfaces
/// immediately instead of silently dropping telegraph data.
pub struct MessageBus<const N: usize = BUS_DEPTH> {
    boxes: [Mailbox<N>; 2],
    fatal_on_pressure: bool,
}

impl<const N: usize> MessageBus<N> {
    pub fn new() -> Self {
        Self {
            boxes: [Mailbox::new(), Mailbox::new()],
            fatal_on_pressure: false,
        }
    }

    pub fn with_fatal_on_pressure() -> Self {
        let mut bus = Self::new();
        bus.fatal_on_pressure = true;
        bus
    }

    /// Single enqueue attempt; hands the message back when the queue is full
    fn try_post(&self, core: CoreId, msg: Message, now: Instant) -> Result<(), Message> {
        let fatal = self.fatal_on_pressure;
        critical_section::with(|cs| {
            let mut inner = self.boxes[core.index()].inner.borrow_ref_mut(cs);
            let env = Envelope {
                msg,
                queued_at: now,
            };
            if let Err(env) = inner.q.push_back(env) {
                return Err(env.msg);
            }
            if N - inner.q.len() < NEAR_FULL_SLOTS {
                inner.pressure_events += 1;
                #[cfg(feature = "defmt")]
                {
                    defmt::warn!(
                        "bus core{} near overflow: {} queued",
                        core.index(),
                        inner.q.len()
                    );
                    for env in inner.q.iter() {
                        defmt::debug!("  queued msg id {}", env.msg.id());
                    }
                }
                if fatal {
                    panic!("message bus near overflow on core {}", core.index());
                }
            }
            Ok(())
        })
    }

    /// Post without waiting; `Err(BusFull)` if the queue has no space.
    ///
    /// Used for high-frequency traffic whose loss is tolerable (status
    /// updates, wire code forwarded on the receive path).
    pub fn post_nowait(&self, core: CoreId, msg: Message, now: Instant) -> Result<(), BusFull> {
        self.try_post(core, msg, now).map_err(|_| BusFull)
    }

    /// Post, spinning until space exists. For must-deliver control
    /// messages only; the producer core stalls, it does not sleep.
    pub fn post(&self, core: CoreId, msg: Message, now: Instant) {
        let mut msg = msg;
        loop {
            match self.try_post(core, msg, now) {
                Ok(()) => return,
                Err(m) => msg = m,
            }
            hint::spin_loop();
        }
    }

    /// Receive without waiting
    pub fn get_nowait(&self, core: CoreId) -> Option<Envelope> {
        critical_section::with(|cs| {
            self.boxes[core.index()]
                .inner
                .borrow_ref_mut(cs)
                .q
                .pop_front()
        })
    }

    /// Receive, spinning until a message arrives
    pub fn get_blocking(&self, core: CoreId) -> Envelope {
        loop {
            if let Some(env) = self.get_nowait(core) {
                return env;
            }
            hint::spin_loop();
        }
    }

    /// Free queue slots on the given core's queue
    pub fn free_slots(&self, core: CoreId) -> usize {
        critical_section::with(|cs| {
            N - self.boxes[core.index()].inner.borrow_ref_mut(cs).q.len()
        })
    }

    /// Times the given core's queue has been observed near capacity
    pub fn pressure_events(&self, core: CoreId) -> u32 {
        critical_section::with(|cs| {
            self.boxes[core.index()]
                .inner
                .borrow_ref_mut(cs)
                .pressure_events
        })
    }
}

impl<const N: usize> Default for MessageBus<N> {
    fn default() -> Self {
        Self::new()
    }
}
