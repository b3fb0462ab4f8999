//! Per-core cooperative dispatch loop.
//!
//! Each core runs exactly one loop: drain the message bus first, otherwise
//! run one idle task and advance the round-robin cursor. Idle tasks must
//! not block; bounded-latency scheduling here substitutes for a real-time
//! OS. The loop never exits in normal operation; fatal errors panic out.

use crate::bus::MessageBus;
use crate::hal::Instant;
use crate::types::{CoreId, Envelope};

/// What a core's runtime exposes to its dispatch loop.
///
/// Message handling is a match over the closed [`Message`] enumeration
/// inside `on_message`; idle work is a fixed, per-core set of tasks
/// addressed by index.
///
/// [`Message`]: crate::types::Message
pub trait CoreRuntime {
    fn on_message(&mut self, env: Envelope, now: Instant);

    /// Fixed number of idle tasks; may be zero
    fn idle_task_count(&self) -> usize;

    /// Run the idle task at `index` (always < `idle_task_count`)
    fn run_idle(&mut self, index: usize, now: Instant);
}

/// Outcome of one loop iteration
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Polled {
    /// A message was received and dispatched
    Message,
    /// No message; one idle task ran
    Idle,
    /// No message and no idle tasks configured
    Empty,
}

pub struct DispatchLoop {
    core: CoreId,
    idle_cursor: usize,
}

impl DispatchLoop {
    pub fn new(core: CoreId) -> Self {
        Self {
            core,
            idle_cursor: 0,
        }
    }

    pub fn core(&self) -> CoreId {
        self.core
    }

    /// One iteration: message if available, else the next idle task
    pub fn poll<R: CoreRuntime, const N: usize>(
        &mut self,
        bus: &MessageBus<N>,
        rt: &mut R,
        now: Instant,
    ) -> Polled {
        if let Some(env) = bus.get_nowait(self.core) {
            rt.on_message(env, now);
            return Polled::Message;
        }
        let count = rt.idle_task_count();
        if count == 0 {
            return Polled::Empty;
        }
        let index = self.idle_cursor % count;
        self.idle_cursor = (index + 1) % count;
        rt.run_idle(index, now);
        Polled::Idle
    }

    /// Run forever. Requires a real time source (`embassy-time` feature).
    #[cfg(feature = "embassy-time")]
    pub fn run<R: CoreRuntime, const N: usize>(&mut self, bus: &MessageBus<N>, rt: &mut R) -> ! {
        loop {
            self.poll(bus, rt, Instant::now());
        }
    }
}
