//! Deferred message posting via one-shot platform alarms.
//!
//! A scheduled message occupies one slot of a bounded table until it fires
//! or is cancelled. The alarm callback runs in interrupt context: it clears
//! the slot first, then posts the message through the bus, so a cancel
//! racing a fire resolves to "already fired" and the message is delivered
//! at most once.
//!
//! Delivery beats timing: when no slot can be found or the platform alarm
//! cannot be armed, the message is posted immediately and synchronously
//! instead of being dropped.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::bus::MessageBus;
use crate::hal::{AlarmDriver, Duration, Instant};
use crate::types::{CoreId, Message};

/// Slots in the default scheduler table
pub const SCHED_SLOTS: usize = 16;

/// A slot whose deadline passed this long ago without being cleared is
/// considered leaked (missed or duplicated alarm) and may be reclaimed.
const STALE_SLOT_GRACE_MS: u64 = 5_000;

/// Fixed cost of the alarm subsystem firing and handing off, subtracted
/// from every armed delay.
const ALARM_OVERHEAD_MS: u64 = 1;

/// Names one scheduled message; generation-checked like a pool handle
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct TimerHandle {
    index: u8,
    generation: u16,
}

impl TimerHandle {
    pub const fn index(&self) -> usize {
        self.index as usize
    }
}

struct Slot {
    in_use: bool,
    generation: u16,
    core: CoreId,
    msg: Option<Message>,
    deadline: Instant,
    created_at: Instant,
}

impl Slot {
    fn empty() -> Self {
        Self {
            in_use: false,
            generation: 0,
            core: CoreId::Core0,
            msg: None,
            deadline: Instant::from_millis(0),
            created_at: Instant::from_millis(0),
        }
    }
}

pub struct TimerScheduler<const N: usize = SCHED_SLOTS> {
    slots: Mutex<RefCell<[Slot; N]>>,
}

impl<const N: usize> TimerScheduler<N> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(RefCell::new(core::array::from_fn(|_| Slot::empty()))),
        }
    }

    /// Schedule `msg` for delivery to `core` after `delay`.
    ///
    /// Returns `None` when the message was instead delivered immediately
    /// (slot exhaustion or alarm failure); already-delivered is not an
    /// error, just a loss of timing precision.
    pub fn schedule_in<A: AlarmDriver, const B: usize>(
        &self,
        alarm: &mut A,
        bus: &MessageBus<B>,
        core: CoreId,
        msg: Message,
        delay: Duration,
        now: Instant,
    ) -> Option<TimerHandle> {
        let reserved = critical_section::with(|cs| {
            let mut slots = self.slots.borrow_ref_mut(cs);
            let idx = Self::find_free(&mut slots, now)?;
            let slot = &mut slots[idx];
            slot.in_use = true;
            slot.generation = slot.generation.wrapping_add(1);
            slot.core = core;
            slot.msg = Some(msg.clone());
            slot.deadline = now + delay;
            slot.created_at = now;
            Some(TimerHandle {
                index: idx as u8,
                generation: slot.generation,
            })
        });

        let handle = match reserved {
            Some(h) => h,
            None => {
                #[cfg(feature = "defmt")]
                defmt::warn!("scheduler slots exhausted, delivering msg {} now", msg.id());
                bus.post(core, msg, now);
                return None;
            }
        };

        let armed_delay =
            Duration::from_millis(delay.as_millis().saturating_sub(ALARM_OVERHEAD_MS));
        if alarm.arm(handle.index(), armed_delay).is_err() {
            critical_section::with(|cs| {
                let mut slots = self.slots.borrow_ref_mut(cs);
                let slot = &mut slots[handle.index()];
                slot.in_use = false;
                slot.msg = None;
            });
            #[cfg(feature = "defmt")]
            defmt::warn!("alarm arm failed, delivering msg {} now", msg.id());
            bus.post(core, msg, now);
            return None;
        }
        Some(handle)
    }

    /// Cancel a scheduled message. Cancelling after the deadline has fired
    /// is a benign no-op; the message may already have been delivered.
    pub fn cancel<A: AlarmDriver>(&self, alarm: &mut A, handle: TimerHandle) {
        let live = critical_section::with(|cs| {
            let mut slots = self.slots.borrow_ref_mut(cs);
            let slot = &mut slots[handle.index()];
            if !slot.in_use || slot.generation != handle.generation {
                return false;
            }
            slot.in_use = false;
            slot.msg = None;
            true
        });
        if live {
            alarm.cancel(handle.index()).ok();
        }
    }

    /// Alarm callback entry point (interrupt context).
    ///
    /// Clears the slot, then posts its message (if still valid) to the
    /// owning core with the blocking bus send.
    pub fn fire<const B: usize>(&self, slot_index: usize, bus: &MessageBus<B>, now: Instant) {
        let fired = critical_section::with(|cs| {
            let mut slots = self.slots.borrow_ref_mut(cs);
            let slot = match slots.get_mut(slot_index) {
                Some(s) => s,
                None => return None,
            };
            if !slot.in_use {
                return None;
            }
            slot.in_use = false;
            slot.msg.take().map(|m| (slot.core, m))
        });
        if let Some((core, msg)) = fired {
            bus.post(core, msg, now);
        }
    }

    /// Linear scan for an already-scheduled duplicate of `msg`
    pub fn find_scheduled(&self, msg: &Message) -> Option<TimerHandle> {
        critical_section::with(|cs| {
            let slots = self.slots.borrow_ref_mut(cs);
            slots.iter().enumerate().find_map(|(i, s)| {
                if s.in_use && s.msg.as_ref() == Some(msg) {
                    Some(TimerHandle {
                        index: i as u8,
                        generation: s.generation,
                    })
                } else {
                    None
                }
            })
        })
    }

    /// Count of occupied slots
    pub fn pending(&self) -> usize {
        critical_section::with(|cs| {
            self.slots
                .borrow_ref_mut(cs)
                .iter()
                .filter(|s| s.in_use)
                .count()
        })
    }

    fn find_free(slots: &mut [Slot; N], now: Instant) -> Option<usize> {
        if let Some(i) = slots.iter().position(|s| !s.in_use) {
            return Some(i);
        }
        // Pool full: reclaim a slot whose alarm apparently never cleared it
        slots.iter().position(|s| {
            now.as_millis() > s.deadline.as_millis() + STALE_SLOT_GRACE_MS
        })
    }
}

impl<const N: usize> Default for TimerScheduler<N> {
    fn default() -> Self {
        Self::new()
    }
}
