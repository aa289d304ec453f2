//! Event flags.
//!
//! An event is a 32-bit set of raised bits. Each task declares the bits it
//! cares about with `event_add`/`event_del`, then waits for all of them
//! (`AND`) or any of them (`OR`). A single `event_send` wakes every waiter
//! whose condition it satisfies.

use heapless::Vec;

use crate::config::MAX_TASKS;
use crate::error::{KernelError, KernelResult};
use crate::ipc::{EventFlags, EventId, Wait};
use crate::scheduler::Scheduler;
use crate::task::TaskId;
use crate::timer::Timeout;
use crate::wait::{WaitQueue, WaitTarget};

#[derive(Debug)]
pub struct Event {
    pub(crate) bits: u32,
    pub(crate) waiters: WaitQueue,
}

impl Event {
    pub const fn new() -> Self {
        Self {
            bits: 0,
            waiters: WaitQueue::new(),
        }
    }
}

impl Default for Event {
    fn default() -> Self {
        Event::new()
    }
}

/// Whether `bits` satisfy `interest` under the combination in `flags`.
fn satisfied(bits: u32, interest: u32, flags: EventFlags) -> bool {
    if flags.contains(EventFlags::AND) {
        bits & interest == interest
    } else {
        bits & interest != 0
    }
}

impl Scheduler {
    pub fn event_create(&mut self) -> KernelResult<EventId> {
        let id = EventId(self.events.len());
        self.events.push(Event::new()).map_err(|_| KernelError::Fail)?;
        Ok(id)
    }

    /// Add `mask` to the calling task's interest bits.
    pub fn event_add(&mut self, mask: u32) -> KernelResult<()> {
        let me = self.caller()?;
        self.tcb_mut(me).interest |= mask;
        Ok(())
    }

    /// Remove `mask` from the calling task's interest bits.
    pub fn event_del(&mut self, mask: u32) -> KernelResult<()> {
        let me = self.caller()?;
        self.tcb_mut(me).interest &= !mask;
        Ok(())
    }

    /// Wait until the event satisfies the caller's interest under `flags`.
    ///
    /// `flags` must contain exactly one of `AND`/`OR`, optionally with
    /// `CLEAR`, and the caller must have declared interest bits.
    pub fn event_wait(&mut self, id: EventId, flags: EventFlags, timeout: Timeout) -> KernelResult<Wait> {
        let me = self.caller()?;
        let interest = self.tasks[me.0].interest;
        let mode = flags & (EventFlags::AND | EventFlags::OR);
        if mode != EventFlags::AND && mode != EventFlags::OR {
            warn!("{} waits on {} with flags {}", me, id, flags);
            return Err(KernelError::Fail);
        }
        if interest == 0 {
            return Err(KernelError::Fail);
        }

        let event = self.events.get_mut(id.0).ok_or(KernelError::Fail)?;
        if satisfied(event.bits, interest, flags) {
            if flags.contains(EventFlags::CLEAR) {
                event.bits &= !interest;
            }
            return Ok(Wait::Complete(()));
        }

        self.tcb_mut(me).event_flags = flags;
        self.block_current(WaitTarget::Event(id), timeout)?;
        Ok(Wait::Blocked)
    }

    /// Raise `mask` and wake every waiter it satisfies.
    pub fn event_send(&mut self, id: EventId, mask: u32) -> KernelResult<()> {
        let event = self.events.get_mut(id.0).ok_or(KernelError::Fail)?;
        event.bits |= mask;
        let bits = event.bits;

        let mut woken: Vec<TaskId, MAX_TASKS> = Vec::new();
        let mut clear = 0u32;
        for task in event.waiters.iter() {
            let tcb = &self.tasks[task.0];
            if satisfied(bits, tcb.interest, tcb.event_flags) {
                if tcb.event_flags.contains(EventFlags::CLEAR) {
                    clear |= tcb.interest;
                }
                // Bounded by the wait queue, which holds at most MAX_TASKS.
                let _ = woken.push(task);
            }
        }
        if woken.is_empty() {
            return Ok(());
        }

        for task in woken {
            self.wake(task, Ok(()));
        }
        self.events[id.0].bits &= !clear;
        self.schedule();
        Ok(())
    }

    pub fn event_bits(&self, id: EventId) -> KernelResult<u32> {
        self.events.get(id.0).map(|e| e.bits).ok_or(KernelError::Fail)
    }
}
