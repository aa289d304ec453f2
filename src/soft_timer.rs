//! Software timers.
//!
//! User timers share the kernel timer list with task timeouts. Their
//! callbacks run from the tick with the kernel borrowed, so they may signal
//! primitives but never block.

use heapless::String;

use crate::config::NAME_MAX_LEN;
use crate::error::{KernelError, KernelResult};
use crate::scheduler::{Scheduler, TimerKey};
use crate::task::truncated_name;
use crate::timer::{TimerCallback, TimerMode};

/// Handle of a software timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerId(pub(crate) usize);

pub struct SoftTimer {
    pub name: String<NAME_MAX_LEN>,
    callback: &'static dyn TimerCallback,
    /// Duration in ticks, re-armed on every start and repeat.
    pub duration: u32,
    pub mode: TimerMode,
    pub active: bool,
}

impl Scheduler {
    /// Register a stopped timer. A zero duration is rejected.
    pub fn timer_create(
        &mut self,
        name: &str,
        callback: &'static dyn TimerCallback,
        duration: u32,
        mode: TimerMode,
    ) -> KernelResult<TimerId> {
        if duration == 0 {
            return Err(KernelError::Fail);
        }
        let id = TimerId(self.soft_timers.len());
        let timer = SoftTimer {
            name: truncated_name(name),
            callback,
            duration,
            mode,
            active: false,
        };
        self.soft_timers.push(timer).map_err(|_| KernelError::Fail)?;
        Ok(id)
    }

    /// Arm the timer for its full duration, restarting it if running.
    pub fn timer_start(&mut self, id: TimerId) -> KernelResult<()> {
        let timer = self.soft_timers.get_mut(id.0).ok_or(KernelError::Fail)?;
        timer.active = true;
        let duration = timer.duration;
        self.timers.remove(TimerKey::Soft(id));
        if self.timers.insert(TimerKey::Soft(id), duration).is_err() {
            unreachable!("timer list holds every software timer");
        }
        Ok(())
    }

    pub fn timer_stop(&mut self, id: TimerId) -> KernelResult<()> {
        let timer = self.soft_timers.get_mut(id.0).ok_or(KernelError::Fail)?;
        timer.active = false;
        self.timers.remove(TimerKey::Soft(id));
        Ok(())
    }

    /// Ticks until the timer fires, if it is running.
    pub fn timer_remaining(&self, id: TimerId) -> Option<u32> {
        self.timers.remaining(TimerKey::Soft(id))
    }

    /// Run an expired timer's callback and re-arm it if it repeats.
    pub(crate) fn fire_soft_timer(&mut self, id: TimerId) {
        let Some(timer) = self.soft_timers.get(id.0) else {
            return;
        };
        if !timer.active {
            return;
        }
        let callback = timer.callback;
        trace!("timer {=str} fired", timer.name.as_str());
        if timer.mode == TimerMode::OneShot {
            self.soft_timers[id.0].active = false;
        }

        callback.on_expiry(self);

        // The callback may have stopped or restarted the timer.
        let timer = &self.soft_timers[id.0];
        if timer.mode == TimerMode::Repeat && timer.active && !self.timers.contains(TimerKey::Soft(id)) {
            let duration = timer.duration;
            let _ = self.timers.insert(TimerKey::Soft(id), duration);
        }
    }
}
