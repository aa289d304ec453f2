//! Counting semaphore.
//!
//! `release` with a waiter present hands the unit straight to the most
//! urgent waiter; the count only grows when nobody is waiting.

use crate::error::{KernelError, KernelResult};
use crate::ipc::{SemaphoreId, Wait};
use crate::scheduler::Scheduler;
use crate::timer::Timeout;
use crate::wait::{WaitQueue, WaitTarget};

#[derive(Debug)]
pub struct Semaphore {
    pub(crate) count: u32,
    pub(crate) waiters: WaitQueue,
}

impl Semaphore {
    pub const fn new(count: u32) -> Self {
        Self {
            count,
            waiters: WaitQueue::new(),
        }
    }
}

impl Scheduler {
    pub fn semaphore_create(&mut self, count: u32) -> KernelResult<SemaphoreId> {
        let id = SemaphoreId(self.semaphores.len());
        self.semaphores
            .push(Semaphore::new(count))
            .map_err(|_| KernelError::Fail)?;
        Ok(id)
    }

    fn semaphore(&mut self, id: SemaphoreId) -> KernelResult<&mut Semaphore> {
        self.semaphores.get_mut(id.0).ok_or(KernelError::Fail)
    }

    /// Take one unit, blocking for up to `timeout` if none is available.
    pub fn semaphore_take(&mut self, id: SemaphoreId, timeout: Timeout) -> KernelResult<Wait> {
        let sem = self.semaphore(id)?;
        if sem.count > 0 {
            sem.count -= 1;
            return Ok(Wait::Complete(()));
        }
        self.block_current(WaitTarget::Semaphore(id), timeout)?;
        Ok(Wait::Blocked)
    }

    /// Give one unit back, waking the most urgent waiter if there is one.
    pub fn semaphore_release(&mut self, id: SemaphoreId) -> KernelResult<()> {
        let sem = self.semaphore(id)?;
        match sem.waiters.head() {
            Some(waiter) => {
                self.wake(waiter, Ok(()));
                self.schedule();
            }
            None => sem.count = sem.count.saturating_add(1),
        }
        Ok(())
    }

    pub fn semaphore_count(&self, id: SemaphoreId) -> KernelResult<u32> {
        self.semaphores.get(id.0).map(|s| s.count).ok_or(KernelError::Fail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::tests::{kernel, spawn, switch};
    use crate::task::TaskState;

    #[test]
    fn test_take_and_release_without_waiters() {
        let mut k = kernel();
        spawn(&mut k, "a", 3, 0);
        k.start().unwrap();
        let sem = k.semaphore_create(2).unwrap();

        assert_eq!(k.semaphore_take(sem, Timeout::NoWait), Ok(Wait::Complete(())));
        assert_eq!(k.semaphore_take(sem, Timeout::Forever), Ok(Wait::Complete(())));
        assert_eq!(k.semaphore_count(sem), Ok(0));
        assert_eq!(k.semaphore_take(sem, Timeout::NoWait), Err(KernelError::Timeout));
        assert_eq!(k.semaphore_take(sem, Timeout::Ticks(0)), Err(KernelError::Timeout));

        k.semaphore_release(sem).unwrap();
        k.semaphore_release(sem).unwrap();
        k.semaphore_release(sem).unwrap();
        assert_eq!(k.semaphore_count(sem), Ok(3));
    }

    #[test]
    fn test_release_hands_unit_to_waiter() {
        let mut k = kernel();
        let a = spawn(&mut k, "a", 2, 0);
        let b = spawn(&mut k, "b", 5, 0);
        k.start().unwrap();
        let sem = k.semaphore_create(0).unwrap();

        assert_eq!(k.semaphore_take(sem, Timeout::Forever), Ok(Wait::Blocked));
        assert_eq!(k.task(a).unwrap().state, TaskState::Pending);
        switch(&mut k);
        assert_eq!(k.current_task(), Some(b));

        k.semaphore_release(sem).unwrap();
        switch(&mut k);
        assert_eq!(k.current_task(), Some(a));
        assert_eq!(k.wait_result(), Ok(()));
        // Count untouched, the unit went to the waiter
        assert_eq!(k.semaphore_count(sem), Ok(0));
    }

    #[test]
    fn test_bounded_take_times_out() {
        let mut k = kernel();
        let a = spawn(&mut k, "a", 2, 0);
        k.start().unwrap();
        let sem = k.semaphore_create(0).unwrap();

        assert!(k.semaphore_take(sem, Timeout::Ticks(3)).unwrap().is_blocked());
        switch(&mut k);
        k.tick();
        k.tick();
        assert_eq!(k.task(a).unwrap().state, TaskState::Pending);
        k.tick();
        switch(&mut k);
        assert_eq!(k.current_task(), Some(a));
        assert_eq!(k.wait_result(), Err(KernelError::Timeout));
        assert!(k.semaphores[sem.0].waiters.is_empty());
    }

    #[test]
    fn test_waiters_served_by_priority() {
        let mut k = kernel();
        let low = spawn(&mut k, "low", 6, 0);
        let high = spawn(&mut k, "high", 4, 0);
        let signaller = spawn(&mut k, "sig", 8, 0);
        k.start().unwrap();
        let sem = k.semaphore_create(0).unwrap();

        // high blocks first, then low
        let _ = k.semaphore_take(sem, Timeout::Forever).unwrap();
        switch(&mut k);
        assert_eq!(k.current_task(), Some(low));
        let _ = k.semaphore_take(sem, Timeout::Forever).unwrap();
        switch(&mut k);
        assert_eq!(k.current_task(), Some(signaller));

        k.semaphore_release(sem).unwrap();
        switch(&mut k);
        assert_eq!(k.current_task(), Some(high));
        assert_eq!(k.task(low).unwrap().state, TaskState::Pending);
    }

    #[test]
    fn test_unknown_handle_fails() {
        let mut k = kernel();
        assert_eq!(k.semaphore_release(SemaphoreId(3)), Err(KernelError::Fail));
        assert_eq!(k.semaphore_count(SemaphoreId(0)), Err(KernelError::Fail));
    }
}
