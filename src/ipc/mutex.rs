//! Recursive mutex with priority inheritance.
//!
//! A mutex is a binary semaphore plus an owner, the owner's priority before
//! any inheritance, and a recursion depth. When a more urgent task blocks on
//! an owned mutex, the owner temporarily runs at the waiter's priority until
//! it releases.

use crate::config::IDLE_PRIORITY;
use crate::error::{KernelError, KernelResult};
use crate::ipc::{MutexId, Semaphore, Wait};
use crate::scheduler::Scheduler;
use crate::task::{Priority, TaskId};
use crate::timer::Timeout;
use crate::wait::WaitTarget;

#[derive(Debug)]
pub struct Mutex {
    pub(crate) sem: Semaphore,
    pub(crate) owner: Option<TaskId>,
    /// Owner's priority when it acquired the mutex. Reset to the idle
    /// priority while free.
    pub(crate) origin_priority: Priority,
    pub(crate) recursion: u32,
}

impl Mutex {
    pub const fn new() -> Self {
        Self {
            sem: Semaphore::new(1),
            owner: None,
            origin_priority: IDLE_PRIORITY,
            recursion: 0,
        }
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Mutex::new()
    }
}

impl Scheduler {
    pub fn mutex_create(&mut self) -> KernelResult<MutexId> {
        let id = MutexId(self.mutexes.len());
        self.mutexes.push(Mutex::new()).map_err(|_| KernelError::Fail)?;
        Ok(id)
    }

    fn mutex(&mut self, id: MutexId) -> KernelResult<&mut Mutex> {
        self.mutexes.get_mut(id.0).ok_or(KernelError::Fail)
    }

    /// Acquire the mutex, or nest one level deeper if the caller owns it.
    pub fn mutex_take(&mut self, id: MutexId, timeout: Timeout) -> KernelResult<Wait> {
        let me = self.caller()?;
        let priority = self.tasks[me.0].priority;
        let mtx = self.mutex(id)?;

        if mtx.sem.count > 0 {
            mtx.sem.count -= 1;
            mtx.owner = Some(me);
            mtx.origin_priority = priority;
            mtx.recursion = 1;
            trace!("{} acquired {}", me, id);
            return Ok(Wait::Complete(()));
        }
        if mtx.owner == Some(me) {
            mtx.recursion += 1;
            return Ok(Wait::Complete(()));
        }
        let owner = mtx.owner;

        self.pend_current(WaitTarget::Mutex(id), timeout)?;
        if let Some(owner) = owner {
            self.inherit_priority(id, owner);
        }
        self.schedule();
        Ok(Wait::Blocked)
    }

    /// Raise `owner` to the priority of the most urgent waiter on `id`.
    fn inherit_priority(&mut self, id: MutexId, owner: TaskId) {
        let head = self.mutexes[id.0].sem.waiters.head();
        let Some(head) = head else {
            return;
        };
        let boosted = self.tasks[head.0].priority;
        if self.tasks[owner.0].priority > boosted {
            debug!("{} inherits priority {=u8} via {}", owner, boosted, id);
            self.set_priority(owner, boosted);
        }
    }

    /// A waiter gave up on `id`: drop the owner's inherited priority to what
    /// the remaining waiters still justify.
    pub(crate) fn mutex_waiter_left(&mut self, id: MutexId) {
        let Some(mtx) = self.mutexes.get(id.0) else {
            return;
        };
        let Some(owner) = mtx.owner else {
            return;
        };
        let mut priority = mtx.origin_priority;
        if let Some(head) = mtx.sem.waiters.head() {
            priority = priority.min(self.tasks[head.0].priority);
        }
        if self.tasks[owner.0].priority != priority {
            debug!("{} falls back to priority {=u8} via {}", owner, priority, id);
            self.set_priority(owner, priority);
        }
    }

    /// Release one level of ownership. Ownership changes hands only when
    /// the outermost level is released.
    pub fn mutex_release(&mut self, id: MutexId) -> KernelResult<()> {
        let me = self.caller()?;
        let mtx = self.mutex(id)?;
        if mtx.owner != Some(me) {
            warn!("{} released {} without owning it", me, id);
            return Err(KernelError::Fail);
        }

        mtx.recursion -= 1;
        if mtx.recursion > 0 {
            return Ok(());
        }

        let origin = mtx.origin_priority;
        match mtx.sem.waiters.head() {
            Some(next) => {
                self.wake(next, Ok(()));
                if self.tasks[me.0].priority != origin {
                    self.set_priority(me, origin);
                }
                let next_priority = self.tasks[next.0].priority;
                let mtx = &mut self.mutexes[id.0];
                mtx.owner = Some(next);
                mtx.origin_priority = next_priority;
                mtx.recursion = 1;
                trace!("{} handed {} to {}", me, id, next);
                self.schedule();
            }
            None => {
                mtx.sem.count += 1;
                mtx.owner = None;
                mtx.origin_priority = IDLE_PRIORITY;
                if self.tasks[me.0].priority != origin {
                    self.set_priority(me, origin);
                    self.schedule();
                }
            }
        }
        Ok(())
    }

    pub fn mutex_owner(&self, id: MutexId) -> KernelResult<Option<TaskId>> {
        self.mutexes.get(id.0).map(|m| m.owner).ok_or(KernelError::Fail)
    }

    pub fn mutex_recursion(&self, id: MutexId) -> KernelResult<u32> {
        self.mutexes.get(id.0).map(|m| m.recursion).ok_or(KernelError::Fail)
    }
}
