//! # Inter-Task Communication
//!
//! Blocking synchronization primitives built on the shared pend/resume
//! discipline of the [`Scheduler`](crate::scheduler::Scheduler):
//!
//! | Primitive        | Module        | Wakes on signal          |
//! |------------------|---------------|--------------------------|
//! | Semaphore        | `semaphore`   | most urgent waiter       |
//! | Mutex (PI)       | `mutex`       | most urgent waiter       |
//! | Event flags      | `event`       | every satisfied waiter   |
//! | Message queue    | `queue`       | most urgent receiver     |
//!
//! Each primitive is an object in one of the scheduler's arenas, addressed
//! by a copyable handle. Operations that may block return [`Wait`]: either
//! the call completed on the spot, or the caller was pended and a context
//! switch was requested.

pub mod event;
pub mod mutex;
pub mod pool;
pub mod queue;
pub mod semaphore;

pub use event::Event;
pub use mutex::Mutex;
pub use queue::{Message, MessageQueue};
pub use semaphore::Semaphore;

bitflags::bitflags! {
    /// How an event wait combines the task's interest bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EventFlags: u32 {
        /// Every interest bit must be raised.
        const AND = 0x01;
        /// Any interest bit suffices.
        const OR = 0x02;
        /// Clear the satisfied bits from the event on success.
        const CLEAR = 0x04;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for EventFlags {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "EventFlags({=u32:#x})", self.bits());
    }
}

/// Where a message enters the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Urgency {
    /// Append at the tail.
    #[default]
    Normal,
    /// Insert at the head, ahead of everything queued.
    Urgent,
}

/// Outcome of a kernel call that may block the caller.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Wait<T = ()> {
    /// The call finished without blocking.
    Complete(T),
    /// The caller is PENDING and a switch was requested. The wait's outcome
    /// is available from `wait_result()` once the task runs again.
    Blocked,
}

impl<T> Wait<T> {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Wait::Blocked)
    }

    /// The completed value, if the call did not block.
    pub fn complete(self) -> Option<T> {
        match self {
            Wait::Complete(value) => Some(value),
            Wait::Blocked => None,
        }
    }
}

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        pub struct $name(pub(crate) usize);

        impl $name {
            pub const fn index(self) -> usize {
                self.0
            }
        }
    };
}

handle!(
    /// Handle of a counting semaphore.
    SemaphoreId
);
handle!(
    /// Handle of a priority-inheriting mutex.
    MutexId
);
handle!(
    /// Handle of an event-flag group.
    EventId
);
handle!(
    /// Handle of a message queue.
    QueueId
);
