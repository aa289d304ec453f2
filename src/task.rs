//! # Task Control Block
//!
//! Defines the task model for PendOS. A task is an independently stacked
//! thread of execution with a priority, a time-slice budget and a delay
//! budget. At any instant it is a member of exactly one structure: the
//! ready structure while READY or RUNNING, or a single wait queue while
//! PENDING.

use core::fmt;

use heapless::String;

use crate::config::{DEFAULT_TIME_SLICE, NAME_MAX_LEN};
use crate::error::KernelResult;
use crate::ipc::EventFlags;
use crate::stack::StackRegion;
use crate::wait::WaitTarget;

/// Task priority. Lower numeric value means higher urgency.
pub type Priority = u8;

/// Task entry point. Receives the argument given at creation and never
/// returns; tasks run forever by convention.
pub type TaskEntry = fn(usize) -> !;

/// Handle of a task in the kernel's task arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TaskId(pub(crate) usize);

impl TaskId {
    /// Index of this task in the task arena.
    pub const fn index(self) -> usize {
        self.0
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for TaskId {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "T{=usize:03}", self.0);
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "T{:03}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Execution state of a task.
///
/// ```text
///   ┌──────────┐    pick_next()     ┌─────────┐
///   │  Ready   │ ─────────────────► │ Running │
///   └──────────┘ ◄───────────────── └─────────┘
///        ▲        preempt / slice        │
///        │                               │ delay / take / wait / recv
///        │         ┌──────────┐          │
///        └──────── │ Pending  │ ◄────────┘
///      signal or   └──────────┘
///       timeout
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskState {
    /// Runnable, waiting in its priority bucket.
    Ready,
    /// Selected to hold the CPU.
    Running,
    /// Blocked in a wait queue (delay or a synchronization object).
    Pending,
}

// ---------------------------------------------------------------------------
// Task configuration (immutable after creation)
// ---------------------------------------------------------------------------

/// Static configuration for a task, set at creation time.
#[derive(Debug, Clone, Copy)]
pub struct TaskConfig {
    /// Base priority. Lower value = more urgent. Range: 0–255.
    pub priority: Priority,

    /// Time slice in ticks. If 0, uses `DEFAULT_TIME_SLICE`.
    pub time_slice: u32,
}

impl TaskConfig {
    /// Returns the effective time slice, falling back to the system default.
    #[inline]
    pub const fn effective_time_slice(&self) -> u32 {
        if self.time_slice > 0 {
            self.time_slice
        } else {
            DEFAULT_TIME_SLICE
        }
    }
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Task Control Block (TCB): the kernel's record of one task.
///
/// TCBs live in the scheduler's task arena and are addressed by [`TaskId`].
/// The kernel never frees a TCB.
pub struct TaskControlBlock {
    /// Index in the task arena.
    pub id: TaskId,

    /// Human-readable name, truncated to `NAME_MAX_LEN` bytes.
    pub name: String<NAME_MAX_LEN>,

    /// Saved stack pointer (PSP). Updated on every context switch.
    pub stack_pointer: *mut u32,

    /// Entry point and its argument.
    pub entry: TaskEntry,
    pub arg: usize,

    /// Current execution state.
    pub state: TaskState,

    /// Stack memory backing this task.
    pub stack: StackRegion,

    /// Time slice budget and ticks left in the current slice.
    pub time_slice: u32,
    pub slice_left: u32,

    /// Delay budget and ticks left while delayed.
    pub delay: u32,
    pub delay_left: u32,

    /// Effective priority. Raised temporarily by priority inheritance.
    pub priority: Priority,

    /// Priority the task was created with.
    pub base_priority: Priority,

    /// Outcome recorded by whoever resumed the task from a wait.
    pub pend_result: KernelResult<()>,

    /// The wait queue holding this task while it is PENDING.
    pub blocked_on: Option<WaitTarget>,

    /// Whether the embedded timeout is armed in the timer list.
    pub timeout_armed: bool,

    /// Event bits this task is interested in, and how to combine them.
    pub interest: u32,
    pub event_flags: EventFlags,
}

// Safety: the raw stack pointer only ever points into the task's own
// stack region, and TCBs are only touched inside kernel critical sections.
unsafe impl Send for TaskControlBlock {}
unsafe impl Sync for TaskControlBlock {}

impl TaskControlBlock {
    /// Build a READY task record.
    pub fn new(
        id: TaskId,
        name: &str,
        entry: TaskEntry,
        arg: usize,
        config: TaskConfig,
        stack: StackRegion,
        stack_pointer: *mut u32,
    ) -> Self {
        let slice = config.effective_time_slice();
        Self {
            id,
            name: truncated_name(name),
            stack_pointer,
            entry,
            arg,
            state: TaskState::Ready,
            stack,
            time_slice: slice,
            slice_left: slice,
            delay: 0,
            delay_left: 0,
            priority: config.priority,
            base_priority: config.priority,
            pend_result: Ok(()),
            blocked_on: None,
            timeout_armed: false,
            interest: 0,
            event_flags: EventFlags::empty(),
        }
    }

    /// Check if this task may be picked by the scheduler.
    #[inline]
    pub fn is_runnable(&self) -> bool {
        self.state != TaskState::Pending
    }

    /// Snapshot of this task for diagnostics.
    pub fn info(&self) -> TaskInfo {
        TaskInfo {
            id: self.id,
            name: self.name.clone(),
            state: self.state,
            priority: self.priority,
            base_priority: self.base_priority,
            stack_base: self.stack.base() as usize,
            stack_size: self.stack.size(),
            stack_pointer: self.stack_pointer as usize,
            time_slice: self.time_slice,
        }
    }
}

/// Copy `name` into a fixed-capacity string, cutting at a char boundary.
pub(crate) fn truncated_name(name: &str) -> String<NAME_MAX_LEN> {
    let mut out = String::new();
    for ch in name.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}

/// Diagnostic snapshot of a task.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub id: TaskId,
    pub name: String<NAME_MAX_LEN>,
    pub state: TaskState,
    pub priority: Priority,
    pub base_priority: Priority,
    pub stack_base: usize,
    pub stack_size: usize,
    pub stack_pointer: usize,
    pub time_slice: u32,
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
