//! # PendOS — Preemptive Priority RTOS Kernel
//!
//! A preemptive, priority-based real-time kernel for ARM Cortex-M4
//! microcontrollers, built around a pend/ready queue discipline.
//!
//! ## Overview
//!
//! PendOS multiplexes one CPU across independently stacked tasks. The most
//! urgent runnable task always holds the CPU; peers of equal priority share
//! it in time slices. Tasks block on semaphores, priority-inheriting
//! mutexes, event flags and message queues, optionally with a timeout, and
//! every wait is served in priority order.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    Application Tasks                    │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                  │
//! │   create_task · start · delay · take · wait · recv ... │
//! ├──────────────┬────────────────────┬───────────────────┤
//! │  Scheduler   │   IPC              │  Kernel Access    │
//! │  scheduler.rs│   ipc/*.rs         │  sync.rs          │
//! │  ─ tick()    │   ─ semaphore      │  ─ with_kernel()  │
//! │  ─ schedule()│   ─ mutex (PI)     │                   │
//! │  ─ pend()    │   ─ event, queue   │                   │
//! ├──────────────┴────────────────────┴───────────────────┤
//! │  Ready buckets (ready.rs) · Wait queues (wait.rs)      │
//! │  Timer list (timer.rs) · Soft timers (soft_timer.rs)   │
//! │  Task model (task.rs) · Stacks (stack.rs)              │
//! ├────────────────────────────────────────────────────────┤
//! │            Arch Port (arch/cortex_m4.rs)                │
//! │    PendSV · SysTick · First task launch                │
//! ├────────────────────────────────────────────────────────┤
//! │         ARM Cortex-M4 Hardware (Thumb-2)                │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Scheduling Model
//!
//! - **Priorities**: `0` is the most urgent, `255` is reserved for idle
//! - **Ready structure**: one FIFO bucket per priority value in use
//! - **Time slicing**: a task that spends its slice rotates to the tail of
//!   its bucket
//! - **Deferred switching**: the kernel raises a switch request; PendSV
//!   performs it once no other handler is active
//!
//! ## Memory Model
//!
//! - **No heap**: all state is statically allocated in fixed-capacity
//!   `heapless` collections
//! - **Handles, not pointers**: tasks and kernel objects live in arenas and
//!   are referenced by copyable ids
//! - **One kernel instance** behind a `critical_section::Mutex`
//!
//! ## Features
//!
//! - `defmt`: structured logging of task creation, switches, waits and
//!   failures.

#![no_std]

#[macro_use]
mod fmt;

pub mod arch;
pub mod config;
pub mod error;
pub mod ipc;
pub mod kernel;
pub mod ready;
pub mod scheduler;
pub mod soft_timer;
pub mod stack;
pub mod sync;
pub mod task;
pub mod timer;
pub mod wait;

pub use error::{KernelError, KernelResult};
pub use ipc::{EventFlags, EventId, MutexId, QueueId, SemaphoreId, Urgency, Wait};
pub use scheduler::Scheduler;
pub use soft_timer::TimerId;
pub use stack::{Stack, StackRegion};
pub use task::{Priority, TaskConfig, TaskEntry, TaskId, TaskInfo, TaskState};
pub use timer::{Timeout, TimerCallback, TimerMode};

#[cfg(feature = "defmt")]
defmt::timestamp!("{=u32}", kernel::ticks());
