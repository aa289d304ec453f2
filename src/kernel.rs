//! # Kernel
//!
//! Task-facing API of PendOS. Every call enters the kernel through
//! [`sync::with_kernel`], so it is safe from any task; the signalling calls
//! (`*_release`, `*_send`, timer control) are also safe from interrupt
//! handlers.
//!
//! Blocking calls run in two steps: the kernel either completes the call on
//! the spot or pends the caller and requests a switch. In the second case
//! PendSV switches away as soon as the critical section ends, and the call
//! resumes here only when the task is scheduled again, to read how its wait
//! ended.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::create_task*()  ← register tasks (×N)
//!         ├─► kernel::*_create()      ← semaphores, mutexes, queues, ...
//!         └─► kernel::start()         ← launch scheduler (no return)
//!               ├─► create the idle task
//!               ├─► configure SysTick and handler priorities
//!               └─► start the first task via arch::start_first_task()
//! ```

use core::sync::atomic::{AtomicU32, Ordering};

use crate::arch;
use crate::config::{MIN_STACK_SIZE, STACK_ARENA_SIZE};
use crate::error::{KernelError, KernelResult};
use crate::ipc::{EventFlags, EventId, MutexId, QueueId, SemaphoreId, Urgency, Wait};
use crate::scheduler::Scheduler;
use crate::soft_timer::TimerId;
use crate::stack::{init_frame, Stack, StackArena, StackRegion};
use crate::sync;
use crate::task::{Priority, TaskConfig, TaskEntry, TaskId, TaskInfo};
use crate::timer::{Timeout, TimerCallback, TimerMode};

/// Copy of the scheduler's tick count, refreshed on every tick. Readable
/// without entering the kernel, so the defmt timestamp can use it while the
/// kernel is borrowed.
static TICKS: AtomicU32 = AtomicU32::new(0);

/// Memory for tasks created with a stack size instead of a stack.
static STACK_ARENA: StackArena<STACK_ARENA_SIZE> = StackArena::new();

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Create a task running on a statically allocated stack.
///
/// # Example
/// ```ignore
/// static SENSOR_STACK: Stack<1024> = Stack::new();
///
/// kernel::create_task_static("sensor", sensor_task, 0, 3, &SENSOR_STACK, 10)?;
/// ```
pub fn create_task_static<const N: usize>(
    name: &str,
    entry: TaskEntry,
    arg: usize,
    priority: Priority,
    stack: &'static Stack<N>,
    time_slice: u32,
) -> KernelResult<TaskId> {
    spawn(name, entry, arg, TaskConfig { priority, time_slice }, stack.region())
}

/// Create a task whose stack of `stack_size` bytes is carved from the
/// kernel's stack arena.
///
/// The arena is only touched once the task table is known to have room, so
/// a failed creation never consumes stack memory.
///
/// # Returns
/// - `Ok(task_id)`
/// - `Err(Fail)` if the stack is too small, the task table is full or the
///   arena is exhausted
pub fn create_task(
    name: &str,
    entry: TaskEntry,
    arg: usize,
    priority: Priority,
    stack_size: usize,
    time_slice: u32,
) -> KernelResult<TaskId> {
    if stack_size < MIN_STACK_SIZE {
        return Err(KernelError::Fail);
    }
    sync::with_kernel(|k| {
        if k.tasks.is_full() {
            warn!("task table full, cannot create {=str}", name);
            return Err(KernelError::Fail);
        }
        let Some(region) = STACK_ARENA.carve(stack_size) else {
            warn!("stack arena exhausted, {=usize} bytes requested", stack_size);
            return Err(KernelError::Fail);
        };
        let sp = init_frame(&region, entry, arg).ok_or(KernelError::Fail)?;
        k.create_task(name, entry, arg, TaskConfig { priority, time_slice }, region, sp)
    })
}

fn spawn(name: &str, entry: TaskEntry, arg: usize, config: TaskConfig, region: StackRegion) -> KernelResult<TaskId> {
    let sp = init_frame(&region, entry, arg).ok_or(KernelError::Fail)?;
    sync::with_kernel(|k| k.create_task(name, entry, arg, config, region, sp))
}

/// Start the PendOS scheduler. **Does not return.**
///
/// Adds the idle task, starts the tick and launches the most urgent task.
/// Halts if no task can be started.
#[cfg(target_arch = "arm")]
pub fn start(mut core_peripherals: cortex_m::Peripherals) -> ! {
    use crate::config::{IDLE_PRIORITY, IDLE_STACK_SIZE};

    static IDLE_STACK: Stack<IDLE_STACK_SIZE> = Stack::new();

    fn idle(_arg: usize) -> ! {
        loop {
            cortex_m::asm::wfi();
        }
    }

    cortex_m::interrupt::disable();

    if create_task_static("idle", idle, 0, IDLE_PRIORITY, &IDLE_STACK, 1).is_err() {
        error!("cannot create the idle task");
    }

    arch::cortex_m4::configure_systick(&mut core_peripherals.SYST);
    arch::cortex_m4::set_interrupt_priorities(&mut core_peripherals.SCB);

    match sync::with_kernel(|k| k.start().map(|_| k.next_stack_pointer())) {
        // SAFETY: interrupts are off and the scheduler made this task current.
        Ok(sp) => unsafe { arch::cortex_m4::start_first_task(sp) },
        Err(_) => {
            error!("no task to start");
            loop {
                cortex_m::asm::wfi();
            }
        }
    }
}

/// Suspend the calling task for `ticks` ticks; `delay(0)` yields.
pub fn delay(ticks: u32) -> KernelResult<()> {
    sync::with_kernel(|k| k.delay(ticks))?;
    arch::wait_for_switch();
    Ok(())
}

/// The task calling this function.
pub fn current_task() -> Option<TaskId> {
    sync::with_kernel(|k| k.current_task())
}

pub fn task_info(id: TaskId) -> KernelResult<TaskInfo> {
    sync::with_kernel(|k| k.task_info(id))
}

/// Log a task's snapshot.
pub fn show_task_info(id: TaskId) -> KernelResult<()> {
    let info = task_info(id)?;
    info!(
        "{} {=str} state={} prio={=u8}/{=u8} stack={=usize:#x}+{=usize} sp={=usize:#x} slice={=u32}",
        info.id,
        info.name.as_str(),
        info.state,
        info.priority,
        info.base_priority,
        info.stack_base,
        info.stack_size,
        info.stack_pointer,
        info.time_slice,
    );
    Ok(())
}

/// Ticks elapsed since the scheduler started, truncated to 32 bits.
pub fn ticks() -> u32 {
    TICKS.load(Ordering::Relaxed)
}

/// Tick entry point, called from the SysTick handler.
pub fn on_tick() {
    let now = sync::with_kernel(|k| {
        k.tick();
        k.tick_count()
    });
    TICKS.store(now as u32, Ordering::Relaxed);
}

/// Run a blocking kernel call; if it pended the caller, let the switch
/// happen and report how the wait ended.
fn block_on<F>(op: F) -> KernelResult<()>
where
    F: FnOnce(&mut Scheduler) -> KernelResult<Wait>,
{
    match sync::with_kernel(op)? {
        Wait::Complete(()) => Ok(()),
        Wait::Blocked => {
            arch::wait_for_switch();
            sync::with_kernel(|k| k.wait_result())
        }
    }
}

// ---------------------------------------------------------------------------
// Semaphores
// ---------------------------------------------------------------------------

pub fn semaphore_create(count: u32) -> KernelResult<SemaphoreId> {
    sync::with_kernel(|k| k.semaphore_create(count))
}

pub fn semaphore_take(id: SemaphoreId, timeout: Timeout) -> KernelResult<()> {
    block_on(|k| k.semaphore_take(id, timeout))
}

pub fn semaphore_release(id: SemaphoreId) -> KernelResult<()> {
    sync::with_kernel(|k| k.semaphore_release(id))
}

// ---------------------------------------------------------------------------
// Mutexes
// ---------------------------------------------------------------------------

pub fn mutex_create() -> KernelResult<MutexId> {
    sync::with_kernel(|k| k.mutex_create())
}

pub fn mutex_take(id: MutexId, timeout: Timeout) -> KernelResult<()> {
    block_on(|k| k.mutex_take(id, timeout))
}

pub fn mutex_release(id: MutexId) -> KernelResult<()> {
    sync::with_kernel(|k| k.mutex_release(id))
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

pub fn event_create() -> KernelResult<EventId> {
    sync::with_kernel(|k| k.event_create())
}

pub fn event_add(mask: u32) -> KernelResult<()> {
    sync::with_kernel(|k| k.event_add(mask))
}

pub fn event_del(mask: u32) -> KernelResult<()> {
    sync::with_kernel(|k| k.event_del(mask))
}

pub fn event_wait(id: EventId, flags: EventFlags, timeout: Timeout) -> KernelResult<()> {
    block_on(|k| k.event_wait(id, flags, timeout))
}

pub fn event_send(id: EventId, mask: u32) -> KernelResult<()> {
    sync::with_kernel(|k| k.event_send(id, mask))
}

// ---------------------------------------------------------------------------
// Message queues
// ---------------------------------------------------------------------------

pub fn queue_create() -> KernelResult<QueueId> {
    sync::with_kernel(|k| k.queue_create())
}

pub fn queue_send(id: QueueId, payload: &[u8], urgency: Urgency) -> KernelResult<()> {
    sync::with_kernel(|k| k.queue_send(id, payload, urgency))
}

/// Receive the head message into `buf`, returning its length.
pub fn queue_recv(id: QueueId, buf: &mut [u8], timeout: Timeout) -> KernelResult<usize> {
    match sync::with_kernel(|k| k.queue_recv(id, buf, timeout))? {
        Wait::Complete(len) => Ok(len),
        Wait::Blocked => {
            arch::wait_for_switch();
            sync::with_kernel(|k| k.queue_recv_resumed(id, buf))
        }
    }
}

// ---------------------------------------------------------------------------
// Software timers
// ---------------------------------------------------------------------------

pub fn timer_create(
    name: &str,
    callback: &'static dyn TimerCallback,
    duration: u32,
    mode: TimerMode,
) -> KernelResult<TimerId> {
    sync::with_kernel(|k| k.timer_create(name, callback, duration, mode))
}

pub fn timer_start(id: TimerId) -> KernelResult<()> {
    sync::with_kernel(|k| k.timer_start(id))
}

pub fn timer_stop(id: TimerId) -> KernelResult<()> {
    sync::with_kernel(|k| k.timer_stop(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_TASKS;
    use crate::stack::FRAME_WORDS;

    fn entry(_arg: usize) -> ! {
        loop {}
    }

    #[test]
    fn test_tick_mirror_follows_scheduler() {
        on_tick();
        on_tick();
        let count = sync::with_kernel(|k| k.tick_count());
        assert!(count >= 2);
        assert_eq!(ticks(), count as u32);
    }

    static SHARED_STACK: Stack<256> = Stack::new();

    // The only test creating tasks in the global kernel.
    #[test]
    fn test_create_task_variants() {
        let before = STACK_ARENA.remaining();
        assert_eq!(
            create_task("tiny", entry, 0, 4, MIN_STACK_SIZE - 8, 5),
            Err(KernelError::Fail)
        );
        assert_eq!(STACK_ARENA.remaining(), before);

        let id = create_task_static("static", entry, 7, 4, &SHARED_STACK, 5).unwrap();
        let info = task_info(id).unwrap();
        let region = SHARED_STACK.region();
        assert_eq!(info.stack_base, region.base() as usize);
        assert_eq!(info.stack_size, 256);
        assert_eq!(info.stack_pointer, region.top() as usize - FRAME_WORDS * 4);
        assert_eq!(info.priority, 4);

        let id = create_task("pooled", entry, 0, 6, 512, 5).unwrap();
        assert_eq!(STACK_ARENA.remaining(), before - 512);
        assert_eq!(task_info(id).unwrap().stack_size, 512);

        for _ in 0..MAX_TASKS {
            if create_task_static("filler", entry, 0, 8, &SHARED_STACK, 5).is_err() {
                break;
            }
        }
        // A full task table leaves the arena untouched
        let before = STACK_ARENA.remaining();
        assert_eq!(create_task("late", entry, 0, 6, 512, 5), Err(KernelError::Fail));
        assert_eq!(STACK_ARENA.remaining(), before);
    }
}
