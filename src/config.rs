//! # PendOS Configuration
//!
//! Compile-time constants governing the scheduler and the kernel object
//! arenas. All limits are fixed at compile time.

/// Maximum number of tasks the system can manage simultaneously,
/// including the idle task. Bounds the TCB arena, every priority bucket
/// and every wait queue.
pub const MAX_TASKS: usize = 8;

/// Priority of the idle task. Lower numeric value means higher urgency,
/// so the idle task sits at the very bottom of the ready structure.
pub const IDLE_PRIORITY: u8 = 255;

/// Maximum length of a task or timer name in bytes. Longer names are
/// truncated on a character boundary.
pub const NAME_MAX_LEN: usize = 16;

/// Time slice used when a task is created with a slice of zero ticks.
pub const DEFAULT_TIME_SLICE: u32 = 10;

/// SysTick frequency in Hz. One tick is the kernel's unit of time.
pub const TICK_HZ: u32 = 1000;

/// System clock frequency in Hz (default for STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Smallest stack a task may be created with. The initial frame alone
/// takes sixteen words (hardware frame plus R4–R11); the rest is headroom.
pub const MIN_STACK_SIZE: usize = 16 * 4 + 64;

/// Stack size of the idle task in bytes.
pub const IDLE_STACK_SIZE: usize = 256;

/// Bytes reserved for pool-allocated task stacks. Stacks carved from
/// this arena are never returned (tasks never terminate).
pub const STACK_ARENA_SIZE: usize = 8 * 1024;

/// Maximum number of user software timers.
pub const MAX_SOFT_TIMERS: usize = 8;

/// Capacity of the timer list: one embedded timeout per task plus every
/// software timer.
pub const MAX_TIMERS: usize = MAX_TASKS + MAX_SOFT_TIMERS;

/// Maximum number of semaphores.
pub const MAX_SEMAPHORES: usize = 8;

/// Maximum number of mutexes.
pub const MAX_MUTEXES: usize = 8;

/// Maximum number of event objects.
pub const MAX_EVENTS: usize = 4;

/// Maximum number of message queues.
pub const MAX_QUEUES: usize = 4;

/// Number of blocks in the message payload pool, shared by all queues.
pub const MSG_POOL_BLOCKS: usize = 16;

/// Size of one message payload block in bytes. This is the largest
/// message a queue can carry.
pub const MSG_BLOCK_SIZE: usize = 64;
