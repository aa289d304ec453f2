//! # Task Stacks
//!
//! Stack memory for tasks and the initial register frame the port layer
//! restores on a task's first switch-in.
//!
//! Cortex-M stacks are full-descending and must be 8-byte aligned (AAPCS).

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::config::MIN_STACK_SIZE;
use crate::task::TaskEntry;

/// Value of xPSR when a task starts: only the Thumb bit is set.
const INITIAL_XPSR: u32 = 1 << 24;

/// Number of words in the initial frame: eight stacked by hardware
/// (R0–R3, R12, LR, PC, xPSR) and eight saved by PendSV (R4–R11).
pub const FRAME_WORDS: usize = 16;

/// Statically allocated task stack of `LEN` bytes.
#[repr(C, align(8))]
pub struct Stack<const LEN: usize> {
    contents: UnsafeCell<[u8; LEN]>,
}

impl<const LEN: usize> Stack<LEN> {
    /// Create a new zeroed stack.
    pub const fn new() -> Self {
        assert!(LEN % 8 == 0);
        Self {
            contents: UnsafeCell::new([0u8; LEN]),
        }
    }

    /// The memory region covered by this stack.
    pub fn region(&'static self) -> StackRegion {
        StackRegion {
            base: self.contents.get() as *mut u8,
            size: LEN,
        }
    }
}

// Safety: the stack only hands out raw pointers to itself; the task that
// owns it is the only one writing through them.
unsafe impl<const LEN: usize> Sync for Stack<LEN> {}

impl<const LEN: usize> Default for Stack<LEN> {
    fn default() -> Self {
        Stack::new()
    }
}

/// A contiguous region of stack memory: lowest address plus size in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackRegion {
    base: *mut u8,
    size: usize,
}

// Safety: a region is only a description; writes happen through
// `init_frame` before the task exists, and afterwards only from the task.
unsafe impl Send for StackRegion {}
unsafe impl Sync for StackRegion {}

impl StackRegion {
    /// Describe a region of stack memory.
    ///
    /// # Safety
    ///
    /// `base..base + size` must be valid, writable memory that lives for the
    /// rest of the program and is used by no one but the task it is given to.
    pub const unsafe fn from_raw(base: *mut u8, size: usize) -> Self {
        Self { base, size }
    }

    /// A zero-sized region, for tasks whose stack is managed elsewhere.
    pub const fn empty() -> Self {
        Self {
            base: core::ptr::null_mut(),
            size: 0,
        }
    }

    pub fn base(&self) -> *mut u8 {
        self.base
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Highest address of the region, rounded down to 8 bytes.
    pub fn top(&self) -> *mut u32 {
        let top = (self.base as usize + self.size) & !0x07;
        top as *mut u32
    }

    /// Is this region large enough to host a task?
    pub fn is_usable(&self) -> bool {
        !self.base.is_null() && self.size >= MIN_STACK_SIZE
    }
}

/// Bump allocator over a static byte arena, used for the pool-allocated
/// task creation variant. Carved stacks are never returned.
#[repr(C, align(8))]
pub struct StackArena<const LEN: usize> {
    memory: UnsafeCell<[u8; LEN]>,
    used: AtomicUsize,
}

// Safety: `carve` hands out disjoint regions, claimed with a single atomic
// compare-exchange.
unsafe impl<const LEN: usize> Sync for StackArena<LEN> {}

impl<const LEN: usize> StackArena<LEN> {
    pub const fn new() -> Self {
        Self {
            memory: UnsafeCell::new([0u8; LEN]),
            used: AtomicUsize::new(0),
        }
    }

    /// Carve a stack of at least `size` bytes, rounded up to 8.
    ///
    /// Returns `None` when the arena cannot fit it.
    pub fn carve(&'static self, size: usize) -> Option<StackRegion> {
        let size = size.checked_add(7)? & !0x07;
        let mut used = self.used.load(Ordering::Relaxed);
        loop {
            let end = used.checked_add(size)?;
            if end > LEN {
                return None;
            }
            match self
                .used
                .compare_exchange(used, end, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(actual) => used = actual,
            }
        }
        // SAFETY: `used..used + size` lies inside the arena and was claimed
        // exclusively above.
        let base = unsafe { (self.memory.get() as *mut u8).add(used) };
        Some(StackRegion { base, size })
    }

    /// Bytes still available.
    pub fn remaining(&self) -> usize {
        LEN - self.used.load(Ordering::Relaxed)
    }
}

impl<const LEN: usize> Default for StackArena<LEN> {
    fn default() -> Self {
        StackArena::new()
    }
}

/// Helper for pushing words onto a full-descending stack.
struct StackPusher(*mut u32);

impl StackPusher {
    /// # Safety
    ///
    /// There must be room below `top` for every word that will be pushed.
    unsafe fn new(top: *mut u32) -> Self {
        StackPusher(top)
    }

    fn push(&mut self, value: u32) {
        // SAFETY: guaranteed by the contract of `new`.
        unsafe {
            self.0 = self.0.offset(-1);
            self.0.write_volatile(value);
        }
    }

    fn current(&self) -> *mut u32 {
        self.0
    }
}

/// Write the initial register frame for a task and return its stack
/// pointer.
///
/// ## Stack Layout (top = high address, growing down)
///
/// ```text
/// [Hardware stacked frame]
///   xPSR  (Thumb bit set)
///   PC    (task entry point)
///   LR    (task_exit)
///   R12, R3, R2, R1  (0)
///   R0    (task argument)
/// [Software saved context]
///   R11 … R4  (0)      <- returned stack pointer
/// ```
///
/// Returns `None` if the region is too small to host a task.
pub fn init_frame(region: &StackRegion, entry: TaskEntry, arg: usize) -> Option<*mut u32> {
    if !region.is_usable() {
        return None;
    }
    // SAFETY: the region is at least MIN_STACK_SIZE bytes, which exceeds the
    // FRAME_WORDS words pushed here.
    let mut pusher = unsafe { StackPusher::new(region.top()) };

    pusher.push(INITIAL_XPSR);
    pusher.push(entry as usize as u32);
    pusher.push(task_exit as usize as u32);
    // R12, R3, R2, R1
    for _ in 0..4 {
        pusher.push(0);
    }
    pusher.push(arg as u32);
    // R11 - R4
    for _ in 0..8 {
        pusher.push(0);
    }

    Some(pusher.current())
}

/// Landing pad for a task entry that returns despite its `-> !` type.
extern "C" fn task_exit() -> ! {
    loop {
        #[cfg(target_arch = "arm")]
        cortex_m::asm::wfi();
        #[cfg(not(target_arch = "arm"))]
        core::hint::spin_loop();
    }
}
