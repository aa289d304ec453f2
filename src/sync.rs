//! # Kernel Access
//!
//! Interrupt-safe access to the single kernel instance.
//! All scheduler state is touched only inside a critical section, from task
//! code and from the SysTick/PendSV handlers alike, so a tick can never
//! observe a half-spliced queue.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::scheduler::Scheduler;

/// The kernel instance.
static KERNEL: Mutex<RefCell<Scheduler>> = Mutex::new(RefCell::new(Scheduler::new()));

/// Execute a closure with exclusive access to the kernel (interrupts
/// disabled).
///
/// A context switch requested inside the closure is forwarded to the port
/// layer when the closure returns; it takes effect as soon as interrupts are
/// re-enabled.
///
/// # Usage
/// ```ignore
/// let count = sync::with_kernel(|k| k.semaphore_count(sem));
/// ```
///
/// Keep the closure short: interrupt latency grows with it. Never nest
/// calls; the inner borrow would panic.
#[inline]
pub fn with_kernel<F, R>(f: F) -> R
where
    F: FnOnce(&mut Scheduler) -> R,
{
    critical_section::with(|cs| {
        let mut kernel = KERNEL.borrow_ref_mut(cs);
        let result = f(&mut kernel);
        if kernel.take_switch_request() {
            crate::arch::request_switch();
        }
        result
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_kernel_reaches_global_instance() {
        let sem = with_kernel(|k| k.semaphore_create(4)).unwrap();
        assert_eq!(with_kernel(|k| k.semaphore_count(sem)), Ok(4));
        with_kernel(|k| k.semaphore_release(sem)).unwrap();
        assert_eq!(with_kernel(|k| k.semaphore_count(sem)), Ok(5));
    }
}
