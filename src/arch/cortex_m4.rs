//! # Cortex-M4 Port Layer
//!
//! Context switching via PendSV, the SysTick time base, and the launch of
//! the first task.
//!
//! ## Context Switch Mechanism
//!
//! The Cortex-M4 uses a split-stack model:
//! - **MSP** (Main Stack Pointer): used by the kernel and interrupt handlers
//! - **PSP** (Process Stack Pointer): used by tasks in Thread mode
//!
//! On exception entry the hardware stacks R0–R3, R12, LR, PC and xPSR onto
//! the process stack. PendSV saves and restores R4–R11, completing the
//! context.
//!
//! The scheduler never switches stacks itself: it raises a switch request,
//! `sync::with_kernel` turns that into PENDSVSET, and PendSV runs as soon
//! as no other handler is active.
//!
//! ## Interrupt Priorities
//!
//! SysTick and PendSV both run at 0xFF (lowest), so a switch never
//! preempts an application interrupt handler.

use core::arch::{asm, naked_asm};

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{SCB, SYST};
use cortex_m_rt::exception;

use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};
use crate::sync;

/// Priority of SysTick and PendSV.
const KERNEL_HANDLER_PRIORITY: u8 = 0xFF;

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure SysTick to fire at `TICK_HZ` from the processor clock.
pub fn configure_systick(syst: &mut SYST) {
    syst.set_reload(SYSTEM_CLOCK_HZ / TICK_HZ - 1);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

/// Set PendSV and SysTick to the lowest interrupt priority.
pub fn set_interrupt_priorities(scb: &mut SCB) {
    // SAFETY: changing handler priorities cannot break a priority-based
    // critical section, none exists yet.
    unsafe {
        scb.set_priority(SystemHandler::PendSV, KERNEL_HANDLER_PRIORITY);
        scb.set_priority(SystemHandler::SysTick, KERNEL_HANDLER_PRIORITY);
    }
}

/// Pend a PendSV exception.
#[inline]
pub fn trigger_pendsv() {
    SCB::set_pendsv();
}

// ---------------------------------------------------------------------------
// First task launch
// ---------------------------------------------------------------------------

/// Switch Thread mode to PSP and jump into the first task. Never returns.
///
/// `psp` points at the task's initial frame as laid out by
/// `stack::init_frame`: eight software-saved words, then the hardware frame.
///
/// # Safety
/// Must be called once, with interrupts disabled, after the scheduler made
/// the task current.
pub unsafe fn start_first_task(psp: *const u32) -> ! {
    asm!(
        // Skip R4-R11, which are all zero for a fresh task
        "adds r0, #32",
        "msr psp, r0",

        // Thread mode uses PSP from here on (CONTROL.SPSEL = 1)
        "movs r0, #2",
        "msr control, r0",
        "isb",

        // Unstack the hardware frame by hand
        "pop {{r0-r3, r12}}",
        "pop {{r4}}",
        "mov lr, r4",
        "pop {{r5}}",
        "pop {{r6}}",

        "cpsie i",
        "bx r5",

        in("r0") psp,
        options(noreturn)
    );
}

// ---------------------------------------------------------------------------
// PendSV handler (context switch)
// ---------------------------------------------------------------------------

/// PendSV exception handler.
///
/// 1. Push R4–R11 onto the outgoing task's stack
/// 2. Hand its PSP to the scheduler
/// 3. Commit the switch and fetch the incoming task's PSP
/// 4. Pop R4–R11 from the incoming stack
/// 5. Exception return to Thread mode on PSP
///
/// # Safety
/// Called by the NVIC only; follows the exception entry/exit convention.
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11}}",
        "bl {save}",

        "bl {switch}",

        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",

        // EXC_RETURN: Thread mode, PSP, no FP frame
        "ldr r0, =0xFFFFFFFD",
        "bx r0",

        save = sym save_context,
        switch = sym switch_context,
    );
}

/// Store the outgoing task's stack pointer.
extern "C" fn save_context(psp: *mut u32) {
    sync::with_kernel(|k| k.save_current_stack_pointer(psp));
}

/// Make the picked task current and return its stack pointer.
extern "C" fn switch_context() -> *mut u32 {
    sync::with_kernel(|k| {
        let psp = k.next_stack_pointer();
        k.commit_switch();
        psp
    })
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

#[exception]
fn SysTick() {
    crate::kernel::on_tick();
}
