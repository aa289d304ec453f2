//! # Architecture Abstraction Layer
//!
//! Hardware boundary of the kernel. The scheduler only ever asks the port
//! for one thing, a deferred context switch; everything else here is
//! startup and exception plumbing.
//!
//! Only the Cortex-M4 port exists. Off target the switch request is a no-op,
//! which lets the kernel core run in host tests.

#[cfg(target_arch = "arm")]
pub mod cortex_m4;

/// Defer a context switch to the next safe point.
#[inline]
pub(crate) fn request_switch() {
    #[cfg(target_arch = "arm")]
    cortex_m4::trigger_pendsv();
}

/// Return once a previously requested switch has had the chance to run.
#[inline]
pub(crate) fn wait_for_switch() {
    #[cfg(target_arch = "arm")]
    {
        cortex_m::asm::dsb();
        cortex_m::asm::isb();
    }
}
