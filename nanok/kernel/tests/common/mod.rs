//! Shared fixtures for the kernel integration tests.
//!
//! Every test builds its own kernel over a fresh simulated CPU. The CPU
//! never executes context code: after a switch the test itself plays the
//! part of whichever context is now current.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use nanok_arch::sim::SimCpu;
use nanok_kernel::{
    BootContexts, ContextConfig, ContextFlags, ContextId, IdleConfig, Kernel, Priority, StackRegion,
};

pub type SimKernel = Kernel<SimCpu>;

static NEXT_STACK: AtomicUsize = AtomicUsize::new(0);

pub const STACK_SIZE: usize = 0x400;

/// A stack region the simulated CPU only ever uses as a number.
pub fn stack() -> StackRegion {
    let n = NEXT_STACK.fetch_add(1, Ordering::Relaxed);
    unsafe { StackRegion::from_raw(0x2000_0000 + n * STACK_SIZE, STACK_SIZE) }
}

pub extern "C" fn context_main(_arg: usize) {}

pub extern "C" fn idle_main(_arg: usize) {}

pub fn boot() -> (SimKernel, BootContexts) {
    let kernel = Kernel::new(SimCpu::new());
    let contexts = kernel
        .init(IdleConfig { stack: stack(), entry: idle_main })
        .expect("init");
    (kernel, contexts)
}

pub fn prio(level: u8) -> Priority {
    Priority::new(level).expect("valid priority")
}

pub fn fiber(kernel: &SimKernel, level: u8) -> ContextId {
    kernel
        .create_fiber(ContextConfig::new(prio(level), context_main, stack()))
        .expect("create fiber")
}

pub fn fp_fiber(kernel: &SimKernel, level: u8) -> ContextId {
    kernel
        .create_fiber(
            ContextConfig::new(prio(level), context_main, stack()).with_options(ContextFlags::USE_FP),
        )
        .expect("create fp fiber")
}

/// Run `body` as an interrupt handler. Returns whether leaving it
/// switched contexts.
pub fn interrupt(kernel: &SimKernel, body: impl FnOnce()) -> bool {
    kernel.isr_enter();
    body();
    kernel.isr_exit()
}

/// The current context calls `swap` at a switch point.
pub fn swap(kernel: &SimKernel) -> u32 {
    let key = kernel.irq_lock();
    kernel.swap(key)
}

/// The current context blocks.
pub fn pend(kernel: &SimKernel) -> u32 {
    let key = kernel.irq_lock();
    kernel.pend(key)
}

pub fn current(kernel: &SimKernel) -> ContextId {
    kernel.current().expect("kernel initialized")
}
