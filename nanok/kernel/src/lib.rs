//! # nanok kernel - Fiber/Task Scheduler
//!
//! The scheduling core of a single-core nanokernel with two execution
//! classes:
//!
//! **Fibers**: cooperative, priority-ordered contexts. A running fiber keeps
//! the CPU until it yields or blocks; interrupts never preempt it.
//!
//! **Task**: at most one preemptible context sits in the task slot. Any
//! runnable fiber wins over it, and an interrupt return that finds a fiber
//! ready switches away from it immediately.
//!
//! When neither can run, a permanent idle fiber created by
//! [`Kernel::init`] takes the CPU and waits for an interrupt.
//!
//! ## Module Overview
//!
//! - [`kernel`] - `Kernel<P>`, the per-CPU state and every scheduling operation
//! - [`config`] - creation parameters and read-only views
//! - `arena` - fixed descriptor pool with generation-checked handles
//! - `policy` - which context runs next
//!
//! ## Example
//!
//! ```rust,ignore
//! static KERNEL: Kernel<CortexM> = Kernel::new(CortexM::new());
//!
//! let boot = KERNEL.init(IdleConfig { stack: idle_stack, entry: idle_loop })?;
//! let worker = KERNEL.create_fiber(ContextConfig::new(Priority::new(2)?, worker_main, stack))?;
//!
//! // block the boot task until someone wakes it
//! let key = KERNEL.irq_lock();
//! let value = KERNEL.pend(key);
//! ```

#![no_std]

macro_rules! trace_event {
    ($kernel:expr, $kind:ident, [$($byte:expr),* $(,)?]) => {{
        #[cfg(feature = "trace")]
        {
            let _ = nanok_trace::record(
                nanok_trace::RecordKind::$kind,
                $kernel.port.cycles(),
                &[$($byte),*],
            );
        }
    }};
}

mod arena;
pub mod config;
mod isr;
pub mod kernel;
mod policy;
mod state;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod global;

pub use config::{BootContexts, ContextConfig, IdleConfig, SchedSnapshot};
pub use kernel::Kernel;
pub use nanok_arch::{IrqKey, Port, StackRegion};
pub use nanok_core::{
    ContextFlags, ContextId, ContextInfo, ContextState, KResult, KernelError, Priority,
};
#[cfg(feature = "latency")]
pub use nanok_latency::LatencyReport;
