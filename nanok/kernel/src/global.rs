//! The kernel instance on Cortex-M targets.
//!
//! ```rust,ignore
//! #[cortex_m_rt::entry]
//! fn main() -> ! {
//!     nanok_kernel::global::start().unwrap();
//!     // main now runs as the boot task
//! }
//! ```

use core::ptr::addr_of_mut;
use core::sync::atomic::{AtomicBool, Ordering};

use nanok_arch::cortex_m::CortexM;
use nanok_arch::StackRegion;
use nanok_core::config::IDLE_STACK_SIZE;
use nanok_core::fatal::{contract_violation, FatalReason};
use nanok_core::KResult;

use crate::config::{BootContexts, IdleConfig};
use crate::kernel::Kernel;

pub static KERNEL: Kernel<CortexM> = Kernel::new(CortexM::new());

static STARTED: AtomicBool = AtomicBool::new(false);
static mut IDLE_STACK: [u64; IDLE_STACK_SIZE / 8] = [0; IDLE_STACK_SIZE / 8];

/// Initialize [`KERNEL`] with the built-in idle loop and exit hook.
pub fn start() -> KResult<BootContexts> {
    if STARTED.swap(true, Ordering::AcqRel) {
        contract_violation("kernel started twice", file!(), line!());
    }
    nanok_arch::set_context_exit_hook(exit_hook);
    // SAFETY: guarded by STARTED, so the idle stack is handed out once
    let stack = StackRegion::from_static(unsafe { &mut *addr_of_mut!(IDLE_STACK) });
    KERNEL.init(IdleConfig { stack, entry: idle_main })
}

extern "C" fn idle_main(_: usize) {
    loop {
        KERNEL.idle_once();
    }
}

fn exit_hook() -> ! {
    KERNEL.exit_current();
    // only reached if the switch away failed
    KERNEL.fatal(FatalReason::ContextExit)
}

/// Interrupt entry for lines connected through `KERNEL.irq_connect`.
pub fn dispatch(irq: u16) {
    KERNEL.handle_irq(irq);
}
