#![no_std]

//! # nanok arch
//!
//! The boundary between the architecture-neutral scheduler and the CPU.
//!
//! A port implements [`Port`]: interrupt masking, the save/restore pair for
//! a context's registers, the switch trampoline, and the boot glue that
//! prepares the CPU before the first switch. The kernel is generic over the
//! port, so the save model (hardware exception frame or full software frame)
//! is fixed at compile time and the scheduler never branches on it.

use core::cell::Cell;

use critical_section::Mutex;
use nanok_core::fatal::{fatal_error, FatalInfo, FatalReason};

pub mod context;
pub mod isr_table;
pub mod stack;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m;

pub use context::*;
pub use isr_table::{IsrEntry, IsrHandler, IsrTable};
pub use stack::StackRegion;

/// Entry point of a context. Returning from it ends the context.
pub type ContextEntry = extern "C" fn(usize);

/// Interrupt mask level in effect before an `irq_lock`.
///
/// Handing the key back to `irq_unlock` restores that level, which makes
/// nested lock/unlock pairs compose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqKey(u32);

impl IrqKey {
    pub const fn from_raw(level: u32) -> Self {
        IrqKey(level)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    /// True if the key was taken while interrupts were fully enabled
    pub const fn was_unlocked(self) -> bool {
        self.0 == 0
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for IrqKey {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "IrqKey({=u32:#x})", self.0);
    }
}

/// One step of the architecture boot sequence, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStep {
    InterruptStack,
    Exceptions,
    Faults,
    CpuIdle,
    IntLib,
}

/// Operations the kernel needs from the CPU.
pub trait Port {
    /// Registers saved in software that the hardware frame does not cover
    type Coop: CoopRegs;

    const SAVE_MODEL: SaveModel;

    /// Raise the interrupt mask to the kernel lock level.
    fn irq_lock(&self) -> IrqKey;

    /// Restore the mask level captured by `irq_lock`.
    fn irq_unlock(&self, key: IrqKey);

    /// True if kernel-aware interrupts are currently masked.
    fn irqs_locked(&self) -> bool;

    /// Free-running cycle counter.
    fn cycles(&self) -> u32;

    /// Capture the live register file into `ctx`.
    ///
    /// # Safety
    /// Interrupts must be masked at the lock level, and the caller must be
    /// the port's switch path so that the live registers belong to `ctx`.
    unsafe fn save_non_volatile(&self, ctx: &mut ArchContext<Self::Coop>);

    /// Load `ctx` into the CPU. Control continues at the saved program
    /// counter, immediately on software-framed ports and at the next
    /// exception return on hardware-framed ones.
    ///
    /// # Safety
    /// Same as [`Port::save_non_volatile`]; the state of whatever ran before
    /// is lost unless it was saved first.
    unsafe fn restore_non_volatile(&self, ctx: &ArchContext<Self::Coop>);

    /// Switch from the running context to `to` at thread level.
    ///
    /// Returns when `from` is resumed, yielding whatever its `swap_return`
    /// held at that moment: `SWAP_DEFAULT_RETURN` unless someone called
    /// [`Port::set_return_value`] on it while it was suspended. On return the
    /// interrupt mask is `from.basepri`.
    ///
    /// # Safety
    /// `from` must be the live context and `to` a suspended or never-run one;
    /// both must stay valid until the switch completes. Interrupts must be
    /// locked.
    unsafe fn context_switch(
        &self,
        from: *mut ArchContext<Self::Coop>,
        to: *const ArchContext<Self::Coop>,
    ) -> u32;

    /// Switch on the way out of an interrupt handler. The outgoing context
    /// keeps its own volatile registers.
    ///
    /// # Safety
    /// As for [`Port::context_switch`], but callable from handler mode.
    unsafe fn request_switch(
        &self,
        from: *mut ArchContext<Self::Coop>,
        to: *const ArchContext<Self::Coop>,
    );

    /// True while a switch has been committed to the kernel but the
    /// outgoing context's registers are not yet saved. Its descriptor must
    /// not be reused until this clears.
    fn switch_in_flight(&self) -> bool {
        false
    }

    /// Set the value a suspended context's `context_switch` returns with.
    ///
    /// # Safety
    /// `ctx` must be suspended inside a switch, or committed to one that has
    /// not completed yet.
    unsafe fn set_return_value(ctx: &mut ArchContext<Self::Coop>, value: u32);

    /// Build the first-run state of a context.
    fn init_context(
        &self,
        ctx: &mut ArchContext<Self::Coop>,
        entry: ContextEntry,
        arg: usize,
        stack: StackRegion,
    );

    /// Save the live floating point registers.
    fn fp_save(&self, _regs: &mut FpRegs) {}

    /// Load floating point registers.
    fn fp_restore(&self, _regs: &FpRegs) {}

    /// Drop the interrupt mask to `key` and wait for an interrupt, without
    /// losing one that arrives in between.
    fn idle(&self, key: IrqKey);

    /// Move interrupt handling onto its own stack.
    fn interrupt_stack_setup(&self);

    /// Exception priorities and enables.
    fn exc_setup(&self);

    /// Default fault behaviour.
    fn fault_init(&self);

    /// Low-power wait preparation.
    fn cpu_idle_init(&self);

    /// Interrupt controller defaults.
    fn int_lib_init(&self);
}

/// Run the architecture boot glue in its required order.
///
/// Must run once, with interrupts masked, before the first switch.
pub fn boot<P: Port>(port: &P) {
    port.interrupt_stack_setup();
    port.exc_setup();
    port.fault_init();
    port.cpu_idle_init();
    port.int_lib_init();
    log::debug!("arch boot complete ({:?})", P::SAVE_MODEL);
}

static EXIT_HOOK: Mutex<Cell<Option<fn() -> !>>> = Mutex::new(Cell::new(None));

/// Register what runs when a context's entry function returns. The kernel
/// installs a hook that terminates the current context.
pub fn set_context_exit_hook(hook: fn() -> !) {
    critical_section::with(|cs| EXIT_HOOK.borrow(cs).set(Some(hook)));
}

/// Return address planted in every new context's frame.
///
/// Unwinding ABI: a hook that panics on a host build unwinds through here.
pub extern "C-unwind" fn context_exit() -> ! {
    let hook = critical_section::with(|cs| EXIT_HOOK.borrow(cs).get());
    match hook {
        Some(hook) => hook(),
        None => fatal_error(FatalInfo::new(FatalReason::ContextExit)),
    }
}
