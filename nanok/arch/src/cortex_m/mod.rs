//! ARMv7-M port (Cortex-M3/M4).
//!
//! The CPU pushes r0-r3, r12, lr, pc and xpsr on exception entry, so the
//! cooperative group is empty and software only saves r4-r11 and the
//! process stack pointer. Every switch happens inside PendSV, which runs at
//! the lowest exception priority and tail-chains after the last nested
//! handler returns.
//!
//! Contexts run in thread mode on the PSP; the MSP is the interrupt stack.

use core::arch::asm;
use core::mem::size_of;
use core::ptr::{self, addr_of_mut};

use cortex_m::interrupt::InterruptNumber;
use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::{DWT, SCB};
use cortex_m::register::{basepri, basepri_max};

use nanok_core::config::{INTERRUPT_STACK_SIZE, IRQ_LOCK_LEVEL, NUM_IRQS, SWAP_DEFAULT_RETURN};

use crate::{
    context_exit, ArchContext, ContextEntry, FpRegs, IrqKey, NoCoopRegs, Port, PreemptRegs,
    SaveModel, StackRegion,
};

mod switch;

#[cfg(feature = "rt")]
mod fault;

pub use switch::PendSV;

/// Return to thread mode, process stack, basic frame
const EXC_RETURN_THREAD_PSP: usize = 0xFFFF_FFFD;
const XPSR_THUMB: u32 = 0x0100_0000;
const PENDSV_PRIORITY: u8 = 0xFF;

const SHCSR_MEMFAULTENA: u32 = 1 << 16;
const SHCSR_BUSFAULTENA: u32 = 1 << 17;
const SHCSR_USGFAULTENA: u32 = 1 << 18;
const CCR_DIV_0_TRP: u32 = 1 << 4;
const CONTROL_SPSEL: u32 = 1 << 1;

/// Registers stacked by the CPU on exception entry.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionFrame {
    pub r0: u32,
    pub r1: u32,
    pub r2: u32,
    pub r3: u32,
    pub r12: u32,
    pub lr: u32,
    pub pc: u32,
    pub xpsr: u32,
}

#[repr(C, align(8))]
struct InterruptStack([u8; INTERRUPT_STACK_SIZE]);

static mut INTERRUPT_STACK: InterruptStack = InterruptStack([0; INTERRUPT_STACK_SIZE]);

#[derive(Clone, Copy)]
struct Line(u16);

// SAFETY: line numbers handed out by `int_lib_init` are below NUM_IRQS
unsafe impl InterruptNumber for Line {
    fn number(self) -> u16 {
        self.0
    }
}

/// The Cortex-M3/M4 port.
pub struct CortexM {
    _private: (),
}

impl CortexM {
    pub const fn new() -> Self {
        Self { _private: () }
    }
}

impl Default for CortexM {
    fn default() -> Self {
        Self::new()
    }
}

impl Port for CortexM {
    type Coop = NoCoopRegs;

    const SAVE_MODEL: SaveModel = SaveModel::HardwareFrame;

    #[inline(always)]
    fn irq_lock(&self) -> IrqKey {
        let prev = basepri::read();
        basepri_max::write(IRQ_LOCK_LEVEL);
        IrqKey::from_raw(u32::from(prev))
    }

    #[inline(always)]
    fn irq_unlock(&self, key: IrqKey) {
        // SAFETY: restores a level previously read from BASEPRI
        unsafe { basepri::write(key.raw() as u8) };
    }

    fn irqs_locked(&self) -> bool {
        let level = basepri::read();
        level != 0 && level <= IRQ_LOCK_LEVEL
    }

    fn cycles(&self) -> u32 {
        DWT::cycle_count()
    }

    unsafe fn save_non_volatile(&self, ctx: &mut ArchContext<NoCoopRegs>) {
        // SAFETY: the helper only stores into `ctx`
        unsafe { switch::save(ctx, EXC_RETURN_THREAD_PSP) };
    }

    unsafe fn restore_non_volatile(&self, ctx: &ArchContext<NoCoopRegs>) {
        // Thread mode cannot reload r4-r11 under the compiler's feet, so the
        // restore is handed to PendSV; the running state goes to a scratch
        // descriptor that is never resumed.
        static mut DISCARD: ArchContext<NoCoopRegs> = ArchContext::new();
        // SAFETY: interrupts are locked and PendSV is the only reader
        unsafe { switch::request(addr_of_mut!(DISCARD), ctx) };
        SCB::set_pendsv();
        // SAFETY: PendSV fires here and never returns to this context
        unsafe { asm!("msr basepri, {0}", "isb", in(reg) 0u32) };
    }

    unsafe fn context_switch(
        &self,
        from: *mut ArchContext<NoCoopRegs>,
        to: *const ArchContext<NoCoopRegs>,
    ) -> u32 {
        // SAFETY: the caller guarantees `from` is the live context and stays
        // allocated until PendSV has saved it
        unsafe {
            ptr::addr_of_mut!((*from).swap_return).write_volatile(SWAP_DEFAULT_RETURN);
            switch::request(from, to);
        }
        SCB::set_pendsv();
        cortex_m::asm::dsb();

        // PendSV is taken as soon as BASEPRI opens, possibly after kernel
        // handlers that still see this context as suspended. Execution comes
        // back here once it is resumed.
        // SAFETY: every register is reloaded from the exception frame or the
        // software save area
        unsafe { asm!("msr basepri, {zero}", "isb", zero = in(reg) 0u32) };

        // SAFETY: the context is running again, so nobody else writes the slot
        unsafe { ptr::addr_of!((*from).swap_return).read_volatile() }
    }

    unsafe fn request_switch(
        &self,
        from: *mut ArchContext<NoCoopRegs>,
        to: *const ArchContext<NoCoopRegs>,
    ) {
        // SAFETY: called from handler mode with interrupts locked
        unsafe { switch::request(from, to) };
        SCB::set_pendsv();
    }

    fn switch_in_flight(&self) -> bool {
        switch::in_flight()
    }

    unsafe fn set_return_value(ctx: &mut ArchContext<NoCoopRegs>, value: u32) {
        ctx.swap_return = value;
    }

    fn init_context(
        &self,
        ctx: &mut ArchContext<NoCoopRegs>,
        entry: ContextEntry,
        arg: usize,
        stack: StackRegion,
    ) {
        let frame_addr = stack.top() - size_of::<ExceptionFrame>();
        let frame = ExceptionFrame {
            r0: arg as u32,
            r1: 0,
            r2: 0,
            r3: 0,
            r12: 0,
            lr: context_exit as usize as u32,
            // stacked PC must have the Thumb bit clear
            pc: (entry as usize as u32) & !1,
            xpsr: XPSR_THUMB,
        };
        // SAFETY: StackRegion grants exclusive use of the memory
        unsafe { (frame_addr as *mut ExceptionFrame).write(frame) };

        *ctx = ArchContext::new();
        ctx.preempt = PreemptRegs { r: [0; 8], sp: frame_addr };
        ctx.exc_return = EXC_RETURN_THREAD_PSP;
    }

    #[cfg(feature = "fpu")]
    fn fp_save(&self, regs: &mut FpRegs) {
        let fpscr: u32;
        // SAFETY: writes exactly 16 words into `regs.s`
        unsafe {
            asm!(
                "vstmia {ptr}, {{s16-s31}}",
                "vmrs {fpscr}, fpscr",
                ptr = in(reg) regs.s.as_mut_ptr(),
                fpscr = out(reg) fpscr,
                options(nostack),
            );
        }
        regs.fpscr = fpscr;
    }

    #[cfg(feature = "fpu")]
    fn fp_restore(&self, regs: &FpRegs) {
        // SAFETY: reads exactly 16 words from `regs.s`
        unsafe {
            asm!(
                "vldmia {ptr}, {{s16-s31}}",
                "vmsr fpscr, {fpscr}",
                ptr = in(reg) regs.s.as_ptr(),
                fpscr = in(reg) regs.fpscr,
                out("s16") _, out("s17") _, out("s18") _, out("s19") _,
                out("s20") _, out("s21") _, out("s22") _, out("s23") _,
                out("s24") _, out("s25") _, out("s26") _, out("s27") _,
                out("s28") _, out("s29") _, out("s30") _, out("s31") _,
                options(nostack),
            );
        }
    }

    fn idle(&self, key: IrqKey) {
        // PRIMASK keeps the wake-up interrupt pending across the unmask, so
        // it cannot slip in between and leave WFI sleeping
        // SAFETY: PRIMASK is cleared again right after WFI
        unsafe {
            asm!(
                "cpsid i",
                "msr basepri, {key}",
                "wfi",
                "cpsie i",
                "isb",
                key = in(reg) key.raw(),
            );
        }
    }

    fn interrupt_stack_setup(&self) {
        let top = addr_of_mut!(INTERRUPT_STACK) as usize + INTERRUPT_STACK_SIZE;
        // Thread mode keeps its current stack but moves it to PSP; MSP then
        // points at the dedicated interrupt stack.
        // SAFETY: runs once at boot with interrupts masked
        unsafe {
            asm!(
                "mrs {tmp}, control",
                "tst {tmp}, {spsel}",
                "bne 1f",
                "mrs {sp}, msp",
                "msr psp, {sp}",
                "orr {tmp}, {tmp}, {spsel}",
                "msr control, {tmp}",
                "isb",
                "1:",
                "msr msp, {top}",
                tmp = out(reg) _,
                sp = out(reg) _,
                spsel = in(reg) CONTROL_SPSEL,
                top = in(reg) top,
            );
        }
    }

    fn exc_setup(&self) {
        // SAFETY: boot glue runs once, before anything else owns the core
        // peripherals
        let mut p = unsafe { cortex_m::Peripherals::steal() };
        unsafe {
            p.SCB.set_priority(SystemHandler::PendSV, PENDSV_PRIORITY);
            p.SCB.shcsr.modify(|r| r | SHCSR_MEMFAULTENA | SHCSR_BUSFAULTENA | SHCSR_USGFAULTENA);
        }
        // cycle counter for latency measurement and switch metrics
        p.DCB.enable_trace();
        p.DWT.enable_cycle_counter();
    }

    fn fault_init(&self) {
        // SAFETY: see exc_setup
        let p = unsafe { cortex_m::Peripherals::steal() };
        unsafe { p.SCB.ccr.modify(|r| r | CCR_DIV_0_TRP) };
    }

    fn cpu_idle_init(&self) {
        // SAFETY: see exc_setup
        let mut p = unsafe { cortex_m::Peripherals::steal() };
        p.SCB.clear_sleepdeep();
    }

    fn int_lib_init(&self) {
        // SAFETY: see exc_setup
        let mut p = unsafe { cortex_m::Peripherals::steal() };
        for line in 0..NUM_IRQS as u16 {
            // kernel-aware by default: maskable by irq_lock
            unsafe { p.NVIC.set_priority(Line(line), IRQ_LOCK_LEVEL) };
        }
    }
}
