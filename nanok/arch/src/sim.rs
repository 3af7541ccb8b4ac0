//! Simulated CPU.
//!
//! A software-framed register machine used to run the kernel on a host. The
//! live register file sits in the port; a "switch" swaps register files and
//! the host test keeps executing on its own stack, reading the simulated
//! registers to see which context the CPU now runs.

use core::cell::{Cell, RefCell};

use nanok_core::config::{IRQ_LOCK_LEVEL, SWAP_DEFAULT_RETURN};

use crate::{
    context_exit, ArchContext, ContextEntry, FpRegs, InitStep, IrqKey, Port, SaveModel,
    SoftwareCoopRegs, StackRegion,
};

const XPSR_THUMB: usize = 0x0100_0000;

/// Live register file of the simulated CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SimRegisters {
    /// r0-r12
    pub r: [usize; 13],
    pub sp: usize,
    pub lr: usize,
    pub pc: usize,
    pub xpsr: usize,
}

pub struct SimCpu {
    regs: Cell<SimRegisters>,
    fp: Cell<FpRegs>,
    basepri: Cell<u32>,
    cycles: Cell<u32>,
    idle_calls: Cell<u32>,
    switch_requests: Cell<u32>,
    held: Cell<bool>,
    boot_log: RefCell<heapless::Vec<InitStep, 8>>,
}

impl SimCpu {
    pub const fn new() -> Self {
        Self {
            regs: Cell::new(SimRegisters { r: [0; 13], sp: 0, lr: 0, pc: 0, xpsr: 0 }),
            fp: Cell::new(FpRegs::ZERO),
            basepri: Cell::new(0),
            cycles: Cell::new(0),
            idle_calls: Cell::new(0),
            switch_requests: Cell::new(0),
            held: Cell::new(false),
            boot_log: RefCell::new(heapless::Vec::new()),
        }
    }

    pub fn registers(&self) -> SimRegisters {
        self.regs.get()
    }

    pub fn set_registers(&self, regs: SimRegisters) {
        self.regs.set(regs);
    }

    /// Overwrite one general purpose register (r0-r12).
    pub fn set_reg(&self, n: usize, value: usize) {
        let mut regs = self.regs.get();
        regs.r[n] = value;
        self.regs.set(regs);
    }

    pub fn reg(&self, n: usize) -> usize {
        self.regs.get().r[n]
    }

    pub fn pc(&self) -> usize {
        self.regs.get().pc
    }

    pub fn sp(&self) -> usize {
        self.regs.get().sp
    }

    pub fn fp_registers(&self) -> FpRegs {
        self.fp.get()
    }

    pub fn set_fp_registers(&self, regs: FpRegs) {
        self.fp.set(regs);
    }

    pub fn basepri(&self) -> u32 {
        self.basepri.get()
    }

    /// Let simulated time pass.
    pub fn advance(&self, cycles: u32) {
        self.cycles.set(self.cycles.get().wrapping_add(cycles));
    }

    /// Number of times the CPU was put to sleep.
    pub fn idle_calls(&self) -> u32 {
        self.idle_calls.get()
    }

    /// Number of switches requested from interrupt return.
    pub fn switch_requests(&self) -> u32 {
        self.switch_requests.get()
    }

    /// Keep reporting switches as unfinished, the way a hardware port does
    /// between committing a switch and saving the outgoing registers.
    pub fn hold_switches(&self, held: bool) {
        self.held.set(held);
    }

    /// Boot glue steps in the order they ran.
    pub fn boot_log(&self) -> heapless::Vec<InitStep, 8> {
        self.boot_log.borrow().clone()
    }

    fn log_step(&self, step: InitStep) {
        let _ = self.boot_log.borrow_mut().push(step);
    }
}

impl Default for SimCpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Port for SimCpu {
    type Coop = SoftwareCoopRegs;

    const SAVE_MODEL: SaveModel = SaveModel::SoftwareFrame;

    fn irq_lock(&self) -> IrqKey {
        let prev = self.basepri.get();
        // basepri_max semantics: only ever raise the masking
        if prev == 0 || u32::from(IRQ_LOCK_LEVEL) < prev {
            self.basepri.set(u32::from(IRQ_LOCK_LEVEL));
        }
        IrqKey::from_raw(prev)
    }

    fn irq_unlock(&self, key: IrqKey) {
        self.basepri.set(key.raw());
    }

    fn irqs_locked(&self) -> bool {
        let level = self.basepri.get();
        level != 0 && level <= u32::from(IRQ_LOCK_LEVEL)
    }

    fn cycles(&self) -> u32 {
        self.cycles.get()
    }

    unsafe fn save_non_volatile(&self, ctx: &mut ArchContext<SoftwareCoopRegs>) {
        let regs = self.regs.get();
        ctx.preempt.r.copy_from_slice(&regs.r[4..12]);
        ctx.preempt.sp = regs.sp;
        ctx.coop.a.copy_from_slice(&regs.r[0..4]);
        ctx.coop.r12 = regs.r[12];
        ctx.coop.lr = regs.lr;
        ctx.coop.pc = regs.pc;
        ctx.coop.xpsr = regs.xpsr;
    }

    unsafe fn restore_non_volatile(&self, ctx: &ArchContext<SoftwareCoopRegs>) {
        let mut regs = SimRegisters::default();
        regs.r[0..4].copy_from_slice(&ctx.coop.a);
        regs.r[4..12].copy_from_slice(&ctx.preempt.r);
        regs.r[12] = ctx.coop.r12;
        regs.sp = ctx.preempt.sp;
        regs.lr = ctx.coop.lr;
        regs.pc = ctx.coop.pc;
        regs.xpsr = ctx.coop.xpsr;
        self.regs.set(regs);
        self.basepri.set(ctx.basepri as u32);
    }

    unsafe fn context_switch(
        &self,
        from: *mut ArchContext<SoftwareCoopRegs>,
        to: *const ArchContext<SoftwareCoopRegs>,
    ) -> u32 {
        // SAFETY: the caller guarantees both pointers are valid descriptors
        unsafe {
            self.save_non_volatile(&mut *from);
            (*from).swap_return = SWAP_DEFAULT_RETURN;
            self.restore_non_volatile(&*to);
            (*to).swap_return
        }
    }

    unsafe fn request_switch(
        &self,
        from: *mut ArchContext<SoftwareCoopRegs>,
        to: *const ArchContext<SoftwareCoopRegs>,
    ) {
        self.switch_requests.set(self.switch_requests.get() + 1);
        // SAFETY: the caller guarantees both pointers are valid descriptors
        unsafe {
            self.save_non_volatile(&mut *from);
            self.restore_non_volatile(&*to);
        }
    }

    fn switch_in_flight(&self) -> bool {
        self.held.get()
    }

    unsafe fn set_return_value(ctx: &mut ArchContext<SoftwareCoopRegs>, value: u32) {
        ctx.swap_return = value;
    }

    fn init_context(
        &self,
        ctx: &mut ArchContext<SoftwareCoopRegs>,
        entry: ContextEntry,
        arg: usize,
        stack: StackRegion,
    ) {
        *ctx = ArchContext::new();
        ctx.preempt.sp = stack.top();
        ctx.coop.a[0] = arg;
        ctx.coop.pc = entry as usize;
        ctx.coop.lr = context_exit as usize;
        ctx.coop.xpsr = XPSR_THUMB;
    }

    fn fp_save(&self, regs: &mut FpRegs) {
        *regs = self.fp.get();
    }

    fn fp_restore(&self, regs: &FpRegs) {
        self.fp.set(*regs);
    }

    fn idle(&self, key: IrqKey) {
        self.idle_calls.set(self.idle_calls.get() + 1);
        self.basepri.set(key.raw());
    }

    fn interrupt_stack_setup(&self) {
        self.log_step(InitStep::InterruptStack);
    }

    fn exc_setup(&self) {
        self.log_step(InitStep::Exceptions);
    }

    fn fault_init(&self) {
        self.log_step(InitStep::Faults);
    }

    fn cpu_idle_init(&self) {
        self.log_step(InitStep::CpuIdle);
    }

    fn int_lib_init(&self) {
        self.log_step(InitStep::IntLib);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_lock_restores_outer_level() {
        let cpu = SimCpu::new();
        assert!(!cpu.irqs_locked());

        let outer = cpu.irq_lock();
        let inner = cpu.irq_lock();
        assert!(cpu.irqs_locked());
        assert!(outer.was_unlocked());
        assert_eq!(inner.raw(), u32::from(IRQ_LOCK_LEVEL));

        cpu.irq_unlock(inner);
        assert!(cpu.irqs_locked());
        cpu.irq_unlock(outer);
        assert!(!cpu.irqs_locked());
    }

    #[test]
    fn lock_never_lowers_a_stricter_mask() {
        let cpu = SimCpu::new();
        cpu.irq_unlock(IrqKey::from_raw(0x10));
        let key = cpu.irq_lock();
        assert_eq!(cpu.basepri(), 0x10);
        cpu.irq_unlock(key);
        assert_eq!(cpu.basepri(), 0x10);
    }

    fn patterned() -> SimRegisters {
        let mut regs = SimRegisters::default();
        for (n, r) in regs.r.iter_mut().enumerate() {
            *r = 0xA5A5_0000 + n;
        }
        regs.sp = 0x2000_0F00;
        regs.lr = 0x0800_1235;
        regs.pc = 0x0800_2000;
        regs.xpsr = XPSR_THUMB;
        regs
    }

    #[test]
    fn save_then_restore_is_identity() {
        let cpu = SimCpu::new();
        let before = patterned();
        cpu.set_registers(before);

        let mut ctx = ArchContext::<SoftwareCoopRegs>::new();
        let key = cpu.irq_lock();
        unsafe {
            cpu.save_non_volatile(&mut ctx);
            cpu.restore_non_volatile(&ctx);
        }
        cpu.irq_unlock(key);

        assert_eq!(cpu.registers(), before);
        assert_eq!(ctx.preempt.sp, before.sp);
        assert_eq!(&ctx.preempt.r[..], &before.r[4..12]);
    }

    #[test]
    fn switch_round_trip_preserves_callee_saved_state() {
        let cpu = SimCpu::new();
        let mut a = ArchContext::<SoftwareCoopRegs>::new();
        let mut b = ArchContext::<SoftwareCoopRegs>::new();
        b.preempt.sp = 0x2000_8000;
        b.coop.pc = 0x0800_4000;

        let before = patterned();
        cpu.set_registers(before);

        let key = cpu.irq_lock();
        a.basepri = key.raw() as usize;
        let _ = unsafe { cpu.context_switch(&mut a, &b) };
        assert_eq!(cpu.pc(), 0x0800_4000);
        assert_eq!(cpu.sp(), 0x2000_8000);

        let key = cpu.irq_lock();
        b.basepri = key.raw() as usize;
        let ret = unsafe { cpu.context_switch(&mut b, &a) };

        let after = cpu.registers();
        assert_eq!(ret, SWAP_DEFAULT_RETURN);
        assert_eq!(&after.r[4..12], &before.r[4..12]);
        assert_eq!(after.sp, before.sp);
        assert_eq!(after.pc, before.pc);
        assert!(!cpu.irqs_locked());
    }

    #[test]
    fn patched_return_value_is_observed_on_resume() {
        let cpu = SimCpu::new();
        let mut a = ArchContext::<SoftwareCoopRegs>::new();
        let mut b = ArchContext::<SoftwareCoopRegs>::new();

        let _ = unsafe { cpu.context_switch(&mut a, &b) };
        unsafe { SimCpu::set_return_value(&mut a, 0xBEEF) };
        let ret = unsafe { cpu.context_switch(&mut b, &a) };
        assert_eq!(ret, 0xBEEF);
        assert_eq!(a.swap_return, 0xBEEF);
    }

    #[test]
    fn return_value_does_not_touch_saved_registers() {
        let cpu = SimCpu::new();
        cpu.set_registers(patterned());
        let mut a = ArchContext::<SoftwareCoopRegs>::new();
        let mut b = ArchContext::<SoftwareCoopRegs>::new();

        let _ = unsafe { cpu.context_switch(&mut a, &b) };
        assert_eq!(a.swap_return, SWAP_DEFAULT_RETURN);
        let saved = a;
        unsafe { SimCpu::set_return_value(&mut a, 7) };
        assert_eq!(a.preempt, saved.preempt);
        assert_eq!(a.coop, saved.coop);

        let ret = unsafe { cpu.context_switch(&mut b, &a) };
        assert_eq!(ret, 7);
        assert_eq!(cpu.reg(0), patterned().r[0]);
    }

    extern "C" fn entry(_arg: usize) {}

    #[test]
    fn new_context_starts_at_entry_with_argument() {
        let cpu = SimCpu::new();
        let stack = unsafe { StackRegion::from_raw(0x2000_0000, 0x400) };
        let mut ctx = ArchContext::<SoftwareCoopRegs>::new();
        cpu.init_context(&mut ctx, entry, 42, stack);

        unsafe { cpu.restore_non_volatile(&ctx) };
        assert_eq!(cpu.pc(), entry as usize);
        assert_eq!(cpu.reg(0), 42);
        assert_eq!(cpu.sp(), 0x2000_0400);
        assert_eq!(cpu.registers().lr, context_exit as usize);
    }

    #[test]
    fn boot_runs_steps_in_order() {
        let cpu = SimCpu::new();
        crate::boot(&cpu);
        assert_eq!(
            cpu.boot_log().as_slice(),
            &[
                InitStep::InterruptStack,
                InitStep::Exceptions,
                InitStep::Faults,
                InitStep::CpuIdle,
                InitStep::IntLib,
            ]
        );
    }
}
