//! Saved register groups.
//!
//! `ArchContext` is the architecture half of a context descriptor. Its layout
//! is `#[repr(C)]` because the switch trampolines address the fields by
//! offset.

use core::fmt::Debug;

/// Callee-saved registers r4-r11 plus the stack pointer.
///
/// Saved on every switch on every architecture.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PreemptRegs {
    pub r: [usize; 8],
    pub sp: usize,
}

impl PreemptRegs {
    pub const ZERO: PreemptRegs = PreemptRegs { r: [0; 8], sp: 0 };
}

/// Registers the hardware does not preserve across exception entry.
pub trait CoopRegs: Copy + Default + Debug + Send {
    /// All-zero group, usable in `const` initializers.
    const INIT: Self;
}

/// Empty cooperative group for CPUs whose exception frame already holds
/// the volatile registers (Cortex-M3/M4).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NoCoopRegs;

impl CoopRegs for NoCoopRegs {
    const INIT: Self = NoCoopRegs;
}

/// Full software frame for CPUs without hardware stacking.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SoftwareCoopRegs {
    /// r0-r3; r0 doubles as the return register
    pub a: [usize; 4],
    pub r12: usize,
    pub lr: usize,
    pub pc: usize,
    pub xpsr: usize,
}

impl CoopRegs for SoftwareCoopRegs {
    const INIT: Self = SoftwareCoopRegs { a: [0; 4], r12: 0, lr: 0, pc: 0, xpsr: 0 };
}

/// Callee-saved floating point registers s16-s31 and the status register.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FpRegs {
    pub s: [u32; 16],
    pub fpscr: u32,
}

impl FpRegs {
    pub const ZERO: FpRegs = FpRegs { s: [0; 16], fpscr: 0 };
}

/// How much of a context the hardware saves on exception entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveModel {
    /// An exception frame is pushed by the CPU; software saves `PreemptRegs`
    HardwareFrame,
    /// Nothing is pushed; software saves both groups
    SoftwareFrame,
}

/// Architecture-specific part of a context descriptor.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchContext<C: CoopRegs> {
    pub preempt: PreemptRegs,
    /// Interrupt mask level restored when the context resumes
    pub basepri: usize,
    /// Exception return code used to resume the context
    pub exc_return: usize,
    /// Result of the switch the context is suspended in
    pub swap_return: u32,
    pub coop: C,
    pub fp: FpRegs,
}

impl<C: CoopRegs> ArchContext<C> {
    pub const fn new() -> Self {
        Self {
            preempt: PreemptRegs::ZERO,
            basepri: 0,
            exc_return: 0,
            swap_return: 0,
            coop: C::INIT,
            fp: FpRegs::ZERO,
        }
    }
}

impl<C: CoopRegs> Default for ArchContext<C> {
    fn default() -> Self {
        Self::new()
    }
}
