//! Fatal error path.
//!
//! Nothing below the kernel can recover from a broken scheduler invariant, so
//! contract violations and CPU faults end here: the registered hook gets a
//! postmortem snapshot, then the system panics. The panic handler chosen by
//! the application decides between halting, resetting and unwinding.

use core::cell::Cell;
use core::fmt;

use critical_section::Mutex;

use crate::{ContextFlags, ContextId, Priority};

/// Why the system went down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalReason {
    /// A debug assertion on a kernel precondition failed
    ContractViolation,
    /// Someone tried to terminate an essential context
    EssentialTerminated,
    /// CPU fault, carrying the exception number
    CpuException(u8),
    /// An interrupt fired on a line with no handler
    SpuriousIrq(u16),
    /// A context's entry function returned with nowhere to go
    ContextExit,
}

impl fmt::Display for FatalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalReason::ContractViolation => write!(f, "contract violation"),
            FatalReason::EssentialTerminated => write!(f, "essential context terminated"),
            FatalReason::CpuException(n) => write!(f, "CPU exception {n}"),
            FatalReason::SpuriousIrq(irq) => write!(f, "spurious interrupt on line {irq}"),
            FatalReason::ContextExit => write!(f, "context entry returned"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for FatalReason {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            FatalReason::ContractViolation => defmt::write!(fmt, "ContractViolation"),
            FatalReason::EssentialTerminated => defmt::write!(fmt, "EssentialTerminated"),
            FatalReason::CpuException(n) => defmt::write!(fmt, "CpuException({})", n),
            FatalReason::SpuriousIrq(irq) => defmt::write!(fmt, "SpuriousIrq({})", irq),
            FatalReason::ContextExit => defmt::write!(fmt, "ContextExit"),
        }
    }
}

/// Postmortem snapshot handed to the fatal hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatalInfo {
    pub reason: FatalReason,
    /// Context that was current when the error was raised, if known
    pub context: Option<ContextId>,
    pub flags: ContextFlags,
    pub priority: Option<Priority>,
    /// Faulting or saved program counter, if known
    pub pc: Option<usize>,
    pub message: &'static str,
    pub location: Option<(&'static str, u32)>,
}

impl FatalInfo {
    pub const fn new(reason: FatalReason) -> Self {
        Self {
            reason,
            context: None,
            flags: ContextFlags::empty(),
            priority: None,
            pc: None,
            message: "",
            location: None,
        }
    }

    pub const fn with_context(mut self, id: ContextId, flags: ContextFlags, priority: Priority) -> Self {
        self.context = Some(id);
        self.flags = flags;
        self.priority = Some(priority);
        self
    }

    pub const fn with_pc(mut self, pc: usize) -> Self {
        self.pc = Some(pc);
        self
    }

    pub const fn with_message(mut self, message: &'static str) -> Self {
        self.message = message;
        self
    }

    pub const fn with_location(mut self, file: &'static str, line: u32) -> Self {
        self.location = Some((file, line));
        self
    }
}

impl fmt::Display for FatalInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(id) = self.context {
            write!(f, " in context {id} [{}]", self.flags)?;
        }
        if let Some(pc) = self.pc {
            write!(f, " pc={pc:#x}")?;
        }
        if let Some((file, line)) = self.location {
            write!(f, " at {file}:{line}")?;
        }
        Ok(())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for FatalInfo {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{} {=str} ctx={} flags={}", self.reason, self.message, self.context, self.flags);
    }
}

/// Callback run before the system goes down.
pub type FatalHook = fn(&FatalInfo);

static FATAL_HOOK: Mutex<Cell<Option<FatalHook>>> = Mutex::new(Cell::new(None));

/// Install (or clear) the hook run on every fatal error.
pub fn set_fatal_hook(hook: Option<FatalHook>) {
    critical_section::with(|cs| FATAL_HOOK.borrow(cs).set(hook));
}

/// Report a fatal error and never return.
#[cold]
pub fn fatal_error(info: FatalInfo) -> ! {
    log::error!("nanok fatal: {}", info);
    let hook = critical_section::with(|cs| FATAL_HOOK.borrow(cs).get());
    if let Some(hook) = hook {
        hook(&info);
    }
    panic!("nanok fatal: {}", info);
}

/// Entry point used by [`nk_assert!`](crate::nk_assert).
#[cold]
#[track_caller]
pub fn contract_violation(message: &'static str, file: &'static str, line: u32) -> ! {
    fatal_error(
        FatalInfo::new(FatalReason::ContractViolation)
            .with_message(message)
            .with_location(file, line),
    )
}

/// Debug-build assertion on a kernel precondition.
///
/// A failure runs the fatal hook and panics. Release builds still type-check
/// the condition but never evaluate it.
#[macro_export]
macro_rules! nk_assert {
    ($cond:expr, $msg:literal $(,)?) => {
        if cfg!(debug_assertions) && !($cond) {
            $crate::fatal::contract_violation($msg, file!(), line!());
        }
    };
}
