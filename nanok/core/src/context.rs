//! Context handles, flags and lifecycle states.

use core::fmt;

use crate::Priority;

/// Handle to a context descriptor slot.
///
/// The generation changes every time the slot is released, so a handle kept
/// past its context's termination is detected instead of aliasing whatever
/// occupies the slot next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId {
    index: u8,
    generation: u16,
}

impl ContextId {
    pub const fn new(index: u8, generation: u16) -> Self {
        Self { index, generation }
    }

    /// Slot index inside the arena
    pub const fn index(self) -> u8 {
        self.index
    }

    pub const fn generation(self) -> u16 {
        self.generation
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ContextId {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "#{}.{}", self.index, self.generation);
    }
}

bitflags::bitflags! {
    /// Per-context flag word.
    ///
    /// The execution class is the `TASK` bit: a context without it is a
    /// fiber, so an empty flag word describes a fiber.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ContextFlags: u32 {
        const TASK = 0x001;
        /// Executing an interrupt handler
        const INT_ACTIVE = 0x002;
        /// Executing an exception handler
        const EXC_ACTIVE = 0x004;
        /// Owns floating point state that must survive switches
        const USE_FP = 0x010;
        /// May be switched out on interrupt return
        const PREEMPTIBLE = 0x020;
        /// Must never be terminated
        const ESSENTIAL = 0x200;
        /// Skip the metrics update on the next switch out
        const NO_METRICS = 0x400;
    }
}

impl ContextFlags {
    /// Class marker for fibers: no bit set
    pub const FIBER: ContextFlags = ContextFlags::empty();

    /// Flags an application may pass at creation time
    pub const CREATE_MASK: ContextFlags = ContextFlags::USE_FP
        .union(ContextFlags::ESSENTIAL)
        .union(ContextFlags::NO_METRICS);

    pub const fn is_task(self) -> bool {
        self.contains(Self::TASK)
    }

    pub const fn is_fiber(self) -> bool {
        !self.is_task()
    }

    /// True while an interrupt or exception handler runs on top of the context
    pub const fn in_handler(self) -> bool {
        self.intersects(Self::INT_ACTIVE.union(Self::EXC_ACTIVE))
    }
}

impl fmt::Display for ContextFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.is_task() { "TASK" } else { "FIBER" })?;
        for (name, _) in self.difference(Self::TASK).iter_names() {
            write!(f, "|{name}")?;
        }
        Ok(())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ContextFlags {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "ContextFlags({=u32:#x})", self.bits());
    }
}

/// Lifecycle state of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Runnable, waiting in the fiber list or the task slot
    Ready,
    /// Currently executing
    Running,
    /// Owned by whichever subsystem blocked it
    Blocked,
    /// Permanently removed; the slot is pending release
    Terminated,
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextState::Ready => write!(f, "READY"),
            ContextState::Running => write!(f, "RUNNING"),
            ContextState::Blocked => write!(f, "BLOCKED"),
            ContextState::Terminated => write!(f, "TERMINATED"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ContextState {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            ContextState::Ready => defmt::write!(fmt, "READY"),
            ContextState::Running => defmt::write!(fmt, "RUNNING"),
            ContextState::Blocked => defmt::write!(fmt, "BLOCKED"),
            ContextState::Terminated => defmt::write!(fmt, "TERMINATED"),
        }
    }
}

/// Read-only view of one context, as handed out by the monitor list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextInfo {
    pub id: ContextId,
    pub flags: ContextFlags,
    pub priority: Priority,
    pub state: ContextState,
    /// Times the context was switched in
    pub switches: u32,
    /// Cycles spent running, as seen by the port's cycle counter
    pub cycles: u32,
}

#[cfg(feature = "defmt")]
impl defmt::Format for ContextInfo {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "{} {} {} {} switches={} cycles={}",
            self.id,
            self.flags,
            self.priority,
            self.state,
            self.switches,
            self.cycles
        );
    }
}
