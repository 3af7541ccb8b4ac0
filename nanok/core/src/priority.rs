//! Context priorities.

use core::fmt;
use crate::{KResult, KernelError};

/// Scheduling priority of a fiber.
///
/// Lower numeric values are more urgent, so the derived `Ord` sorts the most
/// urgent priority first. `Priority::IDLE` is reserved for the idle fiber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(u8);

impl Priority {
    /// Most urgent priority
    pub const HIGHEST: Priority = Priority(0);

    /// Least urgent priority available to applications
    pub const LOWEST: Priority = Priority(u8::MAX - 1);

    /// Reserved for the idle fiber
    pub const IDLE: Priority = Priority(u8::MAX);

    /// Create a new priority, rejecting the reserved idle level
    pub fn new(priority: u8) -> KResult<Self> {
        if priority == Self::IDLE.0 {
            Err(KernelError::InvalidPriority)
        } else {
            Ok(Priority(priority))
        }
    }

    /// Create priority without validation (const fn)
    pub const fn new_unchecked(priority: u8) -> Self {
        Priority(priority)
    }

    /// Get the raw priority value
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// True if `self` must run before `other`
    pub const fn is_more_urgent_than(self, other: Priority) -> bool {
        self.0 < other.0
    }

    pub const fn is_idle(self) -> bool {
        self.0 == Self::IDLE.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::LOWEST
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_idle() {
            write!(f, "Priority(idle)")
        } else {
            write!(f, "Priority({})", self.0)
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Priority {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Priority({})", self.0);
    }
}
