#![no_std]
#![forbid(unsafe_code)]

//! # nanok core
//!
//! Vocabulary shared by every nanok crate: context handles, flags, states and
//! priorities, the recoverable error type, and the fatal path taken on
//! contract violations.

#[cfg(feature = "std")]
extern crate std;

use core::fmt;

pub mod config;
pub mod context;
pub mod fatal;
pub mod priority;

pub use context::*;
pub use fatal::{FatalInfo, FatalReason};
pub use priority::Priority;

/// nanok version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type used throughout nanok
pub type KResult<T> = Result<T, KernelError>;

/// Recoverable errors reported by kernel operations.
///
/// Contract violations never show up here; they take the fatal path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Every descriptor slot is in use
    ArenaFull,
    /// Handle refers to a slot that was released or reused
    StaleHandle,
    /// Priority is reserved or out of range
    InvalidPriority,
    /// The single task slot already holds another task
    TaskSlotOccupied,
    /// Operation needs a blocked context
    NotBlocked,
    /// Operation needs a task context
    NotTask,
    /// Operation needs a fiber context
    NotFiber,
    /// Interrupt line number is beyond the table
    IrqOutOfRange,
    /// No free handler slot left on the interrupt line
    IrqTableFull,
    /// Kernel state has not been initialized yet
    NotInitialized,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::ArenaFull => write!(f, "Context arena is full"),
            KernelError::StaleHandle => write!(f, "Stale context handle"),
            KernelError::InvalidPriority => write!(f, "Invalid priority level"),
            KernelError::TaskSlotOccupied => write!(f, "Task slot is already occupied"),
            KernelError::NotBlocked => write!(f, "Context is not blocked"),
            KernelError::NotTask => write!(f, "Context is not a task"),
            KernelError::NotFiber => write!(f, "Context is not a fiber"),
            KernelError::IrqOutOfRange => write!(f, "Interrupt number out of range"),
            KernelError::IrqTableFull => write!(f, "Interrupt line has no free handler slot"),
            KernelError::NotInitialized => write!(f, "Kernel is not initialized"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for KernelError {}

#[cfg(feature = "defmt")]
impl defmt::Format for KernelError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            KernelError::ArenaFull => defmt::write!(fmt, "ArenaFull"),
            KernelError::StaleHandle => defmt::write!(fmt, "StaleHandle"),
            KernelError::InvalidPriority => defmt::write!(fmt, "InvalidPriority"),
            KernelError::TaskSlotOccupied => defmt::write!(fmt, "TaskSlotOccupied"),
            KernelError::NotBlocked => defmt::write!(fmt, "NotBlocked"),
            KernelError::NotTask => defmt::write!(fmt, "NotTask"),
            KernelError::NotFiber => defmt::write!(fmt, "NotFiber"),
            KernelError::IrqOutOfRange => defmt::write!(fmt, "IrqOutOfRange"),
            KernelError::IrqTableFull => defmt::write!(fmt, "IrqTableFull"),
            KernelError::NotInitialized => defmt::write!(fmt, "NotInitialized"),
        }
    }
}
