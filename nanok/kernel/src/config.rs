//! Creation parameters and read-only views handed out by the kernel.

use heapless::Vec;
use nanok_arch::{ContextEntry, StackRegion};
use nanok_core::config::MAX_CONTEXTS;
use nanok_core::{ContextFlags, ContextId, Priority};

/// Configuration for creating a fiber or task.
///
/// ```rust,ignore
/// let cfg = ContextConfig::new(Priority::new(3)?, worker, stack)
///     .with_arg(7)
///     .with_options(ContextFlags::USE_FP);
/// let id = kernel.create_fiber(cfg)?;
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ContextConfig {
    pub priority: Priority,
    pub entry: ContextEntry,
    pub stack: StackRegion,
    /// Passed to `entry`
    pub arg: usize,
    /// Only flags in `ContextFlags::CREATE_MASK` are honoured
    pub options: ContextFlags,
    pub custom_data: usize,
}

impl ContextConfig {
    pub fn new(priority: Priority, entry: ContextEntry, stack: StackRegion) -> Self {
        Self {
            priority,
            entry,
            stack,
            arg: 0,
            options: ContextFlags::empty(),
            custom_data: 0,
        }
    }

    pub fn with_arg(mut self, arg: usize) -> Self {
        self.arg = arg;
        self
    }

    pub fn with_options(mut self, options: ContextFlags) -> Self {
        self.options = options;
        self
    }

    pub fn with_custom_data(mut self, data: usize) -> Self {
        self.custom_data = data;
        self
    }
}

/// The idle fiber's stack and loop.
#[derive(Debug, Clone, Copy)]
pub struct IdleConfig {
    pub stack: StackRegion,
    pub entry: ContextEntry,
}

/// Handles created by `Kernel::init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootContexts {
    /// The context that called `init`, adopted as the task
    pub boot: ContextId,
    pub idle: ContextId,
}

/// Consistent picture of the scheduler, taken under the interrupt lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedSnapshot {
    pub current: ContextId,
    pub flags: ContextFlags,
    pub task: Option<ContextId>,
    pub idle: ContextId,
    /// Run queue, most urgent first
    pub fibers: Vec<ContextId, MAX_CONTEXTS>,
    pub irq_nesting: u32,
    pub idle_ticks: u32,
}
