//! Compile-time configuration.
//!
//! Sizes are fixed at build time; nothing in the kernel allocates.

/// Number of context descriptor slots, idle fiber and boot task included.
pub const MAX_CONTEXTS: usize = 16;

/// Interrupt lines known to the shared-interrupt table.
pub const NUM_IRQS: usize = 48;

/// Handlers that may share one interrupt line.
pub const MAX_SHARED_HANDLERS: usize = 4;

/// BASEPRI value used by `irq_lock`.
///
/// Interrupts at this priority or numerically above are masked. Handlers
/// that call into the kernel must be configured at or below this urgency.
pub const IRQ_LOCK_LEVEL: u8 = 0x20;

/// Interrupt stack size in bytes.
pub const INTERRUPT_STACK_SIZE: usize = 2048;

/// Stack of the idle fiber in the target build, in bytes.
pub const IDLE_STACK_SIZE: usize = 512;

/// Trace ring buffer size in bytes.
pub const TRACE_BUFFER_SIZE: usize = 1024;

/// Value a suspended `swap` returns when nobody patched its return slot.
pub const SWAP_DEFAULT_RETURN: u32 = 0;

/// Warm-up passes used when calibrating the latency benchmark.
pub const LATENCY_CALIBRATION_PASSES: usize = 2;
