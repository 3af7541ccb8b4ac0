//! Trace record kinds and their payload layouts.
//!
//! Context references in payloads are slot indices; `NONE` stands for "no
//! context". Multi-byte values are little endian.

use core::fmt;

/// Payload byte standing for "no context".
pub const NONE: u8 = 0xFF;

/// Why the outgoing context gave up the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SwapReason {
    Yield = 0,
    Block = 1,
    Terminate = 2,
    Preempt = 3,
}

impl SwapReason {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(SwapReason::Yield),
            1 => Some(SwapReason::Block),
            2 => Some(SwapReason::Terminate),
            3 => Some(SwapReason::Preempt),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            SwapReason::Yield => "yield",
            SwapReason::Block => "block",
            SwapReason::Terminate => "terminate",
            SwapReason::Preempt => "preempt",
        }
    }
}

/// Kind of a trace record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordKind {
    /// `[from, to, reason]`
    Swap = 1,
    /// `[from, to]`, switch on interrupt return
    Preempt = 2,
    /// `[ctx, priority]`
    Ready = 3,
    /// `[ctx]`
    Block = 4,
    /// `[ctx]`
    TaskSet = 5,
    /// `[ctx, priority, flags:u16]`
    Create = 6,
    /// `[ctx]`
    Terminate = 7,
    /// `[nesting]`
    IsrEnter = 8,
    /// `[nesting, switched]`
    IsrExit = 9,
    /// `[]`
    Idle = 10,
    /// `[max:u32, min:u32, samples:u32]`
    Latency = 11,
    /// `[reason]`
    Fatal = 12,
    /// `[version.., 0, endianness, word size, max contexts, target.., 0]`
    TargetInfo = 63,
}

impl RecordKind {
    pub fn from_u8(raw: u8) -> Option<Self> {
        use RecordKind::*;
        Some(match raw {
            1 => Swap,
            2 => Preempt,
            3 => Ready,
            4 => Block,
            5 => TaskSet,
            6 => Create,
            7 => Terminate,
            8 => IsrEnter,
            9 => IsrExit,
            10 => Idle,
            11 => Latency,
            12 => Fatal,
            63 => TargetInfo,
            _ => return None,
        })
    }

    pub const fn name(self) -> &'static str {
        match self {
            RecordKind::Swap => "SWAP",
            RecordKind::Preempt => "PREEMPT",
            RecordKind::Ready => "READY",
            RecordKind::Block => "BLOCK",
            RecordKind::TaskSet => "TASK_SET",
            RecordKind::Create => "CREATE",
            RecordKind::Terminate => "TERMINATE",
            RecordKind::IsrEnter => "ISR_ENTER",
            RecordKind::IsrExit => "ISR_EXIT",
            RecordKind::Idle => "IDLE",
            RecordKind::Latency => "LATENCY",
            RecordKind::Fatal => "FATAL",
            RecordKind::TargetInfo => "TARGET_INFO",
        }
    }

    /// Records that bypass the filter
    pub const fn is_non_maskable(self) -> bool {
        matches!(self, RecordKind::TargetInfo | RecordKind::Fatal)
    }

    /// Bit used in the filter mask
    pub const fn mask(self) -> u64 {
        1u64 << (self as u8)
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for RecordKind {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{=str}", self.name());
    }
}
