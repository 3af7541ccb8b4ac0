#![no_std]

//! # nanok trace
//!
//! Binary trace of scheduling events. The kernel writes compact records
//! into a ring buffer under its interrupt lock; a host tool drains the
//! buffer over whatever link the board has and decodes it.
//!
//! ```rust,no_run
//! use nanok_trace::{init, record, RecordKind};
//!
//! init();
//! record(RecordKind::Swap, 1234, &[0, 2, 1]);
//! ```

use core::cell::RefCell;

use critical_section::Mutex;
use nanok_core::config::{MAX_CONTEXTS, TRACE_BUFFER_SIZE};

mod buffer;
mod record;

pub use buffer::{hdlc, TraceBuffer, MAX_PAYLOAD};
pub use record::{RecordKind, SwapReason, NONE};

// Global trace buffer instance
static TRACE_BUF: Mutex<RefCell<TraceBuffer<TRACE_BUFFER_SIZE>>> =
    Mutex::new(RefCell::new(TraceBuffer::new()));

/// Reset the global trace buffer and emit the target description.
pub fn init() {
    critical_section::with(|cs| {
        let mut buf = TRACE_BUF.borrow_ref_mut(cs);
        buf.init();
        buf.target_info(nanok_core::VERSION, target_name(), MAX_CONTEXTS as u8);
    });
}

/// Append one record to the global buffer.
pub fn record(kind: RecordKind, timestamp: u32, payload: &[u8]) -> bool {
    critical_section::with(|cs| TRACE_BUF.borrow_ref_mut(cs).record(kind, timestamp, payload))
}

/// Drain up to `buf.len()` framed bytes.
pub fn read(buf: &mut [u8]) -> usize {
    critical_section::with(|cs| TRACE_BUF.borrow_ref_mut(cs).read(buf))
}

pub fn available() -> usize {
    critical_section::with(|cs| TRACE_BUF.borrow_ref(cs).available())
}

pub fn dropped() -> u32 {
    critical_section::with(|cs| TRACE_BUF.borrow_ref(cs).dropped())
}

/// Enable or disable one record kind.
pub fn set_filter(kind: RecordKind, enable: bool) {
    critical_section::with(|cs| TRACE_BUF.borrow_ref_mut(cs).set_filter(kind, enable));
}

pub fn set_filter_mask(mask: u64) {
    critical_section::with(|cs| TRACE_BUF.borrow_ref_mut(cs).set_filter_mask(mask));
}

fn target_name() -> &'static str {
    if cfg!(target_arch = "arm") {
        "cortex-m"
    } else {
        "host"
    }
}
