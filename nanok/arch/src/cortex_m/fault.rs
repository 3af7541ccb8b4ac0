//! Fault exception handlers.
//!
//! Every configurable fault is routed to the fatal path together with what
//! the fault status registers say about it.

use cortex_m::peripheral::SCB;
use cortex_m_rt::{exception, ExceptionFrame};

use nanok_core::fatal::{fatal_error, FatalInfo, FatalReason};

const HARD_FAULT: u8 = 3;
const MEM_MANAGE: u8 = 4;
const BUS_FAULT: u8 = 5;
const USAGE_FAULT: u8 = 6;

const HFSR_FORCED: u32 = 1 << 30;
const UFSR_DIVBYZERO: u32 = 1 << 25;
const UFSR_UNALIGNED: u32 = 1 << 24;
const UFSR_UNDEFINSTR: u32 = 1 << 16;
const MMFSR_MSTKERR: u32 = 1 << 4;
const BFSR_STKERR: u32 = 1 << 12;

fn describe(cfsr: u32, hfsr: u32) -> &'static str {
    if cfsr & (MMFSR_MSTKERR | BFSR_STKERR) != 0 {
        "stacking error, probable stack overflow"
    } else if cfsr & UFSR_DIVBYZERO != 0 {
        "divide by zero"
    } else if cfsr & UFSR_UNALIGNED != 0 {
        "unaligned access"
    } else if cfsr & UFSR_UNDEFINSTR != 0 {
        "undefined instruction"
    } else if cfsr & 0x0000_00FF != 0 {
        "memory management fault"
    } else if cfsr & 0x0000_FF00 != 0 {
        "bus fault"
    } else if cfsr & 0xFFFF_0000 != 0 {
        "usage fault"
    } else if hfsr & HFSR_FORCED != 0 {
        "escalated fault"
    } else {
        "hard fault"
    }
}

fn status() -> (u32, u32) {
    // SAFETY: read-only access to the fault status registers
    unsafe { ((*SCB::PTR).cfsr.read(), (*SCB::PTR).hfsr.read()) }
}

fn raise(exception: u8, pc: Option<u32>) -> ! {
    let (cfsr, hfsr) = status();
    let mut info = FatalInfo::new(FatalReason::CpuException(exception))
        .with_message(describe(cfsr, hfsr));
    if let Some(pc) = pc {
        info = info.with_pc(pc as usize);
    }
    fatal_error(info)
}

#[exception]
unsafe fn HardFault(frame: &ExceptionFrame) -> ! {
    raise(HARD_FAULT, Some(frame.pc()))
}

#[exception]
fn MemoryManagement() -> ! {
    raise(MEM_MANAGE, None)
}

#[exception]
fn BusFault() -> ! {
    raise(BUS_FAULT, None)
}

#[exception]
fn UsageFault() -> ! {
    raise(USAGE_FAULT, None)
}
