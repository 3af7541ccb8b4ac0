//! PendSV trampoline and the register save/restore helpers it calls.
//!
//! The helpers use a private calling convention so PendSV can call them
//! without touching the stack:
//! * `save`: r0 = descriptor, r1 = EXC_RETURN; clobbers r12
//! * `restore`: r0 = descriptor; returns EXC_RETURN in r1 and the
//!   descriptor's BASEPRI in r3, clobbers r12
//!
//! Both preserve r2.

use core::arch::{asm, naked_asm};
use core::mem::offset_of;
use core::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use nanok_core::config::IRQ_LOCK_LEVEL;

use crate::{ArchContext, NoCoopRegs};

type Ctx = ArchContext<NoCoopRegs>;

/// Descriptor whose registers are live, the one PendSV loads next, and
/// whether PendSV still has to run.
#[repr(C)]
struct SwitchRequest {
    running: AtomicPtr<Ctx>,
    next: AtomicPtr<Ctx>,
    in_flight: AtomicBool,
}

static SWITCH: SwitchRequest = SwitchRequest {
    running: AtomicPtr::new(core::ptr::null_mut()),
    next: AtomicPtr::new(core::ptr::null_mut()),
    in_flight: AtomicBool::new(false),
};

const _: () = assert!(offset_of!(Ctx, preempt) == 0);

/// Record a switch for PendSV to carry out.
///
/// While an earlier request is in flight the registers on the CPU still
/// belong to whatever `running` points at, so only the destination
/// changes. That holds from the request until PendSV has masked interrupts
/// and saved, including the first instructions of PendSV itself.
///
/// # Safety
/// Interrupts must be locked.
pub(super) unsafe fn request(from: *mut Ctx, to: *const Ctx) {
    if !SWITCH.in_flight.load(Ordering::Relaxed) {
        SWITCH.running.store(from, Ordering::Relaxed);
        SWITCH.in_flight.store(true, Ordering::Relaxed);
    }
    SWITCH.next.store(to as *mut Ctx, Ordering::Release);
}

/// True between a request and the end of PendSV's save.
pub(super) fn in_flight() -> bool {
    SWITCH.in_flight.load(Ordering::Acquire)
}

/// Capture r4-r11 and PSP into `ctx` from thread mode.
///
/// # Safety
/// `ctx` must be valid for writes.
pub(super) unsafe fn save(ctx: *mut Ctx, exc_return: usize) {
    // SAFETY: `save_nv` only writes into `ctx` and clobbers r12/lr
    unsafe {
        asm!(
            "bl {save}",
            save = sym save_nv,
            in("r0") ctx,
            in("r1") exc_return,
            out("r12") _,
            out("lr") _,
        );
    }
}

#[unsafe(naked)]
unsafe extern "C" fn save_nv() {
    naked_asm!(
        "mrs r12, psp",
        "stmia r0, {{r4-r11}}",
        "str r12, [r0, #{sp}]",
        "str r1, [r0, #{exc}]",
        "bx lr",
        sp = const offset_of!(Ctx, preempt.sp),
        exc = const offset_of!(Ctx, exc_return),
    );
}

#[unsafe(naked)]
unsafe extern "C" fn restore_nv() {
    naked_asm!(
        "ldmia r0, {{r4-r11}}",
        "ldr r12, [r0, #{sp}]",
        "msr psp, r12",
        "ldr r3, [r0, #{basepri}]",
        "ldr r1, [r0, #{exc}]",
        "bx lr",
        sp = const offset_of!(Ctx, preempt.sp),
        basepri = const offset_of!(Ctx, basepri),
        exc = const offset_of!(Ctx, exc_return),
    );
}

/// Context switch exception handler.
///
/// Masks kernel interrupts, saves the running descriptor, makes `next` the
/// running one and loads it. The new context's BASEPRI is applied only
/// once its registers are in place; the exception return then pops its
/// hardware frame.
#[unsafe(no_mangle)]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "movs r3, #{level}",
        "msr basepri, r3",
        "isb",
        "ldr r2, ={switch}",
        "ldr r0, [r2, #{running}]",
        "mov r1, lr",
        "bl {save}",
        "ldr r0, [r2, #{next}]",
        "str r0, [r2, #{running}]",
        "movs r3, #0",
        "strb r3, [r2, #{in_flight}]",
        "bl {restore}",
        "msr basepri, r3",
        "isb",
        "bx r1",
        level = const IRQ_LOCK_LEVEL,
        switch = sym SWITCH,
        running = const offset_of!(SwitchRequest, running),
        next = const offset_of!(SwitchRequest, next),
        in_flight = const offset_of!(SwitchRequest, in_flight),
        save = sym save_nv,
        restore = sym restore_nv,
    );
}
