//! Selection policy.
//!
//! Fibers always win over the task, the most urgent fiber first and in
//! arrival order among equals. The idle context runs only when neither a
//! fiber nor the task can.

use nanok_arch::CoopRegs;
use nanok_core::{ContextFlags, ContextState};

use crate::state::KernelState;

/// Context the scheduler would hand the CPU to right now.
pub(crate) fn select<C: CoopRegs>(state: &KernelState<C>) -> Option<u8> {
    state.fiber.or(state.task).or(state.idle)
}

/// Whether a running context gives up the CPU at a cooperative switch point.
///
/// A running fiber yields only to a strictly more urgent fiber, the task to
/// any fiber, and the idle context to anything runnable. Contexts that are
/// no longer running always switch.
pub(crate) fn should_switch<C: CoopRegs>(state: &KernelState<C>, cur: u8) -> bool {
    let desc = state.desc(cur);
    match desc.state {
        ContextState::Running => {
            if state.is_idle(cur) {
                state.has_runnable()
            } else if desc.flags.is_task() {
                state.fiber.is_some()
            } else {
                match state.fiber {
                    Some(head) => state.desc(head).priority.is_more_urgent_than(desc.priority),
                    None => false,
                }
            }
        }
        _ => true,
    }
}

/// Whether an interrupt return should switch away from `cur`.
///
/// Fibers are never preempted; the task and preemptible contexts are, as
/// soon as the policy prefers someone else. A task the handler displaced
/// from the task slot is no longer running and always leaves.
pub(crate) fn should_preempt<C: CoopRegs>(state: &KernelState<C>, cur: u8) -> bool {
    let desc = state.desc(cur);
    if desc.state != ContextState::Running {
        return true;
    }
    if !desc.flags.is_task() && !desc.flags.contains(ContextFlags::PREEMPTIBLE) {
        return false;
    }
    select(state) != Some(cur)
}
