//! Selection policy, preemption rules and the idle fallback, driven
//! through the public kernel API on the simulated CPU.

mod common;

use common::*;
use nanok_kernel::{ContextFlags, ContextState, Port};

#[test]
fn boot_task_runs_after_init() {
    let (k, boot) = boot();
    let snap = k.snapshot().unwrap();
    assert_eq!(snap.current, boot.boot);
    assert_eq!(snap.task, Some(boot.boot));
    assert_eq!(snap.idle, boot.idle);
    assert!(snap.fibers.is_empty());
    assert_eq!(snap.flags, ContextFlags::TASK | ContextFlags::ESSENTIAL);
    assert_eq!(k.state_of(boot.boot), Ok(ContextState::Running));
    assert_eq!(k.state_of(boot.idle), Ok(ContextState::Ready));
}

#[test]
fn creating_a_fiber_does_not_switch() {
    let (k, boot) = boot();
    let f = fiber(&k, 1);
    assert_eq!(current(&k), boot.boot);
    assert_eq!(k.snapshot().unwrap().fibers.as_slice(), &[f]);
}

#[test]
fn task_swap_runs_queued_fiber() {
    let (k, boot) = boot();
    let f = fiber(&k, 4);
    swap(&k);
    assert_eq!(current(&k), f);
    assert_eq!(k.state_of(boot.boot), Ok(ContextState::Ready));
    assert_eq!(k.task(), Some(boot.boot));
}

#[test]
fn task_swap_without_fibers_is_a_no_op() {
    let (k, boot) = boot();
    assert_eq!(swap(&k), 0);
    assert_eq!(current(&k), boot.boot);
    assert!(!k.port().irqs_locked());
}

#[test]
fn fibers_run_most_urgent_first() {
    let (k, _) = boot();
    let low = fiber(&k, 6);
    let high = fiber(&k, 1);
    let mid = fiber(&k, 3);
    assert_eq!(k.snapshot().unwrap().fibers.as_slice(), &[high, mid, low]);

    swap(&k);
    assert_eq!(current(&k), high);
    pend(&k);
    assert_eq!(current(&k), mid);
    pend(&k);
    assert_eq!(current(&k), low);
}

#[test]
fn equal_priorities_are_fifo() {
    let (k, _) = boot();
    let a = fiber(&k, 2);
    let b = fiber(&k, 2);
    let c = fiber(&k, 2);

    swap(&k);
    assert_eq!(current(&k), a);
    pend(&k);
    assert_eq!(current(&k), b);
    pend(&k);
    assert_eq!(current(&k), c);
}

#[test]
fn yield_rotates_among_equal_fibers() {
    let (k, _) = boot();
    let a = fiber(&k, 2);
    let b = fiber(&k, 2);
    swap(&k);
    assert_eq!(current(&k), a);

    k.yield_fiber();
    assert_eq!(current(&k), b);
    assert_eq!(k.snapshot().unwrap().fibers.as_slice(), &[a]);
    k.yield_fiber();
    assert_eq!(current(&k), a);
}

#[test]
fn yield_keeps_cpu_when_only_less_urgent_fibers_wait() {
    let (k, _) = boot();
    let a = fiber(&k, 1);
    let b = fiber(&k, 5);
    swap(&k);
    assert_eq!(current(&k), a);

    k.yield_fiber();
    assert_eq!(current(&k), a);
    assert_eq!(k.state_of(a), Ok(ContextState::Running));
    assert_eq!(k.snapshot().unwrap().fibers.as_slice(), &[b]);
}

#[test]
fn running_fiber_swap_ignores_equal_priority() {
    let (k, _) = boot();
    let a = fiber(&k, 3);
    let _b = fiber(&k, 3);
    swap(&k);
    assert_eq!(current(&k), a);
    assert_eq!(swap(&k), 0);
    assert_eq!(current(&k), a);
}

#[test]
fn fiber_is_not_preempted_by_interrupt() {
    let (k, _) = boot();
    let urgent = fiber(&k, 1);
    let worker = fiber(&k, 5);

    swap(&k);
    assert_eq!(current(&k), urgent);
    pend(&k);
    assert_eq!(current(&k), worker);

    let switched = interrupt(&k, || k.ready(urgent).unwrap());
    assert!(!switched);
    assert_eq!(current(&k), worker);
    assert_eq!(k.port().switch_requests(), 0);

    // the worker finishes its critical section, then yields
    k.port().advance(500);
    k.yield_fiber();
    assert_eq!(current(&k), urgent);
}

#[test]
fn task_is_preempted_on_interrupt_return() {
    let (k, boot) = boot();
    let f = fiber(&k, 7);
    swap(&k);
    pend(&k);
    assert_eq!(current(&k), boot.boot);

    let switched = interrupt(&k, || k.ready(f).unwrap());
    assert!(switched);
    assert_eq!(current(&k), f);
    assert_eq!(k.port().switch_requests(), 1);
    assert_eq!(k.state_of(boot.boot), Ok(ContextState::Ready));

    pend(&k);
    assert_eq!(current(&k), boot.boot);
}

#[test]
fn interrupt_without_new_work_does_not_switch() {
    let (k, boot) = boot();
    assert!(!interrupt(&k, || {}));
    assert_eq!(current(&k), boot.boot);
    assert!(!k.current_flags().contains(ContextFlags::INT_ACTIVE));
}

#[test]
fn interrupt_flag_tracks_handler_nesting() {
    let (k, _) = boot();
    k.isr_enter();
    assert!(k.current_flags().contains(ContextFlags::INT_ACTIVE));
    k.isr_enter();
    assert_eq!(k.snapshot().unwrap().irq_nesting, 2);
    assert!(!k.isr_exit());
    assert!(k.current_flags().contains(ContextFlags::INT_ACTIVE));
    assert!(!k.isr_exit());
    assert!(!k.current_flags().contains(ContextFlags::INT_ACTIVE));
}

#[test]
fn only_outermost_handler_switches() {
    let (k, boot) = boot();
    let f = fiber(&k, 2);
    swap(&k);
    pend(&k);
    assert_eq!(current(&k), boot.boot);

    k.isr_enter();
    k.isr_enter();
    k.ready(f).unwrap();
    assert!(!k.isr_exit());
    assert_eq!(current(&k), boot.boot);
    assert!(k.isr_exit());
    assert_eq!(current(&k), f);
}

#[test]
fn exception_defers_preemption() {
    let (k, boot) = boot();
    let f = fiber(&k, 2);
    swap(&k);
    pend(&k);

    k.exc_enter();
    assert!(k.current_flags().contains(ContextFlags::EXC_ACTIVE));
    assert!(!interrupt(&k, || k.ready(f).unwrap()));
    assert_eq!(current(&k), boot.boot);
    k.exc_exit();
    assert!(!k.current_flags().contains(ContextFlags::EXC_ACTIVE));

    // picked up at the next switch point
    swap(&k);
    assert_eq!(current(&k), f);
}

#[test]
fn idle_runs_when_nothing_else_can() {
    let (k, boot) = boot();
    pend(&k);
    assert_eq!(current(&k), boot.idle);
    assert_eq!(k.state_of(boot.boot), Ok(ContextState::Blocked));
    assert_eq!(k.task(), None);
}

#[test]
fn idle_selected_for_a_thousand_swaps() {
    let (k, boot) = boot();
    pend(&k);
    for _ in 0..1000 {
        assert_eq!(swap(&k), 0);
        assert_eq!(current(&k), boot.idle);
        assert!(!k.port().irqs_locked());
    }
    for n in 1..=1000 {
        assert!(!k.idle_once());
        assert_eq!(k.port().idle_calls(), n);
        assert_eq!(current(&k), boot.idle);
    }
}

#[test]
fn idle_loop_switches_to_new_work() {
    let (k, boot) = boot();
    pend(&k);
    let f = fiber(&k, 3);
    assert!(k.idle_once());
    assert_eq!(current(&k), f);
    assert_eq!(k.state_of(boot.idle), Ok(ContextState::Ready));
    assert_eq!(k.port().idle_calls(), 0);
}

#[test]
fn idle_ticks_clear_on_interrupt() {
    let (k, _) = boot();
    pend(&k);
    k.idle_once();
    assert_eq!(k.idle_ticks(), nanok_kernel::kernel::IDLE_FOREVER);
    interrupt(&k, || {});
    assert_eq!(k.idle_ticks(), 0);
}

#[test]
fn set_task_substitutes_the_task_slot() {
    let (k, boot) = boot();
    pend(&k);
    let t1 = k
        .create_task(nanok_kernel::ContextConfig::new(prio(0), context_main, stack()))
        .unwrap();
    assert!(k.idle_once());
    assert_eq!(current(&k), t1);

    k.set_task(Some(boot.boot)).unwrap();
    assert_eq!(k.state_of(t1), Ok(ContextState::Blocked));
    assert_eq!(k.state_of(boot.boot), Ok(ContextState::Ready));
    swap(&k);
    assert_eq!(current(&k), boot.boot);
    assert_eq!(k.task(), Some(boot.boot));
}

#[test]
fn handler_substituting_the_running_task_switches_on_return() {
    let (k, boot) = boot();
    pend(&k);
    let t1 = k
        .create_task(nanok_kernel::ContextConfig::new(prio(0), context_main, stack()))
        .unwrap();
    assert!(k.idle_once());
    assert_eq!(current(&k), t1);

    let switched = interrupt(&k, || k.set_task(Some(boot.boot)).unwrap());
    assert!(switched);
    assert_eq!(current(&k), boot.boot);
    assert_eq!(k.state_of(boot.boot), Ok(ContextState::Running));
    assert_eq!(k.state_of(t1), Ok(ContextState::Blocked));
    assert_eq!(k.task(), Some(boot.boot));

    // emptying the slot from a handler hands the CPU to idle
    let switched = interrupt(&k, || k.set_task(None).unwrap());
    assert!(switched);
    assert_eq!(k.current(), k.idle_context());
    assert_eq!(k.state_of(boot.boot), Ok(ContextState::Blocked));
}

#[test]
fn set_task_rejects_fibers() {
    let (k, _) = boot();
    let f = fiber(&k, 1);
    assert_eq!(k.set_task(Some(f)), Err(nanok_kernel::KernelError::NotTask));
}

#[test]
fn dequeued_fiber_is_skipped_until_requeued() {
    let (k, boot) = boot();
    let f = fiber(&k, 1);
    assert_eq!(k.dequeue_fiber(f), Ok(true));
    assert_eq!(k.dequeue_fiber(f), Ok(false));
    assert_eq!(k.state_of(f), Ok(ContextState::Blocked));
    swap(&k);
    assert_eq!(current(&k), boot.boot);

    k.enqueue_fiber(f).unwrap();
    swap(&k);
    assert_eq!(current(&k), f);
    assert_eq!(k.enqueue_fiber(boot.boot), Err(nanok_kernel::KernelError::NotFiber));
}

// Two fibers block, an interrupt wakes the more urgent one, then the other.
// The more urgent fiber runs first, then the other, then the task.
#[test]
fn scenario_interrupt_wakes_two_fibers() {
    let (k, boot) = boot();
    let f1 = fiber(&k, 5);
    let f2 = fiber(&k, 3);

    // both fibers get to run once and block
    swap(&k);
    assert_eq!(current(&k), f2);
    pend(&k);
    assert_eq!(current(&k), f1);
    pend(&k);
    assert_eq!(current(&k), boot.boot);
    assert_eq!(k.state_of(f1), Ok(ContextState::Blocked));
    assert_eq!(k.state_of(f2), Ok(ContextState::Blocked));

    let switched = interrupt(&k, || {
        k.wake(f2, 2).unwrap();
        k.wake(f1, 1).unwrap();
    });
    assert!(switched);
    assert_eq!(current(&k), f2);
    assert_eq!(k.port().reg(0), 2);

    k.terminate(f2).unwrap();
    assert_eq!(current(&k), f1);
    assert_eq!(k.port().reg(0), 1);

    k.terminate(f1).unwrap();
    assert_eq!(current(&k), boot.boot);
}

#[test]
fn priority_beats_wake_order() {
    let (k, boot) = boot();
    let low = fiber(&k, 5);
    let high = fiber(&k, 3);
    swap(&k);
    pend(&k);
    pend(&k);
    assert_eq!(current(&k), boot.boot);

    assert!(interrupt(&k, || {
        k.ready(low).unwrap();
        k.ready(high).unwrap();
    }));
    assert_eq!(current(&k), high);
    assert_eq!(k.snapshot().unwrap().fibers.as_slice(), &[low]);
}

#[test]
fn scenario_same_priority_wakes_follow_wake_order() {
    let (k, boot) = boot();
    let f1 = fiber(&k, 4);
    let f2 = fiber(&k, 4);
    swap(&k);
    pend(&k);
    pend(&k);
    assert_eq!(current(&k), boot.boot);

    assert!(interrupt(&k, || {
        k.ready(f2).unwrap();
        k.ready(f1).unwrap();
    }));
    assert_eq!(current(&k), f2);
    pend(&k);
    assert_eq!(current(&k), f1);
    pend(&k);
    assert_eq!(current(&k), boot.boot);
}

// The only task blocks with no fiber around: idle takes over, and the
// interrupt that wakes the task preempts idle on its way out.
#[test]
fn scenario_idle_fallback_and_wakeup() {
    let (k, boot) = boot();
    pend(&k);
    assert_eq!(current(&k), boot.idle);
    assert!(!k.idle_once());

    let switched = interrupt(&k, || k.wake(boot.boot, 0x5A).unwrap());
    assert!(switched);
    assert_eq!(current(&k), boot.boot);
    assert_eq!(k.port().reg(0), 0x5A);
    assert_eq!(k.state_of(boot.idle), Ok(ContextState::Ready));
}
