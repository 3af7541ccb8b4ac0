//! Interrupt-lock latency as seen through the kernel's lock calls. The
//! simulated cycle counter only moves when a test advances it, so the
//! calibrated overhead is zero and samples are exact.
#![cfg(feature = "latency")]

mod common;

use common::*;
use nanok_kernel::LatencyReport;

#[test]
fn lock_window_is_measured() {
    let (k, _) = boot();
    assert_eq!(k.take_latency_report(), LatencyReport::EMPTY);

    let key = k.irq_lock();
    k.port().advance(250);
    k.irq_unlock(key);

    let report = k.latency_report();
    assert_eq!(report, LatencyReport { min: 250, max: 250, samples: 1 });
}

#[test]
fn nested_locks_make_one_sample() {
    let (k, _) = boot();
    k.take_latency_report();

    let outer = k.irq_lock();
    k.port().advance(10);
    let inner = k.irq_lock();
    k.port().advance(20);
    k.irq_unlock(inner);
    k.port().advance(5);
    k.irq_unlock(outer);

    let short = k.irq_lock();
    k.port().advance(3);
    k.irq_unlock(short);

    assert_eq!(k.take_latency_report(), LatencyReport { min: 3, max: 35, samples: 2 });
    assert_eq!(k.latency_report(), LatencyReport::EMPTY);
}

#[test]
fn switch_closes_the_window() {
    let (k, _) = boot();
    let f = fiber(&k, 1);
    k.take_latency_report();

    let key = k.irq_lock();
    k.port().advance(40);
    k.swap(key);
    // the fiber starts with interrupts open; nothing else was counted
    k.port().advance(1000);
    assert_eq!(k.latency_report(), LatencyReport { min: 40, max: 40, samples: 1 });
    assert_eq!(current(&k), f);
}

#[test]
fn switch_under_an_outer_lock_closes_every_level() {
    let (k, boot) = boot();
    let f = fiber(&k, 1);
    k.take_latency_report();

    let outer = k.irq_lock();
    k.port().advance(10);
    let inner = k.irq_lock();
    k.port().advance(15);
    k.swap(inner);
    assert_eq!(k.latency_report(), LatencyReport { min: 25, max: 25, samples: 1 });

    // the fiber measures its own windows separately
    let key = k.irq_lock();
    k.port().advance(4);
    k.irq_unlock(key);
    assert_eq!(k.latency_report(), LatencyReport { min: 4, max: 25, samples: 2 });
    assert_eq!(current(&k), f);

    // back in the boot task, its outer unlock adds nothing
    pend(&k);
    let before = k.latency_report();
    k.irq_unlock(outer);
    assert_eq!(k.latency_report(), before);
    assert_eq!(before.max, 25);
    assert_eq!(current(&k), boot.boot);
}

#[test]
fn idle_wait_closes_the_window() {
    let (k, boot) = boot();
    pend(&k);
    assert_eq!(current(&k), boot.idle);
    k.take_latency_report();

    assert!(!k.idle_once());
    k.port().advance(500);
    let report = k.take_latency_report();
    assert_eq!(report.samples, 1);
    assert_eq!(report.max, 0);
}
