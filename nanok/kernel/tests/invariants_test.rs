//! Random operation sequences against the scheduler's structural
//! invariants.

mod common;

use common::*;
use nanok_kernel::{ContextConfig, ContextId, ContextState, KernelError, Port, Priority};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

const STEPS: usize = 2_000;

struct Model {
    kernel: SimKernel,
    boot: ContextId,
    idle: ContextId,
    known: Vec<ContextId>,
}

impl Model {
    fn new() -> Self {
        let (kernel, contexts) = boot();
        Self {
            kernel,
            boot: contexts.boot,
            idle: contexts.idle,
            known: vec![contexts.boot, contexts.idle],
        }
    }

    fn pick(&self, rng: &mut SmallRng) -> ContextId {
        self.known[rng.gen_range(0..self.known.len())]
    }

    fn current_is_idle(&self) -> bool {
        current(&self.kernel) == self.idle
    }

    fn current_is_fiber(&self) -> bool {
        let flags = self.kernel.current_flags();
        flags.is_fiber() && !self.current_is_idle()
    }

    /// A task slot occupant to install, or an empty slot.
    fn pick_slot(&self, rng: &mut SmallRng) -> Option<ContextId> {
        if rng.gen_bool(0.25) {
            None
        } else {
            Some(self.pick(rng))
        }
    }

    fn queue_op(&self, rng: &mut SmallRng) {
        let target = self.pick(rng);
        if rng.gen_bool(0.5) {
            let _ = self.kernel.dequeue_fiber(target);
        } else {
            let _ = self.kernel.enqueue_fiber(target);
        }
    }

    fn step(&mut self, rng: &mut SmallRng) {
        let k = &self.kernel;
        match rng.gen_range(0..15) {
            0 | 1 => {
                let level = rng.gen_range(0..8);
                let cfg = ContextConfig::new(prio(level), context_main, stack());
                match k.create_fiber(cfg) {
                    Ok(id) => self.known.push(id),
                    Err(err) => assert_eq!(err, KernelError::ArenaFull),
                }
            }
            2 => {
                let cfg = ContextConfig::new(Priority::LOWEST, context_main, stack());
                match k.create_task(cfg) {
                    Ok(id) => self.known.push(id),
                    Err(err) => assert!(matches!(
                        err,
                        KernelError::ArenaFull | KernelError::TaskSlotOccupied
                    )),
                }
            }
            3 | 4 => {
                if !self.current_is_idle() {
                    pend(k);
                }
            }
            5 | 6 => {
                let target = self.pick(rng);
                let value = rng.gen::<u32>();
                if target != current(k) {
                    interrupt(k, || {
                        let _ = k.wake(target, value);
                    });
                }
            }
            7 => {
                if self.current_is_fiber() {
                    k.yield_fiber();
                } else {
                    swap(k);
                }
            }
            8 => {
                let target = self.pick(rng);
                if target != self.boot && target != self.idle {
                    let _ = k.terminate(target);
                }
            }
            9 => {
                if self.current_is_idle() {
                    k.idle_once();
                } else {
                    swap(k);
                }
            }
            10 => self.queue_op(rng),
            11 => {
                // a displaced running task leaves at the next switch point
                let slot = self.pick_slot(rng);
                let _ = k.set_task(slot);
                swap(k);
            }
            12 => {
                let slot = self.pick_slot(rng);
                interrupt(k, || {
                    let _ = k.set_task(slot);
                });
            }
            13 => {
                let target = self.pick(rng);
                interrupt(k, || {
                    let _ = k.ready(target);
                });
            }
            _ => {
                interrupt(k, || self.queue_op(rng));
            }
        }
        self.known.retain(|id| k.state_of(*id) != Err(KernelError::StaleHandle));
    }

    fn check(&self) {
        let k = &self.kernel;
        let snap = k.snapshot().unwrap();

        assert!(!k.port().irqs_locked());
        assert_eq!(snap.irq_nesting, 0);
        assert_eq!(k.state_of(snap.current), Ok(ContextState::Running));
        // a context that terminated itself keeps its slot until the next
        // kernel entry
        let live = k.live_contexts();
        assert!(live == self.known.len() || live == self.known.len() + 1);

        // the run queue holds ready fibers, most urgent first
        let mut last = Priority::HIGHEST;
        for id in &snap.fibers {
            let info = k.info(*id).unwrap();
            assert!(info.flags.is_fiber());
            assert_eq!(info.state, ContextState::Ready);
            assert_ne!(*id, snap.idle);
            assert!(!info.priority.is_more_urgent_than(last));
            last = info.priority;
        }
        assert!(!snap.fibers.contains(&snap.current));

        if let Some(task) = snap.task {
            let info = k.info(task).unwrap();
            assert!(info.flags.is_task());
            assert!(matches!(info.state, ContextState::Ready | ContextState::Running));
        }

        let mut running = 0;
        for id in &self.known {
            let info = k.info(*id).unwrap();
            match info.state {
                ContextState::Running => {
                    running += 1;
                    assert_eq!(*id, snap.current);
                }
                ContextState::Ready => assert!(
                    snap.fibers.contains(id) || snap.task == Some(*id) || *id == snap.idle,
                    "{} is ready but not runnable",
                    id
                ),
                ContextState::Blocked => {
                    assert!(!snap.fibers.contains(id));
                    assert_ne!(snap.task, Some(*id));
                }
                ContextState::Terminated => panic!("{} terminated but still resolvable", id),
            }
        }
        assert_eq!(running, 1);
    }
}

fn run(seed: u64) {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut model = Model::new();
    model.check();
    for _ in 0..STEPS {
        model.step(&mut rng);
        model.check();
    }
}

#[test]
fn random_operations_keep_the_scheduler_consistent() {
    for seed in 0..8 {
        run(seed);
    }
}

#[test]
fn runnable_work_always_beats_idle() {
    let mut rng = SmallRng::seed_from_u64(0xC0FFEE);
    let mut model = Model::new();
    for _ in 0..STEPS {
        model.step(&mut rng);
        let k = &model.kernel;
        let snap = k.snapshot().unwrap();
        if snap.current == snap.idle && (!snap.fibers.is_empty() || snap.task.is_some()) {
            // the idle loop hands over on its next pass
            assert!(k.idle_once());
            assert_ne!(current(k), model.idle);
        }
    }
}
