//! The per-CPU kernel object.
//!
//! `Kernel<P>` holds the only shared mutable state of the system. It is
//! touched by the running context and by interrupt handlers, never by two
//! contexts at once, so the lock is simply the port's interrupt mask: every
//! method raises it, borrows the state, and drops it again.

use core::cell::RefCell;

use critical_section::{CriticalSection, Mutex};
use nanok_arch::{ArchContext, IrqKey, IsrTable, Port};
use nanok_core::config::{MAX_SHARED_HANDLERS, NUM_IRQS, SWAP_DEFAULT_RETURN};
use nanok_core::fatal::{contract_violation, fatal_error, FatalInfo, FatalReason};
use nanok_core::{
    nk_assert, ContextFlags, ContextId, ContextInfo, ContextState, KResult, KernelError, Priority,
};

#[cfg(feature = "latency")]
use nanok_latency::{LatencyBench, LatencyReport};

use crate::arena::{Descriptor, SwitchMetrics};
use crate::config::{BootContexts, ContextConfig, IdleConfig, SchedSnapshot};
use crate::policy;
use crate::state::KernelState;

/// Idle ticks recorded when the idle context sleeps with no deadline.
pub const IDLE_FOREVER: u32 = u32::MAX;

pub(crate) type SwitchPair<C> = (*mut ArchContext<C>, *const ArchContext<C>);

/// Scheduler and context-switch core for one CPU.
pub struct Kernel<P: Port> {
    pub(crate) port: P,
    pub(crate) state: Mutex<RefCell<KernelState<P::Coop>>>,
    pub(crate) isrs: Mutex<RefCell<IsrTable<NUM_IRQS, MAX_SHARED_HANDLERS>>>,
    #[cfg(feature = "latency")]
    latency: Mutex<RefCell<LatencyBench>>,
}

impl<P: Port> Kernel<P> {
    pub const fn new(port: P) -> Self {
        Self {
            port,
            state: Mutex::new(RefCell::new(KernelState::new())),
            isrs: Mutex::new(RefCell::new(IsrTable::new())),
            #[cfg(feature = "latency")]
            latency: Mutex::new(RefCell::new(LatencyBench::new())),
        }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    // Locking

    /// Mask kernel-aware interrupts. Nests; pass the key to `irq_unlock`.
    pub fn irq_lock(&self) -> IrqKey {
        let key = self.port.irq_lock();
        self.latency_start();
        key
    }

    pub fn irq_unlock(&self, key: IrqKey) {
        self.latency_stop();
        self.port.irq_unlock(key);
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut KernelState<P::Coop>) -> R) -> R {
        nk_assert!(self.port.irqs_locked(), "kernel state accessed with interrupts unlocked");
        // SAFETY: one CPU, and the port's interrupt mask is the kernel lock
        let cs = unsafe { CriticalSection::new() };
        f(&mut self.state.borrow_ref_mut(cs))
    }

    pub(crate) fn with_isrs<R>(
        &self,
        f: impl FnOnce(&mut IsrTable<NUM_IRQS, MAX_SHARED_HANDLERS>) -> R,
    ) -> R {
        nk_assert!(self.port.irqs_locked(), "interrupt table accessed with interrupts unlocked");
        // SAFETY: as in `with_state`
        let cs = unsafe { CriticalSection::new() };
        f(&mut self.isrs.borrow_ref_mut(cs))
    }

    fn locked<R>(&self, f: impl FnOnce(&mut KernelState<P::Coop>) -> R) -> R {
        let key = self.irq_lock();
        let result = self.with_state(f);
        self.irq_unlock(key);
        result
    }

    #[inline(always)]
    fn latency_start(&self) {
        #[cfg(feature = "latency")]
        {
            // SAFETY: called right after the port raised the mask
            let cs = unsafe { CriticalSection::new() };
            self.latency.borrow_ref_mut(cs).start(self.port.cycles());
        }
    }

    #[inline(always)]
    fn latency_stop(&self) {
        #[cfg(feature = "latency")]
        {
            // SAFETY: called while the mask is still raised
            let cs = unsafe { CriticalSection::new() };
            let _ = self.latency.borrow_ref_mut(cs).stop(self.port.cycles());
        }
    }

    /// End the lock window of a context that is leaving the CPU, including
    /// any outer locks it still holds.
    #[inline(always)]
    fn latency_close(&self) {
        #[cfg(feature = "latency")]
        {
            // SAFETY: called while the mask is still raised
            let cs = unsafe { CriticalSection::new() };
            let _ = self.latency.borrow_ref_mut(cs).close(self.port.cycles());
        }
    }

    // Boot

    /// Bring the kernel up and adopt the caller as the first task.
    ///
    /// Clears the scheduler state, runs the architecture boot glue, resets
    /// the interrupt table, then creates the idle fiber. Must run once,
    /// before interrupts are enabled and before any other operation.
    pub fn init(&self, idle: IdleConfig) -> KResult<BootContexts> {
        let key = self.port.irq_lock();
        self.with_state(|s| {
            if s.initialized {
                contract_violation("kernel initialized twice", file!(), line!());
            }
            s.reset();
        });

        nanok_arch::boot(&self.port);
        self.with_isrs(|table| table.reset());

        let mut idle_desc = Descriptor::new(
            ContextFlags::FIBER | ContextFlags::PREEMPTIBLE | ContextFlags::ESSENTIAL,
            Priority::IDLE,
        );
        self.port.init_context(&mut idle_desc.arch, idle.entry, 0, idle.stack);

        let result = self.with_state(|s| -> KResult<BootContexts> {
            let mut boot_desc =
                Descriptor::new(ContextFlags::TASK | ContextFlags::ESSENTIAL, Priority::LOWEST);
            boot_desc.state = ContextState::Running;
            boot_desc.metrics.last_in = self.port.cycles();
            let boot = s.arena.alloc(boot_desc)?;
            let idle = s.arena.alloc(idle_desc)?;

            s.push_monitor(boot.index());
            s.push_monitor(idle.index());
            s.task = Some(boot.index());
            s.current = Some(boot.index());
            s.flags = s.desc(boot.index()).flags;
            s.idle = Some(idle.index());
            s.initialized = true;
            Ok(BootContexts { boot, idle })
        });

        #[cfg(feature = "latency")]
        {
            // SAFETY: interrupts are masked for the whole of `init`
            let cs = unsafe { CriticalSection::new() };
            self.latency.borrow_ref_mut(cs).calibrate(|| self.port.cycles());
        }
        #[cfg(feature = "trace")]
        nanok_trace::init();

        self.port.irq_unlock(key);
        if let Ok(boot) = &result {
            log::info!(
                "nanok {} up: boot task {}, idle fiber {}, {:?}",
                nanok_core::VERSION,
                boot.boot,
                boot.idle,
                P::SAVE_MODEL
            );
        }
        result
    }

    // Creation and termination

    /// Create a fiber and queue it. The caller keeps running.
    pub fn create_fiber(&self, cfg: ContextConfig) -> KResult<ContextId> {
        self.create(cfg, ContextFlags::FIBER)
    }

    /// Create a task and place it in the task slot, which must be free.
    pub fn create_task(&self, cfg: ContextConfig) -> KResult<ContextId> {
        self.create(cfg, ContextFlags::TASK)
    }

    fn create(&self, cfg: ContextConfig, class: ContextFlags) -> KResult<ContextId> {
        if cfg.priority.is_idle() {
            return Err(KernelError::InvalidPriority);
        }
        let mut desc = Descriptor::new(
            class | cfg.options.intersection(ContextFlags::CREATE_MASK),
            cfg.priority,
        );
        desc.custom_data = cfg.custom_data;
        self.port.init_context(&mut desc.arch, cfg.entry, cfg.arg, cfg.stack);

        let result = self.locked(|s| {
            if !s.initialized {
                return Err(KernelError::NotInitialized);
            }
            s.reap(self.port.switch_in_flight());
            if class.is_task() && s.task.is_some() {
                return Err(KernelError::TaskSlotOccupied);
            }
            let id = s.arena.alloc(desc)?;
            let index = id.index();
            s.push_monitor(index);
            if class.is_task() {
                s.task = Some(index);
            } else {
                s.enqueue_fiber(index);
            }
            trace_event!(self, Create, [
                index,
                cfg.priority.raw(),
                s.desc(index).flags.bits() as u8,
                (s.desc(index).flags.bits() >> 8) as u8,
            ]);
            Ok(id)
        });

        match &result {
            Ok(id) => log::debug!(
                "created {} {} priority {}",
                if class.is_task() { "task" } else { "fiber" },
                id,
                cfg.priority
            ),
            Err(err) => log::warn!("context creation failed: {}", err),
        }
        result
    }

    /// End a context for good.
    ///
    /// A context that is not running is unlinked and its slot freed at
    /// once. Terminating the running context switches away and never
    /// returns on hardware; its slot is freed at the next kernel entry.
    /// Essential contexts cannot be terminated: trying is fatal.
    pub fn terminate(&self, id: ContextId) -> KResult<()> {
        let key = self.irq_lock();
        let result = self.with_state(|s| -> KResult<bool> {
            s.reap(self.port.switch_in_flight());
            let index = s.resolve(id)?;
            let desc = s.desc(index);
            if desc.flags.contains(ContextFlags::ESSENTIAL) {
                s.fatal_for(index, FatalReason::EssentialTerminated, "terminate");
            }
            let running = s.current == Some(index);
            nk_assert!(!(running && s.flags.in_handler()), "running context terminated from a handler");

            if desc.state == ContextState::Ready && desc.flags.is_fiber() {
                s.dequeue_fiber(index);
            }
            if s.task == Some(index) {
                s.task = None;
            }
            s.desc_mut(index).state = ContextState::Terminated;
            s.remove_monitor(index);
            if s.current_fp == Some(index) {
                s.current_fp = None;
            }
            trace_event!(self, Terminate, [index]);

            if running {
                s.zombie = Some(index);
            } else {
                s.arena.release(index);
            }
            Ok(running)
        });

        match result {
            Ok(true) => {
                log::debug!("context {} exits", id);
                self.swap(key);
                Ok(())
            }
            Ok(false) => {
                self.irq_unlock(key);
                log::debug!("terminated {}", id);
                Ok(())
            }
            Err(err) => {
                self.irq_unlock(key);
                Err(err)
            }
        }
    }

    /// Terminate whatever is running. Installed as the context exit hook.
    pub fn exit_current(&self) {
        let result = match self.current() {
            Some(id) => self.terminate(id),
            None => Err(KernelError::NotInitialized),
        };
        if result.is_err() {
            self.fatal(FatalReason::ContextExit);
        }
    }

    // Switching

    /// The context switch.
    ///
    /// Called with interrupts locked; consumes the key. If the running
    /// context is still eligible and nothing outranks it, only the lock is
    /// dropped and `SWAP_DEFAULT_RETURN` comes back. Otherwise the policy
    /// picks the next context, the CPU moves to it, and this call returns
    /// once the caller is resumed, yielding whatever value was handed to it
    /// through `set_return_value` in the meantime.
    pub fn swap(&self, key: IrqKey) -> u32 {
        let plan = self.with_state(|s| {
            nk_assert!(!s.flags.in_handler(), "swap called from a handler");
            s.reap(self.port.switch_in_flight());
            let cur = s.current_index();
            if !policy::should_switch(s, cur) {
                return None;
            }

            let outgoing = s.desc(cur).state;
            if outgoing == ContextState::Running {
                s.desc_mut(cur).state = ContextState::Ready;
                if s.desc(cur).flags.is_fiber() && !s.is_idle(cur) {
                    s.enqueue_fiber(cur);
                }
            }

            let next = policy::select(s)?;
            if next == cur {
                s.dequeue_fiber(cur);
                s.desc_mut(cur).state = ContextState::Running;
                return None;
            }

            s.desc_mut(cur).arch.basepri = key.raw() as usize;
            trace_event!(self, Swap, [cur, next, swap_reason(outgoing)]);
            Some(self.switch_to(s, cur, next))
        });

        match plan {
            Some((from, to)) => {
                self.latency_close();
                // SAFETY: both descriptors live in the arena, which never moves,
                // and the outgoing one stays allocated until it is off the CPU
                unsafe { self.port.context_switch(from, to) }
            }
            None => {
                self.irq_unlock(key);
                SWAP_DEFAULT_RETURN
            }
        }
    }

    /// Make `next` current and hand back the register areas the port moves
    /// between.
    pub(crate) fn switch_to(
        &self,
        s: &mut KernelState<P::Coop>,
        cur: u8,
        next: u8,
    ) -> SwitchPair<P::Coop> {
        if s.desc(next).flags.is_fiber() {
            s.dequeue_fiber(next);
        }

        let now = self.port.cycles();
        let out = s.desc_mut(cur);
        if out.flags.contains(ContextFlags::NO_METRICS) {
            out.flags.remove(ContextFlags::NO_METRICS);
        } else {
            out.metrics.cycles = out.metrics.cycles.wrapping_add(now.wrapping_sub(out.metrics.last_in));
        }
        let incoming = s.desc_mut(next);
        incoming.metrics.switches = incoming.metrics.switches.wrapping_add(1);
        incoming.metrics.last_in = now;
        incoming.state = ContextState::Running;
        s.current = Some(next);
        s.flags = s.desc(next).flags;

        self.fp_handoff(s, next);

        let from: *mut ArchContext<P::Coop> = &mut s.desc_mut(cur).arch;
        let to: *const ArchContext<P::Coop> = &s.desc(next).arch;
        (from, to)
    }

    fn fp_handoff(&self, s: &mut KernelState<P::Coop>, next: u8) {
        if !s.desc(next).flags.contains(ContextFlags::USE_FP) || s.current_fp == Some(next) {
            return;
        }
        if let Some(owner) = s.current_fp {
            self.port.fp_save(&mut s.desc_mut(owner).arch.fp);
        }
        self.port.fp_restore(&s.desc(next).arch.fp);
        s.current_fp = Some(next);
    }

    /// Give the CPU to an equally or more urgent fiber, if one is queued.
    pub fn yield_fiber(&self) {
        let key = self.irq_lock();
        self.with_state(|s| {
            let cur = s.current_index();
            nk_assert!(s.flags.is_fiber() && !s.is_idle(cur), "yield_fiber called outside a fiber");
            s.desc_mut(cur).state = ContextState::Ready;
            s.enqueue_fiber(cur);
        });
        self.swap(key);
    }

    // Blocking and waking

    /// Take the running context off every runnable structure. Call with
    /// interrupts locked and follow with `swap`.
    pub fn block_current(&self) -> ContextId {
        self.with_state(|s| {
            let cur = s.current_index();
            nk_assert!(!s.is_idle(cur), "idle context cannot block");
            nk_assert!(!s.flags.in_handler(), "blocking inside a handler");
            s.desc_mut(cur).state = ContextState::Blocked;
            if s.task == Some(cur) {
                s.task = None;
            }
            trace_event!(self, Block, [cur]);
            s.arena.id_of(cur)
        })
    }

    /// Block the running context and switch away. Returns the value the
    /// waker delivered, or `SWAP_DEFAULT_RETURN`.
    pub fn pend(&self, key: IrqKey) -> u32 {
        self.block_current();
        self.swap(key)
    }

    /// Move a blocked context back to the run queue or the task slot.
    /// Never switches; interrupt return or the next `swap` does that.
    pub fn ready(&self, id: ContextId) -> KResult<()> {
        self.locked(|s| self.make_ready(s, id))
    }

    /// Deliver `value` as the result of a blocked context's pending call and
    /// make it ready.
    pub fn wake(&self, id: ContextId, value: u32) -> KResult<()> {
        self.locked(|s| {
            Self::patch_return(s, id, value)?;
            self.make_ready(s, id)
        })
    }

    /// Set the value a blocked context's pending call returns with.
    pub fn set_return_value(&self, id: ContextId, value: u32) -> KResult<()> {
        self.locked(|s| Self::patch_return(s, id, value))
    }

    fn patch_return(s: &mut KernelState<P::Coop>, id: ContextId, value: u32) -> KResult<()> {
        let index = s.resolve(id)?;
        nk_assert!(s.current != Some(index), "return value patched on the running context");
        if s.desc(index).state != ContextState::Blocked {
            return Err(KernelError::NotBlocked);
        }
        // SAFETY: a blocked context other than the current one is suspended
        // inside a switch or committed to one; the value lives in its
        // descriptor, not on its stack
        unsafe { P::set_return_value(&mut s.desc_mut(index).arch, value) };
        Ok(())
    }

    fn make_ready(&self, s: &mut KernelState<P::Coop>, id: ContextId) -> KResult<()> {
        let index = s.resolve(id)?;
        let desc = s.desc(index);
        if desc.state != ContextState::Blocked {
            return Err(KernelError::NotBlocked);
        }
        if desc.flags.is_task() {
            if s.task.is_some() {
                return Err(KernelError::TaskSlotOccupied);
            }
            s.task = Some(index);
        } else {
            s.enqueue_fiber(index);
        }
        s.desc_mut(index).state = ContextState::Ready;
        trace_event!(self, Ready, [index, s.desc(index).priority.raw()]);
        Ok(())
    }

    /// Queue a blocked fiber.
    pub fn enqueue_fiber(&self, id: ContextId) -> KResult<()> {
        self.locked(|s| {
            let index = s.resolve(id)?;
            if !s.desc(index).flags.is_fiber() || s.is_idle(index) {
                return Err(KernelError::NotFiber);
            }
            self.make_ready(s, id)
        })
    }

    /// Pull a ready fiber off the run queue, leaving it blocked. Returns
    /// false if it was not queued.
    pub fn dequeue_fiber(&self, id: ContextId) -> KResult<bool> {
        self.locked(|s| {
            let index = s.resolve(id)?;
            if !s.desc(index).flags.is_fiber() {
                return Err(KernelError::NotFiber);
            }
            let queued = s.dequeue_fiber(index);
            if queued {
                s.desc_mut(index).state = ContextState::Blocked;
                trace_event!(self, Block, [index]);
            }
            Ok(queued)
        })
    }

    /// Substitute the task in the task slot.
    ///
    /// The displaced task, running or not, becomes blocked and belongs to
    /// whoever called this; the new one becomes ready. The switch itself
    /// happens at the next `swap`.
    pub fn set_task(&self, id: Option<ContextId>) -> KResult<()> {
        self.locked(|s| {
            let new = match id {
                Some(id) => {
                    let index = s.resolve(id)?;
                    if !s.desc(index).flags.is_task() {
                        return Err(KernelError::NotTask);
                    }
                    Some(index)
                }
                None => None,
            };
            if let Some(old) = s.task {
                if Some(old) != new {
                    s.desc_mut(old).state = ContextState::Blocked;
                }
            }
            if let Some(index) = new {
                if s.desc(index).state == ContextState::Blocked {
                    s.desc_mut(index).state = if s.current == Some(index) {
                        ContextState::Running
                    } else {
                        ContextState::Ready
                    };
                }
            }
            s.task = new;
            trace_event!(self, TaskSet, [new.unwrap_or(nanok_trace::NONE)]);
            Ok(())
        })
    }

    // Idle

    /// One pass of the idle loop: switch to anything runnable, otherwise
    /// sleep until the next interrupt. Returns true if it switched.
    pub fn idle_once(&self) -> bool {
        let key = self.irq_lock();
        let runnable = self.with_state(|s| {
            nk_assert!(s.current.is_some() && s.current == s.idle, "idle_once outside the idle context");
            if s.has_runnable() {
                return true;
            }
            s.idle_ticks = IDLE_FOREVER;
            trace_event!(self, Idle, []);
            false
        });
        if runnable {
            self.swap(key);
        } else {
            self.latency_close();
            self.port.idle(key);
        }
        runnable
    }

    /// Ticks the idle context asked to sleep for; cleared by the next
    /// interrupt.
    pub fn idle_ticks(&self) -> u32 {
        self.locked(|s| s.idle_ticks)
    }

    // Introspection

    pub fn current(&self) -> Option<ContextId> {
        self.locked(|s| s.current.map(|c| s.arena.id_of(c)))
    }

    /// Flags of the running context, from the cached copy.
    pub fn current_flags(&self) -> ContextFlags {
        self.locked(|s| s.flags)
    }

    pub fn task(&self) -> Option<ContextId> {
        self.locked(|s| s.task.map(|t| s.arena.id_of(t)))
    }

    pub fn idle_context(&self) -> Option<ContextId> {
        self.locked(|s| s.idle.map(|i| s.arena.id_of(i)))
    }

    pub fn state_of(&self, id: ContextId) -> KResult<ContextState> {
        self.locked(|s| s.resolve(id).map(|i| s.desc(i).state))
    }

    pub fn info(&self, id: ContextId) -> KResult<ContextInfo> {
        self.locked(|s| s.resolve(id).map(|i| s.info(i)))
    }

    /// Application word attached to a context. The kernel never looks at it.
    pub fn custom_data(&self, id: ContextId) -> KResult<usize> {
        self.locked(|s| s.resolve(id).map(|i| s.desc(i).custom_data))
    }

    pub fn set_custom_data(&self, id: ContextId, data: usize) -> KResult<()> {
        self.locked(|s| -> KResult<()> {
            let index = s.resolve(id)?;
            s.desc_mut(index).custom_data = data;
            Ok(())
        })
    }

    /// Walk every live context, most recently created first.
    ///
    /// The list is copied under the lock and `f` runs with interrupts
    /// enabled.
    #[cfg(feature = "monitor")]
    pub fn for_each_context(&self, mut f: impl FnMut(&ContextInfo)) {
        let list = self.locked(|s| {
            let mut list: heapless::Vec<ContextInfo, { nanok_core::config::MAX_CONTEXTS }> =
                heapless::Vec::new();
            let mut cursor = s.contexts;
            while let Some(at) = cursor {
                let _ = list.push(s.info(at));
                cursor = s.desc(at).next_context;
            }
            list
        });
        list.iter().for_each(|info| f(info));
    }

    /// Runnable structures as seen right now.
    pub fn snapshot(&self) -> KResult<SchedSnapshot> {
        self.locked(|s| {
            if !s.initialized {
                return Err(KernelError::NotInitialized);
            }
            let mut fibers = heapless::Vec::new();
            for at in s.fibers() {
                let _ = fibers.push(s.arena.id_of(at));
            }
            let idle = s.idle.ok_or(KernelError::NotInitialized)?;
            Ok(SchedSnapshot {
                current: s.arena.id_of(s.current_index()),
                flags: s.flags,
                task: s.task.map(|t| s.arena.id_of(t)),
                idle: s.arena.id_of(idle),
                fibers,
                irq_nesting: s.nesting.irq,
                idle_ticks: s.idle_ticks,
            })
        })
    }

    /// Number of occupied descriptor slots.
    pub fn live_contexts(&self) -> usize {
        self.locked(|s| s.arena.live())
    }

    /// Reset a context's switch statistics.
    pub fn clear_metrics(&self, id: ContextId) -> KResult<()> {
        self.locked(|s| -> KResult<()> {
            let index = s.resolve(id)?;
            let now = self.port.cycles();
            s.desc_mut(index).metrics = SwitchMetrics { last_in: now, ..SwitchMetrics::ZERO };
            Ok(())
        })
    }

    // Latency

    #[cfg(feature = "latency")]
    pub fn latency_report(&self) -> LatencyReport {
        let key = self.port.irq_lock();
        // SAFETY: the mask was just raised
        let cs = unsafe { CriticalSection::new() };
        let report = self.latency.borrow_ref(cs).report();
        self.port.irq_unlock(key);
        report
    }

    /// Report the lock windows seen so far and start a new period.
    #[cfg(feature = "latency")]
    pub fn take_latency_report(&self) -> LatencyReport {
        let key = self.port.irq_lock();
        // SAFETY: the mask was just raised
        let cs = unsafe { CriticalSection::new() };
        let report = self.latency.borrow_ref_mut(cs).take_report();
        self.port.irq_unlock(key);

        #[cfg(feature = "trace")]
        {
            let mut payload = [0u8; 12];
            payload[0..4].copy_from_slice(&report.max.to_le_bytes());
            payload[4..8].copy_from_slice(&report.min.to_le_bytes());
            payload[8..12].copy_from_slice(&report.samples.to_le_bytes());
            let _ = nanok_trace::record(nanok_trace::RecordKind::Latency, self.port.cycles(), &payload);
        }
        report
    }

    // Fatal

    /// Take the system down with a snapshot of the running context.
    pub fn fatal(&self, reason: FatalReason) -> ! {
        self.port.irq_lock();
        let mut info = FatalInfo::new(reason);
        // SAFETY: interrupts stay masked from here on
        let cs = unsafe { CriticalSection::new() };
        if let Ok(s) = self.state.borrow(cs).try_borrow() {
            if let Some(cur) = s.current {
                if let Some(desc) = s.arena.get(cur) {
                    info = info.with_context(s.arena.id_of(cur), desc.flags, desc.priority);
                }
            }
        }
        trace_event!(self, Fatal, [fatal_code(reason)]);
        fatal_error(info)
    }
}

#[cfg(feature = "trace")]
fn swap_reason(outgoing: ContextState) -> u8 {
    use nanok_trace::SwapReason;
    let reason = match outgoing {
        ContextState::Blocked => SwapReason::Block,
        ContextState::Terminated => SwapReason::Terminate,
        ContextState::Running | ContextState::Ready => SwapReason::Yield,
    };
    reason as u8
}

#[cfg(feature = "trace")]
fn fatal_code(reason: FatalReason) -> u8 {
    match reason {
        FatalReason::ContractViolation => 0,
        FatalReason::EssentialTerminated => 1,
        FatalReason::CpuException(_) => 2,
        FatalReason::SpuriousIrq(_) => 3,
        FatalReason::ContextExit => 4,
    }
}
