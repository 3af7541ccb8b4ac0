//! Scheduler bookkeeping: the fiber run queue, the task slot and the
//! current-context pointer.
//!
//! Everything here runs with interrupts locked. Contexts are referred to by
//! arena slot index; the running fiber is never in the run queue, a running
//! task stays in the task slot.

use nanok_arch::CoopRegs;
use nanok_core::fatal::{fatal_error, FatalInfo, FatalReason};
use nanok_core::{ContextFlags, ContextId, ContextInfo, ContextState, KResult};

use crate::arena::{Arena, Descriptor};

/// Interrupt and exception nesting depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Nesting {
    pub irq: u32,
    pub exc: u32,
}

#[derive(Debug)]
pub(crate) struct KernelState<C: CoopRegs> {
    pub arena: Arena<C>,
    /// Head of the fiber run queue, most urgent first
    pub fiber: Option<u8>,
    /// The single runnable task, if any
    pub task: Option<u8>,
    pub current: Option<u8>,
    /// Copy of the current context's flags
    pub flags: ContextFlags,
    /// Head of the monitor list
    #[cfg(feature = "monitor")]
    pub contexts: Option<u8>,
    /// Context whose values are live in the FP registers
    pub current_fp: Option<u8>,
    /// Ticks the idle context asked to sleep for; zero when not idling
    pub idle_ticks: u32,
    pub idle: Option<u8>,
    pub nesting: Nesting,
    /// Terminated context whose slot is released once it is off the CPU
    pub zombie: Option<u8>,
    pub initialized: bool,
}

impl<C: CoopRegs> KernelState<C> {
    pub const fn new() -> Self {
        Self {
            arena: Arena::new(),
            fiber: None,
            task: None,
            current: None,
            flags: ContextFlags::FIBER,
            #[cfg(feature = "monitor")]
            contexts: None,
            current_fp: None,
            idle_ticks: 0,
            idle: None,
            nesting: Nesting { irq: 0, exc: 0 },
            zombie: None,
            initialized: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn desc(&self, index: u8) -> &Descriptor<C> {
        match self.arena.get(index) {
            Some(desc) => desc,
            None => corrupted(),
        }
    }

    pub fn desc_mut(&mut self, index: u8) -> &mut Descriptor<C> {
        match self.arena.get_mut(index) {
            Some(desc) => desc,
            None => corrupted(),
        }
    }

    pub fn current_index(&self) -> u8 {
        match self.current {
            Some(index) => index,
            None => fatal_error(
                FatalInfo::new(FatalReason::ContractViolation).with_message("kernel used before init"),
            ),
        }
    }

    pub fn is_idle(&self, index: u8) -> bool {
        self.idle == Some(index)
    }

    /// Set or clear a flag on the current context and its cached copy.
    pub fn set_current_flag(&mut self, flag: ContextFlags, on: bool) {
        let cur = self.current_index();
        let desc = self.desc_mut(cur);
        if on {
            desc.flags.insert(flag);
        } else {
            desc.flags.remove(flag);
        }
        self.flags = desc.flags;
    }

    /// Insert a fiber behind every queued fiber of equal or higher urgency.
    pub fn enqueue_fiber(&mut self, index: u8) {
        let prio = self.desc(index).priority;
        let mut prev: Option<u8> = None;
        let mut cursor = self.fiber;
        while let Some(at) = cursor {
            if prio.is_more_urgent_than(self.desc(at).priority) {
                break;
            }
            prev = cursor;
            cursor = self.desc(at).link;
        }
        self.desc_mut(index).link = cursor;
        match prev {
            Some(p) => self.desc_mut(p).link = Some(index),
            None => self.fiber = Some(index),
        }
    }

    /// Unlink a fiber from the run queue. Returns false if it was not queued.
    pub fn dequeue_fiber(&mut self, index: u8) -> bool {
        let mut prev: Option<u8> = None;
        let mut cursor = self.fiber;
        while let Some(at) = cursor {
            if at == index {
                let next = self.desc_mut(at).link.take();
                match prev {
                    Some(p) => self.desc_mut(p).link = next,
                    None => self.fiber = next,
                }
                return true;
            }
            prev = cursor;
            cursor = self.desc(at).link;
        }
        false
    }

    /// Run queue in order.
    pub fn fibers(&self) -> FiberIter<'_, C> {
        FiberIter { state: self, cursor: self.fiber }
    }

    /// Something other than the idle context could run.
    pub fn has_runnable(&self) -> bool {
        self.fiber.is_some() || self.task.is_some()
    }

    pub fn push_monitor(&mut self, _index: u8) {
        #[cfg(feature = "monitor")]
        {
            self.desc_mut(_index).next_context = self.contexts;
            self.contexts = Some(_index);
        }
    }

    pub fn remove_monitor(&mut self, _index: u8) {
        #[cfg(feature = "monitor")]
        {
            let mut prev: Option<u8> = None;
            let mut cursor = self.contexts;
            while let Some(at) = cursor {
                if at == _index {
                    let next = self.desc_mut(at).next_context.take();
                    match prev {
                        Some(p) => self.desc_mut(p).next_context = next,
                        None => self.contexts = next,
                    }
                    return;
                }
                prev = cursor;
                cursor = self.desc(at).next_context;
            }
        }
    }

    /// Release the slot of a terminated context once it no longer runs and
    /// the port has finished saving it.
    pub fn reap(&mut self, switch_in_flight: bool) {
        if let Some(zombie) = self.zombie {
            if self.current != Some(zombie) && !switch_in_flight {
                self.zombie = None;
                self.arena.release(zombie);
            }
        }
    }

    pub fn info(&self, index: u8) -> ContextInfo {
        let desc = self.desc(index);
        ContextInfo {
            id: self.arena.id_of(index),
            flags: desc.flags,
            priority: desc.priority,
            state: desc.state,
            switches: desc.metrics.switches,
            cycles: desc.metrics.cycles,
        }
    }

    /// Resolve a handle to a slot that still holds a live context.
    pub fn resolve(&self, id: ContextId) -> KResult<u8> {
        let index = self.arena.resolve(id)?;
        if self.desc(index).state == ContextState::Terminated {
            return Err(nanok_core::KernelError::StaleHandle);
        }
        Ok(index)
    }

    pub fn fatal_for(&self, index: u8, reason: FatalReason, message: &'static str) -> ! {
        let desc = self.desc(index);
        fatal_error(
            FatalInfo::new(reason)
                .with_context(self.arena.id_of(index), desc.flags, desc.priority)
                .with_message(message),
        )
    }
}

pub(crate) struct FiberIter<'a, C: CoopRegs> {
    state: &'a KernelState<C>,
    cursor: Option<u8>,
}

impl<C: CoopRegs> Iterator for FiberIter<'_, C> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        let at = self.cursor?;
        self.cursor = self.state.desc(at).link;
        Some(at)
    }
}

#[cold]
fn corrupted() -> ! {
    fatal_error(
        FatalInfo::new(FatalReason::ContractViolation).with_message("descriptor slot is vacant"),
    )
}
