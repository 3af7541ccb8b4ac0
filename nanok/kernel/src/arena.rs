//! Fixed pool of context descriptors.
//!
//! Descriptors never move once allocated: the port keeps raw pointers to
//! their `ArchContext` across a switch. Slots are recycled through a free
//! list, and each release bumps the slot generation so that old handles
//! stop resolving.

use nanok_arch::{ArchContext, CoopRegs};
use nanok_core::config::MAX_CONTEXTS;
use nanok_core::{ContextFlags, ContextId, ContextState, KResult, KernelError, Priority};

/// Per-context switch accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SwitchMetrics {
    pub switches: u32,
    pub cycles: u32,
    /// Cycle counter when the context was last switched in
    pub last_in: u32,
}

impl SwitchMetrics {
    pub const ZERO: SwitchMetrics = SwitchMetrics { switches: 0, cycles: 0, last_in: 0 };
}

/// Kernel-side state of one fiber or task.
#[derive(Debug)]
pub(crate) struct Descriptor<C: CoopRegs> {
    /// Next fiber in the run queue
    pub link: Option<u8>,
    pub flags: ContextFlags,
    pub priority: Priority,
    pub state: ContextState,
    pub arch: ArchContext<C>,
    pub custom_data: usize,
    /// Next entry of the monitor list
    #[cfg(feature = "monitor")]
    pub next_context: Option<u8>,
    pub metrics: SwitchMetrics,
}

impl<C: CoopRegs> Descriptor<C> {
    pub const fn new(flags: ContextFlags, priority: Priority) -> Self {
        Self {
            link: None,
            flags,
            priority,
            state: ContextState::Ready,
            arch: ArchContext::new(),
            custom_data: 0,
            #[cfg(feature = "monitor")]
            next_context: None,
            metrics: SwitchMetrics::ZERO,
        }
    }
}

#[derive(Debug)]
enum Slot<C: CoopRegs> {
    Vacant { next_free: Option<u8> },
    Occupied(Descriptor<C>),
}

#[derive(Debug)]
struct Entry<C: CoopRegs> {
    generation: u16,
    slot: Slot<C>,
}

impl<C: CoopRegs> Entry<C> {
    const VACANT: Self = Entry { generation: 0, slot: Slot::Vacant { next_free: None } };
}

#[derive(Debug)]
pub(crate) struct Arena<C: CoopRegs> {
    entries: [Entry<C>; MAX_CONTEXTS],
    /// Head of the list of released slots
    free: Option<u8>,
    /// Slots below this index have been handed out at least once
    high_water: u8,
    live: u8,
}

impl<C: CoopRegs> Arena<C> {
    pub const fn new() -> Self {
        Self {
            entries: [const { Entry::<C>::VACANT }; MAX_CONTEXTS],
            free: None,
            high_water: 0,
            live: 0,
        }
    }

    /// Move `desc` into a free slot.
    pub fn alloc(&mut self, desc: Descriptor<C>) -> KResult<ContextId> {
        let index = match self.free {
            Some(index) => {
                if let Slot::Vacant { next_free } = self.entries[usize::from(index)].slot {
                    self.free = next_free;
                }
                index
            }
            None if usize::from(self.high_water) < MAX_CONTEXTS => {
                self.high_water += 1;
                self.high_water - 1
            }
            None => return Err(KernelError::ArenaFull),
        };
        let entry = &mut self.entries[usize::from(index)];
        entry.slot = Slot::Occupied(desc);
        self.live += 1;
        Ok(ContextId::new(index, entry.generation))
    }

    /// Return a slot to the free list. Handles to it go stale.
    pub fn release(&mut self, index: u8) {
        let entry = &mut self.entries[usize::from(index)];
        if let Slot::Occupied(_) = entry.slot {
            entry.generation = entry.generation.wrapping_add(1);
            entry.slot = Slot::Vacant { next_free: self.free };
            self.free = Some(index);
            self.live -= 1;
        }
    }

    /// Slot index behind a handle, if the handle is still current.
    pub fn resolve(&self, id: ContextId) -> KResult<u8> {
        match self.entries.get(usize::from(id.index())) {
            Some(Entry { generation, slot: Slot::Occupied(_) }) if *generation == id.generation() => {
                Ok(id.index())
            }
            _ => Err(KernelError::StaleHandle),
        }
    }

    pub fn get(&self, index: u8) -> Option<&Descriptor<C>> {
        match &self.entries.get(usize::from(index))?.slot {
            Slot::Occupied(desc) => Some(desc),
            Slot::Vacant { .. } => None,
        }
    }

    pub fn get_mut(&mut self, index: u8) -> Option<&mut Descriptor<C>> {
        match &mut self.entries.get_mut(usize::from(index))?.slot {
            Slot::Occupied(desc) => Some(desc),
            Slot::Vacant { .. } => None,
        }
    }

    /// Current handle of an occupied slot.
    pub fn id_of(&self, index: u8) -> ContextId {
        ContextId::new(index, self.entries[usize::from(index)].generation)
    }

    pub fn live(&self) -> usize {
        usize::from(self.live)
    }
}
