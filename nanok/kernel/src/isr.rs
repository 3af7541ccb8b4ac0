//! Interrupt and exception glue.
//!
//! Handlers bracket their body with `isr_enter`/`isr_exit`. Leaving the
//! outermost handler is the only place a context is switched out without
//! asking for it, and only a task or a preemptible context can be.

use nanok_arch::{IsrHandler, Port};
use nanok_core::fatal::FatalReason;
use nanok_core::{nk_assert, ContextFlags, ContextState, KResult};

use crate::kernel::Kernel;
use crate::policy;

impl<P: Port> Kernel<P> {
    /// Record entry into an interrupt handler.
    pub fn isr_enter(&self) {
        let key = self.irq_lock();
        self.with_state(|s| {
            s.nesting.irq += 1;
            if s.nesting.irq == 1 {
                s.set_current_flag(ContextFlags::INT_ACTIVE, true);
            }
            if s.idle_ticks != 0 {
                // the CPU left its idle wait
                s.idle_ticks = 0;
            }
            trace_event!(self, IsrEnter, [s.nesting.irq as u8]);
        });
        self.irq_unlock(key);
    }

    /// Record the end of an interrupt handler. Leaving the outermost one
    /// switches to a fiber (or the task) that became ready, unless the
    /// interrupted context is a fiber. Returns true if a switch was
    /// requested.
    pub fn isr_exit(&self) -> bool {
        let key = self.irq_lock();
        let plan = self.with_state(|s| {
            nk_assert!(s.nesting.irq > 0, "isr_exit without isr_enter");
            s.nesting.irq = s.nesting.irq.saturating_sub(1);
            if s.nesting.irq > 0 {
                trace_event!(self, IsrExit, [s.nesting.irq as u8, 0]);
                return None;
            }
            s.set_current_flag(ContextFlags::INT_ACTIVE, false);

            let cur = s.current_index();
            if s.nesting.exc > 0 || !policy::should_preempt(s, cur) {
                trace_event!(self, IsrExit, [0, 0]);
                return None;
            }
            let next = policy::select(s)?;
            let desc = s.desc_mut(cur);
            if desc.state == ContextState::Running {
                desc.state = ContextState::Ready;
            }
            // the handler could only run because interrupts were open
            desc.arch.basepri = 0;
            trace_event!(self, Preempt, [cur, next]);
            trace_event!(self, IsrExit, [0, 1]);
            Some(self.switch_to(s, cur, next))
        });

        let switched = match plan {
            Some((from, to)) => {
                // SAFETY: both descriptors live in the arena and the outgoing
                // one is still allocated; the port completes the switch once
                // the handler returns
                unsafe { self.port.request_switch(from, to) };
                true
            }
            None => false,
        };
        self.irq_unlock(key);
        switched
    }

    /// Record entry into a CPU exception handler.
    pub fn exc_enter(&self) {
        let key = self.irq_lock();
        self.with_state(|s| {
            s.nesting.exc += 1;
            s.set_current_flag(ContextFlags::EXC_ACTIVE, true);
        });
        self.irq_unlock(key);
    }

    pub fn exc_exit(&self) {
        let key = self.irq_lock();
        self.with_state(|s| {
            nk_assert!(s.nesting.exc > 0, "exc_exit without exc_enter");
            s.nesting.exc = s.nesting.exc.saturating_sub(1);
            if s.nesting.exc == 0 {
                s.set_current_flag(ContextFlags::EXC_ACTIVE, false);
            }
        });
        self.irq_unlock(key);
    }

    /// Hang `handler` off interrupt line `irq`. Lines can be shared.
    pub fn irq_connect(&self, irq: u16, handler: IsrHandler, arg: usize) -> KResult<()> {
        let key = self.irq_lock();
        let result = self.with_isrs(|table| table.connect(irq, handler, arg));
        self.irq_unlock(key);
        if result.is_ok() {
            log::debug!("irq {} connected", irq);
        }
        result
    }

    /// Remove one handler from a line. Returns false if it was not there.
    pub fn irq_disconnect(&self, irq: u16, handler: IsrHandler) -> KResult<bool> {
        let key = self.irq_lock();
        let result = self.with_isrs(|table| table.disconnect(irq, handler));
        self.irq_unlock(key);
        result
    }

    /// Common interrupt entry: run every handler on the line and return
    /// through `isr_exit`. A line without handlers is fatal.
    pub fn handle_irq(&self, irq: u16) -> bool {
        self.isr_enter();
        let key = self.irq_lock();
        let handlers = self.with_isrs(|table| table.snapshot(irq));
        self.irq_unlock(key);

        match handlers {
            Ok(list) if !list.is_empty() => {
                for entry in &list {
                    (entry.handler)(entry.arg);
                }
            }
            _ => {
                log::error!("spurious interrupt on line {}", irq);
                self.fatal(FatalReason::SpuriousIrq(irq));
            }
        }
        self.isr_exit()
    }
}
