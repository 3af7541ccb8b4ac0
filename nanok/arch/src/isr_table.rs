//! Shared-interrupt demultiplexing table.
//!
//! Several drivers may hang handlers off one interrupt line. The kernel's
//! interrupt glue looks up the line here and runs every handler in
//! connection order.

use nanok_core::{KResult, KernelError};

/// Interrupt handler; receives the argument given at connection time.
pub type IsrHandler = fn(usize);

#[derive(Debug, Clone, Copy)]
pub struct IsrEntry {
    pub handler: IsrHandler,
    pub arg: usize,
}

/// Handler table with `LINES` interrupt lines and up to `SHARE` handlers per
/// line.
pub struct IsrTable<const LINES: usize, const SHARE: usize> {
    lines: [heapless::Vec<IsrEntry, SHARE>; LINES],
}

impl<const LINES: usize, const SHARE: usize> IsrTable<LINES, SHARE> {
    pub const fn new() -> Self {
        Self {
            lines: [const { heapless::Vec::new() }; LINES],
        }
    }

    /// Drop every connection.
    pub fn reset(&mut self) {
        for line in self.lines.iter_mut() {
            line.clear();
        }
    }

    /// Attach `handler` to `irq`.
    pub fn connect(&mut self, irq: u16, handler: IsrHandler, arg: usize) -> KResult<()> {
        let line = self
            .lines
            .get_mut(irq as usize)
            .ok_or(KernelError::IrqOutOfRange)?;
        line.push(IsrEntry { handler, arg })
            .map_err(|_| KernelError::IrqTableFull)
    }

    /// Detach `handler` from `irq`. Returns whether it was connected.
    pub fn disconnect(&mut self, irq: u16, handler: IsrHandler) -> KResult<bool> {
        let line = self
            .lines
            .get_mut(irq as usize)
            .ok_or(KernelError::IrqOutOfRange)?;
        match line.iter().position(|e| core::ptr::fn_addr_eq(e.handler, handler)) {
            Some(pos) => {
                line.remove(pos);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Handlers connected to `irq`, in connection order.
    pub fn handlers(&self, irq: u16) -> KResult<&[IsrEntry]> {
        self.lines
            .get(irq as usize)
            .map(|line| line.as_slice())
            .ok_or(KernelError::IrqOutOfRange)
    }

    /// Copy of the handler list, so the caller can run it without holding
    /// whatever guards the table.
    pub fn snapshot(&self, irq: u16) -> KResult<heapless::Vec<IsrEntry, SHARE>> {
        self.handlers(irq)
            .map(|entries| entries.iter().copied().collect())
    }
}

impl<const LINES: usize, const SHARE: usize> Default for IsrTable<LINES, SHARE> {
    fn default() -> Self {
        Self::new()
    }
}
