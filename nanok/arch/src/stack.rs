//! Stack memory handed to a context.

/// A region of memory used as a context's stack.
///
/// The region is owned by the context for as long as the context exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackRegion {
    base: usize,
    size: usize,
}

impl StackRegion {
    /// Take a statically allocated buffer as a stack.
    pub fn from_static(memory: &'static mut [u64]) -> Self {
        Self {
            base: memory.as_mut_ptr() as usize,
            size: core::mem::size_of_val(memory),
        }
    }

    /// Build a region from raw parts.
    ///
    /// # Safety
    /// `base..base + size` must be writable memory that nothing else uses for
    /// the lifetime of the context.
    pub const unsafe fn from_raw(base: usize, size: usize) -> Self {
        Self { base, size }
    }

    pub const fn base(&self) -> usize {
        self.base
    }

    pub const fn size(&self) -> usize {
        self.size
    }

    /// Initial stack pointer: the end of the region, aligned down to 8 bytes
    pub const fn top(&self) -> usize {
        (self.base + self.size) & !7
    }

    pub const fn contains(&self, addr: usize) -> bool {
        addr >= self.base && addr <= self.base + self.size
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::boxed::Box;
    use std::vec;

    #[test]
    fn top_is_aligned_end() {
        let stack = unsafe { StackRegion::from_raw(0x2000_0004, 0x101) };
        assert_eq!(stack.top(), 0x2000_0100);
        assert!(stack.contains(stack.top()));
        assert!(!stack.contains(0x2000_0000));
    }

    #[test]
    fn static_buffer_covers_whole_slice() {
        let memory: &'static mut [u64] = Box::leak(vec![0u64; 32].into_boxed_slice());
        let base = memory.as_ptr() as usize;
        let stack = StackRegion::from_static(memory);
        assert_eq!(stack.base(), base);
        assert_eq!(stack.size(), 256);
        assert_eq!(stack.top(), base + 256);
    }
}
