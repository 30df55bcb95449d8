//! # Stack Arena
//!
//! Fixed-length, word-addressable regions used as task call-stacks.
//!
//! A region is provisioned in one of two ways:
//! - **Static**: the caller hands over a `&'static mut [u32]` (typically from
//!   `cortex_m::singleton!`). The memory lives at a fixed address for the whole
//!   program; releasing the region only gives the borrow back.
//! - **Dynamic**: the words are obtained from the global allocator when the
//!   task is created and returned to it when the region is dropped.
//!
//! Before a region reaches the scheduler every word holds `STACK_SENTINEL`.
//! Stack frames overwrite the sentinel as the task's stack grows, which is what
//! makes headroom measurement possible later.
//!
//! ## Layout (full-descending stack, index 0 = lowest address)
//!
//! ```text
//!  index 0                                            len-1
//!  ┌──────────────────────────────┬──────────┬───────────┐
//!  │ sentinel … sentinel          │ R4–R11   │ HW frame  │
//!  └──────────────────────────────┴──────────┴───────────┘
//!   ▲ pattern scan starts here     ▲ initial stack pointer
//! ```

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::config::{FRAME_WORDS, MIN_STACK_WORDS, STACK_SENTINEL};
use crate::error::{KernelError, Result};
use crate::task::TaskEntry;

/// How a stack region was provisioned. Decides which headroom strategy applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Provisioning {
    /// Caller-owned memory with a compile-time address.
    Static,
    /// Allocator-owned memory, released when the task is deleted.
    Dynamic,
}

enum Storage {
    Static(&'static mut [u32]),
    Dynamic(Box<[u32]>),
}

/// An owned task stack.
pub struct StackRegion {
    storage: Storage,
}

impl StackRegion {
    /// Wrap caller-owned static memory as a stack region and fill it with the
    /// sentinel pattern.
    pub fn reserve_static(words: &'static mut [u32]) -> Result<Self> {
        if words.len() < MIN_STACK_WORDS {
            return Err(KernelError::StackTooSmall);
        }
        words.fill(STACK_SENTINEL);
        Ok(Self {
            storage: Storage::Static(words),
        })
    }

    /// Obtain `size_words` words from the allocator, pre-filled with the
    /// sentinel pattern.
    ///
    /// # Errors
    /// - `StackTooSmall` if `size_words < MIN_STACK_WORDS`
    /// - `OutOfMemory` if the allocator cannot satisfy the request
    pub fn reserve_dynamic(size_words: usize) -> Result<Self> {
        if size_words < MIN_STACK_WORDS {
            return Err(KernelError::StackTooSmall);
        }
        let mut words = Vec::new();
        words
            .try_reserve_exact(size_words)
            .map_err(|_| KernelError::OutOfMemory)?;
        words.resize(size_words, STACK_SENTINEL);
        Ok(Self {
            storage: Storage::Dynamic(words.into_boxed_slice()),
        })
    }

    pub fn provisioning(&self) -> Provisioning {
        match self.storage {
            Storage::Static(_) => Provisioning::Static,
            Storage::Dynamic(_) => Provisioning::Dynamic,
        }
    }

    /// Capacity in words.
    #[inline]
    pub fn len_words(&self) -> usize {
        self.words().len()
    }

    #[inline]
    pub fn words(&self) -> &[u32] {
        match &self.storage {
            Storage::Static(w) => w,
            Storage::Dynamic(w) => w,
        }
    }

    #[inline]
    pub fn words_mut(&mut self) -> &mut [u32] {
        match &mut self.storage {
            Storage::Static(w) => w,
            Storage::Dynamic(w) => w,
        }
    }

    /// Lowest address of the region.
    #[inline]
    pub fn base_ptr(&self) -> *const u32 {
        self.words().as_ptr()
    }

    /// Number of contiguous sentinel words counted from the lowest address.
    ///
    /// The scan stops at the first word that differs from the sentinel. A frame
    /// that happens to store the sentinel value itself is indistinguishable
    /// from untouched memory, so this can over-report headroom.
    pub fn untouched_words(&self) -> usize {
        self.words()
            .iter()
            .take_while(|&&w| w == STACK_SENTINEL)
            .count()
    }

    /// Word index of `sp` within the region, or `None` if `sp` lies outside it.
    /// An index of `len_words()` is the empty-stack position.
    pub fn index_of(&self, sp: *const u32) -> Option<usize> {
        let base = self.base_ptr() as usize;
        let addr = sp as usize;
        if addr < base {
            return None;
        }
        let index = (addr - base) / core::mem::size_of::<u32>();
        (index <= self.len_words()).then_some(index)
    }

    /// Build the initial context frame at the top of the region so that the
    /// first exception return starts executing `entry(param)`.
    ///
    /// ```text
    /// [Hardware stacked frame]   <- high address
    ///   xPSR  (Thumb bit set)
    ///   PC    (task entry point, bit 0 clear)
    ///   LR    (exit trap)
    ///   R12, R3, R2, R1 (0)
    ///   R0    (task parameter)
    /// [Software saved context]
    ///   R11 … R4 (0)             <- returned stack pointer
    /// ```
    ///
    /// Returns the initial stack pointer.
    pub fn init_frame(&mut self, entry: TaskEntry, param: usize, exit: extern "C" fn() -> !) -> *mut u32 {
        let base = self.base_ptr() as usize;
        let top = base + self.len_words() * core::mem::size_of::<u32>();
        // AAPCS: 8-byte aligned stack at exception entry
        let aligned_top = top & !0x07;
        let frame_start = (aligned_top - base) / core::mem::size_of::<u32>() - FRAME_WORDS;

        let frame = &mut self.words_mut()[frame_start..frame_start + FRAME_WORDS];
        frame[..8].fill(0); // R4–R11
        frame[8] = param as u32; // R0
        frame[9] = 0; // R1
        frame[10] = 0; // R2
        frame[11] = 0; // R3
        frame[12] = 0; // R12
        frame[13] = exit as usize as u32; // LR
        frame[14] = entry as usize as u32 & !1; // PC, Thumb bit lives in xPSR
        frame[15] = 0x0100_0000; // xPSR

        frame.as_mut_ptr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaked(words: usize) -> &'static mut [u32] {
        Box::leak(alloc::vec![0u32; words].into_boxed_slice())
    }

    extern "C" fn entry(_param: usize) -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    extern "C" fn exit() -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    #[test]
    fn test_static_region_is_sentinel_filled() {
        let region = StackRegion::reserve_static(leaked(48)).unwrap();
        assert_eq!(region.provisioning(), Provisioning::Static);
        assert_eq!(region.len_words(), 48);
        assert!(region.words().iter().all(|&w| w == STACK_SENTINEL));
        assert_eq!(region.untouched_words(), 48);
    }

    #[test]
    fn test_dynamic_region_is_sentinel_filled() {
        let region = StackRegion::reserve_dynamic(96).unwrap();
        assert_eq!(region.provisioning(), Provisioning::Dynamic);
        assert_eq!(region.untouched_words(), 96);
    }

    #[test]
    fn test_too_small_is_rejected() {
        assert_eq!(
            StackRegion::reserve_dynamic(MIN_STACK_WORDS - 1).err(),
            Some(KernelError::StackTooSmall)
        );
        assert_eq!(
            StackRegion::reserve_static(leaked(4)).err(),
            Some(KernelError::StackTooSmall)
        );
    }

    #[test]
    fn test_allocator_failure_is_out_of_memory() {
        let err = StackRegion::reserve_dynamic(usize::MAX / 2).err();
        assert_eq!(err, Some(KernelError::OutOfMemory));
    }

    #[test]
    fn test_frame_sits_at_top() {
        let mut region = StackRegion::reserve_dynamic(64).unwrap();
        let sp = region.init_frame(entry, 0x1234, exit);
        let index = region.index_of(sp).unwrap();

        assert!(index + FRAME_WORDS <= 64);
        assert!(index + FRAME_WORDS >= 63);
        assert_eq!(region.words()[index + 8], 0x1234);
        assert_eq!(region.words()[index + 15], 0x0100_0000);
        // Only the frame is touched
        assert_eq!(region.untouched_words(), index);
    }

    #[test]
    fn test_index_of_outside_region() {
        let region = StackRegion::reserve_dynamic(32).unwrap();
        let below = (region.base_ptr() as usize - 4) as *const u32;
        let above = (region.base_ptr() as usize + 33 * 4) as *const u32;
        assert_eq!(region.index_of(below), None);
        assert_eq!(region.index_of(above), None);
        assert_eq!(region.index_of(region.base_ptr()), Some(0));
    }
}
