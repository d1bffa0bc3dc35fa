//! Alignment quantum, layout constants, and the overflow guard.
//!
//! Every block header and every payload address in this allocator sits on
//! an 8-byte boundary. `ALIGN_Q` is that boundary; the rest of this module
//! is the arithmetic built on top of it.

use std::mem;

use crate::block::BlockMeta;

/// The alignment quantum. Every payload address and every header address
/// is a multiple of this value.
pub const ALIGN_Q: usize = 8;

/// The natural size of [`BlockMeta`], rounded up to [`ALIGN_Q`]. Every
/// block's payload begins exactly this many bytes past its header.
pub const HEADER_SIZE: usize = align_up(mem::size_of::<BlockMeta>());

/// Size of the first `sbrk` call, made once when the list is empty and a
/// small-enough request arrives. Amortizes the syscall cost for a run of
/// small allocations.
pub const INIT_BRK: usize = 128 * 1024;

/// Requests whose total size (payload + header) reach this threshold are
/// routed to `mmap` instead of the brk-owned list.
pub const MMAP_THRESHOLD: usize = 128 * 1024;

/// Rounds `size` up to the next multiple of [`ALIGN_Q`].
pub const fn align_up(size: usize) -> usize {
    (size + ALIGN_Q - 1) & !(ALIGN_Q - 1)
}

/// True iff `n` is close enough to `usize::MAX` that adding header
/// overhead to it could wrap. Taken from musl's `size_overflows` (same
/// guard as `helpers.h`'s `size_overflows`): reserve a 4096-byte margin
/// below `usize::MAX / 2`.
pub const fn size_overflows(n: usize) -> bool {
    n >= usize::MAX / 2 - 4096
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_next_quantum() {
        for i in 0..10 {
            let expected = ALIGN_Q * (i + 1);
            for size in (ALIGN_Q * i + 1)..=(ALIGN_Q * (i + 1)) {
                assert_eq!(align_up(size), expected);
            }
        }
    }

    #[test]
    fn align_up_of_zero_is_zero() {
        assert_eq!(align_up(0), 0);
    }

    #[test]
    fn size_overflows_flags_near_max() {
        assert!(!size_overflows(1024));
        assert!(!size_overflows(usize::MAX / 4));
        assert!(size_overflows(usize::MAX / 2));
        assert!(size_overflows(usize::MAX));
    }
}
