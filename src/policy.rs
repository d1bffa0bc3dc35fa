//! Allocation policy: routes requests between brk and mmap, prepays the
//! first brk region, and implements the four public operations plus their
//! `Result`-returning counterparts.
//!
//! The prepayment step inserts a single `Free` block spanning the
//! prepayment, so it is immediately usable by the very next `best_fit`
//! rather than sitting `Alloc` and unreachable.

use std::ptr::{self, NonNull};

use log::{debug, trace, warn};

use crate::align::{align_up, size_overflows, HEADER_SIZE, INIT_BRK, MMAP_THRESHOLD};
use crate::block::{header_of, BlockStatus};
use crate::error::AllocError;
use crate::list;
use crate::syscall::{mmap_allocate, sbrk_allocate};

static mut PAGE_SIZE: usize = 0;

fn page_size() -> usize {
    unsafe {
        if PAGE_SIZE == 0 {
            PAGE_SIZE = libc::sysconf(libc::_SC_PAGESIZE) as usize;
        }
        PAGE_SIZE
    }
}

/// Ensures the list holds its initial prepaid region before the very
/// first small allocation, so a run of small requests avoids per-request
/// syscalls. Inserts one `Free` block spanning `INIT_BRK - HEADER_SIZE`
/// payload bytes.
///
/// `sbrk_allocate` routes an empty list through [`list::init`], which
/// writes the header as `Free` directly, with no special-casing needed
/// here in `initialise_heap` itself.
unsafe fn initialise_heap() {
    unsafe {
        sbrk_allocate(INIT_BRK - HEADER_SIZE);
        debug!("policy: prepaid {INIT_BRK} bytes of heap");
    }
}

/// Shared body for `alloc` and the brk-vs-mmap routing half of `calloc`:
/// validates the size, decides brk vs mmap against `threshold`, and
/// returns the payload pointer.
unsafe fn alloc_common(size: usize, threshold: usize) -> Result<NonNull<u8>, AllocError> {
    unsafe {
        if size == 0 {
            return Err(AllocError::ZeroSize);
        }
        if size_overflows(size) {
            return Err(AllocError::Overflow);
        }

        let aligned = align_up(size);
        let total = aligned + HEADER_SIZE;

        if list::is_empty() && total < threshold {
            initialise_heap();
        }

        let payload = if total >= threshold {
            trace!("policy: routing {size} bytes to mmap (total {total} >= {threshold})");
            mmap_allocate(total, aligned)
        } else {
            let block = list::best_fit(aligned);
            if !block.is_null() {
                (*block).status = BlockStatus::Alloc;
                list::try_split(block, aligned);
                crate::block::payload_of(block, 0)
            } else {
                sbrk_allocate(aligned)
            }
        };

        NonNull::new(payload).ok_or(AllocError::Overflow)
    }
}

/// `try_alloc`: the `Result`-returning counterpart to [`alloc`].
///
/// # Safety
/// Must be called single-threaded; this allocator keeps no internal
/// synchronization.
pub unsafe fn try_alloc(size: usize) -> Result<NonNull<u8>, AllocError> {
    unsafe { alloc_common(size, MMAP_THRESHOLD) }
}

/// `try_calloc`: the `Result`-returning counterpart to [`calloc_zeroed`].
///
/// Routes through the OS page size rather than [`MMAP_THRESHOLD`]:
/// large zero-fill requests go through `mmap`, which
/// hands back already-zeroed pages, but the payload is zeroed
/// unconditionally regardless of path.
///
/// # Safety
/// Must be called single-threaded; this allocator keeps no internal
/// synchronization.
pub unsafe fn try_calloc(nmemb: usize, size: usize) -> Result<NonNull<u8>, AllocError> {
    unsafe {
        // checked_mul catches the nmemb*size overflow before it ever
        // reaches alloc_common's size_overflows check on the product.
        let total = nmemb.checked_mul(size).ok_or(AllocError::Overflow)?;
        let ptr = alloc_common(total, page_size())?;
        ptr::write_bytes(ptr.as_ptr(), 0, total);
        Ok(ptr)
    }
}

/// `try_realloc`: the `Result`-returning counterpart to [`realloc`].
/// Unlike `alloc`/`calloc`, a null `ptr` or zero `size` are not errors —
/// they degrade to `alloc`/`free` instead; callers use the raw `realloc`
/// entry point for those cases, and this one assumes a genuine resize of
/// a live, non-null block.
///
/// # Safety
/// `ptr` must be a payload pointer this allocator previously returned and
/// not yet freed.
pub unsafe fn try_realloc(ptr: *mut u8, size: usize) -> Result<NonNull<u8>, AllocError> {
    unsafe {
        if size_overflows(size) {
            return Err(AllocError::Overflow);
        }
        let block = header_of(ptr);
        if (*block).is_free() {
            return Err(AllocError::AlreadyFreed);
        }

        let aligned = align_up(size);

        if aligned < MMAP_THRESHOLD && (*block).status == BlockStatus::Alloc {
            if (*block).size >= aligned {
                list::try_split(block, aligned);
                return NonNull::new(ptr).ok_or(AllocError::Overflow);
            }

            let mut current = (*block).next;
            while !current.is_null() && (*current).is_free() {
                (*block).size += (*current).size + HEADER_SIZE;
                (*block).next = (*current).next;
                current = (*current).next;

                if (*block).size >= aligned {
                    list::try_split(block, aligned);
                    return NonNull::new(ptr).ok_or(AllocError::Overflow);
                }
            }

            // Tail extension only fires when this walk ran off the end
            // of the list. A walk that halted at a non-tail Alloc
            // successor does not fall through to tail extension even if
            // the real tail (further along) is free and extensible.
            if current.is_null() {
                let deficit = aligned - (*block).size;
                if deficit < MMAP_THRESHOLD {
                    let extended = libc::sbrk(deficit as libc::intptr_t);
                    if extended == usize::MAX as *mut libc::c_void {
                        crate::syscall::fatal("sbrk");
                    }
                    (*block).size += deficit;
                    return NonNull::new(ptr).ok_or(AllocError::Overflow);
                }
            }
        }

        let fresh = try_alloc(size)?;
        ptr::copy_nonoverlapping(
            ptr,
            fresh.as_ptr(),
            std::cmp::min((*block).size, size),
        );
        free(ptr);
        Ok(fresh)
    }
}

/// Allocates `size` bytes, 8-aligned, returning null on a zero-sized or
/// overflowing request.
///
/// # Safety
/// Must be called single-threaded; the returned pointer must eventually
/// be passed to [`free`] or [`realloc`] exactly once, or not at all.
pub unsafe fn alloc(size: usize) -> *mut u8 {
    unsafe {
        try_alloc(size)
            .map(|p| p.as_ptr())
            .unwrap_or(ptr::null_mut())
    }
}

/// Frees a payload pointer previously returned by this allocator.
/// Null is a no-op; freeing an already-`Free` block is tolerated
/// rather than treated as an error.
///
/// # Safety
/// `ptr` must be null or a payload pointer this allocator returned and
/// has not already reclaimed from the OS.
pub unsafe fn free(ptr: *mut u8) {
    unsafe {
        if ptr.is_null() {
            return;
        }

        let block = header_of(ptr);
        match (*block).status {
            BlockStatus::Free => {
                warn!("policy: double free tolerated");
            }
            BlockStatus::Alloc => {
                (*block).status = BlockStatus::Free;
            }
            BlockStatus::Mapped => {
                let total = (*block).size + HEADER_SIZE;
                if libc::munmap(block as *mut libc::c_void, total) == -1 {
                    crate::syscall::fatal("munmap");
                }
                trace!("policy: munmap'd {total} bytes");
            }
        }
    }
}

/// Allocates `nmemb * size` zero-filled bytes, or null on a zero-sized or
/// overflowing request (including overflow of the product itself).
///
/// # Safety
/// See [`alloc`].
pub unsafe fn calloc_zeroed(nmemb: usize, size: usize) -> *mut u8 {
    unsafe {
        try_calloc(nmemb, size)
            .map(|p| p.as_ptr())
            .unwrap_or(ptr::null_mut())
    }
}

/// Resizes a previous allocation, preserving the first `min(old, new)`
/// bytes. A null `ptr` behaves like `alloc`; a zero `size` frees `ptr`
/// and returns null; on allocation failure the original allocation is
/// preserved and null is returned.
///
/// # Safety
/// `ptr` must be null or a payload pointer this allocator returned and
/// not yet freed.
pub unsafe fn realloc(ptr: *mut u8, size: usize) -> *mut u8 {
    unsafe {
        if ptr.is_null() {
            return alloc(size);
        }
        if size == 0 {
            free(ptr);
            return ptr::null_mut();
        }

        try_realloc(ptr, size)
            .map(|p| p.as_ptr())
            .unwrap_or(ptr::null_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::list::test_support;

    /// Caller must already hold [`test_support::lock`].
    unsafe fn reset() {
        let _ = env_logger::builder().is_test(true).try_init();
        unsafe {
            test_support::reset();
        }
    }

    #[test]
    fn alloc_zero_returns_null() {
        let _guard = test_support::lock();
        unsafe {
            reset();
            assert!(alloc(0).is_null());
        }
    }

    #[test]
    fn alloc_then_free_then_realloc_null_is_alloc() {
        let _guard = test_support::lock();
        unsafe {
            reset();
            let p = realloc(ptr::null_mut(), 64);
            assert!(!p.is_null());
            free(p);
        }
    }

    #[test]
    fn realloc_zero_size_frees_and_returns_null() {
        let _guard = test_support::lock();
        unsafe {
            reset();
            let p = alloc(64);
            assert!(!p.is_null());
            let r = realloc(p, 0);
            assert!(r.is_null());
        }
    }

    #[test]
    fn small_alloc_prepays_heap_and_splits() {
        let _guard = test_support::lock();
        unsafe {
            reset();
            let p = alloc(100);
            assert!(!p.is_null());
            assert_eq!((p as usize) % 8, 0);

            let head = list::end();
            // Walk from the true head (list::end only gives the tail);
            // reconstruct via header_of on p to inspect the first block.
            let first = header_of(p);
            assert_eq!((*first).status, BlockStatus::Alloc);
            assert_eq!((*first).size, align_up(100));
            assert!(!(*first).next.is_null());
            assert_eq!((*(*first).next).status, BlockStatus::Free);
            let _ = head;
        }
    }

    #[test]
    fn free_then_alloc_same_size_reuses_block() {
        let _guard = test_support::lock();
        unsafe {
            reset();
            let p1 = alloc(64);
            free(p1);
            let p2 = alloc(64);
            assert_eq!(p1, p2);
        }
    }

    #[test]
    fn coalesce_merges_three_freed_neighbors_for_a_bigger_request() {
        let _guard = test_support::lock();
        unsafe {
            reset();
            let a = alloc(64);
            let b = alloc(64);
            let c = alloc(64);
            free(a);
            free(c);
            free(b);

            let big = alloc(200);
            assert!(!big.is_null());
            // The coalesced run should have started exactly at `a`'s header.
            assert_eq!(header_of(big), header_of(a));
        }
    }

    #[test]
    fn realloc_grow_absorbs_freed_neighbor_in_place() {
        let _guard = test_support::lock();
        unsafe {
            reset();
            let a = alloc(64);
            let b = alloc(64);
            free(b);
            let q = realloc(a, 200);
            assert_eq!(q, a);
        }
    }

    #[test]
    fn realloc_noop_fit_returns_same_pointer() {
        let _guard = test_support::lock();
        unsafe {
            reset();
            let a = alloc(64);
            let q = realloc(a, 64);
            assert_eq!(q, a);
        }
    }

    #[test]
    fn calloc_zero_fills_payload() {
        let _guard = test_support::lock();
        unsafe {
            reset();
            let p = calloc_zeroed(16, 8);
            assert!(!p.is_null());
            let bytes = std::slice::from_raw_parts(p, 128);
            assert!(bytes.iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn calloc_zero_args_return_null() {
        let _guard = test_support::lock();
        unsafe {
            reset();
            assert!(calloc_zeroed(0, 16).is_null());
            assert!(calloc_zeroed(16, 0).is_null());
        }
    }

    #[test]
    fn calloc_nmemb_times_size_overflow_returns_null() {
        let _guard = test_support::lock();
        unsafe {
            reset();
            assert!(calloc_zeroed(usize::MAX, 2).is_null());
        }
    }

    #[test]
    fn mmap_path_for_large_request_is_not_in_brk_list() {
        let _guard = test_support::lock();
        unsafe {
            reset();
            let before_empty = list::is_empty();
            let p = alloc(200 * 1024);
            assert!(!p.is_null());
            // A pure mmap allocation must not touch the brk list at all.
            assert_eq!(list::is_empty(), before_empty);
            free(p);
        }
    }

    #[test]
    fn double_free_is_tolerated() {
        let _guard = test_support::lock();
        unsafe {
            reset();
            let p = alloc(32);
            free(p);
            free(p);
        }
    }

    #[test]
    fn large_calloc_routes_through_mmap_and_still_zero_fills() {
        let _guard = test_support::lock();
        unsafe {
            reset();
            // nmemb * size clears the page-size threshold calloc uses
            // instead of MMAP_THRESHOLD (spec concrete scenario 6).
            let p = calloc_zeroed(1024, 8);
            assert!(!p.is_null());
            let bytes = std::slice::from_raw_parts(p, 1024 * 8);
            assert!(bytes.iter().all(|&b| b == 0));
            free(p);
        }
    }

    #[test]
    fn realloc_on_mapped_block_falls_through_to_copy_and_free() {
        let _guard = test_support::lock();
        unsafe {
            reset();
            // A Mapped block never satisfies try_realloc's `status ==
            // Alloc` guard, so growing it always takes the copy-and-free
            // path rather than attempting in-place growth (spec.md
            // §4.4's "Note on the MAPPED case").
            let p = alloc(200 * 1024);
            assert!(!p.is_null());
            assert_eq!((*header_of(p)).status, BlockStatus::Mapped);

            std::ptr::write_bytes(p, 0xAB, 64);
            let grown = realloc(p, 300 * 1024);
            assert!(!grown.is_null());
            assert_ne!(grown, p);

            let bytes = std::slice::from_raw_parts(grown, 64);
            assert!(bytes.iter().all(|&b| b == 0xAB));
            free(grown);
        }
    }

    #[test]
    fn realloc_on_tail_block_extends_the_break_by_the_deficit() {
        let _guard = test_support::lock();
        unsafe {
            reset();
            // Prepay, then consume the entire remaining free tail so the
            // next allocation becomes the list tail with no trailing
            // free remainder (spec concrete scenario 4).
            let _first = alloc(1000);
            let tail = list::end();
            assert!((*tail).is_free());
            let remaining = (*tail).size;

            let x = alloc(remaining);
            assert!(!x.is_null());
            let block = header_of(x);
            assert!((*block).next.is_null());
            assert_eq!((*block).size, remaining);

            let grown = realloc(x, remaining + 4096);
            assert_eq!(grown, x);
            assert_eq!((*block).size, remaining + 4096);
        }
    }
}
