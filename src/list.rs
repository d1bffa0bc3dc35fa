//! The brk-owned block list: an address-ordered singly linked sequence of
//! [`BlockMeta`] headers, rooted at a single process-wide head pointer.
//!
//! Every function here is `unsafe` because it touches the shared `HEAD`
//! global and dereferences raw header pointers with no synchronization.

use std::ptr;

use log::trace;

use crate::align::HEADER_SIZE;
use crate::block::{can_split, payload_of, BlockMeta, BlockStatus};

/// Head of the brk-owned block list. Null until the first brk
/// allocation. This is the allocator's one piece of global mutable state.
static mut HEAD: *mut BlockMeta = ptr::null_mut();

/// True iff no brk block has been created yet.
pub unsafe fn is_empty() -> bool {
    unsafe { HEAD.is_null() }
}

/// Returns the last node in the list, or null if the list is empty.
/// O(n): this crate keeps the list walk instead of caching a tail
/// pointer, so every mutation site stays a single source of truth.
pub unsafe fn end() -> *mut BlockMeta {
    unsafe {
        if HEAD.is_null() {
            return ptr::null_mut();
        }
        let mut current = HEAD;
        while !(*current).next.is_null() {
            current = (*current).next;
        }
        current
    }
}

/// Creates the single initial `Free` block spanning `size` bytes at
/// `ptr`, and makes it the list head.
///
/// # Safety
/// The list must currently be empty, and `ptr` must be the start of a
/// `size + HEADER_SIZE`-byte region this allocator owns exclusively.
pub unsafe fn init(ptr: *mut BlockMeta, size: usize) {
    unsafe {
        debug_assert!(is_empty(), "init called on a non-empty list");
        ptr.write(BlockMeta::new(size, BlockStatus::Free, std::ptr::null_mut()));
        HEAD = ptr;
        trace!("list: initialized with one free block of {size} bytes");
    }
}

/// Appends a new `Alloc` block of `size` bytes at `ptr`, linking it after
/// the current tail.
///
/// # Safety
/// The list must be non-empty, and `ptr` must be the address the brk call
/// that extended the break by `size + HEADER_SIZE` returned.
pub unsafe fn append(ptr: *mut BlockMeta, size: usize) {
    unsafe {
        debug_assert!(!is_empty(), "append called on an empty list");
        ptr.write(BlockMeta::new(size, BlockStatus::Alloc, std::ptr::null_mut()));
        (*end()).next = ptr;
    }
}

/// Single left-to-right pass absorbing every run of adjacent `Free`
/// blocks into the first block of the run. Post: no two adjacent nodes
/// are both `Free`.
pub unsafe fn coalesce() {
    unsafe {
        let mut current = HEAD;
        while !current.is_null() {
            while (*current).is_free() {
                let succ = (*current).next;
                if succ.is_null() || !(*succ).is_free() {
                    break;
                }
                (*current).size += (*succ).size + HEADER_SIZE;
                (*current).next = (*succ).next;
            }
            current = (*current).next;
        }
    }
}

/// Runs [`coalesce`], then linearly scans for the `Free` block with the
/// smallest `size` that is still `>= size`. Ties favor the lower address
/// (first occurrence). Returns null if no block fits.
pub unsafe fn best_fit(size: usize) -> *mut BlockMeta {
    unsafe {
        coalesce();

        let mut current = HEAD;
        let mut best: *mut BlockMeta = ptr::null_mut();
        while !current.is_null() {
            if (*current).is_free() && (*current).size >= size {
                if best.is_null() || (*current).size < (*best).size {
                    best = current;
                }
            }
            current = (*current).next;
        }
        best
    }
}

/// Carves a trailing `Free` remainder off `block` once it has been sized
/// down to `size`, if the remainder is big enough to host a header and at
/// least one payload byte. No-op otherwise.
///
/// # Safety
/// `block.size >= size` must hold; `block` must be a live list node.
pub unsafe fn try_split(block: *mut BlockMeta, size: usize) {
    unsafe {
        let remaining = (*block).size - size;
        if !can_split(remaining) {
            return;
        }

        let new_block = payload_of(block, size) as *mut BlockMeta;
        new_block.write(BlockMeta::new(
            remaining - HEADER_SIZE,
            BlockStatus::Free,
            (*block).next,
        ));

        (*block).size = size;
        (*block).next = new_block;
    }
}

/// If the tail block exists and is `Free`, grows it to exactly `size` by
/// extending the program break by the difference and flips it to
/// `Alloc`. Returns its payload pointer, or null if the tail is absent or
/// not `Free`.
///
/// # Safety
/// A failing brk extension is fatal; see [`crate::syscall::sbrk_allocate`]
/// for the caller that handles this.
pub unsafe fn try_expand_tail(size: usize) -> *mut u8 {
    unsafe {
        let tail = end();
        if tail.is_null() || !(*tail).is_free() {
            return ptr::null_mut();
        }

        let diff = size - (*tail).size;
        let extended = libc::sbrk(diff as libc::intptr_t);
        if extended == usize::MAX as *mut libc::c_void {
            crate::syscall::fatal("sbrk");
        }

        (*tail).size = size;
        (*tail).status = BlockStatus::Alloc;
        trace!("list: expanded tail block by {diff} bytes to {size} total");
        payload_of(tail, 0)
    }
}

/// Writes a `Mapped` header at `ptr`. `Mapped` blocks are never linked
/// into the brk-owned list.
///
/// # Safety
/// `ptr` must be the start of a `size + HEADER_SIZE`-byte mmap'd region.
pub unsafe fn mmap_fill(ptr: *mut BlockMeta, size: usize) {
    unsafe {
        ptr.write(BlockMeta::new(size, BlockStatus::Mapped, ptr::null_mut()));
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Test-only reset of the global list head, and the lock that
    //! serializes every test touching it. `HEAD` (and the program break
    //! it tracks) is process-wide state, and `cargo test` runs tests in
    //! parallel threads by default, so every test that calls into
    //! [`super`] or [`crate::policy`] must hold [`lock`] for its
    //! duration. Not part of the public surface.
    use super::HEAD;
    use std::ptr;
    use std::sync::{Mutex, MutexGuard};

    static TEST_LOCK: Mutex<()> = Mutex::new(());

    /// Serializes access to the global allocator state across tests.
    pub fn lock() -> MutexGuard<'static, ()> {
        TEST_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// # Safety
    /// Leaks whatever brk memory the list currently tracks; only sound to
    /// call while holding [`lock`], between tests that don't depend on
    /// prior allocator state.
    pub unsafe fn reset() {
        unsafe {
            HEAD = ptr::null_mut();
        }
    }
}
