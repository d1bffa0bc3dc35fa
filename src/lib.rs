//! # blkalloc — a best-fit heap allocator over `brk` and `mmap`
//!
//! This crate provides a small general-purpose allocator implementing the
//! four canonical operations — [`alloc`], [`free`], [`calloc_zeroed`], and
//! [`realloc`] — on top of two OS primitives: `sbrk`, for a contiguous,
//! in-process-owned brk region, and `mmap`/`munmap`, for large stand-alone
//! anonymous mappings.
//!
//! ## How It Works
//!
//! Requests below a threshold (128 KiB) are served from the brk region:
//! an address-ordered singly linked list of block headers, searched
//! best-fit, split on overfit, and coalesced on demand. Requests at or
//! above the threshold go straight to `mmap` and are reclaimed with
//! `munmap` on free — they never touch the list.
//!
//! ```text
//!   Brk region (address-ordered list):
//!   ┌─────────┬────────┬─────────┬────────┬─────────┬────────┐
//!   │ Header  │ Alloc  │ Header  │  Free  │ Header  │ Alloc  │
//!   └─────────┴────────┴─────────┴────────┴─────────┴────────┘
//!    next ───────────────▶ next ──────────────▶ next ──▶ null
//!
//!   Mmap region (stand-alone, one mapping per block):
//!   ┌─────────┬──────────────────────────────────────────────┐
//!   │ Header  │                  Payload                     │
//!   └─────────┴──────────────────────────────────────────────┘
//!    next = null, status = Mapped, never in the list above
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   blkalloc
//!   ├── align    - alignment quantum, layout constants, overflow guard
//!   ├── block    - block header layout, header/payload pointer arithmetic
//!   ├── error    - the recoverable AllocError regime
//!   ├── list     - the brk-owned block list: init/append/coalesce/best_fit/split
//!   ├── syscall  - sbrk/mmap/munmap wrappers and the fatal-abort channel
//!   └── policy   - the four public operations and their Result-returning
//!                  counterparts
//! ```
//!
//! ## Safety
//!
//! Every public function here is `unsafe`: they all read and write one
//! process-wide mutable block list with no locking (see
//! [`policy`] module docs for the contract each one upholds). This crate
//! is single-threaded by design and is not reentrant: calling any of
//! these functions from a signal handler or concurrently from more than
//! one thread is undefined behavior.
//!
//! ## Non-goals
//!
//! No thread safety, no multi-arena design, no size-class segregation or
//! slab caches, no debugging/poisoning modes, no fragmentation reclaim to
//! the OS beyond the trivial mmap-on-free case, no alignment guarantee
//! beyond 8 bytes.

pub mod align;
pub mod block;
pub mod error;
mod list;
mod policy;
mod syscall;

pub use error::AllocError;
pub use policy::{alloc, calloc_zeroed, free, realloc, try_alloc, try_calloc, try_realloc};
