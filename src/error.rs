//! The recoverable error regime. Fatal syscall failures do not produce a
//! value of this type — see [`crate::syscall::fatal`].

use std::fmt;

/// Why an allocation request could not be satisfied without touching the
/// OS at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The request was for zero bytes (or `calloc`'s `nmemb * size`
    /// collapsed to zero).
    ZeroSize,
    /// The requested size (or, for `calloc`, the `nmemb * size` product)
    /// is close enough to `usize::MAX` that the alignment or header-size
    /// arithmetic could wrap.
    Overflow,
    /// `realloc` was asked to resize a block that is already `Free` — a
    /// caller error, not a sizing problem.
    AlreadyFreed,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::ZeroSize => write!(f, "requested allocation size is zero"),
            AllocError::Overflow => write!(f, "requested allocation size overflows"),
            AllocError::AlreadyFreed => write!(f, "realloc called on an already-freed block"),
        }
    }
}

impl std::error::Error for AllocError {}
