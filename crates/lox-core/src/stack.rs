//! Stack growth for the recursive stages.
//!
//! The parser, resolver and interpreter all recurse once per nested
//! expression, statement or call. Wrapping those entry points in
//! [`ensure_sufficient_stack`] lets deeply nested programs grow the native
//! stack on demand instead of overflowing it.

/// Grow when less than this much stack is left.
const RED_ZONE: usize = 128 * 1024;

/// Size of each newly allocated stack segment.
const STACK_PER_RECURSION: usize = 1024 * 1024;

#[inline]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}
