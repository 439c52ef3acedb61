//! Raw vtable slot invocation.
//!
//! Arguments arrive already lowered to machine words, so a slot call is picked by arity
//! alone: the function pointer is reinterpreted as `extern "system" fn(this, word, ...)`
//! with the right number of word parameters and a 32-bit return.

use std::ffi::c_void;

/// Most parameters a method may declare after the implicit object argument.
pub const MAX_PARAMS: usize = 12;

macro_rules! word {
    ($i:literal) => {
        usize
    };
}

macro_rules! dispatch_arity {
    ($slot:expr, $this:expr, $words:expr; $($n:literal => [$($i:literal),*]),* $(,)?) => {
        match $words.len() {
            $(
                $n => {
                    type SlotFn = unsafe extern "system" fn(*mut c_void $(, word!($i))*) -> i32;
                    // SAFETY: the caller guarantees `$slot` is a function of this shape.
                    let f: SlotFn = unsafe { std::mem::transmute::<*const c_void, SlotFn>($slot) };
                    // SAFETY: as above; `$this` is the live object the slot belongs to.
                    Some(unsafe { f($this $(, $words[$i])*) })
                }
            )*
            _ => None,
        }
    };
}

/// Calls `slot` with `this` first and then `words`, returning the raw 32-bit result.
///
/// Returns `None` when `words` is longer than [`MAX_PARAMS`].
///
/// # Safety
/// `slot` must be a function taking the object pointer followed by `words.len()`
/// integer-class arguments with the platform calling convention, and `this` must be the
/// live object whose vtable `slot` was read from.
pub(crate) unsafe fn call_slot(slot: *const c_void, this: *mut c_void, words: &[usize]) -> Option<i32> {
    dispatch_arity!(slot, this, words;
        0 => [],
        1 => [0],
        2 => [0, 1],
        3 => [0, 1, 2],
        4 => [0, 1, 2, 3],
        5 => [0, 1, 2, 3, 4],
        6 => [0, 1, 2, 3, 4, 5],
        7 => [0, 1, 2, 3, 4, 5, 6],
        8 => [0, 1, 2, 3, 4, 5, 6, 7],
        9 => [0, 1, 2, 3, 4, 5, 6, 7, 8],
        10 => [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
        11 => [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10],
        12 => [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
    )
}
