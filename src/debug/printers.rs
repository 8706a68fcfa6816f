// src/debug/printers.rs

//! Printer macros and helpers for warnings, errors, and debug output.

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `d`ebug `e`println! an `err`or
#[macro_export]
macro_rules! de_err {
    (
        $($args:tt)*
    ) => {
        {
            #[cfg(any(debug_assertions,test))]
            eprint!("ERROR: ");
            #[cfg(any(debug_assertions,test))]
            eprintln!($($args)*)
        }
    }
}
pub use de_err;

/// `d`ebug `e`println! an `warn`ing
#[macro_export]
macro_rules! de_wrn {
    (
        $($args:tt)*
    ) => {
        {
            #[cfg(any(debug_assertions,test))]
            eprint!("WARNING: ");
            #[cfg(any(debug_assertions,test))]
            eprintln!($($args)*)
        }
    }
}
pub use de_wrn;

/// `e`println! an `err`or
#[macro_export]
macro_rules! e_err {
    (
        $($args:tt)*
    ) => {
        {
            eprint!("ERROR: ");
            eprintln!($($args)*)
        }
    }
}
pub use e_err;

/// `e`println! a `warn`ing
#[macro_export]
macro_rules! e_wrn {
    (
        $($args:tt)*
    ) => {
        {
            eprint!("WARNING: ");
            eprintln!($($args)*)
        }
    }
}
pub use e_wrn;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// helper functions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Longest snippet of a damaged payload rendered by
/// [`buffer_to_string_noraw`].
pub const NORAW_SNIPPET_MAX: usize = 64;

/// turn passed char into a pictoral representation if it is a C0 control
/// character, e.g. '\n' returns '␊'. Other chars are returned as-is.
///
/// Keeps the printing width of a control character to 1.
pub const fn char_to_char_noraw(c: char) -> char {
    // https://en.wikipedia.org/wiki/Control_Pictures
    match c as u32 {
        0..=31 => match char::from_u32(0x2400 + c as u32) {
            Some(c_) => c_,
            None => c,
        },
        127 => '␡',
        _ => c,
    }
}

/// transform buffer of bytes to a non-raw `String`, at most
/// [`NORAW_SNIPPET_MAX`] chars followed by `…` if truncated.
/// Bytes may be invalid UTF-8.
pub fn buffer_to_string_noraw(buffer: &[u8]) -> String {
    let lossy = String::from_utf8_lossy(buffer);
    let mut s2: String = String::with_capacity(NORAW_SNIPPET_MAX + 4);
    for (i, c) in lossy.chars().enumerate() {
        if i >= NORAW_SNIPPET_MAX {
            s2.push('…');
            break;
        }
        s2.push(char_to_char_noraw(c));
    }

    s2
}
