// trap.rs
//
// Unrecoverable stop for broken lifetime invariants. The message goes to the
// trace sink first, then the process is brought down.

use core::fmt;

use crate::trace::{self, Level};

/// Stops the process immediately.
#[cold]
#[inline(never)]
pub fn trap() -> ! {
    #[cfg(feature = "std")]
    {
        std::process::abort()
    }
    #[cfg(not(feature = "std"))]
    {
        // A panic raised while unwinding from another panic aborts.
        struct Abort;
        impl Drop for Abort {
            fn drop(&mut self) {
                panic!("mcom trap");
            }
        }
        let _abort = Abort;
        panic!("mcom trap")
    }
}

#[cold]
#[inline(never)]
pub fn trap_with_message(file: &str, line: u32, msg: fmt::Arguments<'_>) -> ! {
    trace::emit(Level::Error, format_args!("Trap at [{}:{}]: {}", file, line, msg));
    trap()
}

#[doc(hidden)]
#[cold]
#[inline(never)]
pub fn assert_failed(file: &str, line: u32, condition: &str, msg: Option<fmt::Arguments<'_>>) -> ! {
    match msg {
        Some(msg) => trace::emit(
            Level::Error,
            format_args!("Assertion failed at [{}:{}]: {} : {}", file, line, condition, msg),
        ),
        None => trace::emit(
            Level::Error,
            format_args!("Assertion failed at [{}:{}]: {}", file, line, condition),
        ),
    }
    trap()
}
