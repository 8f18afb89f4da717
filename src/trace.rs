// trace.rs
//
// Lightweight tracing hooks for no_std builds.

use core::fmt;
use core::sync::atomic::{AtomicPtr, Ordering};

/// Trace hook invoked with formatted arguments.
pub type TraceHook = for<'a> fn(fmt::Arguments<'a>);

static TRACE_HOOK: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Level {
    Error,
    Trace,
}

/// Registers a trace hook.
#[inline]
pub fn set_trace_hook(hook: TraceHook) {
    TRACE_HOOK.store(hook as *const () as *mut (), Ordering::Release);
}

/// Clears the trace hook.
#[inline]
pub fn clear_trace_hook() {
    TRACE_HOOK.store(core::ptr::null_mut(), Ordering::Release);
}

/// Emits a trace event if a hook is installed.
#[inline]
pub fn trace(args: fmt::Arguments<'_>) {
    emit(Level::Trace, args);
}

/// Emits an event at `level` to the installed hook and, with the `log`
/// feature, to the `log` facade.
pub fn emit(level: Level, args: fmt::Arguments<'_>) {
    #[cfg(feature = "log")]
    {
        match level {
            Level::Error => log::error!(target: "mcom", "{}", args),
            Level::Trace => log::trace!(target: "mcom", "{}", args),
        }
    }
    #[cfg(not(feature = "log"))]
    let _ = level;

    let ptr = TRACE_HOOK.load(Ordering::Acquire);
    if ptr.is_null() {
        return;
    }
    let hook: TraceHook = unsafe { core::mem::transmute::<*mut (), TraceHook>(ptr) };
    hook(args);
}

/// Error report helper with message.
#[inline]
pub fn report_error_msg(file: &str, line: u32, status: crate::HRESULT, msg: fmt::Arguments<'_>) {
    emit(
        Level::Error,
        format_args!("mcom error {:#010x} at {}:{} - {}", status, file, line, msg),
    );
}
