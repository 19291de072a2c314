//! Verbosity-gated diagnostics for the schedule engine.
//!
//! Every recompute is synchronous on the render thread, so logging must cost
//! nothing when disabled (verbosity=0). Levels:
//! - 0: SILENT
//! - 1: SUMMARY (per-recompute totals, cycle edges removed)
//! - 2: DETAIL (dropped or unresolved links, viewport window changes)
//! - 3: TRACE (per-node forward/backward pass values)

pub const VERBOSITY_SILENT: u8 = 0;
pub const VERBOSITY_SUMMARY: u8 = 1;
pub const VERBOSITY_DETAIL: u8 = 2;
pub const VERBOSITY_TRACE: u8 = 3;

/// Log at SUMMARY level (verbosity >= 1).
#[macro_export]
macro_rules! log_summary {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_SUMMARY {
            eprintln!("[wbs] {}", format_args!($($arg)*));
        }
    };
}

/// Log at DETAIL level (verbosity >= 2).
#[macro_export]
macro_rules! log_detail {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_DETAIL {
            eprintln!("[wbs]   {}", format_args!($($arg)*));
        }
    };
}

/// Log at TRACE level (verbosity >= 3).
///
/// Used inside the CPM passes; keep arguments cheap to evaluate.
#[macro_export]
macro_rules! log_trace {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_TRACE {
            eprintln!("[wbs]     {}", format_args!($($arg)*));
        }
    };
}
