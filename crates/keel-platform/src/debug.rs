//! Debugging aids: debug output, debugger queries, fatal reports.

use keel_core::text::wide_to_string;

use crate::os;

/// Writes to the debug channel (standard error on this backend).
pub fn output_debug_string(text: &str) {
    eprint!("{text}");
}

/// Line-terminated variant of [`output_debug_string`].
pub fn output_debug_string_line(text: &str) {
    eprintln!("{text}");
}

/// Wide variant of [`output_debug_string`].
pub fn output_debug_string_wide(text: &[u16]) {
    output_debug_string(&wide_to_string(text));
}

/// Wide variant of [`output_debug_string_line`].
pub fn output_debug_string_wide_line(text: &[u16]) {
    output_debug_string_line(&wide_to_string(text));
}

/// Whether a user-mode debugger is attached to this process.
pub fn is_debugger_present() -> bool {
    os::is_debugger_present()
}

/// Signals a breakpoint to an attached debugger.
pub fn debug_break() {
    os::debug_break();
}

/// Polls for a debugger to attach, giving up after `timeout_ms`.
pub fn wait_for_attach(timeout_ms: u32) {
    let deadline =
        std::time::Instant::now() + std::time::Duration::from_millis(u64::from(timeout_ms));
    while !is_debugger_present() && std::time::Instant::now() < deadline {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }
}

/// Reports a failed assertion with its source location and halts.
///
/// Continuing past a broken invariant is unsafe; this path never
/// returns.
pub fn assert_report(expression: &str, file: &str, line: u32) -> ! {
    output_debug_string_line(&format!("assertion failed: {expression} ({file}:{line})"));
    panic!("assertion failed: {expression} ({file}:{line})");
}

/// Debug-build contract check. Release builds compile the check out;
/// such defects must be caught under the debug configuration.
#[macro_export]
macro_rules! platform_assert {
    ($cond:expr) => {
        if cfg!(debug_assertions) && !$cond {
            $crate::debug::assert_report(stringify!($cond), file!(), line!());
        }
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn passing_assert_is_silent() {
        platform_assert!(1 + 1 == 2);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "assertion failed: 1 == 2")]
    fn failing_assert_names_the_expression() {
        platform_assert!(1 == 2);
    }
}
