//! Rendering syscall arguments and return values for log records.

use nix::errno::Errno;
use nix::unistd::Pid;

use crate::memory;


/// Threshold above which plain integers switch to hexadecimal, which reads
/// better for addresses and flag words.
const HEX_THRESHOLD: i64 = 1_000_000;

/// Render one syscall argument according to its declared type.
///
/// Character-pointer types are chased into the tracee's memory; everything
/// else renders as an integer, in hex past [`HEX_THRESHOLD`].
pub fn argument(pid: Pid, arg_type: &str, value: i64) -> String {
    if arg_type.contains("char") && arg_type.contains('*') {
        return memory::read_cstring(pid, value as u64);
    }
    if value > HEX_THRESHOLD {
        return format!("{value:#x}");
    }
    value.to_string()
}

/// Render a syscall return value read out of `rax`.
///
/// A negative value is an errno in the kernel's return convention and is
/// rendered with the matching description.
pub fn return_value(value: i64) -> String {
    if value < 0 {
        format!("{value} ({})", Errno::from_raw((-value) as i32).desc())
    } else if value > HEX_THRESHOLD {
        format!("{value:#x}")
    } else {
        value.to_string()
    }
}
