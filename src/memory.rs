//! Reading string data out of a tracee's address space.

use nix::sys::ptrace;
use nix::unistd::Pid;


/// Hard cap on the bytes read out of a tracee for a single string argument.
const MAX_STRING_BYTES: usize = 256;

const WORD: usize = std::mem::size_of::<libc::c_long>();

/// Read a NUL-terminated string at `addr` in the tracee's memory and return
/// its display form.
///
/// A null pointer renders as the literal `NULL`. Otherwise memory is peeked
/// one word at a time until a NUL byte, a read failure, or the
/// [`MAX_STRING_BYTES`] cap: the result is the accumulated bytes in double
/// quotes, with `...` appended inside the quotes when the cap cut the read
/// short, or a quoted error marker when the peek failed.
///
/// `PTRACE_PEEKDATA` returns the data word in-band, so a word of all ones is
/// ambiguous with an error return. `ptrace::read` clears `errno` before the
/// raw call and reports an error only when `errno` is set afterwards, which
/// resolves the ambiguity.
pub fn read_cstring(pid: Pid, addr: u64) -> String {
    if addr == 0 {
        return "NULL".to_owned();
    }

    let mut bytes = Vec::with_capacity(MAX_STRING_BYTES);

    for i in 0..(MAX_STRING_BYTES / WORD) {
        let word_addr = addr.wrapping_add((i * WORD) as u64);

        let word = match ptrace::read(pid, word_addr as ptrace::AddressType) {
            Ok(word) => word,
            Err(errno) => {
                return format!("\"<error reading at {addr:#x}: {}>\"", errno.desc());
            },
        };

        for byte in word.to_ne_bytes() {
            if byte == 0 {
                return format!("\"{}\"", String::from_utf8_lossy(&bytes));
            }
            bytes.push(byte);
        }
    }

    format!("\"{}...\"", String::from_utf8_lossy(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_pointer() {
        // The address short-circuits before any ptrace request is made, so
        // any PID will do.
        assert_eq!(read_cstring(Pid::this(), 0), "NULL");
    }

    #[test]
    fn test_peek_failure_renders_error_marker() {
        // We are not tracing ourselves, so the peek fails outright.
        let rendered = read_cstring(Pid::this(), 0x1000);

        assert!(rendered.starts_with("\"<error reading at 0x1000: "));
        assert!(rendered.ends_with(">\""));
    }
}
