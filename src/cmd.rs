use std::ffi::CString;
use std::os::raw::c_char;

use nix::{
    sys::{ptrace, signal::{raise, Signal}},
    unistd::{fork, ForkResult, Pid},
};
use tracing::debug;

use crate::error::{Error, Result};


/// Command to spawn as a child process to be traced.
#[derive(Clone, Debug)]
pub struct Command {
    /// Argument vector to pass to `execvp()`. The first element is the
    /// program, looked up on `PATH` when it contains no slash.
    argv: Vec<CString>,
}

impl Command {
    pub fn new(argv: Vec<impl Into<Vec<u8>>>) -> Result<Self> {
        if argv.is_empty() {
            return Err(Error::EmptyCommand);
        }

        // Ensure we own NUL-terminated strings for the foreign exec call.
        //
        // We're heap-allocating, so always do this before forking.
        let argv: std::result::Result<Vec<_>, _> = argv
            .into_iter()
            .map(CString::new)
            .collect();

        Ok(Self { argv: argv? })
    }

    /// Fork and exec a child process determined by `self.argv`.
    ///
    /// The child sets itself as a tracee of the parent, then raises
    /// `SIGSTOP` so the parent can configure trace options and resume it
    /// without a race. If the exec itself fails the child terminates with
    /// status 127.
    pub fn fork_exec(self) -> Result<Pid> {
        // This call heap-allocates, and must occur pre-fork.
        let argv = NullTerminatedPointerArray::new(&self.argv);

        match unsafe { fork() }.map_err(|source| Error::Spawn { source })? {
            ForkResult::Child => {
                // Past the fork, `?` is off limits: error conversion may
                // call `malloc`, which is not async-signal-safe. The only
                // way out of a failed setup is `_exit`.

                if ptrace::traceme().is_err() {
                    unsafe { libc::_exit(127) };
                }

                if raise(Signal::SIGSTOP).is_err() {
                    unsafe { libc::_exit(127) };
                }

                unsafe {
                    libc::execvp(argv[0], argv.as_ptr());

                    // Only reached when the exec failed.
                    libc::_exit(127);
                }
            },
            ForkResult::Parent { child } => {
                debug!(pid = child.as_raw(), "forked tracee");

                Ok(child)
            },
        }
    }
}

// View of a slice of `CString` values, as a null-terminated array of
// pointers to `c_char`. For passing args to `execvp()`.
struct NullTerminatedPointerArray<'a> {
    // Owned pointer array which must always be NULL-terminated.
    array: Vec<*const libc::c_char>,

    // Borrow of pointed-to `CString` data. Pointers in `array` are valid
    // only while we have this borrow.
    _data: &'a [CString],
}

impl<'a> NullTerminatedPointerArray<'a> {
    pub fn new(data: &'a [CString]) -> Self {
        let mut array: Vec<_> = data
            .iter()
            .map(|s| s.as_ptr())
            .collect();
        array.push(std::ptr::null());

        Self { array, _data: data }
    }
}

impl<'a> std::ops::Deref for NullTerminatedPointerArray<'a> {
    type Target = [*const c_char];

    fn deref(&self) -> &Self::Target {
        &self.array
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_command_rejected() {
        let argv: Vec<String> = vec![];
        let err = Command::new(argv).unwrap_err();
        assert!(matches!(err, Error::EmptyCommand));
    }

    #[test]
    fn test_interior_nul_rejected() {
        let err = Command::new(vec!["/bin/e\0cho"]).unwrap_err();
        assert!(matches!(err, Error::BadArgument(_)));
    }

    #[test]
    fn test_pointer_array_is_null_terminated() {
        let argv = vec![
            CString::new("true").unwrap(),
            CString::new("--version").unwrap(),
        ];
        let array = NullTerminatedPointerArray::new(&argv);

        assert_eq!(array.len(), 3);
        assert!(array[2].is_null());
        assert!(!array[0].is_null());
    }
}
