use std::ffi::NulError;
use std::io;

use nix::errno::Errno;
use nix::unistd::Pid;


pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("empty command vector")]
    EmptyCommand,

    #[error("command argument contains an interior NUL byte")]
    BadArgument(#[from] NulError),

    #[error("could not fork tracee")]
    Spawn { source: Errno },

    #[error("could not attach to tracee = {pid}")]
    Attach { pid: Pid, source: Errno },

    #[error("no attachable process in the tree rooted at {root}")]
    NoTracees { root: Pid },

    #[error("error waiting on tracees")]
    Wait { source: Errno },

    #[error("tracee = {pid} died mid-request")]
    TraceeDied { pid: Pid },

    #[error("could not execute target program: {}", source.desc())]
    ExecFailed { source: Errno },

    #[error("input/output error")]
    InputOutput(#[from] io::Error),

    #[error("unexpected internal error")]
    Internal(#[from] Errno),
}

impl Error {
    /// True iff the error means the tracee no longer exists.
    ///
    /// A tracee can exit or be killed between a stop notification and the
    /// next ptrace request made against it. Callers treat this as a
    /// recoverable condition, not a tracer bug.
    pub fn tracee_died(&self) -> bool {
        matches!(self, Error::TraceeDied { .. })
    }
}

pub(crate) trait ResultExt<T> {
    /// Convert an `ESRCH` result into [`Error::TraceeDied`] for `pid`.
    fn died_if_esrch(self, pid: Pid) -> Result<T>;
}

impl<T> ResultExt<T> for nix::Result<T> {
    fn died_if_esrch(self, pid: Pid) -> Result<T> {
        self.map_err(|errno| match errno {
            Errno::ESRCH => Error::TraceeDied { pid },
            other => Error::Internal(other),
        })
    }
}
