//! A syscall tracer for x86-64 Linux, built on `ptrace(2)`.
//!
//! The tracer either launches a program from a command vector or attaches
//! to an existing process tree, then follows every tracee through its
//! syscall-trap stops, logging one record per entry (name and decoded
//! arguments) and one per exit (return value). Process creation events are
//! followed into the new tracee, exec events re-synchronise the entry/exit
//! alternation, and other signals are forwarded untouched.
//!
//! Everything runs on one thread: the event loop in [`Tracer::run`] blocks
//! in `waitpid`, and that is the program's only suspension point.

pub mod attach;
pub mod catalog;
pub mod cmd;
pub mod error;
pub mod format;
pub mod memory;
pub mod tracer;

#[doc(inline)]
pub use catalog::{Catalog, SyscallInfo};

#[doc(inline)]
pub use cmd::Command;

#[doc(inline)]
pub use error::{Error, Result};

#[doc(inline)]
pub use tracer::{Tracer, TraceeState, TraceeTable, TrapKind, TRACE_OPTIONS};

pub use nix::unistd::Pid;

#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
compile_error!("this crate supports x86-64 Linux only");
