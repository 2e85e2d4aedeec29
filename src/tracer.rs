//! The tracee table and the event loop that drives every traced process.
//!
//! `ptrace(2)` reports all tracee activity through `wait(2)` statuses. The
//! kernel does not say whether a syscall-trap stop is an entry or an exit;
//! the tracer has to keep the alternation itself, per tracee, and repair it
//! when an `execve` replaces the program mid-syscall. That bookkeeping
//! lives in [`TraceeState`]; everything else in the loop is classification
//! of the status word and the matching resume.

use std::collections::BTreeMap;

use nix::errno::Errno;
use nix::sys::ptrace::{self, Options};
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use crate::attach;
use crate::catalog::Catalog;
use crate::cmd::Command;
use crate::error::{Error, Result, ResultExt};
use crate::format;


/// Ptrace options applied to every tracee, first-generation or inherited.
///
/// `PTRACE_O_TRACESYSGOOD` tags syscall stops with bit 7 of the stop signal
/// so they cannot be confused with real `SIGTRAP` deliveries; the event
/// options surface process creation and replacement as ptrace-event-stops;
/// `PTRACE_O_EXITKILL` has the kernel reap every tracee if the tracer dies.
pub const TRACE_OPTIONS: Options = Options::empty()
    .union(Options::PTRACE_O_TRACESYSGOOD)
    .union(Options::PTRACE_O_TRACECLONE)
    .union(Options::PTRACE_O_TRACEFORK)
    .union(Options::PTRACE_O_TRACEVFORK)
    .union(Options::PTRACE_O_TRACEEXEC)
    .union(Options::PTRACE_O_EXITKILL);

/// How to log one syscall-trap stop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TrapKind {
    /// Entering a syscall: record the name and arguments.
    Entry,

    /// Leaving a syscall: record the return value.
    Exit,

    /// The trailing stop of an `execve`: `orig_rax` is stale and no record
    /// is emitted.
    PostExec,
}

/// Per-tracee stop-interpretation state.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TraceeState {
    /// The next syscall-trap stop for this tracee is an exit stop.
    in_syscall: bool,

    /// The most recent event was an exec and its trailing stop has not been
    /// consumed yet.
    just_execed: bool,
}

impl TraceeState {
    /// Account for one syscall-trap stop and say how to log it.
    ///
    /// Entry and exit alternate, starting from entry. The stop that follows
    /// an exec event is the tail end of the exec itself: it is swallowed
    /// without flipping the alternation, so the next stop is a genuine
    /// entry again.
    pub fn advance(&mut self) -> TrapKind {
        if self.in_syscall {
            self.in_syscall = false;
            TrapKind::Exit
        } else if self.just_execed {
            self.just_execed = false;
            TrapKind::PostExec
        } else {
            self.in_syscall = true;
            TrapKind::Entry
        }
    }

    /// Note an exec event: the tracee is mid-syscall, but the number the
    /// next trap reports no longer corresponds to what entered.
    pub fn execed(&mut self) {
        self.in_syscall = false;
        self.just_execed = true;
    }
}

/// Known tracees and their state, keyed by raw PID.
///
/// The table doubles as the loop's termination witness: tracing is over
/// exactly when it drains. Entries leave the table only when an exit or
/// kill status for them comes back through `waitpid`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TraceeTable {
    tracees: BTreeMap<i32, TraceeState>,
}

impl TraceeTable {
    pub fn insert(&mut self, pid: Pid) {
        debug!(pid = pid.as_raw(), "inserting tracee");

        self.tracees.insert(pid.as_raw(), TraceeState::default());
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.tracees.contains_key(&pid.as_raw())
    }

    pub fn remove(&mut self, pid: Pid) {
        debug!(pid = pid.as_raw(), "removing tracee");

        self.tracees.remove(&pid.as_raw());
    }

    pub fn state_mut(&mut self, pid: Pid) -> Option<&mut TraceeState> {
        self.tracees.get_mut(&pid.as_raw())
    }

    pub fn len(&self) -> usize {
        self.tracees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracees.is_empty()
    }
}

/// Fetch the general-purpose register file of a stopped tracee.
///
/// `ESRCH` maps to [`Error::TraceeDied`]: a tracee can exit between the
/// stop notification and this request, and callers carry on when it does.
pub fn registers(pid: Pid) -> Result<libc::user_regs_struct> {
    ptrace::getregs(pid).died_if_esrch(pid)
}

// Resume a stopped tracee toward its next syscall-trap stop, optionally
// delivering a signal.
//
// Failure is tolerated: if the tracee died in the meantime, its terminal
// status still arrives through `waitpid`, which is the only place table
// entries are dropped.
fn resume(pid: Pid, signal: impl Into<Option<Signal>>) {
    if let Err(errno) = ptrace::syscall(pid, signal) {
        debug!(pid = pid.as_raw(), %errno, "could not resume tracee");
    }
}

/// Syscall tracer for a dynamically changing set of processes.
pub struct Tracer {
    table: TraceeTable,

    /// The tracee created by [`Tracer::spawn`], until its initial `execve`
    /// has been seen. A failed initial exec aborts the whole trace.
    initial_child: Option<Pid>,

    catalog: Catalog,
}

impl Tracer {
    /// Build a tracer over `pids`, all of which must already be attached,
    /// configured with [`TRACE_OPTIONS`], and resumed toward a syscall
    /// stop.
    ///
    /// `launched` marks a tracee created by fork-and-exec, whose initial
    /// `execve` failure should surface as [`Error::ExecFailed`].
    pub fn new(
        pids: impl IntoIterator<Item = Pid>,
        launched: Option<Pid>,
        catalog: Catalog,
    ) -> Self {
        let mut table = TraceeTable::default();
        for pid in pids {
            table.insert(pid);
        }

        Self { table, initial_child: launched, catalog }
    }

    /// Launch `cmd` under tracing.
    ///
    /// The child raises `SIGSTOP` before exec; options are set while it is
    /// held there, so its very first syscall is already traced.
    pub fn spawn(cmd: Command, catalog: Catalog) -> Result<Self> {
        let child = cmd.fork_exec()?;

        match waitpid(child, None) {
            Ok(WaitStatus::Stopped(_, Signal::SIGSTOP)) => {},
            Ok(status) => {
                warn!(?status, "unexpected first stop for launched tracee");
            },
            Err(source) => return Err(Error::Wait { source }),
        }

        ptrace::setoptions(child, TRACE_OPTIONS).died_if_esrch(child)?;
        resume(child, None);

        info!("tracing process pid={child}");

        Ok(Self::new([child], Some(child), catalog))
    }

    /// Attach to the process tree rooted at `root` and trace all of it.
    pub fn attach(root: Pid, catalog: Catalog) -> Result<Self> {
        let pids = attach::find_descendants(root);
        info!("found {} task(s) in the tree rooted at {root}", pids.len());

        let attached = attach::attach_all(&pids);
        if attached.is_empty() {
            return Err(Error::NoTracees { root });
        }

        for &pid in &attached {
            resume(pid, None);
        }

        Ok(Self::new(attached, None, catalog))
    }

    pub fn tracee_count(&self) -> usize {
        self.table.len()
    }

    /// Drive the event loop until every tracee has exited.
    ///
    /// This is the only suspension point in the program: the loop blocks in
    /// `waitpid(-1, __WALL)`, classifies the status it gets back, emits at
    /// most one log record, and resumes the stopped tracee.
    pub fn run(&mut self) -> Result<()> {
        while !self.table.is_empty() {
            let status = match waitpid(None::<Pid>, Some(WaitPidFlag::__WALL)) {
                Ok(status) => status,
                Err(Errno::ECHILD) => break,
                Err(Errno::EINTR) => continue,
                Err(source) => return Err(Error::Wait { source }),
            };

            match status {
                WaitStatus::Exited(pid, code) => {
                    info!("process {pid} exited with status {code}");
                    self.table.remove(pid);
                },
                WaitStatus::Signaled(pid, signal, _core_dumped) => {
                    info!("process {pid} killed by {signal}");
                    self.table.remove(pid);
                },
                WaitStatus::PtraceEvent(pid, _, event) => {
                    self.handle_ptrace_event(pid, event);
                },
                WaitStatus::PtraceSyscall(pid) => {
                    self.handle_syscall_stop(pid)?;
                },
                WaitStatus::Stopped(pid, signal) => {
                    // A plain signal-delivery stop. Inject the signal back
                    // and stay out of the way.
                    resume(pid, signal);
                },
                WaitStatus::Continued(_) | WaitStatus::StillAlive => {},
            }
        }

        Ok(())
    }

    fn handle_ptrace_event(&mut self, pid: Pid, event: i32) {
        match event {
            libc::PTRACE_EVENT_EXEC => {
                info!("process {pid} executed a new program");

                if !self.table.contains(pid) {
                    self.table.insert(pid);
                }
                if let Some(state) = self.table.state_mut(pid) {
                    state.execed();
                }

                resume(pid, None);
            },
            libc::PTRACE_EVENT_FORK
            | libc::PTRACE_EVENT_VFORK
            | libc::PTRACE_EVENT_CLONE => {
                match ptrace::getevent(pid) {
                    Ok(raw) => {
                        let new = Pid::from_raw(raw as i32);

                        // The child inherits its parent's options, but it
                        // may have raced ahead of us; make sure they are in
                        // force before it runs.
                        if let Err(errno) = ptrace::setoptions(new, TRACE_OPTIONS) {
                            debug!(pid = new.as_raw(), %errno, "could not set options on new tracee");
                        }

                        self.table.insert(new);
                        info!("attached to new thread/process pid={new}");

                        resume(new, None);
                    },
                    Err(errno) => {
                        warn!("could not read new tracee id from {pid}: {errno}");
                    },
                }

                resume(pid, None);
            },
            _ => resume(pid, None),
        }
    }

    fn handle_syscall_stop(&mut self, pid: Pid) -> Result<()> {
        let Some(state) = self.table.state_mut(pid) else {
            // Raced ahead of this tracee's admission into the table; let it
            // run to its next stop.
            resume(pid, None);
            return Ok(());
        };

        match state.advance() {
            TrapKind::Entry => self.log_entry(pid),
            TrapKind::Exit => self.log_exit(pid)?,
            TrapKind::PostExec => {},
        }

        resume(pid, None);
        Ok(())
    }

    fn log_entry(&self, pid: Pid) {
        let regs = match registers(pid) {
            Ok(regs) => regs,
            Err(err) if err.tracee_died() => {
                warn!("SYSCALL_ENTRY [PID:{pid}] --> [process vanished]");
                return;
            },
            Err(err) => {
                warn!("SYSCALL_ENTRY [PID:{pid}] could not read registers: {err}");
                return;
            },
        };

        match self.catalog.get(regs.orig_rax) {
            Some(info) => {
                let values = [regs.rdi, regs.rsi, regs.rdx, regs.r10, regs.r8, regs.r9];
                let args: Vec<String> = info
                    .arg_types
                    .iter()
                    .zip(values)
                    .map(|(ty, value)| format::argument(pid, ty, value as i64))
                    .collect();

                info!("SYSCALL_ENTRY [PID:{pid}] --> {}({})", info.name, args.join(", "));
            },
            None => {
                warn!(
                    "SYSCALL_ENTRY [PID:{pid}] --> syscall_{}({:#x}, {:#x}, {:#x}, {:#x}, {:#x}, {:#x})",
                    regs.orig_rax, regs.rdi, regs.rsi, regs.rdx, regs.r10, regs.r8, regs.r9,
                );
            },
        }
    }

    fn log_exit(&mut self, pid: Pid) -> Result<()> {
        let regs = match registers(pid) {
            Ok(regs) => regs,
            Err(err) if err.tracee_died() => {
                info!("SYSCALL_EXIT  [PID:{pid}] <-- [process vanished]");
                return Ok(());
            },
            Err(err) => {
                warn!("SYSCALL_EXIT  [PID:{pid}] could not read registers: {err}");
                return Ok(());
            },
        };

        let info = self.catalog.get(regs.orig_rax);
        let return_val = regs.rax as i64;

        // The whole point of launching was to run this program; if its exec
        // never succeeded there is nothing to trace.
        if self.initial_child == Some(pid)
            && info.is_some_and(|info| info.name == "execve")
            && return_val < 0
        {
            self.initial_child = None;
            return Err(Error::ExecFailed { source: Errno::from_raw((-return_val) as i32) });
        }

        let name = match info {
            Some(info) => info.name.to_owned(),
            None => format!("syscall_{}", regs.orig_rax),
        };

        info!("SYSCALL_EXIT  [PID:{pid}] <-- {name} = {}", format::return_value(return_val));

        Ok(())
    }
}
