//! Discovery of, and attachment to, an already-running process tree.

use std::collections::{BTreeSet, VecDeque};
use std::fs;
use std::path::PathBuf;

use nix::sys::ptrace;
use nix::sys::wait::waitpid;
use nix::unistd::Pid;
use tracing::{info, warn};

use crate::error::{Error, Result, ResultExt};
use crate::tracer::TRACE_OPTIONS;


/// Collect `root` together with every thread and descendant reachable from
/// it, by breadth-first traversal of `/proc/<pid>/task/` and each task's
/// `children` list.
///
/// Tasks that disappear mid-walk are skipped, as are `children` files the
/// kernel does not expose; the result is whatever subset of the tree was
/// visible during the walk.
pub fn find_descendants(root: Pid) -> Vec<Pid> {
    let mut seen = BTreeSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(root.as_raw());

    while let Some(pid) = queue.pop_front() {
        let task_dir = PathBuf::from(format!("/proc/{pid}/task"));
        let Ok(tasks) = fs::read_dir(task_dir) else {
            continue;
        };

        for entry in tasks.flatten() {
            let Some(tid) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<i32>().ok())
            else {
                continue;
            };
            seen.insert(tid);

            let Ok(children) = fs::read_to_string(entry.path().join("children")) else {
                continue;
            };
            for child in children.split_ascii_whitespace() {
                if let Ok(child) = child.parse::<i32>() {
                    if !seen.contains(&child) {
                        queue.push_back(child);
                    }
                }
            }
        }
    }

    seen.into_iter().map(Pid::from_raw).collect()
}

/// Attach to every PID in `pids` and return those that were successfully
/// attached, awaited, and configured with [`TRACE_OPTIONS`].
///
/// Individual failures are logged and skipped; racing against a process
/// tree that is exiting is normal here.
pub fn attach_all(pids: &[Pid]) -> Vec<Pid> {
    let mut attached = Vec::with_capacity(pids.len());

    for &pid in pids {
        match attach_one(pid) {
            Ok(()) => {
                info!("attached to pid {pid}");
                attached.push(pid);
            },
            Err(err) => warn!("skipping pid {pid}: {err}"),
        }
    }

    attached
}

// Attach, await the attach-stop, and set options while the tracee is held.
fn attach_one(pid: Pid) -> Result<()> {
    ptrace::attach(pid).map_err(|source| Error::Attach { pid, source })?;
    waitpid(pid, None).map_err(|source| Error::Wait { source })?;
    ptrace::setoptions(pid, TRACE_OPTIONS).died_if_esrch(pid)?;
    Ok(())
}
