use anyhow::Result;
use ntest::timeout;
use sctrace::{Catalog, Command, Tracer};

mod support;

#[test]
#[timeout(10000)]
fn test_trace_true_to_completion() -> Result<()> {
    let capture = support::init_capture();

    let cmd = Command::new(vec!["/bin/true"])?;
    let mut tracer = Tracer::spawn(cmd, Catalog::load())?;
    assert_eq!(tracer.tracee_count(), 1);

    tracer.run()?;

    let log = capture.contents();

    // The launch itself is recorded on entry...
    assert!(log.contains("--> execve(\"/bin/true\""));

    // ...the C runtime's syscalls are traced through to the end...
    assert!(log.contains("SYSCALL_ENTRY"));
    assert!(log.contains("SYSCALL_EXIT"));
    assert!(log.contains("--> exit_group("));

    // ...and the tracee's exit drains the table.
    assert!(log.contains("exited with status 0"));

    support::assert_alternation(&log);

    Ok(())
}
