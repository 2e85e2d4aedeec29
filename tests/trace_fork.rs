use anyhow::Result;
use ntest::timeout;
use sctrace::{Catalog, Command, Tracer};

mod support;

#[test]
#[timeout(15000)]
fn test_forked_child_is_admitted_and_traced() -> Result<()> {
    let capture = support::init_capture();

    let cmd = Command::new(vec!["/bin/sh", "-c", "/bin/true & wait"])?;
    let mut tracer = Tracer::spawn(cmd, Catalog::load())?;

    tracer.run()?;

    let log = capture.contents();

    // The shell's child shows up as a second tracee...
    assert!(log.contains("attached to new thread/process pid="));

    // ...and both tracees run to completion.
    assert!(capture.lines_matching("exited with status 0").len() >= 2);

    // Records from the two tracees may interleave, but each tracee's own
    // records alternate.
    support::assert_alternation(&log);

    Ok(())
}
