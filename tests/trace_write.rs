use anyhow::Result;
use ntest::timeout;
use sctrace::{Catalog, Command, Tracer};

mod support;

#[test]
#[timeout(10000)]
fn test_write_entry_and_exit_are_paired() -> Result<()> {
    let capture = support::init_capture();

    let cmd = Command::new(vec!["/bin/echo", "hi"])?;
    let mut tracer = Tracer::spawn(cmd, Catalog::load())?;

    tracer.run()?;

    let log = capture.contents();

    // The payload crosses into the tracee's memory and back out again,
    // newline included.
    assert!(log.contains("write(1, \"hi\n\", 3)"));
    assert!(log.contains("<-- write = 3"));

    // The entry precedes its exit.
    let entry_at = log.find("write(1, \"hi").unwrap();
    let exit_at = log.find("<-- write = 3").unwrap();
    assert!(entry_at < exit_at);

    Ok(())
}
