use anyhow::Result;
use ntest::timeout;
use sctrace::{Catalog, Command, Error, Tracer};

#[test]
#[timeout(10000)]
fn test_failed_exec_surfaces_the_errno() -> Result<()> {
    let cmd = Command::new(vec!["./definitely-no-such-program"])?;
    let mut tracer = Tracer::spawn(cmd, Catalog::load())?;

    let err = tracer.run().unwrap_err();

    assert!(matches!(err, Error::ExecFailed { .. }));
    assert!(err.to_string().contains("No such file or directory"));

    Ok(())
}
