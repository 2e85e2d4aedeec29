use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing::error;
use tracing_subscriber::EnvFilter;

use sctrace::{Catalog, Command, Pid, Tracer};


/// Trace the syscalls of a launched program or a running process tree.
#[derive(Debug, Parser)]
#[command(name = "sctrace", version, about)]
struct Cli {
    /// Attach to the process tree rooted at PID.
    #[arg(short, long, value_name = "PID", conflicts_with = "fork")]
    attach: Option<i32>,

    /// Launch PROGRAM [ARGS...] and trace it from its first syscall.
    #[arg(
        short,
        long,
        value_name = "PROGRAM",
        num_args = 1..,
        allow_hyphen_values = true,
    )]
    fork: Option<Vec<String>>,
}

fn main() {
    // Bare invocation is a request for usage, not an error.
    if std::env::args().len() == 1 {
        Cli::command().print_help().ok();
        return;
    }

    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run(cli) {
        error!("{err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let catalog = Catalog::load();

    match (cli.attach, cli.fork) {
        (Some(root), None) => {
            let mut tracer = Tracer::attach(Pid::from_raw(root), catalog)?;
            tracer.run()?;
        },
        (None, Some(argv)) => {
            let cmd = Command::new(argv)?;
            let mut tracer = Tracer::spawn(cmd, catalog)?;
            tracer.run()?;
        },
        _ => {
            Cli::command().print_help()?;
        },
    }

    Ok(())
}
