//! CLI entry point for albumdl.

use anyhow::Result;
use clap::Parser;

mod app;
mod cli;

use cli::Args;

/// How the process ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// The run went through; missing tracks are reported, not fatal.
    Success,
    /// Ctrl-C stopped the run.
    Interrupted,
}

impl ProcessExit {
    pub(crate) fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Interrupted => 1,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let exit = app::runtime::run_albumdl(args).await?;
    if exit != ProcessExit::Success {
        std::process::exit(exit.code());
    }
    Ok(())
}
