use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::time::Duration;

use albumdl_core::download::{
    DownloadEngine, HttpClient, Reporter, RetryPolicy, TransportConfig,
};
use albumdl_core::orchestrator::{Orchestrator, OrchestratorError};
use albumdl_core::site::MyzukaSource;
use anyhow::{Context, Result};
use indicatif::MultiProgress;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::ProcessExit;
use crate::app::{exit_handler, progress_manager, prompt::StdinPrompt, terminal};
use crate::cli::Args;

pub(crate) async fn run_albumdl(args: Args) -> Result<ProcessExit> {
    let use_progress = terminal::should_use_progress(
        io::stderr().is_terminal(),
        args.quiet,
        args.no_progress,
        terminal::is_dumb_terminal(),
    );
    let bars = use_progress.then(MultiProgress::new);

    let default_level = terminal::resolve_default_log_level(&args, use_progress);
    let ansi = io::stderr().is_terminal() && !terminal::no_color_env_requested();
    terminal::init_tracing(default_level, ansi, bars.clone());

    debug!(?args, "CLI arguments parsed");
    info!(url = %args.url.url(), path = %args.path.display(), "albumdl starting");

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current chunks");
            interrupt.cancel();
        }
    });

    let (reporter, display) = match &bars {
        Some(bars) => {
            let (reporter, events) = Reporter::channel();
            let handle = progress_manager::spawn_progress_ui(bars.clone(), events);
            (reporter, Some(handle))
        }
        None => (Reporter::disabled(), None),
    };

    let transport = TransportConfig {
        timeout: Duration::from_secs(args.timeout),
        socks_proxy: args.socks.clone(),
        ..TransportConfig::default()
    };
    if let Some(proxy) = &transport.socks_proxy {
        info!(proxy = %proxy, "using SOCKS proxy");
    }
    let client = HttpClient::new(&transport).context("failed to build HTTP client")?;
    let engine = DownloadEngine::new(usize::from(args.concurrency), RetryPolicy::default())?;

    let orchestrator = Orchestrator::new(
        Arc::new(MyzukaSource::new(client.clone())),
        engine,
        client,
        reporter,
        cancel.clone(),
    )
    .with_prompt(Arc::new(StdinPrompt::new(bars.clone(), cancel.clone())))
    .with_base_path(&args.path);

    let outcome = orchestrator.run(&args.url).await;

    // Dropping the orchestrator drops the last reporter, which ends the display task.
    drop(orchestrator);
    if let Some(handle) = display {
        let _ = handle.await;
    }

    match outcome {
        Ok(complete) => debug!(complete, "run finished"),
        Err(OrchestratorError::Cancelled { .. }) => {}
        // Reported, not fatal: only an interrupt changes the exit status.
        Err(e) => error!(
            url = %args.url.url(),
            error = %error_chain(&e),
            "failed to download {}",
            args.url.url()
        ),
    }

    Ok(exit_handler::determine_exit_outcome(cancel.is_cancelled()))
}

/// Joins an error and its sources into one line.
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}
