//! Component wiring: supervises the long-lived Poller and
//! Pipeline tasks under one root cancellation handle. Constructing the
//! concrete store/provider adapters from configuration is the CLI binary's
//! job (`services/triaged`); this module only knows how to run tasks it's
//! handed and keep them coupled to a shared lifetime.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::Error;
use crate::pipeline::Pipeline;
use crate::poller::Poller;

/// Runs the Pipeline and every Poller as independent tasks sharing
/// `root_cancel`. Whichever task finishes first (normally or on error)
/// triggers cancellation of the rest; returns once every task has wound
/// down. Mirrors the "first exit cancels the group" supervision the CLI's
/// signal handler builds on.
pub async fn supervise(
    root_cancel: CancellationToken,
    pipeline: Arc<Pipeline>,
    pollers: Vec<(Arc<Poller>, Duration)>,
) {
    let mut tasks: JoinSet<(&'static str, Result<(), Error>)> = JoinSet::new();

    let pipeline_cancel = root_cancel.clone();
    let pipeline_handle = pipeline.clone();
    tasks.spawn(async move { ("pipeline", pipeline_handle.run(pipeline_cancel).await) });

    for (poller, interval) in pollers {
        let cancel = root_cancel.clone();
        tasks.spawn(async move { ("poller", poller.run(cancel, interval).await) });
    }

    let mut first_exit = true;
    while let Some(outcome) = tasks.join_next().await {
        match outcome {
            Ok((label, Ok(()))) => info!(component = label, "task exited cleanly"),
            Ok((label, Err(Error::Cancelled))) => info!(component = label, "task cancelled"),
            Ok((label, Err(err))) => error!(component = label, error = %err, "task exited with error"),
            Err(join_err) => error!(error = %join_err, "task panicked"),
        }
        if first_exit {
            first_exit = false;
            root_cancel.cancel();
        }
    }
}
