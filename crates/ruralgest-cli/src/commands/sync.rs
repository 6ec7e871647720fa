use std::sync::Arc;

use ruralgest_core::{ConnectivityMonitor, SyncOutcome};

use crate::commands::common::{build_engine, CliContext, ReachabilityProbe};
use crate::error::CliError;

pub async fn run_sync(context: &CliContext, as_json: bool) -> Result<(), CliError> {
    let (settings, backend_url) = context.sync_settings()?;
    let probe = ReachabilityProbe::for_base_url(&backend_url)?;
    let monitor = ConnectivityMonitor::new(probe.is_reachable().await);

    let engine = build_engine(context.store(), &settings, Arc::new(monitor))?;
    let outcome = engine.synchronize().await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else if !outcome.is_failed() {
        println!("{outcome}");
    }

    match outcome {
        SyncOutcome::Failed(failure) => Err(CliError::SyncFailed(failure.message)),
        SyncOutcome::Completed(_) | SyncOutcome::SkippedOffline => Ok(()),
    }
}
