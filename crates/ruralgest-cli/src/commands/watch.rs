use std::sync::Arc;
use std::time::Duration;

use ruralgest_core::config::MAX_DURATION_SECS;
use ruralgest_core::{AutoSyncScheduler, ConnectivityMonitor, Transition};
use tokio::time::{Instant, MissedTickBehavior};

use crate::commands::common::{build_engine, CliContext, ReachabilityProbe};
use crate::error::CliError;

pub async fn run_watch(
    context: &CliContext,
    start_offline: bool,
    probe_every: Duration,
) -> Result<(), CliError> {
    if probe_every.is_zero() || probe_every.as_secs() > MAX_DURATION_SECS {
        return Err(CliError::InvalidArgument(format!(
            "--probe-every must be between 1 and {MAX_DURATION_SECS} seconds"
        )));
    }

    let (settings, backend_url) = context.sync_settings()?;
    let probe = ReachabilityProbe::for_base_url(&backend_url)?;
    let initially_online = !start_offline && probe.is_reachable().await;

    let monitor = ConnectivityMonitor::new(initially_online);
    let _announcer = monitor.on_transition(|transition| match transition {
        Transition::Online => println!("Backend reachable"),
        Transition::Offline => println!("Backend unreachable; writes stay queued"),
    });

    let store = context.store();
    store.initialize().await?;
    let engine = build_engine(store, &settings, Arc::new(monitor.clone()))?;
    let scheduler = AutoSyncScheduler::new(engine, monitor.clone(), settings.sync_interval);
    scheduler.start();

    println!(
        "Watching {backend_url} ({}), syncing every {}s. Press Ctrl-C to stop.",
        if initially_online { "online" } else { "offline" },
        settings.sync_interval.as_secs()
    );

    let mut probes = tokio::time::interval_at(Instant::now() + probe_every, probe_every);
    probes.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                break;
            }
            _ = probes.tick() => {
                monitor.set_online(probe.is_reachable().await);
            }
        }
    }

    scheduler.stop();
    println!("Stopped");
    Ok(())
}
