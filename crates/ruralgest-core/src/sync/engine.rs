//! One reconciliation round between the local store and the remote authority.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;

use super::remote::RemoteAuthority;
use crate::connectivity::Connectivity;
use crate::error::{Error, Result};
use crate::models::{Collection, PendingMutation};
use crate::services::LocalStore;
use crate::util::{iso_timestamp_now, normalize_text_option};

/// What happens to a pending mutation whose replay failed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailedPushPolicy {
    /// Move it to the dead-letter table, keeping the error
    #[default]
    DeadLetter,
    /// Discard it
    Drop,
    /// Leave it queued for the next round
    Retain,
}

impl FailedPushPolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DeadLetter => "dead-letter",
            Self::Drop => "drop",
            Self::Retain => "retain",
        }
    }
}

impl fmt::Display for FailedPushPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailedPushPolicy {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "dead-letter" | "deadletter" => Ok(Self::DeadLetter),
            "drop" => Ok(Self::Drop),
            "retain" => Ok(Self::Retain),
            other => Err(Error::Config(format!(
                "unknown failed push policy '{other}' (expected dead-letter, drop or retain)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub failed_push_policy: FailedPushPolicy,
    /// Upper bound for a whole round, pull and push included
    pub round_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            failed_push_policy: FailedPushPolicy::default(),
            round_timeout: Duration::from_secs(120),
        }
    }
}

/// Summary of a completed round
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Records written per collection; collections without a delta are absent
    pub pulled: Vec<(Collection, usize)>,
    pub pushed: usize,
    pub failed: usize,
    pub dead_lettered: usize,
    pub dropped: usize,
    pub retained: usize,
    /// Watermark stored at the end of the round
    pub watermark: String,
}

impl SyncReport {
    pub fn pulled_total(&self) -> usize {
        self.pulled.iter().map(|(_, count)| count).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transport,
    /// The remote handed out records the store cannot take
    MalformedData,
    Storage,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl SyncFailure {
    fn from_error(error: &Error) -> Self {
        let kind = match error {
            error if error.is_transport() => FailureKind::Transport,
            Error::Timeout(_) => FailureKind::Timeout,
            Error::InvalidInput(_) | Error::Serialization(_) => FailureKind::MalformedData,
            _ => FailureKind::Storage,
        };
        Self {
            kind,
            message: error.to_string(),
        }
    }
}

/// Result of one `synchronize()` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    Completed(SyncReport),
    SkippedOffline,
    Failed(SyncFailure),
}

impl SyncOutcome {
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed(report) => {
                write!(
                    f,
                    "Sync completed: pulled {}, pushed {}",
                    report.pulled_total(),
                    report.pushed
                )?;
                if report.failed > 0 {
                    write!(f, ", {} failed", report.failed)?;
                    if report.dead_lettered > 0 {
                        write!(f, " ({} dead-lettered)", report.dead_lettered)?;
                    }
                }
                write!(f, "; watermark {}", report.watermark)
            }
            Self::SkippedOffline => f.write_str("Sync skipped: offline"),
            Self::Failed(failure) => write!(f, "Sync failed: {}", failure.message),
        }
    }
}

type RoundFuture = Shared<BoxFuture<'static, SyncOutcome>>;

struct EngineInner {
    store: LocalStore,
    remote: Arc<dyn RemoteAuthority>,
    connectivity: Arc<dyn Connectivity>,
    options: EngineOptions,
    in_flight: Mutex<Option<RoundFuture>>,
}

/// Reconciles the local store with the remote authority.
///
/// Cloning is cheap; clones share the same in-flight round.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("store", &self.inner.store)
            .field("options", &self.inner.options)
            .field("in_flight", &self.is_syncing())
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    pub fn new(
        store: LocalStore,
        remote: Arc<dyn RemoteAuthority>,
        connectivity: Arc<dyn Connectivity>,
        options: EngineOptions,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store,
                remote,
                connectivity,
                options,
                in_flight: Mutex::new(None),
            }),
        }
    }

    pub fn store(&self) -> &LocalStore {
        &self.inner.store
    }

    pub fn options(&self) -> EngineOptions {
        self.inner.options
    }

    pub fn is_online(&self) -> bool {
        self.inner.connectivity.is_online()
    }

    /// Whether a round is currently running.
    pub fn is_syncing(&self) -> bool {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Run one round, or join the one already in flight.
    ///
    /// The round runs on its own task, so it completes even if every caller
    /// stops waiting.
    pub async fn synchronize(&self) -> SyncOutcome {
        let round = {
            let mut slot = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(round) = slot.as_ref() {
                tracing::debug!("Sync already in flight; joining it");
                round.clone()
            } else {
                let round = self.spawn_round();
                *slot = Some(round.clone());
                round
            }
        };
        round.await
    }

    fn spawn_round(&self) -> RoundFuture {
        let engine = self.clone();
        let task = tokio::spawn(async move {
            let _release = InFlightRelease(Arc::clone(&engine.inner));
            engine.run_bounded().await
        });

        async move {
            task.await.unwrap_or_else(|error| {
                SyncOutcome::Failed(SyncFailure {
                    kind: FailureKind::Storage,
                    message: format!("sync task failed: {error}"),
                })
            })
        }
        .boxed()
        .shared()
    }

    async fn run_bounded(&self) -> SyncOutcome {
        let timeout = self.inner.options.round_timeout;
        let outcome = match tokio::time::timeout(timeout, self.run_round()).await {
            Ok(outcome) => outcome,
            Err(_) => SyncOutcome::Failed(SyncFailure::from_error(&Error::Timeout(format!(
                "sync round exceeded {}s",
                timeout.as_secs()
            )))),
        };

        match &outcome {
            SyncOutcome::Completed(report) => tracing::info!(
                "Sync completed: pulled {} records, pushed {}, {} failed",
                report.pulled_total(),
                report.pushed,
                report.failed
            ),
            SyncOutcome::SkippedOffline => tracing::debug!("Sync skipped: offline"),
            SyncOutcome::Failed(failure) => {
                tracing::debug!("Sync failed ({:?}): {}", failure.kind, failure.message);
            }
        }
        outcome
    }

    async fn run_round(&self) -> SyncOutcome {
        if !self.inner.connectivity.is_online() {
            return SyncOutcome::SkippedOffline;
        }

        match self.reconcile().await {
            Ok(report) => SyncOutcome::Completed(report),
            Err(error) => SyncOutcome::Failed(SyncFailure::from_error(&error)),
        }
    }

    async fn reconcile(&self) -> Result<SyncReport> {
        let store = &self.inner.store;
        let watermark = store.watermark().await?.map(|watermark| watermark.timestamp);

        let delta = self.inner.remote.pull(watermark.as_deref()).await?;

        let mut report = SyncReport::default();
        for collection in Collection::ALL {
            let records = delta.records(collection);
            if records.is_empty() {
                continue;
            }
            let written = store
                .upsert_many(collection, records)
                .await
                .map_err(|error| match error {
                    Error::InvalidInput(message) => Error::InvalidInput(format!(
                        "remote sent malformed {collection} data: {message}"
                    )),
                    other => other,
                })?;
            report.pulled.push((collection, written));
        }

        for entry in store.list_pending().await? {
            self.replay(entry, &mut report).await?;
        }

        let timestamp = normalize_text_option(delta.timestamp).unwrap_or_else(iso_timestamp_now);
        store.set_watermark(&timestamp).await?;
        report.watermark = timestamp;
        Ok(report)
    }

    /// Push one entry and settle it in the queue right away.
    async fn replay(&self, entry: PendingMutation, report: &mut SyncReport) -> Result<()> {
        let store = &self.inner.store;

        let settled = match self.inner.remote.push(&entry.payload).await {
            Ok(()) => {
                tracing::debug!(
                    "Pushed pending mutation #{} {} -> {}",
                    entry.id,
                    entry.action,
                    entry.payload.endpoint
                );
                report.pushed += 1;
                store.remove_pending(entry.id).await.map(|_| ())
            }
            Err(error) => {
                tracing::warn!(
                    "Push of pending mutation #{} {} -> {} failed: {}",
                    entry.id,
                    entry.action,
                    entry.payload.endpoint,
                    error
                );
                report.failed += 1;
                match self.inner.options.failed_push_policy {
                    FailedPushPolicy::DeadLetter => {
                        report.dead_lettered += 1;
                        store
                            .dead_letter_pending(entry.id, &error.to_string())
                            .await
                    }
                    FailedPushPolicy::Drop => {
                        report.dropped += 1;
                        store.remove_pending(entry.id).await.map(|_| ())
                    }
                    FailedPushPolicy::Retain => {
                        report.retained += 1;
                        store.record_pending_failure(entry.id).await
                    }
                }
            }
        };

        match settled {
            // Removed by someone else while the push was running.
            Err(Error::NotFound(_)) => Ok(()),
            other => other,
        }
    }
}

/// Empties the in-flight slot when a round task ends, including by panic or abort.
struct InFlightRelease(Arc<EngineInner>);

impl Drop for InFlightRelease {
    fn drop(&mut self) {
        *self
            .0
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}
