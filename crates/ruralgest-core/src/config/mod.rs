//! Runtime sync configuration.
//!
//! Values come from `RURALGEST_*` environment variables. Parsing goes through
//! a lookup function so it can be exercised without touching the process
//! environment.

use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::sync::{normalize_base_url, EngineOptions, FailedPushPolicy, RemoteOptions};
use crate::util::normalize_text_option;

pub const BACKEND_URL_VAR: &str = "RURALGEST_BACKEND_URL";
pub const SYNC_INTERVAL_VAR: &str = "RURALGEST_SYNC_INTERVAL_SECS";
pub const REQUEST_TIMEOUT_VAR: &str = "RURALGEST_REQUEST_TIMEOUT_SECS";
pub const REQUEST_ATTEMPTS_VAR: &str = "RURALGEST_REQUEST_ATTEMPTS";
pub const ROUND_TIMEOUT_VAR: &str = "RURALGEST_ROUND_TIMEOUT_SECS";
pub const FAILED_PUSH_POLICY_VAR: &str = "RURALGEST_FAILED_PUSH_POLICY";

const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
const DEFAULT_REQUEST_ATTEMPTS: u32 = 3;
const DEFAULT_ROUND_TIMEOUT_SECS: u64 = 120;
/// Upper bound for every duration setting (30 days)
pub const MAX_DURATION_SECS: u64 = 30 * 24 * 60 * 60;

/// Everything the sync subsystem needs besides the store location
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncSettings {
    /// Backend base address; `None` keeps the client local-only
    pub backend_url: Option<String>,
    pub sync_interval: Duration,
    pub request_timeout: Duration,
    pub request_attempts: u32,
    pub round_timeout: Duration,
    pub failed_push_policy: FailedPushPolicy,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            backend_url: None,
            sync_interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            request_attempts: DEFAULT_REQUEST_ATTEMPTS,
            round_timeout: Duration::from_secs(DEFAULT_ROUND_TIMEOUT_SECS),
            failed_push_policy: FailedPushPolicy::default(),
        }
    }
}

impl SyncSettings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| normalize_text_option(lookup(key));

        let backend_url = get(BACKEND_URL_VAR)
            .map(|raw| normalize_base_url(&raw))
            .transpose()
            .map_err(named(BACKEND_URL_VAR))?;

        let failed_push_policy = match get(FAILED_PUSH_POLICY_VAR) {
            Some(raw) => raw.parse().map_err(named(FAILED_PUSH_POLICY_VAR))?,
            None => FailedPushPolicy::default(),
        };

        Ok(Self {
            backend_url,
            sync_interval: seconds(
                get(SYNC_INTERVAL_VAR),
                SYNC_INTERVAL_VAR,
                DEFAULT_SYNC_INTERVAL_SECS,
            )?,
            request_timeout: seconds(
                get(REQUEST_TIMEOUT_VAR),
                REQUEST_TIMEOUT_VAR,
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?,
            request_attempts: positive(
                get(REQUEST_ATTEMPTS_VAR),
                REQUEST_ATTEMPTS_VAR,
                DEFAULT_REQUEST_ATTEMPTS,
            )?,
            round_timeout: seconds(
                get(ROUND_TIMEOUT_VAR),
                ROUND_TIMEOUT_VAR,
                DEFAULT_ROUND_TIMEOUT_SECS,
            )?,
            failed_push_policy,
        })
    }

    /// Replace the backend address (e.g. from a command-line flag).
    pub fn with_backend_url(mut self, raw: &str) -> Result<Self> {
        self.backend_url = Some(normalize_base_url(raw)?);
        Ok(self)
    }

    pub const fn is_sync_configured(&self) -> bool {
        self.backend_url.is_some()
    }

    /// Remote client settings, if a backend is configured.
    pub fn remote_options(&self) -> Option<RemoteOptions> {
        self.backend_url.as_ref().map(|base_url| RemoteOptions {
            request_timeout: self.request_timeout,
            attempts: self.request_attempts,
            ..RemoteOptions::new(base_url.clone())
        })
    }

    pub const fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            failed_push_policy: self.failed_push_policy,
            round_timeout: self.round_timeout,
        }
    }
}

/// Prefix a configuration error with the variable it came from.
fn named(key: &str) -> impl FnOnce(Error) -> Error + '_ {
    move |error| match error {
        Error::Config(message) => Error::Config(format!("{key}: {message}")),
        other => other,
    }
}

fn positive<T>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.parse::<T>() {
        Ok(value) if value > T::default() => Ok(value),
        _ => Err(Error::Config(format!(
            "{key} must be a positive integer, got '{raw}'"
        ))),
    }
}

fn seconds(raw: Option<String>, key: &str, default: u64) -> Result<Duration> {
    let secs = positive(raw, key, default)?;
    if secs > MAX_DURATION_SECS {
        return Err(Error::Config(format!(
            "{key} must be at most {MAX_DURATION_SECS} seconds, got {secs}"
        )));
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect::<HashMap<_, _>>();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let settings = SyncSettings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings, SyncSettings::default());
        assert!(!settings.is_sync_configured());
        assert!(settings.remote_options().is_none());
        assert_eq!(settings.sync_interval, Duration::from_secs(300));
    }

    #[test]
    fn reads_all_values() {
        let settings = SyncSettings::from_lookup(lookup(&[
            (BACKEND_URL_VAR, "https://api.ruralgest.example/"),
            (SYNC_INTERVAL_VAR, "60"),
            (REQUEST_TIMEOUT_VAR, "5"),
            (REQUEST_ATTEMPTS_VAR, "1"),
            (ROUND_TIMEOUT_VAR, "30"),
            (FAILED_PUSH_POLICY_VAR, "retain"),
        ]))
        .unwrap();

        assert_eq!(
            settings.backend_url.as_deref(),
            Some("https://api.ruralgest.example")
        );
        assert_eq!(settings.sync_interval, Duration::from_secs(60));
        assert_eq!(settings.failed_push_policy, FailedPushPolicy::Retain);

        let remote = settings.remote_options().unwrap();
        assert_eq!(remote.request_timeout, Duration::from_secs(5));
        assert_eq!(remote.attempts, 1);

        let engine = settings.engine_options();
        assert_eq!(engine.round_timeout, Duration::from_secs(30));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let settings =
            SyncSettings::from_lookup(lookup(&[(BACKEND_URL_VAR, "  "), (SYNC_INTERVAL_VAR, "")]))
                .unwrap();
        assert_eq!(settings, SyncSettings::default());
    }

    #[test]
    fn rejects_invalid_values() {
        for pairs in [
            [(BACKEND_URL_VAR, "api.ruralgest.example")],
            [(SYNC_INTERVAL_VAR, "0")],
            [(REQUEST_ATTEMPTS_VAR, "-1")],
            [(ROUND_TIMEOUT_VAR, "soon")],
            [(FAILED_PUSH_POLICY_VAR, "ignore")],
            [(SYNC_INTERVAL_VAR, "18446744073709551615")],
            [(REQUEST_TIMEOUT_VAR, "2592001")],
        ] {
            let error = SyncSettings::from_lookup(lookup(&pairs)).unwrap_err();
            assert!(
                error.to_string().contains(pairs[0].0),
                "error should name {}: {error}",
                pairs[0].0
            );
        }
    }

    #[test]
    fn accepts_longest_allowed_interval() {
        let settings = SyncSettings::from_lookup(lookup(&[(SYNC_INTERVAL_VAR, "2592000")])).unwrap();
        assert_eq!(settings.sync_interval, Duration::from_secs(MAX_DURATION_SECS));
    }

    #[test]
    fn with_backend_url_overrides_environment() {
        let settings = SyncSettings::from_lookup(lookup(&[(BACKEND_URL_VAR, "https://a.example")]))
            .unwrap()
            .with_backend_url("http://localhost:8000/")
            .unwrap();
        assert_eq!(settings.backend_url.as_deref(), Some("http://localhost:8000"));
    }
}
