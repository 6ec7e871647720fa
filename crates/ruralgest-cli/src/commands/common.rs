use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Url;
use ruralgest_core::models::{DeadLetter, Product};
use ruralgest_core::{
    Collection, Connectivity, HttpRemote, LocalStore, PendingMutation, RemoteAuthority,
    StoreLocation, SyncEngine, SyncSettings,
};
use serde::Serialize;
use tokio::net::TcpStream;

use crate::error::CliError;

const DB_PATH_VAR: &str = "RURALGEST_DB_PATH";
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Options shared by every command
#[derive(Debug, Clone)]
pub struct CliContext {
    pub db_path: PathBuf,
    pub backend_url: Option<String>,
}

impl CliContext {
    pub fn new(db_path: Option<PathBuf>, backend_url: Option<String>) -> Self {
        Self {
            db_path: resolve_db_path(db_path),
            backend_url,
        }
    }

    pub fn store(&self) -> LocalStore {
        LocalStore::new(StoreLocation::file(&self.db_path))
    }

    /// Environment settings with the `--backend-url` flag applied on top.
    pub fn settings(&self) -> Result<SyncSettings, CliError> {
        let settings = SyncSettings::from_env()?;
        match self.backend_url.as_deref() {
            Some(url) => Ok(settings.with_backend_url(url)?),
            None => Ok(settings),
        }
    }

    /// Settings for commands that talk to the backend.
    pub fn sync_settings(&self) -> Result<(SyncSettings, String), CliError> {
        let settings = self.settings()?;
        let backend_url = settings
            .backend_url
            .clone()
            .ok_or(CliError::SyncNotConfigured)?;
        Ok((settings, backend_url))
    }
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os(DB_PATH_VAR).map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ruralgest")
        .join("ruralgest.db")
}

pub fn build_engine(
    store: LocalStore,
    settings: &SyncSettings,
    connectivity: Arc<dyn Connectivity>,
) -> Result<SyncEngine, CliError> {
    let options = settings
        .remote_options()
        .ok_or(CliError::SyncNotConfigured)?;
    let remote: Arc<dyn RemoteAuthority> = Arc::new(HttpRemote::new(options)?);
    Ok(SyncEngine::new(
        store,
        remote,
        connectivity,
        settings.engine_options(),
    ))
}

/// TCP reachability check against the backend host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReachabilityProbe {
    pub host: String,
    pub port: u16,
}

impl ReachabilityProbe {
    pub fn for_base_url(base_url: &str) -> Result<Self, CliError> {
        let url = Url::parse(base_url)
            .map_err(|error| CliError::InvalidArgument(format!("{base_url}: {error}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| CliError::InvalidArgument(format!("{base_url}: missing host")))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| CliError::InvalidArgument(format!("{base_url}: missing port")))?;
        Ok(Self { host, port })
    }

    pub async fn is_reachable(&self) -> bool {
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        matches!(
            tokio::time::timeout(PROBE_TIMEOUT, connect).await,
            Ok(Ok(_))
        )
    }
}

#[derive(Debug, Serialize)]
pub struct PendingItem {
    pub id: i64,
    pub action: String,
    pub endpoint: String,
    pub body: serde_json::Value,
    pub created_at: String,
    pub attempts: u32,
}

impl From<&PendingMutation> for PendingItem {
    fn from(entry: &PendingMutation) -> Self {
        Self {
            id: entry.id,
            action: entry.action.clone(),
            endpoint: entry.payload.endpoint.clone(),
            body: entry.payload.body.clone(),
            created_at: entry.created_at.clone(),
            attempts: entry.attempts,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub db_path: String,
    pub backend_url: Option<String>,
    pub watermark: Option<String>,
    pub pending: usize,
    pub dead_letters: usize,
    pub records: Vec<CollectionCount>,
}

#[derive(Debug, Serialize)]
pub struct CollectionCount {
    pub collection: String,
    pub count: usize,
}

pub async fn load_status(
    store: &LocalStore,
    db_path: &Path,
    backend_url: Option<String>,
) -> Result<StatusReport, CliError> {
    let mut records = Vec::with_capacity(Collection::ALL.len());
    for collection in Collection::ALL {
        records.push(CollectionCount {
            collection: collection.to_string(),
            count: store.count(collection).await?,
        });
    }

    Ok(StatusReport {
        db_path: db_path.display().to_string(),
        backend_url,
        watermark: store.watermark().await?.map(|watermark| watermark.timestamp),
        pending: store.pending_count().await?,
        dead_letters: store.list_dead_letters().await?.len(),
        records,
    })
}

pub fn format_status_lines(status: &StatusReport, now: DateTime<Utc>) -> Vec<String> {
    let watermark = status.watermark.as_deref().map_or_else(
        || "never synced".to_string(),
        |timestamp| format!("{timestamp} ({})", describe_timestamp(timestamp, now)),
    );

    let mut lines = vec![
        format!("Store:        {}", status.db_path),
        format!(
            "Backend:      {}",
            status.backend_url.as_deref().unwrap_or("not configured")
        ),
        format!("Last sync:    {watermark}"),
        format!("Pending:      {}", status.pending),
        format!("Dead letters: {}", status.dead_letters),
    ];
    lines.extend(
        status
            .records
            .iter()
            .map(|entry| format!("  {:<12}{}", entry.collection, entry.count)),
    );
    lines
}

pub fn format_pending_lines(entries: &[PendingMutation], now: DateTime<Utc>) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            let mut line = format!(
                "#{:<5} {:<20} {:<24} {}",
                entry.id,
                entry.action,
                entry.payload.endpoint,
                describe_timestamp(&entry.created_at, now)
            );
            if entry.attempts > 0 {
                line.push_str(&format!(" ({} failed attempts)", entry.attempts));
            }
            line
        })
        .collect()
}

pub fn format_dead_letter_lines(entries: &[DeadLetter], now: DateTime<Utc>) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            format!(
                "#{:<5} {:<20} {:<24} failed {}: {}",
                entry.id,
                entry.action,
                entry.payload.endpoint,
                describe_timestamp(&entry.failed_at, now),
                entry.error
            )
        })
        .collect()
}

pub fn format_low_stock_lines(products: &[Product]) -> Vec<String> {
    products
        .iter()
        .map(|product| {
            format!(
                "{:<24} {} / {} {}",
                product.nome,
                format_quantity(product.estoque_atual),
                format_quantity(product.estoque_minimo),
                product.unidade
            )
        })
        .collect()
}

/// Render a quantity without a trailing `.0` for whole numbers.
pub fn format_quantity(value: f64) -> String {
    let rendered = format!("{value:.3}");
    rendered
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

pub fn parse_json_body(raw: &str) -> Result<serde_json::Value, CliError> {
    serde_json::from_str(raw)
        .map_err(|error| CliError::InvalidArgument(format!("body is not valid JSON: {error}")))
}

fn describe_timestamp(timestamp: &str, now: DateTime<Utc>) -> String {
    DateTime::parse_from_rfc3339(timestamp).map_or_else(
        |_| timestamp.to_string(),
        |parsed| {
            format_relative_time(
                parsed.timestamp_millis(),
                now.timestamp_millis(),
            )
        },
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}
