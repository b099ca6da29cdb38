//! Cross-process rate limiting over shared lock files.
//!
//! Callers are independent short-lived process invocations, so the
//! last-request timestamp for each API lives in a named file under the
//! system temp directory rather than in process memory. An exclusive
//! advisory lock serializes the read-sleep-record window across processes;
//! where locking is unavailable the limiter degrades to an unlocked
//! best-effort timestamp check instead of failing.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fs2::FileExt;

use crate::Error;

/// Directory under the system temp dir holding one state file per API.
const STATE_DIR: &str = "litref_ratelimits";

/// Fixed per-API minimum intervals, in seconds, tuned below each API's
/// documented allowance.
const REGISTRY: &[(&str, f64)] = &[
    ("semantic_scholar", 1.1),
    ("brave", 1.1),
    // CrossRef allows 50/s
    ("crossref", 0.05),
    // OpenAlex allows 10/s
    ("openalex", 0.11),
    ("arxiv", 3.0),
    ("sep_fetch", 1.0),
    ("iep_fetch", 1.0),
    // CORE free tier: 5 requests per 10 seconds
    ("core", 2.0),
];

fn default_state_dir() -> PathBuf {
    std::env::temp_dir().join(STATE_DIR)
}

/// Look up the pre-configured limiter for a registered API name.
///
/// Unregistered names are a caller bug and fail fast rather than silently
/// getting some default interval.
pub fn get_limiter(api_name: &str) -> Result<RateLimiter, Error> {
    match REGISTRY.iter().find(|(name, _)| *name == api_name) {
        Some((name, secs)) => Ok(RateLimiter::new(name, Duration::from_secs_f64(*secs))),
        None => {
            let valid: Vec<&str> = REGISTRY.iter().map(|(name, _)| *name).collect();
            Err(Error::UnknownApi(format!(
                "{api_name} (valid: {})",
                valid.join(", ")
            )))
        }
    }
}

/// API names with persisted limiter state on this machine.
pub fn list_active() -> Vec<String> {
    list_active_in(&default_state_dir())
}

fn list_active_in(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return names;
    };
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if let Some(api) = file_name
            .strip_prefix(".ratelimit_")
            .and_then(|rest| rest.strip_suffix(".lock"))
        {
            names.push(api.to_string());
        }
    }
    names.sort_unstable();
    names
}

/// Remove all persisted limiter state. Returns the number of files removed.
pub fn clear_all() -> std::io::Result<usize> {
    clear_all_in(&default_state_dir())
}

fn clear_all_in(dir: &Path) -> std::io::Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err),
    };
    let mut count = 0;
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if file_name.starts_with(".ratelimit_") && file_name.ends_with(".lock") {
            fs::remove_file(entry.path())?;
            count += 1;
        }
    }
    Ok(count)
}

/// File-based rate limiter coordinating across process invocations.
///
/// The persisted state is a single textual floating-point Unix timestamp:
/// the completion time of the last recorded request for this API.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    api_name: String,
    min_interval: Duration,
    state_file: PathBuf,
}

impl RateLimiter {
    pub fn new(api_name: &str, min_interval: Duration) -> Self {
        Self::with_state_dir(api_name, min_interval, default_state_dir())
    }

    /// Place the state file under an explicit directory (tests use a
    /// tempdir so parallel test runs don't share state).
    pub fn with_state_dir(api_name: &str, min_interval: Duration, dir: PathBuf) -> Self {
        let state_file = dir.join(format!(".ratelimit_{api_name}.lock"));
        Self {
            api_name: api_name.to_string(),
            min_interval,
            state_file,
        }
    }

    pub fn api_name(&self) -> &str {
        &self.api_name
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Block until at least `min_interval` has elapsed since the last
    /// recorded request for this API, across all processes. Call BEFORE
    /// each request.
    ///
    /// Returns the time actually slept (zero when no wait was needed).
    /// Never fails: I/O or locking problems must not abort the caller's
    /// lookup, so they degrade to proceeding without coordination.
    pub async fn wait(&self) -> Duration {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.wait_blocking())
            .await
            .unwrap_or(Duration::ZERO)
    }

    /// Durably store "now" as the last-request time. Call AFTER the
    /// request has actually been dispatched.
    pub async fn record(&self) {
        let this = self.clone();
        let _ = tokio::task::spawn_blocking(move || this.record_blocking()).await;
    }

    /// Convenience compound for call sites that don't inspect the response
    /// before recording.
    pub async fn wait_and_record(&self) -> Duration {
        let this = self.clone();
        tokio::task::spawn_blocking(move || {
            let waited = this.wait_blocking();
            this.record_blocking();
            waited
        })
        .await
        .unwrap_or(Duration::ZERO)
    }

    /// Synchronous [`wait`](Self::wait); holds the file lock for the whole
    /// read-sleep window so concurrent processes queue behind it.
    pub fn wait_blocking(&self) -> Duration {
        match self.open_state_file() {
            Ok(file) => {
                let locked = file.lock_exclusive().is_ok();
                if !locked {
                    tracing::debug!(
                        api = %self.api_name,
                        "file lock unavailable, falling back to unlocked timestamp check"
                    );
                }
                let waited = self.sleep_out_interval(&file);
                if locked {
                    let _ = FileExt::unlock(&file);
                }
                waited
            }
            Err(err) => {
                tracing::debug!(
                    api = %self.api_name,
                    error = %err,
                    "rate limiter state unavailable, proceeding without throttle"
                );
                Duration::ZERO
            }
        }
    }

    /// Synchronous [`record`](Self::record).
    pub fn record_blocking(&self) {
        match self.open_state_file() {
            Ok(file) => {
                let locked = file.lock_exclusive().is_ok();
                if let Err(err) = write_timestamp(&file, now_epoch()) {
                    tracing::debug!(api = %self.api_name, error = %err, "failed to record request time");
                }
                if locked {
                    let _ = FileExt::unlock(&file);
                }
            }
            Err(err) => {
                tracing::debug!(api = %self.api_name, error = %err, "failed to record request time");
            }
        }
    }

    /// Clear persisted state (test/debug use).
    pub fn reset(&self) -> std::io::Result<()> {
        match fs::remove_file(&self.state_file) {
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn open_state_file(&self) -> std::io::Result<File> {
        if let Some(parent) = self.state_file.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.state_file)
    }

    fn sleep_out_interval(&self, file: &File) -> Duration {
        let last_request = read_timestamp(file);
        let elapsed = now_epoch() - last_request;
        let remaining = self.min_interval.as_secs_f64() - elapsed;
        if remaining <= 0.0 {
            return Duration::ZERO;
        }
        // Clock skew can put the recorded time in the future; never sleep
        // longer than the interval itself.
        let wait = Duration::from_secs_f64(remaining.min(self.min_interval.as_secs_f64()));
        tracing::debug!(api = %self.api_name, wait_secs = wait.as_secs_f64(), "throttling");
        std::thread::sleep(wait);
        wait
    }
}

fn now_epoch() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn read_timestamp(mut file: &File) -> f64 {
    let mut content = String::new();
    let _ = file.seek(SeekFrom::Start(0));
    let _ = file.read_to_string(&mut content);
    content.trim().parse().unwrap_or(0.0)
}

fn write_timestamp(mut file: &File, timestamp: f64) -> std::io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    write!(file, "{timestamp}")?;
    file.flush()
}
