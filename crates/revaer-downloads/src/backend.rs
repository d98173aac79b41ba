//! Pluggable download backends (§4.10.1): a resumable native HTTP backend
//! and an external-subprocess backend modeled on aria2c.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use revaer_core::DownloadJob;
use revaer_events::{Event, EventBus};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::debug;

const PROGRESS_CADENCE: Duration = Duration::from_millis(500);
const PAUSE_POLL: Duration = Duration::from_millis(100);
const ARIA2_POLL: Duration = Duration::from_millis(500);
const ARIA2_STDERR_LIMIT: usize = 300;

/// Outcome of one backend [`DownloadBackend::download`] attempt.
#[derive(Debug, Clone, Default)]
pub struct DownloadBackendResult {
    /// Whether the transfer reached completion (not cancelled, not errored).
    pub completed: bool,
    /// Set when the transfer failed outright.
    pub error: Option<String>,
    /// Set when the transfer succeeded but something is worth surfacing
    /// (e.g. an unsupported-pause notice).
    pub warning: Option<String>,
}

/// A pluggable transport for fetching a resolved direct URL into a
/// [`DownloadJob`]'s output path.
#[async_trait]
pub trait DownloadBackend: Send + Sync {
    /// Stable name this backend is registered under.
    fn name(&self) -> &'static str;

    /// Whether this backend can be used right now (e.g. an external binary
    /// is reachable on `PATH`). Defaults to always available.
    fn is_available(&self) -> bool {
        true
    }

    /// Fetch `url` into `job`'s output path, mutating its progress fields in
    /// place and emitting [`Event::DownloadProgress`] at intervals. Honours
    /// `job.cancel_requested`/`job.pause_requested` at its natural
    /// checkpoints (chunk boundaries for the native backend, poll ticks for
    /// the external one).
    async fn download(&self, job: &Arc<RwLock<DownloadJob>>, url: &str, events: &EventBus) -> DownloadBackendResult;
}

async fn emit_progress(events: &EventBus, job: &Arc<RwLock<DownloadJob>>) {
    let guard = job.read().await;
    events.publish(Event::DownloadProgress {
        job_id: guard.id,
        downloaded_bytes: guard.downloaded_bytes,
        total_bytes: guard.total_bytes,
        speed_kbps: guard.speed_kbps,
    });
}

/// Resume-aware ranged-GET backend. Default; always available.
#[derive(Debug, Default)]
pub struct NativeBackend {
    client: Client,
}

impl NativeBackend {
    /// Build a backend using the given HTTP client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DownloadBackend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn download(&self, job: &Arc<RwLock<DownloadJob>>, url: &str, events: &EventBus) -> DownloadBackendResult {
        let output_path = job.read().await.output_path.clone();
        let path = Path::new(&output_path);
        if let Some(parent) = path.parent() {
            if let Err(error) = tokio::fs::create_dir_all(parent).await {
                return DownloadBackendResult { completed: false, error: Some(error.to_string()), warning: None };
            }
        }

        let existing_bytes = tokio::fs::metadata(path).await.map(|meta| meta.len()).unwrap_or(0);
        let mut request = self.client.get(url);
        if existing_bytes > 0 {
            request = request.header("Range", format!("bytes={existing_bytes}-"));
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(error) => return DownloadBackendResult { completed: false, error: Some(error.to_string()), warning: None },
        };
        if let Err(error) = response.error_for_status_ref() {
            return DownloadBackendResult { completed: false, error: Some(error.to_string()), warning: None };
        }

        let total_bytes = response
            .content_length()
            .map_or(0, |content_length| existing_bytes + content_length);

        {
            let mut guard = job.write().await;
            guard.downloaded_bytes = existing_bytes;
            guard.total_bytes = total_bytes;
        }

        let open_result = if existing_bytes > 0 {
            OpenOptions::new().append(true).open(path).await
        } else {
            OpenOptions::new().create(true).write(true).truncate(true).open(path).await
        };
        let mut file = match open_result {
            Ok(file) => file,
            Err(error) => return DownloadBackendResult { completed: false, error: Some(error.to_string()), warning: None },
        };

        let start = Instant::now();
        let mut last_emit = start;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            if job.read().await.cancel_requested {
                return DownloadBackendResult { completed: false, error: None, warning: None };
            }
            loop {
                if !job.read().await.pause_requested {
                    break;
                }
                sleep(PAUSE_POLL).await;
                if job.read().await.cancel_requested {
                    return DownloadBackendResult { completed: false, error: None, warning: None };
                }
            }

            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(error) => return DownloadBackendResult { completed: false, error: Some(error.to_string()), warning: None },
            };
            if chunk.is_empty() {
                continue;
            }
            if let Err(error) = file.write_all(&chunk).await {
                return DownloadBackendResult { completed: false, error: Some(error.to_string()), warning: None };
            }

            let mut guard = job.write().await;
            guard.downloaded_bytes += chunk.len() as u64;
            guard.recompute_progress();
            let elapsed = start.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                #[expect(clippy::cast_precision_loss, reason = "byte counts never approach 2^53")]
                let downloaded_kib = guard.downloaded_bytes as f64 / 1024.0;
                guard.speed_kbps = downloaded_kib / elapsed;
            }
            drop(guard);

            let now = Instant::now();
            if now.duration_since(last_emit) >= PROGRESS_CADENCE {
                emit_progress(events, job).await;
                last_emit = now;
            }
        }

        if let Err(error) = file.flush().await {
            return DownloadBackendResult { completed: false, error: Some(error.to_string()), warning: None };
        }
        DownloadBackendResult { completed: true, error: None, warning: None }
    }
}

/// External-subprocess backend modeled on `aria2c`: resumable, parallel
/// connections, no native pause support. Selected only when explicitly
/// configured and only used if `aria2c` is found on `PATH`.
#[derive(Debug, Default)]
pub struct Aria2Backend;

impl Aria2Backend {
    /// Construct the backend. Availability is probed per-call via `which`.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DownloadBackend for Aria2Backend {
    fn name(&self) -> &'static str {
        "aria2"
    }

    fn is_available(&self) -> bool {
        which::which("aria2c").is_ok()
    }

    async fn download(&self, job: &Arc<RwLock<DownloadJob>>, url: &str, events: &EventBus) -> DownloadBackendResult {
        if !self.is_available() {
            return DownloadBackendResult {
                completed: false,
                error: Some("aria2c not found".into()),
                warning: None,
            };
        }

        let output_path = job.read().await.output_path.clone();
        let path = std::path::PathBuf::from(&output_path);
        if let Some(parent) = path.parent() {
            if let Err(error) = tokio::fs::create_dir_all(parent).await {
                return DownloadBackendResult { completed: false, error: Some(error.to_string()), warning: None };
            }
        }
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let file_name = path.file_name().and_then(|name| name.to_str()).unwrap_or("download.bin");

        let mut child = match tokio::process::Command::new("aria2c")
            .arg("--allow-overwrite=true")
            .arg("--auto-file-renaming=false")
            .arg("--continue=true")
            .arg("--max-connection-per-server=8")
            .arg("--split=8")
            .arg("--min-split-size=1M")
            .arg("--summary-interval=0")
            .arg("--dir")
            .arg(dir)
            .arg("--out")
            .arg(file_name)
            .arg(url)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(error) => return DownloadBackendResult { completed: false, error: Some(error.to_string()), warning: None },
        };

        let mut last_size: u64 = 0;
        let mut last_tick = Instant::now();
        let mut warned_pause = false;

        loop {
            if job.read().await.cancel_requested {
                let _ = child.kill().await;
                return DownloadBackendResult { completed: false, error: None, warning: None };
            }

            if job.read().await.pause_requested && !warned_pause {
                job.write().await.status_detail = "Pause not supported in aria2 backend.".into();
                emit_progress(events, job).await;
                warned_pause = true;
            }

            match child.try_wait() {
                Ok(Some(status)) => {
                    if let Ok(meta) = tokio::fs::metadata(&path).await {
                        let mut guard = job.write().await;
                        guard.downloaded_bytes = meta.len();
                        guard.recompute_progress();
                    }
                    if !status.success() {
                        let mut stderr_text = String::new();
                        if let Some(mut stderr) = child.stderr.take() {
                            use tokio::io::AsyncReadExt;
                            let _ = stderr.read_to_string(&mut stderr_text).await;
                        }
                        let truncated: String = stderr_text.chars().take(ARIA2_STDERR_LIMIT).collect();
                        return DownloadBackendResult {
                            completed: false,
                            error: Some(format!("aria2 failed ({}): {truncated}", status.code().unwrap_or(-1))),
                            warning: None,
                        };
                    }
                    emit_progress(events, job).await;
                    return DownloadBackendResult { completed: true, error: None, warning: None };
                }
                Ok(None) => {}
                Err(error) => {
                    debug!(%error, "failed to poll aria2 subprocess");
                }
            }

            if let Ok(meta) = tokio::fs::metadata(&path).await {
                let size = meta.len();
                let now = Instant::now();
                let dt = now.duration_since(last_tick).as_secs_f64().max(0.001);
                let delta = size.saturating_sub(last_size);
                let mut guard = job.write().await;
                guard.downloaded_bytes = size;
                guard.recompute_progress();
                #[expect(clippy::cast_precision_loss, reason = "byte counts never approach 2^53")]
                let delta_kib = delta as f64 / 1024.0;
                guard.speed_kbps = delta_kib / dt;
                drop(guard);
                last_size = size;
                last_tick = now;
                emit_progress(events, job).await;
            }

            sleep(ARIA2_POLL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revaer_core::DownloadJob;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn job_handle(output_path: &str) -> Arc<RwLock<DownloadJob>> {
        let job = DownloadJob::new("Test".into(), output_path.into(), None, Some("http://example".into()));
        Arc::new(RwLock::new(job))
    }

    #[tokio::test]
    async fn native_backend_downloads_full_file() {
        let server = MockServer::start().await;
        let body = vec![7u8; 4096];
        Mock::given(method("GET"))
            .and(path("/file"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        let output_path = dir.path().join("out.bin");
        let handle = job_handle(output_path.to_str().expect("utf8 path"));
        let events = EventBus::new();

        let backend = NativeBackend::new(Client::new());
        let result = backend.download(&handle, &format!("{}/file", server.uri()), &events).await;

        assert!(result.completed, "{result:?}");
        let written = tokio::fs::read(&output_path).await.expect("read output");
        assert_eq!(written, body);
        let job = handle.read().await;
        assert_eq!(job.downloaded_bytes, 4096);
        assert_eq!(job.progress, 100);
    }

    #[tokio::test]
    async fn native_backend_resumes_from_existing_bytes() {
        let server = MockServer::start().await;
        let prefix = vec![1u8; 2048];
        let suffix = vec![2u8; 2048];
        let mut full = prefix.clone();
        full.extend_from_slice(&suffix);

        Mock::given(method("GET"))
            .and(path("/file"))
            .and(header("Range", "bytes=2048-"))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(suffix.clone()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        let output_path = dir.path().join("out.bin");
        tokio::fs::write(&output_path, &prefix).await.expect("seed partial file");

        let handle = job_handle(output_path.to_str().expect("utf8 path"));
        let events = EventBus::new();
        let backend = NativeBackend::new(Client::new());
        let result = backend.download(&handle, &format!("{}/file", server.uri()), &events).await;

        assert!(result.completed, "{result:?}");
        let written = tokio::fs::read(&output_path).await.expect("read output");
        assert_eq!(written, full);
        assert_eq!(handle.read().await.downloaded_bytes, 4096);
    }

    #[tokio::test]
    async fn native_backend_honours_a_pre_set_cancel_flag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9u8; 4096]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        let output_path = dir.path().join("out.bin");
        let handle = job_handle(output_path.to_str().expect("utf8 path"));
        handle.write().await.cancel_requested = true;

        let events = EventBus::new();
        let backend = NativeBackend::new(Client::new());
        let result = backend.download(&handle, &format!("{}/file", server.uri()), &events).await;

        assert!(!result.completed);
        assert!(result.error.is_none());
        assert_eq!(handle.read().await.downloaded_bytes, 0);
    }

    #[test]
    fn aria2_backend_reports_its_name() {
        assert_eq!(Aria2Backend::new().name(), "aria2");
    }

    #[test]
    fn native_backend_is_always_available() {
        assert!(NativeBackend::new(Client::new()).is_available());
    }
}
