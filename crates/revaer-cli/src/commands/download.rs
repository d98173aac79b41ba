//! Download-manager commands: queue/list/get/pause/resume/cancel/delete/
//! retry, plus the backend/concurrency controls.

use revaer_downloads::QueueRequest;
use uuid::Uuid;

use crate::commands::{CommandError, CommandResult};
use crate::engine::Engine;
use crate::output::{render_download_job, render_download_jobs, OutputFormat};

/// Arguments for `download queue`.
pub struct QueueArgs {
    /// Display title.
    pub title: String,
    /// Destination path on disk.
    pub output_path: String,
    /// Source magnet URI.
    pub magnet: Option<String>,
    /// Source direct/torrent URL.
    pub direct_url: Option<String>,
}

pub(crate) async fn handle_queue(engine: &Engine, args: QueueArgs) -> CommandResult<()> {
    if args.magnet.is_none() && args.direct_url.is_none() {
        return Err(CommandError::validation("one of --magnet or --url is required"));
    }
    let id = engine
        .downloads
        .queue(QueueRequest {
            title: args.title,
            output_path: args.output_path,
            magnet: args.magnet,
            direct_url: args.direct_url,
        })
        .await?;
    println!("queued: {id}");
    Ok(())
}

pub(crate) async fn handle_list(engine: &Engine, format: OutputFormat) -> CommandResult<()> {
    let jobs = engine.downloads.get_all().await;
    render_download_jobs(&jobs, format)
}

pub(crate) async fn handle_get(engine: &Engine, id: Uuid, format: OutputFormat) -> CommandResult<()> {
    let job = engine.downloads.get(id).await?;
    render_download_job(&job, format)
}

pub(crate) async fn handle_pause(engine: &Engine, id: Uuid) -> CommandResult<()> {
    engine.downloads.pause(id).await?;
    Ok(())
}

pub(crate) async fn handle_resume(engine: &Engine, id: Uuid) -> CommandResult<()> {
    engine.downloads.resume(id).await?;
    Ok(())
}

pub(crate) async fn handle_cancel(engine: &Engine, id: Uuid) -> CommandResult<()> {
    engine.downloads.cancel(id).await?;
    Ok(())
}

pub(crate) async fn handle_delete(engine: &Engine, id: Uuid, delete_file: bool) -> CommandResult<()> {
    engine.downloads.delete(id, delete_file).await?;
    Ok(())
}

pub(crate) async fn handle_retry(engine: &Engine, id: Uuid) -> CommandResult<()> {
    engine.downloads.retry(id).await?;
    Ok(())
}

pub(crate) async fn handle_set_max_concurrent(engine: &Engine, capacity: usize) -> CommandResult<()> {
    engine.downloads.set_max_concurrent(capacity).await;
    Ok(())
}

pub(crate) async fn handle_set_backend(engine: &Engine, name: &str) -> CommandResult<()> {
    engine.downloads.set_backend(name).await?;
    Ok(())
}

pub(crate) async fn handle_get_backend(engine: &Engine) -> CommandResult<()> {
    println!("{}", engine.downloads.get_backend().await);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn engine() -> (tempfile::TempDir, Engine) {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = Engine::build(dir.path()).await.expect("engine builds");
        (dir, engine)
    }

    #[tokio::test]
    async fn queue_without_a_source_is_rejected() {
        let (_dir, engine) = engine().await;
        let error = handle_queue(
            &engine,
            QueueArgs { title: "no source".into(), output_path: "/tmp/out.bin".into(), magnet: None, direct_url: None },
        )
        .await
        .expect_err("should reject");
        assert!(matches!(error, CommandError::Validation(_)));
        assert_eq!(error.exit_code(), 2);
    }

    #[tokio::test]
    async fn queue_then_list_then_get_round_trips() {
        let (_dir, engine) = engine().await;
        let output_path = "/tmp/revaer-cli-test-download.bin".to_string();
        handle_queue(
            &engine,
            QueueArgs {
                title: "sample".into(),
                output_path,
                magnet: None,
                direct_url: Some("https://example.invalid/file.bin".into()),
            },
        )
        .await
        .expect("queue");

        let jobs = engine.downloads.get_all().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].title, "sample");

        let fetched = engine.downloads.get(jobs[0].id).await.expect("get");
        assert_eq!(fetched.id, jobs[0].id);
    }

    #[tokio::test]
    async fn unknown_job_id_propagates_as_a_download_error() {
        let (_dir, engine) = engine().await;
        let error = handle_pause(&engine, Uuid::new_v4()).await.expect_err("should fail");
        assert!(matches!(error, CommandError::Download(_)));
    }

    #[tokio::test]
    async fn set_backend_rejects_unknown_names() {
        let (_dir, engine) = engine().await;
        let error = handle_set_backend(&engine, "does-not-exist").await.expect_err("should reject");
        assert!(matches!(error, CommandError::Download(_)));
    }

    #[tokio::test]
    async fn set_max_concurrent_always_succeeds() {
        let (_dir, engine) = engine().await;
        handle_set_max_concurrent(&engine, 5).await.expect("set max concurrent");
    }
}
