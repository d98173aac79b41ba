//! Metrics command: refreshes the engine's download gauges from the live
//! job table, then renders the Prometheus registry as exposition text.
//!
//! There is no search-job listing API on [`revaer_coordinator::JobFacade`],
//! so `active_search_jobs` is left at its last-set value (zero, for a
//! freshly built engine) rather than guessed at.

use revaer_core::JobStatus;

use crate::commands::CommandResult;
use crate::engine::Engine;

pub(crate) async fn handle_render(engine: &Engine) -> CommandResult<()> {
    let jobs = engine.downloads.get_all().await;
    let active = jobs
        .iter()
        .filter(|job| !matches!(job.status, JobStatus::Completed | JobStatus::Cancelled | JobStatus::Error))
        .count();
    let downloaded_bytes: u64 = jobs.iter().map(|job| job.downloaded_bytes).sum();

    engine.metrics.set_active_downloads(i64::try_from(active).unwrap_or(i64::MAX));
    engine.metrics.inc_downloaded_bytes(downloaded_bytes);

    let rendered = engine.metrics.render().map_err(|err| crate::commands::CommandError::Metrics(err.to_string()))?;
    print!("{rendered}");
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
    async fn render_succeeds_against_an_empty_job_table() {
        let (_dir, engine) = engine().await;
        handle_render(&engine).await.expect("render");
    }
}
