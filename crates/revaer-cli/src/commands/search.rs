//! Search-job commands: create/poll/cancel over the async search-job
//! facade.

use std::time::Duration;

use revaer_core::{SearchFilters, SearchJob, SearchMode};
use revaer_coordinator::CreateJobRequest;
use uuid::Uuid;

use crate::commands::{CommandError, CommandResult};
use crate::engine::Engine;
use crate::output::{render_search_job, OutputFormat};

/// Arguments for `search start`.
pub struct StartArgs {
    /// Raw query text.
    pub query: String,
    /// 1-based page number.
    pub page: u32,
    /// Results requested per page.
    pub per_page: u32,
    /// `fast` or `deep`.
    pub deep: bool,
    /// Minimum seed count filter.
    pub min_seeds: Option<u64>,
    /// Minimum size in GB.
    pub size_min_gb: Option<f64>,
    /// Maximum size in GB.
    pub size_max_gb: Option<f64>,
}

pub(crate) async fn handle_start(engine: &Engine, args: StartArgs) -> CommandResult<()> {
    if args.query.trim().is_empty() {
        return Err(CommandError::validation("query must not be empty"));
    }
    let request = CreateJobRequest {
        query: args.query,
        page: args.page.max(1),
        per_page: args.per_page.max(1),
        mode: if args.deep { SearchMode::Deep } else { SearchMode::Fast },
        filters: SearchFilters {
            min_seeds: args.min_seeds,
            size_min_gb: args.size_min_gb,
            size_max_gb: args.size_max_gb,
            ..SearchFilters::default()
        },
    };
    let id = engine.jobs.create_job(request).await;
    println!("job started: {id}");
    Ok(())
}

pub(crate) async fn handle_get(engine: &Engine, id: Uuid, format: OutputFormat) -> CommandResult<()> {
    let job = engine.jobs.get_job(id).await?;
    render_search_job(&job, format)
}

pub(crate) async fn handle_wait(engine: &Engine, id: Uuid, format: OutputFormat) -> CommandResult<SearchJob> {
    loop {
        let job = engine.jobs.get_job(id).await?;
        if matches!(job.status, revaer_core::SearchJobStatus::Done | revaer_core::SearchJobStatus::Error | revaer_core::SearchJobStatus::Cancelled) {
            render_search_job(&job, format)?;
            return Ok(job);
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

pub(crate) async fn handle_cancel(engine: &Engine, id: Uuid) -> CommandResult<()> {
    engine.jobs.cancel_job(id).await?;
    println!("cancel requested: {id}");
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

    fn args(query: &str) -> StartArgs {
        StartArgs {
            query: query.to_string(),
            page: 1,
            per_page: 20,
            deep: false,
            min_seeds: None,
            size_min_gb: None,
            size_max_gb: None,
        }
    }

    #[tokio::test]
    async fn an_empty_query_is_rejected_before_reaching_the_facade() {
        let (_dir, engine) = engine().await;
        let error = handle_start(&engine, args("   ")).await.expect_err("should reject");
        assert!(matches!(error, CommandError::Validation(_)));
    }

    #[tokio::test]
    async fn a_created_job_can_be_fetched_and_then_cancelled() {
        let (_dir, engine) = engine().await;
        let id = engine.jobs.create_job(CreateJobRequest::new("ubuntu")).await;

        let job = handle_get(&engine, id, OutputFormat::Json).await;
        assert!(job.is_ok());

        handle_cancel(&engine, id).await.expect("cancel");
        // Cancellation is a request, not a guarantee: a fast in-memory job
        // may already have finished by the time it is applied.
        let job = engine.jobs.get_job(id).await.expect("job still tracked");
        assert!(matches!(
            job.status,
            revaer_core::SearchJobStatus::Cancelling
                | revaer_core::SearchJobStatus::Cancelled
                | revaer_core::SearchJobStatus::Done
        ));
    }

    #[tokio::test]
    async fn get_reports_job_not_found_for_an_unknown_id() {
        let (_dir, engine) = engine().await;
        let error = handle_get(&engine, Uuid::new_v4(), OutputFormat::Table).await.expect_err("should fail");
        assert!(matches!(error, CommandError::Coordinator(_)));
    }
}
