//! Output renderers and formatting helpers for CLI commands.

use clap::ValueEnum;
use revaer_core::{DownloadJob, JobStatus, SearchJob, SearchJobStatus};
use serde::Serialize;

use crate::commands::CommandResult;

/// Output format shared by every rendering command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON.
    Json,
    /// Human-readable text/table.
    Table,
}

/// Render any `Serialize` value, dispatching on `format`: JSON always goes
/// through `serde_json`, table delegates to `table` for the human view.
pub fn render<T: Serialize>(value: &T, format: OutputFormat, table: impl FnOnce(&T)) -> CommandResult<()> {
    match format {
        OutputFormat::Json => {
            let text = serde_json::to_string_pretty(value)?;
            println!("{text}");
        }
        OutputFormat::Table => table(value),
    }
    Ok(())
}

pub(crate) fn render_search_job(job: &SearchJob, format: OutputFormat) -> CommandResult<()> {
    render(job, format, |job| {
        println!("id: {}", job.id);
        println!("query: {}", job.query);
        println!("status: {} ({:?})", status_to_str(job.status), job.phase);
        println!(
            "sources: {}/{} completed",
            job.progress.completed_sources, job.progress.total_sources
        );
        println!(
            "results: page {} of {} ({} on this page, more: {})",
            job.result.page,
            job.result.per_page,
            job.result.groups.len(),
            job.result.has_more
        );
        println!("{:<60} {:>10} {:>6} {:>6} SOURCE", "TITLE", "SIZE", "SEEDS", "LEECH");
        for result in &job.result.groups {
            let title = truncate(&result.title, 60);
            println!(
                "{title:<60} {:>10} {:>6} {:>6} {}",
                format_bytes(result.size),
                result.seeds,
                result.leeches,
                result.source
            );
        }
    })
}

pub(crate) fn render_download_job(job: &DownloadJob, format: OutputFormat) -> CommandResult<()> {
    render(job, format, |job| {
        println!("id: {}", job.id);
        println!("title: {}", job.title);
        println!("status: {}", download_status_to_str(job.status));
        println!(
            "progress: {}% ({}/{}) at {:.1} KiB/s",
            job.progress,
            format_bytes(job.downloaded_bytes),
            format_bytes(job.total_bytes),
            job.speed_kbps
        );
        if !job.status_detail.is_empty() {
            println!("detail: {}", job.status_detail);
        }
        if let Some(error) = &job.error {
            println!("error: {error}");
        }
        println!("output: {}", job.output_path);
    })
}

pub(crate) fn render_download_jobs(jobs: &[DownloadJob], format: OutputFormat) -> CommandResult<()> {
    render(&jobs.to_vec(), format, |jobs| {
        println!("{:<36} {:<12} {:>5} {:<40} OUTPUT", "ID", "STATUS", "PCT", "TITLE");
        for job in jobs {
            println!(
                "{:<36} {:<12} {:>4}% {:<40} {}",
                job.id,
                download_status_to_str(job.status),
                job.progress,
                truncate(&job.title, 40),
                job.output_path
            );
        }
    })
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let mut clipped: String = text.chars().take(max.saturating_sub(1)).collect();
        clipped.push('…');
        clipped
    }
}

#[must_use]
const fn status_to_str(status: SearchJobStatus) -> &'static str {
    match status {
        SearchJobStatus::Running => "running",
        SearchJobStatus::Cancelling => "cancelling",
        SearchJobStatus::Cancelled => "cancelled",
        SearchJobStatus::Done => "done",
        SearchJobStatus::Error => "error",
    }
}

#[must_use]
const fn download_status_to_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Queued => "queued",
        JobStatus::Resolving => "resolving",
        JobStatus::Downloading => "downloading",
        JobStatus::Paused => "paused",
        JobStatus::Completed => "completed",
        JobStatus::Cancelled => "cancelled",
        JobStatus::Error => "error",
    }
}

#[must_use]
pub(crate) fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = KIB * 1024.0;
    const GIB: f64 = MIB * 1024.0;
    let value = bytes_to_f64(bytes);
    if value >= GIB {
        format!("{:.2} GiB", value / GIB)
    } else if value >= MIB {
        format!("{:.2} MiB", value / MIB)
    } else if value >= KIB {
        format!("{:.2} KiB", value / KIB)
    } else {
        format!("{bytes} B")
    }
}

fn bytes_to_f64(value: u64) -> f64 {
    let high = u32::try_from(value >> 32).unwrap_or(u32::MAX);
    let low = u32::try_from(value & 0xFFFF_FFFF).unwrap_or(u32::MAX);
    f64::from(high) * 4_294_967_296.0 + f64::from(low)
}
