//! Argument parsing and command dispatch for the local engine CLI.
//!
//! Grounded on the teacher's own `cli.rs`: a top-level `Cli` with global
//! `--format`/`--data-dir` options and clap-derived subcommands, dispatched
//! from a thin `run()` that maps the result to a process exit code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use revaer_telemetry::{init_logging, LoggingConfig};
use uuid::Uuid;

use crate::commands::{download, metrics, search, settings, CommandResult};
use crate::engine::Engine;
use crate::output::OutputFormat;

const DEFAULT_DATA_DIR: &str = "./revaer-data";

/// Local engine CLI: search, download, and settings management with no
/// server in between.
#[derive(Parser)]
#[command(name = "revaer", version, about = "Discovery & retrieval engine CLI")]
struct Cli {
    /// Directory holding the settings tiers and any on-disk state.
    #[arg(long, env = "REVAER_HOME", default_value = DEFAULT_DATA_DIR, global = true)]
    data_dir: PathBuf,
    /// Output format for commands that render data.
    #[arg(long, value_enum, default_value = "table", global = true)]
    format: OutputFormat,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search-job commands.
    #[command(subcommand)]
    Search(SearchCommand),
    /// Download-manager commands.
    #[command(subcommand)]
    Download(DownloadCommand),
    /// Settings commands.
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// Render process metrics in Prometheus exposition format.
    Metrics,
}

#[derive(Subcommand)]
enum SearchCommand {
    /// Create a new search job and print its id.
    Start(SearchStartArgs),
    /// Print a job's current snapshot.
    Get {
        /// Job id.
        id: Uuid,
    },
    /// Poll a job until it reaches a terminal status, then print it.
    Wait {
        /// Job id.
        id: Uuid,
    },
    /// Request cancellation of a running job.
    Cancel {
        /// Job id.
        id: Uuid,
    },
}

#[derive(Args)]
struct SearchStartArgs {
    /// Query text.
    query: String,
    /// 1-based page number.
    #[arg(long, default_value_t = 1)]
    page: u32,
    /// Results per page.
    #[arg(long, default_value_t = 20)]
    per_page: u32,
    /// Use the deep (all-providers) search mode instead of fast.
    #[arg(long)]
    deep: bool,
    /// Minimum seed count.
    #[arg(long)]
    min_seeds: Option<u64>,
    /// Minimum size in gigabytes.
    #[arg(long)]
    size_min_gb: Option<f64>,
    /// Maximum size in gigabytes.
    #[arg(long)]
    size_max_gb: Option<f64>,
}

#[derive(Subcommand)]
enum DownloadCommand {
    /// Queue a new download job.
    Queue(DownloadQueueArgs),
    /// List every tracked download job.
    List,
    /// Print a job's current snapshot.
    Get {
        /// Job id.
        id: Uuid,
    },
    /// Request a pause.
    Pause {
        /// Job id.
        id: Uuid,
    },
    /// Resume a paused job.
    Resume {
        /// Job id.
        id: Uuid,
    },
    /// Request cancellation.
    Cancel {
        /// Job id.
        id: Uuid,
    },
    /// Remove a terminal job from the table.
    Delete {
        /// Job id.
        id: Uuid,
        /// Also delete the output file from disk.
        #[arg(long)]
        delete_file: bool,
    },
    /// Re-queue a job that ended in `error` or `cancelled`.
    Retry {
        /// Job id.
        id: Uuid,
    },
    /// Change the maximum number of concurrent downloads.
    SetMaxConcurrent {
        /// New capacity.
        capacity: usize,
    },
    /// Switch the active download backend (`native` or `aria2`).
    SetBackend {
        /// Backend name.
        name: String,
    },
    /// Print the active download backend's name.
    GetBackend,
}

#[derive(Args)]
struct DownloadQueueArgs {
    /// Display title.
    #[arg(long)]
    title: String,
    /// Destination path on disk.
    #[arg(long)]
    output: String,
    /// Source magnet URI.
    #[arg(long)]
    magnet: Option<String>,
    /// Source direct or `.torrent` URL.
    #[arg(long)]
    url: Option<String>,
}

#[derive(Subcommand)]
enum SettingsCommand {
    /// Read one key.
    Get {
        /// Settings key.
        key: String,
    },
    /// Write one key. The value is parsed as JSON when possible, otherwise
    /// treated as a bare string.
    Set {
        /// Settings key.
        key: String,
        /// New value.
        value: String,
    },
    /// Print the full effective settings document.
    GetAll,
    /// Reset the active scope back to process defaults.
    Reset,
}

/// Parse arguments, build the engine, dispatch the requested command, and
/// return the process exit code.
pub async fn run() -> i32 {
    let _ = init_logging(&LoggingConfig::default());
    let cli = Cli::parse();

    let engine = match Engine::build(cli.data_dir).await {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("error: {err}");
            return err.exit_code();
        }
    };

    match dispatch(&engine, cli.command, cli.format).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {err}");
            err.exit_code()
        }
    }
}

async fn dispatch(engine: &Engine, command: Command, format: OutputFormat) -> CommandResult<()> {
    match command {
        Command::Search(cmd) => dispatch_search(engine, cmd, format).await,
        Command::Download(cmd) => dispatch_download(engine, cmd, format).await,
        Command::Settings(cmd) => dispatch_settings(engine, cmd, format),
        Command::Metrics => metrics::handle_render(engine).await,
    }
}

async fn dispatch_search(engine: &Engine, command: SearchCommand, format: OutputFormat) -> CommandResult<()> {
    match command {
        SearchCommand::Start(args) => {
            search::handle_start(
                engine,
                search::StartArgs {
                    query: args.query,
                    page: args.page,
                    per_page: args.per_page,
                    deep: args.deep,
                    min_seeds: args.min_seeds,
                    size_min_gb: args.size_min_gb,
                    size_max_gb: args.size_max_gb,
                },
            )
            .await
        }
        SearchCommand::Get { id } => search::handle_get(engine, id, format).await,
        SearchCommand::Wait { id } => search::handle_wait(engine, id, format).await.map(|_| ()),
        SearchCommand::Cancel { id } => search::handle_cancel(engine, id).await,
    }
}

async fn dispatch_download(engine: &Engine, command: DownloadCommand, format: OutputFormat) -> CommandResult<()> {
    match command {
        DownloadCommand::Queue(args) => {
            download::handle_queue(
                engine,
                download::QueueArgs {
                    title: args.title,
                    output_path: args.output,
                    magnet: args.magnet,
                    direct_url: args.url,
                },
            )
            .await
        }
        DownloadCommand::List => download::handle_list(engine, format).await,
        DownloadCommand::Get { id } => download::handle_get(engine, id, format).await,
        DownloadCommand::Pause { id } => download::handle_pause(engine, id).await,
        DownloadCommand::Resume { id } => download::handle_resume(engine, id).await,
        DownloadCommand::Cancel { id } => download::handle_cancel(engine, id).await,
        DownloadCommand::Delete { id, delete_file } => download::handle_delete(engine, id, delete_file).await,
        DownloadCommand::Retry { id } => download::handle_retry(engine, id).await,
        DownloadCommand::SetMaxConcurrent { capacity } => download::handle_set_max_concurrent(engine, capacity).await,
        DownloadCommand::SetBackend { name } => download::handle_set_backend(engine, &name).await,
        DownloadCommand::GetBackend => download::handle_get_backend(engine).await,
    }
}

fn dispatch_settings(engine: &Engine, command: SettingsCommand, format: OutputFormat) -> CommandResult<()> {
    match command {
        SettingsCommand::Get { key } => settings::handle_get(engine, &key, format),
        SettingsCommand::Set { key, value } => settings::handle_set(engine, &key, &value, format),
        SettingsCommand::GetAll => settings::handle_get_all(engine, format),
        SettingsCommand::Reset => settings::handle_reset(engine),
    }
}
