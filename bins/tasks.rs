use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use common::utils::logging::{init_logging_default, init_logging_json};
use configs::{AppConfig, LogFormat};
use dotenvy::dotenv;
use futures_util::StreamExt;
use service::runtime;
use service::tasks::{TasksRepository, TasksUiModel, TasksViewModel};
use service::user_preferences::UserPreferencesRepository;
use std::path::Path;
use tracing::{error, info};
use uuid::Uuid;

/// Task list sample: sort order and completed-task visibility are remembered.
#[derive(Parser)]
#[command(name = "tasks", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

impl Switch {
    fn enabled(self) -> bool {
        matches!(self, Switch::On)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Print the filtered and sorted task list
    List {
        /// Print the view model as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sort by deadline (latest first)
    SortDeadline { state: Switch },
    /// Sort by priority (high first)
    SortPriority { state: Switch },
    /// Include completed tasks
    ShowCompleted { state: Switch },
    /// Re-print the list on every preference change until Ctrl+C, including
    /// changes made by other invocations
    Watch {
        /// How often to re-read the store file, in milliseconds
        #[arg(long, default_value_t = 500)]
        poll_ms: u64,
    },
}

fn init_logging(cfg: &AppConfig) {
    let filter = cfg.logging.filter.as_deref();
    match cfg.logging.format {
        LogFormat::Json => init_logging_json(filter),
        LogFormat::Compact => init_logging_default(filter),
    }
    info!(service = "tasks", event = "logger_init", "tracing subscriber initialized");
}

fn print_model(model: &TasksUiModel) {
    println!(
        "sort: {}  show completed: {}",
        model.sort_order,
        if model.show_completed { "on" } else { "off" }
    );
    for task in &model.tasks {
        println!(
            "[{}] {:<40} {}  {:?}",
            if task.completed { "x" } else { " " },
            task.name,
            task.deadline.format("%d-%m-%Y"),
            task.priority
        );
    }
}

async fn run(command: Command, cfg: AppConfig) -> anyhow::Result<()> {
    let registry = runtime::open_registry(&cfg).await?;
    let preferences = UserPreferencesRepository::open(
        registry,
        Path::new(&cfg.storage.legacy_dir),
        cfg.storage.delete_legacy_after_migration,
    )?;
    let store = preferences.store().clone();
    let view = TasksViewModel::new(Arc::new(TasksRepository::default()), preferences);

    match command {
        Command::List { json } => {
            let model = view.current_ui_model().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&model)?);
            } else {
                print_model(&model);
            }
        }
        Command::SortDeadline { state } => {
            let order = view.enable_sort_by_deadline(state.enabled()).await?;
            println!("sort: {order}");
        }
        Command::SortPriority { state } => {
            let order = view.enable_sort_by_priority(state.enabled()).await?;
            println!("sort: {order}");
        }
        Command::ShowCompleted { state } => {
            view.show_completed_tasks(state.enabled()).await?;
            println!("show completed: {}", if state.enabled() { "on" } else { "off" });
        }
        Command::Watch { poll_ms } => {
            let initial = view.initial_setup().await?;
            info!(service = "tasks", sort_order = %initial.sort_order, show_completed = initial.show_completed, "initial filters");
            let poller = store.spawn_refresh(Duration::from_millis(poll_ms.max(1)));
            info!(service = "tasks", store = store.name(), location = %store.location(), poll_ms, "watching preferences");
            let mut models = Box::pin(view.tasks_ui_model_stream());
            let outcome = loop {
                tokio::select! {
                    next = models.next() => match next {
                        Some(Ok(model)) => {
                            print_model(&model);
                            println!();
                        }
                        Some(Err(e)) => break Err(e.into()),
                        None => break Ok(()),
                    },
                    _ = tokio::signal::ctrl_c() => {
                        info!(service = "tasks", event = "shutdown_signal", "received Ctrl+C, stopping watch");
                        break Ok(());
                    }
                }
            };
            poller.abort();
            return outcome;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    // 先加载 .env，使 CONFIG_PATH / RUST_LOG 等环境变量生效
    dotenv().ok();
    let cli = Cli::parse();

    let cfg = match AppConfig::load_and_validate() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("invalid configuration: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&cfg);

    let service_id = Uuid::new_v4();
    let pid = std::process::id();
    let version = env!("CARGO_PKG_VERSION");

    std::panic::set_hook(Box::new(move |info| {
        error!(
            service = "tasks",
            event = "panic",
            %service_id,
            pid,
            message = %info,
            "unhandled panic occurred"
        );
    }));

    info!(service = "tasks", event = "start", %service_id, pid, version, data_dir = %cfg.storage.data_dir, "tasks sample starting");

    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(service = "tasks", event = "runtime_build_failed", error = %e, "failed to build tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(cli.command, cfg)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(service = "tasks", event = "run_failed", error = %e, "command failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
