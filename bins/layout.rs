use std::process::ExitCode;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};
use common::utils::logging::{init_logging_default, init_logging_json};
use configs::{AppConfig, LogFormat};
use dotenvy::dotenv;
use futures_util::StreamExt;
use service::layout::LayoutSettings;
use service::runtime;
use tracing::{error, info};
use uuid::Uuid;

/// Layout preference sample: remembers whether the list is linear or a grid.
#[derive(Parser)]
#[command(name = "layout", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the stored layout
    Show {
        /// Also print where the store lives and everything it holds
        #[arg(short, long)]
        verbose: bool,
    },
    /// Store the layout explicitly
    Set {
        #[arg(long, action = ArgAction::Set)]
        linear: bool,
    },
    /// Switch between linear and grid
    Toggle,
    /// Print every layout change until Ctrl+C, including changes made by
    /// other invocations
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
    info!(service = "layout", event = "logger_init", "tracing subscriber initialized");
}

fn describe(is_linear: bool) -> &'static str {
    if is_linear { "linear" } else { "grid" }
}

async fn run(command: Command, cfg: AppConfig) -> anyhow::Result<()> {
    let registry = runtime::open_registry(&cfg).await?;
    let layout = LayoutSettings::open(registry)?;

    match command {
        Command::Show { verbose } => {
            println!("{}", describe(layout.is_linear_layout().await?));
            if verbose {
                let store = layout.store();
                println!("store {} at {}", store.name(), store.location());
                for (name, value) in store.current().await?.iter() {
                    println!("  {name} = {value:?}");
                }
            }
        }
        Command::Set { linear } => {
            layout.save_layout(linear).await?;
            println!("{}", describe(linear));
        }
        Command::Toggle => println!("{}", describe(layout.toggle().await?)),
        Command::Watch { poll_ms } => {
            let poller = layout.store().spawn_refresh(Duration::from_millis(poll_ms.max(1)));
            let mut values = Box::pin(layout.is_linear_layout_stream());
            let mut last = None;
            let outcome = loop {
                tokio::select! {
                    next = values.next() => match next {
                        // other keys changing re-emits the same layout
                        Some(Ok(is_linear)) if last != Some(is_linear) => {
                            last = Some(is_linear);
                            println!("{}", describe(is_linear));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => break Err(e.into()),
                        None => break Ok(()),
                    },
                    _ = tokio::signal::ctrl_c() => {
                        info!(service = "layout", event = "shutdown_signal", "received Ctrl+C, stopping watch");
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
            service = "layout",
            event = "panic",
            %service_id,
            pid,
            message = %info,
            "unhandled panic occurred"
        );
    }));

    info!(service = "layout", event = "start", %service_id, pid, version, data_dir = %cfg.storage.data_dir, "layout sample starting");

    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(service = "layout", event = "runtime_build_failed", error = %e, "failed to build tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(cli.command, cfg)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(service = "layout", event = "run_failed", error = %e, "command failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
