use clap::{Parser, Subcommand};
use lumo::{ActionKind, ClientConfig, Connectivity, FlushOutcome, OfflineQueue};
use lumo_multiplayer::{SessionClient, SessionStatus, SessionWatch};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "lumo", about = "Offline queue and multiplayer tools for Lumo")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, env = "LUMO_DATA_DIR", default_value = "./data")]
    data_dir: String,
    #[arg(long, env = "LUMO_API_URL")]
    api_url: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Queue an action for delivery on the next flush
    Enqueue {
        kind: ActionKind,
        #[arg(default_value = "{}")]
        payload: String,
    },
    /// Print queued actions, oldest first, one JSON object per line
    Pending,
    /// Send everything queued to the batch endpoint once
    Flush,
    /// Keep flushing whenever the API becomes reachable, until Ctrl-C
    Sync,
    /// Follow a multiplayer session and print its status as it changes
    Watch { session_id: String },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn describe(outcome: &FlushOutcome) -> String {
    match outcome {
        FlushOutcome::Skipped(reason) => format!("skipped ({:?})", reason),
        FlushOutcome::Empty => "nothing to flush".to_string(),
        FlushOutcome::BatchPartialResult { committed, retained } => format!(
            "delivered {}, kept {} for retry",
            committed.len(),
            retained.len()
        ),
        FlushOutcome::RequestFailed { error, retained } => {
            format!("request failed, kept {}: {}", retained, error)
        }
    }
}

async fn run_sync(config: ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let connectivity = Connectivity::new(false);
    let probe = connectivity.spawn_probe(
        format!("{}/health", config.base_url()),
        config.probe_interval(),
    );
    let queue = Arc::new(OfflineQueue::open(config, connectivity)?);

    let sync = queue.start_sync();
    eprintln!("Syncing {} pending actions, Ctrl-C to stop", queue.store().len()?);
    tokio::signal::ctrl_c().await?;

    sync.stopped().await;
    probe.abort();
    match queue.last_delivery() {
        0 => eprintln!("{} actions still pending, nothing delivered", queue.store().len()?),
        ts => eprintln!(
            "{} actions still pending, last delivery at {}",
            queue.store().len()?,
            ts
        ),
    }
    Ok(())
}

async fn run_watch(
    config: ClientConfig,
    session_id: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = Arc::new(SessionClient::new(config));
    let session = SessionWatch::start(client, Some(session_id), true);
    let mut rx = session.subscribe();
    let mut last_line = String::new();

    loop {
        let finished = {
            let view = rx.borrow_and_update();
            let line = match &view.error {
                Some(err) => format!("{} [{:?}] error: {}", view.status_label(), view.transport, err),
                None => format!("{} [{:?}]", view.status_label(), view.transport),
            };
            if line != last_line {
                println!("{}", line);
                last_line = line;
            }
            view.state.as_ref().map(|s| s.status) == Some(SessionStatus::Finished)
        };
        if finished {
            break;
        }

        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing();

    std::env::set_var("LUMO_DATA_DIR", &cli.data_dir);
    if let Some(url) = &cli.api_url {
        std::env::set_var("LUMO_API_URL", url);
    }
    let config = ClientConfig::from_env()?;

    match cli.command {
        Command::Enqueue { kind, payload } => {
            let payload: serde_json::Value = serde_json::from_str(&payload)?;
            let queue = OfflineQueue::open(config, Connectivity::new(false))?;
            println!("{}", queue.enqueue(kind, payload)?);
        }
        Command::Pending => {
            let queue = OfflineQueue::open(config, Connectivity::new(false))?;
            for item in queue.list_pending()? {
                println!("{}", serde_json::to_string(&item)?);
            }
        }
        Command::Flush => {
            let queue = OfflineQueue::open(config, Connectivity::new(true))?;
            let outcome = queue.flush().await?;
            println!("{}", describe(&outcome));
            if let FlushOutcome::RequestFailed { .. } = outcome {
                std::process::exit(1);
            }
        }
        Command::Sync => run_sync(config).await?,
        Command::Watch { session_id } => run_watch(config, session_id).await?,
    }

    Ok(())
}
