use drivesyncd::config::DaemonConfig;
use drivesyncd::daemon::DaemonRuntime;
use drivesyncd::storage::DestinationStore;
use drivesyncd::sync::trigger::{CycleReport, SyncExtras};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliMode {
    Run,
    Once,
    SelectFolder(String),
    UseRoot,
    Help,
}

fn parse_cli_mode<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut mode = CliMode::Run;
    let mut args = args.into_iter().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--once" => mode = CliMode::Once,
            "--root" => mode = CliMode::UseRoot,
            "--help" | "-h" => mode = CliMode::Help,
            "--select-folder" => {
                let Some(id) = args.next() else {
                    anyhow::bail!("--select-folder requires a folder id");
                };
                mode = CliMode::SelectFolder(id);
            }
            other => match other.strip_prefix("--select-folder=") {
                Some(id) => mode = CliMode::SelectFolder(id.to_string()),
                None => anyhow::bail!("unknown argument: {other}"),
            },
        }
    }
    if let CliMode::SelectFolder(id) = &mode
        && id.trim().is_empty()
    {
        anyhow::bail!("--select-folder requires a non-empty folder id");
    }
    Ok(mode)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("DRIVESYNC_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let mode = parse_cli_mode(std::env::args())?;
    if mode == CliMode::Help {
        println!("Usage: drivesyncd [--once | --select-folder <ID> | --root]");
        println!("  --once                 Run a single sync cycle and exit");
        println!("  --select-folder <ID>   Upload to the given folder from now on");
        println!("  --root                 Upload to the account root from now on");
        return Ok(());
    }

    let config = DaemonConfig::from_env()?;
    match mode {
        CliMode::SelectFolder(id) => {
            let store = DestinationStore::new(config.sync.destination_path());
            store.select_folder(&id).await?;
            tracing::info!(folder_id = %id.trim(), "destination folder saved");
            Ok(())
        }
        CliMode::UseRoot => {
            let store = DestinationStore::new(config.sync.destination_path());
            store.use_root().await?;
            tracing::info!("destination set to account root");
            Ok(())
        }
        CliMode::Once => {
            let daemon = DaemonRuntime::bootstrap(config).await?;
            match daemon.run_once(SyncExtras::manual()).await {
                CycleReport::Completed(Ok(success)) => {
                    println!("{}", success.file_id);
                    Ok(())
                }
                CycleReport::Completed(Err(err)) => Err(err.into()),
                CycleReport::NeedsDestination => {
                    anyhow::bail!("no destination folder selected; run with --select-folder <ID>")
                }
                CycleReport::Skipped(reason) => anyhow::bail!("sync skipped: {reason}"),
            }
        }
        CliMode::Run | CliMode::Help => {
            let daemon = DaemonRuntime::bootstrap(config).await?;
            daemon.run().await
        }
    }
}
