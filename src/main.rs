use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::io::BufReader;
use tokio::runtime::Builder;
use tokio::sync::mpsc;

use spf_switching::config::ControllerConfig;
use spf_switching::control_server::ControlServer;
use spf_switching::event_loop::{ControllerCommand, replay_events, run_event_loop};
use spf_switching::protocol::TopologyController;
use spf_switching::switch_control::RecordingSwitch;

#[derive(Parser)]
#[command(name = "spf_switching", about = "Shortest-path switching controller")]
struct Cli {
    /// JSON controller configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON-lines topology event feed; stdin when omitted
    #[arg(long)]
    events: Option<PathBuf>,

    #[arg(long)]
    control_port: Option<u16>,

    /// Keep answering control queries after the feed ends, until Ctrl-C
    #[arg(long)]
    serve: bool,

    /// Do not log a topology snapshot after every refresh
    #[arg(long)]
    quiet: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ControllerConfig::load(path)?,
        None => ControllerConfig::default(),
    };
    if let Some(port) = cli.control_port {
        config.control_port = port;
    }
    if cli.quiet {
        config.log_snapshots = false;
    }

    let rt = Builder::new_multi_thread().enable_all().build()?;
    rt.block_on(run(cli, config))
}

async fn run(cli: Cli, config: ControllerConfig) -> Result<()> {
    let (tx, rx) = mpsc::channel(64);
    let controller = TopologyController::new(config.clone(), RecordingSwitch::new());
    let event_loop = tokio::spawn(run_event_loop(controller, rx));

    let server = ControlServer::bind(SocketAddr::new(config.control_bind, config.control_port), tx.clone())
        .await
        .context("starting control server")?;
    let server_task = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!("Control server stopped: {}", e);
        }
    });

    let replayed = match &cli.events {
        Some(path) => match tokio::fs::File::open(path).await {
            Ok(file) => replay_events(BufReader::new(file), &tx).await,
            Err(e) => Err(anyhow::Error::new(e).context(format!("opening event feed {}", path.display()))),
        },
        None => replay_events(BufReader::new(tokio::io::stdin()), &tx).await,
    };
    match &replayed {
        Ok(forwarded) => info!("Event feed finished after {} events", forwarded),
        Err(e) => error!("Event feed aborted: {:#}", e),
    }

    if cli.serve {
        info!("Serving control queries until interrupted");
        tokio::signal::ctrl_c().await?;
    }

    server_task.abort();
    tx.send(ControllerCommand::Shutdown)
        .await
        .context("event loop exited early")?;
    let controller = event_loop.await?;

    println!("{}", controller.snapshot());
    for (dpid, table) in controller.switch().tables() {
        println!("Flow table of switch_{}:", dpid);
        for entry in table.entries() {
            println!("    {}", entry);
        }
    }
    replayed.map(|_| ())
}
