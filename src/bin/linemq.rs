//! linemq – broker daemon.
//
//  $ linemq 127.0.0.1 7000
//  $ linemq 0.0.0.0 7000 --config linemq.toml
use std::net::{IpAddr, SocketAddr};

use clap::Parser;
use tokio::{signal, sync::watch};
use tracing::{error, info};

use linemq::{logging::init_logging, start_broker, Config};

#[derive(Debug, Parser)]
#[command(name = "linemq", version, about = "linemq message queue broker")]
struct Cli {
    /// Address to listen on
    ip: IpAddr,

    /// Port to listen on
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,

    /// Path to a TOML config file (env LINEMQ_CONFIG also works)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();

    let mut cfg: Config = Config::load(cli.config.as_deref())?;
    cfg.server.bind_addr = SocketAddr::new(cli.ip, cli.port).to_string();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received; shutting down");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                error!("cannot listen for ctrl-c: {e}");
                // dropping the sender would stop the broker
                std::future::pending::<()>().await;
            }
        }
    });

    start_broker(&cfg, shutdown_rx).await
}
