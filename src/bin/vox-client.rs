use std::path::PathBuf;

use clap::Parser;
use vox::{Client, ClientConfig, ClientEvent, StartupError, load_registry, logging};
use vox_net::UdpTransport;

#[derive(Parser, Debug)]
#[command(name = "vox-client", about = "Headless replicating voxel client")]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    address: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    /// Stop after this many ticks (0 = until disconnected)
    #[arg(long, default_value_t = 0)]
    ticks: u64,
    #[arg(long)]
    log_level: Option<String>,
}

fn run(args: Args) -> Result<(), StartupError> {
    let mut config = ClientConfig::load_or_default(args.config.as_deref())?;
    if let Some(address) = args.address {
        config.address = address;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    logging::init(config.level_filter(), &config.log_file)?;

    let registry = load_registry(config.blocks_file.as_deref())?;
    let transport = UdpTransport::with_config(config.udp_config());
    let mut client = Client::new(config, registry, transport);
    client.connect()?;
    client.run(args.ticks);
    for event in client.take_events() {
        if let ClientEvent::Disconnected(reason) = event {
            log::info!(target: "client", "disconnected: {reason:?}");
        }
    }
    log::info!(
        target: "client",
        "exiting with {} chunks replicated",
        client.world().chunks().chunk_count()
    );
    client.disconnect();
    Ok(())
}

fn main() {
    if let Err(e) = run(Args::parse()) {
        log::error!(target: "client", "fatal: {e}");
        eprintln!("vox-client: {e}");
    }
}
