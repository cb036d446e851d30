use std::path::PathBuf;

use clap::Parser;
use vox::{Server, ServerConfig, StartupError, load_registry, logging};
use vox_net::UdpTransport;

#[derive(Parser, Debug)]
#[command(name = "vox-server", about = "Authoritative voxel world server")]
struct Args {
    /// TOML config file; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    max_connections: Option<usize>,
    /// Stop after this many ticks (0 = run forever)
    #[arg(long, default_value_t = 0)]
    ticks: u64,
    #[arg(long)]
    log_level: Option<String>,
}

fn run(args: Args) -> Result<(), StartupError> {
    let mut config = ServerConfig::load_or_default(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(max) = args.max_connections {
        config.max_connections = max;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    logging::init(config.level_filter(), &config.log_file)?;

    let registry = load_registry(config.blocks_file.as_deref())?;
    let transport = UdpTransport::with_config(config.udp_config());
    let mut server = Server::new(config, registry, transport);
    server.start()?;
    server.run(args.ticks);
    server.shutdown();
    Ok(())
}

fn main() {
    if let Err(e) = run(Args::parse()) {
        log::error!(target: "server", "fatal: {e}");
        eprintln!("vox-server: {e}");
    }
}
