use std::net::Ipv4Addr;

use clap::Parser;
use ordo_server::{DEFAULT_PORT, DatabaseHolder, GatewayServer, RpcProfiler, ServerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Ordo transaction gateway server.
#[derive(Debug, Parser)]
#[command(name = "ordo-server", version, about)]
struct Args {
    /// Interface to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: Ipv4Addr,

    /// TCP port to listen on (0 picks an ephemeral port).
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,
}

fn main() -> ordo_error::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = ServerConfig {
        host: args.host,
        port: args.port,
    };

    let holder = DatabaseHolder::new();
    let profiler = RpcProfiler::from_env();
    let server = GatewayServer::bind(&config, &holder, profiler)?;
    info!(addr = %server.local_addr()?, "gateway listening");
    server.run();
    Ok(())
}
