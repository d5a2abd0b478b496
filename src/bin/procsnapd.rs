use clap::Parser;
use color_eyre::Result;
use procsnap::{log::setup_logging, process::SystemProvider, server};
use std::net::SocketAddr;
use tokio::runtime::Runtime;

#[derive(Parser)]
#[command(version, about)]
/// Serve a JSON snapshot of the host's process tree, with per-process CPU
/// and memory usage, at GET /processdetails.
struct Cli {
    /// Verbose mode (-v, -vv, -vvv)
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// TCP port to listen on
    #[clap(short, long, default_value = "3333")]
    port: u16,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let provider = SystemProvider::new();

    let runtime = Runtime::new()?;
    runtime.block_on(server::serve(addr, provider))?;

    Ok(())
}
