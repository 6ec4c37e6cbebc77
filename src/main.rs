use std::process;
use inspector_cli::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    if let Err(e) = cli::run().await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
    // Don't wait on a stderr forwarder left behind by --connect
    process::exit(0);
}
