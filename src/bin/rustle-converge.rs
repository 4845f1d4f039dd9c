use anyhow::Result;
use clap::Parser;
use rustle_converge::cli::{init_tracing, run_converge, ConvergeCli};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ConvergeCli::parse();
    init_tracing(cli.verbose);

    info!("Starting rustle-converge v{}", env!("CARGO_PKG_VERSION"));

    match run_converge(&cli).await {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            Err(e)
        }
    }
}
