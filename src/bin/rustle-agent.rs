use anyhow::{Context, Result};
use clap::Parser;
use rustle_converge::cli::init_agent_tracing;
use rustle_converge::protocol::{spawn_frame_reader, Compression, RecordWriter};
use rustle_converge::runners::RunnerRegistry;
use rustle_converge::runtime::{AgentExecutor, Dispatcher};
use std::sync::Arc;
use tracing::{debug, error};

/// Remote executor: reads a job on stdin, streams task results on stdout
#[derive(Parser)]
#[command(name = "rustle-agent")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct AgentCli {
    /// Compression of the job stream on stdin
    #[arg(long, default_value = "zstd")]
    compression: Compression,

    /// Log verbosity on stderr
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = AgentCli::parse();
    init_agent_tracing(cli.verbose);

    let registry = Arc::new(RunnerRegistry::with_core_runners());
    debug!("Agent runners: {}", registry.names().join(", "));
    let executor = AgentExecutor::new(Dispatcher::new(registry));

    let frames = spawn_frame_reader(std::io::stdin(), cli.compression);
    let mut writer = RecordWriter::new(tokio::io::stdout());

    match executor.execute(frames, &mut writer).await {
        Ok(summary) => {
            debug!("{} results written", summary.results);
            Ok(())
        }
        Err(e) => {
            error!("Job aborted: {}", e);
            Err(e).context("agent job failed")
        }
    }
}
