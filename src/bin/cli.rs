//! Command-line interface for deploying CCTP V2 locally and running transfers.

use cctp_harness::cli;
use cctp_harness::setup_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (ctx, command) = cli::CliEnv::parse_and_convert()?;
    setup_tracing(ctx.log_level);

    cli::run_command(ctx, command).await?;
    Ok(())
}
