mod bootstrap_helpers;
mod cli_args;
mod image_resize;
mod runtime_loop;
mod terminal_renderer;

use anyhow::Result;
use clap::Parser;

use crate::bootstrap_helpers::init_tracing;
use crate::cli_args::Cli;
use crate::runtime_loop::run_cli;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    run_cli(cli).await
}
