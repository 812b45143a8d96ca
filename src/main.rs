// serbridge - USB-serial to TCP/IP bridge
use anyhow::Context;
use clap::Parser;
use serbridge::cli::{execute_command, Args};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    execute_command(args).await.context("serbridge failed")
}
