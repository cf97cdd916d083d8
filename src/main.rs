use anyhow::Context;
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "order-pairing", about = "Report orders that fail to pair with their neighbour")]
struct Args {
    /// JSON array of orders to scan
    #[arg(default_value = order_pairing::DEFAULT_ORDERS_PATH)]
    path: PathBuf,
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout carries only report lines
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    order_pairing::run(&args.path, &mut out)
        .with_context(|| format!("processing {}", args.path.display()))?;
    out.flush()?;

    Ok(())
}
