//! Retouch CLI
//!
//! Command-line entry point for the two-stage retouching pipeline and the
//! local compositing tools.

#[cfg(feature = "cli")]
use retouch_pipeline::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
