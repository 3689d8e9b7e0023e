//! fgmask CLI tool
//!
//! Writes foreground/background masks for images using the fgmask library.

#[cfg(feature = "cli")]
use fgmask::cli;

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
