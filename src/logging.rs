use anyhow::Result;
use tracing::warn;
use tracing_subscriber::fmt;

/// Sends diagnostics to stderr when `--verbose` is given; stdout stays
/// reserved for the extracted text.
pub fn init(verbose: bool) -> Result<()> {
    if !verbose {
        return Ok(());
    }
    let installed = fmt()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .try_init();
    if let Err(err) = installed {
        warn!("keeping the existing log subscriber: {}", err);
    }
    Ok(())
}
