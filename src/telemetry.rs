// ABOUTME: Tracing subscriber setup for host processes embedding the orchestrator.

use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise `verbose` picks `debug` for this crate
/// and `warn` for everything else.
pub fn init(verbose: bool) {
    let default = if verbose {
        "warn,harbormaster=debug"
    } else {
        "warn,harbormaster=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
