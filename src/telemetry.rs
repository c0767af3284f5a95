use std::sync::OnceLock;

#[cfg(feature = "telemetry")]
use tracing_subscriber::{EnvFilter, fmt};

/// Initialize tracing subscriber once per process.
///
/// `verbose` lowers the default filter to debug; `RUST_LOG` still wins.
pub fn init_tracing(verbose: bool) {
    #[cfg(feature = "telemetry")]
    static INIT: OnceLock<()> = OnceLock::new();

    #[cfg(feature = "telemetry")]
    {
        INIT.get_or_init(|| {
            let default = if verbose {
                "wrapfinder=debug"
            } else {
                "wrapfinder=info"
            };
            let filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default));
            let _ = fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
        });
    }

    #[cfg(not(feature = "telemetry"))]
    let _ = verbose;
}
