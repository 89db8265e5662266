// hostel-insight/crates/hostel-insight/src/telemetry.rs

use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global fmt subscriber on stderr, leaving stdout to CLI
/// output. Later calls are ignored.
pub fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,hostel_insight=debug,tower_http=info".into());

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
