use tracing::Level;
use tracing_subscriber::{
    filter::Targets, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

use crate::{capture::CaptureLayer, errors::Error, Result};

/// Initialize logging for the bot.
///
/// Console output follows `RUST_LOG` (default: info for our crates, warn for
/// everything else). Command log capture always sees debug events from our
/// crates so a captured log carries more detail than the console.
pub fn init(service_name: &str) -> Result<()> {
    let console = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,picl=info,picl_core=info,picl_discord=info,{service_name}=info"
        ))
    });

    let captured = Targets::new()
        .with_default(Level::INFO)
        .with_target("picl", Level::DEBUG)
        .with_target("picl_core", Level::DEBUG)
        .with_target("picl_discord", Level::DEBUG);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(true)
                .with_filter(console),
        )
        .with(CaptureLayer.with_filter(captured))
        .try_init()
        .map_err(|e| Error::Config(format!("logging already initialized: {e}")))
}
