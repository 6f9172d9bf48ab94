use std::sync::Arc;

use tracing::info;

use picl_core::config::Config;

#[tokio::main]
async fn main() -> Result<(), picl_core::Error> {
    picl_core::logging::init("picl")?;

    let cfg = Arc::new(Config::load()?);
    info!(
        prefix = %cfg.command_prefix,
        relay = cfg.relay_channel.is_some(),
        threshold_days = cfg.inactivity_threshold_days,
        "starting picl"
    );

    picl_discord::router::run(cfg)
        .await
        .map_err(|e| picl_core::Error::External(format!("discord client failed: {e}")))?;

    Ok(())
}
