use std::sync::Arc;

use courier_core::config::Config;

#[tokio::main]
async fn main() -> Result<(), courier_core::Error> {
    courier_core::logging::init("courier")?;

    let cfg = Arc::new(Config::load()?);
    tracing::info!(
        pin = ?cfg.channels.pin,
        unread = ?cfg.channels.unread,
        todo = ?cfg.channels.todo,
        talking_point = ?cfg.channels.talking_point,
        general = ?cfg.channels.general,
        "configuration loaded"
    );

    courier_discord::router::run_gateway(cfg)
        .await
        .map_err(|e| courier_core::Error::External(format!("discord gateway failed: {e}")))?;

    Ok(())
}
