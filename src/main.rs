use roomrelay::{config::Config, logging, rooms::Relay, serve_until, AppResult};
use tracing::warn;

#[tokio::main]
async fn main() -> AppResult<()> {
    let config = Config::from_env()?;
    logging::init(&config.log_level);

    let listener = tokio::net::TcpListener::bind(config.addr()).await?;
    serve_until(listener, Relay::new(), &config, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = ?err, "failed to install ctrl-c handler");
        }
    }).await
}
