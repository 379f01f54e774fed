use args::Args;
use clap::Parser;
use tokio_util::sync::CancellationToken;

mod args;
mod logger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logger::init(&args.log_filter);

    log::info!("Switchyard {}", env!("CARGO_PKG_VERSION"));

    let config = config::Config::load(&args.config)?;
    let listen_address = args.listen.unwrap_or(config.server.listen_address);

    let shutdown_signal = CancellationToken::new();

    let signal = shutdown_signal.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal.cancel();
        }
    });

    server::serve(server::ServeConfig {
        listen_address,
        config,
        shutdown_signal,
        bound_addr_sender: None,
    })
    .await
}
