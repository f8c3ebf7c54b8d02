mod cli;
mod error;
mod fanout;
mod features;
mod lookup;
mod predict;
mod registry;
mod server;

use clap::Parser;
use cli::CliArgs;

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let args = CliArgs::parse();

    if let Err(error) = server::run(&args).await {
        tracing::error!("{error:?}");
        std::process::exit(1);
    }
}
