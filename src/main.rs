use std::process::ExitCode;

use clap::Parser;

use pgdeck::config::ServerConfig;
use pgdeck::observability;

#[tokio::main]
async fn main() -> ExitCode {
    let config = ServerConfig::parse();
    let _log_guard = observability::init_tracing(config.log_dir.as_deref());

    match pgdeck::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Server exited with an error");
            ExitCode::FAILURE
        }
    }
}
