use std::process::ExitCode;

use aegis_redaction::RedactingMakeWriter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Every log line passes through the PHI redactor before stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(RedactingMakeWriter::new(std::io::stderr))
        .init();

    aegis_server::cli::run().await
}
