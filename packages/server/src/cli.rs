//! Operator CLI.
//!
//! Verbs: `serve`, `ingest <source_type> <path>`, `verify-audit`,
//! `list-sources`, `replay <execution_id> [--from-step N]`.
//!
//! Exit codes: 0 success, 64 usage, 69 upstream unavailable, 70 internal,
//! 75 retryable.

use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use aegis_connectors::SourceType;
use aegis_tenancy::{Purpose, RequestContext};
use clap::{Parser, Subcommand};

use crate::config::AegisConfig;
use crate::http;
use crate::state::AppState;
use crate::workflows;

pub const EXIT_OK: u8 = 0;
pub const EXIT_USAGE: u8 = 64;
pub const EXIT_UNAVAILABLE: u8 = 69;
pub const EXIT_INTERNAL: u8 = 70;
pub const EXIT_RETRYABLE: u8 = 75;

/// Aegis healthcare data platform.
#[derive(Debug, Parser)]
#[command(name = "aegis", version, about = "Aegis healthcare data platform core")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP/WS service.
    Serve {
        /// Bind address override
        #[arg(long)]
        bind: Option<String>,
    },
    /// Ingest a payload file through the unified pipeline.
    Ingest {
        /// Source type (e.g. fhir_r4, hl7v2, x12_837)
        source_type: String,
        /// Path to the payload file
        path: String,
        /// Tenant override
        #[arg(long)]
        tenant: Option<String>,
        /// Also index in the vector store
        #[arg(long)]
        index: bool,
    },
    /// Walk the audit chain and verify its integrity.
    VerifyAudit,
    /// List registered source types.
    ListSources,
    /// Replay a workflow execution from its checkpoints.
    Replay {
        execution_id: String,
        /// Replay from this step instead of the latest checkpoint
        #[arg(long)]
        from_step: Option<u32>,
    },
}

/// Run the CLI to completion.
pub async fn run() -> ExitCode {
    let cli = Cli::parse();
    let config = AegisConfig::from_env();
    let state = AppState::build(config);

    let code = match cli.command {
        Command::Serve { bind } => serve(state, bind).await,
        Command::Ingest {
            source_type,
            path,
            tenant,
            index,
        } => ingest(state, &source_type, &path, tenant, index).await,
        Command::VerifyAudit => verify_audit(&state),
        Command::ListSources => list_sources(&state),
        Command::Replay {
            execution_id,
            from_step,
        } => replay(&state, &execution_id, from_step).await,
    };
    ExitCode::from(code)
}

async fn serve(state: Arc<AppState>, bind: Option<String>) -> u8 {
    let addr = bind.unwrap_or_else(|| state.config.bind_addr.clone());
    let app = http::router(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(error) => {
            eprintln!("cannot bind {addr}: {error}");
            return EXIT_UNAVAILABLE;
        }
    };

    tracing::info!(addr = %addr, "Aegis serving");
    match axum::serve(listener, app).await {
        Ok(()) => EXIT_OK,
        Err(error) => {
            eprintln!("server failed: {error}");
            EXIT_INTERNAL
        }
    }
}

async fn ingest(
    state: Arc<AppState>,
    source_type: &str,
    path: &str,
    tenant: Option<String>,
    index: bool,
) -> u8 {
    let Ok(source_type) = SourceType::from_str(source_type) else {
        eprintln!(
            "unknown source type '{source_type}'; known: {}",
            SourceType::ALL.map(|s| s.as_str()).join(", ")
        );
        return EXIT_USAGE;
    };

    let payload = match tokio::fs::read_to_string(path).await {
        Ok(payload) => payload,
        Err(error) => {
            eprintln!("cannot read {path}: {error}");
            return EXIT_USAGE;
        }
    };

    let tenant = tenant.unwrap_or_else(|| state.config.default_tenant.clone());
    let ctx = RequestContext::new(tenant, Purpose::Operations);
    let result = state
        .pipeline
        .ingest(source_type, &payload, &ctx, "cli", index)
        .await;

    match serde_json::to_string_pretty(&result) {
        Ok(rendered) => println!("{rendered}"),
        Err(error) => {
            eprintln!("cannot render result: {error}");
            return EXIT_INTERNAL;
        }
    }

    if result.success {
        EXIT_OK
    } else {
        EXIT_RETRYABLE
    }
}

fn verify_audit(state: &AppState) -> u8 {
    match state.audit.verify_integrity() {
        Ok(()) => {
            println!("audit chain intact ({} entries)", state.audit.len());
            EXIT_OK
        }
        Err(entry_id) => {
            eprintln!("audit chain broken at entry {entry_id}");
            EXIT_INTERNAL
        }
    }
}

fn list_sources(state: &AppState) -> u8 {
    for source in state.pipeline.sources() {
        println!("{source}");
    }
    EXIT_OK
}

async fn replay(state: &AppState, execution_id: &str, from_step: Option<u32>) -> u8 {
    let graph = workflows::clinical_graph();
    let outcome = match from_step {
        Some(step) => state.runner.replay(&graph, execution_id, step).await,
        None => state.runner.resume(&graph, execution_id).await,
    };

    match outcome {
        Ok(final_state) => {
            println!(
                "execution {execution_id} replayed to {} ({} errors)",
                final_state.current_node,
                final_state.errors.len()
            );
            if final_state.errors.is_empty() {
                EXIT_OK
            } else {
                EXIT_RETRYABLE
            }
        }
        Err(aegis_orchestrator::OrchestratorError::NoCheckpoint(_)) => {
            eprintln!("no checkpoints recorded for execution {execution_id}");
            EXIT_USAGE
        }
        Err(aegis_orchestrator::OrchestratorError::Store(error)) => {
            eprintln!("checkpoint store unavailable: {error}");
            EXIT_UNAVAILABLE
        }
        Err(error) => {
            eprintln!("replay failed: {error}");
            EXIT_INTERNAL
        }
    }
}
