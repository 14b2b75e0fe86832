// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod cli;
mod webhook;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use blippy_broker::Broker;
use blippy_config::Config;
use blippy_core::Loop;
use blippy_model::{LlmClient, OpenRouterClient};
use blippy_runner::Runner;
use blippy_scheduler::Scheduler;
use blippy_store::Store;
use blippy_tools::builtin::{
    CallAgentTool, FetchUrlTool, FsCreateTool, FsInsertTool, FsStrReplaceTool, FsViewTool, MemoryReadTool,
    MemoryWriteTool, ScheduleAgentRunTool,
};
use blippy_tools::ToolRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let mut args = std::env::args();
    let prog = args.next().unwrap_or_else(|| "blippy".to_string());

    if args.next().as_deref() == Some("seed") {
        let seed_cli = cli::SeedCli::parse_from(std::iter::once(prog).chain(args));
        let database_path = std::env::var("DATABASE_PATH").unwrap_or_else(|_| "./blippy.db".to_string());
        let store = Store::open(&database_path)?;
        return cli::run(seed_cli, &store);
    }

    run_server().await
}

async fn run_server() -> anyhow::Result<()> {
    let config = Config::load()?;

    let store = Arc::new(Store::open(&config.database_path)?);
    let broker = Arc::new(Broker::new());
    let llm: Arc<dyn LlmClient> = Arc::new(OpenRouterClient::new(config.api_key()));
    let registry = Arc::new(build_registry(store.clone()));
    let the_loop = Arc::new(Loop::new(store.clone(), broker.clone(), llm, registry, config.model.clone()));
    let runner = Runner::new(store.clone(), broker, the_loop);

    let scheduler = Scheduler::new(store.clone(), runner.clone());
    let scheduler_handle = scheduler.start();

    let app = webhook::router(webhook::AppState { store, runner });
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!(port = config.port, "listening");

    let serve_result = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await;

    scheduler.stop(scheduler_handle).await;
    serve_result.map_err(anyhow::Error::from)
}

/// Builds the registry of static tools (spec §4.4.1): every tool whose
/// behavior does not depend on per-agent configuration beyond the call
/// context. `notify_*` tools are resolved dynamically per agent instead
/// (spec §4.4.1 point 2) and so are not registered here.
fn build_registry(store: Arc<Store>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(FetchUrlTool));
    registry.register(Arc::new(FsViewTool));
    registry.register(Arc::new(FsCreateTool));
    registry.register(Arc::new(FsStrReplaceTool));
    registry.register(Arc::new(FsInsertTool));
    registry.register(Arc::new(MemoryReadTool::new(store.clone())));
    registry.register(Arc::new(MemoryWriteTool::new(store)));
    registry.register(Arc::new(CallAgentTool));
    registry.register(Arc::new(ScheduleAgentRunTool));
    registry
}

async fn shutdown_signal() {
    let ctrl_c = async { tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler") };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
