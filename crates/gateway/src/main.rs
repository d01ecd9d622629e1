use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use cf_domain::config::Config;
use cf_gateway::api;
use cf_gateway::cli::{self, Cli, Command, ConfigCommand};
use cf_gateway::runtime;
use cf_gateway::state::AppState;
use cf_providers::OpenAiCompatProvider;
use cf_retrieval::{HttpRetriever, NoopRetriever, Retriever};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    match args.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            cli::init_tracing();
            let (config, path) = cli::load_config()?;
            if !cli::validate(&config, &path) {
                anyhow::bail!("configuration has errors; fix {} first", path.display());
            }
            run_server(Arc::new(config)).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, path) = cli::load_config()?;
            if !cli::validate(&config, &path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _path) = cli::load_config()?;
            cli::show(&config);
            Ok(())
        }
        Some(Command::Version) => {
            println!("careflow {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    // External collaborators.
    let llm = Arc::new(
        OpenAiCompatProvider::from_config(&config.llm).context("initializing LLM provider")?,
    );
    let retriever: Arc<dyn Retriever> = if config.retrieval.endpoint.is_empty() {
        tracing::warn!("no retrieval endpoint configured; answers will carry no evidence");
        Arc::new(NoopRetriever)
    } else {
        Arc::new(
            HttpRetriever::from_config(&config.retrieval)
                .context("initializing retriever")?,
        )
    };

    let state = AppState::build(config.clone(), llm, retriever)
        .await
        .context("wiring transport substrate")?;

    // Orchestrator workers share the process with the Front API; they
    // talk only through the transport ports.
    let workers = runtime::spawn_workers(state.clone());
    tracing::info!(workers = workers.len(), "orchestrator workers running");

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(addr = %addr, "careflow gateway listening");

    let router = api::build_router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .context("serving HTTP")?;

    Ok(())
}
