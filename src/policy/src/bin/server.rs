//! # Policy Server
//!
//! HTTP server for policy bindings, plus a one-shot reconciliation command.
//!
//! ## Usage
//!
//! ```bash
//! # Serve with in-memory backends on 0.0.0.0:8080
//! policy-server
//!
//! # Serve with a config file
//! policy-server --config /etc/shield/policy-server.toml serve
//!
//! # Re-push every policy of one namespace to the relation store
//! policy-server --config /etc/shield/policy-server.toml reconcile --namespace-id ns1
//! ```
//!
//! ## Environment
//!
//! - `RUST_LOG` - Log filter (default: info)
//! - `POLICY_SERVER_CONFIG` - Config file path
//! - `DATABASE_URL` - Overrides `store.database_url`
//! - `SPICEDB_PRESHARED_KEY` - Overrides `authz.preshared_key`

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shield_policy::config::{AuthzBackend, ServerConfig, StoreBackend};
use shield_policy::{
    api, InMemoryPolicyStore, InMemoryRelationStore, PolicyFilters, PolicyService, PolicyStore,
    RelationStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// Policy binding server
#[derive(Parser, Debug)]
#[command(name = "policy-server", version, about = "Policy binding store with relation tuple sync")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "POLICY_SERVER_CONFIG")]
    config: Option<PathBuf>,

    /// Override store.database_url
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Override authz.preshared_key
    #[arg(long, env = "SPICEDB_PRESHARED_KEY", hide_env_values = true)]
    preshared_key: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Serve the HTTP API (default)
    Serve,

    /// Re-sync stored policies into the relation store and exit
    Reconcile {
        /// Only policies of this namespace
        #[arg(long)]
        namespace_id: Option<String>,

        /// Only policies of this role
        #[arg(long)]
        role_id: Option<String>,

        /// Only policies of this action
        #[arg(long)]
        action_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},shield_policy={}", log_level, log_level).into()),
        )
        .with_target(true)
        .with_line_number(true)
        .init();

    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(url) = &cli.database_url {
        config.store.database_url = Some(url.clone());
    }
    if let Some(key) = &cli.preshared_key {
        config.authz.preshared_key = Some(key.clone());
    }
    config.validate().context("Invalid configuration")?;

    let command = cli.command.clone().unwrap_or(Command::Serve);
    if let Err(e) = with_store(&config, command).await {
        error!("policy-server failed: {:#}", e);
        return Err(e);
    }

    Ok(())
}

/// Open the configured policy store
async fn with_store(config: &ServerConfig, command: Command) -> Result<()> {
    match config.store.backend {
        StoreBackend::Memory => {
            info!("Using in-memory policy store");
            with_relations(config, command, Arc::new(InMemoryPolicyStore::new())).await
        }
        #[cfg(feature = "postgres")]
        StoreBackend::Postgres => {
            use shield_policy::store::PostgresPolicyStore;

            let url = config.store.database_url.as_deref().unwrap_or_default();
            let store = PostgresPolicyStore::new(url, config.store.max_connections)
                .await
                .context("Failed to open PostgreSQL policy store")?;
            if config.store.run_migrations {
                store.run_migrations().await.context("Failed to migrate policy store")?;
            }
            info!("Using PostgreSQL policy store");
            with_relations(config, command, Arc::new(store)).await
        }
        #[cfg(not(feature = "postgres"))]
        StoreBackend::Postgres => {
            anyhow::bail!("built without the `postgres` feature")
        }
    }
}

/// Open the configured relation store
async fn with_relations<S>(config: &ServerConfig, command: Command, store: Arc<S>) -> Result<()>
where
    S: PolicyStore + 'static,
{
    match config.authz.backend {
        AuthzBackend::Memory => {
            info!("Using in-memory relation store");
            run(config, command, store, Arc::new(InMemoryRelationStore::new())).await
        }
        #[cfg(feature = "spicedb")]
        AuthzBackend::Spicedb => {
            use shield_policy::sync::SpiceDbRelationStore;
            use std::time::Duration;

            // One client for the whole process, shared by every sync call
            let client =
                SpiceDbRelationStore::build_client(Duration::from_millis(config.authz.timeout_ms))?;
            let relations = SpiceDbRelationStore::new(
                client,
                config.authz.endpoint.clone().unwrap_or_default(),
                config.authz.preshared_key.clone().unwrap_or_default(),
            );
            info!(endpoint = relations.endpoint(), "Using SpiceDB relation store");
            run(config, command, store, Arc::new(relations)).await
        }
        #[cfg(not(feature = "spicedb"))]
        AuthzBackend::Spicedb => {
            anyhow::bail!("built without the `spicedb` feature")
        }
    }
}

async fn run<S, R>(
    config: &ServerConfig,
    command: Command,
    store: Arc<S>,
    relations: Arc<R>,
) -> Result<()>
where
    S: PolicyStore + 'static,
    R: RelationStore + 'static,
{
    let service = PolicyService::new(store, relations).with_timeouts(config.timeouts());

    match command {
        Command::Serve => serve(config, service).await,
        Command::Reconcile {
            namespace_id,
            role_id,
            action_id,
        } => {
            let filters = PolicyFilters {
                namespace_id,
                role_id,
                action_id,
            };
            let report = service.reconcile(&filters).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);

            if let Some(reason) = &report.prune_error {
                anyhow::bail!("orphaned tuples were not pruned: {}", reason);
            }
            if !report.is_clean() {
                anyhow::bail!("{} tuple changes were not applied", report.failures.len());
            }
            Ok(())
        }
    }
}

async fn serve<S, R>(config: &ServerConfig, service: PolicyService<S, R>) -> Result<()>
where
    S: PolicyStore + 'static,
    R: RelationStore + 'static,
{
    let app = api::build_router(service, config.request_timeout());

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Policy server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Policy server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to install Ctrl-C handler: {}", e);
        // Without a handler the server runs until killed
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
