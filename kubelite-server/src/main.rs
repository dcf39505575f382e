use clap::{Parser, Subcommand};
use kubelite_core::{HttpNodeClient, KubeletAgent, NodeStatus};
use kubelite_server::{Config, run_server};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "kubelite")]
#[command(about = "Minimal cluster control plane: node registry and kubelet agent")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server and health reconciler
    Apiserver {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,

        /// Listen address, overrides apiserver.bind_addr
        #[arg(long)]
        bind: Option<String>,
    },
    /// Start a kubelet agent for one node
    Kubelet {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,

        /// Name to register this node under
        #[arg(long)]
        node_name: Option<String>,

        /// API server address (host:port)
        #[arg(long)]
        api_server: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "kubelite=info,kubelite_core=info,kubelite_server=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let shutdown = CancellationToken::new();
    tokio::spawn(watch_ctrl_c(shutdown.clone()));

    match cli.command {
        Commands::Apiserver { config, bind } => {
            let mut cfg = load_config(config.as_deref());
            if let Some(bind) = bind {
                cfg.apiserver.bind_addr = bind;
            }

            tracing::info!(
                "Starting API server on {} with {:?} store",
                cfg.apiserver.bind_addr,
                cfg.store.backend
            );

            if let Err(e) = run_server(cfg, shutdown).await {
                tracing::error!("Server error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Kubelet {
            config,
            node_name,
            api_server,
        } => {
            let mut cfg = load_config(config.as_deref());
            if let Some(api_server) = api_server {
                cfg.kubelet.api_server = api_server;
            }

            let Some(node_name) = node_name.or_else(|| cfg.kubelet.node_name.clone()) else {
                tracing::error!("Node name is required (--node-name or kubelet.node_name)");
                std::process::exit(1);
            };

            let client =
                match HttpNodeClient::new(&cfg.kubelet.api_server, cfg.kubelet.request_timeout()) {
                    Ok(client) => client,
                    Err(e) => {
                        tracing::error!("Failed to create API client: {}", e);
                        std::process::exit(1);
                    }
                };

            // No local health checks yet: the node reports Ready while the agent runs.
            let (_status_tx, status_rx) = watch::channel(NodeStatus::Ready);
            let mut agent = KubeletAgent::new(
                cfg.kubelet.agent_config(&node_name),
                Arc::new(client),
                status_rx,
            );

            tracing::info!(
                "Starting kubelet for node {} against {}",
                node_name,
                cfg.kubelet.api_server
            );
            agent.run(shutdown).await;
        }
    }
}

fn load_config(path: Option<&str>) -> Config {
    match Config::load(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    }
}

async fn watch_ctrl_c(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}
