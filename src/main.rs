use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use nsnet_operator::config::{ConfigArgs, OperatorConfig};
use nsnet_operator::controller::{
    self, ControllerState, KubeNetworkStore, NamespaceHandler, NetworkEngine,
};
use nsnet_operator::drivers::DriverSet;
use nsnet_operator::provider::ProviderClient;
use nsnet_operator::Error;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the operator
    Run(RunArgs),
    /// Show version information
    Version,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Plain,
    Json,
}

#[derive(Parser, Debug)]
struct RunArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Log output format
    #[arg(long, env = "NSNET_LOG_FORMAT", value_enum, default_value = "plain")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("NsNet Operator v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Run(run_args) => run_operator(run_args).await,
    }
}

fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Plain => registry.with(fmt::layer().with_target(true)).init(),
    }
}

async fn run_operator(args: RunArgs) -> Result<(), Error> {
    init_tracing(args.log_format);

    let config = OperatorConfig::load(&args.config)?;
    info!("Starting NsNet Operator v{}", env!("CARGO_PKG_VERSION"));
    info!("Enabled handlers: {}", config.enabled_handlers.join(", "));

    // Initialize Kubernetes client
    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;

    info!("Connected to Kubernetes cluster");

    let provider = Arc::new(ProviderClient::new(
        &config.provider_url,
        &config.router_id,
        Duration::from_secs(config.provider_timeout_secs),
    )?);
    let drivers = DriverSet::from_config(&config, client.clone(), provider);
    let store = Arc::new(KubeNetworkStore::new(client.clone()));

    // Start the health and metrics server
    #[cfg(feature = "rest-api")]
    {
        let addr = config.metrics_addr.clone();
        tokio::spawn(async move {
            if let Err(e) = nsnet_operator::rest_api::run_server(&addr).await {
                tracing::error!("REST API server error: {:?}", e);
            }
        });
    }

    let network_controller = async {
        if !config.handler_enabled("namespacenetwork") {
            return Ok(());
        }
        let state = Arc::new(ControllerState {
            client: client.clone(),
            engine: NetworkEngine::new(store.clone(), &drivers, &config),
        });
        controller::run_controller(state).await
    };

    let namespace_controller = async {
        if !config.handler_enabled("namespace") {
            return Ok(());
        }
        let handler = Arc::new(NamespaceHandler::new(
            store.clone(),
            store.clone(),
            &drivers,
            &config,
        ));
        controller::run_namespace_controller(client.clone(), handler).await
    };

    tokio::try_join!(network_controller, namespace_controller)?;

    info!("NsNet Operator stopped");
    Ok(())
}
