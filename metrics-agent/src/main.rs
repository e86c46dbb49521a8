use std::env;
use std::io;
use std::process::ExitCode;

use metrics_agent_client::auth::{Authenticator, Metadata};
use metrics_agent_client::{
    BuildError, ClientConfig, CredentialError, HyperTransport, PushClient, TransportError,
};
use metrics_agent_decorate::compat::{Cpu, Disk, Names};
use metrics_agent_decorate::{Chain, LowercaseNames};
use quanta::Clock;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod collector;
mod config;
mod run;
mod writer;

use self::collector::{CollectError, NodeCollector};
use self::config::{AgentConfig, Command};
use self::writer::{FileWriter, SonarWriter};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const REVISION: &str = match option_env!("METRICS_AGENT_REVISION") {
    Some(revision) => revision,
    None => "unknown",
};

/// Errors that end the agent before its collection loop starts.
#[derive(Debug, Error)]
enum AgentError {
    #[error("failed to start runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("failed to set up collector: {0}")]
    Collector(#[from] CollectError),

    #[error("failed to set up HTTP transport: {0}")]
    Transport(#[from] TransportError),

    #[error("failed to obtain credentials: {0}")]
    Credentials(#[from] CredentialError),

    #[error("failed to build push client: {0}")]
    Client(#[from] BuildError),
}

fn print_usage(program: &str) {
    let brief = format!("Usage: {program} [options]");
    print!("{}", config::opts().usage(&brief));
}

/// Decorators turning node-exporter families into the ones the backend expects.
fn default_chain() -> Chain {
    Chain::new().with(Names).with(Disk).with(Cpu).with(LowercaseNames)
}

/// Obtains credentials and builds the push client.
///
/// Anything given on the command line is used as is; the rest is looked up through the metadata
/// service.
async fn connect(config: &AgentConfig) -> Result<PushClient, AgentError> {
    let transport = HyperTransport::new(config.timeout)?;
    let metadata = Metadata::new(transport.clone(), &config.metadata_host);

    let app_key = match &config.app_key {
        Some(app_key) => app_key.clone(),
        None => {
            let token = metadata.auth_token().await?;
            Authenticator::new(transport.clone(), &config.auth_host).app_key(&token).await?
        }
    };

    let endpoint = match &config.endpoint {
        Some(endpoint) => endpoint.clone(),
        None => metadata.meta().await?.push_endpoint(&config.ingest_domain),
    };
    info!(%endpoint, "Resolved push endpoint.");

    let client_config =
        ClientConfig { timeout: config.timeout, ..ClientConfig::new(endpoint, app_key) };
    Ok(PushClient::with_transport(client_config, transport, Clock::new())?)
}

/// Cancels `cancel` on Ctrl-C or, on Unix, SIGTERM.
async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C.");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM.");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Shutting down.");
    cancel.cancel();
}

async fn agent(config: AgentConfig) -> Result<(), AgentError> {
    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let mut collector = NodeCollector::new(VERSION, REVISION)?;
    let chain = default_chain();

    if config.stdout_only {
        let mut writer = FileWriter::stdout();
        run::run(&mut collector, &chain, &mut writer, cancel).await;
        return Ok(());
    }

    let client = tokio::select! {
        biased;

        _ = cancel.cancelled() => return Ok(()),
        client = connect(&config) => client?,
    };

    let mut writer = SonarWriter::new(client);
    run::run(&mut collector, &chain, &mut writer, cancel).await;
    Ok(())
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let program = args.first().map_or("metrics-agent", String::as_str);

    let config = match config::parse_args(args.get(1..).unwrap_or_default()) {
        Ok(Command::Run(config)) => config,
        Ok(Command::Help) => {
            print_usage(program);
            return ExitCode::SUCCESS;
        }
        Ok(Command::Version) => {
            println!("{program} {VERSION} ({REVISION})");
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("{e}");
            print_usage(program);
            return ExitCode::FAILURE;
        }
    };

    // Metrics may go to stdout, so logs stay on stderr.
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_writer(io::stderr)
        .init();

    info!(version = VERSION, revision = REVISION, "Starting metrics agent.");

    let result = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(AgentError::Runtime)
        .and_then(|runtime| runtime.block_on(agent(config)));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Metrics agent failed.");
            ExitCode::FAILURE
        }
    }
}
