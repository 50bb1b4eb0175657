//! sqlgate - A human-in-the-loop safety gateway for agent-issued SQL.

use std::sync::Arc;

use sqlgate::cli::Cli;
use sqlgate::config::Config;
use sqlgate::confirm::confirmer_for;
use sqlgate::db::{Connector, MockConnector, SqlxConnector};
use sqlgate::error::{Result, SqlGateError};
use sqlgate::gateway::SqlGateway;
use sqlgate::logging;
use sqlgate::safety::SqlClassifier;
use sqlgate::server::McpServer;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    match cli.log_path() {
        Some(path) => logging::init_file_logging(&path),
        None => logging::init_stderr_logging(),
    }

    if let Err(e) = run(cli).await {
        error!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config_path())?;

    if let Some(sql) = &cli.check {
        return check(&config, sql);
    }

    config.validate()?;
    for target in config.targets()? {
        info!("Connection '{}': {}", target.name, target.display_string());
    }

    let connector: Arc<dyn Connector> = if cli.mock_db {
        info!("Using in-memory mock database");
        Arc::new(MockConnector::new())
    } else {
        Arc::new(SqlxConnector)
    };

    let cancel = CancellationToken::new();
    let confirmer = confirmer_for(config.security.confirm_method);
    let gateway = Arc::new(SqlGateway::from_config(&config, connector, confirmer, cancel.clone()).await?);

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
            shutdown.cancel();
        }
    });

    let server = McpServer::new(Arc::clone(&gateway));
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let result = server.run(stdin, tokio::io::stdout(), cancel).await;

    gateway.shutdown().await;
    result
}

/// Prints the classification of one SQL text without touching any database.
fn check(config: &Config, sql: &str) -> Result<()> {
    let classifier = SqlClassifier::new(config.danger_keywords());
    let result = classifier.classify(sql);
    let json = serde_json::to_string_pretty(&result)
        .map_err(|e| SqlGateError::internal(format!("Failed to encode classification: {e}")))?;
    println!("{json}");
    Ok(())
}
