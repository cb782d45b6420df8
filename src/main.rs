//! Diagnostic CLI for the walletgate session engine.
//!
//! Drives the full challenge-response flow against a live GraphQL backend
//! using the in-process dev signer, and inspects or clears the persisted
//! session. Configuration comes from `WALLETGATE_*` env vars (a local
//! `.env` is honored).

use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use secrecy::SecretString;
use tracing_subscriber::EnvFilter;

use walletgate::{
    Config, GraphqlAuthClient, GraphqlChallengeClient, GraphqlClient, LocalSigner, SessionEngine,
    SessionPhase, SessionStore, TokenCell,
};

#[derive(Parser)]
#[command(name = "walletgate", version, about = "Wallet session diagnostics")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the challenge-response login flow with the dev signer.
    Login,
    /// Show the persisted session, if any.
    Status,
    /// Clear the persisted session.
    Logout,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("walletgate=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Login => login(config).await,
        Command::Status => status(config).await,
        Command::Logout => logout(config).await,
    }
}

async fn login(config: Config) -> anyhow::Result<()> {
    let key = std::env::var("WALLETGATE_DEV_PRIVATE_KEY")
        .context("WALLETGATE_DEV_PRIVATE_KEY must be set to a 0x-prefixed private key")?;
    let signer = LocalSigner::from_hex(&SecretString::from(key))?;
    let address = signer.address().to_string();

    let token = Arc::new(TokenCell::new());
    let client = Arc::new(GraphqlClient::new(
        config.endpoint.clone(),
        config.request_timeout,
        Arc::clone(&token),
    ));
    let engine = SessionEngine::new(
        Arc::new(GraphqlChallengeClient::new(Arc::clone(&client))),
        Arc::new(GraphqlAuthClient::new(client)),
        Arc::new(signer),
        Arc::new(SessionStore::new(config.session_path)),
        token,
        config.retry,
    );

    let mut transitions = engine.observe();
    engine.connect(&address).await?;

    while let Some(phase) = transitions.next().await {
        println!("-> {}", phase.as_str());
        match phase {
            SessionPhase::Authenticated { address } => {
                println!("authenticated as {address}");
                return Ok(());
            }
            SessionPhase::Failed { reason, .. } => bail!("login failed: {reason}"),
            // The stream starts after connect(), so seeing Disconnected here
            // means the wallet went away mid-flow.
            SessionPhase::Disconnected => bail!("wallet disconnected during login"),
            _ => {}
        }
    }
    bail!("session engine stopped before reaching a terminal state")
}

async fn status(config: Config) -> anyhow::Result<()> {
    let store = SessionStore::new(config.session_path);
    match store.load().await {
        Some(session) => {
            println!("address:    {}", session.address);
            println!("issued at:  {}", session.issued_at.to_rfc3339());
            println!("expires at: {}", session.expires_at.to_rfc3339());
        }
        None => println!("no active session"),
    }
    Ok(())
}

async fn logout(config: Config) -> anyhow::Result<()> {
    SessionStore::new(config.session_path).clear().await?;
    println!("session cleared");
    Ok(())
}
