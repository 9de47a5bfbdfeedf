use std::path::PathBuf;

use anyhow::{Context, Result};
use chain_integration::{
    deploy::{
        deploy_contract, ConstructorArgs, ContractArtifact, DEFAULT_COLLECTION_NAME,
        DEFAULT_COLLECTION_SYMBOL, DEFAULT_WHITELIST_CONTRACT,
    },
    JsonRpcWallet,
};
use clap::{Parser, Subcommand};
use client_core::config::load_settings;
use shared::domain::Address;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deploys the minting contract and prints its address.
    Deploy {
        /// Compiled contract artifact (JSON with a `bytecode` field).
        #[arg(long)]
        artifact: PathBuf,
        #[arg(long, default_value = DEFAULT_COLLECTION_NAME)]
        name: String,
        #[arg(long, default_value = DEFAULT_COLLECTION_SYMBOL)]
        symbol: String,
        #[arg(long, default_value = DEFAULT_WHITELIST_CONTRACT)]
        whitelist: Address,
        /// Deployer account; defaults to the endpoint's first account.
        #[arg(long)]
        from: Option<Address>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref());

    match cli.command {
        Command::Deploy {
            artifact,
            name,
            symbol,
            whitelist,
            from,
        } => {
            let artifact = ContractArtifact::load(&artifact)?;
            let wallet = JsonRpcWallet::new(settings.rpc_endpoint()?)
                .with_receipt_poll_interval(settings.receipt_poll_interval());
            let from = match from {
                Some(from) => Some(from),
                None => settings.account()?,
            };
            let address = deploy_contract(
                &wallet,
                from,
                &artifact,
                &ConstructorArgs {
                    name,
                    symbol,
                    whitelist,
                },
            )
            .await
            .context("deployment failed")?;
            println!("deployed contract_address={address}");
        }
    }

    Ok(())
}
