use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use chain_integration::JsonRpcWallet;
use clap::{Parser, Subcommand};
use client_core::{
    config::load_settings, SessionController, SessionError, SessionEvent, SessionSettings,
};
use shared::protocol::{DisplaySnapshot, TxReceipt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(about = "Presale minting client for the Crypto Devs collection")]
struct Cli {
    /// TOML settings file; defaults to ./minter.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect once and print what the minting page would show.
    Status,
    /// Keep polling and print every state change until Ctrl-C.
    Watch,
    StartPresale,
    PresaleMint,
    PublicMint,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let settings = load_settings(cli.config.as_deref());
    let mut wallet = JsonRpcWallet::new(settings.rpc_endpoint()?)
        .with_receipt_poll_interval(settings.receipt_poll_interval());
    if let Some(account) = settings.account()? {
        wallet = wallet.with_account(account);
    }
    let controller = SessionController::new(
        Arc::new(wallet),
        SessionSettings::from_client_settings(&settings)?,
    );
    info!(rpc = %settings.rpc_url, contract = %settings.contract_address, "minter: starting");

    let display = controller
        .connect()
        .await
        .context("failed to connect wallet")?;

    match cli.command {
        Command::Status => print_display(&display),
        Command::Watch => watch(&controller).await,
        Command::StartPresale => {
            let result = controller.start_presale().await;
            finish_write(&controller, result, "Presale started!").await?;
        }
        Command::PresaleMint => {
            let result = controller.presale_mint().await;
            finish_write(&controller, result, "You successfully minted a Crypto Dev!").await?;
        }
        Command::PublicMint => {
            let result = controller.public_mint().await;
            finish_write(&controller, result, "You successfully minted a Crypto Dev!").await?;
        }
    }

    Ok(())
}

fn print_display(display: &DisplaySnapshot) {
    if let Some(warning) = &display.network_warning {
        println!("warning: {warning}");
    }
    if display.busy {
        println!("Loading...");
    } else if display.action.is_actionable() {
        println!("[ {} ]", display.action.label());
    } else {
        println!("{}", display.action.label());
    }
    if let Some(line) = display.progress_line() {
        println!("{line}");
    }
}

async fn finish_write(
    controller: &SessionController,
    result: Result<TxReceipt, SessionError>,
    success: &str,
) -> Result<()> {
    let receipt = result?;
    println!("{success} (tx {})", receipt.tx_hash);
    controller.refresh().await;
    print_display(&controller.display().await);
    Ok(())
}

async fn watch(controller: &Arc<SessionController>) {
    let mut events = controller.subscribe_events();
    let polling = controller.start_polling();
    info!(tasks = polling.task_count(), "minter: watching for changes");

    let mut last = controller.display().await;
    print_display(&last);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(SessionEvent::StateChanged(snapshot)) => {
                    if snapshot != last {
                        print_display(&snapshot);
                        last = snapshot;
                    }
                }
                Ok(SessionEvent::Notice(notice)) => println!("note: {notice}"),
                Ok(SessionEvent::Error(notice)) => {
                    eprintln!("error [{:?}]: {}", notice.code, notice.message)
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "minter: session events lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    }

    polling.shutdown().await;
    info!("minter: stopped watching");
}
