#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

use anyhow::{Context, Result};
use clap::Parser;
use jobbox::jobs::JobStatus;
use jobbox::{Config, Dispatcher, Store};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod cli;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_init()?,
    };
    config.apply_env_overrides();

    // Logs go to stderr so stdout carries only replies.
    let level = config.log_level.parse::<Level>().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    config.validate()?;

    let store = Store::open(&config.database_path()).await?;
    let (handshake_tx, handshake_rx) = mpsc::unbounded_channel::<String>();
    let dispatcher = Arc::new(
        Dispatcher::new(store.clone(), config.auth_groups(), config.shell_commands())
            .with_handshake(handshake_tx),
    );
    let printer = tokio::spawn(cli::print_handshakes(handshake_rx, std::io::stdout()));

    let code = match cli.command {
        Commands::Run { origin, line } => {
            let mut words = line.into_iter();
            let mut request = origin.request();
            request.command = words.next().unwrap_or_default();
            request.args = words.collect();
            match dispatcher.dispatch(request.clone()).await {
                Ok(reply) => {
                    println!("{}", reply.text);
                    exit_code(reply.status)
                }
                Err(e) => {
                    println!("{}", dispatcher.reply_for_error(&request, &e));
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Repl { origin } => {
            cli::repl::run(Arc::clone(&dispatcher), origin.request()).await?;
            ExitCode::SUCCESS
        }
        Commands::Replay { token_id } => match dispatcher.dispatch_token(&token_id).await {
            Ok(reply) => {
                println!("{}", reply.text);
                exit_code(reply.status)
            }
            Err(e) => {
                eprintln!("Error: {e}");
                ExitCode::FAILURE
            }
        },
    };

    // The dispatcher owns the handshake sender; dropping it lets the
    // printer drain what is queued and stop.
    drop(dispatcher);
    printer.await.context("handshake printer failed")?;
    store.close().await;
    Ok(code)
}

fn exit_code(status: JobStatus) -> ExitCode {
    if status == JobStatus::Successful {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
