mod cli;
mod config;
mod output;

use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use storefront_notifications::{
    AuthenticatedUser, NotificationEvent, NotificationService, SessionCredentials,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::{
    cli::{Args, Commands},
    config::AppConfig,
    output::OutputManager,
};

const DEFAULT_LOG_FILTER: &str = "storefront_notifications=info,storefront_notify=info";

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("Application error: {:#}", e);
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    init_logging(args.verbose, args.quiet, config.json_logs)?;

    match args.command {
        Commands::Config { base_url } => {
            config.apply_overrides(base_url);
            config.notifications.validate()?;
            if let Some(path) = args.config.or_else(AppConfig::default_path) {
                println!("# {}", path.display());
            }
            println!("{}", config.show()?);
        }
        Commands::Watch {
            token,
            base_url,
            user,
            json,
        } => {
            config.apply_overrides(base_url);
            watch(config, token, user, OutputManager::new(json)).await?;
        }
    }

    Ok(())
}

async fn watch(
    config: AppConfig,
    token: String,
    user: Option<String>,
    output: OutputManager,
) -> Result<()> {
    let service = NotificationService::new(config.notifications)
        .context("Invalid notification configuration")?;
    let user = user.map(|username| AuthenticatedUser {
        id: username.clone(),
        username,
    });
    let credentials = Arc::new(SessionCredentials::new(token, user));

    let mut events = service.subscribe();
    let mut states = service.watch_state();

    info!(url = %service.config().base_url, "Starting notification stream");
    service.start(credentials);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("Failed to listen for Ctrl-C")?;
                info!("Received Ctrl-C, shutting down");
                break;
            }

            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                println!("{}", output.format_state(state)?);
            }

            event = events.recv() => match event {
                Ok(NotificationEvent::Received { notification, channel }) => {
                    let route = service.resolve(&notification);
                    let action = service.action_label(&notification);
                    println!(
                        "{}",
                        output.format_notification(
                            &notification,
                            channel,
                            route.as_ref(),
                            action.as_deref(),
                            service.unread_count(),
                        )?
                    );
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Output fell behind, some notifications were not printed");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    service.shutdown().await;
    Ok(())
}

fn init_logging(verbose: bool, quiet: bool, json: bool) -> Result<()> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("storefront_notifications=debug,storefront_notify=debug,stomp_codec=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(verbose)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    }
    Ok(())
}
