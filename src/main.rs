//! Mediagate - generation gateway CLI and HTTP server.

use std::path::Path;
use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mediagate::cli::{Cli, Command, RunArgs, ServeArgs};
use mediagate::config::{self, Config};
use mediagate::context::{RecordingSession, ServiceContext};
use mediagate::error::GatewayError;
use mediagate::gateway::{Envelope, ErrorEnvelope, Gateway, GatewayOptions};
use mediagate::server;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// Returns whether the command succeeded.
async fn run(cli: Cli) -> Result<bool, GatewayError> {
    let config_path = config::discover_config_path(cli.config.as_deref());
    let config = Config::load(&config_path).map_err(GatewayError::Config)?;
    tracing::debug!(path = %config_path.display(), "configuration loaded");

    let (gateway, recording_session) = build_gateway(&config)?;

    let succeeded = match cli.command {
        Command::Serve(args) => {
            serve(gateway, &config, &args).await?;
            true
        }
        Command::Run(args) => run_once(gateway, &args).await,
    };

    // The gateway (and with it the recording backend) is gone by now.
    if let Some(session) = recording_session {
        match session.finish() {
            Ok(Some(path)) => eprintln!("Cassette saved: {}", path.display()),
            Ok(None) => {}
            Err(e) => eprintln!("Warning: failed to save cassette: {e}"),
        }
    }

    Ok(succeeded)
}

/// Create the gateway based on mode (live / recording / replaying).
///
/// A missing credential does not stop start-up: the gateway reports it as a
/// configuration error on every request.
fn build_gateway(config: &Config) -> Result<(Gateway, Option<RecordingSession>), GatewayError> {
    let options = GatewayOptions { allow_degraded: config.output.allow_degraded };

    let replay_path = std::env::var("MEDIAGATE_REPLAY").ok();
    let is_recording = std::env::var("MEDIAGATE_REC").is_ok_and(|v| v == "true" || v == "1");

    let built = if let Some(cassette_path) = replay_path {
        tracing::info!(cassette = %cassette_path, "replaying backend outputs");
        ServiceContext::replaying(Path::new(&cassette_path)).map(|ctx| (ctx, None))
    } else if is_recording {
        tracing::info!("recording backend interactions");
        ServiceContext::recording(config).map(|(ctx, session)| (ctx, Some(session)))
    } else {
        ServiceContext::live(config).map(|ctx| (ctx, None))
    };

    match built {
        Ok((ctx, session)) => Ok((Gateway::new(ctx.backend, options), session)),
        Err(e @ GatewayError::MissingApiKey { .. }) => {
            tracing::error!("{e}");
            Ok((Gateway::unconfigured(e.to_string(), options), None))
        }
        Err(e) => Err(e),
    }
}

async fn serve(gateway: Gateway, config: &Config, args: &ServeArgs) -> Result<(), GatewayError> {
    let host = args.host.as_deref().unwrap_or(&config.server.host);
    let port = args.port.unwrap_or(config.server.port);
    let addr = format!("{host}:{port}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "mediagate listening");

    axum::serve(listener, server::router(Arc::new(gateway), config.server.max_body_bytes))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("cannot listen for Ctrl+C, running until killed: {e}");
        std::future::pending::<()>().await;
    }
}

/// Serve a single request and print its envelope.
async fn run_once(gateway: Gateway, args: &RunArgs) -> bool {
    let envelope = match args.params() {
        Ok(params) => gateway.handle(&args.operation, &params).await,
        Err(e) => Envelope::Failure(ErrorEnvelope::from(&e)),
    };
    drop(gateway);

    match serde_json::to_string_pretty(&envelope) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error: cannot encode response: {e}"),
    }
    if let Envelope::Failure(err) = &envelope {
        eprintln!("Error: {}", err.error_message);
    }
    envelope.is_success()
}
