//! CLI entry point for the mediarelay tool.

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use mediarelay_core::transfer::{
    DestinationSink, DirectorySink, HttpClient, HttpSink, TransferOrchestrator, TransferRequest,
    TransferResult,
};
use mediarelay_core::{JsonMetadataResolver, ThumbnailFetcher};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

mod app_config;
mod cli;
mod progress_ui;

use app_config::{FileConfig, build_transfer_config, load_config};
use cli::Args;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let loaded = load_config(args.config.as_deref())?;
    if loaded.loaded_from_file {
        debug!(path = ?loaded.path, "Loaded config file");
    }
    let file = loaded.config;
    let config = build_transfer_config(&file, &args)?;
    debug!(?config, "Transfer configuration resolved");

    let cancel = CancellationToken::new();
    spawn_ctrl_c_handler(cancel.clone());

    let client = HttpClient::from_config(&config);

    let (request, thumbnail_url) = build_request(&args, &file, &cancel).await?;
    info!(
        request_id = %request.id(),
        url = %request.source_url(),
        mode = %request.mode(),
        "mediarelay starting"
    );

    let mut orchestrator = TransferOrchestrator::with_client(config, client.clone());
    if let Some(thumbnail_url) = thumbnail_url {
        orchestrator = orchestrator.with_auxiliary_producer(Arc::new(ThumbnailFetcher::new(
            client.inner().clone(),
            thumbnail_url,
        )));
    }

    let sink = build_sink(&args, &file, &client)?;
    debug!(sink = sink.name(), "Destination selected");

    let use_spinner = !args.quiet && io::stderr().is_terminal();
    let (spinner, on_progress) = progress_ui::progress_ui(use_spinner);

    let result = orchestrator
        .execute(&request, sink.as_ref(), &on_progress, &cancel)
        .await;
    spinner.finish_and_clear();

    println!("{}", result.outcome_message());
    Ok(match result {
        TransferResult::Failed { .. } => ExitCode::FAILURE,
        TransferResult::Uploaded { .. } | TransferResult::LinkOnly { .. } => ExitCode::SUCCESS,
    })
}

fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received, cancelling transfer");
                cancel.cancel();
            }
            Err(e) => warn!(error = %e, "Could not listen for Ctrl-C"),
        }
    });
}

/// Builds the request, resolving the link through the metadata endpoint when
/// one is configured. Returns the thumbnail URL the lookup found, if any.
async fn build_request(
    args: &Args,
    file: &FileConfig,
    cancel: &CancellationToken,
) -> Result<(TransferRequest, Option<String>)> {
    let endpoint = args
        .metadata_endpoint
        .as_deref()
        .or(file.metadata_endpoint.as_deref());

    let (mut request, thumbnail_url) = if let Some(endpoint) = endpoint {
        let resolver = JsonMetadataResolver::new(endpoint)?;
        let descriptor = resolver
            .resolve(&args.url, cancel)
            .await
            .with_context(|| format!("Failed to resolve '{}'", args.url))?;
        (descriptor.to_request(), descriptor.thumbnail_url)
    } else {
        (TransferRequest::new(args.url.as_str()), None)
    };

    if let Some(mode) = args.mode.or(file.transfer_mode()?) {
        request = request.with_mode(mode);
    }
    if let Some(size_hint) = args.size_hint {
        request = request.with_expected_size(size_hint);
    }
    if let Some(kind) = args.kind {
        request = request.with_destination_hint(kind.into());
    }
    if let Some(caption) = &args.caption {
        request = request.with_caption(caption.as_str());
    }
    if let Some(file_name) = &args.file_name {
        request = request.with_file_name(file_name);
    }
    Ok((request, thumbnail_url))
}

fn build_sink(
    args: &Args,
    file: &FileConfig,
    client: &HttpClient,
) -> Result<Box<dyn DestinationSink>> {
    // An explicit output directory beats a configured upload URL.
    let upload_url = if args.output_dir.is_some() {
        None
    } else {
        args.upload_url.as_deref().or(file.upload_url.as_deref())
    };

    if let Some(raw) = upload_url {
        let endpoint = Url::parse(raw).with_context(|| format!("Invalid upload URL '{raw}'"))?;
        return Ok(Box::new(HttpSink::new(client.inner().clone(), endpoint)));
    }

    let dir = args
        .output_dir
        .clone()
        .or_else(|| file.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    Ok(Box::new(DirectorySink::new(dir)))
}
