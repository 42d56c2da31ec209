//! Main entry point for the sketchgen CLI
//!
//! Reads a sketch image from disk, composes a prompt from the style text,
//! and runs one failover generation. Ctrl-C cancels the in-flight request.

use std::process::ExitCode;

use sketchgen_client::{config::Settings, sketch, ClientError, SketchGenClient};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut args = std::env::args().skip(1);
    let (sketch_path, style_prompt) = match (args.next(), args.next()) {
        (Some(path), Some(style)) => (path, style),
        _ => {
            eprintln!("Usage: sketchgen <sketch-file> <style-prompt> [user-prompt]");
            return Ok(ExitCode::from(2));
        }
    };
    let user_prompt = args.next();

    let settings = Settings::load()?;
    let client = SketchGenClient::new(settings)?;

    let bytes = tokio::fs::read(&sketch_path).await?;
    let format = sketch_path
        .rsplit('.')
        .next()
        .filter(|ext| ["png", "jpg", "jpeg", "webp", "gif"].contains(ext))
        .unwrap_or("png");
    let sketch_data_url = sketch::encode_data_url(&bytes, format);

    client.warm_up().await;

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Cancellation requested");
            signal_cancel.cancel();
        }
    });

    match client
        .generate(
            &sketch_data_url,
            &style_prompt,
            user_prompt.as_deref(),
            cancel,
        )
        .await
    {
        Ok(outcome) => {
            info!(node = %outcome.node_id, id = %outcome.id, "Image generated");
            println!("{}", outcome.image_url);
            Ok(ExitCode::SUCCESS)
        }
        Err(ClientError::Cancelled) => {
            // User-initiated; exit quietly without a failure message.
            Ok(ExitCode::from(130))
        }
        Err(e) => Err(e.into()),
    }
}
