//! Soundtrack command line player
//!
//! Plays a SHOUTcast AAC stream on an output device and prints song titles
//! as the station announces them.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use soundtrack::{
    audio::{list_output_devices, CpalEngine},
    config::AppConfig,
    player::{PlayerEvent, PlayerState, StreamPlayer},
    stream::{ShoutcastTransport, StreamSource},
};

#[derive(Parser, Debug)]
#[command(name = "soundtrack", version, about = "SHOUTcast AAC stream player")]
struct Args {
    /// Stream URL, overrides the configured one
    url: Option<String>,

    /// Config file (defaults to the per-user config location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output device id as shown by --list-devices
    #[arg(short, long)]
    device: Option<String>,

    /// Print output devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::load_or_default()?,
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.filter.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if args.list_devices {
        println!("\n=== Available Output Devices ===");
        for device in list_output_devices() {
            let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
            println!("  {}{}:", device.name, default_marker);
            println!("    ID: {}", device.id);
            println!("    Sample rates: {:?}", device.sample_rates);
            println!("    Channels: {:?}", device.channels);
        }
        println!();
        return Ok(());
    }

    let url = args.url.unwrap_or(config.stream.url);
    if url.is_empty() {
        anyhow::bail!("No stream URL given and none configured");
    }
    let source = StreamSource::new(url, config.stream.mime_type);
    let device_id = args.device.or(config.audio.device_id);

    tracing::info!("Starting Soundtrack for {}", source);

    let engine = CpalEngine::new(device_id.as_deref()).context("Failed to open audio output")?;
    tracing::info!("Output device: {}", engine.device_name());

    let transport = ShoutcastTransport::from_current()?.with_user_agent(config.stream.user_agent);

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let (player, handle) =
        StreamPlayer::new(source, Box::new(engine), Box::new(transport), Box::new(events_tx))?;
    let player_task = player.spawn();

    handle.play()?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(PlayerEvent::Started) => println!("Playing"),
                Some(PlayerEvent::SongChanged(title)) => println!("♪ {}", title),
                Some(PlayerEvent::Failed(reason)) => {
                    eprintln!("Error: {}", reason);
                    // Open and engine failures end the session without a stop event
                    if handle.state() == PlayerState::Idle {
                        break;
                    }
                }
                Some(PlayerEvent::Stopped) | None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down...");
                break;
            }
        }
    }

    // Ignored if the task already exited
    let _ = handle.shutdown();
    player_task.await?;

    Ok(())
}
