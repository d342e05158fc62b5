use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use voice_client::{
    create_router, AppState, ClientEvent, Config, FileSource, MicrophoneSource, SourceFactory,
    VoiceClient, WebSocketConnection,
};

/// Voice assistant client: microphone to voice server and back
#[derive(Parser)]
#[command(name = "voice-client", version, about)]
struct Cli {
    /// Config file (extension optional)
    #[arg(short, long, env = "VOICE_CLIENT_CONFIG", default_value = "config/voice-client")]
    config: String,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the localhost control API
    Serve {
        /// Port to listen on (overrides the config file)
        #[arg(long)]
        port: Option<u16>,

        /// Replay this audio file instead of opening the microphone
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Stream audio into a voice session and print what comes back
    Stream {
        /// Replay this audio file instead of opening the microphone
        #[arg(long)]
        file: Option<PathBuf>,

        /// Send the file as fast as possible instead of in real time
        #[arg(long)]
        fast: bool,

        /// Seconds to keep listening after the file ends
        #[arg(long, default_value = "10")]
        linger: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "info,voice_client=debug",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    let cfg = Config::load(&cli.config)?;

    info!("Voice Client v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);
    info!("Voice server: {}", cfg.server.url);

    match cli.command {
        Command::Serve { port, file } => serve(cfg, port, file).await,
        Command::Stream { file, fast, linger } => stream(cfg, file, !fast, linger).await,
    }
}

fn source_factory(cfg: &Config, file: Option<PathBuf>, realtime: bool) -> Result<SourceFactory> {
    if let Some(path) = file {
        if !path.exists() {
            anyhow::bail!("Audio file not found: {}", path.display());
        }
        info!("Audio source: file {}", path.display());
        let chunk_samples = cfg.audio.file_chunk_samples;
        return Ok(Box::new(move || {
            Box::new(
                FileSource::new(path.clone())
                    .with_chunk_samples(chunk_samples)
                    .with_realtime(realtime),
            ) as Box<dyn MicrophoneSource>
        }));
    }

    microphone_factory()
}

#[cfg(feature = "cpal-audio")]
fn microphone_factory() -> Result<SourceFactory> {
    info!("Audio source: default input device");
    Ok(Box::new(|| {
        Box::new(voice_client::audio::CpalSource::new()) as Box<dyn MicrophoneSource>
    }))
}

#[cfg(not(feature = "cpal-audio"))]
fn microphone_factory() -> Result<SourceFactory> {
    anyhow::bail!("Built without microphone support; pass --file or enable the cpal-audio feature")
}

fn log_event(event: &ClientEvent) {
    match event {
        ClientEvent::Transcript(text) => info!("Transcript: {}", text),
        ClientEvent::Response(Some(text)) => info!("Response: {}", text),
        ClientEvent::Response(None) => info!("Response (no text)"),
        ClientEvent::Songs { summary, songs } => {
            info!("Songs: {}", summary.as_deref().unwrap_or("-"));
            for song in songs {
                info!("  {} - {}", song.name, song.artist);
            }
        }
        ClientEvent::SpeechReady { path, format } => match format {
            Some(f) => info!("Speech: {} ({:.1}s)", path.display(), f.duration_secs),
            None => info!("Speech: {}", path.display()),
        },
        ClientEvent::Interaction(state) => info!("Interaction: {:?}", state),
        ClientEvent::Connection(state) => info!("Connection: {:?}", state),
        ClientEvent::VoiceModeExited { message } => {
            info!("Voice mode ended: {}", message.as_deref().unwrap_or("-"))
        }
        ClientEvent::Error(message) => warn!("Error: {}", message),
    }
}

async fn serve(cfg: Config, port: Option<u16>, file: Option<PathBuf>) -> Result<()> {
    let factory = source_factory(&cfg, file, true)?;
    let (client, mut events) = VoiceClient::new(
        cfg.client_config(),
        Arc::new(WebSocketConnection::new()),
        factory,
    );
    let client = Arc::new(client);

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            log_event(&event);
        }
    });

    let addr = format!("{}:{}", cfg.service.http.bind, port.unwrap_or(cfg.service.http.port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Control API listening on http://{}", addr);

    let router = create_router(AppState::new(Arc::clone(&client)));
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await
        .context("HTTP server failed")?;

    info!("Shutting down");
    client.shutdown().await;

    Ok(())
}

async fn stream(cfg: Config, file: Option<PathBuf>, realtime: bool, linger: u64) -> Result<()> {
    let replaying = file.is_some();
    let factory = source_factory(&cfg, file, realtime)?;
    let (client, mut events) = VoiceClient::new(
        cfg.client_config(),
        Arc::new(WebSocketConnection::new()),
        factory,
    );

    client
        .start_voice_mode()
        .await
        .context("Failed to start voice mode")?;

    let mut poll = tokio::time::interval(Duration::from_millis(500));
    let mut source_done: Option<tokio::time::Instant> = None;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    log_event(&event);
                    if matches!(event, ClientEvent::VoiceModeExited { .. }) {
                        break;
                    }
                }
                None => break,
            },
            _ = poll.tick() => {
                if replaying && source_done.is_none() && !client.is_capturing().await {
                    info!("File finished, listening for {}s more", linger);
                    source_done = Some(tokio::time::Instant::now());
                }
                if source_done.is_some_and(|t| t.elapsed() >= Duration::from_secs(linger)) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    client.shutdown().await;

    let status = client.status().await;
    info!(
        "Sent {} frames ({} dropped), received {} events and {} speech clips",
        status.session.frames_sent,
        status.session.frames_dropped,
        status.session.events_received,
        status.session.speech_clips_received
    );

    Ok(())
}
