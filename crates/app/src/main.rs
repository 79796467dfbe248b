use std::{
    io::{self, BufRead},
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use waveform_lab_core::{
    build_preview, parse_frequency, summarize, synthesize, AppConfig, AudioBackend,
    AudioSubsystem, DisplayAdapter, PlaybackState, TerminalDisplay, UiEvent, UserCommand,
    WaveLabError, WaveformApp, WaveformFamily, WaveformRequest,
};

/// Extra time granted on top of the buffer length before `play` gives up.
const PLAY_GRACE: Duration = Duration::from_secs(5);

fn main() -> waveform_lab_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Interactive { config, audio } => run_interactive(config.as_deref(), &audio),
        Commands::Play {
            waveform,
            frequency,
            duration,
            config,
            audio,
        } => run_play(waveform, &frequency, duration, config.as_deref(), &audio),
        Commands::Preview {
            waveform,
            frequency,
            width,
            height,
            config,
        } => run_preview(waveform, &frequency, width, height, config.as_deref()),
        Commands::Inspect {
            waveform,
            frequency,
            duration,
            config,
        } => run_inspect(waveform, &frequency, duration, config.as_deref()),
        Commands::Devices => run_devices(),
    }
}

fn run_interactive(config_path: Option<&Path>, audio: &AudioArgs) -> waveform_lab_core::Result<()> {
    let config = load_config(config_path, audio)?;
    tracing::info!(backend = %audio.audio, "starting interactive mode");

    let subsystem = AudioSubsystem::acquire(audio.audio, &config.audio);
    let mut app = WaveformApp::new(config, subsystem, TerminalDisplay::new(io::stdout()));
    print_help();

    let sender = app.sender();
    thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                match line.parse::<UserCommand>() {
                    Ok(command) => {
                        let quit = command == UserCommand::Quit;
                        if sender.send(UiEvent::Input(command)).is_err() || quit {
                            return;
                        }
                    }
                    Err(err) => eprintln!("{err}"),
                }
            }
            // End of input closes the application like the quit command.
            let _ = sender.send(UiEvent::Input(UserCommand::Quit));
        })?;

    app.run();
    Ok(())
}

fn run_play(
    waveform: WaveformFamily,
    frequency: &str,
    duration: Option<f64>,
    config_path: Option<&Path>,
    audio: &AudioArgs,
) -> waveform_lab_core::Result<()> {
    let mut config = load_config(config_path, audio)?;
    config.playback.default_waveform = waveform;
    config.playback.default_frequency_hz = parse_frequency(frequency)?;
    if let Some(duration) = duration {
        config.playback.duration_seconds = duration;
    }
    config.validate()?;

    let timeout = Duration::from_secs_f64(config.playback.duration_seconds) + PLAY_GRACE;
    let subsystem = AudioSubsystem::acquire(audio.audio, &config.audio)?;
    let mut app = WaveformApp::new(config, Ok(subsystem), TerminalDisplay::new(io::stdout()));

    app.handle_command(UserCommand::Play);
    if app.state() != PlaybackState::Playing {
        return Err(WaveLabError::msg("playback did not start"));
    }
    if !app.wait_until_idle(timeout) {
        tracing::warn!(?timeout, "playback did not finish in time, stopping");
    }
    app.close();
    Ok(())
}

fn run_preview(
    waveform: WaveformFamily,
    frequency: &str,
    width: usize,
    height: usize,
    config_path: Option<&Path>,
) -> waveform_lab_core::Result<()> {
    let config = load_config(config_path, &AudioArgs::default())?;
    let plot = build_preview(
        waveform,
        parse_frequency(frequency)?,
        config.audio.sample_rate,
        config.audio.amplitude,
        &config.preview,
    )?;

    let mut display = TerminalDisplay::with_size(io::stdout(), width, height);
    display.draw_waveform(&plot)
}

fn run_inspect(
    waveform: WaveformFamily,
    frequency: &str,
    duration: Option<f64>,
    config_path: Option<&Path>,
) -> waveform_lab_core::Result<()> {
    let config = load_config(config_path, &AudioArgs::default())?;
    let request = WaveformRequest::new(
        waveform,
        parse_frequency(frequency)?,
        duration.unwrap_or(config.playback.duration_seconds),
        config.audio.sample_rate,
    )?
    .with_amplitude(config.audio.amplitude);

    let summary = summarize(&synthesize(&request))?;
    tracing::debug!(%summary, "inspected buffer");
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[cfg(feature = "cpal-backend")]
fn run_devices() -> waveform_lab_core::Result<()> {
    for device in waveform_lab_core::audio::list_output_devices()? {
        let marker = if device.is_default { " (default)" } else { "" };
        println!("{}{marker}", device.name);
    }
    Ok(())
}

#[cfg(not(feature = "cpal-backend"))]
fn run_devices() -> waveform_lab_core::Result<()> {
    Err(WaveLabError::AudioUnavailable(
        "device listing requires the `cpal-backend` feature".to_string(),
    ))
}

fn load_config(path: Option<&Path>, audio: &AudioArgs) -> waveform_lab_core::Result<AppConfig> {
    let mut config = match path {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if let Some(device) = &audio.device {
        config.audio.device = Some(device.clone());
    }
    Ok(config)
}

fn print_help() {
    println!("commands: wave <sine|square|triangle|sawtooth>, freq <hz>, play, stop, toggle (or empty line), quit");
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Fundamental waveform generator and player", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
struct AudioArgs {
    /// Audio output backend.
    #[arg(long, default_value_t = AudioBackend::default())]
    audio: AudioBackend,
    /// Output device name; defaults to the host default device.
    #[arg(long)]
    device: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read commands from stdin and play waveforms on demand.
    Interactive {
        /// JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[command(flatten)]
        audio: AudioArgs,
    },
    /// Play a single waveform and exit when it ends.
    Play {
        waveform: WaveformFamily,
        /// Frequency in hertz.
        frequency: String,
        /// Playback length in seconds.
        #[arg(short, long)]
        duration: Option<f64>,
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[command(flatten)]
        audio: AudioArgs,
    },
    /// Print a plot of the first few periods of a waveform.
    Preview {
        waveform: WaveformFamily,
        frequency: String,
        #[arg(long, default_value_t = 72)]
        width: usize,
        #[arg(long, default_value_t = 15)]
        height: usize,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Synthesize a waveform and print level and spectrum measurements as JSON.
    Inspect {
        waveform: WaveformFamily,
        frequency: String,
        #[arg(short, long)]
        duration: Option<f64>,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// List audio output devices.
    Devices,
}
