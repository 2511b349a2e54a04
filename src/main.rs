use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use voice_widget::devices::DeviceKind;
use voice_widget::{Config, VoiceWidget};

#[derive(Parser)]
#[command(name = "voice-widget", version, about = "Headless voice chat client")]
struct Cli {
    /// Config file (extension optional)
    #[arg(long, default_value = "config/voice-widget")]
    config: String,

    /// Signaling backend base URL, overrides the config file
    #[arg(long)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List audio input and output devices
    Devices,
    /// Start a voice session and hold it until Ctrl-C
    Connect {
        /// Microphone id from `devices`
        #[arg(long)]
        input: Option<String>,
        /// Speaker id from `devices`
        #[arg(long)]
        output: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut cfg = Config::load(&cli.config)?;
    if let Some(api_url) = cli.api_url {
        cfg.signaling.api_url = Some(api_url);
    }

    info!("voice-widget v{}", env!("CARGO_PKG_VERSION"));

    let mut widget = build_widget(&cfg)?;

    match cli.command {
        Command::Devices => list(&mut widget).await,
        Command::Connect { input, output } => {
            let input = input.or_else(|| cfg.audio.input_device.clone());
            let output = output.or_else(|| cfg.audio.output_device.clone());
            connect(&mut widget, input, output).await
        }
    }
}

fn build_widget(cfg: &Config) -> Result<VoiceWidget> {
    let mut options = cfg.widget_options()?;
    options.on_connection_change = Some(Arc::new(|connected| {
        info!("Voice chat connected: {}", connected);
    }));

    Ok(VoiceWidget::native(options, cfg.processing()))
}

async fn list(widget: &mut VoiceWidget) -> Result<()> {
    let devices = widget.mount().await;
    let selection = widget.controller().selection();

    println!("Microphones:");
    for device in &devices.inputs {
        let marker = if selection.input.as_deref() == Some(device.id.as_str()) { "*" } else { " " };
        println!(" {} {}  {}", marker, device.id, device.label);
    }

    println!("Speakers:");
    for device in &devices.outputs {
        let marker = if selection.output.as_deref() == Some(device.id.as_str()) { "*" } else { " " };
        println!(" {} {}  {}", marker, device.id, device.label);
    }

    Ok(())
}

async fn connect(
    widget: &mut VoiceWidget,
    input: Option<String>,
    output: Option<String>,
) -> Result<()> {
    widget.mount().await;

    if let Some(input) = input {
        if !widget.choose_device(DeviceKind::Input, &input).await {
            bail!("Unknown input device: {}", input);
        }
    }
    if let Some(output) = output {
        if !widget.choose_device(DeviceKind::Output, &output).await {
            bail!("Unknown output device: {}", output);
        }
    }

    let mut states = widget.controller().subscribe();

    println!("{}", widget.view().to_line());
    if widget.click_mic().await.is_idle() {
        bail!("Could not start voice session");
    }
    println!("{}", widget.view().to_line());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, disconnecting");
                break;
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                widget.refresh();
                println!("{}", widget.view().to_line());
                if states.borrow().is_idle() {
                    info!("Session ended by the remote side");
                    break;
                }
            }
        }
    }

    widget.unmount().await;
    println!("{}", widget.view().to_line());

    Ok(())
}
