use crate::devices::AudioConstraints;
use crate::widget::{MenuPosition, WidgetOptions};
use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub signaling: SignalingConfig,
    #[serde(default)]
    pub widget: WidgetConfig,
    #[serde(default)]
    pub audio: AudioConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct SignalingConfig {
    /// Base URL of the signaling backend
    pub api_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WidgetConfig {
    pub show_device_selection: bool,
    pub menu_position: MenuPosition,
    pub class_name: String,
    pub background: String,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        let options = WidgetOptions::new("");
        Self {
            show_device_selection: options.show_device_selection,
            menu_position: options.menu_position,
            class_name: options.class_name,
            background: options.background,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub noise_suppression: bool,
    pub echo_cancellation: bool,
    pub auto_gain_control: bool,
    /// Preferred microphone id
    pub input_device: Option<String>,
    /// Preferred speaker id
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        let constraints = AudioConstraints::default();
        Self {
            noise_suppression: constraints.noise_suppression,
            echo_cancellation: constraints.echo_cancellation,
            auto_gain_control: constraints.auto_gain_control,
            input_device: None,
            output_device: None,
        }
    }
}

impl Config {
    /// Load from an optional file layered with `VOICE_WIDGET__*` environment variables
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("VOICE_WIDGET")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to load config from {}", path))?;

        Ok(settings.try_deserialize()?)
    }

    pub fn api_url(&self) -> Result<&str> {
        self.signaling
            .api_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .context("signaling.api_url is not set")
    }

    pub fn processing(&self) -> AudioConstraints {
        AudioConstraints {
            device_id: None,
            noise_suppression: self.audio.noise_suppression,
            echo_cancellation: self.audio.echo_cancellation,
            auto_gain_control: self.audio.auto_gain_control,
        }
    }

    pub fn widget_options(&self) -> Result<WidgetOptions> {
        Ok(WidgetOptions {
            show_device_selection: self.widget.show_device_selection,
            menu_position: self.widget.menu_position,
            class_name: self.widget.class_name.clone(),
            background: self.widget.background.clone(),
            ..WidgetOptions::new(self.api_url()?)
        })
    }
}
