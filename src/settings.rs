use std::path::{Path, PathBuf};

use libphoneprop::config::Config;
use libphoneprop::events::REMOTE_BUTTONS;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const CONFIG_ENV: &str = "PHONEPROP_CONFIG";

/// BCM pin numbers and bus settings.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct HardwareConfig {
    pub hook: u8,
    pub remote: [u8; REMOTE_BUTTONS],
    pub keypad_rows: [u8; 4],
    pub keypad_cols: [u8; 3],
    /// Sound board ACT, low while playing
    pub activity: u8,
    /// Sound board RST, active low
    pub reset: u8,
    /// Banner wait when the phone resets the sound board between calls.
    /// Boot waits longer.
    pub reinit_timeout_ms: u64,
    pub uart: PathBuf,
    pub baud: u32,
    /// PCF8574 backpack of the LCD. Without one, display requests are only
    /// logged.
    pub lcd_address: Option<u16>,
    /// Volume steps sent to the sound board after boot
    pub volume_steps: u8,
    pub poll_hz: u64,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            hook: 17,
            remote: [5, 6, 13, 19],
            keypad_rows: [12, 16, 20, 21],
            keypad_cols: [22, 23, 24],
            activity: 25,
            reset: 4,
            reinit_timeout_ms: 1500,
            uart: PathBuf::from("/dev/serial0"),
            baud: 9600,
            lcd_address: Some(0x27),
            volume_steps: 0,
            poll_hz: 200,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub phone: Config,
    pub hardware: HardwareConfig,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Invalid(#[from] libphoneprop::config::ConfigError),
}

impl Settings {
    /// Reads the file named by the first argument, or by `PHONEPROP_CONFIG`.
    /// Without either the defaults apply.
    pub fn load() -> Result<Self, SettingsError> {
        let path = std::env::args_os()
            .nth(1)
            .or_else(|| std::env::var_os(CONFIG_ENV))
            .map(PathBuf::from);
        let settings = match path {
            Some(path) => Self::from_file(&path)?,
            None => {
                tracing::info!("no configuration file given, using defaults");
                Self::default()
            }
        };
        settings.phone.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_owned(),
            source,
        })?;
        let settings = serde_json::from_str(&text).map_err(|source| SettingsError::Parse {
            path: path.to_owned(),
            source,
        })?;
        tracing::info!(path = %path.display(), "loaded configuration");
        Ok(settings)
    }
}
