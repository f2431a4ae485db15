use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::directory::{FileId, MAX_FILE_ID};
use crate::events::REMOTE_BUTTONS;

/// Digits collected before a dialed number is looked up.
pub const NUMBER_LENGTH: usize = 5;

/// Presses that make up a remote code.
pub const REMOTE_CODE_LENGTH: usize = 2;

/// File ids of the sounds the phone itself needs, as opposed to recordings
/// that are reached by dialing.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct SystemSounds {
    pub dial_tone: FileId,
    pub key_click: FileId,
    pub ring_tone: FileId,
    /// Played (and looped) whenever a call is over but the handset is
    /// still lifted.
    pub call_finished: FileId,
}

impl Default for SystemSounds {
    fn default() -> Self {
        Self {
            dial_tone: 1,
            key_click: 2,
            ring_tone: 3,
            call_finished: 4,
        }
    }
}

/// One button of the keyfob remote.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemoteKey {
    /// Shown on the display while a code is being entered
    pub letter: char,
    pub digit: u8,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub sounds: SystemSounds,
    /// How long a raw level has to hold before it counts
    pub debounce_ms: u64,
    /// Minimum gap between two commands to the sound module
    pub command_spacing_ms: u64,
    /// Length of the ringback burst before an outbound call connects
    pub ringback_ms: u64,
    /// How long an incoming call rings before giving up
    pub ring_timeout_ms: u64,
    /// Window for the second press of a remote code
    pub second_press_window_ms: u64,
    /// Upper bound on waiting for the first remote button to be released
    pub release_wait_ms: u64,
    /// Idle time before the screensaver takes over the display
    pub idle_timeout_ms: u64,
    pub remote: [RemoteKey; REMOTE_BUTTONS],
    /// Dialed when `*` is pressed
    pub shortcut: FileId,
    pub backlight_full: u8,
    pub backlight_dim: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sounds: SystemSounds::default(),
            debounce_ms: 20,
            command_spacing_ms: 150,
            ringback_ms: 4_000,
            ring_timeout_ms: 30_000,
            second_press_window_ms: 5_000,
            release_wait_ms: 3_000,
            idle_timeout_ms: 60_000,
            remote: [
                RemoteKey { letter: 'A', digit: 1 },
                RemoteKey { letter: 'B', digit: 2 },
                RemoteKey { letter: 'C', digit: 3 },
                RemoteKey { letter: 'D', digit: 4 },
            ],
            shortcut: 47110,
            backlight_full: 255,
            backlight_dim: 16,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shortcut > MAX_FILE_ID {
            return Err(ConfigError::ShortcutOutOfRange(self.shortcut));
        }
        if self.debounce_ms == 0 {
            return Err(ConfigError::ZeroInterval("debounce_ms"));
        }
        if self.command_spacing_ms == 0 {
            return Err(ConfigError::ZeroInterval("command_spacing_ms"));
        }
        for (index, key) in self.remote.iter().enumerate() {
            if key.digit > 9 {
                return Err(ConfigError::RemoteDigit { index, digit: key.digit });
            }
            if self.remote[..index].iter().any(|k| k.letter == key.letter) {
                return Err(ConfigError::DuplicateRemoteLetter(key.letter));
            }
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn command_spacing(&self) -> Duration {
        Duration::from_millis(self.command_spacing_ms)
    }

    pub fn ringback(&self) -> Duration {
        Duration::from_millis(self.ringback_ms)
    }

    pub fn ring_timeout(&self) -> Duration {
        Duration::from_millis(self.ring_timeout_ms)
    }

    pub fn second_press_window(&self) -> Duration {
        Duration::from_millis(self.second_press_window_ms)
    }

    pub fn release_wait(&self) -> Duration {
        Duration::from_millis(self.release_wait_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// The shortcut number as the digits it would have been typed with.
    pub fn shortcut_digits(&self) -> [u8; NUMBER_LENGTH] {
        let mut digits = [0; NUMBER_LENGTH];
        let mut rest = self.shortcut;
        for digit in digits.iter_mut().rev() {
            *digit = (rest % 10) as u8;
            rest /= 10;
        }
        digits
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("shortcut number {0} does not fit into five digits")]
    ShortcutOutOfRange(FileId),
    #[error("{0} must not be zero")]
    ZeroInterval(&'static str),
    #[error("remote button {index} maps to {digit}, which is not a single digit")]
    RemoteDigit { index: usize, digit: u8 },
    #[error("remote letter {0:?} is used more than once")]
    DuplicateRemoteLetter(char),
}
