use serde::{Deserialize, Serialize};

use crate::directory::Slot;

/// Buttons on the keyfob remote.
pub const REMOTE_BUTTONS: usize = 4;

/// A key of the 4x3 keypad.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Digit(u8),
    Star,
    Hash,
}

impl Key {
    /// Keypad layout, row by row as wired.
    pub const LAYOUT: [[Key; 3]; 4] = [
        [Key::Digit(1), Key::Digit(2), Key::Digit(3)],
        [Key::Digit(4), Key::Digit(5), Key::Digit(6)],
        [Key::Digit(7), Key::Digit(8), Key::Digit(9)],
        [Key::Star, Key::Digit(0), Key::Hash],
    ];

    pub fn as_char(&self) -> char {
        match self {
            Key::Digit(d) => char::from(b'0' + d),
            Key::Star => '*',
            Key::Hash => '#',
        }
    }
}

/// Index of a remote button, `0..REMOTE_BUTTONS`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemoteButton(pub usize);

/// Everything the phone sees during one poll cycle. All levels are already
/// debounced, presses are edges that show up in exactly one cycle.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Inputs {
    /// Handset lifted
    pub off_hook: bool,
    /// A remote button that was pressed this cycle. If several were, the
    /// lowest index.
    pub remote_press: Option<RemoteButton>,
    /// Which remote buttons are currently held down
    pub remote_held: [bool; REMOTE_BUTTONS],
    pub key: Option<Key>,
    /// The sound module's activity line reports playback
    pub playing: bool,
}

impl Inputs {
    pub fn is_held(&self, button: RemoteButton) -> bool {
        self.remote_held.get(button.0).copied().unwrap_or(false)
    }
}

/// Side effects requested by [Phone::tick](crate::Phone::tick), to be carried
/// out in order by whoever owns the hardware.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Display(DisplayCommand),
    Audio(AudioCommand),
    /// Hand the display over to the screensaver (`true`) or take it back.
    Screensaver(bool),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum DisplayCommand {
    /// Two lines of at most 16 characters
    Show { top: String, bottom: String },
    Clear,
    Backlight(u8),
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioCommand {
    /// Report a rejected play with
    /// [Phone::playback_rejected](crate::Phone::playback_rejected).
    Play(Slot),
    Stop,
    /// Reset the sound module, ending whatever it was doing. The runner
    /// stalls until the module answers or its reset timeout runs out.
    /// Report a module that stays silent with
    /// [Phone::module_lost](crate::Phone::module_lost).
    Reinitialize,
}

impl Command {
    pub fn show(top: impl Into<String>, bottom: impl Into<String>) -> Self {
        Command::Display(DisplayCommand::Show {
            top: top.into(),
            bottom: bottom.into(),
        })
    }
}
