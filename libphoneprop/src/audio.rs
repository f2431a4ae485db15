use embedded_hal::digital::InputPin;

use crate::directory::Slot;
use crate::events::AudioCommand;

/// A sound module that plays files from its own storage by slot number.
///
/// Commands are not spaced out here. The module drops or garbles commands
/// that follow each other too closely, keeping them apart is up to the
/// caller.
pub trait SoundModule {
    type Error: std::error::Error;

    fn reset(&mut self) -> Result<(), Self::Error>;
    /// File names in slot order.
    fn list_files(&mut self) -> Result<Vec<String>, Self::Error>;
    fn file_name(&self, index: usize) -> Option<&str>;
    fn play(&mut self, slot: Slot) -> Result<(), Self::Error>;
    fn stop(&mut self) -> Result<(), Self::Error>;
    /// Returns the new volume.
    fn volume_up(&mut self) -> Result<u8, Self::Error>;
}

/// The only way commands reach the sound module once the phone is running.
pub struct AudioGateway<M, A> {
    module: M,
    /// Low while the module plays
    activity: A,
}

impl<M: SoundModule, A: InputPin> AudioGateway<M, A> {
    pub fn new(module: M, activity: A) -> Self {
        Self { module, activity }
    }

    /// `false` if the module refused the slot or did not answer.
    pub fn play(&mut self, slot: Slot) -> bool {
        match self.module.play(slot) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(slot, %error, "sound module rejected play");
                false
            }
        }
    }

    /// Does nothing if the module is idle.
    pub fn stop(&mut self) {
        if !self.is_active() {
            return;
        }
        if let Err(error) = self.module.stop() {
            tracing::warn!(%error, "sound module did not confirm stop");
        }
    }

    pub fn is_active(&mut self) -> bool {
        self.activity.is_low().unwrap_or(false)
    }

    pub fn reinitialize(&mut self) -> bool {
        match self.module.reset() {
            Ok(()) => true,
            Err(error) => {
                tracing::error!(%error, "sound module did not come back from reset");
                false
            }
        }
    }

    /// Carry out one command. `false` if a play was rejected or the module
    /// did not come back from a reset.
    pub fn execute(&mut self, command: AudioCommand) -> bool {
        match command {
            AudioCommand::Play(slot) => self.play(slot),
            AudioCommand::Stop => {
                self.stop();
                true
            }
            AudioCommand::Reinitialize => self.reinitialize(),
        }
    }

    pub fn module(&self) -> &M {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut M {
        &mut self.module
    }
}
