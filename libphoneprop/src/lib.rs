pub mod audio;
pub mod config;
pub mod debounce;
pub mod directory;
pub mod events;
pub mod state;

#[cfg(test)]
mod test_state_machine;

use std::time::Duration;

use thiserror::Error;

use audio::SoundModule;
use config::{Config, ConfigError};
use directory::{DirectoryError, FileId, Slot, TrackDirectory};
use events::{AudioCommand, Command, DisplayCommand, Inputs, Key};
use state::*;

/// Resets the sound module and builds the directory from its listing.
/// Either failure leaves the phone without audio for this session.
pub fn scan_directory<M: SoundModule>(module: &mut M) -> Result<TrackDirectory, Error> {
    module
        .reset()
        .map_err(|e| Error::ModuleUnresponsive(e.to_string()))?;
    let listing = module
        .list_files()
        .map_err(|e| Error::ModuleUnresponsive(e.to_string()))?;
    let directory = TrackDirectory::build(&listing)?;
    for entry in directory.entries() {
        let name = module.file_name(usize::from(entry.slot)).unwrap_or_default();
        tracing::debug!(file_id = entry.file_id, slot = entry.slot, name, "track");
    }
    Ok(directory)
}

/// Slots of the system sounds, `None` if the module doesn't have the file.
#[derive(Clone, Copy, Debug)]
struct Sounds {
    dial_tone: Option<Slot>,
    key_click: Option<Slot>,
    ring_tone: Option<Slot>,
    call_finished: Option<Slot>,
}

impl Sounds {
    fn resolve(config: &Config, directory: &TrackDirectory) -> Self {
        let find = |name: &str, file_id: FileId| {
            let slot = directory.lookup(file_id);
            if slot.is_none() {
                tracing::warn!(sound = name, file_id, "system sound missing, it will stay silent");
            }
            slot
        };
        Self {
            dial_tone: find("dial tone", config.sounds.dial_tone),
            key_click: find("key click", config.sounds.key_click),
            ring_tone: find("ring tone", config.sounds.ring_tone),
            call_finished: find("call finished", config.sounds.call_finished),
        }
    }
}

/// What a stage step decided.
enum Flow {
    /// Stay, with possibly updated stage data
    Continue(Stage),
    /// Move on to the given stage
    Completed(Stage),
    /// The handset went back on-hook
    Cancelled,
}

/// The call state machine.
///
/// Call [tick](Phone::tick) once per poll cycle with the current time and
/// inputs and carry out the returned commands in order. Nothing here blocks
/// or reads a clock: every wait is a stage that checks elapsed time against
/// a timestamp captured when it began.
///
/// Audio commands are kept at least
/// [command_spacing](Config::command_spacing) apart, display commands are
/// not held back.
#[derive(Debug)]
pub struct Phone {
    config: Config,
    directory: TrackDirectory,
    sounds: Sounds,
    stage: Stage,
    quiet_until: Duration,
    commands: Vec<Command>,
}

impl Phone {
    pub fn new(config: Config, directory: TrackDirectory) -> Self {
        let sounds = Sounds::resolve(&config, &directory);
        let mut phone = Self {
            sounds,
            stage: Stage::default(),
            quiet_until: Duration::ZERO,
            commands: Vec::with_capacity(4),
            config,
            directory,
        };
        phone.backlight(phone.config.backlight_full);
        phone.show("Phone ready", format!("{} tracks", phone.directory.len()));
        phone
    }

    pub fn phase(&self) -> CallPhase {
        self.stage.phase()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn directory(&self) -> &TrackDirectory {
        &self.directory
    }

    pub fn tick(&mut self, now: Duration, inputs: &Inputs) -> Vec<Command> {
        let stage = std::mem::take(&mut self.stage);
        let from = stage.phase();
        let flow = if stage.needs_handset() && !inputs.off_hook {
            Flow::Cancelled
        } else {
            self.step(stage, now, inputs)
        };
        match flow {
            Flow::Continue(stage) => self.stage = stage,
            Flow::Completed(next) => self.enter(from, next),
            Flow::Cancelled => {
                tracing::info!(phase = ?from, "handset replaced");
                self.show("Call ended", "");
                self.enter(from, Stage::Resetting(ResetStep::Stop));
            }
        }
        std::mem::take(&mut self.commands)
    }

    /// The last [AudioCommand::Play] was not accepted by the module.
    ///
    /// Loops (ring tone, jingle) retry on their own and key clicks don't
    /// matter. A failed dial tone, ringback or recording ends the call the
    /// same way a number that is not in service does.
    pub fn playback_rejected(&mut self) -> Vec<Command> {
        let stage = std::mem::take(&mut self.stage);
        let from = stage.phase();
        let failed = Stage::DigitEntry(Entry::Failed(Tail::default()));
        match stage {
            Stage::DialTone { .. } => {
                self.show("Call failed", "No dial tone");
                self.enter(from, failed);
            }
            Stage::Connecting(mut call)
                if matches!(
                    call.step,
                    OutboundStep::Ringback { .. } | OutboundStep::Recording { .. }
                ) =>
            {
                tracing::warn!(slot = call.slot, "outbound call failed");
                self.show("Call failed", call.number.as_str());
                call.step = OutboundStep::Finished(Tail::default());
                self.stage = Stage::Connecting(call);
            }
            Stage::IncomingRing(mut call) if matches!(call.step, IncomingStep::Answered { .. }) => {
                tracing::warn!(slot = call.slot, "incoming call failed");
                self.show("Call failed", "");
                call.step = IncomingStep::Finished(Tail::default());
                self.stage = Stage::IncomingRing(call);
            }
            other => self.stage = other,
        }
        std::mem::take(&mut self.commands)
    }

    /// The sound module did not come back from
    /// [AudioCommand::Reinitialize]. The phone says so and stops taking
    /// calls.
    pub fn module_lost(&mut self) -> Vec<Command> {
        let from = self.stage.phase();
        tracing::error!(phase = ?from, "sound module lost");
        self.show("Out of order", "No sound board");
        self.enter(from, Stage::OutOfOrder);
        std::mem::take(&mut self.commands)
    }

    fn enter(&mut self, from: CallPhase, next: Stage) {
        let to = next.phase();
        if from != to {
            tracing::info!(?from, ?to, "call phase changed");
        }
        self.stage = next;
    }

    fn step(&mut self, stage: Stage, now: Duration, inputs: &Inputs) -> Flow {
        match stage {
            Stage::Idle(idle) => self.idle(idle, now, inputs),
            Stage::DialTone { started } => self.dial_tone(started, now, inputs),
            Stage::DigitEntry(entry) => self.digit_entry(entry, now, inputs),
            Stage::Connecting(call) => self.connecting(call, now, inputs),
            Stage::IncomingRing(call) => self.incoming(call, now, inputs),
            Stage::Resetting(step) => self.resetting(step, now, inputs),
            Stage::OutOfOrder => Flow::Continue(Stage::OutOfOrder),
        }
    }

    fn idle(&mut self, mut idle: Idle, now: Duration, inputs: &Inputs) -> Flow {
        if inputs.off_hook {
            self.wake(&mut idle);
            return Flow::Completed(Stage::DialTone { started: false });
        }

        match idle.capture.take() {
            None => {
                let first = inputs
                    .remote_press
                    .and_then(|button| Some((button, *self.config.remote.get(button.0)?)));
                if let Some((button, key)) = first {
                    self.wake(&mut idle);
                    tracing::debug!(?button, letter = %key.letter, "remote code started");
                    self.show("Remote code", key.letter.to_string());
                    idle.capture = Some(RemoteCodeBuilder::new(button, key.digit, now));
                }
            }
            Some(mut capture) => match capture.step(now, inputs, &self.config) {
                Capture::Waiting => idle.capture = Some(capture),
                Capture::Code(code) => match self.directory.lookup(code) {
                    Some(slot) => {
                        tracing::info!(code, slot, "incoming call");
                        self.show("Incoming call", format!("{:02}", code));
                        return Flow::Completed(Stage::IncomingRing(Incoming {
                            slot,
                            since: now,
                            step: IncomingStep::Ringing,
                        }));
                    }
                    None => {
                        tracing::info!(code, "no recording for remote code");
                        self.show("No call", format!("{:02}", code));
                        idle.since = now;
                    }
                },
                Capture::Expired => {
                    tracing::debug!("remote code timed out");
                    self.show("No call", "");
                    idle.since = now;
                }
            },
        }

        if idle.capture.is_none()
            && !idle.screensaver
            && now.saturating_sub(idle.since) >= self.config.idle_timeout()
        {
            idle.screensaver = true;
            self.backlight(self.config.backlight_dim);
            self.commands.push(Command::Screensaver(true));
        }
        Flow::Continue(Stage::Idle(idle))
    }

    fn dial_tone(&mut self, started: bool, now: Duration, inputs: &Inputs) -> Flow {
        if inputs.key.is_some() {
            let entry = Entry::Collecting(KeypadEntryBuffer::default());
            return match self.digit_entry(entry, now, inputs) {
                Flow::Continue(stage) => Flow::Completed(stage),
                flow => flow,
            };
        }
        if !started {
            if self.play_sound(now, self.sounds.dial_tone) {
                self.show("Enter number", "");
                return Flow::Continue(Stage::DialTone { started: true });
            }
            return Flow::Continue(Stage::DialTone { started: false });
        }
        if self.settled(now) {
            return Flow::Completed(Stage::DigitEntry(Entry::Collecting(
                KeypadEntryBuffer::default(),
            )));
        }
        Flow::Continue(Stage::DialTone { started: true })
    }

    fn digit_entry(&mut self, entry: Entry, now: Duration, inputs: &Inputs) -> Flow {
        let mut buffer = match entry {
            Entry::Collecting(buffer) => buffer,
            Entry::Failed(tail) => {
                let tail = self.jingle_loop(tail, now, inputs);
                return Flow::Continue(Stage::DigitEntry(Entry::Failed(tail)));
            }
        };
        let Some(key) = inputs.key else {
            // dial tone keeps going until the first digit
            if buffer.is_empty() && self.settled(now) && !inputs.playing {
                self.play_sound(now, self.sounds.dial_tone);
            }
            return Flow::Continue(Stage::DigitEntry(Entry::Collecting(buffer)));
        };

        match key {
            Key::Digit(digit) => {
                buffer.push(digit);
            }
            Key::Hash => buffer.clear(),
            Key::Star => buffer.fill(self.config.shortcut_digits()),
        }
        self.play_sound(now, self.sounds.key_click);
        tracing::debug!(?key, number = %buffer, "keypad entry");
        self.show("Dialing", buffer.formatted());

        if !buffer.is_complete() {
            return Flow::Continue(Stage::DigitEntry(Entry::Collecting(buffer)));
        }
        let number = buffer.value();
        match self.directory.lookup(number) {
            Some(slot) => {
                tracing::info!(number, slot, "dialed number resolved");
                Flow::Completed(Stage::Connecting(Outbound {
                    slot,
                    number: buffer.formatted(),
                    step: OutboundStep::Calling,
                }))
            }
            None => {
                tracing::info!(number, "dialed number not in service");
                self.show("Not in service", buffer.formatted());
                Flow::Continue(Stage::DigitEntry(Entry::Failed(Tail::default())))
            }
        }
    }

    fn connecting(&mut self, mut call: Outbound, now: Duration, inputs: &Inputs) -> Flow {
        call.step = match call.step {
            OutboundStep::Calling => {
                if self.audio(now, AudioCommand::Stop) {
                    self.show("Calling", call.number.as_str());
                    OutboundStep::Ringback { since: None }
                } else {
                    OutboundStep::Calling
                }
            }
            OutboundStep::Ringback { since: None } => {
                if self.play_sound(now, self.sounds.ring_tone) {
                    OutboundStep::Ringback { since: Some(now) }
                } else {
                    OutboundStep::Ringback { since: None }
                }
            }
            OutboundStep::Ringback { since: Some(since) } => {
                if now.saturating_sub(since) >= self.config.ringback()
                    && self.audio(now, AudioCommand::Stop)
                {
                    self.show("Connected", call.number.as_str());
                    OutboundStep::Recording { played: false }
                } else {
                    OutboundStep::Ringback { since: Some(since) }
                }
            }
            OutboundStep::Recording { played: false } => OutboundStep::Recording {
                played: self.audio(now, AudioCommand::Play(call.slot)),
            },
            OutboundStep::Recording { played: true } => {
                if self.settled(now) && !inputs.playing {
                    tracing::info!(slot = call.slot, "recording finished");
                    OutboundStep::Finished(Tail::default())
                } else {
                    OutboundStep::Recording { played: true }
                }
            }
            OutboundStep::Finished(tail) => OutboundStep::Finished(self.jingle_loop(tail, now, inputs)),
        };
        Flow::Continue(Stage::Connecting(call))
    }

    fn incoming(&mut self, mut call: Incoming, now: Duration, inputs: &Inputs) -> Flow {
        call.step = match call.step {
            IncomingStep::Ringing if inputs.off_hook => {
                if self.audio(now, AudioCommand::Stop) {
                    tracing::info!(slot = call.slot, "incoming call answered");
                    self.show("Connected", "");
                    IncomingStep::Answered { played: false }
                } else {
                    IncomingStep::Ringing
                }
            }
            IncomingStep::Ringing if now.saturating_sub(call.since) >= self.config.ring_timeout() => {
                if self.audio(now, AudioCommand::Stop) {
                    tracing::info!(slot = call.slot, "incoming call not answered");
                    self.show("No answer", "");
                    return Flow::Completed(Stage::Resetting(ResetStep::Stop));
                }
                IncomingStep::Ringing
            }
            IncomingStep::Ringing => {
                if self.settled(now) && !inputs.playing {
                    self.play_sound(now, self.sounds.ring_tone);
                }
                IncomingStep::Ringing
            }
            IncomingStep::Answered { played: false } => IncomingStep::Answered {
                played: self.audio(now, AudioCommand::Play(call.slot)),
            },
            IncomingStep::Answered { played: true } => {
                if self.settled(now) && !inputs.playing {
                    tracing::info!(slot = call.slot, "recording finished");
                    IncomingStep::Finished(Tail::default())
                } else {
                    IncomingStep::Answered { played: true }
                }
            }
            IncomingStep::Finished(tail) => IncomingStep::Finished(self.jingle_loop(tail, now, inputs)),
        };
        Flow::Continue(Stage::IncomingRing(call))
    }

    fn resetting(&mut self, step: ResetStep, now: Duration, inputs: &Inputs) -> Flow {
        let next = match step {
            ResetStep::Stop if self.audio(now, AudioCommand::Stop) => ResetStep::AwaitOnHook,
            ResetStep::AwaitOnHook if !inputs.off_hook => ResetStep::Reinitialize,
            ResetStep::Reinitialize if self.audio(now, AudioCommand::Reinitialize) => ResetStep::Settle,
            ResetStep::Settle if self.settled(now) => return Flow::Completed(Stage::idle(now)),
            step => step,
        };
        Flow::Continue(Stage::Resetting(next))
    }

    /// Plays the completion jingle, and again whenever it has stopped.
    fn jingle_loop(&mut self, mut tail: Tail, now: Duration, inputs: &Inputs) -> Tail {
        if self.settled(now)
            && (!tail.started || !inputs.playing)
            && self.play_sound(now, self.sounds.call_finished)
        {
            tail.started = true;
        }
        tail
    }

    fn wake(&mut self, idle: &mut Idle) {
        if idle.screensaver {
            idle.screensaver = false;
            self.commands.push(Command::Screensaver(false));
            self.backlight(self.config.backlight_full);
        }
    }

    fn settled(&self, now: Duration) -> bool {
        now >= self.quiet_until
    }

    /// Queues an audio command unless the previous one is too recent.
    fn audio(&mut self, now: Duration, command: AudioCommand) -> bool {
        if !self.settled(now) {
            return false;
        }
        self.quiet_until = now + self.config.command_spacing();
        self.commands.push(Command::Audio(command));
        true
    }

    /// Like [audio](Self::audio) for a system sound. A missing sound counts
    /// as played.
    fn play_sound(&mut self, now: Duration, sound: Option<Slot>) -> bool {
        match sound {
            Some(slot) => self.audio(now, AudioCommand::Play(slot)),
            None => true,
        }
    }

    fn show(&mut self, top: impl Into<String>, bottom: impl Into<String>) {
        self.commands.push(Command::show(top, bottom));
    }

    fn backlight(&mut self, level: u8) {
        self.commands.push(Command::Display(DisplayCommand::Backlight(level)));
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("sound module is not responding: {0}")]
    ModuleUnresponsive(String),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
