use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{Config, NUMBER_LENGTH};
use crate::directory::{FileId, Slot};
use crate::events::{Inputs, RemoteButton};

#[cfg_attr(doc, aquamarine::aquamarine)]
/// The phase a [Phone](crate::Phone) is in. Use
/// [Phone::tick](crate::Phone::tick) to move between them.
///
/// ```mermaid
/// stateDiagram-v2
///    [*] --> Idle
///    Idle --> DialTone: off-hook
///    Idle --> IncomingRing: remote code resolves
///    DialTone --> DigitEntry: one command spacing after the tone started
///    DigitEntry --> Connecting: number resolves
///    DigitEntry --> Resetting: on-hook
///    Connecting --> Resetting: on-hook
///    IncomingRing --> Resetting: no answer
///    IncomingRing --> Resetting: on-hook after answering
///    Resetting --> Idle: on-hook confirmed
///    Resetting --> OutOfOrder: module did not come back
///    OutOfOrder --> [*]
/// ```
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallPhase {
    /// Handset resting, waiting for it to be lifted or for a remote code
    Idle,
    /// Dial tone is starting
    DialTone,
    /// Collecting the digits of a number. Also covers the failure jingle of
    /// a number that is not in service.
    DigitEntry,
    /// Outbound call: ringback, the recording, then the completion jingle
    Connecting,
    /// Ringing for a remote code, and the call once answered
    IncomingRing,
    /// Stopping audio and waiting for the handset to be back on-hook
    Resetting,
    /// The sound module stopped answering. Nothing leaves this phase.
    OutOfOrder,
}

/// Digits typed so far.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct KeypadEntryBuffer {
    digits: [u8; NUMBER_LENGTH],
    len: usize,
}

impl KeypadEntryBuffer {
    /// Returns `false` if the buffer was already complete.
    pub fn push(&mut self, digit: u8) -> bool {
        if self.is_complete() {
            return false;
        }
        self.digits[self.len] = digit % 10;
        self.len += 1;
        true
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn fill(&mut self, digits: [u8; NUMBER_LENGTH]) {
        self.digits = digits;
        self.len = NUMBER_LENGTH;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_complete(&self) -> bool {
        self.len == NUMBER_LENGTH
    }

    /// The digits typed so far read as one number.
    pub fn value(&self) -> FileId {
        self.digits[..self.len]
            .iter()
            .fold(0, |value, digit| value * 10 + FileId::from(*digit))
    }

    /// Phone book style, with a dash once the second digit is in:
    /// `1`, `12-`, `12-345`.
    pub fn formatted(&self) -> String {
        let mut out = String::with_capacity(NUMBER_LENGTH + 1);
        for (i, digit) in self.digits[..self.len].iter().enumerate() {
            out.push(char::from(b'0' + digit));
            if i == 1 {
                out.push('-');
            }
        }
        out
    }
}

impl fmt::Display for KeypadEntryBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for digit in &self.digits[..self.len] {
            write!(f, "{}", digit)?;
        }
        Ok(())
    }
}

/// Outcome of one poll while a remote code is being captured.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capture {
    Waiting,
    /// Both presses arrived
    Code(FileId),
    /// The second press never came
    Expired,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CaptureStep {
    AwaitRelease { since: Duration },
    AwaitSecond { since: Duration },
}

/// Combines two remote presses into a two digit code. The first press
/// has to be released (or held past the release bound) before the
/// window for the second one opens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteCodeBuilder {
    first: RemoteButton,
    first_digit: u8,
    step: CaptureStep,
}

impl RemoteCodeBuilder {
    pub fn new(first: RemoteButton, first_digit: u8, now: Duration) -> Self {
        Self {
            first,
            first_digit,
            step: CaptureStep::AwaitRelease { since: now },
        }
    }

    pub fn first(&self) -> RemoteButton {
        self.first
    }

    pub fn step(&mut self, now: Duration, inputs: &Inputs, config: &Config) -> Capture {
        match self.step {
            CaptureStep::AwaitRelease { since } => {
                if !inputs.is_held(self.first)
                    || now.saturating_sub(since) > config.release_wait()
                {
                    self.step = CaptureStep::AwaitSecond { since: now };
                }
                Capture::Waiting
            }
            CaptureStep::AwaitSecond { since } => {
                let second = inputs
                    .remote_press
                    .and_then(|button| config.remote.get(button.0));
                if let Some(second) = second {
                    return Capture::Code(
                        FileId::from(self.first_digit) * 10 + FileId::from(second.digit),
                    );
                }
                if now.saturating_sub(since) > config.second_press_window() {
                    return Capture::Expired;
                }
                Capture::Waiting
            }
        }
    }
}

/// Loops the call finished jingle until the handset goes down.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Tail {
    pub started: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Idle {
    pub since: Duration,
    pub capture: Option<RemoteCodeBuilder>,
    pub screensaver: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Entry {
    Collecting(KeypadEntryBuffer),
    Failed(Tail),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OutboundStep {
    Calling,
    Ringback { since: Option<Duration> },
    Recording { played: bool },
    Finished(Tail),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Outbound {
    pub slot: Slot,
    pub number: String,
    pub step: OutboundStep,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum IncomingStep {
    Ringing,
    Answered { played: bool },
    Finished(Tail),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Incoming {
    pub slot: Slot,
    pub since: Duration,
    pub step: IncomingStep,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ResetStep {
    Stop,
    AwaitOnHook,
    Reinitialize,
    Settle,
}

/// [CallPhase] plus whatever each phase needs to remember between polls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Stage {
    Idle(Idle),
    DialTone { started: bool },
    DigitEntry(Entry),
    Connecting(Outbound),
    IncomingRing(Incoming),
    Resetting(ResetStep),
    OutOfOrder,
}

impl Stage {
    pub fn idle(now: Duration) -> Self {
        Stage::Idle(Idle {
            since: now,
            capture: None,
            screensaver: false,
        })
    }

    pub fn phase(&self) -> CallPhase {
        match self {
            Stage::Idle(_) => CallPhase::Idle,
            Stage::DialTone { .. } => CallPhase::DialTone,
            Stage::DigitEntry(_) => CallPhase::DigitEntry,
            Stage::Connecting(_) => CallPhase::Connecting,
            Stage::IncomingRing(_) => CallPhase::IncomingRing,
            Stage::Resetting(_) => CallPhase::Resetting,
            Stage::OutOfOrder => CallPhase::OutOfOrder,
        }
    }

    /// Putting the handset down ends the stage.
    pub fn needs_handset(&self) -> bool {
        match self {
            Stage::Idle(_) | Stage::Resetting(_) | Stage::OutOfOrder => false,
            Stage::IncomingRing(call) => call.step != IncomingStep::Ringing,
            Stage::DialTone { .. } | Stage::DigitEntry(_) | Stage::Connecting(_) => true,
        }
    }
}

impl Default for Stage {
    fn default() -> Self {
        Stage::idle(Duration::ZERO)
    }
}
