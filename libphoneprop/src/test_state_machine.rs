use std::time::Duration;

use proptest::prelude::*;

use crate::directory::*;
use crate::events::*;
use crate::state::*;
use crate::*;

const TICK: Duration = Duration::from_millis(10);

// slots of the files in LISTING
const DIAL_TONE: Slot = 0;
const KEY_CLICK: Slot = 1;
const RING_TONE: Slot = 2;
const JINGLE: Slot = 3;
const CODE_12: Slot = 4;
const NUMBER_12345: Slot = 5;
const SHORTCUT: Slot = 6;

const LISTING: [&str; 7] = [
    "1.WAV",
    "2.WAV",
    "3.OGG",
    "4.OGG",
    "12.OGG",
    "12345.OGG",
    "47110.OGG",
];

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

fn length(slot: Slot) -> Duration {
    match slot {
        DIAL_TONE => ms(3_000),
        KEY_CLICK => ms(100),
        RING_TONE => ms(2_000),
        JINGLE => ms(1_000),
        _ => ms(5_000),
    }
}

/// Drives a [Phone] with a virtual clock and a sound module that plays
/// every slot for a fixed [length].
struct Sim {
    phone: Phone,
    now: Duration,
    off_hook: bool,
    held: [bool; REMOTE_BUTTONS],
    playing: Option<Duration>,
    rejects: Vec<Slot>,
    /// The module never comes back from a reset
    dead_after_reset: bool,
    played: Vec<Slot>,
    audio: Vec<(Duration, AudioCommand)>,
    shown: Vec<String>,
    commands: Vec<Command>,
}

impl Sim {
    fn new() -> Self {
        let directory = TrackDirectory::build(LISTING).expect("directory didn't build");
        Self {
            phone: Phone::new(Config::default(), directory),
            now: Duration::ZERO,
            off_hook: false,
            held: [false; REMOTE_BUTTONS],
            playing: None,
            rejects: Vec::new(),
            dead_after_reset: false,
            played: Vec::new(),
            audio: Vec::new(),
            shown: Vec::new(),
            commands: Vec::new(),
        }
    }

    fn phase(&self) -> CallPhase {
        self.phone.phase()
    }

    fn step_with(&mut self, key: Option<Key>, remote_press: Option<usize>) {
        self.now += TICK;
        if matches!(self.playing, Some(end) if self.now >= end) {
            self.playing = None;
        }
        let inputs = Inputs {
            off_hook: self.off_hook,
            remote_press: remote_press.map(RemoteButton),
            remote_held: self.held,
            key,
            playing: self.playing.is_some(),
        };
        let commands = self.phone.tick(self.now, &inputs);
        self.apply(commands);
    }

    fn step(&mut self) {
        self.step_with(None, None);
    }

    fn run(&mut self, duration: Duration) {
        let end = self.now + duration;
        while self.now < end {
            self.step();
        }
    }

    fn apply(&mut self, commands: Vec<Command>) {
        for command in commands {
            self.commands.push(command.clone());
            match command {
                Command::Audio(audio) => {
                    self.audio.push((self.now, audio));
                    match audio {
                        AudioCommand::Play(slot) if self.rejects.contains(&slot) => {
                            let more = self.phone.playback_rejected();
                            self.apply(more);
                        }
                        AudioCommand::Play(slot) => {
                            self.played.push(slot);
                            self.playing = Some(self.now + length(slot));
                        }
                        AudioCommand::Reinitialize if self.dead_after_reset => {
                            self.playing = None;
                            let more = self.phone.module_lost();
                            self.apply(more);
                        }
                        AudioCommand::Stop | AudioCommand::Reinitialize => self.playing = None,
                    }
                }
                Command::Display(DisplayCommand::Show { top, .. }) => self.shown.push(top),
                _ => {}
            }
        }
    }

    fn lift(&mut self) {
        self.off_hook = true;
        self.run(ms(500));
    }

    fn hang_up(&mut self) {
        self.off_hook = false;
        self.step();
    }

    fn key(&mut self, key: Key) {
        self.step_with(Some(key), None);
        self.run(ms(200));
    }

    fn dial(&mut self, digits: &[u8]) {
        for digit in digits {
            self.key(Key::Digit(*digit));
        }
    }

    fn remote(&mut self, button: usize) {
        self.held[button] = true;
        self.step_with(None, Some(button));
        self.run(ms(150));
        self.held[button] = false;
        self.run(ms(300));
    }

    fn plays(&self, slot: Slot) -> usize {
        self.played.iter().filter(|s| **s == slot).count()
    }

    fn saw(&self, top: &str) -> bool {
        self.shown.iter().any(|s| s == top)
    }

    /// No two audio commands closer together than the command spacing.
    fn assert_spacing(&self) {
        let spacing = self.phone.config().command_spacing();
        for pair in self.audio.windows(2) {
            let (before, first) = pair[0];
            let (after, second) = pair[1];
            assert!(
                after - before >= spacing,
                "{:?} at {:?} followed by {:?} at {:?}",
                first,
                before,
                second,
                after
            );
        }
    }
}

#[test]
fn lifting_the_handset_gives_a_dial_tone() {
    let mut sim = Sim::new();
    sim.run(ms(100));
    assert_eq!(sim.phase(), CallPhase::Idle);
    sim.off_hook = true;
    sim.step();
    assert_eq!(sim.phase(), CallPhase::DialTone);
    sim.run(ms(300));
    assert_eq!(sim.phase(), CallPhase::DigitEntry);
    assert_eq!(sim.played, vec![DIAL_TONE]);
}

#[test]
fn dial_tone_loops_until_the_first_digit() {
    let mut sim = Sim::new();
    sim.lift();
    sim.run(ms(7_000));
    assert!(sim.plays(DIAL_TONE) >= 3);
    sim.dial(&[1]);
    let before = sim.plays(DIAL_TONE);
    sim.run(ms(7_000));
    assert_eq!(sim.plays(DIAL_TONE), before);
    sim.assert_spacing();
}

#[test]
fn hanging_up_during_the_recording_skips_the_jingle() {
    let mut sim = Sim::new();
    sim.lift();
    sim.dial(&[1, 2, 3, 4]);
    assert_eq!(sim.phase(), CallPhase::DigitEntry);
    assert!(sim.saw("Dialing"));
    sim.dial(&[5]);
    assert_eq!(sim.phase(), CallPhase::Connecting);
    assert!(sim.saw("Calling"));

    sim.run(ms(5_000));
    assert!(sim.saw("Connected"));
    let ring = sim.played.iter().position(|s| *s == RING_TONE);
    let recording = sim.played.iter().position(|s| *s == NUMBER_12345);
    assert!(ring.is_some() && recording.is_some() && ring < recording);
    assert!(sim.playing.is_some());

    sim.hang_up();
    assert_eq!(sim.phase(), CallPhase::Resetting);
    assert!(sim.saw("Call ended"));
    sim.run(ms(2_000));
    assert_eq!(sim.phase(), CallPhase::Idle);
    assert_eq!(sim.plays(JINGLE), 0);
    assert_eq!(sim.plays(NUMBER_12345), 1);
    sim.assert_spacing();
}

#[test]
fn finished_recording_loops_the_jingle_until_hang_up() {
    let mut sim = Sim::new();
    sim.lift();
    sim.dial(&[1, 2, 3, 4, 5]);
    sim.run(ms(15_000));
    assert_eq!(sim.phase(), CallPhase::Connecting);
    assert_eq!(sim.plays(NUMBER_12345), 1);
    assert!(sim.plays(JINGLE) >= 3);

    sim.hang_up();
    sim.run(ms(2_000));
    assert_eq!(sim.phase(), CallPhase::Idle);
    assert!(sim.playing.is_none());
    sim.assert_spacing();
}

#[test]
fn star_dials_the_shortcut() {
    let mut typed = Sim::new();
    typed.lift();
    typed.dial(&[4, 7, 1, 1, 0]);
    typed.run(ms(5_000));

    let mut shortcut = Sim::new();
    shortcut.lift();
    shortcut.key(Key::Star);
    assert_eq!(shortcut.phase(), CallPhase::Connecting);
    shortcut.run(ms(5_000));

    assert_eq!(typed.plays(SHORTCUT), 1);
    assert_eq!(shortcut.plays(SHORTCUT), 1);
    let tail = |sim: &Sim| -> Vec<AudioCommand> {
        let start = sim
            .audio
            .iter()
            .rposition(|(_, a)| *a == AudioCommand::Play(KEY_CLICK))
            .expect("no key click");
        sim.audio[start..].iter().map(|(_, a)| *a).collect()
    };
    assert_eq!(tail(&typed), tail(&shortcut));
}

#[test]
fn hash_restarts_entry() {
    let mut sim = Sim::new();
    sim.lift();
    sim.dial(&[9, 9, 9]);
    sim.key(Key::Hash);
    sim.dial(&[1, 2, 3, 4, 5]);
    assert_eq!(sim.phase(), CallPhase::Connecting);
    sim.run(ms(5_000));
    assert_eq!(sim.plays(NUMBER_12345), 1);
}

#[test]
fn hanging_up_mid_entry_plays_nothing_more() {
    let mut sim = Sim::new();
    sim.lift();
    sim.dial(&[1, 2]);
    let played = sim.played.len();
    sim.hang_up();
    assert_eq!(sim.phase(), CallPhase::Resetting);
    sim.run(ms(2_000));
    assert_eq!(sim.phase(), CallPhase::Idle);
    assert_eq!(sim.played.len(), played);
}

#[test]
fn unknown_number_loops_the_jingle() {
    let mut sim = Sim::new();
    sim.lift();
    sim.dial(&[9, 9, 9, 9, 9]);
    assert_eq!(sim.phase(), CallPhase::DigitEntry);
    assert!(sim.saw("Not in service"));
    sim.run(ms(4_000));
    assert!(sim.plays(JINGLE) >= 3);
    sim.hang_up();
    sim.run(ms(2_000));
    assert_eq!(sim.phase(), CallPhase::Idle);
    sim.assert_spacing();
}

#[test]
fn remote_code_rings_when_known() {
    let mut sim = Sim::new();
    sim.run(ms(100));
    sim.remote(0);
    assert_eq!(sim.phase(), CallPhase::Idle);
    assert!(sim.saw("Remote code"));
    sim.remote(1);
    assert_eq!(sim.phase(), CallPhase::IncomingRing);
    assert!(sim.saw("Incoming call"));
    sim.run(ms(5_000));
    assert!(sim.plays(RING_TONE) >= 2);
}

#[test]
fn unknown_remote_code_stays_idle() {
    let mut sim = Sim::new();
    sim.remote(2);
    sim.remote(3);
    assert_eq!(sim.phase(), CallPhase::Idle);
    assert!(sim.saw("No call"));
    assert!(sim.played.is_empty());
}

#[test]
fn remote_code_window_expires() {
    let mut sim = Sim::new();
    sim.remote(0);
    sim.run(ms(6_000));
    assert!(sim.saw("No call"));
    sim.remote(1);
    // a lone press starts a new code instead of finishing the old one
    assert_eq!(sim.phase(), CallPhase::Idle);
}

#[test]
fn unanswered_call_gives_up() {
    let mut sim = Sim::new();
    sim.remote(0);
    sim.remote(1);
    assert_eq!(sim.phase(), CallPhase::IncomingRing);
    sim.run(sim.phone.config().ring_timeout() + ms(100));
    assert!(sim.saw("No answer"));
    sim.run(ms(1_000));
    assert_eq!(sim.phase(), CallPhase::Idle);
    assert_eq!(sim.plays(CODE_12), 0);
    sim.assert_spacing();
}

#[test]
fn answered_call_plays_the_recording() {
    let mut sim = Sim::new();
    sim.remote(0);
    sim.remote(1);
    sim.run(ms(3_000));
    sim.off_hook = true;
    sim.run(ms(1_000));
    assert_eq!(sim.phase(), CallPhase::IncomingRing);
    assert!(sim.saw("Connected"));
    assert_eq!(sim.plays(CODE_12), 1);
    sim.run(ms(7_000));
    assert!(sim.plays(JINGLE) >= 1);
    sim.hang_up();
    assert_eq!(sim.phase(), CallPhase::Resetting);
    sim.run(ms(1_000));
    assert_eq!(sim.phase(), CallPhase::Idle);
    sim.assert_spacing();
}

#[test]
fn rejected_recording_ends_in_the_jingle() {
    let mut sim = Sim::new();
    sim.rejects.push(NUMBER_12345);
    sim.lift();
    sim.dial(&[1, 2, 3, 4, 5]);
    sim.run(ms(6_000));
    assert!(sim.saw("Call failed"));
    assert_eq!(sim.phase(), CallPhase::Connecting);
    assert!(sim.plays(JINGLE) >= 1);
    sim.assert_spacing();
}

#[test]
fn rejected_dial_tone_ends_in_the_jingle() {
    let mut sim = Sim::new();
    sim.rejects.push(DIAL_TONE);
    sim.lift();
    assert_eq!(sim.phase(), CallPhase::DigitEntry);
    assert!(sim.saw("Call failed"));
    sim.run(ms(1_000));
    assert!(sim.plays(JINGLE) >= 1);
}

#[test]
fn rejected_ringback_ends_in_the_jingle() {
    let mut sim = Sim::new();
    sim.rejects.push(RING_TONE);
    sim.lift();
    sim.dial(&[1, 2, 3, 4, 5]);
    sim.run(ms(4_000));
    assert!(sim.saw("Call failed"));
    assert_eq!(sim.phase(), CallPhase::Connecting);
    assert!(sim.plays(JINGLE) >= 3);
    assert_eq!(sim.plays(NUMBER_12345), 0);
    sim.hang_up();
    assert_eq!(sim.phase(), CallPhase::Resetting);
    sim.run(ms(2_000));
    assert_eq!(sim.phase(), CallPhase::Idle);
    sim.assert_spacing();
}

#[test]
fn rejected_incoming_recording_ends_in_the_jingle() {
    let mut sim = Sim::new();
    sim.rejects.push(CODE_12);
    sim.remote(0);
    sim.remote(1);
    assert_eq!(sim.phase(), CallPhase::IncomingRing);
    sim.lift();
    assert!(sim.saw("Connected"));
    assert!(sim.saw("Call failed"));
    sim.run(ms(3_000));
    assert_eq!(sim.phase(), CallPhase::IncomingRing);
    assert!(sim.plays(JINGLE) >= 2);
    assert_eq!(sim.plays(CODE_12), 0);
    sim.hang_up();
    assert_eq!(sim.phase(), CallPhase::Resetting);
    sim.run(ms(1_000));
    assert_eq!(sim.phase(), CallPhase::Idle);
    sim.assert_spacing();
}

#[test]
fn key_during_the_dial_tone_start_is_kept() {
    let mut sim = Sim::new();
    sim.off_hook = true;
    sim.step();
    sim.step();
    assert_eq!(sim.phase(), CallPhase::DialTone);
    assert_eq!(sim.played, vec![DIAL_TONE]);
    sim.key(Key::Digit(1));
    assert_eq!(sim.phase(), CallPhase::DigitEntry);
    sim.dial(&[2, 3, 4, 5]);
    assert_eq!(sim.phase(), CallPhase::Connecting);
    sim.run(ms(5_000));
    assert_eq!(sim.plays(NUMBER_12345), 1);
    assert_eq!(sim.plays(DIAL_TONE), 1);
}

#[test]
fn module_lost_in_reset_puts_the_phone_out_of_order() {
    let mut sim = Sim::new();
    sim.dead_after_reset = true;
    sim.lift();
    sim.dial(&[1, 2]);
    sim.hang_up();
    sim.run(ms(1_000));
    assert_eq!(sim.phase(), CallPhase::OutOfOrder);
    assert!(sim.saw("Out of order"));

    let played = sim.played.len();
    let issued = sim.audio.len();
    sim.lift();
    sim.remote(0);
    sim.run(ms(2_000));
    assert_eq!(sim.phase(), CallPhase::OutOfOrder);
    assert_eq!(sim.played.len(), played);
    assert_eq!(sim.audio.len(), issued);
}

#[test]
fn resetting_waits_for_the_handset() {
    let mut sim = Sim::new();
    sim.remote(0);
    sim.remote(1);
    for _ in 0..4_000 {
        if sim.saw("No answer") {
            break;
        }
        sim.step();
    }
    assert_eq!(sim.phase(), CallPhase::Resetting);
    // lifted just as the call gave up
    sim.off_hook = true;
    sim.run(ms(3_000));
    assert_eq!(sim.phase(), CallPhase::Resetting);
    sim.off_hook = false;
    sim.run(ms(1_000));
    assert_eq!(sim.phase(), CallPhase::Idle);
    assert!(sim
        .audio
        .iter()
        .any(|(_, a)| *a == AudioCommand::Reinitialize));
}

#[test]
fn screensaver_takes_over_when_idle() {
    let mut sim = Sim::new();
    sim.run(sim.phone.config().idle_timeout() + ms(100));
    assert_eq!(sim.commands.last(), Some(&Command::Screensaver(true)));
    sim.off_hook = true;
    sim.step();
    let woke = sim
        .commands
        .iter()
        .rposition(|c| *c == Command::Screensaver(false))
        .expect("screensaver not suspended");
    assert_eq!(
        sim.commands[woke + 1],
        Command::Display(DisplayCommand::Backlight(sim.phone.config().backlight_full))
    );
    assert_eq!(sim.phase(), CallPhase::DialTone);
}

#[test]
fn missing_system_sounds_stay_silent() {
    let directory = TrackDirectory::build(["12345.OGG"]).expect("directory didn't build");
    let mut sim = Sim::new();
    sim.phone = Phone::new(Config::default(), directory);
    sim.lift();
    assert_eq!(sim.phase(), CallPhase::DigitEntry);
    sim.dial(&[1, 2, 3, 4, 5]);
    sim.run(ms(5_000));
    assert_eq!(sim.played, vec![0]);
}

fn arb_key() -> impl Strategy<Value = Key> {
    (0usize..4, 0usize..3).prop_map(|(row, col)| Key::LAYOUT[row][col])
}

proptest! {
    #[test]
    fn any_keys_then_hang_up_returns_to_idle(
        keys in prop::collection::vec((arb_key(), 1u64..40), 0..12),
        linger in 0u64..20_000,
    ) {
        let mut sim = Sim::new();
        sim.lift();
        for (key, gap) in keys {
            sim.step_with(Some(key), None);
            sim.run(TICK * gap as u32);
        }
        sim.run(ms(linger));
        sim.hang_up();
        prop_assert_eq!(sim.phase(), CallPhase::Resetting);
        sim.run(ms(1_000));
        prop_assert_eq!(sim.phase(), CallPhase::Idle);
        prop_assert!(sim.playing.is_none());
        sim.assert_spacing();
    }

    #[test]
    fn remote_codes_ring_only_when_recorded(first in 0usize..REMOTE_BUTTONS, second in 0usize..REMOTE_BUTTONS) {
        let mut sim = Sim::new();
        sim.remote(first);
        sim.remote(second);
        let code = (first as FileId + 1) * 10 + second as FileId + 1;
        let expected = if sim.phone.directory().lookup(code).is_some() {
            CallPhase::IncomingRing
        } else {
            CallPhase::Idle
        };
        prop_assert_eq!(sim.phase(), expected);
    }
}
