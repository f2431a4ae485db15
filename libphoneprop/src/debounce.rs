use std::time::Duration;

use embedded_hal::digital::{InputPin, OutputPin};

use crate::events::{Inputs, Key, RemoteButton, REMOTE_BUTTONS};

/// Filters a noisy raw value down to stable changes.
///
/// Every change of the raw value restarts the clock. Once it has held for
/// longer than the interval the new value becomes the stable one and is
/// reported exactly once.
#[derive(Clone, Debug)]
pub struct Debouncer<T> {
    raw: T,
    changed_at: Duration,
    stable: T,
    interval: Duration,
}

impl<T: Copy + PartialEq> Debouncer<T> {
    pub fn new(initial: T, interval: Duration) -> Self {
        Self {
            raw: initial,
            changed_at: Duration::ZERO,
            stable: initial,
            interval,
        }
    }

    pub fn update(&mut self, raw: T, now: Duration) -> Option<T> {
        if raw != self.raw {
            self.raw = raw;
            self.changed_at = now;
            return None;
        }
        if raw != self.stable && now.saturating_sub(self.changed_at) > self.interval {
            self.stable = raw;
            return Some(raw);
        }
        None
    }

    pub fn stable(&self) -> T {
        self.stable
    }
}

/// Raw, undebounced keypad reading.
pub trait KeyScanner {
    fn scan(&mut self) -> Option<Key>;
}

/// A 4x3 keypad matrix. Rows are driven low one at a time, columns are
/// pulled up and read low when the key on the driven row is down.
pub struct MatrixKeypad<R, C> {
    rows: [R; 4],
    cols: [C; 3],
}

impl<R: OutputPin, C: InputPin> MatrixKeypad<R, C> {
    pub fn new(mut rows: [R; 4], cols: [C; 3]) -> Self {
        for row in rows.iter_mut() {
            let _ = row.set_high();
        }
        Self { rows, cols }
    }
}

impl<R: OutputPin, C: InputPin> KeyScanner for MatrixKeypad<R, C> {
    fn scan(&mut self) -> Option<Key> {
        let mut found = None;
        for (r, row) in self.rows.iter_mut().enumerate() {
            let _ = row.set_low();
            for (c, col) in self.cols.iter_mut().enumerate() {
                if found.is_none() && col.is_low().unwrap_or(false) {
                    found = Some(Key::LAYOUT[r][c]);
                }
            }
            let _ = row.set_high();
        }
        found
    }
}

/// Debounced view of the hook switch, the remote buttons and the keypad.
/// All switches are active low. A pin that fails to read counts as
/// released.
pub struct InputReader<H, B, K> {
    hook: H,
    buttons: [B; REMOTE_BUTTONS],
    keypad: K,
    hook_state: Debouncer<bool>,
    button_states: [Debouncer<bool>; REMOTE_BUTTONS],
    key_state: Debouncer<Option<Key>>,
}

impl<H, B, K> InputReader<H, B, K>
where
    H: InputPin,
    B: InputPin,
    K: KeyScanner,
{
    pub fn new(hook: H, buttons: [B; REMOTE_BUTTONS], keypad: K, debounce: Duration) -> Self {
        Self {
            hook,
            buttons,
            keypad,
            hook_state: Debouncer::new(false, debounce),
            button_states: std::array::from_fn(|_| Debouncer::new(false, debounce)),
            key_state: Debouncer::new(None, debounce),
        }
    }

    /// `true` while the handset is lifted.
    pub fn poll_hook(&mut self, now: Duration) -> bool {
        let raw = self.hook.is_low().unwrap_or(false);
        if let Some(off_hook) = self.hook_state.update(raw, now) {
            tracing::debug!(off_hook, "hook switch changed");
        }
        self.hook_state.stable()
    }

    /// The first remote button, in index order, that became stably pressed
    /// during this poll. Buttons that settle in the same poll are not
    /// treated fairly, the lowest index wins and the others are dropped.
    pub fn poll_remote_buttons(&mut self, now: Duration) -> Option<RemoteButton> {
        let mut pressed = None;
        for (index, (pin, state)) in self
            .buttons
            .iter_mut()
            .zip(self.button_states.iter_mut())
            .enumerate()
        {
            let raw = pin.is_low().unwrap_or(false);
            if state.update(raw, now) == Some(true) && pressed.is_none() {
                pressed = Some(RemoteButton(index));
            }
        }
        if let Some(button) = pressed {
            tracing::debug!(?button, "remote button pressed");
        }
        pressed
    }

    pub fn remote_held(&self) -> [bool; REMOTE_BUTTONS] {
        std::array::from_fn(|i| self.button_states[i].stable())
    }

    pub fn poll_keypad(&mut self, now: Duration) -> Option<Key> {
        let raw = self.keypad.scan();
        let key = self.key_state.update(raw, now).flatten();
        if let Some(key) = key {
            tracing::debug!(?key, "key pressed");
        }
        key
    }

    /// Poll everything once. The activity level of the sound module is read
    /// elsewhere and passed through.
    pub fn poll(&mut self, now: Duration, playing: bool) -> Inputs {
        Inputs {
            off_hook: self.poll_hook(now),
            remote_press: self.poll_remote_buttons(now),
            remote_held: self.remote_held(),
            key: self.poll_keypad(now),
            playing,
        }
    }
}
