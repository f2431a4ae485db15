use std::thread::sleep;
use std::time::Duration;

use libphoneprop::events::DisplayCommand;
use rppal::i2c::I2c;

pub const COLUMNS: usize = 16;

// PCF8574 to HD44780 wiring, data on the high nibble
const RS: u8 = 0x01;
const EN: u8 = 0x04;
const BACKLIGHT: u8 = 0x08;

const CLEAR: u8 = 0x01;
const ENTRY_LEFT: u8 = 0x06;
const DISPLAY_ON: u8 = 0x0C;
const FOUR_BIT_TWO_LINES: u8 = 0x28;
const SET_ADDRESS: u8 = 0x80;
const SECOND_LINE: u8 = 0x40;

/// 16x2 character LCD behind a PCF8574 I2C backpack.
pub struct Lcd {
    i2c: I2c,
    backlight: bool,
}

impl Lcd {
    pub fn open(address: u16) -> Result<Self, rppal::i2c::Error> {
        let mut i2c = I2c::new()?;
        i2c.set_slave_address(address)?;
        let mut lcd = Self {
            i2c,
            backlight: true,
        };
        lcd.init()?;
        Ok(lcd)
    }

    fn init(&mut self) -> Result<(), rppal::i2c::Error> {
        sleep(Duration::from_millis(50));
        // three times 8 bit mode, then 4 bit mode, from whatever state it was in
        for _ in 0..3 {
            self.pulse(0x30)?;
            sleep(Duration::from_millis(5));
        }
        self.pulse(0x20)?;
        self.instruction(FOUR_BIT_TWO_LINES)?;
        self.instruction(DISPLAY_ON)?;
        self.clear()?;
        self.instruction(ENTRY_LEFT)
    }

    pub fn show(&mut self, top: &str, bottom: &str) -> Result<(), rppal::i2c::Error> {
        self.instruction(SET_ADDRESS)?;
        self.text(&line(top))?;
        self.instruction(SET_ADDRESS | SECOND_LINE)?;
        self.text(&line(bottom))
    }

    pub fn clear(&mut self) -> Result<(), rppal::i2c::Error> {
        self.instruction(CLEAR)?;
        sleep(Duration::from_millis(2));
        Ok(())
    }

    /// The backpack only switches the backlight, any level above zero is on.
    pub fn set_backlight(&mut self, level: u8) -> Result<(), rppal::i2c::Error> {
        self.backlight = level > 0;
        self.i2c.write(&[self.backlight_bit()])?;
        Ok(())
    }

    fn backlight_bit(&self) -> u8 {
        if self.backlight {
            BACKLIGHT
        } else {
            0
        }
    }

    fn instruction(&mut self, value: u8) -> Result<(), rppal::i2c::Error> {
        self.send(value, 0)
    }

    fn text(&mut self, text: &str) -> Result<(), rppal::i2c::Error> {
        text.bytes().try_for_each(|byte| self.send(byte, RS))
    }

    fn send(&mut self, value: u8, mode: u8) -> Result<(), rppal::i2c::Error> {
        self.i2c.write(&frames(value, mode | self.backlight_bit()))?;
        Ok(())
    }

    fn pulse(&mut self, nibble: u8) -> Result<(), rppal::i2c::Error> {
        let bits = nibble | self.backlight_bit();
        self.i2c.write(&[bits | EN, bits & !EN])?;
        Ok(())
    }
}

/// Both nibbles of `value`, each latched with a rising then falling enable.
fn frames(value: u8, flags: u8) -> [u8; 4] {
    let high = (value & 0xF0) | flags;
    let low = ((value << 4) & 0xF0) | flags;
    [high | EN, high, low | EN, low]
}

/// Pads or cuts `text` to one display line. The character ROM only has
/// ASCII where we need it.
fn line(text: &str) -> String {
    let mut line: String = text
        .chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '?' })
        .take(COLUMNS)
        .collect();
    while line.len() < COLUMNS {
        line.push(' ');
    }
    line
}

/// Where display commands end up.
pub enum Display {
    Lcd(Lcd),
    /// No LCD attached, requests are only logged.
    Log,
}

impl Display {
    pub fn open(address: Option<u16>) -> Self {
        let Some(address) = address else {
            return Display::Log;
        };
        match Lcd::open(address) {
            Ok(lcd) => Display::Lcd(lcd),
            Err(error) => {
                tracing::warn!(address, %error, "no LCD, display requests will only be logged");
                Display::Log
            }
        }
    }

    pub fn execute(&mut self, command: &DisplayCommand) {
        tracing::debug!(?command, "display");
        let Display::Lcd(lcd) = self else {
            return;
        };
        let result = match command {
            DisplayCommand::Show { top, bottom } => lcd.show(top, bottom),
            DisplayCommand::Clear => lcd.clear(),
            DisplayCommand::Backlight(level) => lcd.set_backlight(*level),
        };
        if let Err(error) = result {
            tracing::warn!(%error, "LCD write failed");
        }
    }

    /// The screensaver of a character LCD is a blank screen.
    pub fn screensaver(&mut self, on: bool) {
        tracing::debug!(on, "screensaver");
        if on {
            self.execute(&DisplayCommand::Clear);
        }
    }

    pub fn off(&mut self) {
        self.execute(&DisplayCommand::Clear);
        self.execute(&DisplayCommand::Backlight(0));
    }
}
