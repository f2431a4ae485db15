use std::path::Path;
use std::thread::sleep;
use std::time::{Duration, Instant};

use embedded_hal::digital::OutputPin;
use libphoneprop::audio::SoundModule;
use libphoneprop::directory::Slot;
use rppal::uart::{Parity, Queue, Uart};
use thiserror::Error;

/// Printed by the board when it comes out of reset.
const BANNER: &str = "Sound Board";
const LINE_TIMEOUT: Duration = Duration::from_millis(500);
const RESET_PULSE: Duration = Duration::from_millis(10);
const RESET_TIMEOUT: Duration = Duration::from_secs(3);

/// Byte transport to the board.
pub trait Link {
    type Error: std::error::Error + 'static;

    fn send(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;
    /// Whatever arrived before the link's read timeout, `0` if nothing did.
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
    fn discard_input(&mut self) -> Result<(), Self::Error>;
}

impl Link for Uart {
    type Error = rppal::uart::Error;

    fn send(&mut self, mut bytes: &[u8]) -> Result<(), Self::Error> {
        while !bytes.is_empty() {
            let written = self.write(bytes)?;
            bytes = &bytes[written..];
        }
        self.drain()
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.read(buf)
    }

    fn discard_input(&mut self) -> Result<(), Self::Error> {
        self.flush(Queue::Input)
    }
}

pub fn open_uart(path: &Path, baud: u32) -> Result<Uart, rppal::uart::Error> {
    let mut uart = Uart::with_path(path, baud, Parity::None, 8, 1)?;
    uart.set_read_mode(0, LINE_TIMEOUT)?;
    uart.set_write_mode(true)?;
    Ok(uart)
}

#[derive(Debug, Error)]
pub enum SoundBoardError<E: std::error::Error + 'static> {
    #[error("serial link to the sound board failed")]
    Link(#[from] E),
    #[error("sound board did not announce itself after reset")]
    NoBanner,
    #[error("sound board did not answer")]
    NoAnswer,
    #[error("sound board answered {0:?}")]
    Rejected(String),
}

/// Serial sound board speaking the line based protocol: `L` lists files,
/// `#n` plays slot `n`, `q` stops and `+` raises the volume.
pub struct SoundBoard<L, R> {
    link: L,
    reset: R,
    files: Vec<String>,
    pending: Vec<u8>,
    reset_timeout: Duration,
}

impl<L: Link, R: OutputPin> SoundBoard<L, R> {
    pub fn new(link: L, mut reset: R) -> Self {
        let _ = reset.set_high();
        Self {
            link,
            reset,
            files: Vec::new(),
            pending: Vec::with_capacity(64),
            reset_timeout: RESET_TIMEOUT,
        }
    }

    /// How long [reset](SoundModule::reset) waits for the banner. The poll
    /// loop stalls for that long when a reset mid-session fails.
    pub fn set_reset_timeout(&mut self, timeout: Duration) {
        self.reset_timeout = timeout;
    }

    /// The next line, without its line ending. `None` once the link has
    /// been quiet for a whole read timeout.
    fn read_line(&mut self) -> Result<Option<String>, SoundBoardError<L::Error>> {
        loop {
            if let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = self.pending.drain(..=end).collect();
                return Ok(Some(decode(&line)));
            }
            let mut buf = [0u8; 64];
            let received = self.link.receive(&mut buf)?;
            if received == 0 {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                let line: Vec<u8> = self.pending.drain(..).collect();
                return Ok(Some(decode(&line)));
            }
            self.pending.extend_from_slice(&buf[..received]);
        }
    }

    fn command(&mut self, command: &str) -> Result<String, SoundBoardError<L::Error>> {
        self.pending.clear();
        self.link.discard_input()?;
        self.link.send(command.as_bytes())?;
        while let Some(line) = self.read_line()? {
            if !line.trim().is_empty() {
                tracing::trace!(command = command.trim_end(), %line, "sound board answered");
                return Ok(line);
            }
        }
        Err(SoundBoardError::NoAnswer)
    }
}

impl<L: Link, R: OutputPin> SoundModule for SoundBoard<L, R> {
    type Error = SoundBoardError<L::Error>;

    fn reset(&mut self) -> Result<(), Self::Error> {
        let _ = self.reset.set_low();
        sleep(RESET_PULSE);
        let _ = self.reset.set_high();
        self.pending.clear();

        let deadline = Instant::now() + self.reset_timeout;
        while Instant::now() < deadline {
            let Some(line) = self.read_line()? else {
                continue;
            };
            if line.contains(BANNER) {
                tracing::info!(banner = %line.trim(), "sound board ready");
                // version and card details follow the banner
                while self.read_line()?.is_some() {}
                return Ok(());
            }
        }
        Err(SoundBoardError::NoBanner)
    }

    fn list_files(&mut self) -> Result<Vec<String>, Self::Error> {
        self.pending.clear();
        self.link.discard_input()?;
        self.link.send(b"L\n")?;
        let mut files = Vec::new();
        while let Some(line) = self.read_line()? {
            if let Some(name) = listed_name(&line) {
                files.push(name);
            }
        }
        tracing::debug!(files = files.len(), "sound board listing");
        self.files = files.clone();
        Ok(files)
    }

    fn file_name(&self, index: usize) -> Option<&str> {
        self.files.get(index).map(String::as_str)
    }

    fn play(&mut self, slot: Slot) -> Result<(), Self::Error> {
        let answer = self.command(&format!("#{}\n", slot))?;
        if answer.starts_with("play") {
            Ok(())
        } else {
            Err(SoundBoardError::Rejected(answer))
        }
    }

    fn stop(&mut self) -> Result<(), Self::Error> {
        let answer = self.command("q\n")?;
        if answer.contains("done") {
            Ok(())
        } else {
            Err(SoundBoardError::Rejected(answer))
        }
    }

    fn volume_up(&mut self) -> Result<u8, Self::Error> {
        let answer = self.command("+\n")?;
        answer
            .trim()
            .parse()
            .map_err(|_| SoundBoardError::Rejected(answer))
    }
}

fn decode(line: &[u8]) -> String {
    String::from_utf8_lossy(line)
        .trim_end_matches(|c| c == '\r' || c == '\n')
        .to_string()
}

/// Listing lines are a space padded 8.3 name, a tab and the size.
fn listed_name(line: &str) -> Option<String> {
    let name = line.split('\t').next()?.trim_end();
    if name.trim().is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
