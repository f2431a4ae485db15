use std::collections::VecDeque;
use std::time::{Duration, Instant};

use color_eyre::eyre::{eyre, WrapErr};
use libphoneprop::audio::{AudioGateway, SoundModule};
use libphoneprop::debounce::{InputReader, MatrixKeypad};
use libphoneprop::events::{AudioCommand, Command, DisplayCommand};
use libphoneprop::Phone;
use rppal::gpio::{self, Gpio};
use rppal::uart::Uart;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::prelude::*;

use lcd::Display;
use settings::{HardwareConfig, Settings};
use soundboard::SoundBoard;

mod lcd;
mod settings;
mod soundboard;

type Gateway = AudioGateway<SoundBoard<Uart, gpio::OutputPin>, gpio::InputPin>;
type Reader = InputReader<gpio::InputPin, gpio::InputPin, MatrixKeypad<gpio::OutputPin, gpio::InputPin>>;

#[tokio::main(flavor = "current_thread")]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("phoneprop=debug".parse()?)
                .add_directive("libphoneprop=debug".parse()?),
        )
        .init();

    let settings = Settings::load().wrap_err("invalid configuration")?;
    let hardware = &settings.hardware;
    let mut display = Display::open(hardware.lcd_address);

    let gpio = Gpio::new().wrap_err("no GPIO access")?;
    let reset = gpio.get(hardware.reset)?.into_output_high();
    let uart = soundboard::open_uart(&hardware.uart, hardware.baud)
        .wrap_err_with(|| format!("cannot open {}", hardware.uart.display()))?;
    let mut board = SoundBoard::new(uart, reset);

    let directory = match libphoneprop::scan_directory(&mut board) {
        Ok(directory) => directory,
        Err(error) => {
            tracing::error!(%error, "cannot start the phone");
            let bottom = match error {
                libphoneprop::Error::Directory(_) => "No tracks",
                _ => "No sound board",
            };
            display.execute(&DisplayCommand::Show {
                top: "Out of order".into(),
                bottom: bottom.into(),
            });
            // keep the message up until someone looks at it
            tokio::signal::ctrl_c().await?;
            return Err(error).wrap_err("sound module unusable");
        }
    };
    for _ in 0..hardware.volume_steps {
        match board.volume_up() {
            Ok(volume) => tracing::debug!(volume, "volume raised"),
            Err(error) => tracing::warn!(%error, "volume not raised"),
        }
    }

    board.set_reset_timeout(Duration::from_millis(hardware.reinit_timeout_ms));

    let activity = gpio.get(hardware.activity)?.into_input();
    let mut gateway = AudioGateway::new(board, activity);
    let mut reader = input_reader(&gpio, hardware, settings.phone.debounce())?;
    let mut phone = Phone::new(settings.phone.clone(), directory);
    let poll_period = Duration::from_millis(1000 / hardware.poll_hz.max(1));

    let cancellation_token = CancellationToken::new();

    tokio::join!(
        async {
            let start = Instant::now();
            let mut interval = tokio::time::interval(poll_period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancellation_token.cancelled() => break,
                    _ = interval.tick() => {}
                }
                let now = start.elapsed();
                let inputs = reader.poll(now, gateway.is_active());
                let commands = phone.tick(now, &inputs);
                execute(commands, &mut phone, &mut gateway, &mut display);
            }
        },
        async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                tracing::error!(%error, "cannot wait for ctrl-c");
            }
            tracing::info!("stopping");
            cancellation_token.cancel();
        },
    );

    gateway.stop();
    display.off();
    Ok(())
}

/// Carries out commands in order. A rejected play or a failed reset is
/// reported back and the phone's reaction runs right after.
fn execute(commands: Vec<Command>, phone: &mut Phone, gateway: &mut Gateway, display: &mut Display) {
    let mut queue = VecDeque::from(commands);
    while let Some(command) = queue.pop_front() {
        match command {
            Command::Display(command) => display.execute(&command),
            Command::Screensaver(on) => display.screensaver(on),
            Command::Audio(command) => {
                if gateway.execute(command) {
                    continue;
                }
                match command {
                    AudioCommand::Play(_) => queue.extend(phone.playback_rejected()),
                    AudioCommand::Reinitialize => queue.extend(phone.module_lost()),
                    AudioCommand::Stop => {}
                }
            }
        }
    }
}

fn input_reader(gpio: &Gpio, hardware: &HardwareConfig, debounce: Duration) -> color_eyre::Result<Reader> {
    let input = |pin: u8| gpio.get(pin).map(|pin| pin.into_input_pullup());
    let output = |pin: u8| gpio.get(pin).map(|pin| pin.into_output_high());

    let hook = input(hardware.hook)?;
    let buttons = pins(hardware.remote, input)?;
    let rows = pins(hardware.keypad_rows, output)?;
    let cols = pins(hardware.keypad_cols, input)?;
    Ok(InputReader::new(hook, buttons, MatrixKeypad::new(rows, cols), debounce))
}

fn pins<T, const N: usize>(
    numbers: [u8; N],
    open: impl Fn(u8) -> Result<T, gpio::Error>,
) -> color_eyre::Result<[T; N]> {
    let pins = numbers
        .into_iter()
        .map(&open)
        .collect::<Result<Vec<_>, _>>()?;
    pins.try_into().map_err(|_| eyre!("expected {} pins", N))
}
