//! LED bank control.
//!
//! Drives a fixed set of discrete LEDs through `OutputPin`s and dispatches
//! commands received over `LED_CHANNEL`.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embedded_hal::{delay::DelayNs, digital::OutputPin};
use serde::{Deserialize, Serialize};

/// Channel used to receive LED commands (`LEDCommand` messages).
pub static LED_CHANNEL: embassy_sync::channel::Channel<CriticalSectionRawMutex, LEDCommand, 16> =
    embassy_sync::channel::Channel::new();

/// Step of the LED display cycle.
pub const CYCLE_STEP_MS: u32 = 100;

/// LED command variants.
///
/// Serialized as JSON with tag `"lc"`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "lc", rename_all = "snake_case")]
pub enum LEDCommand {
    /// Turn the LEDs on (last mask or all).
    On,
    /// Turn all LEDs off.
    Off,
    /// Light LED i for each set bit i.
    Mask { m: u8 },
    /// Light each LED in turn.
    Cycle,
}

/// `N` LEDs, LED i on pin i.
pub struct LedBank<P, const N: usize> {
    pins: [P; N],
}

impl<P, E, const N: usize> LedBank<P, N>
where
    P: OutputPin<Error = E>,
{
    /// Take the pins and switch every LED off.
    pub fn new(pins: [P; N]) -> Result<Self, E> {
        let mut bank = Self { pins };
        bank.all_off()?;
        Ok(bank)
    }

    pub fn release(self) -> [P; N] {
        self.pins
    }

    /// Bit i of `mask` sets LED i; bits beyond `N` are ignored.
    pub fn set_mask(
        &mut self,
        mask: u8,
    ) -> Result<(), E> {
        for (i, pin) in self.pins.iter_mut().enumerate() {
            let on = i < 8 && mask & (1 << i) != 0;
            pin.set_state(on.into())?;
        }
        Ok(())
    }

    pub fn all_off(&mut self) -> Result<(), E> {
        self.set_mask(0)
    }

    /// Light one LED at a time in pin order, `step_ms` each.
    /// The last LED is left on.
    pub fn cycle<D: DelayNs>(
        &mut self,
        delay: &mut D,
        step_ms: u32,
    ) -> Result<(), E> {
        self.all_off()?;
        for i in 0..N {
            if i > 0 {
                self.pins[i - 1].set_low()?;
            }
            self.pins[i].set_high()?;
            delay.delay_ms(step_ms);
        }
        Ok(())
    }
}

/// High-level LED controller.
///
/// Maintains the on/off state and last selected mask.
pub struct LedModule<P, D, const N: usize> {
    bank: LedBank<P, N>,
    delay: D,
    is_on: bool,
    last_mask: Option<u8>,
}

impl<P, D, E, const N: usize> LedModule<P, D, N>
where
    P: OutputPin<Error = E>,
    D: DelayNs,
{
    pub fn new(
        bank: LedBank<P, N>,
        delay: D,
    ) -> Self {
        Self {
            bank,
            delay,
            is_on: false,
            last_mask: None,
        }
    }

    pub fn is_on(&self) -> bool {
        self.is_on
    }

    /// Execute an incoming `LEDCommand`.
    ///
    /// A mask received while off is remembered and applied by the next `On`.
    pub fn ex_command(
        &mut self,
        cmd: LEDCommand,
    ) -> Result<(), E> {
        match cmd {
            LEDCommand::On => {
                self.is_on = true;
                self.bank.set_mask(self.last_mask.unwrap_or(0xFF))?;
            }
            LEDCommand::Off => {
                self.is_on = false;
                self.bank.all_off()?;
            }
            LEDCommand::Mask { m } => {
                self.last_mask = Some(m);
                if self.is_on {
                    self.bank.set_mask(m)?;
                }
            }
            LEDCommand::Cycle => {
                self.bank.cycle(&mut self.delay, CYCLE_STEP_MS)?;
                self.is_on = true;
                self.last_mask = Some(1 << (N.saturating_sub(1).min(7)));
            }
        }
        Ok(())
    }
}
