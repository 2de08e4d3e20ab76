//! SPI joystick with two buttons and two LEDs (Pmod JSTK).
//!
//! Every exchange is five bytes. The first byte sent selects the LED state,
//! the five bytes received carry X (LE), Y (LE) and the button bits. The
//! module needs a pause after chip select and between bytes.

use embedded_hal::spi::{Mode, Operation, SpiDevice, MODE_0};

pub const SPI_MODE: Mode = MODE_0;
pub const SPI_FREQUENCY_HZ: u32 = 1_000_000;

pub const LED1: u8 = 0x01;
pub const LED2: u8 = 0x02;
/// Pressing the stick itself.
pub const BTN_JOY: u8 = 0x01;
pub const BTN1: u8 = 0x02;
pub const BTN2: u8 = 0x04;

/// Marks the first byte as an LED command.
const SET_LEDS: u8 = 0x80;
const BYTE_GAP_NS: u32 = 1_000_000;

/// One joystick sample. Positions are 10-bit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoystickData {
    pub x: u16,
    pub y: u16,
    pub buttons: u8,
}

impl JoystickData {
    pub fn from_frame(frame: &[u8; 5]) -> Self {
        Self {
            x: u16::from_le_bytes([frame[0], frame[1]]),
            y: u16::from_le_bytes([frame[2], frame[3]]),
            buttons: frame[4],
        }
    }

    pub fn pressed(
        &self,
        button: u8,
    ) -> bool {
        self.buttons & button != 0
    }
}

#[derive(Debug)]
pub enum JoystickError<E: core::fmt::Debug> {
    BusError(E),
}

pub struct Joystick<SPI> {
    spi: SPI,
    led_state: u8,
    last: JoystickData,
}

impl<SPI, E> Joystick<SPI>
where
    SPI: SpiDevice<Error = E>,
    E: core::fmt::Debug,
{
    pub fn new(spi: SPI) -> Self {
        Self {
            spi,
            led_state: 0,
            last: JoystickData::default(),
        }
    }

    pub fn release(self) -> SPI {
        self.spi
    }

    fn exchange(
        &mut self,
        first: u8,
    ) -> Result<JoystickData, JoystickError<E>> {
        let mut frame = [first, 0, 0, 0, 0];
        {
            let [b0, b1, b2, b3, b4] = &mut frame;
            self.spi
                .transaction(&mut [
                    Operation::DelayNs(BYTE_GAP_NS),
                    Operation::TransferInPlace(core::slice::from_mut(b0)),
                    Operation::DelayNs(BYTE_GAP_NS),
                    Operation::TransferInPlace(core::slice::from_mut(b1)),
                    Operation::DelayNs(BYTE_GAP_NS),
                    Operation::TransferInPlace(core::slice::from_mut(b2)),
                    Operation::DelayNs(BYTE_GAP_NS),
                    Operation::TransferInPlace(core::slice::from_mut(b3)),
                    Operation::DelayNs(BYTE_GAP_NS),
                    Operation::TransferInPlace(core::slice::from_mut(b4)),
                ])
                .map_err(JoystickError::BusError)?;
        }
        self.last = JoystickData::from_frame(&frame);
        Ok(self.last)
    }

    /// Sample position and buttons; the LED byte is sent along unchanged.
    pub fn read_all(
        &mut self,
        led_state: u8,
    ) -> Result<JoystickData, JoystickError<E>> {
        self.exchange(led_state & (LED1 | LED2))
    }

    /// Switch the LEDs; the sample received during the exchange is kept.
    pub fn set_leds(
        &mut self,
        led_state: u8,
    ) -> Result<JoystickData, JoystickError<E>> {
        self.led_state = led_state & (LED1 | LED2);
        self.exchange(SET_LEDS | self.led_state)
    }

    /// LED bits last sent with [`Joystick::set_leds`].
    pub fn led_state(&self) -> u8 {
        self.led_state
    }

    /// Sample from the most recent exchange, without touching the bus.
    pub fn last(&self) -> JoystickData {
        self.last
    }

    /// Fresh X position. Each getter runs its own exchange.
    pub fn x(&mut self) -> Result<u16, JoystickError<E>> {
        Ok(self.read_all(self.led_state)?.x)
    }

    pub fn y(&mut self) -> Result<u16, JoystickError<E>> {
        Ok(self.read_all(self.led_state)?.y)
    }

    pub fn buttons(&mut self) -> Result<u8, JoystickError<E>> {
        Ok(self.read_all(self.led_state)?.buttons)
    }
}
