//! HD44780-compatible parallel character LCD, 2 lines of 40 DDRAM columns.
//!
//! The controller is reached through an [`LcdPort`], which moves one byte to or
//! from the command/status register or the data register. Every access waits
//! for the busy flag to clear first. The display-control byte (display, cursor,
//! blink) is cached so each option can be changed on its own.
//!
//! Commands are received via `LCD_CHANNEL`.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embedded_hal::delay::DelayNs;
use heapless::String;
use serde::{Deserialize, Serialize};

/// Channel used to receive LCD commands (`LcdCommand` messages).
pub static LCD_CHANNEL: embassy_sync::channel::Channel<CriticalSectionRawMutex, LcdCommand, 16> =
    embassy_sync::channel::Channel::new();

pub const NO_ROWS: u8 = 2;
pub const NO_COLS: u8 = 40;
/// User-definable characters in CGRAM.
pub const NO_UCHARS: u8 = 8;

pub mod cmd {
    /// 8-bit interface, 2 lines, 5x8 dots.
    pub const FUNCTION_SET: u8 = 0x38;
    pub const DISPLAY_CONTROL: u8 = 0x08;
    pub const CLEAR: u8 = 0x01;
    pub const RETURN_HOME: u8 = 0x02;
    pub const DISPLAY_SHIFT: u8 = 0x18;
    pub const CURSOR_SHIFT: u8 = 0x10;
    pub const SET_DDRAM: u8 = 0x80;
    pub const SET_CGRAM: u8 = 0x40;

    pub const BUSY: u8 = 0x80;
    pub const SHIFT_RIGHT: u8 = 0x04;
}

/// Display-control options, OR-able.
pub mod opt {
    pub const DISPLAY_ON: u8 = 0x04;
    pub const CURSOR_ON: u8 = 0x02;
    pub const BLINK_ON: u8 = 0x01;
}

const POWER_UP_MS: u32 = 20;
const SHORT_COMMAND_US: u32 = 37;
const CLEAR_US: u32 = 1520;
const BUSY_POLL_US: u32 = 10;

crate::arg_flags! {
    /// Invalid-argument conditions reported by [`Lcd`].
    pub struct LcdArgErrors: u8 {
        const UCHAR_POSITION_INVALID = 0x20;
        const COL_RANGE = 0x40;
        const ROW_RANGE = 0x80;
    }
}

/// Register selected by the RS line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    /// RS low: instructions on write, busy flag and address on read.
    Command,
    /// RS high: DDRAM/CGRAM data.
    Data,
}

/// Byte-level access to the controller and the backlight switch.
///
/// Implementations own the RS/RW/E strobing and the data line direction.
pub trait LcdPort {
    type Error: core::fmt::Debug;

    fn write_byte(
        &mut self,
        register: Register,
        value: u8,
    ) -> Result<(), Self::Error>;

    fn read_byte(
        &mut self,
        register: Register,
    ) -> Result<u8, Self::Error>;

    fn set_backlight(
        &mut self,
        on: bool,
    ) -> Result<(), Self::Error>;
}

#[derive(Debug)]
pub enum LcdError<E: core::fmt::Debug> {
    PortError(E),
    InvalidArgument(LcdArgErrors),
}

impl<E: core::fmt::Debug> From<LcdArgErrors> for LcdError<E> {
    fn from(flags: LcdArgErrors) -> Self {
        LcdError::InvalidArgument(flags)
    }
}

/// LCD commands.
///
/// Serialized as JSON with tag `"dc"`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "dc", rename_all = "snake_case")]
pub enum LcdCommand {
    Clear,
    Home,
    /// Write text at line `l`, column `c`.
    Write { l: u8, c: u8, t: String<40> },
    Backlight { on: bool },
    Display { on: bool },
    Cursor { on: bool },
    Blink { on: bool },
    Shift { right: bool },
}

/// DDRAM address of a position, after validation.
pub fn ddram_address(
    line: u8,
    col: u8,
) -> Result<u8, LcdArgErrors> {
    let mut errs = LcdArgErrors::empty();
    errs.set(line >= NO_ROWS, LcdArgErrors::ROW_RANGE);
    errs.set(col >= NO_COLS, LcdArgErrors::COL_RANGE);
    errs.into_result()?;
    Ok((if line == 0 { 0 } else { 0x40 }) + col)
}

pub struct Lcd<P, D> {
    port: P,
    delay: D,
    display_mode: u8,
}

impl<P, D, E> Lcd<P, D>
where
    P: LcdPort<Error = E>,
    D: DelayNs,
    E: core::fmt::Debug,
{
    pub fn new(
        port: P,
        delay: D,
    ) -> Self {
        Self {
            port,
            delay,
            display_mode: 0,
        }
    }

    pub fn release(self) -> (P, D) {
        (self.port, self.delay)
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    /// Power-up sequence: function set, display control with `options`, clear.
    pub fn init(
        &mut self,
        options: u8,
    ) -> Result<(), LcdError<E>> {
        self.delay.delay_ms(POWER_UP_MS);
        self.write_command(cmd::FUNCTION_SET)?;
        self.delay.delay_us(SHORT_COMMAND_US);
        self.display_set(options)?;
        self.delay.delay_us(SHORT_COMMAND_US);
        self.display_clear()?;
        self.delay.delay_us(CLEAR_US);
        tracing::info!(options, "LCD initialized");
        Ok(())
    }

    /// Cached display-control options.
    pub fn display_mode(&self) -> u8 {
        self.display_mode
    }

    fn read_status(&mut self) -> Result<u8, LcdError<E>> {
        self.port
            .read_byte(Register::Command)
            .map_err(LcdError::PortError)
    }

    fn wait_until_not_busy(&mut self) -> Result<(), LcdError<E>> {
        while self.read_status()? & cmd::BUSY != 0 {
            self.delay.delay_us(BUSY_POLL_US);
        }
        Ok(())
    }

    fn write_command(
        &mut self,
        command: u8,
    ) -> Result<(), LcdError<E>> {
        self.wait_until_not_busy()?;
        self.port
            .write_byte(Register::Command, command)
            .map_err(LcdError::PortError)
    }

    /// Write one byte at the current DDRAM/CGRAM address.
    pub fn write_char(
        &mut self,
        value: u8,
    ) -> Result<(), LcdError<E>> {
        self.wait_until_not_busy()?;
        self.port
            .write_byte(Register::Data, value)
            .map_err(LcdError::PortError)
    }

    fn set_ddram_position(
        &mut self,
        address: u8,
    ) -> Result<(), LcdError<E>> {
        self.write_command(cmd::SET_DDRAM | address)
    }

    fn set_cgram_position(
        &mut self,
        address: u8,
    ) -> Result<(), LcdError<E>> {
        self.write_command(cmd::SET_CGRAM | address)
    }

    /// Send the display-control options as given and cache them.
    pub fn display_set(
        &mut self,
        options: u8,
    ) -> Result<(), LcdError<E>> {
        self.display_mode = options & (opt::DISPLAY_ON | opt::CURSOR_ON | opt::BLINK_ON);
        self.write_command(cmd::DISPLAY_CONTROL | self.display_mode)
    }

    fn update_display_mode(
        &mut self,
        option: u8,
        on: bool,
    ) -> Result<(), LcdError<E>> {
        let mode = if on {
            self.display_mode | option
        } else {
            self.display_mode & !option
        };
        self.display_set(mode)
    }

    pub fn set_display(
        &mut self,
        on: bool,
    ) -> Result<(), LcdError<E>> {
        self.update_display_mode(opt::DISPLAY_ON, on)
    }

    pub fn set_cursor(
        &mut self,
        on: bool,
    ) -> Result<(), LcdError<E>> {
        self.update_display_mode(opt::CURSOR_ON, on)
    }

    pub fn set_blink(
        &mut self,
        on: bool,
    ) -> Result<(), LcdError<E>> {
        self.update_display_mode(opt::BLINK_ON, on)
    }

    pub fn set_backlight(
        &mut self,
        on: bool,
    ) -> Result<(), LcdError<E>> {
        self.port.set_backlight(on).map_err(LcdError::PortError)
    }

    /// Clear DDRAM and move the cursor home.
    pub fn display_clear(&mut self) -> Result<(), LcdError<E>> {
        self.write_command(cmd::CLEAR)
    }

    /// Move the cursor home and undo any display shift.
    pub fn return_home(&mut self) -> Result<(), LcdError<E>> {
        self.write_command(cmd::RETURN_HOME)
    }

    pub fn display_shift(
        &mut self,
        right: bool,
    ) -> Result<(), LcdError<E>> {
        let dir = if right { cmd::SHIFT_RIGHT } else { 0 };
        self.write_command(cmd::DISPLAY_SHIFT | dir)
    }

    pub fn cursor_shift(
        &mut self,
        right: bool,
    ) -> Result<(), LcdError<E>> {
        let dir = if right { cmd::SHIFT_RIGHT } else { 0 };
        self.write_command(cmd::CURSOR_SHIFT | dir)
    }

    /// Move the write position to `line`, `col`.
    pub fn set_pos(
        &mut self,
        line: u8,
        col: u8,
    ) -> Result<(), LcdError<E>> {
        let address = ddram_address(line, col)?;
        self.set_ddram_position(address)
    }

    /// Write `text` starting at `line`, `col`. Text running past the last
    /// column is cut.
    pub fn write_string_at_pos(
        &mut self,
        text: &str,
        line: u8,
        col: u8,
    ) -> Result<(), LcdError<E>> {
        self.set_pos(line, col)?;
        let room = (NO_COLS - col) as usize;
        for &b in text.as_bytes().iter().take(room) {
            self.write_char(b)?;
        }
        Ok(())
    }

    /// Store an 8-row glyph as user character `char_no`.
    pub fn define_user_char(
        &mut self,
        rows: &[u8; 8],
        char_no: u8,
    ) -> Result<(), LcdError<E>> {
        if char_no >= NO_UCHARS {
            return Err(LcdArgErrors::UCHAR_POSITION_INVALID.into());
        }
        self.set_cgram_position(char_no << 3)?;
        for &row in rows {
            self.write_char(row)?;
        }
        Ok(())
    }

    /// Write raw bytes into CGRAM starting at `address`.
    pub fn write_bytes_at_pos_cgram(
        &mut self,
        bytes: &[u8],
        address: u8,
    ) -> Result<(), LcdError<E>> {
        self.set_cgram_position(address)?;
        for &b in bytes {
            self.write_char(b)?;
        }
        Ok(())
    }

    /// Show user characters `chars` starting at `line`, `col`.
    pub fn write_user_chars_at_pos(
        &mut self,
        chars: &[u8],
        line: u8,
        col: u8,
    ) -> Result<(), LcdError<E>> {
        let address = ddram_address(line, col)?;
        if chars.iter().any(|&c| c >= NO_UCHARS) {
            return Err(LcdArgErrors::UCHAR_POSITION_INVALID.into());
        }
        self.set_ddram_position(address)?;
        for &c in chars {
            self.write_char(c)?;
        }
        Ok(())
    }

    /// Execute an `LcdCommand`.
    pub fn ex_command(
        &mut self,
        command: &LcdCommand,
    ) -> Result<(), LcdError<E>> {
        match command {
            LcdCommand::Clear => self.display_clear(),
            LcdCommand::Home => self.return_home(),
            LcdCommand::Write { l, c, t } => self.write_string_at_pos(t, *l, *c),
            LcdCommand::Backlight { on } => self.set_backlight(*on),
            LcdCommand::Display { on } => self.set_display(*on),
            LcdCommand::Cursor { on } => self.set_cursor(*on),
            LcdCommand::Blink { on } => self.set_blink(*on),
            LcdCommand::Shift { right } => self.display_shift(*right),
        }
    }
}
