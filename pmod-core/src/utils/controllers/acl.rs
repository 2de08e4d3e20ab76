//! ADXL345 three-axis accelerometer over SPI or I2C.
//!
//! The driver keeps no register mirror: every setter is a read-modify-write of
//! the device register and every getter reads the device. The only cached state
//! is the g-per-LSB scale of the selected measurement range.
//!
//! Arguments are validated before the bus is touched. All violations of a call
//! are reported together as an [`AclArgErrors`] set, and a rejected call leaves
//! the device untouched. Commands are received via `ACL_CHANNEL`.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embedded_hal::{
    i2c::I2c,
    spi::{Mode, Operation, SpiDevice, MODE_3},
};
use serde::{Deserialize, Serialize};

/// Channel used to receive accelerometer commands (`AclCommand` messages).
pub static ACL_CHANNEL: embassy_sync::channel::Channel<CriticalSectionRawMutex, AclCommand, 16> =
    embassy_sync::channel::Channel::new();

/// Fixed I2C address of the ADXL345 with `ALT ADDRESS` pulled high.
pub const I2C_ADDRESS: u8 = 0x1D;
/// Value of the `DEVID` register.
pub const DEVICE_ID: u8 = 0xE5;
/// SPI mode the ADXL345 expects (CPOL = 1, CPHA = 1).
pub const SPI_MODE: Mode = MODE_3;
/// Default SPI clock; the device accepts up to 5 MHz.
pub const SPI_FREQUENCY_HZ: u32 = 1_000_000;

/// Longest burst the driver issues (`DATAX0..=DATAZ1`).
const MAX_BURST: usize = 6;

const SPI_READ: u8 = 0x80;
const SPI_MULTI_BYTE: u8 = 0x40;
const SPI_ADDRESS_MASK: u8 = 0x3F;

/// Threshold registers: 62.5 mg/LSB.
const THRESHOLD_G_PER_LSB: f32 = 0.0625;
/// Offset registers: 15.6 mg/LSB, two's complement.
const OFFSET_G_PER_LSB: f32 = 0.0156;
const OFFSET_LIMIT_G: f32 = 2.0;
const THRESHOLD_LIMIT_G: f32 = 16.0;
/// Samples thrown away, then averaged, during calibration.
const CALIBRATION_SAMPLES: usize = 128;

/// Register addresses.
pub mod reg {
    pub const DEVID: u8 = 0x00;
    pub const THRESH_TAP: u8 = 0x1D;
    pub const OFSX: u8 = 0x1E;
    pub const OFSY: u8 = 0x1F;
    pub const OFSZ: u8 = 0x20;
    pub const DUR: u8 = 0x21;
    pub const LATENT: u8 = 0x22;
    pub const WINDOW: u8 = 0x23;
    pub const THRESH_ACT: u8 = 0x24;
    pub const THRESH_INACT: u8 = 0x25;
    pub const TIME_INACT: u8 = 0x26;
    pub const ACT_INACT_CTL: u8 = 0x27;
    pub const THRESH_FF: u8 = 0x28;
    pub const TIME_FF: u8 = 0x29;
    pub const TAP_AXES: u8 = 0x2A;
    pub const ACT_TAP_STATUS: u8 = 0x2B;
    pub const BW_RATE: u8 = 0x2C;
    pub const POWER_CTL: u8 = 0x2D;
    pub const INT_ENABLE: u8 = 0x2E;
    pub const INT_MAP: u8 = 0x2F;
    pub const INT_SOURCE: u8 = 0x30;
    pub const DATA_FORMAT: u8 = 0x31;
    pub const DATAX0: u8 = 0x32;
    pub const DATAX1: u8 = 0x33;
    pub const DATAY0: u8 = 0x34;
    pub const DATAY1: u8 = 0x35;
    pub const DATAZ0: u8 = 0x36;
    pub const DATAZ1: u8 = 0x37;
    pub const FIFO_CTL: u8 = 0x38;
    pub const FIFO_STATUS: u8 = 0x39;
}

/// Register bit masks.
pub mod mask {
    // INT_ENABLE / INT_MAP / INT_SOURCE
    pub const INT_DATA_READY: u8 = 1 << 7;
    pub const INT_SINGLE_TAP: u8 = 1 << 6;
    pub const INT_DOUBLE_TAP: u8 = 1 << 5;
    pub const INT_ACTIVITY: u8 = 1 << 4;
    pub const INT_INACTIVITY: u8 = 1 << 3;
    pub const INT_FREE_FALL: u8 = 1 << 2;
    pub const INT_WATERMARK: u8 = 1 << 1;
    pub const INT_OVERRUN: u8 = 1 << 0;

    // ACT_INACT_CTL
    pub const ACT_AC_DC: u8 = 1 << 7;
    pub const ACT_X_ENABLE: u8 = 1 << 6;
    pub const ACT_Y_ENABLE: u8 = 1 << 5;
    pub const ACT_Z_ENABLE: u8 = 1 << 4;
    pub const INACT_AC_DC: u8 = 1 << 3;
    pub const INACT_X_ENABLE: u8 = 1 << 2;
    pub const INACT_Y_ENABLE: u8 = 1 << 1;
    pub const INACT_Z_ENABLE: u8 = 1 << 0;

    // ACT_TAP_STATUS
    pub const ACT_X_SOURCE: u8 = 1 << 6;
    pub const ACT_Y_SOURCE: u8 = 1 << 5;
    pub const ACT_Z_SOURCE: u8 = 1 << 4;
    pub const ASLEEP: u8 = 1 << 3;
    pub const TAP_X_SOURCE: u8 = 1 << 2;
    pub const TAP_Y_SOURCE: u8 = 1 << 1;
    pub const TAP_Z_SOURCE: u8 = 1 << 0;

    // TAP_AXES
    pub const TAP_SUPPRESS: u8 = 1 << 3;
    pub const TAP_X_ENABLE: u8 = 1 << 2;
    pub const TAP_Y_ENABLE: u8 = 1 << 1;
    pub const TAP_Z_ENABLE: u8 = 1 << 0;

    // BW_RATE
    pub const LOW_POWER: u8 = 1 << 4;
    pub const RATE: u8 = 0x0F;

    // POWER_CTL
    pub const LINK: u8 = 1 << 5;
    pub const AUTO_SLEEP: u8 = 1 << 4;
    pub const MEASURE: u8 = 1 << 3;
    pub const SLEEP: u8 = 1 << 2;
    pub const WAKEUP: u8 = 0x03;

    // DATA_FORMAT
    pub const SELF_TEST: u8 = 1 << 7;
    pub const SPI: u8 = 1 << 6;
    pub const INT_INVERT: u8 = 1 << 5;
    /// Bit 4 of DATA_FORMAT; reserved on current silicon.
    pub const DATA_FORMAT_D4: u8 = 1 << 4;
    pub const FULL_RES: u8 = 1 << 3;
    pub const JUSTIFY: u8 = 1 << 2;
    pub const RANGE: u8 = 0x03;

    // FIFO_CTL
    pub const FIFO_MODE: u8 = 0xC0;
    pub const TRIGGER: u8 = 1 << 5;
    pub const SAMPLES: u8 = 0x1F;

    // FIFO_STATUS
    pub const FIFO_TRIG: u8 = 1 << 7;
    pub const ENTRIES: u8 = 0x3F;
}

/// Parameter codes accepted by the validated setters.
pub mod par {
    pub const G_RANGE_PM2G: u8 = 0;
    pub const G_RANGE_PM4G: u8 = 1;
    pub const G_RANGE_PM8G: u8 = 2;
    pub const G_RANGE_PM16G: u8 = 3;

    pub const AXIS_X: u8 = 0;
    pub const AXIS_Y: u8 = 1;
    pub const AXIS_Z: u8 = 2;

    /// Gravity along +X during calibration.
    pub const AXIS_XP: u8 = 0;
    pub const AXIS_XN: u8 = 1;
    pub const AXIS_YP: u8 = 2;
    pub const AXIS_YN: u8 = 3;
    pub const AXIS_ZP: u8 = 4;
    pub const AXIS_ZN: u8 = 5;

    pub const THRESH_TAP: u8 = 0;
    pub const THRESH_ACT: u8 = 1;
    pub const THRESH_INACT: u8 = 2;
    pub const THRESH_FF: u8 = 3;

    pub const TIME_DUR: u8 = 0;
    pub const TIME_LATENT: u8 = 1;
    pub const TIME_WINDOW: u8 = 2;
    pub const TIME_FF: u8 = 3;

    pub const WAKEUP_8HZ: u8 = 0;
    pub const WAKEUP_4HZ: u8 = 1;
    pub const WAKEUP_2HZ: u8 = 2;
    pub const WAKEUP_1HZ: u8 = 3;

    pub const FIFO_BYPASS: u8 = 0;
    pub const FIFO_FIFO: u8 = 1;
    pub const FIFO_STREAM: u8 = 2;
    pub const FIFO_TRIGGER: u8 = 3;

    /// 0.10 Hz; each step doubles the rate up to 15 (3200 Hz).
    pub const OUTPUT_RATE_0_10HZ: u8 = 0;
    pub const OUTPUT_RATE_100HZ: u8 = 10;
    pub const OUTPUT_RATE_3200HZ: u8 = 15;

    pub const INT1: u8 = 0;
    pub const INT2: u8 = 1;

    pub const ACTIVE_HIGH: u8 = 0;
    pub const ACTIVE_LOW: u8 = 1;
}

/// Single-bit selectors for [`Acl::set_sfr_bit`] and [`Acl::sfr_bit`].
pub mod bit {
    pub const LOW_POWER: u8 = 0;
    pub const LINK: u8 = 1;
    pub const AUTO_SLEEP: u8 = 2;
    pub const MEASURE: u8 = 3;
    pub const SLEEP: u8 = 4;
    pub const SELF_TEST: u8 = 5;
    pub const SPI: u8 = 6;
    pub const INT_INVERT: u8 = 7;
    pub const DATA_FORMAT_D4: u8 = 8;
    pub const FULL_RES: u8 = 9;
    pub const JUSTIFY: u8 = 10;
    pub const FIFO_TRIGGER: u8 = 11;
    /// Read-only.
    pub const FIFO_TRIG_STATUS: u8 = 12;
}

crate::arg_flags! {
    /// Invalid-argument conditions reported by [`Acl`].
    pub struct AclArgErrors: u32 {
        /// Offset outside ±2 g.
        const RANGE_PM2G = 1 << 0;
        /// Threshold outside 0..=16 g.
        const RANGE_0_16G = 1 << 1;
        const RANGE_0_160MS = 1 << 2;
        const RANGE_0_320MS = 1 << 3;
        const RANGE_0_1280MS = 1 << 4;
        /// Output rate code outside 0..=15.
        const RANGE_0_15 = 1 << 5;
        /// g-range code outside 0..=3.
        const RANGE_DF_0_3 = 1 << 6;
        const INVALID_THRESH = 1 << 7;
        const RANGE_WU_0_3 = 1 << 8;
        /// Calibration axis outside 0..=5.
        const RANGE_0_5 = 1 << 9;
        const INVALID_BIT_SET = 1 << 10;
        const INVALID_BIT_GET = 1 << 11;
        const RANGE_FIFO_0_3 = 1 << 12;
        const INVALID_TIME = 1 << 13;
        const INVALID_AXIS = 1 << 14;
        const INVALID_INT_NO = 1 << 15;
        const INVALID_ACTIVE_TYPE = 1 << 16;
    }
}

/// Errors returned by the accelerometer driver.
#[derive(Debug)]
pub enum AclError<E: core::fmt::Debug> {
    BusError(E),
    InvalidArgument(AclArgErrors),
}

impl<E: core::fmt::Debug> From<AclArgErrors> for AclError<E> {
    fn from(flags: AclArgErrors) -> Self {
        AclError::InvalidArgument(flags)
    }
}

/// Register-level access to the device, independent of the bus.
pub trait AclInterface {
    type Error: core::fmt::Debug;

    /// Write `values` to consecutive registers starting at `address`.
    fn write_registers(
        &mut self,
        address: u8,
        values: &[u8],
    ) -> Result<(), Self::Error>;

    /// Fill `values` from consecutive registers starting at `address`.
    fn read_registers(
        &mut self,
        address: u8,
        values: &mut [u8],
    ) -> Result<(), Self::Error>;
}

/// 4-wire SPI access. Chip select is handled by the `SpiDevice`.
pub struct SpiInterface<SPI> {
    spi: SPI,
}

impl<SPI: SpiDevice> SpiInterface<SPI> {
    pub fn new(spi: SPI) -> Self {
        Self { spi }
    }

    pub fn release(self) -> SPI {
        self.spi
    }
}

/// First byte of an SPI access: R/W bit, multi-byte bit, register address.
fn spi_command_byte(
    read: bool,
    address: u8,
    len: usize,
) -> u8 {
    let mut first = address & SPI_ADDRESS_MASK;
    if read {
        first |= SPI_READ;
    }
    if len > 1 {
        first |= SPI_MULTI_BYTE;
    }
    first
}

impl<SPI: SpiDevice> AclInterface for SpiInterface<SPI> {
    type Error = SPI::Error;

    fn write_registers(
        &mut self,
        address: u8,
        values: &[u8],
    ) -> Result<(), Self::Error> {
        let first = [spi_command_byte(false, address, values.len())];
        self.spi
            .transaction(&mut [Operation::Write(&first), Operation::Write(values)])
    }

    fn read_registers(
        &mut self,
        address: u8,
        values: &mut [u8],
    ) -> Result<(), Self::Error> {
        let first = [spi_command_byte(true, address, values.len())];
        self.spi
            .transaction(&mut [Operation::Write(&first), Operation::Read(values)])
    }
}

/// I2C access at [`I2C_ADDRESS`].
pub struct I2cInterface<I2C> {
    i2c: I2C,
}

impl<I2C: I2c> I2cInterface<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self { i2c }
    }

    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C: I2c> AclInterface for I2cInterface<I2C> {
    type Error = I2C::Error;

    fn write_registers(
        &mut self,
        address: u8,
        values: &[u8],
    ) -> Result<(), Self::Error> {
        // Longer runs go out as several frames, each with its own start
        // register, so the auto-increment lands on the same registers.
        for (i, chunk) in values.chunks(MAX_BURST).enumerate() {
            let mut frame = [0u8; MAX_BURST + 1];
            frame[0] = address.wrapping_add((i * MAX_BURST) as u8);
            frame[1..=chunk.len()].copy_from_slice(chunk);
            self.i2c.write(I2C_ADDRESS, &frame[..=chunk.len()])?;
        }
        Ok(())
    }

    fn read_registers(
        &mut self,
        address: u8,
        values: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.i2c.write_read(I2C_ADDRESS, &[address], values)
    }
}

/// Accelerometer commands.
///
/// Serialized as JSON with tag `"ac"`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(tag = "ac", rename_all = "snake_case")]
pub enum AclCommand {
    /// Read acceleration on all three axes.
    ReadAccel,
    /// Read the device id register.
    ReadDevId,
    /// Select the measurement range (`par::G_RANGE_*`).
    SetRange { r: u8 },
    /// Select the output data rate (0..=15).
    SetRate { r: u8 },
    /// Enter or leave measurement mode.
    Measure { on: bool },
    /// Run a gravitational calibration (`par::AXIS_XP..=AXIS_ZN`).
    Calibrate { axis: u8 },
}

/// Data produced by an [`AclCommand`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AclReading {
    Accel(f32, f32, f32),
    DevId(u8),
}

/// g per LSB for a range code (`2 * g / 1024`).
pub fn g_range_lsb(range_par: u8) -> f32 {
    let g = (2u32 << (range_par & mask::RANGE)) as f32;
    2.0 * g / 1024.0
}

/// Longest settable time, the free-fall window.
const TIME_LIMIT_S: f32 = 1.28;

/// Register, LSB weight (s), upper bound (s) and range flag of a time parameter.
fn time_register(time_par: u8) -> Option<(u8, f32, f32, AclArgErrors)> {
    match time_par {
        par::TIME_DUR => Some((reg::DUR, 0.000_625, 0.16, AclArgErrors::RANGE_0_160MS)),
        par::TIME_LATENT => Some((reg::LATENT, 0.001_25, 0.32, AclArgErrors::RANGE_0_320MS)),
        par::TIME_WINDOW => Some((reg::WINDOW, 0.001_25, 0.32, AclArgErrors::RANGE_0_320MS)),
        par::TIME_FF => Some((reg::TIME_FF, 0.005, TIME_LIMIT_S, AclArgErrors::RANGE_0_1280MS)),
        _ => None,
    }
}

fn threshold_register(thresh_par: u8) -> Option<u8> {
    match thresh_par {
        par::THRESH_TAP => Some(reg::THRESH_TAP),
        par::THRESH_ACT => Some(reg::THRESH_ACT),
        par::THRESH_INACT => Some(reg::THRESH_INACT),
        par::THRESH_FF => Some(reg::THRESH_FF),
        _ => None,
    }
}

/// Register and mask behind a single-bit selector.
fn sfr_location(bit_par: u8) -> Option<(u8, u8)> {
    match bit_par {
        bit::LOW_POWER => Some((reg::BW_RATE, mask::LOW_POWER)),
        bit::LINK => Some((reg::POWER_CTL, mask::LINK)),
        bit::AUTO_SLEEP => Some((reg::POWER_CTL, mask::AUTO_SLEEP)),
        bit::MEASURE => Some((reg::POWER_CTL, mask::MEASURE)),
        bit::SLEEP => Some((reg::POWER_CTL, mask::SLEEP)),
        bit::SELF_TEST => Some((reg::DATA_FORMAT, mask::SELF_TEST)),
        bit::SPI => Some((reg::DATA_FORMAT, mask::SPI)),
        bit::INT_INVERT => Some((reg::DATA_FORMAT, mask::INT_INVERT)),
        bit::DATA_FORMAT_D4 => Some((reg::DATA_FORMAT, mask::DATA_FORMAT_D4)),
        bit::FULL_RES => Some((reg::DATA_FORMAT, mask::FULL_RES)),
        bit::JUSTIFY => Some((reg::DATA_FORMAT, mask::JUSTIFY)),
        bit::FIFO_TRIGGER => Some((reg::FIFO_CTL, mask::TRIGGER)),
        bit::FIFO_TRIG_STATUS => Some((reg::FIFO_STATUS, mask::FIFO_TRIG)),
        _ => None,
    }
}

fn check_axis(axis: u8) -> AclArgErrors {
    let mut errs = AclArgErrors::empty();
    errs.set(axis > par::AXIS_Z, AclArgErrors::INVALID_AXIS);
    errs
}

/// ADXL345 driver over an [`AclInterface`].
pub struct Acl<IF> {
    iface: IF,
    g_range_lsb: f32,
}

impl<SPI: SpiDevice> Acl<SpiInterface<SPI>> {
    /// Driver on an SPI device configured for [`SPI_MODE`].
    pub fn new_spi(spi: SPI) -> Self {
        Self::new(SpiInterface::new(spi))
    }
}

impl<I2C: I2c> Acl<I2cInterface<I2C>> {
    /// Driver on an I2C bus at [`I2C_ADDRESS`].
    pub fn new_i2c(i2c: I2C) -> Self {
        Self::new(I2cInterface::new(i2c))
    }
}

impl<IF, E> Acl<IF>
where
    IF: AclInterface<Error = E>,
    E: core::fmt::Debug,
{
    /// Wrap an interface. The device powers up in the ±2 g range.
    pub fn new(iface: IF) -> Self {
        Self {
            iface,
            g_range_lsb: g_range_lsb(par::G_RANGE_PM2G),
        }
    }

    /// Give the interface back.
    pub fn release(self) -> IF {
        self.iface
    }

    /// Current g-per-LSB scale.
    pub fn g_range_lsb(&self) -> f32 {
        self.g_range_lsb
    }

    fn write_registers(
        &mut self,
        address: u8,
        values: &[u8],
    ) -> Result<(), AclError<E>> {
        self.iface
            .write_registers(address, values)
            .map_err(AclError::BusError)
    }

    fn read_registers(
        &mut self,
        address: u8,
        values: &mut [u8],
    ) -> Result<(), AclError<E>> {
        self.iface
            .read_registers(address, values)
            .map_err(AclError::BusError)
    }

    fn read_register(
        &mut self,
        address: u8,
    ) -> Result<u8, AclError<E>> {
        let mut value = [0u8];
        self.read_registers(address, &mut value)?;
        Ok(value[0])
    }

    fn write_register(
        &mut self,
        address: u8,
        value: u8,
    ) -> Result<(), AclError<E>> {
        self.write_registers(address, &[value])
    }

    /// Set or clear the `mask` bits of a register.
    fn set_register_bits(
        &mut self,
        address: u8,
        mask: u8,
        on: bool,
    ) -> Result<(), AclError<E>> {
        let current = self.read_register(address)?;
        let next = if on { current | mask } else { current & !mask };
        self.write_register(address, next)
    }

    fn register_bits(
        &mut self,
        address: u8,
        mask: u8,
    ) -> Result<u8, AclError<E>> {
        Ok(self.read_register(address)? & mask)
    }

    /// Replace the `mask` bits of a register with the matching bits of `value`.
    fn set_register_bits_from_byte(
        &mut self,
        address: u8,
        mask: u8,
        value: u8,
    ) -> Result<(), AclError<E>> {
        let current = self.read_register(address)?;
        self.write_register(address, (current & !mask) | (value & mask))
    }

    fn to_g(
        &self,
        reading: i16,
    ) -> f32 {
        reading as f32 * self.g_range_lsb
    }

    pub fn dev_id(&mut self) -> Result<u8, AclError<E>> {
        self.read_register(reg::DEVID)
    }

    /// Read acceleration in g on all three axes with one burst.
    pub fn read_accel_g(&mut self) -> Result<(f32, f32, f32), AclError<E>> {
        let mut raw = [0u8; MAX_BURST];
        self.read_registers(reg::DATAX0, &mut raw)?;
        let x = i16::from_le_bytes([raw[0], raw[1]]);
        let y = i16::from_le_bytes([raw[2], raw[3]]);
        let z = i16::from_le_bytes([raw[4], raw[5]]);
        Ok((self.to_g(x), self.to_g(y), self.to_g(z)))
    }

    /// Read acceleration in g on one axis (`par::AXIS_X..=AXIS_Z`).
    pub fn read_accel_g_one_axis(
        &mut self,
        axis: u8,
    ) -> Result<f32, AclError<E>> {
        check_axis(axis).into_result()?;
        let mut raw = [0u8; 2];
        self.read_registers(reg::DATAX0 + 2 * axis, &mut raw)?;
        Ok(self.to_g(i16::from_le_bytes(raw)))
    }

    /// Select the measurement range and update the cached scale.
    pub fn set_data_format_g_range_par(
        &mut self,
        range_par: u8,
    ) -> Result<(), AclError<E>> {
        if range_par > par::G_RANGE_PM16G {
            return Err(AclArgErrors::RANGE_DF_0_3.into());
        }
        self.set_register_bits_from_byte(reg::DATA_FORMAT, mask::RANGE, range_par)?;
        self.g_range_lsb = g_range_lsb(range_par);
        Ok(())
    }

    pub fn data_format_g_range_par(&mut self) -> Result<u8, AclError<E>> {
        self.register_bits(reg::DATA_FORMAT, mask::RANGE)
    }

    /// Set one of the single-bit controls listed in [`bit`] (except the
    /// read-only `FIFO_TRIG_STATUS`).
    pub fn set_sfr_bit(
        &mut self,
        bit_par: u8,
        on: bool,
    ) -> Result<(), AclError<E>> {
        match sfr_location(bit_par) {
            Some((address, mask)) if bit_par != bit::FIFO_TRIG_STATUS => {
                self.set_register_bits(address, mask, on)
            }
            _ => Err(AclArgErrors::INVALID_BIT_SET.into()),
        }
    }

    pub fn sfr_bit(
        &mut self,
        bit_par: u8,
    ) -> Result<bool, AclError<E>> {
        let (address, mask) = sfr_location(bit_par).ok_or(AclArgErrors::INVALID_BIT_GET)?;
        Ok(self.register_bits(address, mask)? != 0)
    }

    /// Write the offset register of one axis, in g.
    pub fn set_offset_g(
        &mut self,
        axis: u8,
        offset_g: f32,
    ) -> Result<(), AclError<E>> {
        let mut errs = check_axis(axis);
        errs.set(
            !(-OFFSET_LIMIT_G..=OFFSET_LIMIT_G).contains(&offset_g),
            AclArgErrors::RANGE_PM2G,
        );
        errs.into_result()?;

        let value = (offset_g / OFFSET_G_PER_LSB) as i8;
        self.write_register(reg::OFSX + axis, value as u8)
    }

    pub fn offset_g(
        &mut self,
        axis: u8,
    ) -> Result<f32, AclError<E>> {
        check_axis(axis).into_result()?;
        let value = self.read_register(reg::OFSX + axis)? as i8;
        Ok(value as f32 * OFFSET_G_PER_LSB)
    }

    /// Write a tap/activity/inactivity/free-fall threshold, in g.
    pub fn set_threshold_g(
        &mut self,
        thresh_par: u8,
        threshold_g: f32,
    ) -> Result<(), AclError<E>> {
        let mut errs = AclArgErrors::empty();
        errs.set(
            !(0.0..=THRESHOLD_LIMIT_G).contains(&threshold_g),
            AclArgErrors::RANGE_0_16G,
        );
        let Some(address) = threshold_register(thresh_par) else {
            return Err((errs | AclArgErrors::INVALID_THRESH).into());
        };
        errs.into_result()?;

        self.write_register(address, (threshold_g / THRESHOLD_G_PER_LSB) as u8)
    }

    pub fn threshold_g(
        &mut self,
        thresh_par: u8,
    ) -> Result<f32, AclError<E>> {
        let address = threshold_register(thresh_par).ok_or(AclArgErrors::INVALID_THRESH)?;
        Ok(self.read_register(address)? as f32 * THRESHOLD_G_PER_LSB)
    }

    /// Write a tap duration/latency/window or free-fall time, in seconds.
    pub fn set_time_s(
        &mut self,
        time_par: u8,
        time_s: f32,
    ) -> Result<(), AclError<E>> {
        let Some((address, lsb, max, range_flag)) = time_register(time_par) else {
            // Unknown parameter: the value is still checked against the
            // widest window.
            let mut errs = AclArgErrors::INVALID_TIME;
            errs.set(
                !(0.0..=TIME_LIMIT_S).contains(&time_s),
                AclArgErrors::RANGE_0_1280MS,
            );
            return Err(errs.into());
        };
        let mut errs = AclArgErrors::empty();
        errs.set(!(0.0..=max).contains(&time_s), range_flag);
        errs.into_result()?;
        self.write_register(address, (time_s / lsb) as u8)
    }

    pub fn time_s(
        &mut self,
        time_par: u8,
    ) -> Result<f32, AclError<E>> {
        let (address, lsb, _, _) = time_register(time_par).ok_or(AclArgErrors::INVALID_TIME)?;
        Ok(self.read_register(address)? as f32 * lsb)
    }

    pub fn set_bw_rate_output_rate_par(
        &mut self,
        rate_par: u8,
    ) -> Result<(), AclError<E>> {
        if rate_par > par::OUTPUT_RATE_3200HZ {
            return Err(AclArgErrors::RANGE_0_15.into());
        }
        self.set_register_bits_from_byte(reg::BW_RATE, mask::RATE, rate_par)
    }

    pub fn bw_rate_output_rate_par(&mut self) -> Result<u8, AclError<E>> {
        self.register_bits(reg::BW_RATE, mask::RATE)
    }

    pub fn set_power_control_wakeup_freq_par(
        &mut self,
        wakeup_par: u8,
    ) -> Result<(), AclError<E>> {
        if wakeup_par > par::WAKEUP_1HZ {
            return Err(AclArgErrors::RANGE_WU_0_3.into());
        }
        self.set_register_bits_from_byte(reg::POWER_CTL, mask::WAKEUP, wakeup_par)
    }

    pub fn power_control_wakeup_freq_par(&mut self) -> Result<u8, AclError<E>> {
        self.register_bits(reg::POWER_CTL, mask::WAKEUP)
    }

    /// Select the FIFO mode (`par::FIFO_*`), stored in bits 7:6 of FIFO_CTL.
    pub fn set_fifo_control_fifo_mode_par(
        &mut self,
        mode_par: u8,
    ) -> Result<(), AclError<E>> {
        if mode_par > par::FIFO_TRIGGER {
            return Err(AclArgErrors::RANGE_FIFO_0_3.into());
        }
        self.set_register_bits_from_byte(reg::FIFO_CTL, mask::FIFO_MODE, mode_par << 6)
    }

    pub fn fifo_control_fifo_mode_par(&mut self) -> Result<u8, AclError<E>> {
        Ok(self.register_bits(reg::FIFO_CTL, mask::FIFO_MODE)? >> 6)
    }

    pub fn set_fifo_control_samples_val(
        &mut self,
        samples: u8,
    ) -> Result<(), AclError<E>> {
        self.set_register_bits_from_byte(reg::FIFO_CTL, mask::SAMPLES, samples)
    }

    pub fn fifo_control_samples_val(&mut self) -> Result<u8, AclError<E>> {
        self.register_bits(reg::FIFO_CTL, mask::SAMPLES)
    }

    pub fn fifo_status_entries_val(&mut self) -> Result<u8, AclError<E>> {
        self.register_bits(reg::FIFO_STATUS, mask::ENTRIES)
    }

    pub fn set_active_inactive_control_bits(
        &mut self,
        mask: u8,
        on: bool,
    ) -> Result<(), AclError<E>> {
        self.set_register_bits(reg::ACT_INACT_CTL, mask, on)
    }

    pub fn active_inactive_control_bits(
        &mut self,
        mask: u8,
    ) -> Result<u8, AclError<E>> {
        self.register_bits(reg::ACT_INACT_CTL, mask)
    }

    pub fn act_tap_status_bits(
        &mut self,
        mask: u8,
    ) -> Result<u8, AclError<E>> {
        self.register_bits(reg::ACT_TAP_STATUS, mask)
    }

    pub fn set_tap_axes_bits(
        &mut self,
        mask: u8,
        on: bool,
    ) -> Result<(), AclError<E>> {
        self.set_register_bits(reg::TAP_AXES, mask, on)
    }

    pub fn tap_axes_bits(
        &mut self,
        mask: u8,
    ) -> Result<u8, AclError<E>> {
        self.register_bits(reg::TAP_AXES, mask)
    }

    /// Reading INT_SOURCE clears the latched interrupt flags.
    pub fn interrupt_source_bits(
        &mut self,
        mask: u8,
    ) -> Result<u8, AclError<E>> {
        self.register_bits(reg::INT_SOURCE, mask)
    }

    pub fn int_enable_event_bits(
        &mut self,
        mask: u8,
    ) -> Result<u8, AclError<E>> {
        self.register_bits(reg::INT_ENABLE, mask)
    }

    /// True if any event in `mask` is routed to interrupt line `int_par`.
    pub fn int_map_event_bits(
        &mut self,
        int_par: u8,
        mask: u8,
    ) -> Result<bool, AclError<E>> {
        if int_par > par::INT2 {
            return Err(AclArgErrors::INVALID_INT_NO.into());
        }
        let map = self.read_register(reg::INT_MAP)?;
        let routed = if int_par == par::INT2 { map & mask } else { !map & mask };
        Ok(routed != 0)
    }

    /// Route the `events` interrupts to line `int_par`, enable them and set the
    /// output polarity. Latched flags are cleared at the end.
    ///
    /// Hooking the MCU pin interrupt is left to the caller.
    pub fn configure_interrupt(
        &mut self,
        int_par: u8,
        events: u8,
        active_par: u8,
    ) -> Result<(), AclError<E>> {
        let mut errs = AclArgErrors::empty();
        errs.set(int_par > par::INT2, AclArgErrors::INVALID_INT_NO);
        errs.set(active_par > par::ACTIVE_LOW, AclArgErrors::INVALID_ACTIVE_TYPE);
        errs.into_result()?;

        self.set_register_bits(reg::INT_MAP, events, int_par == par::INT2)?;
        self.set_register_bits(reg::INT_ENABLE, events, true)?;
        self.set_register_bits(
            reg::DATA_FORMAT,
            mask::INT_INVERT,
            active_par == par::ACTIVE_LOW,
        )?;
        self.read_register(reg::INT_SOURCE)?;
        Ok(())
    }

    /// Calibrate the offsets with the board at rest and gravity along
    /// `axis_par` (`par::AXIS_XP..=AXIS_ZN`).
    ///
    /// Offsets are zeroed, 128 samples discarded and 128 averaged; the offset
    /// registers then receive the difference to ±1 g on the gravity axis and to
    /// 0 g on the others. Corrections beyond ±2 g are clamped.
    pub fn calibrate_one_axis_gravitational(
        &mut self,
        axis_par: u8,
    ) -> Result<(), AclError<E>> {
        if axis_par > par::AXIS_ZN {
            return Err(AclArgErrors::RANGE_0_5.into());
        }

        self.set_sfr_bit(bit::MEASURE, false)?;
        for axis in par::AXIS_X..=par::AXIS_Z {
            self.set_offset_g(axis, 0.0)?;
        }
        self.set_sfr_bit(bit::MEASURE, true)?;

        for _ in 0..CALIBRATION_SAMPLES {
            self.read_accel_g()?;
        }
        let mut sum = [0.0f32; 3];
        for _ in 0..CALIBRATION_SAMPLES {
            let (x, y, z) = self.read_accel_g()?;
            sum[0] += x;
            sum[1] += y;
            sum[2] += z;
        }

        let gravity_axis = (axis_par / 2) as usize;
        let gravity = if axis_par % 2 == 0 { 1.0 } else { -1.0 };
        let mut corrections = [0.0f32; 3];
        for (i, correction) in corrections.iter_mut().enumerate() {
            let target = if i == gravity_axis { gravity } else { 0.0 };
            let average = sum[i] / CALIBRATION_SAMPLES as f32;
            *correction = (target - average).clamp(-OFFSET_LIMIT_G, OFFSET_LIMIT_G);
        }

        self.set_sfr_bit(bit::MEASURE, false)?;
        for (axis, correction) in (par::AXIS_X..=par::AXIS_Z).zip(corrections) {
            self.set_offset_g(axis, correction)?;
        }
        self.set_sfr_bit(bit::MEASURE, true)?;

        tracing::info!(axis = axis_par, ?corrections, "accelerometer calibrated");
        Ok(())
    }

    /// Execute an `AclCommand`, returning data for the read commands.
    pub fn execute_command(
        &mut self,
        command: AclCommand,
    ) -> Result<Option<AclReading>, AclError<E>> {
        match command {
            AclCommand::ReadAccel => {
                let (x, y, z) = self.read_accel_g()?;
                Ok(Some(AclReading::Accel(x, y, z)))
            }
            AclCommand::ReadDevId => Ok(Some(AclReading::DevId(self.dev_id()?))),
            AclCommand::SetRange { r } => {
                self.set_data_format_g_range_par(r)?;
                Ok(None)
            }
            AclCommand::SetRate { r } => {
                self.set_bw_rate_output_rate_par(r)?;
                Ok(None)
            }
            AclCommand::Measure { on } => {
                self.set_sfr_bit(bit::MEASURE, on)?;
                Ok(None)
            }
            AclCommand::Calibrate { axis } => {
                self.calibrate_one_axis_gravitational(axis)?;
                Ok(None)
            }
        }
    }
}
