//! 12-bit SPI analog-to-digital converter (AD7476 class, e.g. Pmod AD1).
//!
//! A conversion is one 16-bit frame clocked out MSB first: four leading zeros
//! followed by the 12-bit result.

use embedded_hal::spi::{Mode, SpiDevice, MODE_0};

/// SPI mode the converter expects.
pub const SPI_MODE: Mode = MODE_0;
pub const SPI_FREQUENCY_HZ: u32 = 1_000_000;

/// Full-scale code.
pub const MAX_CODE: u16 = 0x0FFF;

/// Converter configuration.
#[derive(Debug, Clone, Copy)]
pub struct AdcConfig {
    /// Reference voltage, full scale maps to this value.
    pub reference_v: f32,
}

impl Default for AdcConfig {
    fn default() -> Self {
        Self { reference_v: 3.3 }
    }
}

#[derive(Debug)]
pub enum AdcError<E: core::fmt::Debug> {
    BusError(E),
}

pub struct Adc<SPI> {
    spi: SPI,
    config: AdcConfig,
}

impl<SPI, E> Adc<SPI>
where
    SPI: SpiDevice<Error = E>,
    E: core::fmt::Debug,
{
    pub fn new(
        spi: SPI,
        config: Option<AdcConfig>,
    ) -> Self {
        Self {
            spi,
            config: config.unwrap_or_default(),
        }
    }

    pub fn release(self) -> SPI {
        self.spi
    }

    /// Run one conversion and return the raw code (0..=4095).
    pub fn integer_value(&mut self) -> Result<u16, AdcError<E>> {
        let mut frame = [0u8; 2];
        self.spi.read(&mut frame).map_err(AdcError::BusError)?;
        Ok(u16::from_be_bytes(frame) & MAX_CODE)
    }

    /// Run one conversion and scale it to the configured reference.
    pub fn physical_value(&mut self) -> Result<f32, AdcError<E>> {
        let reference = self.config.reference_v;
        self.physical_value_with(reference)
    }

    /// Run one conversion and scale it to `reference_v`.
    pub fn physical_value_with(
        &mut self,
        reference_v: f32,
    ) -> Result<f32, AdcError<E>> {
        Ok(code_to_volts(self.integer_value()?, reference_v))
    }
}

pub fn code_to_volts(
    code: u16,
    reference_v: f32,
) -> f32 {
    code as f32 * reference_v / MAX_CODE as f32
}
